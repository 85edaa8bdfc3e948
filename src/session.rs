//! ## Session & Object Model
//!
//! A single open MTP session against one recorder device: the
//! operations this profile supports, and the local mirror of the
//! device's storage/object tree those operations maintain.
//!

use anyhow::Result;
use log::{debug, info};

use crate::codec::dataset::{self, ObjectInfo, StorageInfo};
use crate::constants::misc::DEFAULT_TIMEOUT_DURATION;
use crate::constants::{operations, responses, SESSION_ID};
use crate::engine::TransactionEngine;
use crate::error::Error;
use crate::transport::BulkTransportLike;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Open,
}

#[derive(Debug, Clone)]
pub struct Object {
    pub handle: u32,
    pub storage_id: u32,
    pub info: Option<ObjectInfo>,
}

#[derive(Debug, Clone)]
pub struct Storage {
    pub id: u32,
    pub info: Option<StorageInfo>,
    pub objects: Vec<Object>,
}

/// ### Session
///
/// Wraps a [`TransactionEngine`] with MTP session/object-model semantics.
/// `storages` is rebuilt by `get_storage_ids`/`get_object_handles` on
/// each enumeration pass rather than being incrementally patched, except
/// for `delete_object`, which removes a single local entry.
///
#[derive(Debug)]
pub struct Session<T: BulkTransportLike> {
    engine: TransactionEngine<T>,
    pub state: SessionState,
    pub serial_number: Option<String>,
    pub storages: Vec<Storage>,
    last_sent_object_info: Option<u32>,
}

impl<T: BulkTransportLike> Session<T> {
    pub fn new(transport: T) -> Session<T> {
        Session {
            engine: TransactionEngine::new(transport),
            state: SessionState::Closed,
            serial_number: None,
            storages: Vec::new(),
            last_sent_object_info: None,
        }
    }

    fn require_open(&self) -> Result<()> {
        if self.state != SessionState::Open {
            return Err(Error::ProtocolError("session is not open".into()).into());
        }
        Ok(())
    }

    /// `0x2001 OK` and `0x201E SESSION_ALREADY_OPEN` both leave the
    /// session `Open`; any other response code is an error and the
    /// session state is left unchanged.
    pub fn open_session(&mut self) -> Result<()> {
        let (code, _params, _data) = self.engine.command(
            operations::OPEN_SESSION,
            &[SESSION_ID],
            None,
            false,
            DEFAULT_TIMEOUT_DURATION,
        )?;

        match code {
            responses::OK => {
                info!("session opened");
                self.state = SessionState::Open;
                Ok(())
            }
            responses::SESSION_ALREADY_OPEN => {
                debug!("session already open, treating as success");
                self.state = SessionState::Open;
                Ok(())
            }
            other => Err(Error::MtpStatus(other).into()),
        }
    }

    pub fn close_session(&mut self) -> Result<()> {
        self.require_open()?;
        let (code, _params, _data) =
            self.engine
                .command(operations::CLOSE_SESSION, &[], None, false, DEFAULT_TIMEOUT_DURATION)?;

        if code != responses::OK {
            return Err(Error::MtpStatus(code).into());
        }
        self.state = SessionState::Closed;
        Ok(())
    }

    pub fn get_storage_ids(&mut self) -> Result<Vec<u32>> {
        self.require_open()?;
        let (code, _params, data) = self.engine.command(
            operations::GET_STORAGE_IDS,
            &[],
            None,
            true,
            DEFAULT_TIMEOUT_DURATION,
        )?;

        if code != responses::OK {
            return Err(Error::MtpStatus(code).into());
        }

        let ids = dataset::decode_u32_array(&data.unwrap_or_default())?;
        self.storages = ids
            .iter()
            .map(|&id| Storage {
                id,
                info: None,
                objects: Vec::new(),
            })
            .collect();

        Ok(ids)
    }

    pub fn get_storage_info(&mut self, storage_id: u32) -> Result<()> {
        self.require_open()?;
        let (code, _params, data) = self.engine.command(
            operations::GET_STORAGE_INFO,
            &[storage_id],
            None,
            true,
            DEFAULT_TIMEOUT_DURATION,
        )?;

        if code != responses::OK {
            return Err(Error::MtpStatus(code).into());
        }

        let info = StorageInfo::decode(&data.unwrap_or_default())?;
        let storage = self
            .storages
            .iter_mut()
            .find(|s| s.id == storage_id)
            .ok_or_else(|| Error::ParseError(format!("unknown storage id {storage_id}")))?;
        storage.info = Some(info);
        Ok(())
    }

    pub fn get_object_handles(&mut self, storage_id: u32) -> Result<Vec<u32>> {
        self.require_open()?;
        let (code, _params, data) = self.engine.command(
            operations::GET_OBJECT_HANDLES,
            &[storage_id, 0, 0xFFFFFFFF],
            None,
            true,
            DEFAULT_TIMEOUT_DURATION,
        )?;

        if code != responses::OK {
            return Err(Error::MtpStatus(code).into());
        }

        let handles = dataset::decode_u32_array(&data.unwrap_or_default())?;
        let storage = self
            .storages
            .iter_mut()
            .find(|s| s.id == storage_id)
            .ok_or_else(|| Error::ParseError(format!("unknown storage id {storage_id}")))?;
        storage.objects = handles
            .iter()
            .map(|&handle| Object {
                handle,
                storage_id,
                info: None,
            })
            .collect();

        Ok(handles)
    }

    pub fn get_object_info(&mut self, handle: u32) -> Result<()> {
        self.require_open()?;
        let (code, _params, data) = self.engine.command(
            operations::GET_OBJECT_INFO,
            &[handle],
            None,
            true,
            DEFAULT_TIMEOUT_DURATION,
        )?;

        if code != responses::OK {
            return Err(Error::MtpStatus(code).into());
        }

        let info = ObjectInfo::decode(&data.unwrap_or_default())?;
        let object = self
            .storages
            .iter_mut()
            .flat_map(|s| s.objects.iter_mut())
            .find(|o| o.handle == handle)
            .ok_or_else(|| Error::ParseError(format!("unknown object handle {handle}")))?;
        object.info = Some(info);
        Ok(())
    }

    /// Small-object (fully-buffered) variant of `GetObject`. Use
    /// [`Session::download_object`] for multi-megabyte transfers that
    /// should not be held entirely in memory.
    pub fn get_object(&mut self, handle: u32) -> Result<Vec<u8>> {
        self.require_open()?;
        let (code, _params, data) = self.engine.command(
            operations::GET_OBJECT,
            &[handle],
            None,
            true,
            DEFAULT_TIMEOUT_DURATION,
        )?;

        if code != responses::OK {
            return Err(Error::MtpStatus(code).into());
        }
        Ok(data.unwrap_or_default())
    }

    pub fn delete_object(&mut self, handle: u32) -> Result<()> {
        self.require_open()?;
        let (code, _params, _data) = self.engine.command(
            operations::DELETE_OBJECT,
            &[handle, 0],
            None,
            false,
            DEFAULT_TIMEOUT_DURATION,
        )?;

        if code != responses::OK {
            return Err(Error::MtpStatus(code).into());
        }

        for storage in &mut self.storages {
            storage.objects.retain(|o| o.handle != handle);
        }
        Ok(())
    }

    /// Send an `ObjectInfo` dataset announcing an upload, returning the
    /// handle the device assigned it. Must be followed by `send_object`
    /// with that same handle before any other command touches this
    /// session's upload state.
    pub fn send_object_info(&mut self, storage_id: u32, filename: &str, size: u32) -> Result<u32> {
        self.require_open()?;

        let info = ObjectInfo {
            storage_id,
            format: crate::constants::object_format::UNDEFINED,
            protection_status: 0,
            size,
            thumb_format: 0,
            thumb_compressed_size: 0,
            thumb_pix_width: 0,
            thumb_pix_height: 0,
            image_pix_width: 0,
            image_pix_height: 0,
            image_bit_depth: 0,
            parent: 0xFFFFFFFF,
            association_type: 0,
            association_desc: 0,
            sequence_number: 0,
            filename: filename.to_string(),
            date_created: String::new(),
            date_modified: String::new(),
            keywords: String::new(),
        };

        let (code, params, _data) = self.engine.command(
            operations::SEND_OBJECT_INFO,
            &[storage_id, 0xFFFFFFFF],
            Some(&info.encode()?),
            false,
            DEFAULT_TIMEOUT_DURATION,
        )?;

        if code != responses::OK {
            return Err(Error::MtpStatus(code).into());
        }

        let new_handle = *params
            .get(2)
            .ok_or_else(|| Error::ProtocolError("SendObjectInfo response missing new handle".into()))?;
        self.last_sent_object_info = Some(new_handle);
        Ok(new_handle)
    }

    /// Send the raw bytes of an object previously announced with
    /// `send_object_info`. `handle` must match the handle that call
    /// returned; this is a correctness check, not a wire parameter
    /// (`SendObject` itself carries no parameters).
    pub fn send_object(&mut self, handle: u32, bytes: &[u8]) -> Result<()> {
        self.require_open()?;

        match self.last_sent_object_info {
            Some(expected) if expected == handle => {}
            _ => {
                return Err(Error::ProtocolError(
                    "send_object called without a matching prior send_object_info".into(),
                )
                .into())
            }
        }

        let (code, _params, _data) = self.engine.command(
            operations::SEND_OBJECT,
            &[],
            Some(bytes),
            false,
            DEFAULT_TIMEOUT_DURATION,
        )?;

        if code != responses::OK {
            return Err(Error::MtpStatus(code).into());
        }

        self.last_sent_object_info = None;
        Ok(())
    }

    /// Large-object (bounded-memory) variant of `get_object`, streaming
    /// `handle`'s bytes to `sink` in fixed-size windows instead of
    /// buffering the whole object. Shares this session's transaction id
    /// sequence with every other command, since the device tracks a
    /// single monotonic counter per session (spec §3/§8).
    #[allow(clippy::too_many_arguments)]
    pub fn download_object(
        &mut self,
        handle: u32,
        device_serial: &str,
        sink: &mut dyn crate::streaming::ChunkSink,
        observer: &mut dyn crate::streaming::ProgressObserver,
        chunk_window_packets: Option<u64>,
        timeout: Option<std::time::Duration>,
    ) -> Result<()> {
        self.require_open()?;
        crate::streaming::download_large_object(
            self.engine.transport(),
            self.engine.tx_counter(),
            handle,
            device_serial,
            sink,
            observer,
            chunk_window_packets,
            timeout,
        )
    }

    pub fn engine(&self) -> &TransactionEngine<T> {
        &self.engine
    }
}

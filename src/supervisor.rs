//! ## Device Supervisor
//!
//! Owns the connect/enumerate/disconnect lifecycle across however many
//! recorders are attached at once. Each device is driven independently
//! behind its own lock; the supervisor never holds a `&mut` reference to
//! more than one device's state at a time and never reaches into an
//! external UI/document store itself; it only publishes [`DeviceEvent`]s
//! to whatever [`DeviceStoreSink`] the caller supplies.
//!

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use log::{error, info, warn};

use crate::config;
use crate::error::Error;
use crate::session::Session;
use crate::transport::BulkTransport;
use crate::types::DeviceAddr;

/// Transient USB bus/address pair identifying a device before its serial
/// number is known.
pub type UsbLocation = DeviceAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Detected,
    Opening,
    Configuring,
    InterfaceClaimed,
    EndpointsKnown,
    SessionOpen,
    Enumerated,
    Ready,
    Closing,
    Faulted,
}

/// Snapshot published to the external store. Intentionally flat and
/// store-agnostic. The supervisor doesn't know or care how this is
/// rendered.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub serial: String,
    pub location: UsbLocation,
    pub state: DeviceState,
    pub storage_ids: Vec<u32>,
}

#[derive(Debug, Clone)]
pub enum DeviceEvent {
    DeviceAdded(DeviceRecord),
    DeviceUpdated(DeviceRecord),
    DeviceRemoved(String),
}

/// External document/UI store boundary. The supervisor core never
/// imports or depends on a concrete store implementation.
pub trait DeviceStoreSink {
    fn publish(&mut self, event: DeviceEvent);
}

struct DeviceHandleState {
    location: UsbLocation,
    serial: Option<String>,
    state: DeviceState,
    session: Option<Session<BulkTransport>>,
    command_file_handle: Option<u32>,
}

/// ### DeviceSupervisor
///
/// Keyed by serial number once known; before that, devices are tracked
/// under a synthetic key derived from their transient USB location. No
/// module-level static state: everything lives behind `devices`.
///
pub struct DeviceSupervisor {
    devices: Mutex<HashMap<String, Mutex<DeviceHandleState>>>,
}

impl Default for DeviceSupervisor {
    fn default() -> Self {
        DeviceSupervisor::new()
    }
}

fn location_key(location: &UsbLocation) -> String {
    format!("loc:{}:{}", location.bus, location.device)
}

impl DeviceSupervisor {
    pub fn new() -> DeviceSupervisor {
        DeviceSupervisor {
            devices: Mutex::new(HashMap::new()),
        }
    }

    /// Run the full connect sequence for a newly detected device: open,
    /// claim, discover endpoints, open an MTP session, enumerate
    /// storages and objects, read `config.txt` for the device's serial
    /// number, and publish the resulting record.
    pub fn on_connect(&self, location: UsbLocation, store: &mut dyn DeviceStoreSink) -> Result<()> {
        let key = location_key(&location);
        {
            let mut devices = self.devices.lock().unwrap();
            devices.insert(
                key.clone(),
                Mutex::new(DeviceHandleState {
                    location,
                    serial: None,
                    state: DeviceState::Detected,
                    session: None,
                    command_file_handle: None,
                }),
            );
        }

        match self.run_connect_sequence(&key, location, store) {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("connect sequence failed for {location:?}: {e}");
                self.mark_faulted(&key);
                Err(e)
            }
        }
    }

    fn run_connect_sequence(
        &self,
        key: &str,
        location: UsbLocation,
        store: &mut dyn DeviceStoreSink,
    ) -> Result<()> {
        self.set_state(key, DeviceState::Opening);
        let transport = BulkTransport::open(location)?;

        self.set_state(key, DeviceState::Configuring);
        self.set_state(key, DeviceState::InterfaceClaimed);
        self.set_state(key, DeviceState::EndpointsKnown);

        let mut session = Session::new(transport);
        session.open_session()?;
        self.set_state(key, DeviceState::SessionOpen);

        let storage_ids = session.get_storage_ids()?;
        for &storage_id in &storage_ids {
            session.get_storage_info(storage_id)?;
            let handles = session.get_object_handles(storage_id)?;
            for handle in handles {
                session.get_object_info(handle)?;
            }
        }
        self.set_state(key, DeviceState::Enumerated);

        let serial = self.recover_serial_number(&mut session)?;

        let devices = self.devices.lock().unwrap();
        let entry_mutex = devices.get(key).ok_or_else(|| {
            Error::ProtocolError("device entry vanished mid-connect".to_string())
        })?;
        let mut entry = entry_mutex.lock().unwrap();
        entry.serial = Some(serial.clone());
        entry.state = DeviceState::Ready;
        entry.session = Some(session);
        let record = DeviceRecord {
            serial: serial.clone(),
            location,
            state: DeviceState::Ready,
            storage_ids,
        };
        drop(entry);
        drop(devices);

        let previously_known = self.rekey_under_serial(key, &serial);
        info!("device ready: serial={serial} location={location:?}");
        store.publish(if previously_known {
            DeviceEvent::DeviceUpdated(record)
        } else {
            DeviceEvent::DeviceAdded(record)
        });

        Ok(())
    }

    fn recover_serial_number(&self, session: &mut Session<BulkTransport>) -> Result<String> {
        for storage in &session.storages {
            for object in &storage.objects {
                if let Some(info) = &object.info {
                    if info.filename.eq_ignore_ascii_case("config.txt") {
                        let bytes = session.get_object(object.handle)?;
                        let text = String::from_utf8_lossy(&bytes);
                        let map = config::parse_config(&text);
                        return map
                            .get("SerialNumber")
                            .cloned()
                            .ok_or_else(|| Error::ParseError("config.txt missing SerialNumber".into()).into());
                    }
                }
            }
        }
        Err(Error::ParseError("no config.txt found while enumerating device".into()).into())
    }

    /// Move a device entry keyed by its transient location key onto its
    /// now-known serial number, merging with any previously known entry
    /// under that serial. Returns whether the serial was already known.
    fn rekey_under_serial(&self, old_key: &str, serial: &str) -> bool {
        let mut devices = self.devices.lock().unwrap();
        if old_key == serial {
            return false;
        }
        let Some(entry) = devices.remove(old_key) else {
            return false;
        };
        let previously_known = devices.contains_key(serial);
        devices.insert(serial.to_string(), entry);
        previously_known
    }

    fn set_state(&self, key: &str, state: DeviceState) {
        let devices = self.devices.lock().unwrap();
        if let Some(entry) = devices.get(key) {
            entry.lock().unwrap().state = state;
        }
    }

    fn mark_faulted(&self, key: &str) {
        let devices = self.devices.lock().unwrap();
        if let Some(entry) = devices.get(key) {
            let mut entry = entry.lock().unwrap();
            entry.state = DeviceState::Faulted;
            entry.session = None;
        }
    }

    /// Converge a device to `Closing`, attempting `CloseSession` only if
    /// a session was ever opened, then remove it and publish
    /// `DeviceRemoved`.
    pub fn on_disconnect(&self, serial_or_location: &str, store: &mut dyn DeviceStoreSink) -> Result<()> {
        self.close_and_remove(serial_or_location, store)
    }

    /// Soft-eject a device: same closing sequence as disconnect, keyed
    /// strictly by serial.
    pub fn on_eject(&self, serial: &str, store: &mut dyn DeviceStoreSink) -> Result<()> {
        self.close_and_remove(serial, store)
    }

    fn close_and_remove(&self, key: &str, store: &mut dyn DeviceStoreSink) -> Result<()> {
        self.set_state(key, DeviceState::Closing);

        let entry = {
            let mut devices = self.devices.lock().unwrap();
            devices.remove(key)
        };

        let Some(entry) = entry else {
            warn!("disconnect/eject requested for unknown device key {key}");
            return Ok(());
        };

        let mut entry = entry.into_inner().unwrap();
        if let Some(session) = entry.session.as_mut() {
            if matches!(
                entry.state,
                DeviceState::SessionOpen | DeviceState::Enumerated | DeviceState::Ready
            ) {
                if let Err(e) = session.close_session() {
                    warn!("close_session failed during disconnect of {key}: {e}");
                }
            }
        }

        let serial = entry.serial.unwrap_or_else(|| key.to_string());
        store.publish(DeviceEvent::DeviceRemoved(serial));
        Ok(())
    }

    /// Upload (or replace) `command.txt` in a device's active storage:
    /// delete any existing handle for it, announce the new object, then
    /// send its bytes.
    pub fn upload_command_file(&self, serial: &str, bytes: &[u8]) -> Result<()> {
        let devices = self.devices.lock().unwrap();
        let entry_mutex = devices
            .get(serial)
            .ok_or_else(|| Error::ProtocolError(format!("unknown device serial {serial}")))?;
        let mut entry = entry_mutex.lock().unwrap();

        let session = entry
            .session
            .as_mut()
            .ok_or_else(|| Error::ProtocolError(format!("device {serial} has no open session")))?;

        let storage_id = session
            .storages
            .first()
            .map(|s| s.id)
            .ok_or_else(|| Error::ProtocolError(format!("device {serial} has no known storage")))?;

        let existing_handle = session
            .storages
            .iter()
            .flat_map(|s| s.objects.iter())
            .find(|o| {
                o.info
                    .as_ref()
                    .map(|i| i.filename.eq_ignore_ascii_case("command.txt"))
                    .unwrap_or(false)
            })
            .map(|o| o.handle);

        if let Some(handle) = existing_handle {
            match session.delete_object(handle) {
                Ok(()) => {}
                Err(e) => return Err(e),
            }
        }

        let new_handle = session.send_object_info(storage_id, "command.txt", bytes.len() as u32)?;
        session.send_object(new_handle, bytes)?;
        entry.command_file_handle = Some(new_handle);

        Ok(())
    }
}

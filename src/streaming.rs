//! ## Large-Object Streaming
//!
//! A chunked variant of `GetObject` for multi-megabyte recordings: peak
//! memory is bounded to one chunk window regardless of object size,
//! with progress reported throughout and durability handed off to an
//! external [`ChunkSink`]. Normally invoked via
//! [`crate::session::Session::download_object`], which shares the
//! session's transaction id counter with this call instead of handing
//! it a fresh one.
//!

use std::time::{Duration, Instant};

use anyhow::Result;
use log::{debug, info, warn};

use crate::codec::container::{self, ContainerType};
use crate::constants::misc::{DEFAULT_CHUNK_WINDOW_PACKETS, DEFAULT_DOWNLOAD_TIMEOUT_DURATION, MTP_PACKET_MAX_SIZE};
use crate::constants::{operations, responses};
use crate::error::Error;
use crate::transport::BulkTransportLike;
use crate::types::TxCounter;

/// Receives successive chunks of a large object as they're flushed out
/// of the in-memory buffer. Implementors decide where the bytes land
/// (disk, network, etc.); the core never holds a whole object at once.
pub trait ChunkSink {
    fn append(&mut self, device_serial: &str, blob_index: u32, bytes: &[u8]) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Started,
    Running,
    Finished,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Progress {
    pub bytes_transferred: u64,
    pub bytes_total: u64,
    pub percent: u8,
    pub phase: Phase,
    pub started_at: Instant,
    pub finished_at: Option<Instant>,
}

pub trait ProgressObserver {
    fn on_progress(&mut self, progress: &Progress);
}

/// Stream `handle`'s bytes to `sink` in chunks of roughly
/// `chunk_window_packets * 512` bytes, reporting progress to `observer`
/// throughout. Bounded by `timeout` on every individual bulk-IN read;
/// the wire protocol itself has no notion of a transfer timeout, so
/// callers must supply one (spec design note: "implementers MUST add
/// one").
pub fn download_large_object<T: BulkTransportLike>(
    transport: &T,
    tx_counter: &TxCounter,
    handle: u32,
    device_serial: &str,
    sink: &mut dyn ChunkSink,
    observer: &mut dyn ProgressObserver,
    chunk_window_packets: Option<u64>,
    timeout: Option<Duration>,
) -> Result<()> {
    let chunk_window_packets = chunk_window_packets.unwrap_or(DEFAULT_CHUNK_WINDOW_PACKETS);
    let timeout = timeout.unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT_DURATION);
    transport.set_timeout(timeout);

    let tx_id = tx_counter.next();
    transport.send(&container::encode_command(operations::GET_OBJECT, tx_id, &[handle]))?;

    let started_at = Instant::now();
    let first_raw = transport.recv()?;
    let first = container::decode(&first_raw)?;
    if first.kind != ContainerType::Data {
        return Err(Error::ProtocolError(format!(
            "expected Data container opening GetObject, got {:?}",
            first.kind
        ))
        .into());
    }

    let declared_total = (first.length as usize).saturating_sub(crate::constants::misc::CONTAINER_HEADER_SIZE) as u64;
    let first_payload_len = first.body.len() as u64;

    info!("downloading object 0x{handle:08X}: {declared_total} bytes declared");
    observer.on_progress(&Progress {
        bytes_transferred: 0,
        bytes_total: declared_total,
        percent: 0,
        phase: Phase::Started,
        started_at,
        finished_at: None,
    });

    let expected_packets = if declared_total > first_payload_len {
        ((declared_total - first_payload_len) + MTP_PACKET_MAX_SIZE as u64 - 1) / MTP_PACKET_MAX_SIZE as u64
    } else {
        0
    };

    let mut buffer = first.body;
    let mut bytes_transferred = first_payload_len;
    let mut packets_read: u64 = 0;
    let mut blob_index: u32 = 0;
    let was_first_packet_short = first_raw.len() < MTP_PACKET_MAX_SIZE;

    let report = |observer: &mut dyn ProgressObserver, bytes_transferred: u64| {
        let percent = if expected_packets == 0 {
            100
        } else {
            ((packets_read * 100) / expected_packets).min(100) as u8
        };
        observer.on_progress(&Progress {
            bytes_transferred,
            bytes_total: declared_total,
            percent,
            phase: Phase::Running,
            started_at,
            finished_at: None,
        });
    };

    if !was_first_packet_short && bytes_transferred < declared_total {
        loop {
            let chunk = transport.recv()?;
            let is_short = chunk.len() < MTP_PACKET_MAX_SIZE;
            bytes_transferred += chunk.len() as u64;
            packets_read += 1;
            buffer.extend_from_slice(&chunk);
            report(observer, bytes_transferred);

            if packets_read % chunk_window_packets == 0 {
                debug!("flushing chunk window {blob_index} ({} bytes)", buffer.len());
                sink.append(device_serial, blob_index, &buffer)?;
                blob_index += 1;
                buffer.clear();
            }

            if is_short || bytes_transferred >= declared_total {
                break;
            }
        }
    }

    // Consume the trailing short/zero-length terminator packet.
    let trailer = transport.recv()?;
    if !trailer.is_empty() {
        warn!("unexpected non-empty trailer packet ({} bytes) after GetObject data phase", trailer.len());
        buffer.extend_from_slice(&trailer);
    }

    if !buffer.is_empty() {
        sink.append(device_serial, blob_index, &buffer)?;
    }

    let response_raw = transport.recv()?;
    let response = container::decode(&response_raw)?;
    if response.kind != ContainerType::Response || response.tx_id != tx_id {
        return Err(Error::ProtocolError("GetObject data phase not followed by a matching Response".into()).into());
    }

    let code = response.code;
    if code != responses::OK {
        observer.on_progress(&Progress {
            bytes_transferred,
            bytes_total: declared_total,
            percent: 100,
            phase: Phase::Failed,
            started_at,
            finished_at: Some(Instant::now()),
        });
        return Err(Error::MtpStatus(code).into());
    }

    observer.on_progress(&Progress {
        bytes_transferred,
        bytes_total: declared_total,
        percent: 100,
        phase: Phase::Finished,
        started_at,
        finished_at: Some(Instant::now()),
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::FakeTransport;

    struct VecSink {
        chunks: Vec<(u32, Vec<u8>)>,
    }

    impl ChunkSink for VecSink {
        fn append(&mut self, _device_serial: &str, blob_index: u32, bytes: &[u8]) -> Result<()> {
            self.chunks.push((blob_index, bytes.to_vec()));
            Ok(())
        }
    }

    struct RecordingObserver {
        phases: Vec<Phase>,
    }

    impl ProgressObserver for RecordingObserver {
        fn on_progress(&mut self, progress: &Progress) {
            self.phases.push(progress.phase);
        }
    }

    fn response_bytes(op: u16, tx_id: u32, code: u16) -> Vec<u8> {
        let mut bytes = container::encode_command(op, tx_id, &[]);
        bytes[4] = ContainerType::Response as u8;
        bytes[5] = 0;
        bytes[6..8].copy_from_slice(&code.to_le_bytes());
        bytes
    }

    #[test]
    fn downloads_a_small_object_closed_by_the_first_packet() {
        let transport = FakeTransport::new();
        let payload = vec![0x5Au8; 100];
        let mut data = container::encode_data_header(operations::GET_OBJECT, 0, payload.len() as u32).to_vec();
        data.extend_from_slice(&payload);
        transport.push_in(data);
        transport.push_in(vec![]); // trailing terminator read
        transport.push_in(response_bytes(operations::GET_OBJECT, 0, responses::OK));

        let tx_counter = TxCounter::new();
        let mut sink = VecSink { chunks: Vec::new() };
        let mut observer = RecordingObserver { phases: Vec::new() };

        download_large_object(&transport, &tx_counter, 7, "SN123", &mut sink, &mut observer, None, None).unwrap();

        assert_eq!(sink.chunks.len(), 1);
        assert_eq!(sink.chunks[0].1, payload);
        assert_eq!(observer.phases.last(), Some(&Phase::Finished));
    }

    #[test]
    fn flushes_a_chunk_window_before_the_final_flush() {
        let transport = FakeTransport::new();

        let first_payload = vec![1u8; 500];
        let mut first = container::encode_data_header(operations::GET_OBJECT, 0, 1012).to_vec();
        first.extend_from_slice(&first_payload);
        transport.push_in(first);

        transport.push_in(vec![2u8; 512]); // packet 1, triggers window flush at window size 1
        transport.push_in(vec![3u8; 0]); // trailing terminator for exact-multiple total
        transport.push_in(response_bytes(operations::GET_OBJECT, 0, responses::OK));

        let tx_counter = TxCounter::new();
        let mut sink = VecSink { chunks: Vec::new() };
        let mut observer = RecordingObserver { phases: Vec::new() };

        download_large_object(&transport, &tx_counter, 7, "SN123", &mut sink, &mut observer, Some(1), None).unwrap();

        assert_eq!(sink.chunks.len(), 1);
        assert_eq!(sink.chunks[0].0, 0);
        assert_eq!(sink.chunks[0].1.len(), 1012);
    }

    #[test]
    fn surfaces_an_mtp_error_response_as_failed() {
        let transport = FakeTransport::new();
        let payload = vec![0u8; 10];
        let mut data = container::encode_data_header(operations::GET_OBJECT, 0, payload.len() as u32).to_vec();
        data.extend_from_slice(&payload);
        transport.push_in(data);
        transport.push_in(vec![]);
        transport.push_in(response_bytes(operations::GET_OBJECT, 0, 0x2019));

        let tx_counter = TxCounter::new();
        let mut sink = VecSink { chunks: Vec::new() };
        let mut observer = RecordingObserver { phases: Vec::new() };

        let result = download_large_object(&transport, &tx_counter, 7, "SN123", &mut sink, &mut observer, None, None);
        assert!(result.is_err());
        assert_eq!(observer.phases.last(), Some(&Phase::Failed));
    }
}

//! ## Transaction Engine
//!
//! Drives one Command/Data/Response transaction over a
//! [`BulkTransportLike`] transport: transaction id assignment, Data-out
//! chunking, Data-in accumulation, and the Data/Response reordering that
//! this device family's firmware requires callers to tolerate.
//!

use std::time::Duration;

use anyhow::Result;
use log::{debug, trace, warn};

use crate::codec::container::{self, Container, ContainerType};
use crate::constants::misc::{FIRST_DATA_OUT_PAYLOAD_SIZE, MTP_PACKET_MAX_SIZE};
use crate::error::Error;
use crate::transport::BulkTransportLike;
use crate::types::TxCounter;

/// Subsequent Data-out packets after the first carry no header, so the
/// full packet is payload.
const BULK_PAYLOAD_SIZE: usize = MTP_PACKET_MAX_SIZE;

/// Result of one full transaction: the Response code, its up-to-five
/// packed parameters, and the accumulated Data-in payload if any.
pub type TransactionResult = (u16, Vec<u32>, Option<Vec<u8>>);

/// ### TransactionEngine
///
/// One engine per claimed device. Not reentrant: callers (the Session,
/// and above it the Supervisor's per-device lock) are responsible for
/// serializing `command()` calls against a single engine the same way
/// they'd serialize any other `&self`-method type wrapping shared state.
///
#[derive(Debug, Clone)]
pub struct TransactionEngine<T: BulkTransportLike> {
    transport: T,
    tx_counter: TxCounter,
}

impl<T: BulkTransportLike> TransactionEngine<T> {
    pub fn new(transport: T) -> TransactionEngine<T> {
        TransactionEngine {
            transport,
            tx_counter: TxCounter::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The transaction id counter backing this engine, so a streaming
    /// download sharing this engine's transport can keep issuing ids
    /// from the same sequence instead of starting a fresh one.
    pub fn tx_counter(&self) -> &TxCounter {
        &self.tx_counter
    }

    /// Run one full transaction and return `(response_code, response_params, data_in)`.
    pub fn command(
        &self,
        op: u16,
        params: &[u32],
        data_out: Option<&[u8]>,
        expect_data_in: bool,
        timeout: Duration,
    ) -> Result<TransactionResult> {
        let tx_id = self.tx_counter.next();
        self.transport.set_timeout(timeout);

        debug!("command 0x{op:04X} tx_id={tx_id} params={params:?}");
        self.transport.send(&container::encode_command(op, tx_id, params))?;

        if let Some(bytes) = data_out {
            self.send_data_phase(op, tx_id, bytes)?;
        }

        let (data, response) = if expect_data_in {
            self.read_data_and_response(op, tx_id)?
        } else {
            let raw = self.transport.recv()?;
            let container = container::decode(&raw)?;
            if container.kind != ContainerType::Response {
                return Err(Error::ProtocolError(format!(
                    "expected Response for op 0x{op:04X}, got {:?}",
                    container.kind
                ))
                .into());
            }
            (None, container)
        };

        if response.tx_id != tx_id {
            return Err(Error::ProtocolError(format!(
                "response tx_id {} does not match command tx_id {tx_id}",
                response.tx_id
            ))
            .into());
        }

        Ok((response.code, response.params(), data))
    }

    /// Write a Data-out phase. The first packet carries up to 500
    /// payload bytes alongside the 12-byte header; subsequent packets
    /// carry up to 512 bytes each. A trailing zero-length write
    /// terminates the phase when the total on-wire length is an exact
    /// multiple of 512.
    fn send_data_phase(&self, op: u16, tx_id: u32, bytes: &[u8]) -> Result<()> {
        let header = container::encode_data_header(op, tx_id, bytes.len() as u32);

        let first_len = bytes.len().min(FIRST_DATA_OUT_PAYLOAD_SIZE);
        let mut packet = header.to_vec();
        packet.extend_from_slice(&bytes[..first_len]);
        self.transport.send(&packet)?;

        let mut offset = first_len;
        while offset < bytes.len() {
            let end = (offset + BULK_PAYLOAD_SIZE).min(bytes.len());
            self.transport.send(&bytes[offset..end])?;
            offset = end;
        }

        let total_on_wire = crate::constants::misc::CONTAINER_HEADER_SIZE + bytes.len();
        if total_on_wire % MTP_PACKET_MAX_SIZE == 0 {
            self.transport.send(&[])?;
        }

        Ok(())
    }

    /// Read the two terminal packets of a Data-in transaction: the Data
    /// phase and the Response. Per spec §4.4/§9, USB buffering on the
    /// host side means these two may be observed in either order, so the
    /// very first read is not assumed to be Data; it is bucketed by
    /// container type and the other one is read afterward.
    fn read_data_and_response(&self, op: u16, tx_id: u32) -> Result<(Option<Vec<u8>>, Container)> {
        let first_raw = self.transport.recv()?;
        let first = container::decode(&first_raw)?;

        match first.kind {
            ContainerType::Response => {
                // Response arrived before its Data phase; the Data
                // container still has to follow before the transaction
                // is fully drained off the wire.
                let data_raw = self.transport.recv()?;
                let data_container = container::decode(&data_raw)?;
                if data_container.kind != ContainerType::Data {
                    return Err(Error::ProtocolError(format!(
                        "expected Data container after a reordered Response for op 0x{op:04X}, got {:?}",
                        data_container.kind
                    ))
                    .into());
                }
                if data_container.tx_id != tx_id {
                    return Err(Error::ProtocolError(format!(
                        "data tx_id {} does not match command tx_id {tx_id}",
                        data_container.tx_id
                    ))
                    .into());
                }
                let data = self.accumulate_data_phase(op, &data_raw, data_container)?;
                Ok((Some(data), first))
            }
            ContainerType::Data => {
                if first.tx_id != tx_id {
                    return Err(Error::ProtocolError(format!(
                        "data tx_id {} does not match command tx_id {tx_id}",
                        first.tx_id
                    ))
                    .into());
                }
                let data = self.accumulate_data_phase(op, &first_raw, first)?;

                let resp_raw = self.transport.recv()?;
                let response = container::decode(&resp_raw)?;
                if response.kind != ContainerType::Response {
                    warn!("unexpected container type {:?} while reading Response for op 0x{op:04X}", response.kind);
                    return Err(Error::ProtocolError(format!(
                        "expected Response after Data phase for op 0x{op:04X}, got {:?}",
                        response.kind
                    ))
                    .into());
                }
                Ok((Some(data), response))
            }
            other => Err(Error::ProtocolError(format!(
                "expected Data or Response container for op 0x{op:04X}, got {other:?}"
            ))
            .into()),
        }
    }

    /// Accumulate a Data-in phase starting from its already-decoded first
    /// packet, reading further 512-byte continuation transfers (which
    /// carry no Container header of their own) until the declared length
    /// is reached or a short packet marks the end.
    fn accumulate_data_phase(&self, op: u16, first_raw: &[u8], first: Container) -> Result<Vec<u8>> {
        let declared_total = first.length as usize;
        let was_short_packet = first_raw.len() < MTP_PACKET_MAX_SIZE;
        let mut buffer = first.body;

        let header_size = crate::constants::misc::CONTAINER_HEADER_SIZE;
        if was_short_packet || buffer.len() >= declared_total.saturating_sub(header_size) {
            trace!("data phase for op 0x{op:04X} closed by first packet ({} bytes)", buffer.len());
            return Ok(buffer);
        }

        let target = declared_total - header_size;
        loop {
            let chunk = self.transport.recv()?;
            let is_short = chunk.len() < MTP_PACKET_MAX_SIZE;
            buffer.extend_from_slice(&chunk);
            if is_short || buffer.len() >= target {
                break;
            }
        }
        buffer.truncate(target);

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::operations;
    use crate::constants::responses;
    use crate::transport::fake::FakeTransport;

    fn response_bytes(op: u16, tx_id: u32, code: u16, params: &[u32]) -> Vec<u8> {
        let mut bytes = container::encode_command(op, tx_id, params);
        // encode_command stamps type=Command (1); patch to Response (3).
        bytes[4] = ContainerType::Response as u8;
        bytes[5] = 0;
        bytes[6..8].copy_from_slice(&code.to_le_bytes());
        bytes
    }

    #[test]
    fn close_session_round_trips_with_no_data_phase() {
        let transport = FakeTransport::new();
        transport.push_in(response_bytes(operations::CLOSE_SESSION, 0, responses::OK, &[]));

        let engine = TransactionEngine::new(transport);
        let (code, params, data) = engine
            .command(operations::CLOSE_SESSION, &[], None, false, Duration::from_secs(1))
            .unwrap();

        assert_eq!(code, responses::OK);
        assert!(params.is_empty());
        assert!(data.is_none());
    }

    #[test]
    fn open_session_uses_transaction_id_zero_exactly_once() {
        let transport = FakeTransport::new();
        transport.push_in(response_bytes(operations::OPEN_SESSION, 0, responses::OK, &[]));
        let engine = TransactionEngine::new(transport);

        engine
            .command(operations::OPEN_SESSION, &[1], None, false, Duration::from_secs(1))
            .unwrap();

        let sent = engine.transport().drain_out();
        let command = container::decode(&sent[0]).unwrap();
        assert_eq!(command.tx_id, 0);
    }

    #[test]
    fn subsequent_commands_increment_transaction_id() {
        let transport = FakeTransport::new();
        transport.push_in(response_bytes(operations::OPEN_SESSION, 0, responses::OK, &[]));
        transport.push_in(response_bytes(operations::CLOSE_SESSION, 1, responses::OK, &[]));
        let engine = TransactionEngine::new(transport);

        engine
            .command(operations::OPEN_SESSION, &[1], None, false, Duration::from_secs(1))
            .unwrap();
        engine
            .command(operations::CLOSE_SESSION, &[], None, false, Duration::from_secs(1))
            .unwrap();

        let sent = engine.transport().drain_out();
        assert_eq!(container::decode(&sent[0]).unwrap().tx_id, 0);
        assert_eq!(container::decode(&sent[2]).unwrap().tx_id, 1);
    }

    #[test]
    fn data_in_phase_closed_by_a_short_first_packet() {
        let transport = FakeTransport::new();
        let payload = vec![0xAB; 16];
        let mut data_packet = container::encode_data_header(operations::GET_STORAGE_INFO, 3, payload.len() as u32).to_vec();
        data_packet.extend_from_slice(&payload);
        transport.push_in(data_packet);
        transport.push_in(response_bytes(operations::GET_STORAGE_INFO, 3, responses::OK, &[]));

        let engine = TransactionEngine::new(transport);
        let (code, _params, data) = engine
            .command(operations::GET_STORAGE_INFO, &[1], None, true, Duration::from_secs(1))
            .unwrap();

        assert_eq!(code, responses::OK);
        assert_eq!(data.unwrap(), payload);
    }

    #[test]
    fn data_in_phase_then_response_completes_transaction() {
        let transport = FakeTransport::new();
        let payload = vec![7u8; 8];
        let mut data_packet = container::encode_data_header(operations::GET_OBJECT_INFO, 2, payload.len() as u32).to_vec();
        data_packet.extend_from_slice(&payload);

        transport.push_in(data_packet);
        transport.push_in(response_bytes(operations::GET_OBJECT_INFO, 2, responses::OK, &[]));

        let engine = TransactionEngine::new(transport);
        let (code, _params, data) = engine
            .command(operations::GET_OBJECT_INFO, &[5], None, true, Duration::from_secs(1))
            .unwrap();
        assert_eq!(code, responses::OK);
        assert_eq!(data.unwrap(), payload);
    }

    #[test]
    fn terminal_read_rejects_a_stray_data_container_after_completion() {
        let transport = FakeTransport::new();
        let payload = vec![7u8; 8];
        let mut data_packet = container::encode_data_header(operations::GET_OBJECT_INFO, 2, payload.len() as u32).to_vec();
        data_packet.extend_from_slice(&payload);

        transport.push_in(data_packet.clone());
        // An extra, unexpected Data container before the Response.
        transport.push_in(data_packet);
        transport.push_in(response_bytes(operations::GET_OBJECT_INFO, 2, responses::OK, &[]));

        let engine = TransactionEngine::new(transport);
        let result = engine.command(operations::GET_OBJECT_INFO, &[5], None, true, Duration::from_secs(1));
        assert!(result.is_err());
    }

    #[test]
    fn data_in_transaction_tolerates_response_arriving_before_data() {
        let transport = FakeTransport::new();
        let payload = vec![9u8; 10];
        let mut data_packet = container::encode_data_header(operations::GET_OBJECT_INFO, 6, payload.len() as u32).to_vec();
        data_packet.extend_from_slice(&payload);

        // Response queued ahead of its own Data phase.
        transport.push_in(response_bytes(operations::GET_OBJECT_INFO, 6, responses::OK, &[]));
        transport.push_in(data_packet);

        let engine = TransactionEngine::new(transport);
        let (code, _params, data) = engine
            .command(operations::GET_OBJECT_INFO, &[5], None, true, Duration::from_secs(1))
            .unwrap();
        assert_eq!(code, responses::OK);
        assert_eq!(data.unwrap(), payload);
    }

    #[test]
    fn rejects_a_response_whose_tx_id_does_not_match() {
        let transport = FakeTransport::new();
        transport.push_in(response_bytes(operations::CLOSE_SESSION, 99, responses::OK, &[]));
        let engine = TransactionEngine::new(transport);

        let result = engine.command(operations::CLOSE_SESSION, &[], None, false, Duration::from_secs(1));
        assert!(result.is_err());
    }

    #[test]
    fn data_out_phase_splits_across_first_and_subsequent_packets() {
        let transport = FakeTransport::new();
        transport.push_in(response_bytes(operations::SEND_OBJECT, 4, responses::OK, &[]));
        let engine = TransactionEngine::new(transport);

        let payload = vec![0x11u8; 800];
        engine
            .command(operations::SEND_OBJECT, &[], Some(&payload), false, Duration::from_secs(1))
            .unwrap();

        let sent = engine.transport().drain_out();
        // command + first data packet (500 bytes) + remainder (300 bytes)
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[1].len(), 12 + FIRST_DATA_OUT_PAYLOAD_SIZE);
        assert_eq!(sent[2].len(), 300);
    }

    #[test]
    fn data_out_phase_emits_trailing_zero_length_packet_on_exact_multiple() {
        let transport = FakeTransport::new();
        transport.push_in(response_bytes(operations::SEND_OBJECT, 4, responses::OK, &[]));
        let engine = TransactionEngine::new(transport);

        // 500 (first) + 12 (remaining slack) = 512 total on wire exactly.
        let payload = vec![0x22u8; 500];
        engine
            .command(operations::SEND_OBJECT, &[], Some(&payload), false, Duration::from_secs(1))
            .unwrap();

        let sent = engine.transport().drain_out();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[1].len(), 12 + FIRST_DATA_OUT_PAYLOAD_SIZE);
        assert!(sent[2].is_empty());
    }
}

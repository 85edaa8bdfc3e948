//! ## Container Codec
//!
//! Encode/decode MTP Container packets: a 12-byte header (length, type,
//! code, transaction id) followed by up to five 32-bit parameters
//! (Command/Response) or an opaque payload (Data). Little-endian
//! throughout.
//!

use crate::constants::misc::CONTAINER_HEADER_SIZE;
use crate::error::Error;

/// MTP Container type, carried in bytes 4..5 of every Container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerType {
    Command = 1,
    Data = 2,
    Response = 3,
    Event = 4,
}

impl ContainerType {
    pub fn from_u16(v: u16) -> Result<ContainerType, Error> {
        match v {
            1 => Ok(ContainerType::Command),
            2 => Ok(ContainerType::Data),
            3 => Ok(ContainerType::Response),
            4 => Ok(ContainerType::Event),
            other => Err(Error::ProtocolError(format!(
                "unknown container type {other}"
            ))),
        }
    }
}

/// A decoded Container packet.
#[derive(Debug, Clone)]
pub struct Container {
    /// Declared total length, including the 12-byte header.
    pub length: u32,
    pub kind: ContainerType,
    pub code: u16,
    pub tx_id: u32,
    /// Whatever bytes followed the header in the buffer handed to
    /// `decode`: for Command/Response this is the packed parameter list,
    /// for Data it is the payload (possibly a prefix of it, if the full
    /// Data phase spans more than one bulk read).
    pub body: Vec<u8>,
}

impl Container {
    /// Decode the packed 32-bit parameters out of a Command/Response body.
    pub fn params(&self) -> Vec<u32> {
        self.body
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }
}

/// Encode a Command Container with up to five 32-bit parameters.
pub fn encode_command(op: u16, tx_id: u32, params: &[u32]) -> Vec<u8> {
    let length = CONTAINER_HEADER_SIZE as u32 + 4 * params.len() as u32;
    let mut out = Vec::with_capacity(length as usize);
    out.extend_from_slice(&length.to_le_bytes());
    out.extend_from_slice(&(ContainerType::Command as u16).to_le_bytes());
    out.extend_from_slice(&op.to_le_bytes());
    out.extend_from_slice(&tx_id.to_le_bytes());
    for p in params {
        out.extend_from_slice(&p.to_le_bytes());
    }
    out
}

/// Encode the 12-byte header that opens a Data phase of `total_len` bytes.
pub fn encode_data_header(op: u16, tx_id: u32, total_len: u32) -> [u8; 12] {
    let length = CONTAINER_HEADER_SIZE as u32 + total_len;
    let mut header = [0u8; 12];
    header[0..4].copy_from_slice(&length.to_le_bytes());
    header[4..6].copy_from_slice(&(ContainerType::Data as u16).to_le_bytes());
    header[6..8].copy_from_slice(&op.to_le_bytes());
    header[8..12].copy_from_slice(&tx_id.to_le_bytes());
    header
}

/// Decode a Container from a raw bulk-read buffer.
///
/// If `bytes` is longer than the declared `length`, it is trimmed (a
/// short terminating packet can arrive concatenated with USB framing).
/// If `bytes` is shorter than `length`, the returned `body` holds only
/// what arrived; the caller is responsible for continuing to read (the
/// Data phase aggregator does this for Data containers).
pub fn decode(bytes: &[u8]) -> Result<Container, Error> {
    if bytes.len() < CONTAINER_HEADER_SIZE {
        return Err(Error::ProtocolError(format!(
            "container shorter than header: {} bytes",
            bytes.len()
        )));
    }

    let length = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let kind = ContainerType::from_u16(u16::from_le_bytes([bytes[4], bytes[5]]))?;
    let code = u16::from_le_bytes([bytes[6], bytes[7]]);
    let tx_id = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);

    let declared_total = (length as usize).max(CONTAINER_HEADER_SIZE);
    let body = if bytes.len() > declared_total {
        bytes[CONTAINER_HEADER_SIZE..declared_total].to_vec()
    } else {
        bytes[CONTAINER_HEADER_SIZE..].to_vec()
    };

    Ok(Container {
        length,
        kind,
        code,
        tx_id,
        body,
    })
}

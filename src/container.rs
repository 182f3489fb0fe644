//! MTP container framing.
//!
//! Every bulk transfer carries containers with a 12-byte header:
//! u32 total length (header included), u16 type, u16 code, u32 transaction
//! id, all little-endian. Command and Response containers carry up to five
//! u32 parameters; Data containers carry an opaque payload.

use crate::consts::CONTAINER_HEADER_SIZE;
use crate::error::Error;

/// Parameter area limit for Command and Response containers.
const MAX_PARAMS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Command,
    Data,
    Response,
    Event,
}

impl ContainerKind {
    pub fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(ContainerKind::Command),
            2 => Some(ContainerKind::Data),
            3 => Some(ContainerKind::Response),
            4 => Some(ContainerKind::Event),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            ContainerKind::Command => 1,
            ContainerKind::Data => 2,
            ContainerKind::Response => 3,
            ContainerKind::Event => 4,
        }
    }
}

/// A decoded container. `payload` holds the body bytes actually received,
/// which for a multi-packet data phase is only the start of the stream.
#[derive(Debug)]
pub struct Container {
    pub kind: ContainerKind,
    pub code: u16,
    pub tx_id: u32,
    pub payload: Vec<u8>,
    declared_len: u32,
}

impl Container {
    /// Total body length promised by the header.
    pub fn declared_payload_len(&self) -> usize {
        self.declared_len as usize - CONTAINER_HEADER_SIZE
    }

    /// Body bytes the header promises but this buffer did not carry.
    pub fn remaining(&self) -> usize {
        self.declared_payload_len().saturating_sub(self.payload.len())
    }

    /// Interpret the payload as u32 parameters.
    pub fn params(&self) -> Result<Vec<u32>, Error> {
        if self.payload.len() % 4 != 0 || self.payload.len() > MAX_PARAMS * 4 {
            return Err(Error::Protocol(format!(
                "bad parameter area length {}",
                self.payload.len()
            )));
        }
        Ok(self
            .payload
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

fn header(total_len: usize, kind: ContainerKind, code: u16, tx_id: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(total_len);
    buf.extend_from_slice(&(total_len as u32).to_le_bytes());
    buf.extend_from_slice(&kind.as_u16().to_le_bytes());
    buf.extend_from_slice(&code.to_le_bytes());
    buf.extend_from_slice(&tx_id.to_le_bytes());
    buf
}

/// Frame a Command container with its parameters.
pub fn encode_command(op: u16, tx_id: u32, params: &[u32]) -> Vec<u8> {
    debug_assert!(params.len() <= MAX_PARAMS);
    let mut buf = header(
        CONTAINER_HEADER_SIZE + 4 * params.len(),
        ContainerKind::Command,
        op,
        tx_id,
    );
    for p in params {
        buf.extend_from_slice(&p.to_le_bytes());
    }
    buf
}

/// Frame a complete Data container. The caller splits the result into
/// bulk-sized writes; the header always travels in the first write.
pub fn encode_data(op: u16, tx_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut buf = header(
        CONTAINER_HEADER_SIZE + payload.len(),
        ContainerKind::Data,
        op,
        tx_id,
    );
    buf.extend_from_slice(payload);
    buf
}

/// Decode one received buffer into a container.
///
/// Buffers longer than the declared length are trimmed (USB framing may
/// concatenate a short container with trailing bytes). A buffer shorter
/// than the declared length is the start of a multi-packet data phase;
/// `remaining()` reports how much is still on the wire.
pub fn decode(bytes: &[u8]) -> Result<Container, Error> {
    if bytes.len() < CONTAINER_HEADER_SIZE {
        return Err(Error::Protocol(format!(
            "container too short: {} bytes",
            bytes.len()
        )));
    }
    let declared_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if (declared_len as usize) < CONTAINER_HEADER_SIZE {
        return Err(Error::Protocol(format!(
            "container declares impossible length {declared_len}"
        )));
    }
    let raw_kind = u16::from_le_bytes([bytes[4], bytes[5]]);
    let kind = ContainerKind::from_u16(raw_kind)
        .ok_or_else(|| Error::Protocol(format!("unknown container type {raw_kind}")))?;
    let code = u16::from_le_bytes([bytes[6], bytes[7]]);
    let tx_id = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);

    let end = bytes.len().min(declared_len as usize);
    Ok(Container {
        kind,
        code,
        tx_id,
        payload: bytes[CONTAINER_HEADER_SIZE..end].to_vec(),
        declared_len,
    })
}

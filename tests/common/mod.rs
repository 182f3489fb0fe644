//! Shared helpers for driving a scripted transport: device-side frames
//! are built by hand so the tests do not lean on the codec under test.

#![allow(dead_code)]

use byteorder::{LittleEndian, WriteBytesExt};

use recorder_mtp::consts::{filesystem_type, storage_type, FORMAT_UNDEFINED};
use recorder_mtp::dataset::encode_mtp_string;

/// A Response container as a device would frame it.
pub fn response(code: u16, tx_id: u32, params: &[u32]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&((12 + 4 * params.len()) as u32).to_le_bytes());
    buf.extend_from_slice(&3u16.to_le_bytes());
    buf.extend_from_slice(&code.to_le_bytes());
    buf.extend_from_slice(&tx_id.to_le_bytes());
    for p in params {
        buf.extend_from_slice(&p.to_le_bytes());
    }
    buf
}

/// A full Data container frame (header plus payload, unsplit).
pub fn data_frame(op: u16, tx_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12 + payload.len());
    buf.extend_from_slice(&((12 + payload.len()) as u32).to_le_bytes());
    buf.extend_from_slice(&2u16.to_le_bytes());
    buf.extend_from_slice(&op.to_le_bytes());
    buf.extend_from_slice(&tx_id.to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Count-prefixed u32 array payload (storage ids, object handles).
pub fn u32_array(values: &[u32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + 4 * values.len());
    buf.extend_from_slice(&(values.len() as u32).to_le_bytes());
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf
}

/// StorageInfo dataset payload.
pub fn storage_info_payload(
    capacity: u64,
    free: u64,
    description: &str,
    label: &str,
) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_u16::<LittleEndian>(storage_type::FIXED_RAM).unwrap();
    buf.write_u16::<LittleEndian>(filesystem_type::GENERIC_FLAT).unwrap();
    buf.write_u16::<LittleEndian>(0x0000).unwrap(); // read-write
    buf.write_u64::<LittleEndian>(capacity).unwrap();
    buf.write_u64::<LittleEndian>(free).unwrap();
    buf.write_u32::<LittleEndian>(0).unwrap();
    encode_mtp_string(&mut buf, description).unwrap();
    encode_mtp_string(&mut buf, label).unwrap();
    buf
}

/// ObjectInfo dataset payload for a plain file.
pub fn object_info_payload(storage_id: u32, name: &str, size: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_u32::<LittleEndian>(storage_id).unwrap();
    buf.write_u16::<LittleEndian>(FORMAT_UNDEFINED).unwrap();
    buf.write_u16::<LittleEndian>(0).unwrap();
    buf.write_u32::<LittleEndian>(size).unwrap();
    buf.write_u16::<LittleEndian>(FORMAT_UNDEFINED).unwrap(); // thumb format
    for _ in 0..6 {
        buf.write_u32::<LittleEndian>(0).unwrap(); // thumb and image fields
    }
    buf.write_u32::<LittleEndian>(0).unwrap(); // parent object
    buf.write_u16::<LittleEndian>(0).unwrap(); // association type
    buf.write_u32::<LittleEndian>(0).unwrap(); // association desc
    buf.write_u32::<LittleEndian>(0).unwrap(); // sequence
    encode_mtp_string(&mut buf, name).unwrap();
    encode_mtp_string(&mut buf, "20240210T091500").unwrap();
    encode_mtp_string(&mut buf, "20240210T101500").unwrap();
    encode_mtp_string(&mut buf, "").unwrap();
    buf
}

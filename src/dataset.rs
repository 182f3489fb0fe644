//! MTP dataset structures: variable-length strings, DateTime strings,
//! StorageInfo and ObjectInfo.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::consts::FORMAT_UNDEFINED;
use crate::error::Error;

fn truncated(what: &str) -> Error {
    Error::Parse(format!("truncated {what} dataset"))
}

/// Append an MTP string: one length byte counting UTF-16 code units
/// including the NUL terminator, then UTF-16LE code units. The empty
/// string encodes as a single zero byte.
pub fn encode_mtp_string(out: &mut Vec<u8>, s: &str) -> Result<(), Error> {
    if s.is_empty() {
        out.push(0);
        return Ok(());
    }
    let units: Vec<u16> = s.encode_utf16().collect();
    if units.len() + 1 > u8::MAX as usize {
        return Err(Error::Parse(format!(
            "string too long for MTP encoding: {} UTF-16 units",
            units.len()
        )));
    }
    out.push((units.len() + 1) as u8);
    for u in units {
        out.extend_from_slice(&u.to_le_bytes());
    }
    out.extend_from_slice(&[0, 0]);
    Ok(())
}

/// Read an MTP string at the cursor position.
pub fn decode_mtp_string(cur: &mut Cursor<&[u8]>) -> Result<String, Error> {
    let units = cur.read_u8().map_err(|_| truncated("string"))?;
    if units == 0 {
        return Ok(String::new());
    }
    let mut data = Vec::with_capacity(units as usize - 1);
    for _ in 0..units - 1 {
        data.push(
            cur.read_u16::<LittleEndian>()
                .map_err(|_| truncated("string"))?,
        );
    }
    // consume the NUL terminator counted by the length byte
    cur.read_u16::<LittleEndian>()
        .map_err(|_| truncated("string"))?;
    String::from_utf16(&data).map_err(|_| Error::Parse("invalid UTF-16 string".into()))
}

/// Check the MTP DateTime syntax `YYYYMMDDThhmmss` with an optional
/// tenth-of-second suffix `.s`.
pub fn is_mtp_datetime(s: &str) -> bool {
    let b = s.as_bytes();
    if b.len() != 15 && b.len() != 17 {
        return false;
    }
    let digits = |r: std::ops::Range<usize>| b[r].iter().all(u8::is_ascii_digit);
    if !digits(0..8) || b[8] != b'T' || !digits(9..15) {
        return false;
    }
    b.len() == 15 || (b[15] == b'.' && b[16].is_ascii_digit())
}

/// StorageInfo dataset, kept raw apart from the derived `used` figure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageInfo {
    pub storage_type: u16,
    pub filesystem_type: u16,
    pub access_capability: u16,
    pub max_capacity: u64,
    pub free_space: u64,
    pub free_space_in_images: u32,
    pub description: String,
    pub volume_label: String,
}

impl StorageInfo {
    pub fn decode(buf: &[u8]) -> Result<StorageInfo, Error> {
        let mut cur = Cursor::new(buf);
        Ok(StorageInfo {
            storage_type: cur.read_u16::<LittleEndian>().map_err(|_| truncated("StorageInfo"))?,
            filesystem_type: cur.read_u16::<LittleEndian>().map_err(|_| truncated("StorageInfo"))?,
            access_capability: cur.read_u16::<LittleEndian>().map_err(|_| truncated("StorageInfo"))?,
            max_capacity: cur.read_u64::<LittleEndian>().map_err(|_| truncated("StorageInfo"))?,
            free_space: cur.read_u64::<LittleEndian>().map_err(|_| truncated("StorageInfo"))?,
            free_space_in_images: cur.read_u32::<LittleEndian>().map_err(|_| truncated("StorageInfo"))?,
            description: decode_mtp_string(&mut cur)?,
            volume_label: decode_mtp_string(&mut cur)?,
        })
    }

    /// Bytes in use on the volume.
    pub fn used(&self) -> u64 {
        self.max_capacity.saturating_sub(self.free_space)
    }
}

/// ObjectInfo dataset. The fixed prefix is 52 bytes; four MTP strings
/// follow (file name, created, modified, keywords).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectInfo {
    pub storage_id: u32,
    pub format: u16,
    pub protection_status: u16,
    pub compressed_size: u32,
    pub thumb_format: u16,
    pub thumb_compressed_size: u32,
    pub thumb_pix_width: u32,
    pub thumb_pix_height: u32,
    pub image_pix_width: u32,
    pub image_pix_height: u32,
    pub image_bit_depth: u32,
    pub parent_object: u32,
    pub association_type: u16,
    pub association_desc: u32,
    pub sequence_number: u32,
    pub file_name: String,
    pub date_created: String,
    pub date_modified: String,
    pub keywords: String,
}

impl ObjectInfo {
    /// Dataset for uploading an opaque file of `size` bytes. The thumb
    /// format mirrors the object format; the recorders reject datasets
    /// where byte 13 differs from the captures of the stock host tool.
    pub fn for_upload(file_name: &str, size: u32) -> ObjectInfo {
        ObjectInfo {
            format: FORMAT_UNDEFINED,
            compressed_size: size,
            thumb_format: FORMAT_UNDEFINED,
            file_name: file_name.to_owned(),
            ..ObjectInfo::default()
        }
    }

    pub fn decode(buf: &[u8]) -> Result<ObjectInfo, Error> {
        let mut cur = Cursor::new(buf);
        Ok(ObjectInfo {
            storage_id: cur.read_u32::<LittleEndian>().map_err(|_| truncated("ObjectInfo"))?,
            format: cur.read_u16::<LittleEndian>().map_err(|_| truncated("ObjectInfo"))?,
            protection_status: cur.read_u16::<LittleEndian>().map_err(|_| truncated("ObjectInfo"))?,
            compressed_size: cur.read_u32::<LittleEndian>().map_err(|_| truncated("ObjectInfo"))?,
            thumb_format: cur.read_u16::<LittleEndian>().map_err(|_| truncated("ObjectInfo"))?,
            thumb_compressed_size: cur.read_u32::<LittleEndian>().map_err(|_| truncated("ObjectInfo"))?,
            thumb_pix_width: cur.read_u32::<LittleEndian>().map_err(|_| truncated("ObjectInfo"))?,
            thumb_pix_height: cur.read_u32::<LittleEndian>().map_err(|_| truncated("ObjectInfo"))?,
            image_pix_width: cur.read_u32::<LittleEndian>().map_err(|_| truncated("ObjectInfo"))?,
            image_pix_height: cur.read_u32::<LittleEndian>().map_err(|_| truncated("ObjectInfo"))?,
            image_bit_depth: cur.read_u32::<LittleEndian>().map_err(|_| truncated("ObjectInfo"))?,
            parent_object: cur.read_u32::<LittleEndian>().map_err(|_| truncated("ObjectInfo"))?,
            association_type: cur.read_u16::<LittleEndian>().map_err(|_| truncated("ObjectInfo"))?,
            association_desc: cur.read_u32::<LittleEndian>().map_err(|_| truncated("ObjectInfo"))?,
            sequence_number: cur.read_u32::<LittleEndian>().map_err(|_| truncated("ObjectInfo"))?,
            file_name: decode_mtp_string(&mut cur)?,
            date_created: decode_mtp_string(&mut cur)?,
            date_modified: decode_mtp_string(&mut cur)?,
            keywords: decode_mtp_string(&mut cur)?,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        for date in [&self.date_created, &self.date_modified] {
            if !date.is_empty() && !is_mtp_datetime(date) {
                return Err(Error::Parse(format!("invalid MTP DateTime {date:?}")));
            }
        }
        let mut out = Vec::with_capacity(64 + 2 * self.file_name.len());
        out.write_u32::<LittleEndian>(self.storage_id).ok();
        out.write_u16::<LittleEndian>(self.format).ok();
        out.write_u16::<LittleEndian>(self.protection_status).ok();
        out.write_u32::<LittleEndian>(self.compressed_size).ok();
        out.write_u16::<LittleEndian>(self.thumb_format).ok();
        out.write_u32::<LittleEndian>(self.thumb_compressed_size).ok();
        out.write_u32::<LittleEndian>(self.thumb_pix_width).ok();
        out.write_u32::<LittleEndian>(self.thumb_pix_height).ok();
        out.write_u32::<LittleEndian>(self.image_pix_width).ok();
        out.write_u32::<LittleEndian>(self.image_pix_height).ok();
        out.write_u32::<LittleEndian>(self.image_bit_depth).ok();
        out.write_u32::<LittleEndian>(self.parent_object).ok();
        out.write_u16::<LittleEndian>(self.association_type).ok();
        out.write_u32::<LittleEndian>(self.association_desc).ok();
        out.write_u32::<LittleEndian>(self.sequence_number).ok();
        encode_mtp_string(&mut out, &self.file_name)?;
        encode_mtp_string(&mut out, &self.date_created)?;
        encode_mtp_string(&mut out, &self.date_modified)?;
        encode_mtp_string(&mut out, &self.keywords)?;
        Ok(out)
    }
}

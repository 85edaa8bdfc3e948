//! ## Dataset Codec
//!
//! Encode/decode the MTP dataset structures this profile needs:
//! variable-length strings, DateTime strings, `StorageInfo`, and
//! `ObjectInfo`.
//!

use crate::constants::OBJECT_INFO_RESERVED_BYTE_13;
use crate::error::Error;

/// Encode an MTP string: one length-prefix byte (UTF-16 code units
/// including the null terminator) followed by that many UTF-16LE code
/// units. An empty string is a single zero byte.
pub fn encode_mtp_string(s: &str) -> Result<Vec<u8>, Error> {
    if s.is_empty() {
        return Ok(vec![0x00]);
    }

    let units: Vec<u16> = s.encode_utf16().collect();
    let len_with_terminator = units.len() + 1;
    // The length prefix is one byte; a string cannot carry more than 254
    // content code units plus the terminator.
    if len_with_terminator > 255 {
        return Err(Error::ParseError(format!(
            "mtp string has {} code units, exceeding the 254 a one-byte length prefix can carry",
            units.len()
        )));
    }

    let mut out = Vec::with_capacity(1 + len_with_terminator * 2);
    out.push(len_with_terminator as u8);
    for unit in &units {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out.extend_from_slice(&0u16.to_le_bytes());
    Ok(out)
}

/// Parse an MTP string from the start of `bytes`.
///
/// Returns the decoded string and the number of bytes consumed, so
/// callers can walk a buffer holding several concatenated strings (as
/// `ObjectInfo` does).
pub fn parse_mtp_string(bytes: &[u8]) -> Result<(String, usize), Error> {
    let count = *bytes
        .first()
        .ok_or_else(|| Error::ParseError("mtp string missing length prefix".into()))?
        as usize;

    if count == 0 {
        return Ok((String::new(), 1));
    }

    let needed = 1 + count * 2;
    if bytes.len() < needed {
        return Err(Error::ParseError(format!(
            "mtp string declares {count} code units but only {} bytes available",
            bytes.len() - 1
        )));
    }

    let units: Vec<u16> = bytes[1..needed]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();

    // Drop the trailing null terminator before decoding.
    let content = &units[..units.len().saturating_sub(1)];
    let s = String::from_utf16(content)
        .map_err(|e| Error::ParseError(format!("invalid utf-16 in mtp string: {e}")))?;

    Ok((s, needed))
}

/// An MTP DateTime value: `YYYYMMDDThhmmss(.s)?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MtpDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub tenths: Option<u8>,
}

/// Validate and parse an MTP DateTime string.
pub fn parse_mtp_datetime(s: &str) -> Result<MtpDateTime, Error> {
    let bad = || Error::ParseError(format!("malformed mtp datetime: {s:?}"));

    if s.len() < 15 || s.as_bytes()[8] != b'T' {
        return Err(bad());
    }
    let digits_only = |slice: &str| slice.chars().all(|c| c.is_ascii_digit());

    let date = &s[0..8];
    let time = &s[9..15];
    if !digits_only(date) || !digits_only(time) {
        return Err(bad());
    }

    let tenths = if s.len() == 15 {
        None
    } else if s.len() == 17 && s.as_bytes()[15] == b'.' && s.as_bytes()[16].is_ascii_digit() {
        Some(s[16..17].parse().map_err(|_| bad())?)
    } else {
        return Err(bad());
    };

    Ok(MtpDateTime {
        year: date[0..4].parse().map_err(|_| bad())?,
        month: date[4..6].parse().map_err(|_| bad())?,
        day: date[6..8].parse().map_err(|_| bad())?,
        hour: time[0..2].parse().map_err(|_| bad())?,
        minute: time[2..4].parse().map_err(|_| bad())?,
        second: time[4..6].parse().map_err(|_| bad())?,
        tenths,
    })
}

/// Format an `MtpDateTime` back to its wire string form.
pub fn format_mtp_datetime(dt: &MtpDateTime) -> String {
    let mut out = format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}",
        dt.year, dt.month, dt.day, dt.hour, dt.minute, dt.second
    );
    if let Some(tenths) = dt.tenths {
        out.push('.');
        out.push_str(&tenths.to_string());
    }
    out
}

/// In-memory projection of the `StorageInfo` dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageInfo {
    pub storage_type: u16,
    pub filesystem_type: u16,
    pub access_capability: u16,
    pub max_capacity: u64,
    pub free_space: u64,
    pub free_space_in_objects: u32,
    pub description: String,
    pub volume_id: String,
}

impl StorageInfo {
    pub fn used_space(&self) -> u64 {
        self.max_capacity.saturating_sub(self.free_space)
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.storage_type.to_le_bytes());
        out.extend_from_slice(&self.filesystem_type.to_le_bytes());
        out.extend_from_slice(&self.access_capability.to_le_bytes());
        out.extend_from_slice(&self.max_capacity.to_le_bytes());
        out.extend_from_slice(&self.free_space.to_le_bytes());
        out.extend_from_slice(&self.free_space_in_objects.to_le_bytes());
        out.extend_from_slice(&encode_mtp_string(&self.description)?);
        out.extend_from_slice(&encode_mtp_string(&self.volume_id)?);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<StorageInfo, Error> {
        if bytes.len() < 26 {
            return Err(Error::ParseError(
                "storage info shorter than fixed prefix".into(),
            ));
        }

        let storage_type = u16::from_le_bytes([bytes[0], bytes[1]]);
        let filesystem_type = u16::from_le_bytes([bytes[2], bytes[3]]);
        let access_capability = u16::from_le_bytes([bytes[4], bytes[5]]);
        let max_capacity = u64::from_le_bytes(bytes[6..14].try_into().unwrap());
        let free_space = u64::from_le_bytes(bytes[14..22].try_into().unwrap());
        let free_space_in_objects = u32::from_le_bytes(bytes[22..26].try_into().unwrap());

        let mut offset = 26;
        let (description, consumed) = parse_mtp_string(&bytes[offset..])?;
        offset += consumed;
        let (volume_id, consumed) = parse_mtp_string(&bytes[offset..])?;
        offset += consumed;
        let _ = offset;

        Ok(StorageInfo {
            storage_type,
            filesystem_type,
            access_capability,
            max_capacity,
            free_space,
            free_space_in_objects,
            description,
            volume_id,
        })
    }
}

/// In-memory projection of the `ObjectInfo` dataset.
///
/// The 52-byte fixed prefix is honored byte-for-byte at the offsets the
/// spec fixes: format at 4..6, payload size at 8..12, association-type at
/// 42..44, association-description at 44..48. Byte 13 carries a fixed
/// `0x30` observed in working captures and is preserved unchanged; its
/// meaning is not known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub storage_id: u32,
    pub format: u16,
    pub protection_status: u16,
    pub size: u32,
    pub thumb_format: u16,
    pub thumb_compressed_size: u32,
    pub thumb_pix_width: u32,
    pub thumb_pix_height: u32,
    pub image_pix_width: u32,
    pub image_pix_height: u32,
    pub image_bit_depth: u32,
    pub parent: u32,
    pub association_type: u16,
    pub association_desc: u32,
    pub sequence_number: u32,
    pub filename: String,
    pub date_created: String,
    pub date_modified: String,
    pub keywords: String,
}

const OBJECT_INFO_PREFIX_LEN: usize = 52;

impl ObjectInfo {
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut prefix = [0u8; OBJECT_INFO_PREFIX_LEN];
        prefix[0..4].copy_from_slice(&self.storage_id.to_le_bytes());
        prefix[4..6].copy_from_slice(&self.format.to_le_bytes());
        prefix[6..8].copy_from_slice(&self.protection_status.to_le_bytes());
        prefix[8..12].copy_from_slice(&self.size.to_le_bytes());
        prefix[12..14].copy_from_slice(&self.thumb_format.to_le_bytes());
        prefix[13] = OBJECT_INFO_RESERVED_BYTE_13;
        prefix[14..18].copy_from_slice(&self.thumb_compressed_size.to_le_bytes());
        prefix[18..22].copy_from_slice(&self.thumb_pix_width.to_le_bytes());
        prefix[22..26].copy_from_slice(&self.thumb_pix_height.to_le_bytes());
        prefix[26..30].copy_from_slice(&self.image_pix_width.to_le_bytes());
        prefix[30..34].copy_from_slice(&self.image_pix_height.to_le_bytes());
        prefix[34..38].copy_from_slice(&self.image_bit_depth.to_le_bytes());
        prefix[38..42].copy_from_slice(&self.parent.to_le_bytes());
        prefix[42..44].copy_from_slice(&self.association_type.to_le_bytes());
        prefix[44..48].copy_from_slice(&self.association_desc.to_le_bytes());
        prefix[48..52].copy_from_slice(&self.sequence_number.to_le_bytes());

        let mut out = Vec::with_capacity(OBJECT_INFO_PREFIX_LEN + 32);
        out.extend_from_slice(&prefix);
        out.extend_from_slice(&encode_mtp_string(&self.filename)?);
        out.extend_from_slice(&encode_mtp_string(&self.date_created)?);
        out.extend_from_slice(&encode_mtp_string(&self.date_modified)?);
        out.extend_from_slice(&encode_mtp_string(&self.keywords)?);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<ObjectInfo, Error> {
        if bytes.len() < OBJECT_INFO_PREFIX_LEN {
            return Err(Error::ParseError(
                "object info shorter than fixed prefix".into(),
            ));
        }

        let storage_id = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let format = u16::from_le_bytes([bytes[4], bytes[5]]);
        let protection_status = u16::from_le_bytes([bytes[6], bytes[7]]);
        let size = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let thumb_format = u16::from_le_bytes([bytes[12], bytes[13]]);
        let thumb_compressed_size = u32::from_le_bytes(bytes[14..18].try_into().unwrap());
        let thumb_pix_width = u32::from_le_bytes(bytes[18..22].try_into().unwrap());
        let thumb_pix_height = u32::from_le_bytes(bytes[22..26].try_into().unwrap());
        let image_pix_width = u32::from_le_bytes(bytes[26..30].try_into().unwrap());
        let image_pix_height = u32::from_le_bytes(bytes[30..34].try_into().unwrap());
        let image_bit_depth = u32::from_le_bytes(bytes[34..38].try_into().unwrap());
        let parent = u32::from_le_bytes(bytes[38..42].try_into().unwrap());
        let association_type = u16::from_le_bytes([bytes[42], bytes[43]]);
        let association_desc = u32::from_le_bytes(bytes[44..48].try_into().unwrap());
        let sequence_number = u32::from_le_bytes(bytes[48..52].try_into().unwrap());

        let mut offset = OBJECT_INFO_PREFIX_LEN;
        let (filename, consumed) = parse_mtp_string(&bytes[offset..])?;
        offset += consumed;
        let (date_created, consumed) = parse_mtp_string(&bytes[offset..])?;
        offset += consumed;
        let (date_modified, consumed) = parse_mtp_string(&bytes[offset..])?;
        offset += consumed;
        let (keywords, _consumed) = parse_mtp_string(&bytes[offset..])?;

        Ok(ObjectInfo {
            storage_id,
            format,
            protection_status,
            size,
            thumb_format,
            thumb_compressed_size,
            thumb_pix_width,
            thumb_pix_height,
            image_pix_width,
            image_pix_height,
            image_bit_depth,
            parent,
            association_type,
            association_desc,
            sequence_number,
            filename,
            date_created,
            date_modified,
            keywords,
        })
    }
}

/// Decode a `count: u32` followed by `count` little-endian 32-bit ids,
/// the wire shape of `GetStorageIDs`/`GetObjectHandles` Data phases.
pub fn decode_u32_array(bytes: &[u8]) -> Result<Vec<u32>, Error> {
    if bytes.len() < 4 {
        return Err(Error::ParseError("u32 array missing count prefix".into()));
    }
    let count = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let needed = 4 + count * 4;
    if bytes.len() < needed {
        return Err(Error::ParseError(format!(
            "u32 array declares {count} entries but only {} bytes available",
            bytes.len() - 4
        )));
    }

    Ok(bytes[4..needed]
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Encode a `count: u32` followed by `count` little-endian 32-bit ids.
pub fn encode_u32_array(values: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + values.len() * 4);
    out.extend_from_slice(&(values.len() as u32).to_le_bytes());
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_a_single_zero_byte() {
        assert_eq!(encode_mtp_string("").unwrap(), vec![0x00]);
        assert_eq!(parse_mtp_string(&[0x00]).unwrap(), (String::new(), 1));
    }

    #[test]
    fn mtp_string_round_trips() {
        for s in ["hello.txt", "π-recording", "日本語ファイル名", "a"] {
            let encoded = encode_mtp_string(s).unwrap();
            let (decoded, consumed) = parse_mtp_string(&encoded).unwrap();
            assert_eq!(decoded, s);
            assert_eq!(consumed, encoded.len());
        }
    }

    #[test]
    fn mtp_string_round_trips_near_length_limit() {
        let s: String = std::iter::repeat('x').take(254).collect();
        let encoded = encode_mtp_string(&s).unwrap();
        assert_eq!(encoded[0], 255);
        let (decoded, _) = parse_mtp_string(&encoded).unwrap();
        assert_eq!(decoded, s);
    }

    #[test]
    fn mtp_string_over_length_limit_is_rejected() {
        let s: String = std::iter::repeat('x').take(255).collect();
        assert!(encode_mtp_string(&s).is_err());
    }

    #[test]
    fn mtp_datetime_round_trips_without_fraction() {
        let dt = parse_mtp_datetime("20240131T235959").unwrap();
        assert_eq!(dt.year, 2024);
        assert_eq!(dt.month, 1);
        assert_eq!(dt.day, 31);
        assert_eq!(format_mtp_datetime(&dt), "20240131T235959");
    }

    #[test]
    fn mtp_datetime_round_trips_with_fraction() {
        let dt = parse_mtp_datetime("20240131T235959.5").unwrap();
        assert_eq!(dt.tenths, Some(5));
        assert_eq!(format_mtp_datetime(&dt), "20240131T235959.5");
    }

    #[test]
    fn mtp_datetime_rejects_malformed_strings() {
        assert!(parse_mtp_datetime("not-a-date").is_err());
        assert!(parse_mtp_datetime("2024013X235959").is_err());
    }

    #[test]
    fn storage_info_round_trips() {
        let info = StorageInfo {
            storage_type: 0x0003,
            filesystem_type: 0x0002,
            access_capability: 0x0000,
            max_capacity: 64_000_000_000,
            free_space: 32_000_000_000,
            free_space_in_objects: 0xFFFFFFFF,
            description: "Internal storage".into(),
            volume_id: "VOL-1".into(),
        };
        let encoded = info.encode().unwrap();
        let decoded = StorageInfo::decode(&encoded).unwrap();
        assert_eq!(decoded, info);
        assert_eq!(decoded.used_space(), 32_000_000_000);
    }

    #[test]
    fn object_info_round_trips_file_name_size_format_and_dates() {
        let info = ObjectInfo {
            storage_id: 0x00010001,
            format: 0x3009,
            protection_status: 0,
            size: 123_456,
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
            filename: "REC0001.WAV".into(),
            date_created: "20240101T120000".into(),
            date_modified: "20240101T120005".into(),
            keywords: "".into(),
        };
        let encoded = info.encode().unwrap();
        let decoded = ObjectInfo::decode(&encoded).unwrap();
        assert_eq!(decoded.filename, info.filename);
        assert_eq!(decoded.size, info.size);
        assert_eq!(decoded.format, info.format);
        assert_eq!(decoded.date_created, info.date_created);
        assert_eq!(decoded.date_modified, info.date_modified);
    }

    #[test]
    fn object_info_preserves_fixed_reserved_byte() {
        let info = ObjectInfo {
            storage_id: 1,
            format: 0x3000,
            protection_status: 0,
            size: 0,
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
            filename: "command.txt".into(),
            date_created: "".into(),
            date_modified: "".into(),
            keywords: "".into(),
        };
        let encoded = info.encode().unwrap();
        assert_eq!(encoded[13], OBJECT_INFO_RESERVED_BYTE_13);
    }

    #[test]
    fn get_storage_ids_scenario_decodes_two_storages() {
        // spec §8 scenario 3
        let bytes = [
            0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x02, 0x00, 0x01, 0x00,
        ];
        let ids = decode_u32_array(&bytes).unwrap();
        assert_eq!(ids, vec![0x00010001, 0x00010002]);
    }

    #[test]
    fn u32_array_round_trips() {
        let values = vec![7, 9, 11];
        let encoded = encode_u32_array(&values);
        assert_eq!(decode_u32_array(&encoded).unwrap(), values);
    }
}

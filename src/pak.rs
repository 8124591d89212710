//! Reader for the archive format (PAK) that bundles the ".e" assets this
//! crate decodes. A PAK file is a fixed 16-byte header, an entry table in
//! one of two historical layouts, and a data region addressed by each
//! entry's offset relative to the end of that table.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

const HEADER_LEN: usize = 16;
const FILENAME_LEN: usize = 128;
const KEY_LEN: usize = 20;

/// The 16-byte PAK header. `magic1`/`magic2`/`magic3` are expected to equal
/// `0x20000`, `0x10`, and `0x0D` respectively; a mismatch is logged but does
/// not prevent parsing, since some archives in the wild carry different
/// values and still unpack correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PakHeader {
    pub magic1: u32,
    pub entry_count: u32,
    pub magic2: u32,
    pub magic3: u32,
}

const EXPECTED_MAGIC1: u32 = 0x20000;
const EXPECTED_MAGIC2: u32 = 0x10;
const EXPECTED_MAGIC3: u32 = 0x0D;
const MAX_SANE_ENTRY_COUNT: u32 = 16384;

/// Which of the two historical entry table layouts an archive uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stride {
    /// 128-byte filename + 4-byte length + 20-byte key + 32-bit offset and dummy.
    Narrow,
    /// Same as [`Stride::Narrow`], but with 64-bit offset and dummy fields.
    Wide,
}

impl Stride {
    fn byte_len(self) -> usize {
        match self {
            Stride::Narrow => 160,
            Stride::Wide => 168,
        }
    }
}

/// A single entry in the archive's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PakEntry {
    /// Normalized relative path (host path separators, leading separator
    /// stripped, NUL-terminated portion of the original 128-byte buffer).
    pub filename: String,
    pub length: u32,
    pub key: [u8; KEY_LEN],
    pub data_offset: u64,
    pub dummy: u64,

    /// True when this entry's key is all zeroes, meaning its filename and
    /// payload bytes were stored without XOR obfuscation.
    pub stored_in_clear: bool,
}

fn read_u32(buf: &[u8], pos: usize) -> Result<u32> {
    buf.get(pos..pos + 4).map(LittleEndian::read_u32).ok_or(Error::UnexpectedEof)
}

fn read_u64(buf: &[u8], pos: usize) -> Result<u64> {
    buf.get(pos..pos + 8).map(LittleEndian::read_u64).ok_or(Error::UnexpectedEof)
}

fn parse_header(bytes: &[u8]) -> Result<PakHeader> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::UnexpectedEof);
    }
    let header = PakHeader {
        magic1: read_u32(bytes, 0)?,
        entry_count: read_u32(bytes, 4)?,
        magic2: read_u32(bytes, 8)?,
        magic3: read_u32(bytes, 12)?,
    };
    if header.magic1 != EXPECTED_MAGIC1 || header.magic2 != EXPECTED_MAGIC2 || header.magic3 != EXPECTED_MAGIC3 {
        log::warn!(
            "PAK signature {:#x}/{:#x}/{:#x} doesn't match the expected format",
            header.magic1,
            header.magic2,
            header.magic3
        );
    }
    if header.entry_count > MAX_SANE_ENTRY_COUNT {
        log::warn!("PAK declares {} entries, is this a supported archive?", header.entry_count);
    }
    Ok(header)
}

/// Reads one raw entry record at `stride`'s layout, without normalizing the
/// filename or XOR-decoding anything yet.
fn read_raw_entry(bytes: &[u8], offset: usize, stride: Stride) -> Result<PakEntry> {
    let record = bytes
        .get(offset..offset + stride.byte_len())
        .ok_or(Error::UnexpectedEof)?;

    let mut filename_buf = [0u8; FILENAME_LEN];
    filename_buf.copy_from_slice(&record[0..FILENAME_LEN]);

    let length = read_u32(record, FILENAME_LEN)?;

    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&record[FILENAME_LEN + 4..FILENAME_LEN + 4 + KEY_LEN]);

    let tail_pos = FILENAME_LEN + 4 + KEY_LEN;
    let (data_offset, dummy) = match stride {
        Stride::Narrow => (
            read_u32(record, tail_pos)? as u64,
            read_u32(record, tail_pos + 4)? as u64,
        ),
        Stride::Wide => (read_u64(record, tail_pos)?, read_u64(record, tail_pos + 8)?),
    };

    let stored_in_clear = key.iter().all(|&b| b == 0);

    Ok(PakEntry {
        filename: decode_filename(&filename_buf, &key, stored_in_clear),
        length,
        key,
        data_offset,
        dummy,
        stored_in_clear,
    })
}

/// XORs `key` against the filename buffer (unless it is stored in the
/// clear), truncates at the first NUL, rewrites `\` as the host separator,
/// then drops the leading byte unconditionally (archive filenames always
/// begin with a path separator, e.g. `\en\texture.dds`).
fn decode_filename(raw: &[u8; FILENAME_LEN], key: &[u8; KEY_LEN], stored_in_clear: bool) -> String {
    let mut buf = *raw;
    if !stored_in_clear {
        xor_with_key(&mut buf, key);
    }

    let nul_pos = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let name = String::from_utf8_lossy(&buf[..nul_pos]).into_owned();
    let name = name.replace('\\', &std::path::MAIN_SEPARATOR.to_string());
    let mut chars = name.chars();
    chars.next();
    chars.as_str().to_string()
}

/// XORs `data` against `key`, cycling the key every 20 bytes. Involutive:
/// calling this twice with the same key restores the original bytes.
pub fn pak_decode_entry(data: &mut [u8], key: &[u8; KEY_LEN]) {
    xor_with_key(data, key);
}

fn xor_with_key(data: &mut [u8], key: &[u8; KEY_LEN]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % KEY_LEN];
    }
}

/// Sums the absolute values of successive differences between `data_offset`
/// read at the 32-bit field position (`narrow`) and at the 64-bit field
/// position (`wide`), over the first `min(entry_count, 64)` entries. The
/// layout whose sum is smaller is the one actually in use: a mismatched
/// layout reads garbage for `data_offset` and so jumps around erratically.
fn detect_stride(bytes: &[u8], entry_count: u32) -> Result<Stride> {
    let sample = entry_count.min(64);
    let mut sum_narrow: u64 = 0;
    let mut sum_wide: u64 = 0;
    let mut last_narrow: u32 = 0;
    let mut last_wide: u32 = 0;

    for i in 0..sample {
        let offset = HEADER_LEN + i as usize * Stride::Wide.byte_len();
        let tail_pos = offset + FILENAME_LEN + 4 + KEY_LEN;

        let val_narrow = read_u32(bytes, tail_pos)?;
        let val_wide = (read_u64(bytes, tail_pos)? >> 32) as u32;

        sum_narrow += abs_diff(val_narrow, last_narrow);
        sum_wide += abs_diff(val_wide, last_wide);
        last_narrow = val_narrow;
        last_wide = val_wide;
    }

    Ok(if sum_narrow < sum_wide { Stride::Narrow } else { Stride::Wide })
}

fn abs_diff(a: u32, b: u32) -> u64 {
    if a > b {
        (a - b) as u64
    } else {
        (b - a) as u64
    }
}

/// Parses a PAK archive's header and entry table. `bytes` only needs to
/// cover the header and table; entry payloads are fetched separately via
/// each entry's `data_offset`, which is relative to the end of the table
/// (`16 + entry_count * stride`).
pub fn pak_parse(bytes: &[u8]) -> Result<(PakHeader, Vec<PakEntry>)> {
    let header = parse_header(bytes)?;

    // Layout detection always samples the table using the wider (64-bit)
    // stride's addressing, since that stride is a superset of the narrow
    // one's byte range and both interpretations can be read from it.
    let stride = detect_stride(bytes, header.entry_count)?;

    let mut entries = Vec::with_capacity(header.entry_count as usize);
    for i in 0..header.entry_count {
        let offset = HEADER_LEN + i as usize * stride.byte_len();
        entries.push(read_raw_entry(bytes, offset, stride)?);
    }

    Ok((header, entries))
}

/// Byte offset, relative to the start of the file, at which entry payloads
/// begin: the header plus the full entry table.
pub fn data_region_start(header: &PakHeader, stride: Stride) -> u64 {
    HEADER_LEN as u64 + header.entry_count as u64 * stride.byte_len() as u64
}

/// Slices `entry`'s payload out of the full archive buffer, bounds-checked
/// against `file.len()`. The slice is still XOR-obfuscated; pass it to
/// [`pak_decode_entry`] (unless `entry.stored_in_clear`) to recover the
/// original bytes.
pub fn pak_entry_payload<'a>(file: &'a [u8], header: &PakHeader, stride: Stride, entry: &PakEntry) -> Result<&'a [u8]> {
    let start = data_region_start(header, stride)
        .checked_add(entry.data_offset)
        .ok_or(Error::UnexpectedEof)?;
    let end = start.checked_add(entry.length as u64).ok_or(Error::UnexpectedEof)?;
    if end > file.len() as u64 {
        return Err(Error::UnexpectedEof);
    }
    Ok(&file[start as usize..end as usize])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_entry(filename: &str, length: u32, key: [u8; KEY_LEN], data_offset: u64, dummy: u64, wide: bool) -> Vec<u8> {
        let mut buf = [0u8; FILENAME_LEN];
        let bytes = filename.as_bytes();
        buf[..bytes.len()].copy_from_slice(bytes);
        if key.iter().any(|&b| b != 0) {
            xor_with_key(&mut buf, &key);
        }

        let mut record = Vec::new();
        record.extend(buf);
        record.extend(length.to_le_bytes());
        record.extend(key);
        if wide {
            record.extend(data_offset.to_le_bytes());
            record.extend(dummy.to_le_bytes());
        } else {
            record.extend((data_offset as u32).to_le_bytes());
            record.extend((dummy as u32).to_le_bytes());
        }
        record
    }

    fn build_archive(entries: &[(String, u32, [u8; KEY_LEN], u64, u64)], wide: bool) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(EXPECTED_MAGIC1.to_le_bytes());
        out.extend((entries.len() as u32).to_le_bytes());
        out.extend(EXPECTED_MAGIC2.to_le_bytes());
        out.extend(EXPECTED_MAGIC3.to_le_bytes());
        for (name, length, key, offset, dummy) in entries {
            out.extend(build_entry(name, *length, *key, *offset, *dummy, wide));
        }
        out
    }

    #[test]
    fn parses_narrow_layout() {
        let entries = vec![
            ("\\a.txt".to_string(), 10u32, [0u8; KEY_LEN], 0u64, 0u64),
            ("\\dir\\b.txt".to_string(), 20u32, [0u8; KEY_LEN], 10u64, 0u64),
        ];
        let archive = build_archive(&entries, false);
        let (header, parsed) = pak_parse(&archive).unwrap();

        assert_eq!(header.entry_count, 2);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].filename, "a.txt");
        assert_eq!(
            parsed[1].filename,
            "dir".to_string() + &std::path::MAIN_SEPARATOR.to_string() + "b.txt"
        );
        assert_eq!(parsed[1].data_offset, 10);
        assert!(parsed[0].stored_in_clear);
    }

    #[test]
    fn parses_wide_layout() {
        // Large offsets (beyond u32 range) only round-trip correctly if the
        // wide layout is the one actually selected by detection.
        let entries = vec![
            ("\\a".to_string(), 1u32, [0u8; KEY_LEN], 0x1_0000_0000u64, 0u64),
            ("\\b".to_string(), 1u32, [0u8; KEY_LEN], 0x1_0000_1000u64, 0u64),
        ];
        let archive = build_archive(&entries, true);
        let (_, parsed) = pak_parse(&archive).unwrap();
        assert_eq!(parsed[0].data_offset, 0x1_0000_0000);
        assert_eq!(parsed[1].data_offset, 0x1_0000_1000);
    }

    #[test]
    fn xor_decode_is_involutive() {
        let key = [7u8; KEY_LEN];
        let original = b"hello world, this spans more than twenty bytes".to_vec();
        let mut data = original.clone();
        pak_decode_entry(&mut data, &key);
        assert_ne!(data, original);
        pak_decode_entry(&mut data, &key);
        assert_eq!(data, original);
    }

    #[test]
    fn filename_with_key_is_xor_decoded_and_normalized() {
        let mut key = [0u8; KEY_LEN];
        key[0] = 0x42;
        let entries = vec![("\\sub\\dir\\file.dat".to_string(), 5u32, key, 0u64, 0u64)];
        let archive = build_archive(&entries, false);
        let (_, parsed) = pak_parse(&archive).unwrap();
        assert_eq!(
            parsed[0].filename,
            "sub/dir/file.dat".replace('/', &std::path::MAIN_SEPARATOR.to_string())
        );
        assert!(!parsed[0].stored_in_clear);
    }

    #[test]
    fn rejects_truncated_header() {
        let short = vec![0u8; 4];
        assert_eq!(pak_parse(&short), Err(Error::UnexpectedEof));
    }

    #[test]
    fn entry_payload_is_sliced_and_bounds_checked() {
        let entries = vec![("\\a.txt".to_string(), 5u32, [0u8; KEY_LEN], 0u64, 0u64)];
        let mut archive = build_archive(&entries, false);
        archive.extend(b"hello");
        let (header, parsed) = pak_parse(&archive).unwrap();

        let payload = pak_entry_payload(&archive, &header, Stride::Narrow, &parsed[0]).unwrap();
        assert_eq!(payload, b"hello");

        let mut too_long = parsed[0].clone();
        too_long.length = 1000;
        assert_eq!(
            pak_entry_payload(&archive, &header, Stride::Narrow, &too_long),
            Err(Error::UnexpectedEof)
        );
    }
}

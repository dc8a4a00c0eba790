//! Record-level reader for Fortran-style unformatted sequential files.
//!
//! Each record on disk is two length-framed segments:
//!
//! ```text
//! [marker][8 header words][marker]  [marker][payload words][marker]
//! ```
//!
//! Neither the byte order nor the word widths are declared anywhere in the
//! file, so both are sniffed from the leading record before any decoding
//! starts. A marker restated at the end of a segment must agree with the
//! leading one; a mismatch means the buffer is corrupt.

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use gcm_common::{PostError, Result};
use tracing::debug;

/// Byte order of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// Width of one stored word in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordWidth {
    W4,
    W8,
}

impl WordWidth {
    /// Width in bytes.
    pub fn bytes(self) -> usize {
        match self {
            Self::W4 => 4,
            Self::W8 => 8,
        }
    }
}

/// Sniffed encoding of one file: byte order plus the widths of record
/// markers, header integers and payload floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoding {
    pub byte_order: ByteOrder,
    pub marker_width: WordWidth,
    pub int_width: WordWidth,
    pub float_width: WordWidth,
}

/// Number of integer words in every record header.
pub const HEADER_WORDS: usize = 8;

/// A record marker is the byte length of the following segment; a
/// legitimate leading marker (8 header words) is a small positive number.
const MAX_PLAUSIBLE_MARKER: u64 = 1024;

/// One decoded record: 8 header words plus the payload widened to f64.
#[derive(Debug, Clone)]
pub struct Record {
    pub header: [i64; HEADER_WORDS],
    pub payload: Vec<f64>,
}

/// Reads length-framed records from an in-memory buffer.
pub struct RecordReader<'a> {
    data: &'a [u8],
    encoding: Encoding,
    offset: usize,
}

impl<'a> RecordReader<'a> {
    /// Sniff the buffer's encoding and position the reader at the first
    /// record. The first record must be the main header whose third
    /// header word carries the number of vertical levels; its payload
    /// length pins down the float width.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(PostError::format("empty input buffer"));
        }
        let encoding = sniff(data)?;
        debug!(?encoding, "sniffed record encoding");
        Ok(Self {
            data,
            encoding,
            offset: 0,
        })
    }

    /// The sniffed encoding.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Current byte offset into the buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// True once every record has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// Read the next record, validating both marker restatements.
    pub fn read_record(&mut self) -> Result<Record> {
        let enc = self.encoding;
        let (header_bytes, mut pos) = read_segment(self.data, self.offset, enc)?;
        let iw = enc.int_width.bytes();
        if header_bytes.len() != HEADER_WORDS * iw {
            return Err(PostError::format(format!(
                "header segment is {} bytes, expected {}",
                header_bytes.len(),
                HEADER_WORDS * iw
            )));
        }
        let mut header = [0i64; HEADER_WORDS];
        for (i, word) in header.iter_mut().enumerate() {
            *word = read_int(&header_bytes[i * iw..], enc.byte_order, enc.int_width);
        }

        let (payload_bytes, end) = read_segment(self.data, pos, enc)?;
        pos = end;
        let fw = enc.float_width.bytes();
        if payload_bytes.len() % fw != 0 {
            return Err(PostError::format(format!(
                "payload segment of {} bytes is not a multiple of the {fw}-byte word",
                payload_bytes.len()
            )));
        }
        let payload = payload_bytes
            .chunks_exact(fw)
            .map(|w| read_float(w, enc.byte_order, enc.float_width))
            .collect();

        self.offset = pos;
        Ok(Record { header, payload })
    }
}

/// Read one `[marker][bytes][marker]` segment, returning the enclosed
/// bytes and the offset just past the trailing marker.
fn read_segment(data: &[u8], offset: usize, enc: Encoding) -> Result<(&[u8], usize)> {
    let mw = enc.marker_width.bytes();
    let lead = read_marker(data, offset, enc)?;
    let body_start = offset + mw;
    let body_end = body_start + lead as usize;
    // The body and its trailing marker must both fit; the trailing
    // marker restates the byte count of the body just read, nothing
    // follows it within the segment.
    if data.len() < body_end + mw {
        return Err(PostError::exhausted_buffer(format!(
            "segment of {lead} bytes at offset {offset} runs past the end of the buffer"
        )));
    }
    let trail = read_marker(data, body_end, enc)?;
    if lead != trail {
        return Err(PostError::format(format!(
            "record marker mismatch at offset {offset}: {lead} != {trail}"
        )));
    }
    Ok((&data[body_start..body_end], body_end + mw))
}

fn read_marker(data: &[u8], offset: usize, enc: Encoding) -> Result<u64> {
    let mw = enc.marker_width.bytes();
    let slice = data
        .get(offset..offset + mw)
        .ok_or_else(|| PostError::exhausted_buffer(format!("marker read at offset {offset}")))?;
    Ok(match (enc.byte_order, enc.marker_width) {
        (ByteOrder::Little, WordWidth::W4) => LittleEndian::read_u32(slice) as u64,
        (ByteOrder::Big, WordWidth::W4) => BigEndian::read_u32(slice) as u64,
        (ByteOrder::Little, WordWidth::W8) => LittleEndian::read_u64(slice),
        (ByteOrder::Big, WordWidth::W8) => BigEndian::read_u64(slice),
    })
}

fn read_int(slice: &[u8], order: ByteOrder, width: WordWidth) -> i64 {
    match (order, width) {
        (ByteOrder::Little, WordWidth::W4) => LittleEndian::read_i32(slice) as i64,
        (ByteOrder::Big, WordWidth::W4) => BigEndian::read_i32(slice) as i64,
        (ByteOrder::Little, WordWidth::W8) => LittleEndian::read_i64(slice),
        (ByteOrder::Big, WordWidth::W8) => BigEndian::read_i64(slice),
    }
}

fn read_float(slice: &[u8], order: ByteOrder, width: WordWidth) -> f64 {
    match (order, width) {
        (ByteOrder::Little, WordWidth::W4) => LittleEndian::read_f32(slice) as f64,
        (ByteOrder::Big, WordWidth::W4) => BigEndian::read_f32(slice) as f64,
        (ByteOrder::Little, WordWidth::W8) => LittleEndian::read_f64(slice),
        (ByteOrder::Big, WordWidth::W8) => BigEndian::read_f64(slice),
    }
}

/// Determine byte order and word widths from the leading record.
///
/// Each (byte order, marker width) candidate is accepted only if the
/// leading marker decodes to a small positive byte count AND the whole
/// first record validates under it: an 8-word header segment with an
/// agreeing trailing marker, a positive level count, and a payload whose
/// byte length divided by the level count is 4 or 8 (the float width).
/// A 4-byte read of zero at the start can only be the high half of an
/// 8-byte big-endian marker, so that candidate is skipped outright.
/// If no candidate validates, or more than one does, the sniff fails
/// with an explicit error instead of guessing.
fn sniff(data: &[u8]) -> Result<Encoding> {
    let mut valid: Vec<Encoding> = Vec::new();

    for byte_order in [ByteOrder::Little, ByteOrder::Big] {
        for marker_width in [WordWidth::W4, WordWidth::W8] {
            if let Some(enc) = validate_candidate(data, byte_order, marker_width) {
                valid.push(enc);
            }
        }
    }

    match valid.len() {
        1 => Ok(valid[0]),
        0 => Err(PostError::format(
            "no plausible record marker in any byte order / word width combination",
        )),
        _ => Err(PostError::format(format!(
            "ambiguous encoding: first record validates as {valid:?}",
        ))),
    }
}

/// Try one (byte order, marker width) interpretation against the first
/// record. Returns the full encoding if everything checks out.
fn validate_candidate(
    data: &[u8],
    byte_order: ByteOrder,
    marker_width: WordWidth,
) -> Option<Encoding> {
    let mw = marker_width.bytes();
    let slice = data.get(..mw)?;
    let marker = match (byte_order, marker_width) {
        (ByteOrder::Little, WordWidth::W4) => LittleEndian::read_u32(slice) as u64,
        (ByteOrder::Big, WordWidth::W4) => BigEndian::read_u32(slice) as u64,
        (ByteOrder::Little, WordWidth::W8) => LittleEndian::read_u64(slice),
        (ByteOrder::Big, WordWidth::W8) => BigEndian::read_u64(slice),
    };
    if marker == 0 || marker >= MAX_PLAUSIBLE_MARKER {
        return None;
    }
    let int_width = match marker as usize / HEADER_WORDS {
        4 => WordWidth::W4,
        8 => WordWidth::W8,
        _ => return None,
    };

    // Provisional encoding to walk the first record's segments; the float
    // width is irrelevant for marker arithmetic.
    let mut enc = Encoding {
        byte_order,
        marker_width,
        int_width,
        float_width: WordWidth::W8,
    };

    let (header_bytes, header_end) = read_segment(data, 0, enc).ok()?;
    if header_bytes.len() != HEADER_WORDS * int_width.bytes() {
        return None;
    }
    let nlev = read_int(
        &header_bytes[2 * int_width.bytes()..],
        byte_order,
        int_width,
    );
    if nlev <= 0 {
        return None;
    }
    let (payload_bytes, _) = read_segment(data, header_end, enc).ok()?;
    if payload_bytes.is_empty() || payload_bytes.len() % nlev as usize != 0 {
        return None;
    }
    enc.float_width = match payload_bytes.len() / nlev as usize {
        4 => WordWidth::W4,
        8 => WordWidth::W8,
        _ => return None,
    };
    Some(enc)
}

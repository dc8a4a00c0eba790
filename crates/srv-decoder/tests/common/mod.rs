//! Synthetic record-stream construction in every encoding the model
//! writes.

/// Byte-level writer parameters: little-endian flag, marker/int width,
/// float width.
#[derive(Debug, Clone, Copy)]
pub struct WireFormat {
    pub little: bool,
    pub word: usize,
    pub float: usize,
}

impl WireFormat {
    pub fn all() -> Vec<WireFormat> {
        let mut out = Vec::new();
        for little in [true, false] {
            for word in [4, 8] {
                for float in [4, 8] {
                    out.push(WireFormat { little, word, float });
                }
            }
        }
        out
    }

    fn push_uint(&self, buf: &mut Vec<u8>, value: u64) {
        match (self.little, self.word) {
            (true, 4) => buf.extend_from_slice(&(value as u32).to_le_bytes()),
            (false, 4) => buf.extend_from_slice(&(value as u32).to_be_bytes()),
            (true, _) => buf.extend_from_slice(&value.to_le_bytes()),
            (false, _) => buf.extend_from_slice(&value.to_be_bytes()),
        }
    }

    fn push_int(&self, buf: &mut Vec<u8>, value: i64) {
        match (self.little, self.word) {
            (true, 4) => buf.extend_from_slice(&(value as i32).to_le_bytes()),
            (false, 4) => buf.extend_from_slice(&(value as i32).to_be_bytes()),
            (true, _) => buf.extend_from_slice(&value.to_le_bytes()),
            (false, _) => buf.extend_from_slice(&value.to_be_bytes()),
        }
    }

    fn push_float(&self, buf: &mut Vec<u8>, value: f64) {
        match (self.little, self.float) {
            (true, 4) => buf.extend_from_slice(&(value as f32).to_le_bytes()),
            (false, 4) => buf.extend_from_slice(&(value as f32).to_be_bytes()),
            (true, _) => buf.extend_from_slice(&value.to_le_bytes()),
            (false, _) => buf.extend_from_slice(&value.to_be_bytes()),
        }
    }

    /// Append one header+payload record pair.
    pub fn push_record(&self, buf: &mut Vec<u8>, header: &[i64; 8], payload: &[f64]) {
        let hlen = (8 * self.word) as u64;
        self.push_uint(buf, hlen);
        for &w in header {
            self.push_int(buf, w);
        }
        self.push_uint(buf, hlen);

        let plen = (payload.len() * self.float) as u64;
        self.push_uint(buf, plen);
        for &v in payload {
            self.push_float(buf, v);
        }
        self.push_uint(buf, plen);
    }
}

//! Shared helpers: synthetic raw-file construction for the end-to-end
//! tests. Files are written little-endian with 4-byte markers and
//! 8-byte floats, one of the encodings the decoder sniffs.

use std::sync::Once;

static INIT: Once = Once::new();

/// Install a test subscriber once so failing runs show their traces.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Append one `[marker][8 ints][marker][marker][floats][marker]` record.
pub fn push_record(buf: &mut Vec<u8>, header: &[i64; 8], payload: &[f64]) {
    let hlen = (8 * 4) as u32;
    buf.extend_from_slice(&hlen.to_le_bytes());
    for &word in header {
        buf.extend_from_slice(&(word as i32).to_le_bytes());
    }
    buf.extend_from_slice(&hlen.to_le_bytes());

    let plen = (payload.len() * 8) as u32;
    buf.extend_from_slice(&plen.to_le_bytes());
    for &value in payload {
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf.extend_from_slice(&plen.to_le_bytes());
}

/// A small model file on an 8 x 16 Gaussian grid, T5, two sigma layers.
pub struct FileBuilder {
    pub nlat: usize,
    pub nlon: usize,
    pub nlev: usize,
    pub ntrunc: usize,
    buf: Vec<u8>,
}

impl FileBuilder {
    pub fn new() -> Self {
        let mut builder = Self {
            nlat: 8,
            nlon: 16,
            nlev: 2,
            ntrunc: 5,
            buf: Vec::new(),
        };
        // Main header record: sigma half levels as the payload.
        let header = [
            333,
            0,
            builder.nlev as i64,
            0,
            builder.nlon as i64,
            builder.nlat as i64,
            builder.ntrunc as i64,
            0,
        ];
        push_record(&mut builder.buf, &header, &[0.5, 1.0]);
        builder
    }

    /// Number of real/imaginary spectral values per level.
    pub fn nspec(&self) -> usize {
        (self.ntrunc + 1) * (self.ntrunc + 2)
    }

    /// One surface grid record with a constant value.
    pub fn surface(mut self, code: i64, step: i64, value: f64) -> Self {
        let header = [
            code,
            0,
            1,
            0,
            self.nlon as i64,
            self.nlat as i64,
            self.ntrunc as i64,
            step,
        ];
        let payload = vec![value; self.nlat * self.nlon];
        push_record(&mut self.buf, &header, &payload);
        self
    }

    /// One leveled spectral record with a constant coefficient value.
    pub fn spectral_leveled(mut self, code: i64, step: i64, value: f64) -> Self {
        let header = [
            code,
            1,
            self.nlev as i64,
            0,
            self.nspec() as i64,
            1,
            self.ntrunc as i64,
            step,
        ];
        let payload = vec![value; self.nlev * self.nspec()];
        push_record(&mut self.buf, &header, &payload);
        self
    }

    /// One leveled grid record with a constant value.
    pub fn leveled(mut self, code: i64, step: i64, value: f64) -> Self {
        let header = [
            code,
            1,
            self.nlev as i64,
            0,
            self.nlon as i64,
            self.nlat as i64,
            self.ntrunc as i64,
            step,
        ];
        let payload = vec![value; self.nlev * self.nlat * self.nlon];
        push_record(&mut self.buf, &header, &payload);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

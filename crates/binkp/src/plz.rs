//! PLZ dataframe compression.
//!
//! When PLZ is negotiated every payload, command and data alike, is an
//! independent zlib stream; the frame header length refers to the
//! compressed size. Each direction owns its own codec so statistics and
//! levels never interleave.
//!
//! Reference: FTS-1029

use std::io::Write;

use flate2::write::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;

use crate::{Error, Result};

/// Default deflate level, matching common mailer practice.
pub const DEFAULT_LEVEL: u32 = 6;

/// Per-direction PLZ codec with byte accounting.
#[derive(Debug)]
pub struct Plz {
    level: Compression,
    /// Plain bytes seen by this direction.
    pub bytes_before: u64,
    /// Compressed bytes produced/consumed by this direction.
    pub bytes_after: u64,
}

impl Plz {
    pub fn new(level: u32) -> Self {
        Plz {
            level: Compression::new(level.min(9)),
            bytes_before: 0,
            bytes_after: 0,
        }
    }

    /// Compresses one payload. The counters only grow, so the
    /// accumulated ratio is monotone in session history.
    pub fn deflate(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(payload.len() / 2 + 16), self.level);
        encoder.write_all(payload)?;
        let out = encoder.finish()?;
        self.bytes_before += payload.len() as u64;
        self.bytes_after += out.len() as u64;
        Ok(out)
    }

    /// Inflates one payload.
    pub fn inflate(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(Vec::with_capacity(payload.len() * 2 + 16));
        decoder
            .write_all(payload)
            .map_err(|e| Error::Protocol(format!("bad PLZ stream: {e}")))?;
        let out = decoder
            .finish()
            .map_err(|e| Error::Protocol(format!("bad PLZ stream: {e}")))?;
        self.bytes_after += payload.len() as u64;
        self.bytes_before += out.len() as u64;
        Ok(out)
    }

    /// Accumulated compression ratio, compressed over plain.
    pub fn ratio(&self) -> f64 {
        if self.bytes_before == 0 {
            1.0
        } else {
            self.bytes_after as f64 / self.bytes_before as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let mut tx = Plz::new(DEFAULT_LEVEL);
        let mut rx = Plz::new(DEFAULT_LEVEL);
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(32);
        let packed = tx.deflate(&payload).unwrap();
        assert!(packed.len() < payload.len());
        assert_eq!(rx.inflate(&packed).unwrap(), payload);
        assert_eq!(tx.bytes_before, payload.len() as u64);
        assert_eq!(rx.bytes_before, payload.len() as u64);
    }

    #[test]
    fn empty_payload_round_trip() {
        let mut tx = Plz::new(DEFAULT_LEVEL);
        let mut rx = Plz::new(DEFAULT_LEVEL);
        let packed = tx.deflate(b"").unwrap();
        assert_eq!(rx.inflate(&packed).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn garbage_is_a_protocol_error() {
        let mut rx = Plz::new(DEFAULT_LEVEL);
        assert!(matches!(
            rx.inflate(b"\xff\xfe\xfd not zlib"),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn ratio_is_monotone_under_accumulation() {
        let mut tx = Plz::new(DEFAULT_LEVEL);
        let compressible = b"aaaaaaaaaaaaaaaa".repeat(64);
        tx.deflate(&compressible).unwrap();
        let first = tx.ratio();
        tx.deflate(&compressible).unwrap();
        let second = tx.ratio();
        // More identical history cannot worsen the accumulated ratio.
        assert!(second <= first + f64::EPSILON);
    }
}

//! CRC32 contexts for frame trailers and whole-file checks.

use crc::{Crc, CRC_32_ISO_HDLC};

/// CRC algorithm shared by the frame trailer and the M_FILE file
/// check. A `static` so incremental digests can borrow it for the
/// whole transfer; the table itself is immutable.
static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// One-shot CRC32 of a buffer.
pub fn checksum(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// An incremental CRC32 accumulator for streamed file data.
///
/// Owned by the transfer that needs it; there is no shared table state.
#[derive(Clone)]
pub struct Crc32Accumulator {
    digest: crc::Digest<'static, u32>,
}

impl Crc32Accumulator {
    pub fn new() -> Self {
        Crc32Accumulator {
            digest: CRC32.digest(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    pub fn finalize(self) -> u32 {
        self.digest.finalize()
    }
}

impl Default for Crc32Accumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Crc32Accumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Crc32Accumulator")
    }
}

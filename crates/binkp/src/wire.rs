//! The binkp wire codec.
//!
//! Frames travel as a 16-bit big-endian length word, whose high bit
//! distinguishes COMMAND from DATA, followed by up to 32 767 payload
//! bytes. The codec layers the negotiated options: PLZ wraps every
//! payload in a zlib stream, and CRC seals data frames and the
//! file-integrity commands with a trailing big-endian CRC32 computed
//! over the plain payload.
//!
//! Built as a [`tokio_util::codec`] pair so short reads and writes are
//! absorbed by the framing buffers; one decoder and one encoder per
//! direction, each owning its own compression context.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::crc32::checksum;
use crate::frame::{Command, Frame, MAX_PAYLOAD};
use crate::plz::Plz;
use crate::{Error, Result};

const COMMAND_BIT: u16 = 0x8000;

/// Data chunk ceiling under PLZ, leaving deflate's worst-case expansion
/// comfortably inside the 15-bit length budget.
const PLZ_CHUNK: usize = 16 * 1024;

/// Per-direction traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub frames: u64,
    pub bytes: u64,
    pub data_bytes: u64,
    pub crc_failures: u64,
    pub plz_bytes_before: u64,
    pub plz_bytes_after: u64,
}

impl LinkStats {
    fn absorb_plz(&mut self, plz: &Plz) {
        self.plz_bytes_before = plz.bytes_before;
        self.plz_bytes_after = plz.bytes_after;
    }
}

/// Decodes inbound frames, inflating PLZ payloads and validating CRC
/// trailers before anything reaches the session layer.
#[derive(Debug, Default)]
pub struct BinkpDecoder {
    crc: bool,
    plz: Option<Plz>,
    stats: LinkStats,
}

impl BinkpDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable_crc(&mut self) {
        self.crc = true;
    }

    pub fn enable_plz(&mut self, level: u32) {
        self.plz = Some(Plz::new(level));
    }

    pub fn stats(&self) -> LinkStats {
        let mut stats = self.stats;
        if let Some(plz) = &self.plz {
            stats.absorb_plz(plz);
        }
        stats
    }
}

impl Decoder for BinkpDecoder {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < 2 {
            return Ok(None);
        }
        let word = u16::from_be_bytes([src[0], src[1]]);
        let is_command = word & COMMAND_BIT != 0;
        let len = (word & !COMMAND_BIT) as usize;
        if src.len() < 2 + len {
            src.reserve(2 + len - src.len());
            return Ok(None);
        }
        src.advance(2);
        let raw = src.split_to(len);

        self.stats.frames += 1;
        self.stats.bytes += 2 + len as u64;

        let payload = match &mut self.plz {
            Some(plz) => plz.inflate(&raw)?,
            None => raw.to_vec(),
        };

        let frame = if is_command {
            if payload.is_empty() {
                return Err(Error::Protocol("empty command frame".into()));
            }
            let command = Command::try_from(payload[0])?;
            let body = self.strip_crc(&payload, matches!(command, Command::File | Command::Got))?;
            let argument: String = body[1..].iter().map(|&b| b as char).collect();
            Frame::Command(command, argument)
        } else {
            let body = self.strip_crc(&payload, true)?;
            self.stats.data_bytes += body.len() as u64;
            Frame::Data(body.to_vec())
        };
        Ok(Some(frame))
    }
}

impl BinkpDecoder {
    /// Splits off and validates the CRC trailer when one is expected,
    /// returning the protected body.
    fn strip_crc<'a>(&mut self, payload: &'a [u8], applies: bool) -> Result<&'a [u8]> {
        if !self.crc || !applies {
            return Ok(payload);
        }
        if payload.len() < 4 {
            self.stats.crc_failures += 1;
            return Err(Error::Integrity("frame too short for CRC trailer".into()));
        }
        let (body, trailer) = payload.split_at(payload.len() - 4);
        let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let actual = checksum(body);
        if actual != expected {
            self.stats.crc_failures += 1;
            return Err(Error::Integrity(format!(
                "frame CRC mismatch: got {actual:08x}, expected {expected:08x}"
            )));
        }
        Ok(body)
    }
}

/// Encodes outbound frames, appending CRC trailers and deflating when
/// the respective options are active.
#[derive(Debug, Default)]
pub struct BinkpEncoder {
    crc: bool,
    plz: Option<Plz>,
    stats: LinkStats,
}

impl BinkpEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable_crc(&mut self) {
        self.crc = true;
    }

    pub fn enable_plz(&mut self, level: u32) {
        self.plz = Some(Plz::new(level));
    }

    pub fn crc_active(&self) -> bool {
        self.crc
    }

    pub fn stats(&self) -> LinkStats {
        let mut stats = self.stats;
        if let Some(plz) = &self.plz {
            stats.absorb_plz(plz);
        }
        stats
    }

    /// Largest file-data block that fits a frame under the currently
    /// active options.
    pub fn max_data_chunk(&self) -> usize {
        let mut budget = MAX_PAYLOAD;
        if self.crc {
            budget -= 4;
        }
        if self.plz.is_some() {
            budget = budget.min(PLZ_CHUNK);
        }
        budget
    }
}

impl Encoder<Frame> for BinkpEncoder {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        let seal = self.crc && frame.carries_crc();
        let (is_command, mut payload) = match frame {
            Frame::Command(command, argument) => {
                let mut payload = Vec::with_capacity(1 + argument.len() + 4);
                payload.push(command as u8);
                payload.extend(argument.chars().map(|c| c as u32 as u8));
                (true, payload)
            }
            Frame::Data(data) => {
                self.stats.data_bytes += data.len() as u64;
                (false, data)
            }
        };
        if seal {
            let crc = checksum(&payload);
            payload.extend_from_slice(&crc.to_be_bytes());
        }
        let wire = match &mut self.plz {
            Some(plz) => plz.deflate(&payload)?,
            None => payload,
        };
        if wire.len() > MAX_PAYLOAD {
            return Err(Error::Protocol(format!(
                "frame payload of {} bytes exceeds the 15-bit length budget",
                wire.len()
            )));
        }

        let word = wire.len() as u16 | if is_command { COMMAND_BIT } else { 0 };
        dst.reserve(2 + wire.len());
        dst.put_u16(word);
        dst.extend_from_slice(&wire);

        self.stats.frames += 1;
        self.stats.bytes += 2 + wire.len() as u64;
        Ok(())
    }
}

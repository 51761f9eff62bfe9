//! [`FixedAscii`] implementation for binrw.

use binrw::{Endian, prelude::*};
use std::fmt;
use std::io::{Read, Seek, Write};

/// A fixed-width text field, NUL-padded on the wire.
///
/// Reads exactly `N` bytes, truncating the value at the first NUL. Writes
/// the value truncated to `N` bytes and padded with NULs. Bytes map
/// through Latin-1 so that arbitrary legacy charset content survives a
/// read/write round trip.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FixedAscii<const N: usize>(String);

impl<const N: usize> FixedAscii<N> {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> BinRead for FixedAscii<N> {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        _: Endian,
        _: Self::Args<'_>,
    ) -> binrw::BinResult<Self> {
        let mut raw = [0u8; N];
        reader.read_exact(&mut raw)?;
        let len = raw.iter().position(|&b| b == 0).unwrap_or(N);
        Ok(FixedAscii(raw[..len].iter().map(|&b| b as char).collect()))
    }
}

impl<const N: usize> BinWrite for FixedAscii<N> {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        _: Endian,
        _: Self::Args<'_>,
    ) -> binrw::BinResult<()> {
        let mut raw = [0u8; N];
        for (slot, ch) in raw.iter_mut().zip(self.0.chars()) {
            *slot = ch as u32 as u8;
        }
        writer.write_all(&raw)?;
        Ok(())
    }
}

impl<const N: usize> From<&str> for FixedAscii<N> {
    fn from(value: &str) -> Self {
        FixedAscii(value.chars().take(N).collect())
    }
}

impl<const N: usize> fmt::Display for FixedAscii<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decodes legacy single-byte text into a `String` through Latin-1.
pub fn latin1_to_string(raw: &[u8]) -> String {
    raw.iter().map(|&b| b as char).collect()
}

/// Encodes a `String` back to legacy single-byte text. Characters above
/// U+00FF have their high bits dropped; FTN content never contains them.
pub fn string_to_latin1(text: &str) -> Vec<u8> {
    text.chars().map(|c| c as u32 as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_stops_at_nul() {
        let mut cursor = Cursor::new(b"secret\0\0".to_vec());
        let field: FixedAscii<8> = FixedAscii::read_le(&mut cursor).unwrap();
        assert_eq!(field.as_str(), "secret");
    }

    #[test]
    fn write_pads_with_nuls() {
        let field = FixedAscii::<8>::from("pw");
        let mut cursor = Cursor::new(Vec::new());
        field.write_le(&mut cursor).unwrap();
        assert_eq!(cursor.into_inner(), b"pw\0\0\0\0\0\0");
    }

    #[test]
    fn over_long_value_truncates() {
        let field = FixedAscii::<4>::from("overflow");
        let mut cursor = Cursor::new(Vec::new());
        field.write_le(&mut cursor).unwrap();
        assert_eq!(cursor.into_inner(), b"over");
    }

    #[test]
    fn high_bytes_round_trip() {
        let raw = vec![0xc0u8, 0xc1, 0xff];
        let text = latin1_to_string(&raw);
        assert_eq!(string_to_latin1(&text), raw);
    }
}

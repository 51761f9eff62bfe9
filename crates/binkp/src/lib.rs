//! binkp protocol engine.
//!
//! Implements the binkp/1.0 session protocol with the CRAM, CRC, NR and
//! PLZ extensions: frame codec, option negotiation, authentication, and
//! the interleaved multi-file transfer batch. The engine is generic over
//! any `AsyncRead + AsyncWrite` stream; [`tcp::connect`] supplies the
//! standard TCP transport.
//!
//! Reference: FTS-1026 (binkp/1.0), FTS-1027 (CRAM), FTS-1028 (NR),
//! FTS-1029 (dataframe compression).

#![forbid(unsafe_code)]

pub mod cram;
pub mod crc32;
pub mod error;
pub mod frame;
pub mod options;
pub mod plz;
pub mod session;
pub mod tcp;
pub mod transfer;
pub mod wire;

pub use error::Error;
pub use frame::{Command, Frame, MAX_PAYLOAD};
pub use options::{NegotiatedOptions, OptionMode, OptionPrefs};
pub use session::{Role, Session, SessionConfig, SessionOutcome};
pub use transfer::{FileToSend, TransferBatch};
pub use wire::{BinkpDecoder, BinkpEncoder, LinkStats};

/// The IANA-assigned binkp port.
pub const DEFAULT_PORT: u16 = 24554;

/// binkp engine result type.
pub type Result<T> = std::result::Result<T, Error>;

pub(crate) mod hex {
    /// Lowercase hex rendering of a byte slice.
    pub fn encode(raw: &[u8]) -> String {
        let mut out = String::with_capacity(raw.len() * 2);
        for byte in raw {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }

    /// Decodes a hex string; `None` on odd length or non-hex digits.
    pub fn decode(text: &str) -> Option<Vec<u8>> {
        if text.len() % 2 != 0 || !text.is_ascii() {
            return None;
        }
        (0..text.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&text[i..i + 2], 16).ok())
            .collect()
    }

}

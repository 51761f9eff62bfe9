//! Session option negotiation.
//!
//! Options are advertised in `M_NUL "OPT ..."` lines during the
//! handshake. An option becomes active iff both sides advertise it; a
//! required option the peer does not advertise aborts the session
//! before any file transfer.

use crate::cram::{self, CramAlgorithm};
use crate::{plz, Error, Result};

/// Local stance on one negotiable option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptionMode {
    /// Do not advertise, do not accept.
    Off,
    /// Advertise; active when the peer advertises too.
    #[default]
    Supported,
    /// Advertise; abort the session when the peer does not.
    Required,
}

impl OptionMode {
    fn advertised(&self) -> bool {
        !matches!(self, OptionMode::Off)
    }
}

/// Local option preferences for a session.
#[derive(Debug, Clone)]
pub struct OptionPrefs {
    /// Non-reliable mode: resume offsets via M_GET.
    pub nr: OptionMode,
    /// Frame and file CRC32 checks.
    pub crc: OptionMode,
    /// zlib dataframe compression.
    pub plz: OptionMode,
    /// Outbound deflate level when PLZ is active.
    pub plz_level: u32,
}

impl Default for OptionPrefs {
    fn default() -> Self {
        OptionPrefs {
            nr: OptionMode::Supported,
            crc: OptionMode::Supported,
            plz: OptionMode::Supported,
            plz_level: plz::DEFAULT_LEVEL,
        }
    }
}

impl OptionPrefs {
    /// The tokens for our OPT advertisement, without CRAM (the session
    /// appends the challenge tokens on the answerer side).
    pub fn advertised_tokens(&self) -> Vec<&'static str> {
        let mut tokens = Vec::new();
        if self.nr.advertised() {
            tokens.push("NR");
        }
        if self.crc.advertised() {
            tokens.push("CRC");
        }
        if self.plz.advertised() {
            tokens.push("PLZ");
        }
        tokens
    }
}

/// What the peer advertised, accumulated over its M_NUL OPT lines.
#[derive(Debug, Clone, Default)]
pub struct PeerOptions {
    pub nr: bool,
    pub crc: bool,
    pub plz: bool,
    /// Strongest CRAM challenge offered, if any.
    pub cram: Option<(CramAlgorithm, Vec<u8>)>,
}

impl PeerOptions {
    /// Folds one OPT argument (space-separated tokens) into the set.
    /// Unknown tokens are ignored for forward compatibility.
    pub fn absorb(&mut self, opt_argument: &str) {
        for token in opt_argument.split_whitespace() {
            match token {
                "NR" => self.nr = true,
                "CRC" => self.crc = true,
                "PLZ" => self.plz = true,
                other => {
                    if let Some((algorithm, nonce)) = cram::parse_opt_token(other) {
                        let stronger = match &self.cram {
                            Some((current, _)) => algorithm > *current,
                            None => true,
                        };
                        if stronger {
                            self.cram = Some((algorithm, nonce));
                        }
                    } else {
                        log::trace!("ignoring unknown OPT token {other}");
                    }
                }
            }
        }
    }
}

/// The option set fixed at authentication time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NegotiatedOptions {
    pub nr: bool,
    pub crc: bool,
    pub plz: bool,
}

/// Intersects local preferences with the peer's advertisements,
/// enforcing `Required` stances.
pub fn negotiate(local: &OptionPrefs, peer: &PeerOptions) -> Result<NegotiatedOptions> {
    let check = |mode: OptionMode, peer_has: bool, name: &'static str| match mode {
        OptionMode::Required if !peer_has => Err(Error::OptionRequired(name)),
        _ => Ok(mode.advertised() && peer_has),
    };
    Ok(NegotiatedOptions {
        nr: check(local.nr, peer.nr, "NR")?,
        crc: check(local.crc, peer.crc, "CRC")?,
        plz: check(local.plz, peer.plz, "PLZ")?,
    })
}

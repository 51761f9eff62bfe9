//! binkp error taxonomy.
//!
//! The `Display` form of every variant starts with a stable taxonomy tag
//! (`proto:`, `auth:`, `crc:`, ...) so log scrapers and counters
//! aggregate cleanly.

/// Errors raised by the binkp engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame, unexpected command, or ordering violation.
    #[error("proto: {0}")]
    Protocol(String),

    /// Password or CRAM verification failure, either side.
    #[error("auth: {0}")]
    Auth(String),

    /// Frame or file checksum mismatch, or size mismatch.
    #[error("crc: {0}")]
    Integrity(String),

    /// A required option the peer did not advertise.
    #[error("proto: required option {0} not supported by peer")]
    OptionRequired(&'static str),

    /// The peer terminated the session with M_ERR.
    #[error("remote: {0}")]
    Remote(String),

    /// The peer is busy (M_BSY).
    #[error("busy: {0}")]
    Busy(String),

    /// No frame arrived within the idle window.
    #[error("io: idle timeout expired")]
    IdleTimeout,
}

impl Error {
    /// Whether this error should be reported to the peer with M_ERR
    /// before closing. I/O and remote-originated failures are not; the
    /// link is already unusable or the peer already knows.
    pub fn report_to_peer(&self) -> bool {
        !matches!(
            self,
            Error::Io(_) | Error::Remote(_) | Error::Busy(_)
        )
    }
}

//! Application error taxonomy.
//!
//! Display forms start with a stable tag (`config:`, `parse:`,
//! `route:`, `store:`, ...) so per-kind counters aggregate from logs.

/// Errors raised by the application layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config: {0}")]
    Config(String),

    #[error("parse: {0}")]
    Parse(#[from] ftn_msg::PktError),

    #[error("route: {0}")]
    Route(String),

    #[error("store: {0}")]
    Storage(String),

    #[error("dedupe: {0}")]
    Dedupe(String),

    #[error("session: {0}")]
    Session(#[from] binkp::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }
}

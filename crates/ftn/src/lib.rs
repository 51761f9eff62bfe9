//! The FTN application layer: configuration, duplicate detection,
//! routing, storage, the tosser pipeline and the mailer scheduler.
//!
//! The binkp engine ([`binkp`]) moves packet files between systems;
//! this crate decides what happens to the messages inside them.

#![forbid(unsafe_code)]

pub mod config;
pub mod control;
pub mod dedupe;
pub mod error;
pub mod mailer;
pub mod outbound;
pub mod rfc;
pub mod route;
pub mod stats;
pub mod storage;
pub mod template;
pub mod toss;

pub use config::{Config, NetworkConfig};
pub use dedupe::DupeDb;
pub use error::Error;
pub use route::{route_message, RouteAction, RoutingDecision, RoutingRule};
pub use stats::TossStats;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

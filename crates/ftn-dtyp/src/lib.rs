//! Core FTN data types shared across the `ftn-rs` workspace:
//! addresses, message model, kludge lines, MSGID handling and the
//! FTS-0001 date-time codec.

#![forbid(unsafe_code)]

pub mod address;
pub mod attributes;
pub mod ftime;
pub mod kludge;
pub mod message;
pub mod msgid;

pub use address::{Address, AddressParseError, AddressPattern};
pub use attributes::MessageAttributes;
pub use ftime::{format_fts_datetime, parse_fts_datetime, TimeParseError};
pub use kludge::Kludge;
pub use message::{EchoInfo, Message, MessageKind};
pub use msgid::MsgId;

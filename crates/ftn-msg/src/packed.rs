//! Packed message records.

use binrw::prelude::*;
use binrw::NullString;

use crate::binrw_util::FixedAscii;

/// The message type word opening every packed message.
pub const PACKED_MESSAGE_TYPE: u16 = 0x0002;

/// A single packed message as it appears inside a Type-2 packet: a
/// fixed 14-byte prefix (including the leading type word) followed by
/// NUL-terminated text fields.
///
/// Zones and points are not representable here; they travel in the
/// packet header and in INTL/FMPT/TOPT kludges and are resolved by the
/// packet loader.
///
/// Reference: FTS-0001 §5.2
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq, Eq)]
#[brw(little, magic(2u16))]
pub struct PackedMessage {
    pub orig_node: u16,
    pub dest_node: u16,
    pub orig_net: u16,
    pub dest_net: u16,
    pub attributes: u16,
    pub cost: u16,
    /// FTS-0001 date-time, 19 characters NUL-padded to 20 bytes.
    pub datetime: FixedAscii<20>,
    pub to: NullString,
    pub from: NullString,
    pub subject: NullString,
    /// Raw body including AREA line, kludges and the echomail trailer.
    pub body: NullString,
}

impl PackedMessage {
    /// Maximum stored lengths including the terminating NUL.
    pub const MAX_TO: usize = 36;
    pub const MAX_FROM: usize = 36;
    pub const MAX_SUBJECT: usize = 72;

    /// Truncates the to/from/subject fields to their FTS-0001 limits.
    pub fn clamp_fields(&mut self) {
        let clamp = |field: &mut NullString, max: usize| {
            if field.len() >= max {
                field.0.truncate(max - 1);
            }
        };
        clamp(&mut self.to, Self::MAX_TO);
        clamp(&mut self.from, Self::MAX_FROM);
        clamp(&mut self.subject, Self::MAX_SUBJECT);
    }
}

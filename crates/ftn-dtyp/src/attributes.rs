//! The packed-message attribute word.

use modular_bitfield::prelude::*;

/// FTS-0001 message attribute flags.
///
/// This is the 16-bit attribute word carried by every packed message.
/// Bit 10 is reserved.
///
/// Reference: FTS-0001 §5.2
#[bitfield]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageAttributes {
    /// Message is private to the addressee.
    pub private: bool,
    /// High-priority delivery.
    pub crash: bool,
    /// Message has been read by the addressee.
    pub received: bool,
    /// Message has been sent.
    pub sent: bool,
    /// A file is attached; the subject names it.
    pub file_attached: bool,
    /// Message is passing through this system.
    pub in_transit: bool,
    /// Destination node is unknown.
    pub orphan: bool,
    /// Delete after sending.
    pub kill_sent: bool,
    /// Message originated on this system.
    pub local: bool,
    /// Hold for pickup, do not route.
    pub hold: bool,
    #[skip]
    __: B1,
    /// Message requests a file.
    pub file_request: bool,
    /// Return receipt requested.
    pub return_receipt_request: bool,
    /// Message is a return receipt.
    pub is_return_receipt: bool,
    /// Audit trail requested.
    pub audit_request: bool,
    /// Message requests a file update.
    pub file_update_request: bool,
}

impl MessageAttributes {
    /// The attribute word as it appears on the wire (little-endian u16).
    pub fn to_word(self) -> u16 {
        u16::from_le_bytes(self.into_bytes())
    }

    /// Builds the attribute set from the wire word.
    pub fn from_word(word: u16) -> Self {
        Self::from_bytes(word.to_le_bytes())
    }
}

impl Default for MessageAttributes {
    fn default() -> Self {
        Self::new()
    }
}

//! The in-memory message model.

use crate::{Address, Kludge, MessageAttributes, MsgId};

/// Echomail-specific message state: the echo area tag and the
/// distribution trailer.
///
/// Reference: FTS-0004
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EchoInfo {
    /// The echo area tag. Never empty for a well-formed echomail message.
    pub area: String,
    /// The ` * Origin:` line, without its prefix.
    pub origin_line: Option<String>,
    /// The `--- ` tearline content, without the dashes.
    pub tearline: Option<String>,
    /// SEEN-BY line bodies, in arrival order.
    pub seen_by: Vec<String>,
    /// PATH kludge bodies, in arrival order.
    pub path: Vec<String>,
}

impl EchoInfo {
    pub fn new(area: impl Into<String>) -> Self {
        EchoInfo {
            area: area.into(),
            ..Default::default()
        }
    }
}

/// Whether a message is point-to-point netmail or published echomail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Netmail,
    Echomail(EchoInfo),
}

/// A single FTN message, netmail or echomail.
///
/// The body holds the visible text only; kludges and the echomail trailer
/// are carried in their dedicated fields and reassembled at the packet
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub orig: Address,
    pub dest: Address,
    pub attributes: MessageAttributes,
    pub cost: u16,
    /// UTC unix seconds; rendered as the FTS-0001 date-time on the wire.
    pub timestamp: i64,
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,

    pub msgid: Option<MsgId>,
    pub reply: Option<String>,
    /// TZUTC offset kludge value, e.g. `0300` or `-0500`.
    pub tzutc: Option<String>,
    /// Via tracking lines, appended by every system a netmail passes.
    pub via: Vec<String>,
    /// Kludges without a dedicated field, in arrival order.
    pub kludges: Vec<Kludge>,
}

impl Message {
    /// A netmail message from `orig` to `dest`.
    pub fn netmail(orig: Address, dest: Address) -> Self {
        Message::new(MessageKind::Netmail, orig, dest)
    }

    /// An echomail message published to `area`.
    pub fn echomail(area: impl Into<String>, orig: Address, dest: Address) -> Self {
        Message::new(MessageKind::Echomail(EchoInfo::new(area)), orig, dest)
    }

    fn new(kind: MessageKind, orig: Address, dest: Address) -> Self {
        Message {
            kind,
            orig,
            dest,
            attributes: MessageAttributes::default(),
            cost: 0,
            timestamp: 0,
            to: String::new(),
            from: String::new(),
            subject: String::new(),
            body: String::new(),
            msgid: None,
            reply: None,
            tzutc: None,
            via: Vec::new(),
            kludges: Vec::new(),
        }
    }

    #[inline]
    pub fn is_echomail(&self) -> bool {
        matches!(self.kind, MessageKind::Echomail(_))
    }

    /// The echo area tag, or `None` for netmail.
    pub fn area(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::Echomail(echo) => Some(echo.area.as_str()),
            MessageKind::Netmail => None,
        }
    }

    pub fn echo(&self) -> Option<&EchoInfo> {
        match &self.kind {
            MessageKind::Echomail(echo) => Some(echo),
            MessageKind::Netmail => None,
        }
    }

    pub fn echo_mut(&mut self) -> Option<&mut EchoInfo> {
        match &mut self.kind {
            MessageKind::Echomail(echo) => Some(echo),
            MessageKind::Netmail => None,
        }
    }
}

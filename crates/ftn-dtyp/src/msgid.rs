//! MSGID handling and normalization.

use std::fmt;

/// A message identifier, `<origin> <hex-serial>`.
///
/// The origin portion is usually an FTN address, optionally with an
/// `@domain` suffix; other-network gateways put arbitrary text there, so
/// it is kept as a string.
///
/// Reference: FTS-0009
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MsgId {
    pub origin: String,
    pub serial: String,
}

impl MsgId {
    pub fn new(origin: impl Into<String>, serial: impl Into<String>) -> Self {
        MsgId {
            origin: origin.into(),
            serial: serial.into(),
        }
    }

    /// Parses a MSGID kludge value. The serial is the last
    /// whitespace-separated token; everything before it is the origin.
    pub fn parse(value: &str) -> Option<MsgId> {
        let value = value.trim();
        let (origin, serial) = value.rsplit_once(char::is_whitespace)?;
        let origin = origin.trim_end();
        if origin.is_empty() || serial.is_empty() {
            return None;
        }
        Some(MsgId::new(origin, serial))
    }

    /// The normalized key used by the duplicate detector.
    pub fn normalized(&self) -> String {
        normalize(&format!("{} {}", self.origin, self.serial))
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.origin, self.serial)
    }
}

/// Normalizes a MSGID string for duplicate detection.
///
/// Leading/trailing whitespace is trimmed, internal whitespace runs
/// collapse to a single space, and the `@domain` portion of the origin
/// token is case-folded. The result is idempotent under re-normalization.
pub fn normalize(msgid: &str) -> String {
    let mut tokens = msgid.split_whitespace();
    let mut out = String::with_capacity(msgid.len());
    if let Some(first) = tokens.next() {
        match first.split_once('@') {
            Some((addr, domain)) => {
                out.push_str(addr);
                out.push('@');
                out.push_str(&domain.to_ascii_lowercase());
            }
            None => out.push_str(first),
        }
    }
    for token in tokens {
        out.push(' ');
        out.push_str(token);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain() {
        let id = MsgId::parse("1:2/3@fidonet ABCDEF01").unwrap();
        assert_eq!(id, MsgId::new("1:2/3@fidonet", "ABCDEF01"));
    }

    #[test]
    fn parse_gateway_origin_with_spaces() {
        let id = MsgId::parse("<4321@host.example.org> deadbeef").unwrap();
        assert_eq!(id.origin, "<4321@host.example.org>");
        assert_eq!(id.serial, "deadbeef");
    }

    #[test]
    fn parse_rejects_single_token() {
        assert!(MsgId::parse("loneserial").is_none());
        assert!(MsgId::parse("  ").is_none());
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize("  1:2/3   ABCDEF01  "), "1:2/3 ABCDEF01");
    }

    #[test]
    fn normalize_folds_domain_only() {
        assert_eq!(
            normalize("1:2/3@FidoNet ABCDEF01"),
            "1:2/3@fidonet ABCDEF01"
        );
        // The serial's case is significant and preserved.
        assert_eq!(normalize("1:2/3@FIDONET abcdef01"), normalize("1:2/3@fidonet abcdef01"));
        assert_ne!(normalize("1:2/3 ABCDEF01"), normalize("1:2/3 abcdef01"));
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["1:2/3@FidoNet  ABCDEF01", " a@B c ", "x y z"] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once);
        }
    }
}

//! Kludge lines — SOH-prefixed control lines embedded in message bodies.

use std::fmt;

/// A generic kludge line, `<SOH>TAG: value<CR>` on the wire.
///
/// Canonical kludges (MSGID, REPLY, INTL, FMPT, TOPT, TZUTC, Via, PATH)
/// are lifted into dedicated [`Message`](crate::Message) fields; everything
/// else is carried here in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kludge {
    pub tag: String,
    pub value: String,
}

impl Kludge {
    pub fn new(tag: impl Into<String>, value: impl Into<String>) -> Self {
        Kludge {
            tag: tag.into(),
            value: value.into(),
        }
    }

    /// Splits a kludge line body (without the SOH byte) into tag and value.
    ///
    /// The tag runs up to the first `:` or space; a single space after the
    /// colon is conventional and stripped.
    pub fn parse(line: &str) -> Self {
        match line.split_once(':') {
            Some((tag, value)) => Kludge::new(tag.trim(), value.trim_start()),
            None => match line.split_once(' ') {
                Some((tag, value)) => Kludge::new(tag, value),
                None => Kludge::new(line, ""),
            },
        }
    }
}

impl fmt::Display for Kludge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.is_empty() {
            write!(f, "{}", self.tag)
        } else {
            write!(f, "{}: {}", self.tag, self.value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_colon_form() {
        let k = Kludge::parse("CHRS: CP866 2");
        assert_eq!(k, Kludge::new("CHRS", "CP866 2"));
        assert_eq!(k.to_string(), "CHRS: CP866 2");
    }

    #[test]
    fn parse_space_form() {
        // PATH and Via historically omit the colon.
        let k = Kludge::parse("RESCANNED 2:5020/846");
        assert_eq!(k, Kludge::new("RESCANNED", "2:5020/846"));
    }

    #[test]
    fn parse_bare_tag() {
        let k = Kludge::parse("NOECHO");
        assert_eq!(k, Kludge::new("NOECHO", ""));
        assert_eq!(k.to_string(), "NOECHO");
    }
}

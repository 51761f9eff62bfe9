//! Path-template expansion.
//!
//! Mailbox locations are configured as templates like
//! `/var/spool/mail/%NETWORK%/%USER%`. Expansion is total over the
//! known substitutions and fails cleanly on anything else; the user
//! value is sanitized so message-supplied names cannot shape the
//! filesystem path.

use crate::{Error, Result};

/// The named substitutions available to path templates.
#[derive(Debug, Clone)]
pub struct Substitutions {
    pub user: String,
    pub network: String,
}

impl Substitutions {
    pub fn new(user: &str, network: &str) -> Self {
        Substitutions {
            user: sanitize_user(user),
            network: network.to_string(),
        }
    }

    fn lookup(&self, token: &str) -> Option<&str> {
        match token {
            "USER" => Some(&self.user),
            "NETWORK" => Some(&self.network),
            _ => None,
        }
    }
}

/// Lowercases a user name and replaces filesystem-hostile characters
/// with underscores.
pub fn sanitize_user(user: &str) -> String {
    user.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_whitespace() || matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Expands `%TOKEN%` occurrences. Unknown tokens are an error, never
/// silently passed through; a lone `%` is literal.
pub fn expand(template: &str, subs: &Substitutions) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) => {
                let token = &after[..end];
                match subs.lookup(token) {
                    Some(value) => out.push_str(value),
                    None => {
                        return Err(Error::config(format!(
                            "unknown template token %{token}% in {template:?}"
                        )))
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_known_tokens() {
        let subs = Substitutions::new("Alice", "fidonet");
        assert_eq!(
            expand("/var/spool/mail/%NETWORK%/%USER%", &subs).unwrap(),
            "/var/spool/mail/fidonet/alice"
        );
    }

    #[test]
    fn sanitizes_hostile_users() {
        assert_eq!(sanitize_user("Eve Il/..\\:*?\"<>|"), "eve_il_..________");
        let subs = Substitutions::new("a b", "net");
        assert_eq!(expand("%USER%", &subs).unwrap(), "a_b");
    }

    #[test]
    fn unknown_token_is_an_error() {
        let subs = Substitutions::new("u", "n");
        assert!(expand("%NOPE%", &subs).is_err());
    }

    #[test]
    fn lone_percent_is_literal() {
        let subs = Substitutions::new("u", "n");
        assert_eq!(expand("100% done", &subs).unwrap(), "100% done");
    }
}

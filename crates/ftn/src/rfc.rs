//! RFC822 / RFC1036 envelope rendering.
//!
//! Pure functions turning an FTN message into the text stored in a
//! Maildir file or a news spool article. FTN-specific state that has
//! no RFC header equivalent travels in `X-FTN-*` headers so nothing is
//! lost on the way out.

use ftn_dtyp::{Address, Message};
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;

/// Translates an echo area tag to a newsgroup name: lowercased, under
/// the `fido.` hierarchy, anything outside `[a-z0-9.+-]` becomes `-`.
pub fn newsgroup_for_area(area: &str) -> String {
    let mapped: String = area
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '.' | '+' | '-' => c,
            _ => '-',
        })
        .collect();
    format!("fido.{mapped}")
}

/// A mail address for an FTN endpoint, `user@p.f.n.z.domain` style.
fn endpoint(user: &str, address: &Address, domain: &str) -> String {
    let user: String = user
        .chars()
        .map(|c| if c.is_whitespace() { '.' } else { c })
        .collect();
    let host = if address.point != 0 {
        format!(
            "p{}.f{}.n{}.z{}.{domain}",
            address.point, address.node, address.net, address.zone
        )
    } else {
        format!("f{}.n{}.z{}.{domain}", address.node, address.net, address.zone)
    };
    format!("{user}@{host}")
}

fn date_header(unix: i64) -> String {
    OffsetDateTime::from_unix_timestamp(unix)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
        .format(&Rfc2822)
        .unwrap_or_else(|_| "Thu, 01 Jan 1970 00:00:00 +0000".into())
}

fn push_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push('\n');
}

fn common_headers(out: &mut String, message: &Message, domain: &str) {
    push_header(
        out,
        "From",
        &format!(
            "\"{}\" <{}>",
            message.from,
            endpoint(&message.from, &message.orig, domain)
        ),
    );
    push_header(out, "Date", &date_header(message.timestamp));
    push_header(out, "Subject", &message.subject);
    if let Some(id) = &message.msgid {
        push_header(
            out,
            "Message-ID",
            &format!("<{}@{}>", id.serial, sanitize_id(&id.origin)),
        );
    }
    if let Some(reply) = &message.reply {
        push_header(out, "X-FTN-REPLY", reply);
    }
    if let Some(tzutc) = &message.tzutc {
        push_header(out, "X-FTN-TZUTC", tzutc);
    }
    for via in &message.via {
        push_header(out, "X-FTN-Via", via);
    }
    for kludge in &message.kludges {
        push_header(out, "X-FTN-Kludge", &kludge.to_string());
    }
}

fn sanitize_id(origin: &str) -> String {
    origin
        .chars()
        .map(|c| match c {
            '<' | '>' | '@' | ' ' => '.',
            _ => c,
        })
        .collect()
}

/// Renders a netmail message as RFC822 text for Maildir delivery.
pub fn render_mail(message: &Message, domain: &str) -> String {
    let mut out = String::new();
    push_header(
        &mut out,
        "Return-Path",
        &format!("<{}>", endpoint(&message.from, &message.orig, domain)),
    );
    common_headers(&mut out, message, domain);
    push_header(
        &mut out,
        "To",
        &format!(
            "\"{}\" <{}>",
            message.to,
            endpoint(&message.to, &message.dest, domain)
        ),
    );
    push_header(&mut out, "X-FTN-From", &message.orig.to_string());
    push_header(&mut out, "X-FTN-To", &message.dest.to_string());
    out.push('\n');
    out.push_str(&message.body);
    out.push('\n');
    out
}

/// Renders an echomail message as RFC1036 text for the news spool.
pub fn render_news(message: &Message, newsgroup: &str, domain: &str) -> String {
    let mut out = String::new();
    push_header(
        &mut out,
        "Path",
        &format!("{}!not-for-mail", sanitize_id(&message.orig.to_string())),
    );
    common_headers(&mut out, message, domain);
    push_header(&mut out, "Newsgroups", newsgroup);
    if let Some(echo) = message.echo() {
        if let Some(origin) = &echo.origin_line {
            push_header(&mut out, "X-FTN-Origin", origin);
        }
        if let Some(tearline) = &echo.tearline {
            push_header(&mut out, "X-FTN-Tearline", tearline);
        }
        for seen_by in &echo.seen_by {
            push_header(&mut out, "X-FTN-Seen-By", seen_by);
        }
        for path in &echo.path {
            push_header(&mut out, "X-FTN-Path", path);
        }
    }
    push_header(
        &mut out,
        "Lines",
        &message.body.lines().count().to_string(),
    );
    out.push('\n');
    out.push_str(&message.body);
    out.push('\n');
    out
}

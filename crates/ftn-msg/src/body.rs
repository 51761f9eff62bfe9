//! Message body codec.
//!
//! A packed message body interleaves visible text with control
//! information: the AREA line, SOH kludges, the tearline, the origin
//! line, SEEN-BY lists and PATH. This module splits a raw body into
//! structured parts and reassembles it, preserving unknown kludges in
//! order.

use ftn_dtyp::{Kludge, MsgId};

const SOH: char = '\x01';
const TEARLINE: &str = "---";
const ORIGIN_PREFIX: &str = " * Origin: ";
const SEEN_BY_PREFIX: &str = "SEEN-BY: ";

/// The structured decomposition of a raw message body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BodyParts {
    pub area: Option<String>,
    pub text: String,
    pub msgid: Option<MsgId>,
    pub reply: Option<String>,
    /// INTL kludge value: `destZ:N/F origZ:N/F`.
    pub intl: Option<String>,
    /// FMPT origin-point override.
    pub fmpt: Option<u16>,
    /// TOPT destination-point override.
    pub topt: Option<u16>,
    pub tzutc: Option<String>,
    pub via: Vec<String>,
    pub kludges: Vec<Kludge>,
    pub tearline: Option<String>,
    pub origin_line: Option<String>,
    pub seen_by: Vec<String>,
    pub path: Vec<String>,
}

/// Splits a raw packed-message body into structured parts.
///
/// Lines are `\r`-terminated on the wire; a trailing `\n` left by
/// `\r\n` writers is tolerated.
pub fn parse_body(raw: &str) -> BodyParts {
    let mut parts = BodyParts::default();
    let mut text_lines: Vec<&str> = Vec::new();

    for (index, line) in raw.split('\r').enumerate() {
        let line = line.strip_prefix('\n').unwrap_or(line);

        if index == 0 {
            if let Some(area) = line.strip_prefix("AREA:") {
                parts.area = Some(area.trim().to_string());
                continue;
            }
        }

        if let Some(kludge_body) = line.strip_prefix(SOH) {
            dispatch_kludge(&mut parts, kludge_body);
            continue;
        }

        if parts.area.is_some() {
            if let Some(seen_by) = line.strip_prefix(SEEN_BY_PREFIX) {
                parts.seen_by.push(seen_by.trim_end().to_string());
                continue;
            }
            if line == TEARLINE {
                parts.tearline = Some(String::new());
                continue;
            }
            if let Some(tear) = line.strip_prefix("--- ") {
                parts.tearline = Some(tear.to_string());
                continue;
            }
            if let Some(origin) = line.strip_prefix(ORIGIN_PREFIX) {
                parts.origin_line = Some(origin.to_string());
                continue;
            }
        }

        text_lines.push(line);
    }

    // A NUL-terminated body always ends with a line break; drop the
    // resulting empty tail so text round-trips cleanly.
    while text_lines.last() == Some(&"") {
        text_lines.pop();
    }
    parts.text = text_lines.join("\n");
    parts
}

fn dispatch_kludge(parts: &mut BodyParts, body: &str) {
    let kludge = Kludge::parse(body);
    match kludge.tag.as_str() {
        "MSGID" => match MsgId::parse(&kludge.value) {
            Some(id) => parts.msgid = Some(id),
            None => parts.kludges.push(kludge),
        },
        "REPLY" => parts.reply = Some(kludge.value),
        "INTL" => parts.intl = Some(kludge.value),
        "FMPT" => match kludge.value.parse() {
            Ok(point) => parts.fmpt = Some(point),
            Err(_) => parts.kludges.push(kludge),
        },
        "TOPT" => match kludge.value.parse() {
            Ok(point) => parts.topt = Some(point),
            Err(_) => parts.kludges.push(kludge),
        },
        "TZUTC" => parts.tzutc = Some(kludge.value),
        "Via" => parts.via.push(kludge.value),
        "PATH" => parts.path.push(kludge.value),
        _ => parts.kludges.push(kludge),
    }
}

/// Reassembles a raw body from structured parts, inverting [`parse_body`].
pub fn build_body(parts: &BodyParts) -> String {
    let mut out = String::new();

    if let Some(area) = &parts.area {
        out.push_str("AREA:");
        out.push_str(area);
        out.push_str("\r\n");
    }
    if let Some(msgid) = &parts.msgid {
        push_kludge(&mut out, "MSGID", &msgid.to_string());
    }
    if let Some(reply) = &parts.reply {
        push_kludge(&mut out, "REPLY", reply);
    }
    if let Some(intl) = &parts.intl {
        push_space_kludge(&mut out, "INTL", intl);
    }
    if let Some(fmpt) = parts.fmpt {
        push_space_kludge(&mut out, "FMPT", &fmpt.to_string());
    }
    if let Some(topt) = parts.topt {
        push_space_kludge(&mut out, "TOPT", &topt.to_string());
    }
    if let Some(tzutc) = &parts.tzutc {
        push_kludge(&mut out, "TZUTC", tzutc);
    }
    for kludge in &parts.kludges {
        out.push(SOH);
        out.push_str(&kludge.to_string());
        out.push('\r');
    }

    for line in parts.text.split('\n') {
        out.push_str(line);
        out.push('\r');
    }

    if let Some(tearline) = &parts.tearline {
        if tearline.is_empty() {
            out.push_str(TEARLINE);
        } else {
            out.push_str("--- ");
            out.push_str(tearline);
        }
        out.push('\r');
    }
    if let Some(origin) = &parts.origin_line {
        out.push_str(ORIGIN_PREFIX);
        out.push_str(origin);
        out.push('\r');
    }
    for seen_by in &parts.seen_by {
        out.push_str(SEEN_BY_PREFIX);
        out.push_str(seen_by);
        out.push('\r');
    }
    for path in &parts.path {
        push_space_kludge(&mut out, "PATH", path);
    }
    for via in &parts.via {
        push_space_kludge(&mut out, "Via", via);
    }

    out
}

fn push_kludge(out: &mut String, tag: &str, value: &str) {
    out.push(SOH);
    out.push_str(tag);
    out.push_str(": ");
    out.push_str(value);
    out.push('\r');
}

/// INTL, FMPT, TOPT, PATH and Via conventionally separate tag and value
/// with a bare space instead of a colon.
fn push_space_kludge(out: &mut String, tag: &str, value: &str) {
    out.push(SOH);
    out.push_str(tag);
    out.push(' ');
    out.push_str(value);
    out.push('\r');
}

//! binkp frames and command codes.

use std::fmt;

use crate::Error;

/// Maximum frame payload: 15 bits of the length word.
pub const MAX_PAYLOAD: usize = 0x7FFF;

/// binkp command codes.
///
/// Reference: FTS-1026 §4
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum Command {
    Nul = 0,
    Adr = 1,
    Pwd = 2,
    File = 3,
    Ok = 4,
    Eob = 5,
    Got = 6,
    Err = 7,
    Bsy = 8,
    Get = 9,
    Skip = 10,
}

impl Command {
    pub const ALL: [Command; 11] = [
        Command::Nul,
        Command::Adr,
        Command::Pwd,
        Command::File,
        Command::Ok,
        Command::Eob,
        Command::Got,
        Command::Err,
        Command::Bsy,
        Command::Get,
        Command::Skip,
    ];
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Command::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| Error::Protocol(format!("unknown command code {value}")))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Nul => "M_NUL",
            Command::Adr => "M_ADR",
            Command::Pwd => "M_PWD",
            Command::File => "M_FILE",
            Command::Ok => "M_OK",
            Command::Eob => "M_EOB",
            Command::Got => "M_GOT",
            Command::Err => "M_ERR",
            Command::Bsy => "M_BSY",
            Command::Get => "M_GET",
            Command::Skip => "M_SKIP",
        };
        write!(f, "{name}")
    }
}

/// A single binkp frame: a command with its ASCII argument, or a block
/// of file data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Command(Command, String),
    Data(Vec<u8>),
}

impl Frame {
    pub fn command(cmd: Command, arg: impl Into<String>) -> Frame {
        Frame::Command(cmd, arg.into())
    }

    /// Whether the frame carries a trailing CRC32 when the CRC option
    /// is active: all data frames, plus the two file-integrity commands.
    pub fn carries_crc(&self) -> bool {
        match self {
            Frame::Data(_) => true,
            Frame::Command(cmd, _) => matches!(cmd, Command::File | Command::Got),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Command(cmd, arg) if arg.is_empty() => write!(f, "{cmd}"),
            Frame::Command(cmd, arg) => write!(f, "{cmd} {arg}"),
            Frame::Data(data) => write!(f, "DATA[{}]", data.len()),
        }
    }
}

/// Escapes a filename for an M_FILE/M_GOT/M_GET argument. Spaces and
/// backslashes become `\x20`/`\x5c` so arguments stay space-separated.
pub fn escape_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            ' ' => out.push_str("\\x20"),
            '\\' => out.push_str("\\x5c"),
            _ => out.push(ch),
        }
    }
    out
}

/// Reverses [`escape_filename`]. Unknown escapes are kept verbatim.
pub fn unescape_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let mut lookahead = chars.clone();
        if lookahead.next() == Some('x') {
            let hi = lookahead.next();
            let lo = lookahead.next();
            if let (Some(hi), Some(lo)) = (hi, lo) {
                if let (Some(h), Some(l)) = (hi.to_digit(16), lo.to_digit(16)) {
                    out.push(((h * 16 + l) as u8) as char);
                    chars = lookahead;
                    continue;
                }
            }
        }
        out.push(ch);
    }
    out
}

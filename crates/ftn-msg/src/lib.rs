//! FTS-0001 Type-2 packet structures and the packet load/save codec.
//!
//! A packet is a 58-byte header followed by packed messages and a
//! terminating zero word. Messages travel with their control
//! information folded into the body text; this crate lifts it into the
//! structured [`Message`] model on load and folds it back on save.

#![forbid(unsafe_code)]

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use binrw::prelude::*;
use binrw::NullString;

use ftn_dtyp::{
    format_fts_datetime, parse_fts_datetime, Address, EchoInfo, Message, MessageAttributes,
    MessageKind,
};

pub mod binrw_util;
pub mod body;
pub mod header;
pub mod packed;

pub use binrw_util::{latin1_to_string, string_to_latin1, FixedAscii};
pub use body::{build_body, parse_body, BodyParts};
pub use header::{PacketHeader, PACKET_TYPE_2};
pub use packed::{PackedMessage, PACKED_MESSAGE_TYPE};

/// Packet codec result type.
pub type Result<T> = std::result::Result<T, PktError>;

/// Errors raised by the packet codec.
#[derive(Debug, thiserror::Error)]
pub enum PktError {
    #[error("packet I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad packet type {0:#06x}")]
    BadPacketType(u16),
    #[error("bad message type word {0:#06x}")]
    BadMessageType(u16),
    #[error("truncated packet")]
    Truncated,
    #[error("packet encoding error: {0}")]
    Encoding(binrw::Error),
}

impl From<binrw::Error> for PktError {
    fn from(err: binrw::Error) -> Self {
        match err {
            binrw::Error::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                PktError::Truncated
            }
            other => PktError::Encoding(other),
        }
    }
}

/// A Type-2 packet: header plus messages, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub messages: Vec<Message>,
}

impl Packet {
    pub fn new(header: PacketHeader) -> Self {
        Packet {
            header,
            messages: Vec::new(),
        }
    }

    /// Reads a packet, validating the type word and the terminator.
    pub fn load<R: Read + Seek>(reader: &mut R) -> Result<Packet> {
        let header: PacketHeader = PacketHeader::read_le(reader)?;
        if header.packet_type != PACKET_TYPE_2 {
            return Err(PktError::BadPacketType(header.packet_type));
        }

        let mut messages = Vec::new();
        loop {
            let word = u16::read_le(reader)?;
            match word {
                0 => break,
                PACKED_MESSAGE_TYPE => {
                    reader.seek(SeekFrom::Current(-2))?;
                    let packed: PackedMessage = PackedMessage::read_le(reader)?;
                    messages.push(unpack_message(&header, &packed));
                }
                other => return Err(PktError::BadMessageType(other)),
            }
        }

        Ok(Packet { header, messages })
    }

    /// Writes the packet, messages in order, with the terminating word.
    pub fn save<W: Write + Seek>(&self, writer: &mut W) -> Result<()> {
        self.header.write_le(writer)?;
        for message in &self.messages {
            pack_message(message).write_le(writer)?;
        }
        0u16.write_le(writer)?;
        Ok(())
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<Packet> {
        let file = std::fs::File::open(path)?;
        Packet::load(&mut std::io::BufReader::new(file))
    }

    pub fn save_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);
        self.save(&mut writer)?;
        Ok(())
    }
}

/// Lifts a packed message into the structured model.
///
/// Zones default to the packet header's; an INTL kludge overrides them
/// for netmail. Unparsable dates fall back to the packet creation time
/// rather than failing the whole packet.
pub fn unpack_message(header: &PacketHeader, packed: &PackedMessage) -> Message {
    let parts = body::parse_body(&latin1_to_string(&packed.body));

    let mut orig = Address {
        zone: header.orig_zone.max(1),
        net: packed.orig_net,
        node: packed.orig_node,
        point: parts.fmpt.unwrap_or(0),
    };
    let mut dest = Address {
        zone: header.dest_zone.max(1),
        net: packed.dest_net,
        node: packed.dest_node,
        point: parts.topt.unwrap_or(0),
    };
    if let Some(intl) = &parts.intl {
        if let Some((intl_dest, intl_orig)) = parse_intl(intl) {
            dest = intl_dest.with_point(dest.point);
            orig = intl_orig.with_point(orig.point);
        }
    }

    let kind = match parts.area {
        Some(area) => MessageKind::Echomail(EchoInfo {
            area,
            origin_line: parts.origin_line,
            tearline: parts.tearline,
            seen_by: parts.seen_by,
            path: parts.path,
        }),
        None => MessageKind::Netmail,
    };

    let timestamp = parse_fts_datetime(packed.datetime.as_str())
        .ok()
        .or_else(|| header.created_unix())
        .unwrap_or(0);

    Message {
        kind,
        orig,
        dest,
        attributes: MessageAttributes::from_word(packed.attributes),
        cost: packed.cost,
        timestamp,
        to: latin1_to_string(&packed.to),
        from: latin1_to_string(&packed.from),
        subject: latin1_to_string(&packed.subject),
        body: parts.text,
        msgid: parts.msgid,
        reply: parts.reply,
        tzutc: parts.tzutc,
        via: parts.via,
        kludges: parts.kludges,
    }
}

/// Folds a structured message back into its packed form.
///
/// Netmail always carries an INTL kludge so zone information survives
/// the Type-2 header's 2-D node fields; FMPT/TOPT are emitted for
/// non-zero points.
pub fn pack_message(message: &Message) -> PackedMessage {
    let mut parts = BodyParts {
        text: message.body.clone(),
        msgid: message.msgid.clone(),
        reply: message.reply.clone(),
        tzutc: message.tzutc.clone(),
        via: message.via.clone(),
        kludges: message.kludges.clone(),
        ..Default::default()
    };

    match &message.kind {
        MessageKind::Echomail(echo) => {
            parts.area = Some(echo.area.clone());
            parts.origin_line = echo.origin_line.clone();
            parts.tearline = echo.tearline.clone();
            parts.seen_by = echo.seen_by.clone();
            parts.path = echo.path.clone();
        }
        MessageKind::Netmail => {
            parts.intl = Some(format!(
                "{} {}",
                message.dest.node_address(),
                message.orig.node_address()
            ));
        }
    }
    if message.orig.point != 0 {
        parts.fmpt = Some(message.orig.point);
    }
    if message.dest.point != 0 {
        parts.topt = Some(message.dest.point);
    }

    let mut packed = PackedMessage {
        orig_node: message.orig.node,
        dest_node: message.dest.node,
        orig_net: message.orig.net,
        dest_net: message.dest.net,
        attributes: message.attributes.to_word(),
        cost: message.cost,
        datetime: FixedAscii::from(format_fts_datetime(message.timestamp).as_str()),
        to: NullString(string_to_latin1(&message.to)),
        from: NullString(string_to_latin1(&message.from)),
        subject: NullString(string_to_latin1(&message.subject)),
        body: NullString(string_to_latin1(&body::build_body(&parts))),
    };
    packed.clamp_fields();
    packed
}

fn parse_intl(value: &str) -> Option<(Address, Address)> {
    let (dest, orig) = value.trim().split_once(' ')?;
    Some((dest.parse().ok()?, orig.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ftn_dtyp::{Kludge, MsgId};
    use std::io::Cursor;

    fn sample_packet() -> Packet {
        let orig = Address::new(2, 5020, 846);
        let dest = Address::new(2, 5020, 52);
        let mut packet = Packet::new(PacketHeader::new(orig, dest, 1_700_000_000, "secret"));

        let mut echo = Message::echomail("RU.FTN.DEVELOP", orig, dest);
        echo.timestamp = 1_700_000_000;
        echo.to = "All".into();
        echo.from = "Sysop".into();
        echo.subject = "test".into();
        echo.body = "Hello echo!".into();
        echo.msgid = Some(MsgId::new("2:5020/846", "abcdef01"));
        echo.kludges.push(Kludge::new("CHRS", "CP866 2"));
        {
            let info = echo.echo_mut().unwrap();
            info.tearline = Some("ftn-rs".into());
            info.origin_line = Some("Test station (2:5020/846)".into());
            info.seen_by = vec!["5020/52 846".into()];
            info.path = vec!["5020/846".into()];
        }
        packet.messages.push(echo);

        let mut net = Message::netmail(Address::new(1, 234, 5).with_point(6), dest);
        net.timestamp = 1_700_000_000;
        net.to = "alice".into();
        net.from = "bob".into();
        net.subject = "private".into();
        net.body = "Private note".into();
        net.attributes = MessageAttributes::new().with_private(true);
        net.tzutc = Some("0300".into());
        net.via.push("2:5020/846 @20231114.221320.UTC ftn-rs".into());
        packet.messages.push(net);

        packet
    }

    fn round_trip(packet: &Packet) -> Packet {
        let mut cursor = Cursor::new(Vec::new());
        packet.save(&mut cursor).unwrap();
        cursor.set_position(0);
        Packet::load(&mut cursor).unwrap()
    }

    #[test]
    fn packet_round_trip_field_level() {
        let packet = sample_packet();
        let loaded = round_trip(&packet);
        assert_eq!(loaded.header, packet.header);
        assert_eq!(loaded.messages, packet.messages);
    }

    #[test]
    fn netmail_zone_survives_via_intl() {
        let packet = sample_packet();
        let loaded = round_trip(&packet);
        let net = &loaded.messages[1];
        assert_eq!(net.orig, Address::new(1, 234, 5).with_point(6));
        assert_eq!(net.dest, Address::new(2, 5020, 52));
    }

    #[test]
    fn unknown_kludges_preserved_in_order() {
        let mut packet = sample_packet();
        let kludges = &mut packet.messages[0].kludges;
        kludges.push(Kludge::new("TID", "ftn-rs 0.3.1"));
        kludges.push(Kludge::new("NOTE", "keep me"));
        let loaded = round_trip(&packet);
        assert_eq!(loaded.messages[0].kludges, packet.messages[0].kludges);
    }

    #[test]
    fn empty_packet_round_trip() {
        let packet = sample_packet();
        let empty = Packet::new(packet.header.clone());
        let loaded = round_trip(&empty);
        assert!(loaded.messages.is_empty());
    }

    #[test]
    fn truncated_packet_is_reported() {
        let mut cursor = Cursor::new(vec![0u8; 7]);
        assert!(matches!(
            Packet::load(&mut cursor),
            Err(PktError::Truncated)
        ));
    }

    #[test]
    fn missing_terminator_is_truncated() {
        let packet = sample_packet();
        let mut cursor = Cursor::new(Vec::new());
        packet.save(&mut cursor).unwrap();
        let mut raw = cursor.into_inner();
        raw.truncate(raw.len() - 2);
        assert!(matches!(
            Packet::load(&mut Cursor::new(raw)),
            Err(PktError::Truncated)
        ));
    }

    #[test]
    fn wrong_packet_type_is_rejected() {
        let packet = sample_packet();
        let mut cursor = Cursor::new(Vec::new());
        packet.save(&mut cursor).unwrap();
        let mut raw = cursor.into_inner();
        raw[18] = 3; // packet type word
        assert!(matches!(
            Packet::load(&mut Cursor::new(raw)),
            Err(PktError::BadPacketType(3))
        ));
    }

    fn hex_bytes(hex: &str) -> Vec<u8> {
        let clean: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
        (0..clean.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&clean[i..i + 2], 16).unwrap())
            .collect()
    }

    /// A captured minimal packet: 58-byte header, one private netmail
    /// ("hello") from 2:5020/846 to 2:5020/52, terminator word.
    const ONE_MESSAGE_PACKET: &str = "\
        4e03 3400 e707 0a00 0e00 1600 0d00 1400 0000 0200 9c13 9c13 fe 00 \
        7365637265740000 0200 0200 0000000000000000000000000000000000000000 \
        0200 4e03 3400 9c13 9c13 0100 0000 \
        3134204e6f76203233202032323a31333a323000 \
        416c6c00 5379736f7000 7465737400 68656c6c6f0d00 \
        0000";

    #[test]
    fn loads_captured_packet_bytes() {
        let raw = hex_bytes(ONE_MESSAGE_PACKET);
        let packet = Packet::load(&mut Cursor::new(raw)).unwrap();

        assert_eq!(packet.header.orig_address(), Address::new(2, 5020, 846));
        assert_eq!(packet.header.dest_address(), Address::new(2, 5020, 52));
        assert_eq!(packet.header.password.as_str(), "secret");
        assert_eq!(packet.header.created_unix(), Some(1_700_000_000));

        assert_eq!(packet.messages.len(), 1);
        let msg = &packet.messages[0];
        assert!(!msg.is_echomail());
        assert_eq!(msg.orig, Address::new(2, 5020, 846));
        assert_eq!(msg.dest, Address::new(2, 5020, 52));
        assert!(msg.attributes.private());
        assert_eq!(msg.timestamp, 1_700_000_000);
        assert_eq!(msg.to, "All");
        assert_eq!(msg.from, "Sysop");
        assert_eq!(msg.subject, "test");
        assert_eq!(msg.body, "hello");
    }

    #[test]
    fn stray_message_type_word_is_rejected() {
        let packet = Packet::new(sample_packet().header);
        let mut cursor = Cursor::new(Vec::new());
        packet.save(&mut cursor).unwrap();
        let mut raw = cursor.into_inner();
        let end = raw.len();
        raw[end - 2] = 9; // terminator word becomes garbage
        assert!(matches!(
            Packet::load(&mut Cursor::new(raw)),
            Err(PktError::BadMessageType(9))
        ));
    }
}

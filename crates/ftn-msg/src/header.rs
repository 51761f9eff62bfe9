//! Packet header and related types.

use binrw::prelude::*;
use ftn_dtyp::Address;
use time::OffsetDateTime;

use crate::binrw_util::FixedAscii;

/// The packet type word. Only Type-2 packets exist in this stack.
pub const PACKET_TYPE_2: u16 = 0x0002;

/// FTS-0001 Type-2 packet header.
///
/// 58 bytes of little-endian words and fixed-width ASCII. The creation
/// time is stored broken into calendar fields; [`PacketHeader::created_unix`]
/// and [`PacketHeader::new`] convert from/to UTC unix seconds.
///
/// Reference: FTS-0001 §5.1
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct PacketHeader {
    pub orig_node: u16,
    pub dest_node: u16,
    /// Full calendar year, e.g. 2024.
    pub year: u16,
    /// Zero-based month, 0 = January.
    pub month: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    /// Historical line speed; always written as zero.
    pub baud: u16,
    /// Must equal [`PACKET_TYPE_2`]; validated by the packet loader.
    pub packet_type: u16,
    pub orig_net: u16,
    pub dest_net: u16,
    pub prod_code: u8,
    pub serial_no: u8,
    /// Session password, space- or NUL-padded to 8 bytes.
    pub password: FixedAscii<8>,
    pub orig_zone: u16,
    pub dest_zone: u16,
    /// FSC-0048 extension area; preserved verbatim.
    pub fill: [u8; 20],
}

impl PacketHeader {
    pub const STRUCT_SIZE: usize = 58;

    /// A fresh Type-2 header between two node addresses.
    pub fn new(orig: Address, dest: Address, created_unix: i64, password: &str) -> Self {
        let dt = OffsetDateTime::from_unix_timestamp(created_unix)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        PacketHeader {
            orig_node: orig.node,
            dest_node: dest.node,
            year: dt.year() as u16,
            month: dt.month() as u16 - 1,
            day: dt.day() as u16,
            hour: dt.hour() as u16,
            minute: dt.minute() as u16,
            second: dt.second() as u16,
            baud: 0,
            packet_type: PACKET_TYPE_2,
            orig_net: orig.net,
            dest_net: dest.net,
            prod_code: 0xfe,
            serial_no: 0,
            password: FixedAscii::from(password),
            orig_zone: orig.zone,
            dest_zone: dest.zone,
            fill: [0; 20],
        }
    }

    /// The origin address carried by the header (points are not
    /// representable in the Type-2 header and read as zero).
    pub fn orig_address(&self) -> Address {
        Address::new(self.orig_zone, self.orig_net, self.orig_node)
    }

    pub fn dest_address(&self) -> Address {
        Address::new(self.dest_zone, self.dest_net, self.dest_node)
    }

    /// The creation time as UTC unix seconds, or `None` when the
    /// calendar fields do not form a valid date.
    pub fn created_unix(&self) -> Option<i64> {
        let month = time::Month::try_from(self.month as u8 + 1).ok()?;
        let date =
            time::Date::from_calendar_date(self.year as i32, month, self.day as u8).ok()?;
        let time =
            time::Time::from_hms(self.hour as u8, self.minute as u8, self.second as u8).ok()?;
        Some(date.with_time(time).assume_utc().unix_timestamp())
    }
}

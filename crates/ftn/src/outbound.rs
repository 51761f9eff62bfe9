//! The outbound packet queue.
//!
//! Forwarded messages accumulate per destination while a packet scan
//! runs; flushing packs each destination's messages into a Type-2
//! packet in the network outbox, where the mailer picks them up. A
//! packet stays in the outbox until a session's M_GOT confirms it.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use ftn_dtyp::{Address, Message};
use ftn_msg::{Packet, PacketHeader};

use crate::config::NetworkConfig;
use crate::Result;

/// Messages awaiting packing, grouped by destination link.
#[derive(Debug, Default)]
pub struct ForwardSpool {
    by_destination: BTreeMap<Address, Vec<Message>>,
}

impl ForwardSpool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, destination: Address, message: Message) {
        self.by_destination
            .entry(destination)
            .or_default()
            .push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.by_destination.is_empty()
    }

    pub fn message_count(&self) -> usize {
        self.by_destination.values().map(Vec::len).sum()
    }

    /// Writes one packet per destination into the network outbox and
    /// clears the spool. Returns the created packet paths.
    pub fn flush(&mut self, network: &NetworkConfig, now: i64) -> Result<Vec<PathBuf>> {
        if self.by_destination.is_empty() {
            return Ok(Vec::new());
        }
        fs::create_dir_all(&network.outbox)?;

        let mut written = Vec::new();
        for (destination, messages) in std::mem::take(&mut self.by_destination) {
            let header =
                PacketHeader::new(network.address, destination, now, &network.password);
            let mut packet = Packet::new(header);
            packet.messages = messages;

            let path = unique_packet_path(network, now);
            packet.save_file(&path)?;
            log::info!(
                "packed {} message(s) for {destination} into {}",
                packet.messages.len(),
                path.display()
            );
            written.push(path);
        }
        Ok(written)
    }
}

/// An unclaimed `<hex>.pkt` name in the outbox, derived from the clock
/// with a collision counter.
fn unique_packet_path(network: &NetworkConfig, now: i64) -> PathBuf {
    let mut serial = now as u64 & 0xFFFF_FFFF;
    loop {
        let candidate = network.outbox.join(format!("{serial:08x}.pkt"));
        if !candidate.exists() {
            return candidate;
        }
        serial = serial.wrapping_add(1);
    }
}

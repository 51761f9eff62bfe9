//! Tosser statistics.

use std::fmt;

/// Per-network tossing counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TossStats {
    /// Packets fully consumed.
    pub packets: u64,
    /// Messages seen inside them.
    pub messages: u64,
    /// Messages delivered to mail or news.
    pub stored: u64,
    /// Messages queued for another node.
    pub forwarded: u64,
    /// Messages suppressed by the duplicate detector.
    pub duplicates: u64,
    /// Bad packets and failed deliveries.
    pub errors: u64,
    /// Undeliverable messages returned to sender.
    pub bounced: u64,
    /// Messages discarded by policy.
    pub dropped: u64,
}

impl TossStats {
    pub fn merge(&mut self, other: &TossStats) {
        self.packets += other.packets;
        self.messages += other.messages;
        self.stored += other.stored;
        self.forwarded += other.forwarded;
        self.duplicates += other.duplicates;
        self.errors += other.errors;
        self.bounced += other.bounced;
        self.dropped += other.dropped;
    }
}

impl fmt::Display for TossStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "packets={} messages={} stored={} forwarded={} duplicates={} errors={} bounced={} dropped={}",
            self.packets,
            self.messages,
            self.stored,
            self.forwarded,
            self.duplicates,
            self.errors,
            self.bounced,
            self.dropped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_accumulates() {
        let mut total = TossStats::default();
        total.merge(&TossStats {
            packets: 1,
            messages: 3,
            stored: 2,
            duplicates: 1,
            ..Default::default()
        });
        total.merge(&TossStats {
            packets: 1,
            errors: 1,
            ..Default::default()
        });
        assert_eq!(total.packets, 2);
        assert_eq!(total.messages, 3);
        assert_eq!(total.errors, 1);
    }
}

//! The tosser pipeline.
//!
//! Scans each network's inbox for packet files, feeds every message
//! through dedupe → route → deliver, and quarantines anything that
//! cannot be parsed. A packet that was fully consumed always moves to
//! `processed/`, whatever happened to the individual messages inside
//! it; per-message failures are counted, never fatal.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ftn_dtyp::{Message, MsgId};
use ftn_msg::Packet;

use crate::config::{Config, NetworkConfig};
use crate::control::{ControlChannel, ControlEvent};
use crate::dedupe::DupeDb;
use crate::outbound::ForwardSpool;
use crate::rfc;
use crate::route::{route_message, RoutingDecision};
use crate::stats::TossStats;
use crate::storage::{deliver_mail, NewsSpool};
use crate::{Error, Result};

/// Duplicate entries older than this are purged on every run.
const DUPE_RETENTION: Duration = Duration::from_secs(30 * 24 * 3600);

/// The tosser over one immutable configuration snapshot.
pub struct Tosser {
    config: Arc<Config>,
}

impl Tosser {
    pub fn new(config: Arc<Config>) -> Self {
        Tosser { config }
    }

    /// Tosses every network once. Per-network trouble is logged and
    /// counted; only a duplicate-database failure is fatal, since
    /// running without dedupe would re-deliver mail.
    pub fn run_once(&self) -> Result<TossStats> {
        let mut total = TossStats::default();
        for network in &self.config.networks {
            let stats = self.toss_network(network)?;
            if stats != TossStats::default() {
                log::info!("{}: {stats}", network.name);
            }
            total.merge(&stats);
        }
        Ok(total)
    }

    fn toss_network(&self, network: &NetworkConfig) -> Result<TossStats> {
        let mut stats = TossStats::default();
        for dir in [
            &network.inbox,
            &network.outbox,
            &network.processed,
            &network.bad,
        ] {
            fs::create_dir_all(dir)?;
        }

        let packets = scan_inbox(&network.inbox)?;
        if packets.is_empty() {
            return Ok(stats);
        }

        let mut dupes = DupeDb::open(&network.duplicate_db)?;
        let mut forwards = ForwardSpool::new();
        let now = now_unix();

        for path in packets {
            match self.process_packet(&path, network, &mut dupes, &mut forwards, &mut stats, now)
            {
                Ok(()) => {
                    stats.packets += 1;
                    move_into(&path, &network.processed)?;
                }
                Err(e) => {
                    log::warn!("{}: {e}", path.display());
                    stats.errors += 1;
                    move_into(&path, &network.bad)?;
                }
            }
        }

        forwards.flush(network, now)?;
        dupes.cleanup(now - DUPE_RETENTION.as_secs() as i64);
        dupes.save()?;
        Ok(stats)
    }

    /// Consumes one packet. An `Err` means the packet itself was
    /// unusable and belongs in `bad/`; message-level failures are
    /// absorbed into the counters.
    fn process_packet(
        &self,
        path: &Path,
        network: &NetworkConfig,
        dupes: &mut DupeDb,
        forwards: &mut ForwardSpool,
        stats: &mut TossStats,
        now: i64,
    ) -> Result<()> {
        let packet = Packet::load_file(path)?;
        log::debug!(
            "{}: {} message(s) from {}",
            path.display(),
            packet.messages.len(),
            packet.header.orig_address()
        );

        for message in packet.messages {
            stats.messages += 1;
            if dupes.is_duplicate(&message) {
                stats.duplicates += 1;
                log::debug!("duplicate {:?}", message.msgid);
                continue;
            }
            dupes.add(&message, now);

            let decision = match route_message(&message, network, &self.config) {
                Ok(decision) => decision,
                Err(e) => {
                    log::warn!("{e}");
                    stats.errors += 1;
                    continue;
                }
            };
            self.apply_decision(decision, message, network, forwards, stats, now);
        }
        Ok(())
    }

    fn apply_decision(
        &self,
        decision: RoutingDecision,
        message: Message,
        network: &NetworkConfig,
        forwards: &mut ForwardSpool,
        stats: &mut TossStats,
        now: i64,
    ) {
        match decision {
            RoutingDecision::LocalMail { user, mailbox } => {
                let content = rfc::render_mail(&message, &network.domain);
                match deliver_mail(&mailbox, &content) {
                    Ok(path) => {
                        stats.stored += 1;
                        log::debug!("mail for {user} -> {}", path.display());
                    }
                    Err(e) => {
                        log::warn!("{e}");
                        stats.errors += 1;
                    }
                }
            }
            RoutingDecision::LocalNews { area, spool } => {
                let group = rfc::newsgroup_for_area(&area);
                let content = rfc::render_news(&message, &group, &network.domain);
                match NewsSpool::new(spool).store(&group, &content) {
                    Ok((_, number)) => {
                        stats.stored += 1;
                        log::debug!("article {number} in {group}");
                    }
                    Err(e) => {
                        log::warn!("{e}");
                        stats.errors += 1;
                    }
                }
            }
            RoutingDecision::Forward { address, .. } => {
                forwards.add(address, message);
                stats.forwarded += 1;
            }
            RoutingDecision::Bounce { reason } => {
                if network.bounce {
                    let bounce = bounce_message(&message, network, &reason, now);
                    let link = network.hub.unwrap_or(bounce.dest);
                    forwards.add(link, bounce);
                    stats.bounced += 1;
                    log::info!("bounced message from {}: {reason}", message.orig);
                } else {
                    stats.dropped += 1;
                    log::info!("dropped undeliverable message: {reason}");
                }
            }
            RoutingDecision::Drop { reason } => {
                stats.dropped += 1;
                log::info!("dropped message from {}: {reason}", message.orig);
            }
        }
    }
}

/// The undeliverable-mail notice returned to a message's origin.
fn bounce_message(
    original: &Message,
    network: &NetworkConfig,
    reason: &str,
    now: i64,
) -> Message {
    let mut bounce = Message::netmail(network.address, original.orig);
    bounce.to = original.from.clone();
    bounce.from = "Mailer-Daemon".into();
    bounce.subject = format!("Returned mail: {}", original.subject);
    bounce.timestamp = now;
    bounce.msgid = Some(MsgId::new(network.address.to_string(), format!("{now:08x}")));
    bounce.body = format!(
        "Your message could not be delivered.\n\
         \n\
         Reason: {reason}\n\
         To: {} ({})\n\
         Subject: {}\n",
        original.to, original.dest, original.subject
    );
    bounce
}

/// Inbox entries ending in `.pkt`, case-insensitive, in name order.
fn scan_inbox(inbox: &Path) -> Result<Vec<PathBuf>> {
    let mut packets = Vec::new();
    for entry in fs::read_dir(inbox)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let is_packet = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pkt"));
        if is_packet {
            packets.push(path);
        }
    }
    packets.sort();
    Ok(packets)
}

/// Moves a consumed packet into `processed/` or `bad/`, keeping the
/// original name and uniquifying on collision.
fn move_into(path: &Path, target_dir: &Path) -> Result<()> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::storage(format!("no file name in {}", path.display())))?;
    let mut target = target_dir.join(name);
    let mut counter = 0u32;
    while target.exists() {
        counter += 1;
        target = target_dir.join(format!("{}.{counter}", name.to_string_lossy()));
    }
    fs::rename(path, &target)?;
    Ok(())
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// The tosser daemon loop: scan, sleep, react to control events.
pub async fn run_daemon(
    initial: Arc<Config>,
    sleep_override: Option<Duration>,
    mut control: ControlChannel,
) -> Result<()> {
    let mut config = initial;
    let mut totals = TossStats::default();
    let configured_level = log::max_level();

    loop {
        match Tosser::new(config.clone()).run_once() {
            Ok(stats) => totals.merge(&stats),
            Err(e) => {
                log::error!("{e}");
                return Err(e);
            }
        }

        let sleep = sleep_override.unwrap_or(config.daemon.sleep_interval);
        tokio::select! {
            _ = tokio::time::sleep(sleep) => {}
            event = control.recv() => match event {
                ControlEvent::Shutdown => {
                    log::info!("shutting down; session totals: {totals}");
                    return Ok(());
                }
                ControlEvent::Reload => match Config::load(&config.source) {
                    Ok(fresh) => {
                        config = Arc::new(fresh);
                        log::info!("configuration reloaded from {}", config.source.display());
                    }
                    Err(e) => log::error!("reload failed, keeping old configuration: {e}"),
                },
                ControlEvent::Stats => log::info!("totals: {totals}"),
                ControlEvent::ToggleDebug => {
                    let level = crate::control::toggle_debug(configured_level);
                    log::info!("log level now {level}");
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DaemonConfig, LoggingConfig, MailConfig, NewsConfig, NodeConfig};
    use ftn_dtyp::Address;
    use ftn_msg::PacketHeader;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        config: Arc<Config>,
    }

    impl Fixture {
        fn new() -> Fixture {
            let dir = TempDir::new().unwrap();
            let root = dir.path();
            let network = NetworkConfig {
                name: "testnet".into(),
                address: Address::new(1, 1, 100),
                hub: Some(Address::new(1, 1, 1)),
                hub_host: None,
                hub_port: binkp::DEFAULT_PORT,
                inbox: root.join("in"),
                outbox: root.join("out"),
                processed: root.join("done"),
                bad: root.join("bad"),
                duplicate_db: root.join("dupes.db"),
                poll_frequency: Duration::from_secs(3600),
                password: String::new(),
                domain: "testnet".into(),
                areas: vec!["LOCAL.TEST".into()],
                bounce: true,
            };
            let config = Config {
                source: root.join("ftn.ini"),
                node: NodeConfig {
                    name: "Test".into(),
                    sysop: "op".into(),
                },
                networks: vec![network],
                routes: vec![],
                mail: MailConfig {
                    inbox: root.join("mail/%USER%").to_string_lossy().into_owned(),
                },
                news: NewsConfig {
                    path: root.join("news"),
                },
                daemon: DaemonConfig {
                    pid_file: None,
                    sleep_interval: Duration::from_secs(60),
                },
                logging: LoggingConfig {
                    level: "info".into(),
                    ident: "test".into(),
                },
            };
            Fixture {
                _dir: dir,
                config: Arc::new(config),
            }
        }

        fn network(&self) -> &NetworkConfig {
            &self.config.networks[0]
        }

        fn write_packet(&self, name: &str, messages: Vec<Message>) {
            let network = self.network();
            let header = PacketHeader::new(
                Address::new(1, 2, 3),
                network.address,
                1_700_000_000,
                "",
            );
            let mut packet = Packet::new(header);
            packet.messages = messages;
            fs::create_dir_all(&network.inbox).unwrap();
            packet.save_file(network.inbox.join(name)).unwrap();
        }
    }

    fn echomail(area: &str, serial: &str) -> Message {
        let mut msg = Message::echomail(area, Address::new(1, 2, 3), Address::new(1, 1, 100));
        msg.from = "Poster".into();
        msg.to = "All".into();
        msg.subject = "test".into();
        msg.body = "echo body".into();
        msg.timestamp = 1_700_000_000;
        msg.msgid = Some(MsgId::new("1:2/3@fidonet", serial));
        msg
    }

    fn netmail_to(dest: Address, to: &str, serial: &str) -> Message {
        let mut msg = Message::netmail(Address::new(1, 2, 3), dest);
        msg.from = "Sender".into();
        msg.to = to.into();
        msg.subject = "note".into();
        msg.body = "netmail body".into();
        msg.timestamp = 1_700_000_000;
        msg.msgid = Some(MsgId::new("1:2/3@fidonet", serial));
        msg
    }

    #[test]
    fn duplicate_suppression_across_packets() {
        let fixture = Fixture::new();
        fixture.write_packet("aaaa.pkt", vec![echomail("LOCAL.TEST", "ABCDEF01")]);
        fixture.write_packet("bbbb.pkt", vec![echomail("LOCAL.TEST", "ABCDEF01")]);

        let stats = Tosser::new(fixture.config.clone()).run_once().unwrap();
        assert_eq!(stats.packets, 2);
        assert_eq!(stats.messages, 2);
        assert_eq!(stats.stored, 1);
        assert_eq!(stats.duplicates, 1);

        let network = fixture.network();
        // One article in the spool, both packets in processed/.
        let dupes = DupeDb::open(&network.duplicate_db).unwrap();
        assert_eq!(dupes.len(), 1);
        assert!(network.processed.join("aaaa.pkt").exists());
        assert!(network.processed.join("bbbb.pkt").exists());
        let spool = NewsSpool::new(&fixture.config.news.path);
        assert_eq!(spool.load_active().unwrap()[0].last, 1);
    }

    #[test]
    fn bad_packet_goes_to_quarantine() {
        let fixture = Fixture::new();
        let network = fixture.network();
        fs::create_dir_all(&network.inbox).unwrap();
        fs::write(network.inbox.join("junk.pkt"), b"7 bytes").unwrap();
        fixture.write_packet("good.pkt", vec![echomail("LOCAL.TEST", "0000BEEF")]);

        let stats = Tosser::new(fixture.config.clone()).run_once().unwrap();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.packets, 1); // the good one still processed
        assert_eq!(stats.stored, 1);
        assert!(network.bad.join("junk.pkt").exists());
        assert!(!network.inbox.join("junk.pkt").exists());
        let dupes = DupeDb::open(&network.duplicate_db).unwrap();
        assert_eq!(dupes.len(), 1); // only the good message
    }

    #[test]
    fn local_and_transit_netmail() {
        let fixture = Fixture::new();
        fixture.write_packet(
            "mix.pkt",
            vec![
                netmail_to(Address::new(1, 1, 100), "alice", "00000001"),
                netmail_to(Address::new(1, 2, 200), "bob", "00000002"),
            ],
        );

        let stats = Tosser::new(fixture.config.clone()).run_once().unwrap();
        assert_eq!(stats.stored, 1);
        assert_eq!(stats.forwarded, 1);

        // Alice's message landed in her Maildir.
        let mailbox = fixture._dir.path().join("mail/alice/new");
        let delivered: Vec<_> = fs::read_dir(&mailbox).unwrap().collect();
        assert_eq!(delivered.len(), 1);

        // Bob's message was packed for the hub.
        let outbox: Vec<_> = fs::read_dir(&fixture.network().outbox)
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(outbox.len(), 1);
        let packet = Packet::load_file(outbox[0].path()).unwrap();
        assert_eq!(packet.header.dest_address(), Address::new(1, 1, 1));
        assert_eq!(packet.messages.len(), 1);
        assert_eq!(packet.messages[0].to, "bob");
    }

    #[test]
    fn empty_inbox_is_quiet() {
        let fixture = Fixture::new();
        let stats = Tosser::new(fixture.config.clone()).run_once().unwrap();
        assert_eq!(stats, TossStats::default());
    }

    #[test]
    fn case_insensitive_packet_extension() {
        let fixture = Fixture::new();
        fixture.write_packet("upper.PKT", vec![echomail("LOCAL.TEST", "CAFE0001")]);
        let stats = Tosser::new(fixture.config.clone()).run_once().unwrap();
        assert_eq!(stats.packets, 1);
    }

    #[test]
    fn unroutable_message_bounces_to_origin() {
        let fixture = Fixture::new();
        let mut config = (*fixture.config).clone();
        config.networks[0].hub = None;
        let config = Arc::new(config);

        fixture.write_packet(
            "far.pkt",
            vec![netmail_to(Address::new(1, 9, 9), "nobody", "00000009")],
        );
        let stats = Tosser::new(config.clone()).run_once().unwrap();
        assert_eq!(stats.bounced, 1);

        let outbox: Vec<_> = fs::read_dir(&config.networks[0].outbox)
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(outbox.len(), 1);
        let packet = Packet::load_file(outbox[0].path()).unwrap();
        let bounce = &packet.messages[0];
        assert_eq!(bounce.dest, Address::new(1, 2, 3));
        assert!(bounce.subject.starts_with("Returned mail:"));
    }

    #[tokio::test]
    async fn daemon_loop_honors_shutdown_and_stats() {
        let fixture = Fixture::new();
        fixture.write_packet("one.pkt", vec![echomail("LOCAL.TEST", "FACE0001")]);
        let (tx, control) = ControlChannel::manual();
        tx.send(ControlEvent::Stats).unwrap();
        tx.send(ControlEvent::Shutdown).unwrap();

        run_daemon(fixture.config.clone(), Some(Duration::from_secs(60)), control)
            .await
            .unwrap();
        assert!(fixture.network().processed.join("one.pkt").exists());
    }
}

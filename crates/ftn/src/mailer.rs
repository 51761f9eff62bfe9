//! The mailer scheduler.
//!
//! Keeps a poll timer per network; when one comes due, dials the hub,
//! runs a binkp session as originator with the outbox contents, and
//! reschedules at the fixed poll frequency whatever the outcome. The
//! failure counter is operator telemetry, not a backoff input.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use binkp::{FileToSend, Role, Session, SessionConfig, SessionOutcome, TransferBatch};

use crate::config::{Config, NetworkConfig};
use crate::control::{ControlChannel, ControlEvent};
use crate::{Error, Result};

/// Bound on TCP connection establishment.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Floor for the scheduler's sleep between iterations.
const MIN_READY: Duration = Duration::from_secs(1);

/// Per-network scheduling state.
#[derive(Debug)]
pub struct PollState {
    pub next_poll: Instant,
    pub last_success: Option<Instant>,
    pub consecutive_failures: u32,
}

/// The mailer over one immutable configuration snapshot.
pub struct Mailer {
    config: Arc<Config>,
    states: HashMap<String, PollState>,
}

impl Mailer {
    /// All pollable networks start due immediately.
    pub fn new(config: Arc<Config>) -> Mailer {
        let now = Instant::now();
        let states = config
            .networks
            .iter()
            .filter(|n| n.hub_host.is_some())
            .map(|n| {
                (
                    n.name.clone(),
                    PollState {
                        next_poll: now,
                        last_success: None,
                        consecutive_failures: 0,
                    },
                )
            })
            .collect();
        Mailer { config, states }
    }

    /// Replaces the configuration, keeping poll state for networks
    /// that survive the reload.
    pub fn reconfigure(&mut self, config: Arc<Config>) {
        let now = Instant::now();
        let mut states = std::mem::take(&mut self.states);
        self.states = config
            .networks
            .iter()
            .filter(|n| n.hub_host.is_some())
            .map(|n| {
                let state = states.remove(&n.name).unwrap_or(PollState {
                    next_poll: now,
                    last_success: None,
                    consecutive_failures: 0,
                });
                (n.name.clone(), state)
            })
            .collect();
        self.config = config;
    }

    /// Polls every network whose timer has expired; returns how many
    /// sessions ran.
    pub async fn poll_due(&mut self) -> usize {
        let now = Instant::now();
        let due: Vec<String> = self
            .states
            .iter()
            .filter(|(_, s)| s.next_poll <= now)
            .map(|(name, _)| name.clone())
            .collect();

        let mut polled = 0;
        for name in due {
            let Some(network) = self.config.network(&name).cloned() else {
                continue;
            };
            polled += 1;
            let result = poll_network(&self.config, &network).await;
            let state = self.states.get_mut(&name).expect("state exists");
            match result {
                Ok(outcome) => {
                    state.last_success = Some(Instant::now());
                    state.consecutive_failures = 0;
                    log::info!(
                        "{name}: session with {:?} done, sent {} file(s), received {}",
                        outcome.remote_addresses,
                        outcome.sent.len(),
                        outcome.received.len()
                    );
                }
                Err(e) => {
                    state.consecutive_failures += 1;
                    log::warn!(
                        "{name}: session failed ({} consecutive): {e}",
                        state.consecutive_failures
                    );
                }
            }
            // Fixed cadence, success or not.
            state.next_poll = Instant::now() + network.poll_frequency;
        }
        polled
    }

    /// How long until the next poll is due, floored at one second.
    pub fn ready_in(&self) -> Duration {
        let now = Instant::now();
        self.states
            .values()
            .map(|s| s.next_poll.saturating_duration_since(now))
            .min()
            .unwrap_or(Duration::from_secs(3600))
            .max(MIN_READY)
    }

    pub fn state(&self, network: &str) -> Option<&PollState> {
        self.states.get(network)
    }
}

/// One outbound session: dial the hub, push the outbox, pull inbound
/// packets into the network inbox for the tosser.
pub async fn poll_network(
    config: &Config,
    network: &NetworkConfig,
) -> Result<SessionOutcome> {
    let host = network
        .hub_host
        .as_deref()
        .ok_or_else(|| Error::config(format!("[{}] has no hub_host", network.name)))?;

    fs::create_dir_all(&network.inbox)?;
    fs::create_dir_all(&network.outbox)?;

    let mut batch = TransferBatch::new(&network.inbox);
    let mut queued = 0;
    for path in outbox_files(network)? {
        batch.enqueue(FileToSend::from_path(&path).await?);
        queued += 1;
    }
    log::debug!("{}: {queued} file(s) queued for {host}", network.name);

    let stream = binkp::tcp::connect(host, network.hub_port, CONNECT_TIMEOUT).await?;
    let session_config = SessionConfig {
        addresses: vec![network.address],
        system_name: config.node.name.clone(),
        sysop: config.node.sysop.clone(),
        password: network.password.clone(),
        ..Default::default()
    };
    let outcome = Session::run(stream, Role::Originator, session_config, batch).await?;
    Ok(outcome)
}

/// Everything in the outbox, name order; the whole spool goes into the
/// batch, packets and attached files alike.
fn outbox_files(network: &NetworkConfig) -> Result<Vec<std::path::PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(&network.outbox)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// The mailer daemon loop.
pub async fn run_daemon(
    initial: Arc<Config>,
    sleep_override: Option<Duration>,
    mut control: ControlChannel,
) -> Result<()> {
    let mut mailer = Mailer::new(initial);
    let configured_level = log::max_level();

    loop {
        mailer.poll_due().await;
        let sleep = sleep_override.unwrap_or_else(|| mailer.ready_in());
        tokio::select! {
            _ = tokio::time::sleep(sleep) => {}
            event = control.recv() => match event {
                ControlEvent::Shutdown => {
                    log::info!("shutting down");
                    return Ok(());
                }
                ControlEvent::Reload => match Config::load(&mailer.config.source) {
                    Ok(fresh) => {
                        mailer.reconfigure(Arc::new(fresh));
                        log::info!("configuration reloaded");
                    }
                    Err(e) => log::error!("reload failed, keeping old configuration: {e}"),
                },
                ControlEvent::Stats => {
                    for (name, state) in &mailer.states {
                        log::info!(
                            "{name}: failures={} last_success={:?}",
                            state.consecutive_failures,
                            state.last_success
                        );
                    }
                }
                ControlEvent::ToggleDebug => {
                    let level = crate::control::toggle_debug(configured_level);
                    log::info!("log level now {level}");
                }
            },
        }
    }
}

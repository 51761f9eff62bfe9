//! INI configuration loading.
//!
//! Section and key names are case-insensitive. Besides the fixed
//! sections (`[node]`, `[mail]`, `[news]`, `[daemon]`, `[logging]`),
//! every `[route:<name>]` section defines a routing rule and every
//! other section defines a network. Loading produces an immutable
//! [`Config`] value; a reload builds a whole new one and the daemons
//! swap the `Arc`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use configparser::ini::Ini;
use ftn_dtyp::Address;

use crate::route::{RouteAction, RoutingRule};
use crate::{Error, Result};

const FIXED_SECTIONS: [&str; 5] = ["node", "mail", "news", "daemon", "logging"];
const ROUTE_PREFIX: &str = "route:";

/// `[node]` — identity of this system.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub name: String,
    pub sysop: String,
}

/// A per-network section: our address, the hub, the spool directories
/// and the link parameters.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub name: String,
    pub address: Address,
    pub hub: Option<Address>,
    pub hub_host: Option<String>,
    pub hub_port: u16,
    pub inbox: PathBuf,
    pub outbox: PathBuf,
    pub processed: PathBuf,
    pub bad: PathBuf,
    pub duplicate_db: PathBuf,
    pub poll_frequency: Duration,
    pub password: String,
    pub domain: String,
    /// Echo areas carried locally by this network.
    pub areas: Vec<String>,
    /// Generate bounce netmail for undeliverable messages.
    pub bounce: bool,
}

impl NetworkConfig {
    /// Whether `area` is carried locally (case-insensitive).
    pub fn has_area(&self, area: &str) -> bool {
        self.areas.iter().any(|a| a.eq_ignore_ascii_case(area))
    }
}

/// `[mail]` — Maildir delivery.
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// Template with `%USER%`/`%NETWORK%` substitutions.
    pub inbox: String,
}

/// `[news]` — news spool root.
#[derive(Debug, Clone)]
pub struct NewsConfig {
    pub path: PathBuf,
}

/// `[daemon]` — daemon-mode plumbing.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub pid_file: Option<PathBuf>,
    pub sleep_interval: Duration,
}

/// `[logging]` — log identity and default level.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub ident: String,
}

/// The complete, validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// The file this configuration was loaded from, kept for reloads.
    pub source: PathBuf,
    pub node: NodeConfig,
    pub networks: Vec<NetworkConfig>,
    pub routes: Vec<RoutingRule>,
    pub mail: MailConfig,
    pub news: NewsConfig,
    pub daemon: DaemonConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let mut ini = Ini::new();
        ini.load(path)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))?;
        Self::from_ini(path, &ini)
    }

    fn from_ini(path: &Path, ini: &Ini) -> Result<Config> {
        let node = NodeConfig {
            name: ini
                .get("node", "name")
                .unwrap_or_else(|| "Unnamed System".into()),
            sysop: ini.get("node", "sysop").unwrap_or_else(|| "Sysop".into()),
        };

        let mut networks = Vec::new();
        let mut routes = Vec::new();
        for section in ini.sections() {
            if FIXED_SECTIONS.contains(&section.as_str()) {
                continue;
            }
            if let Some(rule_name) = section.strip_prefix(ROUTE_PREFIX) {
                routes.push(load_route(ini, &section, rule_name)?);
            } else {
                networks.push(load_network(ini, &section)?);
            }
        }
        if networks.is_empty() {
            return Err(Error::config("no network sections defined"));
        }
        // Ascending priority; ties keep file order.
        routes.sort_by_key(|r| r.priority);

        let mail = MailConfig {
            inbox: ini
                .get("mail", "inbox")
                .unwrap_or_else(|| "/var/spool/mail/%USER%".into()),
        };
        let news = NewsConfig {
            path: ini
                .get("news", "path")
                .map(PathBuf::from)
                .unwrap_or_else(|| "/var/spool/news".into()),
        };
        let daemon = DaemonConfig {
            pid_file: ini.get("daemon", "pid_file").map(PathBuf::from),
            sleep_interval: Duration::from_secs(get_u64(
                ini,
                "daemon",
                "sleep_interval",
                60,
            )?),
        };
        let logging = LoggingConfig {
            level: ini.get("logging", "level").unwrap_or_else(|| "info".into()),
            ident: ini.get("logging", "ident").unwrap_or_else(|| "ftn".into()),
        };

        Ok(Config {
            source: path.to_path_buf(),
            node,
            networks,
            routes,
            mail,
            news,
            daemon,
            logging,
        })
    }

    pub fn network(&self, name: &str) -> Option<&NetworkConfig> {
        self.networks
            .iter()
            .find(|n| n.name.eq_ignore_ascii_case(name))
    }

    /// Whether `address` is one of ours in any configured network.
    pub fn is_local_address(&self, address: &Address) -> bool {
        self.networks.iter().any(|n| n.address == *address)
    }
}

fn load_network(ini: &Ini, section: &str) -> Result<NetworkConfig> {
    let require = |key: &str| {
        ini.get(section, key)
            .ok_or_else(|| Error::config(format!("[{section}] is missing `{key}`")))
    };
    let address: Address = require("address")?
        .parse()
        .map_err(|e| Error::config(format!("[{section}] address: {e}")))?;
    let hub = match ini.get(section, "hub") {
        Some(raw) => Some(
            raw.parse::<Address>()
                .map_err(|e| Error::config(format!("[{section}] hub: {e}")))?,
        ),
        None => None,
    };

    let spool_default = |key: &str| PathBuf::from(format!("/var/spool/ftn/{section}/{key}"));
    let dir = |key: &str| {
        ini.get(section, key)
            .map(PathBuf::from)
            .unwrap_or_else(|| spool_default(key))
    };

    Ok(NetworkConfig {
        name: section.to_string(),
        address,
        hub,
        hub_host: ini.get(section, "hub_host"),
        hub_port: get_u64(ini, section, "hub_port", binkp::DEFAULT_PORT as u64)? as u16,
        inbox: dir("inbox"),
        outbox: dir("outbox"),
        processed: dir("processed"),
        bad: dir("bad"),
        duplicate_db: ini
            .get(section, "duplicate_db")
            .map(PathBuf::from)
            .unwrap_or_else(|| spool_default("dupes.db")),
        poll_frequency: Duration::from_secs(get_u64(ini, section, "poll_frequency", 3600)?),
        password: ini.get(section, "password").unwrap_or_default(),
        domain: ini
            .get(section, "domain")
            .unwrap_or_else(|| section.to_string()),
        areas: ini
            .get(section, "areas")
            .map(|raw| {
                raw.split([',', ' '])
                    .filter(|a| !a.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        bounce: get_bool(ini, section, "bounce", true)?,
    })
}

fn load_route(ini: &Ini, section: &str, name: &str) -> Result<RoutingRule> {
    let pattern = ini
        .get(section, "pattern")
        .ok_or_else(|| Error::config(format!("[{section}] is missing `pattern`")))?;
    let action_raw = ini
        .get(section, "action")
        .ok_or_else(|| Error::config(format!("[{section}] is missing `action`")))?;
    let action = match action_raw.to_ascii_lowercase().as_str() {
        "localmail" => RouteAction::LocalMail,
        "localnews" => RouteAction::LocalNews,
        "forward" => RouteAction::Forward,
        "bounce" => RouteAction::Bounce,
        "drop" => RouteAction::Drop,
        other => {
            return Err(Error::config(format!(
                "[{section}] unknown action `{other}`"
            )))
        }
    };
    Ok(RoutingRule {
        name: name.to_string(),
        pattern,
        action,
        parameter: ini.get(section, "param"),
        priority: get_u64(ini, section, "priority", 100)? as i64,
    })
}

fn get_u64(ini: &Ini, section: &str, key: &str, default: u64) -> Result<u64> {
    match ini.get(section, key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::config(format!("[{section}] {key}: not a number: {raw}"))),
        None => Ok(default),
    }
}

fn get_bool(ini: &Ini, section: &str, key: &str, default: bool) -> Result<bool> {
    match ini.get(section, key) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            other => Err(Error::config(format!(
                "[{section}] {key}: not a boolean: {other}"
            ))),
        },
        None => Ok(default),
    }
}

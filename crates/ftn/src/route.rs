//! Message routing.
//!
//! Routing is a pure function of the message, the rule set and the
//! network configuration: classify, scan ordered rules, then apply the
//! default policy. No I/O happens here.

use std::path::PathBuf;

use ftn_dtyp::{Address, AddressPattern, Message};

use crate::config::{Config, NetworkConfig};
use crate::template::{self, Substitutions};
use crate::{Error, Result};

/// Rule action, as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAction {
    LocalMail,
    LocalNews,
    Forward,
    Bounce,
    Drop,
}

/// One ordered routing rule.
#[derive(Debug, Clone)]
pub struct RoutingRule {
    pub name: String,
    /// An area name (trailing `*` for prefix match) or an address
    /// pattern with `*` wildcards.
    pub pattern: String,
    pub action: RouteAction,
    pub parameter: Option<String>,
    pub priority: i64,
}

impl RoutingRule {
    /// Whether this rule matches the message's area, destination or
    /// source.
    fn matches(&self, message: &Message) -> bool {
        if let Ok(pattern) = self.pattern.parse::<AddressPattern>() {
            return pattern.matches(&message.dest) || pattern.matches(&message.orig);
        }
        let Some(area) = message.area() else {
            return false;
        };
        match self.pattern.strip_suffix('*') {
            Some(prefix) => area
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix)),
            None => area.eq_ignore_ascii_case(&self.pattern),
        }
    }
}

/// Where a message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    LocalMail { user: String, mailbox: PathBuf },
    LocalNews { area: String, spool: PathBuf },
    Forward { address: Address, network: String },
    Bounce { reason: String },
    Drop { reason: String },
}

/// Routes one message. The first matching rule in priority order wins;
/// without a match the default policy applies: local areas post to
/// news, mail to an owned address delivers locally, everything else
/// forwards to the hub or bounces when there is none.
pub fn route_message(
    message: &Message,
    network: &NetworkConfig,
    config: &Config,
) -> Result<RoutingDecision> {
    for rule in &config.routes {
        if rule.matches(message) {
            log::trace!("rule {} matches", rule.name);
            return apply_rule(rule, message, network, config);
        }
    }

    if let Some(area) = message.area() {
        if network.has_area(area) {
            return Ok(RoutingDecision::LocalNews {
                area: area.to_string(),
                spool: config.news.path.clone(),
            });
        }
    } else if config.is_local_address(&message.dest) {
        return local_mail(&message.to, network, config);
    }

    forward_to_hub(network, "no matching rule")
}

fn apply_rule(
    rule: &RoutingRule,
    message: &Message,
    network: &NetworkConfig,
    config: &Config,
) -> Result<RoutingDecision> {
    match rule.action {
        RouteAction::LocalMail => {
            let user = rule.parameter.clone().unwrap_or_else(|| message.to.clone());
            local_mail(&user, network, config)
        }
        RouteAction::LocalNews => {
            let area = match (&rule.parameter, message.area()) {
                (Some(parameter), _) => parameter.clone(),
                (None, Some(area)) => area.to_string(),
                (None, None) => {
                    return Err(Error::Route(format!(
                        "rule {} posts netmail to news without an area",
                        rule.name
                    )))
                }
            };
            Ok(RoutingDecision::LocalNews {
                area,
                spool: config.news.path.clone(),
            })
        }
        RouteAction::Forward => match &rule.parameter {
            Some(parameter) => {
                let address = parameter.parse().map_err(|e| {
                    Error::Route(format!("rule {}: bad forward address: {e}", rule.name))
                })?;
                Ok(RoutingDecision::Forward {
                    address,
                    network: network.name.clone(),
                })
            }
            None => forward_to_hub(network, "forward rule without parameter"),
        },
        RouteAction::Bounce => Ok(RoutingDecision::Bounce {
            reason: rule
                .parameter
                .clone()
                .unwrap_or_else(|| format!("refused by rule {}", rule.name)),
        }),
        RouteAction::Drop => Ok(RoutingDecision::Drop {
            reason: rule
                .parameter
                .clone()
                .unwrap_or_else(|| format!("dropped by rule {}", rule.name)),
        }),
    }
}

fn local_mail(user: &str, network: &NetworkConfig, config: &Config) -> Result<RoutingDecision> {
    let subs = Substitutions::new(user, &network.name);
    let mailbox = PathBuf::from(template::expand(&config.mail.inbox, &subs)?);
    Ok(RoutingDecision::LocalMail {
        user: subs.user.clone(),
        mailbox,
    })
}

fn forward_to_hub(network: &NetworkConfig, context: &str) -> Result<RoutingDecision> {
    match network.hub {
        Some(address) => Ok(RoutingDecision::Forward {
            address,
            network: network.name.clone(),
        }),
        None => Ok(RoutingDecision::Bounce {
            reason: format!("{context} and no hub configured for {}", network.name),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::{DaemonConfig, LoggingConfig, MailConfig, NewsConfig, NodeConfig};

    fn test_network() -> NetworkConfig {
        NetworkConfig {
            name: "fidonet".into(),
            address: Address::new(1, 1, 100),
            hub: Some(Address::new(1, 1, 1)),
            hub_host: None,
            hub_port: binkp::DEFAULT_PORT,
            inbox: "/tmp/in".into(),
            outbox: "/tmp/out".into(),
            processed: "/tmp/done".into(),
            bad: "/tmp/bad".into(),
            duplicate_db: "/tmp/dupes.db".into(),
            poll_frequency: Duration::from_secs(3600),
            password: String::new(),
            domain: "fidonet".into(),
            areas: vec!["LOCAL.TEST".into()],
            bounce: true,
        }
    }

    fn test_config(network: NetworkConfig, routes: Vec<RoutingRule>) -> Config {
        Config {
            source: "/dev/null".into(),
            node: NodeConfig {
                name: "test".into(),
                sysop: "op".into(),
            },
            networks: vec![network],
            routes,
            mail: MailConfig {
                inbox: "/var/spool/mail/%USER%".into(),
            },
            news: NewsConfig {
                path: "/var/spool/news".into(),
            },
            daemon: DaemonConfig {
                pid_file: None,
                sleep_interval: Duration::from_secs(60),
            },
            logging: LoggingConfig {
                level: "info".into(),
                ident: "test".into(),
            },
        }
    }

    fn netmail_to(dest: Address, to: &str) -> Message {
        let mut msg = Message::netmail(Address::new(1, 2, 3), dest);
        msg.to = to.into();
        msg
    }

    #[test]
    fn local_netmail_delivers_to_mailbox() {
        let config = test_config(test_network(), vec![]);
        let msg = netmail_to(Address::new(1, 1, 100), "Alice");
        let decision = route_message(&msg, &config.networks[0], &config).unwrap();
        assert_eq!(
            decision,
            RoutingDecision::LocalMail {
                user: "alice".into(),
                mailbox: "/var/spool/mail/alice".into(),
            }
        );
    }

    #[test]
    fn transit_netmail_forwards_to_hub() {
        let config = test_config(test_network(), vec![]);
        let msg = netmail_to(Address::new(1, 2, 200), "bob");
        let decision = route_message(&msg, &config.networks[0], &config).unwrap();
        assert_eq!(
            decision,
            RoutingDecision::Forward {
                address: Address::new(1, 1, 1),
                network: "fidonet".into(),
            }
        );
    }

    #[test]
    fn no_hub_bounces() {
        let mut network = test_network();
        network.hub = None;
        let config = test_config(network, vec![]);
        let msg = netmail_to(Address::new(1, 2, 200), "bob");
        let decision = route_message(&msg, &config.networks[0], &config).unwrap();
        assert!(matches!(decision, RoutingDecision::Bounce { .. }));
    }

    #[test]
    fn known_area_posts_to_news() {
        let config = test_config(test_network(), vec![]);
        let msg = Message::echomail("LOCAL.TEST", Address::new(1, 2, 3), Address::new(1, 1, 100));
        let decision = route_message(&msg, &config.networks[0], &config).unwrap();
        assert_eq!(
            decision,
            RoutingDecision::LocalNews {
                area: "LOCAL.TEST".into(),
                spool: "/var/spool/news".into(),
            }
        );
    }

    #[test]
    fn unknown_area_forwards() {
        let config = test_config(test_network(), vec![]);
        let msg = Message::echomail("ELSEWHERE", Address::new(1, 2, 3), Address::new(1, 1, 100));
        let decision = route_message(&msg, &config.networks[0], &config).unwrap();
        assert!(matches!(decision, RoutingDecision::Forward { .. }));
    }

    #[test]
    fn rules_win_over_defaults_in_priority_order() {
        let rules = vec![
            RoutingRule {
                name: "first".into(),
                pattern: "LOCAL.*".into(),
                action: RouteAction::Drop,
                parameter: None,
                priority: 10,
            },
            RoutingRule {
                name: "second".into(),
                pattern: "LOCAL.TEST".into(),
                action: RouteAction::LocalNews,
                parameter: None,
                priority: 20,
            },
        ];
        let config = test_config(test_network(), rules);
        let msg = Message::echomail("LOCAL.TEST", Address::new(1, 2, 3), Address::new(1, 1, 100));
        let decision = route_message(&msg, &config.networks[0], &config).unwrap();
        assert!(matches!(decision, RoutingDecision::Drop { .. }));
    }

    #[test]
    fn address_pattern_rules_match_either_endpoint() {
        let rules = vec![RoutingRule {
            name: "zone9".into(),
            pattern: "9:*/*".into(),
            action: RouteAction::Forward,
            parameter: Some("1:1/9".into()),
            priority: 5,
        }];
        let config = test_config(test_network(), rules);

        let to_zone9 = netmail_to(Address::new(9, 1, 1), "x");
        let decision = route_message(&to_zone9, &config.networks[0], &config).unwrap();
        assert_eq!(
            decision,
            RoutingDecision::Forward {
                address: Address::new(1, 1, 9),
                network: "fidonet".into(),
            }
        );

        let mut from_zone9 = netmail_to(Address::new(1, 1, 100), "x");
        from_zone9.orig = Address::new(9, 2, 2);
        let decision = route_message(&from_zone9, &config.networks[0], &config).unwrap();
        assert!(matches!(decision, RoutingDecision::Forward { .. }));
    }

    #[test]
    fn decision_depends_only_on_inputs() {
        let config = test_config(test_network(), vec![]);
        let msg = netmail_to(Address::new(1, 1, 100), "Carol");
        let first = route_message(&msg, &config.networks[0], &config).unwrap();
        let second = route_message(&msg, &config.networks[0], &config).unwrap();
        assert_eq!(first, second);
    }
}

//! FTN network addresses and address patterns.

use std::fmt;
use std::str::FromStr;

/// A 4-D FTN network address.
///
/// The textual form is `Z:N/F` or `Z:N/F.P`; a zero point denotes the
/// node itself and is omitted from the display form.
///
/// Reference: FRL-1002
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    pub zone: u16,
    pub net: u16,
    pub node: u16,
    pub point: u16,
}

impl Address {
    pub fn new(zone: u16, net: u16, node: u16) -> Self {
        Address {
            zone,
            net,
            node,
            point: 0,
        }
    }

    pub fn with_point(mut self, point: u16) -> Self {
        self.point = point;
        self
    }

    /// Whether this address refers to a node rather than a point.
    #[inline]
    pub fn is_node(&self) -> bool {
        self.point == 0
    }

    /// The boss node of a point address; the address itself for nodes.
    pub fn node_address(&self) -> Address {
        Address {
            point: 0,
            ..*self
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.point == 0 {
            write!(f, "{}:{}/{}", self.zone, self.net, self.node)
        } else {
            write!(f, "{}:{}/{}.{}", self.zone, self.net, self.node, self.point)
        }
    }
}

/// Error parsing an [`Address`] or [`AddressPattern`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    #[error("malformed address `{0}`: expected Z:N/F[.P]")]
    Malformed(String),
    #[error("address component out of range in `{0}`")]
    OutOfRange(String),
    #[error("zone must be >= 1 in `{0}`")]
    ZeroZone(String),
}

fn split_components(s: &str) -> Option<(&str, &str, &str, Option<&str>)> {
    let (zone, rest) = s.split_once(':')?;
    let (net, rest) = rest.split_once('/')?;
    match rest.split_once('.') {
        Some((node, point)) => Some((zone, net, node, Some(point))),
        None => Some((zone, net, rest, None)),
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (zone, net, node, point) =
            split_components(s).ok_or_else(|| AddressParseError::Malformed(s.to_string()))?;
        let parse = |part: &str| {
            part.parse::<u16>()
                .map_err(|_| AddressParseError::OutOfRange(s.to_string()))
        };
        let address = Address {
            zone: parse(zone)?,
            net: parse(net)?,
            node: parse(node)?,
            point: point.map(parse).transpose()?.unwrap_or(0),
        };
        if address.zone == 0 {
            return Err(AddressParseError::ZeroZone(s.to_string()));
        }
        Ok(address)
    }
}

/// One component of an [`AddressPattern`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component {
    Any,
    Exact(u16),
}

impl Component {
    fn matches(&self, value: u16) -> bool {
        match self {
            Component::Any => true,
            Component::Exact(v) => *v == value,
        }
    }

    fn parse(part: &str, full: &str) -> Result<Self, AddressParseError> {
        if part == "*" {
            Ok(Component::Any)
        } else {
            part.parse::<u16>()
                .map(Component::Exact)
                .map_err(|_| AddressParseError::OutOfRange(full.to_string()))
        }
    }
}

/// An address pattern with `*` wildcards permitted in any component.
///
/// `1:1/*` matches any node in zone 1, net 1. A pattern without an
/// explicit point component matches any point of the matched node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressPattern {
    zone: Component,
    net: Component,
    node: Component,
    point: Component,
}

impl AddressPattern {
    pub fn matches(&self, address: &Address) -> bool {
        self.zone.matches(address.zone)
            && self.net.matches(address.net)
            && self.node.matches(address.node)
            && self.point.matches(address.point)
    }
}

impl FromStr for AddressPattern {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (zone, net, node, point) =
            split_components(s).ok_or_else(|| AddressParseError::Malformed(s.to_string()))?;
        Ok(AddressPattern {
            zone: Component::parse(zone, s)?,
            net: Component::parse(net, s)?,
            node: Component::parse(node, s)?,
            point: match point {
                Some(p) => Component::parse(p, s)?,
                None => Component::Any,
            },
        })
    }
}

impl fmt::Display for AddressPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let part = |c: &Component| match c {
            Component::Any => "*".to_string(),
            Component::Exact(v) => v.to_string(),
        };
        write!(
            f,
            "{}:{}/{}",
            part(&self.zone),
            part(&self.net),
            part(&self.node)
        )?;
        if let Component::Exact(p) = self.point {
            write!(f, ".{p}")?;
        }
        Ok(())
    }
}

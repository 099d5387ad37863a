//! Compiled permission predicates.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use super::config::PermissionConfig;
use super::error::{RbacError, RbacResult};

/// Header mapping supplied by the upper protocol layer.
pub type HeaderMap = HashMap<String, String>;

/// Read-only view of a connection consumed by the access control engine.
///
/// The engine only ever needs the destination of the traffic, which for
/// a proxy-side evaluation is the connection's local address.
pub trait ConnectionAccessor {
    /// The connection's local (destination) address, if established.
    fn local_addr(&self) -> Option<SocketAddr>;
}

impl ConnectionAccessor for crate::network::Connection {
    fn local_addr(&self) -> Option<SocketAddr> {
        crate::network::Connection::local_addr(self)
    }
}

/// A parsed IPv4 CIDR range.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CidrRange {
    network: u32,
    mask: u32,
}

impl CidrRange {
    /// Parse `a.b.c.d/len` or a bare address (treated as /32).
    pub(crate) fn parse(addr: &str) -> RbacResult<Self> {
        let (ip_str, prefix_len) = if let Some((ip, prefix)) = addr.split_once('/') {
            let prefix_len: u8 = prefix.parse().map_err(|_| {
                RbacError::InvalidCidr(format!("invalid prefix length in '{addr}'"))
            })?;
            if prefix_len > 32 {
                return Err(RbacError::InvalidCidr(format!(
                    "prefix length must be 0-32, got {prefix_len}"
                )));
            }
            (ip, prefix_len)
        } else {
            (addr, 32)
        };

        let network = parse_ipv4(ip_str)?;
        let mask = if prefix_len == 0 {
            0
        } else {
            !0u32 << (32 - prefix_len)
        };

        Ok(Self {
            network: network & mask,
            mask,
        })
    }

    /// Whether `ip` falls inside this range. Only IPv4 is matched.
    pub(crate) fn contains(&self, ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => (u32::from(v4) & self.mask) == self.network,
            IpAddr::V6(_) => false,
        }
    }
}

/// Parse a dotted-quad IPv4 address to u32.
fn parse_ipv4(ip: &str) -> RbacResult<u32> {
    ip.parse::<std::net::Ipv4Addr>()
        .map(u32::from)
        .map_err(|_| RbacError::InvalidIpAddress(ip.to_string()))
}

/// A compiled permission predicate.
#[derive(Debug, Clone)]
pub(crate) enum Permission {
    Any,
    DestinationIp(CidrRange),
    DestinationPort(u16),
    HeaderPresent { name: String },
    HeaderValue { name: String, value: String },
    AndRules(Vec<Permission>),
    OrRules(Vec<Permission>),
}

impl Permission {
    /// Compile a configured predicate, validating CIDR ranges up front.
    pub(crate) fn compile(config: &PermissionConfig) -> RbacResult<Self> {
        Ok(match config {
            PermissionConfig::Any => Permission::Any,
            PermissionConfig::DestinationIp { address } => {
                Permission::DestinationIp(CidrRange::parse(address)?)
            }
            PermissionConfig::DestinationPort { port } => Permission::DestinationPort(*port),
            PermissionConfig::HeaderPresent { name } => Permission::HeaderPresent {
                name: name.clone(),
            },
            PermissionConfig::HeaderValue { name, value } => Permission::HeaderValue {
                name: name.clone(),
                value: value.clone(),
            },
            PermissionConfig::AndRules { rules } => Permission::AndRules(
                rules.iter().map(Permission::compile).collect::<RbacResult<_>>()?,
            ),
            PermissionConfig::OrRules { rules } => Permission::OrRules(
                rules.iter().map(Permission::compile).collect::<RbacResult<_>>()?,
            ),
        })
    }

    /// Evaluate this predicate.
    ///
    /// A predicate that cannot be evaluated against the inputs it needs
    /// (no connection, no headers) does not match.
    pub(crate) fn matches(
        &self,
        conn: Option<&dyn ConnectionAccessor>,
        headers: Option<&HeaderMap>,
    ) -> bool {
        match self {
            Permission::Any => true,

            Permission::DestinationIp(range) => conn
                .and_then(ConnectionAccessor::local_addr)
                .map(|addr| range.contains(addr.ip()))
                .unwrap_or(false),

            Permission::DestinationPort(port) => conn
                .and_then(ConnectionAccessor::local_addr)
                .map(|addr| addr.port() == *port)
                .unwrap_or(false),

            Permission::HeaderPresent { name } => headers
                .map(|h| h.contains_key(name))
                .unwrap_or(false),

            Permission::HeaderValue { name, value } => headers
                .and_then(|h| h.get(name))
                .map(|v| v == value)
                .unwrap_or(false),

            Permission::AndRules(rules) => rules.iter().all(|r| r.matches(conn, headers)),

            Permission::OrRules(rules) => rules.iter().any(|r| r.matches(conn, headers)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    struct FixedAddr(Option<SocketAddr>);

    impl ConnectionAccessor for FixedAddr {
        fn local_addr(&self) -> Option<SocketAddr> {
            self.0
        }
    }

    fn addr(ip: [u8; 4], port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::from(ip)), port)
    }

    #[test]
    fn test_cidr_parse_and_contains() {
        let range = CidrRange::parse("1.2.3.0/24").unwrap();
        assert!(range.contains(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4))));
        assert!(range.contains(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 100))));
        assert!(!range.contains(IpAddr::V4(Ipv4Addr::new(1, 2, 4, 1))));

        // Bare address is /32.
        let single = CidrRange::parse("10.0.0.1").unwrap();
        assert!(single.contains(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));
        assert!(!single.contains(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))));
    }

    #[test]
    fn test_cidr_parse_rejects_garbage() {
        assert!(CidrRange::parse("1.2.3.0/40").is_err());
        assert!(CidrRange::parse("1.2.3/24").is_err());
        assert!(CidrRange::parse("not-an-ip").is_err());
    }

    #[test]
    fn test_destination_predicates() {
        let conn = FixedAddr(Some(addr([1, 2, 3, 4], 8080)));

        let ip_rule = Permission::DestinationIp(CidrRange::parse("1.2.3.0/24").unwrap());
        assert!(ip_rule.matches(Some(&conn), None));

        let port_rule = Permission::DestinationPort(8080);
        assert!(port_rule.matches(Some(&conn), None));
        assert!(!Permission::DestinationPort(8888).matches(Some(&conn), None));

        // Unevaluable predicates do not match.
        assert!(!ip_rule.matches(None, None));
        assert!(!port_rule.matches(Some(&FixedAddr(None)), None));
    }

    #[test]
    fn test_header_predicates() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Custom-Header".to_string(), "123".to_string());

        let present = Permission::HeaderPresent {
            name: "X-Custom-Header".to_string(),
        };
        assert!(present.matches(None, Some(&headers)));
        assert!(!present.matches(None, None));

        let value = Permission::HeaderValue {
            name: "X-Custom-Header".to_string(),
            value: "123".to_string(),
        };
        assert!(value.matches(None, Some(&headers)));

        headers.insert("X-Custom-Header".to_string(), "456".to_string());
        assert!(!value.matches(None, Some(&headers)));
    }

    #[test]
    fn test_and_or_composition() {
        let conn = FixedAddr(Some(addr([10, 0, 0, 1], 443)));

        let and = Permission::AndRules(vec![
            Permission::DestinationIp(CidrRange::parse("10.0.0.0/8").unwrap()),
            Permission::DestinationPort(443),
        ]);
        assert!(and.matches(Some(&conn), None));

        let and_miss = Permission::AndRules(vec![
            Permission::DestinationIp(CidrRange::parse("10.0.0.0/8").unwrap()),
            Permission::DestinationPort(80),
        ]);
        assert!(!and_miss.matches(Some(&conn), None));

        let or = Permission::OrRules(vec![
            Permission::DestinationPort(80),
            Permission::DestinationPort(443),
        ]);
        assert!(or.matches(Some(&conn), None));
    }
}

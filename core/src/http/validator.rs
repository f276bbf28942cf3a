use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use log::debug;
use hyper::client::connect::dns::Name;
use reqwest::dns::{Addrs, Resolve, Resolving};
use url::{Host, Url};

use crate::error::ValidationError;

/// Cloud metadata endpoints and other hostnames that must never be fetched.
const BLOCKED_HOSTS: &[&str] = &[
    "localhost",
    "metadata",
    "metadata.google.internal",
    "metadata.azure.com",
    "instance-data",
    "instance-data.ec2.internal",
    "169.254.169.254",
    "100.100.100.200",
    "fd00:ec2::254",
];

/// Ports of databases, caches and control planes commonly reachable only internally.
const BLOCKED_PORTS: &[u16] = &[
    22, 23, 25, 111, 135, 139, 445, 2375, 2376, 2379, 3306, 5432, 5984, 6379, 9200, 9300,
    11211, 27017,
];

/// SSRF guard consulted before every outbound request.
#[derive(Debug, Clone, Default)]
pub struct UrlValidator {
    allow_internal: bool,
}

impl UrlValidator {
    pub fn new(allow_internal: bool) -> Self {
        Self { allow_internal }
    }

    /// Parses and checks a URL string without touching the network.
    pub fn parse(&self, raw: &str) -> Result<Url, ValidationError> {
        let url = Url::parse(raw.trim()).map_err(|_| ValidationError::Malformed(raw.to_string()))?;
        self.check(&url)?;
        Ok(url)
    }

    /// Static checks: scheme, host presence, blocklists and literal IPs.
    pub fn check(&self, url: &Url) -> Result<(), ValidationError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ValidationError::UnsupportedScheme(url.scheme().to_string()));
        }

        let host = url.host().ok_or(ValidationError::MissingHost)?;

        if self.allow_internal {
            return Ok(());
        }

        match host {
            Host::Domain(domain) => {
                let domain = domain.trim_end_matches('.').to_lowercase();
                if BLOCKED_HOSTS.contains(&domain.as_str()) || domain.ends_with(".localhost") {
                    return Err(ValidationError::BlockedHost(domain));
                }
            }
            Host::Ipv4(ip) => check_ip(IpAddr::V4(ip))?,
            Host::Ipv6(ip) => {
                if BLOCKED_HOSTS.contains(&ip.to_string().as_str()) {
                    return Err(ValidationError::BlockedHost(ip.to_string()));
                }
                check_ip(IpAddr::V6(ip))?
            }
        }

        if let Some(port) = url.port() {
            if BLOCKED_PORTS.contains(&port) {
                return Err(ValidationError::BlockedPort(port));
            }
        }

        Ok(())
    }

    /// Runs [`check`](Self::check), then resolves domain names and rejects the
    /// URL if any resolved address is internal.
    pub async fn check_resolved(&self, url: &Url) -> Result<(), ValidationError> {
        self.check(url)?;
        if self.allow_internal {
            return Ok(());
        }

        let domain = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            _ => return Ok(()),
        };
        let port = url.port_or_known_default().unwrap_or(80);
        resolve_public(&domain, port).await.map(|_| ())
    }
}

/// Resolves `host` and fails if any of its addresses is internal.
pub async fn resolve_public(host: &str, port: u16) -> Result<Vec<SocketAddr>, ValidationError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|_| ValidationError::Unresolvable(host.to_string()))?
        .collect();
    if addrs.is_empty() {
        return Err(ValidationError::Unresolvable(host.to_string()));
    }
    for addr in &addrs {
        if let Err(e) = check_ip(addr.ip()) {
            debug!("{} resolves to blocked address {}", host, addr.ip());
            return Err(e);
        }
    }
    Ok(addrs)
}

/// DNS resolver for the HTTP client. Every connection, redirect hops
/// included, resolves through [`resolve_public`], so a name cannot be
/// rebound to an internal address between validation and connect.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardedResolver;

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let host = name.as_str().to_string();
        Box::pin(async move {
            match resolve_public(&host, 0).await {
                Ok(addrs) => {
                    let addrs: Addrs = Box::new(addrs.into_iter());
                    Ok(addrs)
                }
                Err(e) => Err(Box::new(e) as Box<dyn std::error::Error + Send + Sync>),
            }
        })
    }
}

fn check_ip(ip: IpAddr) -> Result<(), ValidationError> {
    if is_internal_ip(&ip) {
        Err(ValidationError::BlockedAddress(ip))
    } else {
        Ok(())
    }
}

/// Private, loopback, link-local, multicast or otherwise reserved addresses.
pub fn is_internal_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_internal_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_internal_v4(&mapped);
            }
            is_internal_v6(v6)
        }
    }
}

fn is_internal_v4(ip: &Ipv4Addr) -> bool {
    let [a, b, _, _] = ip.octets();
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_broadcast()
        || ip.is_unspecified()
        || ip.is_documentation()
        || a == 0
        || (a == 100 && (64..=127).contains(&b)) // 100.64.0.0/10 carrier-grade NAT
        || (a == 198 && (b == 18 || b == 19)) // 198.18.0.0/15 benchmarking
        || a >= 240 // 240.0.0.0/4 reserved
}

fn is_internal_v6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        || (first & 0xfe00) == 0xfc00 // fc00::/7 unique local
        || (first & 0xffc0) == 0xfe80 // fe80::/10 link local
        || (first == 0x2001 && ip.segments()[1] == 0x0db8) // documentation
}

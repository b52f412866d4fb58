//! DNS resolution contracts.

use ob_core::ErrorKind;
use ob_core::OrbiterError;
use ob_core::OrbiterResult;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::net::ToSocketAddrs;

/// Name resolution abstraction.
pub trait DnsResolver {
    fn resolve(&self, host: &str, port: u16) -> OrbiterResult<Vec<SocketAddr>>;
}

/// Uses the operating system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDnsResolver;

impl DnsResolver for SystemDnsResolver {
    fn resolve(&self, host: &str, port: u16) -> OrbiterResult<Vec<SocketAddr>> {
        if let Ok(address) = host.parse::<IpAddr>() {
            return Ok(vec![SocketAddr::new(address, port)]);
        }

        let addresses: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|error| {
                OrbiterError::new(
                    ErrorKind::ConnectionFailed,
                    "net.dns.resolve_failed",
                    format!("failed to resolve `{host}`: {error}"),
                )
            })?
            .collect();

        if addresses.is_empty() {
            return Err(OrbiterError::new(
                ErrorKind::ConnectionFailed,
                "net.dns.no_results",
                format!("resolver returned no addresses for `{host}`"),
            ));
        }

        Ok(addresses)
    }
}

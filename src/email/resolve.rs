use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::{anyhow, Context, Result};
use tokio::net::lookup_host;
use tracing::debug;

/// First IPv4 address in resolver order. IPv6 results are filtered out, never used as a fallback.
pub fn first_ipv4<I>(addrs: I) -> Option<Ipv4Addr>
where
  I: IntoIterator<Item = SocketAddr>,
{
  addrs.into_iter().find_map(|addr| match addr.ip() {
    IpAddr::V4(ip) => Some(ip),
    IpAddr::V6(_) => None,
  })
}

/// Looks `host` up with the system resolver for any address family, then keeps only the
/// first IPv4 result. A host that resolves solely to IPv6 is an error.
pub async fn resolve_ipv4(host: &str, port: u16) -> Result<Ipv4Addr> {
  let addrs = lookup_host((host, port))
    .await
    .with_context(|| format!("Failed to resolve {}", host))?;

  let ip = first_ipv4(addrs).ok_or_else(|| anyhow!("No IPv4 A record for {}", host))?;
  debug!(%host, %ip, "resolved SMTP host");
  Ok(ip)
}

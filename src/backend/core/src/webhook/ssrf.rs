//! SSRF guard (spec §4.8 step 3): a webhook URL is only usable once it
//! resolves to a public address. Scheme and host are checked, then every
//! resolved address is classified before the request is allowed to proceed.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use reqwest::Url;
use tokio::net::lookup_host;

use crate::error::{AiseoError, Result};

/// Parse `url_str`, resolve its host, and reject it unless every resolved
/// address is routable and public. Returns the parsed `Url` so callers don't
/// re-parse it for the actual request.
pub async fn guard(url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str).map_err(|_| AiseoError::webhook_ssrf_rejected(url_str))?;

    match url.scheme() {
        "http" | "https" => {}
        _ => return Err(AiseoError::webhook_ssrf_rejected(url_str)),
    }

    let host = url.host_str().ok_or_else(|| AiseoError::webhook_ssrf_rejected(url_str))?;
    let port = url.port_or_known_default().unwrap_or(443);

    let addrs = lookup_host((host, port))
        .await
        .map_err(|_| AiseoError::webhook_ssrf_rejected(url_str))?;

    let mut saw_any = false;
    for addr in addrs {
        saw_any = true;
        if is_blocked(addr.ip()) {
            return Err(AiseoError::webhook_ssrf_rejected(url_str));
        }
    }
    if !saw_any {
        return Err(AiseoError::webhook_ssrf_rejected(url_str));
    }

    Ok(url)
}

fn is_blocked(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => is_blocked_v6(v6),
    }
}

fn is_blocked_v4(ip: Ipv4Addr) -> bool {
    ip.is_private() || ip.is_loopback() || ip.is_link_local() || ip.is_unspecified() || ip.is_broadcast() || ip.is_multicast()
}

fn is_blocked_v6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() {
        return true;
    }
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_blocked_v4(v4);
    }
    let segments = ip.segments();
    let is_unique_local = (segments[0] & 0xfe00) == 0xfc00; // fc00::/7
    let is_link_local = (segments[0] & 0xffc0) == 0xfe80; // fe80::/10
    is_unique_local || is_link_local
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_http_scheme() {
        assert!(guard("ftp://example.com/file").await.is_err());
    }

    #[test]
    fn loopback_v4_is_blocked() {
        assert!(is_blocked_v4(Ipv4Addr::new(127, 0, 0, 1)));
    }

    #[test]
    fn private_v4_ranges_are_blocked() {
        assert!(is_blocked_v4(Ipv4Addr::new(10, 0, 0, 5)));
        assert!(is_blocked_v4(Ipv4Addr::new(172, 16, 0, 5)));
        assert!(is_blocked_v4(Ipv4Addr::new(192, 168, 1, 5)));
    }

    #[test]
    fn public_v4_is_allowed() {
        assert!(!is_blocked_v4(Ipv4Addr::new(8, 8, 8, 8)));
    }

    #[test]
    fn link_local_v6_is_blocked() {
        assert!(is_blocked_v6("fe80::1".parse().unwrap()));
    }

    #[test]
    fn unique_local_v6_is_blocked() {
        assert!(is_blocked_v6("fd00::1".parse().unwrap()));
    }

    #[test]
    fn public_v6_is_allowed() {
        assert!(!is_blocked_v6("2001:4860:4860::8888".parse().unwrap()));
    }
}

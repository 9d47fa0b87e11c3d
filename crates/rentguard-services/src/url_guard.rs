//! Outbound URL checks for caller-supplied document URLs.
//!
//! Document URLs arrive in request bodies, so the fetcher refuses anything
//! pointing at private or internal hosts unless explicitly allowed.

use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use tokio::net::lookup_host;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlRejected {
    #[error("URL must use http or https")]
    Scheme,
    #[error("invalid URL: {0}")]
    Malformed(String),
    #[error("host '{0}' is not in the document URL allowlist")]
    NotAllowlisted(String),
    #[error("host '{0}' is private or internal")]
    PrivateHost(String),
    #[error("host '{0}' could not be resolved")]
    Unresolvable(String),
}

/// A URL that passed the checks, with the addresses it was checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedUrl {
    pub url: reqwest::Url,
    /// Host name plus vetted addresses the download must connect to. `None`
    /// for IP literals and when private hosts are allowed.
    pub pinned: Option<(String, Vec<SocketAddr>)>,
}

impl CheckedUrl {
    fn unpinned(url: reqwest::Url) -> Self {
        Self { url, pinned: None }
    }
}

/// Validate a document URL before downloading it.
///
/// Hostnames are resolved and every resolved address is checked, so a public
/// name pointing at an internal address is refused too. The vetted addresses
/// are returned so the download cannot be sent to a different resolution.
pub async fn check_document_url(
    url: &str,
    allow_private: bool,
    allowlist: Option<&[String]>,
) -> Result<CheckedUrl, UrlRejected> {
    let parsed = reqwest::Url::parse(url).map_err(|e| UrlRejected::Malformed(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(UrlRejected::Scheme);
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| UrlRejected::Malformed("URL has no host".to_string()))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_lowercase();

    if let Some(allowed) = allowlist {
        let listed = allowed.iter().any(|domain| {
            let domain = domain.to_lowercase();
            host == domain || host.ends_with(&format!(".{}", domain))
        });
        if !listed {
            return Err(UrlRejected::NotAllowlisted(host));
        }
    }

    if allow_private {
        return Ok(CheckedUrl::unpinned(parsed));
    }

    if is_internal_hostname(&host) {
        return Err(UrlRejected::PrivateHost(host));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_ip(&ip) {
            return Err(UrlRejected::PrivateHost(host));
        }
        return Ok(CheckedUrl::unpinned(parsed));
    }

    let port = parsed.port_or_known_default().unwrap_or(443);
    let resolved = lookup_host((host.as_str(), port)).await.map_err(|e| {
        tracing::warn!(host = %host, error = %e, "DNS resolution failed for document URL");
        UrlRejected::Unresolvable(host.clone())
    })?;

    let addrs = vet_resolved(&host, resolved)?;
    Ok(CheckedUrl {
        url: parsed,
        pinned: Some((host, addrs)),
    })
}

/// Every resolved address must be public, and there must be at least one.
fn vet_resolved(
    host: &str,
    resolved: impl IntoIterator<Item = SocketAddr>,
) -> Result<Vec<SocketAddr>, UrlRejected> {
    let addrs: Vec<SocketAddr> = resolved.into_iter().collect();
    if addrs.is_empty() {
        return Err(UrlRejected::Unresolvable(host.to_string()));
    }
    if addrs.iter().any(|addr| is_private_ip(&addr.ip())) {
        return Err(UrlRejected::PrivateHost(host.to_string()));
    }
    Ok(addrs)
}

fn is_internal_hostname(host: &str) -> bool {
    host == "localhost"
        || host.ends_with(".localhost")
        || host.ends_with(".local")
        || host.ends_with(".internal")
        || host.ends_with(".corp")
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_unspecified()
                || v4.octets()[0] == 0
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(mapped));
            }
            v6.is_loopback() || v6.is_unspecified() || v6.is_multicast() || is_ipv6_local(v6)
        }
    }
}

/// Link-local (fe80::/10) and unique-local (fc00::/7).
fn is_ipv6_local(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    first & 0xffc0 == 0xfe80 || first & 0xfe00 == 0xfc00
}

use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Host name suffixes that only resolve inside private networks
const INTERNAL_SUFFIXES: [&str; 7] = [
    ".local",
    ".localhost",
    ".internal",
    ".intranet",
    ".corp",
    ".home",
    ".lan",
];

/// Why a subscription URL was refused.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    /// Private, link-local or otherwise non-public address
    #[error("Private address not allowed: {0}")]
    PrivateAddress(String),
    /// Loopback address or a name that only resolves locally
    #[error("Local host not allowed: {0}")]
    LocalHost(String),
}

/// Check a feed URL before subscribing to it.
///
/// Only `http` and `https` are accepted. Unless `allow_private` is set,
/// loopback and private addresses and internal-only host names are refused,
/// so the bot cannot be pointed at services on its own network.
///
/// Host names are not resolved; a public name pointing at a private address
/// passes.
///
/// # Examples
///
/// ```
/// use feedbell::util::validate_feed_url;
///
/// let url = validate_feed_url("https://example.com/feed.xml", false).unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_feed_url("http://192.168.1.1/feed", false).is_err());
/// assert!(validate_feed_url("http://192.168.1.1/feed", true).is_ok());
/// assert!(validate_feed_url("file:///etc/passwd", true).is_err());
/// ```
pub fn validate_feed_url(url_str: &str, allow_private: bool) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    let host = url.host_str().ok_or(UrlValidationError::MissingHost)?;
    if allow_private {
        return Ok(url);
    }

    let host_lower = host.to_lowercase();
    if host_lower == "localhost"
        || INTERNAL_SUFFIXES
            .iter()
            .any(|suffix| host_lower.ends_with(suffix))
    {
        return Err(UrlValidationError::LocalHost(host_lower));
    }

    // Brackets wrap IPv6 literals in URLs
    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if let Ok(ip) = bare.parse::<IpAddr>() {
        let ip = match ip {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
            v4 => v4,
        };
        if ip.is_loopback() {
            return Err(UrlValidationError::LocalHost(ip.to_string()));
        }
        if is_non_public(&ip) {
            return Err(UrlValidationError::PrivateAddress(ip.to_string()));
        }
    }

    Ok(url)
}

fn is_non_public(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                // Carrier-grade NAT: 100.64.0.0/10
                || (octets[0] == 100 && (octets[1] & 0xc0) == 64)
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_unspecified()
                // Unique local fc00::/7
                || (first & 0xfe00) == 0xfc00
                // Link-local fe80::/10
                || (first & 0xffc0) == 0xfe80
        }
    }
}

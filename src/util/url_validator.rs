use std::net::IpAddr;
use thiserror::Error;
use url::{Host, Url};

/// Reasons a feed URL is refused.
#[derive(Error, Debug)]
pub enum UrlError {
    #[error("Invalid URL: {0}")]
    Invalid(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    #[error("Private or loopback address not allowed: {0}")]
    PrivateHost(String),
}

/// Which feed URLs the service is willing to fetch.
///
/// By default only public http(s) hosts pass. `allow_private_hosts` also
/// admits localhost and private networks, for intranet feeds and local mock
/// servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlPolicy {
    pub allow_private_hosts: bool,
}

impl UrlPolicy {
    pub fn new(allow_private_hosts: bool) -> Self {
        Self {
            allow_private_hosts,
        }
    }

    /// Parse `raw` and check it against the policy.
    ///
    /// ```
    /// use feedsync::util::UrlPolicy;
    ///
    /// let strict = UrlPolicy::default();
    /// assert!(strict.check("https://example.com/feed.xml").is_ok());
    /// assert!(strict.check("http://192.168.1.1/feed").is_err());
    /// assert!(strict.check("file:///etc/passwd").is_err());
    ///
    /// let lenient = UrlPolicy::new(true);
    /// assert!(lenient.check("http://127.0.0.1:8080/feed").is_ok());
    /// ```
    pub fn check(&self, raw: &str) -> Result<Url, UrlError> {
        let url = Url::parse(raw)?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(UrlError::UnsupportedScheme(scheme.to_owned())),
        }

        let host = url.host().ok_or(UrlError::MissingHost)?;
        if self.allow_private_hosts {
            return Ok(url);
        }

        let private = match &host {
            Host::Domain(domain) => domain.eq_ignore_ascii_case("localhost"),
            Host::Ipv4(ip) => is_private_ip(&IpAddr::V4(*ip)),
            Host::Ipv6(ip) => is_private_ip(&IpAddr::V6(*ip)),
        };
        if private {
            return Err(UrlError::PrivateHost(host.to_string()));
        }

        Ok(url)
    }
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_loopback() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_loopback() || ipv6.is_unspecified() {
                return true;
            }
            if let Some(mapped) = ipv6.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(mapped));
            }
            let first = ipv6.segments()[0];
            // fc00::/7 unique local, fe80::/10 link-local
            (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
        }
    }
}

//! HTTP client construction for provider calls.

use reqwest::Client;
use std::net::IpAddr;
use url::{Host, Url};

use crate::config::HttpClientSettings;
use crate::error::{CourierError, CourierResult};

/// Build the client used for SMS provider requests
pub fn build_http_client(settings: &HttpClientSettings) -> CourierResult<Client> {
    Client::builder()
        .timeout(settings.timeout())
        .connect_timeout(settings.connect_timeout())
        .user_agent(settings.user_agent.clone())
        .build()
        .map_err(|e| CourierError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Parse a provider endpoint and apply the private-range policy.
///
/// Only literal IPs and `localhost` are checked; names are not resolved.
pub fn validate_endpoint(endpoint: &str, settings: &HttpClientSettings) -> CourierResult<Url> {
    let url = Url::parse(endpoint)
        .map_err(|e| CourierError::Config(format!("Invalid provider URL '{}': {}", endpoint, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(CourierError::Config(format!(
            "Unsupported provider URL scheme '{}'",
            url.scheme()
        )));
    }

    if settings.disallow_private_ip_ranges {
        let private = match url.host() {
            Some(Host::Ipv4(ip)) => is_private_ip(IpAddr::V4(ip)),
            Some(Host::Ipv6(ip)) => is_private_ip(IpAddr::V6(ip)),
            Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
            None => true,
        };
        if private {
            return Err(CourierError::Config(format!(
                "Provider URL '{}' points to a private address",
                endpoint
            )));
        }
    }

    Ok(url)
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ip) => {
            ip.is_private()
                || ip.is_loopback()
                || ip.is_link_local()
                || ip.is_unspecified()
                || ip.is_broadcast()
        }
        IpAddr::V6(ip) => {
            let first = ip.segments()[0];
            ip.is_loopback()
                || ip.is_unspecified()
                // fc00::/7 unique local, fe80::/10 link local
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
                || ip.to_ipv4_mapped().map_or(false, |v4| is_private_ip(IpAddr::V4(v4)))
        }
    }
}

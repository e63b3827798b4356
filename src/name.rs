//! Name normalization and `host:port` endpoints.

use std::{fmt, net::Ipv6Addr, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Canonical lookup key for a name: trimmed, lowercased, `[a-z0-9-]` only.
///
/// Publishing and querying both go through this, so a claim for
/// `" MySite "` is found by a lookup for `"mysite"`.
pub fn normalize_name(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim().to_ascii_lowercase();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if let Some(ch) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
    {
        return Err(ValidationError::InvalidNameChar { name, ch });
    }
    Ok(name)
}

/// Network endpoint a name resolves to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for Endpoint {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let input = raw.trim();
        let invalid = || ValidationError::InvalidEndpoint(raw.to_string());
        let (host, port) = input.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() || port.is_empty() {
            return Err(invalid());
        }
        if !port.bytes().all(|b| b.is_ascii_digit()) || port.starts_with('0') {
            return Err(ValidationError::InvalidPort(raw.to_string()));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| ValidationError::InvalidPort(raw.to_string()))?;
        if port == 0 {
            return Err(ValidationError::InvalidPort(raw.to_string()));
        }
        let bad_host = || ValidationError::InvalidHost {
            endpoint: raw.to_string(),
            host: host.to_string(),
        };
        let host = if let Some(inner) = host.strip_prefix('[') {
            let inner = inner.strip_suffix(']').ok_or_else(bad_host)?;
            let addr: Ipv6Addr = inner.parse().map_err(|_| bad_host())?;
            format!("[{addr}]")
        } else {
            // A bare colon here means an unbracketed IPv6 literal.
            if !valid_hostname(host) {
                return Err(bad_host());
            }
            host.to_ascii_lowercase()
        };
        Ok(Self { host, port })
    }
}

/// DNS name or IPv4 literal: dot-separated labels of letters, digits and `-`.
fn valid_hostname(host: &str) -> bool {
    host.len() <= 253
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(value: Endpoint) -> Self {
        value.to_string()
    }
}

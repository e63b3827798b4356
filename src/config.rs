//! Configuration loading from `.env` files and the environment.

use std::{env, path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use url::Url;

use crate::{error::ValidationError, relay::parse_relay_url};

/// Relays used when none are configured.
pub const DEFAULT_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://nos.lol",
    "wss://relay.nostr.band",
];

/// Variables read by [`Settings::from_env`].
pub const ENV_VARS: &[&str] = &[
    "RELAYS",
    "TIMEOUT_MS",
    "QUORUM",
    "CACHE_ROOT",
    "CACHE_TTL_SECS",
    "SECRET_KEY",
    "TOR_SOCKS",
];

/// Runtime settings derived from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Relay URLs to publish to and query.
    pub relays: Vec<String>,
    /// Deadline for a whole relay fan-out.
    pub timeout: Duration,
    /// Acknowledgments needed for a successful publish.
    pub quorum: usize,
    /// Claim cache directory; caching is off when unset.
    pub cache_root: Option<PathBuf>,
    /// Seconds a cached claim stays fresh.
    pub cache_ttl: u64,
    /// Hex secret key used to sign claims.
    pub secret_key: Option<String>,
    /// Optional Tor SOCKS proxy (host:port).
    pub tor_socks: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            relays: DEFAULT_RELAYS.iter().map(|s| s.to_string()).collect(),
            timeout: Duration::from_millis(3_000),
            quorum: 1,
            cache_root: None,
            cache_ttl: 600,
            secret_key: None,
            tor_socks: None,
        }
    }
}

impl Settings {
    /// Load settings from the `.env` file at `path` (if present) and the
    /// process environment. Variables already set in the environment win.
    pub fn from_env(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            dotenvy::from_filename(path).context("reading env file")?;
        }
        let defaults = Self::default();
        let relays = match non_empty("RELAYS") {
            Some(list) => csv_strings(list),
            None => defaults.relays,
        };
        let timeout = match non_empty("TIMEOUT_MS") {
            Some(ms) => Duration::from_millis(ms.parse().context("parsing TIMEOUT_MS")?),
            None => defaults.timeout,
        };
        let quorum = match non_empty("QUORUM") {
            Some(q) => q.parse().context("parsing QUORUM")?,
            None => defaults.quorum,
        };
        let cache_root = non_empty("CACHE_ROOT").map(PathBuf::from);
        let cache_ttl = match non_empty("CACHE_TTL_SECS") {
            Some(ttl) => ttl.parse().context("parsing CACHE_TTL_SECS")?,
            None => defaults.cache_ttl,
        };
        Ok(Self {
            relays,
            timeout,
            quorum,
            cache_root,
            cache_ttl,
            secret_key: non_empty("SECRET_KEY"),
            tor_socks: non_empty("TOR_SOCKS"),
        })
    }

    /// Parse the configured relays, failing on the first bad URL.
    pub fn relay_urls(&self) -> Result<Vec<Url>, ValidationError> {
        self.relays.iter().map(|r| parse_relay_url(r)).collect()
    }
}

fn non_empty(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Split a comma-separated string into trimmed string values.
pub fn csv_strings(input: impl AsRef<str>) -> Vec<String> {
    input
        .as_ref()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

//! Error taxonomy shared by the claim pipeline.
//!
//! Only precondition violations and total relay exhaustion surface as
//! operation failures. Per-relay problems are [`RelayError`]s recorded in
//! aggregate results, and malformed relay data is a [`ClaimError`] that
//! queries count and drop.

use thiserror::Error;
use url::Url;

/// Malformed caller input, rejected before any network I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name is empty")]
    EmptyName,
    #[error("name {name:?} contains invalid character {ch:?} (allowed: a-z, 0-9, '-')")]
    InvalidNameChar { name: String, ch: char },
    #[error("endpoint {0:?} is not of the form host:port")]
    InvalidEndpoint(String),
    #[error("endpoint {endpoint:?} has invalid host {host:?}")]
    InvalidHost { endpoint: String, host: String },
    #[error("endpoint {0:?} has a port outside 1-65535")]
    InvalidPort(String),
    #[error("invalid relay url {url:?}: {reason}")]
    InvalidRelay { url: String, reason: String },
    #[error("quorum must be at least 1")]
    ZeroQuorum,
    #[error("public key {0:?} is not 64 hex characters")]
    InvalidPubkey(String),
}

/// The identity could not produce a signature.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("signing failed: {0}")]
pub struct SigningError(pub String);

/// Failure talking to a single relay. Never fatal on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("connection closed before a response")]
    Closed,
    #[error("timed out")]
    TimedOut,
}

/// Why a wire event is not a usable name claim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    #[error("unexpected kind {0}")]
    WrongKind(u32),
    #[error("missing d tag")]
    MissingName,
    #[error("missing ip tag")]
    MissingEndpoint,
    #[error("more than one {0} tag")]
    DuplicateTag(&'static str),
    #[error("claim is for {found:?}, expected {expected:?}")]
    NameMismatch { expected: String, found: String },
    #[error("id does not match content")]
    IdMismatch,
    #[error("signature invalid")]
    InvalidSignature,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Problems reading or writing the on-disk claim cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache encoding: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cache write: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error(transparent)]
    InvalidName(#[from] ValidationError),
}

/// A relay and the reason it produced nothing usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayFailure {
    pub relay: Url,
    pub reason: String,
}

/// Operation-level failure.
#[derive(Debug, Error)]
pub enum NnsError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    /// No relay could be reached. Distinct from "reachable but empty".
    #[error("all {} relays failed", .failures.len())]
    ExhaustedRelays { failures: Vec<RelayFailure> },
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("no cache configured")]
    NoCache,
}

pub type Result<T, E = NnsError> = std::result::Result<T, E>;

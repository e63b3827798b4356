//! Nostr wire record and its canonical form.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Event kind reserved for name claims.
pub const CLAIM_KIND: u32 = 34256;

/// A tag as it appears on the wire, e.g. `["d", "mysite"]`.
///
/// The first element names the tag and the rest carry its values. Tags are
/// kept verbatim so unknown ones survive a round trip and still hash to the
/// same id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag(pub Vec<String>);

impl Tag {
    pub fn new(name: &str, value: impl Into<String>) -> Self {
        Tag(vec![name.to_string(), value.into()])
    }

    /// Tag name, if the tag is non-empty.
    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// First value after the tag name.
    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }
}

/// Event exchanged with relays.
///
/// ```json
/// {
///   "id": "5c83...",
///   "pubkey": "79be...",
///   "kind": 34256,
///   "created_at": 1700000000,
///   "tags": [["d", "mysite"], ["ip", "1.2.3.4:80"]],
///   "content": "",
///   "sig": "deadbeef..."
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// Hex SHA-256 of the canonical serialization.
    pub id: String,
    /// Author x-only public key (hex).
    pub pubkey: String,
    pub kind: u32,
    /// Unix timestamp supplied by the author.
    pub created_at: u64,
    pub tags: Vec<Tag>,
    pub content: String,
    /// Schnorr signature over the id digest (hex).
    pub sig: String,
}

impl Event {
    /// NIP-01 serialization `[0, pubkey, created_at, kind, tags, content]`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        canonical_bytes(&self.pubkey, self.created_at, self.kind, &self.tags, &self.content)
    }

    /// Recompute the id from the other fields.
    pub fn compute_id(&self) -> String {
        hex::encode(Sha256::digest(self.canonical_bytes()))
    }

    /// All tags named `name`.
    pub fn tags_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Tag> + 'a {
        self.tags.iter().filter(move |t| t.name() == Some(name))
    }
}

/// Canonical bytes for an event that has not been assembled yet.
pub(crate) fn canonical_bytes(
    pubkey: &str,
    created_at: u64,
    kind: u32,
    tags: &[Tag],
    content: &str,
) -> Vec<u8> {
    // Serializing a json! value of strings and integers cannot fail.
    let arr = serde_json::json!([0, pubkey, created_at, kind, tags, content]);
    arr.to_string().into_bytes()
}

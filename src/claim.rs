//! Name claim events: construction, signing and validation.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    error::{ClaimError, NnsError, SigningError},
    event::{canonical_bytes, Event, Tag, CLAIM_KIND},
    identity::{self, Signer},
    name::{normalize_name, Endpoint},
};

const NAME_TAG: &str = "d";
const ENDPOINT_TAG: &str = "ip";
const NOTE_TAG: &str = "note";

/// A signed, validated claim that `name` maps to `endpoint`.
///
/// Immutable once built. Superseding a claim means publishing a new one with
/// a later `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimEvent {
    event: Event,
    name: String,
    endpoint: Endpoint,
    note: Option<String>,
}

impl ClaimEvent {
    /// Validate a wire event as a claim.
    ///
    /// Checks the kind and the tag shape, recomputes the id and verifies
    /// the signature. Extra tags are allowed and kept.
    pub fn from_event(event: Event) -> Result<Self, ClaimError> {
        if event.kind != CLAIM_KIND {
            return Err(ClaimError::WrongKind(event.kind));
        }
        let raw_name = single_tag(&event, NAME_TAG)?.ok_or(ClaimError::MissingName)?;
        let raw_endpoint = single_tag(&event, ENDPOINT_TAG)?.ok_or(ClaimError::MissingEndpoint)?;
        let name = normalize_name(raw_name)?;
        let endpoint: Endpoint = raw_endpoint.parse()?;
        let note = event
            .tags_named(NOTE_TAG)
            .find_map(Tag::value)
            .map(str::to_string);

        if event.compute_id() != event.id {
            return Err(ClaimError::IdMismatch);
        }
        if !identity::verify(&event.pubkey, &event.canonical_bytes(), &event.sig) {
            return Err(ClaimError::InvalidSignature);
        }
        Ok(Self {
            event,
            name,
            endpoint,
            note,
        })
    }

    pub fn id(&self) -> &str {
        &self.event.id
    }

    pub fn pubkey(&self) -> &str {
        &self.event.pubkey
    }

    pub fn created_at(&self) -> u64 {
        self.event.created_at
    }

    pub fn kind(&self) -> u32 {
        self.event.kind
    }

    /// Normalized claimed name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn tags(&self) -> &[Tag] {
        &self.event.tags
    }

    pub fn sig(&self) -> &str {
        &self.event.sig
    }

    /// The wire record to hand to relays.
    pub fn as_event(&self) -> &Event {
        &self.event
    }
}

/// Value of the only tag called `name`, erroring if it appears twice.
fn single_tag<'a>(event: &'a Event, name: &'static str) -> Result<Option<&'a str>, ClaimError> {
    let mut found = event.tags_named(name).filter_map(Tag::value);
    let first = found.next();
    if found.next().is_some() {
        return Err(ClaimError::DuplicateTag(name));
    }
    Ok(first)
}

/// Builds signed claim events from user input.
#[derive(Debug, Clone)]
pub struct ClaimEventBuilder {
    name: String,
    endpoint: String,
    note: Option<String>,
    created_at: Option<u64>,
}

impl ClaimEventBuilder {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            note: None,
            created_at: None,
        }
    }

    /// Attach a free-form `note` tag.
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Override the timestamp instead of using the current time.
    pub fn created_at(mut self, ts: u64) -> Self {
        self.created_at = Some(ts);
        self
    }

    /// Normalize, tag, hash and sign. No network access.
    pub fn build(self, signer: &impl Signer) -> Result<ClaimEvent, NnsError> {
        let name = normalize_name(&self.name)?;
        let endpoint: Endpoint = self.endpoint.parse()?;

        let mut tags = vec![
            Tag::new(NAME_TAG, name.clone()),
            Tag::new(ENDPOINT_TAG, endpoint.to_string()),
        ];
        if let Some(note) = &self.note {
            tags.push(Tag::new(NOTE_TAG, note.clone()));
        }
        let pubkey = signer.public_key_hex();
        let created_at = self.created_at.unwrap_or_else(unix_now);
        let content = String::new();

        let bytes = canonical_bytes(&pubkey, created_at, CLAIM_KIND, &tags, &content);
        let sig = signer.sign(&bytes)?;
        let mut event = Event {
            id: String::new(),
            pubkey,
            kind: CLAIM_KIND,
            created_at,
            tags,
            content,
            sig,
        };
        event.id = event.compute_id();

        if !identity::verify(&event.pubkey, &bytes, &event.sig) {
            return Err(SigningError("signer produced an unverifiable signature".into()).into());
        }
        Ok(ClaimEvent {
            event,
            name,
            endpoint,
            note: self.note,
        })
    }
}

/// Build and sign a claim for `name` at `endpoint`.
pub fn build(name: &str, endpoint: &str, signer: &impl Signer) -> Result<ClaimEvent, NnsError> {
    ClaimEventBuilder::new(name, endpoint).build(signer)
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

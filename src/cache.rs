//! File-backed cache of fetched claims and the user's claimant choices.
//!
//! Layout under the cache root:
//!
//! ```text
//! claims/<name>/<event id>.json   {"event": {...}, "relays": [...], "fetched_at": 1700000000}
//! selections/<name>.json          {"name": "...", "pubkey": "...", "chosen_at": 1700000000}
//! ```

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::to_writer;
use url::Url;

use crate::{
    claim::ClaimEvent, error::CacheError, event::Event, name::normalize_name, query::SightedClaim,
};

/// On-disk form of one fetched claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedClaim {
    event: Event,
    relays: Vec<String>,
    fetched_at: u64,
}

/// A claimant the user picked for a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRecord {
    pub name: String,
    pub pubkey: String,
    pub chosen_at: u64,
}

#[derive(Debug, Clone)]
pub struct ClaimCache {
    root: PathBuf,
}

impl ClaimCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Ensure the directory structure exists.
    pub fn init(&self) -> Result<(), CacheError> {
        for d in ["claims", "selections"] {
            fs::create_dir_all(self.root.join(d))?;
        }
        Ok(())
    }

    /// Store claims fetched for `name` at time `now`.
    pub fn save_claims(
        &self,
        name: &str,
        claims: &[SightedClaim],
        now: u64,
    ) -> Result<(), CacheError> {
        let dir = self.claims_dir(name)?;
        fs::create_dir_all(&dir)?;
        for sighted in claims {
            let record = CachedClaim {
                event: sighted.claim.as_event().clone(),
                relays: sighted.relays.iter().map(Url::to_string).collect(),
                fetched_at: now,
            };
            write_atomic(&dir.join(format!("{}.json", sighted.claim.id())), &record)?;
        }
        Ok(())
    }

    /// Claims for `name` fetched no more than `ttl` seconds before `now`.
    ///
    /// Every cached event is validated again. Unreadable or invalid entries
    /// are skipped and stale ones are deleted.
    pub fn fresh_claims(
        &self,
        name: &str,
        now: u64,
        ttl: u64,
    ) -> Result<Vec<SightedClaim>, CacheError> {
        let name = normalize_name(name)?;
        let dir = self.root.join("claims").join(&name);
        if !dir.exists() {
            return Ok(vec![]);
        }
        let mut claims = vec![];
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let record: CachedClaim = match fs::read_to_string(&path)
                .map_err(CacheError::from)
                .and_then(|data| serde_json::from_str(&data).map_err(CacheError::from))
            {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unreadable cache entry");
                    continue;
                }
            };
            if now.saturating_sub(record.fetched_at) > ttl {
                if let Err(e) = fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "failed to prune stale claim");
                }
                continue;
            }
            match ClaimEvent::from_event(record.event) {
                Ok(claim) if claim.name() == name => {
                    let relays: BTreeSet<Url> = record
                        .relays
                        .iter()
                        .filter_map(|r| Url::parse(r).ok())
                        .collect();
                    claims.push(SightedClaim { claim, relays });
                }
                Ok(_) => {
                    tracing::warn!(path = %path.display(), "cached claim is for another name")
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "invalid cached claim")
                }
            }
        }
        claims.sort_by(|a, b| a.claim.id().cmp(b.claim.id()));
        Ok(claims)
    }

    /// Remember that the user trusts `record.pubkey` for `record.name`.
    pub fn record_selection(&self, record: &SelectionRecord) -> Result<(), CacheError> {
        let path = self.selection_path(&record.name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_atomic(&path, record)
    }

    pub fn selection(&self, name: &str) -> Result<Option<SelectionRecord>, CacheError> {
        let path = self.selection_path(name)?;
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    fn claims_dir(&self, name: &str) -> Result<PathBuf, CacheError> {
        Ok(self.root.join("claims").join(normalize_name(name)?))
    }

    fn selection_path(&self, name: &str) -> Result<PathBuf, CacheError> {
        let name = normalize_name(name)?;
        Ok(self.root.join("selections").join(format!("{name}.json")))
    }
}

/// Write JSON to `path` through a temp file in the same directory.
fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), CacheError> {
    let parent_dir = path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    let tmp = tempfile::NamedTempFile::new_in(&parent_dir)?;
    to_writer(&tmp, value)?;
    tmp.persist(path)?;
    Ok(())
}

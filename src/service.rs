//! High level operations tying the claim pipeline together.

use std::{sync::Arc, time::Duration};

use url::Url;

use crate::{
    cache::{ClaimCache, SelectionRecord},
    claim::{unix_now, ClaimEvent, ClaimEventBuilder},
    error::{NnsError, RelayFailure},
    identity::{parse_pubkey, Signer},
    name::normalize_name,
    publish::{AggregateResult, RelayPublisher},
    query::{RelayQueryEngine, SightedClaim},
    relay::RelayConnector,
    resolve::{ClaimResolver, Resolution},
};

/// Relay set and limits shared by every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayContext {
    pub relays: Vec<Url>,
    pub timeout: Duration,
    pub quorum: usize,
}

/// Result of looking a name up.
#[derive(Debug, Clone)]
pub struct Lookup {
    pub resolution: Resolution,
    /// Every claim considered, with the relays that served it.
    pub claims: Vec<SightedClaim>,
    /// Answered from the local cache without touching relays.
    pub from_cache: bool,
    /// Claimant the user previously picked for this name.
    pub selection: Option<SelectionRecord>,
    /// Invalid events dropped during the query.
    pub malformed: usize,
    /// Relays skipped during the query.
    pub failures: Vec<RelayFailure>,
}

impl Lookup {
    /// The claim to act on: the selected claimant's best claim if they have
    /// one, otherwise the resolver's winner.
    pub fn preferred(&self) -> Option<&ClaimEvent> {
        let resolved = self.resolution.resolved()?;
        self.selection
            .as_ref()
            .and_then(|s| resolved.best_by(&s.pubkey))
            .or_else(|| Some(resolved.winner()))
    }
}

pub struct NameService {
    ctx: RelayContext,
    connector: Arc<dyn RelayConnector>,
    cache: Option<ClaimCache>,
    cache_ttl: u64,
}

impl NameService {
    pub fn new(ctx: RelayContext, connector: Arc<dyn RelayConnector>) -> Self {
        Self {
            ctx,
            connector,
            cache: None,
            cache_ttl: 0,
        }
    }

    /// Serve lookups from `cache` while entries are younger than `ttl` seconds.
    pub fn with_cache(mut self, cache: ClaimCache, ttl: u64) -> Self {
        self.cache = Some(cache);
        self.cache_ttl = ttl;
        self
    }

    pub fn context(&self) -> &RelayContext {
        &self.ctx
    }

    /// Sign a claim for `name` at `endpoint` and publish it.
    pub async fn publish(
        &self,
        signer: &impl Signer,
        name: &str,
        endpoint: &str,
        note: Option<&str>,
    ) -> Result<(ClaimEvent, AggregateResult), NnsError> {
        let mut builder = ClaimEventBuilder::new(name, endpoint);
        if let Some(note) = note {
            builder = builder.note(note);
        }
        let claim = builder.build(signer)?;
        tracing::debug!(id = claim.id(), name = claim.name(), "claim signed");
        let result = RelayPublisher::new(Arc::clone(&self.connector))
            .publish(&claim, &self.ctx.relays, self.ctx.timeout, self.ctx.quorum)
            .await?;
        Ok((claim, result))
    }

    /// Resolve `name`, preferring fresh cached claims over a relay query.
    ///
    /// Cache problems are logged and never fail a lookup.
    pub async fn lookup(&self, name: &str) -> Result<Lookup, NnsError> {
        let name = normalize_name(name)?;
        let now = unix_now();

        let cached = self.cache.as_ref().and_then(|cache| {
            match cache.fresh_claims(&name, now, self.cache_ttl) {
                Ok(claims) if !claims.is_empty() => Some(claims),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(%name, error = %e, "claim cache unavailable");
                    None
                }
            }
        });

        let (claims, from_cache, malformed, failures) = match cached {
            Some(claims) => {
                tracing::debug!(%name, count = claims.len(), "served from cache");
                (claims, true, 0, vec![])
            }
            None => {
                let outcome = RelayQueryEngine::new(Arc::clone(&self.connector))
                    .query(&name, &self.ctx.relays, self.ctx.timeout)
                    .await?;
                if let Some(cache) = &self.cache {
                    if let Err(e) = cache.save_claims(&name, &outcome.claims, now) {
                        tracing::warn!(%name, error = %e, "failed to cache claims");
                    }
                }
                (outcome.claims, false, outcome.malformed, outcome.failures)
            }
        };

        let selection = self.cache.as_ref().and_then(|cache| {
            cache.selection(&name).unwrap_or_else(|e| {
                tracing::warn!(%name, error = %e, "failed to read selection");
                None
            })
        });
        let resolution = ClaimResolver::resolve(claims.iter().map(|s| s.claim.clone()));
        Ok(Lookup {
            resolution,
            claims,
            from_cache,
            selection,
            malformed,
            failures,
        })
    }

    /// Remember that the user trusts `pubkey` for `name`.
    pub fn select(&self, name: &str, pubkey: &str) -> Result<SelectionRecord, NnsError> {
        let cache = self.cache.as_ref().ok_or(NnsError::NoCache)?;
        let record = SelectionRecord {
            name: normalize_name(name)?,
            pubkey: parse_pubkey(pubkey)?,
            chosen_at: unix_now(),
        };
        cache.record_selection(&record)?;
        tracing::info!(name = %record.name, pubkey = %record.pubkey, "selection recorded");
        Ok(record)
    }
}

//! Concurrent claim lookup across a relay set.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Duration,
};

use futures_util::future::join_all;
use tokio::time::{timeout_at, Instant};
use url::Url;

use crate::{
    claim::ClaimEvent,
    error::{ClaimError, NnsError, RelayError, RelayFailure},
    event::Event,
    name::normalize_name,
    relay::{Filter, RelayConnector},
};

/// A claim together with every relay that returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SightedClaim {
    pub claim: ClaimEvent,
    pub relays: BTreeSet<Url>,
}

/// Deduplicated result of a query.
#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    /// Unique claims by id, ascending.
    pub claims: Vec<SightedClaim>,
    /// Events dropped for failing validation.
    pub malformed: usize,
    /// Relays that errored or timed out and were skipped.
    pub failures: Vec<RelayFailure>,
}

impl QueryOutcome {
    /// The claim events alone, ready for resolution.
    pub fn claim_events(&self) -> Vec<ClaimEvent> {
        self.claims.iter().map(|s| s.claim.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

/// Asks relays for every claim on a name.
#[derive(Clone)]
pub struct RelayQueryEngine {
    connector: Arc<dyn RelayConnector>,
}

impl RelayQueryEngine {
    pub fn new(connector: Arc<dyn RelayConnector>) -> Self {
        Self { connector }
    }

    /// Query all relays concurrently and merge their answers.
    ///
    /// Failing relays are skipped. If every relay fails, or none are given,
    /// the result is [`NnsError::ExhaustedRelays`] rather than an empty set.
    pub async fn query(
        &self,
        name: &str,
        relays: &[Url],
        timeout: Duration,
    ) -> Result<QueryOutcome, NnsError> {
        let name = normalize_name(name)?;
        if relays.is_empty() {
            return Err(NnsError::ExhaustedRelays { failures: vec![] });
        }
        let deadline = Instant::now() + timeout;
        let filter = Arc::new(Filter::claims_for(&name));

        let handles: Vec<_> = relays
            .iter()
            .cloned()
            .map(|relay| {
                let connector = Arc::clone(&self.connector);
                let filter = Arc::clone(&filter);
                tokio::spawn(async move {
                    let res = timeout_at(deadline, connector.fetch(&relay, &filter))
                        .await
                        .unwrap_or(Err(RelayError::TimedOut));
                    (relay, res)
                })
            })
            .collect();

        let mut answered = Vec::new();
        let mut failures = Vec::new();
        for (relay, joined) in relays.iter().zip(join_all(handles).await) {
            match joined {
                Ok((relay, Ok(events))) => {
                    tracing::debug!(%relay, count = events.len(), "relay answered");
                    answered.push((relay, events));
                }
                Ok((relay, Err(e))) => {
                    tracing::warn!(%relay, error = %e, "relay skipped");
                    failures.push(RelayFailure {
                        relay,
                        reason: e.to_string(),
                    });
                }
                Err(e) => failures.push(RelayFailure {
                    relay: relay.clone(),
                    reason: format!("relay task failed: {e}"),
                }),
            }
        }

        if answered.is_empty() {
            return Err(NnsError::ExhaustedRelays { failures });
        }

        let mut outcome = merge(&name, answered);
        outcome.failures = failures;
        tracing::info!(
            %name,
            claims = outcome.claims.len(),
            malformed = outcome.malformed,
            skipped = outcome.failures.len(),
            "query finished"
        );
        Ok(outcome)
    }
}

/// Validate and deduplicate by id, remembering where each claim was seen.
fn merge(name: &str, answered: Vec<(Url, Vec<Event>)>) -> QueryOutcome {
    let mut seen: BTreeMap<String, SightedClaim> = BTreeMap::new();
    let mut malformed = 0;
    for (relay, events) in answered {
        for event in events {
            if let Some(sighted) = seen.get_mut(&event.id) {
                // Same id means same content only if it still validates.
                if sighted.claim.as_event() == &event {
                    sighted.relays.insert(relay.clone());
                    continue;
                }
            }
            match validate(name, event) {
                Ok(claim) => {
                    seen.entry(claim.id().to_string())
                        .or_insert_with(|| SightedClaim {
                            claim,
                            relays: BTreeSet::new(),
                        })
                        .relays
                        .insert(relay.clone());
                }
                Err(e) => {
                    malformed += 1;
                    tracing::debug!(%relay, error = %e, "dropping malformed claim");
                }
            }
        }
    }
    QueryOutcome {
        claims: seen.into_values().collect(),
        malformed,
        failures: vec![],
    }
}

fn validate(name: &str, event: Event) -> Result<ClaimEvent, ClaimError> {
    let claim = ClaimEvent::from_event(event)?;
    if claim.name() != name {
        return Err(ClaimError::NameMismatch {
            expected: name.to_string(),
            found: claim.name().to_string(),
        });
    }
    Ok(claim)
}

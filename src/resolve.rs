//! Deterministic selection among competing claims for one name.
//!
//! There is no authority to settle who owns a name, so ranking is a stated
//! policy: the most recent `created_at` wins, and exact ties go to the
//! lexicographically smallest id. The full ranked set is always returned so
//! a caller can show the alternatives instead of trusting the policy.

use std::{cmp::Ordering, collections::BTreeSet};

use crate::{claim::ClaimEvent, name::Endpoint};

/// Ranking key of a claim. Greater means preferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankKey {
    pub created_at: u64,
    pub id: String,
}

impl RankKey {
    fn of(claim: &ClaimEvent) -> Self {
        Self {
            created_at: claim.created_at(),
            id: claim.id().to_string(),
        }
    }
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Outcome of resolving a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(ResolvedClaim),
    NoClaim,
}

impl Resolution {
    pub fn resolved(&self) -> Option<&ResolvedClaim> {
        match self {
            Resolution::Resolved(r) => Some(r),
            Resolution::NoClaim => None,
        }
    }
}

/// The selected endpoint plus the evidence behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedClaim {
    name: String,
    score: RankKey,
    /// Every distinct claim, best first. Never empty.
    candidates: Vec<ClaimEvent>,
}

impl ResolvedClaim {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.winner().endpoint()
    }

    pub fn winner(&self) -> &ClaimEvent {
        &self.candidates[0]
    }

    pub fn score(&self) -> &RankKey {
        &self.score
    }

    /// All claims considered, ranked.
    pub fn candidates(&self) -> &[ClaimEvent] {
        &self.candidates
    }

    /// Ranked claims other than the winner.
    pub fn alternatives(&self) -> &[ClaimEvent] {
        &self.candidates[1..]
    }

    /// Best claim for each distinct `(pubkey, endpoint)`, ranked.
    pub fn contenders(&self) -> Vec<&ClaimEvent> {
        let mut seen = BTreeSet::new();
        self.candidates
            .iter()
            .filter(|c| seen.insert((c.pubkey(), c.endpoint())))
            .collect()
    }

    /// More than one endpoint is being claimed for this name.
    pub fn is_conflicted(&self) -> bool {
        let winner = self.endpoint();
        self.candidates.iter().any(|c| c.endpoint() != winner)
    }

    /// Best claim authored by `pubkey`, if any.
    pub fn best_by(&self, pubkey: &str) -> Option<&ClaimEvent> {
        self.candidates.iter().find(|c| c.pubkey() == pubkey)
    }
}

/// Reduces a claim set for one normalized name to a ranked decision.
pub struct ClaimResolver;

impl ClaimResolver {
    /// Rank `claims` and pick a winner.
    ///
    /// Pure and order-independent. Claims are deduplicated by id; conflicts
    /// are reported through the result, never as an error.
    ///
    /// Copies of one event may carry different valid signatures, since
    /// Schnorr signing is randomized. The smallest signature is kept.
    pub fn resolve(claims: impl IntoIterator<Item = ClaimEvent>) -> Resolution {
        let mut candidates: Vec<ClaimEvent> = claims.into_iter().collect();
        candidates.sort_by(|a, b| {
            RankKey::of(b)
                .cmp(&RankKey::of(a))
                .then_with(|| a.sig().cmp(b.sig()))
        });
        candidates.dedup_by(|a, b| a.id() == b.id());

        let Some(winner) = candidates.first() else {
            return Resolution::NoClaim;
        };
        let name = winner.name().to_string();
        let score = RankKey::of(winner);
        Resolution::Resolved(ResolvedClaim {
            name,
            score,
            candidates,
        })
    }
}

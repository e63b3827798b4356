//! Concurrent fan-out of a signed claim to a relay set.

use std::{fmt, sync::Arc, time::Duration};

use futures_util::future::join_all;
use tokio::time::{timeout_at, Instant};
use url::Url;

use crate::{
    claim::ClaimEvent,
    error::{NnsError, RelayError, RelayFailure, ValidationError},
    relay::{RelayAck, RelayConnector},
};

/// What happened at one relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishStatus {
    Acknowledged,
    Rejected(String),
    TimedOut,
    Unreachable(String),
}

impl PublishStatus {
    /// True when the relay never gave an answer either way.
    fn is_silent(&self) -> bool {
        matches!(self, PublishStatus::TimedOut | PublishStatus::Unreachable(_))
    }
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishStatus::Acknowledged => write!(f, "acknowledged"),
            PublishStatus::Rejected(reason) => write!(f, "rejected ({reason})"),
            PublishStatus::TimedOut => write!(f, "timed out"),
            PublishStatus::Unreachable(reason) => write!(f, "unreachable ({reason})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub relay: Url,
    pub status: PublishStatus,
}

/// Overall verdict for user-facing reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishSummary {
    /// Every relay acknowledged.
    Success,
    /// Quorum met but some relays failed.
    Partial,
    /// Quorum not met.
    Failure,
}

/// Per-relay outcomes, in the order the relays were given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateResult {
    pub outcomes: Vec<PublishOutcome>,
    pub quorum: usize,
    pub success: bool,
}

impl AggregateResult {
    fn new(outcomes: Vec<PublishOutcome>, quorum: usize) -> Self {
        let mut result = Self {
            outcomes,
            quorum,
            success: false,
        };
        result.success = result.acknowledged() >= quorum;
        result
    }

    pub fn acknowledged(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == PublishStatus::Acknowledged)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.acknowledged()
    }

    pub fn summary(&self) -> PublishSummary {
        if !self.success {
            PublishSummary::Failure
        } else if self.failed() == 0 {
            PublishSummary::Success
        } else {
            PublishSummary::Partial
        }
    }
}

/// Sends claims to relays. Never retries; callers layer retry policy on top
/// by publishing the same event again, which relays treat as a duplicate.
#[derive(Clone)]
pub struct RelayPublisher {
    connector: Arc<dyn RelayConnector>,
}

impl RelayPublisher {
    pub fn new(connector: Arc<dyn RelayConnector>) -> Self {
        Self { connector }
    }

    /// Publish `event` to every relay concurrently under one shared deadline.
    ///
    /// Individual relay failures are recorded, not returned. The only error
    /// besides a zero quorum is [`NnsError::ExhaustedRelays`]: no relays were
    /// given, or none of them answered at all.
    pub async fn publish(
        &self,
        event: &ClaimEvent,
        relays: &[Url],
        timeout: Duration,
        quorum: usize,
    ) -> Result<AggregateResult, NnsError> {
        if quorum == 0 {
            return Err(ValidationError::ZeroQuorum.into());
        }
        if relays.is_empty() {
            return Err(NnsError::ExhaustedRelays { failures: vec![] });
        }
        let deadline = Instant::now() + timeout;
        let wire = Arc::new(event.as_event().clone());

        let handles: Vec<_> = relays
            .iter()
            .cloned()
            .map(|relay| {
                let connector = Arc::clone(&self.connector);
                let wire = Arc::clone(&wire);
                tokio::spawn(async move {
                    let status = match timeout_at(deadline, connector.publish(&relay, &wire)).await
                    {
                        Ok(Ok(RelayAck::Accepted)) => PublishStatus::Acknowledged,
                        Ok(Ok(RelayAck::Rejected(reason))) => PublishStatus::Rejected(reason),
                        Ok(Err(RelayError::TimedOut)) | Err(_) => PublishStatus::TimedOut,
                        Ok(Err(e)) => PublishStatus::Unreachable(e.to_string()),
                    };
                    PublishOutcome { relay, status }
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(relays.len());
        for (relay, joined) in relays.iter().zip(join_all(handles).await) {
            let outcome = joined.unwrap_or_else(|e| PublishOutcome {
                relay: relay.clone(),
                status: PublishStatus::Unreachable(format!("relay task failed: {e}")),
            });
            match &outcome.status {
                PublishStatus::Acknowledged => {
                    tracing::debug!(relay = %outcome.relay, id = event.id(), "claim acknowledged")
                }
                status => {
                    tracing::warn!(relay = %outcome.relay, id = event.id(), %status, "claim not stored")
                }
            }
            outcomes.push(outcome);
        }

        if outcomes.iter().all(|o| o.status.is_silent()) {
            let failures = outcomes
                .into_iter()
                .map(|o| RelayFailure {
                    relay: o.relay,
                    reason: o.status.to_string(),
                })
                .collect();
            return Err(NnsError::ExhaustedRelays { failures });
        }

        let result = AggregateResult::new(outcomes, quorum);
        tracing::info!(
            id = event.id(),
            acknowledged = result.acknowledged(),
            failed = result.failed(),
            quorum,
            success = result.success,
            "publish finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        claim::ClaimEventBuilder,
        event::Event,
        identity::Identity,
        relay::{Filter, RelayConnector},
    };
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// How a scripted relay behaves.
    #[derive(Clone)]
    pub(crate) enum Script {
        Ack,
        Reject(&'static str),
        Hang,
        Refuse,
        Events(Vec<Event>),
    }

    /// In-memory relay set keyed by URL.
    pub(crate) struct ScriptedRelays(pub HashMap<Url, Script>);

    impl ScriptedRelays {
        pub(crate) fn new(scripts: Vec<(&str, Script)>) -> (Arc<Self>, Vec<Url>) {
            let urls: Vec<Url> = scripts
                .iter()
                .map(|(u, _)| Url::parse(u).unwrap())
                .collect();
            let map = urls
                .iter()
                .cloned()
                .zip(scripts.into_iter().map(|(_, s)| s))
                .collect();
            (Arc::new(Self(map)), urls)
        }

        async fn behave(&self, relay: &Url) -> Result<Script, RelayError> {
            match self.0.get(relay).cloned() {
                Some(Script::Hang) => std::future::pending().await,
                Some(Script::Refuse) | None => {
                    Err(RelayError::Connection("connection refused".into()))
                }
                Some(script) => Ok(script),
            }
        }
    }

    #[async_trait]
    impl RelayConnector for ScriptedRelays {
        async fn publish(&self, relay: &Url, _event: &Event) -> Result<RelayAck, RelayError> {
            match self.behave(relay).await? {
                Script::Reject(reason) => Ok(RelayAck::Rejected(reason.into())),
                _ => Ok(RelayAck::Accepted),
            }
        }

        async fn fetch(&self, relay: &Url, _filter: &Filter) -> Result<Vec<Event>, RelayError> {
            match self.behave(relay).await? {
                Script::Events(events) => Ok(events),
                _ => Ok(vec![]),
            }
        }
    }

    fn claim() -> ClaimEvent {
        ClaimEventBuilder::new("mysite", "1.2.3.4:80")
            .build(&Identity::generate())
            .unwrap()
    }

    const SHORT: Duration = Duration::from_millis(100);

    #[tokio::test]
    async fn quorum_semantics_with_one_timeout() {
        let (relays, urls) = ScriptedRelays::new(vec![
            ("wss://a.example", Script::Ack),
            ("wss://b.example", Script::Ack),
            ("wss://c.example", Script::Hang),
        ]);
        let publisher = RelayPublisher::new(relays);
        let event = claim();

        let res = publisher.publish(&event, &urls, SHORT, 1).await.unwrap();
        assert_eq!(res.acknowledged(), 2);
        assert_eq!(res.failed(), 1);
        assert!(res.success);
        assert_eq!(res.summary(), PublishSummary::Partial);
        assert_eq!(res.outcomes[2].status, PublishStatus::TimedOut);

        let res = publisher.publish(&event, &urls, SHORT, 3).await.unwrap();
        assert_eq!(res.acknowledged(), 2);
        assert!(!res.success);
        assert_eq!(res.summary(), PublishSummary::Failure);
    }

    #[tokio::test]
    async fn outcomes_keep_relay_order_and_detail() {
        let (relays, urls) = ScriptedRelays::new(vec![
            ("wss://slow.example", Script::Hang),
            ("wss://no.example", Script::Reject("blocked: pow required")),
            ("wss://down.example", Script::Refuse),
            ("wss://ok.example", Script::Ack),
        ]);
        let res = RelayPublisher::new(relays)
            .publish(&claim(), &urls, SHORT, 1)
            .await
            .unwrap();
        let relays: Vec<_> = res.outcomes.iter().map(|o| o.relay.clone()).collect();
        assert_eq!(relays, urls);
        assert_eq!(res.outcomes[0].status, PublishStatus::TimedOut);
        assert_eq!(
            res.outcomes[1].status,
            PublishStatus::Rejected("blocked: pow required".into())
        );
        assert!(matches!(res.outcomes[2].status, PublishStatus::Unreachable(_)));
        assert_eq!(res.outcomes[3].status, PublishStatus::Acknowledged);
        assert!(res.success);
    }

    #[tokio::test]
    async fn all_acknowledged_is_full_success() {
        let (relays, urls) = ScriptedRelays::new(vec![
            ("wss://a.example", Script::Ack),
            ("wss://b.example", Script::Ack),
        ]);
        let res = RelayPublisher::new(relays)
            .publish(&claim(), &urls, SHORT, 2)
            .await
            .unwrap();
        assert_eq!(res.summary(), PublishSummary::Success);
    }

    #[tokio::test]
    async fn slow_relay_does_not_delay_past_deadline() {
        let (relays, urls) = ScriptedRelays::new(vec![
            ("wss://a.example", Script::Ack),
            ("wss://b.example", Script::Hang),
        ]);
        let started = std::time::Instant::now();
        RelayPublisher::new(relays)
            .publish(&claim(), &urls, SHORT, 1)
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn every_relay_silent_is_exhaustion() {
        let (relays, urls) = ScriptedRelays::new(vec![
            ("wss://a.example", Script::Refuse),
            ("wss://b.example", Script::Hang),
        ]);
        let err = RelayPublisher::new(relays)
            .publish(&claim(), &urls, SHORT, 1)
            .await
            .unwrap_err();
        let NnsError::ExhaustedRelays { failures } = err else {
            panic!("expected exhaustion, got {err:?}");
        };
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[1].reason, "timed out");
    }

    #[tokio::test]
    async fn rejections_are_answers_not_exhaustion() {
        let (relays, urls) = ScriptedRelays::new(vec![("wss://a.example", Script::Reject("no"))]);
        let res = RelayPublisher::new(relays)
            .publish(&claim(), &urls, SHORT, 1)
            .await
            .unwrap();
        assert!(!res.success);
        assert_eq!(res.failed(), 1);
    }

    #[tokio::test]
    async fn empty_relays_and_zero_quorum() {
        let (relays, _) = ScriptedRelays::new(vec![]);
        let publisher = RelayPublisher::new(relays);
        assert!(matches!(
            publisher.publish(&claim(), &[], SHORT, 1).await,
            Err(NnsError::ExhaustedRelays { .. })
        ));
        let url = Url::parse("wss://a.example").unwrap();
        assert!(matches!(
            publisher.publish(&claim(), &[url], SHORT, 0).await,
            Err(NnsError::Validation(ValidationError::ZeroQuorum))
        ));
    }
}

mod common;

use std::{sync::Arc, time::Duration};

use common::{spawn_relay, Mode};
use nns::{
    cache::ClaimCache,
    claim::ClaimEventBuilder,
    identity::{Identity, Signer},
    publish::{PublishStatus, PublishSummary},
    NameService, NnsError, RelayContext, Resolution, WsConnector,
};
use tempfile::TempDir;
use url::Url;

fn service(relays: Vec<Url>, quorum: usize) -> NameService {
    let ctx = RelayContext {
        relays,
        timeout: Duration::from_millis(500),
        quorum,
    };
    NameService::new(ctx, Arc::new(WsConnector::default()))
}

#[tokio::test]
async fn publish_then_resolve() {
    let a = spawn_relay(Mode::Store).await;
    let b = spawn_relay(Mode::Store).await;
    let svc = service(vec![a.url.clone(), b.url.clone()], 2);
    let id = Identity::generate();

    let (claim, result) = svc
        .publish(&id, "MySite", "10.0.0.1:8080", Some("home"))
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.summary(), PublishSummary::Success);
    assert_eq!(a.stored(), 1);
    assert_eq!(b.stored(), 1);

    let lookup = svc.lookup("mysite").await.unwrap();
    let Resolution::Resolved(resolved) = &lookup.resolution else {
        panic!("expected a claim");
    };
    assert_eq!(resolved.winner(), &claim);
    assert_eq!(resolved.endpoint().to_string(), "10.0.0.1:8080");
    assert_eq!(lookup.claims.len(), 1);
    assert_eq!(lookup.claims[0].relays.len(), 2);
    assert_eq!(resolved.winner().note(), Some("home"));
}

#[tokio::test]
async fn republishing_counts_duplicates_as_acknowledged() {
    let relay = spawn_relay(Mode::Store).await;
    let svc = service(vec![relay.url.clone()], 1);
    let claim = ClaimEventBuilder::new("mysite", "10.0.0.1:80")
        .build(&Identity::generate())
        .unwrap();
    let publisher = nns::RelayPublisher::new(Arc::new(WsConnector::default()));
    for _ in 0..2 {
        let res = publisher
            .publish(&claim, &svc.context().relays, Duration::from_millis(500), 1)
            .await
            .unwrap();
        assert_eq!(res.outcomes[0].status, PublishStatus::Acknowledged);
    }
    assert_eq!(relay.stored(), 1);
}

#[tokio::test]
async fn competing_claims_resolve_to_newest() {
    let relay = spawn_relay(Mode::Store).await;
    let alice = Identity::generate();
    let bob = Identity::generate();
    let old = ClaimEventBuilder::new("mysite", "1.1.1.1:80")
        .created_at(1_000)
        .build(&alice)
        .unwrap();
    let new = ClaimEventBuilder::new("mysite", "2.2.2.2:80")
        .created_at(2_000)
        .build(&bob)
        .unwrap();
    let other = ClaimEventBuilder::new("othersite", "3.3.3.3:80")
        .build(&bob)
        .unwrap();
    for claim in [&old, &new, &other] {
        relay.seed(serde_json::to_value(claim.as_event()).unwrap());
    }
    // junk that a careless relay might serve
    relay.seed(serde_json::json!({
        "id": "00".repeat(32),
        "pubkey": alice.public_key_hex(),
        "kind": 34256,
        "created_at": 3_000,
        "tags": [["d", "mysite"], ["ip", "6.6.6.6:80"]],
        "content": "",
        "sig": "00".repeat(64),
    }));

    let lookup = service(vec![relay.url.clone()], 1)
        .lookup("mysite")
        .await
        .unwrap();
    let resolved = lookup.resolution.resolved().unwrap();
    assert_eq!(resolved.winner(), &new);
    assert_eq!(resolved.alternatives(), &[old]);
    assert!(resolved.is_conflicted());
    assert_eq!(lookup.malformed, 1);
}

#[tokio::test]
async fn silent_and_rejecting_relays() {
    let ok = spawn_relay(Mode::Store).await;
    let silent = spawn_relay(Mode::Silent).await;
    let picky = spawn_relay(Mode::Reject("blocked: pow required")).await;
    let svc = service(vec![ok.url.clone(), silent.url.clone(), picky.url.clone()], 1);

    let (_, result) = svc
        .publish(&Identity::generate(), "mysite", "10.0.0.1:80", None)
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.summary(), PublishSummary::Partial);
    assert_eq!(result.outcomes[1].status, PublishStatus::TimedOut);
    assert_eq!(
        result.outcomes[2].status,
        PublishStatus::Rejected("blocked: pow required".into())
    );

    let lookup = svc.lookup("mysite").await.unwrap();
    assert!(lookup.resolution.resolved().is_some());
    assert_eq!(lookup.failures.len(), 1);
    assert_eq!(lookup.failures[0].relay, silent.url);
}

#[tokio::test]
async fn unclaimed_name_differs_from_unreachable_relays() {
    let empty = spawn_relay(Mode::Store).await;
    let lookup = service(vec![empty.url.clone()], 1)
        .lookup("nobody")
        .await
        .unwrap();
    assert_eq!(lookup.resolution, Resolution::NoClaim);

    let silent = spawn_relay(Mode::Silent).await;
    let err = service(vec![silent.url.clone()], 1)
        .lookup("nobody")
        .await
        .unwrap_err();
    assert!(matches!(err, NnsError::ExhaustedRelays { ref failures } if failures.len() == 1));
}

#[tokio::test]
async fn cached_lookup_survives_relay_outage() {
    let dir = TempDir::new().unwrap();
    let relay = spawn_relay(Mode::Store).await;
    let id = Identity::generate();
    let cached = service(vec![relay.url.clone()], 1)
        .with_cache(ClaimCache::new(dir.path().to_path_buf()), 600);
    let (claim, _) = cached
        .publish(&id, "mysite", "10.0.0.1:80", None)
        .await
        .unwrap();
    assert!(!cached.lookup("mysite").await.unwrap().from_cache);

    let silent = spawn_relay(Mode::Silent).await;
    let offline = service(vec![silent.url.clone()], 1)
        .with_cache(ClaimCache::new(dir.path().to_path_buf()), 600);
    let lookup = offline.lookup("mysite").await.unwrap();
    assert!(lookup.from_cache);
    assert_eq!(lookup.preferred(), Some(&claim));
}

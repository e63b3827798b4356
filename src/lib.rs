//! Decentralized name claims over Nostr relays.
//!
//! A name claim is a signed event binding a human-readable name to a
//! `host:port` endpoint. Claims are published to a set of relays, looked up
//! again from the same relays and reduced to one endpoint by a deterministic
//! ranking policy. Nothing stops two keys claiming the same name, so every
//! lookup also reports the competing claims.

pub mod cache;
pub mod claim;
pub mod config;
pub mod error;
pub mod event;
pub mod identity;
pub mod name;
pub mod publish;
pub mod query;
pub mod relay;
pub mod resolve;
pub mod service;

pub use claim::{ClaimEvent, ClaimEventBuilder};
pub use error::{NnsError, Result};
pub use event::{Event, CLAIM_KIND};
pub use identity::{Identity, Signer};
pub use publish::{AggregateResult, PublishStatus, RelayPublisher};
pub use query::RelayQueryEngine;
pub use relay::{RelayConnector, WsConnector};
pub use resolve::{ClaimResolver, Resolution};
pub use service::{Lookup, NameService, RelayContext};

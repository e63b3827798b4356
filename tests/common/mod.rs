//! In-process NIP-01 relay for exercising the WebSocket client.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::{net::TcpListener, task};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use url::Url;

/// How the relay treats incoming messages.
#[derive(Clone, Copy)]
pub enum Mode {
    /// Store events and serve them back.
    Store,
    /// Refuse every event with the given reason.
    Reject(&'static str),
    /// Accept connections and never answer.
    Silent,
}

pub struct FakeRelay {
    pub url: Url,
    pub events: Arc<Mutex<Vec<Value>>>,
}

impl FakeRelay {
    /// Add an event as if another client had published it.
    pub fn seed(&self, event: Value) {
        self.events.lock().unwrap().push(event);
    }

    pub fn stored(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

pub async fn spawn_relay(mode: Mode) -> FakeRelay {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let events: Arc<Mutex<Vec<Value>>> = Arc::default();
    let store = Arc::clone(&events);
    task::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let store = Arc::clone(&store);
            task::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    let Message::Text(txt) = msg else {
                        continue;
                    };
                    if matches!(mode, Mode::Silent) {
                        continue;
                    }
                    let Ok(val) = serde_json::from_str::<Value>(&txt) else {
                        continue;
                    };
                    for reply in handle(mode, &store, &val) {
                        if ws.send(Message::Text(reply.to_string())).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });
    FakeRelay {
        url: Url::parse(&format!("ws://{addr}")).unwrap(),
        events,
    }
}

fn handle(mode: Mode, store: &Mutex<Vec<Value>>, msg: &Value) -> Vec<Value> {
    match msg[0].as_str() {
        Some("EVENT") => {
            let event = &msg[1];
            let id = event["id"].clone();
            if let Mode::Reject(reason) = mode {
                return vec![json!(["OK", id, false, reason])];
            }
            let mut events = store.lock().unwrap();
            if events.iter().any(|e| e["id"] == id) {
                return vec![json!(["OK", id, false, "duplicate: already have this event"])];
            }
            events.push(event.clone());
            vec![json!(["OK", id, true, ""])]
        }
        Some("REQ") => {
            let sub = msg[1].clone();
            let names: Vec<Value> = msg[2]["#d"].as_array().cloned().unwrap_or_default();
            let events = store.lock().unwrap();
            let mut replies: Vec<Value> = events
                .iter()
                .filter(|e| names.is_empty() || has_d_tag(e, &names))
                .map(|e| json!(["EVENT", sub, e]))
                .collect();
            replies.push(json!(["EOSE", sub]));
            replies
        }
        _ => vec![],
    }
}

fn has_d_tag(event: &Value, names: &[Value]) -> bool {
    event["tags"]
        .as_array()
        .into_iter()
        .flatten()
        .any(|t| t[0] == "d" && names.contains(&t[1]))
}

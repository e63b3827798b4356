//! Relay collaborator: NIP-01 publish and subscription over WebSocket.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{client_async, tungstenite::Message, WebSocketStream};
use url::Url;

use crate::{
    error::{RelayError, ValidationError},
    event::{Event, CLAIM_KIND},
};

/// Maximum number of claims requested per relay.
pub const CLAIM_QUERY_LIMIT: u32 = 50;

/// A relay's answer to a publish request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayAck {
    Accepted,
    Rejected(String),
}

/// Subscription filter sent with `REQ`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<u32>,
    #[serde(rename = "#d", skip_serializing_if = "Vec::is_empty")]
    pub d_tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl Filter {
    /// Claims for an already-normalized name.
    pub fn claims_for(name: &str) -> Self {
        Self {
            kinds: vec![CLAIM_KIND],
            d_tags: vec![name.to_string()],
            limit: Some(CLAIM_QUERY_LIMIT),
        }
    }
}

/// Transport to a single relay.
///
/// Implementations handle one relay per call. Fan-out, timeouts and
/// aggregation live in the publisher and query engine.
#[async_trait]
pub trait RelayConnector: Send + Sync {
    /// Send `event` and wait for the relay's acceptance or rejection.
    async fn publish(&self, relay: &Url, event: &Event) -> Result<RelayAck, RelayError>;

    /// Stream back every stored event matching `filter` until end-of-results.
    async fn fetch(&self, relay: &Url, filter: &Filter) -> Result<Vec<Event>, RelayError>;
}

/// Parse and check a relay URL (`ws://` or `wss://`).
pub fn parse_relay_url(raw: &str) -> Result<Url, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidRelay {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => return Err(invalid(format!("unsupported scheme {other}"))),
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".into()));
    }
    Ok(url)
}

/// WebSocket relay client, optionally tunnelled through a SOCKS5 proxy.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    proxy: Option<String>,
}

impl WsConnector {
    pub fn new(proxy: Option<String>) -> Self {
        Self { proxy }
    }
}

#[async_trait]
impl RelayConnector for WsConnector {
    async fn publish(&self, relay: &Url, event: &Event) -> Result<RelayAck, RelayError> {
        let mut ws = connect_ws(relay, self.proxy.as_deref()).await?;
        let msg = serde_json::json!(["EVENT", event]);
        ws.send(Message::Text(msg.to_string()))
            .await
            .map_err(|e| RelayError::Connection(e.to_string()))?;

        while let Some(msg) = ws.next().await {
            match msg.map_err(|e| RelayError::Connection(e.to_string()))? {
                Message::Text(txt) => {
                    if let Some(ack) = parse_ok(&txt, &event.id) {
                        let _ = ws.close(None).await;
                        return Ok(ack);
                    }
                    log_notice(relay, &txt);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        Err(RelayError::Closed)
    }

    async fn fetch(&self, relay: &Url, filter: &Filter) -> Result<Vec<Event>, RelayError> {
        let mut ws = connect_ws(relay, self.proxy.as_deref()).await?;
        let sub_id = subscription_id();
        let req = serde_json::json!(["REQ", sub_id, filter]);
        ws.send(Message::Text(req.to_string()))
            .await
            .map_err(|e| RelayError::Connection(e.to_string()))?;

        let mut events = Vec::new();
        let mut finished = false;
        while let Some(msg) = ws.next().await {
            match msg.map_err(|e| RelayError::Connection(e.to_string()))? {
                Message::Text(txt) => {
                    let Ok(val) = serde_json::from_str::<Value>(&txt) else {
                        continue;
                    };
                    let Some(arr) = val.as_array() else {
                        continue;
                    };
                    if arr.get(1).and_then(Value::as_str) != Some(sub_id.as_str()) {
                        log_notice(relay, &txt);
                        continue;
                    }
                    match arr.first().and_then(Value::as_str) {
                        Some("EVENT") if arr.len() >= 3 => {
                            match serde_json::from_value::<Event>(arr[2].clone()) {
                                Ok(ev) => events.push(ev),
                                Err(e) => {
                                    tracing::debug!(%relay, error = %e, "skipping undecodable event")
                                }
                            }
                        }
                        Some("EOSE") => {
                            finished = true;
                            break;
                        }
                        Some("CLOSED") => {
                            let reason = arr.get(2).and_then(Value::as_str).unwrap_or_default();
                            return Err(RelayError::Protocol(format!(
                                "subscription closed: {reason}"
                            )));
                        }
                        _ => {}
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        if !finished {
            return Err(RelayError::Closed);
        }
        let close = serde_json::json!(["CLOSE", sub_id]);
        let _ = ws.send(Message::Text(close.to_string())).await;
        let _ = ws.close(None).await;
        Ok(events)
    }
}

/// Interpret `["OK", <id>, <accepted>, <message>]` for our event id.
fn parse_ok(txt: &str, id: &str) -> Option<RelayAck> {
    let val: Value = serde_json::from_str(txt).ok()?;
    let arr = val.as_array()?;
    if arr.first()?.as_str()? != "OK" || arr.get(1)?.as_str()? != id {
        return None;
    }
    let accepted = arr.get(2)?.as_bool()?;
    let message = arr.get(3).and_then(Value::as_str).unwrap_or_default();
    // Relays answer a re-published event with `false, "duplicate: ..."`.
    if accepted || message.starts_with("duplicate:") {
        Some(RelayAck::Accepted)
    } else {
        Some(RelayAck::Rejected(message.to_string()))
    }
}

fn log_notice(relay: &Url, txt: &str) {
    tracing::debug!(%relay, message = %txt, "ignoring relay message");
}

fn subscription_id() -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("nns-{suffix:08x}")
}

/// Establish a WebSocket connection, optionally via a SOCKS5 proxy.
async fn connect_ws(
    relay: &Url,
    proxy: Option<&str>,
) -> Result<WebSocketStream<Box<dyn AsyncReadWrite + Unpin + Send>>, RelayError> {
    let host = relay
        .host_str()
        .ok_or_else(|| RelayError::Connection("missing host".into()))?;
    let port = relay
        .port_or_known_default()
        .ok_or_else(|| RelayError::Connection("missing port".into()))?;
    let req = relay
        .as_str()
        .into_client_request()
        .map_err(|e| RelayError::Connection(e.to_string()))?;
    let stream: Box<dyn AsyncReadWrite + Unpin + Send> = if let Some(proxy) = proxy {
        Box::new(
            Socks5Stream::connect(proxy, (host, port))
                .await
                .map_err(|e| RelayError::Connection(e.to_string()))?,
        )
    } else {
        Box::new(
            TcpStream::connect((host, port))
                .await
                .map_err(|e| RelayError::Connection(e.to_string()))?,
        )
    };
    let (ws, _) = client_async(req, stream)
        .await
        .map_err(|e| RelayError::Connection(e.to_string()))?;
    Ok(ws)
}

/// Blanket trait for boxed async read/write streams.
trait AsyncReadWrite: AsyncRead + AsyncWrite {}
impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}

//! socket.io (Engine.IO v4) client over `tokio-tungstenite`.
//!
//! Only implements what the mining stream needs: namespace connect with an
//! auth payload, ping/pong, and inbound events. No acks, no binary packets,
//! no polling transport.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{ChannelConnector, ChannelEvent};
use crate::error::{ChannelError, ChannelResult};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Decoded Engine.IO / socket.io packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Engine.IO handshake with session parameters.
    Open(Value),
    /// Engine.IO close.
    Close,
    /// Engine.IO ping from the server.
    Ping,
    /// Engine.IO pong.
    Pong,
    /// Namespace connect acknowledgement.
    Connect { namespace: String, data: Option<Value> },
    /// Namespace disconnect.
    Disconnect { namespace: String },
    /// Named event.
    Event {
        namespace: String,
        name: String,
        payload: Value,
    },
    /// Namespace connect refused.
    ConnectError { namespace: String, data: Option<Value> },
    /// Anything this client does not act on.
    Other(String),
}

/// Decode one text frame.
pub fn decode_packet(text: &str) -> ChannelResult<Packet> {
    let mut chars = text.chars();
    let packet = match chars.next() {
        Some('0') => Packet::Open(parse_json(chars.as_str())?.unwrap_or(Value::Null)),
        Some('1') => Packet::Close,
        Some('2') => Packet::Ping,
        Some('3') => Packet::Pong,
        Some('4') => decode_socket_packet(chars.as_str())?,
        _ => Packet::Other(text.to_string()),
    };
    Ok(packet)
}

fn decode_socket_packet(body: &str) -> ChannelResult<Packet> {
    let mut chars = body.chars();
    let kind = chars.next();
    let rest = chars.as_str();

    let (namespace, rest) = match rest.strip_prefix('/') {
        Some(_) => match rest.split_once(',') {
            Some((ns, tail)) => (ns.to_string(), tail),
            None => (rest.to_string(), ""),
        },
        None => ("/".to_string(), rest),
    };
    // ack ids are not used by this client
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());
    let data = parse_json(rest)?;

    let packet = match kind {
        Some('0') => Packet::Connect { namespace, data },
        Some('1') => Packet::Disconnect { namespace },
        Some('2') => {
            let mut items = match data {
                Some(Value::Array(items)) => items.into_iter(),
                other => {
                    return Err(ChannelError::Protocol {
                        message: format!("event payload is not an array: {:?}", other),
                    })
                }
            };
            let name = match items.next() {
                Some(Value::String(name)) => name,
                _ => {
                    return Err(ChannelError::Protocol {
                        message: "event without a name".to_string(),
                    })
                }
            };
            Packet::Event {
                namespace,
                name,
                payload: items.next().unwrap_or(Value::Null),
            }
        }
        Some('4') => Packet::ConnectError { namespace, data },
        _ => Packet::Other(format!("4{}", body)),
    };
    Ok(packet)
}

fn parse_json(raw: &str) -> ChannelResult<Option<Value>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(raw)
        .map(Some)
        .map_err(|e| ChannelError::Protocol {
            message: format!("invalid packet JSON: {}", e),
        })
}

/// Encode a namespace connect carrying an auth payload.
pub fn encode_connect(namespace: &str, auth: &Value) -> String {
    if namespace == "/" {
        format!("40{}", auth)
    } else {
        format!("40{},{}", namespace, auth)
    }
}

/// Engine.IO pong frame.
pub const PONG_FRAME: &str = "3";

/// Connector speaking socket.io over a WebSocket.
#[derive(Debug, Clone)]
pub struct SocketIoConnector {
    url: String,
    namespace: String,
}

impl SocketIoConnector {
    /// Create a connector for `base_url` (http/https/ws/wss) and a namespace.
    pub fn new(base_url: &str, namespace: impl Into<String>) -> Self {
        let base = base_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };

        Self {
            url: format!("{}/socket.io/?EIO=4&transport=websocket", base),
            namespace: namespace.into(),
        }
    }

    /// WebSocket URL this connector dials.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn handshake(&self, ws: &mut WsStream, token: &str) -> ChannelResult<()> {
        match next_packet(ws).await? {
            Some(Packet::Open(params)) => {
                debug!(sid = %params["sid"], "Engine.IO session opened");
            }
            other => {
                return Err(ChannelError::Handshake {
                    message: format!("expected open packet, got {:?}", other),
                })
            }
        }

        let connect = encode_connect(&self.namespace, &json!({ "token": token }));
        ws.send(WsMessage::Text(connect.into())).await?;

        loop {
            match next_packet(ws).await? {
                Some(Packet::Connect { namespace, .. }) if namespace == self.namespace => {
                    return Ok(());
                }
                Some(Packet::ConnectError { data, .. }) => {
                    return Err(ChannelError::Handshake {
                        message: data
                            .and_then(|d| d.get("message").and_then(Value::as_str).map(String::from))
                            .unwrap_or_else(|| "connection refused".to_string()),
                    });
                }
                Some(Packet::Ping) => {
                    ws.send(WsMessage::Text(PONG_FRAME.into())).await?;
                }
                Some(other) => debug!(packet = ?other, "Ignoring packet during handshake"),
                None => return Err(ChannelError::Closed),
            }
        }
    }
}

#[async_trait]
impl ChannelConnector for SocketIoConnector {
    async fn connect(&self, token: &str) -> ChannelResult<mpsc::Receiver<ChannelEvent>> {
        let (mut ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ChannelError::Connect {
                message: e.to_string(),
            })?;

        self.handshake(&mut ws, token).await?;
        info!(namespace = %self.namespace, "socket.io namespace connected");

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(pump(ws, self.namespace.clone(), tx));
        Ok(rx)
    }
}

/// Forward events until the socket closes or the receiver is dropped.
async fn pump(mut ws: WsStream, namespace: String, tx: mpsc::Sender<ChannelEvent>) {
    loop {
        let packet = tokio::select! {
            _ = tx.closed() => {
                debug!("Event receiver dropped, closing socket");
                let _ = ws.close(None).await;
                return;
            }
            packet = next_packet(&mut ws) => packet,
        };

        match packet {
            Ok(Some(Packet::Ping)) => {
                if ws.send(WsMessage::Text(PONG_FRAME.into())).await.is_err() {
                    return;
                }
            }
            Ok(Some(Packet::Event {
                namespace: ns,
                name,
                payload,
            })) if ns == namespace => {
                if tx.send(ChannelEvent::new(name, payload)).await.is_err() {
                    let _ = ws.close(None).await;
                    return;
                }
            }
            Ok(Some(Packet::Disconnect { namespace: ns })) if ns == namespace => {
                info!(namespace = %ns, "Server disconnected namespace");
                return;
            }
            Ok(Some(Packet::Close)) | Ok(None) => return,
            Ok(Some(other)) => debug!(packet = ?other, "Ignoring packet"),
            Err(e) => {
                warn!(error = %e, "Dropping unreadable packet");
            }
        }
    }
}

/// Next text packet; `Ok(None)` once the socket is closed.
async fn next_packet(ws: &mut WsStream) -> ChannelResult<Option<Packet>> {
    while let Some(frame) = ws.next().await {
        match frame? {
            WsMessage::Text(text) => return decode_packet(text.as_str()).map(Some),
            WsMessage::Close(_) => return Ok(None),
            WsMessage::Ping(data) => ws.send(WsMessage::Pong(data)).await?,
            _ => {}
        }
    }
    Ok(None)
}

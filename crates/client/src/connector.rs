//! Gateway connector
//!
//! Dials the chat gateway over WebSocket, pumps events in both directions,
//! and reconnects with a bounded retry policy when the transport drops.
//! Rejoining after a reconnect replays the same identity; the server treats
//! it as a replace, not a duplicate.

use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use url::Url;
use uuid::Uuid;

use koinonia_shared::{ClientEvent, FileAttachment, MessageBody, RoomId, ServerEvent};

use crate::error::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Session-scoped identity, passed explicitly at connect time
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub name: String,
    pub room: RoomId,
    pub avatar_ref: Option<String>,
}

impl SessionContext {
    pub fn new(name: impl Into<String>, room: impl Into<RoomId>) -> Self {
        Self {
            name: name.into(),
            room: room.into(),
            avatar_ref: None,
        }
    }
}

/// Bounded automatic reconnection policy
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(250),
        }
    }
}

/// A connected chat client
///
/// Incoming events arrive on the receiver returned by [`ChatClient::connect`];
/// the channel closing means the connection is gone for good (reconnects
/// exhausted) and the session must be re-entered manually.
pub struct ChatClient {
    outgoing: mpsc::UnboundedSender<ClientEvent>,
    ctx: Arc<Mutex<SessionContext>>,
    typing: AtomicBool,
}

impl ChatClient {
    /// Connect with the default reconnect policy
    pub async fn connect(
        base_url: &str,
        ctx: SessionContext,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ServerEvent>), ClientError> {
        Self::connect_with_policy(base_url, ctx, ReconnectPolicy::default()).await
    }

    /// Connect, retrying the initial dial under the same bounded policy used
    /// for mid-session reconnects
    pub async fn connect_with_policy(
        base_url: &str,
        ctx: SessionContext,
        policy: ReconnectPolicy,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ServerEvent>), ClientError> {
        let url = gateway_url(base_url, &ctx)?;
        let stream = connect_with_retry(&url, &policy).await?;
        tracing::info!(name = %ctx.name, room = %ctx.room, "Connected to chat gateway");

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let ctx = Arc::new(Mutex::new(ctx));

        tokio::spawn(pump(
            stream,
            base_url.to_string(),
            Arc::clone(&ctx),
            policy,
            event_tx,
            out_rx,
        ));

        Ok((
            Self {
                outgoing: out_tx,
                ctx,
                typing: AtomicBool::new(false),
            },
            event_rx,
        ))
    }

    /// Switch rooms; the old room sees a leave, the new one a join
    pub async fn join_room(&self, room: impl Into<RoomId>) -> Result<(), ClientError> {
        let room = room.into();
        self.ctx.lock().await.room = room.clone();
        self.enqueue(ClientEvent::JoinRoom { room })
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), ClientError> {
        self.send_body(MessageBody::text(text)).await
    }

    pub async fn send_voice(&self, body: MessageBody) -> Result<(), ClientError> {
        self.send_body(body).await
    }

    pub async fn send_file(&self, attachment: FileAttachment) -> Result<(), ClientError> {
        self.send_body(MessageBody::File { attachment }).await
    }

    /// Send any message body to the current room
    ///
    /// Sending implicitly clears this client's own typing state.
    pub async fn send_body(&self, body: MessageBody) -> Result<(), ClientError> {
        let room = self.ctx.lock().await.room.clone();
        if self.typing.swap(false, Ordering::SeqCst) {
            self.enqueue(ClientEvent::UserTyping {
                room: room.clone(),
                is_typing: false,
            })?;
        }
        self.enqueue(ClientEvent::SendMessage { room, body })
    }

    pub async fn set_typing(&self, is_typing: bool) -> Result<(), ClientError> {
        let room = self.ctx.lock().await.room.clone();
        self.typing.store(is_typing, Ordering::SeqCst);
        self.enqueue(ClientEvent::UserTyping { room, is_typing })
    }

    /// Report a received message as seen
    pub async fn mark_read(&self, message_id: Uuid) -> Result<(), ClientError> {
        let room = self.ctx.lock().await.room.clone();
        self.enqueue(ClientEvent::MarkRead { room, message_id })
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        self.enqueue(ClientEvent::Ping)
    }

    fn enqueue(&self, event: ClientEvent) -> Result<(), ClientError> {
        self.outgoing
            .send(event)
            .map_err(|_| ClientError::ConnectionClosed)
    }
}

/// Socket pump: forwards queued client events out, parsed server events in,
/// and reconnects on transport drop until the policy is exhausted
async fn pump(
    mut stream: WsStream,
    base_url: String,
    ctx: Arc<Mutex<SessionContext>>,
    policy: ReconnectPolicy,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    mut out_rx: mpsc::UnboundedReceiver<ClientEvent>,
) {
    loop {
        let (mut sink, mut read) = stream.split();

        let dropped = loop {
            tokio::select! {
                outgoing = out_rx.recv() => match outgoing {
                    Some(event) => {
                        let Ok(json) = serde_json::to_string(&event) else { continue };
                        if sink.send(WsMessage::Text(json)).await.is_err() {
                            break true;
                        }
                    }
                    // Client handle dropped: clean shutdown
                    None => break false,
                },
                incoming = read.next() => match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(event) => {
                                if event_tx.send(event).is_err() {
                                    break false; // Nobody listening anymore
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = ?e, "Unparseable server event");
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break true,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = ?e, "WebSocket read error");
                        break true;
                    }
                },
            }
        };

        if !dropped {
            return;
        }

        // Transport drop: bounded reconnect with the current identity.
        // The server replaces the stale presence entry on rejoin.
        let url = {
            let ctx = ctx.lock().await;
            match gateway_url(&base_url, &ctx) {
                Ok(url) => url,
                Err(e) => {
                    tracing::error!(error = %e, "Cannot rebuild gateway address");
                    return;
                }
            }
        };
        match connect_with_retry(&url, &policy).await {
            Ok(new_stream) => {
                tracing::info!("Reconnected to chat gateway");
                stream = new_stream;
            }
            Err(e) => {
                // Dropping event_tx closes the event channel: the session is
                // over until the caller reconnects manually
                tracing::error!(error = %e, "Reconnect attempts exhausted");
                return;
            }
        }
    }
}

async fn connect_with_retry(url: &Url, policy: &ReconnectPolicy) -> Result<WsStream, ClientError> {
    let strategy =
        FixedInterval::new(policy.delay).take(policy.max_attempts.saturating_sub(1));

    let attempts = policy.max_attempts;
    Retry::spawn(strategy, || async {
        connect_async(url.as_str()).await.map(|(stream, _)| stream)
    })
    .await
    .map_err(|source| ClientError::ConnectFailed { attempts, source })
}

fn gateway_url(base_url: &str, ctx: &SessionContext) -> Result<Url, ClientError> {
    let mut url = Url::parse(base_url).map_err(|e| ClientError::Address(e.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ClientError::Address(format!(
                "unsupported scheme: {other}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| ClientError::Address("cannot derive websocket scheme".to_string()))?;
    url.set_path("/ws/chat");
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        pairs.append_pair("name", &ctx.name);
        pairs.append_pair("room", ctx.room.as_str());
        if let Some(avatar) = &ctx.avatar_ref {
            pairs.append_pair("avatar", avatar);
        }
    }
    Ok(url)
}

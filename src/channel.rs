//! Bidirectional event channel to the Volumio socket.io API.
//!
//! One spawned task owns the websocket for the lifetime of the
//! connection. Commands go in through an unbounded queue and are written
//! fire-and-forget; inbound frames are decoded and dispatched to the
//! registered push handlers on that same task, so handler invocations are
//! serialized with each other by construction.
//!
//! There is no request/response correlation anywhere in the protocol.
//! [`EventChannel::wait_quiescent`] is the only synchronization primitive
//! offered: a bounded pause that gives the delivery task time to run
//! handlers before the caller inspects shared state.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WebsocketMessage, MaybeTlsStream, WebSocketStream,
};

use crate::error::{Error, Result};
use crate::protocol::{self, Emit, Handshake, Packet, PushKind};

/// Handler invoked with the payload of a registered push event.
pub type PushHandler = Box<dyn FnMut(Value) + Send>;

type HandlerMap = HashMap<PushKind, PushHandler>;
type Transport = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Timeout for the TCP/websocket connect.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for each engine.io/socket.io handshake packet.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace period for the channel task to wind down on disconnect.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

enum Outbound {
    Emit(Emit),
    Close,
}

/// Handle to a connected channel.
///
/// Dropping the handle closes the connection; [`EventChannel::disconnect`]
/// does the same but waits for the close frame to go out.
pub struct EventChannel {
    tx: mpsc::UnboundedSender<Outbound>,
    handlers: Arc<Mutex<HandlerMap>>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel").finish_non_exhaustive()
    }
}

impl EventChannel {
    /// Opens a channel to a socket.io endpoint.
    ///
    /// Completes the websocket upgrade and the engine.io open and
    /// socket.io connect packets before returning, so a returned channel
    /// is ready to emit.
    ///
    /// # Errors
    ///
    /// * `Unavailable` - connection refused or rejected
    /// * `DeadlineExceeded` - connect or handshake timed out
    /// * `Aborted` - remote closed the stream mid-handshake
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let (mut ws, _) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(endpoint)).await??;

        let handshake = tokio::time::timeout(HANDSHAKE_TIMEOUT, expect_open(&mut ws)).await??;
        tokio::time::timeout(HANDSHAKE_TIMEOUT, expect_connect(&mut ws)).await??;
        debug!(
            "session {} open, ping interval {:?}",
            handshake.sid,
            handshake.ping_interval()
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let handlers = Arc::new(Mutex::new(HandlerMap::new()));
        let task = tokio::spawn(channel_task(
            ws,
            rx,
            Arc::clone(&handlers),
            handshake.ping_interval(),
        ));

        Ok(Self { tx, handlers, task })
    }

    /// Registers the handler for a push event kind.
    ///
    /// At most one handler per kind; registering again replaces the
    /// previous one. Pushes of kinds without a handler are dropped with a
    /// trace log.
    pub fn on<F>(&self, kind: PushKind, handler: F)
    where
        F: FnMut(Value) + Send + 'static,
    {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, Box::new(handler));
    }

    /// Emits a command, fire-and-forget.
    ///
    /// Returns as soon as the command is queued; a remote that never
    /// reacts is not an error.
    ///
    /// # Errors
    ///
    /// `FailedPrecondition` when the channel task has already exited.
    pub fn emit(&self, event: Emit) -> Result<()> {
        self.tx
            .send(Outbound::Emit(event))
            .map_err(|_| Error::failed_precondition("channel is not connected"))
    }

    /// Whether the channel task is still driving the connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Pauses the caller while pending pushes are delivered.
    ///
    /// Purely a cooperative yield: handlers run on the channel task, so
    /// sleeping here gives them the given window to catch up. Always
    /// returns at the deadline.
    pub async fn wait_quiescent(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Closes the channel and waits for the task to wind down.
    pub async fn disconnect(self) {
        let Self { tx, mut task, .. } = self;

        // A send failure means the task already exited; join it either way.
        let _ = tx.send(Outbound::Close);
        if tokio::time::timeout(DISCONNECT_TIMEOUT, &mut task)
            .await
            .is_err()
        {
            warn!("channel task did not stop in time, aborting it");
            task.abort();
        }
    }
}

/// Reads frames until the engine.io open packet arrives.
async fn expect_open(ws: &mut Transport) -> Result<Handshake> {
    while let Some(message) = ws.next().await {
        if let WebsocketMessage::Text(text) = message? {
            match protocol::decode(&text)? {
                Packet::Open(handshake) => return Ok(handshake),
                other => trace!("skipping {other:?} while waiting for open"),
            }
        }
    }
    Err(Error::aborted("channel closed before engine.io open"))
}

/// Reads frames until the socket.io connect packet arrives.
async fn expect_connect(ws: &mut Transport) -> Result<()> {
    while let Some(message) = ws.next().await {
        if let WebsocketMessage::Text(text) = message? {
            match protocol::decode(&text)? {
                Packet::Connect => return Ok(()),
                other => trace!("skipping {other:?} while waiting for connect"),
            }
        }
    }
    Err(Error::aborted("channel closed before socket.io connect"))
}

/// Drives one connection until it closes.
async fn channel_task(
    mut ws: Transport,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    handlers: Arc<Mutex<HandlerMap>>,
    ping_interval: Duration,
) {
    let start = tokio::time::Instant::now() + ping_interval;
    let mut ping = tokio::time::interval_at(start, ping_interval);

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(Outbound::Emit(event)) => {
                    trace!("emitting {}", event.name());
                    if let Err(e) = ws.send(WebsocketMessage::text(event.encode())).await {
                        error!("error emitting {}: {}", event.name(), Error::from(e));
                        break;
                    }
                }
                // All senders dropped is the same as an explicit close.
                Some(Outbound::Close) | None => {
                    let _ = ws.send(WebsocketMessage::Close(None)).await;
                    break;
                }
            },

            _ = ping.tick() => {
                if let Err(e) = ws.send(WebsocketMessage::text(protocol::PING_FRAME)).await {
                    error!("error sending ping: {}", Error::from(e));
                    break;
                }
            }

            inbound = ws.next() => match inbound {
                Some(Ok(message)) => {
                    if handle_message(&mut ws, message, &handlers).await.is_break() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    error!("error receiving message: {}", Error::from(e));
                    break;
                }
                None => {
                    info!("channel closed by remote");
                    break;
                }
            },
        }
    }

    debug!("channel task stopped");
}

/// Handles one inbound websocket message.
async fn handle_message(
    ws: &mut Transport,
    message: WebsocketMessage,
    handlers: &Mutex<HandlerMap>,
) -> ControlFlow<()> {
    match message {
        WebsocketMessage::Text(text) => match protocol::decode(&text) {
            Ok(Packet::Event { name, payload }) => {
                dispatch_push(&name, payload, handlers);
            }
            // Engine.io pings are text frames; answer in kind.
            Ok(Packet::Ping) => {
                trace!("ping -> pong");
                if let Err(e) = ws.send(WebsocketMessage::text("3")).await {
                    error!("error sending pong: {}", Error::from(e));
                    return ControlFlow::Break(());
                }
            }
            Ok(Packet::Pong) => {}
            Ok(Packet::Close | Packet::Disconnect) => {
                info!("session closed by server");
                return ControlFlow::Break(());
            }
            Ok(Packet::Open(_) | Packet::Connect) => {
                trace!("ignoring handshake packet after handshake");
            }
            Err(e) => error!("error decoding frame: {e}"),
        },
        // Volumio keeps alive over engine.io, but aim for RFC compliance
        // on the websocket layer anyway.
        WebsocketMessage::Ping(payload) => {
            if let Err(e) = ws.send(WebsocketMessage::Pong(payload)).await {
                error!("error sending pong: {}", Error::from(e));
                return ControlFlow::Break(());
            }
        }
        WebsocketMessage::Close(frame) => {
            info!("connection closed by server: {frame:?}");
            return ControlFlow::Break(());
        }
        _ => trace!("ignoring unsupported message type"),
    }

    ControlFlow::Continue(())
}

/// Routes a pushed event to its registered handler.
fn dispatch_push(name: &str, payload: Value, handlers: &Mutex<HandlerMap>) {
    let Some(kind) = PushKind::from_name(name) else {
        trace!("dropping unhandled push event {name}");
        return;
    };

    let mut handlers = handlers.lock().unwrap_or_else(PoisonError::into_inner);
    match handlers.get_mut(&kind) {
        Some(handler) => handler(payload),
        None => trace!("no handler registered for {name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tokio::net::TcpListener;

    const OPEN_FRAME: &str = r#"0{"sid":"test","upgrades":[],"pingInterval":25000,"pingTimeout":5000}"#;

    /// Accepts one websocket client and completes the socket.io handshake.
    async fn accept_client(listener: TcpListener) -> Transport {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(MaybeTlsStream::Plain(stream))
            .await
            .unwrap();
        ws.send(WebsocketMessage::text(OPEN_FRAME)).await.unwrap();
        ws.send(WebsocketMessage::text("40")).await.unwrap();
        ws
    }

    async fn endpoint() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!(
            "ws://{}/socket.io/?EIO=3&transport=websocket",
            listener.local_addr().unwrap()
        );
        (listener, endpoint)
    }

    #[tokio::test]
    async fn emits_commands_and_delivers_pushes() {
        let (listener, endpoint) = endpoint().await;

        let server = tokio::spawn(async move {
            let mut ws = accept_client(listener).await;
            // Wait for the emitted command, then push a state update.
            while let Some(message) = ws.next().await {
                let message = message.unwrap();
                if message.to_text().is_ok_and(|text| text.contains("getState")) {
                    ws.send(WebsocketMessage::text(
                        r#"42["pushState",{"service":"mpd","uri":"lib:track/a","status":"play"}]"#,
                    ))
                    .await
                    .unwrap();
                    break;
                }
            }
            ws
        });

        let channel = EventChannel::connect(&endpoint).await.unwrap();
        let (push_tx, mut push_rx) = mpsc::unbounded_channel();
        channel.on(PushKind::State, move |payload| {
            push_tx.send(payload).unwrap();
        });

        channel.emit(Emit::GetState).unwrap();

        let payload = tokio::time::timeout(Duration::from_secs(5), push_rx.recv())
            .await
            .expect("no push delivered")
            .unwrap();
        assert_eq!(payload["uri"], "lib:track/a");

        channel.disconnect().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn emit_fails_once_the_remote_closes() {
        let (listener, endpoint) = endpoint().await;
        let server = tokio::spawn(async move {
            let mut ws = accept_client(listener).await;
            ws.send(WebsocketMessage::Close(None)).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let channel = EventChannel::connect(&endpoint).await.unwrap();
        assert!(channel.is_connected());

        // The close frame lands on the channel task; give it a bounded
        // moment to notice.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while channel.is_connected() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "channel never noticed the close"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let err = channel.emit(Emit::Toggle).unwrap_err();
        assert_eq!(err.kind, ErrorKind::FailedPrecondition);

        channel.disconnect().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn connect_fails_when_nobody_listens() {
        let (listener, endpoint) = endpoint().await;
        drop(listener);

        let err = EventChannel::connect(&endpoint).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unavailable);
    }
}

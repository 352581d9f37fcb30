//! Connection task: dial, handshake, pump frames, reconnect.
//!
//! One session is one websocket:
//!
//! `dial → await open → namespace connect → await ack → pump`
//!
//! The pump answers pings, forwards inbound events, drains the outbound
//! queue and treats silence longer than `pingInterval + pingTimeout` as a
//! dead link. Between sessions the task sleeps with jittered exponential
//! backoff.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Notify, broadcast, mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use wire::{EnginePacket, Handshake, PacketKind, SocketPacket};

use super::{ConnectionState, Outbound, RESPONSE_EVENT, RealtimeError, RealtimeEvent, tls};
use crate::config::RealtimeConfig;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Budget for dial plus handshake plus namespace ack.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// How often a sleeping driver checks whether its handles are gone.
const ABANDON_POLL: Duration = Duration::from_millis(200);

/// How a healthy session ended.
#[derive(Debug)]
enum SessionEnd {
    /// Local shutdown was requested.
    Shutdown,
    /// All handles were dropped.
    Abandoned,
    /// Server went away.
    Lost(String),
}

pub(crate) struct Driver {
    pub config: RealtimeConfig,
    pub outbound: mpsc::Receiver<Outbound>,
    pub state: watch::Sender<ConnectionState>,
    pub events: broadcast::Sender<RealtimeEvent>,
    pub shutdown: Arc<Notify>,
}

impl Driver {
    pub async fn run(mut self) {
        let reconnect = self.config.reconnect;
        let mut backoff_ms = reconnect.initial_backoff_ms;

        loop {
            if self.outbound.is_closed() {
                tracing::debug!("all realtime handles dropped");
                break;
            }
            self.set_state(ConnectionState::Connecting);
            let mut connected = false;

            match self.session(&mut connected).await {
                Ok(SessionEnd::Shutdown | SessionEnd::Abandoned) => break,
                Ok(SessionEnd::Lost(reason)) => {
                    tracing::debug!(%reason, "realtime connection lost");
                    self.publish(RealtimeEvent::Disconnected { reason: reason.clone() });
                    self.set_state(ConnectionState::Errored(reason));
                }
                Err(e) if connected => {
                    let reason = e.to_string();
                    tracing::debug!(error = %reason, "realtime connection dropped");
                    self.publish(RealtimeEvent::Disconnected { reason: reason.clone() });
                    self.set_state(ConnectionState::Errored(reason));
                }
                Err(e) => {
                    let reason = e.to_string();
                    tracing::debug!(error = %reason, "realtime connect failed");
                    self.publish(RealtimeEvent::ConnectError(reason.clone()));
                    self.set_state(ConnectionState::Errored(reason));
                }
            }

            if !reconnect.enabled {
                // Leave the Errored state visible; dropping the watch sender
                // wakes waiters.
                return;
            }
            if connected {
                backoff_ms = reconnect.initial_backoff_ms;
            }

            let delay = jittered(backoff_ms, reconnect.max_backoff_ms);
            tracing::debug!(delay_ms = delay.as_millis(), "realtime reconnect scheduled");
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown.notified() => break,
                () = wait_abandoned(&self.outbound) => break,
            }
            backoff_ms = backoff_ms.saturating_mul(2).min(reconnect.max_backoff_ms);
        }

        self.set_state(ConnectionState::Closed);
        tracing::debug!("realtime task finished");
    }

    async fn session(&mut self, connected: &mut bool) -> Result<SessionEnd, RealtimeError> {
        let namespace = self.config.namespace.clone();
        let shutdown = Arc::clone(&self.shutdown);

        let established = tokio::select! {
            result = tokio::time::timeout(CONNECT_TIMEOUT, self.establish(&namespace)) => {
                result.map_err(|_| RealtimeError::Timeout(duration_ms(CONNECT_TIMEOUT)))?
            }
            () = shutdown.notified() => return Ok(SessionEnd::Shutdown),
            () = wait_abandoned(&self.outbound) => return Ok(SessionEnd::Abandoned),
        };
        let (mut socket, handshake, sid) = established?;

        *connected = true;
        tracing::debug!(%sid, %namespace, "namespace connect acknowledged");
        self.set_state(ConnectionState::Connected { sid: sid.clone() });
        self.publish(RealtimeEvent::Connected { sid });

        let window = Duration::from_millis(handshake.liveness_window_ms());
        let mut deadline = Instant::now() + window;

        loop {
            tokio::select! {
                frame = socket.next() => {
                    let Some(frame) = frame else {
                        return Ok(SessionEnd::Lost("stream ended".to_owned()));
                    };
                    deadline = Instant::now() + window;
                    if let Some(end) = self.on_frame(&mut socket, &namespace, frame?).await? {
                        return Ok(end);
                    }
                }
                item = self.outbound.recv() => {
                    let Some(item) = item else {
                        close_socket(&mut socket, &namespace).await;
                        return Ok(SessionEnd::Abandoned);
                    };
                    let packet = SocketPacket::event(&namespace, &item.event, item.payload);
                    send_packet(&mut socket, &EnginePacket::Message(packet.encode()?)).await?;
                    tracing::debug!(event = %item.event, "realtime event sent");
                }
                () = tokio::time::sleep_until(deadline) => {
                    return Err(RealtimeError::Timeout(handshake.liveness_window_ms()));
                }
                () = shutdown.notified() => {
                    close_socket(&mut socket, &namespace).await;
                    return Ok(SessionEnd::Shutdown);
                }
            }
        }
    }

    /// Dial, read the open packet and join the namespace.
    async fn establish(&self, namespace: &str) -> Result<(Socket, Handshake, String), RealtimeError> {
        let url = wire::endpoint_url(&self.config.url);
        let connector = tls::connector(self.config.accept_invalid_certs, &url)?;
        tracing::debug!(%url, "dialing realtime server");
        let (mut socket, _) = tokio_tungstenite::connect_async_tls_with_config(url.as_str(), None, false, connector).await?;

        let handshake = loop {
            match next_engine_packet(&mut socket).await? {
                EnginePacket::Open(handshake) => break handshake,
                EnginePacket::Noop => {}
                other => return Err(RealtimeError::Protocol(format!("expected open packet, got {other:?}"))),
            }
        };
        tracing::debug!(sid = %handshake.sid, ping_interval = handshake.ping_interval, "engine.io open");

        let connect = SocketPacket::connect(namespace).encode()?;
        send_packet(&mut socket, &EnginePacket::Message(connect)).await?;

        loop {
            match next_engine_packet(&mut socket).await? {
                EnginePacket::Ping(probe) => send_packet(&mut socket, &EnginePacket::Pong(probe)).await?,
                EnginePacket::Message(body) => {
                    let packet = SocketPacket::decode(&body)?;
                    if packet.namespace != namespace {
                        continue;
                    }
                    match packet.kind {
                        PacketKind::Connect => {
                            let sid = packet
                                .data
                                .as_ref()
                                .and_then(|d| d.get("sid"))
                                .and_then(Value::as_str)
                                .unwrap_or(&handshake.sid)
                                .to_owned();
                            return Ok((socket, handshake, sid));
                        }
                        PacketKind::ConnectError => {
                            let message = packet.connect_error_message().unwrap_or_default();
                            return Err(RealtimeError::Refused { namespace: namespace.to_owned(), message });
                        }
                        _ => {}
                    }
                }
                EnginePacket::Close => return Err(RealtimeError::Protocol("closed during handshake".to_owned())),
                _ => {}
            }
        }
    }

    /// Handle one inbound frame. `Some` ends the session.
    async fn on_frame(
        &self,
        socket: &mut Socket,
        namespace: &str,
        frame: Message,
    ) -> Result<Option<SessionEnd>, RealtimeError> {
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => return Ok(Some(SessionEnd::Lost("server closed the websocket".to_owned()))),
            Message::Binary(_) => return Err(RealtimeError::Codec(wire::CodecError::UnsupportedBinary)),
            _ => return Ok(None),
        };

        match EnginePacket::decode(text.as_str())? {
            EnginePacket::Ping(probe) => {
                send_packet(socket, &EnginePacket::Pong(probe)).await?;
                tracing::trace!("engine.io ping answered");
            }
            EnginePacket::Close => return Ok(Some(SessionEnd::Lost("server sent close".to_owned()))),
            EnginePacket::Message(body) => {
                let packet = SocketPacket::decode(&body)?;
                if packet.namespace != namespace {
                    return Ok(None);
                }
                match packet.kind {
                    PacketKind::Event => self.dispatch(&packet),
                    PacketKind::Disconnect => {
                        return Ok(Some(SessionEnd::Lost("server disconnected the namespace".to_owned())));
                    }
                    PacketKind::ConnectError => {
                        let message = packet.connect_error_message().unwrap_or_default();
                        return Err(RealtimeError::Refused { namespace: namespace.to_owned(), message });
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        Ok(None)
    }

    fn dispatch(&self, packet: &SocketPacket) {
        let Some(name) = packet.event_name() else {
            tracing::debug!("event packet without a name");
            return;
        };
        let args = packet.event_args();
        let event = if name == RESPONSE_EVENT {
            RealtimeEvent::Response(args.first().cloned().unwrap_or_default())
        } else {
            RealtimeEvent::Event { name: name.to_owned(), args: args.to_vec() }
        };
        self.publish(event);
    }

    fn publish(&self, event: RealtimeEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

async fn next_engine_packet(socket: &mut Socket) -> Result<EnginePacket, RealtimeError> {
    loop {
        let Some(frame) = socket.next().await else {
            return Err(RealtimeError::Protocol("stream ended during handshake".to_owned()));
        };
        match frame? {
            Message::Text(text) => return Ok(EnginePacket::decode(text.as_str())?),
            Message::Close(_) => return Err(RealtimeError::Protocol("closed during handshake".to_owned())),
            _ => {}
        }
    }
}

async fn send_packet(socket: &mut Socket, packet: &EnginePacket) -> Result<(), RealtimeError> {
    socket.send(Message::text(packet.encode()?)).await?;
    Ok(())
}

async fn close_socket(socket: &mut Socket, namespace: &str) {
    if let Ok(body) = SocketPacket::disconnect(namespace).encode() {
        let _ = send_packet(socket, &EnginePacket::Message(body)).await;
    }
    let _ = socket.close(None).await;
}

/// Resolves once every sender is gone. Polls because a receiver cannot wait
/// for that without consuming queued items.
async fn wait_abandoned(outbound: &mpsc::Receiver<Outbound>) {
    while !outbound.is_closed() {
        tokio::time::sleep(ABANDON_POLL).await;
    }
}

fn jittered(backoff_ms: u64, max_ms: u64) -> Duration {
    let jitter = rand::rng().random_range(0..=backoff_ms / 4);
    Duration::from_millis(backoff_ms.saturating_add(jitter).min(max_ms))
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;

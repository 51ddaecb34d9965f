//! Streaming ingestion channel for token-creation events.
//!
//! A single WebSocket connection driven by an explicit state machine:
//!
//! ```text
//! DISCONNECTED --Dial--> CONNECTING --Established--> OPEN
//!      ^                     |                         |
//!      |                   Failed             Dropped / Failed
//!      |                     v                         v
//!      +-------Settle---- ERRORED / CLOSED <-----------+
//! ```
//!
//! Every close schedules exactly one reconnect after a fixed delay. The
//! subscription is sent on entering OPEN and re-sent by the heartbeat while the
//! channel stays OPEN.

use crate::engine::state::SharedState;
use crate::engine::wire::parse_launch_event;
use crate::types::{shorten_address, Alert, AlertKind, PumpLaunch};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// Subscription request for new-token creation events.
pub const SUBSCRIBE_NEW_TOKEN: &str = r#"{"method":"subscribeNewToken"}"#;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection state of the streaming channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Open,
    Closed,
    Errored,
}

/// Named transitions between channel states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Start a connection attempt
    Dial,
    /// Handshake completed
    Established,
    /// Clean close (peer close frame, end of stream, or local teardown)
    Dropped,
    /// Connection attempt or live connection failed
    Failed,
    /// Reset after a close, before the reconnect delay
    Settle,
}

impl ChannelState {
    /// Next state for `transition`, or `None` if it is not valid from here.
    pub fn apply(self, transition: Transition) -> Option<ChannelState> {
        use ChannelState::*;
        use Transition::*;

        match (self, transition) {
            (Disconnected, Dial) => Some(Connecting),
            (Connecting, Established) => Some(Open),
            (Connecting, Failed) | (Open, Failed) => Some(Errored),
            (Open, Dropped) => Some(Closed),
            (Closed, Settle) | (Errored, Settle) => Some(Disconnected),
            _ => None,
        }
    }

    /// Heartbeats are only sent on an open channel.
    pub fn heartbeat_due(self) -> bool {
        self == ChannelState::Open
    }
}

/// What an inbound frame means for the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Launch(PumpLaunch),
    Ignored,
    Closed,
}

/// Classify one inbound frame. Malformed or unrelated messages are ignored.
pub fn dispatch(message: Message) -> Inbound {
    match message {
        Message::Text(text) => match parse_launch_event(&text) {
            Some(launch) => Inbound::Launch(launch),
            None => Inbound::Ignored,
        },
        Message::Binary(bytes) => match std::str::from_utf8(&bytes).ok().and_then(parse_launch_event) {
            Some(launch) => Inbound::Launch(launch),
            None => Inbound::Ignored,
        },
        Message::Close(_) => Inbound::Closed,
        _ => Inbound::Ignored,
    }
}

enum SessionEnd {
    Dropped,
    Failed,
    Shutdown,
}

/// Persistent WebSocket client feeding launches into shared state.
pub struct StreamChannel {
    url: String,
    state: SharedState,
    reconnect_delay: Duration,
    heartbeat_interval: Duration,
    status: ChannelState,
    status_tx: watch::Sender<ChannelState>,
}

impl StreamChannel {
    pub fn new(
        url: impl Into<String>,
        state: SharedState,
        reconnect_delay: Duration,
        heartbeat_interval: Duration,
    ) -> Self {
        let (status_tx, _) = watch::channel(ChannelState::Disconnected);
        Self {
            url: url.into(),
            state,
            reconnect_delay,
            heartbeat_interval,
            status: ChannelState::Disconnected,
            status_tx,
        }
    }

    /// Observe state transitions.
    pub fn status(&self) -> watch::Receiver<ChannelState> {
        self.status_tx.subscribe()
    }

    fn transition(&mut self, transition: Transition) {
        match self.status.apply(transition) {
            Some(next) => {
                debug!("Stream channel {:?} -> {:?} ({:?})", self.status, next, transition);
                self.status = next;
                self.status_tx.send_replace(next);
            }
            None => warn!("Ignoring {:?} in state {:?}", transition, self.status),
        }
    }

    async fn push_status(&self, kind: AlertKind, text: String) {
        self.state.write().await.push_alert(Alert::new(kind, text));
    }

    async fn record_launch(&self, launch: PumpLaunch) {
        let text = format!("${} | {}", launch.symbol, shorten_address(&launch.mint));
        debug!(mint = %launch.mint, "Launch event {}", launch.symbol);
        let mut state = self.state.write().await;
        state.launches.push_front(launch);
        state.push_alert(Alert::new(AlertKind::Launch, text));
    }

    /// Connect, stream, and reconnect until `shutdown` fires or its sender is dropped.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("Stream channel starting against {}", self.url);

        let mut heartbeat =
            tokio::time::interval_at(Instant::now() + self.heartbeat_interval, self.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            self.transition(Transition::Dial);
            let url = self.url.clone();
            let connected = tokio::select! {
                result = connect_async(url.as_str()) => result,
                _ = shutdown.recv() => return,
            };

            let end = match connected {
                Ok((socket, _)) => {
                    self.transition(Transition::Established);
                    info!("Stream channel open");
                    self.push_status(AlertKind::System, "Pump.fun uplink established".to_string())
                        .await;
                    self.drive(socket, &mut heartbeat, &mut shutdown).await
                }
                Err(e) => {
                    warn!("Stream connection failed: {}", e);
                    SessionEnd::Failed
                }
            };

            match end {
                SessionEnd::Shutdown => {
                    info!("Stream channel closed for shutdown");
                    return;
                }
                SessionEnd::Dropped => self.transition(Transition::Dropped),
                SessionEnd::Failed => {
                    self.transition(Transition::Failed);
                    self.push_status(AlertKind::Warning, "Pump.fun WS error - reconnecting...".to_string())
                        .await;
                }
            }

            self.push_status(
                AlertKind::System,
                format!("Pump.fun lost - reconnecting in {:?}", self.reconnect_delay),
            )
            .await;
            self.transition(Transition::Settle);

            let reconnect = tokio::time::sleep(self.reconnect_delay);
            tokio::pin!(reconnect);
            loop {
                tokio::select! {
                    _ = &mut reconnect => break,
                    _ = heartbeat.tick() => {
                        if !self.status.heartbeat_due() {
                            debug!("Heartbeat skipped while {:?}", self.status);
                        }
                    }
                    _ = shutdown.recv() => return,
                }
            }
        }
    }

    async fn drive(
        &mut self,
        socket: Socket,
        heartbeat: &mut tokio::time::Interval,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> SessionEnd {
        let (mut writer, mut reader) = socket.split();

        if let Err(e) = writer.send(Message::Text(SUBSCRIBE_NEW_TOKEN.to_string())).await {
            warn!("Subscription send failed: {}", e);
            return SessionEnd::Failed;
        }

        loop {
            tokio::select! {
                inbound = reader.next() => match inbound {
                    Some(Ok(message)) => match dispatch(message) {
                        Inbound::Launch(launch) => self.record_launch(launch).await,
                        Inbound::Ignored => {}
                        Inbound::Closed => return SessionEnd::Dropped,
                    },
                    Some(Err(e)) => {
                        warn!("Stream read error: {}", e);
                        return SessionEnd::Failed;
                    }
                    None => return SessionEnd::Dropped,
                },
                _ = heartbeat.tick() => {
                    if self.status.heartbeat_due() {
                        debug!("Heartbeat: re-sending subscription");
                        if let Err(e) = writer.send(Message::Text(SUBSCRIBE_NEW_TOKEN.to_string())).await {
                            warn!("Heartbeat send failed: {}", e);
                            return SessionEnd::Failed;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    if let Err(e) = writer.send(Message::Close(None)).await {
                        debug!("Close frame not delivered: {}", e);
                    }
                    self.transition(Transition::Dropped);
                    return SessionEnd::Shutdown;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut state = ChannelState::Disconnected;
        for (transition, expected) in [
            (Transition::Dial, ChannelState::Connecting),
            (Transition::Established, ChannelState::Open),
            (Transition::Dropped, ChannelState::Closed),
            (Transition::Settle, ChannelState::Disconnected),
        ] {
            state = state.apply(transition).unwrap();
            assert_eq!(state, expected);
        }
    }

    #[test]
    fn test_failure_transitions() {
        assert_eq!(
            ChannelState::Connecting.apply(Transition::Failed),
            Some(ChannelState::Errored)
        );
        assert_eq!(ChannelState::Open.apply(Transition::Failed), Some(ChannelState::Errored));
        assert_eq!(
            ChannelState::Errored.apply(Transition::Settle),
            Some(ChannelState::Disconnected)
        );
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        assert_eq!(ChannelState::Disconnected.apply(Transition::Established), None);
        assert_eq!(ChannelState::Open.apply(Transition::Dial), None);
        assert_eq!(ChannelState::Closed.apply(Transition::Dial), None);
    }

    #[test]
    fn test_heartbeat_only_while_open() {
        assert!(ChannelState::Open.heartbeat_due());
        for state in [
            ChannelState::Disconnected,
            ChannelState::Connecting,
            ChannelState::Closed,
            ChannelState::Errored,
        ] {
            assert!(!state.heartbeat_due());
        }
    }

    #[test]
    fn test_dispatch() {
        let launch = dispatch(Message::Text(
            r#"{"txType":"create","mint":"So1anaMint111111111111111111pump","symbol":"wif","name":"dog"}"#.to_string(),
        ));
        match launch {
            Inbound::Launch(l) => assert_eq!(l.symbol, "WIF"),
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(dispatch(Message::Text("{oops".to_string())), Inbound::Ignored);
        assert_eq!(dispatch(Message::Ping(vec![1])), Inbound::Ignored);
        assert_eq!(dispatch(Message::Close(None)), Inbound::Closed);
    }

    #[tokio::test]
    async fn test_record_launch_prepends_and_alerts() {
        use crate::engine::state::EngineState;
        use crate::engine::types::EngineConfig;

        let state = EngineState::shared(&EngineConfig::default());
        let channel = StreamChannel::new("ws://unused", state.clone(), Duration::from_secs(5), Duration::from_secs(30));

        for i in 0..12 {
            channel
                .record_launch(PumpLaunch {
                    mint: format!("Mint{:02}abcdefghijkl", i),
                    symbol: format!("T{}", i),
                    name: "Unknown".to_string(),
                })
                .await;
        }

        let state = state.read().await;
        assert_eq!(state.launches.len(), 10);
        assert_eq!(state.launches.iter().next().map(|l| l.symbol.as_str()), Some("T11"));
        let last = state.alerts.last().unwrap();
        assert_eq!(last.kind, AlertKind::Launch);
        assert_eq!(last.text, "$T11 | Mint11...ijkl");
    }
}

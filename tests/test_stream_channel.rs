//! Tests for the streaming ingestion channel
//!
//! Runs the channel against a local WebSocket server and checks subscription,
//! launch ingestion, heartbeat, fixed-delay reconnection and shutdown.

use futures_util::{SinkExt, StreamExt};
use gem_hunter::engine::stream::SUBSCRIBE_NEW_TOKEN;
use gem_hunter::engine::{ChannelState, EngineConfig, EngineState, StreamChannel};
use gem_hunter::types::AlertKind;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{timeout, Instant};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

const RECONNECT_DELAY: Duration = Duration::from_millis(300);
const HEARTBEAT: Duration = Duration::from_millis(100);
const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug)]
enum ServerEvent {
    Connected(usize, Instant),
    Received(usize, String),
    ServerClosed(Instant),
    ClientClosed(usize),
}

/// First connection: read the subscription, push one launch, wait for a
/// heartbeat, then close. Later connections just record what they receive.
async fn spawn_server() -> (String, mpsc::UnboundedReceiver<ServerEvent>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (events, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut connection = 0;
        while let Ok((tcp, _)) = listener.accept().await {
            connection += 1;
            let mut ws = match accept_async(tcp).await {
                Ok(ws) => ws,
                Err(_) => continue,
            };
            let _ = events.send(ServerEvent::Connected(connection, Instant::now()));

            if connection == 1 {
                for _ in 0..2 {
                    if let Some(Ok(Message::Text(text))) = ws.next().await {
                        let _ = events.send(ServerEvent::Received(connection, text));
                    }
                    let launch = r#"{"txType":"create","mint":"7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr","symbol":"moon","name":"Moon"}"#;
                    let _ = ws.send(Message::Text(launch.to_string())).await;
                }
                let _ = ws.close(None).await;
                let _ = events.send(ServerEvent::ServerClosed(Instant::now()));
                while let Some(Ok(_)) = ws.next().await {}
            } else {
                while let Some(message) = ws.next().await {
                    match message {
                        Ok(Message::Text(text)) => {
                            let _ = events.send(ServerEvent::Received(connection, text));
                        }
                        Ok(Message::Close(_)) | Err(_) => {
                            let _ = events.send(ServerEvent::ClientClosed(connection));
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }
    });

    (url, rx)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> ServerEvent {
    timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_subscribe_ingest_reconnect_and_shutdown() {
    let (url, mut events) = spawn_server().await;
    let state = EngineState::shared(&EngineConfig::default());
    let channel = StreamChannel::new(url, state.clone(), RECONNECT_DELAY, HEARTBEAT);
    let mut status = channel.status();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(channel.run(shutdown_rx));

    // connection 1: subscription on open, then a heartbeat re-subscription
    assert!(matches!(next_event(&mut events).await, ServerEvent::Connected(1, _)));
    match next_event(&mut events).await {
        ServerEvent::Received(1, text) => assert_eq!(text, SUBSCRIBE_NEW_TOKEN),
        other => panic!("unexpected {:?}", other),
    }
    match next_event(&mut events).await {
        ServerEvent::Received(1, text) => assert_eq!(text, SUBSCRIBE_NEW_TOKEN),
        other => panic!("unexpected {:?}", other),
    }
    let closed_at = match next_event(&mut events).await {
        ServerEvent::ServerClosed(at) => at,
        other => panic!("unexpected {:?}", other),
    };

    // exactly one reconnect, no sooner than the fixed delay
    let reconnected_at = match next_event(&mut events).await {
        ServerEvent::Connected(2, at) => at,
        other => panic!("unexpected {:?}", other),
    };
    assert!(reconnected_at.duration_since(closed_at) >= RECONNECT_DELAY);

    match next_event(&mut events).await {
        ServerEvent::Received(2, text) => assert_eq!(text, SUBSCRIBE_NEW_TOKEN),
        other => panic!("unexpected {:?}", other),
    }
    timeout(WAIT, status.wait_for(|s| *s == ChannelState::Open))
        .await
        .unwrap()
        .unwrap();

    {
        let state = state.read().await;
        assert_eq!(state.launches.len(), 2);
        let launch = state.launches.iter().next().unwrap();
        assert_eq!(launch.symbol, "MOON");
        assert_eq!(launch.name, "Moon");

        let launches: Vec<_> = state
            .alerts
            .iter()
            .filter(|a| a.kind == AlertKind::Launch)
            .map(|a| a.text.clone())
            .collect();
        assert_eq!(launches[0], "$MOON | 7GCihg...W2hr");

        let uplinks = state
            .alerts
            .iter()
            .filter(|a| a.kind == AlertKind::System && a.text.contains("uplink established"))
            .count();
        assert_eq!(uplinks, 2);
        assert!(state
            .alerts
            .iter()
            .any(|a| a.text == "Pump.fun lost - reconnecting in 300ms"));
    }

    // teardown closes the socket and the reconnect loop ends with it
    shutdown_tx.send(()).unwrap();
    loop {
        match next_event(&mut events).await {
            ServerEvent::ClientClosed(2) => break,
            ServerEvent::Received(2, _) => continue,
            other => panic!("unexpected {:?}", other),
        }
    }
    timeout(WAIT, task).await.unwrap().unwrap();
    assert_eq!(*status.borrow(), ChannelState::Closed);

    tokio::time::sleep(RECONNECT_DELAY * 2).await;
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_connection_failures_keep_retrying() {
    // grab a free port, then release it so nothing is listening
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let state = EngineState::shared(&EngineConfig::default());
    let channel = StreamChannel::new(url, state.clone(), Duration::from_millis(100), HEARTBEAT);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(channel.run(shutdown_rx));

    // each failed attempt leaves one warning; wait for two of them
    timeout(WAIT, async {
        loop {
            let warnings = state
                .read()
                .await
                .alerts
                .iter()
                .filter(|a| a.kind == AlertKind::Warning)
                .count();
            if warnings >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();

    shutdown_tx.send(()).unwrap();
    timeout(WAIT, task).await.unwrap().unwrap();

    let state = state.read().await;
    assert!(state.launches.is_empty());
    assert!(!state
        .alerts
        .iter()
        .any(|a| a.text.contains("uplink established")));
}

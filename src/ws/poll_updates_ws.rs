use crate::startup::AppState;
use crate::ws::models::Subscriber;
use crate::ws::registry::Registry;
use axum::{
    extract::{
        Extension,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::{fmt, time::Duration};
use tokio::time::{Instant, interval_at, timeout};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct SubscriptionSettings {
    /// Upper bound on a single outbound write.
    pub send_timeout: Duration,
    pub ping_interval: Duration,
}

#[derive(Debug)]
enum Disconnect {
    PeerClosed,
    ReadFailed(String),
    WriteFailed(String),
    WriteTimedOut,
    /// The broadcaster gave up on this connection and dropped it from the
    /// registry.
    Pruned,
}

impl fmt::Display for Disconnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disconnect::PeerClosed => write!(f, "closed by peer"),
            Disconnect::ReadFailed(e) => write!(f, "read failed: {e}"),
            Disconnect::WriteFailed(e) => write!(f, "write failed: {e}"),
            Disconnect::WriteTimedOut => write!(f, "write timed out"),
            Disconnect::Pruned => write!(f, "pruned by broadcaster"),
        }
    }
}

pub async fn poll_updates_ws(
    Extension(app_state): Extension<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let registry = app_state.registry.clone();
    let settings = app_state.subscription;
    ws.on_upgrade(move |socket: WebSocket| {
        let (sink, stream) = socket.split();
        run_subscription(sink, stream, registry, settings)
    })
}

/// Drives one subscriber from registration until it disconnects.
///
/// Frames handed to the connection's mailbox are written to `sink` and the
/// outcome is reported back to the broadcaster. Anything arriving on `stream`
/// is read only to notice the peer going away.
/// Whatever ends the loop, the connection is deregistered before returning.
pub async fn run_subscription<Si, St, E>(
    mut sink: Si,
    mut stream: St,
    registry: Registry,
    settings: SubscriptionSettings,
) where
    Si: Sink<Message> + Unpin,
    Si::Error: fmt::Display,
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let (subscriber, mut mailbox) = Subscriber::new();
    let id = subscriber.id();
    let live = registry.add(subscriber).await;
    debug!(%id, live, "subscriber registered");

    let mut keep_alive = interval_at(
        Instant::now() + settings.ping_interval,
        settings.ping_interval,
    );

    let reason = loop {
        tokio::select! {
            outbound = mailbox.recv() => {
                let Some(outbound) = outbound else {
                    break Disconnect::Pruned;
                };
                let message = Message::Text(outbound.frame.to_string());
                let written = send_bounded(&mut sink, message, settings.send_timeout).await;
                outbound.acknowledge(written.as_ref().map(|_| ()).map_err(|reason| reason.to_string()));
                if let Err(reason) = written {
                    break reason;
                }
            }
            _ = keep_alive.tick() => {
                if let Err(reason) = send_bounded(&mut sink, Message::Ping(Vec::new()), settings.send_timeout).await {
                    break reason;
                }
            }
            incoming = stream.next() => match incoming {
                None | Some(Ok(Message::Close(_))) => break Disconnect::PeerClosed,
                Some(Ok(_)) => {}
                Some(Err(e)) => break Disconnect::ReadFailed(e.to_string()),
            },
        }
    };

    registry.remove(id).await;
    match reason {
        Disconnect::PeerClosed => debug!(%id, "subscriber {}", reason),
        _ => warn!(%id, "subscriber {}", reason),
    }

    let _ = timeout(settings.send_timeout, sink.close()).await;
}

async fn send_bounded<Si>(sink: &mut Si, message: Message, limit: Duration) -> Result<(), Disconnect>
where
    Si: Sink<Message> + Unpin,
    Si::Error: fmt::Display,
{
    match timeout(limit, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Disconnect::WriteFailed(e.to_string())),
        Err(_) => Err(Disconnect::WriteTimedOut),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::PollSnapshot;
    use crate::db::{MemoryTallyStore, TallyStore};
    use crate::ws::Broadcaster;
    use crate::ws::broadcaster::BroadcastOutcome;
    use futures::channel::mpsc;
    use std::sync::Arc;

    type Incoming = Result<Message, std::io::Error>;

    fn settings() -> SubscriptionSettings {
        SubscriptionSettings {
            send_timeout: Duration::from_secs(1),
            ping_interval: Duration::from_secs(3600),
        }
    }

    async fn wait_for_members(registry: &Registry, expected: usize) {
        timeout(Duration::from_secs(5), async {
            while registry.len().await != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("registry never reached expected size");
    }

    fn fixture() -> (Arc<MemoryTallyStore>, Registry, Broadcaster) {
        let store = Arc::new(MemoryTallyStore::seeded(&["Yes".into(), "No".into()]));
        let registry = Registry::new();
        let broadcaster = Broadcaster::new(
            store.clone(),
            registry.clone(),
            "Ship it?".into(),
            Duration::from_secs(2),
        );
        (store, registry, broadcaster)
    }

    #[tokio::test]
    async fn broadcast_reaches_the_socket_as_text() {
        let (store, registry, broadcaster) = fixture();
        let (sink, mut outbound) = mpsc::unbounded::<Message>();
        let (_peer, stream) = mpsc::unbounded::<Incoming>();

        let task = tokio::spawn(run_subscription(sink, stream, registry.clone(), settings()));
        wait_for_members(&registry, 1).await;

        store.increment(1).await.unwrap();
        let outcome = broadcaster.broadcast().await;
        assert_eq!(
            outcome,
            BroadcastOutcome::Completed {
                delivered: 1,
                pruned: 0
            }
        );

        let message = timeout(Duration::from_secs(5), outbound.next())
            .await
            .unwrap()
            .unwrap();
        let Message::Text(text) = message else {
            panic!("expected a text frame");
        };
        let snapshot: PollSnapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(snapshot.question, "Ship it?");
        assert_eq!(snapshot.options[0].votes, 1);

        task.abort();
    }

    #[tokio::test]
    async fn new_subscriber_gets_nothing_until_next_broadcast() {
        let (_store, registry, _broadcaster) = fixture();
        let (sink, mut outbound) = mpsc::unbounded::<Message>();
        let (_peer, stream) = mpsc::unbounded::<Incoming>();

        let task = tokio::spawn(run_subscription(sink, stream, registry.clone(), settings()));
        wait_for_members(&registry, 1).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(outbound.try_next().is_err());

        task.abort();
    }

    #[tokio::test]
    async fn peer_close_deregisters() {
        let (_store, registry, _broadcaster) = fixture();
        let (sink, _outbound) = mpsc::unbounded::<Message>();
        let (peer, stream) = mpsc::unbounded::<Incoming>();

        let task = tokio::spawn(run_subscription(sink, stream, registry.clone(), settings()));
        wait_for_members(&registry, 1).await;

        peer.unbounded_send(Ok(Message::Text("hello".into()))).unwrap();
        peer.unbounded_send(Ok(Message::Close(None))).unwrap();

        timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn read_error_deregisters() {
        let (_store, registry, _broadcaster) = fixture();
        let (sink, _outbound) = mpsc::unbounded::<Message>();
        let (peer, stream) = mpsc::unbounded::<Incoming>();

        let task = tokio::spawn(run_subscription(sink, stream, registry.clone(), settings()));
        wait_for_members(&registry, 1).await;

        peer.unbounded_send(Err(std::io::Error::other("connection reset")))
            .unwrap();

        timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn broken_socket_is_out_of_the_registry_when_broadcast_returns() {
        let (store, registry, broadcaster) = fixture();

        let (healthy_sink, mut healthy_out) = mpsc::unbounded::<Message>();
        let (_healthy_peer, healthy_stream) = mpsc::unbounded::<Incoming>();
        let healthy = tokio::spawn(run_subscription(
            healthy_sink,
            healthy_stream,
            registry.clone(),
            settings(),
        ));

        let (broken_sink, broken_out) = mpsc::unbounded::<Message>();
        let (_broken_peer, broken_stream) = mpsc::unbounded::<Incoming>();
        let broken = tokio::spawn(run_subscription(
            broken_sink,
            broken_stream,
            registry.clone(),
            settings(),
        ));

        wait_for_members(&registry, 2).await;
        // Writes to this socket now fail.
        drop(broken_out);

        store.increment(2).await.unwrap();
        let outcome = broadcaster.broadcast().await;

        assert_eq!(
            outcome,
            BroadcastOutcome::Completed {
                delivered: 1,
                pruned: 1
            }
        );
        assert_eq!(registry.len().await, 1);

        timeout(Duration::from_secs(5), broken).await.unwrap().unwrap();
        let message = timeout(Duration::from_secs(5), healthy_out.next())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(message, Message::Text(_)));

        healthy.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_socket_is_pruned_and_its_task_stops() {
        let (_store, registry, _broadcaster) = fixture();
        let (_peer, stream) = mpsc::unbounded::<Incoming>();
        // Every write takes a second, longer than the broadcaster waits.
        let sink = Box::pin(futures::sink::unfold((), |(), _message: Message| async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<(), std::io::Error>(())
        }));

        let broadcaster = Broadcaster::new(
            Arc::new(MemoryTallyStore::seeded(&["Yes".into()])),
            registry.clone(),
            "Ship it?".into(),
            Duration::from_millis(500),
        );
        let patient = SubscriptionSettings {
            send_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(3600),
        };
        let task = tokio::spawn(run_subscription(sink, stream, registry.clone(), patient));
        wait_for_members(&registry, 1).await;

        let outcome = broadcaster.broadcast().await;
        assert_eq!(
            outcome,
            BroadcastOutcome::Completed {
                delivered: 0,
                pruned: 1
            }
        );
        assert_eq!(registry.len().await, 0);

        // Once the in-flight write finishes the task finds its mailbox closed.
        timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn keep_alive_pings_are_sent() {
        let (_store, registry, _broadcaster) = fixture();
        let (sink, mut outbound) = mpsc::unbounded::<Message>();
        let (_peer, stream) = mpsc::unbounded::<Incoming>();

        let settings = SubscriptionSettings {
            send_timeout: Duration::from_secs(1),
            ping_interval: Duration::from_secs(30),
        };
        let task = tokio::spawn(run_subscription(sink, stream, registry.clone(), settings));

        let message = outbound.next().await.unwrap();
        assert!(matches!(message, Message::Ping(_)));

        task.abort();
    }
}

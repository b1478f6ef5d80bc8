use std::{fmt, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use uuid::Uuid;

/// A serialized snapshot, shared by every connection it is delivered to.
pub type Frame = Arc<str>;

/// Receiving half of a connection's mailbox, drained by the task that owns
/// the socket.
pub type Mailbox = mpsc::Receiver<Outbound>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        ConnectionId(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
    #[error("write to connection {id} failed: {reason}")]
    WriteFailed { id: ConnectionId, reason: String },
    #[error("delivery to connection {0} timed out")]
    TimedOut(ConnectionId),
}

/// One frame waiting to be written, plus the channel the writer reports
/// the outcome on.
#[derive(Debug)]
pub struct Outbound {
    pub frame: Frame,
    ack: oneshot::Sender<Result<(), String>>,
}

impl Outbound {
    /// Reports the socket write result back to the broadcaster.
    pub fn acknowledge(self, result: Result<(), String>) {
        // The broadcaster may have given up on this delivery already.
        let _ = self.ack.send(result);
    }
}

/// The registry's handle on one live connection.
///
/// The connection's task owns the socket. Delivery hands it a frame and
/// waits, bounded, for the task to report whether the write went through.
#[derive(Clone)]
pub struct Subscriber {
    id: ConnectionId,
    outbox: mpsc::Sender<Outbound>,
}

impl Subscriber {
    pub fn new() -> (Self, Mailbox) {
        // Room for one frame: a second broadcast waits behind the first
        // instead of piling up.
        let (tx, rx) = mpsc::channel(1);
        let subscriber = Subscriber {
            id: ConnectionId::new(),
            outbox: tx,
        };
        (subscriber, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub async fn deliver(&self, frame: Frame, limit: Duration) -> Result<(), DeliveryError> {
        let id = self.id;
        let (ack, acked) = oneshot::channel();

        let attempt = async {
            if self.outbox.send(Outbound { frame, ack }).await.is_err() {
                return Err(DeliveryError::Closed(id));
            }
            match acked.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(reason)) => Err(DeliveryError::WriteFailed { id, reason }),
                Err(_) => Err(DeliveryError::Closed(id)),
            }
        };

        match timeout(limit, attempt).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::TimedOut(id)),
        }
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber").field("id", &self.id).finish()
    }
}

/// Drains `mailbox` like a healthy socket would, forwarding each frame to
/// the returned receiver.
#[cfg(test)]
pub fn spawn_reader(mut mailbox: Mailbox) -> mpsc::UnboundedReceiver<Frame> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(outbound) = mailbox.recv().await {
            let _ = tx.send(outbound.frame.clone());
            outbound.acknowledge(Ok(()));
        }
    });
    rx
}

/// Snapshot subscription handed out by a store.
///
/// Stores broadcast raw collection listings; the subscription applies its
/// query and hands out only the newest pending snapshot (intermediate ones
/// are superseded, since every snapshot is the full collection).
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use super::document::Snapshot;
use super::path::Query;
use super::StoreError;

pub struct Subscription {
    query: Query,
    pending: Option<Snapshot>,
    rx: broadcast::Receiver<Snapshot>,
    last_version: u64,
}

impl Subscription {
    /// `initial` is the collection state at subscribe time; `rx` must have been
    /// subscribed before `initial` was read so no commit is missed.
    pub fn new(query: Query, initial: Snapshot, rx: broadcast::Receiver<Snapshot>) -> Self {
        Self {
            query,
            pending: Some(initial),
            rx,
            last_version: 0,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Wait for the next snapshot. Fails once the store side is gone.
    pub async fn next(&mut self) -> Result<Snapshot, StoreError> {
        if let Some(initial) = self.pending.take() {
            return Ok(self.deliver(initial));
        }
        loop {
            let mut latest = match self.rx.recv().await {
                Ok(snapshot) => snapshot,
                Err(RecvError::Lagged(n)) => {
                    log::debug!(
                        "[taskflow.storage.subscription] {} lagged by {} snapshots",
                        self.query.collection,
                        n
                    );
                    continue;
                }
                Err(RecvError::Closed) => {
                    return Err(StoreError::SubscriptionClosed(
                        self.query.collection.to_string(),
                    ))
                }
            };
            loop {
                match self.rx.try_recv() {
                    Ok(newer) => latest = newer,
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                }
            }
            if latest.version <= self.last_version {
                continue;
            }
            return Ok(self.deliver(latest));
        }
    }

    /// Release the subscription.
    pub fn unsubscribe(self) {
        log::debug!(
            "[taskflow.storage.subscription] Unsubscribed from {}",
            self.query.collection
        );
    }

    fn deliver(&mut self, snapshot: Snapshot) -> Snapshot {
        self.last_version = self.last_version.max(snapshot.version);
        Snapshot {
            docs: self.query.apply(snapshot.docs),
            ..snapshot
        }
    }
}

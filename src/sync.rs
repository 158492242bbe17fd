//! Keeps independent timer surfaces in step through the shared snapshot.
//!
//! Every surface writes the snapshot through a [`NotifyingSnapshotStore`]
//! tagged with its own [`SurfaceId`]; the other surfaces hear about it from a
//! [`ChangeNotifier`] and reload. Which transport carries the notice does not
//! matter to the timer: in-process broadcast and file polling both qualify.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::SystemTime,
};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{self, Duration, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    snapshot_store::FileSnapshotStore,
    timer::{SnapshotStore, TimerSnapshot},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceId(Uuid);

impl SurfaceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SurfaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotChange {
    /// Surface that wrote the snapshot; `None` when the transport cannot tell.
    pub origin: Option<SurfaceId>,
}

impl SnapshotChange {
    /// Whether `surface` should reload in response.
    pub fn concerns(&self, surface: SurfaceId) -> bool {
        self.origin != Some(surface)
    }
}

pub trait ChangeNotifier: Send + Sync {
    fn publish(&self, change: SnapshotChange);
    fn subscribe(&self) -> broadcast::Receiver<SnapshotChange>;
}

/// In-process pub/sub for surfaces sharing one runtime.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<SnapshotChange>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier for BroadcastNotifier {
    fn publish(&self, change: SnapshotChange) {
        // no subscribers is fine
        let _ = self.tx.send(change);
    }

    fn subscribe(&self) -> broadcast::Receiver<SnapshotChange> {
        self.tx.subscribe()
    }
}

type LastSeen = Arc<Mutex<Option<SystemTime>>>;

/// Watches the snapshot file's modification time, for surfaces living in
/// other processes. Changes found on disk are published without an origin;
/// writes announced through [`ChangeNotifier::publish`] by local surfaces are
/// remembered so the watcher does not report them a second time.
pub struct PollingNotifier {
    tx: broadcast::Sender<SnapshotChange>,
    store: FileSnapshotStore,
    last_seen: LastSeen,
    cancel_token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PollingNotifier {
    pub fn spawn(store: FileSnapshotStore, every: Duration) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let cancel_token = CancellationToken::new();
        let last_seen: LastSeen = Arc::new(Mutex::new(store.modified()));
        let handle = tokio::spawn(poll_loop(
            store.clone(),
            every,
            tx.clone(),
            last_seen.clone(),
            cancel_token.clone(),
        ));
        Self {
            tx,
            store,
            last_seen,
            cancel_token,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Drop for PollingNotifier {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl ChangeNotifier for PollingNotifier {
    fn publish(&self, change: SnapshotChange) {
        if change.origin.is_some() {
            *lock_last_seen(&self.last_seen) = self.store.modified();
        }
        let _ = self.tx.send(change);
    }

    fn subscribe(&self) -> broadcast::Receiver<SnapshotChange> {
        self.tx.subscribe()
    }
}

fn lock_last_seen(last_seen: &LastSeen) -> MutexGuard<'_, Option<SystemTime>> {
    match last_seen.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

async fn poll_loop(
    store: FileSnapshotStore,
    every: Duration,
    tx: broadcast::Sender<SnapshotChange>,
    last_seen: LastSeen,
    cancel_token: CancellationToken,
) {
    let mut ticker = time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log_info!("Watching {} for timer changes", store.path().display());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let current = store.modified();
                let changed = {
                    let mut seen = lock_last_seen(&last_seen);
                    let changed = *seen != current;
                    *seen = current;
                    changed
                };
                if changed {
                    log_debug!("Snapshot file changed on disk");
                    let _ = tx.send(SnapshotChange { origin: None });
                }
            }
            _ = cancel_token.cancelled() => {
                log_debug!("Snapshot watcher shutting down");
                break;
            }
        }
    }
}

/// Store wrapper that announces every write made by one surface.
pub struct NotifyingSnapshotStore {
    inner: Arc<dyn SnapshotStore>,
    notifier: Arc<dyn ChangeNotifier>,
    origin: SurfaceId,
}

impl NotifyingSnapshotStore {
    pub fn new(
        inner: Arc<dyn SnapshotStore>,
        notifier: Arc<dyn ChangeNotifier>,
        origin: SurfaceId,
    ) -> Self {
        Self {
            inner,
            notifier,
            origin,
        }
    }

    fn announce(&self) {
        self.notifier.publish(SnapshotChange {
            origin: Some(self.origin),
        });
    }
}

impl SnapshotStore for NotifyingSnapshotStore {
    fn load(&self) -> Result<Option<TimerSnapshot>> {
        self.inner.load()
    }

    fn save(&self, snapshot: &TimerSnapshot) -> Result<()> {
        self.inner.save(snapshot)?;
        self.announce();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear()?;
        self.announce();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot_store::MemorySnapshotStore;

    #[test]
    fn own_changes_are_not_a_concern() {
        let me = SurfaceId::new();
        let other = SurfaceId::new();
        assert!(!SnapshotChange { origin: Some(me) }.concerns(me));
        assert!(SnapshotChange { origin: Some(other) }.concerns(me));
        assert!(SnapshotChange { origin: None }.concerns(me));
    }

    #[test]
    fn notifying_store_announces_writes_with_origin() {
        let notifier = Arc::new(BroadcastNotifier::new());
        let mut rx = notifier.subscribe();
        let origin = SurfaceId::new();
        let store = NotifyingSnapshotStore::new(
            Arc::new(MemorySnapshotStore::new()),
            notifier.clone(),
            origin,
        );

        store.save(&TimerSnapshot::idle()).unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());

        assert_eq!(rx.try_recv().unwrap().origin, Some(origin));
        assert_eq!(rx.try_recv().unwrap().origin, Some(origin));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn polling_notifier_sees_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let file_store = FileSnapshotStore::new(dir.path().join("timer_snapshot.json"));
        let notifier = PollingNotifier::spawn(file_store.clone(), Duration::from_millis(10));
        let mut rx = notifier.subscribe();

        // let the watcher record the initial (absent) state
        time::sleep(Duration::from_millis(30)).await;
        file_store.save(&TimerSnapshot::idle()).unwrap();

        let change = time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no change observed")
            .unwrap();
        assert_eq!(change.origin, None);

        notifier.shutdown().await;
    }

    #[tokio::test]
    async fn polling_notifier_skips_writes_it_was_told_about() {
        let dir = tempfile::tempdir().unwrap();
        let file_store = FileSnapshotStore::new(dir.path().join("timer_snapshot.json"));
        let notifier = Arc::new(PollingNotifier::spawn(
            file_store.clone(),
            Duration::from_millis(10),
        ));
        let mut rx = notifier.subscribe();
        let origin = SurfaceId::new();
        let store = NotifyingSnapshotStore::new(
            Arc::new(file_store),
            notifier.clone(),
            origin,
        );

        store.save(&TimerSnapshot::idle()).unwrap();
        time::sleep(Duration::from_millis(100)).await;

        assert_eq!(rx.try_recv().unwrap().origin, Some(origin));
        assert!(rx.try_recv().is_err());
    }
}

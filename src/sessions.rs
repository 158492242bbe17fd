//! Hands finished focus records from the timer to the database without
//! making the timer wait for the write.

use log::{error, info};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};

use crate::{
    db::Database,
    timer::{FocusSessionRecord, SessionSink, TimerEvent},
};

/// Sending half given to the timer.
#[derive(Clone)]
pub struct SessionQueue {
    tx: mpsc::UnboundedSender<FocusSessionRecord>,
}

impl SessionSink for SessionQueue {
    fn submit(&self, record: FocusSessionRecord) {
        if let Err(err) = self.tx.send(record) {
            error!(
                "Session writer is gone; dropping {}s for project {}",
                err.0.duration_sec, err.0.project_id
            );
        }
    }
}

/// Spawn the writer task. It drains the queue into `db` until every
/// [`SessionQueue`] clone is dropped, announcing each stored record on
/// `events`. Failed writes are logged and not retried.
pub fn spawn_session_writer(
    db: Database,
    events: broadcast::Sender<TimerEvent>,
) -> (SessionQueue, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<FocusSessionRecord>();

    let handle = tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            match db.insert_focus_session(&record).await {
                Ok(stored) => {
                    info!(
                        "Saved focus session {} ({}s, project {})",
                        stored.id, stored.record.duration_sec, stored.record.project_id
                    );
                    let _ = events.send(TimerEvent::SessionRecorded { session: stored });
                }
                Err(err) => {
                    error!(
                        "Failed to save focus session for project {}: {err:?}",
                        record.project_id
                    );
                }
            }
        }
        info!("Session writer drained");
    });

    (SessionQueue { tx }, handle)
}

use std::{
    path::Path,
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::migrate;

/// Several surfaces, possibly in separate processes, write to the same file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

/// The worker runs until every sender is gone.
struct Worker {
    jobs: Option<mpsc::Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        drop(self.jobs.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Session database thread panicked");
            }
        }
    }
}

/// Focus-session storage. All SQLite access happens on one thread; clones
/// share it.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
}

impl Database {
    /// Open (creating if needed) and migrate the database at `path`. Any
    /// failure is reported here, before a worker exists.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open session database {}", path.display()))?;
        let db = Self::serve(conn)?;
        info!("Session database ready at {}", path.display());
        Ok(db)
    }

    /// Private database for tests and throwaway runs.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        Self::serve(conn)
    }

    fn serve(mut conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .context("failed to set busy timeout")?;
        // in-memory databases report "memory" and keep working
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            error!("Failed to enable WAL mode: {err}");
        }
        migrate(&mut conn)?;

        let (jobs, queue) = mpsc::channel::<Job>();
        let thread = thread::Builder::new()
            .name("focus-timer-db".into())
            .spawn(move || {
                for job in queue {
                    job(&mut conn);
                }
                info!("Session database closed");
            })
            .context("failed to spawn database thread")?;

        Ok(Self {
            worker: Arc::new(Worker {
                jobs: Some(jobs),
                thread: Some(thread),
            }),
        })
    }

    /// Run `task` against the connection and await its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let jobs = self
            .worker
            .jobs
            .as_ref()
            .ok_or_else(|| anyhow!("session database is closed"))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        jobs.send(Box::new(move |conn| {
            // caller gave up waiting; nothing to report to
            let _ = reply_tx.send(task(conn));
        }))
        .map_err(|_| anyhow!("session database thread has stopped"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("session database thread dropped the request"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_one_connection() {
        let db = Database::in_memory().unwrap();
        let other = db.clone();

        db.execute(|conn| {
            conn.execute("CREATE TABLE scratch (n INTEGER)", [])?;
            Ok(())
        })
        .await
        .unwrap();
        let count: i64 = other
            .execute(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM scratch", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn task_errors_come_back_to_the_caller() {
        let db = Database::in_memory().unwrap();
        let result: Result<()> = db
            .execute(|conn| {
                conn.execute("INSERT INTO no_such_table VALUES (1)", [])?;
                Ok(())
            })
            .await;
        assert!(result.is_err());

        // the worker survives a failed task
        let version: i64 = db
            .execute(|conn| Ok(conn.pragma_query_value(None, "user_version", |r| r.get(0))?))
            .await
            .unwrap();
        assert!(version >= 1);
    }

    #[test]
    fn unopenable_path_fails_up_front() {
        let dir = tempfile::tempdir().unwrap();
        // a directory cannot be opened as a database file
        assert!(Database::new(dir.path()).is_err());
    }
}

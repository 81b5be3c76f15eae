use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

type StoreJob = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum WorkerMessage {
    Run(StoreJob),
    Stop,
}

/// Owns the worker thread; the last `Database` clone to go away stops it.
struct Worker {
    jobs: mpsc::Sender<WorkerMessage>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    fn stop(&self) {
        let thread = self
            .thread
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(thread) = thread else {
            return;
        };

        if self.jobs.send(WorkerMessage::Stop).is_err() {
            error!("store worker already gone at shutdown");
        }
        if let Err(panic) = thread.join() {
            error!("store worker panicked: {panic:?}");
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Handle to the alarm/memo store. All SQLite access is serialised on one
/// worker thread, so a `mark_consumed` write is visible to the next read.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    db_path: Arc<Option<PathBuf>>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
        }

        let path_for_thread = db_path.clone();
        let database = Self::spawn(move || Connection::open(&path_for_thread), Some(db_path))?;
        info!("Database initialized at {}", database.describe());
        Ok(database)
    }

    /// Private database that lives as long as the handle. Used by tests and
    /// dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::spawn(Connection::open_in_memory, None)
    }

    fn spawn<F>(open: F, db_path: Option<PathBuf>) -> Result<Self>
    where
        F: FnOnce() -> rusqlite::Result<Connection> + Send + 'static,
    {
        let (jobs_tx, jobs_rx) = mpsc::channel::<WorkerMessage>();
        let (ready_tx, ready_rx) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("smart-alarm-db".into())
            .spawn(move || {
                let mut conn = match open() {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(message) = jobs_rx.recv() {
                    match message {
                        WorkerMessage::Run(job) => job(&mut conn),
                        WorkerMessage::Stop => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        Ok(Self {
            worker: Arc::new(Worker {
                jobs: jobs_tx,
                thread: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_ref().as_deref()
    }

    fn describe(&self) -> String {
        match self.path() {
            Some(path) => path.display().to_string(),
            None => ":memory:".to_string(),
        }
    }

    /// Runs `task` on the worker thread and awaits its result. Jobs run one
    /// at a time in submission order.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: StoreJob = Box::new(move |conn| {
            // The caller may have given up waiting; nothing to report then.
            let _ = done_tx.send(task(conn));
        });

        self.worker
            .jobs
            .send(WorkerMessage::Run(job))
            .map_err(|_| anyhow!("store worker is not running"))?;

        match done_rx.await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("store worker stopped before finishing the job")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewAlarm;

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("smart-alarm-db-{}", uuid::Uuid::new_v4()));
        let path = dir.join("alarms.sqlite3");

        {
            let db = Database::new(path.clone()).unwrap();
            assert_eq!(db.path(), Some(path.as_path()));
            db.create_alarm(NewAlarm {
                time: "06:45".into(),
                days: Some("1".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        }

        let reopened = Database::new(path).unwrap();
        let alarms = reopened.list_alarms().await.unwrap();
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].time, "06:45");

        drop(reopened);
        let _ = std::fs::remove_dir_all(dir);
    }
}

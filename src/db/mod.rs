use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::{error, info};
use rusqlite::{Connection, OpenFlags};
use tokio::sync::oneshot;

mod backup;
pub(crate) mod helpers;
mod lock;
mod merge;
mod migrations;
pub(crate) mod repositories;

pub use merge::MergeOutcome;

use crate::{error::MonitorError, models::{HistoryTable, ZoneRecord}};

const BACKUP_DIR_NAME: &str = "backups";

/// Paths that make up one history location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryFiles {
    pub history_path: PathBuf,
    pub backup_dir: PathBuf,
    pub lock_path: PathBuf,
}

impl HistoryFiles {
    pub fn new(history_path: PathBuf) -> Self {
        let parent = history_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let mut lock_name: OsString = history_path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("history"));
        lock_name.push(".lock");

        Self {
            backup_dir: parent.join(BACKUP_DIR_NAME),
            lock_path: parent.join(lock_name),
            history_path,
        }
    }
}

type StoreTask = Box<dyn FnOnce(&HistoryFiles) + Send + 'static>;

enum StoreCommand {
    Execute(StoreTask),
    Shutdown,
}

struct StoreInner {
    sender: mpsc::Sender<StoreCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(StoreCommand::Shutdown) {
                error!("Failed to send shutdown to history thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join history thread: {join_err:?}");
            }
        }
    }
}

/// Owner of the history file. All file work runs on one dedicated thread, so merges from a
/// single process are serialized; the lock file guards against other processes.
#[derive(Clone)]
pub struct HistoryStore {
    inner: Arc<StoreInner>,
    files: Arc<HistoryFiles>,
}

impl HistoryStore {
    pub fn new(history_path: PathBuf) -> Result<Self, MonitorError> {
        Self::open(history_path).map_err(MonitorError::storage)
    }

    fn open(history_path: PathBuf) -> Result<Self> {
        if let Some(parent) = history_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create history directory {}", parent.display())
            })?;
        }

        let files = HistoryFiles::new(history_path);
        let (command_tx, command_rx) = mpsc::channel::<StoreCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let files_for_thread = files.clone();

        let worker = thread::Builder::new()
            .name("history-store".into())
            .spawn(move || {
                let files = files_for_thread;
                if ready_tx.send(check_existing(&files.history_path)).is_err() {
                    error!("History initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        StoreCommand::Execute(task) => task(&files),
                        StoreCommand::Shutdown => break,
                    }
                }

                info!("History thread shutting down");
            })
            .context("failed to spawn history worker thread")?;

        ready_rx
            .recv()
            .context("history worker exited before signaling readiness")??;

        info!("History store ready at {}", files.history_path.display());

        Ok(Self {
            inner: Arc::new(StoreInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            files: Arc::new(files),
        })
    }

    pub fn path(&self) -> &Path {
        self.files.history_path.as_path()
    }

    pub fn backup_dir(&self) -> &Path {
        self.files.backup_dir.as_path()
    }

    async fn execute<F, T>(&self, task: F) -> Result<T, MonitorError>
    where
        F: FnOnce(&HistoryFiles) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = StoreCommand::Execute(Box::new(move |files| {
            let result = task(files);
            if reply_tx.send(result).is_err() {
                error!("History caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to history thread: {err}"))
            .map_err(MonitorError::storage)?;

        reply_rx
            .await
            .map_err(|_| MonitorError::StorageIo("history thread terminated unexpectedly".into()))?
            .map_err(MonitorError::storage)
    }

    /// Current stored table; empty when no history file exists yet.
    pub async fn load(&self) -> Result<HistoryTable, MonitorError> {
        self.execute(|files| {
            if !files.history_path.exists() {
                return Ok(HistoryTable::default());
            }
            merge::read_table(&files.history_path).map(HistoryTable::new)
        })
        .await
    }

    /// Union `incoming` into the stored table, backing up the prior file first.
    pub async fn merge(&self, incoming: Vec<ZoneRecord>) -> Result<MergeOutcome, MonitorError> {
        self.execute(move |files| merge::merge_into(files, incoming, Utc::now()))
            .await
    }

    /// Backups of this history file, oldest first.
    pub async fn backups(&self) -> Result<Vec<PathBuf>, MonitorError> {
        self.execute(|files| backup::list_backups(&files.history_path, &files.backup_dir))
            .await
    }
}

fn check_existing(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("failed to open history {}", path.display()))?;
    migrations::ensure_readable(&conn)
        .with_context(|| format!("cannot read history {}", path.display()))?;
    Ok(())
}

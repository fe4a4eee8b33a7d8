use std::{
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::{log_error, log_warn};

const ENABLE_LOGS: bool = true;

/// Exclusive marker held by the one process allowed to rewrite the history file.
///
/// The file records the holder's pid. A lock whose holder is no longer running is taken over;
/// one whose contents cannot be read as a pid is treated as held.
#[derive(Debug)]
pub struct WriterLock {
    path: PathBuf,
}

impl WriterLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = match create(path)? {
            Some(file) => file,
            None => {
                let holder = fs::read_to_string(path).unwrap_or_default();
                if !is_stale(&holder) {
                    bail!(
                        "history is locked by another writer ({}): {}; remove it if no refresh is running",
                        path.display(),
                        holder.trim()
                    );
                }
                take_over(path, &holder)?
            }
        };

        let lock = Self {
            path: path.to_path_buf(),
        };
        write_holder(file, path)?;
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            log_error!("Failed to release history lock {}: {err}", self.path.display());
        }
    }
}

fn create(path: &Path) -> Result<Option<File>> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => Ok(Some(file)),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(None),
        Err(err) => {
            Err(err).with_context(|| format!("failed to create lock file {}", path.display()))
        }
    }
}

fn take_over(path: &Path, stale_holder: &str) -> Result<File> {
    // Only remove the file we judged stale, not a lock written since.
    let current = fs::read_to_string(path).unwrap_or_default();
    if current != stale_holder {
        bail!(
            "history lock {} changed hands while checking it; retry the refresh",
            path.display()
        );
    }

    log_warn!(
        "Removing stale history lock {} ({})",
        path.display(),
        stale_holder.trim()
    );
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to remove stale lock {}", path.display()))
        }
    }

    match create(path)? {
        Some(file) => Ok(file),
        None => bail!(
            "history is locked by another writer ({}) that took over a stale lock",
            path.display()
        ),
    }
}

fn write_holder(mut file: File, path: &Path) -> Result<()> {
    writeln!(file, "pid {} since {}", std::process::id(), Utc::now().to_rfc3339())
        .and_then(|_| file.sync_all())
        .with_context(|| format!("failed to write lock file {}", path.display()))
}

/// Pid recorded in a lock file written as `pid <N> since <timestamp>`.
fn holder_pid(contents: &str) -> Option<u32> {
    contents
        .trim()
        .strip_prefix("pid ")?
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}

fn is_stale(contents: &str) -> bool {
    match holder_pid(contents) {
        Some(pid) => !process_is_running(pid),
        None => false,
    }
}

fn process_is_running(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
    system.process(pid).is_some()
}

use std::{
    collections::HashSet,
    fs::{self, File},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags};
use uuid::Uuid;

use crate::{
    log_info, log_warn,
    models::{HistoryTable, RecordKey, ZoneRecord},
};

use super::{
    backup,
    lock::WriterLock,
    migrations::{ensure_readable, run_migrations},
    repositories::zone_records::{insert_records, load_records},
    HistoryFiles,
};

const ENABLE_LOGS: bool = true;

/// What a merge did to the history file.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The full table as written.
    pub table: HistoryTable,
    /// Copy of the pre-merge file; `None` when the merge created the file.
    pub backup: Option<PathBuf>,
    /// Rows present after the merge that were not there before.
    pub added: usize,
    /// Incoming rows discarded because their key was already taken.
    pub duplicates: usize,
}

pub(crate) fn merge_into(
    files: &HistoryFiles,
    incoming: Vec<ZoneRecord>,
    now: DateTime<Utc>,
) -> Result<MergeOutcome> {
    let _lock = WriterLock::acquire(&files.lock_path)?;

    let (existing, backup) = if files.history_path.exists() {
        let existing = read_table(&files.history_path)?;
        // No write happens unless this copy succeeded.
        let backup = backup::snapshot(&files.history_path, &files.backup_dir, now)
            .context("backup failed; history left untouched")?;
        log_info!("Backed up history to {}", backup.display());
        (existing, Some(backup))
    } else {
        (Vec::new(), None)
    };

    let existing_count = existing.len();
    let (merged, duplicates) = union_dedup(existing, incoming);
    write_table_atomically(&files.history_path, &merged)?;

    let added = merged.len() - existing_count;
    log_info!(
        "Merged {added} new records ({duplicates} duplicates skipped); history holds {}",
        merged.len()
    );

    Ok(MergeOutcome {
        table: HistoryTable::new(merged),
        backup,
        added,
        duplicates,
    })
}

/// Read the stored table without modifying the file.
pub(crate) fn read_table(path: &Path) -> Result<Vec<ZoneRecord>> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("failed to open history {}", path.display()))?;
    ensure_readable(&conn).with_context(|| format!("cannot read history {}", path.display()))?;
    load_records(&conn).with_context(|| format!("failed to load history {}", path.display()))
}

/// Existing rows first, so an already-stored key keeps its stored row; result ordered by
/// timestamp with ties in arrival order.
pub(crate) fn union_dedup(
    existing: Vec<ZoneRecord>,
    incoming: Vec<ZoneRecord>,
) -> (Vec<ZoneRecord>, usize) {
    let mut seen: HashSet<RecordKey> = HashSet::with_capacity(existing.len() + incoming.len());
    let mut duplicates = 0;

    let mut merged: Vec<ZoneRecord> = existing
        .into_iter()
        .chain(incoming)
        .filter(|record| {
            let fresh = seen.insert(record.key());
            if !fresh {
                duplicates += 1;
            }
            fresh
        })
        .collect();

    merged.sort_by_key(|record| record.timestamp());
    (merged, duplicates)
}

/// Write `records` to a temp file beside `path`, then rename it over `path`.
pub(crate) fn write_table_atomically(path: &Path, records: &[ZoneRecord]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("history path {} has no file name", path.display()))?
        .to_string_lossy();
    let temp_path = dir.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

    let result = write_table(&temp_path, records).and_then(|_| {
        fs::rename(&temp_path, path).with_context(|| {
            format!(
                "failed to replace {} with {}",
                path.display(),
                temp_path.display()
            )
        })
    });

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result?;

    sync_dir(dir);
    Ok(())
}

fn write_table(path: &Path, records: &[ZoneRecord]) -> Result<()> {
    // Default rollback journal: once closed, the single file holds the complete table.
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    run_migrations(&mut conn)?;

    let tx = conn.transaction().context("failed to open write transaction")?;
    insert_records(&tx, records)?;
    tx.commit().context("failed to commit history table")?;

    conn.close()
        .map_err(|(_, err)| err)
        .context("failed to close history table")?;

    File::open(path)
        .and_then(|file| file.sync_all())
        .with_context(|| format!("failed to sync {}", path.display()))
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(err) = File::open(dir).and_then(|d| d.sync_all()) {
        log_warn!("Failed to sync directory {}: {err}", dir.display());
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

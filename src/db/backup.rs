use std::{
    ffi::OsStr,
    fs::{self, File, OpenOptions},
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Copy the history file byte-for-byte into `backup_dir` under a timestamped name.
///
/// The copy is synced before returning, so a successful result means the prior state is durable.
pub fn snapshot(history_path: &Path, backup_dir: &Path, taken_at: DateTime<Utc>) -> Result<PathBuf> {
    fs::create_dir_all(backup_dir)
        .with_context(|| format!("failed to create backup directory {}", backup_dir.display()))?;

    let (stem, extension) = name_parts(history_path);
    let stamp = taken_at.format("%Y%m%dT%H%M%S%6fZ").to_string();

    let mut source = File::open(history_path)
        .with_context(|| format!("failed to open {} for backup", history_path.display()))?;

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let file_name = match attempt {
            0 => format!("{stem}_{stamp}{extension}"),
            n => format!("{stem}_{stamp}_{n}{extension}"),
        };
        let target = backup_dir.join(file_name);

        let mut destination = match OpenOptions::new().write(true).create_new(true).open(&target) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to create backup {}", target.display()))
            }
        };

        let copied = io::copy(&mut source, &mut destination)
            .and_then(|_| destination.sync_all());
        if let Err(err) = copied {
            let _ = fs::remove_file(&target);
            return Err(err)
                .with_context(|| format!("failed to write backup {}", target.display()));
        }
        return Ok(target);
    }

    bail!(
        "could not find a free backup name for {} in {}",
        history_path.display(),
        backup_dir.display()
    )
}

/// Backups belonging to `history_path`, oldest first.
pub fn list_backups(history_path: &Path, backup_dir: &Path) -> Result<Vec<PathBuf>> {
    if !backup_dir.exists() {
        return Ok(Vec::new());
    }

    let (stem, _) = name_parts(history_path);
    let prefix = format!("{stem}_");

    let mut backups = Vec::new();
    for entry in fs::read_dir(backup_dir)
        .with_context(|| format!("failed to list {}", backup_dir.display()))?
    {
        let entry = entry?;
        let is_backup = entry
            .file_name()
            .to_str()
            .map_or(false, |name| name.starts_with(&prefix));
        if is_backup && entry.file_type()?.is_file() {
            backups.push(entry.path());
        }
    }
    backups.sort();
    Ok(backups)
}

fn name_parts(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("history")
        .to_string();
    let extension = path
        .extension()
        .and_then(OsStr::to_str)
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    (stem, extension)
}

//! Pre-write snapshots for rollback
//!
//! Every mutating write is preceded by a full copy of the target file at
//! `<path>.backup-<YYYYMMDDHHMMSS>`. A second snapshot within the same
//! second gets a `.N` suffix instead of overwriting the first.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::commit::{CommitError, WriteCommitter};
use crate::util::sha256_hex;

const BACKUP_INFIX: &str = ".backup-";
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Errors during snapshot, listing or restore
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("I/O error for {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error("Not a backup file: {0}")]
    UnrecognizedName(String),
}

impl BackupError {
    fn io(path: &Path, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// One snapshot of a configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// File the snapshot was taken from
    pub source_file: PathBuf,
    /// Snapshot location
    pub backup_path: PathBuf,
    /// When created
    pub created_at: DateTime<Utc>,
    /// SHA256 of the snapshotted bytes
    pub sha256: String,
    pub size: u64,
}

/// Creates, lists, prunes and restores snapshots
#[derive(Debug, Clone, Default)]
pub struct BackupManager {
    retain: Option<usize>,
}

impl BackupManager {
    /// Keep every snapshot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only the newest `retain` snapshots per file after each snapshot
    #[must_use]
    pub fn with_retention(mut self, retain: Option<usize>) -> Self {
        self.retain = retain;
        self
    }

    /// Copy `path` to a new timestamped sibling
    ///
    /// # Errors
    /// Returns an error if the source cannot be read or the copy cannot be written
    pub fn snapshot(&self, path: &Path) -> Result<BackupRecord, BackupError> {
        let content = fs::read(path).map_err(|e| BackupError::io(path, &e))?;
        let metadata = fs::metadata(path).map_err(|e| BackupError::io(path, &e))?;

        let now = Local::now();
        let base = format!(
            "{}{BACKUP_INFIX}{}",
            path.display(),
            now.format(TIMESTAMP_FORMAT)
        );

        let mut attempt = 0u32;
        let (backup_path, mut file) = loop {
            let candidate = if attempt == 0 {
                PathBuf::from(&base)
            } else {
                PathBuf::from(format!("{base}.{attempt}"))
            };
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(file) => break (candidate, file),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(BackupError::io(&candidate, &e)),
            }
        };

        let written = file
            .write_all(&content)
            .and_then(|()| file.set_permissions(metadata.permissions()))
            .and_then(|()| file.sync_all());
        drop(file);
        discard_on_error(&backup_path, written)?;
        copy_owner(&metadata, &backup_path);

        let record = BackupRecord {
            source_file: path.to_path_buf(),
            backup_path,
            created_at: now.with_timezone(&Utc),
            sha256: sha256_hex(&content),
            size: content.len() as u64,
        };
        info!(source = %path.display(), backup = %record.backup_path.display(), "snapshot taken");
        Ok(record)
    }

    /// Snapshots of `path`, oldest first
    ///
    /// # Errors
    /// Returns an error if the directory cannot be read
    pub fn list(&self, path: &Path) -> Result<Vec<BackupRecord>, BackupError> {
        let dir = parent_dir(path);
        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            return Ok(Vec::new());
        };
        let prefix = format!("{file_name}{BACKUP_INFIX}");

        let mut found = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| BackupError::io(&dir, &e))? {
            let entry = entry.map_err(|e| BackupError::io(&dir, &e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(suffix) = name.strip_prefix(&prefix) else {
                continue;
            };
            let Some((created_at, sequence)) = parse_suffix(suffix) else {
                continue;
            };

            let backup_path = entry.path();
            let content = fs::read(&backup_path).map_err(|e| BackupError::io(&backup_path, &e))?;
            found.push((
                sequence,
                BackupRecord {
                    source_file: path.to_path_buf(),
                    backup_path,
                    created_at,
                    sha256: sha256_hex(&content),
                    size: content.len() as u64,
                },
            ));
        }

        found.sort_by(|a, b| a.1.created_at.cmp(&b.1.created_at).then(a.0.cmp(&b.0)));
        Ok(found.into_iter().map(|(_, record)| record).collect())
    }

    /// Delete all but the newest `retain` snapshots of `path`
    ///
    /// # Errors
    /// Returns an error if listing or deleting fails
    pub fn prune(&self, path: &Path, retain: usize) -> Result<Vec<PathBuf>, BackupError> {
        let records = self.list(path)?;
        let excess = records.len().saturating_sub(retain);

        let mut removed = Vec::with_capacity(excess);
        for record in records.into_iter().take(excess) {
            fs::remove_file(&record.backup_path)
                .map_err(|e| BackupError::io(&record.backup_path, &e))?;
            debug!(backup = %record.backup_path.display(), "pruned snapshot");
            removed.push(record.backup_path);
        }
        Ok(removed)
    }

    /// Apply the configured retention, if any
    ///
    /// # Errors
    /// Returns an error if pruning fails
    pub fn enforce_retention(&self, path: &Path) -> Result<Vec<PathBuf>, BackupError> {
        match self.retain {
            Some(retain) => self.prune(path, retain),
            None => Ok(Vec::new()),
        }
    }

    /// Write a snapshot's bytes back over its source file
    ///
    /// # Errors
    /// Returns an error if the snapshot cannot be read or the commit fails
    pub fn restore(&self, record: &BackupRecord, committer: &WriteCommitter) -> Result<(), BackupError> {
        let content = fs::read(&record.backup_path).map_err(|e| BackupError::io(&record.backup_path, &e))?;
        committer.commit_bytes(&record.source_file, &content)?;
        info!(
            source = %record.source_file.display(),
            backup = %record.backup_path.display(),
            "restored from snapshot"
        );
        Ok(())
    }

    /// Load the record for an existing snapshot path
    ///
    /// # Errors
    /// Returns an error if the name is not a snapshot name or the file is unreadable
    pub fn load(&self, backup_path: &Path) -> Result<BackupRecord, BackupError> {
        let name = backup_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let (source_name, suffix) = name
            .rsplit_once(BACKUP_INFIX)
            .ok_or_else(|| BackupError::UnrecognizedName(name.clone()))?;
        let (created_at, _) =
            parse_suffix(suffix).ok_or_else(|| BackupError::UnrecognizedName(name.clone()))?;

        let content = fs::read(backup_path).map_err(|e| BackupError::io(backup_path, &e))?;
        Ok(BackupRecord {
            source_file: parent_dir(backup_path).join(source_name),
            backup_path: backup_path.to_path_buf(),
            created_at,
            sha256: sha256_hex(&content),
            size: content.len() as u64,
        })
    }
}

/// A partial snapshot must never be listed or restored
fn discard_on_error<T>(path: &Path, result: std::io::Result<T>) -> Result<T, BackupError> {
    result.map_err(|e| {
        if let Err(remove) = fs::remove_file(path) {
            debug!(path = %path.display(), error = %remove, "could not remove partial snapshot");
        }
        BackupError::io(path, &e)
    })
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// `YYYYMMDDHHMMSS` optionally followed by `.N`
fn parse_suffix(suffix: &str) -> Option<(DateTime<Utc>, u32)> {
    let (stamp, sequence) = match suffix.split_once('.') {
        Some((stamp, seq)) => (stamp, seq.parse().ok()?),
        None => (suffix, 0),
    };
    if stamp.len() != 14 {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    let local = Local.from_local_datetime(&naive).earliest()?;
    Some((local.with_timezone(&Utc), sequence))
}

fn copy_owner(metadata: &fs::Metadata, target: &Path) {
    use std::os::unix::fs::MetadataExt;

    if let Err(e) = std::os::unix::fs::chown(target, Some(metadata.uid()), Some(metadata.gid())) {
        debug!(backup = %target.display(), error = %e, "could not copy owner to snapshot");
    }
}

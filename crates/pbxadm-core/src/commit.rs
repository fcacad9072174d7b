//! Atomic file replacement
//!
//! New content is written to a temporary file in the target's directory,
//! flushed, given the target's ownership and mode, then renamed over the
//! target. Readers see either the old file or the new one.

use nix::unistd::{chown, Gid, Group, Uid, User};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// Errors during commit
#[derive(Error, Debug)]
pub enum CommitError {
    #[error("I/O error for {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Cannot apply ownership to {path}: {message}")]
    Ownership { path: PathBuf, message: String },
}

impl CommitError {
    fn io(path: &Path, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    fn ownership(path: &Path, message: impl Into<String>) -> Self {
        Self::Ownership {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Owner, group and mode for committed files; unset fields keep the
/// existing file's values
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOwnership {
    pub user: Option<String>,
    pub group: Option<String>,
    /// Octal permission bits, e.g. `"640"`
    pub mode: Option<String>,
}

impl FileOwnership {
    /// Parsed permission bits
    ///
    /// # Errors
    /// Returns an error if `mode` is not an octal number up to `7777`
    pub fn mode_bits(&self) -> Result<Option<u32>, String> {
        match self.mode.as_deref() {
            None => Ok(None),
            Some(text) => {
                let trimmed = text.trim().trim_start_matches("0o");
                match u32::from_str_radix(trimmed, 8) {
                    Ok(bits) if bits <= 0o7777 => Ok(Some(bits)),
                    _ => Err(format!("invalid file mode '{text}'")),
                }
            }
        }
    }
}

struct ResolvedOwnership {
    uid: Option<Uid>,
    gid: Option<Gid>,
    mode: Option<u32>,
}

/// Writes files atomically with configured ownership
#[derive(Debug, Clone, Default)]
pub struct WriteCommitter {
    ownership: FileOwnership,
}

impl WriteCommitter {
    #[must_use]
    pub fn new(ownership: FileOwnership) -> Self {
        Self { ownership }
    }

    /// Replace `path` with `content`
    ///
    /// # Errors
    /// Returns an error if ownership cannot be resolved or any write step fails;
    /// the target is untouched in that case
    pub fn commit(&self, path: &Path, content: &str) -> Result<(), CommitError> {
        self.commit_bytes(path, content.as_bytes())
    }

    /// Replace `path` with raw bytes
    ///
    /// # Errors
    /// See [`WriteCommitter::commit`]
    pub fn commit_bytes(&self, path: &Path, content: &[u8]) -> Result<(), CommitError> {
        let resolved = self.resolve(path)?;
        let existing = fs::metadata(path).ok();

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut temp = NamedTempFile::new_in(&parent).map_err(|e| CommitError::io(&parent, &e))?;

        temp.write_all(content)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| CommitError::io(temp.path(), &e))?;

        let mode = resolved
            .mode
            .or_else(|| existing.as_ref().map(|m| m.permissions().mode() & 0o7777));
        if let Some(mode) = mode {
            fs::set_permissions(temp.path(), fs::Permissions::from_mode(mode))
                .map_err(|e| CommitError::io(temp.path(), &e))?;
        }

        let uid = resolved
            .uid
            .or_else(|| existing.as_ref().map(|m| Uid::from_raw(m.uid())));
        let gid = resolved
            .gid
            .or_else(|| existing.as_ref().map(|m| Gid::from_raw(m.gid())));
        if uid.is_some() || gid.is_some() {
            let current = temp
                .as_file()
                .metadata()
                .map_err(|e| CommitError::io(temp.path(), &e))?;
            let needs_change = uid.is_some_and(|u| u.as_raw() != current.uid())
                || gid.is_some_and(|g| g.as_raw() != current.gid());
            if needs_change {
                chown(temp.path(), uid, gid)
                    .map_err(|e| CommitError::ownership(path, e.to_string()))?;
            }
        }

        temp.persist(path).map_err(|e| CommitError::io(path, &e.error))?;
        sync_dir(&parent);
        debug!(path = %path.display(), bytes = content.len(), "committed");
        Ok(())
    }

    fn resolve(&self, path: &Path) -> Result<ResolvedOwnership, CommitError> {
        let uid = match self.ownership.user.as_deref() {
            None => None,
            Some(name) => Some(
                User::from_name(name)
                    .map_err(|e| CommitError::ownership(path, e.to_string()))?
                    .ok_or_else(|| CommitError::ownership(path, format!("unknown user '{name}'")))?
                    .uid,
            ),
        };
        let gid = match self.ownership.group.as_deref() {
            None => None,
            Some(name) => Some(
                Group::from_name(name)
                    .map_err(|e| CommitError::ownership(path, e.to_string()))?
                    .ok_or_else(|| CommitError::ownership(path, format!("unknown group '{name}'")))?
                    .gid,
            ),
        };
        let mode = self
            .ownership
            .mode_bits()
            .map_err(|message| CommitError::ownership(path, message))?;
        Ok(ResolvedOwnership { uid, gid, mode })
    }
}

fn sync_dir(dir: &Path) {
    if let Err(e) = fs::File::open(dir).and_then(|d| d.sync_all()) {
        debug!(dir = %dir.display(), error = %e, "directory sync skipped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_commit_replaces_content_and_keeps_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pjsip.conf");
        fs::write(&path, "old\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        WriteCommitter::default().commit(&path, "new\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[test]
    fn test_commit_applies_configured_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("features.conf");
        fs::write(&path, "old\n").unwrap();

        let committer = WriteCommitter::new(FileOwnership {
            mode: Some("600".into()),
            ..FileOwnership::default()
        });
        committer.commit(&path, "new\n").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_unknown_user_leaves_target_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("voicemail.conf");
        fs::write(&path, "old\n").unwrap();

        let committer = WriteCommitter::new(FileOwnership {
            user: Some("pbxadm-no-such-user-9f3c".into()),
            ..FileOwnership::default()
        });
        let err = committer.commit(&path, "new\n").unwrap_err();

        assert!(matches!(err, CommitError::Ownership { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "old\n");
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_mode_parsing() {
        let ownership = |m: &str| FileOwnership {
            mode: Some(m.into()),
            ..FileOwnership::default()
        };
        assert_eq!(ownership("0640").mode_bits().unwrap(), Some(0o640));
        assert_eq!(ownership("0o600").mode_bits().unwrap(), Some(0o600));
        assert!(ownership("999").mode_bits().is_err());
        assert_eq!(FileOwnership::default().mode_bits().unwrap(), None);
    }
}

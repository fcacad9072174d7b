//! Entity registry
//!
//! Orchestrates one mutation end to end: lock the file, read and parse it,
//! let the entity module plan the change, snapshot, commit, release the
//! lock, then reload the affected subsystems. Each entity kind exposes its
//! operations through a small handle borrowed from [`EntityRegistry`].
//!
//! ```text
//! Validating -> PendingWrite -> Written -> ReloadTriggered -> ReloadConfirmed
//!                                                          -> ReloadUncertain
//! ```
//!
//! A rejected request never reaches `PendingWrite` and leaves the file
//! untouched. A failed commit restores the snapshot. A failed reload never
//! unwinds the write.

pub mod callerid;
pub mod extension;
pub mod feature;
pub mod trunk;
pub mod voicemail;

pub use callerid::{CallerIdOps, CallerIdPolicy, CallerIdUpdate};
pub use extension::{ExtensionOps, ExtensionSummary, ExtensionUpdate, NewExtension};
pub use feature::{FeatureCode, FeatureOps, KNOWN_FEATURES};
pub use trunk::{NewTrunk, TrunkOps, TrunkSummary, TrunkUpdate};
pub use voicemail::{MailboxSummary, MailboxUpdate, NewMailbox, VoicemailOps};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::backup::{BackupManager, BackupRecord};
use crate::commit::WriteCommitter;
use crate::diff;
use crate::document::{ConfigDocument, SectionStanza, StanzaRole};
use crate::error::{AdminError, AdminResult};
use crate::locate;
use crate::lock;
use crate::plan::{MutationPlanner, Patch};
use crate::reload::{ReloadDispatcher, ReloadResult, Subsystem};
use crate::settings::AdminSettings;
use crate::util::sha256_hex;

/// Kind of administrative entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Extension,
    Trunk,
    Voicemail,
    Feature,
    CallerId,
    /// A whole managed file, for backup restores
    File,
}

impl EntityKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extension => "extension",
            Self::Trunk => "trunk",
            Self::Voicemail => "voicemail",
            Self::Feature => "feature",
            Self::CallerId => "callerid",
            Self::File => "file",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Delete,
    Enable,
    Disable,
    Reset,
    Restore,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Reset => "reset",
            Self::Restore => "restore",
        };
        f.write_str(s)
    }
}

/// Where a mutation ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Validating,
    PendingWrite,
    Written,
    ReloadTriggered,
    /// Written and every reload confirmed
    ReloadConfirmed,
    /// Written, but at least one reload failed or timed out
    ReloadUncertain,
    /// The request matched the current file; nothing written
    Unchanged,
    /// Dry run; nothing written
    Planned,
}

/// Result of an executed (or planned) mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationOutcome {
    /// Correlates log lines of one mutation
    pub id: Uuid,
    pub operation: OperationType,
    pub kind: EntityKind,
    pub name: String,
    pub state: OperationState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_modified: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reloads: Vec<ReloadResult>,
    /// Unified diff of the change
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub finished_at: DateTime<Utc>,
}

impl OperationOutcome {
    /// One-line description
    #[must_use]
    pub fn message(&self) -> String {
        let what = format!("{} {} '{}'", self.operation, self.kind, self.name);
        match self.state {
            OperationState::Planned => format!("Planned {what} (dry run)"),
            OperationState::Unchanged => format!("No change needed for {what}"),
            OperationState::ReloadUncertain => {
                format!("Applied {what}; reload could not be confirmed")
            }
            _ => format!("Applied {what}"),
        }
    }
}

/// Configuration file managed by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagedFile {
    Pjsip,
    Voicemail,
    Features,
}

impl ManagedFile {
    pub const ALL: [ManagedFile; 3] = [Self::Pjsip, Self::Voicemail, Self::Features];

    #[must_use]
    pub fn path<'s>(&self, settings: &'s AdminSettings) -> &'s Path {
        match self {
            Self::Pjsip => &settings.files.pjsip,
            Self::Voicemail => &settings.files.voicemail,
            Self::Features => &settings.files.features,
        }
    }

    /// Subsystem that reads this file
    #[must_use]
    pub fn subsystem(&self) -> Subsystem {
        match self {
            Self::Pjsip => Subsystem::Endpoints,
            Self::Voicemail => Subsystem::Voicemail,
            Self::Features => Subsystem::Features,
        }
    }
}

impl fmt::Display for ManagedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pjsip => "pjsip",
            Self::Voicemail => "voicemail",
            Self::Features => "features",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ManagedFile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown file '{s}' (expected pjsip, voicemail or features)"))
    }
}

/// Parse status of one managed file
#[derive(Debug, Clone, Serialize)]
pub struct FileCheck {
    pub file: ManagedFile,
    pub path: PathBuf,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stanzas: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileCheck {
    #[must_use]
    pub fn ok(&self) -> bool {
        self.exists && self.error.is_none()
    }
}

/// Description of one mutation, handed to [`EntityRegistry::mutate`]
pub(crate) struct Mutation {
    pub operation: OperationType,
    pub kind: EntityKind,
    pub name: String,
    pub file: ManagedFile,
    pub reloads: Vec<Subsystem>,
    pub dry_run: bool,
}

/// Entry point for every administrative operation
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    settings: AdminSettings,
    backups: BackupManager,
    committer: WriteCommitter,
    reloader: ReloadDispatcher,
}

impl EntityRegistry {
    #[must_use]
    pub fn new(settings: AdminSettings) -> Self {
        let backups = BackupManager::new().with_retention(settings.backup.retain);
        let committer = WriteCommitter::new(settings.ownership.clone());
        let reloader = ReloadDispatcher::from_settings(&settings.reload);
        Self {
            settings,
            backups,
            committer,
            reloader,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &AdminSettings {
        &self.settings
    }

    #[must_use]
    pub fn extensions(&self) -> ExtensionOps<'_> {
        ExtensionOps::new(self)
    }

    #[must_use]
    pub fn trunks(&self) -> TrunkOps<'_> {
        TrunkOps::new(self)
    }

    #[must_use]
    pub fn voicemail(&self) -> VoicemailOps<'_> {
        VoicemailOps::new(self)
    }

    #[must_use]
    pub fn features(&self) -> FeatureOps<'_> {
        FeatureOps::new(self)
    }

    #[must_use]
    pub fn caller_id(&self) -> CallerIdOps<'_> {
        CallerIdOps::new(self)
    }

    /// Read and parse a managed file as it is on disk now
    ///
    /// # Errors
    /// Returns `Io` if unreadable, `Parse` if malformed
    pub fn document(&self, file: ManagedFile) -> AdminResult<ConfigDocument> {
        let path = file.path(&self.settings);
        let text = fs::read_to_string(path).map_err(|e| AdminError::io(path, &e))?;
        ConfigDocument::parse(&text).map_err(|e| AdminError::parse(path, e))
    }

    /// Run a reload on request; failure is an error here
    ///
    /// # Errors
    /// Returns `Reload` if the command fails, times out or cannot start
    pub fn reload(&self, subsystem: Subsystem) -> AdminResult<ReloadResult> {
        let result = self.reloader.reload(subsystem);
        match result.to_error(self.reloader.timeout()) {
            Some(err) => Err(err.into()),
            None => Ok(result),
        }
    }

    /// Parse every managed file and report what was found
    #[must_use]
    pub fn check(&self) -> Vec<FileCheck> {
        ManagedFile::ALL
            .into_iter()
            .map(|file| {
                let path = file.path(&self.settings).to_path_buf();
                let mut report = FileCheck {
                    file,
                    path: path.clone(),
                    exists: path.is_file(),
                    lines: None,
                    stanzas: None,
                    sha256: None,
                    error: None,
                };
                if !report.exists {
                    return report;
                }
                match fs::read_to_string(&path) {
                    Err(e) => report.error = Some(e.to_string()),
                    Ok(text) => {
                        report.sha256 = Some(sha256_hex(text.as_bytes()));
                        match ConfigDocument::parse(&text) {
                            Ok(doc) => {
                                report.lines = Some(doc.len());
                                report.stanzas = Some(doc.stanzas().len());
                            }
                            Err(e) => report.error = Some(e.to_string()),
                        }
                    }
                }
                report
            })
            .collect()
    }

    /// Snapshots of a managed file, oldest first
    ///
    /// # Errors
    /// Returns `Io` if the directory cannot be read
    pub fn backups(&self, file: ManagedFile) -> AdminResult<Vec<BackupRecord>> {
        Ok(self.backups.list(file.path(&self.settings))?)
    }

    /// Delete all but the newest `retain` snapshots of a managed file
    ///
    /// # Errors
    /// Returns `Io` if listing or deleting fails
    pub fn prune_backups(&self, file: ManagedFile, retain: usize) -> AdminResult<Vec<PathBuf>> {
        Ok(self.backups.prune(file.path(&self.settings), retain)?)
    }

    /// Put a snapshot back in place of the managed file it was taken from.
    /// The current content is snapshotted first, so a restore can be undone.
    ///
    /// # Errors
    /// Returns `Validation` if the snapshot does not belong to a managed file
    /// or does not parse, `Io` if reading or committing fails
    pub fn restore_backup(&self, backup_path: &Path, reload: bool) -> AdminResult<OperationOutcome> {
        let record = self.backups.load(backup_path)?;
        let file = ManagedFile::ALL
            .into_iter()
            .find(|f| same_file(f.path(&self.settings), &record.source_file))
            .ok_or_else(|| {
                AdminError::Validation(format!(
                    "{} is not a snapshot of a managed file",
                    backup_path.display()
                ))
            })?;

        let content = fs::read_to_string(&record.backup_path)
            .map_err(|e| AdminError::io(&record.backup_path, &e))?;
        let restored = ConfigDocument::parse(&content).map_err(|e| {
            AdminError::Validation(format!(
                "snapshot {} does not parse: {e}",
                record.backup_path.display()
            ))
        })?;

        let mutation = Mutation {
            operation: OperationType::Restore,
            kind: EntityKind::File,
            name: file.to_string(),
            file,
            reloads: if reload { vec![file.subsystem()] } else { Vec::new() },
            dry_run: false,
        };
        self.mutate(mutation, |_| Ok(restored))
    }

    /// Lock, read, plan, snapshot, commit, unlock, reload.
    ///
    /// `plan` receives the freshly parsed document and returns the desired
    /// one; returning an error aborts with the file untouched.
    pub(crate) fn mutate<F>(&self, mutation: Mutation, plan: F) -> AdminResult<OperationOutcome>
    where
        F: FnOnce(ConfigDocument) -> AdminResult<ConfigDocument>,
    {
        let id = Uuid::new_v4();
        let span = info_span!(
            "mutation",
            %id,
            operation = %mutation.operation,
            kind = %mutation.kind,
            name = %mutation.name
        );
        let _entered = span.enter();

        let path = mutation.file.path(&self.settings).to_path_buf();
        let mut outcome = OperationOutcome {
            id,
            operation: mutation.operation,
            kind: mutation.kind,
            name: mutation.name.clone(),
            state: OperationState::Validating,
            files_modified: Vec::new(),
            backup: None,
            reloads: Vec::new(),
            diff: None,
            warnings: Vec::new(),
            finished_at: Utc::now(),
        };

        {
            let file_lock = lock::for_path(&path);
            let _guard = file_lock.lock();

            let original = fs::read_to_string(&path).map_err(|e| AdminError::io(&path, &e))?;
            let doc = ConfigDocument::parse(&original).map_err(|e| AdminError::parse(&path, e))?;
            let updated = plan(doc)?.serialize();

            if updated == original {
                info!(state = ?OperationState::Unchanged, "nothing to write");
                outcome.state = OperationState::Unchanged;
                outcome.finished_at = Utc::now();
                return Ok(outcome);
            }

            outcome.diff = Some(diff::unified(&path, &original, &updated));
            if mutation.dry_run {
                info!(state = ?OperationState::Planned, "dry run, not writing");
                outcome.state = OperationState::Planned;
                outcome.finished_at = Utc::now();
                return Ok(outcome);
            }

            outcome.state = OperationState::PendingWrite;
            info!(state = ?outcome.state, file = %path.display(), "taking snapshot");
            let record = self.backups.snapshot(&path)?;

            if let Err(commit_err) = self.committer.commit(&path, &updated) {
                error!(error = %commit_err, "commit failed");
                self.recover(&path, &record);
                return Err(commit_err.into());
            }

            outcome.state = OperationState::Written;
            outcome.files_modified.push(path.clone());
            info!(state = ?outcome.state, backup = %record.backup_path.display(), "committed");

            match self.backups.enforce_retention(&path) {
                Ok(pruned) if !pruned.is_empty() => {
                    info!(count = pruned.len(), "pruned old snapshots");
                }
                Ok(_) => {}
                Err(e) => outcome.warnings.push(format!("snapshot pruning failed: {e}")),
            }
            outcome.backup = Some(record);
        }

        if mutation.reloads.is_empty() {
            outcome.finished_at = Utc::now();
            return Ok(outcome);
        }

        outcome.state = OperationState::ReloadTriggered;
        let mut confirmed = true;
        for subsystem in mutation.reloads {
            let result = self.reloader.reload(subsystem);
            if let Some(err) = result.to_error(self.reloader.timeout()) {
                warn!(%subsystem, error = %err, "reload not confirmed; configuration stays written");
                outcome.warnings.push(err.to_string());
                confirmed = false;
            }
            outcome.reloads.push(result);
        }
        outcome.state = if confirmed {
            OperationState::ReloadConfirmed
        } else {
            OperationState::ReloadUncertain
        };
        info!(state = ?outcome.state, "mutation finished");
        outcome.finished_at = Utc::now();
        Ok(outcome)
    }

    /// Put the snapshot back if the failed commit changed the target
    fn recover(&self, path: &Path, record: &BackupRecord) {
        let current = fs::read(path).map(|bytes| sha256_hex(&bytes)).ok();
        if current.as_deref() == Some(record.sha256.as_str()) {
            return;
        }
        match self.backups.restore(record, &self.committer) {
            Ok(()) => warn!(file = %path.display(), "target restored from snapshot"),
            Err(e) => error!(
                file = %path.display(),
                backup = %record.backup_path.display(),
                error = %e,
                "could not restore target from snapshot"
            ),
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Apply a patch, mapping planner failures
pub(crate) fn apply(doc: &ConfigDocument, patch: &Patch) -> AdminResult<ConfigDocument> {
    Ok(patch.apply(doc)?)
}

/// Last stanza named `name` with `role`, or `NotFound` for `kind`
pub(crate) fn require_stanza(
    doc: &ConfigDocument,
    name: &str,
    role: Option<StanzaRole>,
    kind: &str,
) -> AdminResult<SectionStanza> {
    locate::find_one(doc, name, role).ok_or_else(|| AdminError::not_found(kind, name))
}

/// Set `key` in the last stanza `name`/`role`, re-locating against `doc`
pub(crate) fn set_value(
    doc: ConfigDocument,
    name: &str,
    role: Option<StanzaRole>,
    key: &str,
    value: &str,
    separator: &'static str,
) -> AdminResult<ConfigDocument> {
    let stanza = require_stanza(&doc, name, role, role.map_or("stanza", |r| r.as_str()))?;
    let patch = MutationPlanner::new(&doc)
        .with_separator(separator)
        .set_directive(&stanza, key, value)?;
    if patch.is_empty() {
        return Ok(doc);
    }
    apply(&doc, &patch)
}

/// Comment or uncomment `key` in the last stanza `name`/`role`
pub(crate) fn toggle_value(
    doc: ConfigDocument,
    name: &str,
    role: Option<StanzaRole>,
    key: &str,
    commented: bool,
) -> AdminResult<ConfigDocument> {
    let stanza = require_stanza(&doc, name, role, role.map_or("stanza", |r| r.as_str()))?;
    let patch = MutationPlanner::new(&doc).toggle_directive_comment(&stanza, key, commented)?;
    if patch.is_empty() {
        return Ok(doc);
    }
    apply(&doc, &patch)
}

/// Asterisk-style boolean
pub(crate) fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "y" | "t" | "1" | "on" => Some(true),
        "no" | "false" | "n" | "f" | "0" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn flag(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn registry(dir: &TempDir, script: &str) -> EntityRegistry {
        let mut settings = AdminSettings::for_directory(dir.path());
        settings.reload.commands = BTreeMap::from([(
            Subsystem::Endpoints,
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
        )]);
        EntityRegistry::new(settings)
    }

    fn mutation(dry_run: bool) -> Mutation {
        Mutation {
            operation: OperationType::Update,
            kind: EntityKind::Extension,
            name: "1000".into(),
            file: ManagedFile::Pjsip,
            reloads: vec![Subsystem::Endpoints],
            dry_run,
        }
    }

    fn bump_context(doc: ConfigDocument) -> AdminResult<ConfigDocument> {
        set_value(doc, "1000", Some(StanzaRole::Endpoint), "context", "office", "=")
    }

    const PJSIP: &str = "[1000]\ntype=endpoint\ncontext=from-internal\n";

    #[test]
    fn test_mutate_writes_snapshots_and_reloads() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pjsip.conf"), PJSIP).unwrap();
        let registry = registry(&dir, "echo reloaded");

        let outcome = registry.mutate(mutation(false), bump_context).unwrap();

        assert_eq!(outcome.state, OperationState::ReloadConfirmed);
        assert_eq!(
            fs::read_to_string(dir.path().join("pjsip.conf")).unwrap(),
            "[1000]\ntype=endpoint\ncontext=office\n"
        );
        let backup = outcome.backup.unwrap();
        assert_eq!(fs::read_to_string(&backup.backup_path).unwrap(), PJSIP);
        assert!(outcome.diff.unwrap().contains("+context=office"));
        assert_eq!(outcome.reloads.len(), 1);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pjsip.conf"), PJSIP).unwrap();
        let registry = registry(&dir, "echo reloaded");

        let outcome = registry.mutate(mutation(true), bump_context).unwrap();

        assert_eq!(outcome.state, OperationState::Planned);
        assert!(outcome.diff.is_some());
        assert!(outcome.reloads.is_empty());
        assert_eq!(fs::read_to_string(dir.path().join("pjsip.conf")).unwrap(), PJSIP);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_unchanged_skips_write_and_reload() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pjsip.conf"), PJSIP).unwrap();
        let registry = registry(&dir, "echo reloaded");

        let outcome = registry.mutate(mutation(false), Ok).unwrap();
        assert_eq!(outcome.state, OperationState::Unchanged);
        assert!(outcome.backup.is_none());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_failed_reload_keeps_write() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pjsip.conf"), PJSIP).unwrap();
        let registry = registry(&dir, "echo 'Unable to connect to remote asterisk'");

        let outcome = registry.mutate(mutation(false), bump_context).unwrap();
        assert_eq!(outcome.state, OperationState::ReloadUncertain);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(fs::read_to_string(dir.path().join("pjsip.conf"))
            .unwrap()
            .contains("context=office"));
    }

    #[test]
    fn test_parse_error_aborts() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pjsip.conf"), "type=endpoint\n").unwrap();
        let registry = registry(&dir, "echo reloaded");

        let err = registry.mutate(mutation(false), bump_context).unwrap_err();
        assert_eq!(err.code(), "PARSE_ERROR");
    }

    #[test]
    fn test_check_reports_each_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pjsip.conf"), PJSIP).unwrap();
        fs::write(dir.path().join("features.conf"), "orphan=1\n").unwrap();
        let reports = registry(&dir, "true").check();

        assert_eq!(reports.len(), 3);
        assert!(reports[0].ok());
        assert_eq!(reports[0].stanzas, Some(1));
        assert!(!reports[1].exists);
        assert!(reports[2].error.is_some());
    }

    #[test]
    fn test_restore_backup_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pjsip.conf");
        fs::write(&path, PJSIP).unwrap();
        let registry = registry(&dir, "echo reloaded");

        let outcome = registry.mutate(mutation(false), bump_context).unwrap();
        let backup = outcome.backup.unwrap();

        let restored = registry.restore_backup(&backup.backup_path, false).unwrap();
        assert_eq!(restored.state, OperationState::Written);
        assert_eq!(fs::read_to_string(&path).unwrap(), PJSIP);
        assert_eq!(registry.backups(ManagedFile::Pjsip).unwrap().len(), 2);
    }

    #[test]
    fn test_explicit_reload_failure_is_error() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir, "echo 'No such command'");
        let err = registry.reload(Subsystem::Endpoints).unwrap_err();
        assert_eq!(err.http_status(), 502);
        assert!(registry.reload(Subsystem::Voicemail).is_err());
    }

    #[test]
    fn test_flags() {
        assert_eq!(parse_flag("Yes"), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
        assert_eq!(flag(true), "yes");
    }
}

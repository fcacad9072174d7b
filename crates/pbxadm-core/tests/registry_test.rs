//! Entity registry tests
//!
//! End-to-end mutations against real files in a temp directory: exact
//! name matching, atomic commit, locking, and reload decoupling.

use pbxadm_core::entity::{ExtensionUpdate, NewExtension, NewMailbox};
use pbxadm_core::util::sha256_hex;
use pbxadm_core::{
    AdminSettings, BackupManager, EntityRegistry, ManagedFile, OperationState, Subsystem,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Barrier;
use std::thread;
use tempfile::TempDir;

const PJSIP: &str = "\
; Internal phones
[transport-udp]
type=transport
protocol=udp
bind=0.0.0.0

[100]
type=endpoint
context=from-internal
auth=100
aors=100

[100]
type=auth
auth_type=userpass
username=100
password=hundred

[100]
type=aor
max_contacts=1

[1000]
type=endpoint
context=from-internal
auth=1000
aors=1000

[1000]
type=auth
auth_type=userpass
username=1000
password=thousand

[1000]
type=aor
max_contacts=1

[1001]
type=endpoint
context=from-internal
auth=1001
aors=1001

[1001]
type=auth
auth_type=userpass
username=1001
password=other

[1001]
type=aor
max_contacts=1
";

fn sh(script: &str) -> Vec<String> {
    vec!["sh".into(), "-c".into(), script.into()]
}

fn settings_with_reload(dir: &Path, script: &str) -> AdminSettings {
    let mut settings = AdminSettings::for_directory(dir);
    settings.reload.commands = Subsystem::ALL
        .iter()
        .map(|s| (*s, sh(script)))
        .collect::<BTreeMap<_, _>>();
    settings
}

fn setup() -> (TempDir, EntityRegistry) {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("pjsip.conf"), PJSIP).unwrap();
    fs::write(dir.path().join("voicemail.conf"), "[general]\nformat=wav\n").unwrap();
    fs::write(dir.path().join("features.conf"), "[featuremap]\n").unwrap();
    let settings = settings_with_reload(dir.path(), "echo 'Module reloaded'");
    (dir, EntityRegistry::new(settings))
}

fn pjsip(dir: &TempDir) -> String {
    fs::read_to_string(dir.path().join("pjsip.conf")).unwrap()
}

// =============================================================================
// Exact name matching
// =============================================================================

#[test]
fn test_update_touches_only_exact_name() {
    let (dir, registry) = setup();
    let update = ExtensionUpdate {
        secret: Some("changed".into()),
        ..Default::default()
    };
    registry.extensions().update("100", &update).unwrap();

    let text = pjsip(&dir);
    assert_eq!(text, PJSIP.replace("password=hundred", "password=changed"));
    assert!(text.contains("password=thousand"));
    assert!(text.contains("password=other"));
}

#[test]
fn test_delete_removes_three_stanzas_and_keeps_spacing() {
    let (dir, registry) = setup();
    let outcome = registry.extensions().delete("1000").unwrap();
    assert_eq!(outcome.state, OperationState::ReloadConfirmed);

    let block = "\
[1000]
type=endpoint
context=from-internal
auth=1000
aors=1000

[1000]
type=auth
auth_type=userpass
username=1000
password=thousand

[1000]
type=aor
max_contacts=1

";
    assert_eq!(pjsip(&dir), PJSIP.replace(block, ""));
    assert!(registry.extensions().read("100").unwrap().complete);
    assert!(registry.extensions().read("1001").unwrap().complete);
    assert_eq!(
        registry.extensions().read("1000").unwrap_err().code(),
        "NOT_FOUND"
    );
}

#[test]
fn test_prefix_name_is_not_found() {
    let (dir, registry) = setup();
    assert_eq!(registry.extensions().delete("10").unwrap_err().code(), "NOT_FOUND");
    assert_eq!(registry.extensions().delete("10001").unwrap_err().code(), "NOT_FOUND");
    assert_eq!(pjsip(&dir), PJSIP);
}

// =============================================================================
// Atomic commit
// =============================================================================

#[test]
fn test_failed_commit_leaves_original_intact() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pjsip.conf");
    fs::write(&path, PJSIP).unwrap();
    let before = sha256_hex(PJSIP.as_bytes());

    let mut settings = settings_with_reload(dir.path(), "echo ok");
    settings.ownership.user = Some("pbxadm-no-such-user-7f3a".into());
    let registry = EntityRegistry::new(settings);

    let err = registry
        .extensions()
        .create(&NewExtension::new("2000", "secret"))
        .unwrap_err();
    assert_eq!(err.code(), "IO_ERROR");

    assert_eq!(sha256_hex(&fs::read(&path).unwrap()), before);
    let backups = BackupManager::new().list(&path).unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].sha256, before);

    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_every_write_is_preceded_by_a_snapshot() {
    let (dir, registry) = setup();
    registry
        .extensions()
        .create(&NewExtension::new("2000", "secret"))
        .unwrap();
    let outcome = registry.extensions().delete("2000").unwrap();

    let backups = registry.backups(ManagedFile::Pjsip).unwrap();
    assert_eq!(backups.len(), 2);
    assert_eq!(backups[0].sha256, sha256_hex(PJSIP.as_bytes()));
    assert_eq!(outcome.backup.unwrap().backup_path, backups[1].backup_path);
    assert_eq!(pjsip(&dir), PJSIP);
}

#[test]
fn test_dry_run_writes_nothing() {
    let (dir, registry) = setup();
    let outcome = registry
        .extensions()
        .dry_run(true)
        .delete("1000")
        .unwrap();
    assert_eq!(outcome.state, OperationState::Planned);
    let diff = outcome.diff.unwrap();
    assert!(diff.contains("-password=thousand"));
    assert_eq!(pjsip(&dir), PJSIP);
    assert!(registry.backups(ManagedFile::Pjsip).unwrap().is_empty());
}

// =============================================================================
// Locking
// =============================================================================

#[test]
fn test_concurrent_create_yields_one_conflict() {
    let (dir, registry) = setup();
    let barrier = Barrier::new(4);
    let spec = NewExtension::new("3000", "secret");

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    registry.extensions().create(&spec)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let created = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| r.as_ref().is_err_and(|e| e.code() == "CONFLICT"))
        .count();
    assert_eq!(created, 1);
    assert_eq!(conflicts, 3);
    assert_eq!(pjsip(&dir).matches("[3000]").count(), 3);
}

#[test]
fn test_concurrent_distinct_creates_all_land() {
    let (dir, registry) = setup();
    let barrier = Barrier::new(3);
    let numbers = ["4000", "4001", "4002"];

    thread::scope(|scope| {
        for number in numbers {
            let barrier = &barrier;
            let registry = &registry;
            scope.spawn(move || {
                barrier.wait();
                registry
                    .extensions()
                    .create(&NewExtension::new(number, "secret"))
                    .unwrap();
            });
        }
    });

    let text = pjsip(&dir);
    for number in numbers {
        assert_eq!(text.matches(&format!("[{number}]")).count(), 3);
    }
    assert!(text.starts_with(PJSIP));
}

// =============================================================================
// Reload decoupling
// =============================================================================

#[test]
fn test_failed_reload_keeps_configuration() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("pjsip.conf"), PJSIP).unwrap();
    let settings = settings_with_reload(
        dir.path(),
        "echo 'Unable to connect to remote asterisk (does /var/run/asterisk/asterisk.ctl exist?)'",
    );
    let registry = EntityRegistry::new(settings);

    let outcome = registry
        .extensions()
        .create(&NewExtension::new("2000", "secret"))
        .unwrap();
    assert_eq!(outcome.state, OperationState::ReloadUncertain);
    assert!(!outcome.reloads[0].success);
    assert!(!outcome.warnings.is_empty());
    assert!(registry.extensions().read("2000").is_ok());
}

#[test]
fn test_reload_timeout_is_uncertain() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("pjsip.conf"), PJSIP).unwrap();
    let mut settings = settings_with_reload(dir.path(), "sleep 5");
    settings.reload.timeout_secs = 1;
    let registry = EntityRegistry::new(settings);

    let outcome = registry.extensions().delete("1001").unwrap();
    assert_eq!(outcome.state, OperationState::ReloadUncertain);
    assert!(outcome.reloads[0].timed_out);
    assert!(!pjsip(&dir).contains("[1001]"));
}

#[test]
fn test_exit_code_alone_does_not_fail_reload() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("pjsip.conf"), PJSIP).unwrap();
    let settings = settings_with_reload(dir.path(), "echo 'Module reloaded'; exit 3");
    let registry = EntityRegistry::new(settings);

    let outcome = registry.extensions().delete("1001").unwrap();
    assert_eq!(outcome.state, OperationState::ReloadConfirmed);
    assert_eq!(outcome.reloads[0].exit_code, Some(3));
}

// =============================================================================
// Idempotence
// =============================================================================

#[test]
fn test_repeated_toggle_is_unchanged() {
    let (_dir, registry) = setup();
    registry.features().enable("parkcall").unwrap();
    let before = fs::read_to_string(registry.settings().files.features.clone()).unwrap();

    let again = registry.features().enable("parkcall").unwrap();
    assert_eq!(again.state, OperationState::Unchanged);
    assert!(again.backup.is_none());
    assert!(again.reloads.is_empty());
    assert_eq!(
        fs::read_to_string(&registry.settings().files.features).unwrap(),
        before
    );
}

#[test]
fn test_mailbox_requires_extension() {
    let (dir, registry) = setup();
    let err = registry
        .voicemail()
        .create(&NewMailbox::new("5000", "1234", "Nobody"))
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");

    registry
        .voicemail()
        .create(&NewMailbox::new("1000", "1234", "Thousand"))
        .unwrap();
    let text = fs::read_to_string(dir.path().join("voicemail.conf")).unwrap();
    assert_eq!(
        text,
        "[general]\nformat=wav\n\n[default]\n1000 => 1234,Thousand\n"
    );
}

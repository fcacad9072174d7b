//! Snapshot CLI commands
//!
//! Handles: pbxadm backup list/restore/prune

use clap::Subcommand;
use std::path::PathBuf;

use pbxadm_core::{EntityRegistry, ManagedFile};

use super::Output;

/// Snapshot commands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// List snapshots, oldest first
    List {
        /// Only this file (pjsip, voicemail, features)
        #[arg(long)]
        file: Option<ManagedFile>,
    },
    /// Put a snapshot back in place
    Restore {
        /// Snapshot path
        path: PathBuf,
        /// Skip the subsystem reload
        #[arg(long)]
        no_reload: bool,
    },
    /// Delete old snapshots
    Prune {
        /// File whose snapshots to prune (pjsip, voicemail, features)
        file: ManagedFile,
        /// Snapshots to keep
        #[arg(long, default_value_t = 10)]
        keep: usize,
    },
}

/// Execute snapshot command
pub fn execute(cmd: BackupCommands, registry: &EntityRegistry, output: &Output) -> anyhow::Result<()> {
    match cmd {
        BackupCommands::List { file } => {
            let files = file.map_or_else(|| ManagedFile::ALL.to_vec(), |f| vec![f]);
            let mut records = Vec::new();
            for file in files {
                records.extend(registry.backups(file)?);
            }
            output.data(&format!("{} snapshot(s)", records.len()), &records, || {
                if records.is_empty() {
                    println!("No snapshots found.");
                }
                for record in &records {
                    println!(
                        "  {}  {:>8} bytes  {}",
                        record.created_at.format("%Y-%m-%d %H:%M:%S"),
                        record.size,
                        record.backup_path.display()
                    );
                }
            })
        }
        BackupCommands::Restore { path, no_reload } => {
            if output.dry_run() {
                anyhow::bail!("restore does not support --dry-run");
            }
            output.outcome(&registry.restore_backup(&path, !no_reload)?)
        }
        BackupCommands::Prune { file, keep } => {
            if output.dry_run() {
                anyhow::bail!("prune does not support --dry-run");
            }
            let removed = registry.prune_backups(file, keep)?;
            output.data(&format!("Removed {} snapshot(s)", removed.len()), &removed, || {
                println!("Removed {} snapshot(s) of {file}", removed.len());
                for path in &removed {
                    println!("  {}", path.display());
                }
            })
        }
    }
}

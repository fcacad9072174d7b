//! pbxadm CLI - administer Asterisk configuration files
//!
//! Provides `pbxadm extension`, `pbxadm trunk`, `pbxadm voicemail`,
//! `pbxadm feature`, `pbxadm callerid`, `pbxadm backup`, `pbxadm reload`
//! and `pbxadm check`.

mod commands;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use pbxadm_core::{AdminSettings, EntityRegistry, Subsystem};

use commands::backup::BackupCommands;
use commands::callerid::CallerIdCommands;
use commands::extension::ExtensionCommands;
use commands::feature::FeatureCommands;
use commands::trunk::TrunkCommands;
use commands::voicemail::VoicemailCommands;
use commands::{Output, Reported};

#[derive(Parser)]
#[command(name = "pbxadm")]
#[command(about = "pbxadm - Asterisk PBX configuration administration")]
#[command(version)]
struct Cli {
    /// Settings file (default: $PBXADM_CONFIG, /etc/pbxadm/config.toml, user config dir)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output as a JSON envelope
    #[arg(long, global = true)]
    json: bool,

    /// Preview changes without applying
    #[arg(long, global = true)]
    dry_run: bool,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage extensions (endpoint, auth and aor)
    Extension {
        #[command(subcommand)]
        action: ExtensionCommands,
    },
    /// Manage SIP trunks
    Trunk {
        #[command(subcommand)]
        action: TrunkCommands,
    },
    /// Manage voicemail boxes
    Voicemail {
        #[command(subcommand)]
        action: VoicemailCommands,
    },
    /// Manage feature codes
    Feature {
        #[command(subcommand)]
        action: FeatureCommands,
    },
    /// Manage caller ID policy of an endpoint
    Callerid {
        #[command(subcommand)]
        action: CallerIdCommands,
    },
    /// Manage configuration snapshots
    Backup {
        #[command(subcommand)]
        action: BackupCommands,
    },
    /// Reload an Asterisk subsystem
    Reload {
        /// endpoints, registrations, voicemail, features or dialplan
        subsystem: String,
    },
    /// Parse every managed file and report problems
    Check,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output = Output::new(cli.json, cli.dry_run);
    if let Err(e) = run(cli.command, cli.config.as_deref(), &output) {
        if !e.is::<Reported>() {
            output.failure(&e);
        }
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(command: Commands, config: Option<&Path>, output: &Output) -> anyhow::Result<()> {
    let (settings, source) = AdminSettings::discover(config)?;
    match &source {
        Some(path) => debug!(path = %path.display(), "settings loaded"),
        None => debug!("no settings file, using defaults"),
    }
    let registry = EntityRegistry::new(settings);

    match command {
        Commands::Extension { action } => commands::extension::execute(action, &registry, output),
        Commands::Trunk { action } => commands::trunk::execute(action, &registry, output),
        Commands::Voicemail { action } => commands::voicemail::execute(action, &registry, output),
        Commands::Feature { action } => commands::feature::execute(action, &registry, output),
        Commands::Callerid { action } => commands::callerid::execute(action, &registry, output),
        Commands::Backup { action } => commands::backup::execute(action, &registry, output),
        Commands::Reload { subsystem } => run_reload(&subsystem, &registry, output),
        Commands::Check => run_check(&registry, output),
    }
}

fn run_reload(subsystem: &str, registry: &EntityRegistry, output: &Output) -> anyhow::Result<()> {
    let subsystem: Subsystem = subsystem.parse().map_err(anyhow::Error::msg)?;
    let result = registry.reload(subsystem)?;
    output.data(&format!("Reloaded {subsystem}"), &result, || {
        println!("Reloaded {subsystem}");
        let text = result.raw_output.trim();
        if !text.is_empty() {
            println!("{text}");
        }
    })
}

fn run_check(registry: &EntityRegistry, output: &Output) -> anyhow::Result<()> {
    let reports = registry.check();
    let failed = reports.iter().filter(|r| !r.ok()).count();
    let message = format!("{} file(s) checked, {failed} with problems", reports.len());

    output.report(failed == 0, &message, &reports, || {
        for report in &reports {
            let status = match (&report.error, report.exists) {
                (Some(err), _) => format!("error: {err}"),
                (None, false) => "missing".to_string(),
                (None, true) => format!(
                    "ok ({} lines, {} stanzas)",
                    report.lines.unwrap_or_default(),
                    report.stanzas.unwrap_or_default()
                ),
            };
            println!("{:<10} {}  {status}", report.file, report.path.display());
        }
    })
}

//! CLI command handlers
//!
//! This module contains handlers for the various CLI subcommands.
//! Each entity kind (extension, trunk, voicemail, feature, caller ID) has
//! its own module; snapshots live in `backup`.

pub mod backup;
pub mod callerid;
pub mod extension;
pub mod feature;
pub mod trunk;
pub mod voicemail;

use serde::Serialize;
use std::fmt;

use pbxadm_core::{AdminError, Envelope, OperationOutcome, OperationState};

/// Error already written to the terminal; only the exit status is left
#[derive(Debug)]
pub struct Reported;

impl fmt::Display for Reported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failure already reported")
    }
}

impl std::error::Error for Reported {}

/// Output mode shared by every command
pub struct Output {
    json: bool,
    dry_run: bool,
}

impl Output {
    pub fn new(json: bool, dry_run: bool) -> Self {
        Self { json, dry_run }
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Print the result of a mutation
    pub fn outcome(&self, outcome: &OperationOutcome) -> anyhow::Result<()> {
        if self.json {
            let envelope =
                Envelope::ok(outcome.message(), outcome).with_warnings(outcome.warnings.clone());
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            return Ok(());
        }

        println!("{}", outcome.message());
        if outcome.state == OperationState::Planned {
            if let Some(diff) = &outcome.diff {
                print!("{diff}");
            }
        }
        if let Some(backup) = &outcome.backup {
            println!("Backup created: {}", backup.backup_path.display());
        }
        for warning in &outcome.warnings {
            eprintln!("Warning: {warning}");
        }
        Ok(())
    }

    /// Print read-only data: the envelope in JSON mode, else `human()`
    pub fn data<T: Serialize>(
        &self,
        message: &str,
        data: &T,
        human: impl FnOnce(),
    ) -> anyhow::Result<()> {
        self.report(true, message, data, human)
    }

    /// Like [`Output::data`], but a failed report exits non-zero
    pub fn report<T: Serialize>(
        &self,
        success: bool,
        message: &str,
        data: &T,
        human: impl FnOnce(),
    ) -> anyhow::Result<()> {
        if self.json {
            let mut envelope = Envelope::ok(message, data);
            envelope.success = success;
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        } else {
            human();
            if !success {
                eprintln!("Error: {message}");
            }
        }

        if success {
            Ok(())
        } else {
            Err(Reported.into())
        }
    }

    /// Print a failure; core errors keep their code in JSON mode
    pub fn failure(&self, err: &anyhow::Error) {
        if !self.json {
            eprintln!("Error: {err:#}");
            return;
        }

        let envelope = match err.downcast_ref::<AdminError>() {
            Some(admin) => Envelope::error(admin),
            None => Envelope {
                success: false,
                message: format!("{err:#}"),
                data: None,
                warnings: Vec::new(),
                code: Some("INVALID_ARGUMENT"),
                status: Some(400),
            },
        };
        match serde_json::to_string_pretty(&envelope) {
            Ok(text) => println!("{text}"),
            Err(_) => eprintln!("Error: {err:#}"),
        }
    }
}

/// `yes`/`no` for flags in human output
pub fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

//! Engine reload dispatch
//!
//! Each subsystem maps to one external command. The command runs with a
//! deadline; its combined stdout and stderr are matched case-insensitively
//! against the configured failure patterns. A spawn failure or a timeout
//! is a failure too. The exit status is recorded but the text decides,
//! because the engine's remote console exits 0 even when a command fails.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::process::Stdio;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::settings::ReloadSettings;

const OUTPUT_GRACE: Duration = Duration::from_millis(500);

/// Engine subsystem that can be told to re-read its configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    Endpoints,
    Registrations,
    Voicemail,
    Features,
    Dialplan,
}

impl Subsystem {
    pub const ALL: [Subsystem; 5] = [
        Self::Endpoints,
        Self::Registrations,
        Self::Voicemail,
        Self::Features,
        Self::Dialplan,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Endpoints => "endpoints",
            Self::Registrations => "registrations",
            Self::Voicemail => "voicemail",
            Self::Features => "features",
            Self::Dialplan => "dialplan",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subsystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|sub| sub.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown subsystem '{s}'"))
    }
}

/// Why a reload did not confirm
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReloadError {
    #[error("Reload of {subsystem} reported failure: {output}")]
    Failed { subsystem: Subsystem, output: String },

    #[error("Reload of {subsystem} timed out after {seconds}s")]
    TimedOut { subsystem: Subsystem, seconds: u64 },

    #[error("Reload command for {subsystem} could not be started: {message}")]
    Spawn { subsystem: Subsystem, message: String },

    #[error("No reload command configured for {0}")]
    NotConfigured(Subsystem),
}

/// Outcome of one reload command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadResult {
    pub subsystem: Subsystem,
    /// Argv that was run
    pub command: Vec<String>,
    /// Combined stdout and stderr
    pub raw_output: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReloadResult {
    /// The failure as an error value, if the reload did not confirm
    #[must_use]
    pub fn to_error(&self, timeout: Duration) -> Option<ReloadError> {
        if self.success {
            return None;
        }
        Some(if self.timed_out {
            ReloadError::TimedOut {
                subsystem: self.subsystem,
                seconds: timeout.as_secs(),
            }
        } else if self.command.is_empty() {
            ReloadError::NotConfigured(self.subsystem)
        } else if let Some(message) = &self.error {
            ReloadError::Spawn {
                subsystem: self.subsystem,
                message: message.clone(),
            }
        } else {
            ReloadError::Failed {
                subsystem: self.subsystem,
                output: self.raw_output.trim().to_string(),
            }
        })
    }
}

/// Runs reload commands
#[derive(Debug, Clone)]
pub struct ReloadDispatcher {
    commands: BTreeMap<Subsystem, Vec<String>>,
    failure_patterns: Vec<String>,
    timeout: Duration,
}

impl ReloadDispatcher {
    #[must_use]
    pub fn new(
        commands: BTreeMap<Subsystem, Vec<String>>,
        failure_patterns: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            commands,
            failure_patterns: failure_patterns
                .into_iter()
                .map(|p| p.to_lowercase())
                .collect(),
            timeout,
        }
    }

    #[must_use]
    pub fn from_settings(settings: &ReloadSettings) -> Self {
        Self::new(
            settings.commands.clone(),
            settings.failure_patterns.clone(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the reload command for `subsystem`; never returns an error, the
    /// result says whether the engine confirmed
    #[must_use]
    pub fn reload(&self, subsystem: Subsystem) -> ReloadResult {
        let command = self.commands.get(&subsystem).cloned().unwrap_or_default();
        let Some((program, args)) = command.split_first() else {
            warn!(%subsystem, "no reload command configured");
            return ReloadResult {
                subsystem,
                command,
                raw_output: String::new(),
                success: false,
                exit_code: None,
                timed_out: false,
                error: Some(format!("no reload command configured for {subsystem}")),
            };
        };

        info!(%subsystem, command = ?command, "triggering reload");
        let run = run_with_deadline(program, args, self.timeout);

        let result = match run {
            Err(message) => ReloadResult {
                subsystem,
                command,
                raw_output: String::new(),
                success: false,
                exit_code: None,
                timed_out: false,
                error: Some(message),
            },
            Ok(run) => {
                let success = !run.timed_out && !self.matches_failure(&run.output);
                ReloadResult {
                    subsystem,
                    command,
                    raw_output: run.output,
                    success,
                    exit_code: run.exit_code,
                    timed_out: run.timed_out,
                    error: None,
                }
            }
        };

        info!(
            %subsystem,
            success = result.success,
            exit_code = ?result.exit_code,
            timed_out = result.timed_out,
            output = %result.raw_output.trim(),
            "reload finished"
        );
        if result.success && result.exit_code.is_some_and(|c| c != 0) {
            warn!(%subsystem, exit_code = ?result.exit_code, "reload exited non-zero without a failure pattern");
        }
        result
    }

    /// Whether `output` contains any failure pattern
    #[must_use]
    pub fn matches_failure(&self, output: &str) -> bool {
        let lowered = output.to_lowercase();
        self.failure_patterns
            .iter()
            .any(|p| !p.is_empty() && lowered.contains(p.as_str()))
    }
}

struct CommandRun {
    output: String,
    exit_code: Option<i32>,
    timed_out: bool,
}

/// Blocking entry point; must not be called from inside an async runtime
fn run_with_deadline(program: &str, args: &[String], timeout: Duration) -> Result<CommandRun, String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to start reload runtime: {e}"))?;
    // dropping the runtime cancels readers still held up by a surviving grandchild
    runtime.block_on(run_command(program, args, timeout))
}

async fn run_command(program: &str, args: &[String], timeout: Duration) -> Result<CommandRun, String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("failed to run '{program}': {e}"))?;

    let buffer = Arc::new(Mutex::new(Vec::<u8>::new()));
    let readers: Vec<JoinHandle<()>> = [
        child.stdout.take().map(|out| tokio::spawn(pump(out, Arc::clone(&buffer)))),
        child.stderr.take().map(|err| tokio::spawn(pump(err, Arc::clone(&buffer)))),
    ]
    .into_iter()
    .flatten()
    .collect();

    let (status, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => (Some(status), false),
        Ok(Err(e)) => return Err(format!("failed to wait for '{program}': {e}")),
        Err(_) => {
            if let Err(e) = child.kill().await {
                debug!(error = %e, "kill after timeout failed");
            }
            (None, true)
        }
    };

    let grace = Instant::now() + OUTPUT_GRACE;
    for reader in readers {
        if tokio::time::timeout_at(grace, reader).await.is_err() {
            debug!(program, "output pipe still open after exit");
            break;
        }
    }

    let output = String::from_utf8_lossy(&buffer.lock()).into_owned();
    Ok(CommandRun {
        output,
        exit_code: status.and_then(|s| s.code()),
        timed_out,
    })
}

async fn pump<R: AsyncRead + Unpin>(mut source: R, buffer: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 4096];
    loop {
        match source.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buffer.lock().extend_from_slice(&chunk[..n]),
        }
    }
}

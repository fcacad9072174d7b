//! Administrative settings
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no
//! file at all) yields a working setup for a stock engine install.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::commit::FileOwnership;
use crate::error::{AdminError, AdminResult};
use crate::reload::Subsystem;

/// Environment variable naming a settings file
pub const CONFIG_ENV: &str = "PBXADM_CONFIG";
const SYSTEM_CONFIG: &str = "/etc/pbxadm/config.toml";

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminSettings {
    pub files: FileSettings,
    pub markers: MarkerSettings,
    pub voicemail: VoicemailSettings,
    pub ownership: FileOwnership,
    pub backup: BackupSettings,
    pub reload: ReloadSettings,
}

/// Locations of the managed configuration files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    pub pjsip: PathBuf,
    pub voicemail: PathBuf,
    pub features: PathBuf,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self::in_dir(Path::new("/etc/asterisk"))
    }
}

impl FileSettings {
    /// Stock file names inside `dir`
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            pjsip: dir.join("pjsip.conf"),
            voicemail: dir.join("voicemail.conf"),
            features: dir.join("features.conf"),
        }
    }
}

/// Sentinel comment lines new stanzas are inserted above
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerSettings {
    pub extensions: Option<String>,
    pub trunks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoicemailSettings {
    /// Stanza holding the mailboxes
    pub context: String,
    /// Exact number of digits in a PIN
    pub pin_length: usize,
}

impl Default for VoicemailSettings {
    fn default() -> Self {
        Self {
            context: "default".to_string(),
            pin_length: 4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Snapshots kept per file; all are kept when unset
    pub retain: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadSettings {
    pub timeout_secs: u64,
    /// Case-insensitive substrings that mark a reload as failed
    pub failure_patterns: Vec<String>,
    /// Argv per subsystem
    pub commands: BTreeMap<Subsystem, Vec<String>>,
}

impl Default for ReloadSettings {
    fn default() -> Self {
        let console = |command: &str| {
            vec![
                "asterisk".to_string(),
                "-rx".to_string(),
                command.to_string(),
            ]
        };
        let commands = BTreeMap::from([
            (Subsystem::Endpoints, console("pjsip reload")),
            (Subsystem::Registrations, console("pjsip send register *all")),
            (Subsystem::Voicemail, console("voicemail reload")),
            (Subsystem::Features, console("module reload features")),
            (Subsystem::Dialplan, console("dialplan reload")),
        ]);
        Self {
            timeout_secs: 10,
            failure_patterns: [
                "unable to connect",
                "no such command",
                "command not found",
                "permission denied",
                "failed",
                "error",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            commands,
        }
    }
}

impl AdminSettings {
    /// Defaults with the managed files placed in `dir`
    #[must_use]
    pub fn for_directory(dir: &Path) -> Self {
        Self {
            files: FileSettings::in_dir(dir),
            ..Self::default()
        }
    }

    /// Parse and validate TOML text
    ///
    /// # Errors
    /// Returns `Settings` if the text is not valid TOML or fails validation
    pub fn from_toml_str(text: &str) -> AdminResult<Self> {
        let settings: Self =
            toml::from_str(text).map_err(|e| AdminError::Settings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load a settings file; relative file paths resolve against its directory
    ///
    /// # Errors
    /// Returns `Settings` if the file is unreadable or invalid
    pub fn load(path: &Path) -> AdminResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| AdminError::Settings(format!("{}: {e}", path.display())))?;
        let mut settings = Self::from_toml_str(&text)
            .map_err(|e| AdminError::Settings(format!("{}: {e}", path.display())))?;

        if let Some(base) = path.parent() {
            for file in [
                &mut settings.files.pjsip,
                &mut settings.files.voicemail,
                &mut settings.files.features,
            ] {
                if file.is_relative() {
                    *file = base.join(&*file);
                }
            }
        }
        debug!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    /// Find and load settings: `explicit`, then `PBXADM_CONFIG`, then the
    /// system file, then the user config dir, else defaults. Returns the file
    /// used, if any.
    ///
    /// # Errors
    /// Returns `Settings` if a named file is missing or any found file is invalid
    pub fn discover(explicit: Option<&Path>) -> AdminResult<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            let path = PathBuf::from(path);
            return Ok((Self::load(&path)?, Some(path)));
        }

        let candidates = std::iter::once(PathBuf::from(SYSTEM_CONFIG))
            .chain(dirs::config_dir().map(|d| d.join("pbxadm").join("config.toml")));
        for candidate in candidates {
            if candidate.is_file() {
                return Ok((Self::load(&candidate)?, Some(candidate)));
            }
        }

        debug!("no settings file found, using defaults");
        Ok((Self::default(), None))
    }

    /// Check values that the type system does not
    ///
    /// # Errors
    /// Returns `Settings` describing the first problem found
    pub fn validate(&self) -> AdminResult<()> {
        if self.voicemail.pin_length == 0 || self.voicemail.pin_length > 16 {
            return Err(AdminError::Settings(format!(
                "voicemail.pin_length must be between 1 and 16, got {}",
                self.voicemail.pin_length
            )));
        }
        let context = &self.voicemail.context;
        if context.is_empty()
            || context
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '[' | ']' | ';'))
        {
            return Err(AdminError::Settings(format!(
                "invalid voicemail.context '{context}'"
            )));
        }
        if self.reload.timeout_secs == 0 {
            return Err(AdminError::Settings(
                "reload.timeout_secs must be positive".to_string(),
            ));
        }
        if let Some((subsystem, _)) = self.reload.commands.iter().find(|(_, argv)| argv.is_empty()) {
            return Err(AdminError::Settings(format!(
                "reload.commands.{subsystem} is empty"
            )));
        }
        self.ownership.mode_bits().map_err(AdminError::Settings)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let settings = AdminSettings::from_toml_str("").unwrap();
        assert_eq!(settings, AdminSettings::default());
        assert_eq!(settings.voicemail.pin_length, 4);
        assert_eq!(settings.files.pjsip, PathBuf::from("/etc/asterisk/pjsip.conf"));
        assert_eq!(
            settings.reload.commands[&Subsystem::Endpoints],
            vec!["asterisk", "-rx", "pjsip reload"]
        );
    }

    #[test]
    fn test_partial_override() {
        let text = r#"
[voicemail]
pin_length = 6

[ownership]
user = "asterisk"
mode = "640"

[reload]
timeout_secs = 3

[reload.commands]
endpoints = ["sh", "-c", "echo ok"]
"#;
        let settings = AdminSettings::from_toml_str(text).unwrap();
        assert_eq!(settings.voicemail.pin_length, 6);
        assert_eq!(settings.voicemail.context, "default");
        assert_eq!(settings.ownership.user.as_deref(), Some("asterisk"));
        assert_eq!(settings.reload.timeout_secs, 3);
        assert_eq!(settings.reload.commands.len(), 1);
        assert!(!settings.reload.failure_patterns.is_empty());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(AdminSettings::from_toml_str("[voicemail]\npin_length = 0\n").is_err());
        assert!(AdminSettings::from_toml_str("[reload]\ntimeout_secs = 0\n").is_err());
        assert!(AdminSettings::from_toml_str("[ownership]\nmode = \"rwx\"\n").is_err());
        assert!(AdminSettings::from_toml_str("[reload.commands]\nsip = [\"x\"]\n").is_err());
        assert!(AdminSettings::from_toml_str("files = 3").is_err());
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[files]\npjsip = \"conf/pjsip.conf\"\n").unwrap();

        let settings = AdminSettings::load(&path).unwrap();
        assert_eq!(settings.files.pjsip, dir.path().join("conf/pjsip.conf"));
        assert_eq!(settings.files.voicemail, PathBuf::from("/etc/asterisk/voicemail.conf"));
    }

    #[test]
    fn test_discover_explicit_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let err = AdminSettings::discover(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert_eq!(err.code(), "SETTINGS_ERROR");
    }
}

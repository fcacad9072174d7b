//! Feature codes in the `[featuremap]` stanza of `features.conf`

use serde::{Deserialize, Serialize};

use super::{
    apply, set_value, toggle_value, EntityKind, EntityRegistry, ManagedFile, Mutation,
    OperationOutcome, OperationType,
};
use crate::document::ConfigDocument;
use crate::error::{AdminError, AdminResult};
use crate::locate;
use crate::plan::{InsertionPoint, MutationPlanner, NewStanza};
use crate::reload::Subsystem;

const STANZA: &str = "featuremap";
const SEPARATOR: &str = " => ";

/// Features that can be managed, with their stock codes
pub const KNOWN_FEATURES: [(&str, &str); 6] = [
    ("blindxfer", "#1"),
    ("disconnect", "*0"),
    ("automon", "*1"),
    ("atxfer", "*2"),
    ("automixmon", "*3"),
    ("parkcall", "#72"),
];

/// State of one known feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureCode {
    pub name: String,
    /// Configured code, active or commented out
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub default_code: String,
    pub enabled: bool,
}

/// Feature code operations against `features.conf`
pub struct FeatureOps<'a> {
    registry: &'a EntityRegistry,
    dry_run: bool,
}

impl<'a> FeatureOps<'a> {
    pub(crate) fn new(registry: &'a EntityRegistry) -> Self {
        Self {
            registry,
            dry_run: false,
        }
    }

    /// Plan and diff only
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Every known feature
    ///
    /// # Errors
    /// `Parse`/`Io` from the file
    pub fn list(&self) -> AdminResult<Vec<FeatureCode>> {
        let doc = self.registry.document(ManagedFile::Features)?;
        Ok(KNOWN_FEATURES
            .iter()
            .map(|(name, default)| state(&doc, name, default))
            .collect())
    }

    /// # Errors
    /// `Validation` for an unknown feature
    pub fn read(&self, name: &str) -> AdminResult<FeatureCode> {
        let default = default_code(name)?;
        let doc = self.registry.document(ManagedFile::Features)?;
        Ok(state(&doc, name, default))
    }

    /// Set the code and make sure the feature is enabled
    ///
    /// # Errors
    /// `Validation` for an unknown feature or malformed code
    pub fn set_code(&self, name: &str, code: &str) -> AdminResult<OperationOutcome> {
        default_code(name)?;
        validate_code(code)?;
        self.registry
            .mutate(self.mutation(OperationType::Update, name), |doc| {
                write_code(doc, name, code)
            })
    }

    /// Uncomment the feature, or add it with its stock code if absent
    ///
    /// # Errors
    /// `Validation` for an unknown feature
    pub fn enable(&self, name: &str) -> AdminResult<OperationOutcome> {
        let default = default_code(name)?;
        self.registry
            .mutate(self.mutation(OperationType::Enable, name), |doc| {
                let present = locate::find_one(&doc, STANZA, None)
                    .is_some_and(|s| s.last_directive_any(name).is_some());
                if present {
                    toggle_value(doc, STANZA, None, name, false)
                } else {
                    write_code(doc, name, default)
                }
            })
    }

    /// Comment the feature out; absent features are already disabled
    ///
    /// # Errors
    /// `Validation` for an unknown feature
    pub fn disable(&self, name: &str) -> AdminResult<OperationOutcome> {
        default_code(name)?;
        self.registry
            .mutate(self.mutation(OperationType::Disable, name), |doc| {
                let present = locate::find_one(&doc, STANZA, None)
                    .is_some_and(|s| s.last_directive_any(name).is_some());
                if present {
                    toggle_value(doc, STANZA, None, name, true)
                } else {
                    Ok(doc)
                }
            })
    }

    /// Restore the stock code, enabled
    ///
    /// # Errors
    /// `Validation` for an unknown feature
    pub fn reset(&self, name: &str) -> AdminResult<OperationOutcome> {
        let default = default_code(name)?;
        self.registry
            .mutate(self.mutation(OperationType::Reset, name), |doc| {
                write_code(doc, name, default)
            })
    }

    fn mutation(&self, operation: OperationType, name: &str) -> Mutation {
        Mutation {
            operation,
            kind: EntityKind::Feature,
            name: name.to_string(),
            file: ManagedFile::Features,
            reloads: vec![Subsystem::Features],
            dry_run: self.dry_run,
        }
    }
}

fn default_code(name: &str) -> AdminResult<&'static str> {
    KNOWN_FEATURES
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, code)| *code)
        .ok_or_else(|| {
            let names: Vec<&str> = KNOWN_FEATURES.iter().map(|(n, _)| *n).collect();
            AdminError::Validation(format!(
                "unknown feature '{name}' (known: {})",
                names.join(", ")
            ))
        })
}

fn validate_code(code: &str) -> AdminResult<()> {
    if (1..=8).contains(&code.len())
        && code.chars().all(|c| c.is_ascii_digit() || c == '*' || c == '#')
    {
        Ok(())
    } else {
        Err(AdminError::Validation(format!(
            "feature code must be 1-8 characters of digits, '*' and '#', got '{code}'"
        )))
    }
}

fn state(doc: &ConfigDocument, name: &str, default: &str) -> FeatureCode {
    let directive = locate::find_one(doc, STANZA, None).and_then(|stanza| {
        stanza
            .last_directive(name)
            .or_else(|| stanza.last_directive_any(name))
            .cloned()
    });
    FeatureCode {
        name: name.to_string(),
        code: directive.as_ref().map(|d| d.value.clone()),
        default_code: default.to_string(),
        enabled: directive.is_some_and(|d| !d.commented),
    }
}

/// Enable `name` if it is commented out, then set its code; creates the
/// stanza when the file has none
fn write_code(doc: ConfigDocument, name: &str, code: &str) -> AdminResult<ConfigDocument> {
    let Some(stanza) = locate::find_one(&doc, STANZA, None) else {
        let patch = MutationPlanner::new(&doc)
            .with_separator(SEPARATOR)
            .append_entity(&[NewStanza::new(STANZA).with(name, code)], &InsertionPoint::EndOfFile)?;
        return apply(&doc, &patch);
    };

    let doc = match stanza.last_directive_any(name) {
        Some(d) if d.commented && stanza.last_directive(name).is_none() => {
            toggle_value(doc, STANZA, None, name, false)?
        }
        _ => doc,
    };
    set_value(doc, STANZA, None, name, code, SEPARATOR)
}

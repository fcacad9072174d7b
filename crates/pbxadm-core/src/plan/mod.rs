//! Mutation planning
//!
//! The planner turns a requested change into a [`Patch`]: line-range
//! replacements relative to the document it was given. It never touches
//! lines outside the ranges it computes, so everything else in the file
//! survives byte for byte.

mod patch;

pub use patch::{LineEdit, Patch};

use thiserror::Error;
use tracing::warn;

use crate::document::{ConfigDocument, ParseError, SectionStanza};
use crate::locate;

/// Comment written above a directive that was switched off.
/// The directive key follows after a single space.
pub const DISABLED_NOTE: &str = "; disabled by pbxadm:";

/// Errors during patch planning
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("No stanza named '{0}'")]
    StanzaNotFound(String),

    #[error("No '{key}' directive in [{stanza}]")]
    DirectiveNotFound { stanza: String, key: String },

    #[error("{0}")]
    InvalidValue(String),

    #[error("Overlapping or out-of-range edit {start}..{end}")]
    Overlap { start: usize, end: usize },

    #[error("Patched document does not parse: {0}")]
    Result(ParseError),
}

/// Where new stanzas go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertionPoint {
    EndOfFile,
    /// Directly above the comment line whose trimmed text equals the marker;
    /// end of file when the marker is absent
    BeforeMarker(String),
}

impl From<Option<&String>> for InsertionPoint {
    fn from(marker: Option<&String>) -> Self {
        marker.map_or(Self::EndOfFile, |m| Self::BeforeMarker(m.clone()))
    }
}

/// A stanza to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStanza {
    pub name: String,
    pub directives: Vec<(String, String)>,
}

impl NewStanza {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            directives: Vec::new(),
        }
    }

    /// Add a directive
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.directives.push((key.into(), value.into()));
        self
    }

    fn render(&self, separator: &str) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.directives.len() + 1);
        lines.push(format!("[{}]", self.name));
        for (key, value) in &self.directives {
            lines.push(format!("{key}{separator}{value}"));
        }
        lines
    }

    fn check(&self) -> Result<(), PlanError> {
        if self.name.is_empty()
            || self
                .name
                .chars()
                .any(|c| matches!(c, '[' | ']' | ';' | '\n' | '\r') || c.is_whitespace())
        {
            return Err(PlanError::InvalidValue(format!(
                "invalid section name '{}'",
                self.name
            )));
        }
        for (key, value) in &self.directives {
            check_directive(key, value)?;
        }
        Ok(())
    }
}

/// Reject keys and values that would change the shape of the file
///
/// # Errors
/// Returns an error for line breaks, `;` (inline comment start), unbalanced
/// quotes or a key with characters outside `[A-Za-z0-9_.-/+*#]`.
pub fn check_directive(key: &str, value: &str) -> Result<(), PlanError> {
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '+' | '*' | '#'))
    {
        return Err(PlanError::InvalidValue(format!("invalid directive key '{key}'")));
    }
    if value.contains(['\n', '\r']) {
        return Err(PlanError::InvalidValue(format!(
            "value for '{key}' must not contain line breaks"
        )));
    }
    if value.contains(';') {
        return Err(PlanError::InvalidValue(format!(
            "value for '{key}' must not contain ';'"
        )));
    }
    if value.matches('"').count() % 2 != 0 {
        return Err(PlanError::InvalidValue(format!(
            "value for '{key}' has an unbalanced quote"
        )));
    }
    Ok(())
}

/// Builds patches against one document
pub struct MutationPlanner<'a> {
    doc: &'a ConfigDocument,
    separator: &'static str,
}

impl<'a> MutationPlanner<'a> {
    #[must_use]
    pub fn new(doc: &'a ConfigDocument) -> Self {
        Self {
            doc,
            separator: "=",
        }
    }

    /// Separator for new stanzas, and for new directives in a stanza that
    /// has no active directive to copy the style from
    #[must_use]
    pub fn with_separator(mut self, separator: &'static str) -> Self {
        self.separator = separator;
        self
    }

    /// Insert whole stanzas, separated from their surroundings by blank lines
    ///
    /// # Errors
    /// Returns an error if a stanza name or directive is malformed
    pub fn append_entity(
        &self,
        stanzas: &[NewStanza],
        at: &InsertionPoint,
    ) -> Result<Patch, PlanError> {
        for stanza in stanzas {
            stanza.check()?;
        }

        let position = match at {
            InsertionPoint::EndOfFile => self.doc.len(),
            InsertionPoint::BeforeMarker(marker) => self.marker_line(marker).unwrap_or_else(|| {
                warn!(marker = %marker, "insertion marker not found, appending at end of file");
                self.doc.len()
            }),
        };

        let mut lines = Vec::new();
        if !patch::blank_before(self.doc, position) {
            lines.push(String::new());
        }
        for (i, stanza) in stanzas.iter().enumerate() {
            if i > 0 {
                lines.push(String::new());
            }
            lines.extend(stanza.render(self.separator));
        }
        if position < self.doc.len() {
            lines.push(String::new());
        }

        let mut patch = Patch::new();
        patch.push(LineEdit::insert(position, lines));
        Ok(patch)
    }

    /// Remove every stanza named `name`
    ///
    /// # Errors
    /// Returns an error if no stanza has that name
    pub fn remove_entity(&self, name: &str) -> Result<Patch, PlanError> {
        let stanzas = locate::find(self.doc, name, None);
        if stanzas.is_empty() {
            return Err(PlanError::StanzaNotFound(name.to_string()));
        }

        let mut ranges: Vec<(usize, usize)> = Vec::with_capacity(stanzas.len());
        for stanza in &stanzas {
            let (first, last) = stanza.removal_range();
            match ranges.last_mut() {
                Some(previous) if previous.1 + 1 == first => previous.1 = last,
                _ => ranges.push((first, last)),
            }
        }

        // A block removed from the end of the file takes the blank
        // separator lines above it along
        let lines = self.doc.lines();
        if let Some(tail) = ranges.last_mut() {
            if tail.1 + 1 == lines.len() {
                while tail.0 > 0 && lines[tail.0 - 1].is_blank() {
                    tail.0 -= 1;
                }
            }
        }

        let mut patch = Patch::new();
        for (first, last) in ranges {
            patch.push(LineEdit::remove(first, last));
        }
        Ok(patch)
    }

    /// Replace the last active `key` in the stanza, or insert it
    ///
    /// # Errors
    /// Returns an error if the key or value is malformed
    pub fn set_directive(
        &self,
        stanza: &SectionStanza,
        key: &str,
        value: &str,
    ) -> Result<Patch, PlanError> {
        check_directive(key, value)?;

        let mut patch = Patch::new();
        match stanza.last_directive(key) {
            Some(existing) if existing.value == value => {}
            Some(existing) => patch.push(LineEdit::replace(existing.line, existing.with_value(value))),
            None => patch.push(LineEdit::insert(
                stanza.insertion_line(),
                vec![format!("{key}{}{value}", self.separator_for(stanza))],
            )),
        }
        Ok(patch)
    }

    /// Insert `key` after the stanza's last directive, keeping existing ones
    ///
    /// # Errors
    /// Returns an error if the key or value is malformed
    pub fn append_directive(
        &self,
        stanza: &SectionStanza,
        key: &str,
        value: &str,
    ) -> Result<Patch, PlanError> {
        check_directive(key, value)?;

        let mut patch = Patch::new();
        patch.push(LineEdit::insert(
            stanza.insertion_line(),
            vec![format!("{key}{}{value}", self.separator_for(stanza))],
        ));
        Ok(patch)
    }

    /// Delete the last active `key`
    ///
    /// # Errors
    /// Returns an error if the stanza has no active `key`
    pub fn remove_directive(&self, stanza: &SectionStanza, key: &str) -> Result<Patch, PlanError> {
        let existing = stanza
            .last_directive(key)
            .ok_or_else(|| PlanError::DirectiveNotFound {
                stanza: stanza.name.clone(),
                key: key.to_string(),
            })?;

        let mut patch = Patch::new();
        patch.push(LineEdit::remove(existing.line, existing.line));
        Ok(patch)
    }

    /// Comment out the last active `key` line, or restore the last `;key`
    /// line when the stanza has no active one.
    ///
    /// Disabling writes [`DISABLED_NOTE`] above the line; enabling removes
    /// that note again, so disable followed by enable restores the original
    /// text exactly. Requesting the current state yields an empty patch.
    ///
    /// # Errors
    /// Returns an error if the stanza has no such line in either state
    pub fn toggle_directive_comment(
        &self,
        stanza: &SectionStanza,
        key: &str,
        commented: bool,
    ) -> Result<Patch, PlanError> {
        let not_found = || PlanError::DirectiveNotFound {
            stanza: stanza.name.clone(),
            key: key.to_string(),
        };
        let active = stanza.last_directive(key);
        let mut patch = Patch::new();
        // the active line decides the state; commented copies only count
        // when no active line exists
        let target = match (active, commented) {
            (Some(active), true) => active,
            (Some(_), false) => return Ok(patch),
            (None, true) => {
                stanza.last_directive_any(key).ok_or_else(not_found)?;
                return Ok(patch);
            }
            (None, false) => stanza.last_directive_any(key).ok_or_else(not_found)?,
        };

        let raw = &target.raw_line;
        let indent = &raw[..raw.len() - raw.trim_start().len()];
        let body = raw.trim_start();
        let note = format!("{DISABLED_NOTE} {key}");

        if commented {
            patch.push(LineEdit {
                start: target.line,
                end: target.line + 1,
                replacement: vec![format!("{indent}{note}"), format!("{indent};{body}")],
            });
        } else {
            let restored = format!("{indent}{}", body.trim_start_matches(';').trim_start());
            let has_note = target.line > stanza.header_line + 1
                && self.doc.lines()[target.line - 1].text.trim() == note;
            let start = if has_note { target.line - 1 } else { target.line };
            patch.push(LineEdit {
                start,
                end: target.line + 1,
                replacement: vec![restored],
            });
        }
        Ok(patch)
    }

    fn separator_for<'s>(&self, stanza: &'s SectionStanza) -> &'s str {
        stanza.separator_style().unwrap_or(self.separator)
    }

    fn marker_line(&self, marker: &str) -> Option<usize> {
        self.doc
            .lines()
            .iter()
            .position(|l| !l.is_blank() && l.text.trim() == marker.trim())
    }
}

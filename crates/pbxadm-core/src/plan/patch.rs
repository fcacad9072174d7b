//! Line-range patches

use serde::Serialize;

use super::PlanError;
use crate::document::ConfigDocument;

/// Replace lines `start..end` (exclusive) with `replacement`.
/// `start == end` is a pure insertion before line `start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineEdit {
    pub start: usize,
    pub end: usize,
    pub replacement: Vec<String>,
}

impl LineEdit {
    #[must_use]
    pub fn insert(at: usize, lines: Vec<String>) -> Self {
        Self {
            start: at,
            end: at,
            replacement: lines,
        }
    }

    #[must_use]
    pub fn replace(line: usize, text: String) -> Self {
        Self {
            start: line,
            end: line + 1,
            replacement: vec![text],
        }
    }

    /// Remove an inclusive line range
    #[must_use]
    pub fn remove(first: usize, last: usize) -> Self {
        Self {
            start: first,
            end: last + 1,
            replacement: Vec::new(),
        }
    }
}

/// Ordered edits, all relative to the same document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Patch {
    edits: Vec<LineEdit>,
}

impl Patch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, edit: LineEdit) {
        self.edits.push(edit);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    #[must_use]
    pub fn edits(&self) -> &[LineEdit] {
        &self.edits
    }

    /// Apply to `doc`, producing a re-parsed document.
    ///
    /// Lines outside the edited ranges are copied verbatim, terminators
    /// included. Inserted lines use the document's preferred line ending.
    ///
    /// # Errors
    /// Returns an error if edits overlap or the result no longer parses.
    pub fn apply(&self, doc: &ConfigDocument) -> Result<ConfigDocument, PlanError> {
        let mut edits: Vec<&LineEdit> = self.edits.iter().collect();
        // stable: insertions at the same point keep their push order and
        // land before a replacement starting there
        edits.sort_by_key(|e| (e.start, e.end));

        let lines = doc.lines();
        let mut previous_end = 0;
        for edit in &edits {
            if edit.start < previous_end || edit.end > lines.len() || edit.start > edit.end {
                return Err(PlanError::Overlap {
                    start: edit.start,
                    end: edit.end,
                });
            }
            previous_end = edit.end;
        }

        let ending = doc.preferred_ending();
        let mut out = String::new();
        let mut cursor = 0;
        let mut strip_final_ending = false;

        for edit in edits {
            for line in &lines[cursor..edit.start] {
                out.push_str(&line.text);
                out.push_str(line.ending.as_str());
            }
            for text in &edit.replacement {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push_str(ending.as_str());
                }
                out.push_str(text);
                out.push_str(ending.as_str());
            }
            // Replacing an unterminated final line keeps it unterminated
            strip_final_ending = edit.end == lines.len()
                && edit.start < edit.end
                && !edit.replacement.is_empty()
                && !doc.ends_with_newline();
            cursor = edit.end;
        }
        for line in &lines[cursor..] {
            out.push_str(&line.text);
            out.push_str(line.ending.as_str());
            strip_final_ending = false;
        }

        if strip_final_ending {
            let trimmed = out.len() - ending.as_str().len();
            out.truncate(trimmed);
        }

        ConfigDocument::parse(&out).map_err(PlanError::Result)
    }
}

pub(crate) fn blank_before(doc: &ConfigDocument, at: usize) -> bool {
    at == 0 || doc.lines().get(at - 1).map_or(true, crate::document::Line::is_blank)
}

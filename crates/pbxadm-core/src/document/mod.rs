//! Section-based configuration documents
//!
//! A [`ConfigDocument`] is the ordered list of lines of one configuration
//! file, each classified as blank, comment, section header, directive or
//! include. Every line keeps its exact text and line ending so that
//! `ConfigDocument::parse(text)?.serialize() == text` for any well-formed
//! input. Stanzas are a derived view recomputed on demand.

mod line;
mod stanza;

pub use line::{DirectiveParts, Line, LineEnding, LineKind};
pub use stanza::{Directive, SectionStanza, StanzaRole};

use std::fmt;
use thiserror::Error;

/// Structural problem found while parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    /// 1-based line number
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(index: usize, message: impl Into<String>) -> Self {
        Self {
            line: index + 1,
            message: message.into(),
        }
    }
}

/// Parsed configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    lines: Vec<Line>,
}

impl ConfigDocument {
    /// Parse configuration text
    ///
    /// # Errors
    /// Returns an error for a directive outside any section, an unterminated
    /// quote, a malformed section header or a line that fits no known shape.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut lines = Vec::new();
        let mut in_section = false;

        for (index, piece) in text.split_inclusive('\n').enumerate() {
            let (content, ending) = if let Some(stripped) = piece.strip_suffix("\r\n") {
                (stripped, LineEnding::CrLf)
            } else if let Some(stripped) = piece.strip_suffix('\n') {
                (stripped, LineEnding::Lf)
            } else {
                (piece, LineEnding::None)
            };

            let kind = line::classify(content).map_err(|message| ParseError::new(index, message))?;
            match &kind {
                LineKind::SectionHeader { .. } => in_section = true,
                LineKind::Directive(parts) if !in_section => {
                    return Err(ParseError::new(
                        index,
                        format!("directive '{}' appears before any section header", parts.key),
                    ));
                }
                _ => {}
            }

            lines.push(Line {
                text: content.to_string(),
                ending,
                kind,
            });
        }

        Ok(Self { lines })
    }

    /// Serialize back to text
    #[must_use]
    pub fn serialize(&self) -> String {
        let mut out = String::with_capacity(self.lines.iter().map(|l| l.text.len() + 2).sum());
        for line in &self.lines {
            out.push_str(&line.text);
            out.push_str(line.ending.as_str());
        }
        out
    }

    /// All lines in file order
    #[must_use]
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line ending used for inserted lines: the first terminated line's, LF otherwise
    #[must_use]
    pub fn preferred_ending(&self) -> LineEnding {
        self.lines
            .iter()
            .map(|l| l.ending)
            .find(|e| *e != LineEnding::None)
            .unwrap_or(LineEnding::Lf)
    }

    /// Whether the final line is terminated (or the document is empty)
    #[must_use]
    pub fn ends_with_newline(&self) -> bool {
        self.lines.last().map_or(true, |l| l.ending != LineEnding::None)
    }

    /// Build the stanza view
    #[must_use]
    pub fn stanzas(&self) -> Vec<SectionStanza> {
        stanza::build(&self.lines)
    }
}

impl fmt::Display for ConfigDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "; pjsip.conf\n\
[global]\n\
type=global\n\
\n\
[1000]\n\
type=endpoint ; inline\n\
context = from-internal\n\
;callerid=\"Front Desk\" <1000>\n\
\n\
[1000](!)\n\
type=aor\n";

    #[test]
    fn test_round_trip_sample() {
        let doc = ConfigDocument::parse(SAMPLE).unwrap();
        assert_eq!(doc.serialize(), SAMPLE);
        assert_eq!(doc.len(), 11);
    }

    #[test]
    fn test_round_trip_crlf_and_missing_final_newline() {
        let text = "[a]\r\nkey=value\r\n\r\n[b]\r\nother => 1";
        let doc = ConfigDocument::parse(text).unwrap();
        assert_eq!(doc.serialize(), text);
        assert_eq!(doc.preferred_ending(), LineEnding::CrLf);
        assert!(!doc.ends_with_newline());
    }

    #[test]
    fn test_empty_document() {
        let doc = ConfigDocument::parse("").unwrap();
        assert!(doc.is_empty());
        assert_eq!(doc.serialize(), "");
        assert!(doc.ends_with_newline());
    }

    #[test]
    fn test_directive_before_header_is_rejected() {
        let err = ConfigDocument::parse("; header comment\nkey=value\n[a]\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("before any section header"));
    }

    #[test]
    fn test_unterminated_quote_is_rejected() {
        let err = ConfigDocument::parse("[a]\ncallerid=\"Alice <100>\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("unterminated quote"));
    }

    #[test]
    fn test_unclosed_header_is_rejected() {
        let err = ConfigDocument::parse("[general\n").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_garbage_line_is_rejected() {
        let err = ConfigDocument::parse("[a]\nthis is not a directive\n").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_include_allowed_anywhere() {
        let text = "#include extra.conf\n[a]\n#tryinclude more.conf\nk=v\n";
        let doc = ConfigDocument::parse(text).unwrap();
        assert_eq!(doc.lines()[0].kind, LineKind::Include);
        assert_eq!(doc.serialize(), text);
    }

    #[test]
    fn test_commented_quote_is_not_an_error() {
        let doc = ConfigDocument::parse("[a]\n; he said \"hi\n").unwrap();
        assert_eq!(doc.len(), 2);
    }
}

//! Stanza view over a document

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::line::{Line, LineKind};

/// Role of a stanza, taken from its `type=` directive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StanzaRole {
    Endpoint,
    Auth,
    Aor,
    Registration,
    Identify,
}

impl StanzaRole {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Endpoint => "endpoint",
            Self::Auth => "auth",
            Self::Aor => "aor",
            Self::Registration => "registration",
            Self::Identify => "identify",
        }
    }
}

impl fmt::Display for StanzaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StanzaRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "endpoint" => Ok(Self::Endpoint),
            "auth" => Ok(Self::Auth),
            "aor" => Ok(Self::Aor),
            "registration" => Ok(Self::Registration),
            "identify" => Ok(Self::Identify),
            other => Err(format!("unknown stanza type: {other}")),
        }
    }
}

/// A directive (active or commented out) inside a stanza
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Directive {
    pub key: String,
    pub value: String,
    pub raw_line: String,
    /// 0-based line index in the document
    pub line: usize,
    pub commented: bool,
    #[serde(skip)]
    pub(crate) separator: String,
    #[serde(skip)]
    pub(crate) value_start: usize,
    #[serde(skip)]
    pub(crate) value_end: usize,
}

impl Directive {
    /// Raw line with the value replaced, everything else kept
    #[must_use]
    pub fn with_value(&self, value: &str) -> String {
        format!(
            "{}{}{}",
            &self.raw_line[..self.value_start],
            value,
            &self.raw_line[self.value_end..]
        )
    }
}

/// A bracketed section and its lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionStanza {
    pub header_line: usize,
    pub name: String,
    /// Template options from `[name](options)`
    pub options: Option<String>,
    /// Value of the last active `type=` directive
    pub type_attribute: Option<String>,
    pub directives: Vec<Directive>,
    pub start_line: usize,
    /// Last line before the next header, or the last line of the file
    pub end_line: usize,
    /// Last line to delete when removing this stanza; trailing comment
    /// lines (and anything after them) are left in place
    pub(crate) removal_end: usize,
}

impl SectionStanza {
    /// Role derived from `type=`
    #[must_use]
    pub fn role(&self) -> Option<StanzaRole> {
        self.type_attribute.as_deref().and_then(|t| t.parse().ok())
    }

    /// Whether this stanza is a template (`[name](!)`)
    #[must_use]
    pub fn is_template(&self) -> bool {
        self.options
            .as_deref()
            .is_some_and(|o| o.split(',').any(|opt| opt.trim() == "!"))
    }

    /// Last active occurrence of `key`; the one the engine honours
    #[must_use]
    pub fn last_directive(&self, key: &str) -> Option<&Directive> {
        self.directives
            .iter()
            .rev()
            .find(|d| !d.commented && d.key == key)
    }

    /// Last occurrence of `key`, active or commented
    #[must_use]
    pub fn last_directive_any(&self, key: &str) -> Option<&Directive> {
        self.directives.iter().rev().find(|d| d.key == key)
    }

    /// Effective value of `key`
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&str> {
        self.last_directive(key).map(|d| d.value.as_str())
    }

    /// Active directives in file order
    pub fn active(&self) -> impl Iterator<Item = &Directive> {
        self.directives.iter().filter(|d| !d.commented)
    }

    /// Line index where a new directive is inserted: after the last directive
    /// (active or commented), or directly after the header
    #[must_use]
    pub fn insertion_line(&self) -> usize {
        self.directives
            .last()
            .map_or(self.header_line + 1, |d| d.line + 1)
    }

    /// Separator of the last active directive, copied for new ones
    #[must_use]
    pub fn separator_style(&self) -> Option<&str> {
        self.active().last().map(|d| d.separator.as_str())
    }

    /// Inclusive line range removed by a delete
    #[must_use]
    pub fn removal_range(&self) -> (usize, usize) {
        (self.start_line, self.removal_end)
    }
}

pub(crate) fn build(lines: &[Line]) -> Vec<SectionStanza> {
    let headers: Vec<(usize, &String, &Option<String>)> = lines
        .iter()
        .enumerate()
        .filter_map(|(i, l)| match &l.kind {
            LineKind::SectionHeader { name, options } => Some((i, name, options)),
            _ => None,
        })
        .collect();

    let mut stanzas = Vec::with_capacity(headers.len());
    for (pos, &(header_line, name, options)) in headers.iter().enumerate() {
        let next_header = headers.get(pos + 1).map(|h| h.0);
        let end_line = next_header.map_or(lines.len() - 1, |n| n - 1);

        let mut directives = Vec::new();
        for (index, line) in lines.iter().enumerate().take(end_line + 1).skip(header_line + 1) {
            let (parts, commented) = match &line.kind {
                LineKind::Directive(parts) => (parts, false),
                LineKind::Comment {
                    directive: Some(parts),
                } => (parts, true),
                _ => continue,
            };
            directives.push(Directive {
                key: parts.key.clone(),
                value: parts.value.clone(),
                raw_line: line.text.clone(),
                line: index,
                commented,
                separator: parts.separator.clone(),
                value_start: parts.value_start,
                value_end: parts.value_end,
            });
        }

        // Trailing comments belong to whatever follows; the blank lines
        // directly after the last content line go with the stanza
        let mut removal_end = header_line;
        for index in (header_line + 1..=end_line).rev() {
            if !lines[index].is_blank() && !lines[index].is_plain_comment() {
                removal_end = index;
                break;
            }
        }
        while removal_end < end_line && lines[removal_end + 1].is_blank() {
            removal_end += 1;
        }

        let type_attribute = directives
            .iter()
            .rev()
            .find(|d| !d.commented && d.key == "type")
            .map(|d| d.value.clone());

        stanzas.push(SectionStanza {
            header_line,
            name: name.clone(),
            options: options.clone(),
            type_attribute,
            directives,
            start_line: header_line,
            end_line,
            removal_end,
        });
    }

    stanzas
}

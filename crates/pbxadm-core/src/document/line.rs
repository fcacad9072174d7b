//! Line classification

/// Line terminator as found in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
    /// Final line without a terminator
    None,
}

impl LineEnding {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
            Self::None => "",
        }
    }
}

/// A `key=value` (or `key => value`) split of one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveParts {
    pub key: String,
    /// Raw text between the key and the value, e.g. `=` or ` => `
    pub separator: String,
    pub value: String,
    /// Byte range of `value` inside the line text
    pub value_start: usize,
    pub value_end: usize,
}

/// Classification of one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    /// `;` comment; `directive` is set when the comment body is itself a directive
    Comment { directive: Option<DirectiveParts> },
    SectionHeader {
        name: String,
        /// Template options in `[name](options)`
        options: Option<String>,
    },
    Directive(DirectiveParts),
    /// `#include`, `#tryinclude` or `#exec`
    Include,
}

/// One line of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Text without the terminator
    pub text: String,
    pub ending: LineEnding,
    pub kind: LineKind,
}

impl Line {
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.kind == LineKind::Blank
    }

    #[must_use]
    pub fn is_header(&self) -> bool {
        matches!(self.kind, LineKind::SectionHeader { .. })
    }

    /// Plain comment that is not a commented-out directive
    #[must_use]
    pub fn is_plain_comment(&self) -> bool {
        matches!(self.kind, LineKind::Comment { directive: None })
    }
}

pub(crate) fn classify(text: &str) -> Result<LineKind, String> {
    let trimmed = text.trim_start();
    if trimmed.trim_end().is_empty() {
        return Ok(LineKind::Blank);
    }

    if let Some(body) = trimmed.strip_prefix(';') {
        let offset = text.len() - body.len();
        let directive = parse_directive(body, offset).ok().flatten();
        return Ok(LineKind::Comment { directive });
    }

    if trimmed.starts_with('[') {
        return parse_header(trimmed);
    }

    if ["#include", "#tryinclude", "#exec"]
        .iter()
        .any(|p| trimmed.starts_with(p))
    {
        return Ok(LineKind::Include);
    }

    match parse_directive(text, 0)? {
        Some(parts) => Ok(LineKind::Directive(parts)),
        None => Err(format!("unrecognized line '{}'", text.trim())),
    }
}

fn parse_header(trimmed: &str) -> Result<LineKind, String> {
    let close = trimmed
        .find(']')
        .ok_or_else(|| "unterminated section header".to_string())?;
    let name = trimmed[1..close].trim();
    if name.is_empty() {
        return Err("empty section name".into());
    }

    let mut rest = trimmed[close + 1..].trim_start();
    let mut options = None;
    if let Some(after) = rest.strip_prefix('(') {
        let end = after
            .find(')')
            .ok_or_else(|| format!("unterminated template options for [{name}]"))?;
        options = Some(after[..end].trim().to_string());
        rest = after[end + 1..].trim_start();
    }

    if !rest.is_empty() && !rest.starts_with(';') {
        return Err(format!("unexpected text after section header [{name}]"));
    }

    Ok(LineKind::SectionHeader {
        name: name.to_string(),
        options,
    })
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '+' | '*' | '#')
}

/// Parse `key=value` from `text`; `offset` is the position of `text` inside the full line.
///
/// `Ok(None)` means the text is not shaped like a directive at all.
fn parse_directive(text: &str, offset: usize) -> Result<Option<DirectiveParts>, String> {
    let Some(eq) = text.find('=') else {
        return Ok(None);
    };

    let key_region = &text[..eq];
    let key = key_region.trim();
    if key.is_empty() || !key.chars().all(is_key_char) {
        return Ok(None);
    }

    let key_end = key_region.trim_end().len();
    let mut sep_end = eq + 1;
    if text[sep_end..].starts_with('>') {
        sep_end += 1;
    }
    let value_start = sep_end + (text[sep_end..].len() - text[sep_end..].trim_start().len());

    let mut in_quotes = false;
    let mut escaped = false;
    let mut value_stop = text.len();
    for (i, c) in text[value_start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                value_stop = value_start + i;
                break;
            }
            _ => {}
        }
    }
    if in_quotes {
        return Err(format!("unterminated quote in value of '{key}'"));
    }

    let value = text[value_start..value_stop].trim_end();
    let value_end = value_start + value.len();

    Ok(Some(DirectiveParts {
        key: key.to_string(),
        separator: text[key_end..value_start].to_string(),
        value: value.to_string(),
        value_start: offset + value_start,
        value_end: offset + value_end,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directive(text: &str) -> DirectiveParts {
        match classify(text).unwrap() {
            LineKind::Directive(parts) => parts,
            other => panic!("expected directive, got {other:?}"),
        }
    }

    #[test]
    fn test_plain_directive() {
        let parts = directive("password=s3cret");
        assert_eq!(parts.key, "password");
        assert_eq!(parts.separator, "=");
        assert_eq!(parts.value, "s3cret");
        assert_eq!(&"password=s3cret"[parts.value_start..parts.value_end], "s3cret");
    }

    #[test]
    fn test_arrow_directive_with_inline_comment() {
        let line = "1001 => 1234,Alice,alice@example.com ; front desk";
        let parts = directive(line);
        assert_eq!(parts.key, "1001");
        assert_eq!(parts.separator, " => ");
        assert_eq!(parts.value, "1234,Alice,alice@example.com");
        assert_eq!(&line[parts.value_start..parts.value_end], parts.value);
    }

    #[test]
    fn test_quoted_semicolon_and_escape() {
        let parts = directive(r#"callerid="A; B" <100>"#);
        assert_eq!(parts.value, r#""A; B" <100>"#);

        let parts = directive(r"note=a\;b ; real comment");
        assert_eq!(parts.value, r"a\;b");
    }

    #[test]
    fn test_empty_value() {
        let parts = directive("from_user=");
        assert_eq!(parts.value, "");
        assert_eq!(parts.value_start, parts.value_end);
    }

    #[test]
    fn test_commented_directive() {
        let line = "  ;from_user=trunkuser";
        match classify(line).unwrap() {
            LineKind::Comment {
                directive: Some(parts),
            } => {
                assert_eq!(parts.key, "from_user");
                assert_eq!(&line[parts.value_start..parts.value_end], "trunkuser");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_prose_comment_is_plain() {
        assert_eq!(
            classify("; see the docs for foo=bar").unwrap(),
            LineKind::Comment { directive: None }
        );
        assert_eq!(
            classify("; disabled by pbxadm: from_user").unwrap(),
            LineKind::Comment { directive: None }
        );
    }

    #[test]
    fn test_header_with_options_and_comment() {
        assert_eq!(
            classify("[1001](endpoint-tpl) ; Alice").unwrap(),
            LineKind::SectionHeader {
                name: "1001".into(),
                options: Some("endpoint-tpl".into())
            }
        );
        assert!(classify("[1001] trailing").is_err());
        assert!(classify("[]").is_err());
    }

    #[test]
    fn test_blank_with_whitespace() {
        assert_eq!(classify("   \t").unwrap(), LineKind::Blank);
    }
}

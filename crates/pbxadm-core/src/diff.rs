//! Change previews

use similar::TextDiff;
use std::path::Path;

const CONTEXT_LINES: usize = 3;

/// Unified diff of `old` against `new`, headed with the file path.
/// Empty when the texts are identical.
#[must_use]
pub fn unified(path: &Path, old: &str, new: &str) -> String {
    if old == new {
        return String::new();
    }
    let label = path.display().to_string();
    let diff = TextDiff::from_lines(old, new);
    let mut output = diff
        .unified_diff()
        .context_radius(CONTEXT_LINES)
        .header(&format!("a/{}", label.trim_start_matches('/')), &format!("b/{}", label.trim_start_matches('/')))
        .to_string();
    if !output.ends_with('\n') {
        output.push('\n');
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_is_empty() {
        assert!(unified(Path::new("x.conf"), "[a]\n", "[a]\n").is_empty());
    }

    #[test]
    fn test_unified_headers_and_hunks() {
        let old = "[a]\nk=v\n";
        let new = "[a]\nk=w\n";
        let diff = unified(Path::new("/etc/asterisk/pjsip.conf"), old, new);
        assert!(diff.starts_with("--- a/etc/asterisk/pjsip.conf\n+++ b/etc/asterisk/pjsip.conf\n"));
        assert!(diff.contains("-k=v\n"));
        assert!(diff.contains("+k=w\n"));
        assert!(diff.contains(" [a]\n"));
    }
}

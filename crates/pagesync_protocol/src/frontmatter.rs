//! YAML frontmatter handling.
//!
//! Frontmatter is local-only metadata: the remote side never sees it, so it is
//! stripped before hashing or translating a document and re-attached whenever
//! remote content is written back to disk.

const OPENERS: [&str; 2] = ["---\n", "---\r\n"];

/// Splits a document into its frontmatter block (delimiters included) and body.
///
/// The block must start at the very beginning of the text with a `---` line
/// and end at a later `---` line, with at least one line in between. Both
/// `\n` and `\r\n` line endings are recognized.
pub fn split_frontmatter(text: &str) -> (Option<&str>, &str) {
    let Some(start) = OPENERS
        .iter()
        .find(|opener| text.starts_with(**opener))
        .map(|opener| opener.len())
    else {
        return (None, text);
    };
    let mut end = start;
    for (index, line) in text[start..].split_inclusive('\n').enumerate() {
        end += line.len();
        if index > 0 && line.ends_with('\n') && line.trim_end_matches(['\n', '\r']) == "---" {
            return (Some(&text[..end]), &text[end..]);
        }
    }
    (None, text)
}

/// Returns the document body with any frontmatter removed.
pub fn strip_frontmatter(text: &str) -> &str {
    split_frontmatter(text).1
}

/// Re-attaches a frontmatter block in front of a body.
pub fn attach_frontmatter(frontmatter: Option<&str>, body: &str) -> String {
    match frontmatter {
        Some(block) => format!("{block}\n{body}"),
        None => body.to_string(),
    }
}

//! Property-based test generators using proptest.
//!
//! Documents are built from short lowercase lines so that merges and block
//! translation see realistic, distinct content.

use pagesync_protocol::ConflictStrategy;
use proptest::prelude::*;

/// Strategy for one plain text line.
pub fn line_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9 ]{0,23}[a-z0-9]")
        .expect("Invalid regex")
}

/// Strategy for a list of distinct-ish lines.
pub fn lines_strategy(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(line_strategy(), 1..=max.max(1))
}

/// Strategy for a markdown document made of headings, paragraphs and
/// bullets, already in normalized form.
pub fn markdown_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        (0u8..3, line_strategy()).prop_map(|(kind, text)| match kind {
            0 => format!("# {text}"),
            1 => format!("- {text}"),
            _ => text,
        }),
        1..12,
    )
    .prop_map(|blocks| blocks.join("\n\n"))
}

/// Strategy for text with cosmetic noise: CRLF endings, trailing spaces and
/// runs of blank lines.
pub fn noisy_markdown_strategy() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(line_strategy(), 1..10),
        any::<bool>(),
        0usize..4,
        0usize..3,
    )
        .prop_map(|(lines, crlf, blanks, trailing)| {
            let newline = if crlf { "\r\n" } else { "\n" };
            let separator = format!("{}{}", " ".repeat(trailing), newline.repeat(blanks + 1));
            let mut text = lines.join(&separator);
            text.push_str(newline);
            text
        })
}

/// Strategy for a conflict strategy.
pub fn conflict_strategy_strategy() -> impl Strategy<Value = ConflictStrategy> {
    prop_oneof![
        Just(ConflictStrategy::ThreeWayMerge),
        Just(ConflictStrategy::LocalWins),
        Just(ConflictStrategy::RemoteWins),
        Just(ConflictStrategy::ConflictFile),
    ]
}

/// An edit applied to a list of lines.
#[derive(Debug, Clone)]
pub enum LineEdit {
    /// Replace the line at the index (modulo length).
    Replace(usize, String),
    /// Insert a line before the index (modulo length + 1).
    Insert(usize, String),
    /// Delete the line at the index (modulo length).
    Delete(usize),
}

impl LineEdit {
    /// Applies the edit in place.
    pub fn apply(&self, lines: &mut Vec<String>) {
        match self {
            LineEdit::Replace(i, text) if !lines.is_empty() => {
                let i = i % lines.len();
                lines[i] = text.clone();
            }
            LineEdit::Insert(i, text) => {
                let i = i % (lines.len() + 1);
                lines.insert(i, text.clone());
            }
            LineEdit::Delete(i) if !lines.is_empty() => {
                let i = i % lines.len();
                lines.remove(i);
            }
            _ => {}
        }
    }
}

/// Strategy for one line edit.
pub fn line_edit_strategy() -> impl Strategy<Value = LineEdit> {
    prop_oneof![
        (any::<usize>(), line_strategy()).prop_map(|(i, t)| LineEdit::Replace(i, t)),
        (any::<usize>(), line_strategy()).prop_map(|(i, t)| LineEdit::Insert(i, t)),
        any::<usize>().prop_map(LineEdit::Delete),
    ]
}

/// Strategy for a base document plus independent local and remote edit
/// scripts.
pub fn divergent_edits_strategy(
) -> impl Strategy<Value = (Vec<String>, Vec<LineEdit>, Vec<LineEdit>)> {
    (
        lines_strategy(12),
        prop::collection::vec(line_edit_strategy(), 0..4),
        prop::collection::vec(line_edit_strategy(), 0..4),
    )
}

/// Applies a list of edits to a copy of `base`.
pub fn apply_edits(base: &[String], edits: &[LineEdit]) -> Vec<String> {
    let mut lines = base.to_vec();
    for edit in edits {
        edit.apply(&mut lines);
    }
    lines
}

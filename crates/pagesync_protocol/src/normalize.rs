//! Markdown normalization and content hashing.
//!
//! Every hash comparison in the sync engine goes through [`content_hash`], so
//! cosmetic differences (line endings, trailing blanks, runs of empty lines)
//! never register as edits.

use sha2::{Digest, Sha256};

/// Normalizes markdown text.
///
/// - `\r\n` and lone `\r` become `\n`
/// - trailing spaces and tabs are stripped from every line
/// - runs of two or more empty lines collapse to one
/// - leading and trailing whitespace is trimmed
pub fn normalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(unified.len());
    let mut empty_run = 0usize;
    for (i, line) in unified.split('\n').enumerate() {
        let line = line.trim_end_matches([' ', '\t']);
        if line.is_empty() {
            empty_run += 1;
            if empty_run > 1 {
                continue;
            }
        } else {
            empty_run = 0;
        }
        if i > 0 {
            out.push('\n');
        }
        out.push_str(line);
    }

    out.trim().to_string()
}

/// Returns the lowercase hex SHA-256 of the normalized text.
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(normalize(text).as_bytes());
    let mut hex = String::with_capacity(64);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// Returns true if both texts normalize to the same string.
pub fn markdown_equal(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

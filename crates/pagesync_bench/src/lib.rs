//! Benchmark utilities.

/// Generate a markdown document with `lines` content lines.
///
/// Lines cycle through headings, bullets and paragraphs so block
/// translation sees a mix of block kinds.
pub fn generate_document(lines: usize) -> String {
    (0..lines)
        .map(|i| match i % 12 {
            0 => format!("# Section {}", i / 12),
            3 | 6 | 9 => format!("- item {} of the list", i),
            _ => format!("Paragraph line {} with some ordinary prose in it.", i),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Replace every `stride`-th line starting at `offset`.
pub fn edit_lines(doc: &str, offset: usize, stride: usize, tag: &str) -> String {
    doc.split('\n')
        .enumerate()
        .map(|(i, line)| {
            if stride > 0 && i >= offset && (i - offset) % stride == 0 && !line.is_empty() {
                format!("{line} [{tag}]")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Add cosmetic noise (CRLF and trailing spaces) without changing content.
pub fn add_noise(doc: &str) -> String {
    doc.split('\n')
        .map(|line| format!("{line}  "))
        .collect::<Vec<_>>()
        .join("\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagesync_protocol::{markdown_equal, normalize};

    #[test]
    fn generated_document_is_normalized() {
        let doc = generate_document(40);
        assert_eq!(normalize(&doc), doc);
    }

    #[test]
    fn noise_is_cosmetic() {
        let doc = generate_document(20);
        assert!(markdown_equal(&doc, &add_noise(&doc)));
    }

    #[test]
    fn edits_touch_only_selected_lines() {
        let doc = "a\nb\nc\nd";
        assert_eq!(edit_lines(doc, 1, 2, "x"), "a\nb [x]\nc\nd [x]");
    }
}

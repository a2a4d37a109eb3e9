//! Remote block model and markdown translation.
//!
//! The remote workspace stores a page as a flat list of typed blocks. Block
//! structure is read with a CommonMark parser; inline formatting is carried
//! through as the markdown source wrote it, inside each block's text. A block
//! quote becomes one block whose text keeps whatever the quote contains.

use crate::frontmatter::strip_frontmatter;
use crate::normalize::normalize;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Maximum number of children accepted by a single append call.
pub const MAX_BLOCKS_PER_APPEND: usize = 100;

/// A block on a remote page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Remote identifier, absent for blocks not yet written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Block payload.
    #[serde(flatten)]
    pub content: BlockContent,
}

/// Typed block payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockContent {
    /// A paragraph of inline markdown.
    Paragraph {
        /// Inline text.
        text: String,
    },
    /// A heading of level 1 to 3.
    Heading {
        /// Heading level.
        level: u8,
        /// Inline text.
        text: String,
    },
    /// A bulleted list item.
    BulletedListItem {
        /// Inline text.
        text: String,
        /// Nesting depth, zero for top level.
        #[serde(default)]
        depth: u8,
        /// Item of a loose list, set apart from its neighbours by blank lines.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        spaced: bool,
    },
    /// A numbered list item.
    NumberedListItem {
        /// Inline text.
        text: String,
        /// Nesting depth, zero for top level.
        #[serde(default)]
        depth: u8,
        /// First number of a list that does not start at 1. Only set on
        /// the first item of such a list.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start: Option<u32>,
        /// Item of a loose list.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        spaced: bool,
    },
    /// A checkbox item.
    ToDo {
        /// Inline text.
        text: String,
        /// Whether the box is ticked.
        checked: bool,
        /// Nesting depth, zero for top level.
        #[serde(default)]
        depth: u8,
        /// Item of a loose list.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        spaced: bool,
    },
    /// A block quote. Lines are separated by `\n`, paragraphs by a blank line.
    Quote {
        /// Quoted markdown with one level of `>` removed. Lists, headings
        /// and nested quotes inside it stay as markdown.
        text: String,
        /// Nesting depth, zero for a single `>`.
        #[serde(default)]
        depth: u8,
    },
    /// A fenced code block.
    Code {
        /// Language tag, possibly empty.
        #[serde(default)]
        language: String,
        /// Verbatim code.
        text: String,
    },
    /// A horizontal rule.
    Divider,
    /// A nested page. Rendered as nothing so pulls never recurse.
    ChildPage {
        /// Title of the nested page.
        #[serde(default)]
        title: String,
    },
    /// Any block type this translator does not understand.
    #[serde(other)]
    Unsupported,
}

impl Block {
    /// Creates an unsaved block.
    pub fn new(content: BlockContent) -> Self {
        Self { id: None, content }
    }

    /// Creates a block carrying a remote id.
    pub fn with_id(id: impl Into<String>, content: BlockContent) -> Self {
        Self {
            id: Some(id.into()),
            content,
        }
    }

    /// Creates a paragraph block.
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::new(BlockContent::Paragraph { text: text.into() })
    }
}

/// Translates a markdown document into blocks.
///
/// Frontmatter is dropped and the text normalized first. Nested lists keep
/// their depth, quotes and multi-line list items stay one block, and
/// unsupported constructs degrade to paragraphs.
pub fn markdown_to_blocks(markdown: &str) -> Vec<Block> {
    let text = normalize(strip_frontmatter(markdown));
    let options = Options::ENABLE_TASKLISTS | Options::ENABLE_STRIKETHROUGH;
    let mut builder = BlockBuilder::new(&text);
    for (event, range) in Parser::new_ext(&text, options).into_offset_iter() {
        builder.event(event, range);
    }
    builder.finish()
}

#[derive(Debug, Clone, Copy)]
enum Container {
    List { start: Option<u64>, items: usize },
    Item,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeafKind {
    Paragraph,
    Heading(u8),
    Item {
        ordered: bool,
        start: Option<u32>,
        depth: u8,
        checked: Option<bool>,
        spaced: bool,
    },
}

#[derive(Debug)]
struct Leaf {
    kind: LeafKind,
    text: String,
}

/// Content taken whole instead of being split into blocks.
#[derive(Debug)]
enum Verbatim {
    /// Code, or raw HTML when there is no language, as the parser hands it
    /// over.
    Code {
        language: Option<String>,
        text: String,
    },
    /// A block quote, already unquoted from the source. `open` counts the
    /// quotes still open inside it.
    Quote { text: String, open: usize },
}

impl Verbatim {
    /// Consumes one event. Returns true once the content is complete.
    fn absorb(&mut self, event: Event<'_>) -> bool {
        match (self, event) {
            (Verbatim::Code { .. }, Event::End(TagEnd::CodeBlock | TagEnd::HtmlBlock)) => true,
            (Verbatim::Code { text, .. }, Event::Text(chunk) | Event::Html(chunk)) => {
                text.push_str(&chunk);
                false
            }
            (Verbatim::Quote { open, .. }, Event::Start(Tag::BlockQuote(_))) => {
                *open += 1;
                false
            }
            (Verbatim::Quote { open, .. }, Event::End(TagEnd::BlockQuote(_))) => {
                *open = open.saturating_sub(1);
                *open == 0
            }
            _ => false,
        }
    }
}

/// Folds parser events into blocks.
///
/// Inline content is copied from the source one line at a time, so markup
/// such as emphasis, links and escapes survives untouched while list
/// indentation is left behind. Quotes are cut from the source whole.
struct BlockBuilder<'a> {
    source: &'a str,
    blocks: Vec<Block>,
    containers: Vec<Container>,
    leaf: Option<Leaf>,
    line: Option<Range<usize>>,
    verbatim: Option<Verbatim>,
}

impl<'a> BlockBuilder<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            blocks: Vec::new(),
            containers: Vec::new(),
            leaf: None,
            line: None,
            verbatim: None,
        }
    }

    fn event(&mut self, event: Event<'_>, range: Range<usize>) {
        if let Some(verbatim) = self.verbatim.as_mut() {
            if verbatim.absorb(event) {
                self.finish_verbatim();
            }
            return;
        }

        match event {
            Event::Start(Tag::Paragraph) => self.start_paragraph(),
            Event::End(TagEnd::Paragraph) => {
                self.end_line();
                if matches!(&self.leaf, Some(leaf) if leaf.kind == LeafKind::Paragraph) {
                    self.flush_leaf();
                }
            }
            Event::Start(Tag::Heading { level, .. }) => {
                self.flush_leaf();
                self.open(LeafKind::Heading(heading_level(level)));
            }
            Event::End(TagEnd::Heading(_)) => self.flush_leaf(),
            Event::Start(Tag::BlockQuote(_)) => {
                self.flush_leaf();
                self.verbatim = Some(Verbatim::Quote {
                    text: unquote(&self.source[range]),
                    open: 1,
                });
            }
            Event::Start(Tag::CodeBlock(kind)) => {
                self.flush_leaf();
                let language = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().unwrap_or_default().to_string()
                    }
                    CodeBlockKind::Indented => String::new(),
                };
                self.verbatim = Some(Verbatim::Code {
                    language: Some(language),
                    text: String::new(),
                });
            }
            Event::Start(Tag::HtmlBlock) => {
                self.flush_leaf();
                self.verbatim = Some(Verbatim::Code {
                    language: None,
                    text: String::new(),
                });
            }
            Event::Start(Tag::List(start)) => {
                // A nested list ends the text of the item that owns it.
                self.flush_leaf();
                self.containers.push(Container::List { start, items: 0 });
            }
            Event::End(TagEnd::List(_)) | Event::End(TagEnd::Item) => {
                self.flush_leaf();
                self.containers.pop();
            }
            Event::Start(Tag::Item) => self.start_item(),
            Event::TaskListMarker(ticked) => {
                if let Some(Leaf {
                    kind: LeafKind::Item { checked, .. },
                    ..
                }) = &mut self.leaf
                {
                    *checked = Some(ticked);
                }
            }
            Event::Rule => {
                self.flush_leaf();
                self.blocks.push(Block::new(BlockContent::Divider));
            }
            Event::SoftBreak => self.break_line(),
            Event::HardBreak => {
                let raw = &self.source[range.clone()];
                let end = range.start + raw.trim_end_matches(['\n', '\r']).len();
                self.mark(range.start, end);
                self.break_line();
            }
            // Inline tags: the opening marker sits at the start of the
            // range, the closing one at its end.
            Event::Start(_) => self.mark(range.start, range.start),
            Event::End(_) => self.mark(range.end, range.end),
            _ => self.mark(range.start, range.end),
        }
    }

    fn finish(mut self) -> Vec<Block> {
        self.flush_leaf();
        self.finish_verbatim();
        self.blocks
    }

    fn open(&mut self, kind: LeafKind) {
        self.leaf = Some(Leaf {
            kind,
            text: String::new(),
        });
        self.line = None;
    }

    /// Paragraphs inside a list item join the item's text. The parser only
    /// wraps item text in paragraphs in loose lists.
    fn start_paragraph(&mut self) {
        let item = match (self.containers.last(), self.leaf.as_mut()) {
            (Some(Container::Item), Some(leaf)) => match &mut leaf.kind {
                LeafKind::Item { spaced, .. } => {
                    *spaced = true;
                    Some(&mut leaf.text)
                }
                _ => None,
            },
            _ => None,
        };
        if let Some(text) = item {
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            return;
        }
        self.flush_leaf();
        self.open(LeafKind::Paragraph);
    }

    fn start_item(&mut self) {
        self.flush_leaf();
        let lists = self
            .containers
            .iter()
            .filter(|c| matches!(c, Container::List { .. }))
            .count();
        let (ordered, start) = match self.containers.last_mut() {
            Some(Container::List { start, items }) => {
                *items += 1;
                let hint = match *start {
                    Some(n) if *items == 1 && n != 1 => u32::try_from(n).ok(),
                    _ => None,
                };
                (start.is_some(), hint)
            }
            _ => (false, None),
        };
        self.containers.push(Container::Item);
        self.open(LeafKind::Item {
            ordered,
            start,
            depth: saturating_u8(lists.saturating_sub(1)),
            checked: None,
            spaced: false,
        });
    }

    /// Extends the current source line over `start..end`.
    fn mark(&mut self, start: usize, end: usize) {
        if self.leaf.is_none() {
            self.open(LeafKind::Paragraph);
        }
        self.line = Some(match self.line.take() {
            Some(line) => line.start.min(start)..line.end.max(end),
            None => with_escape(self.source, start)..end,
        });
    }

    fn end_line(&mut self) {
        if let (Some(line), Some(leaf)) = (self.line.take(), self.leaf.as_mut()) {
            leaf.text.push_str(&self.source[line]);
        }
    }

    fn break_line(&mut self) {
        self.end_line();
        if let Some(leaf) = &mut self.leaf {
            leaf.text.push('\n');
        }
    }

    fn flush_leaf(&mut self) {
        self.end_line();
        let Some(leaf) = self.leaf.take() else {
            return;
        };
        let text = leaf.text.trim_end().to_string();
        let content = match leaf.kind {
            LeafKind::Paragraph if text.is_empty() => return,
            LeafKind::Paragraph => BlockContent::Paragraph { text },
            LeafKind::Heading(level) => BlockContent::Heading { level, text },
            LeafKind::Item {
                checked: Some(checked),
                depth,
                spaced,
                ..
            } => BlockContent::ToDo {
                text,
                checked,
                depth,
                spaced,
            },
            LeafKind::Item {
                ordered: true,
                start,
                depth,
                spaced,
                ..
            } => BlockContent::NumberedListItem {
                text,
                depth,
                start,
                spaced,
            },
            LeafKind::Item { depth, spaced, .. } => BlockContent::BulletedListItem {
                text,
                depth,
                spaced,
            },
        };
        self.blocks.push(Block::new(content));
    }

    fn finish_verbatim(&mut self) {
        let Some(verbatim) = self.verbatim.take() else {
            return;
        };
        let content = match verbatim {
            Verbatim::Code { language, text } => {
                let text = text.strip_suffix('\n').unwrap_or(&text).to_string();
                match language {
                    Some(language) => BlockContent::Code { language, text },
                    None => BlockContent::Paragraph { text },
                }
            }
            Verbatim::Quote { text, .. } if text.is_empty() => return,
            Verbatim::Quote { text, .. } => BlockContent::Quote { text, depth: 0 },
        };
        self.blocks.push(Block::new(content));
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        _ => 3,
    }
}

fn saturating_u8(n: usize) -> u8 {
    u8::try_from(n).unwrap_or(u8::MAX)
}

/// Strips one level of `>` markers from the source of a block quote. Lazy
/// continuation lines carry no marker and are kept as written.
fn unquote(source: &str) -> String {
    let lines: Vec<&str> = source
        .lines()
        .map(|line| {
            let trimmed = line.trim_start_matches(' ');
            match trimmed.strip_prefix('>') {
                Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
                None => trimmed,
            }
        })
        .collect();
    lines.join("\n").trim_end().to_string()
}

/// Moves `start` back over a backslash escape the parser consumed.
fn with_escape(source: &str, start: usize) -> usize {
    let escaped = source[..start].ends_with('\\')
        && source[start..].starts_with(|c: char| c.is_ascii_punctuation());
    if escaped {
        start - 1
    } else {
        start
    }
}

#[derive(Debug, Clone, Copy)]
enum ItemMarker {
    Bullet,
    Task(bool),
    Number(Option<u32>),
}

#[derive(Debug, Clone, Copy)]
struct ListLevel {
    ordered: bool,
    ordinal: u32,
    spaced: bool,
    /// Column where the item's text, and its children, start.
    content_indent: usize,
}

/// Renders blocks back into normalized markdown.
///
/// Numbering runs per depth, so nested children never restart their
/// parent's count. Children are indented to their parent's text column.
/// Items of loose lists are separated by blank lines.
pub fn blocks_to_markdown(blocks: &[Block]) -> String {
    let mut out = String::new();
    let mut levels: Vec<ListLevel> = Vec::new();

    for block in blocks {
        let (rendered, tight) = match &block.content {
            BlockContent::BulletedListItem {
                text,
                depth,
                spaced,
            } => render_item(&mut levels, *depth, ItemMarker::Bullet, *spaced, text),
            BlockContent::ToDo {
                text,
                checked,
                depth,
                spaced,
            } => render_item(
                &mut levels,
                *depth,
                ItemMarker::Task(*checked),
                *spaced,
                text,
            ),
            BlockContent::NumberedListItem {
                text,
                depth,
                start,
                spaced,
            } => render_item(
                &mut levels,
                *depth,
                ItemMarker::Number(*start),
                *spaced,
                text,
            ),
            BlockContent::ChildPage { .. } | BlockContent::Unsupported => continue,
            other => {
                levels.clear();
                (render_leaf(other), false)
            }
        };

        if !out.is_empty() {
            out.push_str(if tight { "\n" } else { "\n\n" });
        }
        out.push_str(&rendered);
    }

    normalize(&out)
}

fn render_leaf(content: &BlockContent) -> String {
    match content {
        BlockContent::Paragraph { text } => text.clone(),
        BlockContent::Heading { level, text } => {
            format!("{} {}", "#".repeat(usize::from((*level).clamp(1, 3))), text)
        }
        BlockContent::Quote { text, depth } => {
            let prefix = "> ".repeat(usize::from(*depth) + 1);
            text.split('\n')
                .map(|line| {
                    if line.is_empty() {
                        prefix.trim_end().to_string()
                    } else {
                        format!("{prefix}{line}")
                    }
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        BlockContent::Code { language, text } => format!("```{language}\n{text}\n```"),
        BlockContent::Divider => "---".to_string(),
        _ => String::new(),
    }
}

/// Renders one list item. The flag is true when the item follows the
/// previous line without a blank line in between.
fn render_item(
    levels: &mut Vec<ListLevel>,
    depth: u8,
    marker: ItemMarker,
    spaced: bool,
    text: &str,
) -> (String, bool) {
    let continues = !levels.is_empty();
    // A child cannot sit deeper than one below the last rendered item.
    let depth = usize::from(depth).min(levels.len());
    let first_child = depth > 0 && depth == levels.len();
    let parent = depth.checked_sub(1).map(|p| levels[p]);
    let indent = parent.map_or(0, |p| p.content_indent);
    let ordered = matches!(marker, ItemMarker::Number(_));
    let previous = levels.get(depth).copied();
    levels.truncate(depth);

    let switched = previous.is_some_and(|p| p.ordered != ordered);
    let ordinal = match marker {
        ItemMarker::Number(Some(start)) => start,
        ItemMarker::Number(None) => match previous {
            Some(p) if p.ordered => p.ordinal.saturating_add(1),
            _ => 1,
        },
        _ => 0,
    };
    let lead = match marker {
        ItemMarker::Bullet => "- ".to_string(),
        ItemMarker::Task(true) => "- [x] ".to_string(),
        ItemMarker::Task(false) => "- [ ] ".to_string(),
        ItemMarker::Number(_) => format!("{ordinal}. "),
    };
    let content_indent = indent
        + match marker {
            ItemMarker::Number(_) => lead.len(),
            _ => 2,
        };
    levels.push(ListLevel {
        ordered,
        ordinal,
        spaced,
        content_indent,
    });

    let mut rendered = format!("{}{lead}", " ".repeat(indent));
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            rendered.push('\n');
            if !line.is_empty() {
                rendered.push_str(&" ".repeat(content_indent));
            }
        }
        rendered.push_str(line);
    }
    // Switching between bullets and numbers at the top starts a new list.
    // A first child sits against its parent's text unless the parent is
    // loose; later items follow their own list.
    let tight = if !continues || (depth == 0 && switched) {
        false
    } else if first_child {
        !parent.is_some_and(|p| p.spaced)
    } else {
        !spaced
    };
    (rendered, tight)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bullet(text: &str, depth: u8) -> BlockContent {
        BlockContent::BulletedListItem {
            text: text.into(),
            depth,
            spaced: false,
        }
    }

    fn quote(text: &str) -> BlockContent {
        BlockContent::Quote {
            text: text.into(),
            depth: 0,
        }
    }

    #[test]
    fn translates_common_structure() {
        let md = "# Title\n\nSome *text*\nwrapped\n\n- one\n  - nested\n1. first\n- [x] done\n> quoted\n\n---";
        let blocks = markdown_to_blocks(md);
        let kinds: Vec<_> = blocks.iter().map(|b| b.content.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                BlockContent::Heading {
                    level: 1,
                    text: "Title".into()
                },
                BlockContent::Paragraph {
                    text: "Some *text*\nwrapped".into()
                },
                bullet("one", 0),
                bullet("nested", 1),
                BlockContent::NumberedListItem {
                    text: "first".into(),
                    depth: 0,
                    start: None,
                    spaced: false,
                },
                BlockContent::ToDo {
                    text: "done".into(),
                    checked: true,
                    depth: 0,
                    spaced: false,
                },
                quote("quoted"),
                BlockContent::Divider,
            ]
        );
    }

    #[test]
    fn code_fences_are_verbatim() {
        let blocks = markdown_to_blocks("```rust\nfn main() {}\n# not a heading\n```");
        assert_eq!(blocks.len(), 1);
        assert_eq!(
            blocks[0].content,
            BlockContent::Code {
                language: "rust".into(),
                text: "fn main() {}\n# not a heading".into()
            }
        );
    }

    #[test]
    fn frontmatter_never_reaches_the_remote() {
        let blocks = markdown_to_blocks("---\ntags: [a]\n---\n\n# Doc");
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn rendering_matches_typical_documents() {
        let md = "# Title\n\nIntro paragraph.\n\n- a\n- b\n\n1. x\n2. y\n\n```sh\nls\n```";
        assert_eq!(blocks_to_markdown(&markdown_to_blocks(md)), md);
    }

    fn round_trip(md: &str) -> String {
        blocks_to_markdown(&markdown_to_blocks(md))
    }

    #[test]
    fn numbering_continues_after_nested_children() {
        let md = "1. a\n   - sub\n2. b\n3. c";
        let blocks = markdown_to_blocks(md);
        assert_eq!(blocks[1].content, bullet("sub", 1));
        assert_eq!(round_trip(md), md);
    }

    #[test]
    fn shallow_child_under_number_keeps_the_next_number() {
        // Two spaces fall short of the text column of "1. ", so the bullet
        // is not a child of "a".
        let md = "1. a\n  - sub\n2. b";
        let blocks = markdown_to_blocks(md);
        let rendered = round_trip(md);
        assert!(rendered.contains("2. b"));
        assert!(!rendered.contains("1. b"));
        assert_eq!(markdown_to_blocks(&rendered), blocks);
        assert_eq!(round_trip(&rendered), rendered);
    }

    #[test]
    fn nested_todos_keep_their_depth() {
        let md = "- [ ] a\n  - [x] b\n- [ ] c";
        let blocks = markdown_to_blocks(md);
        assert_eq!(
            blocks[1].content,
            BlockContent::ToDo {
                text: "b".into(),
                checked: true,
                depth: 1,
                spaced: false,
            }
        );
        assert_eq!(round_trip(md), md);
        assert_eq!(round_trip("- [ ] a\n  - [ ] b"), "- [ ] a\n  - [ ] b");
    }

    #[test]
    fn multi_line_quote_is_one_block() {
        let blocks = markdown_to_blocks("> a\n> b");
        assert_eq!(blocks, vec![Block::new(quote("a\nb"))]);
        assert_eq!(round_trip("> a\n> b"), "> a\n> b");
        assert_eq!(round_trip("> a\n>\n> b"), "> a\n>\n> b");
    }

    #[test]
    fn nested_quotes_stay_inside_their_quote() {
        let md = "> outer\n\n> > inner";
        let blocks = markdown_to_blocks(md);
        assert_eq!(blocks[1].content, quote("> inner"));
        assert_eq!(round_trip(md), md);
        assert_eq!(round_trip("> outer\n>\n> > inner"), "> outer\n>\n> > inner");
    }

    #[test]
    fn quoted_lists_headings_and_code_keep_their_markers() {
        let md = "> - q1\n> - q2";
        assert_eq!(markdown_to_blocks(md), vec![Block::new(quote("- q1\n- q2"))]);
        assert_eq!(round_trip(md), md);

        let md = "> # H\n> text";
        assert_eq!(markdown_to_blocks(md), vec![Block::new(quote("# H\ntext"))]);
        assert_eq!(round_trip(md), md);

        let md = "> ```sh\n> ls\n> ```\n\nafter";
        assert_eq!(markdown_to_blocks(md)[0].content, quote("```sh\nls\n```"));
        assert_eq!(round_trip(md), md);
    }

    #[test]
    fn lazy_quote_lines_join_the_quote() {
        let blocks = markdown_to_blocks("> a\nb");
        assert_eq!(blocks, vec![Block::new(quote("a\nb"))]);
        assert_eq!(round_trip("> a\nb"), "> a\n> b");
    }

    #[test]
    fn continuation_lines_stay_in_their_item() {
        let md = "- item\n  continued line\n- next";
        let blocks = markdown_to_blocks(md);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].content, bullet("item\ncontinued line", 0));
        assert_eq!(round_trip(md), md);
        assert_eq!(round_trip("- item\n  continued line"), "- item\n  continued line");
    }

    #[test]
    fn loose_lists_keep_their_blank_lines() {
        let md = "- a\n\n- b";
        let blocks = markdown_to_blocks(md);
        assert_eq!(
            blocks[1].content,
            BlockContent::BulletedListItem {
                text: "b".into(),
                depth: 0,
                spaced: true,
            }
        );
        assert_eq!(round_trip(md), md);
        assert_eq!(round_trip("1. a\n\n2. b"), "1. a\n\n2. b");
        assert_eq!(round_trip("- [ ] a\n\n- [x] b"), "- [ ] a\n\n- [x] b");
        assert_eq!(round_trip("- a\n- b"), "- a\n- b");
    }

    #[test]
    fn loose_and_tight_levels_nest() {
        let md = "- a\n  - x\n\n  - y\n- b";
        let blocks = markdown_to_blocks(md);
        assert_eq!(blocks[0].content, bullet("a", 0));
        assert_eq!(
            blocks[2].content,
            BlockContent::BulletedListItem {
                text: "y".into(),
                depth: 1,
                spaced: true,
            }
        );
        assert_eq!(round_trip(md), md);

        let md = "- a\n\n  - x\n\n- b";
        assert_eq!(round_trip(md), md);
    }

    #[test]
    fn inline_markup_and_escapes_are_kept() {
        let md = "Some **bold** and [a link](https://example.com)\n\\# not a heading\n\n1\\. not a list";
        assert_eq!(round_trip(md), md);
    }

    #[test]
    fn ordered_list_start_is_preserved() {
        let md = "Intro\n\n3. c\n4. d";
        let blocks = markdown_to_blocks(md);
        assert_eq!(
            blocks[1].content,
            BlockContent::NumberedListItem {
                text: "c".into(),
                depth: 0,
                start: Some(3),
                spaced: false,
            }
        );
        assert_eq!(round_trip(md), md);
    }

    #[test]
    fn list_type_switch_starts_a_new_list() {
        let md = "- a\n- b\n\n1. x";
        assert_eq!(round_trip(md), md);
        assert_eq!(round_trip("- a\n1. x"), md.replace("- b\n", ""));
    }

    #[test]
    fn child_pages_render_empty() {
        let blocks = vec![
            Block::paragraph("before"),
            Block::new(BlockContent::ChildPage {
                title: "Nested".into(),
            }),
            Block::paragraph("after"),
        ];
        assert_eq!(blocks_to_markdown(&blocks), "before\n\nafter");
    }

    #[test]
    fn unknown_wire_types_decode_as_unsupported() {
        let block: Block =
            serde_json::from_str(r#"{"id":"b1","type":"synced_block","extra":1}"#).unwrap();
        assert_eq!(block.id.as_deref(), Some("b1"));
        assert_eq!(block.content, BlockContent::Unsupported);
    }

    #[test]
    fn older_wire_blocks_default_their_depth() {
        let block: Block = serde_json::from_str(r#"{"type":"to_do","text":"x","checked":false}"#).unwrap();
        assert_eq!(
            block.content,
            BlockContent::ToDo {
                text: "x".into(),
                checked: false,
                depth: 0,
                spaced: false,
            }
        );
        let json = serde_json::to_value(Block::new(BlockContent::NumberedListItem {
            text: "n".into(),
            depth: 0,
            start: None,
            spaced: false,
        }))
        .unwrap();
        assert!(json.get("start").is_none());
        assert!(json.get("spaced").is_none());
    }

    #[test]
    fn wire_format_is_tagged() {
        let json = serde_json::to_value(Block::paragraph("hi")).unwrap();
        assert_eq!(json["type"], "paragraph");
        assert_eq!(json["text"], "hi");
        assert!(json.get("id").is_none());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn document() -> impl Strategy<Value = String> {
            let line = prop_oneof![
                "[a-z]{1,8}",
                "- [a-z]{1,5}",
                "  - [a-z]{1,5}",
                "- \\[[ x]\\] [a-z]{1,5}",
                "1\\. [a-z]{1,5}",
                "> [a-z]{1,5}",
                "> - [a-z]{1,5}",
                "> # [a-z]{1,5}",
                Just(String::new()),
            ];
            prop::collection::vec(line, 1..12).prop_map(|lines| lines.join("\n"))
        }

        proptest! {
            #[test]
            fn rendering_is_a_fixed_point(md in document()) {
                let once = round_trip(&md);
                prop_assert_eq!(markdown_to_blocks(&once), markdown_to_blocks(&md));
                prop_assert_eq!(round_trip(&once), once);
            }
        }
    }
}

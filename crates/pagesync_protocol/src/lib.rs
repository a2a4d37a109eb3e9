//! # PageSync Protocol
//!
//! Content-level building blocks shared by the PageSync store and engine.
//!
//! This crate provides:
//! - Markdown normalization and content hashing
//! - Frontmatter splitting and re-attachment
//! - The remote block model and markdown ↔ block translation
//! - Line-oriented three-way merge
//! - Conflict strategies and the conflict-file format
//! - Queue operation types
//!
//! ## Key Invariants
//!
//! - `normalize(normalize(x)) == normalize(x)`
//! - Two texts hash equal iff they normalize equal
//! - Merge never drops content without a deterministic rule

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod blocks;
mod conflict;
mod error;
mod frontmatter;
mod merge;
mod normalize;
mod operation;

pub use blocks::{
    blocks_to_markdown, markdown_to_blocks, Block, BlockContent, MAX_BLOCKS_PER_APPEND,
};
pub use conflict::{format_conflict_file, ConflictStrategy};
pub use error::{ProtocolError, ProtocolResult};
pub use frontmatter::{attach_frontmatter, split_frontmatter, strip_frontmatter};
pub use merge::{three_way_merge, ConflictRegion, MergeOutcome};
pub use normalize::{content_hash, markdown_equal, normalize};
pub use operation::{OperationKind, Side, SyncOperation};

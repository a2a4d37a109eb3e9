//! # PageSync Testkit
//!
//! Test utilities for PageSync.
//!
//! This crate provides:
//! - Fixtures: temporary stores and project trees with tracked files
//! - Property-based generators for markdown documents and edits
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pagesync_testkit::prelude::*;
//!
//! #[test]
//! fn tracks_a_doc() {
//!     let fx = ProjectFixture::new("alpha");
//!     let doc = fx.track_doc("notes.md", "page-1", "# Notes");
//!     assert_eq!(fx.read("notes.md"), "# Notes");
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;

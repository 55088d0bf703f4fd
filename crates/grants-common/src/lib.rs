//! Grants Common - text and file utilities shared by the application forms
//!
//! This crate provides:
//! - Markup-safe splitting of HTML-bearing strings (summary truncation)
//! - Attachment file name de-duplication
//! - Shared error handling

#![warn(clippy::all)]

pub mod error;
pub mod files;
pub mod markup;

pub use error::*;
pub use files::{deduplicate_filename, split_extension, unique_filename};
pub use markup::{find_first_whitespace, split_markup, split_markup_file, truncate_markup, MarkupError, MarkupSplit};

//! Markdown post-processing and document conversion.
//!
//! Generated stage output is cleaned of wrapper code fences before it is
//! persisted, then converted to `.docx` for download.

mod cleanup;
mod convert;

pub use cleanup::{clean, count_words};
pub use convert::{DocumentConverter, PandocConverter};

/// MIME type of the documents produced by [`PandocConverter`].
pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

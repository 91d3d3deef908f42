//! Pipeline stages for Markdown-to-PDF conversion.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable and the rendering backend can be swapped without
//! touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ markdown ──▶ render
//! (file/stdin) (comrak)   (Chromium)
//! ```
//!
//! 1. [`input`]: read markdown for one-shot CLI conversions
//! 2. [`markdown`]: Markdown → styled HTML document
//! 3. [`render`]: print the document to PDF in an isolated browser process

pub mod input;
pub mod markdown;
pub mod render;

//! # md2pdf
//!
//! Turn Markdown into PDF with headless Chromium, and hand each PDF out
//! exactly once.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Markdown
//!  │
//!  ├─ 1. Validate  reject absent / empty content before allocating anything
//!  ├─ 2. Transform comrak (GFM) → HTML fragment → styled A4 document
//!  ├─ 3. Admit     wait for a render permit (bounded concurrency)
//!  ├─ 4. Render    fresh headless Chromium per document, killed on every exit
//!  ├─ 5. Store     document-<millis>.pdf in the artifact directory
//!  └─ 6. Serve     GET /download/{id} streams the file, then deletes it
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use md2pdf::{ConversionConfig, ConversionRequest, Converter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let converter = Converter::new(ConversionConfig::default());
//!     let reference = converter
//!         .convert(ConversionRequest::new("# Hello\n\nWorld"))
//!         .await?;
//!     println!("{} ({} bytes)", reference.download_url, reference.stats.pdf_bytes);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `md2pdf` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when embedding the router or converter in another service:
//! ```toml
//! md2pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifact;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod server;
pub mod style;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use artifact::{Artifact, ArtifactId, ArtifactState, ArtifactStore};
pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::{ConversionRequest, Converter};
pub use error::{Md2PdfError, RenderError, ResolveError};
pub use output::{ArtifactReference, ConversionStats};
pub use pipeline::render::{ChromiumEngine, PdfEngine};
pub use server::build_router;

//! Error types for the md2pdf library.
//!
//! Three error types mirror the three places a request can go wrong:
//!
//! * [`Md2PdfError`]: ends one conversion (bad input, markdown rendering,
//!   engine failure, missing artifact). Returned from
//!   [`crate::convert::Converter::convert`] and friends. The HTTP layer maps
//!   `InvalidRequest` to 400 and everything else to a generic 500.
//!
//! * [`RenderError`]: produced by the rendering engine adapter. Each engine
//!   failure mode (launch, timeout, pagination) has its own variant so logs
//!   and tests can tell them apart even though the HTTP contract does not.
//!
//! * [`ResolveError`]: outcome of resolving a download identifier. Kept
//!   separate because `Forbidden` vs `NotFound` is part of the public HTTP
//!   contract (403 vs 404).

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by a conversion.
#[derive(Debug, Error)]
pub enum Md2PdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// `content` was absent or empty.
    #[error("Invalid data format. Missing \"content\" field.")]
    InvalidRequest,

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// The markdown could not be turned into HTML.
    #[error("Failed to convert Markdown content: {detail}")]
    Conversion { detail: String },

    /// The rendering engine failed; see [`RenderError`] for the cause.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The engine reported success but no file exists at the artifact path.
    #[error("Rendered artifact '{id}' is missing from the output directory")]
    ArtifactMissing { id: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// A markdown source file could not be read.
    #[error("Cannot read markdown input '{path}': {source}")]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or canonicalise the artifact directory.
    #[error("Cannot prepare output directory '{path}': {source}")]
    Namespace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not move the rendered PDF to its final location.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Md2PdfError {
    /// `true` when the caller, not the service, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Md2PdfError::InvalidRequest)
    }
}

/// Failures of the rendering engine adapter.
#[derive(Debug, Error)]
pub enum RenderError {
    /// No browser executable could be located.
    #[error("Rendering engine not available: {0}")]
    EngineNotFound(String),

    /// The browser process could not be started.
    #[error("Failed to launch rendering engine '{program}': {source}")]
    EngineLaunch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The engine did not finish loading and paginating in time.
    #[error("Rendering engine timed out after {secs}s\nIncrease --render-timeout.")]
    RenderTimeout { secs: u64 },

    /// The engine exited unsuccessfully or produced no PDF.
    #[error("PDF generation failed (exit {exit_code:?}): {stderr}")]
    Pagination {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The per-render scratch directory could not be prepared.
    #[error("Failed to prepare render scratch space: {0}")]
    Scratch(#[source] std::io::Error),
}

/// Outcome of resolving a download identifier that is not a servable file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The identifier would escape the artifact directory.
    #[error("Forbidden.")]
    Forbidden,

    /// No such artifact (never created, or already consumed).
    #[error("File not found.")]
    NotFound,
}

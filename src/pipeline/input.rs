//! Input resolution for one-shot conversions: a markdown file, or stdin.
//!
//! The HTTP service receives markdown inline and never touches this module.

use crate::error::Md2PdfError;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Argument value meaning "read from standard input".
pub const STDIN_MARKER: &str = "-";

/// Where markdown for a one-shot conversion comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkdownSource {
    Stdin,
    File(PathBuf),
}

impl MarkdownSource {
    pub fn parse(arg: &str) -> Self {
        if arg == STDIN_MARKER {
            MarkdownSource::Stdin
        } else {
            MarkdownSource::File(PathBuf::from(arg))
        }
    }

    /// Default output path: the input with a `.pdf` extension.
    ///
    /// `None` for stdin, which has no name to derive one from.
    pub fn default_output(&self) -> Option<PathBuf> {
        match self {
            MarkdownSource::Stdin => None,
            MarkdownSource::File(path) => Some(path.with_extension("pdf")),
        }
    }

    /// Read the whole source as UTF-8.
    pub async fn read(&self) -> Result<String, Md2PdfError> {
        match self {
            MarkdownSource::Stdin => {
                let mut buf = String::new();
                tokio::io::stdin()
                    .read_to_string(&mut buf)
                    .await
                    .map_err(|source| Md2PdfError::InputUnreadable {
                        path: PathBuf::from("<stdin>"),
                        source,
                    })?;
                debug!("Read {} bytes of markdown from stdin", buf.len());
                Ok(buf)
            }
            MarkdownSource::File(path) => read_file(path).await,
        }
    }
}

async fn read_file(path: &Path) -> Result<String, Md2PdfError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| Md2PdfError::InputUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
    debug!("Read {} bytes of markdown from {}", text.len(), path.display());
    Ok(text)
}

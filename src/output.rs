//! Output types returned by a successful conversion.

use crate::artifact::ArtifactId;
use serde::{Deserialize, Serialize};

/// Route prefix under which artifacts are downloaded.
pub const DOWNLOAD_ROUTE_PREFIX: &str = "/download/";

/// Reference to a generated PDF awaiting its single download.
///
/// Only the file name leaves the service; the absolute path stays inside the
/// [`crate::artifact::ArtifactStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactReference {
    /// Artifact identifier (`document-<millis>.pdf`).
    pub id: ArtifactId,
    /// Relative URL the artifact can be fetched from, once.
    pub download_url: String,
    /// Sizes and timings for this conversion.
    pub stats: ConversionStats,
}

impl ArtifactReference {
    pub fn new(id: ArtifactId, stats: ConversionStats) -> Self {
        let download_url = download_url_for(&id);
        Self {
            id,
            download_url,
            stats,
        }
    }
}

/// `/download/<id>` for an artifact.
pub fn download_url_for(id: &ArtifactId) -> String {
    format!("{}{}", DOWNLOAD_ROUTE_PREFIX, id)
}

/// Sizes and timings collected during one conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub markdown_bytes: usize,
    pub html_bytes: usize,
    pub pdf_bytes: u64,
    /// Markdown → HTML.
    pub transform_ms: u64,
    /// Time spent waiting for a render permit.
    pub queue_ms: u64,
    /// Engine wall time.
    pub render_ms: u64,
    pub total_ms: u64,
}

//! Configuration types for Markdown-to-PDF conversion.
//!
//! All conversion and artifact behaviour is controlled through
//! [`ConversionConfig`], built via its [`ConversionConfigBuilder`]. The same
//! struct is shared by the HTTP service and the one-shot CLI command, so a
//! document renders identically no matter how it was submitted.

use crate::error::Md2PdfError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default artifact directory, relative to the working directory.
pub const DEFAULT_OUTPUT_DIR: &str = "temp_files";

/// Configuration for Markdown-to-PDF conversion.
///
/// # Example
/// ```rust
/// use md2pdf::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .output_dir("/var/tmp/md2pdf")
///     .render_timeout_secs(30)
///     .max_concurrent_renders(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Directory holding generated PDFs until they are downloaded.
    /// Default: `./temp_files`.
    pub output_dir: PathBuf,

    /// Browser executable. If None, auto-detected via `chromium-locate`.
    pub chrome_path: Option<PathBuf>,

    /// Hard limit for one engine run (launch + load + print). Default: 60.
    ///
    /// The browser is killed when this expires, so a stuck page cannot pin a
    /// process and an admission permit forever.
    pub render_timeout_secs: u64,

    /// Maximum number of engine processes alive at once. Default: 4.
    ///
    /// Each render is a full Chromium process (~100–200 MB RSS). Requests
    /// beyond this limit wait for a permit rather than spawning more.
    pub max_concurrent_renders: usize,

    /// Virtual-time budget in milliseconds the engine grants the page to
    /// settle (network idle, fonts, images) before printing. Default: 5000.
    pub settle_budget_ms: u64,

    /// Pass raw HTML embedded in the markdown through to the page. Default: true.
    pub allow_raw_html: bool,

    /// Delete never-downloaded artifacts older than this. Default: None (keep).
    pub artifact_ttl_secs: Option<u64>,

    /// How often the expiry sweeper runs when a TTL is set. Default: 60.
    pub sweep_interval_secs: u64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            chrome_path: None,
            render_timeout_secs: 60,
            max_concurrent_renders: 4,
            settle_budget_ms: 5000,
            allow_raw_html: true,
            artifact_ttl_secs: None,
            sweep_interval_secs: 60,
        }
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn artifact_ttl(&self) -> Option<Duration> {
        self.artifact_ttl_secs.map(Duration::from_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.render_timeout_secs = secs;
        self
    }

    pub fn max_concurrent_renders(mut self, n: usize) -> Self {
        self.config.max_concurrent_renders = n;
        self
    }

    pub fn settle_budget_ms(mut self, ms: u64) -> Self {
        self.config.settle_budget_ms = ms;
        self
    }

    pub fn allow_raw_html(mut self, v: bool) -> Self {
        self.config.allow_raw_html = v;
        self
    }

    pub fn artifact_ttl_secs(mut self, secs: Option<u64>) -> Self {
        self.config.artifact_ttl_secs = secs;
        self
    }

    pub fn sweep_interval_secs(mut self, secs: u64) -> Self {
        self.config.sweep_interval_secs = secs.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Md2PdfError> {
        let c = &self.config;
        if c.render_timeout_secs == 0 {
            return Err(Md2PdfError::InvalidConfig(
                "Render timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_concurrent_renders == 0 {
            return Err(Md2PdfError::InvalidConfig(
                "Concurrent renders must be ≥ 1".into(),
            ));
        }
        if c.artifact_ttl_secs == Some(0) {
            return Err(Md2PdfError::InvalidConfig(
                "Artifact TTL must be ≥ 1 second (omit it to disable sweeping)".into(),
            ));
        }
        if c.output_dir.as_os_str().is_empty() {
            return Err(Md2PdfError::InvalidConfig(
                "Output directory must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

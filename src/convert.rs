//! Conversion orchestration: markdown in, downloadable artifact out.
//!
//! [`Converter`] owns everything one conversion needs and is shared (behind an
//! `Arc`) by every request the service handles:
//!
//! ```text
//! validate ──▶ namespace ──▶ markdown→HTML ──▶ permit ──▶ render ──▶ verify
//!    │                                          (gate)       │          │
//!    └─ InvalidRequest, nothing allocated                    └─ failure: artifact discarded
//! ```
//!
//! The admission gate is a [`Semaphore`] with `max_concurrent_renders`
//! permits. Transformation runs before the permit is taken, so only engine
//! processes are bounded, not request parsing.

use crate::artifact::ArtifactStore;
use crate::config::ConversionConfig;
use crate::error::Md2PdfError;
use crate::output::{ArtifactReference, ConversionStats};
use crate::pipeline::markdown;
use crate::pipeline::render::{ChromiumEngine, PdfEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One conversion request as received from a caller.
#[derive(Debug, Clone, Default)]
pub struct ConversionRequest {
    /// Markdown source. Absent or empty is invalid.
    pub content: Option<String>,
}

impl ConversionRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
        }
    }

    /// The markdown to convert, or `InvalidRequest`.
    pub fn validate(&self) -> Result<&str, Md2PdfError> {
        match self.content.as_deref() {
            Some(text) if !text.is_empty() => Ok(text),
            _ => Err(Md2PdfError::InvalidRequest),
        }
    }
}

/// Shared conversion service: config, artifact store, engine and render gate.
pub struct Converter {
    config: ConversionConfig,
    store: Arc<ArtifactStore>,
    engine: Arc<dyn PdfEngine>,
    gate: Arc<Semaphore>,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("available_permits", &self.gate.available_permits())
            .finish_non_exhaustive()
    }
}

impl Converter {
    /// Converter backed by headless Chromium.
    pub fn new(config: ConversionConfig) -> Self {
        let engine = Arc::new(ChromiumEngine::from_config(&config));
        Self::with_engine(config, engine)
    }

    /// Converter backed by any [`PdfEngine`].
    pub fn with_engine(config: ConversionConfig, engine: Arc<dyn PdfEngine>) -> Self {
        let store = Arc::new(ArtifactStore::new(config.output_dir.clone()));
        let gate = Arc::new(Semaphore::new(config.max_concurrent_renders));
        Self {
            config,
            store,
            engine,
            gate,
        }
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    /// Render permits not currently held.
    pub fn available_permits(&self) -> usize {
        self.gate.available_permits()
    }

    /// Convert markdown into a PDF artifact awaiting download.
    ///
    /// # Errors
    /// - `InvalidRequest` when `content` is absent or empty. Nothing is
    ///   allocated, not even the output directory.
    /// - `Conversion`, `Render`, `ArtifactMissing`, `Namespace` for service
    ///   failures. No artifact is left behind in any of these cases.
    pub async fn convert(
        &self,
        request: ConversionRequest,
    ) -> Result<ArtifactReference, Md2PdfError> {
        let total_start = Instant::now();
        let markdown = request.validate()?;
        info!("Starting conversion: {} bytes of markdown", markdown.len());

        // ── Step 1: Provision namespace ──────────────────────────────────
        self.store.ensure_namespace().await?;

        // ── Step 2: Markdown → HTML document ─────────────────────────────
        let transform_start = Instant::now();
        let html = markdown::to_html_document(markdown, self.config.allow_raw_html)?;
        let transform_ms = transform_start.elapsed().as_millis() as u64;

        // ── Step 3: Admission ────────────────────────────────────────────
        let queue_start = Instant::now();
        let permit = self.acquire_permit().await?;
        let queue_ms = queue_start.elapsed().as_millis() as u64;

        // ── Step 4: Render into a reserved artifact ──────────────────────
        let reservation = self.store.reserve().await?;
        let render_start = Instant::now();
        let rendered = self.engine.render(&html, reservation.path()).await;
        let render_ms = render_start.elapsed().as_millis() as u64;
        drop(permit);

        if let Err(e) = rendered {
            warn!("Render of {} failed: {}", reservation.id(), e);
            self.store.discard(reservation.id()).await;
            return Err(e.into());
        }

        // ── Step 5: Verify ───────────────────────────────────────────────
        let artifact = reservation.commit().await?;

        let stats = ConversionStats {
            markdown_bytes: markdown.len(),
            html_bytes: html.len(),
            pdf_bytes: artifact.size,
            transform_ms,
            queue_ms,
            render_ms,
            total_ms: total_start.elapsed().as_millis() as u64,
        };
        info!(
            "Generated {} ({} bytes) in {}ms (queue {}ms, render {}ms)",
            artifact.id, stats.pdf_bytes, stats.total_ms, stats.queue_ms, stats.render_ms
        );

        Ok(ArtifactReference::new(artifact.id, stats))
    }

    /// Convert markdown straight to `output_path`, bypassing the artifact store.
    ///
    /// Uses atomic write (render to `<path>.tmp` + rename) to prevent partial files.
    pub async fn convert_to_file(
        &self,
        markdown: &str,
        output_path: impl AsRef<Path>,
    ) -> Result<ConversionStats, Md2PdfError> {
        let total_start = Instant::now();
        let path = absolute(output_path.as_ref())?;
        let request = ConversionRequest::new(markdown);
        let markdown = request.validate()?;
        info!("Converting {} bytes of markdown to {}", markdown.len(), path.display());

        let write_err = |source| Md2PdfError::OutputWriteFailed {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let transform_start = Instant::now();
        let html = markdown::to_html_document(markdown, self.config.allow_raw_html)?;
        let transform_ms = transform_start.elapsed().as_millis() as u64;

        let queue_start = Instant::now();
        let permit = self.acquire_permit().await?;
        let queue_ms = queue_start.elapsed().as_millis() as u64;

        let tmp_path = path.with_extension("pdf.tmp");
        let render_start = Instant::now();
        let rendered = self.engine.render(&html, &tmp_path).await;
        let render_ms = render_start.elapsed().as_millis() as u64;
        drop(permit);

        if let Err(e) = rendered {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(write_err(e));
        }

        let pdf_bytes = tokio::fs::metadata(&path)
            .await
            .map(|m| m.len())
            .map_err(write_err)?;

        Ok(ConversionStats {
            markdown_bytes: markdown.len(),
            html_bytes: html.len(),
            pdf_bytes,
            transform_ms,
            queue_ms,
            render_ms,
            total_ms: total_start.elapsed().as_millis() as u64,
        })
    }

    /// Start the expiry sweeper if `artifact_ttl_secs` is configured.
    pub fn spawn_sweeper(&self) -> Option<JoinHandle<()>> {
        let ttl = self.config.artifact_ttl()?;
        Some(
            Arc::clone(&self.store).spawn_sweeper(ttl, self.config.sweep_interval()),
        )
    }

    async fn acquire_permit(&self) -> Result<SemaphorePermit<'_>, Md2PdfError> {
        if self.gate.available_permits() == 0 {
            debug!("All {} render slots busy, queueing", self.config.max_concurrent_renders);
        }
        self.gate
            .acquire()
            .await
            .map_err(|_| Md2PdfError::Internal("Render admission gate closed".into()))
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// The engine resolves relative paths against its own working directory.
fn absolute(path: &Path) -> Result<PathBuf, Md2PdfError> {
    std::path::absolute(path).map_err(|source| Md2PdfError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Writes a tiny PDF-looking file, or fails, and records concurrency.
    #[derive(Default)]
    struct FakeEngine {
        fail: bool,
        partial_write: bool,
        skip_write: bool,
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PdfEngine for FakeEngine {
        async fn render(&self, html: &str, destination: &Path) -> Result<(), RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            assert!(html.starts_with("<!DOCTYPE html>"));
            if self.partial_write {
                std::fs::write(destination, b"%PD").unwrap();
            }
            if self.fail {
                return Err(RenderError::Pagination {
                    exit_code: Some(1),
                    stderr: "boom".into(),
                });
            }
            if !self.skip_write {
                std::fs::write(destination, format!("%PDF-1.4\n{}", html.len())).unwrap();
            }
            Ok(())
        }
    }

    fn converter(dir: &TempDir, engine: FakeEngine, permits: usize) -> (Converter, Arc<FakeEngine>) {
        let config = ConversionConfig::builder()
            .output_dir(dir.path().join("temp_files"))
            .max_concurrent_renders(permits)
            .build()
            .unwrap();
        let engine = Arc::new(engine);
        (Converter::with_engine(config, engine.clone()), engine)
    }

    fn namespace_files(dir: &TempDir) -> Vec<String> {
        std::fs::read_dir(dir.path().join("temp_files"))
            .map(|rd| {
                rd.map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn request_validation() {
        assert!(ConversionRequest::default().validate().is_err());
        assert!(ConversionRequest::new("").validate().is_err());
        assert_eq!(ConversionRequest::new(" \n\t").validate().unwrap(), " \n\t");
        assert_eq!(ConversionRequest::new("# hi").validate().unwrap(), "# hi");
    }

    #[tokio::test]
    async fn convert_produces_artifact() {
        let dir = TempDir::new().unwrap();
        let (conv, _) = converter(&dir, FakeEngine::default(), 4);

        let reference = conv
            .convert(ConversionRequest::new("# Hello\n\nWorld"))
            .await
            .unwrap();

        assert!(crate::artifact::ArtifactId::is_generated_name(reference.id.as_str()));
        assert_eq!(reference.download_url, format!("/download/{}", reference.id));
        assert!(reference.stats.pdf_bytes > 0);
        assert_eq!(reference.stats.markdown_bytes, 14);

        let path = conv
            .store()
            .resolve_for_download(reference.id.as_str())
            .await
            .unwrap();
        assert!(std::fs::read(path).unwrap().starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn invalid_request_allocates_nothing() {
        let dir = TempDir::new().unwrap();
        let (conv, engine) = converter(&dir, FakeEngine::default(), 4);

        let err = conv.convert(ConversionRequest::default()).await.unwrap_err();
        assert!(err.is_client_error());
        let err = conv.convert(ConversionRequest::new("")).await.unwrap_err();
        assert!(matches!(err, Md2PdfError::InvalidRequest));

        assert!(!dir.path().join("temp_files").exists());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn whitespace_only_markdown_still_renders() {
        let dir = TempDir::new().unwrap();
        let (conv, engine) = converter(&dir, FakeEngine::default(), 1);

        let reference = conv.convert(ConversionRequest::new("   ")).await.unwrap();
        assert_eq!(reference.stats.markdown_bytes, 3);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
        assert_eq!(namespace_files(&dir), vec![reference.id.to_string()]);
    }

    #[tokio::test]
    async fn engine_failure_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let engine = FakeEngine {
            fail: true,
            partial_write: true,
            ..Default::default()
        };
        let (conv, _) = converter(&dir, engine, 4);

        let err = conv.convert(ConversionRequest::new("# x")).await.unwrap_err();
        assert!(matches!(err, Md2PdfError::Render(RenderError::Pagination { .. })));
        assert!(!err.is_client_error());
        assert!(namespace_files(&dir).is_empty());
        assert_eq!(conv.available_permits(), 4);
    }

    #[tokio::test]
    async fn missing_output_is_artifact_missing() {
        let dir = TempDir::new().unwrap();
        let engine = FakeEngine {
            skip_write: true,
            ..Default::default()
        };
        let (conv, _) = converter(&dir, engine, 1);
        let err = conv.convert(ConversionRequest::new("# x")).await.unwrap_err();
        assert!(matches!(err, Md2PdfError::ArtifactMissing { .. }));
    }

    #[tokio::test]
    async fn concurrent_conversions_get_distinct_ids_and_respect_gate() {
        let dir = TempDir::new().unwrap();
        let engine = FakeEngine {
            delay: Duration::from_millis(30),
            ..Default::default()
        };
        let (conv, engine) = converter(&dir, engine, 2);
        let conv = Arc::new(conv);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let conv = Arc::clone(&conv);
                tokio::spawn(async move {
                    conv.convert(ConversionRequest::new(format!("# Doc {i}")))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for h in handles {
            assert!(ids.insert(h.await.unwrap().id));
        }
        assert_eq!(ids.len(), 8);
        assert_eq!(namespace_files(&dir).len(), 8);
        assert!(engine.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn convert_to_file_writes_atomically() {
        let dir = TempDir::new().unwrap();
        let (conv, _) = converter(&dir, FakeEngine::default(), 1);
        let out = dir.path().join("nested/out.pdf");

        let stats = conv.convert_to_file("# Title", &out).await.unwrap();
        assert!(std::fs::read(&out).unwrap().starts_with(b"%PDF"));
        assert_eq!(stats.pdf_bytes, std::fs::metadata(&out).unwrap().len());
        assert!(!out.with_extension("pdf.tmp").exists());
        // The artifact namespace is untouched by one-shot conversion.
        assert!(!dir.path().join("temp_files").exists());
    }

    #[tokio::test]
    async fn convert_to_file_failure_removes_temp() {
        let dir = TempDir::new().unwrap();
        let engine = FakeEngine {
            fail: true,
            partial_write: true,
            ..Default::default()
        };
        let (conv, _) = converter(&dir, engine, 1);
        let out = dir.path().join("out.pdf");

        assert!(conv.convert_to_file("# Title", &out).await.is_err());
        assert!(!out.exists());
        assert!(!out.with_extension("pdf.tmp").exists());
    }

    #[tokio::test]
    async fn sweeper_only_with_ttl() {
        let dir = TempDir::new().unwrap();
        let (conv, _) = converter(&dir, FakeEngine::default(), 1);
        assert!(conv.spawn_sweeper().is_none());

        let config = ConversionConfig::builder()
            .output_dir(dir.path().join("swept"))
            .artifact_ttl_secs(Some(3600))
            .build()
            .unwrap();
        let conv = Converter::with_engine(config, Arc::new(FakeEngine::default()));
        let handle = conv.spawn_sweeper().unwrap();
        handle.abort();
    }
}

//! PDF rendering: print an HTML document to a PDF file with headless Chromium.
//!
//! ## One browser per render
//!
//! Every call spawns a fresh browser process with its own throwaway profile
//! directory. Nothing is shared between requests, so a page that crashes or
//! hangs its renderer cannot poison the next document. The cost (a process
//! start per PDF) is bounded by the admission gate in
//! [`crate::convert::Converter`], not here.
//!
//! ## Guaranteed release
//!
//! The child is spawned with `kill_on_drop(true)` and all scratch files live in
//! a [`TempDir`]. Whichever way [`PdfEngine::render`] exits (success, error,
//! timeout, or the caller dropping the future) the process is killed and the
//! scratch directory removed.
//!
//! ## Network idle
//!
//! `--virtual-time-budget` makes Chromium wait until the page has no pending
//! network or timer work (or the budget is spent) before printing, so images
//! and fonts referenced by the document are resolved first.

use crate::config::ConversionConfig;
use crate::error::RenderError;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// A rendering engine that prints an HTML document to a PDF file.
#[async_trait]
pub trait PdfEngine: Send + Sync {
    /// Write a PDF of `html` to `destination`. Must not leave a running
    /// engine behind on any exit path.
    async fn render(&self, html: &str, destination: &Path) -> Result<(), RenderError>;
}

/// [`PdfEngine`] backed by a headless Chromium/Chrome executable.
#[derive(Debug, Clone)]
pub struct ChromiumEngine {
    /// Explicit executable; `None` means auto-detect on first use.
    program: Option<PathBuf>,
    timeout: Duration,
    settle_budget_ms: u64,
}

impl ChromiumEngine {
    pub fn new(program: Option<PathBuf>, timeout: Duration, settle_budget_ms: u64) -> Self {
        Self {
            program,
            timeout,
            settle_budget_ms,
        }
    }

    pub fn from_config(config: &ConversionConfig) -> Self {
        Self::new(
            config.chrome_path.clone(),
            config.render_timeout(),
            config.settle_budget_ms,
        )
    }

    /// Resolve the browser executable, auto-detecting when none was given.
    pub fn program(&self) -> Result<PathBuf, RenderError> {
        chromium_locate::find_browser_with(self.program.as_deref())
            .map_err(|e| RenderError::EngineNotFound(e.to_string()))
    }

    fn args(&self, profile_dir: &Path, page: &Path, destination: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "--headless",
            "--no-sandbox",
            "--disable-setuid-sandbox",
            "--disable-dev-shm-usage",
            "--disable-gpu",
            "--no-first-run",
            "--no-default-browser-check",
            "--hide-scrollbars",
            "--run-all-compositor-stages-before-draw",
            "--no-pdf-header-footer",
        ]
        .iter()
        .map(OsString::from)
        .collect();

        args.push(format!("--virtual-time-budget={}", self.settle_budget_ms).into());
        args.push(prefixed_path("--user-data-dir=", profile_dir));
        args.push(prefixed_path("--print-to-pdf=", destination));
        args.push(file_url(page).into());
        args
    }
}

#[async_trait]
impl PdfEngine for ChromiumEngine {
    async fn render(&self, html: &str, destination: &Path) -> Result<(), RenderError> {
        let start = Instant::now();
        let program = self.program()?;

        // ── Scratch space: page source + isolated browser profile ────────
        let scratch = tempfile::Builder::new()
            .prefix("md2pdf-render-")
            .tempdir()
            .map_err(RenderError::Scratch)?;
        let page = scratch.path().join("document.html");
        tokio::fs::write(&page, html)
            .await
            .map_err(RenderError::Scratch)?;
        let profile_dir = scratch.path().join("profile");

        // ── Launch ───────────────────────────────────────────────────────
        let child = Command::new(&program)
            .args(self.args(&profile_dir, &page, destination))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RenderError::EngineLaunch {
                program: program.clone(),
                source,
            })?;
        debug!("Launched {} (pid {:?})", program.display(), child.id());

        // ── Load, settle, print ──────────────────────────────────────────
        // On timeout the future owning `child` is dropped, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(RenderError::Pagination {
                    exit_code: None,
                    stderr: format!("waiting for engine: {e}"),
                })
            }
            Err(_) => {
                warn!(
                    "Engine {} exceeded {:?}; killed",
                    program.display(),
                    self.timeout
                );
                return Err(RenderError::RenderTimeout {
                    secs: self.timeout.as_secs().max(1),
                });
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(RenderError::Pagination {
                exit_code: output.status.code(),
                stderr,
            });
        }
        if !stderr.is_empty() {
            debug!("Engine stderr: {}", stderr);
        }

        if !has_pdf_magic(destination).await {
            return Err(RenderError::Pagination {
                exit_code: output.status.code(),
                stderr: format!(
                    "engine exited successfully but '{}' is not a PDF",
                    destination.display()
                ),
            });
        }

        info!(
            "Printed {} in {}ms",
            destination.display(),
            start.elapsed().as_millis()
        );
        drop(scratch);
        Ok(())
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn prefixed_path(prefix: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(prefix);
    arg.push(path.as_os_str());
    arg
}

/// `file://` URL for an absolute local path.
fn file_url(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let mut encoded = String::with_capacity(raw.len() + 8);
    for ch in raw.chars() {
        match ch {
            '%' => encoded.push_str("%25"),
            ' ' => encoded.push_str("%20"),
            '#' => encoded.push_str("%23"),
            '?' => encoded.push_str("%3F"),
            c => encoded.push(c),
        }
    }
    if encoded.starts_with('/') {
        format!("file://{encoded}")
    } else {
        format!("file:///{encoded}")
    }
}

async fn has_pdf_magic(path: &Path) -> bool {
    let Ok(mut file) = tokio::fs::File::open(path).await else {
        return false;
    };
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic).await.is_ok() && &magic == b"%PDF"
}


#[cfg(all(test, unix))]
mod fake_engine_tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        let mut perms = std::fs::metadata(&path).expect("metadata").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).expect("set perms");
        path
    }

    /// Writes a minimal PDF to the `--print-to-pdf=` target and logs its args.
    fn printing_script(dir: &Path) -> PathBuf {
        let log = dir.join("args.log");
        script(
            dir,
            "fake-chrome",
            &format!(
                r#"out=""
for arg in "$@"; do
  case "$arg" in
    --print-to-pdf=*) out="${{arg#--print-to-pdf=}}" ;;
  esac
done
printf '%s\n' "$@" > "{log}"
printf '%%PDF-1.4\n%%%%EOF\n' > "$out""#,
                log = log.display()
            ),
        )
    }

    fn engine(program: PathBuf, timeout: Duration) -> ChromiumEngine {
        ChromiumEngine::new(Some(program), timeout, 100)
    }

    #[tokio::test]
    async fn renders_pdf_and_removes_profile() {
        let dir = TempDir::new().unwrap();
        let program = printing_script(dir.path());
        let dest = dir.path().join("out.pdf");

        engine(program, Duration::from_secs(10))
            .render("<h1>Hi</h1>", &dest)
            .await
            .expect("render should succeed");

        let bytes = std::fs::read(&dest).unwrap();
        assert!(bytes.starts_with(b"%PDF"));

        let args = std::fs::read_to_string(dir.path().join("args.log")).unwrap();
        let profile = args
            .lines()
            .find_map(|l| l.strip_prefix("--user-data-dir="))
            .expect("profile arg");
        assert!(
            !Path::new(profile).parent().unwrap().exists(),
            "scratch dir should be removed after render"
        );
    }

    #[tokio::test]
    async fn non_zero_exit_is_pagination_error() {
        let dir = TempDir::new().unwrap();
        let program = script(dir.path(), "crashy", "echo 'renderer crashed' >&2\nexit 3");

        let err = engine(program, Duration::from_secs(10))
            .render("<p>x</p>", &dir.path().join("out.pdf"))
            .await
            .unwrap_err();
        match err {
            RenderError::Pagination { exit_code, stderr } => {
                assert_eq!(exit_code, Some(3));
                assert!(stderr.contains("renderer crashed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn success_without_pdf_is_pagination_error() {
        let dir = TempDir::new().unwrap();
        let program = script(dir.path(), "silent", "exit 0");

        let err = engine(program, Duration::from_secs(10))
            .render("<p>x</p>", &dir.path().join("out.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Pagination { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn hung_engine_times_out() {
        let dir = TempDir::new().unwrap();
        let program = script(dir.path(), "hang", "sleep 30");

        let start = Instant::now();
        let err = engine(program, Duration::from_millis(300))
            .render("<p>x</p>", &dir.path().join("out.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::RenderTimeout { .. }), "got {err:?}");
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn non_executable_program_is_launch_error() {
        let dir = TempDir::new().unwrap();
        let program = dir.path().join("not-executable");
        std::fs::write(&program, b"plain file").unwrap();

        let err = engine(program, Duration::from_secs(5))
            .render("<p>x</p>", &dir.path().join("out.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::EngineLaunch { .. }), "got {err:?}");
    }
}

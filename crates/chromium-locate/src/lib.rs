//! # chromium-locate
//!
//! Find a Chromium or Google Chrome executable that can run in headless mode,
//! so that callers driving `--print-to-pdf` do not need to hard-code browser
//! paths per platform.
//!
//! ## How it works
//!
//! On the first call to [`find_browser`]:
//!
//! 1. Uses `CHROME_PATH` if it is set and points to an existing file.
//! 2. Searches every directory on `PATH` for the usual executable names
//!    (`chromium`, `chromium-browser`, `google-chrome`, `chrome`, …).
//! 3. Checks well-known install locations (`/Applications/…`,
//!    `C:\Program Files\…`, `/snap/bin/chromium`).
//! 4. Scans the puppeteer browser cache (`~/.cache/puppeteer/chrome/…`),
//!    which is where `npx puppeteer browsers install chrome` puts its build.
//!
//! The auto-detected path is cached for the lifetime of the process.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use chromium_locate::{find_browser, find_browser_with};
//! use std::path::Path;
//!
//! // Auto-detect.
//! let chrome = find_browser().expect("no browser installed");
//!
//! // Or insist on an explicit binary (fails if it does not exist).
//! let pinned = find_browser_with(Some(Path::new("/opt/chromium/chrome"))).unwrap();
//! ```
//!
//! ## Environment variable overrides
//!
//! - `CHROME_PATH`: path to a browser executable; skips discovery.
//! - `PUPPETEER_CACHE_DIR`: override the puppeteer cache root.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by chromium-locate.
#[derive(Error, Debug)]
pub enum LocateError {
    /// An explicit path was supplied but nothing exists there.
    #[error("Browser executable '{path}' does not exist")]
    ExplicitMissing { path: PathBuf },

    /// Auto-detection exhausted every candidate.
    #[error(
        "No Chromium/Chrome executable found ({} locations searched).\n\
Install Chromium, or set CHROME_PATH=/path/to/chrome.",
        .searched.len()
    )]
    NotFound { searched: Vec<PathBuf> },
}

// ── Platform candidates ──────────────────────────────────────────────────────

/// Executable names probed on `PATH`, most specific first.
pub fn candidate_names() -> &'static [&'static str] {
    if cfg!(windows) {
        &["chrome.exe", "msedge.exe", "chromium.exe"]
    } else {
        &[
            "chromium",
            "chromium-browser",
            "google-chrome",
            "google-chrome-stable",
            "chrome",
            "headless_shell",
        ]
    }
}

fn well_known_paths() -> Vec<PathBuf> {
    let paths: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
        ]
    } else if cfg!(windows) {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ]
    } else {
        &[
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/google-chrome",
            "/snap/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    };
    paths.iter().map(PathBuf::from).collect()
}

/// Path of the browser binary inside one puppeteer build directory,
/// e.g. `chrome/linux-131.0.6778.85/` + `chrome-linux64/chrome`.
fn puppeteer_binary_suffix() -> Option<&'static str> {
    match (std::env::consts::OS, std::env::consts::ARCH) {
        ("linux", _) => Some("chrome-linux64/chrome"),
        ("macos", "aarch64") => Some(
            "chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
        ),
        ("macos", _) => Some(
            "chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
        ),
        ("windows", "x86") => Some("chrome-win32/chrome.exe"),
        ("windows", _) => Some("chrome-win64/chrome.exe"),
        _ => None,
    }
}

// ── Cache directory resolution ───────────────────────────────────────────────

/// Returns the root of puppeteer's browser cache.
///
/// Default: `~/.cache/puppeteer` on every platform (puppeteer does not use
/// the OS cache directory). Override with `PUPPETEER_CACHE_DIR`.
pub fn puppeteer_cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PUPPETEER_CACHE_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".cache")
        .join("puppeteer")
}

// ── Thread-safe singleton path cache ─────────────────────────────────────────

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Auto-detect a browser executable. See the crate docs for the search order.
pub fn find_browser() -> Result<PathBuf, LocateError> {
    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }

    let path = detect()?;
    let _ = RESOLVED_PATH.set(path.clone());
    Ok(path)
}

/// Use `explicit` when given (it must exist), otherwise [`find_browser`].
pub fn find_browser_with(explicit: Option<&Path>) -> Result<PathBuf, LocateError> {
    match explicit {
        Some(path) if path.is_file() => Ok(path.to_path_buf()),
        Some(path) => Err(LocateError::ExplicitMissing {
            path: path.to_path_buf(),
        }),
        None => find_browser(),
    }
}

/// Search `dirs` for the first file named one of `names`.
pub fn search_dirs<I>(dirs: I, names: &[&str]) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    dirs.into_iter()
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

/// Newest puppeteer-installed Chrome under `cache_root`, if any.
///
/// Build directories are named `<platform>-<version>`; the lexically greatest
/// one wins, which is good enough for same-major-version comparisons.
pub fn find_in_puppeteer_cache(cache_root: &Path) -> Option<PathBuf> {
    let suffix = puppeteer_binary_suffix()?;
    let mut builds: Vec<PathBuf> = std::fs::read_dir(cache_root.join("chrome"))
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    builds.sort();
    builds
        .into_iter()
        .rev()
        .map(|build| build.join(suffix))
        .find(|binary| binary.is_file())
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn detect() -> Result<PathBuf, LocateError> {
    let mut searched = Vec::new();

    // 1. Environment variable override.
    if let Ok(env_path) = std::env::var("CHROME_PATH") {
        let p = PathBuf::from(env_path);
        if p.is_file() {
            return Ok(p);
        }
        searched.push(p);
    }

    // 2. PATH lookup.
    if let Some(path_var) = std::env::var_os("PATH") {
        let dirs: Vec<PathBuf> = std::env::split_paths(&path_var).collect();
        if let Some(found) = search_dirs(dirs.clone(), candidate_names()) {
            return Ok(found);
        }
        searched.extend(dirs);
    }

    // 3. Well-known install locations.
    for p in well_known_paths() {
        if p.is_file() {
            return Ok(p);
        }
        searched.push(p);
    }

    // 4. Puppeteer cache.
    let cache = puppeteer_cache_dir();
    if let Some(found) = find_in_puppeteer_cache(&cache) {
        return Ok(found);
    }
    searched.push(cache);

    Err(LocateError::NotFound { searched })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

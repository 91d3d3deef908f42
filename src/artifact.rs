//! Artifact store: the directory of generated PDFs awaiting their one download.
//!
//! ## Lifecycle
//!
//! ```text
//! reserve() ──render──▶ commit() ──▶ Created ──open_for_download()──▶ Served ──drop──▶ Deleted
//!     │                                                                   ▲
//!     └──── dropped without commit (error / cancellation) ─── file removed┘
//! ```
//!
//! Every path inside the namespace is built here; callers only ever see an
//! [`ArtifactId`] (a bare file name) or a short-lived [`Reservation`] /
//! [`Download`] handle. Both handles delete their file when dropped, so
//! cleanup happens on every exit path without explicit teardown code in the
//! orchestrator or the HTTP layer.
//!
//! There is no index: a file existing on disk *is* the artifact.

use crate::error::{Md2PdfError, ResolveError};
use futures::stream::{self, Stream};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Read size for streaming downloads.
const DOWNLOAD_CHUNK: usize = 64 * 1024;

/// Last millisecond handed out by [`ArtifactStore::allocate_name`], shared by
/// every store in the process.
static LAST_MILLIS: AtomicU64 = AtomicU64::new(0);

static ARTIFACT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^document-\d+\.pdf$").expect("artifact name regex"));

/// Opaque artifact identifier: the file name inside the namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` if `name` has the shape of an id this store hands out.
    pub fn is_generated_name(name: &str) -> bool {
        ARTIFACT_NAME.is_match(name)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactState {
    /// Written, not yet served.
    Created,
    /// Download stream in progress.
    Served,
    /// Removed from disk.
    Deleted,
}

/// A committed artifact.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub id: ArtifactId,
    pub path: PathBuf,
    pub created_at: SystemTime,
    pub size: u64,
    pub state: ArtifactState,
}

/// The managed namespace directory.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    /// Canonical root, set once the directory exists.
    canonical: OnceLock<PathBuf>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            canonical: OnceLock::new(),
        }
    }

    /// The configured (possibly relative) namespace directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the namespace directory if needed and return its canonical path.
    ///
    /// Idempotent and safe to call concurrently.
    pub async fn ensure_namespace(&self) -> Result<PathBuf, Md2PdfError> {
        if let Some(path) = self.canonical.get() {
            if tokio::fs::metadata(path).await.is_ok() {
                return Ok(path.clone());
            }
        }

        let namespace_err = |source| Md2PdfError::Namespace {
            path: self.root.clone(),
            source,
        };
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(namespace_err)?;
        let canonical = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(namespace_err)?;

        let _ = self.canonical.set(canonical.clone());
        Ok(canonical)
    }

    /// Produce a name no other call in this process has produced.
    ///
    /// Names are `document-<unix millis>.pdf`. When two allocations land in
    /// the same millisecond the later one is bumped forward, so the sequence
    /// is strictly increasing.
    pub fn allocate_name(&self) -> ArtifactId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let previous = LAST_MILLIS
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        ArtifactId(format!("document-{}.pdf", now.max(previous + 1)))
    }

    /// Allocate a fresh name and hand out its destination path.
    ///
    /// The returned [`Reservation`] removes whatever was written to the path
    /// unless [`Reservation::commit`] succeeds.
    pub async fn reserve(&self) -> Result<Reservation, Md2PdfError> {
        let root = self.ensure_namespace().await?;
        let id = self.allocate_name();
        let path = root.join(id.as_str());
        debug!("Reserved artifact {}", id);
        Ok(Reservation {
            id,
            path,
            armed: true,
        })
    }

    /// Resolve a client-supplied identifier to a file inside the namespace.
    ///
    /// The identifier is validated before the filesystem is touched: anything
    /// that is not a single plain file name is `Forbidden`. Only then is
    /// existence checked (`NotFound`). Symlinks are never served.
    pub async fn resolve_for_download(&self, id: &str) -> Result<PathBuf, ResolveError> {
        if !is_plain_file_name(id) {
            warn!("Rejected download outside namespace: {:?}", id);
            return Err(ResolveError::Forbidden);
        }

        let root = match self.canonical.get() {
            Some(root) => root.clone(),
            None => tokio::fs::canonicalize(&self.root)
                .await
                .map_err(|_| ResolveError::NotFound)?,
        };
        let path = root.join(id);
        if path.parent() != Some(root.as_path()) {
            return Err(ResolveError::Forbidden);
        }

        match tokio::fs::symlink_metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => Err(ResolveError::NotFound),
        }
    }

    /// Open an artifact for its single download.
    ///
    /// The returned [`Download`] marks the artifact `Served`; dropping it (or
    /// finishing its stream) deletes the file.
    pub async fn open_for_download(&self, id: &str) -> Result<Download, ResolveError> {
        let path = self.resolve_for_download(id).await?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|_| ResolveError::NotFound)?;
        let len = file
            .metadata()
            .await
            .map(|m| m.len())
            .map_err(|_| ResolveError::NotFound)?;

        debug!("Serving artifact {} ({} bytes)", id, len);
        Ok(Download {
            id: ArtifactId(id.to_string()),
            len,
            file,
            guard: ConsumeGuard { path: Some(path) },
        })
    }

    /// Delete a served artifact. Failures are logged, never returned.
    ///
    /// Returns `true` only if this call removed the file.
    pub async fn consume(&self, path: &Path) -> bool {
        match tokio::fs::remove_file(path).await {
            Ok(()) => true,
            Err(e) => {
                log_cleanup_failure(path, &e);
                false
            }
        }
    }

    /// Best-effort removal of an artifact that will never be served.
    pub async fn discard(&self, id: &ArtifactId) {
        let Some(root) = self.canonical.get() else {
            return;
        };
        if !is_plain_file_name(id.as_str()) {
            return;
        }
        let path = root.join(id.as_str());
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!("Discarded artifact {}", id),
            Err(e) => log_cleanup_failure(&path, &e),
        }
    }

    /// Remove generated artifacts whose last modification is older than `ttl`.
    ///
    /// Returns how many files were deleted. Files not named like a generated
    /// artifact are left alone.
    pub async fn sweep_expired(&self, ttl: Duration) -> usize {
        let Some(root) = self.canonical.get().cloned() else {
            return 0;
        };
        let Ok(mut entries) = tokio::fs::read_dir(&root).await else {
            return 0;
        };
        let cutoff = SystemTime::now().checked_sub(ttl).unwrap_or(UNIX_EPOCH);

        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            if !ArtifactId::is_generated_name(&name.to_string_lossy()) {
                continue;
            }
            let Ok(modified) = entry.metadata().await.and_then(|m| m.modified()) else {
                continue;
            };
            if modified <= cutoff && self.consume(&entry.path()).await {
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Swept {} expired artifact(s) from {}", removed, root.display());
        }
        removed
    }

    /// Run [`ArtifactStore::sweep_expired`] every `interval` on the runtime.
    pub fn spawn_sweeper(self: Arc<Self>, ttl: Duration, interval: Duration) -> JoinHandle<()> {
        info!(
            "Artifact sweeper: ttl {}s, every {}s",
            ttl.as_secs(),
            interval.as_secs()
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.sweep_expired(ttl).await;
            }
        })
    }
}

/// A reserved artifact path that is cleaned up unless committed.
#[derive(Debug)]
pub struct Reservation {
    id: ArtifactId,
    path: PathBuf,
    armed: bool,
}

impl Reservation {
    pub fn id(&self) -> &ArtifactId {
        &self.id
    }

    /// Where the engine should write the PDF.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Confirm the file exists and promote it to a `Created` artifact.
    pub async fn commit(mut self) -> Result<Artifact, Md2PdfError> {
        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.is_file() => meta,
            _ => {
                return Err(Md2PdfError::ArtifactMissing {
                    id: self.id.to_string(),
                })
            }
        };
        self.armed = false;
        Ok(Artifact {
            id: self.id.clone(),
            path: self.path.clone(),
            created_at: meta.modified().unwrap_or_else(|_| SystemTime::now()),
            size: meta.len(),
            state: ArtifactState::Created,
        })
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Discarded uncommitted artifact {}", self.id),
            Err(e) => log_cleanup_failure(&self.path, &e),
        }
    }
}

/// An artifact being served. Deletes the file when dropped.
#[derive(Debug)]
pub struct Download {
    id: ArtifactId,
    len: u64,
    file: tokio::fs::File,
    guard: ConsumeGuard,
}

impl Download {
    pub fn id(&self) -> &ArtifactId {
        &self.id
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn state(&self) -> ArtifactState {
        self.guard.state()
    }

    /// Stream the file in chunks. The file is deleted when the stream ends
    /// or is dropped early (client disconnect).
    pub fn into_stream(self) -> impl Stream<Item = std::io::Result<Vec<u8>>> + Send + 'static {
        // Field order matters: the file handle closes before the guard deletes.
        struct Body {
            file: tokio::fs::File,
            _guard: ConsumeGuard,
        }

        let body = Body {
            file: self.file,
            _guard: self.guard,
        };
        stream::unfold(Some(body), |state| async move {
            let mut body = state?;
            let mut buf = vec![0u8; DOWNLOAD_CHUNK];
            match body.file.read(&mut buf).await {
                Ok(0) => None,
                Ok(n) => {
                    buf.truncate(n);
                    Some((Ok(buf), Some(body)))
                }
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

/// Deletes the served file when dropped.
#[derive(Debug)]
struct ConsumeGuard {
    path: Option<PathBuf>,
}

impl ConsumeGuard {
    fn state(&self) -> ArtifactState {
        if self.path.is_some() {
            ArtifactState::Served
        } else {
            ArtifactState::Deleted
        }
    }
}

impl Drop for ConsumeGuard {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => debug!("Consumed artifact {}", path.display()),
            Err(e) => log_cleanup_failure(&path, &e),
        }
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// A single normal path component with no separators or NULs.
fn is_plain_file_name(id: &str) -> bool {
    if id.is_empty() || id.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut components = Path::new(id).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn log_cleanup_failure(path: &Path, e: &std::io::Error) {
    if e.kind() == std::io::ErrorKind::NotFound {
        debug!("Artifact {} already gone", path.display());
    } else {
        warn!("Failed to delete artifact {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::collections::HashSet;
    use tempfile::TempDir;

    async fn store_in(dir: &TempDir) -> Arc<ArtifactStore> {
        let store = Arc::new(ArtifactStore::new(dir.path().join("temp_files")));
        store.ensure_namespace().await.unwrap();
        store
    }

    async fn write_artifact(store: &ArtifactStore, body: &[u8]) -> Artifact {
        let reservation = store.reserve().await.unwrap();
        std::fs::write(reservation.path(), body).unwrap();
        reservation.commit().await.unwrap()
    }

    #[tokio::test]
    async fn ensure_namespace_is_idempotent_and_concurrent() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ArtifactStore::new(dir.path().join("a/b/c")));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.ensure_namespace().await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }
        let again = store.ensure_namespace().await.unwrap();
        assert!(again.is_dir());
        assert!(again.is_absolute());
    }

    #[test]
    fn allocated_names_are_unique_and_well_formed() {
        let store = Arc::new(ArtifactStore::new("unused"));
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    (0..500).map(|_| store.allocate_name()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for t in threads {
            for id in t.join().unwrap() {
                assert!(ArtifactId::is_generated_name(id.as_str()), "bad name {id}");
                assert!(seen.insert(id), "duplicate name");
            }
        }
        assert_eq!(seen.len(), 2000);
    }

    #[test]
    fn stores_sharing_a_directory_never_share_a_name() {
        let threads: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    let store = ArtifactStore::new("shared");
                    (0..500).map(|_| store.allocate_name()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for t in threads {
            for id in t.join().unwrap() {
                assert!(seen.insert(id), "duplicate name across stores");
            }
        }
        assert_eq!(seen.len(), 2000);
    }

    #[test]
    fn plain_file_names() {
        assert!(is_plain_file_name("document-1.pdf"));
        assert!(is_plain_file_name("..pdf"));
        for bad in ["", ".", "..", "../x.pdf", "../../etc/passwd", "a/b.pdf", "/etc/passwd", "a\\b", "x\0y"] {
            assert!(!is_plain_file_name(bad), "{bad:?} should be rejected");
        }
    }

    #[tokio::test]
    async fn traversal_is_forbidden_even_without_namespace() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("never-created"));
        assert_eq!(
            store.resolve_for_download("../../etc/passwd").await,
            Err(ResolveError::Forbidden)
        );
        assert_eq!(
            store.resolve_for_download("document-1.pdf").await,
            Err(ResolveError::NotFound)
        );
    }

    #[tokio::test]
    async fn resolve_existing_and_missing() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let artifact = write_artifact(&store, b"%PDF-1.4").await;
        assert_eq!(artifact.state, ArtifactState::Created);
        assert_eq!(artifact.size, 8);

        let path = store
            .resolve_for_download(artifact.id.as_str())
            .await
            .unwrap();
        assert_eq!(path, artifact.path);
        assert!(path.starts_with(store.ensure_namespace().await.unwrap()));

        assert_eq!(
            store.resolve_for_download("document-42.pdf").await,
            Err(ResolveError::NotFound)
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_are_not_served() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let outside = dir.path().join("secret.txt");
        std::fs::write(&outside, b"secret").unwrap();
        let root = store.ensure_namespace().await.unwrap();
        std::os::unix::fs::symlink(&outside, root.join("document-7.pdf")).unwrap();

        assert_eq!(
            store.resolve_for_download("document-7.pdf").await,
            Err(ResolveError::NotFound)
        );
    }

    #[tokio::test]
    async fn uncommitted_reservation_is_discarded() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let reservation = store.reserve().await.unwrap();
        let path = reservation.path().to_path_buf();
        std::fs::write(&path, b"partial").unwrap();
        drop(reservation);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn discard_removes_committed_artifact() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let artifact = write_artifact(&store, b"%PDF").await;
        store.discard(&artifact.id).await;
        assert!(!artifact.path.exists());
        // Second discard is a no-op.
        store.discard(&artifact.id).await;
    }

    #[tokio::test]
    async fn commit_without_file_is_artifact_missing() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let reservation = store.reserve().await.unwrap();
        let err = reservation.commit().await.unwrap_err();
        assert!(matches!(err, Md2PdfError::ArtifactMissing { .. }));
    }

    #[tokio::test]
    async fn download_streams_then_deletes() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let payload = vec![b'x'; DOWNLOAD_CHUNK * 2 + 17];
        let artifact = write_artifact(&store, &payload).await;

        let download = store.open_for_download(artifact.id.as_str()).await.unwrap();
        assert_eq!(download.len(), payload.len() as u64);
        assert_eq!(download.state(), ArtifactState::Served);

        let chunks: Vec<_> = download.into_stream().collect().await;
        let body: Vec<u8> = chunks.into_iter().flat_map(|c| c.unwrap()).collect();
        assert_eq!(body, payload);
        assert!(!artifact.path.exists());

        assert_eq!(
            store.open_for_download(artifact.id.as_str()).await.unwrap_err(),
            ResolveError::NotFound
        );
    }

    #[tokio::test]
    async fn abandoned_download_still_deletes() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let artifact = write_artifact(&store, &vec![0u8; DOWNLOAD_CHUNK * 3]).await;

        let mut stream = Box::pin(
            store
                .open_for_download(artifact.id.as_str())
                .await
                .unwrap()
                .into_stream(),
        );
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.len(), DOWNLOAD_CHUNK);
        drop(stream);
        assert!(!artifact.path.exists());
    }

    #[tokio::test]
    async fn consume_missing_file_is_silent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        assert!(!store.consume(&dir.path().join("nope.pdf")).await);

        let artifact = write_artifact(&store, b"%PDF").await;
        assert!(store.consume(&artifact.path).await);
        assert!(!artifact.path.exists());
    }

    #[tokio::test]
    async fn sweep_counts_only_successful_deletes() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let root = store.ensure_namespace().await.unwrap();
        let stuck = root.join("document-5.pdf");
        std::fs::create_dir(&stuck).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let removed = store.sweep_expired(Duration::from_millis(10)).await;
        assert_eq!(removed, 0);
        assert!(stuck.exists());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_generated_files() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let root = store.ensure_namespace().await.unwrap();

        let old = write_artifact(&store, b"%PDF old").await;
        let fresh = write_artifact(&store, b"%PDF new").await;
        let unrelated = root.join("keep-me.txt");
        std::fs::write(&unrelated, b"x").unwrap();

        let two_hours_ago = SystemTime::now() - Duration::from_secs(7200);
        for path in [&old.path, &unrelated] {
            std::fs::File::options()
                .write(true)
                .open(path)
                .unwrap()
                .set_modified(two_hours_ago)
                .unwrap();
        }

        let removed = store.sweep_expired(Duration::from_secs(3600)).await;
        assert_eq!(removed, 1);
        assert!(!old.path.exists());
        assert!(fresh.path.exists());
        assert!(unrelated.exists());
    }
}

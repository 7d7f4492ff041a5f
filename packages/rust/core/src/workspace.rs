//! Per-user workspace directories.
//!
//! Every user gets one subtree under the workspace root:
//! ```text
//! <root>/<user_id>/
//! ├── data/    ranking data and keyword selection (JSON)
//! ├── crew/    stage artifacts (Markdown)
//! ├── doc/     converted documents (.docx)
//! └── blogs/   blog post, research notes, run log
//! ```
//! All reads and writes for a user go through [`UserWorkspace`], which only
//! accepts fixed file names joined under its own directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use seoforge_shared::{Result, SeoforgeError, UserId};

/// The four subdirectories of a user workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    Data,
    Crew,
    Doc,
    Blogs,
}

impl Area {
    pub const ALL: [Area; 4] = [Area::Data, Area::Crew, Area::Doc, Area::Blogs];

    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Crew => "crew",
            Self::Doc => "doc",
            Self::Blogs => "blogs",
        }
    }
}

// ---------------------------------------------------------------------------
// WorkspaceRoot
// ---------------------------------------------------------------------------

/// The directory holding every user's workspace.
#[derive(Debug, Clone)]
pub struct WorkspaceRoot {
    root: PathBuf,
}

impl WorkspaceRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Handle to a user's workspace without touching the filesystem.
    pub fn open(&self, user_id: &UserId) -> UserWorkspace {
        UserWorkspace {
            dir: self.root.join(user_id.as_str()),
            user_id: user_id.clone(),
        }
    }

    /// Create the user's workspace (all four areas) if missing. Idempotent.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn ensure(&self, user_id: &UserId) -> Result<UserWorkspace> {
        let ws = self.open(user_id);
        for area in Area::ALL {
            let dir = ws.area(area);
            std::fs::create_dir_all(&dir).map_err(|e| SeoforgeError::workspace(&dir, e))?;
        }
        debug!(path = %ws.dir.display(), "workspace ready");
        Ok(ws)
    }

    /// Remove the user's workspace recursively.
    ///
    /// Returns `false` when there was nothing to remove. Permission failures
    /// are retried once after clearing read-only flags across the tree.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn destroy(&self, user_id: &UserId) -> Result<bool> {
        let dir = self.root.join(user_id.as_str());

        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %dir.display(), "no workspace to remove");
                return Ok(false);
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                warn!(path = %dir.display(), error = %e, "removal denied, forcing");
                make_writable(&dir);
                std::fs::remove_dir_all(&dir).map_err(|e| SeoforgeError::workspace(&dir, e))?;
            }
            Err(e) => return Err(SeoforgeError::workspace(&dir, e)),
        }

        info!(path = %dir.display(), "workspace removed");
        Ok(true)
    }
}

/// Best-effort: clear read-only permissions on everything under `path`.
fn make_writable(path: &Path) {
    let Ok(meta) = std::fs::symlink_metadata(path) else {
        return;
    };
    if meta.file_type().is_symlink() {
        return;
    }

    let mut perms = meta.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let extra = if meta.is_dir() { 0o700 } else { 0o600 };
        perms.set_mode(perms.mode() | extra);
    }
    #[cfg(not(unix))]
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    let _ = std::fs::set_permissions(path, perms);

    if meta.is_dir() {
        if let Ok(entries) = std::fs::read_dir(path) {
            for entry in entries.flatten() {
                make_writable(&entry.path());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// UserWorkspace
// ---------------------------------------------------------------------------

/// One user's workspace directory.
#[derive(Debug, Clone)]
pub struct UserWorkspace {
    user_id: UserId,
    dir: PathBuf,
}

impl UserWorkspace {
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    pub fn area(&self, area: Area) -> PathBuf {
        self.dir.join(area.dir_name())
    }

    pub fn path(&self, area: Area, file_name: &str) -> PathBuf {
        self.area(area).join(file_name)
    }

    /// Path relative to the workspace directory, for logs and the run ledger.
    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    /// Write `content` atomically (temp file, then rename), overwriting.
    pub fn write_atomic(&self, area: Area, file_name: &str, content: &[u8]) -> Result<PathBuf> {
        let dir = self.area(area);
        std::fs::create_dir_all(&dir).map_err(|e| SeoforgeError::workspace(&dir, e))?;

        let target = dir.join(file_name);
        let temp = dir.join(format!(".{file_name}.tmp"));

        std::fs::write(&temp, content).map_err(|e| SeoforgeError::io(&temp, e))?;
        std::fs::rename(&temp, &target).map_err(|e| SeoforgeError::io(&target, e))?;

        debug!(path = %target.display(), size = content.len(), "wrote file");
        Ok(target)
    }

    /// Write pretty-printed JSON atomically.
    pub fn write_json<T: Serialize>(&self, area: Area, file_name: &str, data: &T) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(data).map_err(|e| {
            SeoforgeError::validation(format!("JSON serialization failed: {e}"))
        })?;
        self.write_atomic(area, file_name, json.as_bytes())
    }

    /// Read a file as UTF-8, `None` if it does not exist.
    pub fn read_to_string(&self, area: Area, file_name: &str) -> Result<Option<String>> {
        let path = self.path(area, file_name);
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SeoforgeError::io(&path, e)),
        }
    }

    /// Read and parse a JSON file, `None` if it does not exist.
    pub fn read_json<T: DeserializeOwned>(&self, area: Area, file_name: &str) -> Result<Option<T>> {
        let Some(content) = self.read_to_string(area, file_name)? else {
            return Ok(None);
        };
        let path = self.path(area, file_name);
        serde_json::from_str(&content).map(Some).map_err(|e| {
            SeoforgeError::validation(format!("invalid JSON in {}: {e}", path.display()))
        })
    }

    /// Remove a file if present.
    pub fn remove(&self, area: Area, file_name: &str) -> Result<()> {
        let path = self.path(area, file_name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SeoforgeError::io(&path, e)),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkspaceLocks
// ---------------------------------------------------------------------------

/// Per-user async locks. Holding a user's guard serializes runs and cleanup
/// against that user's workspace; different users never contend.
///
/// An entry lives only while some guard holds or awaits it.
#[derive(Default)]
pub struct WorkspaceLocks {
    locks: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

impl WorkspaceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user_id`'s workspace.
    pub async fn lock(&self, user_id: &UserId) -> WorkspaceGuard<'_> {
        let lock = {
            let mut map = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            map.entry(user_id.clone()).or_default().clone()
        };
        WorkspaceGuard {
            locks: self,
            user_id: user_id.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    fn release(&self, user_id: &UserId) {
        let mut map = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(lock) = map.get(user_id) {
            // Someone else still holds or awaits it.
            if Arc::strong_count(lock) > 1 {
                return;
            }
        }
        map.remove(user_id);
    }

    #[cfg(test)]
    fn entries(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

/// Exclusive access to one user's workspace. Dropping it unlocks the user and
/// removes the map entry once nobody else is waiting.
pub struct WorkspaceGuard<'a> {
    locks: &'a WorkspaceLocks,
    user_id: UserId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for WorkspaceGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_root() -> WorkspaceRoot {
        let dir = std::env::temp_dir().join(format!("seoforge-ws-test-{}", Uuid::now_v7()));
        WorkspaceRoot::new(dir)
    }

    #[test]
    fn ensure_creates_all_areas_idempotently() {
        let root = temp_root();
        let user = UserId::generate();

        let ws = root.ensure(&user).unwrap();
        for area in Area::ALL {
            assert!(ws.area(area).is_dir(), "{} missing", area.dir_name());
        }
        ws.write_atomic(Area::Crew, "analysis.md", b"keep").unwrap();

        root.ensure(&user).unwrap();
        assert_eq!(
            ws.read_to_string(Area::Crew, "analysis.md").unwrap().as_deref(),
            Some("keep")
        );

        let _ = std::fs::remove_dir_all(root.path());
    }

    #[test]
    fn destroy_then_ensure_yields_fresh_workspace() {
        let root = temp_root();
        let user = UserId::generate();

        let ws = root.ensure(&user).unwrap();
        ws.write_atomic(Area::Data, "user_rankings.json", b"{}").unwrap();
        ws.write_atomic(Area::Blogs, "blog_post.md", b"# Post").unwrap();

        assert!(root.destroy(&user).unwrap());
        assert!(!ws.exists());

        let ws = root.ensure(&user).unwrap();
        for area in Area::ALL {
            let count = std::fs::read_dir(ws.area(area)).unwrap().count();
            assert_eq!(count, 0, "{} not empty", area.dir_name());
        }

        let _ = std::fs::remove_dir_all(root.path());
    }

    #[test]
    fn destroy_missing_workspace_is_ok() {
        let root = temp_root();
        assert!(!root.destroy(&UserId::generate()).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn destroy_forces_read_only_tree() {
        use std::os::unix::fs::PermissionsExt;

        let root = temp_root();
        let user = UserId::generate();
        let ws = root.ensure(&user).unwrap();
        ws.write_atomic(Area::Doc, "analysis.docx", b"bytes").unwrap();

        let doc = ws.area(Area::Doc);
        std::fs::set_permissions(&doc, std::fs::Permissions::from_mode(0o555)).unwrap();

        assert!(root.destroy(&user).unwrap());
        assert!(!ws.exists());

        let _ = std::fs::remove_dir_all(root.path());
    }

    #[test]
    fn atomic_write_leaves_no_temp_files() {
        let root = temp_root();
        let ws = root.ensure(&UserId::generate()).unwrap();

        ws.write_atomic(Area::Crew, "ad_copies.md", b"one").unwrap();
        ws.write_atomic(Area::Crew, "ad_copies.md", b"two").unwrap();

        let names: Vec<_> = std::fs::read_dir(ws.area(Area::Crew))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["ad_copies.md"]);
        assert_eq!(
            ws.read_to_string(Area::Crew, "ad_copies.md").unwrap().as_deref(),
            Some("two")
        );

        let _ = std::fs::remove_dir_all(root.path());
    }

    #[test]
    fn read_missing_and_remove_missing() {
        let root = temp_root();
        let ws = root.ensure(&UserId::generate()).unwrap();

        assert!(ws.read_to_string(Area::Data, "nope.json").unwrap().is_none());
        assert!(ws.read_json::<serde_json::Value>(Area::Data, "nope.json").unwrap().is_none());
        ws.remove(Area::Data, "nope.json").unwrap();

        let _ = std::fs::remove_dir_all(root.path());
    }

    #[test]
    fn relative_paths_use_forward_slashes() {
        let root = temp_root();
        let ws = root.open(&UserId::generate());
        let path = ws.path(Area::Crew, "analysis.md");
        assert_eq!(ws.relative(&path), "crew/analysis.md");
    }

    #[tokio::test]
    async fn locks_serialize_same_user() {
        let locks = Arc::new(WorkspaceLocks::new());
        let user = UserId::generate();

        let guard = locks.lock(&user).await;
        let other = UserId::generate();
        // Different user is not blocked.
        let _other_guard = locks.lock(&other).await;

        let locks2 = Arc::clone(&locks);
        let user2 = user.clone();
        let waiter = tokio::spawn(async move {
            let _g = locks2.lock(&user2).await;
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn released_locks_leave_no_entries() {
        let locks = WorkspaceLocks::new();
        for _ in 0..1000 {
            let user = UserId::generate();
            let _guard = locks.lock(&user).await;
        }
        assert_eq!(locks.entries(), 0);
    }

    #[tokio::test]
    async fn entry_survives_while_another_task_waits() {
        let locks = Arc::new(WorkspaceLocks::new());
        let user = UserId::generate();

        let guard = locks.lock(&user).await;
        let locks2 = Arc::clone(&locks);
        let user2 = user.clone();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let waiter = tokio::spawn(async move {
            let _g = locks2.lock(&user2).await;
            let _ = rx.await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        drop(guard);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        // The waiter now holds the lock, so the entry is still in use.
        assert_eq!(locks.entries(), 1);

        tx.send(()).unwrap();
        waiter.await.unwrap();
        assert_eq!(locks.entries(), 0);
    }
}

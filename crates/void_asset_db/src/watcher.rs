//! File system watcher bridge.
//!
//! The OS watcher delivers events on its own thread. The handler only
//! records them in a [`PendingChangeSet`]; the main tick takes a snapshot
//! with [`WatcherBridge::lock`], which is where the index gets updated.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

#[cfg(feature = "file-watcher")]
use notify::event::{ModifyKind, RenameMode};
#[cfg(feature = "file-watcher")]
use notify::{Event, EventKind, RecursiveMode, Watcher};

use crate::error::AssetResult;
use crate::index::{AssetIndex, NodeId};
use crate::path;

/// Structural changes reported since the last [`WatcherBridge::lock`].
///
/// Paths are normalized full paths. Sidecar paths never enter the set, and
/// a path sits in at most one of the add, delete and rename lists; the
/// latest event for a path decides which.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingChangeSet {
    add: Vec<String>,
    delete: Vec<String>,
    /// Renames reported without a direction; resolved at lock time
    uncertain: Vec<String>,
    modified: usize,
}

impl PendingChangeSet {
    /// Record a created path. Cancels a pending delete of the same path.
    pub fn on_add(&mut self, full_path: &str) {
        let full_path = path::normalize(full_path);
        if path::is_meta(&full_path) {
            return;
        }

        self.delete.retain(|p| *p != full_path);
        self.uncertain.retain(|p| *p != full_path);
        if !self.add.contains(&full_path) {
            self.add.push(full_path);
        }
    }

    /// Record a removed path. A path still waiting to be added is dropped
    /// from the add queue instead.
    pub fn on_delete(&mut self, full_path: &str) {
        let full_path = path::normalize(full_path);
        if path::is_meta(&full_path) {
            return;
        }

        // May have been indexed before the rename, so it is not a plain cancel
        if let Some(pos) = self.uncertain.iter().position(|p| *p == full_path) {
            self.uncertain.remove(pos);
        } else if let Some(pos) = self.add.iter().position(|p| *p == full_path) {
            self.add.remove(pos);
            return;
        }
        if !self.delete.contains(&full_path) {
            self.delete.push(full_path);
        }
    }

    /// Record a path that was renamed either to or from. Replaces any
    /// pending add or delete of the path; which one it is gets decided at
    /// lock time.
    pub fn on_renamed(&mut self, full_path: &str) {
        let full_path = path::normalize(full_path);
        if path::is_meta(&full_path) {
            return;
        }

        self.add.retain(|p| *p != full_path);
        self.delete.retain(|p| *p != full_path);
        if !self.uncertain.contains(&full_path) {
            self.uncertain.push(full_path);
        }
    }

    /// Content changes are counted but do not trigger a re-import
    pub fn on_modified(&mut self, full_path: &str) {
        if !path::is_meta(full_path) {
            self.modified += 1;
        }
    }

    pub fn add(&self) -> &[String] {
        &self.add
    }

    pub fn delete(&self) -> &[String] {
        &self.delete
    }

    /// Renamed paths whose direction is not known yet
    pub fn uncertain(&self) -> &[String] {
        &self.uncertain
    }

    /// Content modifications seen since the last lock
    pub fn modified(&self) -> usize {
        self.modified
    }

    /// No structural change is pending
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.delete.is_empty() && self.uncertain.is_empty()
    }
}

/// Map a native event onto the change set.
#[cfg(feature = "file-watcher")]
pub(crate) fn apply_event(pending: &Mutex<PendingChangeSet>, event: Event) {
    let paths: Vec<String> = event
        .paths
        .iter()
        .map(|p| path::normalize(&p.to_string_lossy()))
        .collect();
    log::trace!("Watch event {:?} {:?}", event.kind, paths);

    let mut set = pending.lock();
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.iter().for_each(|p| set.on_add(p));
        }
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.iter().for_each(|p| set.on_delete(p));
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if let [from, to] = paths.as_slice() {
                set.on_delete(from);
                set.on_add(to);
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            paths.iter().for_each(|p| set.on_renamed(p));
        }
        EventKind::Modify(_) => {
            paths.iter().for_each(|p| set.on_modified(p));
        }
        _ => {}
    }
}

/// Bridges OS change notifications to the asset index.
pub struct WatcherBridge {
    root: PathBuf,
    root_str: String,
    /// The root as given, when it differs from the resolved one
    alias_str: Option<String>,
    pending: Arc<Mutex<PendingChangeSet>>,
    #[cfg(feature = "file-watcher")]
    watcher: Option<notify::RecommendedWatcher>,
    locked: Vec<NodeId>,
    locked_deleted: Vec<String>,
    is_locked: bool,
}

impl WatcherBridge {
    /// Bridge for the asset root `root`.
    ///
    /// The root is resolved with [`path::resolve_root`]. Paths reported under
    /// the root as it was given are accepted too.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let given = root.into();
        let root = path::resolve_root(&given);
        let root_str = path::normalize(&root.to_string_lossy());

        let given = if given.is_absolute() {
            given
        } else {
            std::env::current_dir().map(|cwd| cwd.join(&given)).unwrap_or(given)
        };
        let alias_str = Some(path::normalize(&given.to_string_lossy())).filter(|a| *a != root_str);

        Self {
            root,
            root_str,
            alias_str,
            pending: Arc::new(Mutex::new(PendingChangeSet::default())),
            #[cfg(feature = "file-watcher")]
            watcher: None,
            locked: Vec::new(),
            locked_deleted: Vec::new(),
            is_locked: false,
        }
    }

    /// Start watching the asset root recursively
    #[cfg(feature = "file-watcher")]
    pub fn begin_watch(&mut self) -> AssetResult<()> {
        if self.watcher.is_some() {
            return Ok(());
        }

        let pending = Arc::clone(&self.pending);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => apply_event(&pending, event),
            Err(e) => log::trace!("Watch error: {}", e),
        })?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;

        log::info!("Watching asset root: {:?}", self.root);
        self.watcher = Some(watcher);
        Ok(())
    }

    /// Start watching (no-op without file-watcher feature)
    #[cfg(not(feature = "file-watcher"))]
    pub fn begin_watch(&mut self) -> AssetResult<()> {
        log::warn!("File watching is disabled in this build");
        Ok(())
    }

    /// Stop watching. Safe to call when not watching.
    #[cfg(feature = "file-watcher")]
    pub fn end_watch(&mut self) {
        if self.watcher.take().is_some() {
            log::info!("Stopped watching asset root: {:?}", self.root);
        }
    }

    /// Stop watching (no-op without file-watcher feature)
    #[cfg(not(feature = "file-watcher"))]
    pub fn end_watch(&mut self) {}

    #[cfg(feature = "file-watcher")]
    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    #[cfg(not(feature = "file-watcher"))]
    pub fn is_watching(&self) -> bool {
        false
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Report a created file or folder
    pub fn on_add(&self, full_path: impl AsRef<Path>) {
        self.pending.lock().on_add(&full_path.as_ref().to_string_lossy());
    }

    /// Report a removed file or folder
    pub fn on_delete(&self, full_path: impl AsRef<Path>) {
        self.pending.lock().on_delete(&full_path.as_ref().to_string_lossy());
    }

    /// Report a content change
    pub fn on_modified(&self, full_path: impl AsRef<Path>) {
        self.pending.lock().on_modified(&full_path.as_ref().to_string_lossy());
    }

    /// Copy of the changes not yet taken by [`lock`](Self::lock)
    pub fn pending(&self) -> PendingChangeSet {
        self.pending.lock().clone()
    }

    /// Whether a change is waiting or a locked batch is still in progress
    pub fn need_reimport(&self) -> bool {
        !self.pending.lock().is_empty() || !self.locked.is_empty() || !self.locked_deleted.is_empty()
    }

    /// Take the pending changes and apply the additions to the index.
    ///
    /// Returns the handles of the added nodes (with the contents of added
    /// folders). Events arriving after this call accumulate for the next
    /// lock. Calling it again before [`unlock`](Self::unlock) returns the
    /// same snapshot.
    pub fn lock(&mut self, index: &mut AssetIndex) -> &[NodeId] {
        if self.is_locked {
            return &self.locked;
        }
        self.is_locked = true;

        let changes = std::mem::take(&mut *self.pending.lock());

        let mut added = changes.add;
        let mut deleted = changes.delete;
        for full in changes.uncertain {
            if Path::new(&full).exists() {
                added.push(full);
            } else {
                deleted.push(full);
            }
        }

        let mut seen = HashSet::new();
        for full in added {
            let Some(short) = self.short_path(&full) else {
                continue;
            };
            let bundle = path::bundle_name(&short);
            for id in index.add_tree(&bundle, &self.root.join(&short)) {
                if seen.insert(id) {
                    self.locked.push(id);
                }
            }
        }

        for full in deleted {
            if let Some(short) = self.short_path(&full) {
                if !self.locked_deleted.contains(&short) {
                    self.locked_deleted.push(short);
                }
            }
        }

        if changes.modified > 0 {
            log::debug!("Ignoring {} content modifications", changes.modified);
        }
        log::debug!(
            "Locked {} added and {} deleted assets",
            self.locked.len(),
            self.locked_deleted.len()
        );
        &self.locked
    }

    pub fn is_locked(&self) -> bool {
        self.is_locked
    }

    /// Nodes added by the current lock
    pub fn locked(&self) -> &[NodeId] {
        &self.locked
    }

    /// Short paths deleted in the current lock
    pub fn locked_deleted(&self) -> &[String] {
        &self.locked_deleted
    }

    /// Release the snapshot taken by [`lock`](Self::lock)
    pub fn unlock(&mut self) {
        self.locked.clear();
        self.locked_deleted.clear();
        self.is_locked = false;
    }

    fn short_path(&self, full: &str) -> Option<String> {
        let under = |root: &str| {
            let short = path::short_path(full, root);
            Some(short).filter(|s| !s.is_empty() && s != full)
        };

        let short = under(&self.root_str).or_else(|| self.alias_str.as_deref().and_then(under));
        if short.is_none() {
            log::debug!("Ignoring change outside asset root: {}", full);
        }
        short
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_add_then_delete_cancels() {
        let mut set = PendingChangeSet::default();
        set.on_add("/p/Assets/x.png");
        set.on_delete("/p/Assets/x.png");
        assert!(set.add().is_empty());
        assert!(set.delete().is_empty());
        assert!(set.is_empty());
    }

    #[test]
    fn test_delete_then_add_keeps_add() {
        let mut set = PendingChangeSet::default();
        set.on_delete("/p/Assets/x.png");
        set.on_add("/p/Assets/x.png");
        assert_eq!(set.add(), ["/p/Assets/x.png".to_string()]);
        assert!(set.delete().is_empty());
    }

    #[test]
    fn test_rename_replaces_pending_entries() {
        let mut set = PendingChangeSet::default();
        set.on_delete("/p/Assets/x.png");
        set.on_add("/p/Assets/y.png");
        set.on_renamed("/p/Assets/x.png");
        set.on_renamed("/p/Assets/y.png");
        assert!(set.add().is_empty());
        assert!(set.delete().is_empty());
        assert_eq!(set.uncertain().len(), 2);

        // A directed event afterwards wins over the rename
        set.on_add("/p/Assets/x.png");
        set.on_delete("/p/Assets/y.png");
        assert_eq!(set.add(), ["/p/Assets/x.png".to_string()]);
        assert_eq!(set.delete(), ["/p/Assets/y.png".to_string()]);
        assert!(set.uncertain().is_empty());
    }

    #[test]
    fn test_relative_root_accepts_absolute_events() {
        let cwd = std::env::current_dir().unwrap();
        let dir = tempfile::tempdir_in(&cwd).unwrap();
        let relative = dir.path().strip_prefix(&cwd).unwrap_or(dir.path()).join("Assets");
        assert!(relative.is_relative());
        fs::create_dir_all(&relative).unwrap();
        fs::write(relative.join("new.txt"), "x").unwrap();
        fs::write(relative.join("other.txt"), "x").unwrap();

        let mut index = AssetIndex::new(&relative);
        let mut bridge = WatcherBridge::new(&relative);
        assert!(bridge.root().is_absolute());

        // Resolved form, as native events report it, and the cwd-joined form
        bridge.on_add(fs::canonicalize(relative.join("new.txt")).unwrap());
        bridge.on_add(cwd.join(&relative).join("other.txt"));

        let locked = bridge.lock(&mut index).to_vec();
        assert_eq!(locked.len(), 2);
        assert!(index.find("new.txt").is_some());
        assert!(index.find("other.txt").is_some());
    }

    #[test]
    fn test_sidecars_filtered_and_deduplicated() {
        let mut set = PendingChangeSet::default();
        set.on_add("/p/Assets/x.png.meta");
        set.on_delete("/p/Assets/y.png.meta");
        set.on_modified("/p/Assets/x.png.meta");
        assert!(set.is_empty());
        assert_eq!(set.modified(), 0);

        set.on_add("C:\\p\\Assets\\x.png");
        set.on_add("C:/p/Assets/x.png");
        set.on_delete("/p/Assets/z.png");
        set.on_delete("/p/Assets/z.png");
        assert_eq!(set.add().len(), 1);
        assert_eq!(set.delete().len(), 1);

        set.on_modified("/p/Assets/x.png");
        assert_eq!(set.modified(), 1);
    }

    #[test]
    fn test_end_watch_without_begin() {
        let dir = tempdir().unwrap();
        let mut bridge = WatcherBridge::new(dir.path());
        bridge.end_watch();
        bridge.end_watch();
        assert!(!bridge.is_watching());
    }

    #[test]
    fn test_lock_adds_nodes() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/sub")).unwrap();
        fs::write(dir.path().join("a/1.png"), "x").unwrap();
        fs::write(dir.path().join("a/sub/2.png"), "x").unwrap();
        fs::write(dir.path().join("loose.txt"), "x").unwrap();

        let mut index = AssetIndex::new(dir.path());
        let mut bridge = WatcherBridge::new(dir.path());
        assert!(!bridge.need_reimport());

        bridge.on_add(dir.path().join("a"));
        bridge.on_add(dir.path().join("a/1.png"));
        bridge.on_add(dir.path().join("loose.txt"));
        bridge.on_add(dir.path().join("missing.png"));
        assert!(bridge.need_reimport());

        let locked = bridge.lock(&mut index).to_vec();
        // a, a/1.png, a/sub, a/sub/2.png, loose.txt; the duplicate a/1.png is folded
        assert_eq!(locked.len(), 5);
        assert_eq!(index.get_by_path("a/sub/2.png").unwrap().bundle, "a");
        assert_eq!(index.get_by_path("loose.txt").unwrap().bundle, ".");
        assert!(index.find("missing.png").is_none());
        assert!(bridge.need_reimport());

        bridge.unlock();
        assert!(!bridge.need_reimport());
        assert!(bridge.locked().is_empty());
    }

    #[test]
    fn test_events_during_lock_survive_unlock() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("1.png"), "x").unwrap();
        fs::write(dir.path().join("2.png"), "x").unwrap();

        let mut index = AssetIndex::new(dir.path());
        let mut bridge = WatcherBridge::new(dir.path());

        bridge.on_add(dir.path().join("1.png"));
        bridge.on_delete(dir.path().join("gone.png"));
        assert_eq!(bridge.lock(&mut index).len(), 1);
        assert_eq!(bridge.locked_deleted(), ["gone.png".to_string()]);

        // Arrives while the batch is being imported
        bridge.on_add(dir.path().join("2.png"));
        assert_eq!(bridge.lock(&mut index).len(), 1);

        bridge.unlock();
        assert!(bridge.need_reimport());
        assert_eq!(bridge.pending().add().len(), 1);

        let locked = bridge.lock(&mut index).to_vec();
        assert_eq!(index.get(locked[0]).unwrap().path, "2.png");
    }

    #[test]
    fn test_outside_root_ignored() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("Assets");
        fs::create_dir_all(&root).unwrap();
        fs::write(dir.path().join("other.png"), "x").unwrap();

        let mut index = AssetIndex::new(&root);
        let mut bridge = WatcherBridge::new(&root);
        bridge.on_add(dir.path().join("other.png"));
        bridge.on_delete(dir.path().join("elsewhere.png"));

        assert!(bridge.lock(&mut index).is_empty());
        assert!(bridge.locked_deleted().is_empty());
        assert!(index.is_empty());
    }

    #[cfg(feature = "file-watcher")]
    #[test]
    fn test_event_mapping() {
        use notify::event::{CreateKind, DataChange, RemoveKind};

        let pending = Mutex::new(PendingChangeSet::default());
        let event = |kind, paths: &[&str]| {
            paths
                .iter()
                .fold(Event::new(kind), |e, p| e.add_path(PathBuf::from(p)))
        };

        apply_event(&pending, event(EventKind::Create(CreateKind::File), &["/r/a.png"]));
        apply_event(&pending, event(EventKind::Remove(RemoveKind::File), &["/r/b.png"]));
        apply_event(
            &pending,
            event(EventKind::Modify(ModifyKind::Name(RenameMode::Both)), &["/r/c.png", "/r/d.png"]),
        );
        apply_event(
            &pending,
            event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/r/e.png"]),
        );
        apply_event(
            &pending,
            event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), &["/r/f.png"]),
        );
        apply_event(
            &pending,
            event(EventKind::Modify(ModifyKind::Data(DataChange::Content)), &["/r/a.png"]),
        );
        apply_event(&pending, event(EventKind::Create(CreateKind::File), &["/r/a.png.meta"]));

        let set = pending.lock();
        assert_eq!(set.add(), ["/r/a.png", "/r/d.png", "/r/f.png"].map(String::from));
        assert_eq!(set.delete(), ["/r/b.png", "/r/c.png", "/r/e.png"].map(String::from));
        assert_eq!(set.modified(), 1);
    }

    #[cfg(feature = "file-watcher")]
    #[test]
    fn test_undirected_rename_resolved_at_lock() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("new.png"), "x").unwrap();

        let mut index = AssetIndex::new(dir.path());
        let mut bridge = WatcherBridge::new(dir.path());
        let renamed = |p: PathBuf| Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Any))).add_path(p);
        apply_event(&bridge.pending, renamed(dir.path().join("old.png")));
        apply_event(&bridge.pending, renamed(dir.path().join("new.png")));

        let locked = bridge.lock(&mut index).to_vec();
        assert_eq!(locked.len(), 1);
        assert_eq!(index.get(locked[0]).unwrap().path, "new.png");
        assert_eq!(bridge.locked_deleted(), ["old.png".to_string()]);
    }
}

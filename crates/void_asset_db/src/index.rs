//! Asset index - the in-memory mirror of the asset root.
//!
//! Nodes live in a generational arena. The path lookup map stores [`NodeId`]
//! handles, so a handle held across a delete simply stops resolving instead
//! of dangling.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{AssetError, AssetResult};
use crate::path::{self, ROOT_BUNDLE};

/// Handle to a node in the [`AssetIndex`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Raw slot index
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Slot generation this handle was issued for
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

/// One indexed file or directory
#[derive(Clone, Debug)]
pub struct AssetNode {
    /// Top-level folder the node belongs to, `"."` for loose root files
    pub bundle: String,
    /// Path relative to the asset root, forward slashes
    pub path: String,
    /// Absolute path on disk
    pub full_path: PathBuf,
    pub modify_time: SystemTime,
    pub create_time: SystemTime,
    pub is_dir: bool,
    /// GUID from the sidecar, once resolved
    pub guid: Option<String>,
}

impl AssetNode {
    /// Display name (file name with extension)
    pub fn name(&self) -> String {
        path::file_name_ext(&self.path)
    }

    /// Lower-case extension, empty for directories and extensionless files
    pub fn extension(&self) -> String {
        if self.is_dir {
            String::new()
        } else {
            path::extension(&self.path)
        }
    }

    /// Modification time in whole seconds since the Unix epoch
    pub fn modify_secs(&self) -> u64 {
        unix_secs(self.modify_time)
    }

    /// Whether this directory is the root of its bundle
    pub fn is_bundle_root(&self) -> bool {
        self.is_dir && self.bundle == self.path
    }
}

/// Seconds since the Unix epoch, clamped to zero for earlier times
pub fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Normalized sidecar path for an asset on disk
fn sidecar_key(asset_full_path: &Path) -> String {
    path::meta_path(&path::normalize(&asset_full_path.to_string_lossy()))
}

struct Slot {
    node: Option<AssetNode>,
    generation: u32,
}

/// Index of every file and folder under the asset root
pub struct AssetIndex {
    root: PathBuf,
    /// Normalized string form of `root`
    root_str: String,
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    lookup: HashMap<String, NodeId>,
    /// Sidecars seen by `discover` that no import has claimed yet
    sidecars: HashSet<String>,
}

impl AssetIndex {
    /// Index rooted at `root`, resolved with [`path::resolve_root`]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = path::resolve_root(&root.into());
        let root_str = path::normalize(&root.to_string_lossy());
        Self {
            root,
            root_str,
            slots: Vec::new(),
            free_list: Vec::new(),
            lookup: HashMap::new(),
            sidecars: HashSet::new(),
        }
    }

    /// Asset root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Remove every node
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free_list.clear();
        self.lookup.clear();
        self.sidecars.clear();
    }

    /// Rebuild the index from a full recursive scan of the root.
    ///
    /// A missing root is logged and leaves the index empty.
    /// Returns the number of indexed nodes.
    pub fn discover(&mut self) -> usize {
        self.clear();

        if !self.root.is_dir() {
            log::warn!("Asset root {:?} does not exist, index is empty", self.root);
            return 0;
        }

        let root = self.root.clone();
        let mut found = Vec::new();
        self.scan_dir(&root, ROOT_BUNDLE, &mut found);

        log::info!(
            "Discovered {} assets under {:?} ({} sidecars)",
            self.len(),
            self.root,
            self.sidecars.len()
        );
        self.len()
    }

    /// Index the entries of `dir`. `bundle` is the bundle of `dir` itself;
    /// directories found directly in the root start their own bundle.
    fn scan_dir(&mut self, dir: &Path, bundle: &str, out: &mut Vec<NodeId>) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Failed to read directory {:?}: {}", dir, e);
                return;
            }
        };

        let mut entries: Vec<_> = entries.flatten().collect();
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let full_path = entry.path();
            let full_str = path::normalize(&full_path.to_string_lossy());

            if path::is_meta(&full_str) {
                self.sidecars.insert(full_str);
                continue;
            }

            let metadata = match fs::metadata(&full_path) {
                Ok(m) => m,
                Err(e) => {
                    log::debug!("Skipping {:?}: {}", full_path, e);
                    continue;
                }
            };

            let short = path::short_path(&full_str, &self.root_str);
            let is_dir = metadata.is_dir();
            let node_bundle = if is_dir && bundle == ROOT_BUNDLE {
                short.clone()
            } else {
                bundle.to_string()
            };

            let id = self.insert(Self::make_node(&node_bundle, short, full_path.clone(), &metadata));
            out.push(id);

            // Only recurse into real directories, never through symlinks
            let real_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir && real_dir {
                self.scan_dir(&full_path, &node_bundle, out);
            }
        }
    }

    fn make_node(bundle: &str, short: String, full_path: PathBuf, metadata: &fs::Metadata) -> AssetNode {
        let modify_time = metadata.modified().unwrap_or(UNIX_EPOCH);
        let create_time = metadata.created().unwrap_or(modify_time);

        AssetNode {
            bundle: bundle.to_string(),
            path: short,
            full_path,
            modify_time,
            create_time,
            is_dir: metadata.is_dir(),
            guid: None,
        }
    }

    /// Insert a node, refreshing in place if its path is already indexed
    fn insert(&mut self, mut node: AssetNode) -> NodeId {
        if let Some(&id) = self.lookup.get(&node.path) {
            if let Some(existing) = self.get_mut(id) {
                node.guid = existing.guid.take();
                *existing = node;
                return id;
            }
        }

        let key = node.path.clone();
        let id = if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                node: Some(node),
                generation: 0,
            });
            NodeId { index, generation: 0 }
        };

        self.lookup.insert(key, id);
        id
    }

    fn remove_id(&mut self, id: NodeId) -> Option<AssetNode> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }

        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index);
        self.lookup.remove(&node.path);
        Some(node)
    }

    /// Stat `full_path` and index it under `bundle`.
    ///
    /// Returns `None` when the path cannot be stat'ed, is a sidecar, or lies
    /// outside the asset root. Directories directly under the root always
    /// become their own bundle.
    pub fn add_node(&mut self, bundle: &str, full_path: &Path) -> Option<NodeId> {
        let metadata = match fs::metadata(full_path) {
            Ok(m) => m,
            Err(e) => {
                log::debug!("Not adding {:?}: {}", full_path, e);
                return None;
            }
        };

        let full_str = path::normalize(&full_path.to_string_lossy());
        if path::is_meta(&full_str) {
            return None;
        }

        let short = path::short_path(&full_str, &self.root_str);
        if short.is_empty() || short == full_str {
            log::warn!("Not adding {:?}: outside asset root {:?}", full_path, self.root);
            return None;
        }

        let bundle = if metadata.is_dir() && !short.contains('/') {
            short.clone()
        } else {
            bundle.to_string()
        };

        Some(self.insert(Self::make_node(&bundle, short, full_path.to_path_buf(), &metadata)))
    }

    /// Add `full_path` and, for a directory, everything beneath it.
    pub fn add_tree(&mut self, bundle: &str, full_path: &Path) -> Vec<NodeId> {
        let Some(id) = self.add_node(bundle, full_path) else {
            return Vec::new();
        };

        let mut added = vec![id];
        let subtree = self
            .get(id)
            .filter(|node| node.is_dir)
            .map(|node| node.bundle.clone());

        if let Some(node_bundle) = subtree {
            self.scan_dir(full_path, &node_bundle, &mut added);
        }
        added
    }

    /// Get a node by handle
    pub fn get(&self, id: NodeId) -> Option<&AssetNode> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    /// Get a node mutably by handle
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut AssetNode> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    /// Find the handle for a short path
    pub fn find(&self, short_path: &str) -> Option<NodeId> {
        self.lookup.get(&path::normalize(short_path)).copied()
    }

    /// Get a node by short path
    pub fn get_by_path(&self, short_path: &str) -> Option<&AssetNode> {
        self.find(short_path).and_then(|id| self.get(id))
    }

    /// Iterate live nodes in slot order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &AssetNode)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.node.as_ref().map(|node| {
                (
                    NodeId {
                        index: i as u32,
                        generation: slot.generation,
                    },
                    node,
                )
            })
        })
    }

    /// Handles of every live node
    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes().map(|(id, _)| id).collect()
    }

    /// Handles of every file (non-directory) node
    pub fn files(&self) -> Vec<NodeId> {
        self.nodes()
            .filter(|(_, node)| !node.is_dir)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    /// Handles of `short_path` and every node beneath it, deduplicated
    fn subtree(&self, short_path: &str) -> BTreeSet<NodeId> {
        let prefix = format!("{}/", short_path);
        self.nodes()
            .filter(|(_, node)| node.path == short_path || node.path.starts_with(&prefix))
            .map(|(id, _)| id)
            .collect()
    }

    /// Delete an asset from the index and from disk.
    ///
    /// A directory takes all of its descendants with it. The asset's sidecar
    /// is removed too. Entries already gone from disk are not an error; the
    /// returned list holds the nodes that were dropped from the index. If the
    /// asset cannot be removed from disk the index is left untouched.
    pub fn delete(&mut self, short_path: &str) -> AssetResult<Vec<AssetNode>> {
        let short_path = path::normalize(short_path);
        let worklist = self.subtree(&short_path);
        if worklist.is_empty() {
            log::debug!("Delete of unindexed path {}", short_path);
            return Ok(Vec::new());
        }
        let is_dir = self
            .get_by_path(&short_path)
            .map(|n| n.is_dir)
            .unwrap_or(worklist.len() > 1);

        let target = self.root.join(&short_path);
        let result = if is_dir {
            fs::remove_dir_all(&target)
        } else {
            fs::remove_file(&target)
        };
        match result {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                return Err(AssetError::io(target, e));
            }
            _ => {}
        }

        let meta = self.root.join(path::meta_path(&short_path));
        if let Err(e) = fs::remove_file(&meta) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to delete sidecar {:?}: {}", meta, e);
            }
        }

        let mut removed = Vec::with_capacity(worklist.len());
        for id in worklist {
            if let Some(node) = self.remove_id(id) {
                self.sidecars.remove(&sidecar_key(&node.full_path));
                removed.push(node);
            }
        }

        log::debug!("Deleted {} ({} nodes)", short_path, removed.len());
        Ok(removed)
    }

    /// Rename an asset in place (same folder, new file name).
    ///
    /// Moves the file and its sidecar on disk, re-keys the node and its
    /// descendants, and retags the bundle when a bundle root is renamed.
    /// On error the index is left untouched.
    pub fn rename(&mut self, old_path: &str, new_name: &str) -> AssetResult<NodeId> {
        if new_name.is_empty()
            || new_name == "."
            || new_name == ".."
            || new_name.contains('/')
            || new_name.contains('\\')
            || path::is_meta(new_name)
        {
            return Err(AssetError::InvalidName(new_name.to_string()));
        }

        let old_path = path::normalize(old_path);
        let id = self
            .find(&old_path)
            .ok_or_else(|| AssetError::NotFound(old_path.clone()))?;

        let folder = path::folder_path(&old_path);
        let new_path = if folder.is_empty() {
            new_name.to_string()
        } else {
            format!("{}/{}", folder, new_name)
        };
        if new_path == old_path {
            return Ok(id);
        }

        let old_full = self.root.join(&old_path);
        let new_full = self.root.join(&new_path);
        if self.lookup.contains_key(&new_path) || new_full.exists() {
            return Err(AssetError::AlreadyExists(new_path));
        }

        fs::rename(&old_full, &new_full).map_err(|e| AssetError::io(&old_full, e))?;

        let old_meta = self.root.join(path::meta_path(&old_path));
        if old_meta.exists() {
            let new_meta = self.root.join(path::meta_path(&new_path));
            if let Err(e) = fs::rename(&old_meta, &new_meta) {
                log::warn!("Failed to rename sidecar {:?}: {}", old_meta, e);
            }
        }

        let was_bundle_root = self.get(id).map(|n| n.is_bundle_root()).unwrap_or(false);

        let root = self.root.clone();
        for moved in self.subtree(&old_path) {
            let Some(node) = self.get_mut(moved) else {
                continue;
            };
            let new_key = format!("{}{}", new_path, &node.path[old_path.len()..]);
            let old_key = std::mem::replace(&mut node.path, new_key.clone());
            let new_node_full = root.join(&new_key);
            let old_node_full = std::mem::replace(&mut node.full_path, new_node_full.clone());

            self.lookup.remove(&old_key);
            self.lookup.insert(new_key, moved);

            if self.sidecars.remove(&sidecar_key(&old_node_full)) {
                self.sidecars.insert(sidecar_key(&new_node_full));
            }
        }

        if was_bundle_root {
            for slot in self.slots.iter_mut() {
                if let Some(node) = slot.node.as_mut() {
                    if node.bundle == old_path {
                        node.bundle = new_path.clone();
                    }
                }
            }
        }

        log::info!("Renamed {} -> {}", old_path, new_path);
        Ok(id)
    }

    /// Nodes whose short path matches `pattern` (see [`path::search_match`])
    pub fn search(&self, pattern: &str) -> Vec<NodeId> {
        self.nodes()
            .filter(|(_, node)| path::search_match(&node.path, pattern))
            .map(|(id, _)| id)
            .collect()
    }

    /// Order for listings: directories first, then by display name.
    ///
    /// The sort is stable, so equal names keep their incoming order.
    /// Stale handles sort last.
    pub fn sort(&self, ids: &mut [NodeId]) {
        ids.sort_by(|a, b| {
            match (self.get(*a), self.get(*b)) {
                (Some(a), Some(b)) => b
                    .is_dir
                    .cmp(&a.is_dir)
                    .then_with(|| a.name().to_lowercase().cmp(&b.name().to_lowercase()))
                    .then_with(|| a.name().cmp(&b.name())),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
        });
    }

    /// Mark the sidecar of an imported asset as in use
    pub fn claim_sidecar(&mut self, asset_full_path: &Path) {
        self.sidecars.remove(&sidecar_key(asset_full_path));
    }

    /// Number of sidecars seen by discovery and not yet claimed
    pub fn unclaimed_sidecars(&self) -> usize {
        self.sidecars.len()
    }

    /// Delete every sidecar whose asset was not imported since `discover`.
    /// Returns how many files were removed.
    pub fn remove_unclaimed_sidecars(&mut self) -> usize {
        let mut removed = 0;
        for meta in self.sidecars.drain() {
            match fs::remove_file(&meta) {
                Ok(()) => {
                    log::debug!("Removed orphan sidecar {}", meta);
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove orphan sidecar {}: {}", meta, e),
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(root: &Path, rel: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, b"data").unwrap();
    }

    fn fixture() -> (tempfile::TempDir, AssetIndex) {
        let dir = tempdir().unwrap();
        touch(dir.path(), "a/1.png");
        touch(dir.path(), "b/2.mesh");
        let mut index = AssetIndex::new(dir.path());
        index.discover();
        (dir, index)
    }

    #[test]
    fn test_discover_bundles() {
        let (_dir, index) = fixture();

        assert_eq!(index.len(), 4);
        let png = index.get_by_path("a/1.png").unwrap();
        assert_eq!(png.bundle, "a");
        assert!(!png.is_dir);
        let mesh = index.get_by_path("b/2.mesh").unwrap();
        assert_eq!(mesh.bundle, "b");
        let a = index.get_by_path("a").unwrap();
        assert!(a.is_dir);
        assert!(a.is_bundle_root());
    }

    #[test]
    fn test_discover_nested_and_loose() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "loose.txt");
        touch(dir.path(), "a/deep/er/x.png");
        touch(dir.path(), "a/deep/er/x.png.meta");

        let mut index = AssetIndex::new(dir.path());
        index.discover();

        assert_eq!(index.get_by_path("loose.txt").unwrap().bundle, ".");
        assert_eq!(index.get_by_path("a/deep").unwrap().bundle, "a");
        assert_eq!(index.get_by_path("a/deep/er/x.png").unwrap().bundle, "a");
        assert!(index.get_by_path("a/deep/er/x.png.meta").is_none());
        assert_eq!(index.unclaimed_sidecars(), 1);
    }

    #[test]
    fn test_discover_missing_root() {
        let dir = tempdir().unwrap();
        let mut index = AssetIndex::new(dir.path().join("nope"));
        assert_eq!(index.discover(), 0);
        assert!(index.is_empty());
        assert!(index.delete("anything").unwrap().is_empty());
        assert!(index.search("x").is_empty());
    }

    #[test]
    fn test_add_node() {
        let (dir, mut index) = fixture();

        assert!(index.add_node("a", &dir.path().join("a/missing.png")).is_none());

        touch(dir.path(), "a/new.png");
        let id = index.add_node("a", &dir.path().join("a/new.png")).unwrap();
        assert_eq!(index.get(id).unwrap().path, "a/new.png");
        assert_eq!(index.find("a/new.png"), Some(id));

        // Re-adding refreshes in place
        assert_eq!(index.add_node("a", &dir.path().join("a/new.png")), Some(id));
        assert_eq!(index.len(), 5);
    }

    #[test]
    fn test_add_tree() {
        let (dir, mut index) = fixture();
        touch(dir.path(), "c/sub/3.png");
        touch(dir.path(), "c/4.png");

        let added = index.add_tree(".", &dir.path().join("c"));
        assert_eq!(added.len(), 4);
        assert_eq!(index.get_by_path("c").unwrap().bundle, "c");
        assert_eq!(index.get_by_path("c/sub/3.png").unwrap().bundle, "c");
    }

    #[test]
    fn test_delete_directory() {
        let (dir, mut index) = fixture();
        touch(dir.path(), "a/1.png.meta");
        touch(dir.path(), "a.meta");

        let removed = index.delete("a").unwrap();
        assert_eq!(removed.len(), 2);
        assert!(index.find("a").is_none());
        assert!(index.find("a/1.png").is_none());
        assert!(!dir.path().join("a").exists());
        assert!(!dir.path().join("a.meta").exists());
        assert!(dir.path().join("b/2.mesh").exists());

        // Second delete of the same path is a no-op
        assert!(index.delete("a").unwrap().is_empty());
        assert!(index.delete("a/1.png").unwrap().is_empty());
    }

    #[test]
    fn test_failed_delete_keeps_node() {
        let (dir, mut index) = fixture();
        touch(dir.path(), "b/2.mesh.meta");
        let id = index.find("b/2.mesh").unwrap();

        // The indexed file became a non-empty folder, so unlinking it fails
        fs::remove_file(dir.path().join("b/2.mesh")).unwrap();
        touch(dir.path(), "b/2.mesh/inner.txt");

        assert!(matches!(index.delete("b/2.mesh"), Err(AssetError::Io { .. })));
        assert_eq!(index.find("b/2.mesh"), Some(id));
        assert!(dir.path().join("b/2.mesh/inner.txt").exists());
        assert!(dir.path().join("b/2.mesh.meta").exists());
    }

    #[test]
    fn test_stale_handle() {
        let (_dir, mut index) = fixture();
        let id = index.find("b/2.mesh").unwrap();
        index.delete("b/2.mesh").unwrap();
        assert!(index.get(id).is_none());

        // Slot reuse must not revive the old handle
        let dir = index.root().to_path_buf();
        touch(&dir, "b/again.mesh");
        let reused = index.add_node("b", &dir.join("b/again.mesh")).unwrap();
        assert_eq!(reused.index(), id.index());
        assert!(index.get(id).is_none());
        assert!(index.get(reused).is_some());
    }

    #[test]
    fn test_rename_bundle_root() {
        let (dir, mut index) = fixture();
        touch(dir.path(), "a.meta");

        let id = index.rename("a", "c").unwrap();
        assert_eq!(index.get(id).unwrap().path, "c");
        assert_eq!(index.get(id).unwrap().bundle, "c");

        let png = index.get_by_path("c/1.png").unwrap();
        assert_eq!(png.bundle, "c");
        assert!(png.full_path.exists());
        assert!(index.find("a/1.png").is_none());
        assert!(dir.path().join("c.meta").exists());
        assert!(!dir.path().join("a.meta").exists());
    }

    #[test]
    fn test_rename_file_with_sidecar() {
        let (dir, mut index) = fixture();
        touch(dir.path(), "a/1.png.meta");

        index.rename("a/1.png", "hero.png").unwrap();
        assert!(index.get_by_path("a/hero.png").is_some());
        assert!(dir.path().join("a/hero.png").exists());
        assert!(dir.path().join("a/hero.png.meta").exists());
        assert!(!dir.path().join("a/1.png.meta").exists());
    }

    #[test]
    fn test_rename_errors_leave_index_unchanged() {
        let (dir, mut index) = fixture();
        touch(dir.path(), "a/other.png");
        index.discover();
        let before = index.len();

        assert!(matches!(
            index.rename("a/1.png", "other.png"),
            Err(AssetError::AlreadyExists(_))
        ));
        assert!(matches!(index.rename("a/1.png", "x/y.png"), Err(AssetError::InvalidName(_))));
        assert!(matches!(index.rename("nope.png", "z.png"), Err(AssetError::NotFound(_))));

        assert_eq!(index.len(), before);
        assert!(index.get_by_path("a/1.png").is_some());
        assert!(dir.path().join("a/1.png").exists());
    }

    #[test]
    fn test_search_and_sort() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "m/zeta.png");
        touch(dir.path(), "m/Alpha.png");
        touch(dir.path(), "m/sub/beta.png");
        let mut index = AssetIndex::new(dir.path());
        index.discover();

        let mut hits = index.search("m/");
        index.sort(&mut hits);
        let names: Vec<_> = hits.iter().map(|id| index.get(*id).unwrap().name()).collect();
        assert_eq!(names, vec!["sub", "Alpha.png", "beta.png", "zeta.png"]);

        assert_eq!(index.search("ALPHA").len(), 1);
        assert_eq!(index.search("*.png").len(), 3);
    }

    #[test]
    fn test_remove_unclaimed_sidecars() {
        let (dir, mut index) = fixture();
        touch(dir.path(), "a/1.png.meta");
        touch(dir.path(), "a/gone.png.meta");
        index.discover();

        index.claim_sidecar(&dir.path().join("a/1.png"));
        assert_eq!(index.remove_unclaimed_sidecars(), 1);
        assert!(dir.path().join("a/1.png.meta").exists());
        assert!(!dir.path().join("a/gone.png.meta").exists());
    }
}

//! Asset pipeline - owns the index, GUID map, thumbnails and watcher.
//!
//! The host constructs one [`AssetPipeline`] at startup and calls
//! [`AssetPipeline::update`] once per frame. Each call does a bounded slice
//! of import work; file system changes reported by the watcher are picked up
//! whenever no run is in progress.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::{AssetError, AssetResult};
use crate::importer::{ImportScheduler, ImportState, ImportTarget, Progress};
use crate::index::{AssetIndex, AssetNode, NodeId};
use crate::loader::{FileLoader, FileLoaderRegistry};
use crate::meta::GuidResolver;
use crate::path;
use crate::thumbnail::{ThumbnailCache, ThumbnailTexture};
use crate::watcher::WatcherBridge;

/// The asset database and its import pipeline
pub struct AssetPipeline {
    config: PipelineConfig,
    index: AssetIndex,
    resolver: GuidResolver,
    thumbnails: ThumbnailCache,
    watcher: WatcherBridge,
    loaders: FileLoaderRegistry,
    scheduler: Option<ImportScheduler>,
}

impl AssetPipeline {
    /// Create an empty pipeline. Nothing is read from disk.
    ///
    /// The asset root is resolved to an absolute path once, so the index,
    /// the watcher and the thumbnail records share one key space.
    pub fn new(config: PipelineConfig) -> Self {
        let root = path::resolve_root(&config.asset_root);
        Self {
            index: AssetIndex::new(&root),
            resolver: GuidResolver::new(config.schema()),
            thumbnails: ThumbnailCache::new(&root, config.effective_thumbnail_dir(), config.thumbnail_size),
            watcher: WatcherBridge::new(&config.asset_root),
            loaders: FileLoaderRegistry::new(),
            scheduler: None,
            config,
        }
    }

    /// Create a pipeline, load the thumbnail index, discover the asset root
    /// and start the watcher if configured. A full import is queued.
    pub fn open(config: PipelineConfig) -> Self {
        let mut pipeline = Self::new(config);
        pipeline.thumbnails.load();
        pipeline.discover();

        if pipeline.config.watch {
            if let Err(e) = pipeline.begin_watch() {
                log::warn!("File watcher unavailable: {}", e);
            }
        }
        pipeline
    }

    /// Rescan the asset root and queue a full import
    pub fn discover(&mut self) -> usize {
        // Handles from the previous scan are meaningless after a rescan
        self.scheduler = None;
        self.resolver.clear();
        let deleted = self.watcher.locked_deleted().to_vec();
        self.watcher.unlock();

        let count = self.index.discover();
        self.scheduler = Some(ImportScheduler::full(&self.index).with_deletions(deleted));
        count
    }

    /// Queue a full import of the current index, replacing any run in
    /// progress
    pub fn reimport_all(&mut self) {
        let deleted = self.watcher.locked_deleted().to_vec();
        self.scheduler = Some(ImportScheduler::full(&self.index).with_deletions(deleted));
    }

    /// Do one tick of import work.
    ///
    /// Starts an incremental run from the watcher when idle. Returns the
    /// progress of the current run, or an idle progress when there is
    /// nothing to do.
    pub fn update(&mut self) -> Progress {
        if self.scheduler.is_none() {
            if !self.watcher.need_reimport() {
                return Self::idle_progress();
            }
            let added = self.watcher.lock(&mut self.index).to_vec();
            let deleted = self.watcher.locked_deleted().to_vec();
            self.scheduler = Some(ImportScheduler::incremental(added, deleted));
        }

        let Some(scheduler) = self.scheduler.as_mut() else {
            return Self::idle_progress();
        };

        let budget = match scheduler.state() {
            ImportState::Deleting => self.config.delete_batch,
            _ => self.config.import_batch,
        };
        let mut target = ImportTarget {
            index: &mut self.index,
            resolver: &mut self.resolver,
            thumbnails: &mut self.thumbnails,
        };
        let progress = scheduler.step(budget, &mut target);

        if progress.is_finished() {
            self.finish_run();
        }
        progress
    }

    /// Run ticks until no run is in progress and no change is pending
    pub fn flush(&mut self) -> Progress {
        let mut last = self.update();
        while self.scheduler.is_some() || self.watcher.need_reimport() {
            last = self.update();
        }
        last
    }

    fn idle_progress() -> Progress {
        Progress {
            state: ImportState::Idle,
            percent: 0.0,
            last: String::new(),
            imported: 0,
            deleted: 0,
        }
    }

    fn finish_run(&mut self) {
        let Some(scheduler) = self.scheduler.take() else {
            return;
        };

        if scheduler.is_full() {
            let removed = self.index.remove_unclaimed_sidecars();
            if removed > 0 {
                log::info!("Removed {} orphaned sidecars", removed);
            }

            let live: HashSet<String> = self.index.nodes().filter_map(|(_, n)| n.guid.clone()).collect();
            let pruned = self.thumbnails.retain_live(&live);
            if pruned > 0 {
                log::info!("Removed {} orphaned thumbnails", pruned);
            }
        }
        if self.watcher.is_locked() {
            self.watcher.unlock();
        }
        if let Err(e) = self.thumbnails.save() {
            log::warn!("Failed to save thumbnail index: {}", e);
        }

        log::info!(
            "Import finished: {} imported, {} deleted",
            scheduler.imported(),
            scheduler.deleted()
        );
    }

    /// Whether an import run is in progress
    pub fn is_busy(&self) -> bool {
        self.scheduler.is_some()
    }

    pub fn import_status(&self) -> (f32, &str) {
        self.scheduler
            .as_ref()
            .map(|s| s.import_status())
            .unwrap_or((0.0, ""))
    }

    pub fn delete_status(&self) -> (f32, &str) {
        self.scheduler
            .as_ref()
            .map(|s| s.delete_status())
            .unwrap_or((0.0, ""))
    }

    /// GUID of the asset at `short_path`, creating its sidecar if needed
    pub fn resolve_guid(&mut self, short_path: &str) -> AssetResult<String> {
        let id = self
            .index
            .find(short_path)
            .ok_or_else(|| AssetError::NotFound(short_path.to_string()))?;
        self.resolver.resolve(&mut self.index, id)
    }

    /// Asset that owns `guid`
    pub fn node_by_guid(&self, guid: &str) -> Option<&AssetNode> {
        self.resolver
            .node_by_guid(guid)
            .and_then(|id| self.index.get(id))
    }

    /// Thumbnail for the asset at `short_path`, if one has been generated
    pub fn get_thumbnail(&mut self, short_path: &str) -> Option<Arc<ThumbnailTexture>> {
        let node = self.index.get_by_path(short_path)?;
        let guid = match node.guid.clone() {
            Some(guid) => guid,
            None => self.resolve_guid(short_path).ok()?,
        };
        self.thumbnails.get_thumbnail(&guid)
    }

    /// Evict thumbnails nobody else holds
    pub fn clear_textures(&mut self) -> usize {
        self.thumbnails.clear_textures()
    }

    /// Rename an asset in place, keeping thumbnail records pointed at it
    pub fn rename(&mut self, old_path: &str, new_name: &str) -> AssetResult<NodeId> {
        let id = self.index.rename(old_path, new_name)?;

        let Some(new_path) = self.index.get(id).map(|n| n.path.clone()) else {
            return Ok(id);
        };
        let prefix = format!("{}/", new_path);
        let moved: Vec<(String, String)> = self
            .index
            .nodes()
            .filter(|(_, n)| n.path == new_path || n.path.starts_with(&prefix))
            .filter_map(|(_, n)| n.guid.clone().map(|g| (g, n.path.clone())))
            .collect();
        for (guid, path) in moved {
            self.thumbnails.rename_source(&guid, &path);
        }
        Ok(id)
    }

    /// Delete an asset (and a folder's contents) from disk and the index.
    ///
    /// Fails without touching the index when the asset cannot be removed
    /// from disk.
    pub fn delete(&mut self, short_path: &str) -> AssetResult<Vec<AssetNode>> {
        let removed = self.index.delete(short_path)?;
        for guid in removed.iter().filter_map(|n| n.guid.as_deref()) {
            self.resolver.forget(guid);
            self.thumbnails.remove(guid);
        }
        Ok(removed)
    }

    pub fn search(&self, pattern: &str) -> Vec<NodeId> {
        self.index.search(pattern)
    }

    pub fn sort(&self, ids: &mut [NodeId]) {
        self.index.sort(ids)
    }

    pub fn begin_watch(&mut self) -> AssetResult<()> {
        self.watcher.begin_watch()
    }

    pub fn end_watch(&mut self) {
        self.watcher.end_watch()
    }

    pub fn watcher(&self) -> &WatcherBridge {
        &self.watcher
    }

    pub fn watcher_mut(&mut self) -> &mut WatcherBridge {
        &mut self.watcher
    }

    pub fn register_file_loader(&mut self, ext: &str, loader: Arc<dyn FileLoader>) {
        self.loaders.register(ext, loader)
    }

    pub fn unregister_file_loader(&mut self, ext: &str, loader: &Arc<dyn FileLoader>) -> bool {
        self.loaders.unregister(ext, loader)
    }

    pub fn get_file_loader(&self, ext: &str) -> Option<Arc<dyn FileLoader>> {
        self.loaders.get(ext)
    }

    /// Open an asset with the loader registered for its extension.
    ///
    /// Returns `false` when no loader handles the extension.
    pub fn open_asset(&self, short_path: &str) -> AssetResult<bool> {
        let node = self
            .index
            .get_by_path(short_path)
            .ok_or_else(|| AssetError::NotFound(short_path.to_string()))?;

        match self.loaders.get(&node.extension()) {
            Some(loader) => {
                loader.load_file(&node.full_path)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Stop watching and persist the thumbnail index
    pub fn shutdown(&mut self) {
        self.end_watch();
        self.thumbnails.clear_textures();
        if let Err(e) = self.thumbnails.save() {
            log::warn!("Failed to save thumbnail index: {}", e);
        }
        log::info!("Asset pipeline shut down");
    }

    pub fn index(&self) -> &AssetIndex {
        &self.index
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn thumbnails(&self) -> &ThumbnailCache {
        &self.thumbnails
    }

    pub fn asset_root(&self) -> &Path {
        self.index.root()
    }
}

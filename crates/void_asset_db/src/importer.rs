//! Tick-driven import scheduler.
//!
//! An import run resolves GUIDs (and regenerates thumbnails) for a batch of
//! nodes, then applies a batch of deletions. Work is handed out in bounded
//! slices so a large project never stalls the caller's frame loop: call
//! [`ImportScheduler::step`] (or `load` then `delete_asset`) once per tick
//! until it reports completion.

use std::collections::HashSet;

use crate::index::{AssetIndex, NodeId};
use crate::meta::GuidResolver;
use crate::thumbnail::ThumbnailCache;

/// Phase of an import run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImportState {
    Idle,
    Importing,
    Deleting,
    Finished,
}

/// Snapshot of a run after a tick
#[derive(Clone, Debug, PartialEq)]
pub struct Progress {
    pub state: ImportState,
    /// Overall fraction done, in `[0, 1]`
    pub percent: f32,
    /// Short path of the most recently processed item
    pub last: String,
    pub imported: usize,
    pub deleted: usize,
}

impl Progress {
    pub fn is_finished(&self) -> bool {
        self.state == ImportState::Finished
    }
}

/// Everything an import run writes to
pub struct ImportTarget<'a> {
    pub index: &'a mut AssetIndex,
    pub resolver: &'a mut GuidResolver,
    pub thumbnails: &'a mut ThumbnailCache,
}

/// Budgeted import/delete state machine.
pub struct ImportScheduler {
    pending: Vec<NodeId>,
    cursor: usize,
    deletions: Vec<String>,
    delete_cursor: usize,
    state: ImportState,
    full: bool,
    last_imported: String,
    last_deleted: String,
    imported: usize,
    deleted: usize,
}

fn fraction(done: usize, total: usize) -> f32 {
    (done as f32 / total as f32).clamp(0.0, 1.0)
}

impl ImportScheduler {
    fn with_batch(pending: Vec<NodeId>, deletions: Vec<String>, full: bool) -> Self {
        Self {
            pending,
            cursor: 0,
            deletions,
            delete_cursor: 0,
            state: ImportState::Idle,
            full,
            last_imported: String::new(),
            last_deleted: String::new(),
            imported: 0,
            deleted: 0,
        }
    }

    /// Re-import every node in the index
    pub fn full(index: &AssetIndex) -> Self {
        Self::with_batch(index.ids(), Vec::new(), true)
    }

    /// Import `added` nodes, then delete `deleted` short paths.
    ///
    /// Duplicates in either list are processed once.
    pub fn incremental(added: Vec<NodeId>, deleted: Vec<String>) -> Self {
        let mut seen = HashSet::new();
        let added = added.into_iter().filter(|id| seen.insert(*id)).collect();
        let mut seen = HashSet::new();
        let deleted = deleted.into_iter().filter(|p| seen.insert(p.clone())).collect();
        Self::with_batch(added, deleted, false)
    }

    /// Also delete `deleted` short paths once the import phase is done
    pub fn with_deletions(mut self, deleted: impl IntoIterator<Item = String>) -> Self {
        for path in deleted {
            if !self.deletions.contains(&path) {
                self.deletions.push(path);
            }
        }
        self
    }

    /// Whether this run covers the whole index
    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    /// Nodes imported successfully so far
    pub fn imported(&self) -> usize {
        self.imported
    }

    /// Nodes dropped from the index so far
    pub fn deleted(&self) -> usize {
        self.deleted
    }

    pub fn import_total(&self) -> usize {
        self.pending.len()
    }

    pub fn delete_total(&self) -> usize {
        self.deletions.len()
    }

    /// Import up to `max_count` pending nodes.
    ///
    /// Returns `true` once every pending node has been processed.
    pub fn load(&mut self, max_count: usize, target: &mut ImportTarget<'_>) -> bool {
        if self.cursor >= self.pending.len() {
            self.finish_import();
            return true;
        }
        self.state = ImportState::Importing;

        let end = (self.cursor + max_count.max(1)).min(self.pending.len());
        while self.cursor < end {
            let id = self.pending[self.cursor];
            self.cursor += 1;
            if let Some(path) = self.import_node(id, target) {
                self.last_imported = path;
            }
        }

        if self.cursor >= self.pending.len() {
            self.finish_import();
            true
        } else {
            false
        }
    }

    fn finish_import(&mut self) {
        if matches!(self.state, ImportState::Idle | ImportState::Importing) {
            self.state = if self.delete_cursor < self.deletions.len() {
                ImportState::Deleting
            } else {
                ImportState::Finished
            };
            log::debug!("Imported {} of {} assets", self.imported, self.pending.len());
        }
    }

    /// Resolve one node. Returns its short path when the node still exists.
    fn import_node(&mut self, id: NodeId, target: &mut ImportTarget<'_>) -> Option<String> {
        let Some(node) = target.index.get(id).cloned() else {
            log::debug!("Skipping removed node {:?}", id);
            return None;
        };

        if !node.full_path.exists() {
            log::debug!("Skipping vanished asset {}", node.path);
            return Some(node.path);
        }

        let guid = match target.resolver.resolve(target.index, id) {
            Ok(guid) => guid,
            Err(e) => {
                log::warn!("Failed to import {}: {}", node.path, e);
                return Some(node.path);
            }
        };
        self.imported += 1;

        if !node.is_dir && target.resolver.schema().is_texture(&node.extension()) {
            let stale = target
                .thumbnails
                .update_info(&guid, &node.path, node.modify_secs());
            if stale {
                if let Err(e) = target.thumbnails.save_thumbnail_texture(&guid) {
                    log::warn!("Failed to generate thumbnail for {}: {}", node.path, e);
                }
            }
        }

        Some(node.path)
    }

    /// Apply up to `max_count` pending deletions.
    ///
    /// Does nothing until the import phase is complete. Returns `true` once
    /// every deletion has been applied.
    pub fn delete_asset(&mut self, max_count: usize, target: &mut ImportTarget<'_>) -> bool {
        if self.cursor < self.pending.len() {
            return false;
        }
        self.finish_import();

        let end = (self.delete_cursor + max_count.max(1)).min(self.deletions.len());
        while self.delete_cursor < end {
            let short = self.deletions[self.delete_cursor].clone();
            self.delete_cursor += 1;

            // A path recreated since the delete was reported is kept
            if target.index.root().join(&short).exists() {
                log::debug!("Keeping recreated asset {}", short);
            } else {
                match target.index.delete(&short) {
                    Ok(removed) => {
                        for node in removed {
                            if let Some(guid) = node.guid {
                                target.resolver.forget(&guid);
                                target.thumbnails.remove(&guid);
                            }
                            self.deleted += 1;
                        }
                    }
                    Err(e) => log::warn!("Failed to delete {}: {}", short, e),
                }
            }
            self.last_deleted = short;
        }

        if self.delete_cursor >= self.deletions.len() {
            self.state = ImportState::Finished;
            true
        } else {
            false
        }
    }

    /// Run one tick: import, then delete, at most `budget` items.
    pub fn step(&mut self, budget: usize, target: &mut ImportTarget<'_>) -> Progress {
        match self.state {
            ImportState::Idle | ImportState::Importing => {
                self.load(budget, target);
            }
            ImportState::Deleting => {
                self.delete_asset(budget, target);
            }
            ImportState::Finished => {}
        }
        self.progress()
    }

    /// Current progress
    pub fn progress(&self) -> Progress {
        let total = self.pending.len() + self.deletions.len();
        let percent = if self.state == ImportState::Finished {
            1.0
        } else if total == 0 {
            0.0
        } else {
            fraction(self.cursor + self.delete_cursor, total)
        };

        let last = if self.last_deleted.is_empty() {
            self.last_imported.clone()
        } else {
            self.last_deleted.clone()
        };

        Progress {
            state: self.state,
            percent,
            last,
            imported: self.imported,
            deleted: self.deleted,
        }
    }

    /// Fraction of the import phase done and the last imported path
    pub fn import_status(&self) -> (f32, &str) {
        let percent = if self.pending.is_empty() {
            if self.state == ImportState::Idle { 0.0 } else { 1.0 }
        } else {
            fraction(self.cursor, self.pending.len())
        };
        (percent, &self.last_imported)
    }

    /// Fraction of the delete phase done and the last deleted path
    pub fn delete_status(&self) -> (f32, &str) {
        let percent = if self.deletions.is_empty() {
            if self.state == ImportState::Finished { 1.0 } else { 0.0 }
        } else {
            fraction(self.delete_cursor, self.deletions.len())
        };
        (percent, &self.last_deleted)
    }

    /// Whether this run has deletions to apply
    pub fn need_delete(&self) -> bool {
        !self.deletions.is_empty()
    }

    /// Both phases are exhausted
    pub fn is_finish(&self) -> bool {
        self.cursor >= self.pending.len() && self.delete_cursor >= self.deletions.len()
    }
}

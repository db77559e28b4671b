//! Thumbnail cache for asset previews.
//!
//! Thumbnails live in their own directory as `<guid>.png`, described by a
//! `.db.xml` index that records which source file and modification time each
//! one was generated from. Decoded textures are kept in memory behind `Arc`s
//! so that callers can hold on to them while the cache evicts the rest.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::imageops::FilterType;
use image::ImageFormat;

use crate::error::{AssetError, AssetResult};
use crate::meta::is_valid_guid;
use crate::xml::XmlElement;

/// Longest edge of generated thumbnails.
pub const THUMBNAIL_SIZE: u32 = 64;

/// Name of the thumbnail index inside the thumbnail directory.
pub const INDEX_FILE: &str = ".db.xml";

/// What a thumbnail was generated from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThumbnailRecord {
    /// GUID of the source asset
    pub id: String,
    /// Short path of the source asset
    pub source_path: String,
    /// Source modification time in seconds since the Unix epoch
    pub modify_time: u64,
    /// Whether `<id>.png` is present on disk
    pub exists: bool,
}

/// A decoded thumbnail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThumbnailTexture {
    pub width: u32,
    pub height: u32,
    /// RGBA pixel data
    pub rgba: Vec<u8>,
}

/// Size of a thumbnail for a `width` x `height` source, scaled uniformly so
/// the longer edge is at most `max`. Sources already within bounds keep
/// their size.
pub fn thumbnail_dimensions(width: u32, height: u32, max: u32) -> (u32, u32) {
    let longer = width.max(height);
    if longer <= max || longer == 0 {
        return (width, height);
    }

    let scale = |edge: u32| -> u32 {
        let scaled = (edge as u64 * max as u64 + longer as u64 / 2) / longer as u64;
        (scaled as u32).max(1)
    };
    (scale(width), scale(height))
}

/// Cache of thumbnail records and decoded thumbnail textures.
pub struct ThumbnailCache {
    asset_root: PathBuf,
    dir: PathBuf,
    size: u32,
    records: HashMap<String, ThumbnailRecord>,
    textures: HashMap<String, Arc<ThumbnailTexture>>,
}

impl ThumbnailCache {
    pub fn new(asset_root: impl Into<PathBuf>, dir: impl Into<PathBuf>, size: u32) -> Self {
        Self {
            asset_root: asset_root.into(),
            dir: dir.into(),
            size: size.max(1),
            records: HashMap::new(),
            textures: HashMap::new(),
        }
    }

    /// Thumbnail directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Location of the PNG for `id`
    pub fn thumbnail_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.png", id))
    }

    /// Location of the index file
    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    /// Load the record table from the index file.
    ///
    /// Records whose PNG is missing are dropped. A missing or unreadable
    /// index leaves the table empty. Returns the number of records kept.
    pub fn load(&mut self) -> usize {
        self.records.clear();
        self.textures.clear();

        let index_path = self.index_path();
        let text = match fs::read_to_string(&index_path) {
            Ok(text) => text,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Failed to read thumbnail index {:?}: {}", index_path, e);
                }
                return 0;
            }
        };

        let root = match XmlElement::parse(&text) {
            Ok(root) => root,
            Err(e) => {
                log::warn!("Ignoring corrupt thumbnail index {:?}: {}", index_path, e);
                return 0;
            }
        };

        let mut dropped = 0;
        for node in root.children_named("node") {
            let (Some(id), Some(source_path)) = (node.attr("guid"), node.attr("path")) else {
                dropped += 1;
                continue;
            };
            if !self.thumbnail_path(id).is_file() {
                dropped += 1;
                continue;
            }

            let modify_time = node.attr("modify").and_then(|m| m.parse().ok()).unwrap_or(0);
            self.records.insert(
                id.to_string(),
                ThumbnailRecord {
                    id: id.to_string(),
                    source_path: source_path.to_string(),
                    modify_time,
                    exists: true,
                },
            );
        }

        log::debug!(
            "Loaded {} thumbnail records ({} dropped)",
            self.records.len(),
            dropped
        );
        self.records.len()
    }

    /// Write the record table to the index file.
    ///
    /// Only records with a generated PNG are written.
    pub fn save(&self) -> AssetResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| AssetError::io(&self.dir, e))?;

        let mut records: Vec<_> = self.records.values().filter(|r| r.exists).collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));

        let mut root = XmlElement::new("thumbnails");
        for record in records {
            root.push(
                XmlElement::new("node")
                    .with_attr("guid", &record.id)
                    .with_attr("path", &record.source_path)
                    .with_attr("modify", record.modify_time),
            );
        }

        let index_path = self.index_path();
        let text = root
            .to_document()
            .map_err(|e| AssetError::meta(&index_path, e.to_string()))?;
        fs::write(&index_path, text).map_err(|e| AssetError::io(&index_path, e))
    }

    /// Decoded thumbnail for `id`.
    ///
    /// Never generates anything; an asset without a valid record simply has
    /// no thumbnail.
    pub fn get_thumbnail(&mut self, id: &str) -> Option<Arc<ThumbnailTexture>> {
        if let Some(texture) = self.textures.get(id) {
            return Some(texture.clone());
        }

        if !self.records.get(id)?.exists {
            return None;
        }

        let png = self.thumbnail_path(id);
        let image = match image::open(&png) {
            Ok(image) => image.to_rgba8(),
            Err(e) => {
                log::debug!("Failed to load thumbnail {:?}: {}", png, e);
                return None;
            }
        };

        let texture = Arc::new(ThumbnailTexture {
            width: image.width(),
            height: image.height(),
            rgba: image.into_raw(),
        });
        self.textures.insert(id.to_string(), texture.clone());
        Some(texture)
    }

    /// Record the current state of a source asset.
    ///
    /// Returns `true` when the thumbnail must be regenerated: the record is
    /// new, the source modification time changed, or the PNG is missing.
    pub fn update_info(&mut self, id: &str, source_path: &str, modify_time: u64) -> bool {
        let png_exists = self.thumbnail_path(id).is_file();

        match self.records.get_mut(id) {
            Some(record) => {
                let stale = record.modify_time != modify_time || !png_exists;
                record.source_path = source_path.to_string();
                record.modify_time = modify_time;
                record.exists = png_exists;
                stale
            }
            None => {
                self.records.insert(
                    id.to_string(),
                    ThumbnailRecord {
                        id: id.to_string(),
                        source_path: source_path.to_string(),
                        modify_time,
                        exists: png_exists,
                    },
                );
                true
            }
        }
    }

    /// Regenerate `<id>.png` from the record's source image.
    pub fn save_thumbnail_texture(&mut self, id: &str) -> AssetResult<()> {
        let source = self
            .records
            .get(id)
            .map(|r| self.asset_root.join(&r.source_path))
            .ok_or_else(|| AssetError::NotFound(format!("thumbnail record {}", id)))?;

        let image = image::open(&source)?;
        let (width, height) = thumbnail_dimensions(image.width(), image.height(), self.size);
        let image = if (width, height) == (image.width(), image.height()) {
            image
        } else {
            image.resize_exact(width, height, FilterType::Triangle)
        };

        fs::create_dir_all(&self.dir).map_err(|e| AssetError::io(&self.dir, e))?;
        let png = self.thumbnail_path(id);
        image.to_rgba8().save_with_format(&png, ImageFormat::Png)?;

        if let Some(record) = self.records.get_mut(id) {
            record.exists = true;
        }
        self.textures.remove(id);

        log::debug!("Generated thumbnail {:?} ({}x{})", png, width, height);
        Ok(())
    }

    /// Evict every cached texture that nobody outside the cache holds.
    ///
    /// Repeats until a full pass evicts nothing. Returns the number evicted.
    pub fn clear_textures(&mut self) -> usize {
        let mut evicted = 0;
        loop {
            let before = self.textures.len();
            self.textures.retain(|_, texture| Arc::strong_count(texture) > 1);
            let pass = before - self.textures.len();
            if pass == 0 {
                break;
            }
            evicted += pass;
        }
        evicted
    }

    /// Number of decoded textures held in memory
    pub fn cached_textures(&self) -> usize {
        self.textures.len()
    }

    /// Point a record at a renamed source
    pub fn rename_source(&mut self, id: &str, new_path: &str) {
        if let Some(record) = self.records.get_mut(id) {
            record.source_path = new_path.to_string();
        }
    }

    /// Forget a thumbnail and delete its PNG
    pub fn remove(&mut self, id: &str) -> Option<ThumbnailRecord> {
        self.textures.remove(id);
        let record = self.records.remove(id)?;

        let png = self.thumbnail_path(id);
        if let Err(e) = fs::remove_file(&png) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to delete thumbnail {:?}: {}", png, e);
            }
        }
        Some(record)
    }

    /// Drop every thumbnail whose GUID is not in `live`.
    ///
    /// Removes stale records with their PNGs, plus `<guid>.png` files in the
    /// thumbnail directory that no record points at. Returns the number of
    /// thumbnails removed.
    pub fn retain_live(&mut self, live: &HashSet<String>) -> usize {
        let stale: Vec<String> = self
            .records
            .keys()
            .filter(|id| !live.contains(*id))
            .cloned()
            .collect();
        let mut removed = stale.len();
        for id in stale {
            self.remove(&id);
        }

        let Ok(entries) = fs::read_dir(&self.dir) else {
            return removed;
        };
        for entry in entries.flatten() {
            let png = entry.path();
            if png.extension().and_then(|e| e.to_str()) != Some("png") {
                continue;
            }
            let Some(id) = png.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !is_valid_guid(id) || live.contains(id) || self.records.contains_key(id) {
                continue;
            }
            match fs::remove_file(&png) {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("Failed to delete thumbnail {:?}: {}", png, e),
            }
        }
        removed
    }

    pub fn record(&self, id: &str) -> Option<&ThumbnailRecord> {
        self.records.get(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &ThumbnailRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_png(path: &Path, width: u32, height: u32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        image::RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 40, 255]))
            .save_with_format(path, ImageFormat::Png)
            .unwrap();
    }

    fn fixture() -> (tempfile::TempDir, ThumbnailCache) {
        let dir = tempdir().unwrap();
        let assets = dir.path().join("Assets");
        fs::create_dir_all(&assets).unwrap();
        let cache = ThumbnailCache::new(&assets, dir.path().join("Thumbnails"), THUMBNAIL_SIZE);
        (dir, cache)
    }

    #[test]
    fn test_thumbnail_dimensions() {
        assert_eq!(thumbnail_dimensions(256, 128, 64), (64, 32));
        assert_eq!(thumbnail_dimensions(100, 300, 64), (21, 64));
        assert_eq!(thumbnail_dimensions(32, 16, 64), (32, 16));
        assert_eq!(thumbnail_dimensions(64, 64, 64), (64, 64));
        assert_eq!(thumbnail_dimensions(1000, 1, 64), (64, 1));
    }

    #[test]
    fn test_update_info_staleness() {
        let (_dir, mut cache) = fixture();

        assert!(cache.update_info("g1", "a/1.png", 10));
        // Still no PNG on disk
        assert!(cache.update_info("g1", "a/1.png", 10));

        write_png(&cache.thumbnail_path("g1"), 4, 4);
        assert!(!cache.update_info("g1", "a/1.png", 10));
        assert!(cache.update_info("g1", "a/1.png", 11));
        assert!(!cache.update_info("g1", "a/1.png", 11));
    }

    #[test]
    fn test_generate_and_get() {
        let (dir, mut cache) = fixture();
        write_png(&dir.path().join("Assets/a/1.png"), 256, 128);

        assert!(cache.update_info("g1", "a/1.png", 1));
        cache.save_thumbnail_texture("g1").unwrap();
        assert!(cache.thumbnail_path("g1").is_file());
        assert!(cache.record("g1").unwrap().exists);

        let texture = cache.get_thumbnail("g1").unwrap();
        assert_eq!((texture.width, texture.height), (64, 32));
        assert_eq!(texture.rgba.len(), 64 * 32 * 4);

        let again = cache.get_thumbnail("g1").unwrap();
        assert!(Arc::ptr_eq(&texture, &again));
        assert!(cache.get_thumbnail("unknown").is_none());
    }

    #[test]
    fn test_small_source_not_upscaled() {
        let (dir, mut cache) = fixture();
        write_png(&dir.path().join("Assets/icon.png"), 16, 8);

        cache.update_info("g", "icon.png", 1);
        cache.save_thumbnail_texture("g").unwrap();
        let texture = cache.get_thumbnail("g").unwrap();
        assert_eq!((texture.width, texture.height), (16, 8));
    }

    #[test]
    fn test_generate_missing_source() {
        let (_dir, mut cache) = fixture();
        assert!(cache.save_thumbnail_texture("nothing").is_err());

        cache.update_info("g", "gone.png", 1);
        assert!(cache.save_thumbnail_texture("g").is_err());
        assert!(!cache.record("g").unwrap().exists);
    }

    #[test]
    fn test_clear_textures() {
        let (dir, mut cache) = fixture();
        for (id, name) in [("g1", "1.png"), ("g2", "2.png")] {
            write_png(&dir.path().join("Assets").join(name), 8, 8);
            cache.update_info(id, name, 1);
            cache.save_thumbnail_texture(id).unwrap();
        }

        let held = cache.get_thumbnail("g1").unwrap();
        drop(cache.get_thumbnail("g2").unwrap());
        assert_eq!(cache.cached_textures(), 2);

        assert_eq!(cache.clear_textures(), 1);
        assert_eq!(cache.cached_textures(), 1);
        assert_eq!(cache.clear_textures(), 0);

        drop(held);
        assert_eq!(cache.clear_textures(), 1);
        assert_eq!(cache.cached_textures(), 0);
    }

    #[test]
    fn test_save_load_drops_missing_png() {
        let (dir, mut cache) = fixture();
        write_png(&dir.path().join("Assets/a/1.png"), 8, 8);
        write_png(&dir.path().join("Assets/a/2.png"), 8, 8);

        cache.update_info("g1", "a/1.png", 5);
        cache.save_thumbnail_texture("g1").unwrap();
        cache.update_info("g2", "a/2.png", 6);
        cache.save_thumbnail_texture("g2").unwrap();
        cache.save().unwrap();

        fs::remove_file(cache.thumbnail_path("g2")).unwrap();

        let mut reloaded = ThumbnailCache::new(dir.path().join("Assets"), cache.dir(), THUMBNAIL_SIZE);
        assert_eq!(reloaded.load(), 1);
        let record = reloaded.record("g1").unwrap();
        assert_eq!(record.source_path, "a/1.png");
        assert_eq!(record.modify_time, 5);
        assert!(reloaded.record("g2").is_none());
        assert!(!reloaded.update_info("g1", "a/1.png", 5));
    }

    #[test]
    fn test_load_without_index() {
        let (_dir, mut cache) = fixture();
        assert_eq!(cache.load(), 0);

        fs::create_dir_all(cache.dir()).unwrap();
        fs::write(cache.index_path(), "<thumbnails>").unwrap();
        assert_eq!(cache.load(), 0);
    }

    #[test]
    fn test_remove_and_rename() {
        let (dir, mut cache) = fixture();
        write_png(&dir.path().join("Assets/a/1.png"), 8, 8);
        cache.update_info("g1", "a/1.png", 1);
        cache.save_thumbnail_texture("g1").unwrap();

        cache.rename_source("g1", "c/1.png");
        assert_eq!(cache.record("g1").unwrap().source_path, "c/1.png");

        let removed = cache.remove("g1").unwrap();
        assert_eq!(removed.id, "g1");
        assert!(!cache.thumbnail_path("g1").exists());
        assert!(cache.is_empty());
        assert!(cache.remove("g1").is_none());
    }

    #[test]
    fn test_retain_live() {
        let (dir, mut cache) = fixture();
        let (kept, stale, stray) = ("a".repeat(64), "b".repeat(64), "c".repeat(64));
        for (id, source) in [(&kept, "a/1.png"), (&stale, "a/2.png")] {
            write_png(&dir.path().join("Assets").join(source), 8, 8);
            cache.update_info(id, source, 1);
            cache.save_thumbnail_texture(id).unwrap();
        }
        write_png(&cache.thumbnail_path(&stray), 4, 4);
        write_png(&cache.thumbnail_path("not-a-guid"), 4, 4);

        let live: HashSet<String> = [kept.clone()].into_iter().collect();
        assert_eq!(cache.retain_live(&live), 2);

        assert!(cache.record(&kept).is_some());
        assert!(cache.thumbnail_path(&kept).is_file());
        assert!(cache.record(&stale).is_none());
        assert!(!cache.thumbnail_path(&stale).exists());
        assert!(!cache.thumbnail_path(&stray).exists());
        assert!(cache.thumbnail_path("not-a-guid").is_file());
        assert_eq!(cache.retain_live(&live), 0);
    }
}

//! Pipeline configuration
//!
//! # Configuration Sources (in priority order)
//!
//! 1. Command line (handled by the host binary)
//! 2. Environment variables: `VOID_ASSET_ROOT`, `VOID_ASSET_BATCH`
//! 3. Config file: `<config_dir>/void_asset_db/pipeline.toml`
//! 4. Defaults
//!
//! # Example Config File
//!
//! ```toml
//! asset_root = "Assets"
//! thumbnail_dir = "Thumbnails"   # default: <asset_root>/../Thumbnails
//! import_batch = 10
//! delete_batch = 10
//! watch = true
//! thumbnail_size = 64
//! texture_extensions = ["png", "jpg", "tga"]
//! mesh_extensions = ["obj", "gltf"]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AssetError, AssetResult};
use crate::meta::SettingsSchema;
use crate::thumbnail::THUMBNAIL_SIZE;

/// Asset pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root directory to index
    pub asset_root: PathBuf,
    /// Thumbnail directory, `<asset_root>/../Thumbnails` when unset
    pub thumbnail_dir: Option<PathBuf>,
    /// Nodes imported per tick
    pub import_batch: usize,
    /// Deletions applied per tick
    pub delete_batch: usize,
    /// Start the file watcher on open
    pub watch: bool,
    /// Longest thumbnail edge in pixels
    pub thumbnail_size: u32,
    /// Extensions that get texture settings and thumbnails
    pub texture_extensions: Vec<String>,
    /// Extensions that get mesh export settings
    pub mesh_extensions: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let schema = SettingsSchema::default();
        Self {
            asset_root: PathBuf::from("Assets"),
            thumbnail_dir: None,
            import_batch: 10,
            delete_batch: 10,
            watch: true,
            thumbnail_size: THUMBNAIL_SIZE,
            texture_extensions: schema.texture_extensions,
            mesh_extensions: schema.mesh_extensions,
        }
    }
}

impl PipelineConfig {
    /// Config rooted at `asset_root` with every other value defaulted
    pub fn with_root(asset_root: impl Into<PathBuf>) -> Self {
        Self {
            asset_root: asset_root.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> AssetResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| AssetError::io(path, e))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| AssetError::Config(format!("{}: {}", path.display(), e)))?;
        log::info!("Loaded pipeline config from {:?}", path);
        Ok(config)
    }

    /// Load from `path` if given, else from the default location.
    ///
    /// A missing default file yields the defaults; an explicit path must
    /// exist.
    pub fn load_or_default(path: Option<&Path>) -> AssetResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::load(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> AssetResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| AssetError::io(parent, e))?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| AssetError::Config(e.to_string()))?;
        fs::write(path, content).map_err(|e| AssetError::io(path, e))?;
        log::info!("Saved pipeline config to {:?}", path);
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("void_asset_db");
            p.push("pipeline.toml");
            p
        })
    }

    /// Override with environment variables
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(root) = var("VOID_ASSET_ROOT").filter(|r| !r.is_empty()) {
            self.asset_root = PathBuf::from(root);
            log::info!("Asset root from env: {:?}", self.asset_root);
        }

        if let Some(batch) = var("VOID_ASSET_BATCH") {
            match batch.parse::<usize>() {
                Ok(n) if n > 0 => {
                    self.import_batch = n;
                    self.delete_batch = n;
                }
                _ => log::warn!("Ignoring invalid VOID_ASSET_BATCH={}", batch),
            }
        }
    }

    /// Thumbnail directory with the default applied
    pub fn effective_thumbnail_dir(&self) -> PathBuf {
        match &self.thumbnail_dir {
            Some(dir) => dir.clone(),
            None => self
                .asset_root
                .parent()
                .map(|p| p.join("Thumbnails"))
                .unwrap_or_else(|| PathBuf::from("Thumbnails")),
        }
    }

    /// Settings schema built from the extension lists
    pub fn schema(&self) -> SettingsSchema {
        SettingsSchema {
            texture_extensions: self.texture_extensions.iter().map(|e| e.to_lowercase()).collect(),
            mesh_extensions: self.mesh_extensions.iter().map(|e| e.to_lowercase()).collect(),
        }
    }
}

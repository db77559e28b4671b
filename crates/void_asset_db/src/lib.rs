//! # Void Asset Database
//!
//! Asset database and import pipeline for the Void Engine editor.
//!
//! ## Features
//!
//! - **Asset Index**: In-memory mirror of the asset root, grouped into bundles
//! - **Stable GUIDs**: Per-asset `.meta` sidecars carrying a GUID and import settings
//! - **Thumbnails**: Cached 64px previews keyed by GUID
//! - **File Watching**: OS change notifications reconciled into the index
//! - **Budgeted Import**: Import work handed out in per-frame slices
//!
//! ## Example
//!
//! ```ignore
//! use void_asset_db::{AssetPipeline, PipelineConfig};
//!
//! let mut pipeline = AssetPipeline::open(PipelineConfig::with_root("Assets"));
//!
//! // In your editor loop:
//! let progress = pipeline.update();
//! if pipeline.is_busy() {
//!     let (percent, last) = pipeline.import_status();
//!     println!("Importing {:.0}% {}", percent * 100.0, last);
//! }
//!
//! // On exit:
//! pipeline.shutdown();
//! ```

pub mod config;
pub mod error;
pub mod importer;
pub mod index;
pub mod loader;
pub mod meta;
pub mod path;
pub mod pipeline;
pub mod thumbnail;
pub mod watcher;
pub mod xml;

pub use config::PipelineConfig;
pub use error::{AssetError, AssetResult};
pub use importer::{ImportScheduler, ImportState, ImportTarget, Progress};
pub use index::{AssetIndex, AssetNode, NodeId};
pub use loader::{FileLoader, FileLoaderRegistry};
pub use meta::{
    generate_guid, resolve_guid, AssetMetadata, GenericSettings, GuidResolver, ImportSettings,
    MeshExportSettings, SettingsSchema, TextureSettings,
};
pub use pipeline::AssetPipeline;
pub use thumbnail::{ThumbnailCache, ThumbnailRecord, ThumbnailTexture, THUMBNAIL_SIZE};
pub use watcher::{PendingChangeSet, WatcherBridge};

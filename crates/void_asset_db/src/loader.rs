//! File loader registry - maps extensions to the handler that opens them.
//!
//! Per-type editors register themselves here; the asset browser looks up
//! the handler when the user opens a file.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::AssetResult;

/// Handler that opens files of one or more extensions
pub trait FileLoader: Send + Sync {
    /// Open the file at `path`
    fn load_file(&self, path: &Path) -> AssetResult<()>;
}

/// Normalize an extension: no leading dot, lower-case
pub fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_lowercase()
}

/// Registry of file loaders by extension
#[derive(Default)]
pub struct FileLoaderRegistry {
    loaders: BTreeMap<String, Arc<dyn FileLoader>>,
}

impl FileLoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `loader` for `ext`, replacing any previous handler
    pub fn register(&mut self, ext: &str, loader: Arc<dyn FileLoader>) {
        let ext = normalize_extension(ext);
        if self.loaders.insert(ext.clone(), loader).is_some() {
            log::debug!("Replaced file loader for .{}", ext);
        }
    }

    /// Remove the handler for `ext` if it is `loader`.
    ///
    /// Returns whether a handler was removed. A different handler registered
    /// for the same extension stays in place.
    pub fn unregister(&mut self, ext: &str, loader: &Arc<dyn FileLoader>) -> bool {
        let ext = normalize_extension(ext);
        match self.loaders.get(&ext) {
            Some(current) if Arc::ptr_eq(current, loader) => {
                self.loaders.remove(&ext);
                true
            }
            _ => false,
        }
    }

    /// Handler for `ext`
    pub fn get(&self, ext: &str) -> Option<Arc<dyn FileLoader>> {
        self.loaders.get(&normalize_extension(ext)).cloned()
    }

    pub fn contains(&self, ext: &str) -> bool {
        self.loaders.contains_key(&normalize_extension(ext))
    }

    /// Registered extensions, sorted
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.loaders.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::path::PathBuf;

    #[derive(Default)]
    struct Recorder {
        opened: Mutex<Vec<PathBuf>>,
    }

    impl FileLoader for Recorder {
        fn load_file(&self, path: &Path) -> AssetResult<()> {
            self.opened.lock().push(path.to_path_buf());
            Ok(())
        }
    }

    #[test]
    fn test_register_and_get() {
        let recorder = Arc::new(Recorder::default());
        let mut registry = FileLoaderRegistry::new();
        registry.register(".GUI", recorder.clone());

        assert!(registry.contains("gui"));
        assert!(registry.contains(".gui"));
        assert_eq!(registry.extensions().collect::<Vec<_>>(), ["gui"]);

        registry.get("Gui").unwrap().load_file(Path::new("ui/main.gui")).unwrap();
        assert_eq!(recorder.opened.lock().len(), 1);
        assert!(registry.get("png").is_none());
    }

    #[test]
    fn test_unregister_same_instance_only() {
        let first: Arc<dyn FileLoader> = Arc::new(Recorder::default());
        let second: Arc<dyn FileLoader> = Arc::new(Recorder::default());
        let mut registry = FileLoaderRegistry::new();

        registry.register("scene", first.clone());
        registry.register("scene", second.clone());

        // The first handler was replaced, so it cannot remove the second
        assert!(!registry.unregister("scene", &first));
        assert!(registry.contains("scene"));

        assert!(registry.unregister("SCENE", &second));
        assert!(registry.is_empty());
        assert!(!registry.unregister("scene", &second));
    }
}

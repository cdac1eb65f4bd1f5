//! Serves the UI bundle from disk

use ext_window::AssetProvider;
use std::path::PathBuf;
use tracing::warn;

/// Asset provider rooted at the bundle directory
pub struct BundleAssets {
    root: PathBuf,
}

impl BundleAssets {
    /// Fails if the bundle directory does not exist
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into().canonicalize()?;
        Ok(Self { root })
    }
}

impl AssetProvider for BundleAssets {
    fn get_asset(&self, path: &str) -> Option<Vec<u8>> {
        let file_path = self.root.join(path).canonicalize().ok()?;
        // Symlinks may still point out of the bundle
        if !file_path.starts_with(&self.root) {
            warn!(path = %path, "Asset resolves outside the bundle");
            return None;
        }
        std::fs::read(&file_path).ok()
    }
}

use std::path::PathBuf;
use std::sync::Mutex;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::debug;
use walkdir::WalkDir;

use super::{SyncResult, Updater, is_image};
use crate::events::ImageRef;

/// A local folder of pictures. Reports the full listing whenever it changes.
#[derive(Debug)]
pub struct DirectorySync {
    root: PathBuf,
    last: Mutex<Option<Vec<PathBuf>>>,
}

impl DirectorySync {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            last: Mutex::new(None),
        }
    }

    /// Sorted image files below the root (symlinks followed).
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut images: Vec<PathBuf> = WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| is_image(p))
            .collect();
        images.sort();
        images
    }

    /// Listing changes since the previous call; the first call always reports.
    pub fn changes(&self) -> Option<Vec<PathBuf>> {
        let current = self.scan();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if last.as_ref() == Some(&current) {
            return None;
        }
        debug!(root = %self.root.display(), images = current.len(), "directory changed");
        *last = Some(current.clone());
        Some(current)
    }
}

impl Updater for DirectorySync {
    fn name(&self) -> String {
        format!("directory {}", self.root.display())
    }

    fn sync(&self) -> BoxFuture<'_, SyncResult> {
        async move {
            if !self.root.is_dir() {
                anyhow::bail!("{} is not a directory", self.root.display());
            }
            Ok(self
                .changes()
                .map(|paths| paths.into_iter().map(ImageRef::Local).collect()))
        }
        .boxed()
    }
}

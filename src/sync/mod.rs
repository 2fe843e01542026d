//! Content updaters: each one fetches fresh images for a display channel.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use tracing::debug;

use crate::error::Error;
use crate::events::ImageRef;
use crate::nasa::file_name;

pub mod apod;
pub mod directory;
pub mod rover;

pub use apod::ApodSync;
pub use directory::DirectorySync;
pub use rover::{RoverCameraSync, RoverHazcamSync};

/// Outcome of one sync: `None` when nothing new appeared.
pub type SyncResult = Result<Option<Vec<ImageRef>>>;

/// Fetches new content for a channel. Safe to call repeatedly.
pub trait Updater: Send + Sync {
    fn name(&self) -> String;
    fn sync(&self) -> BoxFuture<'_, SyncResult>;
}

/// Directory layout below the configured data dir.
#[derive(Debug, Clone)]
pub struct DataDirs {
    root: PathBuf,
}

impl DataDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn rovers(&self) -> PathBuf {
        self.root.join("rovers")
    }

    pub fn slideshow(&self) -> PathBuf {
        self.root.join("slideshow")
    }

    pub fn prepare(&self) -> Result<()> {
        for dir in [self.rovers(), self.slideshow()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

#[inline]
pub fn is_image(p: &Path) -> bool {
    matches!(
        p.extension()
            .and_then(OsStr::to_str)
            .map(|s| s.to_ascii_lowercase()),
        Some(ref e) if ["jpg", "jpeg", "png", "webp"].contains(&e.as_str())
    )
}

/// Download `url` into `out_dir`, keeping the remote file name.
pub async fn download(client: &reqwest::Client, url: &str, out_dir: &Path) -> Result<PathBuf> {
    let target = out_dir.join(file_name(url));
    download_to(client, url, &target).await?;
    Ok(target)
}

/// Download `url` to `target` via a `.part` file, so readers never see a
/// truncated image.
pub async fn download_to(client: &reqwest::Client, url: &str, target: &Path) -> Result<()> {
    debug!(url, target = %target.display(), "downloading");
    let bytes = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?
        .error_for_status()?
        .bytes()
        .await
        .with_context(|| format!("reading body of {url}"))?;
    if bytes.is_empty() {
        return Err(Error::EmptyDownload(url.to_string()).into());
    }
    let mut part = target.as_os_str().to_owned();
    part.push(".part");
    let part = PathBuf::from(part);
    tokio::fs::write(&part, &bytes)
        .await
        .with_context(|| format!("writing {}", part.display()))?;
    if let Err(err) = tokio::fs::rename(&part, target).await {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(err).with_context(|| format!("moving download to {}", target.display()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_image_extensions() {
        assert!(is_image(Path::new("/a/b.JPG")));
        assert!(is_image(Path::new("dash-perseverance.png")));
        assert!(is_image(Path::new("x.webp")));
        assert!(!is_image(Path::new("notes.txt")));
        assert!(!is_image(Path::new("captions")));
    }

    #[test]
    fn prepares_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = DataDirs::new(tmp.path());
        dirs.prepare().unwrap();
        assert!(dirs.rovers().is_dir());
        assert!(dirs.slideshow().is_dir());
    }
}

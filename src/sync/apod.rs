use std::path::PathBuf;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, info};

use super::{SyncResult, Updater, download_to};
use crate::events::ImageRef;
use crate::nasa::ApodApi;

pub const APOD_FILE_NAME: &str = "nasa-apod.jpg";

/// Keeps `<slideshow dir>/nasa-apod.jpg` pointing at today's picture.
#[derive(Debug, Clone)]
pub struct ApodSync {
    api: ApodApi,
    output_file: PathBuf,
}

impl ApodSync {
    pub fn new(api: ApodApi, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            api,
            output_file: output_dir.into().join(APOD_FILE_NAME),
        }
    }

    pub fn output_file(&self) -> &PathBuf {
        &self.output_file
    }

    async fn run(&self) -> SyncResult {
        let entry = self.api.latest().await?;
        info!(media_type = %entry.media_type, url = %entry.url, "latest APOD");
        if !accepts(&entry.media_type) {
            debug!("APOD is not an image today; keeping previous picture");
            return Ok(None);
        }
        download_to(self.api.client(), &entry.url, &self.output_file).await?;
        debug!(path = %self.output_file.display(), "downloaded APOD");
        Ok(Some(vec![ImageRef::Local(self.output_file.clone())]))
    }
}

fn accepts(media_type: &str) -> bool {
    media_type == "image"
}

impl Updater for ApodSync {
    fn name(&self) -> String {
        "apod".to_string()
    }

    fn sync(&self) -> BoxFuture<'_, SyncResult> {
        self.run().boxed()
    }
}

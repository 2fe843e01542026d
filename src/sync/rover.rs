//! Mars rover camera feeds.
//!
//! Each sync targets one sol and lands in its own directory,
//! `<rovers>/<rover>-<sol>` for camera frames and `<rovers>/<rover>-haz-<sol>`
//! for the hazcam dashboard. An existing directory means that sol is done.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use futures::FutureExt;
use futures::future::BoxFuture;
use image::{RgbImage, imageops};
use tracing::{debug, info, warn};

use super::{DataDirs, SyncResult, Updater, download, is_image};
use crate::events::ImageRef;
use crate::nasa::{Rover, RoverApi, RoverPhoto};

pub const HAZCAM_TILE_WIDTH: u32 = 1280;
pub const HAZCAM_TILE_HEIGHT: u32 = 960;

/// Frames from a single camera for the latest (or a fixed) sol.
#[derive(Debug, Clone)]
pub struct RoverCameraSync {
    api: RoverApi,
    dirs: DataDirs,
    sol: Option<u32>,
    camera: String,
}

impl RoverCameraSync {
    pub fn new(api: RoverApi, dirs: DataDirs, sol: Option<u32>, camera: Option<String>) -> Self {
        let camera = camera.unwrap_or_else(|| api.rover().default_camera().to_string());
        Self {
            api,
            dirs,
            sol,
            camera,
        }
    }

    pub fn sync_dir(&self, sol: u32) -> PathBuf {
        self.dirs
            .rovers()
            .join(format!("{}-{}", self.api.rover(), sol))
    }

    async fn run(&self) -> SyncResult {
        let sol = resolve_sol(&self.api, self.sol).await?;
        let sync_dir = self.sync_dir(sol);
        if sync_dir.is_dir() {
            debug!(dir = %sync_dir.display(), "sol already synced");
            return Ok(None);
        }

        let rover = self.api.rover();
        let selected: Vec<RoverPhoto> = self
            .api
            .list_images(sol, Some(&self.camera))
            .await?
            .into_iter()
            .filter(|photo| rover.wants_image(&photo.img_src))
            .collect();
        info!(%rover, sol, camera = %self.camera, selected = selected.len(), "rover listing");
        if selected.is_empty() {
            return Ok(None);
        }

        tokio::fs::create_dir_all(&sync_dir)
            .await
            .with_context(|| format!("failed to create {}", sync_dir.display()))?;

        let mut files = Vec::with_capacity(selected.len());
        for photo in &selected {
            match download_full_res(&self.api, &photo.img_src, &sync_dir).await {
                Ok(path) => files.push(ImageRef::Local(path)),
                Err(err) => warn!(url = %photo.img_src, "failed to download: {err:#}"),
            }
        }

        if files.is_empty() {
            // Leave no marker behind so the next tick retries this sol.
            let _ = tokio::fs::remove_dir(&sync_dir).await;
            return Ok(None);
        }
        Ok(Some(files))
    }
}

impl Updater for RoverCameraSync {
    fn name(&self) -> String {
        format!("{} {}", self.api.rover(), self.camera)
    }

    fn sync(&self) -> BoxFuture<'_, SyncResult> {
        self.run().boxed()
    }
}

/// The four hazard cameras of a sol, composed into one 2x2 dashboard image.
#[derive(Debug, Clone)]
pub struct RoverHazcamSync {
    api: RoverApi,
    dirs: DataDirs,
    sol: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HazcamSlot {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

impl HazcamSlot {
    pub const ALL: [Self; 4] = [
        Self::FrontLeft,
        Self::FrontRight,
        Self::RearLeft,
        Self::RearRight,
    ];

    pub fn camera(&self) -> &'static str {
        match self {
            Self::FrontLeft => "FRONT_HAZCAM_LEFT_A",
            Self::FrontRight => "FRONT_HAZCAM_RIGHT_A",
            Self::RearLeft => "REAR_HAZCAM_LEFT",
            Self::RearRight => "REAR_HAZCAM_RIGHT",
        }
    }

    fn origin(&self) -> (i64, i64) {
        let (w, h) = (i64::from(HAZCAM_TILE_WIDTH), i64::from(HAZCAM_TILE_HEIGHT));
        match self {
            Self::FrontLeft => (0, 0),
            Self::FrontRight => (w, 0),
            Self::RearLeft => (0, h),
            Self::RearRight => (w, h),
        }
    }
}

impl RoverHazcamSync {
    pub fn new(api: RoverApi, dirs: DataDirs, sol: Option<u32>) -> Self {
        Self { api, dirs, sol }
    }

    pub fn sync_dir(&self, sol: u32) -> PathBuf {
        self.dirs
            .rovers()
            .join(format!("{}-haz-{}", self.api.rover(), sol))
    }

    async fn run(&self) -> SyncResult {
        let sol = resolve_sol(&self.api, self.sol).await?;
        let sync_dir = self.sync_dir(sol);
        if sync_dir.is_dir() {
            debug!(dir = %sync_dir.display(), "hazcam sol already synced");
            return Ok(None);
        }

        let listing = self.api.list_images(sol, None).await?;
        let picks = pick_hazcam_frames(&listing);
        debug!(found = picks.len(), "hazcam frames");
        if picks.is_empty() {
            return Ok(None);
        }

        tokio::fs::create_dir_all(&sync_dir)
            .await
            .with_context(|| format!("failed to create {}", sync_dir.display()))?;

        let mut tiles = Vec::with_capacity(picks.len());
        for (slot, url) in picks {
            match download_full_res(&self.api, &url, &sync_dir).await {
                Ok(path) => tiles.push((slot, path)),
                Err(err) => warn!(camera = slot.camera(), %url, "failed to download: {err:#}"),
            }
        }
        if tiles.is_empty() {
            let _ = tokio::fs::remove_dir_all(&sync_dir).await;
            return Ok(None);
        }

        let dash = dashboard_path(&sync_dir, self.api.rover());
        let out = dash.clone();
        let rendered = tokio::task::spawn_blocking(move || render_dashboard(&tiles, &out))
            .await
            .context("dashboard task panicked")??;
        if !rendered {
            warn!(dir = %sync_dir.display(), "no hazcam frame decoded; will retry this sol");
            let _ = tokio::fs::remove_dir_all(&sync_dir).await;
            return Ok(None);
        }
        info!(path = %dash.display(), "saved hazcam dashboard");
        Ok(Some(vec![ImageRef::Local(dash)]))
    }
}

impl Updater for RoverHazcamSync {
    fn name(&self) -> String {
        format!("{} hazcam", self.api.rover())
    }

    fn sync(&self) -> BoxFuture<'_, SyncResult> {
        self.run().boxed()
    }
}

async fn resolve_sol(api: &RoverApi, requested: Option<u32>) -> Result<u32> {
    match requested {
        Some(sol) => Ok(sol),
        None => api.last_sol().await,
    }
}

async fn download_full_res(api: &RoverApi, url: &str, out_dir: &Path) -> Result<PathBuf> {
    let full = api.rover().full_res_url(url);
    if full != url {
        match download(api.client(), &full, out_dir).await {
            Ok(path) => return Ok(path),
            Err(err) => debug!(url = %full, "full-res unavailable, using listed image: {err:#}"),
        }
    }
    download(api.client(), url, out_dir).await
}

/// Newest frame per hazcam slot; frame URLs sort by capture time.
pub fn pick_hazcam_frames(listing: &[RoverPhoto]) -> Vec<(HazcamSlot, String)> {
    HazcamSlot::ALL
        .iter()
        .filter_map(|slot| {
            listing
                .iter()
                .filter(|photo| photo.camera.eq_ignore_ascii_case(slot.camera()))
                .map(|photo| photo.img_src.as_str())
                .max()
                .map(|url| (*slot, url.to_string()))
        })
        .collect()
}

pub fn compose_dashboard(tiles: &[(HazcamSlot, RgbImage)]) -> RgbImage {
    let mut dash = RgbImage::new(HAZCAM_TILE_WIDTH * 2, HAZCAM_TILE_HEIGHT * 2);
    for (slot, tile) in tiles {
        let (x, y) = slot.origin();
        imageops::replace(&mut dash, tile, x, y);
    }
    dash
}

/// Writes the dashboard to `out`. Returns `false`, writing nothing, when no
/// tile decodes.
fn render_dashboard(tiles: &[(HazcamSlot, PathBuf)], out: &Path) -> Result<bool> {
    let mut decoded = Vec::with_capacity(tiles.len());
    for (slot, path) in tiles {
        match image::open(path) {
            Ok(img) => decoded.push((*slot, img.to_rgb8())),
            Err(err) => warn!(path = %path.display(), "skipping undecodable hazcam frame: {err}"),
        }
    }
    if decoded.is_empty() {
        return Ok(false);
    }
    let dash = compose_dashboard(&decoded);
    if out.exists() {
        fs::remove_file(out).with_context(|| format!("removing stale {}", out.display()))?;
    }
    dash.save(out)
        .with_context(|| format!("saving dashboard {}", out.display()))?;
    Ok(true)
}

fn dashboard_path(sync_dir: &Path, rover: Rover) -> PathBuf {
    sync_dir.join(format!("dash-{rover}.png"))
}

/// Most recent `<prefix><sol>` directory under `rovers`, by numeric sol.
fn latest_sol_dir(rovers: &Path, prefix: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(rovers).ok()?;
    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            let sol = name.strip_prefix(prefix)?;
            if sol.is_empty() || !sol.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            Some((sol.parse::<u64>().ok()?, entry.path()))
        })
        .max_by_key(|(sol, _)| *sol)
        .map(|(_, path)| path)
}

/// Images left by the most recent camera sync, for startup content.
pub fn latest_camera_images(dirs: &DataDirs, rover: Rover) -> Option<Vec<PathBuf>> {
    let dir = latest_sol_dir(&dirs.rovers(), &format!("{rover}-"))?;
    let mut images: Vec<PathBuf> = fs::read_dir(&dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_image(path))
        .collect();
    images.sort();
    Some(images)
}

/// Dashboard left by the most recent hazcam sync.
pub fn latest_hazcam_dashboard(dirs: &DataDirs, rover: Rover) -> Option<PathBuf> {
    let dir = latest_sol_dir(&dirs.rovers(), &format!("{rover}-haz-"))?;
    let dash = dashboard_path(&dir, rover);
    dash.is_file().then_some(dash)
}

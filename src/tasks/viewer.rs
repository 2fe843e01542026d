//! Full-screen output.
//!
//! Slideshows talk to a [`Viewer`], which must never block: the production
//! [`ViewerHandle`] only queues the request for the display thread. That thread
//! owns a [`ViewerContext`] holding both backends and the knowledge of which
//! one is in the foreground.

use std::process::{Child, Command};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, bail};
use crossbeam_channel as xchan;
use tracing::{debug, error, info, warn};

use crate::events::{ImageRef, ViewerRequest};

pub trait Viewer: Send + Sync {
    fn show(&self, image: &ImageRef);
}

/// Something that can put an image on screen and take it down again.
pub trait ViewerBackend: Send {
    fn label(&self) -> &str;
    fn load(&mut self, image: &ImageRef) -> Result<()>;
    fn hide(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Foreground {
    Image,
    Web,
}

impl Foreground {
    fn for_image(image: &ImageRef) -> Self {
        match image {
            ImageRef::Local(_) => Self::Image,
            ImageRef::Remote(_) => Self::Web,
        }
    }
}

pub struct ViewerContext {
    image: Box<dyn ViewerBackend>,
    web: Box<dyn ViewerBackend>,
    foreground: Option<Foreground>,
}

impl ViewerContext {
    pub fn new(image: Box<dyn ViewerBackend>, web: Box<dyn ViewerBackend>) -> Self {
        Self {
            image,
            web,
            foreground: None,
        }
    }

    pub fn foreground(&self) -> Option<Foreground> {
        self.foreground
    }

    /// Route `image` to its backend, hiding the other one if it was in front.
    pub fn show(&mut self, image: &ImageRef) -> Result<()> {
        let target = Foreground::for_image(image);
        if let Some(current) = self.foreground {
            if current != target {
                debug!(from = ?current, to = ?target, "switching viewer");
                self.backend(current).hide()?;
            }
        }
        self.foreground = Some(target);
        let backend = self.backend(target);
        let loaded = backend.load(image);
        loaded.with_context(|| format!("{} viewer could not show {image}", backend.label()))
    }

    pub fn hide_all(&mut self) -> Result<()> {
        if let Some(current) = self.foreground.take() {
            self.backend(current).hide()?;
        }
        Ok(())
    }

    /// Move the context onto its own display thread.
    pub fn spawn(self) -> Result<(ViewerHandle, JoinHandle<()>)> {
        let (tx, rx) = xchan::unbounded();
        let handle = thread::Builder::new()
            .name("viewer".into())
            .spawn(move || self.run(rx))
            .context("failed to spawn viewer thread")?;
        Ok((ViewerHandle { tx }, handle))
    }

    fn run(mut self, rx: xchan::Receiver<ViewerRequest>) {
        info!("viewer thread started");
        while let Ok(request) = rx.recv() {
            match request {
                ViewerRequest::Show(image) => {
                    if let Err(err) = self.show(&image) {
                        error!(image = %image, "viewer failed: {err:#}");
                    }
                }
                ViewerRequest::Shutdown => break,
            }
        }
        if let Err(err) = self.hide_all() {
            warn!("failed to hide viewer on shutdown: {err:#}");
        }
        info!("viewer thread stopped");
    }

    fn backend(&mut self, which: Foreground) -> &mut dyn ViewerBackend {
        match which {
            Foreground::Image => self.image.as_mut(),
            Foreground::Web => self.web.as_mut(),
        }
    }
}

/// Cheap, cloneable sender side of the display thread.
#[derive(Debug, Clone)]
pub struct ViewerHandle {
    tx: xchan::Sender<ViewerRequest>,
}

impl ViewerHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(ViewerRequest::Shutdown);
    }
}

impl Viewer for ViewerHandle {
    fn show(&self, image: &ImageRef) {
        if self.tx.send(ViewerRequest::Show(image.clone())).is_err() {
            warn!(image = %image, "viewer thread is gone; dropping show request");
        }
    }
}

/// Runs an external full-screen program per image (`feh`, a kiosk browser, ...).
/// The reference is appended as the last argument.
#[derive(Debug)]
pub struct CommandBackend {
    label: String,
    argv: Vec<String>,
    child: Option<Child>,
}

impl CommandBackend {
    pub fn new(label: impl Into<String>, argv: Vec<String>) -> Result<Self> {
        let label = label.into();
        if argv.is_empty() {
            bail!("{label} viewer command must not be empty");
        }
        Ok(Self {
            label,
            argv,
            child: None,
        })
    }

    fn stop_child(&mut self) -> Result<()> {
        if let Some(mut child) = self.child.take() {
            match child.try_wait() {
                Ok(Some(_)) => {}
                _ => {
                    child
                        .kill()
                        .with_context(|| format!("failed to stop {} viewer", self.label))?;
                    let _ = child.wait();
                }
            }
        }
        Ok(())
    }
}

impl ViewerBackend for CommandBackend {
    fn label(&self) -> &str {
        &self.label
    }

    fn load(&mut self, image: &ImageRef) -> Result<()> {
        self.stop_child()?;
        let target = match image {
            ImageRef::Local(path) => path.display().to_string(),
            ImageRef::Remote(url) => url.clone(),
        };
        let child = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .arg(&target)
            .spawn()
            .with_context(|| format!("failed to spawn {} viewer: {}", self.label, self.argv[0]))?;
        debug!(viewer = %self.label, pid = child.id(), %target, "viewer process started");
        self.child = Some(child);
        Ok(())
    }

    fn hide(&mut self) -> Result<()> {
        self.stop_child()
    }
}

impl Drop for CommandBackend {
    fn drop(&mut self) {
        if let Err(err) = self.stop_child() {
            warn!("{err:#}");
        }
    }
}

/// Logs instead of displaying. Used for `--dry-run` and headless setups.
#[derive(Debug)]
pub struct LogBackend {
    label: String,
}

impl LogBackend {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl ViewerBackend for LogBackend {
    fn label(&self) -> &str {
        &self.label
    }

    fn load(&mut self, image: &ImageRef) -> Result<()> {
        info!(viewer = %self.label, image = %image, "display");
        Ok(())
    }

    fn hide(&mut self) -> Result<()> {
        debug!(viewer = %self.label, "hide");
        Ok(())
    }
}

//! Display driver: owns the channel rotation and the timers that move it.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channels::SlideshowChannels;
use crate::config::{ChannelConfig, Configuration, DisplayOptions, UpdateSource};
use crate::error::Error;
use crate::events::{ImageRef, NavCommand};
use crate::nasa::{ApodApi, NasaApi, RoverApi};
use crate::schedule::Scheduler;
use crate::slideshow::Slideshow;
use crate::sync::rover::{latest_camera_images, latest_hazcam_dashboard};
use crate::sync::{
    ApodSync, DataDirs, DirectorySync, RoverCameraSync, RoverHazcamSync, Updater,
};
use crate::tasks::viewer::Viewer;

/// What a channel does with the output of its updaters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePolicy {
    /// New references replace the slideshow contents.
    Replace,
    /// Updaters rewrite files the slideshow already points at.
    Refresh,
}

/// One rotation slot: a slideshow plus whatever keeps it fresh.
pub struct DisplayChannel {
    label: String,
    slideshow: Arc<Slideshow>,
    updaters: Vec<Box<dyn Updater>>,
    policy: UpdatePolicy,
}

impl DisplayChannel {
    pub fn new(label: impl Into<String>, slideshow: Arc<Slideshow>, policy: UpdatePolicy) -> Self {
        Self {
            label: label.into(),
            slideshow,
            updaters: Vec::new(),
            policy,
        }
    }

    pub fn with_updater(mut self, updater: impl Updater + 'static) -> Self {
        self.updaters.push(Box::new(updater));
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn slideshow(&self) -> &Arc<Slideshow> {
        &self.slideshow
    }

    pub fn policy(&self) -> UpdatePolicy {
        self.policy
    }

    /// Run every updater once. Returns whether the slideshow contents changed.
    ///
    /// A failing updater is logged and skipped; the call only fails when all
    /// of them did.
    pub async fn update(&self) -> Result<bool> {
        let mut fresh: Vec<ImageRef> = Vec::new();
        let mut failures = 0usize;
        for updater in &self.updaters {
            match updater.sync().await {
                Ok(Some(refs)) => {
                    debug!(channel = %self.label, updater = %updater.name(), count = refs.len(), "new content");
                    fresh.extend(refs);
                }
                Ok(None) => {
                    debug!(channel = %self.label, updater = %updater.name(), "nothing new");
                }
                Err(err) => {
                    failures += 1;
                    warn!(channel = %self.label, updater = %updater.name(), "sync failed: {err:#}");
                }
            }
        }
        if failures > 0 && failures == self.updaters.len() {
            bail!("all {failures} updaters of {} failed", self.label);
        }
        if self.policy == UpdatePolicy::Refresh || fresh.is_empty() {
            return Ok(false);
        }
        info!(channel = %self.label, images = fresh.len(), "replacing slideshow contents");
        self.slideshow.replace(fresh);
        Ok(true)
    }
}

impl std::fmt::Debug for DisplayChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayChannel")
            .field("label", &self.label)
            .field("images", &self.slideshow.len())
            .field("updaters", &self.updaters.len())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Update every channel in order; one channel failing does not stop the rest.
pub async fn update_channels(channels: &[Arc<DisplayChannel>]) {
    for channel in channels {
        match channel.update().await {
            Ok(changed) => debug!(channel = %channel.label(), changed, "channel updated"),
            Err(err) => error!(channel = %channel.label(), "update failed: {err:#}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayTiming {
    pub interval: Duration,
    pub update_interval: Duration,
    pub first_update_delay: Duration,
}

impl From<&DisplayOptions> for DisplayTiming {
    fn from(opts: &DisplayOptions) -> Self {
        Self {
            interval: opts.interval,
            update_interval: opts.update_interval,
            first_update_delay: opts.first_update_delay,
        }
    }
}

/// One output device: the root rotation, its channels and their timers.
#[derive(Debug)]
pub struct DisplayOutput {
    root: Arc<SlideshowChannels>,
    channels: Vec<Arc<DisplayChannel>>,
    scheduler: Scheduler,
    timing: DisplayTiming,
}

impl DisplayOutput {
    pub fn new(timing: DisplayTiming) -> Self {
        Self {
            root: Arc::new(SlideshowChannels::new()),
            channels: Vec::new(),
            scheduler: Scheduler::new(),
            timing,
        }
    }

    /// Build every configured channel. Startup content comes from what
    /// earlier runs left on disk.
    pub fn from_config(
        cfg: &Configuration,
        viewer: Arc<dyn Viewer>,
        client: reqwest::Client,
    ) -> Result<Self> {
        let dirs = DataDirs::new(&cfg.data_dir);
        let nasa = NasaApi::new(client, cfg.api_key.clone());
        let mut output = Self::new(DisplayTiming::from(&cfg.display));
        for channel_cfg in &cfg.channels {
            let channel = build_channel(channel_cfg, &dirs, &nasa, viewer.clone())?;
            output.add_channel(channel, channel_cfg.sequence_limit());
        }
        Ok(output)
    }

    pub fn add_channel(
        &mut self,
        channel: DisplayChannel,
        sequence_limit: Option<NonZeroUsize>,
    ) {
        info!(
            channel = %channel.label(),
            images = channel.slideshow().len(),
            limit = sequence_limit.map(|l| l.get()),
            "adding channel"
        );
        self.root.add(channel.slideshow().clone(), sequence_limit);
        self.channels.push(Arc::new(channel));
    }

    pub fn root(&self) -> &Arc<SlideshowChannels> {
        &self.root
    }

    pub fn channels(&self) -> &[Arc<DisplayChannel>] {
        &self.channels
    }

    pub fn next_image(&self) {
        self.root.next_image();
    }

    pub fn prev_image(&self) {
        self.root.prev_image();
    }

    /// Refresh every channel once.
    pub async fn update(&self) {
        update_channels(&self.channels).await;
    }

    /// Show the first image, start the timers and serve navigation commands
    /// until `cancel` fires. All timers are stopped on return.
    pub async fn run(
        &self,
        cancel: CancellationToken,
        mut commands: Receiver<NavCommand>,
    ) -> Result<()> {
        info!(
            channels = self.channels.len(),
            images = self.root.len(),
            interval = %humantime::format_duration(self.timing.interval),
            update_interval = %humantime::format_duration(self.timing.update_interval),
            "display starting"
        );
        self.root.next_image();

        if let Err(err) = self.start_timers() {
            self.scheduler.kill();
            return Err(err.into());
        }

        let mut commands_open = true;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                cmd = commands.recv(), if commands_open => match cmd {
                    Some(NavCommand::Next) => {
                        debug!("manual advance");
                        self.root.next_image();
                    }
                    Some(NavCommand::Previous) => {
                        debug!("manual retreat");
                        self.root.prev_image();
                    }
                    None => {
                        debug!("navigation channel closed");
                        commands_open = false;
                    }
                },
            }
        }

        self.scheduler.kill();
        info!("display stopped");
        Ok(())
    }

    fn start_timers(&self) -> Result<(), Error> {
        let root = self.root.clone();
        self.scheduler.run_periodically(self.timing.interval, move || {
            let root = root.clone();
            async move { root.next_image() }
        })?;

        let channels: Arc<[Arc<DisplayChannel>]> = self.channels.clone().into();
        {
            let channels = channels.clone();
            self.scheduler
                .run_periodically(self.timing.update_interval, move || {
                    let channels = channels.clone();
                    async move {
                        info!("scheduled update");
                        update_channels(&channels).await;
                    }
                })?;
        }
        self.scheduler
            .run_after(self.timing.first_update_delay, move || async move {
                info!("initial update");
                update_channels(&channels).await;
            })?;
        Ok(())
    }
}

fn build_channel(
    cfg: &ChannelConfig,
    dirs: &DataDirs,
    nasa: &NasaApi,
    viewer: Arc<dyn Viewer>,
) -> Result<DisplayChannel> {
    let slideshow = Arc::new(Slideshow::new(viewer));
    let channel = match cfg {
        ChannelConfig::Static(c) => {
            // relative files live under the data directory, where the updaters write
            slideshow.add(c.urls.iter().map(|url| match ImageRef::parse(url) {
                ImageRef::Local(path) if path.is_relative() => {
                    ImageRef::Local(dirs.root().join(path))
                }
                image => image,
            }));
            let mut channel = DisplayChannel::new("static", slideshow, UpdatePolicy::Refresh);
            for source in &c.updates {
                match source {
                    UpdateSource::Apod => {
                        channel = channel.with_updater(ApodSync::new(
                            ApodApi::new(nasa.clone()),
                            dirs.slideshow(),
                        ));
                    }
                }
            }
            channel
        }
        ChannelConfig::Rover(c) => {
            let rover = c.rover()?;
            let api = RoverApi::new(nasa.clone(), rover);
            if let Some(dash) = latest_hazcam_dashboard(dirs, rover) {
                slideshow.add([dash]);
            }
            if let Some(images) = latest_camera_images(dirs, rover) {
                slideshow.add(images);
            }
            DisplayChannel::new(format!("rover {rover}"), slideshow, UpdatePolicy::Replace)
                .with_updater(RoverCameraSync::new(
                    api.clone(),
                    dirs.clone(),
                    c.sol,
                    c.camera.clone(),
                ))
                .with_updater(RoverHazcamSync::new(api, dirs.clone(), c.sol))
        }
        ChannelConfig::Directory(c) => {
            let sync = DirectorySync::new(&c.path);
            // prime the change detector so the first tick only reports real changes
            if let Some(images) = sync.changes() {
                slideshow.add(images);
            }
            DisplayChannel::new(
                format!("directory {}", c.path.display()),
                slideshow,
                UpdatePolicy::Replace,
            )
            .with_updater(sync)
        }
    };
    Ok(channel)
}

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::nasa::Rover;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// api.nasa.gov key; `DEMO_KEY` works with tight rate limits.
    pub api_key: String,
    /// Root for downloaded content (`rovers/`, `slideshow/`).
    pub data_dir: PathBuf,
    pub display: DisplayOptions,
    pub viewer: ViewerOptions,
    pub channels: Vec<ChannelConfig>,
    pub controllers: Option<ControllersConfig>,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&s)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.channels.is_empty(),
            "at least one channel must be configured"
        );
        ensure!(!self.api_key.trim().is_empty(), "api-key must not be blank");
        self.display.validate()?;
        for (idx, channel) in self.channels.iter().enumerate() {
            channel
                .validate()
                .with_context(|| format!("invalid channel #{}", idx + 1))?;
        }
        if let Some(rotary) = self.controllers.as_ref().and_then(|c| c.gray_rotary.as_ref()) {
            rotary.validate().context("invalid controllers.gray-rotary")?;
        }
        Ok(self)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            api_key: "DEMO_KEY".to_string(),
            data_dir: PathBuf::from("."),
            display: DisplayOptions::default(),
            viewer: ViewerOptions::default(),
            channels: Vec::new(),
            controllers: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DisplayOptions {
    pub title: String,
    /// Time each image stays on screen.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Gap between content refreshes.
    #[serde(with = "humantime_serde")]
    pub update_interval: Duration,
    /// Delay before the first refresh after startup.
    #[serde(with = "humantime_serde")]
    pub first_update_delay: Duration,
}

impl DisplayOptions {
    fn validate(&self) -> Result<()> {
        ensure!(
            !self.interval.is_zero(),
            "display.interval must be positive"
        );
        ensure!(
            !self.update_interval.is_zero(),
            "display.update-interval must be positive"
        );
        Ok(())
    }
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            title: format!("Duna Screen v{}", env!("CARGO_PKG_VERSION")),
            interval: Duration::from_secs(60),
            update_interval: Duration::from_secs(6 * 60 * 60),
            first_update_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ViewerOptions {
    /// Program (and leading arguments) used for local files. Empty = log only.
    pub image_command: Vec<String>,
    /// Program used for remote URLs. Empty = log only.
    pub web_command: Vec<String>,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            image_command: vec![
                "feh".into(),
                "--fullscreen".into(),
                "--auto-zoom".into(),
                "--hide-pointer".into(),
            ],
            web_command: vec!["chromium-browser".into(), "--kiosk".into()],
        }
    }
}

/// One rotation slot, selected by its `type` key.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChannelConfig {
    Static(StaticChannelConfig),
    Rover(RoverChannelConfig),
    Directory(DirectoryChannelConfig),
}

impl ChannelConfig {
    pub fn sequence_limit(&self) -> Option<NonZeroUsize> {
        let raw = match self {
            Self::Static(c) => c.sequence_limit,
            Self::Rover(c) => c.sequence_limit,
            Self::Directory(c) => c.sequence_limit,
        };
        raw.and_then(NonZeroUsize::new)
    }

    fn validate(&self) -> Result<()> {
        let raw = match self {
            Self::Static(c) => {
                ensure!(!c.urls.is_empty(), "static channel needs at least one url");
                c.sequence_limit
            }
            Self::Rover(c) => {
                c.rover()?;
                c.sequence_limit
            }
            Self::Directory(c) => c.sequence_limit,
        };
        if let Some(limit) = raw {
            ensure!(limit > 0, "sequence-limit must be greater than zero");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct StaticChannelConfig {
    pub urls: Vec<String>,
    #[serde(default)]
    pub updates: Vec<UpdateSource>,
    #[serde(default)]
    pub sequence_limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UpdateSource {
    #[serde(alias = "APOD")]
    Apod,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct RoverChannelConfig {
    pub name: String,
    #[serde(default)]
    pub camera: Option<String>,
    /// Pin a sol instead of following the latest one.
    #[serde(default)]
    pub sol: Option<u32>,
    #[serde(default)]
    pub sequence_limit: Option<usize>,
}

impl RoverChannelConfig {
    pub fn rover(&self) -> Result<Rover> {
        Ok(self.name.parse::<Rover>()?)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct DirectoryChannelConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub sequence_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct ControllersConfig {
    pub gray_rotary: Option<GrayRotaryConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GrayRotaryConfig {
    #[serde(default = "GrayRotaryConfig::default_chip")]
    pub chip: PathBuf,
    /// GPIO line offsets, most significant bit first.
    pub pins: Vec<u32>,
    /// Raw codes in the order they appear while turning the knob.
    #[serde(default)]
    pub sequence: Option<Vec<u32>>,
    #[serde(
        default = "GrayRotaryConfig::default_poll_interval",
        with = "humantime_serde"
    )]
    pub poll_interval: Duration,
}

impl GrayRotaryConfig {
    fn default_chip() -> PathBuf {
        PathBuf::from("/dev/gpiochip0")
    }

    const fn default_poll_interval() -> Duration {
        Duration::from_millis(5)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            (1..=8).contains(&self.pins.len()),
            "between 1 and 8 pins are supported"
        );
        if let Some(sequence) = &self.sequence {
            ensure!(sequence.len() >= 2, "sequence needs at least two positions");
            let max_code = 1u32 << self.pins.len();
            ensure!(
                sequence.iter().all(|&code| code < max_code),
                "sequence codes must fit in {} bits",
                self.pins.len()
            );
            let mut sorted = sequence.clone();
            sorted.sort_unstable();
            sorted.dedup();
            ensure!(
                sorted.len() == sequence.len(),
                "sequence codes must be unique"
            );
        }
        ensure!(
            !self.poll_interval.is_zero(),
            "poll-interval must be positive"
        );
        Ok(())
    }
}

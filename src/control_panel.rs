//! Rotary-encoder navigation.
//!
//! The encoder reports absolute positions on a ring. Events may be coalesced,
//! so a transition can skip detents, and the ring wraps. The direction is the
//! sign of the shortest signed distance between the two positions.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::channels::SlideshowChannels;
use crate::error::Error;

/// Detents on the encoder fitted to the frame.
pub const DEFAULT_RING_SIZE: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Signed step between two ring positions, choosing the candidate with the
/// smallest magnitude. On a tie the unwrapped difference wins.
pub fn rotary_delta(from: u32, to: u32, ring_size: u32) -> i64 {
    let (from, to, ring) = (i64::from(from), i64::from(to), i64::from(ring_size));
    let mut candidates = [to - from, (ring + to) - from, (-ring + to) - from];
    // stable: keeps the literal difference first among equals
    candidates.sort_by_key(|delta| delta.abs());
    candidates[0]
}

pub fn resolve_direction(from: u32, to: u32, ring_size: u32) -> Option<Direction> {
    match rotary_delta(from, to, ring_size) {
        0 => None,
        d if d > 0 => Some(Direction::Forward),
        _ => Some(Direction::Backward),
    }
}

/// Source of absolute encoder positions in `[0, ring_size)`.
pub trait RotarySource: Send {
    fn read(&mut self) -> Result<u32>;
    fn ring_size(&self) -> u32;
}

/// Maps raw pin codes to ring positions.
///
/// Encoders emit Gray code; the order of codes around the ring depends on the
/// switch and the wiring, so it is configured as an explicit sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayCodeRing {
    sequence: Option<Vec<u32>>,
    bits: u32,
}

impl GrayCodeRing {
    pub fn new(bits: u32, sequence: Option<Vec<u32>>) -> Self {
        Self { sequence, bits }
    }

    pub fn ring_size(&self) -> u32 {
        match &self.sequence {
            Some(sequence) => sequence.len() as u32,
            None => 1u32 << self.bits,
        }
    }

    pub fn translate(&self, raw: u32) -> Result<u32, Error> {
        match &self.sequence {
            None => Ok(raw),
            Some(sequence) => sequence
                .iter()
                .position(|&code| code == raw)
                .map(|idx| idx as u32)
                .ok_or(Error::UnknownRotaryCode(raw)),
        }
    }
}

/// Pack pin levels into a code, first pin as the most significant bit.
pub fn pack_levels(levels: &[u8]) -> u32 {
    levels
        .iter()
        .fold(0u32, |acc, &level| (acc << 1) | u32::from(level & 1))
}

/// Turns encoder transitions into navigation on the root rotation.
pub struct ControlPanel {
    slideshow: Arc<SlideshowChannels>,
    ring_size: u32,
}

impl ControlPanel {
    pub fn new(slideshow: Arc<SlideshowChannels>, ring_size: u32) -> Self {
        Self {
            slideshow,
            ring_size,
        }
    }

    pub fn on_rotary_change(&self, from: u32, to: u32) {
        debug!(from, to, "rotary change");
        match resolve_direction(from, to, self.ring_size) {
            Some(Direction::Forward) => self.slideshow.next_image(),
            Some(Direction::Backward) => self.slideshow.prev_image(),
            None => {}
        }
    }
}

/// Polls a [`RotarySource`] on a background thread and reports transitions.
pub struct RotaryWatcher<S> {
    source: S,
    poll_interval: Duration,
}

impl<S: RotarySource + 'static> RotaryWatcher<S> {
    pub fn new(source: S, poll_interval: Duration) -> Self {
        Self {
            source,
            poll_interval,
        }
    }

    /// Install the single change callback and start polling. The callback
    /// receives `(old, new)` for every observed change of position.
    pub fn on_change<F>(mut self, cancel: CancellationToken, callback: F) -> Result<JoinHandle<()>>
    where
        F: Fn(u32, u32) + Send + 'static,
    {
        let mut value = self.source.read().context("initial rotary read failed")?;
        info!(position = value, "rotary watcher started");
        thread::Builder::new()
            .name("rotary".into())
            .spawn(move || {
                while !cancel.is_cancelled() {
                    match self.source.read() {
                        Ok(next) if next != value => {
                            let old = std::mem::replace(&mut value, next);
                            callback(old, next);
                        }
                        Ok(_) => {}
                        Err(err) => debug!("rotary read skipped: {err:#}"),
                    }
                    thread::sleep(self.poll_interval);
                }
                info!("rotary watcher stopped");
            })
            .context("failed to spawn rotary thread")
    }
}

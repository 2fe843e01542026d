//! Multi-channel rotation over several [`Slideshow`]s.
//!
//! Each channel gets a visit budget: the optional sequence limit clamped to the
//! channel's current length. Advancing spends the budget and moves to the next
//! channel when it is exhausted; retreating past the start of a channel enters
//! the previous one with a full budget, so the user can walk backwards through
//! all of it.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::slideshow::Slideshow;

struct Channel {
    slideshow: Arc<Slideshow>,
    sequence_limit: Option<NonZeroUsize>,
}

impl Channel {
    fn effective_limit(&self) -> i64 {
        let len = self.slideshow.len();
        let limit = self.sequence_limit.map_or(len, |limit| limit.get().min(len));
        limit as i64
    }
}

#[derive(Default)]
struct RotationState {
    channels: Vec<Channel>,
    current: usize,
    counter: i64,
}

impl RotationState {
    fn enter_next(&mut self) {
        self.current = (self.current + 1) % self.channels.len();
        self.counter = 0;
        debug!(channel = self.current, "entering channel forward");
    }

    fn enter_previous(&mut self) {
        let n = self.channels.len();
        self.current = (self.current + n - 1) % n;
        self.counter = self.channels[self.current].effective_limit();
        debug!(
            channel = self.current,
            budget = self.counter,
            "entering channel backward"
        );
    }
}

/// Root of the display rotation. The active-channel cursor, the visit counter
/// and the delegated navigation call form one critical section.
#[derive(Default)]
pub struct SlideshowChannels {
    state: Mutex<RotationState>,
}

impl std::fmt::Debug for SlideshowChannels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("SlideshowChannels")
            .field("channels", &state.channels.len())
            .field("current", &state.current)
            .field("counter", &state.counter)
            .finish()
    }
}

/// Snapshot of the rotation cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPosition {
    pub channel: usize,
    pub counter: i64,
}

impl SlideshowChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a channel. The first channel becomes active immediately.
    pub fn add(&self, slideshow: Arc<Slideshow>, sequence_limit: Option<NonZeroUsize>) {
        let mut state = self.lock();
        state.channels.push(Channel {
            slideshow,
            sequence_limit,
        });
        if state.channels.len() == 1 {
            state.enter_next();
        }
    }

    pub fn next_image(&self) {
        let mut state = self.lock();
        if state.channels.is_empty() {
            return;
        }
        let channel = &state.channels[state.current];
        channel.slideshow.next_image();
        let limit = channel.effective_limit();
        state.counter += 1;
        if state.counter >= limit {
            state.enter_next();
        }
    }

    pub fn prev_image(&self) {
        let mut state = self.lock();
        if state.channels.is_empty() {
            return;
        }
        state.channels[state.current].slideshow.prev_image();
        state.counter -= 1;
        if state.counter <= 0 {
            state.enter_previous();
        }
    }

    /// Total images across all channels.
    pub fn len(&self) -> usize {
        self.lock()
            .channels
            .iter()
            .map(|channel| channel.slideshow.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channel_count(&self) -> usize {
        self.lock().channels.len()
    }

    pub fn position(&self) -> RotationPosition {
        let state = self.lock();
        RotationPosition {
            channel: state.current,
            counter: state.counter,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RotationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

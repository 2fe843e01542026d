use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::info;

use crate::events::ImageRef;
use crate::tasks::viewer::Viewer;

type Listener = Box<dyn Fn() + Send + Sync>;

/// One channel's ordered image list with a wrapping cursor.
///
/// Navigation and mutation share a single lock, so a show never reads an
/// index that a concurrent `clear` just invalidated.
pub struct Slideshow {
    viewer: Arc<dyn Viewer>,
    state: Mutex<SlideState>,
    listeners: Mutex<Vec<Listener>>,
}

#[derive(Debug, Default)]
struct SlideState {
    images: Vec<ImageRef>,
    current: usize,
}

impl Slideshow {
    pub fn new(viewer: Arc<dyn Viewer>) -> Self {
        Self {
            viewer,
            state: Mutex::new(SlideState::default()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Append one or more images. Listeners fire once per call.
    pub fn add<I>(&self, images: I)
    where
        I: IntoIterator,
        I::Item: Into<ImageRef>,
    {
        self.lock_state()
            .images
            .extend(images.into_iter().map(Into::into));
        self.notify();
    }

    /// Drop all images. The cursor is left as is; the next navigation call
    /// folds it back into range.
    pub fn clear(&self) {
        self.lock_state().images.clear();
        self.notify();
    }

    /// Clear and add under one lock, so navigation never observes the empty
    /// intermediate state. Listeners fire once.
    pub fn replace<I>(&self, images: I)
    where
        I: IntoIterator,
        I::Item: Into<ImageRef>,
    {
        {
            let mut state = self.lock_state();
            state.images.clear();
            state.images.extend(images.into_iter().map(Into::into));
        }
        self.notify();
    }

    pub fn next_image(&self) {
        self.step(1);
    }

    pub fn prev_image(&self) {
        self.step(-1);
    }

    pub fn len(&self) -> usize {
        self.lock_state().images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cursor position, or `None` while the slideshow is empty.
    pub fn current_index(&self) -> Option<usize> {
        let state = self.lock_state();
        if state.images.is_empty() {
            None
        } else {
            Some(state.current % state.images.len())
        }
    }

    pub fn images(&self) -> Vec<ImageRef> {
        self.lock_state().images.clone()
    }

    /// Register a callback invoked after every `add`, `clear` or `replace`.
    pub fn add_listener(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(listener));
    }

    fn step(&self, delta: isize) {
        let mut state = self.lock_state();
        let len = state.images.len();
        if len == 0 {
            return;
        }
        state.current = wrap_index(state.current, delta, len);
        let image = &state.images[state.current];
        info!(image = %image, "show");
        self.viewer.show(image);
    }

    fn notify(&self) {
        let listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener();
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SlideState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Slideshow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("Slideshow")
            .field("images", &state.images.len())
            .field("current", &state.current)
            .finish()
    }
}

/// True modulo: never negative, always `< len`.
fn wrap_index(current: usize, delta: isize, len: usize) -> usize {
    let len = len as isize;
    let current = (current as isize).rem_euclid(len);
    (current + delta).rem_euclid(len) as usize
}

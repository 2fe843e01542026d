pub mod channels;
pub mod config;
pub mod control_panel;
pub mod error;
pub mod events;
pub mod nasa;
pub mod platform;
pub mod schedule;
pub mod slideshow;
pub mod sync;
pub mod tasks {
    pub mod display;
    pub mod viewer;
}

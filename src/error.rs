use thiserror::Error;

/// Library error type for duna-screen operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The scheduler was killed; no further work may be scheduled on it.
    #[error("scheduler has been killed")]
    SchedulerKilled,

    /// Rover names are restricted to alphanumeric characters.
    #[error("invalid rover name: {0}")]
    InvalidRoverName(String),

    /// A well-formed rover name that has no API binding.
    #[error("unknown rover: {0}")]
    UnknownRover(String),

    /// The encoder pins produced a code outside the configured sequence.
    #[error("rotary code {0:#06b} is not part of the configured sequence")]
    UnknownRotaryCode(u32),

    /// A download finished without producing any bytes.
    #[error("empty download from {0}")]
    EmptyDownload(String),
}

//! Error type shared by every stage of the perception-to-motion pipeline.

use thiserror::Error;

use crate::drivers::DriverError;

/// Errors surfaced by the scanner, executor, game state and service layers.
#[derive(Error, Debug)]
pub enum Error {
    /// A required collaborator or setting is missing or out of range.
    #[error("configuration error: {0}")]
    Config(String),

    /// The requested square is not usable in the latest snapshot.
    #[error("can't find object for {label}: {reason}")]
    Perception { label: String, reason: &'static str },

    /// Every grasp attempt down to the height floor was rejected.
    #[error("couldn't grab piece on {label} after {attempts} attempts, won't go below {floor}")]
    Grasp {
        label: String,
        attempts: usize,
        floor: f64,
    },

    /// A motion, gripper or homing call failed.
    #[error("{action} failed: {source}")]
    Motion {
        action: &'static str,
        #[source]
        source: DriverError,
    },

    /// The sensor could not deliver a capture.
    #[error("sensor capture failed: {0}")]
    Capture(#[source] DriverError),

    /// The executor has no primitive for this kind of move.
    #[error("can't handle {mv}: {reason}")]
    UnsupportedMove { mv: String, reason: &'static str },

    /// The position store could not be read or written.
    #[error("position store {location}: {reason}")]
    Persistence { location: String, reason: String },

    /// The position store holds something that is not a valid position.
    #[error("invalid position in {location} ({contents}): {reason}")]
    CorruptPosition {
        location: String,
        contents: String,
        reason: String,
    },

    /// The engine process failed to start, answer or stop.
    #[error("engine error: {0}")]
    Engine(String),

    /// The position has no legal moves left.
    #[error("no valid moves: {0}")]
    GameOver(String),

    /// A move that is not legal in the current position.
    #[error("illegal move {mv}: {reason}")]
    IllegalMove { mv: String, reason: String },

    /// The high-level request matched neither command shape.
    #[error("bad cmd {0}")]
    Command(String),

    /// The service was closed and takes no more operations.
    #[error("service closed")]
    Closed,
}

impl Error {
    pub(crate) fn motion(action: &'static str) -> impl FnOnce(DriverError) -> Error {
        move |source| Error::Motion { action, source }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

//! Chess-playing robot arm station.
//!
//! This crate turns one depth-camera capture into a 64-square board snapshot,
//! picks the next move (from a UCI engine or the first legal move), and carries
//! it out with a gripper arm:
//! - [`BoardScanner`]: capture -> [`BoardSnapshot`].
//! - [`CoordinateResolver`]: square label -> grasp/release point.
//! - [`MoveExecutor`]: pick-and-place with a descending grasp retry ladder.
//! - [`GameStateManager`]: persisted FEN position, move choice and application.
//! - [`ChessService`]: the serialized high-level operations, always ending homed.
//!
//! Hardware is reached only through the traits in [`drivers`].

pub mod command;
pub mod config;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod executor;
pub mod game;
pub mod geometry;
pub mod resolver;
pub mod scanner;
pub mod service;
pub mod snapshot;
pub mod store;

#[cfg(test)]
mod testing;

// Re-exported so hosts can share their database with `SledPositionStore::from_db`
// without a direct dependency on `sled`.
pub use sled;

pub use command::{bind_command_socket, serve_commands, Command, CHESS_IPC_NAME};
pub use config::ChessConfig;
pub use engine::{ChessEngine, EngineSettings, UciEngine};
pub use error::{Error, Result};
pub use executor::{MoveExecutor, MoveReport};
pub use game::{ChessMove, GameStateManager, Position};
pub use resolver::{CoordinateResolver, Target};
pub use scanner::{BoardScanner, Capture};
pub use service::{ChessService, ChessServiceBuilder};
pub use snapshot::{BoardSnapshot, Occupancy};
pub use store::{FilePositionStore, PositionStore, SledPositionStore};

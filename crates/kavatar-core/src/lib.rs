//! Kavatar - a hex territory game with a late-game invasion
//!
//! This crate provides the headless rules engine for Kavatar, including:
//! - Axial hex coordinates and the fixed map catalogue
//! - Tile ownership, power and shields
//! - Faction AP economy, combat and special abilities
//! - The turn/round state machine with its invasion phase and AI invader
//! - A fully reversible action log
//!
//! # Architecture
//!
//! The engine is platform-agnostic. It can be compiled to:
//! - Native Rust for server-side match hosting
//! - WebAssembly for a browser UI (`wasm` feature)
//!
//! Presentation layers drive a [`GameManager`] through its operations and
//! listen for [`GameEvent`]s through [`GameObserver`].
//!
//! # Modules
//!
//! - [`hex`]: Axial coordinates and hex distance
//! - [`grid`]: Tiles and the map topology
//! - [`maps`]: Built-in maps and rules constants
//! - [`team`]: Faction records
//! - [`game`]: Game state machine
//! - [`invader`]: The invader's scripted turn
//! - [`history`]: Undo records
//! - [`save`]: Persistence

pub mod actions;
pub mod game;
pub mod grid;
pub mod hex;
pub mod history;
pub mod invader;
pub mod maps;
pub mod observer;
pub mod save;
mod skills;
pub mod team;
#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use actions::{GameAction, GameEvent, Skill};
pub use game::{GameError, GameManager, GamePhase, Outcome, Territory, TurnHolder};
pub use grid::{FactionId, HexGrid, Landmark, Owner, Tile, INVADER_ID};
pub use hex::{Direction, HexCoord};
pub use history::{ActionKind, ActionLog, ActionRecord, TileSnapshot, TurnTransition};
pub use invader::{InvaderController, InvaderStep};
pub use maps::{HeadquartersPlacement, MapConfig, MapId, RuleSet};
pub use observer::{EventLog, GameObserver};
pub use save::{MemoryStore, SaveData, SaveStore, TileSave};
pub use team::{Team, TeamColor};

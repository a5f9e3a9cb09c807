//! Reversible action records and the LIFO action log.
//!
//! Every mutating operation pushes exactly one `ActionRecord` holding the
//! pre-action state it needs to be reverted. The undo operator in
//! [`crate::game`] matches on every variant, so a new action kind cannot be
//! added without deciding how to undo it.

use crate::actions::Skill;
use crate::game::{GamePhase, TurnHolder};
use crate::grid::{FactionId, Owner};
use crate::hex::HexCoord;
use serde::{Deserialize, Serialize};

/// Pre-change state of one tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSnapshot {
    pub coord: HexCoord,
    pub owner: Owner,
    pub power: u8,
    pub shielded: bool,
    pub permanent_shield: bool,
}

/// Everything the invasion spawn changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvasionTransition {
    /// Round the invasion began in
    pub round: u32,
    /// Landmark tiles as they were before the spawn
    pub landmarks: Vec<TileSnapshot>,
    /// AP paid to factions that lost landmarks
    pub compensation: Vec<(FactionId, u32)>,
}

/// Everything that happened between one human turn ending and the next
/// human turn starting (or the match concluding).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnTransition {
    pub from_holder: TurnHolder,
    pub from_round: u32,
    pub from_phase: GamePhase,
    pub to_holder: TurnHolder,
    pub to_round: u32,
    /// Income plus bonus paid to the faction whose turn started
    pub ap_granted: u32,
    /// Whether this transition paid the one-shot expansion bonus
    pub bonus_granted: bool,
    /// Snapshots in the order changes happened: invader maintenance and
    /// moves, the invasion spawn, then the new holder's maintenance pass
    pub tile_changes: Vec<TileSnapshot>,
    pub invasion: Option<InvasionTransition>,
}

impl TurnTransition {
    /// Open a transition from the current position
    pub fn open(holder: TurnHolder, round: u32, phase: GamePhase) -> Self {
        Self {
            from_holder: holder,
            from_round: round,
            from_phase: phase,
            to_holder: holder,
            to_round: round,
            ap_granted: 0,
            bonus_granted: false,
            tile_changes: Vec::new(),
            invasion: None,
        }
    }
}

/// Discriminant of an `ActionRecord`, for notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    HeadquartersPlaced,
    Recruit,
    Fortify,
    Expand,
    Attack,
    Purify,
    Skill,
    ApAdjusted,
    TurnTransition,
}

/// One reversible entry in the action log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionRecord {
    HeadquartersPlaced {
        faction: FactionId,
        tile: TileSnapshot,
        /// Setup progress before this placement
        placed_before: u8,
        /// Start of play, when this was the last placement
        opened_play: Option<Box<TurnTransition>>,
    },
    Recruit {
        faction: FactionId,
        tile: TileSnapshot,
        cost: u32,
    },
    Fortify {
        faction: FactionId,
        tile: TileSnapshot,
        cost: u32,
    },
    Expand {
        faction: FactionId,
        tile: TileSnapshot,
        cost: u32,
    },
    Attack {
        faction: FactionId,
        source: TileSnapshot,
        target: TileSnapshot,
        cost: u32,
    },
    Purify {
        faction: FactionId,
        tile: TileSnapshot,
        cost: u32,
    },
    Skill {
        faction: FactionId,
        skill: Skill,
        tiles: Vec<TileSnapshot>,
    },
    ApAdjusted {
        faction: FactionId,
        delta: i64,
    },
    TurnTransition(Box<TurnTransition>),
}

impl ActionRecord {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionRecord::HeadquartersPlaced { .. } => ActionKind::HeadquartersPlaced,
            ActionRecord::Recruit { .. } => ActionKind::Recruit,
            ActionRecord::Fortify { .. } => ActionKind::Fortify,
            ActionRecord::Expand { .. } => ActionKind::Expand,
            ActionRecord::Attack { .. } => ActionKind::Attack,
            ActionRecord::Purify { .. } => ActionKind::Purify,
            ActionRecord::Skill { .. } => ActionKind::Skill,
            ActionRecord::ApAdjusted { .. } => ActionKind::ApAdjusted,
            ActionRecord::TurnTransition(_) => ActionKind::TurnTransition,
        }
    }
}

/// Append-only stack of records, popped in strict LIFO order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLog {
    records: Vec<ActionRecord>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ActionRecord) {
        self.records.push(record);
    }

    /// Remove and return the most recent record
    pub fn pop(&mut self) -> Option<ActionRecord> {
        self.records.pop()
    }

    pub fn last(&self) -> Option<&ActionRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Records oldest first
    pub fn iter(&self) -> impl Iterator<Item = &ActionRecord> + '_ {
        self.records.iter()
    }
}

//! Game actions that factions can take.
//!
//! This module defines the command surface of the engine (`GameAction`) and
//! the notifications it publishes (`GameEvent`).

use crate::game::{Outcome, TurnHolder};
use crate::grid::{FactionId, Owner};
use crate::hex::HexCoord;
use crate::history::ActionKind;
use serde::{Deserialize, Serialize};

/// Faction special abilities.
///
/// Availability is granted from outside the engine; using one costs no AP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Skill {
    /// Weaken every enemy tile around a target
    Drain,
    /// Take a weak enemy tile next to your territory
    Seize,
    /// Shield your tiles around a target
    Bulwark,
    /// Swallow weak neighbors of one of your tiles
    Absorb,
    /// Strengthen your tiles around a target
    Rally,
    /// Purify invader tiles around one of your tiles
    Cleanse,
}

impl Skill {
    pub const ALL: [Skill; 6] = [
        Skill::Drain,
        Skill::Seize,
        Skill::Bulwark,
        Skill::Absorb,
        Skill::Rally,
        Skill::Cleanse,
    ];
}

/// All possible actions a faction can take
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameAction {
    // ==================== Setup Phase ====================
    /// Claim a headquarters tile (manual-placement maps only)
    PlaceHeadquarters(HexCoord),

    // ==================== Tile Actions ====================
    /// +1 power on an own tile
    Recruit(HexCoord),
    /// Shield an own tile
    Fortify(HexCoord),
    /// Claim a neutral tile bordering your territory
    Expand(HexCoord),
    /// Attack an adjacent tile from an own tile
    Attack { from: HexCoord, to: HexCoord },
    /// Neutralize an invader tile bordering your territory
    Purify(HexCoord),
    /// Use the currently available special ability
    UseSkill { skill: Skill, target: HexCoord },

    // ==================== Turn Management ====================
    /// End your turn
    EndTurn,
}

/// Events that occur as a result of actions and turn progression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEvent {
    /// A headquarters was placed during setup
    HeadquartersPlaced { faction: FactionId, coord: HexCoord },

    /// Every faction has placed its headquarters
    SetupCompleted,

    /// A tile gained power
    Recruited {
        faction: FactionId,
        coord: HexCoord,
        power: u8,
    },

    /// A tile was shielded
    Fortified { faction: FactionId, coord: HexCoord },

    /// A neutral tile was claimed
    Expanded { faction: FactionId, coord: HexCoord },

    /// An attack took a tile
    Captured {
        faction: FactionId,
        from: HexCoord,
        to: HexCoord,
        previous_owner: Owner,
        power: u8,
    },

    /// An invader tile was neutralized
    Purified {
        faction: FactionId,
        coord: HexCoord,
        cost: u32,
    },

    /// A special ability was made available
    SkillGranted { faction: FactionId, skill: Skill },

    /// A special ability was used
    SkillUsed {
        faction: FactionId,
        skill: Skill,
        target: HexCoord,
        affected: Vec<HexCoord>,
    },

    /// AP was adjusted administratively
    ApAdjusted {
        faction: FactionId,
        delta: i64,
        total: u32,
    },

    /// A turn was handed on
    TurnEnded { holder: TurnHolder },

    /// A new turn began
    TurnStarted {
        holder: TurnHolder,
        round: u32,
        /// Income plus any bonus paid at turn start
        ap_granted: u32,
        expansion_bonus: bool,
    },

    /// Turn-start maintenance touched these tiles
    MaintenanceApplied {
        holder: TurnHolder,
        tiles: Vec<HexCoord>,
    },

    /// The invasion phase began
    InvasionStarted {
        round: u32,
        landmarks: Vec<HexCoord>,
        compensation: Vec<(FactionId, u32)>,
    },

    /// The invader sat out its turn (invincible round)
    InvaderDormant { round: u32 },

    /// Every invader tile gained power
    InvaderGrew { tiles: usize },

    /// The invader spread to a tile
    InvaderInfected { from: HexCoord, to: HexCoord },

    /// The match is over
    MatchConcluded { outcome: Outcome },

    /// One second of the turn clock elapsed
    TimerTick { remaining: u32 },

    /// The turn clock ran out and the turn was ended
    TurnTimedOut { faction: FactionId },

    /// The turn clock was paused or resumed
    PauseChanged { paused: bool },

    /// The last logged action was reverted
    ActionUndone { kind: ActionKind },

    /// State was replaced from a save
    GameLoaded,

    /// Advisory message for the player
    Notice { message: String },
}

//! WebSocket protocol messages for hosted Kavatar matches.

use kavatar_core::{FactionId, GameError, GameEvent, MapId, SaveData, Skill, TurnHolder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    /// Host a new match on a built-in map
    CreateMatch { map_id: MapId, seed: Option<u64> },

    /// Join an existing match
    JoinMatch { match_id: Uuid },

    /// Leave the current match
    LeaveMatch,

    /// Submit a game action for the faction whose turn it is
    Action { action: serde_json::Value },

    /// Revert the last logged action
    Undo,

    /// Administrative AP change
    AdjustAp { faction: FactionId, delta: i64 },

    /// Hand a faction an ability (the roulette result)
    GrantSkill { faction: FactionId, skill: Skill },

    SetPaused { paused: bool },

    /// Store the match under a key
    Save { key: String },

    /// Replace the match with the save under a key
    Load { key: String },

    /// Request the match list
    ListMatches,

    /// Ping for keepalive
    Ping,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// Welcome message with assigned client ID
    Welcome { client_id: Uuid },

    /// Match created successfully
    MatchCreated { match_id: Uuid },

    /// Joined a match
    Joined { info: MatchInfo },

    /// Full match state
    State { state: SaveData },

    /// Events produced by an operation or by the clock
    Events { events: Vec<GameEvent> },

    /// The engine refused an operation
    ActionRejected { error: GameError, message: String },

    /// List of hosted matches
    MatchList { matches: Vec<MatchInfo> },

    Saved { key: String },

    Loaded { key: String },

    /// Error occurred
    Error { message: String },

    /// Pong response
    Pong,
}

/// Match information for clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchInfo {
    pub id: Uuid,
    pub map_id: MapId,
    pub map_name: String,
    pub round: u32,
    pub current_turn: TurnHolder,
    pub clients: usize,
    pub status: MatchStatus,
}

/// Match status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStatus {
    InProgress,
    Finished,
}

//! Hosted match management.

use kavatar_core::{
    FactionId, GameAction, GameError, GameEvent, GameManager, MapConfig, MapId, RuleSet, SaveData,
    SaveStore, Skill,
};
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::{MatchInfo, MatchStatus};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Not in this match")]
    NotInMatch,

    #[error("Already in this match")]
    AlreadyJoined,

    #[error("No faction is waiting to act")]
    NoActingFaction,

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error(transparent)]
    Rejected(#[from] GameError),
}

/// One hosted match and the clients sitting at it.
///
/// Play is hot-seat: any client at the table acts for whichever faction
/// currently holds the turn.
pub struct MatchSession {
    pub id: Uuid,
    /// Clients in join order
    pub clients: Vec<Uuid>,
    game: GameManager,
}

impl MatchSession {
    pub fn new(id: Uuid, host_id: Uuid, map: MapId, seed: Option<u64>, rules: Option<&RuleSet>) -> Self {
        let mut config = MapConfig::for_map(map);
        if let Some(rules) = rules {
            config = config.with_rules(rules.clone());
        }

        Self {
            id,
            clients: vec![host_id],
            game: GameManager::with_config(config, seed),
        }
    }

    pub fn has_client(&self, client_id: Uuid) -> bool {
        self.clients.contains(&client_id)
    }

    pub fn add_client(&mut self, client_id: Uuid) -> Result<(), SessionError> {
        if self.has_client(client_id) {
            return Err(SessionError::AlreadyJoined);
        }
        self.clients.push(client_id);
        Ok(())
    }

    /// Returns true once the table is empty
    pub fn remove_client(&mut self, client_id: Uuid) -> Result<bool, SessionError> {
        if !self.has_client(client_id) {
            return Err(SessionError::NotInMatch);
        }
        self.clients.retain(|&id| id != client_id);
        Ok(self.clients.is_empty())
    }

    fn seated(&self, client_id: Uuid) -> Result<(), SessionError> {
        if self.has_client(client_id) {
            Ok(())
        } else {
            Err(SessionError::NotInMatch)
        }
    }

    /// Apply a JSON action on behalf of the faction holding the turn
    pub fn apply_action(
        &mut self,
        client_id: Uuid,
        action: serde_json::Value,
    ) -> Result<Vec<GameEvent>, SessionError> {
        self.seated(client_id)?;
        let faction = self
            .game
            .current_turn()
            .faction()
            .ok_or(SessionError::NoActingFaction)?;

        let action: GameAction =
            serde_json::from_value(action).map_err(|e| SessionError::InvalidAction(e.to_string()))?;

        Ok(self.game.apply_action(faction, action)?)
    }

    pub fn undo(&mut self, client_id: Uuid) -> Result<Vec<GameEvent>, SessionError> {
        self.seated(client_id)?;
        Ok(self.game.undo()?)
    }

    pub fn adjust_ap(&mut self, client_id: Uuid, faction: FactionId, delta: i64) -> Result<Vec<GameEvent>, SessionError> {
        self.seated(client_id)?;
        Ok(self.game.adjust_ap(faction, delta)?)
    }

    pub fn grant_skill(&mut self, client_id: Uuid, faction: FactionId, skill: Skill) -> Result<Vec<GameEvent>, SessionError> {
        self.seated(client_id)?;
        Ok(self.game.grant_skill(faction, skill)?)
    }

    pub fn set_paused(&mut self, client_id: Uuid, paused: bool) -> Result<Vec<GameEvent>, SessionError> {
        self.seated(client_id)?;
        Ok(self.game.set_paused(paused))
    }

    /// One second of the turn clock
    pub fn tick(&mut self) -> Vec<GameEvent> {
        self.game.tick()
    }

    pub fn save(&self, client_id: Uuid, store: &mut dyn SaveStore, key: &str) -> Result<(), SessionError> {
        self.seated(client_id)?;
        Ok(self.game.save_to(store, key)?)
    }

    pub fn load(&mut self, client_id: Uuid, store: &dyn SaveStore, key: &str) -> Result<Vec<GameEvent>, SessionError> {
        self.seated(client_id)?;
        Ok(self.game.load_from(store, key)?)
    }

    pub fn state(&self) -> SaveData {
        self.game.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.game.is_over()
    }

    pub fn to_info(&self) -> MatchInfo {
        MatchInfo {
            id: self.id,
            map_id: self.game.config().id,
            map_name: self.game.config().name.clone(),
            round: self.game.current_round(),
            current_turn: self.game.current_turn(),
            clients: self.clients.len(),
            status: if self.is_finished() {
                MatchStatus::Finished
            } else {
                MatchStatus::InProgress
            },
        }
    }
}

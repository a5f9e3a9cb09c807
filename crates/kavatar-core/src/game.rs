//! Core game state machine.
//!
//! This module contains `GameManager`, the single writer of match state. It
//! validates and applies faction actions, drives the turn and round cycle,
//! triggers the invasion, runs the invader and keeps the undo log.

use crate::actions::{GameAction, GameEvent, Skill};
use crate::grid::{FactionId, HexGrid, Owner, Tile, INVADER_ID};
use crate::hex::HexCoord;
use crate::history::{ActionLog, ActionRecord, InvasionTransition, TurnTransition};
use crate::invader::{InvaderController, InvaderStep};
use crate::maps::{HeadquartersPlacement, MapConfig, MapId, RuleSet};
use crate::observer::GameObserver;
use crate::skills;
use crate::team::Team;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Whose turn it is.
///
/// Serialized as the owner id: `1..=8` for factions, `9` for the invader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum TurnHolder {
    Faction(FactionId),
    Invader,
}

impl TurnHolder {
    pub fn faction(self) -> Option<FactionId> {
        match self {
            TurnHolder::Faction(id) => Some(id),
            TurnHolder::Invader => None,
        }
    }
}

impl From<TurnHolder> for u8 {
    fn from(holder: TurnHolder) -> u8 {
        match holder {
            TurnHolder::Faction(id) => id,
            TurnHolder::Invader => INVADER_ID,
        }
    }
}

impl TryFrom<u8> for TurnHolder {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            INVADER_ID => Ok(TurnHolder::Invader),
            id @ 1..=8 => Ok(TurnHolder::Faction(id)),
            other => Err(format!("invalid turn holder {other}")),
        }
    }
}

impl fmt::Display for TurnHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnHolder::Faction(id) => write!(f, "faction {id}"),
            TurnHolder::Invader => write!(f, "invader"),
        }
    }
}

/// How a match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The invader was wiped out; the largest faction wins
    HumanVictory { winner: FactionId },
    /// The invader covered enough of the map
    InvaderVictory,
}

/// Game phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    /// Headquarters placement (manual-placement maps only)
    Setup {
        /// How many factions have placed so far
        placed: u8,
    },

    /// Faction against faction
    Main,

    /// The invader is on the board and takes a turn every round
    Invasion,

    /// Game is over
    Concluded(Outcome),
}

/// Errors that can occur when applying actions
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GameError {
    #[error("Not your turn")]
    NotYourTurn,

    #[error("Invalid action for current phase")]
    InvalidPhase,

    #[error("Game is over")]
    GameOver,

    #[error("No tile at that position")]
    TileNotFound,

    #[error("That tile is not yours")]
    NotOwnTile,

    #[error("Not enough AP: need {needed}, have {available}")]
    InsufficientAp { needed: u32, available: u32 },

    #[error("Tile is already at maximum power")]
    MaxPower,

    #[error("Tile is already shielded")]
    AlreadyShielded,

    #[error("Target is not next to your territory")]
    NotAdjacent,

    #[error("Target is not neutral")]
    NotNeutral,

    #[error("Target is not held by the invader")]
    NotInvader,

    #[error("Invalid target")]
    InvalidTarget,

    #[error("The invader cannot be harmed this round")]
    TargetImmune,

    #[error("Target is shielded")]
    TargetShielded,

    #[error("Attacking tile is not strong enough")]
    AttackTooWeak,

    #[error("That ability is not available")]
    SkillUnavailable,

    #[error("Headquarters cannot be placed there")]
    InvalidPlacement,

    #[error("The invader is still taking its turn")]
    InvaderTurnInProgress,

    #[error("It is not the invader's turn")]
    NotInvaderTurn,

    #[error("Invalid save: {0}")]
    InvalidSave(String),
}

/// A faction's holdings, as used by the income formula
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Territory {
    pub tiles: u32,
    /// Every landmark held, premium ones included
    pub landmarks: u32,
    pub premium_landmarks: u32,
}

/// The complete match state and its rules engine
pub struct GameManager {
    pub(crate) config: MapConfig,
    pub(crate) grid: HexGrid,
    /// One record per faction, index = id - 1
    pub(crate) teams: Vec<Team>,
    pub(crate) current_round: u32,
    pub(crate) current_turn: TurnHolder,
    pub(crate) phase: GamePhase,
    /// Seconds left on the active human turn
    pub(crate) time_remaining: u32,
    pub(crate) paused: bool,
    pub(crate) log: ActionLog,
    /// Transition opened by a human turn ending, while the invader is
    /// being stepped by hand
    pub(crate) pending: Option<TurnTransition>,
    pub(crate) invader: InvaderController,
    observers: Vec<Box<dyn GameObserver>>,
}

impl fmt::Debug for GameManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameManager")
            .field("map", &self.config.id)
            .field("round", &self.current_round)
            .field("turn", &self.current_turn)
            .field("phase", &self.phase)
            .field("time_remaining", &self.time_remaining)
            .field("paused", &self.paused)
            .field("teams", &self.teams)
            .field("log_len", &self.log.len())
            .field("invader_step", &self.invader.step())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl GameManager {
    /// Start a match on a built-in map
    pub fn new(map: MapId) -> Self {
        Self::with_config(MapConfig::for_map(map), None)
    }

    /// Start a match whose invader tie-breaks are reproducible
    pub fn with_seed(map: MapId, seed: u64) -> Self {
        Self::with_config(MapConfig::for_map(map), Some(seed))
    }

    /// Start a match from an explicit map config.
    ///
    /// Preset-headquarters maps go straight to round 1 with faction 1 to
    /// move; manual maps open in the setup phase.
    pub fn with_config(config: MapConfig, seed: Option<u64>) -> Self {
        let invader = match seed {
            Some(seed) => InvaderController::with_seed(seed),
            None => InvaderController::new(),
        };
        let teams = (1..=config.faction_count)
            .map(|id| Team::new(id, config.rules.starting_ap_for(id)))
            .collect();

        let mut game = Self {
            grid: HexGrid::from_config(&config),
            teams,
            current_round: 1,
            current_turn: TurnHolder::Faction(1),
            phase: GamePhase::Setup { placed: 0 },
            time_remaining: config.rules.turn_duration_secs,
            paused: false,
            log: ActionLog::new(),
            pending: None,
            invader,
            observers: Vec::new(),
            config,
        };

        if matches!(game.config.headquarters, HeadquartersPlacement::Preset(_)) {
            game.grid.place_preset_headquarters(&game.config);
            game.phase = GamePhase::Main;
            let mut opening = TurnTransition::open(game.current_turn, 1, game.phase);
            game.begin_human_turn(1, &mut opening, &mut Vec::new());
        }

        tracing::info!(
            map = %game.config.name,
            factions = game.config.faction_count,
            phase = ?game.phase,
            "match created"
        );
        game
    }

    // ==================== Queries ====================

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleSet {
        &self.config.rules
    }

    pub fn grid(&self) -> &HexGrid {
        &self.grid
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn team(&self, faction: FactionId) -> Option<&Team> {
        self.teams.get((faction as usize).checked_sub(1)?)
    }

    fn team_mut(&mut self, faction: FactionId) -> Option<&mut Team> {
        self.teams.get_mut((faction as usize).checked_sub(1)?)
    }

    pub fn faction_count(&self) -> u8 {
        self.config.faction_count
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn current_turn(&self) -> TurnHolder {
        self.current_turn
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn is_setup_phase(&self) -> bool {
        matches!(self.phase, GamePhase::Setup { .. })
    }

    /// True from the invasion trigger onwards, including after the match ends
    pub fn is_invasion_phase(&self) -> bool {
        matches!(self.phase, GamePhase::Invasion | GamePhase::Concluded(_))
    }

    pub fn is_over(&self) -> bool {
        matches!(self.phase, GamePhase::Concluded(_))
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self.phase {
            GamePhase::Concluded(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn time_remaining(&self) -> u32 {
        self.time_remaining
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    pub fn invader_step(&self) -> InvaderStep {
        self.invader.step()
    }

    /// Tiles and landmarks held by a faction
    pub fn territory(&self, faction: FactionId) -> Territory {
        let mut territory = Territory::default();
        for tile in self.grid.tiles_owned_by(Owner::Faction(faction)) {
            territory.tiles += 1;
            if let Some(landmark) = tile.landmark() {
                territory.landmarks += 1;
                if landmark.premium {
                    territory.premium_landmarks += 1;
                }
            }
        }
        territory
    }

    /// Income the faction would receive if its turn started now
    pub fn projected_income(&self, faction: FactionId) -> u32 {
        let rules = &self.config.rules;
        let territory = self.territory(faction);
        let regular = territory.landmarks - territory.premium_landmarks;
        rules.base_income
            + territory.tiles / rules.territory_divisor.max(1)
            + regular * rules.landmark_bonus
            + territory.premium_landmarks * rules.premium_landmark_bonus
    }

    // ==================== Notifications ====================

    pub fn subscribe(&mut self, observer: Box<dyn GameObserver>) {
        self.observers.push(observer);
    }

    pub(crate) fn publish(&mut self, events: &[GameEvent]) {
        for observer in &mut self.observers {
            for event in events {
                observer.notify(event);
            }
        }
    }

    /// Publish the outcome of an operation: its events, or a notice for a rejection
    pub(crate) fn report(
        &mut self,
        result: Result<Vec<GameEvent>, GameError>,
    ) -> Result<Vec<GameEvent>, GameError> {
        match &result {
            Ok(events) => self.publish(events),
            Err(err) => {
                tracing::warn!(%err, turn = %self.current_turn, "operation rejected");
                let notice = GameEvent::Notice {
                    message: err.to_string(),
                };
                self.publish(&[notice]);
            }
        }
        result
    }

    // ==================== Actions ====================

    /// Apply an action to the game state
    pub fn apply_action(
        &mut self,
        faction: FactionId,
        action: GameAction,
    ) -> Result<Vec<GameEvent>, GameError> {
        let result = self.dispatch(faction, action);
        self.report(result)
    }

    /// End the faction's turn; same as applying `GameAction::EndTurn`
    pub fn end_turn(&mut self, faction: FactionId) -> Result<Vec<GameEvent>, GameError> {
        self.apply_action(faction, GameAction::EndTurn)
    }

    fn dispatch(&mut self, faction: FactionId, action: GameAction) -> Result<Vec<GameEvent>, GameError> {
        if self.is_over() {
            return Err(GameError::GameOver);
        }

        match action {
            // ==================== Setup Phase ====================
            GameAction::PlaceHeadquarters(coord) => self.place_headquarters(faction, coord),

            // ==================== Tile Actions ====================
            GameAction::Recruit(coord) => {
                self.check_acting(faction)?;
                self.recruit(faction, coord)
            }
            GameAction::Fortify(coord) => {
                self.check_acting(faction)?;
                self.fortify(faction, coord)
            }
            GameAction::Expand(coord) => {
                self.check_acting(faction)?;
                self.expand(faction, coord)
            }
            GameAction::Attack { from, to } => {
                self.check_acting(faction)?;
                self.attack(faction, from, to)
            }
            GameAction::Purify(coord) => {
                self.check_acting(faction)?;
                self.purify(faction, coord)
            }
            GameAction::UseSkill { skill, target } => {
                self.check_acting(faction)?;
                self.use_skill(faction, skill, target)
            }

            // ==================== Turn Management ====================
            GameAction::EndTurn => {
                self.check_acting(faction)?;
                Ok(self.finish_turn())
            }
        }
    }

    fn check_acting(&self, faction: FactionId) -> Result<(), GameError> {
        match self.phase {
            GamePhase::Main | GamePhase::Invasion => {}
            GamePhase::Setup { .. } => return Err(GameError::InvalidPhase),
            GamePhase::Concluded(_) => return Err(GameError::GameOver),
        }
        if self.current_turn != TurnHolder::Faction(faction) {
            return Err(GameError::NotYourTurn);
        }
        Ok(())
    }

    fn own_tile(&self, faction: FactionId, coord: &HexCoord) -> Result<&Tile, GameError> {
        let tile = self.grid.get_tile(coord).ok_or(GameError::TileNotFound)?;
        if tile.is_owned_by(Owner::Faction(faction)) {
            Ok(tile)
        } else {
            Err(GameError::NotOwnTile)
        }
    }

    fn require_ap(&self, faction: FactionId, cost: u32) -> Result<(), GameError> {
        let team = self.team(faction).ok_or(GameError::NotYourTurn)?;
        if team.can_afford(cost) {
            Ok(())
        } else {
            Err(GameError::InsufficientAp {
                needed: cost,
                available: team.action_points,
            })
        }
    }

    /// Charge AP already checked by `require_ap`
    fn spend(&mut self, faction: FactionId, cost: u32) {
        if let Some(team) = self.team_mut(faction) {
            let paid = team.try_spend(cost);
            debug_assert!(paid, "spend without affordability check");
        }
    }

    fn refund(&mut self, faction: FactionId, cost: u32) {
        if let Some(team) = self.team_mut(faction) {
            team.grant(cost);
        }
    }

    fn place_headquarters(&mut self, faction: FactionId, coord: HexCoord) -> Result<Vec<GameEvent>, GameError> {
        let GamePhase::Setup { placed } = self.phase else {
            return Err(GameError::InvalidPhase);
        };
        if self.current_turn != TurnHolder::Faction(faction) {
            return Err(GameError::NotYourTurn);
        }

        let tile = self.grid.get_tile(&coord).ok_or(GameError::TileNotFound)?;
        if !tile.owner().is_neutral() {
            return Err(GameError::NotNeutral);
        }
        if tile.is_landmark() {
            return Err(GameError::InvalidPlacement);
        }
        let min_distance = self.config.rules.min_hq_distance;
        let crowded = self
            .grid
            .tiles()
            .any(|t| t.is_permanent_shield() && t.coord.distance_to(&coord) < min_distance);
        if crowded {
            return Err(GameError::InvalidPlacement);
        }

        let snapshot = tile.snapshot();
        if let Some(tile) = self.grid.get_tile_mut(&coord) {
            tile.make_headquarters(faction);
        }
        tracing::info!(faction, %coord, "headquarters placed");
        let mut events = vec![GameEvent::HeadquartersPlaced { faction, coord }];

        let placed_now = placed + 1;
        let opened_play = if placed_now >= self.config.faction_count {
            let mut transition = TurnTransition::open(self.current_turn, self.current_round, self.phase);
            self.phase = GamePhase::Main;
            self.current_round = 1;
            self.current_turn = TurnHolder::Faction(1);
            tracing::info!("setup complete");
            events.push(GameEvent::SetupCompleted);
            self.begin_human_turn(1, &mut transition, &mut events);
            Some(Box::new(transition))
        } else {
            self.phase = GamePhase::Setup { placed: placed_now };
            self.current_turn = TurnHolder::Faction(faction + 1);
            None
        };

        let clears = opened_play.is_some() && self.config.rules.clear_log_on_turn_start;
        if clears {
            self.log.clear();
        } else {
            self.log.push(ActionRecord::HeadquartersPlaced {
                faction,
                tile: snapshot,
                placed_before: placed,
                opened_play,
            });
        }
        Ok(events)
    }

    fn recruit(&mut self, faction: FactionId, coord: HexCoord) -> Result<Vec<GameEvent>, GameError> {
        let cost = self.config.rules.recruit_cost;
        let tile = self.own_tile(faction, &coord)?;
        if tile.power() >= self.config.rules.max_power {
            return Err(GameError::MaxPower);
        }
        let snapshot = tile.snapshot();
        self.require_ap(faction, cost)?;

        let power = snapshot.power + 1;
        if let Some(tile) = self.grid.get_tile_mut(&coord) {
            tile.set_power(power);
        }
        self.spend(faction, cost);
        self.log.push(ActionRecord::Recruit {
            faction,
            tile: snapshot,
            cost,
        });
        tracing::debug!(faction, %coord, power, "recruited");
        Ok(vec![GameEvent::Recruited {
            faction,
            coord,
            power,
        }])
    }

    fn fortify(&mut self, faction: FactionId, coord: HexCoord) -> Result<Vec<GameEvent>, GameError> {
        let cost = self.config.rules.fortify_cost;
        let tile = self.own_tile(faction, &coord)?;
        if tile.is_shielded() {
            return Err(GameError::AlreadyShielded);
        }
        let snapshot = tile.snapshot();
        self.require_ap(faction, cost)?;

        if let Some(tile) = self.grid.get_tile_mut(&coord) {
            tile.raise_shield();
        }
        self.spend(faction, cost);
        self.log.push(ActionRecord::Fortify {
            faction,
            tile: snapshot,
            cost,
        });
        tracing::debug!(faction, %coord, "fortified");
        Ok(vec![GameEvent::Fortified { faction, coord }])
    }

    fn expand(&mut self, faction: FactionId, coord: HexCoord) -> Result<Vec<GameEvent>, GameError> {
        let cost = self.config.rules.expand_cost;
        let tile = self.grid.get_tile(&coord).ok_or(GameError::TileNotFound)?;
        if !tile.owner().is_neutral() {
            return Err(GameError::NotNeutral);
        }
        if !self.grid.borders_owner(&coord, Owner::Faction(faction)) {
            return Err(GameError::NotAdjacent);
        }
        let snapshot = tile.snapshot();
        self.require_ap(faction, cost)?;

        if let Some(tile) = self.grid.get_tile_mut(&coord) {
            tile.transfer(Owner::Faction(faction), 1);
        }
        self.spend(faction, cost);
        self.log.push(ActionRecord::Expand {
            faction,
            tile: snapshot,
            cost,
        });
        tracing::debug!(faction, %coord, "expanded");
        Ok(vec![GameEvent::Expanded { faction, coord }])
    }

    fn attack(&mut self, faction: FactionId, from: HexCoord, to: HexCoord) -> Result<Vec<GameEvent>, GameError> {
        let cost = self.config.rules.attack_cost;
        let source = self.own_tile(faction, &from)?;
        let target = self.grid.get_tile(&to).ok_or(GameError::TileNotFound)?;
        if from.distance_to(&to) != 1 {
            return Err(GameError::NotAdjacent);
        }
        if target.is_owned_by(Owner::Faction(faction)) {
            return Err(GameError::InvalidTarget);
        }

        let attack_power = source.power();
        let captured_power = if target.owner().is_neutral() {
            if attack_power < 2 {
                return Err(GameError::AttackTooWeak);
            }
            attack_power - 1
        } else {
            if target.owner().is_invader() && self.current_round == self.config.rules.invincible_round {
                return Err(GameError::TargetImmune);
            }
            if target.is_shielded() {
                return Err(GameError::TargetShielded);
            }
            if attack_power <= target.power() {
                return Err(GameError::AttackTooWeak);
            }
            (attack_power - target.power()).max(1)
        };
        let source_snapshot = source.snapshot();
        let target_snapshot = target.snapshot();
        self.require_ap(faction, cost)?;

        if let Some(tile) = self.grid.get_tile_mut(&to) {
            tile.transfer(Owner::Faction(faction), captured_power);
        }
        if let Some(tile) = self.grid.get_tile_mut(&from) {
            tile.set_power(1);
        }
        self.spend(faction, cost);
        self.log.push(ActionRecord::Attack {
            faction,
            source: source_snapshot,
            target: target_snapshot,
            cost,
        });
        tracing::debug!(faction, %from, %to, captured_power, "attack succeeded");
        Ok(vec![GameEvent::Captured {
            faction,
            from,
            to,
            previous_owner: target_snapshot.owner,
            power: captured_power,
        }])
    }

    fn purify(&mut self, faction: FactionId, coord: HexCoord) -> Result<Vec<GameEvent>, GameError> {
        let tile = self.grid.get_tile(&coord).ok_or(GameError::TileNotFound)?;
        if !tile.owner().is_invader() {
            return Err(GameError::NotInvader);
        }
        if self.current_round == self.config.rules.invincible_round {
            return Err(GameError::TargetImmune);
        }
        if !self.grid.borders_owner(&coord, Owner::Faction(faction)) {
            return Err(GameError::NotAdjacent);
        }
        let cost = u32::from(tile.power());
        let snapshot = tile.snapshot();
        self.require_ap(faction, cost)?;

        if let Some(tile) = self.grid.get_tile_mut(&coord) {
            tile.purify();
        }
        self.spend(faction, cost);
        if let Some(team) = self.team_mut(faction) {
            team.purify_count += 1;
        }
        self.log.push(ActionRecord::Purify {
            faction,
            tile: snapshot,
            cost,
        });
        tracing::debug!(faction, %coord, cost, "purified");
        Ok(vec![GameEvent::Purified { faction, coord, cost }])
    }

    fn use_skill(&mut self, faction: FactionId, skill: Skill, target: HexCoord) -> Result<Vec<GameEvent>, GameError> {
        let team = self.team(faction).ok_or(GameError::NotYourTurn)?;
        if team.available_skill != Some(skill) {
            return Err(GameError::SkillUnavailable);
        }
        let plan = skills::plan(
            &self.grid,
            &self.config.rules,
            self.current_round,
            faction,
            skill,
            target,
        )?;

        let tiles = skills::apply(&mut self.grid, faction, &plan);
        if let Some(team) = self.team_mut(faction) {
            team.available_skill = None;
        }
        let affected: Vec<HexCoord> = tiles.iter().map(|s| s.coord).collect();
        tracing::debug!(faction, ?skill, %target, affected = affected.len(), "ability used");
        self.log.push(ActionRecord::Skill { faction, skill, tiles });
        Ok(vec![GameEvent::SkillUsed {
            faction,
            skill,
            target,
            affected,
        }])
    }

    // ==================== Administration ====================

    /// Make an ability available to a faction (the roulette lives outside the engine)
    pub fn grant_skill(&mut self, faction: FactionId, skill: Skill) -> Result<Vec<GameEvent>, GameError> {
        let result = self.offer_skill(faction, skill);
        self.report(result)
    }

    fn offer_skill(&mut self, faction: FactionId, skill: Skill) -> Result<Vec<GameEvent>, GameError> {
        if self.is_over() {
            return Err(GameError::GameOver);
        }
        let team = self.team_mut(faction).ok_or(GameError::InvalidTarget)?;
        team.available_skill = Some(skill);
        team.skill_grants += 1;
        tracing::info!(faction, ?skill, "ability granted");
        Ok(vec![GameEvent::SkillGranted { faction, skill }])
    }

    /// Administrative AP change. Logged, so it can be undone.
    pub fn adjust_ap(&mut self, faction: FactionId, delta: i64) -> Result<Vec<GameEvent>, GameError> {
        let result = self.apply_adjustment(faction, delta);
        self.report(result)
    }

    fn apply_adjustment(&mut self, faction: FactionId, delta: i64) -> Result<Vec<GameEvent>, GameError> {
        if self.pending.is_some() || self.invader.in_progress() {
            return Err(GameError::InvaderTurnInProgress);
        }
        let team = self.team(faction).ok_or(GameError::InvalidTarget)?;
        let available = team.action_points;
        let total = i64::from(available) + delta;
        if total < 0 {
            return Err(GameError::InsufficientAp {
                needed: u32::try_from(delta.unsigned_abs()).unwrap_or(u32::MAX),
                available,
            });
        }
        let total = u32::try_from(total).map_err(|_| GameError::InvalidTarget)?;

        if let Some(team) = self.team_mut(faction) {
            team.action_points = total;
        }
        self.log.push(ActionRecord::ApAdjusted { faction, delta });
        tracing::info!(faction, delta, total, "AP adjusted");
        Ok(vec![GameEvent::ApAdjusted { faction, delta, total }])
    }

    // ==================== Timer ====================

    /// One real-time second. Ends the active human turn when the clock runs out.
    pub fn tick(&mut self) -> Vec<GameEvent> {
        if self.paused || !matches!(self.phase, GamePhase::Main | GamePhase::Invasion) {
            return Vec::new();
        }
        let TurnHolder::Faction(faction) = self.current_turn else {
            return Vec::new();
        };

        self.time_remaining = self.time_remaining.saturating_sub(1);
        let mut events = vec![GameEvent::TimerTick {
            remaining: self.time_remaining,
        }];
        if self.time_remaining == 0 {
            tracing::info!(faction, round = self.current_round, "turn timed out");
            events.push(GameEvent::TurnTimedOut { faction });
            events.extend(self.finish_turn());
        }
        self.publish(&events);
        events
    }

    pub fn set_paused(&mut self, paused: bool) -> Vec<GameEvent> {
        if self.paused == paused {
            return Vec::new();
        }
        self.paused = paused;
        let events = vec![GameEvent::PauseChanged { paused }];
        self.publish(&events);
        events
    }

    // ==================== Turn Progression ====================

    fn finish_turn(&mut self) -> Vec<GameEvent> {
        let holder = self.current_turn;
        tracing::info!(%holder, round = self.current_round, "turn ended");
        let transition = TurnTransition::open(holder, self.current_round, self.phase);
        self.pass_turn(transition, vec![GameEvent::TurnEnded { holder }])
    }

    /// Hand the turn on until a human turn starts, the match ends, or the
    /// invader waits to be stepped by hand.
    fn pass_turn(&mut self, mut transition: TurnTransition, mut events: Vec<GameEvent>) -> Vec<GameEvent> {
        loop {
            self.advance_holder();
            self.check_invasion(&mut transition, &mut events);

            if let Some(outcome) = self.evaluate_victory() {
                self.phase = GamePhase::Concluded(outcome);
                tracing::info!(?outcome, round = self.current_round, "match concluded");
                events.push(GameEvent::MatchConcluded { outcome });
                self.commit_transition(transition);
                return events;
            }

            match self.current_turn {
                TurnHolder::Faction(faction) => {
                    self.begin_human_turn(faction, &mut transition, &mut events);
                    self.commit_transition(transition);
                    return events;
                }
                TurnHolder::Invader => {
                    self.begin_invader_turn(&mut transition, &mut events);
                    if !self.config.rules.auto_run_invader {
                        self.pending = Some(transition);
                        return events;
                    }
                    while self.invader.in_progress() {
                        let outcome = self
                            .invader
                            .advance(&mut self.grid, &self.config.rules, self.current_round);
                        transition.tile_changes.extend(outcome.tile_changes);
                        events.extend(outcome.events);
                    }
                    events.push(GameEvent::TurnEnded {
                        holder: TurnHolder::Invader,
                    });
                }
            }
        }
    }

    /// Factions in ascending order, then the invader once it is on the board
    fn advance_holder(&mut self) {
        let last = self.config.faction_count;
        let (next, round) = match self.current_turn {
            TurnHolder::Faction(id) if id < last => (TurnHolder::Faction(id + 1), self.current_round),
            TurnHolder::Faction(_) if self.phase == GamePhase::Invasion => {
                (TurnHolder::Invader, self.current_round)
            }
            _ => (TurnHolder::Faction(1), self.current_round + 1),
        };
        if round != self.current_round {
            tracing::info!(round, "round started");
        }
        self.current_turn = next;
        self.current_round = round;
    }

    fn check_invasion(&mut self, transition: &mut TurnTransition, events: &mut Vec<GameEvent>) {
        let rules = &self.config.rules;
        if self.phase != GamePhase::Main || self.current_round < rules.invasion_round {
            return;
        }
        let spawn_power = rules.invader_spawn_power.min(rules.max_power);
        let compensation_each = rules.landmark_compensation;

        let landmarks: Vec<HexCoord> = self
            .grid
            .tiles()
            .filter(|t| t.is_landmark())
            .map(|t| t.coord)
            .collect();
        let mut invasion = InvasionTransition {
            round: self.current_round,
            landmarks: Vec::with_capacity(landmarks.len()),
            compensation: Vec::new(),
        };

        for coord in &landmarks {
            let Some(tile) = self.grid.get_tile_mut(coord) else {
                continue;
            };
            let snapshot = tile.snapshot();
            if let Owner::Faction(faction) = snapshot.owner {
                invasion.compensation.push((faction, compensation_each));
            }
            tile.spawn_invader(spawn_power);
            invasion.landmarks.push(snapshot);
            transition.tile_changes.push(snapshot);
        }
        for &(faction, amount) in &invasion.compensation {
            if let Some(team) = self.team_mut(faction) {
                team.grant(amount);
            }
        }

        self.phase = GamePhase::Invasion;
        tracing::info!(
            round = self.current_round,
            landmarks = landmarks.len(),
            compensated = invasion.compensation.len(),
            "invasion started"
        );
        events.push(GameEvent::InvasionStarted {
            round: self.current_round,
            landmarks,
            compensation: invasion.compensation.clone(),
        });
        transition.invasion = Some(invasion);
    }

    fn evaluate_victory(&self) -> Option<Outcome> {
        if self.phase != GamePhase::Invasion {
            return None;
        }
        let rules = &self.config.rules;
        let invader_tiles = self.grid.count_owned(Owner::Invader);

        if invader_tiles == 0 && self.current_round > rules.invasion_round {
            let mut winner = 1;
            let mut best = 0;
            for id in 1..=self.config.faction_count {
                let held = self.grid.count_owned(Owner::Faction(id));
                if held > best {
                    best = held;
                    winner = id;
                }
            }
            return Some(Outcome::HumanVictory { winner });
        }

        let share = invader_tiles as u64 * 100;
        if invader_tiles > 0 && share >= self.grid.len() as u64 * u64::from(rules.invader_victory_percent) {
            return Some(Outcome::InvaderVictory);
        }
        None
    }

    /// Income, maintenance, the one-shot expansion bonus, and a fresh clock
    fn begin_human_turn(&mut self, faction: FactionId, transition: &mut TurnTransition, events: &mut Vec<GameEvent>) {
        let holder = TurnHolder::Faction(faction);
        let own = Owner::Faction(faction);
        let income = if self.current_round > 1 {
            self.projected_income(faction)
        } else {
            0
        };

        let owned: Vec<HexCoord> = self.grid.tiles_owned_by(own).map(|t| t.coord).collect();
        let holds_territory = !owned.is_empty();
        let mut maintained = Vec::new();
        for coord in owned {
            let Some(tile) = self.grid.get_tile_mut(&coord) else {
                continue;
            };
            let before = tile.snapshot();
            tile.drop_shield();
            if tile.power() > 1 {
                tile.set_power(tile.power() - 1);
            }
            if tile.snapshot() != before {
                transition.tile_changes.push(before);
                maintained.push(coord);
            }
        }

        let enclosed = holds_territory
            && self
                .grid
                .tiles_owned_by(own)
                .all(|t| !self.grid.borders_owner(&t.coord, Owner::Neutral));
        let bonus = self.config.rules.expansion_bonus;
        let mut bonus_granted = false;
        let mut ap_granted = income;
        if let Some(team) = self.team_mut(faction) {
            if enclosed && !team.expansion_bonus_granted {
                team.expansion_bonus_granted = true;
                bonus_granted = true;
                ap_granted += bonus;
            }
            team.grant(ap_granted);
        }

        self.time_remaining = self.config.rules.turn_duration_secs;
        transition.to_holder = holder;
        transition.to_round = self.current_round;
        transition.ap_granted = ap_granted;
        transition.bonus_granted = bonus_granted;

        tracing::info!(
            faction,
            round = self.current_round,
            income,
            bonus_granted,
            maintained = maintained.len(),
            "turn started"
        );
        if !maintained.is_empty() {
            events.push(GameEvent::MaintenanceApplied {
                holder,
                tiles: maintained,
            });
        }
        events.push(GameEvent::TurnStarted {
            holder,
            round: self.current_round,
            ap_granted,
            expansion_bonus: bonus_granted,
        });
    }

    /// Expire invader spawn shields and arm the controller
    fn begin_invader_turn(&mut self, transition: &mut TurnTransition, events: &mut Vec<GameEvent>) {
        let expiring: Vec<HexCoord> = self
            .grid
            .tiles_owned_by(Owner::Invader)
            .filter(|t| t.is_shielded() && !t.is_permanent_shield())
            .map(|t| t.coord)
            .collect();
        for coord in &expiring {
            if let Some(tile) = self.grid.get_tile_mut(coord) {
                transition.tile_changes.push(tile.snapshot());
                tile.drop_shield();
            }
        }

        self.invader.begin_turn();
        tracing::info!(round = self.current_round, "invader turn started");
        if !expiring.is_empty() {
            events.push(GameEvent::MaintenanceApplied {
                holder: TurnHolder::Invader,
                tiles: expiring,
            });
        }
        events.push(GameEvent::TurnStarted {
            holder: TurnHolder::Invader,
            round: self.current_round,
            ap_granted: 0,
            expansion_bonus: false,
        });
    }

    fn commit_transition(&mut self, mut transition: TurnTransition) {
        transition.to_holder = self.current_turn;
        transition.to_round = self.current_round;
        if transition.from_holder == TurnHolder::Invader {
            // Opened on an invader turn restored from a save: no human turn to return to
            return;
        }
        if self.config.rules.clear_log_on_turn_start && !self.is_over() {
            self.log.clear();
        } else {
            self.log.push(ActionRecord::TurnTransition(Box::new(transition)));
        }
    }

    // ==================== Invader ====================

    /// Run one step of the invader's turn
    pub fn advance_invader(&mut self) -> Result<Vec<GameEvent>, GameError> {
        let result = self.step_invader();
        self.report(result)
    }

    /// Run the invader's turn to completion
    pub fn run_invader_turn(&mut self) -> Result<Vec<GameEvent>, GameError> {
        let result = self.drive_invader();
        self.report(result)
    }

    fn step_invader(&mut self) -> Result<Vec<GameEvent>, GameError> {
        if self.current_turn != TurnHolder::Invader || !self.invader.in_progress() {
            return Err(GameError::NotInvaderTurn);
        }
        let outcome = self
            .invader
            .advance(&mut self.grid, &self.config.rules, self.current_round);

        let mut transition = self
            .pending
            .take()
            .unwrap_or_else(|| TurnTransition::open(TurnHolder::Invader, self.current_round, self.phase));
        transition.tile_changes.extend(outcome.tile_changes);
        let mut events = outcome.events;

        if outcome.finished {
            events.push(GameEvent::TurnEnded {
                holder: TurnHolder::Invader,
            });
            events = self.pass_turn(transition, events);
        } else {
            self.pending = Some(transition);
        }
        Ok(events)
    }

    pub(crate) fn drive_invader(&mut self) -> Result<Vec<GameEvent>, GameError> {
        let mut events = self.step_invader()?;
        while self.current_turn == TurnHolder::Invader && self.invader.in_progress() {
            events.extend(self.step_invader()?);
        }
        Ok(events)
    }

    // ==================== Undo ====================

    /// Revert the most recent logged action. An empty log is a no-op.
    pub fn undo(&mut self) -> Result<Vec<GameEvent>, GameError> {
        let result = self.revert_last();
        self.report(result)
    }

    fn revert_last(&mut self) -> Result<Vec<GameEvent>, GameError> {
        if self.pending.is_some() || self.invader.in_progress() {
            return Err(GameError::InvaderTurnInProgress);
        }
        let Some(record) = self.log.pop() else {
            return Ok(Vec::new());
        };
        let kind = record.kind();

        match record {
            ActionRecord::HeadquartersPlaced {
                faction,
                tile,
                placed_before,
                opened_play,
            } => {
                if let Some(transition) = opened_play {
                    self.revert_transition(&transition);
                }
                self.grid.restore(&tile);
                self.phase = GamePhase::Setup {
                    placed: placed_before,
                };
                self.current_turn = TurnHolder::Faction(faction);
                self.current_round = 1;
            }
            ActionRecord::Recruit { faction, tile, cost }
            | ActionRecord::Fortify { faction, tile, cost }
            | ActionRecord::Expand { faction, tile, cost } => {
                self.grid.restore(&tile);
                self.refund(faction, cost);
            }
            ActionRecord::Attack {
                faction,
                source,
                target,
                cost,
            } => {
                self.grid.restore(&target);
                self.grid.restore(&source);
                self.refund(faction, cost);
            }
            ActionRecord::Purify { faction, tile, cost } => {
                self.grid.restore(&tile);
                if let Some(team) = self.team_mut(faction) {
                    team.grant(cost);
                    team.purify_count = team.purify_count.saturating_sub(1);
                }
            }
            ActionRecord::Skill { faction, skill, tiles } => {
                for snapshot in tiles.iter().rev() {
                    self.grid.restore(snapshot);
                }
                // A grant made after the use is not logged and stays
                if let Some(team) = self.team_mut(faction) {
                    team.available_skill.get_or_insert(skill);
                }
            }
            ActionRecord::ApAdjusted { faction, delta } => {
                if let Some(team) = self.team_mut(faction) {
                    let restored = i64::from(team.action_points) - delta;
                    if restored < 0 {
                        tracing::error!(faction, delta, ap = team.action_points, "AP adjustment undo underflows");
                        debug_assert!(false, "AP adjustment undo underflows");
                    }
                    team.action_points = u32::try_from(restored.max(0)).unwrap_or(u32::MAX);
                }
            }
            ActionRecord::TurnTransition(transition) => self.revert_transition(&transition),
        }

        tracing::info!(?kind, remaining = self.log.len(), "action undone");
        Ok(vec![GameEvent::ActionUndone { kind }])
    }

    fn revert_transition(&mut self, transition: &TurnTransition) {
        for snapshot in transition.tile_changes.iter().rev() {
            self.grid.restore(snapshot);
        }
        if let TurnHolder::Faction(faction) = transition.to_holder {
            if let Some(team) = self.team_mut(faction) {
                team.revoke(transition.ap_granted);
                if transition.bonus_granted {
                    team.expansion_bonus_granted = false;
                }
            }
        }
        if let Some(invasion) = &transition.invasion {
            for &(faction, amount) in &invasion.compensation {
                if let Some(team) = self.team_mut(faction) {
                    team.revoke(amount);
                }
            }
        }

        self.current_turn = transition.from_holder;
        self.current_round = transition.from_round;
        self.phase = transition.from_phase;
        self.time_remaining = self.config.rules.turn_duration_secs;
    }
}

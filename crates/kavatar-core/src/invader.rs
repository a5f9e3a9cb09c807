//! The invader's scripted turn.
//!
//! The invader has no AP and no choices beyond tie-breaking. Its turn is a
//! two-step state machine driven by [`InvaderController::advance`]:
//!
//! 1. Growing: every invader tile gains +1 power (capped at max power)
//! 2. Infecting: every invader tile at or above the infection threshold
//!    converts its weakest eligible neighbor
//!
//! Infection targets are all chosen from the board as it stands when the
//! step begins, then applied together, so one infection never influences
//! another within the same turn.

use crate::actions::GameEvent;
use crate::grid::{HexGrid, Owner};
use crate::hex::HexCoord;
use crate::history::TileSnapshot;
use crate::maps::RuleSet;
use rand::prelude::*;
use serde::{Deserialize, Serialize};

/// Where the invader is within its turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvaderStep {
    Growing,
    Infecting,
    Done,
}

/// Result of one `advance` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutcome {
    /// Pre-change snapshots, in application order
    pub tile_changes: Vec<TileSnapshot>,
    pub events: Vec<GameEvent>,
    /// The invader's turn is over
    pub finished: bool,
}

/// Drives the invader's turn
#[derive(Debug, Clone)]
pub struct InvaderController {
    step: InvaderStep,
    rng: StdRng,
}

impl Default for InvaderController {
    fn default() -> Self {
        Self::new()
    }
}

impl InvaderController {
    pub fn new() -> Self {
        Self {
            step: InvaderStep::Done,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic tie-breaking, for tests and replays
    pub fn with_seed(seed: u64) -> Self {
        Self {
            step: InvaderStep::Done,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn step(&self) -> InvaderStep {
        self.step
    }

    /// Whether a turn has begun and not yet finished
    pub fn in_progress(&self) -> bool {
        self.step != InvaderStep::Done
    }

    /// Arm the controller for a new invader turn
    pub fn begin_turn(&mut self) {
        self.step = InvaderStep::Growing;
    }

    /// Put the controller at a specific step (used when loading a save)
    pub(crate) fn resume_at(&mut self, step: InvaderStep) {
        self.step = step;
    }

    /// Run the next step of the turn
    pub fn advance(&mut self, grid: &mut HexGrid, rules: &RuleSet, round: u32) -> StepOutcome {
        match self.step {
            InvaderStep::Growing if round == rules.invincible_round => {
                tracing::info!(round, "invader is forming, no action this turn");
                self.step = InvaderStep::Done;
                StepOutcome {
                    events: vec![GameEvent::InvaderDormant { round }],
                    finished: true,
                    ..StepOutcome::default()
                }
            }
            InvaderStep::Growing => {
                let tile_changes = grow(grid, rules.max_power);
                self.step = InvaderStep::Infecting;
                StepOutcome {
                    events: vec![GameEvent::InvaderGrew {
                        tiles: tile_changes.len(),
                    }],
                    tile_changes,
                    finished: false,
                }
            }
            InvaderStep::Infecting => {
                let plan = plan_infections(grid, rules, &mut self.rng);
                let mut outcome = StepOutcome {
                    finished: true,
                    ..StepOutcome::default()
                };
                for (from, to) in plan {
                    let Some(tile) = grid.get_tile_mut(&to) else {
                        continue;
                    };
                    if tile.owner().is_invader() {
                        // Two sources picked the same target
                        continue;
                    }
                    outcome.tile_changes.push(tile.snapshot());
                    tile.infect(rules.infection_power);
                    tracing::debug!(%from, %to, "invader infected tile");
                    outcome.events.push(GameEvent::InvaderInfected { from, to });
                }
                self.step = InvaderStep::Done;
                outcome
            }
            InvaderStep::Done => StepOutcome {
                finished: true,
                ..StepOutcome::default()
            },
        }
    }
}

/// +1 power on every invader tile below the cap
fn grow(grid: &mut HexGrid, max_power: u8) -> Vec<TileSnapshot> {
    let growing: Vec<HexCoord> = grid
        .tiles_owned_by(Owner::Invader)
        .filter(|t| t.power() < max_power)
        .map(|t| t.coord)
        .collect();

    let mut changes = Vec::with_capacity(growing.len());
    for coord in growing {
        if let Some(tile) = grid.get_tile_mut(&coord) {
            changes.push(tile.snapshot());
            let power = (tile.power() + 1).min(max_power);
            tile.set_power(power);
        }
    }
    changes
}

/// Choose one target per eligible invader tile, without touching the board
fn plan_infections<R: Rng>(grid: &HexGrid, rules: &RuleSet, rng: &mut R) -> Vec<(HexCoord, HexCoord)> {
    let mut plan = Vec::new();

    for source in grid.tiles_owned_by(Owner::Invader) {
        if source.power() < rules.infection_threshold {
            continue;
        }

        let candidates: Vec<_> = grid
            .neighbors(&source.coord)
            .into_iter()
            .filter(|n| !n.owner().is_invader())
            .filter(|n| n.display_power() < source.power())
            .collect();

        let Some(min_power) = candidates.iter().map(|n| n.display_power()).min() else {
            continue;
        };
        let weakest: Vec<HexCoord> = candidates
            .iter()
            .filter(|n| n.display_power() == min_power)
            .map(|n| n.coord)
            .collect();

        if let Some(&target) = weakest.choose(rng) {
            plan.push((source.coord, target));
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maps::{MapConfig, MapId};

    fn grid() -> HexGrid {
        HexGrid::from_config(&MapConfig::for_map(MapId::Hexagon))
    }

    fn set(grid: &mut HexGrid, q: i32, r: i32, owner: Owner, power: u8) {
        grid.get_tile_mut(&HexCoord::new(q, r))
            .unwrap()
            .transfer(owner, power);
    }

    fn run_turn(controller: &mut InvaderController, grid: &mut HexGrid, round: u32) -> Vec<StepOutcome> {
        let rules = RuleSet::default();
        controller.begin_turn();
        let mut outcomes = Vec::new();
        loop {
            let outcome = controller.advance(grid, &rules, round);
            let finished = outcome.finished;
            outcomes.push(outcome);
            if finished {
                break;
            }
        }
        outcomes
    }

    #[test]
    fn test_growth_then_infection() {
        let mut grid = grid();
        set(&mut grid, 0, 0, Owner::Invader, 3);
        // All six neighbors owned by faction 1 at power 2, except one at power 1
        for n in HexCoord::new(0, 0).neighbors() {
            set(&mut grid, n.q, n.r, Owner::Faction(1), 2);
        }
        set(&mut grid, 1, 0, Owner::Faction(1), 1);

        let mut controller = InvaderController::with_seed(7);
        let outcomes = run_turn(&mut controller, &mut grid, 14);

        assert_eq!(outcomes.len(), 2);
        // Growth took the source from 3 to 4, which reaches the threshold
        assert_eq!(grid.get_tile(&HexCoord::new(0, 0)).unwrap().power(), 4);
        let infected = grid.get_tile(&HexCoord::new(1, 0)).unwrap();
        assert_eq!(infected.owner(), Owner::Invader);
        assert_eq!(infected.power(), 3);
        assert_eq!(grid.count_owned(Owner::Invader), 2);
        assert_eq!(controller.step(), InvaderStep::Done);
    }

    #[test]
    fn test_infection_uses_start_of_step_board() {
        let mut grid = grid();
        // Freshly infected tiles are power 3 and below threshold; a chain
        // reaction would need them to act in the same step.
        set(&mut grid, 0, 0, Owner::Invader, 4);
        for n in HexCoord::new(0, 0).neighbors() {
            set(&mut grid, n.q, n.r, Owner::Faction(2), 4);
        }
        set(&mut grid, 1, 0, Owner::Neutral, 0);

        let mut controller = InvaderController::with_seed(1);
        run_turn(&mut controller, &mut grid, 14);

        // Source grew to 5; only the neutral tile (display power 0) was taken
        assert_eq!(grid.count_owned(Owner::Invader), 2);
        assert_eq!(
            grid.get_tile(&HexCoord::new(1, 0)).unwrap().owner(),
            Owner::Invader
        );
        assert_eq!(
            grid.get_tile(&HexCoord::new(2, 0)).unwrap().owner(),
            Owner::Neutral
        );
    }

    #[test]
    fn test_stronger_neighbors_are_skipped() {
        let mut grid = grid();
        set(&mut grid, 0, 0, Owner::Invader, 3);
        for n in HexCoord::new(0, 0).neighbors() {
            set(&mut grid, n.q, n.r, Owner::Faction(1), 5);
        }
        // Growth lifts the source to 4, which still loses to a 4
        set(&mut grid, 0, 1, Owner::Faction(1), 4);

        let mut controller = InvaderController::with_seed(3);
        let outcomes = run_turn(&mut controller, &mut grid, 14);

        assert!(outcomes[1].events.is_empty());
        assert_eq!(grid.count_owned(Owner::Invader), 1);
    }

    #[test]
    fn test_shields_do_not_stop_infection() {
        let mut grid = grid();
        set(&mut grid, 0, 0, Owner::Invader, 4);
        for n in HexCoord::new(0, 0).neighbors() {
            set(&mut grid, n.q, n.r, Owner::Faction(2), 5);
        }
        let headquarters = HexCoord::new(1, 0);
        grid.get_tile_mut(&headquarters).unwrap().make_headquarters(2);

        let mut controller = InvaderController::with_seed(3);
        let outcomes = run_turn(&mut controller, &mut grid, 14);

        assert_eq!(
            outcomes[1].events,
            vec![GameEvent::InvaderInfected {
                from: HexCoord::new(0, 0),
                to: headquarters,
            }]
        );
        let tile = grid.get_tile(&headquarters).unwrap();
        assert_eq!(tile.owner(), Owner::Invader);
        assert_eq!(tile.power(), 3);
        assert!(!tile.is_shielded());
        assert!(!tile.is_permanent_shield());
        // The snapshot keeps the headquarters shields for undo
        assert!(outcomes[1].tile_changes[0].permanent_shield);
    }

    #[test]
    fn test_growth_is_capped() {
        let mut grid = grid();
        set(&mut grid, 0, 0, Owner::Invader, 5);
        set(&mut grid, 6, -6, Owner::Invader, 2);

        let changes = grow(&mut grid, 5);
        assert_eq!(changes.len(), 1);
        assert_eq!(grid.get_tile(&HexCoord::new(0, 0)).unwrap().power(), 5);
        assert_eq!(grid.get_tile(&HexCoord::new(6, -6)).unwrap().power(), 3);
    }

    #[test]
    fn test_invincible_round_is_a_pass() {
        let mut grid = grid();
        set(&mut grid, 0, 0, Owner::Invader, 4);

        let mut controller = InvaderController::with_seed(3);
        let outcomes = run_turn(&mut controller, &mut grid, RuleSet::default().invincible_round);

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].events, vec![GameEvent::InvaderDormant { round: 12 }]);
        assert_eq!(grid.get_tile(&HexCoord::new(0, 0)).unwrap().power(), 4);
    }

    #[test]
    fn test_ties_are_broken_among_weakest_only() {
        for seed in 0..20 {
            let mut grid = grid();
            set(&mut grid, 0, 0, Owner::Invader, 4);
            for n in HexCoord::new(0, 0).neighbors() {
                set(&mut grid, n.q, n.r, Owner::Faction(1), 3);
            }
            set(&mut grid, 1, 0, Owner::Faction(1), 1);
            set(&mut grid, -1, 0, Owner::Faction(1), 1);

            let mut controller = InvaderController::with_seed(seed);
            run_turn(&mut controller, &mut grid, 14);

            let infected: Vec<_> = grid
                .tiles_owned_by(Owner::Invader)
                .map(|t| t.coord)
                .filter(|c| *c != HexCoord::new(0, 0))
                .collect();
            assert_eq!(infected.len(), 1);
            assert!(infected[0] == HexCoord::new(1, 0) || infected[0] == HexCoord::new(-1, 0));
        }
    }
}

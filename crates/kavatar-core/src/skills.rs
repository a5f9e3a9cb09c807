//! Faction special abilities.
//!
//! Each ability is planned against the unmodified board first. Only a plan
//! that touches at least one tile is applied, so a rejected ability never
//! leaves a partial change behind.

use crate::actions::Skill;
use crate::game::GameError;
use crate::grid::{FactionId, HexGrid, Owner, Tile};
use crate::hex::HexCoord;
use crate::history::TileSnapshot;
use crate::maps::RuleSet;

/// What happens to one tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Effect {
    SetPower(u8),
    Capture(u8),
    Shield,
    Purify,
}

/// Ability context shared by every planner
struct Caster<'a> {
    grid: &'a HexGrid,
    rules: &'a RuleSet,
    own: Owner,
    invader_immune: bool,
}

impl Caster<'_> {
    fn is_own(&self, tile: &Tile) -> bool {
        tile.owner() == self.own
    }

    /// Held by someone else, and not protected by the invincible round
    fn is_hostile_target(&self, tile: &Tile) -> bool {
        let owner = tile.owner();
        !owner.is_neutral()
            && owner != self.own
            && !(owner.is_invader() && self.invader_immune)
    }

    fn own_tile(&self, target: &HexCoord) -> Result<&Tile, GameError> {
        let tile = self.grid.get_tile(target).ok_or(GameError::TileNotFound)?;
        if self.is_own(tile) {
            Ok(tile)
        } else {
            Err(GameError::NotOwnTile)
        }
    }

    fn area(&self, center: &HexCoord) -> Vec<&Tile> {
        self.grid.tiles_within(center, 1)
    }
}

/// Work out what an ability would do, without changing anything
pub(crate) fn plan(
    grid: &HexGrid,
    rules: &RuleSet,
    round: u32,
    faction: FactionId,
    skill: Skill,
    target: HexCoord,
) -> Result<Vec<(HexCoord, Effect)>, GameError> {
    let caster = Caster {
        grid,
        rules,
        own: Owner::Faction(faction),
        invader_immune: round == rules.invincible_round,
    };

    let plan: Vec<(HexCoord, Effect)> = match skill {
        Skill::Drain => {
            if !grid.contains(&target) {
                return Err(GameError::TileNotFound);
            }
            caster
                .area(&target)
                .into_iter()
                .filter(|t| caster.is_hostile_target(t) && !t.is_shielded() && t.power() > 1)
                .map(|t| (t.coord, Effect::SetPower(t.power() - 1)))
                .collect()
        }

        Skill::Seize => {
            let tile = grid.get_tile(&target).ok_or(GameError::TileNotFound)?;
            if tile.owner().is_neutral() || caster.is_own(tile) {
                return Err(GameError::InvalidTarget);
            }
            if tile.owner().is_invader() && caster.invader_immune {
                return Err(GameError::TargetImmune);
            }
            if tile.is_shielded() {
                return Err(GameError::TargetShielded);
            }
            if tile.power() > 2 {
                return Err(GameError::InvalidTarget);
            }
            if !grid.borders_owner(&target, caster.own) {
                return Err(GameError::NotAdjacent);
            }
            vec![(target, Effect::Capture(1))]
        }

        Skill::Bulwark => {
            caster.own_tile(&target)?;
            caster
                .area(&target)
                .into_iter()
                .filter(|t| caster.is_own(t) && !t.is_shielded())
                .map(|t| (t.coord, Effect::Shield))
                .collect()
        }

        Skill::Absorb => {
            caster.own_tile(&target)?;
            grid.neighbors(&target)
                .into_iter()
                .filter(|t| !caster.is_own(t) && !t.is_shielded() && t.display_power() <= 1)
                .filter(|t| !(t.owner().is_invader() && caster.invader_immune))
                .map(|t| (t.coord, Effect::Capture(1)))
                .collect()
        }

        Skill::Rally => {
            caster.own_tile(&target)?;
            caster
                .area(&target)
                .into_iter()
                .filter(|t| caster.is_own(t) && t.power() < caster.rules.max_power)
                .map(|t| (t.coord, Effect::SetPower(t.power() + 1)))
                .collect()
        }

        Skill::Cleanse => {
            caster.own_tile(&target)?;
            let invaders: Vec<HexCoord> = caster
                .area(&target)
                .into_iter()
                .filter(|t| t.owner().is_invader())
                .map(|t| t.coord)
                .collect();
            if !invaders.is_empty() && caster.invader_immune {
                return Err(GameError::TargetImmune);
            }
            invaders.into_iter().map(|c| (c, Effect::Purify)).collect()
        }
    };

    if plan.is_empty() {
        return Err(GameError::InvalidTarget);
    }
    Ok(plan)
}

/// Apply a plan for `faction`, returning pre-change snapshots
pub(crate) fn apply(grid: &mut HexGrid, faction: FactionId, plan: &[(HexCoord, Effect)]) -> Vec<TileSnapshot> {
    let mut snapshots = Vec::with_capacity(plan.len());
    for (coord, effect) in plan {
        let Some(tile) = grid.get_tile_mut(coord) else {
            continue;
        };
        snapshots.push(tile.snapshot());
        match *effect {
            Effect::SetPower(power) => tile.set_power(power),
            Effect::Capture(power) => {
                tile.transfer(Owner::Faction(faction), power);
            }
            Effect::Shield => tile.raise_shield(),
            Effect::Purify => tile.purify(),
        }
    }
    snapshots
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

    fn cast(grid: &mut HexGrid, skill: Skill, target: HexCoord, round: u32) -> Result<Vec<TileSnapshot>, GameError> {
        let rules = RuleSet::default();
        let plan = plan(grid, &rules, round, 1, skill, target)?;
        Ok(apply(grid, 1, &plan))
    }

    fn tile(grid: &HexGrid, q: i32, r: i32) -> &Tile {
        grid.get_tile(&HexCoord::new(q, r)).unwrap()
    }

    #[test]
    fn test_drain_weakens_enemies_around_target() {
        let mut g = grid();
        set(&mut g, 0, 0, Owner::Faction(2), 4);
        set(&mut g, 1, 0, Owner::Faction(3), 1);
        set(&mut g, 0, 1, Owner::Faction(1), 3);
        set(&mut g, -1, 0, Owner::Faction(2), 3);
        g.get_tile_mut(&HexCoord::new(-1, 0)).unwrap().raise_shield();

        let changed = cast(&mut g, Skill::Drain, HexCoord::new(0, 0), 5).unwrap();

        assert_eq!(changed.len(), 1);
        assert_eq!(tile(&g, 0, 0).power(), 3);
        // Floor of 1, own tiles and shielded tiles untouched
        assert_eq!(tile(&g, 1, 0).power(), 1);
        assert_eq!(tile(&g, 0, 1).power(), 3);
        assert_eq!(tile(&g, -1, 0).power(), 3);
    }

    #[test]
    fn test_seize_requires_weak_adjacent_target() {
        let mut g = grid();
        set(&mut g, 0, 0, Owner::Faction(1), 1);
        set(&mut g, 1, 0, Owner::Faction(2), 3);
        assert_eq!(
            cast(&mut g, Skill::Seize, HexCoord::new(1, 0), 5),
            Err(GameError::InvalidTarget)
        );

        set(&mut g, 1, 0, Owner::Faction(2), 2);
        cast(&mut g, Skill::Seize, HexCoord::new(1, 0), 5).unwrap();
        assert_eq!(tile(&g, 1, 0).owner(), Owner::Faction(1));
        assert_eq!(tile(&g, 1, 0).power(), 1);

        set(&mut g, 4, 0, Owner::Faction(2), 1);
        assert_eq!(
            cast(&mut g, Skill::Seize, HexCoord::new(4, 0), 5),
            Err(GameError::NotAdjacent)
        );
    }

    #[test]
    fn test_bulwark_and_rally_affect_own_area() {
        let mut g = grid();
        set(&mut g, 0, 0, Owner::Faction(1), 2);
        set(&mut g, 1, 0, Owner::Faction(1), 5);
        set(&mut g, 0, 1, Owner::Faction(2), 2);

        cast(&mut g, Skill::Bulwark, HexCoord::new(0, 0), 5).unwrap();
        assert!(tile(&g, 0, 0).is_shielded());
        assert!(tile(&g, 1, 0).is_shielded());
        assert!(!tile(&g, 0, 1).is_shielded());

        let changed = cast(&mut g, Skill::Rally, HexCoord::new(0, 0), 5).unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(tile(&g, 0, 0).power(), 3);
        assert_eq!(tile(&g, 1, 0).power(), 5);

        assert_eq!(
            cast(&mut g, Skill::Rally, HexCoord::new(0, 1), 5),
            Err(GameError::NotOwnTile)
        );
    }

    #[test]
    fn test_absorb_takes_weak_neighbors() {
        let mut g = grid();
        set(&mut g, 0, 0, Owner::Faction(1), 3);
        for n in HexCoord::new(0, 0).neighbors() {
            set(&mut g, n.q, n.r, Owner::Faction(2), 2);
        }
        set(&mut g, 1, 0, Owner::Neutral, 0);
        set(&mut g, -1, 0, Owner::Faction(2), 1);

        let changed = cast(&mut g, Skill::Absorb, HexCoord::new(0, 0), 5).unwrap();
        assert_eq!(changed.len(), 2);
        assert_eq!(tile(&g, 1, 0).owner(), Owner::Faction(1));
        assert_eq!(tile(&g, -1, 0).owner(), Owner::Faction(1));
        assert_eq!(tile(&g, 0, 1).owner(), Owner::Faction(2));
    }

    #[test]
    fn test_cleanse_respects_invincible_round() {
        let mut g = grid();
        set(&mut g, 0, 0, Owner::Faction(1), 1);
        set(&mut g, 1, 0, Owner::Invader, 5);

        assert_eq!(
            cast(&mut g, Skill::Cleanse, HexCoord::new(0, 0), 12),
            Err(GameError::TargetImmune)
        );
        assert_eq!(tile(&g, 1, 0).owner(), Owner::Invader);

        cast(&mut g, Skill::Cleanse, HexCoord::new(0, 0), 13).unwrap();
        assert!(tile(&g, 1, 0).owner().is_neutral());
        assert_eq!(tile(&g, 1, 0).power(), 1);
    }

    #[test]
    fn test_plan_without_effect_is_rejected() {
        let mut g = grid();
        set(&mut g, 0, 0, Owner::Faction(1), 1);
        assert_eq!(
            cast(&mut g, Skill::Drain, HexCoord::new(0, 0), 5),
            Err(GameError::InvalidTarget)
        );
        assert_eq!(
            cast(&mut g, Skill::Drain, HexCoord::new(30, 0), 5),
            Err(GameError::TileNotFound)
        );
    }
}

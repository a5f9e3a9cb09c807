//! Integration tests for the Kavatar rules engine.
//!
//! These tests drive complete matches through the public API, from setup
//! through the invasion to a result.

use kavatar_core::maps::LandmarkSpec;
use kavatar_core::*;
use pretty_assertions::assert_eq;

fn hex(q: i32, r: i32) -> HexCoord {
    HexCoord::new(q, r)
}

/// End every faction's turn once, starting from faction 1
fn end_round(game: &mut GameManager) -> Vec<GameEvent> {
    let mut events = Vec::new();
    for faction in 1..=game.faction_count() {
        assert_eq!(game.current_turn(), TurnHolder::Faction(faction));
        events.extend(game.end_turn(faction).expect("end turn"));
    }
    events
}

/// Hexagon map with a single landmark one step from faction 1's corner
fn short_invasion_match() -> GameManager {
    let mut config = MapConfig::for_map(MapId::Hexagon);
    config.landmarks = vec![LandmarkSpec {
        coord: hex(1, -5),
        name: "Watchtower".to_string(),
        premium: false,
    }];
    config.rules.invasion_round = 2;
    config.rules.invincible_round = 2;
    GameManager::with_config(config, Some(11))
}

#[test]
fn test_match_to_human_victory() {
    let mut game = short_invasion_match();
    let observed = EventLog::new();
    game.subscribe(Box::new(observed.clone()));

    // Round 1: claim the tile between the headquarters and the landmark
    game.apply_action(1, GameAction::Expand(hex(0, -5))).unwrap();
    assert_eq!(game.team(1).unwrap().action_points, 6);
    end_round(&mut game);

    // Round 2: the landmark turns, and the invader is immune
    assert!(game.is_invasion_phase());
    let spawn = game.grid().get_tile(&hex(1, -5)).unwrap();
    assert_eq!(spawn.owner(), Owner::Invader);
    assert_eq!(spawn.power(), 5);
    assert_eq!(
        game.apply_action(1, GameAction::Purify(hex(1, -5))),
        Err(GameError::TargetImmune)
    );
    let round_two = end_round(&mut game);
    assert!(round_two.contains(&GameEvent::InvaderDormant { round: 2 }));

    // Round 3: purify the only invader tile and hand the turn on
    assert_eq!(game.current_round(), 3);
    assert_eq!(game.team(1).unwrap().action_points, 14);
    game.apply_action(1, GameAction::Purify(hex(1, -5))).unwrap();
    let purified = game.grid().get_tile(&hex(1, -5)).unwrap();
    assert!(purified.owner().is_neutral());
    assert_eq!(purified.display_power(), 0);
    assert_eq!(game.team(1).unwrap().purify_count, 1);

    let events = game.end_turn(1).unwrap();
    let outcome = Outcome::HumanVictory { winner: 1 };
    assert_eq!(
        events,
        vec![
            GameEvent::TurnEnded {
                holder: TurnHolder::Faction(1)
            },
            GameEvent::MatchConcluded { outcome },
        ]
    );
    assert_eq!(game.outcome(), Some(outcome));
    assert!(observed
        .drain()
        .contains(&GameEvent::MatchConcluded { outcome }));
    assert_eq!(game.end_turn(2), Err(GameError::GameOver));
}

#[test]
fn test_invader_overruns_the_map() {
    let mut game = GameManager::with_seed(MapId::Hexagon, 5);
    let mut data = game.snapshot();
    data.is_invasion_phase = true;
    data.current_round = 20;
    data.current_turn = TurnHolder::Faction(6);
    // One tile short of half the map
    for tile in data.tiles.iter_mut().take(63) {
        tile.owner_id = Owner::Invader;
        tile.power = 5;
        tile.is_shielded = false;
        tile.is_permanent_shield = false;
    }
    game.load_save(data).unwrap();
    assert_eq!(game.outcome(), None);

    let events = game.end_turn(6).unwrap();

    assert!(events
        .iter()
        .any(|e| matches!(e, GameEvent::InvaderInfected { .. })));
    assert_eq!(
        events.last(),
        Some(&GameEvent::MatchConcluded {
            outcome: Outcome::InvaderVictory
        })
    );
    assert!(game.grid().count_owned(Owner::Invader) >= 64);
    assert_eq!(game.current_round(), 21);
}

#[test]
fn test_undo_unwinds_whole_match() {
    let mut game = GameManager::with_seed(MapId::Campus, 3);
    let start = game.snapshot();

    game.apply_action(1, GameAction::Expand(hex(-2, -2))).unwrap();
    game.apply_action(1, GameAction::Recruit(hex(-2, -2))).unwrap();
    game.end_turn(1).unwrap();
    game.apply_action(2, GameAction::Expand(hex(5, -2))).unwrap();
    game.apply_action(2, GameAction::Fortify(hex(5, -2))).unwrap();
    for faction in 2..=5 {
        game.end_turn(faction).unwrap();
    }
    game.apply_action(1, GameAction::Recruit(hex(-2, -2))).unwrap();
    game.adjust_ap(3, 7).unwrap();
    assert_eq!(game.current_round(), 2);

    let mut undone = Vec::new();
    while !game.log().is_empty() {
        for event in game.undo().unwrap() {
            if let GameEvent::ActionUndone { kind } = event {
                undone.push(kind);
            }
        }
    }

    assert_eq!(
        undone,
        vec![
            ActionKind::ApAdjusted,
            ActionKind::Recruit,
            ActionKind::TurnTransition,
            ActionKind::TurnTransition,
            ActionKind::TurnTransition,
            ActionKind::TurnTransition,
            ActionKind::Fortify,
            ActionKind::Expand,
            ActionKind::TurnTransition,
            ActionKind::Recruit,
            ActionKind::Expand,
        ]
    );
    assert_eq!(game.snapshot(), start);
    // Nothing left: further undo is a no-op
    assert_eq!(game.undo(), Ok(Vec::new()));
}

#[test]
fn test_save_and_resume_mid_match() {
    let mut game = GameManager::with_seed(MapId::Honeycomb, 9);
    let faction_one_hq = game
        .grid()
        .tiles_owned_by(Owner::Faction(1))
        .next()
        .map(|t| t.coord)
        .unwrap();
    let frontier = game
        .grid()
        .neighbors(&faction_one_hq)
        .into_iter()
        .find(|t| t.owner().is_neutral())
        .map(|t| t.coord)
        .unwrap();

    game.apply_action(1, GameAction::Expand(frontier)).unwrap();
    for _ in 0..10 {
        game.tick();
    }

    let mut store = MemoryStore::new();
    game.save_to(&mut store, "autosave").unwrap();

    let mut resumed = GameManager::with_seed(MapId::Honeycomb, 9);
    resumed.load_from(&store, "autosave").unwrap();
    assert_eq!(resumed.time_remaining(), 50);
    assert_eq!(resumed.snapshot(), game.snapshot());

    // Both copies keep playing identically
    for match_copy in [&mut game, &mut resumed] {
        match_copy.apply_action(1, GameAction::Recruit(frontier)).unwrap();
        end_round(match_copy);
    }
    assert_eq!(resumed.snapshot(), game.snapshot());
    assert_eq!(resumed.current_round(), 2);
}

#[test]
fn test_manual_setup_then_play() {
    let mut game = GameManager::with_seed(MapId::Frontier, 2);
    let observed = EventLog::new();
    game.subscribe(Box::new(observed.clone()));

    let spots = [hex(-4, 2), hex(4, -2), hex(0, 4), hex(0, -4)];
    for (faction, spot) in (1..=4).zip(spots) {
        assert!(game.is_setup_phase());
        // The clock does not run during setup
        assert!(game.tick().is_empty());
        game.apply_action(faction, GameAction::PlaceHeadquarters(spot)).unwrap();
    }

    assert_eq!(game.phase(), GamePhase::Main);
    let events = observed.drain();
    assert_eq!(
        &events[events.len() - 2..],
        &[
            GameEvent::SetupCompleted,
            GameEvent::TurnStarted {
                holder: TurnHolder::Faction(1),
                round: 1,
                ap_granted: 0,
                expansion_bonus: false,
            },
        ]
    );

    game.apply_action(1, GameAction::Expand(hex(-3, 2))).unwrap();
    assert_eq!(
        game.apply_action(1, GameAction::PlaceHeadquarters(hex(2, 2))),
        Err(GameError::InvalidPhase)
    );
}

#[test]
fn test_timer_runs_a_round() {
    let mut game = GameManager::with_seed(MapId::Campus, 4);
    let duration = game.rules().turn_duration_secs;

    for faction in 1..=5 {
        assert_eq!(game.current_turn(), TurnHolder::Faction(faction));
        for _ in 0..duration {
            game.tick();
        }
    }

    assert_eq!(game.current_round(), 2);
    assert_eq!(game.current_turn(), TurnHolder::Faction(1));
    assert_eq!(game.time_remaining(), duration);
    // Round-two income was paid to faction 1
    assert_eq!(game.team(1).unwrap().action_points, 9 + 4);
}

#[test]
fn test_skills_are_granted_consumed_and_restored() {
    let mut game = GameManager::with_seed(MapId::Hexagon, 6);
    game.apply_action(1, GameAction::Expand(hex(0, -5))).unwrap();

    assert_eq!(
        game.apply_action(
            1,
            GameAction::UseSkill {
                skill: Skill::Bulwark,
                target: hex(0, -5)
            }
        ),
        Err(GameError::SkillUnavailable)
    );

    game.grant_skill(1, Skill::Bulwark).unwrap();
    let ap = game.team(1).unwrap().action_points;
    let events = game
        .apply_action(
            1,
            GameAction::UseSkill {
                skill: Skill::Bulwark,
                target: hex(0, -5),
            },
        )
        .unwrap();

    assert_eq!(
        events,
        vec![GameEvent::SkillUsed {
            faction: 1,
            skill: Skill::Bulwark,
            target: hex(0, -5),
            affected: vec![hex(0, -5)],
        }]
    );
    assert!(game.grid().get_tile(&hex(0, -5)).unwrap().is_shielded());
    assert_eq!(game.team(1).unwrap().action_points, ap);
    assert_eq!(game.team(1).unwrap().available_skill, None);

    game.undo().unwrap();
    assert_eq!(game.team(1).unwrap().available_skill, Some(Skill::Bulwark));
    assert!(!game.grid().get_tile(&hex(0, -5)).unwrap().is_shielded());
}

//! Map catalogue and rules constants.
//!
//! A map is pure data: a coordinate list, a landmark list, a faction count,
//! how headquarters are placed, and the [`RuleSet`] the match runs under.
//! Everything that differs between maps lives here so the engine itself has
//! a single code path.

use crate::grid::FactionId;
use crate::hex::HexCoord;
use serde::{Deserialize, Serialize};

/// Rules constants for a match.
///
/// `Default` carries the standard values; any field can be overridden from
/// JSON with [`RuleSet::from_json`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    /// Power ceiling for every tile
    pub max_power: u8,
    /// Flat income per turn
    pub base_income: u32,
    /// One extra AP per this many owned tiles
    pub territory_divisor: u32,
    /// Income per owned landmark
    pub landmark_bonus: u32,
    /// Income per owned premium landmark
    pub premium_landmark_bonus: u32,
    pub recruit_cost: u32,
    pub fortify_cost: u32,
    pub expand_cost: u32,
    pub attack_cost: u32,
    /// One-shot grant once a faction no longer borders neutral land
    pub expansion_bonus: u32,
    /// First round of the invasion phase
    pub invasion_round: u32,
    /// Round in which invader tiles cannot be attacked, purified or
    /// targeted, and the invader does not act
    pub invincible_round: u32,
    pub invader_spawn_power: u8,
    /// Paid per landmark a faction loses to the invasion spawn
    pub landmark_compensation: u32,
    /// Invader tiles at or above this power spread
    pub infection_threshold: u8,
    /// Power of a freshly infected tile
    pub infection_power: u8,
    /// Invader wins once it holds at least this share of the map
    pub invader_victory_percent: u32,
    pub turn_duration_secs: u32,
    /// Opening AP stake, indexed by faction id - 1
    pub starting_ap: Vec<u32>,
    /// Minimum distance between manually placed headquarters
    pub min_hq_distance: u32,
    /// Drop the action log whenever a human turn starts
    pub clear_log_on_turn_start: bool,
    /// Run the whole invader turn inside the end-of-turn call
    pub auto_run_invader: bool,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            max_power: 5,
            base_income: 4,
            territory_divisor: 4,
            landmark_bonus: 2,
            premium_landmark_bonus: 4,
            recruit_cost: 1,
            fortify_cost: 3,
            expand_cost: 3,
            attack_cost: 2,
            expansion_bonus: 5,
            invasion_round: 12,
            invincible_round: 12,
            invader_spawn_power: 5,
            landmark_compensation: 5,
            infection_threshold: 4,
            infection_power: 3,
            invader_victory_percent: 50,
            turn_duration_secs: 60,
            starting_ap: vec![9, 9, 10, 10, 11, 11],
            min_hq_distance: 3,
            clear_log_on_turn_start: false,
            auto_run_invader: true,
        }
    }
}

impl RuleSet {
    /// Parse a rules override. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Opening AP for a faction; factions past the table reuse its last entry
    pub fn starting_ap_for(&self, faction: FactionId) -> u32 {
        let idx = usize::from(faction.saturating_sub(1));
        self.starting_ap
            .get(idx)
            .or_else(|| self.starting_ap.last())
            .copied()
            .unwrap_or(0)
    }
}

/// Built-in maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum MapId {
    /// Hand-drawn campus map, 5 factions
    Campus,
    /// Irregular hexagon, 6 factions
    Honeycomb,
    /// Radius-6 hexagon with corner headquarters, 6 factions
    Hexagon,
    /// Radius-5 hexagon with manual headquarters placement, 4 factions
    Frontier,
}

impl MapId {
    pub const ALL: [MapId; 4] = [
        MapId::Campus,
        MapId::Honeycomb,
        MapId::Hexagon,
        MapId::Frontier,
    ];
}

impl From<MapId> for u8 {
    fn from(id: MapId) -> u8 {
        match id {
            MapId::Campus => 1,
            MapId::Honeycomb => 2,
            MapId::Hexagon => 3,
            MapId::Frontier => 4,
        }
    }
}

impl TryFrom<u8> for MapId {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MapId::Campus),
            2 => Ok(MapId::Honeycomb),
            3 => Ok(MapId::Hexagon),
            4 => Ok(MapId::Frontier),
            other => Err(format!("unknown map id {other}")),
        }
    }
}

/// A landmark entry in a map table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandmarkSpec {
    pub coord: HexCoord,
    pub name: String,
    /// Premium landmarks pay `premium_landmark_bonus`
    pub premium: bool,
}

impl LandmarkSpec {
    fn new(q: i32, r: i32, name: &str, premium: bool) -> Self {
        Self {
            coord: HexCoord::new(q, r),
            name: name.to_string(),
            premium,
        }
    }
}

/// How faction headquarters get onto the board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadquartersPlacement {
    /// One coordinate per faction, in faction order
    Preset(Vec<HexCoord>),
    /// Factions pick their own spots during the setup phase
    Manual,
}

/// Complete static description of a map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapConfig {
    pub id: MapId,
    pub name: String,
    pub faction_count: u8,
    /// Tile coordinates; duplicates are ignored by the grid
    pub tiles: Vec<HexCoord>,
    pub landmarks: Vec<LandmarkSpec>,
    pub headquarters: HeadquartersPlacement,
    pub rules: RuleSet,
}

impl MapConfig {
    /// The built-in configuration for a map id
    pub fn for_map(id: MapId) -> Self {
        match id {
            MapId::Campus => Self::campus(),
            MapId::Honeycomb => Self::honeycomb(),
            MapId::Hexagon => Self::hexagon(),
            MapId::Frontier => Self::frontier(),
        }
    }

    /// Replace the rules, keeping the map data
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    fn campus() -> Self {
        Self {
            id: MapId::Campus,
            name: "Campus".to_string(),
            faction_count: 5,
            tiles: CAMPUS_TILES
                .iter()
                .map(|&(q, r)| HexCoord::new(q, r))
                .collect(),
            landmarks: vec![
                LandmarkSpec::new(-1, 2, "Creative Learning Center", true),
                LandmarkSpec::new(-3, 4, "Duck Pond", false),
                LandmarkSpec::new(-6, 6, "Applied Engineering Hall", false),
                LandmarkSpec::new(-2, -1, "Kaimaru", false),
                LandmarkSpec::new(1, 1, "Student Union", false),
                LandmarkSpec::new(-6, 3, "Eoeun Hill", false),
                LandmarkSpec::new(4, 3, "Main Stadium", false),
            ],
            headquarters: HeadquartersPlacement::Preset(vec![
                HexCoord::new(-3, -2),
                HexCoord::new(5, -1),
                HexCoord::new(1, 5),
                HexCoord::new(-9, 7),
                HexCoord::new(-2, 1),
            ]),
            rules: RuleSet::default(),
        }
    }

    fn honeycomb() -> Self {
        let mut tiles = Vec::new();
        for (i, &count) in HONEYCOMB_ROWS.iter().enumerate() {
            let r = i as i32 - 6;
            // Rows are centered on q = -r / 2
            let start_q = -(r + count).div_euclid(2);
            tiles.extend((0..count).map(|k| HexCoord::new(start_q + k, r)));
        }
        tiles.sort();

        // Headquarters sit on fixed reading-order tile numbers (1-based)
        let headquarters = HONEYCOMB_HQ_INDICES
            .iter()
            .filter_map(|&idx| tiles.get(idx - 1).copied())
            .collect();

        Self {
            id: MapId::Honeycomb,
            name: "Honeycomb".to_string(),
            faction_count: 6,
            tiles,
            landmarks: ring_landmarks(),
            headquarters: HeadquartersPlacement::Preset(headquarters),
            rules: RuleSet::default(),
        }
    }

    fn hexagon() -> Self {
        Self {
            id: MapId::Hexagon,
            name: "Hexagon".to_string(),
            faction_count: 6,
            tiles: HexCoord::new(0, 0).within(6),
            landmarks: ring_landmarks(),
            headquarters: HeadquartersPlacement::Preset(vec![
                HexCoord::new(0, -6),
                HexCoord::new(6, -6),
                HexCoord::new(6, 0),
                HexCoord::new(0, 6),
                HexCoord::new(-6, 6),
                HexCoord::new(-6, 0),
            ]),
            rules: RuleSet::default(),
        }
    }

    fn frontier() -> Self {
        Self {
            id: MapId::Frontier,
            name: "Frontier".to_string(),
            faction_count: 4,
            tiles: HexCoord::new(0, 0).within(5),
            landmarks: vec![
                LandmarkSpec::new(0, 0, "Central Plaza", true),
                LandmarkSpec::new(0, -3, "North Gate", false),
                LandmarkSpec::new(3, 0, "East Tower", false),
                LandmarkSpec::new(0, 3, "South Gate", false),
                LandmarkSpec::new(-3, 0, "West Tower", false),
            ],
            headquarters: HeadquartersPlacement::Manual,
            rules: RuleSet::default(),
        }
    }
}

/// Center plus six landmarks on the radius-3 ring, shared by the hexagonal maps
fn ring_landmarks() -> Vec<LandmarkSpec> {
    vec![
        LandmarkSpec::new(0, 0, "Central Plaza", true),
        LandmarkSpec::new(0, -3, "North Gate", false),
        LandmarkSpec::new(3, -3, "Observatory", false),
        LandmarkSpec::new(3, 0, "East Tower", false),
        LandmarkSpec::new(0, 3, "South Gate", false),
        LandmarkSpec::new(-3, 3, "Library", false),
        LandmarkSpec::new(-3, 0, "West Tower", false),
    ]
}

const HONEYCOMB_ROWS: [i32; 13] = [3, 6, 9, 10, 11, 10, 11, 10, 11, 10, 9, 6, 3];

const HONEYCOMB_HQ_INDICES: [usize; 6] = [2, 19, 28, 82, 91, 108];

#[rustfmt::skip]
const CAMPUS_TILES: &[(i32, i32)] = &[
    (-9, 7), (-8, 7), (-7, 7), (-6, 7), (-5, 6), (-4, 6), (-3, 6), (-2, 6),
    (-1, 6), (0, 5), (1, 5), (3, 5), (2, 5), (4, 5), (5, 5), (5, 4),
    (4, 4), (3, 4), (2, 4), (1, 4), (0, 4), (-1, 5), (-2, 5), (-3, 5),
    (-4, 5), (-5, 5), (-6, 6), (-7, 6), (-10, 8), (-10, 7), (-10, 6), (-9, 5),
    (-9, 4), (-9, 3), (-9, 2), (-8, 1), (-7, 0), (-6, 0), (-5, 0), (-5, -1),
    (-4, -1), (-4, -2), (-3, -3), (-2, -4), (-1, -5), (0, -6), (1, -6), (1, -5),
    (2, -5), (2, -4), (2, -3), (3, -3), (3, -2), (4, -2), (4, -1), (5, -2),
    (5, -1), (6, -1), (6, 0), (6, 1), (5, 2), (4, 3), (-8, 6), (-9, 6),
    (-8, 5), (-7, 5), (-6, 5), (-7, 4), (-8, 4), (-8, 3), (-7, 3), (-8, 2),
    (-7, 2), (-7, 1), (-6, 1), (-5, 1), (-6, 2), (-6, 3), (-6, 4), (-5, 4),
    (-4, 4), (-3, 4), (-2, 4), (-1, 4), (1, 3), (2, 3), (3, 3), (4, 2),
    (5, 1), (5, 0), (0, 3), (0, -5), (-1, -4), (0, -4), (1, -4), (-2, -3),
    (-1, -3), (0, -3), (1, -3), (-3, -2), (-2, -2), (-1, -2), (0, -2), (1, -2),
    (2, -2), (-3, -1), (-2, -1), (-1, -1), (0, -1), (0, 0), (1, -1), (1, 0),
    (2, -1), (2, 0), (3, 0), (3, -1), (4, 0), (4, 1), (3, 2), (2, 2),
    (1, 2), (1, 1), (2, 1), (3, 1), (0, 1), (-1, 2), (-2, 3), (-3, 3),
    (-3, 2), (-2, 2), (0, 2), (-1, 3), (-4, 2), (-4, 1), (-4, 0), (-5, 2),
    (-5, 3), (-4, 3), (-3, 1), (-2, 0), (-1, 0), (-2, 1), (-1, 1), (-3, 0),
    (-5, 7), (-4, 7), (-3, 7), (0, 6), (1, 6), (2, 6), (-2, 7),
];

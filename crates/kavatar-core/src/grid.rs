//! The hex map: tiles, ownership, and topology queries.
//!
//! This module contains:
//! - `Owner`, the neutral / faction / invader ownership tag
//! - `Tile`, the per-cell mutable state
//! - `HexGrid`, the fixed tile set of a match with adjacency and distance queries

use crate::history::TileSnapshot;
use crate::hex::HexCoord;
use crate::maps::{HeadquartersPlacement, MapConfig, MapId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Human faction identifier (1-based)
pub type FactionId = u8;

/// Wire id reserved for the invader faction
pub const INVADER_ID: u8 = 9;

/// Who holds a tile.
///
/// Serialized as the integer id used by the save format: `0` neutral,
/// `1..=8` factions, `9` the invader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(into = "u8", try_from = "u8")]
pub enum Owner {
    #[default]
    Neutral,
    Faction(FactionId),
    Invader,
}

impl Owner {
    pub fn is_neutral(self) -> bool {
        self == Owner::Neutral
    }

    pub fn is_invader(self) -> bool {
        self == Owner::Invader
    }

    /// The faction id, if a human faction holds the tile
    pub fn faction(self) -> Option<FactionId> {
        match self {
            Owner::Faction(id) => Some(id),
            _ => None,
        }
    }
}

impl From<Owner> for u8 {
    fn from(owner: Owner) -> u8 {
        match owner {
            Owner::Neutral => 0,
            Owner::Faction(id) => id,
            Owner::Invader => INVADER_ID,
        }
    }
}

impl TryFrom<u8> for Owner {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Owner::Neutral),
            INVADER_ID => Ok(Owner::Invader),
            id @ 1..=8 => Ok(Owner::Faction(id)),
            other => Err(format!("invalid owner id {other}")),
        }
    }
}

/// Landmark marker on a tile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Landmark {
    pub name: String,
    pub premium: bool,
}

/// A single hex tile.
///
/// Fields are read through accessors; mutation goes through the paired
/// mutators below so owner and power always change together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    /// Position on the hex grid
    pub coord: HexCoord,
    /// 1-based reading-order number
    pub index: u32,
    owner: Owner,
    power: u8,
    shielded: bool,
    permanent_shield: bool,
    landmark: Option<Landmark>,
}

impl Tile {
    /// Create a neutral, unshielded tile
    pub fn new(coord: HexCoord, index: u32) -> Self {
        Self {
            coord,
            index,
            owner: Owner::Neutral,
            power: 0,
            shielded: false,
            permanent_shield: false,
            landmark: None,
        }
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    /// Stored power. A purified tile keeps power 1 while neutral.
    pub fn power(&self) -> u8 {
        self.power
    }

    /// Power as shown to players: neutral tiles read as 0
    pub fn display_power(&self) -> u8 {
        if self.owner.is_neutral() {
            0
        } else {
            self.power
        }
    }

    pub fn is_shielded(&self) -> bool {
        self.shielded
    }

    pub fn is_permanent_shield(&self) -> bool {
        self.permanent_shield
    }

    pub fn landmark(&self) -> Option<&Landmark> {
        self.landmark.as_ref()
    }

    pub fn is_landmark(&self) -> bool {
        self.landmark.is_some()
    }

    pub fn is_owned_by(&self, owner: Owner) -> bool {
        self.owner == owner
    }

    /// Current state as an undo snapshot
    pub fn snapshot(&self) -> TileSnapshot {
        TileSnapshot {
            coord: self.coord,
            owner: self.owner,
            power: self.power,
            shielded: self.shielded,
            permanent_shield: self.permanent_shield,
        }
    }

    /// Hand the tile to a new owner at the given power
    pub(crate) fn transfer(&mut self, owner: Owner, power: u8) {
        self.owner = owner;
        self.power = if owner.is_neutral() { 0 } else { power };
    }

    /// Neutralize a tile, leaving it at power 1 with no shield
    pub(crate) fn purify(&mut self) {
        self.owner = Owner::Neutral;
        self.power = 1;
        self.shielded = false;
        self.permanent_shield = false;
    }

    pub(crate) fn set_power(&mut self, power: u8) {
        self.power = power;
    }

    /// Raise a temporary shield
    pub(crate) fn raise_shield(&mut self) {
        self.shielded = true;
    }

    /// Drop a temporary shield. Permanent shields are never dropped.
    pub(crate) fn drop_shield(&mut self) {
        if !self.permanent_shield {
            self.shielded = false;
        }
    }

    /// Turn the tile into a faction headquarters
    pub(crate) fn make_headquarters(&mut self, faction: FactionId) {
        self.owner = Owner::Faction(faction);
        self.power = 1;
        self.shielded = true;
        self.permanent_shield = true;
    }

    /// Invader infection: every shield, permanent or not, is lost
    pub(crate) fn infect(&mut self, power: u8) {
        self.owner = Owner::Invader;
        self.power = power;
        self.shielded = false;
        self.permanent_shield = false;
    }

    /// Invader spawn: fixed power and a shield that expires normally
    pub(crate) fn spawn_invader(&mut self, power: u8) {
        self.owner = Owner::Invader;
        self.power = power;
        self.shielded = true;
        self.permanent_shield = false;
    }

    pub(crate) fn set_landmark(&mut self, landmark: Option<Landmark>) {
        self.landmark = landmark;
    }

    /// Overwrite the mutable state from a snapshot
    pub(crate) fn restore(&mut self, snapshot: &TileSnapshot) {
        debug_assert_eq!(self.coord, snapshot.coord);
        self.owner = snapshot.owner;
        self.power = snapshot.power;
        self.permanent_shield = snapshot.permanent_shield;
        self.shielded = snapshot.shielded || snapshot.permanent_shield;
    }
}

/// The fixed tile set of a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexGrid {
    tiles: HashMap<HexCoord, Tile>,
    /// Coordinates in reading order
    order: Vec<HexCoord>,
}

impl HexGrid {
    /// Build the built-in map for an id
    pub fn generate(map: MapId) -> Self {
        Self::from_config(&MapConfig::for_map(map))
    }

    /// Build the tile set described by a map config.
    ///
    /// Tiles are numbered in reading order and landmarks are marked. Preset
    /// headquarters are not placed here; that belongs to match start.
    pub fn from_config(config: &MapConfig) -> Self {
        let mut order = config.tiles.clone();
        order.sort();
        order.dedup();

        let mut tiles: HashMap<HexCoord, Tile> = order
            .iter()
            .enumerate()
            .map(|(i, &coord)| (coord, Tile::new(coord, i as u32 + 1)))
            .collect();

        for spec in &config.landmarks {
            if let Some(tile) = tiles.get_mut(&spec.coord) {
                tile.set_landmark(Some(Landmark {
                    name: spec.name.clone(),
                    premium: spec.premium,
                }));
            } else {
                tracing::warn!(coord = %spec.coord, name = %spec.name, "landmark off map");
            }
        }

        tracing::debug!(map = %config.name, tiles = order.len(), "generated grid");
        Self { tiles, order }
    }

    /// Place preset headquarters, if the map has them. Returns how many were placed.
    pub(crate) fn place_preset_headquarters(&mut self, config: &MapConfig) -> usize {
        let HeadquartersPlacement::Preset(coords) = &config.headquarters else {
            return 0;
        };

        let mut placed = 0;
        for (i, coord) in coords.iter().enumerate() {
            match self.get_tile_mut(coord) {
                Some(tile) => {
                    tile.make_headquarters(i as FactionId + 1);
                    placed += 1;
                }
                None => tracing::warn!(%coord, "headquarters position not on map"),
            }
        }
        placed
    }

    /// Look up a tile. `None` means the position is off-map.
    pub fn get_tile(&self, coord: &HexCoord) -> Option<&Tile> {
        self.tiles.get(coord)
    }

    pub(crate) fn get_tile_mut(&mut self, coord: &HexCoord) -> Option<&mut Tile> {
        self.tiles.get_mut(coord)
    }

    /// Whether a coordinate is on the map
    pub fn contains(&self, coord: &HexCoord) -> bool {
        self.tiles.contains_key(coord)
    }

    /// All tiles in reading order
    pub fn tiles(&self) -> impl Iterator<Item = &Tile> + '_ {
        self.order.iter().filter_map(|coord| self.tiles.get(coord))
    }

    /// All coordinates in reading order
    pub fn coords(&self) -> &[HexCoord] {
        &self.order
    }

    /// Look up a tile by its reading-order number
    pub fn tile_by_index(&self, index: u32) -> Option<&Tile> {
        let coord = self.order.get((index as usize).checked_sub(1)?)?;
        self.tiles.get(coord)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// On-map neighbors of a coordinate (up to 6)
    pub fn neighbors(&self, coord: &HexCoord) -> Vec<&Tile> {
        coord
            .neighbors()
            .iter()
            .filter_map(|n| self.tiles.get(n))
            .collect()
    }

    /// On-map tiles within `radius` steps, including the center if present
    pub fn tiles_within(&self, center: &HexCoord, radius: i32) -> Vec<&Tile> {
        center
            .within(radius)
            .iter()
            .filter_map(|c| self.tiles.get(c))
            .collect()
    }

    /// Hex distance between two coordinates
    pub fn distance(&self, a: &HexCoord, b: &HexCoord) -> u32 {
        a.distance_to(b)
    }

    /// Tiles held by an owner, in reading order
    pub fn tiles_owned_by(&self, owner: Owner) -> impl Iterator<Item = &Tile> + '_ {
        self.tiles().filter(move |t| t.owner == owner)
    }

    pub fn count_owned(&self, owner: Owner) -> usize {
        self.tiles_owned_by(owner).count()
    }

    /// Whether any tile next to `coord` is held by `owner`
    pub fn borders_owner(&self, coord: &HexCoord, owner: Owner) -> bool {
        self.neighbors(coord).iter().any(|t| t.owner == owner)
    }

    /// Apply a snapshot to the tile it was taken from.
    ///
    /// A snapshot for an off-map coordinate is a defect; it is reported and skipped.
    pub(crate) fn restore(&mut self, snapshot: &TileSnapshot) {
        match self.tiles.get_mut(&snapshot.coord) {
            Some(tile) => tile.restore(snapshot),
            None => {
                tracing::error!(coord = %snapshot.coord, "snapshot for off-map tile");
                debug_assert!(false, "snapshot for off-map tile {}", snapshot.coord);
            }
        }
    }
}

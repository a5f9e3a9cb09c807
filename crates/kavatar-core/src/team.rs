//! Faction records and their action-point ledger.
//!
//! Each human faction has one `Team`. The invader has no record: it holds no
//! AP and acts purely by rule.

use crate::actions::Skill;
use crate::grid::FactionId;
use serde::{Deserialize, Serialize};

/// Faction color for UI rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeamColor {
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
    Brown,
}

impl TeamColor {
    /// Get color for a faction id
    pub fn for_faction(id: FactionId) -> Self {
        match id.saturating_sub(1) % 6 {
            0 => TeamColor::Orange,
            1 => TeamColor::Yellow,
            2 => TeamColor::Green,
            3 => TeamColor::Blue,
            4 => TeamColor::Purple,
            _ => TeamColor::Brown,
        }
    }

    /// Get hex color code for rendering
    pub fn hex_code(&self) -> u32 {
        match self {
            TeamColor::Orange => 0xE67E22,
            TeamColor::Yellow => 0xF1C40F,
            TeamColor::Green => 0x27AE60,
            TeamColor::Blue => 0x3498DB,
            TeamColor::Purple => 0x8E44AD,
            TeamColor::Brown => 0x8D6E63,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TeamColor::Orange => "Orange",
            TeamColor::Yellow => "Yellow",
            TeamColor::Green => "Green",
            TeamColor::Blue => "Blue",
            TeamColor::Purple => "Purple",
            TeamColor::Brown => "Brown",
        }
    }
}

/// A human faction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: FactionId,
    pub display_name: String,
    pub color: TeamColor,
    /// Spendable action points
    pub action_points: u32,
    /// Invader tiles this faction has purified
    pub purify_count: u32,
    /// Set once the expansion-complete bonus has been paid
    pub expansion_bonus_granted: bool,
    /// Ability currently available to use, if any
    #[serde(default)]
    pub available_skill: Option<Skill>,
    /// How many abilities have been granted over the match
    #[serde(default)]
    pub skill_grants: u32,
}

impl Team {
    /// Create a faction with an opening AP stake
    pub fn new(id: FactionId, starting_ap: u32) -> Self {
        let color = TeamColor::for_faction(id);
        Self {
            id,
            display_name: format!("{} Team", color.name()),
            color,
            action_points: starting_ap,
            purify_count: 0,
            expansion_bonus_granted: false,
            available_skill: None,
            skill_grants: 0,
        }
    }

    pub fn can_afford(&self, cost: u32) -> bool {
        self.action_points >= cost
    }

    /// Try to spend AP, returning false (and spending nothing) if insufficient
    pub fn try_spend(&mut self, cost: u32) -> bool {
        if !self.can_afford(cost) {
            return false;
        }
        self.action_points -= cost;
        true
    }

    pub fn grant(&mut self, amount: u32) {
        self.action_points += amount;
    }

    /// Take back AP granted earlier. Saturates at zero.
    pub fn revoke(&mut self, amount: u32) {
        if amount > self.action_points {
            tracing::error!(team = self.id, amount, ap = self.action_points, "revoking more AP than held");
            debug_assert!(false, "revoking more AP than held");
        }
        self.action_points = self.action_points.saturating_sub(amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_team() {
        let team = Team::new(2, 9);
        assert_eq!(team.color, TeamColor::Yellow);
        assert_eq!(team.display_name, "Yellow Team");
        assert_eq!(team.action_points, 9);
        assert!(!team.expansion_bonus_granted);
    }

    #[test]
    fn test_spend_is_all_or_nothing() {
        let mut team = Team::new(1, 3);
        assert!(!team.try_spend(4));
        assert_eq!(team.action_points, 3);

        assert!(team.try_spend(3));
        assert_eq!(team.action_points, 0);
        assert!(!team.can_afford(1));
    }

    #[test]
    fn test_colors_cycle() {
        assert_eq!(TeamColor::for_faction(1), TeamColor::Orange);
        assert_eq!(TeamColor::for_faction(6), TeamColor::Brown);
        assert_eq!(TeamColor::for_faction(7), TeamColor::Orange);
    }
}

//! WebAssembly bindings for the Kavatar rules engine.
//!
//! This module exposes a match to a browser UI through wasm-bindgen. Every
//! value crosses the boundary as JSON.

#[cfg(feature = "wasm")]
use wasm_bindgen::prelude::*;

#[cfg(feature = "wasm")]
use crate::actions::{GameAction, Skill};
#[cfg(feature = "wasm")]
use crate::game::GameManager;
#[cfg(feature = "wasm")]
use crate::maps::MapId;
#[cfg(feature = "wasm")]
use crate::save::SaveData;

/// Initialize panic hook for better error messages in browser console
#[cfg(feature = "wasm")]
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// WASM-exposed match wrapper
#[cfg(feature = "wasm")]
#[wasm_bindgen]
pub struct WasmMatch {
    game: GameManager,
}

#[cfg(feature = "wasm")]
fn to_json<T: serde::Serialize>(value: &T, fallback: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| fallback.to_string())
}

#[cfg(feature = "wasm")]
fn events_or_error(
    result: Result<Vec<crate::actions::GameEvent>, crate::game::GameError>,
) -> Result<String, JsValue> {
    match result {
        Ok(events) => Ok(to_json(&events, "[]")),
        Err(e) => Err(JsValue::from_str(&format!("Action failed: {}", e))),
    }
}

#[cfg(feature = "wasm")]
#[wasm_bindgen]
impl WasmMatch {
    /// Start a match on a built-in map (1 = Campus .. 4 = Frontier)
    #[wasm_bindgen(constructor)]
    pub fn new(map_id: u8) -> Result<WasmMatch, JsValue> {
        let map = MapId::try_from(map_id).map_err(|e| JsValue::from_str(&e))?;
        Ok(WasmMatch {
            game: GameManager::new(map),
        })
    }

    /// Get the full match state as save JSON
    #[wasm_bindgen(js_name = getState)]
    pub fn get_state(&self) -> String {
        to_json(&self.game.snapshot(), "{}")
    }

    /// Current turn holder id (9 = invader)
    #[wasm_bindgen(js_name = getCurrentTurn)]
    pub fn get_current_turn(&self) -> u8 {
        self.game.current_turn().into()
    }

    #[wasm_bindgen(js_name = getRound)]
    pub fn get_round(&self) -> u32 {
        self.game.current_round()
    }

    #[wasm_bindgen(js_name = getTimeRemaining)]
    pub fn get_time_remaining(&self) -> u32 {
        self.game.time_remaining()
    }

    /// Apply an action from JSON, returns events JSON or error
    #[wasm_bindgen(js_name = applyAction)]
    pub fn apply_action(&mut self, faction: u8, action_json: &str) -> Result<String, JsValue> {
        let action: GameAction = serde_json::from_str(action_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid action JSON: {}", e)))?;
        events_or_error(self.game.apply_action(faction, action))
    }

    pub fn undo(&mut self) -> Result<String, JsValue> {
        events_or_error(self.game.undo())
    }

    /// Advance the turn clock by one second
    pub fn tick(&mut self) -> String {
        to_json(&self.game.tick(), "[]")
    }

    #[wasm_bindgen(js_name = setPaused)]
    pub fn set_paused(&mut self, paused: bool) -> String {
        to_json(&self.game.set_paused(paused), "[]")
    }

    /// Make an ability available, e.g. after the roulette lands
    #[wasm_bindgen(js_name = grantSkill)]
    pub fn grant_skill(&mut self, faction: u8, skill_json: &str) -> Result<String, JsValue> {
        let skill: Skill = serde_json::from_str(skill_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid skill JSON: {}", e)))?;
        events_or_error(self.game.grant_skill(faction, skill))
    }

    #[wasm_bindgen(js_name = adjustAp)]
    pub fn adjust_ap(&mut self, faction: u8, delta: i32) -> Result<String, JsValue> {
        events_or_error(self.game.adjust_ap(faction, i64::from(delta)))
    }

    #[wasm_bindgen(js_name = projectedIncome)]
    pub fn projected_income(&self, faction: u8) -> u32 {
        self.game.projected_income(faction)
    }

    /// Step the invader by hand (only when it is not run automatically)
    #[wasm_bindgen(js_name = advanceInvader)]
    pub fn advance_invader(&mut self) -> Result<String, JsValue> {
        events_or_error(self.game.advance_invader())
    }

    /// Check if the match is over
    #[wasm_bindgen(js_name = isFinished)]
    pub fn is_finished(&self) -> bool {
        self.game.is_over()
    }

    /// Get the outcome as JSON, `null` while the match runs
    #[wasm_bindgen(js_name = getOutcome)]
    pub fn get_outcome(&self) -> String {
        to_json(&self.game.outcome(), "null")
    }

    /// Replace the match with save JSON from the browser's storage
    #[wasm_bindgen(js_name = loadState)]
    pub fn load_state(&mut self, save_json: &str) -> Result<String, JsValue> {
        let data = SaveData::from_json(save_json).map_err(|e| JsValue::from_str(&e.to_string()))?;
        if data.map_id != self.game.config().id {
            self.game = GameManager::new(data.map_id);
        }
        events_or_error(self.game.load_save(data))
    }
}

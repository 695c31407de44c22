use std::collections::HashSet;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Camera translation speed in world units per second.
pub const MOVE_SPEED: f32 = 14.0;
/// Radians of rotation per pixel of pointer travel per second.
pub const LOOK_SENSITIVITY: f32 = 1.4;

/// Identifier for a keyboard key, independent of the windowing backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
}

impl KeyCode {
    /// Builds a character key; letters are stored upper-case.
    pub fn character(ch: char) -> Self {
        Self::Character(ch.to_ascii_uppercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Tab,
    Escape,
    LeftCtrl,
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    PageUp,
    PageDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Keys and buttons currently held, plus the last pointer position in
/// window coordinates (origin top-left).
#[derive(Debug, Default, Clone)]
pub struct InputState {
    keys: HashSet<KeyCode>,
    mouse_buttons: HashSet<MouseButton>,
    mouse_position: Vec2,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key_down(&mut self, key: KeyCode) {
        self.keys.insert(key);
    }

    pub fn set_key_up(&mut self, key: KeyCode) {
        self.keys.remove(&key);
    }

    pub fn set_mouse_button_down(&mut self, button: MouseButton) {
        self.mouse_buttons.insert(button);
    }

    pub fn set_mouse_button_up(&mut self, button: MouseButton) {
        self.mouse_buttons.remove(&button);
    }

    pub fn set_mouse_position(&mut self, position: Vec2) {
        self.mouse_position = position;
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.contains(&key)
    }

    pub fn is_mouse_button_down(&self, button: MouseButton) -> bool {
        self.mouse_buttons.contains(&button)
    }

    pub fn mouse_position(&self) -> Vec2 {
        self.mouse_position
    }

    /// Camera-local displacement for this frame from the movement keys.
    ///
    /// W/S move along -Z/+Z, A/D along -X/+X, Space and Left Ctrl along
    /// +Y/-Y. The direction is normalized so diagonals are not faster.
    pub fn displacement(&self, delta_seconds: f32) -> Vec3 {
        const BINDINGS: [(KeyCode, Vec3); 6] = [
            (KeyCode::Character('W'), Vec3::NEG_Z),
            (KeyCode::Character('S'), Vec3::Z),
            (KeyCode::Character('A'), Vec3::NEG_X),
            (KeyCode::Character('D'), Vec3::X),
            (KeyCode::Named(NamedKey::Space), Vec3::Y),
            (KeyCode::Named(NamedKey::LeftCtrl), Vec3::NEG_Y),
        ];
        let direction: Vec3 = BINDINGS
            .iter()
            .filter(|(key, _)| self.is_key_down(*key))
            .map(|(_, direction)| *direction)
            .sum();
        direction.normalize_or_zero() * MOVE_SPEED * delta_seconds
    }
}

/// Remembers the previous pointer position so per-frame deltas can be taken.
#[derive(Debug, Default, Clone)]
pub struct PointerTracker {
    previous: Option<Vec2>,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pointer travel since the last call; zero on the first call after a reset.
    pub fn delta(&mut self, position: Vec2) -> Vec2 {
        let delta = self.previous.map_or(Vec2::ZERO, |previous| position - previous);
        self.previous = Some(position);
        delta
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Yaw/pitch change for the active camera while dragging.
    ///
    /// Dragging right turns right and dragging down looks down.
    pub fn look_delta(&mut self, position: Vec2, delta_seconds: f32) -> Vec2 {
        -self.delta(position) * LOOK_SENSITIVITY * delta_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_state_tracks_keys() {
        let mut state = InputState::new();
        state.set_key_down(KeyCode::Named(NamedKey::Space));
        assert!(state.is_key_down(KeyCode::Named(NamedKey::Space)));
        state.set_key_up(KeyCode::Named(NamedKey::Space));
        assert!(!state.is_key_down(KeyCode::Named(NamedKey::Space)));
        assert_eq!(KeyCode::character('w'), KeyCode::Character('W'));
    }

    #[test]
    fn diagonal_movement_is_normalized() {
        let mut state = InputState::new();
        state.set_key_down(KeyCode::character('w'));
        state.set_key_down(KeyCode::character('d'));
        let step = state.displacement(0.5);
        assert!((step.length() - MOVE_SPEED * 0.5).abs() < 1e-4);
        assert!(step.x > 0.0 && step.z < 0.0);
    }

    #[test]
    fn opposite_keys_cancel() {
        let mut state = InputState::new();
        state.set_key_down(KeyCode::character('a'));
        state.set_key_down(KeyCode::character('d'));
        assert_eq!(state.displacement(1.0), Vec3::ZERO);
    }

    #[test]
    fn pointer_tracker_starts_from_rest() {
        let mut tracker = PointerTracker::new();
        assert_eq!(tracker.delta(Vec2::new(10.0, 10.0)), Vec2::ZERO);
        assert_eq!(tracker.delta(Vec2::new(13.0, 6.0)), Vec2::new(3.0, -4.0));
        tracker.reset();
        assert_eq!(tracker.delta(Vec2::new(100.0, 100.0)), Vec2::ZERO);
    }

    #[test]
    fn dragging_right_turns_right() {
        let mut tracker = PointerTracker::new();
        tracker.delta(Vec2::ZERO);
        let look = tracker.look_delta(Vec2::new(10.0, 0.0), 0.1);
        assert!(look.x < 0.0);
        assert_eq!(look.y, 0.0);
    }
}

//! Key codes and the actions they are bound to.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::flag::Flag;

/// Platform key code as reported by the input collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyCode(pub u16);

impl KeyCode {
    pub const UP: KeyCode = KeyCode(19);
    pub const DOWN: KeyCode = KeyCode(20);
    pub const LEFT: KeyCode = KeyCode(21);
    pub const RIGHT: KeyCode = KeyCode(22);
    pub const T: KeyCode = KeyCode(48);

    /// Looks up a key by its console name (`up`, `down`, `left`, `right`, `t`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "up" => Some(Self::UP),
            "down" => Some(Self::DOWN),
            "left" => Some(Self::LEFT),
            "right" => Some(Self::RIGHT),
            "t" | "fire" => Some(Self::T),
            _ => None,
        }
    }
}

/// The effect pair bound to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Press raises the flag, release schedules its removal.
    Flag(Flag),
    /// Press launches a projectile along the current heading; release does nothing.
    LaunchProjectile,
}

/// Default player bindings.
pub fn default_bindings() -> HashMap<KeyCode, Action> {
    HashMap::from([
        (KeyCode::UP, Action::Flag(Flag::MoveForward)),
        (KeyCode::DOWN, Action::Flag(Flag::MoveBack)),
        (KeyCode::LEFT, Action::Flag(Flag::RotateLeft)),
        (KeyCode::RIGHT, Action::Flag(Flag::RotateRight)),
        (KeyCode::T, Action::LaunchProjectile),
    ])
}

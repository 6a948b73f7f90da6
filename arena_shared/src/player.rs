//! Player-controlled characters.

use std::collections::HashMap;

use crate::{
    config::WorldBounds,
    entity::{Collidable, GameId, Impact, Movable, PlayerId},
    flag::FlagSet,
    keys::{default_bindings, Action, KeyCode},
    math::{cos_deg, sin_deg, Polygon},
};

pub const PLAYER_MOVEMENT_SPEED: f32 = 5.0;
pub const PLAYER_ROTATION_SPEED: f32 = 5.0;
pub const PLAYER_SIZE: f32 = 48.0;

/// A character driven by one client's key edges.
#[derive(Debug, Clone)]
pub struct Player {
    game_id: GameId,
    player_id: PlayerId,
    /// Position and heading live in the collision shape so the two never drift.
    body: Polygon,
    bindings: HashMap<KeyCode, Action>,
    flags: FlagSet,
    bounds: WorldBounds,
    hits_taken: u32,
    last_hit_by: Option<PlayerId>,
}

impl Player {
    pub fn new(game_id: GameId, player_id: PlayerId, bounds: WorldBounds) -> Self {
        Self {
            game_id,
            player_id,
            body: Polygon::rect(PLAYER_SIZE, PLAYER_SIZE),
            bindings: default_bindings(),
            flags: FlagSet::new(),
            bounds,
            hits_taken: 0,
            last_hit_by: None,
        }
    }

    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    pub fn hits_taken(&self) -> u32 {
        self.hits_taken
    }

    pub fn last_hit_by(&self) -> Option<PlayerId> {
        self.last_hit_by
    }

    pub fn is_bound(&self, key: KeyCode) -> bool {
        self.bindings.contains_key(&key)
    }

    /// Applies the press half of the key's binding. Unbound keys yield `None`.
    ///
    /// `Action::LaunchProjectile` is returned for the world to carry out.
    pub fn key_pressed(&mut self, key: KeyCode) -> Option<Action> {
        let action = *self.bindings.get(&key)?;
        if let Action::Flag(flag) = action {
            self.flags.press(flag);
        }
        Some(action)
    }

    /// Applies the release half of the key's binding.
    pub fn key_unpressed(&mut self, key: KeyCode) -> Option<Action> {
        let action = *self.bindings.get(&key)?;
        if let Action::Flag(flag) = action {
            self.flags.release(flag);
        }
        Some(action)
    }

    pub fn process_flags(&mut self) {
        let mut flags = std::mem::take(&mut self.flags);
        flags.process(self);
        self.flags = flags;
    }

    fn step(&self, direction: f32) -> (f32, f32) {
        let angle = self.rotation();
        let vx = direction * PLAYER_MOVEMENT_SPEED * cos_deg(angle);
        let vy = direction * PLAYER_MOVEMENT_SPEED * sin_deg(angle);
        (
            clamp_axis(vx, self.x(), self.bounds.half_width, self.bounds.margin),
            clamp_axis(vy, self.y(), self.bounds.half_height, self.bounds.margin),
        )
    }
}

/// Zeroes the velocity when it would push further past a boundary.
fn clamp_axis(velocity: f32, coordinate: f32, half: f32, margin: f32) -> f32 {
    if velocity < 0.0 && coordinate <= -half {
        0.0
    } else if velocity > 0.0 && coordinate >= half - margin {
        0.0
    } else {
        velocity
    }
}

impl Movable for Player {
    fn x(&self) -> f32 {
        self.body.position().x
    }

    fn y(&self) -> f32 {
        self.body.position().y
    }

    fn set_x(&mut self, x: f32) {
        let y = self.y();
        self.body.set_position(x, y);
    }

    fn set_y(&mut self, y: f32) {
        let x = self.x();
        self.body.set_position(x, y);
    }

    fn rotation(&self) -> f32 {
        self.body.rotation()
    }

    fn set_rotation(&mut self, degrees: f32) {
        self.body.set_rotation(degrees);
    }

    fn rotate_left(&mut self) {
        self.body.rotate(PLAYER_ROTATION_SPEED);
    }

    fn rotate_right(&mut self) {
        self.body.rotate(-PLAYER_ROTATION_SPEED);
    }

    fn move_forward(&mut self) {
        let (dx, dy) = self.step(1.0);
        self.body.translate(dx, dy);
    }

    fn move_back(&mut self) {
        let (dx, dy) = self.step(-1.0);
        self.body.translate(dx, dy);
    }
}

impl Collidable for Player {
    fn polygon(&self) -> &Polygon {
        &self.body
    }

    fn collide(&mut self, impact: &Impact) {
        self.hits_taken += 1;
        self.last_hit_by = Some(impact.source);
    }
}

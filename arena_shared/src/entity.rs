//! Entity capabilities.
//!
//! Players and projectiles are a closed set of entity kinds. What they can
//! do is expressed by the capability traits here rather than a type
//! hierarchy: the flag system drives anything `Movable`, and the collision
//! engine tests anything `Collidable`.

use serde::{Deserialize, Serialize};

use crate::math::Polygon;

/// Unique player id, assigned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

/// Id of the game instance a player belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameId(pub u32);

/// Locally assigned projectile id. Projectiles are never replicated by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectileId(pub u64);

/// Non-owning reference to any entity in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityRef {
    Player(PlayerId),
    Projectile(ProjectileId),
}

/// Something with a position and heading that flags can drive.
pub trait Movable {
    fn x(&self) -> f32;
    fn y(&self) -> f32;
    fn set_x(&mut self, x: f32);
    fn set_y(&mut self, y: f32);
    fn rotation(&self) -> f32;
    fn set_rotation(&mut self, degrees: f32);

    fn rotate_left(&mut self);
    fn rotate_right(&mut self);
    fn move_forward(&mut self);
    fn move_back(&mut self);
}

/// What a collidable learns about the projectile that hit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Impact {
    pub projectile: ProjectileId,
    pub source: PlayerId,
}

/// Something projectiles can hit.
pub trait Collidable {
    /// Convex collision shape in world space.
    fn polygon(&self) -> &Polygon;

    fn collide(&mut self, impact: &Impact);
}

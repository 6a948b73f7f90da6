//! `arena_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - One writer per world: packets and ticks both take `&mut World`.
//! - Capabilities (`Movable`, `Collidable`) as traits over a closed set of entities.
//! - Server-authoritative packets cannot be built by client code.
//! - No `unsafe`.

pub mod config;
pub mod entity;
pub mod error;
pub mod flag;
pub mod keys;
pub mod math;
pub mod net;
pub mod packet;
pub mod player;
pub mod projectile;
pub mod world;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::entity::*;
    pub use crate::error::{ArenaError, Channel};
    pub use crate::flag::*;
    pub use crate::keys::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::packet::*;
    pub use crate::player::*;
    pub use crate::projectile::*;
    pub use crate::world::*;
}

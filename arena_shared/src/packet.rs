//! Packet taxonomy.
//!
//! `IncomingPacket` is everything the server sends to a client,
//! `OutgoingPacket` everything a client sends to the server. Each incoming
//! packet kind has exactly one [`Process`] implementation, which is the only
//! way that packet touches the world.
//!
//! Server-authoritative packets keep their fields private and have no
//! public constructor. Outside this crate the only way to get one is to
//! decode it off the wire; the server writes the same JSON shape from its
//! own serializable types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    entity::{GameId, Movable, PlayerId},
    error::Channel,
    keys::KeyCode,
    world::World,
};

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Fixed cadence of `GameState` broadcasts.
pub const GAME_STATE_INTERVAL: Duration = Duration::from_millis(100);

/// Mutation of local state driven by one incoming packet.
pub trait Process {
    fn process(&self, world: &mut World);
}

/// Server → client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum IncomingPacket {
    Login(LoginPacket),
    DrawNewPlayer(DrawNewPlayerPacket),
    GameState(GameStatePacket),
    KeyPressedResponse(KeyPressedResponsePacket),
    KeyUnpressedResponse(KeyUnpressedResponsePacket),
    Disconnect { reason: String },
}

impl IncomingPacket {
    pub fn channel(&self) -> Channel {
        match self {
            IncomingPacket::Login(_)
            | IncomingPacket::DrawNewPlayer(_)
            | IncomingPacket::Disconnect { .. } => Channel::Reliable,
            IncomingPacket::GameState(_)
            | IncomingPacket::KeyPressedResponse(_)
            | IncomingPacket::KeyUnpressedResponse(_) => Channel::Unreliable,
        }
    }

    pub fn process(&self, world: &mut World) {
        match self {
            IncomingPacket::Login(p) => p.process(world),
            IncomingPacket::DrawNewPlayer(p) => p.process(world),
            IncomingPacket::GameState(p) => p.process(world),
            IncomingPacket::KeyPressedResponse(p) => p.process(world),
            IncomingPacket::KeyUnpressedResponse(p) => p.process(world),
            IncomingPacket::Disconnect { .. } => {}
        }
    }
}

/// Client → server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum OutgoingPacket {
    Hello { protocol: u32 },
    /// Client announces its UDP port to the server.
    UdpHello { client_udp_port: u16 },
    KeyPressed(KeyPressedPacket),
    KeyUnpressed(KeyUnpressedPacket),
}

impl OutgoingPacket {
    pub fn channel(&self) -> Channel {
        match self {
            OutgoingPacket::Hello { .. } | OutgoingPacket::UdpHello { .. } => Channel::Reliable,
            // A lost edge is superseded by the next game state.
            OutgoingPacket::KeyPressed(_) | OutgoingPacket::KeyUnpressed(_) => {
                Channel::Unreliable
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerLocation {
    pub player_id: PlayerId,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerRotation {
    pub player_id: PlayerId,
    pub angle: f32,
}

/// Establishes the local identity and every player already in the game.
///
/// ```compile_fail
/// use arena_shared::entity::{GameId, PlayerId};
/// use arena_shared::packet::LoginPacket;
///
/// let _ = LoginPacket::new(GameId(1), PlayerId(1), vec![]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginPacket {
    game_id: GameId,
    player_id: PlayerId,
    players: Vec<PlayerLocation>,
}

impl LoginPacket {
    #[cfg(test)]
    pub(crate) fn new(game_id: GameId, player_id: PlayerId, players: Vec<PlayerLocation>) -> Self {
        Self {
            game_id,
            player_id,
            players,
        }
    }

    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    /// The player this client controls.
    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn players(&self) -> &[PlayerLocation] {
        &self.players
    }
}

impl Process for LoginPacket {
    fn process(&self, world: &mut World) {
        for location in &self.players {
            world.spawn_player(self.game_id, location.player_id, location.x, location.y);
        }
        world.player_or_spawn(self.game_id, self.player_id);
    }
}

/// Announces one player joining after us.
///
/// ```compile_fail
/// use arena_shared::entity::{GameId, PlayerId};
/// use arena_shared::packet::DrawNewPlayerPacket;
///
/// let _ = DrawNewPlayerPacket::new(GameId(1), PlayerId(2), 0.0, 0.0, 0.0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrawNewPlayerPacket {
    game_id: GameId,
    player_id: PlayerId,
    x: f32,
    y: f32,
    rotation: f32,
}

impl DrawNewPlayerPacket {
    #[cfg(test)]
    pub(crate) fn new(game_id: GameId, player_id: PlayerId, x: f32, y: f32, rotation: f32) -> Self {
        Self {
            game_id,
            player_id,
            x,
            y,
            rotation,
        }
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }
}

impl Process for DrawNewPlayerPacket {
    fn process(&self, world: &mut World) {
        world
            .spawn_player(self.game_id, self.player_id, self.x, self.y)
            .set_rotation(self.rotation);
    }
}

/// Authoritative positions and headings. Always overrides local state.
///
/// ```compile_fail
/// use arena_shared::packet::GameStatePacket;
///
/// let _ = GameStatePacket::new(vec![], vec![]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameStatePacket {
    locations: Vec<PlayerLocation>,
    rotations: Vec<PlayerRotation>,
}

impl GameStatePacket {
    #[cfg(test)]
    pub(crate) fn new(locations: Vec<PlayerLocation>, rotations: Vec<PlayerRotation>) -> Self {
        Self {
            locations,
            rotations,
        }
    }

    pub fn locations(&self) -> &[PlayerLocation] {
        &self.locations
    }

    pub fn rotations(&self) -> &[PlayerRotation] {
        &self.rotations
    }
}

impl Process for GameStatePacket {
    /// Applies tuples in packet order. Tuples naming an unknown player are
    /// dropped; the rest of the packet still applies.
    fn process(&self, world: &mut World) {
        for location in &self.locations {
            match world.player_mut(location.player_id) {
                Some(player) => {
                    player.set_x(location.x);
                    player.set_y(location.y);
                }
                None => {
                    warn!(player_id = ?location.player_id, "Game state names unknown player, dropping location")
                }
            }
        }
        for rotation in &self.rotations {
            match world.player_mut(rotation.player_id) {
                Some(player) => player.set_rotation(rotation.angle),
                None => {
                    warn!(player_id = ?rotation.player_id, "Game state names unknown player, dropping rotation")
                }
            }
        }
    }
}

macro_rules! key_response {
    ($(#[$doc:meta])* $name:ident, $apply:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
        pub struct $name {
            game_id: GameId,
            player_id: PlayerId,
            key: KeyCode,
        }

        impl $name {
            #[cfg(test)]
            pub(crate) fn new(game_id: GameId, player_id: PlayerId, key: KeyCode) -> Self {
                Self {
                    game_id,
                    player_id,
                    key,
                }
            }

            pub fn player_id(&self) -> PlayerId {
                self.player_id
            }

            pub fn key(&self) -> KeyCode {
                self.key
            }
        }

        impl Process for $name {
            /// A key edge for an unseen player creates that player first.
            fn process(&self, world: &mut World) {
                world.player_or_spawn(self.game_id, self.player_id);
                world.$apply(self.player_id, self.key);
            }
        }
    };
}

key_response!(
    /// The server's echo of a player's key going down.
    ///
    /// ```compile_fail
    /// use arena_shared::entity::{GameId, PlayerId};
    /// use arena_shared::keys::KeyCode;
    /// use arena_shared::packet::KeyPressedResponsePacket;
    ///
    /// let _ = KeyPressedResponsePacket::new(GameId(1), PlayerId(1), KeyCode::UP);
    /// ```
    KeyPressedResponsePacket,
    key_pressed
);

key_response!(
    /// The server's echo of a player's key going up.
    ///
    /// ```compile_fail
    /// use arena_shared::entity::{GameId, PlayerId};
    /// use arena_shared::keys::KeyCode;
    /// use arena_shared::packet::KeyUnpressedResponsePacket;
    ///
    /// let _ = KeyUnpressedResponsePacket::new(GameId(1), PlayerId(1), KeyCode::UP);
    /// ```
    KeyUnpressedResponsePacket,
    key_unpressed
);

/// Reports a key going down on the client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct KeyPressedPacket {
    pub game_id: GameId,
    pub player_id: PlayerId,
    pub key: KeyCode,
}

/// Reports a key going up on the client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct KeyUnpressedPacket {
    pub game_id: GameId,
    pub player_id: PlayerId,
    pub key: KeyCode,
}

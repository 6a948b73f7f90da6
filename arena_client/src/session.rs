//! Client session.
//!
//! The session owns the local `World` and is its only writer. Network tasks
//! never touch entity state; they push decoded packets into the inbox and
//! [`Session::tick`] applies them on the simulation side before running
//! flags and collisions.

use std::time::Instant;

use arena_shared::{
    config::WorldBounds,
    entity::{GameId, PlayerId},
    error::{ArenaError, Result},
    keys::KeyCode,
    packet::{IncomingPacket, KeyPressedPacket, KeyUnpressedPacket, OutgoingPacket},
    world::{Removal, World},
};
use tokio::{
    sync::mpsc::{self, error::TryRecvError},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::dispatcher::PacketDispatcher;

/// Session connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake sent, waiting for Login.
    Connecting,
    /// Identity and initial players known, no game state yet.
    LoggedIn,
    /// Receiving periodic game state.
    Synced,
    /// Transport failed or the server said goodbye.
    Disconnected,
}

/// What the network tasks hand to the simulation side.
#[derive(Debug)]
pub enum Inbound {
    Packet(IncomingPacket),
    Failed(ArenaError),
}

/// Who this client plays as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub game_id: GameId,
    pub player_id: PlayerId,
}

pub struct Session<D: PacketDispatcher> {
    state: SessionState,
    world: World,
    identity: Option<Identity>,
    dispatcher: D,
    inbox: mpsc::Receiver<Inbound>,
    tasks: Vec<JoinHandle<()>>,
    ticks: u64,
}

impl<D: PacketDispatcher> Session<D> {
    pub fn new(dispatcher: D, inbox: mpsc::Receiver<Inbound>, bounds: WorldBounds) -> Self {
        Self {
            state: SessionState::Connecting,
            world: World::new(bounds),
            identity: None,
            dispatcher,
            inbox,
            tasks: Vec::new(),
            ticks: 0,
        }
    }

    /// Ties a background task's lifetime to the session.
    pub fn attach_task(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn identity(&self) -> Option<Identity> {
        self.identity
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Applies one incoming packet and advances the connection state.
    pub fn apply(&mut self, packet: IncomingPacket) -> Result<()> {
        if self.state == SessionState::Disconnected {
            return Err(ArenaError::Disconnected("session already closed".into()));
        }
        packet.process(&mut self.world);

        match &packet {
            IncomingPacket::Login(login) => {
                let identity = Identity {
                    game_id: login.game_id(),
                    player_id: login.player_id(),
                };
                info!(game_id = ?identity.game_id, player_id = ?identity.player_id, players = login.players().len(), "Logged in");
                self.identity = Some(identity);
                if self.state == SessionState::Connecting {
                    self.state = SessionState::LoggedIn;
                }
            }
            IncomingPacket::GameState(_) if self.state == SessionState::LoggedIn => {
                debug!("First game state received");
                self.state = SessionState::Synced;
            }
            IncomingPacket::Disconnect { reason } => {
                info!(%reason, "Disconnected by server");
                self.state = SessionState::Disconnected;
                return Err(ArenaError::Disconnected(reason.clone()));
            }
            _ => {}
        }
        Ok(())
    }

    /// Applies everything the network tasks have queued so far.
    pub fn drain_inbox(&mut self) -> Result<usize> {
        let mut applied = 0;
        loop {
            match self.inbox.try_recv() {
                Ok(Inbound::Packet(packet)) => {
                    self.apply(packet)?;
                    applied += 1;
                }
                Ok(Inbound::Failed(err)) if !err.is_fatal() => {
                    warn!(error = %err, "Dropping undecodable packet");
                }
                Ok(Inbound::Failed(err)) => return Err(self.fail(err)),
                Err(TryRecvError::Empty) => return Ok(applied),
                Err(TryRecvError::Disconnected) => {
                    return Err(self.fail(ArenaError::Disconnected(
                        "network tasks stopped".into(),
                    )))
                }
            }
        }
    }

    /// One simulation tick: drain the inbox, then run flags and collisions.
    pub fn tick(&mut self, now: Instant) -> Result<Vec<Removal>> {
        if self.state == SessionState::Disconnected {
            return Err(ArenaError::Disconnected("session already closed".into()));
        }
        self.drain_inbox()?;
        self.ticks += 1;
        Ok(self.world.tick(now))
    }

    /// Reports a key going down. Returns whether a packet was sent.
    ///
    /// Nothing changes locally; the server's echo raises the flag.
    pub async fn key_pressed(&mut self, key: KeyCode) -> Result<bool> {
        let Some(identity) = self.bound_identity(key) else {
            return Ok(false);
        };
        let packet = OutgoingPacket::KeyPressed(KeyPressedPacket {
            game_id: identity.game_id,
            player_id: identity.player_id,
            key,
        });
        self.dispatch(&packet).await?;
        Ok(true)
    }

    /// Reports a key going up. Returns whether a packet was sent.
    pub async fn key_unpressed(&mut self, key: KeyCode) -> Result<bool> {
        let Some(identity) = self.bound_identity(key) else {
            return Ok(false);
        };
        let packet = OutgoingPacket::KeyUnpressed(KeyUnpressedPacket {
            game_id: identity.game_id,
            player_id: identity.player_id,
            key,
        });
        self.dispatch(&packet).await?;
        Ok(true)
    }

    /// Identity, if logged in and `key` is bound for the local player.
    fn bound_identity(&self, key: KeyCode) -> Option<Identity> {
        let identity = self.identity?;
        let player = self.world.player(identity.player_id)?;
        if !player.is_bound(key) {
            debug!(?key, "Unbound key ignored");
            return None;
        }
        Some(identity)
    }

    async fn dispatch(&mut self, packet: &OutgoingPacket) -> Result<()> {
        if self.state == SessionState::Disconnected {
            return Err(ArenaError::Disconnected("session already closed".into()));
        }
        if let Err(err) = self.dispatcher.send(packet).await {
            return Err(self.fail(err));
        }
        Ok(())
    }

    fn fail(&mut self, err: ArenaError) -> ArenaError {
        warn!(error = %err, "Session lost");
        self.state = SessionState::Disconnected;
        err
    }
}

impl<D: PacketDispatcher> Drop for Session<D> {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use arena_shared::{
        entity::Movable, error::Channel, flag::Flag, player::PLAYER_MOVEMENT_SPEED,
    };
    use serde_json::json;

    use super::*;
    use crate::dispatcher::RecordingDispatcher;

    const GAME: GameId = GameId(1);
    const ME: PlayerId = PlayerId(1);

    fn session() -> (Session<RecordingDispatcher>, mpsc::Sender<Inbound>) {
        let (tx, rx) = mpsc::channel(16);
        (
            Session::new(RecordingDispatcher::default(), rx, WorldBounds::default()),
            tx,
        )
    }

    /// Server packets only exist on the client as decoded JSON.
    fn wire(value: serde_json::Value) -> IncomingPacket {
        serde_json::from_value(value).unwrap()
    }

    fn login() -> IncomingPacket {
        wire(json!({ "Login": {
            "game_id": GAME.0,
            "player_id": ME.0,
            "players": [
                { "player_id": ME.0, "x": 0.0, "y": 0.0 },
                { "player_id": 2, "x": 10.0, "y": 10.0 },
            ],
        }}))
    }

    fn echo(kind: &str, key: KeyCode) -> IncomingPacket {
        wire(json!({ kind: { "game_id": GAME.0, "player_id": ME.0, "key": key.0 } }))
    }

    #[test]
    fn login_then_state_reaches_synced() {
        let (mut s, _tx) = session();
        assert_eq!(s.state(), SessionState::Connecting);
        s.apply(login()).unwrap();
        assert_eq!(s.state(), SessionState::LoggedIn);
        assert_eq!(s.identity().unwrap().player_id, ME);
        assert_eq!(s.world().player_count(), 2);

        s.apply(wire(json!({ "GameState": {
            "locations": [],
            "rotations": [{ "player_id": 2, "angle": 90.0 }],
        }})))
        .unwrap();
        assert_eq!(s.state(), SessionState::Synced);
        assert_eq!(s.world().player(PlayerId(2)).unwrap().rotation(), 90.0);
    }

    #[test]
    fn inbox_is_applied_on_tick() {
        let (mut s, tx) = session();
        tx.try_send(Inbound::Packet(login())).unwrap();
        assert_eq!(s.world().player_count(), 0);
        s.tick(Instant::now()).unwrap();
        assert_eq!(s.world().player_count(), 2);
        assert_eq!(s.ticks(), 1);
    }

    #[test]
    fn echoed_edges_drive_flags_with_one_tick_lag() {
        let (mut s, tx) = session();
        s.apply(login()).unwrap();
        let now = Instant::now();

        tx.try_send(Inbound::Packet(echo("KeyPressedResponse", KeyCode::UP)))
            .unwrap();
        s.tick(now).unwrap();
        tx.try_send(Inbound::Packet(echo("KeyUnpressedResponse", KeyCode::UP)))
            .unwrap();
        s.tick(now).unwrap();
        s.tick(now).unwrap();

        let me = s.world().player(ME).unwrap();
        assert!((me.x() - 2.0 * PLAYER_MOVEMENT_SPEED).abs() < 1e-4);
        assert!(!me.flags().is_active(Flag::MoveForward));
    }

    #[test]
    fn fatal_failure_disconnects() {
        let (mut s, tx) = session();
        s.apply(login()).unwrap();
        tx.try_send(Inbound::Failed(ArenaError::transport(
            Channel::Reliable,
            std::io::ErrorKind::ConnectionReset.into(),
        )))
        .unwrap();
        let err = s.tick(Instant::now()).unwrap_err();
        assert!(matches!(err, ArenaError::Transport { .. }));
        assert_eq!(s.state(), SessionState::Disconnected);
        assert!(s.tick(Instant::now()).is_err());
    }

    #[test]
    fn dropped_network_tasks_disconnect() {
        let (mut s, tx) = session();
        drop(tx);
        assert!(s.tick(Instant::now()).is_err());
        assert_eq!(s.state(), SessionState::Disconnected);
    }

    #[test]
    fn projectile_lifetime_through_session() {
        let (mut s, _tx) = session();
        s.apply(login()).unwrap();
        s.apply(echo("KeyPressedResponse", KeyCode::T)).unwrap();
        let t0 = s.world().now();
        assert_eq!(s.world().projectile_count(), 1);
        s.tick(t0 + Duration::from_millis(2900)).unwrap();
        assert_eq!(s.world().projectile_count(), 1);
        s.tick(t0 + Duration::from_millis(3100)).unwrap();
        assert_eq!(s.world().projectile_count(), 0);
    }

    #[tokio::test]
    async fn key_edges_go_out_unreliable() {
        let (mut s, _tx) = session();
        assert!(!s.key_pressed(KeyCode::UP).await.unwrap());

        s.apply(login()).unwrap();
        assert!(s.key_pressed(KeyCode::UP).await.unwrap());
        assert!(s.key_unpressed(KeyCode::UP).await.unwrap());

        let sent = &s.dispatcher().sent;
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(ch, _)| *ch == Channel::Unreliable));
        assert_eq!(
            sent[0].1,
            OutgoingPacket::KeyPressed(KeyPressedPacket {
                game_id: GAME,
                player_id: ME,
                key: KeyCode::UP,
            })
        );
        // Pressing only reports; the flag waits for the server's echo.
        assert!(s.world().player(ME).unwrap().flags().is_empty());
    }

    #[tokio::test]
    async fn unbound_key_sends_nothing() {
        let (mut s, _tx) = session();
        s.apply(login()).unwrap();
        assert!(!s.key_pressed(KeyCode(500)).await.unwrap());
        assert!(s.dispatcher().sent.is_empty());
    }

    #[tokio::test]
    async fn send_failure_is_surfaced() {
        let (tx_unused, rx) = mpsc::channel(1);
        let dispatcher = RecordingDispatcher {
            fail_with: Some(std::io::ErrorKind::BrokenPipe),
            ..Default::default()
        };
        let mut s = Session::new(dispatcher, rx, WorldBounds::default());
        s.apply(login()).unwrap();
        let err = s.key_pressed(KeyCode::LEFT).await.unwrap_err();
        assert!(matches!(
            err,
            ArenaError::Transport {
                channel: Channel::Unreliable,
                ..
            }
        ));
        assert_eq!(s.state(), SessionState::Disconnected);
        drop(tx_unused);
    }
}

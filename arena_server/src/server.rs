//! Server implementation.
//!
//! Authoritative arena loop. It supports:
//! - Hello/UdpHello handshake, Login for the newcomer and DrawNewPlayer for
//!   everyone already connected (reliable)
//! - Key edges from clients, applied to the server's own world and echoed
//!   to every client (unreliable)
//! - Fixed-timestep simulation of flags, projectiles and collisions
//! - A `GameState` broadcast on a fixed `GAME_STATE_INTERVAL` grid (unreliable)
//!
//! Notes:
//! - Handshakes run in their own tasks; the loop only finishes logins whose
//!   Hello/UdpHello already arrived.
//! - Key edges are accepted only from the UDP address the player registered
//!   in its handshake.
//! - Iteration over players uses ascending ids so broadcasts are stable.

use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::{Duration, Instant},
};

use anyhow::Context;
use arena_shared::{
    config::ArenaConfig,
    entity::{GameId, Movable, PlayerId},
    net::{encode_to_bytes, ReliableConn, ReliableListener},
    packet::{OutgoingPacket, PlayerLocation, PlayerRotation, GAME_STATE_INTERVAL, PROTOCOL_VERSION},
    world::World,
};
use rand::Rng;
use tokio::{net::UdpSocket, sync::mpsc};
use tracing::{debug, info, warn};

use crate::wire::ServerPacket;

/// Upper bound on a client's Hello + UdpHello.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest datagram the server reads.
const MAX_DATAGRAM: usize = 64 * 1024;

/// Completed handshakes waiting for the loop to log them in.
const PENDING_LOGINS: usize = 16;

/// Connected client state.
struct ClientSlot {
    reliable: ReliableConn,
    udp_peer: SocketAddr,
    edges_received: u64,
}

/// A client that finished Hello/UdpHello.
struct Handshake {
    conn: ReliableConn,
    peer: SocketAddr,
    client_udp_port: u16,
}

/// Game server.
pub struct GameServer {
    pub cfg: ArenaConfig,
    game_id: GameId,
    world: World,
    clients: HashMap<PlayerId, ClientSlot>,

    tcp: ReliableListener,
    udp: UdpSocket,
    recv_buf: Vec<u8>,

    handshake_tx: mpsc::Sender<Handshake>,
    handshakes: mpsc::Receiver<Handshake>,

    tick: u64,
    next_player_id: u32,
    next_game_state: Option<Instant>,
}

impl GameServer {
    /// Binds TCP and UDP on `cfg.server_addr`.
    pub async fn new(cfg: ArenaConfig) -> anyhow::Result<Self> {
        cfg.validate()?;
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let tcp = ReliableListener::bind(addr).await?;
        let udp = UdpSocket::bind(addr).await.context("udp bind")?;
        Ok(Self::from_parts(cfg, tcp, udp))
    }

    fn from_parts(cfg: ArenaConfig, tcp: ReliableListener, udp: UdpSocket) -> Self {
        let (handshake_tx, handshakes) = mpsc::channel(PENDING_LOGINS);
        Self {
            game_id: GameId(cfg.game_id),
            world: World::new(cfg.world_bounds()),
            cfg,
            clients: HashMap::new(),
            tcp,
            udp,
            recv_buf: vec![0u8; MAX_DATAGRAM],
            handshake_tx,
            handshakes,
            tick: 0,
            next_player_id: 1,
            next_game_state: None,
        }
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.tcp.local_addr()?)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Accepts exactly one client (handshake + login), waiting for it.
    pub async fn accept_one(&mut self) -> anyhow::Result<PlayerId> {
        let (conn, peer) = self.tcp.accept().await?;
        let handshake = tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(conn, peer))
            .await
            .context("handshake timed out")??;
        self.finish_login(handshake).await
    }

    /// Polls for new connections without blocking the loop.
    ///
    /// A connection accepted here handshakes in its own task. Returns the
    /// players whose handshake completed since the last call.
    pub async fn try_accept(&mut self, timeout: Duration) -> anyhow::Result<Vec<PlayerId>> {
        match tokio::time::timeout(timeout, self.tcp.accept()).await {
            Ok(Ok((conn, peer))) => self.spawn_handshake(conn, peer),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {}
        }

        let mut joined = Vec::new();
        while let Ok(handshake) = self.handshakes.try_recv() {
            let peer = handshake.peer;
            match self.finish_login(handshake).await {
                Ok(id) => joined.push(id),
                Err(e) => warn!(%peer, error = %e, "Login failed"),
            }
        }
        Ok(joined)
    }

    fn spawn_handshake(&self, conn: ReliableConn, peer: SocketAddr) {
        let tx = self.handshake_tx.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(conn, peer)).await {
                Ok(Ok(done)) => {
                    let _ = tx.send(done).await;
                }
                Ok(Err(e)) => warn!(%peer, error = %e, "Handshake failed"),
                Err(_) => warn!(%peer, "Handshake timed out"),
            }
        });
    }

    /// Logs a handshaken client in. The player joins the world only once
    /// its Login went out.
    async fn finish_login(&mut self, handshake: Handshake) -> anyhow::Result<PlayerId> {
        let Handshake {
            mut conn,
            peer,
            client_udp_port,
        } = handshake;

        let player_id = PlayerId(self.next_player_id);
        self.next_player_id += 1;

        let (x, y) = self.spawn_point();
        let mut players = self.locations();
        players.push(PlayerLocation { player_id, x, y });
        conn.send(&ServerPacket::Login {
            game_id: self.game_id,
            player_id,
            players,
        })
        .await?;

        let rotation = self
            .world
            .spawn_player(self.game_id, player_id, x, y)
            .rotation();
        self.broadcast_reliable(&ServerPacket::DrawNewPlayer {
            game_id: self.game_id,
            player_id,
            x,
            y,
            rotation,
        })
        .await;

        let udp_peer = SocketAddr::new(peer.ip(), client_udp_port);
        self.clients.insert(
            player_id,
            ClientSlot {
                reliable: conn,
                udp_peer,
                edges_received: 0,
            },
        );

        info!(player_id = ?player_id, %udp_peer, x, y, "Client logged in");
        Ok(player_id)
    }

    fn spawn_point(&self) -> (f32, f32) {
        let b = self.world.bounds();
        let mut rng = rand::thread_rng();
        let x_max = (b.half_width - b.margin).max(-b.half_width + 1.0);
        let y_max = (b.half_height - b.margin).max(-b.half_height + 1.0);
        (
            rng.gen_range(-b.half_width..x_max),
            rng.gen_range(-b.half_height..y_max),
        )
    }

    /// Drops a client and its player.
    pub fn disconnect(&mut self, player_id: PlayerId) {
        if self.clients.remove(&player_id).is_some() {
            self.world.remove_player(player_id);
            info!(player_id = ?player_id, "Client disconnected");
        }
    }

    /// Runs the server for a number of ticks.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = self.cfg.tick_interval();
        let mut next = tokio::time::Instant::now();

        for _ in 0..ticks {
            next += dt;
            self.step(Instant::now()).await?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// Executes one fixed simulation step.
    pub async fn step(&mut self, now: Instant) -> anyhow::Result<()> {
        self.recv_edges().await?;
        let removed = self.world.tick(now);
        if !removed.is_empty() {
            debug!(?removed, "Projectiles removed");
        }
        if self.take_game_state_slot(now) {
            self.broadcast_unreliable(&self.game_state()).await?;
        }
        self.tick += 1;
        Ok(())
    }

    /// Claims the broadcast slot covering `now`, if one is open.
    ///
    /// Slots sit on a fixed grid anchored at the first step. Slots missed
    /// during a stall are skipped, never sent back to back.
    fn take_game_state_slot(&mut self, now: Instant) -> bool {
        let due = self.next_game_state.unwrap_or(now);
        if now < due {
            return false;
        }
        let mut next = due + GAME_STATE_INTERVAL;
        while next <= now {
            next += GAME_STATE_INTERVAL;
        }
        self.next_game_state = Some(next);
        true
    }

    /// Snapshot of every player's position and heading.
    pub fn game_state(&self) -> ServerPacket {
        let rotations = self
            .world
            .player_ids()
            .into_iter()
            .filter_map(|id| self.world.player(id))
            .map(|p| PlayerRotation {
                player_id: p.player_id(),
                angle: p.rotation(),
            })
            .collect();
        ServerPacket::GameState {
            locations: self.locations(),
            rotations,
        }
    }

    fn locations(&self) -> Vec<PlayerLocation> {
        self.world
            .player_ids()
            .into_iter()
            .filter_map(|id| self.world.player(id))
            .map(|p| PlayerLocation {
                player_id: p.player_id(),
                x: p.x(),
                y: p.y(),
            })
            .collect()
    }

    async fn recv_edges(&mut self) -> anyhow::Result<()> {
        let mut echoes = Vec::new();
        loop {
            match self.udp.try_recv_from(&mut self.recv_buf) {
                Ok((n, from)) => {
                    let decoded = serde_json::from_slice::<OutgoingPacket>(&self.recv_buf[..n]);
                    match decoded {
                        Ok(packet) => echoes.extend(self.on_edge(from, packet)),
                        Err(e) => debug!(%from, error = %e, "Undecodable datagram"),
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                // ICMP errors from earlier sends to a vanished client surface here.
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e).context("udp recv"),
            }
        }
        for echo in echoes {
            self.broadcast_unreliable(&echo).await?;
        }
        Ok(())
    }

    /// Validates and applies a key edge. Returns the echo to broadcast.
    fn on_edge(&mut self, from: SocketAddr, packet: OutgoingPacket) -> Option<ServerPacket> {
        let (game_id, player_id, key, pressed) = match packet {
            OutgoingPacket::KeyPressed(p) => (p.game_id, p.player_id, p.key, true),
            OutgoingPacket::KeyUnpressed(p) => (p.game_id, p.player_id, p.key, false),
            other => {
                debug!(?other, "Unexpected UDP message");
                return None;
            }
        };

        let Some(slot) = self.clients.get_mut(&player_id) else {
            debug!(player_id = ?player_id, %from, "Edge for unknown player");
            return None;
        };
        if game_id != self.game_id || slot.udp_peer != from {
            warn!(player_id = ?player_id, %from, "Rejected edge from wrong game or address");
            return None;
        }
        slot.edges_received += 1;

        if pressed {
            self.world.key_pressed(player_id, key)?;
            Some(ServerPacket::KeyPressedResponse {
                game_id,
                player_id,
                key,
            })
        } else {
            self.world.key_unpressed(player_id, key)?;
            Some(ServerPacket::KeyUnpressedResponse {
                game_id,
                player_id,
                key,
            })
        }
    }

    /// Fire-and-forget to every client's UDP address.
    async fn broadcast_unreliable(&self, packet: &ServerPacket) -> anyhow::Result<()> {
        let payload = encode_to_bytes(packet).context("serialize broadcast")?;
        for (id, c) in &self.clients {
            if let Err(e) = self.udp.send_to(&payload, c.udp_peer).await {
                debug!(player_id = ?id, error = %e, "UDP send failed");
            }
        }
        Ok(())
    }

    /// Sends to every connected client; clients whose stream fails are dropped.
    async fn broadcast_reliable(&mut self, packet: &ServerPacket) {
        let mut failed = Vec::new();
        for (id, c) in self.clients.iter_mut() {
            if let Err(e) = c.reliable.send(packet).await {
                warn!(player_id = ?id, error = %e, "Reliable send failed");
                failed.push(*id);
            }
        }
        for id in failed {
            self.disconnect(id);
        }
    }

    /// Key edges accepted from a player so far.
    pub fn edges_received(&self, player_id: PlayerId) -> Option<u64> {
        self.clients.get(&player_id).map(|c| c.edges_received)
    }
}

/// Reads Hello and UdpHello. A protocol mismatch is answered with Disconnect.
async fn handshake(mut conn: ReliableConn, peer: SocketAddr) -> anyhow::Result<Handshake> {
    match conn.recv::<OutgoingPacket>().await? {
        OutgoingPacket::Hello { protocol } if protocol == PROTOCOL_VERSION => {}
        OutgoingPacket::Hello { protocol } => {
            let reason = format!("protocol {protocol} unsupported, server speaks {PROTOCOL_VERSION}");
            let _ = conn
                .send(&ServerPacket::Disconnect {
                    reason: reason.clone(),
                })
                .await;
            anyhow::bail!(reason);
        }
        other => anyhow::bail!("unexpected handshake msg: {other:?}"),
    }

    let client_udp_port = match conn.recv::<OutgoingPacket>().await? {
        OutgoingPacket::UdpHello { client_udp_port } => client_udp_port,
        other => anyhow::bail!("expected UdpHello, got {other:?}"),
    };

    Ok(Handshake {
        conn,
        peer,
        client_udp_port,
    })
}

/// Helper for tests: bind to an ephemeral port.
pub async fn bind_ephemeral(tick_hz: u32) -> anyhow::Result<(GameServer, ArenaConfig)> {
    let mut cfg = ArenaConfig {
        server_addr: format!("{}:{}", IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        tick_hz,
        ..Default::default()
    };
    cfg.validate()?;

    // Bind TCP first to get an ephemeral port, then bind UDP to that same port.
    let tcp = ReliableListener::bind(cfg.server_addr.parse()?).await?;
    let addr = tcp.local_addr()?;
    cfg.server_addr = addr.to_string();

    let udp_bind = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port());
    let udp = UdpSocket::bind(udp_bind).await?;

    Ok((GameServer::from_parts(cfg.clone(), tcp, udp), cfg))
}

#[cfg(test)]
mod tests {
    use arena_shared::{
        keys::KeyCode,
        net::UnreliableConn,
        packet::{IncomingPacket, KeyPressedPacket, LoginPacket},
    };
    use tokio::{io::AsyncWriteExt, net::TcpStream};

    use super::*;

    async fn handshake(addr: SocketAddr, udp_port: u16) -> anyhow::Result<(ReliableConn, LoginPacket)> {
        let mut conn = ReliableConn::connect(addr).await?;
        conn.send(&OutgoingPacket::Hello {
            protocol: PROTOCOL_VERSION,
        })
        .await?;
        conn.send(&OutgoingPacket::UdpHello {
            client_udp_port: udp_port,
        })
        .await?;
        match conn.recv::<IncomingPacket>().await? {
            IncomingPacket::Login(login) => Ok((conn, login)),
            other => anyhow::bail!("expected Login, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_login_sees_first_player_and_first_is_told() -> anyhow::Result<()> {
        let (mut server, cfg) = bind_ephemeral(64).await?;
        let addr: SocketAddr = cfg.server_addr.parse()?;

        let first = tokio::spawn(async move { handshake(addr, 50_001).await });
        let p1 = server.accept_one().await?;
        let (mut conn1, login1) = first.await??;
        assert_eq!(login1.player_id(), p1);
        assert_eq!(login1.players().len(), 1);

        let second = tokio::spawn(async move { handshake(addr, 50_002).await });
        let p2 = server.accept_one().await?;
        let (_conn2, login2) = second.await??;
        assert_eq!(login2.players().len(), 2);
        assert_ne!(p1, p2);

        match conn1.recv::<IncomingPacket>().await? {
            IncomingPacket::DrawNewPlayer(draw) => assert_eq!(draw.player_id(), p2),
            other => anyhow::bail!("expected DrawNewPlayer, got {other:?}"),
        }
        assert_eq!(server.world().player_count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn wrong_protocol_is_refused() -> anyhow::Result<()> {
        let (mut server, cfg) = bind_ephemeral(64).await?;
        let addr: SocketAddr = cfg.server_addr.parse()?;
        let client = tokio::spawn(async move {
            let mut conn = ReliableConn::connect(addr).await?;
            conn.send(&OutgoingPacket::Hello { protocol: 999 }).await?;
            conn.recv::<IncomingPacket>().await.map_err(anyhow::Error::from)
        });
        assert!(server.accept_one().await.is_err());
        assert!(matches!(client.await??, IncomingPacket::Disconnect { .. }));
        assert_eq!(server.client_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn game_state_runs_on_a_fixed_grid_at_64hz() -> anyhow::Result<()> {
        let (mut server, _cfg) = bind_ephemeral(64).await?;
        let t0 = Instant::now();
        let broadcasts = (0..640u32)
            .map(|i| t0 + Duration::from_secs_f64(f64::from(i) / 64.0))
            .filter(|now| server.take_game_state_slot(*now))
            .count();
        assert_eq!(broadcasts, 100);
        Ok(())
    }

    #[tokio::test]
    async fn stalled_loop_skips_missed_game_states() -> anyhow::Result<()> {
        let (mut server, _cfg) = bind_ephemeral(64).await?;
        let t0 = Instant::now();
        assert!(server.take_game_state_slot(t0));
        assert!(!server.take_game_state_slot(t0 + Duration::from_millis(50)));

        // 350 ms stall: one catch-up broadcast, then back on the grid.
        assert!(server.take_game_state_slot(t0 + Duration::from_millis(350)));
        assert!(!server.take_game_state_slot(t0 + Duration::from_millis(360)));
        assert!(server.take_game_state_slot(t0 + Duration::from_millis(400)));
        Ok(())
    }

    #[tokio::test]
    async fn silent_connection_does_not_stall_the_loop() -> anyhow::Result<()> {
        let (mut server, cfg) = bind_ephemeral(64).await?;
        let addr: SocketAddr = cfg.server_addr.parse()?;
        let _silent = TcpStream::connect(addr).await?;

        let iteration = async {
            server.try_accept(Duration::from_millis(1)).await?;
            server.step(Instant::now()).await
        };
        tokio::time::timeout(Duration::from_millis(500), iteration).await??;

        // A well-behaved client still gets in behind the silent one.
        let client = tokio::spawn(async move { handshake(addr, 50_004).await });
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut joined = Vec::new();
        while joined.is_empty() && Instant::now() < deadline {
            joined = server.try_accept(Duration::from_millis(5)).await?;
            server.step(Instant::now()).await?;
        }
        let (_conn, login) = client.await??;
        assert_eq!(joined, vec![login.player_id()]);
        assert_eq!(server.client_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn failed_login_leaves_no_player_behind() -> anyhow::Result<()> {
        let (mut server, _cfg) = bind_ephemeral(64).await?;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let _client = TcpStream::connect(listener.local_addr()?).await?;
        let (mut stream, peer) = listener.accept().await?;
        stream.shutdown().await?;

        let result = server
            .finish_login(Handshake {
                conn: ReliableConn::new(stream),
                peer,
                client_udp_port: 50_005,
            })
            .await;
        assert!(result.is_err());
        assert_eq!(server.world().player_count(), 0);
        assert_eq!(server.client_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn edges_from_registered_peer_move_player() -> anyhow::Result<()> {
        let (mut server, cfg) = bind_ephemeral(64).await?;
        let addr: SocketAddr = cfg.server_addr.parse()?;
        let udp = UnreliableConn::connect("127.0.0.1:0".parse()?, addr).await?;
        let udp_port = udp.local_addr()?.port();

        let client = tokio::spawn(async move { handshake(addr, udp_port).await });
        let me = server.accept_one().await?;
        let (_conn, login) = client.await??;

        let start = server.world().player(me).map(|p| p.x()).unwrap_or_default();
        udp.send(&OutgoingPacket::KeyPressed(KeyPressedPacket {
            game_id: login.game_id(),
            player_id: me,
            key: KeyCode::UP,
        }))
        .await?;

        // Give the datagram a moment to land.
        tokio::time::sleep(Duration::from_millis(20)).await;
        server.step(Instant::now()).await?;

        assert_eq!(server.edges_received(me), Some(1));
        let moved = server.world().player(me).map(|p| p.x()).unwrap_or_default();
        assert!(moved > start);
        Ok(())
    }

    #[tokio::test]
    async fn edges_for_other_players_are_rejected() -> anyhow::Result<()> {
        let (mut server, cfg) = bind_ephemeral(64).await?;
        let addr: SocketAddr = cfg.server_addr.parse()?;
        let client = tokio::spawn(async move { handshake(addr, 50_003).await });
        let me = server.accept_one().await?;
        let _ = client.await??;

        let forged = OutgoingPacket::KeyPressed(KeyPressedPacket {
            game_id: GameId(77),
            player_id: me,
            key: KeyCode::UP,
        });
        let from: SocketAddr = "127.0.0.1:50003".parse()?;
        assert!(server.on_edge(from, forged).is_none());
        assert!(server.world().player(me).unwrap().flags().is_empty());
        Ok(())
    }
}

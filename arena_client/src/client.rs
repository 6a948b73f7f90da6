//! Client connection.
//!
//! `connect` performs the handshake on the reliable channel, waits for the
//! Login that establishes who we are, then starts one receive task per
//! channel. Both tasks only forward packets into the session inbox.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::Context;
use arena_shared::{
    config::ArenaConfig,
    error::ArenaError,
    net::{ReliableConn, ReliableReader, UnreliableConn},
    packet::{IncomingPacket, OutgoingPacket, PROTOCOL_VERSION},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    dispatcher::NetDispatcher,
    session::{Inbound, Session},
};

/// A session over real sockets.
pub type GameClient = Session<NetDispatcher>;

/// Packets buffered between the network tasks and the simulation tick.
const INBOX_CAPACITY: usize = 256;

/// Connects to a server and performs the handshake.
pub async fn connect(cfg: &ArenaConfig) -> anyhow::Result<GameClient> {
    let server_addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;

    info!(server = %server_addr, "Connecting to server");

    // Bind UDP first so we can tell the server where to send game state.
    let bind = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
    let unreliable = UnreliableConn::connect(bind, server_addr).await?;
    let client_udp_port = unreliable.local_addr().context("udp local_addr")?.port();

    let mut reliable = ReliableConn::connect(server_addr)
        .await
        .context("tcp connect")?;
    reliable
        .send(&OutgoingPacket::Hello {
            protocol: PROTOCOL_VERSION,
        })
        .await?;
    reliable
        .send(&OutgoingPacket::UdpHello { client_udp_port })
        .await?;

    let login = match reliable.recv::<IncomingPacket>().await? {
        login @ IncomingPacket::Login(_) => login,
        IncomingPacket::Disconnect { reason } => anyhow::bail!("server refused login: {reason}"),
        other => anyhow::bail!("expected Login, got {other:?}"),
    };

    let (reader, writer) = reliable.into_split();
    let (tx, rx) = mpsc::channel(INBOX_CAPACITY);

    let mut session = Session::new(
        NetDispatcher::new(writer, unreliable.clone()),
        rx,
        cfg.world_bounds(),
    );
    session.apply(login)?;
    session.attach_task(spawn_reliable_reader(reader, tx.clone()));
    session.attach_task(spawn_unreliable_reader(unreliable, tx));

    info!(identity = ?session.identity(), "Connected to server");
    Ok(session)
}

fn spawn_reliable_reader(mut reader: ReliableReader, tx: mpsc::Sender<Inbound>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let inbound = match reader.recv::<IncomingPacket>().await {
                Ok(packet) => Inbound::Packet(packet),
                Err(err @ ArenaError::Codec(_)) => Inbound::Failed(err),
                Err(err) => {
                    let _ = tx.send(Inbound::Failed(err)).await;
                    break;
                }
            };
            if tx.send(inbound).await.is_err() {
                break;
            }
        }
        debug!("Reliable reader stopped");
    })
}

fn spawn_unreliable_reader(conn: UnreliableConn, tx: mpsc::Sender<Inbound>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match conn.recv::<IncomingPacket>().await {
                Ok(packet) => {
                    if tx.send(Inbound::Packet(packet)).await.is_err() {
                        break;
                    }
                }
                Err(ArenaError::Codec(err)) => {
                    warn!(error = %err, "Dropping malformed datagram");
                }
                // ICMP port unreachable from an earlier send; the next datagram may still arrive.
                Err(ArenaError::Transport { source, .. })
                    if source.kind() == std::io::ErrorKind::ConnectionRefused =>
                {
                    debug!(error = %source, "Unreliable peer not reachable yet");
                }
                Err(err) => {
                    let _ = tx.send(Inbound::Failed(err)).await;
                    break;
                }
            }
        }
        debug!("Unreliable reader stopped");
    })
}

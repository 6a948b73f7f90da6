//! Outgoing packet dispatch.
//!
//! Every outgoing packet knows its channel; [`PacketDispatcher::send`] routes
//! it there. Sends are fire-and-forget: an error means the transport is
//! gone, not that the packet should be tried again.

use arena_shared::{
    error::{Channel, Result},
    net::{ReliableWriter, UnreliableConn},
    packet::OutgoingPacket,
};
use async_trait::async_trait;
use tracing::trace;

#[async_trait]
pub trait PacketDispatcher: Send {
    async fn send_reliable(&mut self, packet: &OutgoingPacket) -> Result<()>;

    async fn send_unreliable(&mut self, packet: &OutgoingPacket) -> Result<()>;

    /// Sends on the packet's own channel.
    async fn send(&mut self, packet: &OutgoingPacket) -> Result<()> {
        match packet.channel() {
            Channel::Reliable => self.send_reliable(packet).await,
            Channel::Unreliable => self.send_unreliable(packet).await,
        }
    }
}

/// Dispatcher over the live TCP write half and UDP socket.
pub struct NetDispatcher {
    reliable: ReliableWriter,
    unreliable: UnreliableConn,
}

impl NetDispatcher {
    pub fn new(reliable: ReliableWriter, unreliable: UnreliableConn) -> Self {
        Self {
            reliable,
            unreliable,
        }
    }
}

#[async_trait]
impl PacketDispatcher for NetDispatcher {
    async fn send_reliable(&mut self, packet: &OutgoingPacket) -> Result<()> {
        trace!(?packet, "send reliable");
        self.reliable.send(packet).await
    }

    async fn send_unreliable(&mut self, packet: &OutgoingPacket) -> Result<()> {
        trace!(?packet, "send unreliable");
        self.unreliable.send(packet).await
    }
}

/// Records packets instead of sending them. Useful for headless tests.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    pub sent: Vec<(Channel, OutgoingPacket)>,
    /// When set, every send fails with this error kind.
    pub fail_with: Option<std::io::ErrorKind>,
}

impl RecordingDispatcher {
    fn record(&mut self, channel: Channel, packet: &OutgoingPacket) -> Result<()> {
        if let Some(kind) = self.fail_with {
            return Err(arena_shared::error::ArenaError::transport(
                channel,
                std::io::Error::from(kind),
            ));
        }
        self.sent.push((channel, packet.clone()));
        Ok(())
    }
}

#[async_trait]
impl PacketDispatcher for RecordingDispatcher {
    async fn send_reliable(&mut self, packet: &OutgoingPacket) -> Result<()> {
        self.record(Channel::Reliable, packet)
    }

    async fn send_unreliable(&mut self, packet: &OutgoingPacket) -> Result<()> {
        self.record(Channel::Unreliable, packet)
    }
}

//! Networking primitives.
//!
//! - Reliable channel: TCP with 4-byte big-endian length-prefixed frames.
//! - Unreliable channel: UDP, one message per datagram.
//! - Payloads are JSON-encoded packet enums; `PROTOCOL_VERSION` is checked
//!   in the Hello handshake.
//!
//! Sends are fire-and-forget. Failures come back as
//! [`ArenaError::Transport`] and are never retried here.

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use bytes::{BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream, UdpSocket,
    },
    time,
};

use crate::error::{ArenaError, Channel, Result};

/// Largest frame accepted on the reliable channel.
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// Largest datagram read on the unreliable channel.
const MAX_DATAGRAM_LEN: usize = 64 * 1024;

fn reliable_err(e: io::Error) -> ArenaError {
    ArenaError::transport(Channel::Reliable, e)
}

fn unreliable_err(e: io::Error) -> ArenaError {
    ArenaError::transport(Channel::Unreliable, e)
}

async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(msg)?;
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);
    writer.write_all(&buf).await.map_err(reliable_err)
}

async fn read_frame<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(reliable_err)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(reliable_err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit"),
        )));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(reliable_err)?;
    Ok(serde_json::from_slice(&payload)?)
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(reliable_err)?;
        stream.set_nodelay(true).map_err(reliable_err)?;
        Ok(Self::new(stream))
    }

    pub async fn send<T: Serialize>(&mut self, msg: &T) -> Result<()> {
        write_frame(&mut self.stream, msg).await
    }

    pub async fn recv<T: DeserializeOwned>(&mut self) -> Result<T> {
        read_frame(&mut self.stream).await
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.stream.peer_addr().map_err(reliable_err)
    }

    /// Splits into halves that can live on different tasks.
    pub fn into_split(self) -> (ReliableReader, ReliableWriter) {
        let (read, write) = self.stream.into_split();
        (ReliableReader { half: read }, ReliableWriter { half: write })
    }
}

/// Receiving half of a [`ReliableConn`].
#[derive(Debug)]
pub struct ReliableReader {
    half: OwnedReadHalf,
}

impl ReliableReader {
    pub async fn recv<T: DeserializeOwned>(&mut self) -> Result<T> {
        read_frame(&mut self.half).await
    }
}

/// Sending half of a [`ReliableConn`].
#[derive(Debug)]
pub struct ReliableWriter {
    half: OwnedWriteHalf,
}

impl ReliableWriter {
    pub async fn send<T: Serialize>(&mut self, msg: &T) -> Result<()> {
        write_frame(&mut self.half, msg).await
    }
}

/// Unreliable channel over UDP. Clones share the socket.
#[derive(Debug, Clone)]
pub struct UnreliableConn {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl UnreliableConn {
    pub async fn connect(bind_addr: SocketAddr, peer: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await.map_err(unreliable_err)?;
        socket.connect(peer).await.map_err(unreliable_err)?;
        Ok(Self {
            socket: Arc::new(socket),
            peer,
        })
    }

    pub async fn send<T: Serialize>(&self, msg: &T) -> Result<()> {
        let payload = serde_json::to_vec(msg)?;
        self.socket.send(&payload).await.map_err(unreliable_err)?;
        Ok(())
    }

    pub async fn recv<T: DeserializeOwned>(&self) -> Result<T> {
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        let n = self.socket.recv(&mut buf).await.map_err(unreliable_err)?;
        Ok(serde_json::from_slice(&buf[..n])?)
    }

    /// Receives a datagram within the given timeout.
    pub async fn recv_timeout<T: DeserializeOwned>(&self, timeout: Duration) -> Result<Option<T>> {
        match time::timeout(timeout, self.recv::<T>()).await {
            Ok(res) => res.map(Some),
            Err(_) => Ok(None),
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(unreliable_err)
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(reliable_err)?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.map_err(reliable_err)?;
        stream.set_nodelay(true).map_err(reliable_err)?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(reliable_err)
    }
}

/// Convenience codec helpers.
pub fn encode_to_bytes<T: Serialize>(msg: &T) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(msg)?))
}

pub fn decode_from_bytes<T: DeserializeOwned>(b: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(b)?)
}

//! `arena_client`
//!
//! Client-side systems:
//! - Connection handshake and per-channel receive tasks
//! - Session state machine (Connecting → LoggedIn → Synced)
//! - Server-authoritative reconciliation, applied on the simulation tick
//! - Key edge reporting through the packet dispatcher

pub mod client;
pub mod dispatcher;
pub mod input;
pub mod session;

pub use client::{connect, GameClient};
pub use session::{Session, SessionState};

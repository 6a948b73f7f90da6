//! Shared helpers for the arena integration tests.

use std::time::{Duration, Instant};

use arena_server::GameServer;
use tokio::task::JoinHandle;

/// Routes tracing output through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Accepts `players` logins, then steps the server every 5 ms for `run_for`.
pub fn spawn_server(
    mut server: GameServer,
    players: usize,
    run_for: Duration,
) -> JoinHandle<anyhow::Result<GameServer>> {
    tokio::spawn(async move {
        for _ in 0..players {
            server.accept_one().await?;
        }
        let deadline = Instant::now() + run_for;
        while Instant::now() < deadline {
            server.step(Instant::now()).await?;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(server)
    })
}

//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p arena_server -- [--addr 127.0.0.1:40000] [--tick-hz 64] [--game-id 1] [--config arena.json]
//!
//! The server accepts players, runs the fixed timestep simulation and
//! broadcasts game state to connected clients.
//!
//! Console commands:
//!   status         - Show server status
//!   kick <id>      - Drop a player
//!   quit           - Shutdown server

use std::env;
use std::io::{BufRead, Write};
use std::time::{Duration, Instant};

use anyhow::Context;
use arena_server::GameServer;
use arena_shared::{config::ArenaConfig, entity::Movable, entity::PlayerId};
use tokio::sync::mpsc;
use tracing::{info, warn};

fn parse_args() -> anyhow::Result<ArenaConfig> {
    let args: Vec<String> = env::args().collect();
    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let text = std::fs::read_to_string(&args[i + 1])
                .with_context(|| format!("read config {}", args[i + 1]))?;
            ArenaConfig::from_json_str(&text).context("parse config")?
        }
        _ => ArenaConfig::default(),
    };
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().unwrap_or(64);
                i += 2;
            }
            "--game-id" if i + 1 < args.len() => {
                cfg.game_id = args[i + 1].parse().unwrap_or(1);
                i += 2;
            }
            _ => i += 1,
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn exec_console(server: &mut GameServer, line: &str) -> Vec<String> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("status"), _) => {
            let world = server.world();
            let mut out = vec![
                format!("Game: {:?}", server.game_id()),
                format!("Tick: {}", server.tick_count()),
                format!("Clients: {}", server.client_count()),
                format!("Projectiles: {}", world.projectile_count()),
            ];
            for id in world.player_ids() {
                if let Some(p) = world.player(id) {
                    out.push(format!(
                        "  {:?}: x={:.1} y={:.1} rot={:.1} hits={}",
                        id,
                        p.x(),
                        p.y(),
                        p.rotation(),
                        p.hits_taken()
                    ));
                }
            }
            out
        }
        (Some("kick"), Some(id)) => match id.parse() {
            Ok(id) => {
                server.disconnect(PlayerId(id));
                vec![format!("Kicked player {id}")]
            }
            Err(_) => vec![format!("Bad player id: {id}")],
        },
        (Some("quit" | "exit"), _) => std::process::exit(0),
        _ => vec![format!("Unknown command: {line}")],
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(addr = %cfg.server_addr, tick_hz = cfg.tick_hz, game_id = cfg.game_id, "Starting server");

    let mut server = GameServer::new(cfg.clone())
        .await
        .context("create server")?;
    let local = server.local_addr()?;
    info!(%local, "Server listening");

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            if stdin.lock().read_line(&mut line).is_err() {
                break;
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Server ready. Type 'status' for info, 'kick <id>' to drop a player, 'quit' to exit.");
    println!();

    // Main server loop.
    let tick_interval = cfg.tick_interval();
    let mut next_tick = tokio::time::Instant::now();

    loop {
        while let Ok(line) = console_rx.try_recv() {
            for out in exec_console(&mut server, &line) {
                println!("{}", out);
            }
        }

        // Accept new clients (non-blocking).
        match server.try_accept(Duration::from_millis(1)).await {
            Ok(joined) => {
                for id in joined {
                    info!(player_id = ?id, "New player accepted");
                }
            }
            Err(e) => warn!(error = %e, "Accept failed"),
        }

        server.step(Instant::now()).await?;

        // Wait for next tick.
        next_tick += tick_interval;
        tokio::time::sleep_until(next_tick).await;
    }
}

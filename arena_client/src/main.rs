//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p arena_client -- [--addr 127.0.0.1:40000] [--tick-hz 64] [--config arena.json]
//!
//! The client logs in, applies the server's game state every tick and
//! reports key edges typed on stdin. Type `help` for the command list.

use std::env;
use std::io::{BufRead, Write};
use std::time::Instant;

use anyhow::Context;
use arena_client::input::{parse_command, ConsoleCommand, HELP};
use arena_client::session::SessionState;
use arena_client::GameClient;
use arena_shared::config::ArenaConfig;
use arena_shared::entity::Movable;
use tokio::sync::mpsc;
use tracing::info;

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
            _ => i += 1,
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

async fn exec_console(client: &mut GameClient, cmd: ConsoleCommand) -> anyhow::Result<Vec<String>> {
    let out = match cmd {
        ConsoleCommand::Press(key) => {
            client.key_pressed(key).await?;
            Vec::new()
        }
        ConsoleCommand::Release(key) => {
            client.key_unpressed(key).await?;
            Vec::new()
        }
        ConsoleCommand::Tap(key) => {
            client.key_pressed(key).await?;
            client.key_unpressed(key).await?;
            Vec::new()
        }
        ConsoleCommand::Status => {
            let world = client.world();
            let mut out = vec![
                format!("State: {:?}", client.state()),
                format!("Identity: {:?}", client.identity()),
                format!("Ticks: {}", client.ticks()),
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
        ConsoleCommand::Help => HELP.lines().map(str::to_string).collect(),
        ConsoleCommand::Quit => std::process::exit(0),
        ConsoleCommand::Unknown(line) => vec![format!("Unknown command: {line}")],
    };
    Ok(out)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(server = %cfg.server_addr, tick_hz = cfg.tick_hz, "Starting client");

    let mut client = arena_client::connect(&cfg).await.context("connect")?;

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

    println!("Client connected. Type 'help' for commands, 'quit' to exit.");
    println!();

    let tick_interval = cfg.tick_interval();
    let mut next_tick = tokio::time::Instant::now();

    loop {
        while let Ok(line) = console_rx.try_recv() {
            let Some(cmd) = parse_command(&line) else {
                continue;
            };
            for line in exec_console(&mut client, cmd).await? {
                println!("{}", line);
            }
        }

        match client.tick(Instant::now()) {
            Ok(removed) if !removed.is_empty() => info!(?removed, "Projectiles removed"),
            Ok(_) => {}
            Err(e) if client.state() == SessionState::Disconnected => {
                println!("Disconnected from server: {e}");
                break;
            }
            Err(e) => return Err(e.into()),
        }

        next_tick += tick_interval;
        tokio::time::sleep_until(next_tick).await;
    }

    Ok(())
}

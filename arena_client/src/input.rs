//! Input handling.
//!
//! A real client would get key edges from its windowing layer. The console
//! binary stands in for that collaborator: `press up`, `release up`, and
//! `tap fire` turn into the same `key_pressed`/`key_unpressed` calls.

use arena_shared::keys::KeyCode;

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Press(KeyCode),
    Release(KeyCode),
    /// Press immediately followed by release.
    Tap(KeyCode),
    Status,
    Quit,
    Help,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Option<ConsoleCommand> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let (&verb, rest) = tokens.split_first()?;

    let key = || {
        rest.first()
            .and_then(|name| KeyCode::from_name(name))
            .ok_or_else(|| ConsoleCommand::Unknown(line.trim().to_string()))
    };

    let cmd = match verb {
        "press" | "+" => key().map(ConsoleCommand::Press).unwrap_or_else(|e| e),
        "release" | "-" => key().map(ConsoleCommand::Release).unwrap_or_else(|e| e),
        "tap" => key().map(ConsoleCommand::Tap).unwrap_or_else(|e| e),
        "status" => ConsoleCommand::Status,
        "quit" | "exit" => ConsoleCommand::Quit,
        "help" => ConsoleCommand::Help,
        _ => ConsoleCommand::Unknown(line.trim().to_string()),
    };
    Some(cmd)
}

pub const HELP: &str = "\
press <key>    - key down (up, down, left, right, fire)
release <key>  - key up
tap <key>      - key down then up
status         - show session state and players
quit           - exit client";

//! Configuration system.
//!
//! Loads arena configuration from JSON strings/files (file IO left to app).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ArenaError, Result};

/// Root configuration shared by client/server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// Server listen address, e.g. `127.0.0.1:40000`.
    pub server_addr: String,
    /// Fixed simulation tick rate.
    pub tick_hz: u32,
    /// Game instance hosted by the server (server only).
    #[serde(default = "default_game_id")]
    pub game_id: u32,
    /// Half the background width.
    #[serde(default = "default_half_width")]
    pub world_half_width: f32,
    /// Half the background height.
    #[serde(default = "default_half_height")]
    pub world_half_height: f32,
    /// Distance kept from the upper edges.
    #[serde(default = "default_boundary_margin")]
    pub boundary_margin: f32,
}

fn default_game_id() -> u32 {
    1
}

fn default_half_width() -> f32 {
    400.0
}

fn default_half_height() -> f32 {
    300.0
}

fn default_boundary_margin() -> f32 {
    50.0
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:40000".to_string(),
            tick_hz: 64,
            game_id: default_game_id(),
            world_half_width: default_half_width(),
            world_half_height: default_half_height(),
            boundary_margin: default_boundary_margin(),
        }
    }
}

impl ArenaConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Rejects values the simulation loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.tick_hz == 0 {
            return Err(ArenaError::InvalidConfig("tick_hz must be at least 1".into()));
        }
        if self.boundary_margin >= 2.0 * self.world_half_width
            || self.boundary_margin >= 2.0 * self.world_half_height
        {
            return Err(ArenaError::InvalidConfig(
                "boundary_margin leaves no playable area".into(),
            ));
        }
        Ok(())
    }

    /// Length of one simulation step.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_hz.max(1)))
    }

    pub fn world_bounds(&self) -> WorldBounds {
        WorldBounds {
            half_width: self.world_half_width,
            half_height: self.world_half_height,
            margin: self.boundary_margin,
        }
    }
}

/// Playable area centered on the origin.
///
/// Players stop at `-half` on the lower edges and at `half - margin` on the
/// upper edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub half_width: f32,
    pub half_height: f32,
    pub margin: f32,
}

impl Default for WorldBounds {
    fn default() -> Self {
        ArenaConfig::default().world_bounds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_uses_defaults() {
        let cfg =
            ArenaConfig::from_json_str(r#"{ "server_addr": "0.0.0.0:5000", "tick_hz": 30 }"#)
                .unwrap();
        assert_eq!(cfg.tick_hz, 30);
        assert_eq!(cfg.game_id, 1);
        assert_eq!(cfg.world_bounds(), WorldBounds::default());
    }

    #[test]
    fn zero_tick_rate_is_rejected() {
        let cfg = ArenaConfig::from_json_str(r#"{ "server_addr": "0.0.0.0:5000", "tick_hz": 0 }"#)
            .unwrap();
        assert!(matches!(cfg.validate(), Err(ArenaError::InvalidConfig(_))));
        assert!(ArenaConfig::default().validate().is_ok());
        assert_eq!(ArenaConfig::default().tick_interval(), Duration::from_secs_f64(1.0 / 64.0));
    }
}

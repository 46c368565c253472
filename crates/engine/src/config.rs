//! Server configuration from the environment.
//!
//! Every setting has a default; `.env.local` / `.env` at the repo root are
//! loaded by `main` before this is read.

use std::time::Duration;

/// Invalid configuration value.
#[derive(Debug, thiserror::Error)]
#[error("Invalid value for {key}: {value:?}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// SQLite database file holding games, moves and auth tokens
    pub game_db: String,
    pub cors_allowed_origins: Option<String>,
    pub engine: EngineConfig,
    pub transport: TransportConfig,
    pub room: RoomConfig,
}

/// External move engine used for computer opponents.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub path: String,
    pub depth: u32,
    pub search_timeout: Duration,
}

/// Per-connection limits and liveness timing.
#[derive(Debug, Clone, Copy)]
pub struct TransportConfig {
    pub outbound_capacity: usize,
    pub max_frame_bytes: usize,
    pub write_wait: Duration,
    pub pong_wait: Duration,
    /// Must be shorter than `pong_wait`
    pub ping_period: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 256,
            max_frame_bytes: 512,
            write_wait: Duration::from_secs(10),
            pong_wait: Duration::from_secs(60),
            ping_period: Duration::from_secs(54),
        }
    }
}

/// Room actor settings.
#[derive(Debug, Clone, Copy)]
pub struct RoomConfig {
    pub command_capacity: usize,
    pub clock_tick: Duration,
    /// How long a non-active room with no physical participants is kept
    pub idle_grace: Duration,
    /// Inbox size of engine-backed participants
    pub engine_inbox_capacity: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            command_capacity: 256,
            clock_tick: Duration::from_millis(500),
            idle_grace: Duration::from_secs(60),
            engine_inbox_capacity: 256,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let transport_defaults = TransportConfig::default();
        let room_defaults = RoomConfig::default();

        let port = match env.get("SERVER_PORT").or_else(|| env.get("PORT")) {
            Some(raw) => raw.parse().map_err(|_| ConfigError {
                key: "SERVER_PORT",
                value: raw,
            })?,
            None => 3000,
        };

        let transport = TransportConfig {
            outbound_capacity: env.parse("OUTBOUND_QUEUE_CAPACITY", transport_defaults.outbound_capacity)?,
            max_frame_bytes: env.parse("MAX_FRAME_BYTES", transport_defaults.max_frame_bytes)?,
            write_wait: env.secs("WRITE_WAIT_SECS", transport_defaults.write_wait)?,
            pong_wait: env.secs("PONG_WAIT_SECS", transport_defaults.pong_wait)?,
            ping_period: env.secs("PING_PERIOD_SECS", transport_defaults.ping_period)?,
        };
        if transport.ping_period >= transport.pong_wait {
            return Err(ConfigError {
                key: "PING_PERIOD_SECS",
                value: format!("{:?} (must be below PONG_WAIT_SECS)", transport.ping_period),
            });
        }
        if transport.outbound_capacity == 0 {
            return Err(ConfigError {
                key: "OUTBOUND_QUEUE_CAPACITY",
                value: "0".to_string(),
            });
        }

        let room = RoomConfig {
            command_capacity: env.parse("ROOM_COMMAND_CAPACITY", room_defaults.command_capacity)?,
            clock_tick: Duration::from_millis(
                env.parse("CLOCK_TICK_MS", room_defaults.clock_tick.as_millis() as u64)?,
            ),
            idle_grace: env.secs("ROOM_IDLE_GRACE_SECS", room_defaults.idle_grace)?,
            engine_inbox_capacity: room_defaults.engine_inbox_capacity,
        };
        if room.command_capacity == 0 || room.clock_tick.is_zero() {
            return Err(ConfigError {
                key: "ROOM_COMMAND_CAPACITY/CLOCK_TICK_MS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            host: env.get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            game_db: env.get("GAME_DB").unwrap_or_else(|| "games.db".into()),
            cors_allowed_origins: env
                .get("CORS_ALLOWED_ORIGINS")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            engine: EngineConfig {
                path: env.get("ENGINE_PATH").unwrap_or_else(|| "stockfish".into()),
                depth: env.parse("ENGINE_DEPTH", 10)?,
                search_timeout: env.secs("ENGINE_SEARCH_TIMEOUT_SECS", Duration::from_secs(30))?,
            },
            transport,
            room,
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError { key, value: raw }),
            None => Ok(default),
        }
    }

    fn secs(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse(key, default.as_secs()).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_match_connection_limits() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.transport.outbound_capacity, 256);
        assert_eq!(config.transport.max_frame_bytes, 512);
        assert_eq!(config.transport.write_wait, Duration::from_secs(10));
        assert_eq!(config.transport.pong_wait, Duration::from_secs(60));
        assert_eq!(config.transport.ping_period, Duration::from_secs(54));
        assert_eq!(config.engine.path, "stockfish");
        assert_eq!(config.cors_allowed_origins, None);
    }

    #[test]
    fn port_falls_back_to_port_variable() {
        assert_eq!(config(&[("PORT", "8080")]).unwrap().port, 8080);
        assert_eq!(
            config(&[("SERVER_PORT", "9000"), ("PORT", "8080")])
                .unwrap()
                .port,
            9000
        );
    }

    #[test]
    fn invalid_numbers_are_reported_with_their_key() {
        let err = config(&[("ENGINE_DEPTH", "deep")]).unwrap_err();
        assert_eq!(err.key, "ENGINE_DEPTH");
    }

    #[test]
    fn ping_period_must_be_shorter_than_pong_wait() {
        let err = config(&[("PING_PERIOD_SECS", "60"), ("PONG_WAIT_SECS", "60")]).unwrap_err();
        assert_eq!(err.key, "PING_PERIOD_SECS");
    }
}

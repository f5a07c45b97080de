// src/config.rs

//! Runtime configuration, loaded from `GRID_RELAY_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

/// Per-room tuning handed to every room the registry creates.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    /// Frames buffered per member before that member is evicted.
    pub mailbox_capacity: usize,
    /// Pending join/leave/broadcast events per room.
    pub queue_capacity: usize,
    /// Whether a frame is also delivered back to the connection that sent it.
    pub echo_to_sender: bool,
    /// Id samples tried before creation fails.
    pub max_id_attempts: usize,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            mailbox_capacity: 256,
            queue_capacity: 256,
            echo_to_sender: true,
            max_id_attempts: 16,
        }
    }
}

/// Bounds on socket I/O for the connection pumps.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub write_timeout: Duration,
    /// Idle bound on reads. `None` keeps idle editors connected forever.
    pub read_timeout: Option<Duration>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(10),
            read_timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub rooms: RoomSettings,
    pub connections: ConnectionSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: "sqlite://rooms.db".to_string(),
            rooms: RoomSettings::default(),
            connections: ConnectionSettings::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid {name}: {reason}")]
pub struct ConfigError {
    name: &'static str,
    reason: String,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Recognized variables, all optional:
    /// - `GRID_RELAY_HOST` (default `0.0.0.0`)
    /// - `GRID_RELAY_PORT` (default `8080`)
    /// - `GRID_RELAY_DATABASE_URL` (default `sqlite://rooms.db`)
    /// - `GRID_RELAY_MAILBOX_CAPACITY` (default `256`)
    /// - `GRID_RELAY_QUEUE_CAPACITY` (default `256`)
    /// - `GRID_RELAY_ECHO_TO_SENDER` (default `true`)
    /// - `GRID_RELAY_MAX_ID_ATTEMPTS` (default `16`)
    /// - `GRID_RELAY_WRITE_TIMEOUT_SECS` (default `10`)
    /// - `GRID_RELAY_READ_TIMEOUT_SECS` (unset by default)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let rooms = RoomSettings {
            mailbox_capacity: positive(
                "GRID_RELAY_MAILBOX_CAPACITY",
                parse_or(&lookup, "GRID_RELAY_MAILBOX_CAPACITY", defaults.rooms.mailbox_capacity)?,
            )?,
            queue_capacity: positive(
                "GRID_RELAY_QUEUE_CAPACITY",
                parse_or(&lookup, "GRID_RELAY_QUEUE_CAPACITY", defaults.rooms.queue_capacity)?,
            )?,
            echo_to_sender: parse_or(
                &lookup,
                "GRID_RELAY_ECHO_TO_SENDER",
                defaults.rooms.echo_to_sender,
            )?,
            max_id_attempts: positive(
                "GRID_RELAY_MAX_ID_ATTEMPTS",
                parse_or(&lookup, "GRID_RELAY_MAX_ID_ATTEMPTS", defaults.rooms.max_id_attempts)?,
            )?,
        };

        let write_timeout_secs: u64 = parse_or(
            &lookup,
            "GRID_RELAY_WRITE_TIMEOUT_SECS",
            defaults.connections.write_timeout.as_secs(),
        )?;
        let read_timeout = match lookup("GRID_RELAY_READ_TIMEOUT_SECS") {
            Some(raw) => Some(Duration::from_secs(parse("GRID_RELAY_READ_TIMEOUT_SECS", &raw)?)),
            None => None,
        };

        Ok(Self {
            host: lookup("GRID_RELAY_HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "GRID_RELAY_PORT", defaults.port)?,
            database_url: lookup("GRID_RELAY_DATABASE_URL").unwrap_or(defaults.database_url),
            rooms,
            connections: ConnectionSettings {
                write_timeout: Duration::from_secs(write_timeout_secs),
                read_timeout,
            },
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError {
        name,
        reason: e.to_string(),
    })
}

fn parse_or<T, F>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => parse(name, &raw),
        None => Ok(default),
    }
}

fn positive(name: &'static str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError {
            name,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

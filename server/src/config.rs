//! Process-wide tunables, adjustable at runtime through the authenticated
//! `SET` verb.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Password expected as the first word of a `SET` noun.
pub const ADMIN_PASSWORD: &str = "spork";

/// Server-wide configuration record. One instance exists per server, shared
/// behind [`SharedConfig`]; admin connections mutate it under the write lock.
#[derive(Debug, Clone)]
pub struct Config {
    /// How long clients get to answer each prompt.
    pub command_timeout: Duration,
    /// Shoe percentage below which a reshuffle is forced.
    pub shoe_min_percent: u32,
    /// Pause between rounds.
    pub game_wait_time: Duration,
    /// Bankroll granted to newly registered players.
    pub start_currency: i64,
    /// Fewest decks kept in the shoe; more are added when the table is full.
    pub minimum_decks: u32,
    /// When set, per-line client communications are logged at info level.
    pub show_comms: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs_f64(1.0),
            shoe_min_percent: 20,
            game_wait_time: Duration::from_secs_f64(0.01),
            start_currency: 10_000,
            minimum_decks: 6,
            show_comms: false,
        }
    }
}

impl Config {
    /// Applies one `SET` parameter. Unknown parameters and malformed values
    /// are rejected without changing anything.
    pub fn apply_set(&mut self, param: &str, value: &str) -> Result<(), String> {
        match param.to_ascii_uppercase().as_str() {
            "TIMEOUT" => self.command_timeout = parse_seconds(param, value)?,
            "SHOE" => self.shoe_min_percent = parse_value(param, value)?,
            "WAIT" => self.game_wait_time = parse_seconds(param, value)?,
            "START" => self.start_currency = parse_value(param, value)?,
            "DECKS" => self.minimum_decks = parse_value(param, value)?,
            "COMMS" => {
                let flag: u32 = parse_value(param, value)?;
                self.show_comms = flag != 0;
            }
            _ => return Err(format!("unknown parameter '{}'", param)),
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(param: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("bad value '{}' for parameter '{}'", value, param))
}

fn parse_seconds(param: &str, value: &str) -> Result<Duration, String> {
    let secs: f64 = parse_value(param, value)?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("bad value '{}' for parameter '{}'", value, param));
    }
    Ok(Duration::from_secs_f64(secs))
}

/// Handle to the live configuration shared across tasks.
pub type SharedConfig = Arc<RwLock<Config>>;

pub fn shared(config: Config) -> SharedConfig {
    Arc::new(RwLock::new(config))
}

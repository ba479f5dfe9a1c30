use std::env;
use std::path::PathBuf;

use thiserror::Error;

const DIALOGUE_DB_VAR: &str = "MATHBLITZ_DIALOGUE_DB";
const SCORES_DIR_VAR: &str = "MATHBLITZ_SCORES_DIR";
const LEADERBOARD_VAR: &str = "MATHBLITZ_LEADERBOARD";
const LEADERBOARD_SIZE_VAR: &str = "MATHBLITZ_LEADERBOARD_SIZE";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a positive number, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },
}

/// Runtime settings. The bot token itself is read by teloxide from
/// `TELOXIDE_TOKEN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SQLite file holding each chat's dialogue state.
    pub dialogue_db: String,
    /// Directory with one score history file per chat.
    pub scores_dir: PathBuf,
    pub leaderboard_path: PathBuf,
    /// Entries shown per level when the leaderboard is requested.
    pub leaderboard_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dialogue_db: "db.sqlite".to_string(),
            scores_dir: PathBuf::from("scores"),
            leaderboard_path: PathBuf::from("leaderboard.json"),
            leaderboard_size: 10,
        }
    }
}

impl Config {
    /// Reads the process environment (call `dotenv()` first to pick up `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from any variable source; unset variables keep their
    /// defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(db) = lookup(DIALOGUE_DB_VAR) {
            config.dialogue_db = db;
        }
        if let Some(dir) = lookup(SCORES_DIR_VAR) {
            config.scores_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup(LEADERBOARD_VAR) {
            config.leaderboard_path = PathBuf::from(path);
        }
        if let Some(size) = lookup(LEADERBOARD_SIZE_VAR) {
            config.leaderboard_size = match size.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        name: LEADERBOARD_SIZE_VAR,
                        value: size,
                    })
                }
            };
        }
        Ok(config)
    }

    /// Score history file for one chat.
    pub fn scores_path(&self, chat_id: i64) -> PathBuf {
        self.scores_dir.join(format!("{}.json", chat_id))
    }
}

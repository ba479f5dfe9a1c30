//! Where finished rounds go: the player's own score history and the shared
//! leaderboard.
//!
//! Both are traits so the round controller can be handed any implementation;
//! the JSON-file backed ones in [`history`] and [`leaderboard`] are what the
//! bot uses.

pub mod history;
pub mod leaderboard;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::quiz::session::{accuracy, RoundState};
use crate::quiz::DifficultyLevel;

pub use history::LocalScores;
pub use leaderboard::SharedLeaderboard;

#[derive(Debug, Error)]
pub enum RecordsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed record file: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("A username is required to publish a score")]
    MissingUsername,

    #[error("Record store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, RecordsError>;

/// What is kept of a round once the clock has run out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub score: u32,
    pub level: DifficultyLevel,
    pub questions_answered: u32,
    pub correct_answers: u32,
    #[serde(default)]
    pub best_streak: u32,
    pub timestamp: DateTime<Utc>,
}

impl ScoreSummary {
    pub fn from_round(
        state: &RoundState,
        level: DifficultyLevel,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            score: state.score,
            level,
            questions_answered: state.questions_answered,
            correct_answers: state.correct_answers,
            best_streak: state.best_streak,
            timestamp,
        }
    }

    pub fn accuracy(&self) -> f64 {
        accuracy(self.correct_answers, self.questions_answered)
    }

    /// Whether the round was played on the current local calendar day.
    pub fn is_today(&self) -> bool {
        self.timestamp.with_timezone(&Local).date_naive() == Local::now().date_naive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Today,
    AllTime,
}

/// The player's own score history.
pub trait ScoreStore: Send + Sync {
    fn save(&self, summary: &ScoreSummary) -> Result<()>;

    /// Highest score on `level` within `period`.
    fn best_score(
        &self,
        level: DifficultyLevel,
        period: Period,
    ) -> Result<Option<ScoreSummary>>;

    /// Up to `limit` summaries, newest first.
    fn recent(&self, limit: usize) -> Result<Vec<ScoreSummary>>;

    /// Levels with at least one saved round, in level order.
    fn levels_played(&self) -> Result<Vec<DifficultyLevel>>;

    fn is_new_high_score(
        &self,
        score: u32,
        level: DifficultyLevel,
        period: Period,
    ) -> Result<bool> {
        Ok(match self.best_score(level, period)? {
            Some(best) => score > best.score,
            None => true,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: String,
    pub username: String,
    #[serde(flatten)]
    pub summary: ScoreSummary,
}

impl LeaderboardEntry {
    pub fn accuracy(&self) -> f64 {
        self.summary.accuracy()
    }
}

/// Scores shared between all players.
pub trait Leaderboard: Send + Sync {
    /// Adds the round under `username`. Returns `None` when the score ranks
    /// too low to be kept at all.
    fn publish(
        &self,
        summary: &ScoreSummary,
        username: &str,
    ) -> Result<Option<LeaderboardEntry>>;

    /// Best `limit` entries on `level`, highest score first.
    fn top(&self, level: DifficultyLevel, limit: usize) -> Result<Vec<LeaderboardEntry>>;
}

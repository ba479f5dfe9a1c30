pub mod generator;
pub mod round;
pub mod runner;
pub mod session;

use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

/// Length of one round.
pub const ROUND_DURATION: Duration = Duration::from_secs(60);
/// Granularity of the countdown.
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);
/// How long the answer feedback stays up before the next question.
pub const FEEDBACK_DELAY: Duration = Duration::from_millis(400);
/// Number of choices offered per question, the correct one included.
pub const CHOICE_COUNT: usize = 4;
/// Below this many seconds the clock is shown as running out.
pub const LOW_TIME_THRESHOLD: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DifficultyLevel {
    #[default]
    #[serde(rename = "10")]
    UpTo10,
    #[serde(rename = "12")]
    UpTo12,
    #[serde(rename = "15")]
    UpTo15,
    #[serde(rename = "20")]
    UpTo20,
}

impl DifficultyLevel {
    pub const ALL: [DifficultyLevel; 4] = [
        DifficultyLevel::UpTo10,
        DifficultyLevel::UpTo12,
        DifficultyLevel::UpTo15,
        DifficultyLevel::UpTo20,
    ];

    /// Largest operand a question on this level may use.
    pub fn max_number(self) -> u32 {
        match self {
            DifficultyLevel::UpTo10 => 10,
            DifficultyLevel::UpTo12 => 12,
            DifficultyLevel::UpTo15 => 15,
            DifficultyLevel::UpTo20 => 20,
        }
    }

    /// Stable key used in persisted records.
    pub fn key(self) -> &'static str {
        match self {
            DifficultyLevel::UpTo10 => "10",
            DifficultyLevel::UpTo12 => "12",
            DifficultyLevel::UpTo15 => "15",
            DifficultyLevel::UpTo20 => "20",
        }
    }

    pub fn display_name(self) -> String {
        format!("Up to {}", self.key())
    }

    pub fn difficulty(self) -> &'static str {
        match self {
            DifficultyLevel::UpTo10 => "Easy",
            DifficultyLevel::UpTo12 => "Medium",
            DifficultyLevel::UpTo15 => "Hard",
            DifficultyLevel::UpTo20 => "Expert",
        }
    }
}

impl fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.difficulty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown difficulty level: {0}")]
pub struct UnknownLevel(pub String);

impl FromStr for DifficultyLevel {
    type Err = UnknownLevel;

    /// Accepts the bare key (`"12"`), the display name (`"Up to 12"`) or the
    /// full label produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        DifficultyLevel::ALL
            .into_iter()
            .find(|level| {
                trimmed == level.key()
                    || trimmed.eq_ignore_ascii_case(&level.display_name())
                    || trimmed == level.to_string()
            })
            .ok_or_else(|| UnknownLevel(trimmed.to_string()))
    }
}

/// One multiplication question with its multiple-choice answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub multiplicand: u32,
    pub multiplier: u32,
    pub choices: [u32; CHOICE_COUNT],
    pub correct_answer_index: usize,
}

impl Question {
    pub fn new(
        multiplicand: u32,
        multiplier: u32,
        choices: [u32; CHOICE_COUNT],
        correct_answer_index: usize,
    ) -> Self {
        Self {
            multiplicand,
            multiplier,
            choices,
            correct_answer_index,
        }
    }

    pub fn correct_answer(&self) -> u32 {
        self.multiplicand * self.multiplier
    }

    pub fn is_correct(&self, choice_index: usize) -> bool {
        choice_index == self.correct_answer_index
    }

    /// Position of `value` among the choices, if it is one of them.
    pub fn index_of(&self, value: u32) -> Option<usize> {
        self.choices.iter().position(|c| *c == value)
    }

    pub fn text(&self) -> String {
        format!("{} × {}", self.multiplicand, self.multiplier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_numbers() {
        let maxes: Vec<u32> = DifficultyLevel::ALL.iter().map(|l| l.max_number()).collect();
        assert_eq!(maxes, vec![10, 12, 15, 20]);
    }

    #[test]
    fn test_level_parses_from_key_and_labels() {
        assert_eq!("15".parse::<DifficultyLevel>(), Ok(DifficultyLevel::UpTo15));
        assert_eq!(
            "up to 20".parse::<DifficultyLevel>(),
            Ok(DifficultyLevel::UpTo20)
        );
        let label = DifficultyLevel::UpTo12.to_string();
        assert_eq!(label.parse::<DifficultyLevel>(), Ok(DifficultyLevel::UpTo12));
        assert!("11".parse::<DifficultyLevel>().is_err());
    }

    #[test]
    fn test_level_serializes_as_key() {
        let json = serde_json::to_string(&DifficultyLevel::UpTo15).unwrap();
        assert_eq!(json, "\"15\"");
    }

    #[test]
    fn test_question_helpers() {
        let question = Question::new(7, 8, [54, 56, 58, 63], 1);
        assert_eq!(question.correct_answer(), 56);
        assert!(question.is_correct(1));
        assert!(!question.is_correct(0));
        assert_eq!(question.index_of(63), Some(3));
        assert_eq!(question.index_of(57), None);
        assert_eq!(question.text(), "7 × 8");
    }
}

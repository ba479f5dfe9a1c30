use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::quiz::ROUND_DURATION;

/// Lifecycle of a round. Only moves forward until the round is reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameState {
    #[default]
    Ready,
    Playing,
    Finished,
}

/// Counters for the round being played.
///
/// The transitions below are the whole scoring policy: a correct answer is
/// worth a point, a wrong one costs a point, and the score never drops below
/// zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundState {
    pub state: GameState,
    pub score: u32,
    pub time_remaining: Duration,
    pub questions_answered: u32,
    pub correct_answers: u32,
    pub current_streak: u32,
    pub best_streak: u32,
}

impl Default for RoundState {
    fn default() -> Self {
        Self {
            state: GameState::Ready,
            score: 0,
            time_remaining: ROUND_DURATION,
            questions_answered: 0,
            correct_answers: 0,
            current_streak: 0,
            best_streak: 0,
        }
    }
}

impl RoundState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer_correctly(&mut self) {
        self.score += 1;
        self.questions_answered += 1;
        self.correct_answers += 1;
        self.current_streak += 1;
        self.best_streak = self.best_streak.max(self.current_streak);
    }

    pub fn answer_incorrectly(&mut self) {
        self.score = self.score.saturating_sub(1);
        self.questions_answered += 1;
        self.current_streak = 0;
    }

    /// Share of correct answers as a percentage, `0.0` before the first answer.
    pub fn accuracy(&self) -> f64 {
        accuracy(self.correct_answers, self.questions_answered)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_time_low(&self) -> bool {
        self.time_remaining <= crate::quiz::LOW_TIME_THRESHOLD
    }

    /// Remaining time as `m:ss`.
    pub fn formatted_time(&self) -> String {
        let seconds = self.time_remaining.as_secs();
        format!("{}:{:02}", seconds / 60, seconds % 60)
    }
}

pub(crate) fn accuracy(correct_answers: u32, questions_answered: u32) -> f64 {
    if questions_answered == 0 {
        return 0.0;
    }
    f64::from(correct_answers) / f64::from(questions_answered) * 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Badge {
    FirstGame,
    Score10,
    Score20,
    Score30,
    Streak5,
    Streak10,
    AllLevels,
}

impl Badge {
    pub fn title(self) -> &'static str {
        match self {
            Badge::FirstGame => "First Steps",
            Badge::Score10 => "Double Digits",
            Badge::Score20 => "Number Wizard",
            Badge::Score30 => "Math Master",
            Badge::Streak5 => "On Fire",
            Badge::Streak10 => "Unstoppable",
            Badge::AllLevels => "All-Rounder",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Badge::FirstGame => "Finish your first game",
            Badge::Score10 => "Score 10+ points in one game",
            Badge::Score20 => "Score 20+ points in one game",
            Badge::Score30 => "Score 30+ points in one game",
            Badge::Streak5 => "Get 5 correct answers in a row",
            Badge::Streak10 => "Get 10 correct answers in a row",
            Badge::AllLevels => "Play every difficulty level",
        }
    }
}

/// Badges earned by a single finished round.
///
/// [`Badge::AllLevels`] depends on the player's history and is never
/// returned here.
pub fn earned_badges(state: &RoundState) -> Vec<Badge> {
    let mut badges = Vec::new();
    if state.score > 0 {
        badges.push(Badge::FirstGame);
    }
    for (threshold, badge) in [(10, Badge::Score10), (20, Badge::Score20), (30, Badge::Score30)] {
        if state.score >= threshold {
            badges.push(badge);
        }
    }
    for (threshold, badge) in [(5, Badge::Streak5), (10, Badge::Streak10)] {
        if state.best_streak >= threshold {
            badges.push(badge);
        }
    }
    badges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_correctly_from_zero() {
        let mut state = RoundState::new();
        state.answer_correctly();
        assert_eq!(
            (state.score, state.current_streak, state.best_streak),
            (1, 1, 1)
        );
        state.answer_correctly();
        assert_eq!(
            (state.score, state.current_streak, state.best_streak),
            (2, 2, 2)
        );
        assert_eq!(state.questions_answered, 2);
        assert_eq!(state.correct_answers, 2);
    }

    #[test]
    fn test_answer_incorrectly_floors_at_zero() {
        let mut state = RoundState::new();
        state.answer_incorrectly();
        assert_eq!(state.score, 0);
        assert_eq!(state.questions_answered, 1);

        state.answer_correctly();
        assert_eq!(state.score, 1);
        state.answer_incorrectly();
        assert_eq!(state.score, 0);
    }

    #[test]
    fn test_answer_incorrectly_keeps_best_streak() {
        let mut state = RoundState::new();
        for _ in 0..3 {
            state.answer_correctly();
        }
        state.answer_incorrectly();
        assert_eq!(state.current_streak, 0);
        assert_eq!(state.best_streak, 3);

        state.answer_correctly();
        assert_eq!(state.current_streak, 1);
        assert_eq!(state.best_streak, 3);
    }

    #[test]
    fn test_accuracy() {
        let mut state = RoundState::new();
        assert_eq!(state.accuracy(), 0.0);

        state.answer_correctly();
        state.answer_correctly();
        assert!((state.accuracy() - 100.0).abs() < f64::EPSILON);

        state.answer_incorrectly();
        state.answer_incorrectly();
        assert!((state.accuracy() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut state = RoundState::new();
        state.state = GameState::Finished;
        state.answer_correctly();
        state.time_remaining = Duration::from_secs(3);

        state.reset();
        assert_eq!(state, RoundState::default());
        assert_eq!(state.time_remaining, Duration::from_secs(60));
        assert_eq!(state.state, GameState::Ready);
    }

    #[test]
    fn test_formatted_time_and_low_time() {
        let mut state = RoundState::new();
        assert_eq!(state.formatted_time(), "1:00");
        assert!(!state.is_time_low());

        state.time_remaining = Duration::from_millis(9_900);
        assert_eq!(state.formatted_time(), "0:09");
        assert!(state.is_time_low());
    }

    #[test]
    fn test_earned_badges() {
        let mut state = RoundState::new();
        assert!(earned_badges(&state).is_empty());

        for _ in 0..12 {
            state.answer_correctly();
        }
        assert_eq!(
            earned_badges(&state),
            vec![
                Badge::FirstGame,
                Badge::Score10,
                Badge::Streak5,
                Badge::Streak10
            ]
        );
    }
}

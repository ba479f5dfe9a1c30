//! The timed round: countdown, answer submission with lockout, and the short
//! pause before the next question.
//!
//! [`GameRoundController`] is synchronous and knows nothing about clocks. The
//! caller feeds it elapsed time through [`GameRoundController::tick`] and
//! redeems the [`AdvanceTicket`] handed out by a submission once the feedback
//! delay has passed (see [`crate::quiz::runner`] for the tokio driver).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::quiz::generator::QuestionGenerator;
use crate::quiz::session::{earned_badges, Badge, GameState, RoundState};
use crate::quiz::{DifficultyLevel, Question, CHOICE_COUNT, FEEDBACK_DELAY};
use crate::records::{Leaderboard, Period, ScoreStore, ScoreSummary};

/// Where finished rounds are reported, and under which name.
#[derive(Clone)]
pub struct Records {
    pub scores: Arc<dyn ScoreStore>,
    pub leaderboard: Arc<dyn Leaderboard>,
    pub username: String,
}

impl Records {
    pub fn new(
        scores: Arc<dyn ScoreStore>,
        leaderboard: Arc<dyn Leaderboard>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            scores,
            leaderboard,
            username: username.into(),
        }
    }
}

/// Permission to move past the question that was just answered.
///
/// A ticket belongs to one answer of one round. Redeeming it after the round
/// was restarted, or a second time, does nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceTicket {
    epoch: u64,
    sequence: u32,
    delay: Duration,
}

impl AdvanceTicket {
    /// How long the answer feedback should stay visible before redeeming.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    Correct,
    Incorrect,
}

/// Everything a front-end needs to draw the round at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundSnapshot {
    pub level: DifficultyLevel,
    pub question: Question,
    pub round: RoundState,
    pub last_outcome: Option<AnswerOutcome>,
    pub selected_index: Option<usize>,
    pub answer_locked: bool,
}

/// A finished round together with what it achieved.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundResult {
    pub summary: ScoreSummary,
    pub new_all_time_best: bool,
    pub new_best_today: bool,
    pub badges: Vec<Badge>,
}

pub struct GameRoundController<R = StdRng> {
    level: DifficultyLevel,
    generator: QuestionGenerator<R>,
    round: RoundState,
    question: Question,
    selected_index: Option<usize>,
    answer_locked: bool,
    last_outcome: Option<AnswerOutcome>,
    epoch: u64,
    records: Records,
    result: Option<RoundResult>,
}

impl GameRoundController<StdRng> {
    pub fn new(level: DifficultyLevel, records: Records) -> Self {
        Self::with_rng(level, StdRng::from_entropy(), records)
    }
}

impl<R: Rng> GameRoundController<R> {
    pub fn with_rng(level: DifficultyLevel, rng: R, records: Records) -> Self {
        let mut generator = QuestionGenerator::with_rng(level, rng);
        let question = generator.generate();
        Self {
            level,
            generator,
            round: RoundState::new(),
            question,
            selected_index: None,
            answer_locked: false,
            last_outcome: None,
            epoch: 0,
            records,
            result: None,
        }
    }

    pub fn level(&self) -> DifficultyLevel {
        self.level
    }

    pub fn state(&self) -> GameState {
        self.round.state
    }

    pub fn round(&self) -> &RoundState {
        &self.round
    }

    pub fn question(&self) -> &Question {
        &self.question
    }

    pub fn is_answer_locked(&self) -> bool {
        self.answer_locked
    }

    /// Set once the clock has run out; cleared by a reset or restart.
    pub fn result(&self) -> Option<&RoundResult> {
        self.result.as_ref()
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            level: self.level,
            question: self.question.clone(),
            round: self.round.clone(),
            last_outcome: self.last_outcome,
            selected_index: self.selected_index,
            answer_locked: self.answer_locked,
        }
    }

    /// Starts a fresh round from any state. Outstanding tickets become stale.
    pub fn start_game(&mut self) {
        self.restart();
        self.round.state = GameState::Playing;
        info!(
            "round {} started on level {} for {}",
            self.epoch,
            self.level.key(),
            self.records.username
        );
    }

    /// Back to `Ready` from any state. Outstanding tickets become stale.
    pub fn reset_game(&mut self) {
        self.restart();
        debug!("round reset to ready (epoch {})", self.epoch);
    }

    fn restart(&mut self) {
        self.epoch += 1;
        self.round.reset();
        self.generator.reset();
        self.question = self.generator.generate();
        self.selected_index = None;
        self.answer_locked = false;
        self.last_outcome = None;
        self.result = None;
    }

    /// Runs the clock forward by `elapsed`. Returns `true` if this tick ended
    /// the round.
    pub fn tick(&mut self, elapsed: Duration) -> bool {
        if self.round.state != GameState::Playing {
            return false;
        }
        self.round.time_remaining = self.round.time_remaining.saturating_sub(elapsed);
        if self.round.time_remaining.is_zero() {
            self.finish();
            return true;
        }
        false
    }

    /// Whether a tick of `elapsed` would end the round.
    pub fn is_final_tick(&self, elapsed: Duration) -> bool {
        self.round.state == GameState::Playing && self.round.time_remaining <= elapsed
    }

    /// Answers the current question with the choice at `choice_index`.
    ///
    /// Ignored (returns `None`) unless a round is being played, no earlier
    /// answer is still awaiting its advance, and the index names one of the
    /// choices.
    pub fn submit_answer(&mut self, choice_index: usize) -> Option<AdvanceTicket> {
        if self.round.state != GameState::Playing
            || self.answer_locked
            || choice_index >= CHOICE_COUNT
        {
            return None;
        }

        self.answer_locked = true;
        self.selected_index = Some(choice_index);

        let outcome = if self.question.is_correct(choice_index) {
            self.round.answer_correctly();
            AnswerOutcome::Correct
        } else {
            self.round.answer_incorrectly();
            AnswerOutcome::Incorrect
        };
        self.last_outcome = Some(outcome);
        debug!(
            "{} = {} answered {:?} (score {}, streak {})",
            self.question.text(),
            self.question.choices[choice_index],
            outcome,
            self.round.score,
            self.round.current_streak
        );

        Some(AdvanceTicket {
            epoch: self.epoch,
            sequence: self.round.questions_answered,
            delay: FEEDBACK_DELAY,
        })
    }

    /// Moves to the next question. Returns `false` for stale or repeated
    /// tickets and once the round is over.
    pub fn advance(&mut self, ticket: AdvanceTicket) -> bool {
        if ticket.epoch != self.epoch
            || ticket.sequence != self.round.questions_answered
            || !self.answer_locked
            || self.round.state != GameState::Playing
        {
            return false;
        }

        self.selected_index = None;
        self.answer_locked = false;
        self.last_outcome = None;
        self.question = self.generator.generate();
        true
    }

    fn finish(&mut self) {
        self.round.time_remaining = Duration::ZERO;
        self.round.state = GameState::Finished;

        let summary = ScoreSummary::from_round(&self.round, self.level, Utc::now());
        let scores = &self.records.scores;

        // compare against the history before this round joins it
        let is_record = |period| {
            scores
                .is_new_high_score(summary.score, self.level, period)
                .unwrap_or_else(|err| {
                    warn!("could not look up best score: {}", err);
                    false
                })
        };
        let new_all_time_best = is_record(Period::AllTime);
        let new_best_today = is_record(Period::Today);

        if let Err(err) = scores.save(&summary) {
            warn!("failed to save score locally: {}", err);
        }
        if let Err(err) = self
            .records
            .leaderboard
            .publish(&summary, &self.records.username)
        {
            warn!("failed to publish score to the leaderboard: {}", err);
        }

        let mut badges = earned_badges(&self.round);
        match scores.levels_played() {
            Ok(levels) if levels.len() == DifficultyLevel::ALL.len() => {
                badges.push(Badge::AllLevels)
            }
            Ok(_) => {}
            Err(err) => warn!("could not read played levels: {}", err),
        }

        info!(
            "round {} finished: {} points, {}/{} correct",
            self.epoch, summary.score, summary.correct_answers, summary.questions_answered
        );
        self.result = Some(RoundResult {
            summary,
            new_all_time_best,
            new_best_today,
            badges,
        });
    }
}

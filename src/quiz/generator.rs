use std::collections::VecDeque;

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::quiz::{DifficultyLevel, Question, CHOICE_COUNT};

/// How many recent operand pairs are kept out of rotation.
pub const HISTORY_SIZE: usize = 5;
/// Upper bound on draws before a constraint gets relaxed.
pub const MAX_ATTEMPTS: usize = 1000;

/// The last few operand pairs handed out, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecentQuestionHistory {
    pairs: VecDeque<(u32, u32)>,
}

impl RecentQuestionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pairs are unordered here: `3 × 7` and `7 × 3` count as the same question.
    pub fn contains(&self, a: u32, b: u32) -> bool {
        self.pairs
            .iter()
            .any(|&pair| pair == (a, b) || pair == (b, a))
    }

    pub fn push(&mut self, a: u32, b: u32) {
        self.pairs.push_back((a, b));
        while self.pairs.len() > HISTORY_SIZE {
            self.pairs.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(u32, u32)> {
        self.pairs.iter()
    }
}

/// Ways of producing a wrong answer that still looks believable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Distractor {
    /// Correct answer nudged by one or two.
    OffBySmall,
    /// Operands added instead of multiplied.
    AdditionConfusion,
    /// Some other product from the same table range.
    WrongMultiplication,
    /// Correct answer scaled by 70%..130%.
    PercentageOff,
    /// Tens and ones digits swapped.
    DigitSwap,
}

impl Distractor {
    const ALL: [Distractor; 5] = [
        Distractor::OffBySmall,
        Distractor::AdditionConfusion,
        Distractor::WrongMultiplication,
        Distractor::PercentageOff,
        Distractor::DigitSwap,
    ];
}

pub struct QuestionGenerator<R = StdRng> {
    level: DifficultyLevel,
    max_number: u32,
    history: RecentQuestionHistory,
    rng: R,
}

impl QuestionGenerator<StdRng> {
    pub fn new(level: DifficultyLevel) -> Self {
        Self::with_rng(level, StdRng::from_entropy())
    }
}

impl<R: Rng> QuestionGenerator<R> {
    pub fn with_rng(level: DifficultyLevel, rng: R) -> Self {
        Self {
            level,
            max_number: level.max_number(),
            history: RecentQuestionHistory::new(),
            rng,
        }
    }

    /// Generator with an arbitrary operand bound; used to exercise tiny ranges.
    #[cfg(test)]
    pub(crate) fn with_max_number(max_number: u32, rng: R) -> Self {
        Self {
            level: DifficultyLevel::default(),
            max_number: max_number.max(1),
            history: RecentQuestionHistory::new(),
            rng,
        }
    }

    pub fn level(&self) -> DifficultyLevel {
        self.level
    }

    pub fn history(&self) -> &RecentQuestionHistory {
        &self.history
    }

    pub fn generate(&mut self) -> Question {
        let (multiplicand, multiplier) = self.draw_operands();
        self.history.push(multiplicand, multiplier);

        let correct_answer = multiplicand * multiplier;
        let choices = self.generate_choices(correct_answer);
        let correct_answer_index = choices
            .iter()
            .position(|c| *c == correct_answer)
            .unwrap_or(0);

        debug!(
            "generated {} × {} with choices {:?}",
            multiplicand, multiplier, choices
        );
        Question::new(multiplicand, multiplier, choices, correct_answer_index)
    }

    /// Forgets recent questions. The level and random source are kept.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    fn draw_operands(&mut self) -> (u32, u32) {
        let mut pair = (1, 1);
        for _ in 0..MAX_ATTEMPTS {
            pair = (
                self.rng.gen_range(1..=self.max_number),
                self.rng.gen_range(1..=self.max_number),
            );
            if !self.history.contains(pair.0, pair.1) {
                return pair;
            }
        }
        warn!(
            "no fresh operand pair within {} draws (max number {}), allowing a repeat",
            MAX_ATTEMPTS, self.max_number
        );
        pair
    }

    fn generate_choices(&mut self, correct_answer: u32) -> [u32; CHOICE_COUNT] {
        let ceiling = i64::from(self.max_number) * i64::from(self.max_number);
        let mut choices = [correct_answer; CHOICE_COUNT];
        let mut filled = 1;

        let mut attempts = 0;
        while filled < CHOICE_COUNT && attempts < MAX_ATTEMPTS {
            attempts += 1;
            let strategy = Distractor::ALL[self.rng.gen_range(0..Distractor::ALL.len())];
            let candidate = self.distractor(strategy, correct_answer);

            if candidate <= 0 || candidate > ceiling || candidate == i64::from(correct_answer) {
                continue;
            }
            let candidate = candidate as u32;
            if choices[..filled].contains(&candidate) {
                continue;
            }
            choices[filled] = candidate;
            filled += 1;
        }

        if filled < CHOICE_COUNT {
            warn!(
                "only {} distractors for {} within {} attempts, filling upwards",
                filled - 1,
                correct_answer,
                MAX_ATTEMPTS
            );
            let mut next = correct_answer + 1;
            while filled < CHOICE_COUNT {
                if !choices[..filled].contains(&next) {
                    choices[filled] = next;
                    filled += 1;
                }
                next += 1;
            }
        }

        choices.shuffle(&mut self.rng);
        choices
    }

    fn distractor(&mut self, strategy: Distractor, correct_answer: u32) -> i64 {
        let correct = i64::from(correct_answer);
        let max = self.max_number;
        match strategy {
            Distractor::OffBySmall => {
                let deltas = [-2, -1, 1, 2];
                correct + deltas[self.rng.gen_range(0..deltas.len())]
            }
            Distractor::AdditionConfusion => {
                i64::from(self.rng.gen_range(1..=max)) + i64::from(self.rng.gen_range(1..=max))
            }
            Distractor::WrongMultiplication => {
                i64::from(self.rng.gen_range(1..=max)) * i64::from(self.rng.gen_range(1..=max))
            }
            Distractor::PercentageOff => {
                let factor: f64 = self.rng.gen_range(0.7..=1.3);
                (correct as f64 * factor) as i64
            }
            Distractor::DigitSwap => {
                if correct < 10 {
                    correct + self.rng.gen_range(1..=5)
                } else {
                    swap_tens_and_ones(correct)
                }
            }
        }
    }
}

/// Swaps the tens and ones digits, leaving everything above untouched:
/// `42 -> 24`, `156 -> 165`, `400 -> 400`.
pub fn swap_tens_and_ones(number: i64) -> i64 {
    let hundreds = number / 100;
    let tens = (number / 10) % 10;
    let ones = number % 10;
    hundreds * 100 + ones * 10 + tens
}

//! Integration tests for the tokio round driver. Time is paused, so the
//! 60-second countdown runs instantly and deterministically.

use std::sync::Arc;
use std::time::Duration;

use mathblitz::quiz::round::{AnswerOutcome, GameRoundController, Records};
use mathblitz::quiz::runner::{self, RoundHandle, RoundUpdate};
use mathblitz::quiz::session::GameState;
use mathblitz::quiz::{DifficultyLevel, FEEDBACK_DELAY, ROUND_DURATION};
use mathblitz::records::{LocalScores, SharedLeaderboard};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::{timeout, Instant};

fn spawn_round(seed: u64) -> (RoundHandle, UnboundedReceiver<RoundUpdate>, Arc<LocalScores>) {
    let scores = Arc::new(LocalScores::in_memory());
    let records = Records::new(
        scores.clone(),
        Arc::new(SharedLeaderboard::in_memory()),
        "Runner",
    );
    let rng = StdRng::seed_from_u64(seed);
    let controller = GameRoundController::with_rng(DifficultyLevel::UpTo10, rng, records);
    let (tx, rx) = mpsc::unbounded_channel();
    (runner::spawn(controller, tx), rx, scores)
}

async fn next(updates: &mut UnboundedReceiver<RoundUpdate>) -> RoundUpdate {
    updates.recv().await.expect("round task ended early")
}

#[tokio::test(start_paused = true)]
async fn test_answer_then_next_question_after_delay() {
    let (handle, mut updates, _) = spawn_round(1);
    assert!(handle.start());

    let started = match next(&mut updates).await {
        RoundUpdate::Started(snapshot) => snapshot,
        other => panic!("expected Started, got {:?}", other),
    };
    assert_eq!(started.round.state, GameState::Playing);
    assert_eq!(started.round.time_remaining, ROUND_DURATION);

    let answered_at = Instant::now();
    assert!(handle.submit_value(started.question.correct_answer()));

    match next(&mut updates).await {
        RoundUpdate::Answered(snapshot) => {
            assert_eq!(snapshot.last_outcome, Some(AnswerOutcome::Correct));
            assert!(snapshot.answer_locked);
            assert_eq!(snapshot.round.score, 1);
        }
        other => panic!("expected Answered, got {:?}", other),
    }

    match next(&mut updates).await {
        RoundUpdate::NextQuestion(snapshot) => {
            assert!(answered_at.elapsed() >= FEEDBACK_DELAY);
            assert!(!snapshot.answer_locked);
            assert_eq!(snapshot.last_outcome, None);
            assert_eq!(snapshot.round.questions_answered, 1);
        }
        other => panic!("expected NextQuestion, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_round_runs_out_after_a_minute() {
    let (handle, mut updates, scores) = spawn_round(2);
    let started_at = Instant::now();
    handle.start();
    assert!(matches!(next(&mut updates).await, RoundUpdate::Started(_)));

    let mut saw_time_low = false;
    let (snapshot, result) = loop {
        match next(&mut updates).await {
            RoundUpdate::TimeLow(snapshot) => {
                assert!(!saw_time_low, "low time is announced once");
                assert!(snapshot.round.is_time_low());
                saw_time_low = true;
            }
            RoundUpdate::Finished { snapshot, result } => break (snapshot, result),
            other => panic!("unexpected update {:?}", other),
        }
    };

    assert!(saw_time_low);
    assert!(started_at.elapsed() >= ROUND_DURATION);
    assert_eq!(snapshot.round.state, GameState::Finished);
    assert_eq!(snapshot.round.time_remaining, Duration::ZERO);
    assert_eq!(result.summary.score, 0);
    assert_eq!(scores.len(), 1);

    // a finished round takes no more commands
    assert!(updates.recv().await.is_none());
    assert!(handle.is_closed());
    assert!(!handle.stop());
    assert_eq!(scores.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_handles_know_their_round() {
    let (first, _first_updates, _) = spawn_round(6);
    let (second, _second_updates, _) = spawn_round(7);

    assert!(first.same_round(&first.clone()));
    assert!(!first.same_round(&second));
}

#[tokio::test(start_paused = true)]
async fn test_reset_cancels_pending_advance() {
    let (handle, mut updates, _) = spawn_round(3);
    handle.start();
    let started = match next(&mut updates).await {
        RoundUpdate::Started(snapshot) => snapshot,
        other => panic!("expected Started, got {:?}", other),
    };

    handle.submit(started.question.correct_answer_index);
    assert!(matches!(next(&mut updates).await, RoundUpdate::Answered(_)));

    handle.reset();
    match next(&mut updates).await {
        RoundUpdate::Reset(snapshot) => {
            assert_eq!(snapshot.round.state, GameState::Ready);
            assert_eq!(snapshot.round.score, 0);
            assert!(!snapshot.answer_locked);
        }
        other => panic!("expected Reset, got {:?}", other),
    }

    // the advance scheduled for the old answer fires into a reset round
    let late = timeout(FEEDBACK_DELAY * 3, updates.recv()).await;
    assert!(late.is_err(), "stale advance produced {:?}", late);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_value_is_ignored() {
    let (handle, mut updates, _) = spawn_round(4);
    handle.start();
    let started = match next(&mut updates).await {
        RoundUpdate::Started(snapshot) => snapshot,
        other => panic!("expected Started, got {:?}", other),
    };

    let missing = (1..)
        .find(|value| started.question.index_of(*value).is_none())
        .unwrap();
    handle.submit_value(missing);
    assert!(timeout(Duration::from_secs(1), updates.recv()).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_stop_ends_the_task() {
    let (handle, mut updates, scores) = spawn_round(5);
    handle.start();
    assert!(matches!(next(&mut updates).await, RoundUpdate::Started(_)));

    assert!(handle.stop());
    assert!(updates.recv().await.is_none());
    assert!(handle.is_closed());
    assert!(!handle.start());
    assert!(scores.is_empty(), "a stopped round is not recorded");
}

//! Drives a [`GameRoundController`] on the tokio runtime.
//!
//! Every trigger (front-end commands, countdown ticks, deferred advances)
//! is handled by one task, one event at a time, so two scoring transitions
//! can never race for the same question.

use std::time::Duration;

use log::debug;
use rand::Rng;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::task;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::quiz::round::{AdvanceTicket, GameRoundController, RoundResult, RoundSnapshot};
use crate::quiz::session::GameState;
use crate::quiz::TICK_INTERVAL;

#[derive(Debug)]
enum RoundEvent {
    Start,
    Reset,
    Submit(usize),
    SubmitValue(u32),
    Advance(AdvanceTicket),
    Stop,
}

/// What happened to the round, in the order it happened.
#[derive(Debug, Clone)]
pub enum RoundUpdate {
    Started(RoundSnapshot),
    /// An answer was accepted; the snapshot carries the outcome to flash.
    Answered(RoundSnapshot),
    NextQuestion(RoundSnapshot),
    /// Sent once per round when the clock drops to the low-time threshold.
    TimeLow(RoundSnapshot),
    Finished {
        snapshot: RoundSnapshot,
        result: RoundResult,
    },
    Reset(RoundSnapshot),
}

/// Cheap, cloneable way to poke a running round.
///
/// Every method returns `false` once the round task has stopped.
#[derive(Debug, Clone)]
pub struct RoundHandle {
    events: UnboundedSender<RoundEvent>,
}

impl RoundHandle {
    pub fn start(&self) -> bool {
        self.events.send(RoundEvent::Start).is_ok()
    }

    pub fn reset(&self) -> bool {
        self.events.send(RoundEvent::Reset).is_ok()
    }

    pub fn submit(&self, choice_index: usize) -> bool {
        self.events.send(RoundEvent::Submit(choice_index)).is_ok()
    }

    /// Answers with the choice showing `value`; values that are not among the
    /// current choices are ignored by the round.
    pub fn submit_value(&self, value: u32) -> bool {
        self.events.send(RoundEvent::SubmitValue(value)).is_ok()
    }

    pub fn stop(&self) -> bool {
        self.events.send(RoundEvent::Stop).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }

    /// Whether both handles drive the same round task.
    pub fn same_round(&self, other: &RoundHandle) -> bool {
        self.events.same_channel(&other.events)
    }
}

/// Moves `controller` into its own task and returns a handle to it.
///
/// A task plays one round. It ends right after sending
/// [`RoundUpdate::Finished`], on [`RoundHandle::stop`], when every handle is
/// dropped, or when nobody listens to `updates` any more.
pub fn spawn<R>(
    controller: GameRoundController<R>,
    updates: UnboundedSender<RoundUpdate>,
) -> RoundHandle
where
    R: Rng + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let scheduler = tx.downgrade();
    tokio::spawn(run(controller, rx, scheduler, updates));
    RoundHandle { events: tx }
}

async fn run<R: Rng>(
    mut controller: GameRoundController<R>,
    mut events: UnboundedReceiver<RoundEvent>,
    scheduler: WeakUnboundedSender<RoundEvent>,
    updates: UnboundedSender<RoundUpdate>,
) {
    let mut ticker = time::interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_tick = Instant::now();
    let mut warned_low_time = false;

    loop {
        let playing = controller.state() == GameState::Playing;
        let update = tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    RoundEvent::Start => {
                        controller.start_game();
                        ticker.reset();
                        last_tick = Instant::now();
                        warned_low_time = false;
                        Some(RoundUpdate::Started(controller.snapshot()))
                    }
                    RoundEvent::Reset => {
                        controller.reset_game();
                        Some(RoundUpdate::Reset(controller.snapshot()))
                    }
                    RoundEvent::Submit(choice_index) => {
                        submit(&mut controller, &scheduler, choice_index)
                    }
                    RoundEvent::SubmitValue(value) => match controller.question().index_of(value) {
                        Some(choice_index) => submit(&mut controller, &scheduler, choice_index),
                        None => None,
                    },
                    RoundEvent::Advance(ticket) => controller
                        .advance(ticket)
                        .then(|| RoundUpdate::NextQuestion(controller.snapshot())),
                    RoundEvent::Stop => break,
                }
            }
            now = ticker.tick(), if playing => {
                let elapsed = now.saturating_duration_since(last_tick);
                last_tick = now;
                if tick(&mut controller, elapsed) {
                    controller.result().cloned().map(|result| RoundUpdate::Finished {
                        snapshot: controller.snapshot(),
                        result,
                    })
                } else if !warned_low_time && controller.round().is_time_low() {
                    warned_low_time = true;
                    Some(RoundUpdate::TimeLow(controller.snapshot()))
                } else {
                    None
                }
            }
        };

        if let Some(update) = update {
            let finished = matches!(update, RoundUpdate::Finished { .. });
            if updates.send(update).is_err() {
                debug!("round listener went away, stopping");
                break;
            }
            if finished {
                break;
            }
        }
    }
    debug!("round task for level {} ended", controller.level().key());
}

/// Ticks the controller. The tick that ends the round saves and publishes the
/// score to disk, so on a multi-threaded runtime it runs with
/// [`task::block_in_place`] to keep the worker's other tasks moving.
fn tick<R: Rng>(controller: &mut GameRoundController<R>, elapsed: Duration) -> bool {
    let multi_thread = Handle::try_current()
        .map(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread)
        .unwrap_or(false);
    if multi_thread && controller.is_final_tick(elapsed) {
        task::block_in_place(|| controller.tick(elapsed))
    } else {
        controller.tick(elapsed)
    }
}

fn submit<R: Rng>(
    controller: &mut GameRoundController<R>,
    scheduler: &WeakUnboundedSender<RoundEvent>,
    choice_index: usize,
) -> Option<RoundUpdate> {
    let ticket = controller.submit_answer(choice_index)?;
    schedule_advance(scheduler, ticket);
    Some(RoundUpdate::Answered(controller.snapshot()))
}

/// Feeds `ticket` back into the round's own queue once its delay has passed.
fn schedule_advance(scheduler: &WeakUnboundedSender<RoundEvent>, ticket: AdvanceTicket) {
    let scheduler = scheduler.clone();
    tokio::spawn(async move {
        time::sleep(ticket.delay()).await;
        if let Some(events) = scheduler.upgrade() {
            let _ = events.send(RoundEvent::Advance(ticket));
        }
    });
}

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use dotenv::dotenv;
use log::{debug, warn};
use mathblitz::{
    config::Config,
    profile::normalize_username,
    quiz::{
        round::{AnswerOutcome, GameRoundController, Records, RoundResult, RoundSnapshot},
        runner::{self, RoundHandle, RoundUpdate},
        DifficultyLevel, ROUND_DURATION,
    },
    records::{
        Leaderboard, LeaderboardEntry, LocalScores, Period, RecordsError, ScoreStore, ScoreSummary,
        SharedLeaderboard,
    },
};
use teloxide::{
    dispatching::dialogue::{serializer::Json, ErasedStorage, SqliteStorage, Storage},
    prelude::*,
    types::{KeyboardButton, KeyboardMarkup, ParseMode},
};
use tokio::sync::mpsc::{self, UnboundedReceiver};

type BlitzDialogue = Dialogue<State, ErasedStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub enum State {
    #[default]
    Start,
    ReceiveUsername {
        level: DifficultyLevel,
    },
    Menu {
        username: String,
        level: DifficultyLevel,
    },
    ReceiveLevel {
        username: String,
        level: DifficultyLevel,
    },
    Playing {
        username: String,
        level: DifficultyLevel,
    },
}

type DialogueStorage = std::sync::Arc<ErasedStorage<State>>;

/// Shared by every handler: settings, the global leaderboard and the rounds
/// currently running, one per chat.
struct Blitz {
    config: Config,
    leaderboard: Arc<SharedLeaderboard>,
    rounds: Mutex<HashMap<ChatId, RoundHandle>>,
}

impl Blitz {
    fn insert_round(&self, chat_id: ChatId, handle: RoundHandle) {
        if let Ok(mut rounds) = self.rounds.lock() {
            if let Some(previous) = rounds.insert(chat_id, handle) {
                previous.stop();
            }
        }
    }

    fn round(&self, chat_id: ChatId) -> Option<RoundHandle> {
        self.rounds
            .lock()
            .ok()
            .and_then(|rounds| rounds.get(&chat_id).cloned())
            .filter(|handle| !handle.is_closed())
    }

    /// Stops and forgets `handle` if it is still the chat's current round.
    /// Returns `false` when a newer round has taken its place.
    fn end_round(&self, chat_id: ChatId, handle: &RoundHandle) -> bool {
        let Ok(mut rounds) = self.rounds.lock() else {
            return false;
        };
        match rounds.get(&chat_id) {
            Some(current) if current.same_round(handle) => {
                rounds.remove(&chat_id);
                handle.stop();
                true
            }
            _ => false,
        }
    }

    fn personal_scores(&self, chat_id: ChatId) -> Result<LocalScores, RecordsError> {
        LocalScores::open(self.config.scores_path(chat_id.0))
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    pretty_env_logger::init();
    log::info!("Starting MathBlitz bot...");

    let config = Config::from_env().expect("Invalid configuration");
    let bot = Bot::from_env();

    log::info!("Opening dialogue storage at {}", config.dialogue_db);
    let storage: DialogueStorage = SqliteStorage::open(&config.dialogue_db, Json)
        .await
        .expect("Failed to open dialogue storage")
        .erase();

    let leaderboard = Arc::new(
        SharedLeaderboard::open(&config.leaderboard_path).expect("Failed to load the leaderboard"),
    );

    let blitz = Arc::new(Blitz {
        config,
        leaderboard,
        rounds: Mutex::new(HashMap::new()),
    });

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, ErasedStorage<State>, State>()
            .branch(dptree::case![State::Start].endpoint(start))
            .branch(dptree::case![State::ReceiveUsername { level }].endpoint(receive_username))
            .branch(dptree::case![State::Menu { username, level }].endpoint(menu))
            .branch(dptree::case![State::ReceiveLevel { username, level }].endpoint(receive_level))
            .branch(dptree::case![State::Playing { username, level }].endpoint(playing)),
    )
    .dependencies(dptree::deps![storage, blitz])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;
}

const PLAY: &str = "▶️ Play";
const CHANGE_LEVEL: &str = "🎚 Level";
const MY_SCORES: &str = "🏅 My scores";
const LEADERBOARD: &str = "🏆 Leaderboard";
const CHANGE_NAME: &str = "✏️ Name";
const STOP: &str = "⏹ Stop";

const GREETING_TEXT: &str = "Hi! I'm MathBlitz. You get one minute to answer as many \
    multiplication questions as you can. What should I call you on the leaderboard?";

fn menu_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(PLAY), KeyboardButton::new(CHANGE_LEVEL)],
        vec![
            KeyboardButton::new(MY_SCORES),
            KeyboardButton::new(LEADERBOARD),
            KeyboardButton::new(CHANGE_NAME),
        ],
    ])
}

fn level_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(
        DifficultyLevel::ALL
            .chunks(2)
            .map(|row| {
                row.iter()
                    .map(|level| KeyboardButton::new(level.to_string()))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>(),
    )
}

/// Two rows of two answers, then a stop button.
fn answer_keyboard(snapshot: &RoundSnapshot) -> KeyboardMarkup {
    let mut rows = snapshot
        .question
        .choices
        .chunks(2)
        .map(|row| {
            row.iter()
                .map(|choice| KeyboardButton::new(choice.to_string()))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    rows.push(vec![KeyboardButton::new(STOP)]);
    KeyboardMarkup::new(rows)
}

async fn start(bot: Bot, dialogue: BlitzDialogue, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, GREETING_TEXT).await?;
    dialogue
        .update(State::ReceiveUsername {
            level: DifficultyLevel::default(),
        })
        .await?;
    Ok(())
}

async fn receive_username(
    bot: Bot,
    dialogue: BlitzDialogue,
    level: DifficultyLevel,
    msg: Message,
) -> HandlerResult {
    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, "Please send your name as text")
            .await?;
        return Ok(());
    };

    let username = match normalize_username(text) {
        Ok(username) => username,
        Err(err) => {
            bot.send_message(msg.chat.id, format!("That won't work: {}. Try again?", err))
                .await?;
            return Ok(());
        }
    };

    bot.send_message(
        msg.chat.id,
        format!("Nice to meet you, {}! Current level: {}", username, level),
    )
    .reply_markup(menu_keyboard())
    .await?;

    dialogue.update(State::Menu { username, level }).await?;
    Ok(())
}

async fn menu(
    bot: Bot,
    dialogue: BlitzDialogue,
    blitz: Arc<Blitz>,
    (username, level): (String, DifficultyLevel),
    msg: Message,
) -> HandlerResult {
    match msg.text() {
        Some(PLAY) => start_round(bot, dialogue, blitz, msg.chat.id, username, level).await,
        Some(CHANGE_LEVEL) => {
            bot.send_message(msg.chat.id, "Pick a level")
                .reply_markup(level_keyboard())
                .await?;
            dialogue
                .update(State::ReceiveLevel { username, level })
                .await?;
            Ok(())
        }
        Some(MY_SCORES) => {
            let text = match blitz.personal_scores(msg.chat.id) {
                Ok(scores) => format_personal_scores(&scores)?,
                Err(err) => {
                    warn!("could not read scores for {}: {}", msg.chat.id.0, err);
                    "Your scores are unavailable right now.".to_string()
                }
            };
            bot.send_message(msg.chat.id, text)
                .parse_mode(ParseMode::Html)
                .reply_markup(menu_keyboard())
                .await?;
            Ok(())
        }
        Some(LEADERBOARD) => {
            let entries = blitz
                .leaderboard
                .top(level, blitz.config.leaderboard_size)?;
            let text = format_leaderboard(level, &username, &entries);
            bot.send_message(msg.chat.id, text)
                .parse_mode(ParseMode::Html)
                .reply_markup(menu_keyboard())
                .await?;
            Ok(())
        }
        Some(CHANGE_NAME) => {
            bot.send_message(msg.chat.id, "What name should I use?")
                .await?;
            dialogue.update(State::ReceiveUsername { level }).await?;
            Ok(())
        }
        _ => {
            bot.send_message(msg.chat.id, "Please pick one of the options")
                .reply_markup(menu_keyboard())
                .await?;
            Ok(())
        }
    }
}

async fn receive_level(
    bot: Bot,
    dialogue: BlitzDialogue,
    (username, level): (String, DifficultyLevel),
    msg: Message,
) -> HandlerResult {
    let chosen = msg.text().and_then(|text| text.parse::<DifficultyLevel>().ok());
    let Some(chosen) = chosen else {
        bot.send_message(msg.chat.id, format!("Please pick one of the levels (still {})", level))
            .reply_markup(level_keyboard())
            .await?;
        return Ok(());
    };

    bot.send_message(
        msg.chat.id,
        format!(
            "Level set to {}: numbers up to {}",
            chosen,
            chosen.max_number()
        ),
    )
    .reply_markup(menu_keyboard())
    .await?;
    dialogue
        .update(State::Menu {
            username,
            level: chosen,
        })
        .await?;
    Ok(())
}

async fn playing(
    bot: Bot,
    dialogue: BlitzDialogue,
    blitz: Arc<Blitz>,
    (username, level): (String, DifficultyLevel),
    msg: Message,
) -> HandlerResult {
    let Some(handle) = blitz.round(msg.chat.id) else {
        // the bot restarted mid-round; the dialogue outlived the round
        bot.send_message(msg.chat.id, "That round is over. Ready for another one?")
            .reply_markup(menu_keyboard())
            .await?;
        dialogue.update(State::Menu { username, level }).await?;
        return Ok(());
    };

    match msg.text() {
        Some(STOP) => {
            blitz.end_round(msg.chat.id, &handle);
            bot.send_message(msg.chat.id, "Round stopped. Nothing was recorded.")
                .reply_markup(menu_keyboard())
                .await?;
            dialogue.update(State::Menu { username, level }).await?;
        }
        Some(text) => match text.trim().parse::<u32>() {
            Ok(value) => {
                handle.submit_value(value);
            }
            Err(_) => {
                bot.send_message(msg.chat.id, "Tap one of the answers below")
                    .await?;
            }
        },
        None => {}
    }
    Ok(())
}

async fn start_round(
    bot: Bot,
    dialogue: BlitzDialogue,
    blitz: Arc<Blitz>,
    chat_id: ChatId,
    username: String,
    level: DifficultyLevel,
) -> HandlerResult {
    let scores = match blitz.personal_scores(chat_id) {
        Ok(scores) => scores,
        Err(err) => {
            warn!("could not open scores for {}: {}", chat_id.0, err);
            LocalScores::in_memory()
        }
    };
    let scores: Arc<dyn ScoreStore> = Arc::new(scores);
    let leaderboard: Arc<dyn Leaderboard> = blitz.leaderboard.clone();
    let records = Records::new(scores, leaderboard, username.clone());

    let (updates_tx, updates_rx) = mpsc::unbounded_channel();
    let handle = runner::spawn(GameRoundController::new(level, records), updates_tx);
    blitz.insert_round(chat_id, handle.clone());

    bot.send_message(
        chat_id,
        format!(
            "{} seconds, go! Each correct answer is +1, a wrong one is -1.",
            ROUND_DURATION.as_secs()
        ),
    )
    .await?;
    dialogue
        .update(State::Playing {
            username: username.clone(),
            level,
        })
        .await?;

    tokio::spawn(relay_updates(
        bot,
        dialogue,
        blitz,
        (chat_id, handle.clone()),
        (username, level),
        updates_rx,
    ));
    handle.start();
    Ok(())
}

/// Turns round updates into chat messages until the round finishes.
async fn relay_updates(
    bot: Bot,
    dialogue: BlitzDialogue,
    blitz: Arc<Blitz>,
    (chat_id, handle): (ChatId, RoundHandle),
    (username, level): (String, DifficultyLevel),
    mut updates: UnboundedReceiver<RoundUpdate>,
) {
    while let Some(update) = updates.recv().await {
        // forget the round before the results go out, so a Stop arriving
        // meanwhile is not taken for an abandoned round
        let still_current = match update {
            RoundUpdate::Finished { .. } => Some(blitz.end_round(chat_id, &handle)),
            _ => None,
        };
        if let Err(err) = render_update(&bot, chat_id, update).await {
            warn!("could not send round update to {}: {}", chat_id.0, err);
        }
        match still_current {
            Some(true) => {
                if let Err(err) = dialogue.update(State::Menu { username, level }).await {
                    warn!("could not return {} to the menu: {}", chat_id.0, err);
                }
                break;
            }
            Some(false) => break,
            None => {}
        }
    }
    debug!("stopped relaying round updates for {}", chat_id.0);
}

async fn render_update(bot: &Bot, chat_id: ChatId, update: RoundUpdate) -> HandlerResult {
    match update {
        RoundUpdate::Started(snapshot) | RoundUpdate::NextQuestion(snapshot) => {
            bot.send_message(chat_id, format_question(&snapshot))
                .parse_mode(ParseMode::Html)
                .reply_markup(answer_keyboard(&snapshot))
                .await?;
        }
        RoundUpdate::Answered(snapshot) => {
            bot.send_message(chat_id, format_feedback(&snapshot)).await?;
        }
        RoundUpdate::TimeLow(snapshot) => {
            bot.send_message(
                chat_id,
                format!("⏳ {} left!", snapshot.round.formatted_time()),
            )
            .await?;
        }
        RoundUpdate::Finished { snapshot, result } => {
            bot.send_message(chat_id, format_result(&snapshot, &result))
                .parse_mode(ParseMode::Html)
                .reply_markup(menu_keyboard())
                .await?;
        }
        RoundUpdate::Reset(_) => {}
    }
    Ok(())
}

fn format_question(snapshot: &RoundSnapshot) -> String {
    format!(
        "<b>{} = ?</b>\n⏱ {}   ⭐ {}   🔥 {}",
        snapshot.question.text(),
        snapshot.round.formatted_time(),
        snapshot.round.score,
        snapshot.round.current_streak
    )
}

fn format_feedback(snapshot: &RoundSnapshot) -> String {
    match snapshot.last_outcome {
        Some(AnswerOutcome::Correct) => {
            format!("✅ Correct! Streak {}", snapshot.round.current_streak)
        }
        _ => format!(
            "❌ {} = {}",
            snapshot.question.text(),
            snapshot.question.correct_answer()
        ),
    }
}

fn format_result(snapshot: &RoundSnapshot, result: &RoundResult) -> String {
    let summary = &result.summary;
    let mut text = format!(
        "⌛ <b>Time's up!</b> {}\n\nScore: <b>{}</b>\nAnswered: {}\nCorrect: {}\n\
         Accuracy: {:.0}%\nBest streak: {}",
        snapshot.level,
        summary.score,
        summary.questions_answered,
        summary.correct_answers,
        summary.accuracy(),
        summary.best_streak
    );
    if result.new_all_time_best {
        text.push_str("\n\n🎉 <b>NEW RECORD!</b>");
    } else if result.new_best_today {
        text.push_str("\n\n🌟 <b>Best of today!</b>");
    }
    if !result.badges.is_empty() {
        text.push_str("\n\nBadges earned:");
        for badge in &result.badges {
            text.push_str(&format!("\n• <b>{}</b>: {}", badge.title(), badge.description()));
        }
    }
    text
}

fn format_personal_scores(scores: &LocalScores) -> Result<String, RecordsError> {
    if scores.is_empty() {
        return Ok("No games yet. Tap Play to set your first score!".to_string());
    }

    let mut text = String::from("<b>Your best scores</b> (today / all time)");
    for level in DifficultyLevel::ALL {
        let today = scores.best_score(level, Period::Today)?;
        let all_time = scores.best_score(level, Period::AllTime)?;
        let show = |best: Option<ScoreSummary>| {
            best.map(|s| s.score.to_string())
                .unwrap_or_else(|| "–".to_string())
        };
        text.push_str(&format!(
            "\n{}: {} / {}",
            level.display_name(),
            show(today),
            show(all_time)
        ));
    }

    text.push_str("\n\n<b>Recent games</b>");
    for summary in scores.recent(10)? {
        text.push_str(&format!(
            "\n{} · ×{} · {} pts · {:.0}%",
            summary.timestamp.format("%d.%m %H:%M"),
            summary.level.key(),
            summary.score,
            summary.accuracy()
        ));
    }
    Ok(text)
}

fn format_leaderboard(
    level: DifficultyLevel,
    username: &str,
    entries: &[LeaderboardEntry],
) -> String {
    if entries.is_empty() {
        return format!("Nobody has played {} yet. Be the first!", level);
    }
    let mut text = format!("<b>Leaderboard · {}</b>", level);
    for (rank, entry) in entries.iter().enumerate() {
        let name = escape_html(&entry.username);
        let name = if entry.username == username {
            format!("<b>{}</b>", name)
        } else {
            name
        };
        text.push_str(&format!(
            "\n{}. {} · {} pts · {:.0}%",
            rank + 1,
            name,
            entry.summary.score,
            entry.accuracy()
        ));
    }
    text
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

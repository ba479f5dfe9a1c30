use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use log::{debug, info};

use crate::quiz::DifficultyLevel;
use crate::records::{Leaderboard, LeaderboardEntry, RecordsError, Result, ScoreSummary};

/// Entries kept per level; anything below this rank can never be shown again.
pub const RETAINED_PER_LEVEL: usize = 100;

/// Leaderboard shared by every chat the bot serves.
#[derive(Debug, Default)]
pub struct SharedLeaderboard {
    path: Option<PathBuf>,
    entries: Mutex<Vec<LeaderboardEntry>>,
}

impl SharedLeaderboard {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries: Vec<LeaderboardEntry> = if path.exists() {
            serde_json::from_slice(&fs::read(&path)?)?
        } else {
            Vec::new()
        };
        info!(
            "leaderboard loaded from {} ({} entries)",
            path.display(),
            entries.len()
        );
        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<LeaderboardEntry>>> {
        self.entries.lock().map_err(|_| RecordsError::Poisoned)
    }

    fn persist(&self, entries: &[LeaderboardEntry]) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_vec_pretty(entries)?)?;
        Ok(())
    }
}

/// Whether an already stored `held` stays ahead of a newly published `new`.
fn outranks(held: &ScoreSummary, new: &ScoreSummary) -> bool {
    held.score > new.score || (held.score == new.score && held.timestamp <= new.timestamp)
}

/// Highest score first; an older entry outranks a newer one with the same score.
fn rank(entries: &mut [LeaderboardEntry]) {
    entries.sort_by(|a, b| {
        b.summary
            .score
            .cmp(&a.summary.score)
            .then(a.summary.timestamp.cmp(&b.summary.timestamp))
    });
}

impl Leaderboard for SharedLeaderboard {
    fn publish(
        &self,
        summary: &ScoreSummary,
        username: &str,
    ) -> Result<Option<LeaderboardEntry>> {
        let username = username.trim();
        if username.is_empty() {
            return Err(RecordsError::MissingUsername);
        }

        let entry = LeaderboardEntry {
            id: format!("{}:{}", username, summary.timestamp.timestamp_millis()),
            username: username.to_string(),
            summary: summary.clone(),
        };

        let level = summary.level;
        let mut entries = self.lock()?;
        let ahead = entries
            .iter()
            .filter(|e| e.summary.level == level && outranks(&e.summary, summary))
            .count();
        if ahead >= RETAINED_PER_LEVEL {
            debug!(
                "{} points on level {} for {} did not make the leaderboard",
                summary.score,
                level.key(),
                username
            );
            return Ok(None);
        }

        entries.push(entry.clone());
        rank(&mut entries);

        let mut seen = 0;
        entries.retain(|e| {
            if e.summary.level != level {
                return true;
            }
            seen += 1;
            seen <= RETAINED_PER_LEVEL
        });

        debug!("published {} points on level {} for {}", summary.score, level.key(), username);
        self.persist(&entries)?;
        Ok(Some(entry))
    }

    fn top(&self, level: DifficultyLevel, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let mut entries: Vec<LeaderboardEntry> = self
            .lock()?
            .iter()
            .filter(|e| e.summary.level == level)
            .cloned()
            .collect();
        rank(&mut entries);
        entries.truncate(limit);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn summary(score: u32, level: DifficultyLevel) -> ScoreSummary {
        ScoreSummary {
            score,
            level,
            questions_answered: score,
            correct_answers: score,
            best_streak: score,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_top_is_sorted_and_filtered() {
        let board = SharedLeaderboard::in_memory();
        board.publish(&summary(8, DifficultyLevel::UpTo10), "BraveOwl").unwrap();
        board.publish(&summary(21, DifficultyLevel::UpTo10), "SwiftFox").unwrap();
        board.publish(&summary(40, DifficultyLevel::UpTo20), "KeenHawk").unwrap();
        board.publish(&summary(13, DifficultyLevel::UpTo10), "WiseWolf").unwrap();

        let top = board.top(DifficultyLevel::UpTo10, 2).unwrap();
        let names: Vec<&str> = top.iter().map(|e| e.username.as_str()).collect();
        assert_eq!(names, vec!["SwiftFox", "WiseWolf"]);
    }

    #[test]
    fn test_ties_go_to_the_earlier_score() {
        let board = SharedLeaderboard::in_memory();
        let mut later = summary(10, DifficultyLevel::UpTo12);
        let mut earlier = later.clone();
        earlier.timestamp = later.timestamp - Duration::minutes(5);
        later.timestamp += Duration::seconds(1);

        board.publish(&later, "Later").unwrap();
        board.publish(&earlier, "Earlier").unwrap();

        let top = board.top(DifficultyLevel::UpTo12, 10).unwrap();
        assert_eq!(top[0].username, "Earlier");
    }

    #[test]
    fn test_publish_requires_username() {
        let board = SharedLeaderboard::in_memory();
        let result = board.publish(&summary(5, DifficultyLevel::UpTo10), "   ");
        assert!(matches!(result, Err(RecordsError::MissingUsername)));
        assert!(board.top(DifficultyLevel::UpTo10, 10).unwrap().is_empty());
    }

    #[test]
    fn test_retains_bounded_entries_per_level() {
        let board = SharedLeaderboard::in_memory();
        for score in 0..(RETAINED_PER_LEVEL as u32 + 20) {
            board.publish(&summary(score, DifficultyLevel::UpTo15), "Grinder").unwrap();
        }
        board.publish(&summary(1, DifficultyLevel::UpTo10), "Other").unwrap();

        let kept = board.top(DifficultyLevel::UpTo15, usize::MAX).unwrap();
        assert_eq!(kept.len(), RETAINED_PER_LEVEL);
        assert_eq!(kept[0].summary.score, RETAINED_PER_LEVEL as u32 + 19);
        assert_eq!(board.top(DifficultyLevel::UpTo10, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_publish_below_the_cut_is_not_kept() {
        let board = SharedLeaderboard::in_memory();
        for score in 10..(RETAINED_PER_LEVEL as u32 + 10) {
            let kept = board.publish(&summary(score, DifficultyLevel::UpTo12), "Regular").unwrap();
            assert!(kept.is_some());
        }

        let too_low = board.publish(&summary(3, DifficultyLevel::UpTo12), "Newcomer").unwrap();
        assert!(too_low.is_none());
        let entries = board.top(DifficultyLevel::UpTo12, usize::MAX).unwrap();
        assert_eq!(entries.len(), RETAINED_PER_LEVEL);
        assert!(entries.iter().all(|e| e.username != "Newcomer"));

        let entry = board
            .publish(&summary(500, DifficultyLevel::UpTo12), "Newcomer")
            .unwrap()
            .expect("a top score is kept");
        assert_eq!(entry.username, "Newcomer");
        assert_eq!(board.top(DifficultyLevel::UpTo12, 1).unwrap()[0], entry);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaderboard.json");

        let board = SharedLeaderboard::open(&path).unwrap();
        board.publish(&summary(9, DifficultyLevel::UpTo20), "SharpBear").unwrap();
        drop(board);

        let reopened = SharedLeaderboard::open(&path).unwrap();
        let top = reopened.top(DifficultyLevel::UpTo20, 10).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].username, "SharpBear");
        assert_eq!(top[0].summary.score, 9);
    }
}

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use log::debug;

use crate::quiz::DifficultyLevel;
use crate::records::{Period, RecordsError, Result, ScoreStore, ScoreSummary};

/// One player's finished rounds, optionally mirrored to a JSON file.
///
/// The whole file is rewritten on every save; a player produces at most one
/// summary a minute, so the history stays small.
#[derive(Debug, Default)]
pub struct LocalScores {
    path: Option<PathBuf>,
    scores: Mutex<Vec<ScoreSummary>>,
}

impl LocalScores {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the history at `path`, starting empty if the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let scores = if path.exists() {
            let bytes = fs::read(&path)?;
            serde_json::from_slice(&bytes)?
        } else {
            Vec::new()
        };
        debug!("loaded {} scores from {}", scores.len(), path.display());
        Ok(Self {
            path: Some(path),
            scores: Mutex::new(scores),
        })
    }

    pub fn len(&self) -> usize {
        self.lock().map(|scores| scores.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<ScoreSummary>>> {
        self.scores.lock().map_err(|_| RecordsError::Poisoned)
    }

    fn persist(&self, scores: &[ScoreSummary]) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_vec_pretty(scores)?)?;
        Ok(())
    }
}

impl ScoreStore for LocalScores {
    fn save(&self, summary: &ScoreSummary) -> Result<()> {
        let mut scores = self.lock()?;
        scores.push(summary.clone());
        self.persist(&scores)
    }

    fn best_score(&self, level: DifficultyLevel, period: Period) -> Result<Option<ScoreSummary>> {
        let scores = self.lock()?;
        Ok(scores
            .iter()
            .filter(|s| s.level == level)
            .filter(|s| period == Period::AllTime || s.is_today())
            // on ties the earliest round keeps the record
            .fold(None::<&ScoreSummary>, |best, s| match best {
                Some(b) if b.score >= s.score => Some(b),
                _ => Some(s),
            })
            .cloned())
    }

    fn recent(&self, limit: usize) -> Result<Vec<ScoreSummary>> {
        let mut scores = self.lock()?.clone();
        scores.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        scores.truncate(limit);
        Ok(scores)
    }

    fn levels_played(&self) -> Result<Vec<DifficultyLevel>> {
        let scores = self.lock()?;
        Ok(DifficultyLevel::ALL
            .into_iter()
            .filter(|level| scores.iter().any(|s| s.level == *level))
            .collect())
    }
}

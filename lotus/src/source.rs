//! Games read from a local JSON file.

use std::path::PathBuf;

use analysis::{Game, GameSource, SourceError};

/// A [`GameSource`] backed by a JSON array of normalized games.
///
/// The file is re-read on every fetch. The player name is only used for
/// logging; every game in the file is taken to belong to them.
#[derive(Debug, Clone)]
pub struct JsonGameSource {
    path: PathBuf,
}

impl JsonGameSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl GameSource for JsonGameSource {
    async fn fetch_games(&self, player: &str, max_games: usize) -> Result<Vec<Game>, SourceError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            SourceError::Unavailable(format!("{}: {}", self.path.display(), e))
        })?;
        let mut games: Vec<Game> = serde_json::from_str(&raw)
            .map_err(|e| SourceError::InvalidData(format!("{}: {}", self.path.display(), e)))?;

        let available = games.len();
        games.truncate(max_games);
        tracing::debug!(player, available, taken = games.len(), path = %self.path.display(), "Loaded games");
        Ok(games)
    }
}

use serde::{Deserialize, Serialize};

/// One position of a game: the board before `played_move` was made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub move_number: u32,
    /// FEN string; compared byte-for-byte as the dedup fingerprint.
    pub fen: String,
    /// Move actually played from this position, in SAN.
    pub played_move: String,
}

/// A normalized game as delivered by a [`GameSource`](crate::GameSource).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub game_id: String,
    pub time_control: String,
    #[serde(default)]
    pub moves: Vec<Position>,
}

/// A candidate move suggested by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveAnalysis {
    /// Move in SAN, or in UCI when it could not be rendered.
    #[serde(rename = "move")]
    pub mv: String,
    /// Pawns from the side to move's perspective.
    pub eval: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionAnalysis {
    pub fen: String,
    pub move_number: u32,
    pub played_move: String,
    pub played_move_eval: f64,
    /// Best first, at most the configured candidate count.
    pub best_moves: Vec<MoveAnalysis>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameAnalysis {
    pub game_id: String,
    pub time_control: String,
    pub moves: Vec<PositionAnalysis>,
}

impl GameAnalysis {
    /// Placeholder for a game that could not be analyzed.
    pub fn empty(game: &Game) -> Self {
        Self {
            game_id: game.game_id.clone(),
            time_control: game.time_control.clone(),
            moves: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub games: Vec<GameAnalysis>,
    /// Wall-clock seconds, rounded to two decimals.
    pub analysis_time: f64,
}

impl AnalysisResult {
    pub fn new(games: Vec<GameAnalysis>, elapsed: std::time::Duration) -> Self {
        Self {
            games,
            analysis_time: (elapsed.as_secs_f64() * 100.0).round() / 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_analysis_time_is_rounded() {
        let result = AnalysisResult::new(Vec::new(), Duration::from_millis(12_346));
        assert_eq!(result.analysis_time, 12.35);
    }

    #[test]
    fn test_wire_field_names() {
        let analysis = PositionAnalysis {
            fen: "8/8/8/8/8/8/8/K6k w - - 0 1".to_string(),
            move_number: 7,
            played_move: "Kb2".to_string(),
            played_move_eval: 0.0,
            best_moves: vec![MoveAnalysis {
                mv: "Kb1".to_string(),
                eval: 0.25,
            }],
        };
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["best_moves"][0]["move"], "Kb1");
        assert_eq!(json["best_moves"][0]["eval"], 0.25);
        assert_eq!(json["played_move_eval"], 0.0);
        assert_eq!(json["move_number"], 7);
    }

    #[test]
    fn test_game_without_moves_deserializes() {
        let game: Game =
            serde_json::from_str(r#"{"game_id":"g1","time_control":"600"}"#).unwrap();
        assert!(game.moves.is_empty());
        assert_eq!(GameAnalysis::empty(&game).game_id, "g1");
    }
}

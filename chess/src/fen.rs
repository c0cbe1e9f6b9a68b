use cozy_chess::Board;

/// Parse a FEN string into a Board
pub fn parse_fen(fen: &str) -> Result<Board, FenError> {
    if fen.split_whitespace().next().is_none() {
        return Err(FenError::Empty);
    }

    fen.parse().map_err(|_| FenError::InvalidFormat(fen.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum FenError {
    #[error("Empty FEN")]
    Empty,
    #[error("Invalid FEN format: {0}")]
    InvalidFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_position() {
        let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
        let board = parse_fen(fen).unwrap();
        assert_eq!(board.to_string(), fen);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse_fen("   "), Err(FenError::Empty)));
        assert!(matches!(parse_fen("not a fen"), Err(FenError::InvalidFormat(_))));
    }
}

//! Standard Algebraic Notation rendering.

use cozy_chess::{Board, GameStatus, Move, Piece, Square};

use crate::converters::{file_char, format_square, rank_char, san_piece_letter};
use crate::uci::{convert_uci_castling_to_cozy, format_uci_move};

#[derive(Debug, thiserror::Error)]
pub enum SanError {
    #[error("Illegal move in this position: {0}")]
    IllegalMove(String),
}

/// Format a legal move as SAN (e.g. "Nbd2", "exd6", "O-O", "a8=Q", "Qh4#").
///
/// Accepts castling both in standard UCI form (e1g1) and in cozy-chess'
/// king-takes-rook form (e1h1).
pub fn format_move_as_san(board: &Board, mv: Move) -> Result<String, SanError> {
    let legal = legal_moves(board);
    let mv = convert_uci_castling_to_cozy(mv, &legal);
    if !legal.contains(&mv) {
        return Err(SanError::IllegalMove(format_uci_move(mv)));
    }
    let piece = board
        .piece_on(mv.from)
        .ok_or_else(|| SanError::IllegalMove(format_uci_move(mv)))?;

    let is_castle = piece == Piece::King && board.color_on(mv.to) == Some(board.side_to_move());

    let mut san = if is_castle {
        if (mv.to.file() as u8) > (mv.from.file() as u8) {
            "O-O".to_string()
        } else {
            "O-O-O".to_string()
        }
    } else {
        let is_capture = board.color_on(mv.to).is_some()
            || (piece == Piece::Pawn && mv.from.file() != mv.to.file());

        let mut s = String::with_capacity(8);
        if piece == Piece::Pawn {
            if is_capture {
                s.push(file_char(mv.from.file()));
            }
        } else {
            s.push(san_piece_letter(piece));
            disambiguate(board, &legal, mv, piece, &mut s);
        }
        if is_capture {
            s.push('x');
        }
        s.push_str(&format_square(mv.to));
        if let Some(promotion) = mv.promotion {
            s.push('=');
            s.push(san_piece_letter(promotion));
        }
        s
    };

    let mut after = board.clone();
    after.play_unchecked(mv);
    if after.status() == GameStatus::Won {
        san.push('#');
    } else if !after.checkers().is_empty() {
        san.push('+');
    }

    Ok(san)
}

/// Render `mv` as SAN when the board is known and the move legal, otherwise
/// fall back to its UCI string.
pub fn san_or_uci(board: Option<&Board>, mv: Move) -> String {
    board
        .and_then(|board| format_move_as_san(board, mv).ok())
        .unwrap_or_else(|| format_uci_move(mv))
}

fn legal_moves(board: &Board) -> Vec<Move> {
    let mut moves = Vec::new();
    board.generate_moves(|piece_moves| {
        moves.extend(piece_moves);
        false
    });
    moves
}

/// Append the file and/or rank needed to tell `mv` apart from other pieces of
/// the same kind reaching the same square.
fn disambiguate(board: &Board, legal: &[Move], mv: Move, piece: Piece, out: &mut String) {
    let rivals: Vec<Square> = legal
        .iter()
        .filter(|other| {
            other.to == mv.to && other.from != mv.from && board.piece_on(other.from) == Some(piece)
        })
        .map(|other| other.from)
        .collect();

    if rivals.is_empty() {
        return;
    }

    let shares_file = rivals.iter().any(|sq| sq.file() == mv.from.file());
    let shares_rank = rivals.iter().any(|sq| sq.rank() == mv.from.rank());

    if !shares_file {
        out.push(file_char(mv.from.file()));
    } else if !shares_rank {
        out.push(rank_char(mv.from.rank()));
    } else {
        out.push_str(&format_square(mv.from));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cozy_chess::{File, Rank};

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    fn san(fen: &str, uci: &str) -> String {
        let board: Board = fen.parse().unwrap();
        format_move_as_san(&board, uci.parse().unwrap()).unwrap()
    }

    #[test]
    fn test_pawn_push() {
        assert_eq!(san(START_FEN, "e2e4"), "e4");
    }

    #[test]
    fn test_knight() {
        assert_eq!(san(START_FEN, "g1f3"), "Nf3");
    }

    #[test]
    fn test_capture() {
        let fen = "rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq d6 0 2";
        assert_eq!(san(fen, "e4d5"), "exd5");
    }

    #[test]
    fn test_en_passant_capture() {
        let fen = "4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 1";
        assert_eq!(san(fen, "e5d6"), "exd6");
    }

    #[test]
    fn test_castling_kingside_both_notations() {
        let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQK2R w KQkq - 0 1";
        assert_eq!(san(fen, "e1h1"), "O-O");
        assert_eq!(san(fen, "e1g1"), "O-O");
    }

    #[test]
    fn test_castling_queenside() {
        let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/R3KBNR w KQkq - 0 1";
        assert_eq!(san(fen, "e1c1"), "O-O-O");
    }

    #[test]
    fn test_promotion() {
        let fen = "8/P7/8/8/8/8/7k/4K3 w - - 0 1";
        assert_eq!(san(fen, "a7a8q"), "a8=Q");
    }

    #[test]
    fn test_file_disambiguation() {
        let fen = "4k3/8/8/8/8/5N2/8/1N2K3 w - - 0 1";
        assert_eq!(san(fen, "b1d2"), "Nbd2");
    }

    #[test]
    fn test_rank_disambiguation() {
        let fen = "4k3/8/8/R7/8/8/8/R3K3 w - - 0 1";
        assert_eq!(san(fen, "a1a3"), "R1a3");
    }

    #[test]
    fn test_check_and_mate_suffix() {
        let fools_mate = "rnbqkbnr/pppp1ppp/8/4p3/6P1/5P2/PPPPP2P/RNBQKBNR b KQkq - 0 2";
        assert_eq!(san(fools_mate, "d8h4"), "Qh4#");

        let check = "4k3/8/8/8/8/8/8/R3K3 w - - 0 1";
        assert_eq!(san(check, "a1a8"), "Ra8+");
    }

    #[test]
    fn test_illegal_move_is_error() {
        let board: Board = START_FEN.parse().unwrap();
        let mv = Move {
            from: Square::new(File::E, Rank::Second),
            to: Square::new(File::E, Rank::Fifth),
            promotion: None,
        };
        assert!(format_move_as_san(&board, mv).is_err());
        assert_eq!(san_or_uci(Some(&board), mv), "e2e5");
        assert_eq!(san_or_uci(None, mv), "e2e5");
    }
}

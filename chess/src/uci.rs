//! UCI (Universal Chess Interface) utilities

use cozy_chess::{File, Move, Rank, Square};

use crate::converters::{format_piece, format_square};

/// Convert UCI castling notation to cozy_chess notation
///
/// UCI uses standard notation (king moves 2 squares): e1g1, e1c1, e8g8, e8c8
/// cozy_chess uses king-to-rook notation: e1h1, e1a1, e8h8, e8a8
///
/// The converted move is only returned if it is in `legal_moves`, so a plain
/// king step such as e1g1 in an endgame is left untouched.
pub fn convert_uci_castling_to_cozy(mv: Move, legal_moves: &[Move]) -> Move {
    let is_rank_1_or_8 = matches!(mv.from.rank(), Rank::First | Rank::Eighth);
    let is_e_file = matches!(mv.from.file(), File::E);
    let is_g_or_c_file = matches!(mv.to.file(), File::G | File::C);
    let same_rank = mv.from.rank() == mv.to.rank();

    if is_rank_1_or_8 && is_e_file && is_g_or_c_file && same_rank && mv.promotion.is_none() {
        let rook_file = match mv.to.file() {
            File::G => File::H,
            _ => File::A,
        };
        let converted = Move {
            from: mv.from,
            to: Square::new(rook_file, mv.from.rank()),
            promotion: None,
        };

        if !legal_moves.contains(&mv) && legal_moves.contains(&converted) {
            return converted;
        }
    }

    mv
}

/// Format a move in UCI notation (e.g., "e2e4", "e7e8q")
pub fn format_uci_move(mv: Move) -> String {
    let mut s = format!("{}{}", format_square(mv.from), format_square(mv.to));
    if let Some(promo) = mv.promotion {
        s.push(format_piece(promo));
    }
    s
}

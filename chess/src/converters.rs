//! Character conversions for cozy-chess squares and pieces.

use cozy_chess::{File, Piece, Rank, Square};

pub fn file_char(file: File) -> char {
    match file {
        File::A => 'a',
        File::B => 'b',
        File::C => 'c',
        File::D => 'd',
        File::E => 'e',
        File::F => 'f',
        File::G => 'g',
        File::H => 'h',
    }
}

pub fn rank_char(rank: Rank) -> char {
    match rank {
        Rank::First => '1',
        Rank::Second => '2',
        Rank::Third => '3',
        Rank::Fourth => '4',
        Rank::Fifth => '5',
        Rank::Sixth => '6',
        Rank::Seventh => '7',
        Rank::Eighth => '8',
    }
}

/// Format a square in algebraic notation ("e4").
pub fn format_square(sq: Square) -> String {
    let mut s = String::with_capacity(2);
    s.push(file_char(sq.file()));
    s.push(rank_char(sq.rank()));
    s
}

/// Lowercase piece letter as used in UCI promotions.
pub fn format_piece(piece: Piece) -> char {
    san_piece_letter(piece).to_ascii_lowercase()
}

/// Uppercase piece letter as used in SAN.
pub fn san_piece_letter(piece: Piece) -> char {
    match piece {
        Piece::Pawn => 'P',
        Piece::Knight => 'N',
        Piece::Bishop => 'B',
        Piece::Rook => 'R',
        Piece::Queen => 'Q',
        Piece::King => 'K',
    }
}

//! Engine evaluation scores.

/// Magnitude, in pawns, that any forced mate is reported as.
pub const MATE_SCORE_PAWNS: f64 = 100.0;

/// Engine evaluation score.
///
/// Centipawns: positive = side-to-move is better.
/// Mate: positive N = side-to-move mates in N moves,
/// negative N = side-to-move gets mated in N moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisScore {
    Centipawns(i32),
    Mate(i32),
}

impl AnalysisScore {
    /// Evaluation in pawns from the side to move's perspective.
    ///
    /// Mates collapse to [`MATE_SCORE_PAWNS`], signed by the mating side, so
    /// distance to mate is not preserved. `Mate(0)` means the side to move is
    /// already mated.
    pub fn to_pawns(&self) -> f64 {
        match self {
            Self::Centipawns(cp) => *cp as f64 / 100.0,
            Self::Mate(m) if *m > 0 => MATE_SCORE_PAWNS,
            Self::Mate(_) => -MATE_SCORE_PAWNS,
        }
    }
}

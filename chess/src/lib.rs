pub mod analysis;
pub mod converters;
pub mod fen;
pub mod san;
pub mod uci;

pub use analysis::{AnalysisScore, MATE_SCORE_PAWNS};
pub use fen::{parse_fen, FenError};
pub use san::{format_move_as_san, san_or_uci, SanError};
pub use uci::{convert_uci_castling_to_cozy, format_uci_move};

pub mod parser;

pub use chess::format_uci_move;
pub use parser::{parse_uci_message, parse_uci_move, UciMessage};

#[derive(Debug, thiserror::Error)]
pub enum UciError {
    #[error("Malformed UCI message: {0}")]
    MalformedMessage(String),
    #[error("Unknown UCI message: {0}")]
    UnknownMessage(String),
    #[error("Invalid move: {0}")]
    InvalidMove(String),
    #[error("Invalid square: {0}")]
    InvalidSquare(String),
    #[error("Invalid promotion: {0}")]
    InvalidPromotion(String),
}

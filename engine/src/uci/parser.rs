use crate::{EngineInfo, Score};
use cozy_chess::{File, Move, Piece, Rank, Square};

/// Incoming message from UCI engine
#[derive(Debug, Clone)]
pub enum UciMessage {
    Id { name: String, value: String },
    UciOk,
    ReadyOk,
    BestMove { mv: Option<Move>, ponder: Option<Move> },
    Info(EngineInfo),
}

/// Parse a UCI message line
pub fn parse_uci_message(line: &str) -> Result<UciMessage, crate::UciError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    match tokens.first() {
        Some(&"uciok") => Ok(UciMessage::UciOk),
        Some(&"readyok") => Ok(UciMessage::ReadyOk),

        Some(&"id") => {
            if tokens.len() < 3 {
                return Err(crate::UciError::MalformedMessage(line.to_string()));
            }
            let name = tokens[1].to_string();
            let value = tokens[2..].join(" ");
            Ok(UciMessage::Id { name, value })
        }

        Some(&"bestmove") => {
            let Some(&best) = tokens.get(1) else {
                return Err(crate::UciError::MalformedMessage(line.to_string()));
            };
            // Terminal positions are answered with `bestmove (none)`.
            let mv = match best {
                "(none)" | "0000" => None,
                other => Some(parse_uci_move(other)?),
            };
            let ponder = if tokens.len() >= 4 && tokens[2] == "ponder" {
                parse_uci_move(tokens[3]).ok()
            } else {
                None
            };
            Ok(UciMessage::BestMove { mv, ponder })
        }

        Some(&"info") => Ok(UciMessage::Info(parse_info_line(&tokens[1..]))),

        _ => Err(crate::UciError::UnknownMessage(line.to_string())),
    }
}

/// Parse an "info" line from the engine
fn parse_info_line(tokens: &[&str]) -> EngineInfo {
    let mut info = EngineInfo::default();
    let mut i = 0;

    while i < tokens.len() {
        match tokens[i] {
            "depth" => {
                i += 1;
                info.depth = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "seldepth" => {
                i += 1;
                info.seldepth = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "time" => {
                i += 1;
                info.time_ms = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "nodes" => {
                i += 1;
                info.nodes = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "nps" => {
                i += 1;
                info.nps = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "score" => {
                i += 1;
                if let Some(&score_type) = tokens.get(i) {
                    i += 1;
                    if let Some(value_str) = tokens.get(i) {
                        info.score = match score_type {
                            "cp" => value_str.parse().ok().map(Score::Centipawns),
                            "mate" => value_str.parse().ok().map(Score::Mate),
                            _ => None,
                        };
                    }
                }
            }
            "pv" => {
                // Collect all moves until next keyword
                i += 1;
                while i < tokens.len() && !is_keyword(tokens[i]) {
                    if let Ok(mv) = parse_uci_move(tokens[i]) {
                        info.pv.push(mv);
                    }
                    i += 1;
                }
                continue; // Don't increment i again
            }
            "multipv" => {
                i += 1;
                info.multipv = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "currmove" | "currmovenumber" => {
                i += 1;
            }
            "hashfull" => {
                i += 1;
                info.hashfull = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "string" => break, // free text until end of line
            _ => {
                // Unknown keyword (lowerbound, upperbound, ...), skip
            }
        }
        i += 1;
    }

    info
}

fn is_keyword(token: &str) -> bool {
    matches!(
        token,
        "depth"
            | "seldepth"
            | "time"
            | "nodes"
            | "score"
            | "pv"
            | "multipv"
            | "currmove"
            | "currmovenumber"
            | "hashfull"
            | "nps"
            | "tbhits"
            | "cpuload"
            | "string"
            | "bmc"
    )
}

/// Parse UCI move format (e2e4, e7e8q)
pub fn parse_uci_move(s: &str) -> Result<Move, crate::UciError> {
    let bytes = s.as_bytes();
    if bytes.len() != 4 && bytes.len() != 5 {
        return Err(crate::UciError::InvalidMove(s.to_string()));
    }

    let from = parse_square(bytes[0], bytes[1]).ok_or_else(|| invalid_square(s))?;
    let to = parse_square(bytes[2], bytes[3]).ok_or_else(|| invalid_square(s))?;

    let promotion = match bytes.get(4) {
        None => None,
        Some(b'q') => Some(Piece::Queen),
        Some(b'r') => Some(Piece::Rook),
        Some(b'b') => Some(Piece::Bishop),
        Some(b'n') => Some(Piece::Knight),
        Some(_) => return Err(crate::UciError::InvalidPromotion(s.to_string())),
    };

    Ok(Move {
        from,
        to,
        promotion,
    })
}

fn invalid_square(s: &str) -> crate::UciError {
    crate::UciError::InvalidSquare(s.to_string())
}

fn parse_square(file: u8, rank: u8) -> Option<Square> {
    let file = match file {
        b'a' => File::A,
        b'b' => File::B,
        b'c' => File::C,
        b'd' => File::D,
        b'e' => File::E,
        b'f' => File::F,
        b'g' => File::G,
        b'h' => File::H,
        _ => return None,
    };

    let rank = match rank {
        b'1' => Rank::First,
        b'2' => Rank::Second,
        b'3' => Rank::Third,
        b'4' => Rank::Fourth,
        b'5' => Rank::Fifth,
        b'6' => Rank::Sixth,
        b'7' => Rank::Seventh,
        b'8' => Rank::Eighth,
        _ => return None,
    };

    Some(Square::new(file, rank))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess::format_uci_move;

    #[test]
    fn test_parse_bestmove() {
        let msg = parse_uci_message("bestmove e2e4 ponder e7e5").unwrap();
        match msg {
            UciMessage::BestMove { mv, ponder } => {
                assert_eq!(format_uci_move(mv.unwrap()), "e2e4");
                assert_eq!(format_uci_move(ponder.unwrap()), "e7e5");
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_parse_bestmove_none() {
        let msg = parse_uci_message("bestmove (none)").unwrap();
        assert!(matches!(msg, UciMessage::BestMove { mv: None, .. }));
    }

    #[test]
    fn test_parse_info() {
        let msg = parse_uci_message("info depth 12 score cp 35 nodes 15234 pv e2e4 e7e5").unwrap();
        match msg {
            UciMessage::Info(info) => {
                assert_eq!(info.depth, Some(12));
                assert!(matches!(info.score, Some(Score::Centipawns(35))));
                assert_eq!(info.nodes, Some(15234));
                assert_eq!(info.pv.len(), 2);
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_parse_multipv_mate_with_bound() {
        let line = "info depth 20 seldepth 25 multipv 2 score mate -3 upperbound nodes 100000 pv d2d4 d7d5 bmc 0.5";
        let UciMessage::Info(info) = parse_uci_message(line).unwrap() else {
            panic!("Wrong message type");
        };
        assert_eq!(info.multipv, Some(2));
        assert_eq!(info.score, Some(Score::Mate(-3)));
        assert_eq!(info.pv.len(), 2);
    }

    #[test]
    fn test_parse_info_string_is_ignored() {
        let UciMessage::Info(info) =
            parse_uci_message("info string NNUE evaluation using nn-1111.nnue").unwrap()
        else {
            panic!("Wrong message type");
        };
        assert!(info.score.is_none());
        assert!(info.pv.is_empty());
    }

    #[test]
    fn test_parse_promotion_move() {
        let mv = parse_uci_move("e7e8q").unwrap();
        assert_eq!(mv.promotion, Some(Piece::Queen));
        assert!(parse_uci_move("e7e8x").is_err());
        assert!(parse_uci_move("z9e4").is_err());
        assert!(parse_uci_move("e2").is_err());
    }

    #[test]
    fn test_unknown_message() {
        assert!(matches!(
            parse_uci_message("option name Hash type spin"),
            Err(crate::UciError::UnknownMessage(_))
        ));
    }
}

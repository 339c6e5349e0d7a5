//! UCI wire codec for talking to an external engine process.
//!
//! Outbound [`UciCommand`]s render to single protocol lines. Inbound lines are
//! classified by [`parse_line`] and folded by [`SearchTracker`], which only
//! needs one line at a time and never waits for the stream to end.

use chess::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::analysis::{EvaluationResult, Tier};

pub const MIN_SKILL_LEVEL: u8 = 1;
pub const MAX_SKILL_LEVEL: u8 = 20;

/// Budget for a single `go`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchLimit {
    MoveTime { millis: u64 },
    Depth { plies: u32 },
}

impl SearchLimit {
    pub fn move_time(duration: Duration) -> Self {
        SearchLimit::MoveTime {
            millis: duration.as_millis() as u64,
        }
    }

    /// Wall-clock budget implied by the limit, if any
    pub fn time_budget(&self) -> Option<Duration> {
        match self {
            SearchLimit::MoveTime { millis } => Some(Duration::from_millis(*millis)),
            SearchLimit::Depth { .. } => None,
        }
    }
}

impl Default for SearchLimit {
    fn default() -> Self {
        SearchLimit::MoveTime { millis: 1000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciCommand {
    Uci,
    IsReady,
    UciNewGame,
    SetOption { name: String, value: String },
    Position { fen: String },
    Go(SearchLimit),
    Stop,
    Quit,
}

impl UciCommand {
    pub fn skill_level(level: u8) -> Self {
        UciCommand::SetOption {
            name: "Skill Level".to_string(),
            value: level.clamp(MIN_SKILL_LEVEL, MAX_SKILL_LEVEL).to_string(),
        }
    }

    /// Commands that belong to the handshake and may be sent before `readyok`
    pub fn is_handshake(&self) -> bool {
        matches!(
            self,
            UciCommand::Uci | UciCommand::UciNewGame | UciCommand::IsReady | UciCommand::Quit
        )
    }
}

impl fmt::Display for UciCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UciCommand::Uci => write!(f, "uci"),
            UciCommand::IsReady => write!(f, "isready"),
            UciCommand::UciNewGame => write!(f, "ucinewgame"),
            UciCommand::SetOption { name, value } => {
                write!(f, "setoption name {} value {}", name, value)
            }
            UciCommand::Position { fen } => write!(f, "position fen {}", fen),
            UciCommand::Go(SearchLimit::MoveTime { millis }) => write!(f, "go movetime {}", millis),
            UciCommand::Go(SearchLimit::Depth { plies }) => write!(f, "go depth {}", plies),
            UciCommand::Stop => write!(f, "stop"),
            UciCommand::Quit => write!(f, "quit"),
        }
    }
}

/// Engine score relative to the side to move, as UCI reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32),
    Mate(i32),
}

impl Score {
    pub fn negate(self) -> Self {
        match self {
            Score::Centipawns(cp) => Score::Centipawns(-cp),
            Score::Mate(n) => Score::Mate(-n),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoLine {
    pub depth: Option<u32>,
    pub score: Option<Score>,
    pub pv: Vec<String>,
}

impl InfoLine {
    /// Carries evaluation data rather than progress chatter (`currmove`, `string`)
    pub fn is_evaluation(&self) -> bool {
        self.score.is_some() || !self.pv.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutput {
    UciOk,
    ReadyOk,
    Info(InfoLine),
    /// `best` is `None` for `bestmove (none)`
    BestMove {
        best: Option<String>,
        ponder: Option<String>,
    },
    Other(String),
}

/// `e2e4`, `e7e8q`
pub fn is_coordinate_move(token: &str) -> bool {
    let bytes = token.as_bytes();
    let square = |file: u8, rank: u8| (b'a'..=b'h').contains(&file) && (b'1'..=b'8').contains(&rank);
    match bytes.len() {
        4 => square(bytes[0], bytes[1]) && square(bytes[2], bytes[3]),
        5 => {
            square(bytes[0], bytes[1])
                && square(bytes[2], bytes[3])
                && matches!(bytes[4], b'q' | b'r' | b'b' | b'n')
        }
        _ => false,
    }
}

pub fn parse_line(line: &str) -> EngineOutput {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.first().copied() {
        Some("uciok") => EngineOutput::UciOk,
        Some("readyok") => EngineOutput::ReadyOk,
        Some("info") => EngineOutput::Info(parse_info(&parts[1..])),
        Some("bestmove") => {
            let best = parts
                .get(1)
                .filter(|token| is_coordinate_move(token))
                .map(|token| token.to_string());
            let ponder = match (parts.get(2), parts.get(3)) {
                (Some(&"ponder"), Some(token)) if is_coordinate_move(token) => {
                    Some(token.to_string())
                }
                _ => None,
            };
            EngineOutput::BestMove { best, ponder }
        }
        _ => EngineOutput::Other(line.trim().to_string()),
    }
}

fn parse_info(parts: &[&str]) -> InfoLine {
    let mut info = InfoLine::default();
    let mut i = 0;

    while i < parts.len() {
        match parts[i] {
            "depth" => {
                info.depth = parts.get(i + 1).and_then(|v| v.parse().ok());
                i += 2;
            }
            "score" => {
                let value = parts.get(i + 2).and_then(|v| v.parse::<i32>().ok());
                info.score = match (parts.get(i + 1).copied(), value) {
                    (Some("cp"), Some(cp)) => Some(Score::Centipawns(cp)),
                    (Some("mate"), Some(n)) => Some(Score::Mate(n)),
                    _ => info.score,
                };
                i += 3;
            }
            // Everything after pv is the variation itself
            "pv" => {
                info.pv = parts[i + 1..]
                    .iter()
                    .take_while(|token| is_coordinate_move(token))
                    .map(|token| token.to_string())
                    .collect();
                break;
            }
            // Free text until end of line
            "string" => break,
            _ => i += 1,
        }
    }

    info
}

/// Handshake progress of an external engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl ReadinessState {
    pub fn can_send(&self, command: &UciCommand) -> bool {
        match self {
            ReadinessState::Ready => true,
            ReadinessState::Initializing => command.is_handshake(),
            ReadinessState::Uninitialized => matches!(command, UciCommand::Uci),
            ReadinessState::Failed => matches!(command, UciCommand::Quit),
        }
    }
}

/// Final outcome of one `go`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineAnalysis {
    pub best_move: Option<String>,
    pub ponder: Option<String>,
    pub score: Option<Score>,
    pub pv: Vec<String>,
    pub depth: Option<u32>,
}

impl EngineAnalysis {
    /// Normalize to White-positive. UCI scores are relative to the side to move.
    pub fn to_evaluation(&self, side_to_move: Color) -> EvaluationResult {
        let principal_move = self.best_move.clone().or_else(|| self.pv.first().cloned());
        let score = match side_to_move {
            Color::White => self.score,
            Color::Black => self.score.map(Score::negate),
        };

        let result = match score {
            Some(Score::Centipawns(cp)) => {
                EvaluationResult::centipawns(cp, principal_move, Tier::ExternalEngine)
            }
            Some(Score::Mate(n)) => EvaluationResult::mate(n, principal_move, Tier::ExternalEngine),
            None => EvaluationResult {
                principal_move,
                ..EvaluationResult::empty(Tier::ExternalEngine)
            },
        };

        match self.depth {
            Some(depth) => result.with_depth(depth),
            None => result,
        }
    }
}

/// Folds the output of one search; the last evaluation line before
/// `bestmove` wins.
#[derive(Debug, Default)]
pub struct SearchTracker {
    last_info: Option<InfoLine>,
}

impl SearchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the completed analysis once `bestmove` arrives.
    pub fn feed(&mut self, output: EngineOutput) -> Option<EngineAnalysis> {
        match output {
            EngineOutput::Info(info) if info.is_evaluation() => {
                self.last_info = Some(info);
                None
            }
            EngineOutput::BestMove { best, ponder } => {
                let info = self.last_info.take().unwrap_or_default();
                Some(EngineAnalysis {
                    best_move: best,
                    ponder,
                    score: info.score,
                    pv: info.pv,
                    depth: info.depth,
                })
            }
            _ => None,
        }
    }

    pub fn feed_line(&mut self, line: &str) -> Option<EngineAnalysis> {
        self.feed(parse_line(line))
    }
}

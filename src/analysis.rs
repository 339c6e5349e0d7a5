//! Normalized results shared by every tier.
//!
//! All scores are White-positive regardless of the side to move.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::rules::Move;

/// A ranked source of move and evaluation data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Remote,
    ExternalEngine,
    LocalSearch,
    DegradedSearch,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Remote => "remote",
            Tier::ExternalEngine => "external engine",
            Tier::LocalSearch => "local search",
            Tier::DegradedSearch => "degraded search",
        };
        f.write_str(name)
    }
}

/// Position evaluation. At most one of `centipawns` and `mate_in` is set;
/// both are `None` when no analysis was available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub centipawns: Option<i32>,
    pub mate_in: Option<i32>,
    /// First move of the principal variation in coordinate notation (`e2e4`, `e7e8q`)
    pub principal_move: Option<String>,
    pub depth: Option<u32>,
    pub source: Tier,
}

impl EvaluationResult {
    pub fn centipawns(cp: i32, principal_move: Option<String>, source: Tier) -> Self {
        Self {
            centipawns: Some(cp),
            mate_in: None,
            principal_move,
            depth: None,
            source,
        }
    }

    pub fn mate(mate_in: i32, principal_move: Option<String>, source: Tier) -> Self {
        Self {
            centipawns: None,
            mate_in: Some(mate_in),
            principal_move,
            depth: None,
            source,
        }
    }

    pub fn empty(source: Tier) -> Self {
        Self {
            centipawns: None,
            mate_in: None,
            principal_move: None,
            depth: None,
            source,
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn has_analysis(&self) -> bool {
        self.centipawns.is_some() || self.mate_in.is_some()
    }

    /// Single comparable number: centipawns, else mate distance scaled by 10000, else 0.
    pub fn score_centipawns(&self) -> i32 {
        match (self.centipawns, self.mate_in) {
            (Some(cp), _) => cp,
            (None, Some(mate)) => mate.saturating_mul(10_000),
            (None, None) => 0,
        }
    }

    /// Short score label: `M3` for mates, pawns with one decimal otherwise.
    pub fn formatted(&self) -> String {
        match (self.centipawns, self.mate_in) {
            (_, Some(mate)) => format!("M{}", mate.abs()),
            (Some(cp), None) => format!("{:.1}", cp as f64 / 100.0),
            (None, None) => "0.0".to_string(),
        }
    }

    /// Evaluation bar fill for White, 0..=100.
    pub fn bar_percentage(&self) -> f64 {
        match (self.centipawns, self.mate_in) {
            (_, Some(mate)) => {
                if mate > 0 {
                    100.0
                } else {
                    0.0
                }
            }
            (Some(cp), None) => {
                let pawns = (cp as f64 / 100.0).clamp(-10.0, 10.0);
                50.0 + pawns * 5.0
            }
            (None, None) => 50.0,
        }
    }

    pub fn description(&self) -> String {
        if let Some(mate) = self.mate_in {
            let side = if mate > 0 { "White" } else { "Black" };
            return format!("Mate in {} for {}", mate.abs(), side);
        }

        let Some(cp) = self.centipawns else {
            return "Analyzing position...".to_string();
        };

        let score = format!("{:.2}", cp as f64 / 100.0);
        let verdict = match cp {
            -49..=49 => "Position is roughly equal",
            50..=199 => "White has a slight advantage",
            -199..=-50 => "Black has a slight advantage",
            c if c >= 200 => "White has a significant advantage",
            _ => "Black has a significant advantage",
        };
        format!("Score: {} - {}", score, verdict)
    }
}

/// Normalized answer to a best-move request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestMove {
    pub chess_move: Move,
    pub evaluation: EvaluationResult,
}

impl BestMove {
    pub fn source(&self) -> Tier {
        self.evaluation.source
    }
}

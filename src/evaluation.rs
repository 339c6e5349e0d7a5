//! Static Position Evaluation
//!
//! Material plus piece-square bonuses, always from White's point of view.
//! No mobility, pawn structure or king safety terms.

use chess::{Color, Piece, Square, ALL_SQUARES};
use std::collections::HashMap;

use crate::rules::{GameRules, GameStatus};

/// Score returned for a checkmated side
pub const MATE_SCORE: i32 = 999_999;

/// Standard centipawn values for chess pieces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceValues {
    pub pawn: i32,
    pub knight: i32,
    pub bishop: i32,
    pub rook: i32,
    pub queen: i32,
    pub king: i32,
}

impl Default for PieceValues {
    fn default() -> Self {
        Self {
            pawn: 100,
            knight: 320,
            bishop: 330,
            rook: 500,
            queen: 900,
            king: 20_000,
        }
    }
}

impl PieceValues {
    pub fn value(&self, piece: Piece) -> i32 {
        match piece {
            Piece::Pawn => self.pawn,
            Piece::Knight => self.knight,
            Piece::Bishop => self.bishop,
            Piece::Rook => self.rook,
            Piece::Queen => self.queen,
            Piece::King => self.king,
        }
    }
}

// Piece-square tables, authored from White's side: row 0 is rank 8, row 7 is rank 1.
type Table = [[i32; 8]; 8];

const PAWN_TABLE: Table = [
    [0, 0, 0, 0, 0, 0, 0, 0],
    [50, 50, 50, 50, 50, 50, 50, 50],
    [10, 10, 20, 30, 30, 20, 10, 10],
    [5, 5, 10, 25, 25, 10, 5, 5],
    [0, 0, 0, 20, 20, 0, 0, 0],
    [5, -5, -10, 0, 0, -10, -5, 5],
    [5, 10, 10, -20, -20, 10, 10, 5],
    [0, 0, 0, 0, 0, 0, 0, 0],
];

const KNIGHT_TABLE: Table = [
    [-50, -40, -30, -30, -30, -30, -40, -50],
    [-40, -20, 0, 0, 0, 0, -20, -40],
    [-30, 0, 10, 15, 15, 10, 0, -30],
    [-30, 5, 15, 20, 20, 15, 5, -30],
    [-30, 0, 15, 20, 20, 15, 0, -30],
    [-30, 5, 10, 15, 15, 10, 5, -30],
    [-40, -20, 0, 5, 5, 0, -20, -40],
    [-50, -40, -30, -30, -30, -30, -40, -50],
];

const BISHOP_TABLE: Table = [
    [-20, -10, -10, -10, -10, -10, -10, -20],
    [-10, 0, 0, 0, 0, 0, 0, -10],
    [-10, 0, 5, 10, 10, 5, 0, -10],
    [-10, 5, 5, 10, 10, 5, 5, -10],
    [-10, 0, 10, 10, 10, 10, 0, -10],
    [-10, 10, 10, 10, 10, 10, 10, -10],
    [-10, 5, 0, 0, 0, 0, 5, -10],
    [-20, -10, -10, -10, -10, -10, -10, -20],
];

const ROOK_TABLE: Table = [
    [0, 0, 0, 0, 0, 0, 0, 0],
    [5, 10, 10, 10, 10, 10, 10, 5],
    [-5, 0, 0, 0, 0, 0, 0, -5],
    [-5, 0, 0, 0, 0, 0, 0, -5],
    [-5, 0, 0, 0, 0, 0, 0, -5],
    [-5, 0, 0, 0, 0, 0, 0, -5],
    [-5, 0, 0, 0, 0, 0, 0, -5],
    [0, 0, 0, 5, 5, 0, 0, 0],
];

const QUEEN_TABLE: Table = [
    [-20, -10, -10, -5, -5, -10, -10, -20],
    [-10, 0, 0, 0, 0, 0, 0, -10],
    [-10, 0, 5, 5, 5, 5, 0, -10],
    [-5, 0, 5, 5, 5, 5, 0, -5],
    [0, 0, 5, 5, 5, 5, 0, -5],
    [-10, 5, 5, 5, 5, 5, 0, -10],
    [-10, 0, 5, 0, 0, 0, 0, -10],
    [-20, -10, -10, -5, -5, -10, -10, -20],
];

const KING_TABLE: Table = [
    [-30, -40, -40, -50, -50, -40, -40, -30],
    [-30, -40, -40, -50, -50, -40, -40, -30],
    [-30, -40, -40, -50, -50, -40, -40, -30],
    [-30, -40, -40, -50, -50, -40, -40, -30],
    [-20, -30, -30, -40, -40, -30, -30, -20],
    [-10, -20, -20, -20, -20, -20, -20, -10],
    [20, 20, 0, 0, 0, 0, 20, 20],
    [20, 30, 10, 0, 0, 10, 30, 20],
];

fn table_for(piece: Piece) -> &'static Table {
    match piece {
        Piece::Pawn => &PAWN_TABLE,
        Piece::Knight => &KNIGHT_TABLE,
        Piece::Bishop => &BISHOP_TABLE,
        Piece::Rook => &ROOK_TABLE,
        Piece::Queen => &QUEEN_TABLE,
        Piece::King => &KING_TABLE,
    }
}

/// Positional bonus for a piece of `color` on `square`. Black reads the
/// table rank-mirrored.
pub fn square_bonus(piece: Piece, color: Color, square: Square) -> i32 {
    let rank = square.get_rank().to_index();
    let file = square.get_file().to_index();
    let row = match color {
        Color::White => 7 - rank,
        Color::Black => rank,
    };
    table_for(piece)[row][file]
}

/// Occupied squares of a position
pub type PieceList = [(Square, Piece, Color)];

/// One additive term of the static evaluation
pub trait EvaluationComponent: Send + Sync {
    /// White-positive centipawns
    fn evaluate(&self, pieces: &PieceList) -> i32;
    fn component_name(&self) -> &'static str;
}

#[derive(Debug, Clone, Default)]
pub struct MaterialComponent {
    piece_values: PieceValues,
}

impl MaterialComponent {
    pub fn new(piece_values: PieceValues) -> Self {
        Self { piece_values }
    }
}

impl EvaluationComponent for MaterialComponent {
    fn evaluate(&self, pieces: &PieceList) -> i32 {
        pieces
            .iter()
            .map(|&(_, piece, color)| signed(color, self.piece_values.value(piece)))
            .sum()
    }

    fn component_name(&self) -> &'static str {
        "Material"
    }
}

#[derive(Debug, Clone, Default)]
pub struct PieceSquareComponent;

impl EvaluationComponent for PieceSquareComponent {
    fn evaluate(&self, pieces: &PieceList) -> i32 {
        pieces
            .iter()
            .map(|&(square, piece, color)| signed(color, square_bonus(piece, color, square)))
            .sum()
    }

    fn component_name(&self) -> &'static str {
        "PieceSquare"
    }
}

fn signed(color: Color, value: i32) -> i32 {
    match color {
        Color::White => value,
        Color::Black => -value,
    }
}

/// Deterministic, side-to-move independent evaluator
pub struct PositionEvaluator {
    components: Vec<Box<dyn EvaluationComponent>>,
}

impl Default for PositionEvaluator {
    fn default() -> Self {
        Self::new(PieceValues::default())
    }
}

impl PositionEvaluator {
    pub fn new(piece_values: PieceValues) -> Self {
        let components: Vec<Box<dyn EvaluationComponent>> = vec![
            Box::new(MaterialComponent::new(piece_values)),
            Box::new(PieceSquareComponent),
        ];
        Self { components }
    }

    /// White-positive score. Mated side loses `MATE_SCORE`, draws are exactly 0.
    pub fn evaluate<R: GameRules + ?Sized>(&self, rules: &R) -> i32 {
        match rules.status() {
            GameStatus::Checkmate => match rules.side_to_move() {
                Color::White => -MATE_SCORE,
                Color::Black => MATE_SCORE,
            },
            GameStatus::Draw(_) => 0,
            GameStatus::Ongoing => {
                let pieces = collect_pieces(rules);
                self.components.iter().map(|c| c.evaluate(&pieces)).sum()
            }
        }
    }

    /// Per-component breakdown of a non-terminal position
    pub fn evaluate_detailed<R: GameRules + ?Sized>(&self, rules: &R) -> EvaluationBreakdown {
        let pieces = collect_pieces(rules);
        let mut breakdown = EvaluationBreakdown::default();
        for component in &self.components {
            breakdown
                .components
                .insert(component.component_name().to_string(), component.evaluate(&pieces));
        }
        breakdown.total = self.evaluate(rules);
        breakdown
    }
}

fn collect_pieces<R: GameRules + ?Sized>(rules: &R) -> Vec<(Square, Piece, Color)> {
    ALL_SQUARES
        .iter()
        .filter_map(|&square| {
            rules
                .piece_at(square)
                .map(|(piece, color)| (square, piece, color))
        })
        .collect()
}

/// Detailed evaluation breakdown for analysis
#[derive(Debug, Default)]
pub struct EvaluationBreakdown {
    pub components: HashMap<String, i32>,
    pub total: i32,
}

impl EvaluationBreakdown {
    pub fn display(&self) -> String {
        let mut result = String::new();
        result.push_str(&format!("Total: {} cp\n", self.total));
        result.push_str("Breakdown:\n");

        let mut names: Vec<&String> = self.components.keys().collect();
        names.sort();
        for name in names {
            result.push_str(&format!("  {}: {} cp\n", name, self.components[name]));
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::ChessRules;

    #[test]
    fn test_start_position_is_balanced() {
        let evaluator = PositionEvaluator::default();
        assert_eq!(evaluator.evaluate(&ChessRules::new()), 0);
    }

    #[test]
    fn test_extra_knight_for_white() {
        let evaluator = PositionEvaluator::default();
        let rules =
            ChessRules::from_fen("rnbqkb1r/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1")
                .unwrap();
        // Knight value plus the g8 knight's table bonus (-40) no longer subtracted
        assert_eq!(evaluator.evaluate(&rules), 320 - 40);
    }

    #[test]
    fn test_side_to_move_does_not_change_score() {
        let evaluator = PositionEvaluator::default();
        let white = ChessRules::from_fen("4k3/8/8/3q4/8/8/4P3/4K3 w - - 0 1").unwrap();
        let black = ChessRules::from_fen("4k3/8/8/3q4/8/8/4P3/4K3 b - - 0 1").unwrap();
        assert_eq!(evaluator.evaluate(&white), evaluator.evaluate(&black));
        assert!(evaluator.evaluate(&white) < 0);
    }

    #[test]
    fn test_checkmate_scores() {
        let evaluator = PositionEvaluator::default();

        // Black king mated by queen and rook
        let black_mated = ChessRules::from_fen("3k3Q/7R/8/8/8/8/8/6K1 b - - 0 1").unwrap();
        assert_eq!(evaluator.evaluate(&black_mated), MATE_SCORE);

        let white_mated = ChessRules::from_fen("6k1/8/8/8/8/8/r7/r5K1 w - - 0 1").unwrap();
        assert_eq!(evaluator.evaluate(&white_mated), -MATE_SCORE);
    }

    #[test]
    fn test_draw_scores_zero() {
        let evaluator = PositionEvaluator::default();
        let stalemate = ChessRules::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert_eq!(evaluator.evaluate(&stalemate), 0);
    }

    #[test]
    fn test_square_bonus_mirrors_for_black() {
        assert_eq!(square_bonus(Piece::Pawn, Color::White, Square::E4), 20);
        assert_eq!(square_bonus(Piece::Pawn, Color::Black, Square::E5), 20);
        assert_eq!(square_bonus(Piece::King, Color::White, Square::G1), 30);
        assert_eq!(square_bonus(Piece::King, Color::Black, Square::G8), 30);
    }

    #[test]
    fn test_detailed_breakdown() {
        let evaluator = PositionEvaluator::default();
        let breakdown = evaluator.evaluate_detailed(&ChessRules::new());
        assert_eq!(breakdown.components["Material"], 0);
        assert_eq!(breakdown.components["PieceSquare"], 0);
        assert!(breakdown.display().starts_with("Total: 0 cp"));
    }
}

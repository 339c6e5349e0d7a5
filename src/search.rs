use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config_error;
use crate::errors::{EngineError, Result};
use crate::evaluation::PositionEvaluator;
use crate::rules::{ChessRules, GameRules, Move, MoveGuard};
use chess::Color;

/// Lowest depth the orchestrator ever asks for
pub const MIN_SEARCH_DEPTH: u32 = 2;
/// Practical ceiling for full-width in-process search
pub const MAX_SKILL_DEPTH: u32 = 5;

/// Monotonic skill (1-20) to depth mapping: `clamp(skill / 5 + 2, 2, 5)`
pub fn depth_for_skill(skill: u8) -> u32 {
    let skill = u32::from(skill.clamp(1, 20));
    (skill / 5 + 2).clamp(MIN_SEARCH_DEPTH, MAX_SKILL_DEPTH)
}

/// Minimax search result
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub best_move: Move,
    /// White-positive centipawns
    pub evaluation: i32,
    pub depth: u32,
    pub nodes_searched: u64,
    pub time_elapsed: Duration,
}

/// Search configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Depth used when the caller does not pick one
    pub default_depth: u32,
    /// Requests deeper than this are rejected
    pub max_depth: u32,
    /// Disable to run plain full-width minimax
    pub enable_alpha_beta: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_depth: 3,
            max_depth: 6,
            enable_alpha_beta: true,
        }
    }
}

impl SearchConfig {
    pub fn fast() -> Self {
        Self {
            default_depth: MIN_SEARCH_DEPTH,
            ..Self::default()
        }
    }

    /// Reference configuration without pruning
    pub fn full_width() -> Self {
        Self {
            enable_alpha_beta: false,
            ..Self::default()
        }
    }
}

/// Fixed-depth minimax with alpha-beta pruning.
///
/// No move ordering, transposition table or iterative deepening: output is
/// fully determined by the rules collaborator's move order.
pub struct MinimaxSearch {
    config: SearchConfig,
    evaluator: PositionEvaluator,
    nodes_searched: u64,
}

impl MinimaxSearch {
    pub fn new(config: SearchConfig) -> Self {
        Self::with_evaluator(config, PositionEvaluator::default())
    }

    pub fn with_evaluator(config: SearchConfig, evaluator: PositionEvaluator) -> Self {
        Self {
            config,
            evaluator,
            nodes_searched: 0,
        }
    }

    pub fn new_default() -> Self {
        Self::new(SearchConfig::default())
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &PositionEvaluator {
        &self.evaluator
    }

    pub fn nodes_searched(&self) -> u64 {
        self.nodes_searched
    }

    /// Parse `fen` and search it at `depth`.
    pub fn find_best_move_fen(&mut self, fen: &str, depth: u32) -> Result<SearchResult> {
        let mut rules = ChessRules::from_fen(fen)?;
        self.find_best_move(&mut rules, depth)
    }

    /// Best move for the side to move. The position is left exactly as it was,
    /// on success and on failure.
    pub fn find_best_move<R: GameRules>(&mut self, rules: &mut R, depth: u32) -> Result<SearchResult> {
        if depth == 0 || depth > self.config.max_depth {
            return Err(config_error!(
                "search depth {} outside 1..={}",
                depth,
                self.config.max_depth
            ));
        }

        self.nodes_searched = 0;
        let start_time = Instant::now();

        let moves = rules.legal_moves();
        if moves.is_empty() {
            return Err(EngineError::NoLegalMoves);
        }

        let maximizing = rules.side_to_move() == Color::White;
        let mut alpha = i32::MIN;
        let mut beta = i32::MAX;
        let mut best: Option<(Move, i32)> = None;

        for mv in moves {
            let value = {
                let mut child = MoveGuard::apply(rules, &mv)?;
                self.minimax(&mut *child, depth - 1, alpha, beta, !maximizing)?
            };

            // Strict comparison: ties keep the earlier move
            let improves = match &best {
                None => true,
                Some((_, best_value)) if maximizing => value > *best_value,
                Some((_, best_value)) => value < *best_value,
            };
            if improves {
                best = Some((mv, value));
            }

            if self.config.enable_alpha_beta {
                if maximizing {
                    alpha = alpha.max(value);
                } else {
                    beta = beta.min(value);
                }
            }
        }

        let (best_move, evaluation) = best.ok_or(EngineError::NoLegalMoves)?;
        let result = SearchResult {
            best_move,
            evaluation,
            depth,
            nodes_searched: self.nodes_searched,
            time_elapsed: start_time.elapsed(),
        };

        debug!(
            best_move = %result.best_move,
            evaluation = result.evaluation,
            depth,
            nodes = result.nodes_searched,
            elapsed_ms = result.time_elapsed.as_millis() as u64,
            "minimax search complete"
        );

        Ok(result)
    }

    fn minimax<R: GameRules>(
        &mut self,
        rules: &mut R,
        depth: u32,
        mut alpha: i32,
        mut beta: i32,
        maximizing: bool,
    ) -> Result<i32> {
        self.nodes_searched += 1;

        if depth == 0 {
            return Ok(self.evaluator.evaluate(rules));
        }

        let moves = rules.search_moves();
        if moves.is_empty() {
            return Ok(self.evaluator.evaluate(rules));
        }

        let mut best_value = if maximizing { i32::MIN } else { i32::MAX };

        for mv in &moves {
            let value = {
                let mut child = MoveGuard::apply(rules, mv)?;
                self.minimax(&mut *child, depth - 1, alpha, beta, !maximizing)?
            };

            if maximizing {
                best_value = best_value.max(value);
                alpha = alpha.max(value);
            } else {
                best_value = best_value.min(value);
                beta = beta.min(value);
            }

            if self.config.enable_alpha_beta && beta <= alpha {
                break;
            }
        }

        Ok(best_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::MATE_SCORE;
    use crate::rules::{GameStatus, START_FEN};
    use chess::{Piece, Square};

    /// Delegates to `ChessRules` but rejects the n-th `apply`.
    struct FaultyRules {
        inner: ChessRules,
        applies_left: usize,
        applied: usize,
        undone: usize,
    }

    impl GameRules for FaultyRules {
        fn legal_moves(&self) -> Vec<Move> {
            self.inner.legal_moves()
        }

        fn apply(&mut self, mv: &Move) -> Result<()> {
            if self.applies_left == 0 {
                return Err(EngineError::EngineFault("rules backend crashed".to_string()));
            }
            self.applies_left -= 1;
            self.applied += 1;
            self.inner.apply(mv)
        }

        fn undo(&mut self) -> Option<Move> {
            self.undone += 1;
            self.inner.undo()
        }

        fn status(&self) -> GameStatus {
            self.inner.status()
        }

        fn side_to_move(&self) -> Color {
            self.inner.side_to_move()
        }

        fn piece_at(&self, square: Square) -> Option<(Piece, Color)> {
            self.inner.piece_at(square)
        }

        fn to_fen(&self) -> String {
            self.inner.to_fen()
        }
    }

    /// Counts which move generator the search asks for.
    struct CountingRules {
        inner: ChessRules,
        legal_calls: std::cell::Cell<usize>,
        search_calls: std::cell::Cell<usize>,
    }

    impl GameRules for CountingRules {
        fn legal_moves(&self) -> Vec<Move> {
            self.legal_calls.set(self.legal_calls.get() + 1);
            self.inner.legal_moves()
        }

        fn search_moves(&self) -> Vec<Move> {
            self.search_calls.set(self.search_calls.get() + 1);
            self.inner.search_moves()
        }

        fn apply(&mut self, mv: &Move) -> Result<()> {
            self.inner.apply(mv)
        }

        fn undo(&mut self) -> Option<Move> {
            self.inner.undo()
        }

        fn status(&self) -> GameStatus {
            self.inner.status()
        }

        fn side_to_move(&self) -> Color {
            self.inner.side_to_move()
        }

        fn piece_at(&self, square: Square) -> Option<(Piece, Color)> {
            self.inner.piece_at(square)
        }

        fn to_fen(&self) -> String {
            self.inner.to_fen()
        }
    }

    #[test]
    fn test_interior_nodes_skip_notation() {
        let mut rules = CountingRules {
            inner: ChessRules::new(),
            legal_calls: std::cell::Cell::new(0),
            search_calls: std::cell::Cell::new(0),
        };
        let mut search = MinimaxSearch::new_default();
        let result = search.find_best_move(&mut rules, 3).unwrap();

        // Only the root needs notation for the returned move
        assert_eq!(rules.legal_calls.get(), 1);
        assert!(rules.search_calls.get() > 20);
        assert!(!result.best_move.san.is_empty());
    }

    #[test]
    fn test_depth_for_skill() {
        assert_eq!(depth_for_skill(1), 2);
        assert_eq!(depth_for_skill(5), 3);
        assert_eq!(depth_for_skill(10), 4);
        assert_eq!(depth_for_skill(15), 5);
        assert_eq!(depth_for_skill(20), 5);
        assert_eq!(depth_for_skill(0), 2);
    }

    #[test]
    fn test_start_position_search() {
        let mut search = MinimaxSearch::new_default();
        let mut rules = ChessRules::new();
        let result = search.find_best_move(&mut rules, 2).unwrap();

        assert!(rules
            .legal_moves()
            .iter()
            .any(|m| m.same_action(&result.best_move)));
        assert!(result.nodes_searched > 20);
        assert_eq!(rules.to_fen(), START_FEN);
    }

    #[test]
    fn test_finds_mate_in_one() {
        let mut search = MinimaxSearch::new_default();
        let result = search
            .find_best_move_fen("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1", 2)
            .unwrap();
        assert_eq!(result.best_move.san, "Ra8#");
        assert_eq!(result.evaluation, MATE_SCORE);

        let result = search
            .find_best_move_fen("r5k1/5ppp/8/8/8/8/5PPP/6K1 b - - 0 1", 1)
            .unwrap();
        assert_eq!(result.best_move.san, "Ra1#");
        assert_eq!(result.evaluation, -MATE_SCORE);
    }

    #[test]
    fn test_captures_hanging_queen() {
        let mut search = MinimaxSearch::new_default();
        let result = search
            .find_best_move_fen("4k3/8/8/3q4/4P3/8/8/4K3 w - - 0 1", 2)
            .unwrap();
        assert_eq!(result.best_move.coordinate(), "e4d5");
        assert_eq!(result.best_move.captured, Some(Piece::Queen));
    }

    #[test]
    fn test_no_legal_moves() {
        let mut search = MinimaxSearch::new_default();
        let checkmate = "3k3Q/7R/8/8/8/8/8/6K1 b - - 0 1";
        for depth in 1..=4 {
            let err = search.find_best_move_fen(checkmate, depth).unwrap_err();
            assert_eq!(err, EngineError::NoLegalMoves);
            assert_eq!(search.nodes_searched(), 0);
        }

        let stalemate = "7k/5Q2/6K1/8/8/8/8/8 b - - 0 1";
        assert_eq!(
            search.find_best_move_fen(stalemate, 2).unwrap_err(),
            EngineError::NoLegalMoves
        );
    }

    #[test]
    fn test_invalid_depth() {
        let mut search = MinimaxSearch::new_default();
        let mut rules = ChessRules::new();
        assert!(matches!(
            search.find_best_move(&mut rules, 0),
            Err(EngineError::ConfigurationError(_))
        ));
        assert!(search.find_best_move(&mut rules, 7).is_err());
    }

    #[test]
    fn test_ties_keep_first_move() {
        // Bare kings: every child is a dead draw
        let mut search = MinimaxSearch::new_default();
        let mut rules = ChessRules::from_fen("8/8/8/8/8/8/8/K6k w - - 0 1").unwrap();
        let first = rules.legal_moves().remove(0);
        let result = search.find_best_move(&mut rules, 2).unwrap();
        assert_eq!(result.evaluation, 0);
        assert!(result.best_move.same_action(&first));
    }

    #[test]
    fn test_alpha_beta_matches_full_width() {
        let positions = [
            START_FEN,
            "r1bqkb1r/pppp1ppp/2n2n2/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4",
            "4k3/8/8/3q4/4P3/8/8/4K3 b - - 0 1",
        ];

        for fen in positions {
            let mut pruned = MinimaxSearch::new_default();
            let mut full = MinimaxSearch::new(SearchConfig::full_width());

            let a = pruned.find_best_move_fen(fen, 3).unwrap();
            let b = full.find_best_move_fen(fen, 3).unwrap();

            assert_eq!(a.evaluation, b.evaluation, "{}", fen);
            assert!(a.best_move.same_action(&b.best_move), "{}", fen);
            assert!(a.nodes_searched <= b.nodes_searched);
        }
    }

    #[test]
    fn test_fault_propagates_and_restores_position() {
        let mut search = MinimaxSearch::new_default();
        let mut rules = FaultyRules {
            inner: ChessRules::new(),
            applies_left: 25,
            applied: 0,
            undone: 0,
        };

        let err = search.find_best_move(&mut rules, 3).unwrap_err();
        assert!(matches!(err, EngineError::EngineFault(_)));
        assert_eq!(rules.applied, rules.undone);
        assert_eq!(rules.inner.ply(), 0);
        assert_eq!(rules.to_fen(), START_FEN);
    }
}

//! Property-based tests for the local engine using proptest.

use chess_tier_engine::rules::mirror_fen;
use chess_tier_engine::{
    ChessRules, EngineError, GameRules, MinimaxSearch, PositionEvaluator, SearchConfig,
};
use proptest::prelude::*;
use rand::prelude::*;
use rand::Rng;

/// Position reached by a seeded random playout from the start, re-read from
/// FEN so it carries no repetition history.
fn random_position(seed: u64, plies: usize) -> ChessRules {
    let mut rules = ChessRules::new();
    let mut rng = StdRng::seed_from_u64(seed);

    for _ in 0..plies {
        let moves = rules.legal_moves();
        if moves.is_empty() {
            break;
        }
        let mv = &moves[rng.gen_range(0..moves.len())];
        rules.apply(mv).expect("generated move is legal");
    }

    ChessRules::from_fen(&rules.to_fen()).expect("round-tripped FEN is valid")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: evaluation is antisymmetric under colour mirroring
    #[test]
    fn prop_evaluation_mirror_symmetry(seed in any::<u64>(), plies in 0..60usize) {
        let evaluator = PositionEvaluator::default();
        let rules = random_position(seed, plies);
        let mirrored = rules.mirrored().expect("mirrored FEN is valid");

        prop_assert_eq!(evaluator.evaluate(&rules), -evaluator.evaluate(&mirrored));
        prop_assert_eq!(mirror_fen(&mirror_fen(&rules.to_fen())), rules.to_fen());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Property: pruning never changes the chosen move or its value
    #[test]
    fn prop_alpha_beta_matches_full_width(seed in any::<u64>(), plies in 0..40usize, depth in 1..=3u32) {
        let mut rules = random_position(seed, plies);
        let mut pruned = MinimaxSearch::new(SearchConfig::default());
        let mut full = MinimaxSearch::new(SearchConfig::full_width());

        match (pruned.find_best_move(&mut rules, depth), full.find_best_move(&mut rules, depth)) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(a.evaluation, b.evaluation);
                prop_assert!(a.best_move.same_action(&b.best_move));
                prop_assert!(a.nodes_searched <= b.nodes_searched);
            }
            (Err(a), Err(b)) => {
                prop_assert_eq!(a, EngineError::NoLegalMoves);
                prop_assert_eq!(b, EngineError::NoLegalMoves);
            }
            (a, b) => prop_assert!(false, "searches disagree: {:?} vs {:?}", a, b),
        }
    }

    /// Property: a search leaves the position exactly as it found it
    #[test]
    fn prop_search_restores_position(seed in any::<u64>(), plies in 0..40usize, depth in 1..=3u32) {
        let mut rules = random_position(seed, plies);
        let fen_before = rules.to_fen();
        let ply_before = rules.ply();

        let mut search = MinimaxSearch::new(SearchConfig::default());
        let result = search.find_best_move(&mut rules, depth);

        prop_assert_eq!(rules.to_fen(), fen_before);
        prop_assert_eq!(rules.ply(), ply_before);

        if rules.legal_moves().is_empty() {
            prop_assert_eq!(result.err(), Some(EngineError::NoLegalMoves));
            prop_assert_eq!(search.nodes_searched(), 0);
        } else {
            let best = result.expect("search succeeds on a live position");
            prop_assert!(rules.legal_moves().iter().any(|mv| mv.same_action(&best.best_move)));
        }
    }
}

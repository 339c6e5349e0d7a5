use chess_tier_engine::{ChessRules, MinimaxSearch, PositionEvaluator, SearchConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn test_positions() -> Vec<(&'static str, &'static str)> {
    vec![
        ("start", "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"),
        ("italian", "r1bqkb1r/pppp1ppp/2n2n2/4p3/2B1P3/3P1N2/PPP2PPP/RNBQK2R b KQkq - 0 4"),
        ("endgame", "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1"),
    ]
}

fn benchmark_evaluation(c: &mut Criterion) {
    let evaluator = PositionEvaluator::default();
    let positions: Vec<ChessRules> = test_positions()
        .iter()
        .map(|(_, fen)| ChessRules::from_fen(fen).expect("Valid FEN"))
        .collect();

    c.bench_function("static_evaluation", |b| {
        b.iter(|| {
            for rules in &positions {
                black_box(evaluator.evaluate(rules));
            }
        })
    });
}

fn benchmark_search_depths(c: &mut Criterion) {
    let mut group = c.benchmark_group("minimax_search");
    group.sample_size(10);

    for (name, fen) in test_positions() {
        for depth in [2u32, 3, 4] {
            group.bench_with_input(
                BenchmarkId::new(name, depth),
                &depth,
                |b, &depth| {
                    let mut search = MinimaxSearch::new(SearchConfig::default());
                    b.iter(|| black_box(search.find_best_move_fen(fen, depth).expect("search")))
                },
            );
        }
    }

    group.finish();
}

fn benchmark_pruning(c: &mut Criterion) {
    let mut group = c.benchmark_group("alpha_beta_vs_full_width");
    group.sample_size(10);
    let fen = "r1bqkb1r/pppp1ppp/2n2n2/4p3/2B1P3/3P1N2/PPP2PPP/RNBQK2R b KQkq - 0 4";

    for (name, config) in [
        ("alpha_beta", SearchConfig::default()),
        ("full_width", SearchConfig::full_width()),
    ] {
        group.bench_function(name, |b| {
            let mut search = MinimaxSearch::new(config.clone());
            b.iter(|| black_box(search.find_best_move_fen(fen, 3).expect("search")))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_evaluation,
    benchmark_search_depths,
    benchmark_pruning
);
criterion_main!(benches);

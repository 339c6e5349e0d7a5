//! # Chess Tier Engine
//!
//! Move selection and position analysis for a chess opponent, with graceful
//! degradation across several sources of analysis.
//!
//! ## Features
//!
//! - **Remote cloud analysis**: cached evaluations from a lichess-compatible `cloud-eval` service
//! - **External UCI engine**: drives a long-lived engine process such as Stockfish
//! - **Local search**: minimax with alpha-beta pruning over material and piece-square evaluation
//! - **Tiered fallback**: every failure degrades to the next tier, ending in a shallow local search
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chess_tier_engine::{EngineOrchestrator, OrchestratorConfig, START_FEN};
//!
//! # async fn run() -> chess_tier_engine::Result<()> {
//! let orchestrator = EngineOrchestrator::new(OrchestratorConfig::default())?;
//!
//! let best = orchestrator.request_best_move(START_FEN, 10).await?;
//! println!("{} ({})", best.chess_move, best.source());
//!
//! let eval = orchestrator.request_evaluation(START_FEN).await?;
//! println!("{}", eval.description());
//! # Ok(())
//! # }
//! ```
//!
//! Local search can also be used on its own:
//!
//! ```rust
//! use chess_tier_engine::{MinimaxSearch, SearchConfig};
//!
//! let mut search = MinimaxSearch::new(SearchConfig::fast());
//! let result = search
//!     .find_best_move_fen("4k3/8/8/3q4/4P3/8/8/4K3 w - - 0 1", 2)
//!     .unwrap();
//! assert_eq!(result.best_move.san, "exd5");
//! ```

// Core modules
pub mod errors;
pub mod rules;
pub mod analysis;

// Local engine
pub mod evaluation;
pub mod search;

// Other tiers
pub mod protocol;
pub mod external_engine;
pub mod remote;

pub mod orchestrator;
pub mod config;

// Re-export commonly used types
pub use analysis::{BestMove, EvaluationResult, Tier};
pub use config::EngineConfig;
pub use errors::{EngineError, Result};
pub use evaluation::{PieceValues, PositionEvaluator, MATE_SCORE};
pub use external_engine::{ExternalEngine, ExternalEngineConfig, UciEngine};
pub use orchestrator::{EngineOrchestrator, OrchestratorConfig, ReprobePolicy, TierState};
pub use protocol::{ReadinessState, SearchLimit};
pub use remote::{RemoteAnalysis, RemoteAnalysisClient, RemoteConfig, RemoteError};
pub use rules::{ChessRules, GameRules, GameStatus, Move, START_FEN};
pub use search::{depth_for_skill, MinimaxSearch, SearchConfig, SearchResult};

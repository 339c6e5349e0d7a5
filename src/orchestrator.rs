//! Tiered move-selection dispatcher.
//!
//! Each request walks the tiers in priority order: remote analysis, the
//! external engine, local search at the skill-derived depth, then local
//! search once more at the fallback depth. Tier failures are logged and
//! absorbed here; callers only see [`EngineError::EngineUnavailable`] once
//! every tier has failed.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::analysis::{BestMove, EvaluationResult, Tier};
use crate::engine_fault;
use crate::errors::{EngineError, Result};
use crate::external_engine::{ExternalEngine, ExternalEngineConfig, UciEngine};
use crate::protocol::{ReadinessState, MAX_SKILL_LEVEL, MIN_SKILL_LEVEL};
use crate::remote::{RemoteAnalysis, RemoteAnalysisClient, RemoteConfig, RemoteError};
use crate::rules::{ChessRules, GameRules};
use crate::search::{depth_for_skill, MinimaxSearch, SearchConfig, MIN_SEARCH_DEPTH};

/// Depth `request_evaluation` searches at when no remote analysis is available
pub const EVALUATION_DEPTH: u32 = 3;

/// When a disabled remote tier may be tried again
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum ReprobePolicy {
    /// Once disabled the remote tier stays disabled for the life of the state
    #[default]
    Never,
    /// Probe again after `initial_ms`, doubling after each failed probe up to `max_ms`
    Backoff { initial_ms: u64, max_ms: u64 },
}

#[derive(Debug, Default)]
struct ReprobeWindow {
    next_probe: Option<Instant>,
    delay: Duration,
}

/// Which tiers are currently preferred. Owned by one orchestrator, or shared
/// between several through an `Arc` when they should degrade together.
#[derive(Debug)]
pub struct TierState {
    remote_enabled: AtomicBool,
    disable_transitions: AtomicU32,
    policy: ReprobePolicy,
    window: Mutex<ReprobeWindow>,
}

impl Default for TierState {
    fn default() -> Self {
        Self::new(ReprobePolicy::Never)
    }
}

impl TierState {
    pub fn new(policy: ReprobePolicy) -> Self {
        Self {
            remote_enabled: AtomicBool::new(true),
            disable_transitions: AtomicU32::new(0),
            policy,
            window: Mutex::new(ReprobeWindow::default()),
        }
    }

    pub fn policy(&self) -> ReprobePolicy {
        self.policy
    }

    pub fn remote_enabled(&self) -> bool {
        self.remote_enabled.load(Ordering::SeqCst)
    }

    /// Number of enabled-to-disabled transitions so far
    pub fn disable_transitions(&self) -> u32 {
        self.disable_transitions.load(Ordering::SeqCst)
    }

    /// Whether this request should contact the remote tier, either because it
    /// is enabled or because a re-probe is due.
    pub fn should_try_remote(&self) -> bool {
        if self.remote_enabled() {
            return true;
        }
        match self.policy {
            ReprobePolicy::Never => false,
            ReprobePolicy::Backoff { .. } => {
                let window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
                window
                    .next_probe
                    .is_some_and(|next_probe| Instant::now() >= next_probe)
            }
        }
    }

    pub fn record_remote_failure(&self) {
        let was_enabled = self.remote_enabled.swap(false, Ordering::SeqCst);
        if was_enabled {
            self.disable_transitions.fetch_add(1, Ordering::SeqCst);
        }

        if let ReprobePolicy::Backoff { initial_ms, max_ms } = self.policy {
            let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
            let max = Duration::from_millis(max_ms);
            window.delay = if was_enabled || window.delay.is_zero() {
                Duration::from_millis(initial_ms).min(max)
            } else {
                (window.delay * 2).min(max)
            };
            window.next_probe = Some(Instant::now() + window.delay);
            debug!(delay_ms = window.delay.as_millis() as u64, "remote re-probe scheduled");
        }
    }

    pub fn record_remote_success(&self) {
        if self.remote_enabled() {
            return;
        }
        // A success while disabled can only come from a scheduled probe
        if matches!(self.policy, ReprobePolicy::Backoff { .. }) {
            let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);
            *window = ReprobeWindow::default();
            self.remote_enabled.store(true, Ordering::SeqCst);
            info!("remote analysis re-enabled");
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Consult the remote analysis tier at all
    pub use_remote: bool,
    pub remote: RemoteConfig,
    /// External UCI engine; `None` skips the tier
    pub external_engine: Option<ExternalEngineConfig>,
    pub search: SearchConfig,
    /// Depth of the last-resort retry
    pub fallback_depth: u32,
    pub evaluation_depth: u32,
    pub reprobe: ReprobePolicy,
    /// Treat an empty remote answer as a tier failure
    pub disable_remote_on_no_analysis: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            use_remote: true,
            remote: RemoteConfig::default(),
            external_engine: None,
            search: SearchConfig::default(),
            fallback_depth: MIN_SEARCH_DEPTH,
            evaluation_depth: EVALUATION_DEPTH,
            reprobe: ReprobePolicy::Never,
            disable_remote_on_no_analysis: true,
        }
    }
}

impl OrchestratorConfig {
    /// Local search only; nothing leaves the process
    pub fn offline() -> Self {
        Self {
            use_remote: false,
            external_engine: None,
            ..Self::default()
        }
    }
}

/// Tiered engine front end
pub struct EngineOrchestrator {
    config: OrchestratorConfig,
    remote: Option<Arc<dyn RemoteAnalysis>>,
    external: Option<Arc<dyn UciEngine>>,
    state: Arc<TierState>,
    local_searches: AtomicU64,
}

impl EngineOrchestrator {
    /// Build the tiers described by `config`.
    pub fn new(config: OrchestratorConfig) -> Result<Self> {
        let remote: Option<Arc<dyn RemoteAnalysis>> = if config.use_remote {
            Some(Arc::new(RemoteAnalysisClient::new(config.remote.clone())?))
        } else {
            None
        };
        let external: Option<Arc<dyn UciEngine>> = config
            .external_engine
            .clone()
            .map(|engine_config| Arc::new(ExternalEngine::new(engine_config)) as Arc<dyn UciEngine>);

        let mut orchestrator = Self::local_only(config);
        orchestrator.remote = remote;
        orchestrator.external = external;
        Ok(orchestrator)
    }

    /// No remote or external tiers regardless of `config`; attach them with
    /// [`with_remote`](Self::with_remote) and
    /// [`with_external_engine`](Self::with_external_engine).
    pub fn local_only(config: OrchestratorConfig) -> Self {
        let state = Arc::new(TierState::new(config.reprobe));
        Self {
            config,
            remote: None,
            external: None,
            state,
            local_searches: AtomicU64::new(0),
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteAnalysis>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_external_engine(mut self, engine: Arc<dyn UciEngine>) -> Self {
        self.external = Some(engine);
        self
    }

    pub fn with_tier_state(mut self, state: Arc<TierState>) -> Self {
        self.state = state;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn tier_state(&self) -> &Arc<TierState> {
        &self.state
    }

    /// Local searches started so far, degraded retries included
    pub fn local_search_count(&self) -> u64 {
        self.local_searches.load(Ordering::SeqCst)
    }

    /// Best move for the side to move at the given skill level (1-20).
    pub async fn request_best_move(&self, fen: &str, skill: u8) -> Result<BestMove> {
        let rules = ChessRules::from_fen(fen)?;
        if rules.legal_moves().is_empty() {
            return Err(EngineError::NoLegalMoves);
        }
        let skill = skill.clamp(MIN_SKILL_LEVEL, MAX_SKILL_LEVEL);
        let mut attempts = 0;

        if let Some(evaluation) = self.consult_remote(fen).await {
            attempts += 1;
            if let Some(best) = self.accept_remote(&rules, evaluation) {
                return Ok(best);
            }
        }

        if let Some(engine) = self.available_external().await {
            attempts += 1;
            if let Some(best) = consult_external(engine.as_ref(), &rules, fen, skill).await {
                return Ok(best);
            }
        }

        attempts += 1;
        let depth = depth_for_skill(skill);
        match self.run_local_search(fen, depth, Tier::LocalSearch).await {
            Ok(best) => return Ok(best),
            Err(e) if !e.is_recoverable() => return Err(e),
            Err(e) => warn!(error = %e, depth, "local search failed, retrying at fallback depth"),
        }

        attempts += 1;
        self.run_local_search(fen, self.config.fallback_depth, Tier::DegradedSearch)
            .await
            .map_err(|e| {
                warn!(error = %e, "degraded search failed");
                EngineError::EngineUnavailable { attempts }
            })
    }

    /// White-positive evaluation of `fen`, tried through the same tiers as
    /// [`request_best_move`](Self::request_best_move). The external engine
    /// runs at full strength and local search at the evaluation depth.
    /// Terminal positions are scored without searching.
    pub async fn request_evaluation(&self, fen: &str) -> Result<EvaluationResult> {
        let rules = ChessRules::from_fen(fen)?;
        if rules.status().is_terminal() {
            let search = MinimaxSearch::new(self.config.search.clone());
            let score = search.evaluator().evaluate(&rules);
            return Ok(EvaluationResult::centipawns(score, None, Tier::LocalSearch).with_depth(0));
        }

        let mut attempts = 0;
        if let Some(evaluation) = self.consult_remote(fen).await {
            attempts += 1;
            if let Some(best) = self.accept_remote(&rules, evaluation) {
                if best.evaluation.has_analysis() {
                    return Ok(best.evaluation);
                }
                debug!("remote line carries no score, trying lower tiers");
            }
        }

        if let Some(engine) = self.available_external().await {
            attempts += 1;
            let answer = consult_external(engine.as_ref(), &rules, fen, MAX_SKILL_LEVEL).await;
            if let Some(best) = answer {
                if best.evaluation.has_analysis() {
                    return Ok(best.evaluation);
                }
                debug!("external engine reported no score, trying local search");
            }
        }

        for (depth, tier) in [
            (self.config.evaluation_depth, Tier::LocalSearch),
            (self.config.fallback_depth, Tier::DegradedSearch),
        ] {
            attempts += 1;
            match self.run_local_search(fen, depth, tier).await {
                Ok(best) => return Ok(best.evaluation),
                Err(e) => warn!(error = %e, depth, %tier, "evaluation search failed"),
            }
        }

        Err(EngineError::EngineUnavailable { attempts })
    }

    /// Query the remote tier if it is due. Failures update the tier state and
    /// yield `None`.
    async fn consult_remote(&self, fen: &str) -> Option<EvaluationResult> {
        let remote = self.remote.as_ref()?;
        if !self.state.should_try_remote() {
            debug!("remote analysis disabled, skipping");
            return None;
        }

        match remote.query(fen).await {
            Ok(evaluation) => Some(evaluation),
            Err(RemoteError::NoAnalysis) if !self.config.disable_remote_on_no_analysis => {
                debug!("remote has no analysis for this position");
                None
            }
            Err(e) => {
                warn!(error = %e, "remote analysis failed, disabling tier");
                self.state.record_remote_failure();
                None
            }
        }
    }

    /// Accept a remote answer only if its move is legal here. The outcome
    /// feeds the tier state either way.
    fn accept_remote(&self, rules: &ChessRules, evaluation: EvaluationResult) -> Option<BestMove> {
        let principal_move = evaluation.principal_move.clone();
        match bind_move(rules, evaluation) {
            Some(best) => {
                self.state.record_remote_success();
                Some(best)
            }
            None => {
                warn!(?principal_move, "remote move is not legal here");
                self.state.record_remote_failure();
                None
            }
        }
    }

    async fn available_external(&self) -> Option<&Arc<dyn UciEngine>> {
        let engine = self.external.as_ref()?;
        if engine.readiness().await == ReadinessState::Failed {
            debug!("external engine failed earlier, skipping");
            return None;
        }
        Some(engine)
    }

    async fn run_local_search(&self, fen: &str, depth: u32, tier: Tier) -> Result<BestMove> {
        self.local_searches.fetch_add(1, Ordering::SeqCst);
        let config = self.config.search.clone();
        let fen = fen.to_string();

        let result = tokio::task::spawn_blocking(move || {
            MinimaxSearch::new(config).find_best_move_fen(&fen, depth)
        })
        .await
        .map_err(|e| engine_fault!("search worker failed: {}", e))??;

        info!(
            best_move = %result.best_move,
            evaluation = result.evaluation,
            depth,
            %tier,
            "move selected by local search"
        );

        let evaluation = EvaluationResult::centipawns(
            result.evaluation,
            Some(result.best_move.coordinate()),
            tier,
        )
        .with_depth(result.depth);

        Ok(BestMove {
            chess_move: result.best_move,
            evaluation,
        })
    }
}

/// Run one external search. Failures are logged and yield `None`.
async fn consult_external(
    engine: &dyn UciEngine,
    rules: &ChessRules,
    fen: &str,
    skill: u8,
) -> Option<BestMove> {
    match engine.analyze(fen, skill).await {
        Ok(analysis) => {
            let best = bind_move(rules, analysis.to_evaluation(rules.side_to_move()));
            if best.is_none() {
                warn!(best_move = ?analysis.best_move, "external engine move is not legal here");
            }
            best
        }
        Err(e) => {
            warn!(error = %e, "external engine tier failed");
            None
        }
    }
}

/// Pair an evaluation with the legal move its principal move names. The
/// principal move is rewritten to plain coordinates, so `e1h1` becomes `e1g1`.
fn bind_move(rules: &ChessRules, mut evaluation: EvaluationResult) -> Option<BestMove> {
    let chess_move = rules.find_move(evaluation.principal_move.as_deref()?)?;
    evaluation.principal_move = Some(chess_move.coordinate());
    Some(BestMove {
        chess_move,
        evaluation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_policy_disables_once() {
        let state = TierState::default();
        assert!(state.should_try_remote());

        state.record_remote_failure();
        state.record_remote_failure();
        assert!(!state.remote_enabled());
        assert!(!state.should_try_remote());
        assert_eq!(state.disable_transitions(), 1);

        // Never re-enabled without a re-probe policy
        state.record_remote_success();
        assert!(!state.remote_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_window_doubles() {
        let state = TierState::new(ReprobePolicy::Backoff {
            initial_ms: 1000,
            max_ms: 3000,
        });

        state.record_remote_failure();
        assert!(!state.should_try_remote());

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert!(state.should_try_remote());

        // Failed probe: next window is 2s
        state.record_remote_failure();
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert!(!state.should_try_remote());
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(state.should_try_remote());

        // Capped at 3s
        state.record_remote_failure();
        tokio::time::advance(Duration::from_millis(3000)).await;
        assert!(state.should_try_remote());

        state.record_remote_success();
        assert!(state.remote_enabled());
        assert_eq!(state.disable_transitions(), 1);
    }

    #[test]
    fn test_offline_preset() {
        let config = OrchestratorConfig::offline();
        assert!(!config.use_remote);
        assert!(config.external_engine.is_none());
        assert_eq!(config.fallback_depth, 2);
        assert_eq!(config.evaluation_depth, 3);
    }

    #[test]
    fn test_reprobe_policy_serde() {
        let policy: ReprobePolicy =
            serde_json::from_str(r#"{"policy":"backoff","initial_ms":500,"max_ms":8000}"#).unwrap();
        assert_eq!(
            policy,
            ReprobePolicy::Backoff {
                initial_ms: 500,
                max_ms: 8000
            }
        );
        let never: ReprobePolicy = serde_json::from_str(r#"{"policy":"never"}"#).unwrap();
        assert_eq!(never, ReprobePolicy::Never);
    }

    #[tokio::test]
    async fn test_offline_best_move_uses_local_search() {
        let orchestrator = EngineOrchestrator::new(OrchestratorConfig::offline()).unwrap();
        let best = orchestrator
            .request_best_move("4k3/8/8/3q4/4P3/8/8/4K3 w - - 0 1", 1)
            .await
            .unwrap();

        assert_eq!(best.chess_move.san, "exd5");
        assert_eq!(best.source(), Tier::LocalSearch);
        assert_eq!(best.evaluation.depth, Some(2));
        assert_eq!(orchestrator.local_search_count(), 1);
    }

    #[tokio::test]
    async fn test_terminal_position_short_circuits() {
        let orchestrator = EngineOrchestrator::new(OrchestratorConfig::offline()).unwrap();
        let mate = "3k3Q/7R/8/8/8/8/8/6K1 b - - 0 1";

        let err = orchestrator.request_best_move(mate, 10).await.unwrap_err();
        assert_eq!(err, EngineError::NoLegalMoves);
        assert_eq!(orchestrator.local_search_count(), 0);

        let eval = orchestrator.request_evaluation(mate).await.unwrap();
        assert_eq!(eval.centipawns, Some(crate::evaluation::MATE_SCORE));
    }

    #[tokio::test]
    async fn test_invalid_fen_is_reported() {
        let orchestrator = EngineOrchestrator::new(OrchestratorConfig::offline()).unwrap();
        let err = orchestrator.request_best_move("not a fen", 10).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidPosition(_)));
    }
}

//! Remote cloud analysis client.
//!
//! One HTTP GET per query against a lichess-compatible `cloud-eval`
//! endpoint, bounded by a fixed timeout. Retries and backoff are left to the
//! orchestrator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::analysis::{EvaluationResult, Tier};
use crate::config_error;
use crate::errors::Result;
use crate::protocol::is_coordinate_move;

pub const DEFAULT_BASE_URL: &str = "https://lichess.org/api";
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Failure modes of a single remote query
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("remote analysis timed out")]
    Timeout,
    #[error("remote analysis returned HTTP {status}")]
    Http { status: u16 },
    #[error("remote transport failure: {0}")]
    Transport(String),
    #[error("malformed remote response: {0}")]
    Decode(String),
    /// The service answered but has no cached analysis for the position
    #[error("no analysis available for this position")]
    NoAnalysis,
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            RemoteError::Timeout
        } else if let Some(status) = error.status() {
            RemoteError::Http {
                status: status.as_u16(),
            }
        } else if error.is_decode() {
            RemoteError::Decode(error.to_string())
        } else {
            RemoteError::Transport(error.to_string())
        }
    }
}

#[async_trait]
pub trait RemoteAnalysis: Send + Sync {
    async fn query(&self, fen: &str) -> std::result::Result<EvaluationResult, RemoteError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub multi_pv: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            multi_pv: 1,
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize)]
struct CloudEval {
    #[serde(default)]
    pvs: Vec<CloudLine>,
    depth: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CloudLine {
    #[serde(default)]
    moves: String,
    cp: Option<i32>,
    mate: Option<i32>,
}

/// Decode a `cloud-eval` body into a White-positive evaluation.
pub fn parse_cloud_eval(body: &str) -> std::result::Result<EvaluationResult, RemoteError> {
    let eval: CloudEval =
        serde_json::from_str(body).map_err(|e| RemoteError::Decode(e.to_string()))?;

    let line = eval.pvs.first().ok_or(RemoteError::NoAnalysis)?;
    let first = line
        .moves
        .split_whitespace()
        .next()
        .ok_or(RemoteError::NoAnalysis)?;
    if !is_coordinate_move(first) {
        return Err(RemoteError::Decode(format!(
            "unexpected move token '{}'",
            first
        )));
    }

    let principal_move = Some(first.to_string());
    let result = match (line.cp, line.mate) {
        (Some(cp), _) => EvaluationResult::centipawns(cp, principal_move, Tier::Remote),
        (None, Some(mate)) => EvaluationResult::mate(mate, principal_move, Tier::Remote),
        (None, None) => EvaluationResult {
            principal_move,
            ..EvaluationResult::empty(Tier::Remote)
        },
    };

    Ok(match eval.depth {
        Some(depth) => result.with_depth(depth),
        None => result,
    })
}

/// HTTP client for the cloud analysis service
pub struct RemoteAnalysisClient {
    client: reqwest::Client,
    endpoint: String,
    config: RemoteConfig,
}

impl RemoteAnalysisClient {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let endpoint = format!("{}/cloud-eval", config.base_url.trim_end_matches('/'));
        Url::parse(&endpoint)
            .map_err(|e| config_error!("invalid remote base URL '{}': {}", config.base_url, e))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| config_error!("failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Full request URL with the FEN percent-encoded
    pub fn request_url(&self, fen: &str) -> std::result::Result<Url, RemoteError> {
        let multi_pv = self.config.multi_pv.to_string();
        Url::parse_with_params(
            &self.endpoint,
            &[("fen", fen), ("multiPv", multi_pv.as_str())],
        )
        .map_err(|e| RemoteError::Transport(e.to_string()))
    }
}

#[async_trait]
impl RemoteAnalysis for RemoteAnalysisClient {
    async fn query(&self, fen: &str) -> std::result::Result<EvaluationResult, RemoteError> {
        let url = self.request_url(fen)?;
        debug!(url = %url, "querying remote analysis");

        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        // lichess answers 404 when it has no cached evaluation
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RemoteError::NoAnalysis);
        }
        if !status.is_success() {
            return Err(RemoteError::Http {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        parse_cloud_eval(&body)
    }
}

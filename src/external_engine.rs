//! External UCI engine process driver
//!
//! Spawns the engine as a child process, runs the `uci`/`ucinewgame`/`isready`
//! handshake under a timeout and serializes searches so only one `go` is
//! ever in flight per process. Concurrent callers queue on the session lock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::analysis::Tier;
use crate::errors::{EngineError, Result};
use crate::protocol::{
    parse_line, EngineAnalysis, EngineOutput, ReadinessState, SearchLimit, SearchTracker,
    UciCommand,
};
use crate::{engine_fault, tier_unavailable};

/// Seam the orchestrator uses to reach a UCI engine
#[async_trait]
pub trait UciEngine: Send + Sync {
    /// Run one search on `fen` at the given skill level.
    async fn analyze(&self, fen: &str, skill: u8) -> Result<EngineAnalysis>;

    async fn readiness(&self) -> ReadinessState;
}

/// Configuration for the external engine tier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalEngineConfig {
    /// Executable to launch, resolved through `PATH`
    pub program: String,
    pub args: Vec<String>,
    pub handshake_timeout_ms: u64,
    /// Extra time granted past the search budget before `stop` is sent
    pub search_grace_ms: u64,
    pub limit: SearchLimit,
    /// Budget for limits that carry no time of their own (`go depth`)
    pub depth_search_timeout_ms: u64,
}

impl Default for ExternalEngineConfig {
    fn default() -> Self {
        Self {
            program: "stockfish".to_string(),
            args: Vec::new(),
            handshake_timeout_ms: 5000,
            search_grace_ms: 2000,
            limit: SearchLimit::default(),
            depth_search_timeout_ms: 30_000,
        }
    }
}

impl ExternalEngineConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_limit(mut self, limit: SearchLimit) -> Self {
        self.limit = limit;
        self
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn search_grace(&self) -> Duration {
        Duration::from_millis(self.search_grace_ms)
    }

    pub fn search_timeout(&self) -> Duration {
        let budget = self
            .limit
            .time_budget()
            .unwrap_or(Duration::from_millis(self.depth_search_timeout_ms));
        budget + self.search_grace()
    }
}

struct EngineProcess {
    _child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

impl EngineProcess {
    fn spawn(config: &ExternalEngineConfig) -> Result<Self> {
        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| tier_unavailable!(Tier::ExternalEngine, "failed to launch '{}': {}", config.program, e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| engine_fault!("engine stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| engine_fault!("engine stdout not captured"))?;

        Ok(Self {
            _child: child,
            stdin,
            lines: BufReader::new(stdout).lines(),
        })
    }
}

struct Session {
    process: Option<EngineProcess>,
    state: ReadinessState,
}

impl Session {
    async fn send(&mut self, command: UciCommand) -> Result<()> {
        if !self.state.can_send(&command) {
            return Err(engine_fault!(
                "cannot send '{}' while engine is {:?}",
                command,
                self.state
            ));
        }
        let process = self
            .process
            .as_mut()
            .ok_or_else(|| engine_fault!("engine process is not running"))?;

        let line = format!("{}\n", command);
        process.stdin.write_all(line.as_bytes()).await?;
        process.stdin.flush().await?;
        debug!(command = %command, "sent to engine");
        Ok(())
    }

    async fn next_output(&mut self) -> Result<EngineOutput> {
        let process = self
            .process
            .as_mut()
            .ok_or_else(|| engine_fault!("engine process is not running"))?;

        match process.lines.next_line().await? {
            Some(line) => {
                debug!(line = %line, "engine output");
                Ok(parse_line(&line))
            }
            None => Err(engine_fault!("engine process closed its output")),
        }
    }

    async fn handshake(&mut self) -> Result<()> {
        self.send(UciCommand::Uci).await?;
        while self.next_output().await? != EngineOutput::UciOk {}

        self.send(UciCommand::UciNewGame).await?;
        self.send(UciCommand::IsReady).await?;
        while self.next_output().await? != EngineOutput::ReadyOk {}
        Ok(())
    }

    async fn read_search(&mut self) -> Result<EngineAnalysis> {
        let mut tracker = SearchTracker::new();
        loop {
            let output = self.next_output().await?;
            if let Some(analysis) = tracker.feed(output) {
                return Ok(analysis);
            }
        }
    }

    fn mark_failed(&mut self) {
        self.state = ReadinessState::Failed;
        // kill_on_drop reaps the child
        self.process = None;
    }
}

/// Driver for one external engine process
pub struct ExternalEngine {
    config: ExternalEngineConfig,
    session: Mutex<Session>,
}

impl ExternalEngine {
    /// The process is launched lazily on first use.
    pub fn new(config: ExternalEngineConfig) -> Self {
        Self {
            config,
            session: Mutex::new(Session {
                process: None,
                state: ReadinessState::Uninitialized,
            }),
        }
    }

    pub fn config(&self) -> &ExternalEngineConfig {
        &self.config
    }

    pub async fn state(&self) -> ReadinessState {
        self.session.lock().await.state
    }

    /// Launch the process and complete the handshake now rather than on the
    /// first search.
    pub async fn start(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        self.ensure_ready(&mut session).await
    }

    pub async fn shutdown(&self) {
        let mut session = self.session.lock().await;
        if session.process.is_some() && session.state == ReadinessState::Ready {
            if let Err(e) = session.send(UciCommand::Quit).await {
                debug!(error = %e, "engine did not accept quit");
            }
        }
        session.process = None;
        session.state = ReadinessState::Uninitialized;
    }

    async fn ensure_ready(&self, session: &mut Session) -> Result<()> {
        match session.state {
            ReadinessState::Ready => return Ok(()),
            ReadinessState::Failed => {
                return Err(tier_unavailable!(
                    Tier::ExternalEngine,
                    "engine '{}' failed and is no longer used",
                    self.config.program
                ))
            }
            ReadinessState::Uninitialized | ReadinessState::Initializing => {}
        }

        session.state = ReadinessState::Initializing;
        match EngineProcess::spawn(&self.config) {
            Ok(process) => session.process = Some(process),
            Err(e) => {
                session.mark_failed();
                return Err(e);
            }
        }

        let budget = self.config.handshake_timeout();
        match timeout(budget, session.handshake()).await {
            Ok(Ok(())) => {
                session.state = ReadinessState::Ready;
                info!(program = %self.config.program, "external engine ready");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(program = %self.config.program, error = %e, "engine handshake failed");
                session.mark_failed();
                Err(e)
            }
            Err(_) => {
                warn!(program = %self.config.program, "engine handshake timed out");
                session.mark_failed();
                Err(EngineError::ProtocolTimeout {
                    operation: "handshake".to_string(),
                    duration_ms: budget.as_millis() as u64,
                })
            }
        }
    }
}

#[async_trait]
impl UciEngine for ExternalEngine {
    async fn analyze(&self, fen: &str, skill: u8) -> Result<EngineAnalysis> {
        let mut session = self.session.lock().await;
        self.ensure_ready(&mut session).await?;

        let started = async {
            session.send(UciCommand::skill_level(skill)).await?;
            session
                .send(UciCommand::Position {
                    fen: fen.to_string(),
                })
                .await?;
            session.send(UciCommand::Go(self.config.limit)).await
        };
        if let Err(e) = started.await {
            session.mark_failed();
            return Err(e);
        }

        let budget = self.config.search_timeout();
        match timeout(budget, session.read_search()).await {
            Ok(Ok(analysis)) => Ok(analysis),
            Ok(Err(e)) => {
                session.mark_failed();
                Err(e)
            }
            Err(_) => {
                warn!(fen = %fen, "engine search overran its budget, sending stop");
                // Drain up to the bestmove so the next search starts clean
                let drained = match session.send(UciCommand::Stop).await {
                    Ok(()) => timeout(self.config.search_grace(), session.read_search())
                        .await
                        .map(|result| result.is_ok())
                        .unwrap_or(false),
                    Err(_) => false,
                };
                if !drained {
                    session.mark_failed();
                }
                Err(EngineError::ProtocolTimeout {
                    operation: "search".to_string(),
                    duration_ms: budget.as_millis() as u64,
                })
            }
        }
    }

    async fn readiness(&self) -> ReadinessState {
        self.state().await
    }
}

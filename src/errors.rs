use crate::analysis::Tier;

/// Error taxonomy for move selection and analysis
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// FEN could not be parsed or describes an impossible position
    #[error("Invalid position: {0}")]
    InvalidPosition(String),
    /// Side to move has no legal moves (checkmate or stalemate)
    #[error("No legal moves available")]
    NoLegalMoves,
    /// The rules collaborator rejected an operation during search
    #[error("Engine fault: {0}")]
    EngineFault(String),
    /// A tier could not produce a result for this request
    #[error("{tier} tier unavailable: {reason}")]
    TierUnavailable { tier: Tier, reason: String },
    /// Handshake or search never completed within its budget
    #[error("Operation '{operation}' timed out after {duration_ms}ms")]
    ProtocolTimeout { operation: String, duration_ms: u64 },
    /// Every tier failed for this request
    #[error("All engine tiers exhausted after {attempts} attempts")]
    EngineUnavailable { attempts: u32 },
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    /// File or process I/O failed
    #[error("I/O error: {0}")]
    IoError(String),
}

impl EngineError {
    /// Whether a lower tier or a shallower search may still answer the request.
    ///
    /// Position-level failures hold for every tier, so retrying cannot help.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            EngineError::InvalidPosition(_)
                | EngineError::NoLegalMoves
                | EngineError::EngineUnavailable { .. }
        )
    }
}

// Convenience type alias
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<std::io::Error> for EngineError {
    fn from(error: std::io::Error) -> Self {
        EngineError::IoError(error.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        EngineError::ConfigurationError(format!("JSON error: {}", error))
    }
}

// Helper macros for error creation
#[macro_export]
macro_rules! invalid_position {
    ($msg:expr) => {
        $crate::errors::EngineError::InvalidPosition($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::EngineError::InvalidPosition(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! engine_fault {
    ($msg:expr) => {
        $crate::errors::EngineError::EngineFault($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::EngineError::EngineFault(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::errors::EngineError::ConfigurationError($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::EngineError::ConfigurationError(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! tier_unavailable {
    ($tier:expr, $msg:expr) => {
        $crate::errors::EngineError::TierUnavailable {
            tier: $tier,
            reason: $msg.to_string(),
        }
    };
    ($tier:expr, $fmt:expr, $($arg:tt)*) => {
        $crate::errors::EngineError::TierUnavailable {
            tier: $tier,
            reason: format!($fmt, $($arg)*),
        }
    };
}

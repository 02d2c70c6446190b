//! Domain error types.
//!
//! Only configuration and data-source failures are errors. Risk rejections,
//! thin statistics and discarded events are ordinary outcomes and have their
//! own types in the modules that produce them.

/// Top-level error type for evotrader.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("event data error: {reason}")]
    EventData { reason: String },

    #[error("no events for {symbol}")]
    NoEvents { symbol: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        EngineError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&EngineError> for std::process::ExitCode {
    fn from(err: &EngineError) -> Self {
        let code: u8 = match err {
            EngineError::Io(_) => 1,
            EngineError::ConfigParse { .. } | EngineError::ConfigInvalid { .. } => 2,
            EngineError::EventData { .. } => 3,
            EngineError::NoEvents { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

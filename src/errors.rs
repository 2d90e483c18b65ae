/// Domain-specific error types for the valuation engine.
/// External failures (providers, cache file) must be handled; the engine
/// keeps running on recoverable errors and falls back to manual inputs.
/// Core math errors are raised to the caller, never swallowed.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    #[error("numerical error: {0}")]
    Numerical(String),

    #[error("spot feed error: {0}")]
    SpotFeed(String),

    #[error("rate feed error: {0}")]
    RateFeed(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        EngineError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Parse(e.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Network(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

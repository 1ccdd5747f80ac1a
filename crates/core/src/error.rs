use thiserror::Error;

/// Item key syntax errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("key is empty")]
    Empty,

    #[error("invalid character '{ch}' at position {pos}")]
    InvalidChar { ch: char, pos: usize },

    #[error("unexpected character '{ch}' at position {pos} after parameter")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unterminated quoted parameter")]
    UnterminatedQuote,

    #[error("unterminated parameter list")]
    UnterminatedParams,

    #[error("nested arrays are not supported")]
    NestedArray,

    #[error("unexpected data after parameter list")]
    TrailingData,
}

/// Update interval errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DelayError {
    #[error("update interval is empty")]
    Empty,

    #[error("invalid update interval \"{0}\"")]
    Invalid(String),

    #[error("update interval of {0}s is out of range")]
    OutOfRange(u64),
}

/// Failures reported by plugin capabilities.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    #[error("Invalid item key format: {0}")]
    Key(#[from] KeyError),

    #[error("Unsupported item key.")]
    UnsupportedKey,

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("{0}")]
    Failed(String),
}

/// Configuration-related errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

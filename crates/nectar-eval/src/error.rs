//! Compile- and runtime-error types for the evaluator.

use thiserror::Error;

/// Errors raised while compiling rules into matchers or loading sensor
/// configuration. All of these are fatal at startup; evaluation itself is
/// fail-open and never returns an error per event.
#[derive(Debug, Error)]
pub enum EvalError {
    /// A regex pattern failed to compile.
    #[error("rule '{rule}': invalid regex pattern: {source}")]
    InvalidRegex {
        rule: String,
        #[source]
        source: Box<regex::Error>,
    },

    /// A binary byte pattern is malformed.
    #[error("rule '{rule}': invalid binary pattern: {msg}")]
    InvalidPattern { rule: String, msg: String },

    /// An encoded needle literal failed to decode.
    #[error("rule '{rule}': invalid needle literal: {msg}")]
    InvalidNeedle { rule: String, msg: String },

    /// A leaf combines options that make no sense together.
    #[error("rule '{rule}': incompatible options: {msg}")]
    IncompatibleOptions { rule: String, msg: String },

    /// Sensor configuration could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Sensor configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, EvalError>;

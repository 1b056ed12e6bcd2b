use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while parsing or loading rule files.
///
/// Every variant is fatal at load time: the sensor refuses to start with an
/// inconsistent rule set.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{path}: {source}")]
    InFile {
        path: PathBuf,
        #[source]
        source: Box<RuleError>,
    },

    #[error("rule '{rule}': missing required key '{key}'")]
    MissingKey { rule: String, key: String },

    #[error("rule '{rule}': unknown layer '{value}'")]
    UnknownLayer { rule: String, value: String },

    #[error("rule '{rule}': unknown selector '{selector}'")]
    UnknownSelector { rule: String, selector: String },

    #[error("rule '{rule}': selector '{selector}' is not valid for layer '{layer}'")]
    SelectorLayerMismatch {
        rule: String,
        selector: String,
        layer: String,
    },

    #[error("rule '{rule}': duplicate rule name in file")]
    DuplicateRule { rule: String },

    #[error("rule '{rule}': invalid match group: {msg}")]
    InvalidGroup { rule: String, msg: String },

    #[error("rule '{rule}': selector '{selector}': {msg}")]
    InvalidLeaf {
        rule: String,
        selector: String,
        msg: String,
    },

    #[error("rule '{rule}': {msg}")]
    InvalidRule { rule: String, msg: String },

    #[error("rule file is not a YAML mapping of rule name to rule body")]
    NotAMapping,
}

impl RuleError {
    /// Wrap an error with the path of the file it came from.
    pub fn in_file(self, path: &std::path::Path) -> Self {
        RuleError::InFile {
            path: path.to_path_buf(),
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;

use thiserror::Error;

/// Errors raised while reading configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable was set but is not valid Unicode.
    #[error("{key} is not valid Unicode")]
    NotUnicode {
        /// Variable that failed to decode.
        key: &'static str,
    },

    /// A variable was set to a value that could not be interpreted.
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        /// Variable carrying the bad value.
        key: &'static str,
        /// Value as supplied.
        value: String,
        /// What the variable expects.
        reason: &'static str,
    },
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, value: String, reason: &'static str) -> Self {
        Self::InvalidValue { key, value, reason }
    }
}

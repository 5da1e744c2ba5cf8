//! Error types for flow-control.

/// Result type alias using [`ControlError`].
pub type ControlResult<T> = Result<T, ControlError>;

/// Wire codes reported through a response channel's terminal error record.
pub mod codes {
    /// Referenced entity is absent.
    pub const NOT_FOUND: i32 = -100;
    /// Persistence layer could not serve the request.
    pub const STORE_UNAVAILABLE: i32 = -101;
    /// Stored entity could not be (de)serialised.
    pub const SERIALIZATION: i32 = -102;
    /// Host directory could not be read.
    pub const HOST_DIRECTORY: i32 = -103;
    /// A node rejected or failed a request.
    pub const NODE: i32 = -104;
    /// A node request did not finish in time.
    pub const TIMEOUT: i32 = -105;
    /// Request arguments are invalid.
    pub const VALIDATION: i32 = -400;
    /// No handler is registered under the command name.
    pub const UNKNOWN_COMMAND: i32 = -404;
    /// Command payload could not be decoded.
    pub const DECODE: i32 = -500;
    /// Unexpected fault inside the worker.
    pub const INTERNAL: i32 = -99;
    /// Configuration could not be loaded.
    pub const CONFIG: i32 = -1;
}

/// Errors that can occur in the control plane.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// No handler matches the command name.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Command payload is malformed.
    #[error("malformed payload: {0}")]
    Decode(String),

    /// Request arguments failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Referenced entity does not exist.
    #[error("{kind} {name} is missing")]
    NotFound {
        /// Entity kind (profile, runlist, group, ...).
        kind: &'static str,
        /// Entity name.
        name: String,
    },

    /// Persistence layer failure.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Stored data could not be encoded or decoded.
    #[error("serialisation error: {0}")]
    Serialization(String),

    /// Host directory could not be enumerated.
    #[error("host directory unavailable: {0}")]
    HostDirectory(String),

    /// A per-host node operation failed.
    #[error("node {host}: {message}")]
    Node {
        /// Host the failure came from.
        host: String,
        /// Failure description.
        message: String,
    },

    /// A per-host node operation timed out.
    #[error("node {host}: timed out after {secs}s")]
    Timeout {
        /// Host that did not answer.
        host: String,
        /// Timeout that elapsed.
        secs: u64,
    },

    /// A handler wrote to a response channel after closing it.
    #[error("response channel already closed")]
    ChannelClosed,

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not-found error for the given entity.
    #[must_use]
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Create a store error.
    #[must_use]
    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a node error.
    #[must_use]
    pub fn node(host: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Node {
            host: host.into(),
            message: msg.into(),
        }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true for errors that mean "entity does not exist yet".
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Wire code reported alongside the message in a terminal error record.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::UnknownCommand(_) => codes::UNKNOWN_COMMAND,
            Self::Decode(_) => codes::DECODE,
            Self::Validation(_) => codes::VALIDATION,
            Self::NotFound { .. } => codes::NOT_FOUND,
            Self::StoreUnavailable(_) => codes::STORE_UNAVAILABLE,
            Self::Serialization(_) => codes::SERIALIZATION,
            Self::HostDirectory(_) => codes::HOST_DIRECTORY,
            Self::Node { .. } | Self::Http(_) => codes::NODE,
            Self::Timeout { .. } => codes::TIMEOUT,
            Self::Config(_) => codes::CONFIG,
            Self::ChannelClosed | Self::Internal(_) => codes::INTERNAL,
        }
    }
}

impl From<serde_json::Error> for ControlError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_entity() {
        let err = ControlError::not_found("profile", "default");
        assert_eq!(err.to_string(), "profile default is missing");
        assert_eq!(err.code(), codes::NOT_FOUND);
        assert!(err.is_not_found());
    }

    #[test]
    fn codes_are_distinct_for_abort_paths() {
        let errors = [
            ControlError::Decode("x".to_owned()),
            ControlError::validation("x"),
            ControlError::store("x"),
            ControlError::HostDirectory("x".to_owned()),
            ControlError::UnknownCommand("x".to_owned()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(ControlError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}

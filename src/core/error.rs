//! Error types and wire-stable error codes.
//!
//! Every store operation reports failures through [`StoreError`]. The enum is
//! serializable so the server can return it verbatim inside a response frame
//! and the client surfaces the same variant the engine produced.
//!
//! Messages always name the token (scope + key) and, where relevant, the
//! field or index involved, so callers can tell the three namespaces apart.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Store error conditions.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum StoreError {
    /// Scope kind and identifiers do not form a valid combination.
    #[error("invalid scope {scope} for key {key:?}: {reason}")]
    InvalidScope {
        scope: String,
        key: String,
        reason: String,
    },

    /// Location key was empty.
    #[error("location key needs to be informed (scope {scope})")]
    MissingKey { scope: String },

    /// Negative TTL or lock timeout.
    #[error("TTL cannot be negative: {ttl} for key {token:?}")]
    NegativeTtl { token: String, ttl: i64 },

    /// Key, field, item or lock is absent.
    #[error("{}", describe_missing(.token, .item.as_deref()))]
    NotFound { token: String, item: Option<String> },

    /// Entry exists but its TTL has elapsed.
    #[error("key {token:?} is expired")]
    Expired { token: String },

    /// Queue index outside `0..len`.
    #[error("index {index} out of range for key {token:?} (length {len})")]
    IndexOutOfRange { token: String, index: i64, len: usize },

    /// A live lock is already held on the token.
    #[error("key {token:?} is already locked")]
    AlreadyLocked { token: String },

    /// Release token does not match the live lock.
    #[error("release token does not match the lock held on key {token:?}")]
    LockMismatch { token: String },

    /// Client operation attempted before connecting.
    #[error("store client is not connected")]
    NotConnected,

    /// The request deadline elapsed before the table lock was acquired.
    #[error("timed out after {waited_ms}ms waiting for the store lock on key {token:?}")]
    Timeout { token: String, waited_ms: u64 },

    /// Increment against a value that is not a decimal integer.
    #[error("{} does not hold an integer", describe_target(.token, .field.as_deref()))]
    NotNumeric { token: String, field: Option<String> },

    /// Increment would overflow a signed 64-bit integer.
    #[error("increment overflows {}", describe_target(.token, .field.as_deref()))]
    Overflow { token: String, field: Option<String> },

    /// Operation addressed an entry of another structure.
    #[error("key {token:?} holds a {found} entry, not a {expected}")]
    WrongKind {
        token: String,
        expected: String,
        found: String,
    },

    /// Client-side I/O failure.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// Malformed or oversized frame.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Internal error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

fn describe_missing(token: &str, item: Option<&str>) -> String {
    match item {
        None => format!("key {:?} not present at store", token),
        Some(item) => format!("{} not present at key {:?}", item, token),
    }
}

fn describe_target(token: &str, field: Option<&str>) -> String {
    match field {
        None => format!("key {:?}", token),
        Some(field) => format!("field {:?} of key {:?}", field, token),
    }
}

impl StoreError {
    /// Create an InvalidScope error naming the rejected scope and key.
    pub fn invalid_scope(
        scope: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidScope {
            scope: scope.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a NotFound error for a whole key.
    pub fn key_not_found(token: impl Into<String>) -> Self {
        Self::NotFound {
            token: token.into(),
            item: None,
        }
    }

    /// Create a NotFound error for something inside a key (field, head item, lock).
    pub fn item_not_found(token: impl Into<String>, item: impl Into<String>) -> Self {
        Self::NotFound {
            token: token.into(),
            item: Some(item.into()),
        }
    }

    /// Create a Transport error.
    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::Transport {
            message: message.to_string(),
        }
    }

    /// Create a Protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable identifier for this error, matching the serialized `code` tag.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidScope { .. } => "invalid_scope",
            Self::MissingKey { .. } => "missing_key",
            Self::NegativeTtl { .. } => "negative_ttl",
            Self::NotFound { .. } => "not_found",
            Self::Expired { .. } => "expired",
            Self::IndexOutOfRange { .. } => "index_out_of_range",
            Self::AlreadyLocked { .. } => "already_locked",
            Self::LockMismatch { .. } => "lock_mismatch",
            Self::NotConnected => "not_connected",
            Self::Timeout { .. } => "timeout",
            Self::NotNumeric { .. } => "not_numeric",
            Self::Overflow { .. } => "overflow",
            Self::WrongKind { .. } => "wrong_kind",
            Self::Transport { .. } => "transport",
            Self::Protocol { .. } => "protocol",
            Self::Internal { .. } => "internal",
        }
    }

    /// Check if this error was raised by request validation, before any table access.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidScope { .. } | Self::MissingKey { .. } | Self::NegativeTtl { .. }
        )
    }

    /// Check if the caller may reasonably retry the same request.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Transport { .. } | Self::AlreadyLocked { .. }
        )
    }
}

/// Result type using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_messages_name_the_token() {
        let err = StoreError::key_not_found("global.key1");
        assert_eq!(err.to_string(), "key \"global.key1\" not present at store");

        let err = StoreError::item_not_found("bridge.b.m", "field \"f\"");
        assert_eq!(err.to_string(), "field \"f\" not present at key \"bridge.b.m\"");
    }

    #[test]
    fn test_expired_message() {
        let err = StoreError::Expired {
            token: "global.key2".into(),
        };
        assert_eq!(err.to_string(), "key \"global.key2\" is expired");
    }

    #[test]
    fn test_not_numeric_mentions_field() {
        let err = StoreError::NotNumeric {
            token: "global.m".into(),
            field: Some("hits".into()),
        };
        assert!(err.to_string().contains("field \"hits\""));
        assert!(err.to_string().contains("global.m"));
    }

    #[test]
    fn test_classification() {
        assert!(StoreError::invalid_scope("global", "k", "x").is_validation());
        assert!(StoreError::MissingKey {
            scope: "global".into()
        }
        .is_validation());
        assert!(!StoreError::key_not_found("t").is_validation());
        assert!(StoreError::Timeout {
            token: "t".into(),
            waited_ms: 5
        }
        .is_retriable());
        assert!(!StoreError::NotConnected.is_retriable());
    }

    #[test]
    fn test_serde_roundtrip_keeps_variant() {
        let err = StoreError::IndexOutOfRange {
            token: "global.q".into(),
            index: 7,
            len: 2,
        };
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"code\":\"index_out_of_range\""));
        let back: StoreError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
        assert_eq!(back.code(), "index_out_of_range");
    }
}

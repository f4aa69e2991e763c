//! Scope resolution and key tokenization.
//!
//! Every key lives in one of three nested namespaces:
//!
//! ```text
//! global.<key>
//! bridge.<bridge>.<key>
//! instance.<bridge>.<instance>.<key>
//! ```
//!
//! [`tokenize`] validates a [`ScopeLocator`] and folds it together with a key
//! into the [`Token`] the engine uses as its only identity. Bridge and
//! instance identifiers may not contain `.`, which keeps the mapping from
//! `(scope, key)` to token injective. Keys may contain anything.

use crate::core::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};

const SEPARATOR: char = '.';

/// Scope kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// Shared by every bridge.
    Global,
    /// Private to one bridge.
    Bridge,
    /// Private to one instance of a bridge.
    Instance,
}

impl ScopeKind {
    /// Token prefix for this kind.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Bridge => "bridge",
            Self::Instance => "instance",
        }
    }
}

impl std::fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Scope addressing: kind plus the identifiers that kind requires.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeLocator {
    /// Scope kind.
    pub kind: ScopeKind,
    /// Bridge identifier (Bridge and Instance scopes).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bridge: String,
    /// Instance identifier (Instance scope).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instance: String,
}

impl ScopeLocator {
    /// Global scope.
    pub fn global() -> Self {
        Self {
            kind: ScopeKind::Global,
            bridge: String::new(),
            instance: String::new(),
        }
    }

    /// Bridge scope.
    pub fn bridge(bridge: impl Into<String>) -> Self {
        Self {
            kind: ScopeKind::Bridge,
            bridge: bridge.into(),
            instance: String::new(),
        }
    }

    /// Instance scope.
    pub fn instance(bridge: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            kind: ScopeKind::Instance,
            bridge: bridge.into(),
            instance: instance.into(),
        }
    }

    /// Infer the narrowest scope from optional identifiers, as the CLI does.
    pub fn from_ids(bridge: Option<&str>, instance: Option<&str>) -> Self {
        match (bridge.unwrap_or_default(), instance.unwrap_or_default()) {
            ("", "") => Self::global(),
            (b, "") => Self::bridge(b),
            (b, i) => Self::instance(b, i),
        }
    }

    /// Check the kind/identifier combination for a request on `key`.
    pub fn validate(&self, key: &str) -> StoreResult<()> {
        self.check()
            .map_err(|reason| StoreError::invalid_scope(self.describe(), key, reason))
    }

    fn check(&self) -> Result<(), String> {
        let has_bridge = !self.bridge.is_empty();
        let has_instance = !self.instance.is_empty();

        match self.kind {
            ScopeKind::Global if has_bridge || has_instance => {
                Err("global scope should not inform bridge nor instance".into())
            }
            ScopeKind::Bridge if !has_bridge => {
                Err("bridge scope needs the bridge identifier to be informed".into())
            }
            ScopeKind::Bridge if has_instance => {
                Err("bridge scope should not inform instance".into())
            }
            ScopeKind::Instance if !has_bridge || !has_instance => {
                Err("instance scope needs bridge and instance identifiers to be informed".into())
            }
            _ => {
                check_identifier("bridge", &self.bridge)?;
                check_identifier("instance", &self.instance)
            }
        }
    }

    /// Kind plus every identifier as supplied, including ones the kind forbids.
    fn describe(&self) -> String {
        format!(
            "{}(bridge {:?}, instance {:?})",
            self.kind, self.bridge, self.instance
        )
    }
}

fn check_identifier(what: &str, id: &str) -> Result<(), String> {
    if id.contains(SEPARATOR) {
        return Err(format!(
            "{} identifier {:?} must not contain '{}'",
            what, id, SEPARATOR
        ));
    }
    Ok(())
}

impl std::fmt::Display for ScopeLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ScopeKind::Global => write!(f, "global"),
            ScopeKind::Bridge => write!(f, "bridge({})", self.bridge),
            ScopeKind::Instance => write!(f, "instance({}/{})", self.bridge, self.instance),
        }
    }
}

/// A scope plus a key, as carried by every request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Scope.
    pub scope: ScopeLocator,
    /// Key within the scope.
    pub key: String,
}

impl Location {
    /// Create a new location.
    pub fn new(scope: ScopeLocator, key: impl Into<String>) -> Self {
        Self {
            scope,
            key: key.into(),
        }
    }

    /// Validate and tokenize this location.
    pub fn tokenize(&self) -> StoreResult<Token> {
        tokenize(&self.scope, &self.key)
    }
}

/// Composite table identity for one `(scope, key)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    kind: ScopeKind,
    composite: String,
}

impl Token {
    /// Scope kind the token was built from.
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// Composite string form.
    pub fn as_str(&self) -> &str {
        &self.composite
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.composite)
    }
}

/// Validate `scope` and `key` and build the composite token.
pub fn tokenize(scope: &ScopeLocator, key: &str) -> StoreResult<Token> {
    scope.validate(key)?;
    if key.is_empty() {
        return Err(StoreError::MissingKey {
            scope: scope.to_string(),
        });
    }

    let composite = match scope.kind {
        ScopeKind::Global => format!("global.{}", key),
        ScopeKind::Bridge => format!("bridge.{}.{}", scope.bridge, key),
        ScopeKind::Instance => format!("instance.{}.{}.{}", scope.bridge, scope.instance, key),
    };

    Ok(Token {
        kind: scope.kind,
        composite,
    })
}

//! RPC surface.
//!
//! Requests and replies travel as length-prefixed JSON frames over TCP:
//!
//! ```text
//! +----------------+---------------------------------------------+
//! | u32 BE length  | JSON body (RequestFrame / ResponseFrame)     |
//! +----------------+---------------------------------------------+
//! ```
//!
//! - [`codec`] - Frame codec
//! - [`service`] - Request dispatch and per-connection loop
//! - [`server`] - Accept loop
//! - [`client`] - Scoped client facade

pub mod client;
pub mod codec;
pub mod server;
pub mod service;

use crate::core::error::{StoreError, StoreResult};
use crate::store::scope::Location;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One store operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    KvSet {
        location: Location,
        value: Bytes,
        #[serde(default)]
        ttl: i32,
    },
    KvGet {
        location: Location,
    },
    KvDel {
        location: Location,
    },
    KvIncr {
        location: Location,
        n: i32,
    },
    KvDecr {
        location: Location,
        n: i32,
    },

    MapNew {
        location: Location,
        #[serde(default)]
        ttl: i32,
    },
    MapDel {
        location: Location,
    },
    MapFieldSet {
        location: Location,
        field: String,
        value: Bytes,
    },
    MapFieldGet {
        location: Location,
        field: String,
    },
    MapFieldDel {
        location: Location,
        field: String,
    },
    MapFieldIncr {
        location: Location,
        field: String,
        n: i32,
    },
    MapFieldDecr {
        location: Location,
        field: String,
        n: i32,
    },
    MapAll {
        location: Location,
    },
    MapLen {
        location: Location,
    },

    QueueNew {
        location: Location,
        #[serde(default)]
        ttl: i32,
    },
    QueueDel {
        location: Location,
    },
    QueuePush {
        location: Location,
        value: Bytes,
    },
    QueuePop {
        location: Location,
    },
    QueuePeek {
        location: Location,
    },
    QueueIndex {
        location: Location,
        index: i32,
    },
    QueueAll {
        location: Location,
    },
    QueueLen {
        location: Location,
    },

    Lock {
        location: Location,
        #[serde(default)]
        timeout: i32,
    },
    Unlock {
        location: Location,
        release_token: String,
    },
}

impl Request {
    /// Location the request addresses.
    pub fn location(&self) -> &Location {
        match self {
            Self::KvSet { location, .. }
            | Self::KvGet { location }
            | Self::KvDel { location }
            | Self::KvIncr { location, .. }
            | Self::KvDecr { location, .. }
            | Self::MapNew { location, .. }
            | Self::MapDel { location }
            | Self::MapFieldSet { location, .. }
            | Self::MapFieldGet { location, .. }
            | Self::MapFieldDel { location, .. }
            | Self::MapFieldIncr { location, .. }
            | Self::MapFieldDecr { location, .. }
            | Self::MapAll { location }
            | Self::MapLen { location }
            | Self::QueueNew { location, .. }
            | Self::QueueDel { location }
            | Self::QueuePush { location, .. }
            | Self::QueuePop { location }
            | Self::QueuePeek { location }
            | Self::QueueIndex { location, .. }
            | Self::QueueAll { location }
            | Self::QueueLen { location }
            | Self::Lock { location, .. }
            | Self::Unlock { location, .. } => location,
        }
    }

    /// Operation name, matching the serialized `op` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::KvSet { .. } => "kv_set",
            Self::KvGet { .. } => "kv_get",
            Self::KvDel { .. } => "kv_del",
            Self::KvIncr { .. } => "kv_incr",
            Self::KvDecr { .. } => "kv_decr",
            Self::MapNew { .. } => "map_new",
            Self::MapDel { .. } => "map_del",
            Self::MapFieldSet { .. } => "map_field_set",
            Self::MapFieldGet { .. } => "map_field_get",
            Self::MapFieldDel { .. } => "map_field_del",
            Self::MapFieldIncr { .. } => "map_field_incr",
            Self::MapFieldDecr { .. } => "map_field_decr",
            Self::MapAll { .. } => "map_all",
            Self::MapLen { .. } => "map_len",
            Self::QueueNew { .. } => "queue_new",
            Self::QueueDel { .. } => "queue_del",
            Self::QueuePush { .. } => "queue_push",
            Self::QueuePop { .. } => "queue_pop",
            Self::QueuePeek { .. } => "queue_peek",
            Self::QueueIndex { .. } => "queue_index",
            Self::QueueAll { .. } => "queue_all",
            Self::QueueLen { .. } => "queue_len",
            Self::Lock { .. } => "lock",
            Self::Unlock { .. } => "unlock",
        }
    }

    /// Request-level validation, identical on client and server.
    pub fn validate(&self) -> StoreResult<()> {
        let token = self.location().tokenize()?;
        let ttl = match self {
            Self::KvSet { ttl, .. } | Self::MapNew { ttl, .. } | Self::QueueNew { ttl, .. } => {
                *ttl
            }
            Self::Lock { timeout, .. } => *timeout,
            _ => 0,
        };
        if ttl < 0 {
            return Err(StoreError::NegativeTtl {
                token: token.to_string(),
                ttl: i64::from(ttl),
            });
        }
        Ok(())
    }
}

/// Successful result of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Reply {
    /// Empty acknowledgement.
    Ack,
    /// One value.
    Value(Bytes),
    /// Result of an increment.
    Integer(i64),
    /// Field or item count.
    Count(usize),
    /// Map snapshot.
    Fields(BTreeMap<String, Bytes>),
    /// Queue snapshot, head first.
    Items(Vec<Bytes>),
    /// Lock release token.
    ReleaseToken(String),
}

impl Reply {
    fn kind(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Value(_) => "value",
            Self::Integer(_) => "integer",
            Self::Count(_) => "count",
            Self::Fields(_) => "fields",
            Self::Items(_) => "items",
            Self::ReleaseToken(_) => "release_token",
        }
    }

    fn unexpected(&self, wanted: &str) -> StoreError {
        StoreError::protocol(format!("expected {} reply, got {}", wanted, self.kind()))
    }

    /// Expect an acknowledgement.
    pub fn into_ack(self) -> StoreResult<()> {
        match self {
            Self::Ack => Ok(()),
            other => Err(other.unexpected("ack")),
        }
    }

    /// Expect a value.
    pub fn into_value(self) -> StoreResult<Bytes> {
        match self {
            Self::Value(value) => Ok(value),
            other => Err(other.unexpected("value")),
        }
    }

    /// Expect an integer.
    pub fn into_integer(self) -> StoreResult<i64> {
        match self {
            Self::Integer(n) => Ok(n),
            other => Err(other.unexpected("integer")),
        }
    }

    /// Expect a count.
    pub fn into_count(self) -> StoreResult<usize> {
        match self {
            Self::Count(n) => Ok(n),
            other => Err(other.unexpected("count")),
        }
    }

    /// Expect a map snapshot.
    pub fn into_fields(self) -> StoreResult<BTreeMap<String, Bytes>> {
        match self {
            Self::Fields(fields) => Ok(fields),
            other => Err(other.unexpected("fields")),
        }
    }

    /// Expect a queue snapshot.
    pub fn into_items(self) -> StoreResult<Vec<Bytes>> {
        match self {
            Self::Items(items) => Ok(items),
            other => Err(other.unexpected("items")),
        }
    }

    /// Expect a release token.
    pub fn into_release_token(self) -> StoreResult<String> {
        match self {
            Self::ReleaseToken(token) => Ok(token),
            other => Err(other.unexpected("release_token")),
        }
    }
}

/// Client to server frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Correlation id echoed in the response.
    pub id: u64,
    /// Caller deadline; the server default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Operation.
    pub request: Request,
}

/// Server to client frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Id of the request this answers; 0 when the request could not be decoded.
    pub id: u64,
    /// Outcome.
    pub result: Result<Reply, StoreError>,
}

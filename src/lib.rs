//! scopestore - ephemeral, scope-partitioned key/value store.
//!
//! Values live in one of three nested scopes (global, bridge, instance) and
//! every record carries a TTL. Besides scalar values the store holds maps,
//! FIFO queues and advisory locks, all addressed by the same token scheme and
//! reaped by a background sweeper once they expire.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │   Client facade (kv / map / queue / lock handles)        │
//! └──────────────────────────────────────────────────────────┘
//!                             │  length-prefixed JSON frames
//! ┌──────────────────────────────────────────────────────────┐
//! │   RPC service (TCP listener, codec, dispatch)            │
//! └──────────────────────────────────────────────────────────┘
//!                             │
//! ┌──────────────────────────────────────────────────────────┐
//! │   Adapters: scalar │ map │ queue │ lock manager          │
//! └──────────────────────────────────────────────────────────┘
//!                             │  tokens ("bridge.b1.key")
//! ┌──────────────────────────────────────────────────────────┐
//! │   Storage engine (table, expiry, locks) + sweeper        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::runtime`] - Component lifecycle
//! - [`core::time`] - Clocks and request deadlines
//! - [`core::error`] - Error type
//!
//! ## Store
//! - [`store::scope`] - Scope validation and tokenization
//! - [`store::engine`] - Token table and expiry
//! - [`store::sweeper`] - Expired record removal
//! - [`store::scalar`], [`store::map`], [`store::queue`], [`store::lock`] - Adapters
//!
//! ## RPC
//! - [`rpc::codec`] - Frame codec
//! - [`rpc::service`] - Request dispatch
//! - [`rpc::server`] - Accept loop
//! - [`rpc::client`] - Client facade
//!
//! ## Networking
//! - [`net::tcp`] - TCP listener
//!
//! ## CLI
//! - [`cli::commands`] - CLI command implementations

// Core infrastructure
pub mod core;

// Storage engine and adapters
pub mod store;

// Wire protocol, server and client
pub mod rpc;

// Networking
pub mod net;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, error, runtime, time};
pub use rpc::client::Client;
pub use store::{Location, ScopeLocator, Store};

//! Networking layer.
//!
//! - [`tcp`] - TCP listener with connection limits and counters
//!
//! Framing and dispatch live in [`crate::rpc`].

pub mod tcp;

//! Core runtime infrastructure.
//!
//! - [`config`] - Configuration parsing and validation
//! - [`runtime`] - Component lifecycle
//! - [`time`] - Clocks, timestamps and request deadlines
//! - [`error`] - Store error type and wire codes

pub mod config;
pub mod error;
pub mod runtime;
pub mod time;

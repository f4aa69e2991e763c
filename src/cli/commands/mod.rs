//! CLI command implementations.

mod config;
mod kv;
mod lock;
mod map;
mod queue;
mod session;
mod start;

pub use config::{run_config, ConfigArgs, ConfigCommand};
pub use kv::{run_kv, KvArgs, KvCommand};
pub use lock::{run_lock, LockArgs, LockCommand};
pub use map::{run_map, MapArgs, MapCommand};
pub use queue::{run_queue, QueueArgs, QueueCommand};
pub use start::{load_config, run_start, StartArgs};

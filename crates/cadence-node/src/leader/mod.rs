//! Leader directory and durable pointer storage.
//!
//! Each node (and each client router) keeps its own locally persisted belief about
//! which server is authoritative. Nothing here makes those beliefs agree.

mod directory;
mod store;

pub use directory::{LeaderDirectory, port_of};
pub use store::{FileStore, MemoryStore, PointerStore, RedisStore};

//! Shared constants for Cadence components.

/// Default node HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5001";

/// Default leader when no durable pointer is readable
pub const DEFAULT_LEADER: &str = "http://127.0.0.1:5001";

/// Default ordered server list (leader first)
pub const DEFAULT_SERVERS: &[&str] = &["http://127.0.0.1:5001", "http://127.0.0.1:5002"];

/// Default backup ports consulted on server-side self-demotion
pub const DEFAULT_BACKUP_PORTS: &[u16] = &[5002];

/// Default leader pointer file
pub const DEFAULT_LEADER_FILE: &str = "leader.json";

/// Default Redis connection URL (only used when the Redis pointer store is selected)
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Gossip round interval (seconds)
pub const GOSSIP_INTERVAL_SECS: u64 = 10;

/// Clock difference above which two nodes are reported as diverged
pub const DIVERGENCE_THRESHOLD: u64 = 5;

/// Router retry budget before giving up on every server
pub const ROUTER_MAX_RETRIES: u32 = 2;

/// Per-call timeout for a single inter-node RPC (milliseconds)
pub const RPC_CALL_TIMEOUT_MS: u64 = 5_000;

/// Prepare-phase attempts per participant
pub const PREPARE_ATTEMPTS: u32 = 3;

/// Prepare-phase linear backoff unit (milliseconds); attempt N waits N units
pub const PREPARE_BACKOFF_MS: u64 = 1_000;

/// Interval between prunes of settled transactions (seconds)
pub const TXN_CLEANUP_INTERVAL_SECS: u64 = 60;

/// Settled transactions stay queryable at least this long (seconds)
pub const TXN_RETENTION_SECS: u64 = 600;

/// Redis key prefixes
pub mod redis_keys {
    /// Leader pointer: cadence:leader:{node_id}
    pub const LEADER_PREFIX: &str = "cadence:leader:";
}

/// HTTP route paths shared by the node server and the HTTP channel
pub mod paths {
    pub const SQUARE: &str = "/square";
    pub const CUBE: &str = "/cube";
    pub const CLOCK_SYNC: &str = "/clock/sync";
    pub const PREPARE: &str = "/2pc/prepare";
    pub const COMMIT: &str = "/2pc/commit";
    pub const ABORT: &str = "/2pc/abort";
    pub const DASHBOARD_CLOCK: &str = "/api/clock";
}

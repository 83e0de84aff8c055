pub const DEFAULT_BACKLOG: u32 = 128;
pub const MAX_BACKLOG: u32 = 65535;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_DISPATCH_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const WORKER_THREAD_NAME: &str = "accept-loop";

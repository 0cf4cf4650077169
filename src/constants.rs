// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;

// Connection pump timings
pub const READ_IDLE_TIMEOUT_SECS: u64 = 60;
pub const WRITE_TIMEOUT_SECS: u64 = 10;
// Must stay below the read idle timeout so peers see a probe before being reaped
pub const KEEPALIVE_INTERVAL_SECS: u64 = READ_IDLE_TIMEOUT_SECS * 9 / 10;

// Connection limits
pub const MAX_FRAME_SIZE: usize = 512 * 1024;
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

// Persistence collaborator
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

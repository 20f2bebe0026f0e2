// Consumer constants (no magic values)
use std::time::Duration;

/// Pause after a persistence failure or queue error before waiting again (1s)
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// How long the daemon waits for the consumer to stop after shutdown (5s)
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

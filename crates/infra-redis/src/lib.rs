// Pyron Infrastructure - Redis Adapter
// Implements: SignalQueue on top of Redis lists (RPUSH / BLPOP / BLMOVE)

mod signal_queue;

pub use signal_queue::RedisSignalQueue;

// Chat flow — per-message allow/block decisions within a few milliseconds.
//
// The engine reads and updates the windowed store and calls only
// realtime-rated adapters. The pool partitions messages by channel so
// per-channel counters see events in arrival order.

pub mod engine;
pub mod pool;

pub use engine::{RealtimeEngine, RealtimePolicy, TimeoutPolicy};
pub use pool::PartitionedPool;

// Windowed state engine — per-key rolling counters for the chat flow.
//
// Counts live in fixed-size ring buffers of sub-interval buckets, so both
// recording and reading are constant time and memory per key is bounded
// regardless of message rate. Keys untouched for the TTL are evicted.

pub mod buckets;
pub mod keyed;
pub mod session;
pub mod store;

pub use buckets::BucketedCounter;
pub use keyed::{KeyedCounters, KeyedWindows, WindowEntry, WindowSpec};
pub use session::SessionWindow;
pub use store::{WindowPolicy, WindowedStore};

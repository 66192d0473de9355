// Decision sink — where terminal decisions, review tasks and reputation
// records are handed off.
//
// The moderation core never reads back from the sink; it only writes.
// SQLite is the durable backend (bundled, no system dependency); the
// in-memory sink backs tests and simulations.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

pub use memory::MemorySink;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSink;
pub use traits::DecisionSink;

use std::sync::Arc;

use anyhow::Result;

use crate::config::{Config, SinkBackend};

/// Open the sink selected by `SENTINEL_SINK`.
pub fn open_sink(config: &Config) -> Result<Arc<dyn DecisionSink>> {
    match config.sink_backend {
        SinkBackend::Memory => Ok(Arc::new(MemorySink::new())),
        #[cfg(feature = "sqlite")]
        SinkBackend::Sqlite => Ok(Arc::new(SqliteSink::open(&config.db_path)?)),
        #[cfg(not(feature = "sqlite"))]
        SinkBackend::Sqlite => {
            anyhow::bail!("SENTINEL_SINK=sqlite requires the `sqlite` feature")
        }
    }
}

pub mod api;
pub mod catalog;
pub mod config;
pub mod detect;
pub mod error;
pub mod history;
pub mod logging;
pub mod lookup;
pub mod measure;
pub mod pretty;
pub mod types;

// Re-export key types and functions at the crate root
pub use config::Settings;
pub use error::{Error, Result};
pub use history::{FileStore, HistoryService, KvStore, MemoryStore};
pub use logging::{LoggingError, init_logging};
pub use lookup::{LookupRequest, LookupService};
pub use measure::{MeasurementState, SpeedtestSession};
pub use types::{HistoryEntry, IpType, IpVersion, NormalizedIpRecord, Sources};

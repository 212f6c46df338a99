mod config;
mod core;
mod metric;
mod periodic;

// Re-export public items
pub use config::{CollectorConfig, CollectorConfigBuilder};
pub use self::core::Source;
pub use metric::{AbsentValue, MetricDescriptor, MetricTable, PutvalValue, Reading};
pub use periodic::{CollectorLoop, LoopState};

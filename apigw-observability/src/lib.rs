pub mod access_log;
pub mod metrics;

pub use access_log::{AccessLogConfig, AccessLogExporter};
pub use metrics::MetricsCollector;

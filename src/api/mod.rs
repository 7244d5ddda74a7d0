pub mod client;
pub mod metrics;
pub mod mock;
pub mod types;
pub mod urls;

pub use client::ApiClient;
pub use metrics::{ApiMetrics, MetricsSink, SharedMetrics};
pub use mock::MockBackend;
pub use types::{ApiError, Backend, JobsApi, SignalsApi};

pub mod api;
pub mod azure;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod request;
pub mod selector;

pub use azure::{BackendKind, MetricClient};
pub use config::BridgeConfig;
pub use dispatcher::Dispatcher;
pub use error::{BridgeError, Result};
pub use models::MetricResponse;
pub use request::{MetricRequest, RequestField};
pub use selector::{parse_metric_request, Operator, Requirement, Selector};

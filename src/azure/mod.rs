//! Backend clients for the three supported metric sources.
//!
//! Every client implements [`MetricClient`]. Shared fields are checked with
//! [`MetricRequest::validate`]; each client then checks the fields its own
//! backend needs before making any outbound call.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::models::MetricResponse;
use crate::request::MetricRequest;
use crate::{BridgeError, Result};

pub mod arm;
pub mod auth;
pub mod cosmosdb;
pub mod monitor;
pub mod servicebus;

pub use arm::ArmClient;
pub use auth::{authorizer_from_environment, Authorizer};
pub use cosmosdb::CosmosDbClient;
pub use monitor::MonitorClient;
pub use servicebus::ServiceBusClient;

#[async_trait]
pub trait MetricClient: Send + Sync {
    async fn get_metric(&self, request: &MetricRequest) -> Result<MetricResponse>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Monitor,
    ServiceBus,
    CosmosDb,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Monitor => "monitor",
            BackendKind::ServiceBus => "servicebus",
            BackendKind::CosmosDb => "cosmosdb",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "monitor" => Ok(BackendKind::Monitor),
            "servicebus" => Ok(BackendKind::ServiceBus),
            "cosmosdb" => Ok(BackendKind::CosmosDb),
            other => Err(BridgeError::MalformedSelector(format!("unknown backend '{}'", other))),
        }
    }
}

/// Fills an empty `subscription_id` from the client's default. A value the
/// request already carries is kept.
pub(crate) fn with_default_subscription<'a>(
    request: &'a MetricRequest,
    default_subscription_id: &str,
) -> Cow<'a, MetricRequest> {
    if request.subscription_id.is_empty() && !default_subscription_id.is_empty() {
        let mut owned = request.clone();
        owned.subscription_id = default_subscription_id.to_string();
        Cow::Owned(owned)
    } else {
        Cow::Borrowed(request)
    }
}

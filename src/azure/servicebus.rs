//! Message counts of a Service Bus topic subscription.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{with_default_subscription, ArmClient, MetricClient};
use crate::models::MetricResponse;
use crate::request::{MetricRequest, RequestField};
use crate::{BridgeError, Result};

pub const SERVICEBUS_API_VERSION: &str = "2017-04-01";

/// Read from `properties` directly; every other metric name is looked up in
/// `properties.countDetails`.
const TOTAL_MESSAGE_COUNT: &str = "messageCount";

pub struct ServiceBusClient {
    arm: ArmClient,
    default_subscription_id: String,
    required_fields: Vec<RequestField>,
}

impl ServiceBusClient {
    /// Only the shared fields are required until
    /// [`with_required_fields`](Self::with_required_fields) says otherwise.
    pub fn new(arm: ArmClient, default_subscription_id: impl Into<String>) -> Self {
        Self {
            arm,
            default_subscription_id: default_subscription_id.into(),
            required_fields: Vec::new(),
        }
    }

    pub fn with_required_fields(mut self, fields: Vec<RequestField>) -> Self {
        self.required_fields = fields;
        self
    }

    pub fn required_fields(&self) -> &[RequestField] {
        &self.required_fields
    }
}

pub(crate) fn subscription_path(request: &MetricRequest) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.ServiceBus/namespaces/{}/topics/{}/subscriptions/{}",
        request.subscription_id,
        request.resource_group,
        request.namespace,
        request.topic,
        request.subscription
    )
}

pub(crate) fn extract_count(resource: &Value, metric_name: &str) -> Result<f64> {
    let properties = resource.get("properties");
    let count = if metric_name.eq_ignore_ascii_case(TOTAL_MESSAGE_COUNT) {
        properties.and_then(|p| p.get(TOTAL_MESSAGE_COUNT))
    } else {
        properties
            .and_then(|p| p.get("countDetails"))
            .and_then(Value::as_object)
            .and_then(|details| {
                details
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(metric_name))
                    .map(|(_, v)| v)
            })
    };

    count
        .and_then(Value::as_f64)
        .ok_or_else(|| BridgeError::MetricNotFound(metric_name.to_string()))
}

#[async_trait]
impl MetricClient for ServiceBusClient {
    async fn get_metric(&self, request: &MetricRequest) -> Result<MetricResponse> {
        let request = with_default_subscription(request, &self.default_subscription_id);
        request.validate()?;
        request.require(&self.required_fields)?;

        info!(
            metric = %request.metric_name,
            namespace = %request.namespace,
            topic = %request.topic,
            subscription = %request.subscription,
            "Querying Service Bus subscription"
        );
        let resource: Value = self
            .arm
            .get(&subscription_path(&request), &[("api-version", SERVICEBUS_API_VERSION)])
            .await?;

        Ok(MetricResponse::new(extract_count(&resource, &request.metric_name)?))
    }
}

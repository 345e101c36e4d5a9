use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::azure::{
    authorizer_from_environment, ArmClient, BackendKind, CosmosDbClient, MetricClient,
    MonitorClient, ServiceBusClient,
};
use crate::config::BridgeConfig;
use crate::metrics::{self, QueryTimer};
use crate::models::MetricResponse;
use crate::selector::{parse_metric_request, Selector};
use crate::{BridgeError, Result};

/// Routes a selector to the client registered for a backend.
pub struct Dispatcher {
    default_subscription_id: String,
    clients: HashMap<BackendKind, Arc<dyn MetricClient>>,
}

impl Dispatcher {
    pub fn new(default_subscription_id: impl Into<String>) -> Self {
        Self {
            default_subscription_id: default_subscription_id.into(),
            clients: HashMap::new(),
        }
    }

    pub fn register(mut self, kind: BackendKind, client: Arc<dyn MetricClient>) -> Self {
        self.clients.insert(kind, client);
        self
    }

    /// All three backends against the configured management endpoint.
    pub fn from_config(config: &BridgeConfig) -> Self {
        let authorizer = authorizer_from_environment(config);
        let arm = ArmClient::new(config.management_endpoint.clone(), authorizer);
        let subscription = config.default_subscription_id.as_str();

        Self::new(subscription)
            .register(
                BackendKind::Monitor,
                Arc::new(MonitorClient::new(arm.clone(), subscription)),
            )
            .register(
                BackendKind::ServiceBus,
                Arc::new(
                    ServiceBusClient::new(arm.clone(), subscription)
                        .with_required_fields(config.service_bus_required_fields.clone()),
                ),
            )
            .register(
                BackendKind::CosmosDb,
                Arc::new(CosmosDbClient::new(arm, subscription)),
            )
    }

    pub fn backends(&self) -> Vec<BackendKind> {
        self.clients.keys().copied().collect()
    }

    pub async fn query(&self, kind: BackendKind, selector: Option<&Selector>) -> Result<MetricResponse> {
        let _timer = QueryTimer::new(kind.as_str());
        let result = self.run(kind, selector).await;
        metrics::record_query(kind.as_str(), &result);

        match &result {
            Ok(response) => info!(backend = %kind, value = response.value, "Metric query succeeded"),
            Err(e) => warn!(backend = %kind, error = %e, "Metric query failed"),
        }
        result
    }

    async fn run(&self, kind: BackendKind, selector: Option<&Selector>) -> Result<MetricResponse> {
        let client = self
            .clients
            .get(&kind)
            .ok_or_else(|| BridgeError::Config(format!("no client registered for backend '{}'", kind)))?;

        let request = parse_metric_request(selector, &self.default_subscription_id)?;
        request.validate()?;

        client.get_metric(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::MetricRequest;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingClient {
        seen: Mutex<Vec<MetricRequest>>,
    }

    #[async_trait]
    impl MetricClient for RecordingClient {
        async fn get_metric(&self, request: &MetricRequest) -> Result<MetricResponse> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(MetricResponse::new(7.0))
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_query_routes_parsed_request() {
        let client = Arc::new(RecordingClient::default());
        let dispatcher = Dispatcher::new("sub-A").register(BackendKind::Monitor, client.clone());

        let selector: Selector = "metricName=Requests,resourceGroup=rg,subscriptionID=sub-B".parse().unwrap();
        let resp = dispatcher.query(BackendKind::Monitor, Some(&selector)).await.unwrap();

        assert_eq!(resp.value, 7.0);
        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].metric_name, "Requests");
        assert_eq!(seen[0].subscription_id, "sub-B");
    }

    #[tokio::test]
    async fn test_invalid_requests_never_reach_client() {
        let client = Arc::new(RecordingClient::default());
        let dispatcher = Dispatcher::new("").register(BackendKind::CosmosDb, client.clone());

        let selector: Selector = "metricName=Requests,resourceGroup=rg".parse().unwrap();
        assert!(matches!(
            dispatcher.query(BackendKind::CosmosDb, Some(&selector)).await,
            Err(BridgeError::MissingField("subscriptionID"))
        ));

        let selector: Selector = "metricName!=Requests".parse().unwrap();
        assert!(matches!(
            dispatcher.query(BackendKind::CosmosDb, Some(&selector)).await,
            Err(BridgeError::UnsupportedOperator { .. })
        ));

        assert!(client.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_backend() {
        let dispatcher = Dispatcher::new("sub-A");
        let selector = Selector::default();
        assert!(matches!(
            dispatcher.query(BackendKind::ServiceBus, Some(&selector)).await,
            Err(BridgeError::Config(_))
        ));
    }

    #[test]
    fn test_from_config_registers_all_backends() {
        let config = BridgeConfig::from_lookup(|_| None).unwrap();
        let mut backends = Dispatcher::from_config(&config).backends();
        backends.sort_by_key(|b| b.as_str());
        assert_eq!(
            backends,
            vec![BackendKind::CosmosDb, BackendKind::Monitor, BackendKind::ServiceBus]
        );
    }
}

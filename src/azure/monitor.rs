//! Azure Monitor metrics for any ARM resource.

use std::str::FromStr;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::{with_default_subscription, ArmClient, MetricClient};
use crate::models::MetricResponse;
use crate::request::{MetricRequest, RequestField};
use crate::{BridgeError, Result};

pub const MONITOR_API_VERSION: &str = "2018-01-01";

const REQUIRED_FIELDS: [RequestField; 4] = [
    RequestField::ResourceName,
    RequestField::ResourceProviderNamespace,
    RequestField::ResourceType,
    RequestField::Aggregation,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Average,
    Minimum,
    Maximum,
    Total,
    Count,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Average => "Average",
            Aggregation::Minimum => "Minimum",
            Aggregation::Maximum => "Maximum",
            Aggregation::Total => "Total",
            Aggregation::Count => "Count",
        }
    }
}

impl FromStr for Aggregation {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "average" => Ok(Aggregation::Average),
            "minimum" => Ok(Aggregation::Minimum),
            "maximum" => Ok(Aggregation::Maximum),
            "total" => Ok(Aggregation::Total),
            "count" => Ok(Aggregation::Count),
            _ => Err(BridgeError::MalformedSelector(format!("unsupported aggregation '{}'", s))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MetricsResult {
    #[serde(default)]
    value: Vec<Metric>,
}

#[derive(Debug, Deserialize)]
struct Metric {
    name: LocalizableString,
    #[serde(default)]
    timeseries: Vec<TimeSeries>,
}

#[derive(Debug, Deserialize)]
struct LocalizableString {
    value: String,
}

#[derive(Debug, Deserialize)]
struct TimeSeries {
    #[serde(default)]
    data: Vec<MetricValue>,
}

#[derive(Debug, Deserialize)]
struct MetricValue {
    average: Option<f64>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    total: Option<f64>,
    count: Option<f64>,
}

impl MetricValue {
    fn get(&self, aggregation: Aggregation) -> Option<f64> {
        match aggregation {
            Aggregation::Average => self.average,
            Aggregation::Minimum => self.minimum,
            Aggregation::Maximum => self.maximum,
            Aggregation::Total => self.total,
            Aggregation::Count => self.count,
        }
    }
}

/// Latest data point carrying `aggregation` for `metric_name`.
pub(crate) fn extract_value(
    result: &MetricsResult,
    metric_name: &str,
    aggregation: Aggregation,
) -> Result<f64> {
    let metric = result
        .value
        .iter()
        .find(|m| m.name.value.eq_ignore_ascii_case(metric_name))
        .ok_or_else(|| BridgeError::MetricNotFound(metric_name.to_string()))?;

    metric
        .timeseries
        .first()
        .and_then(|series| series.data.iter().rev().find_map(|point| point.get(aggregation)))
        .ok_or_else(|| {
            BridgeError::MetricNotFound(format!(
                "{} has no {} data in the requested timespan",
                metric_name,
                aggregation.as_str()
            ))
        })
}

pub struct MonitorClient {
    arm: ArmClient,
    default_subscription_id: String,
}

impl MonitorClient {
    pub fn new(arm: ArmClient, default_subscription_id: impl Into<String>) -> Self {
        Self {
            arm,
            default_subscription_id: default_subscription_id.into(),
        }
    }
}

#[async_trait]
impl MetricClient for MonitorClient {
    async fn get_metric(&self, request: &MetricRequest) -> Result<MetricResponse> {
        let request = with_default_subscription(request, &self.default_subscription_id);
        request.validate()?;
        request.require(&REQUIRED_FIELDS)?;
        let aggregation: Aggregation = request.aggregation.parse()?;

        let path = format!("{}/providers/microsoft.insights/metrics", request.metric_resource_uri());
        let mut query = vec![
            ("api-version", MONITOR_API_VERSION),
            ("timespan", request.timespan.as_str()),
            ("metricnames", request.metric_name.as_str()),
            ("aggregation", aggregation.as_str()),
        ];
        if !request.filter.is_empty() {
            query.push(("$filter", request.filter.as_str()));
        }

        info!(
            metric = %request.metric_name,
            resource = %request.resource_name,
            "Querying Azure Monitor"
        );
        let result: MetricsResult = self.arm.get(&path, &query).await?;
        let value = extract_value(&result, &request.metric_name, aggregation)?;

        Ok(MetricResponse::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(body: serde_json::Value) -> MetricsResult {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_extracts_latest_point_with_value() {
        let body = result(json!({
            "value": [{
                "name": {"value": "Percentage CPU", "localizedValue": "Percentage CPU"},
                "timeseries": [{
                    "data": [
                        {"timeStamp": "2024-03-01T12:00:00Z", "average": 10.0},
                        {"timeStamp": "2024-03-01T12:01:00Z", "average": 20.5},
                        {"timeStamp": "2024-03-01T12:02:00Z"}
                    ]
                }]
            }]
        }));

        assert_eq!(extract_value(&body, "percentage cpu", Aggregation::Average).unwrap(), 20.5);
    }

    #[test]
    fn test_missing_metric_or_points() {
        let body = result(json!({
            "value": [{"name": {"value": "Requests"}, "timeseries": [{"data": [{"total": 3.0}]}]}]
        }));

        assert!(matches!(
            extract_value(&body, "Errors", Aggregation::Total),
            Err(BridgeError::MetricNotFound(_))
        ));
        assert!(matches!(
            extract_value(&body, "Requests", Aggregation::Average),
            Err(BridgeError::MetricNotFound(_))
        ));
        assert_eq!(extract_value(&body, "Requests", Aggregation::Total).unwrap(), 3.0);
    }

    #[test]
    fn test_aggregation_names() {
        assert_eq!("average".parse::<Aggregation>().unwrap(), Aggregation::Average);
        assert_eq!("Total".parse::<Aggregation>().unwrap().as_str(), "Total");
        assert!(matches!(
            "median".parse::<Aggregation>(),
            Err(BridgeError::MalformedSelector(_))
        ));
    }

    #[tokio::test]
    async fn test_requires_monitor_fields_before_calling_out() {
        use crate::azure::auth::UnavailableAuthorizer;
        use std::sync::Arc;

        let arm = ArmClient::new("http://127.0.0.1:9", Arc::new(UnavailableAuthorizer::new("unused")));
        let client = MonitorClient::new(arm, "sub-A");
        let req = MetricRequest {
            metric_name: "Percentage CPU".into(),
            resource_group: "rg".into(),
            resource_name: "vm1".into(),
            resource_provider_namespace: "Microsoft.Compute".into(),
            ..Default::default()
        };

        // resourceType missing, so no token is requested
        assert!(matches!(
            client.get_metric(&req).await,
            Err(BridgeError::MissingField("resourceType"))
        ));
    }
}

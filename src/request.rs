use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::{BridgeError, Result};

/// Width of the aggregation window ending at query time.
pub const TIMESPAN_MINUTES: i64 = 5;

const FILTER_DELIMITER: char = '_';

/// The canonical query handed to a backend client.
///
/// Only `metric_name`, `resource_group` and `subscription_id` are checked by
/// [`MetricRequest::validate`]; the remaining fields are meaningful to a single
/// backend and are checked by that backend's client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRequest {
    // Shared
    pub metric_name: String,
    pub resource_group: String,
    #[serde(rename = "subscriptionID")]
    pub subscription_id: String,
    pub timespan: String,

    // Monitor
    pub resource_name: String,
    pub resource_provider_namespace: String,
    pub resource_type: String,
    pub aggregation: String,
    pub filter: String,

    // Service Bus
    pub namespace: String,
    pub topic: String,
    pub subscription: String,

    // Cosmos DB
    pub database_name: String,
    pub collection_name: String,
    pub document_id: String,
    pub document_field: String,
}

/// Every selector-addressable field of a [`MetricRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestField {
    MetricName,
    ResourceGroup,
    SubscriptionId,
    ResourceName,
    ResourceProviderNamespace,
    ResourceType,
    Aggregation,
    Filter,
    Namespace,
    Topic,
    Subscription,
    Database,
    Collection,
    DocumentId,
    DocumentField,
}

impl RequestField {
    pub const ALL: [RequestField; 15] = [
        RequestField::MetricName,
        RequestField::ResourceGroup,
        RequestField::SubscriptionId,
        RequestField::ResourceName,
        RequestField::ResourceProviderNamespace,
        RequestField::ResourceType,
        RequestField::Aggregation,
        RequestField::Filter,
        RequestField::Namespace,
        RequestField::Topic,
        RequestField::Subscription,
        RequestField::Database,
        RequestField::Collection,
        RequestField::DocumentId,
        RequestField::DocumentField,
    ];

    /// The selector key that addresses this field. Keys are case sensitive.
    pub fn key(&self) -> &'static str {
        match self {
            RequestField::MetricName => "metricName",
            RequestField::ResourceGroup => "resourceGroup",
            RequestField::SubscriptionId => "subscriptionID",
            RequestField::ResourceName => "resourceName",
            RequestField::ResourceProviderNamespace => "resourceProviderNamespace",
            RequestField::ResourceType => "resourceType",
            RequestField::Aggregation => "aggregation",
            RequestField::Filter => "filter",
            RequestField::Namespace => "namespace",
            RequestField::Topic => "topic",
            RequestField::Subscription => "subscription",
            RequestField::Database => "database",
            RequestField::Collection => "collection",
            RequestField::DocumentId => "documentid",
            RequestField::DocumentField => "documentfield",
        }
    }

    pub fn value<'a>(&self, req: &'a MetricRequest) -> &'a str {
        match self {
            RequestField::MetricName => &req.metric_name,
            RequestField::ResourceGroup => &req.resource_group,
            RequestField::SubscriptionId => &req.subscription_id,
            RequestField::ResourceName => &req.resource_name,
            RequestField::ResourceProviderNamespace => &req.resource_provider_namespace,
            RequestField::ResourceType => &req.resource_type,
            RequestField::Aggregation => &req.aggregation,
            RequestField::Filter => &req.filter,
            RequestField::Namespace => &req.namespace,
            RequestField::Topic => &req.topic,
            RequestField::Subscription => &req.subscription,
            RequestField::Database => &req.database_name,
            RequestField::Collection => &req.collection_name,
            RequestField::DocumentId => &req.document_id,
            RequestField::DocumentField => &req.document_field,
        }
    }

    pub(crate) fn slot<'a>(&self, req: &'a mut MetricRequest) -> &'a mut String {
        match self {
            RequestField::MetricName => &mut req.metric_name,
            RequestField::ResourceGroup => &mut req.resource_group,
            RequestField::SubscriptionId => &mut req.subscription_id,
            RequestField::ResourceName => &mut req.resource_name,
            RequestField::ResourceProviderNamespace => &mut req.resource_provider_namespace,
            RequestField::ResourceType => &mut req.resource_type,
            RequestField::Aggregation => &mut req.aggregation,
            RequestField::Filter => &mut req.filter,
            RequestField::Namespace => &mut req.namespace,
            RequestField::Topic => &mut req.topic,
            RequestField::Subscription => &mut req.subscription,
            RequestField::Database => &mut req.database_name,
            RequestField::Collection => &mut req.collection_name,
            RequestField::DocumentId => &mut req.document_id,
            RequestField::DocumentField => &mut req.document_field,
        }
    }
}

impl fmt::Display for RequestField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for RequestField {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        RequestField::ALL
            .iter()
            .copied()
            .find(|field| field.key() == s)
            .ok_or_else(|| BridgeError::UnknownSelectorKey(s.to_string()))
    }
}

impl MetricRequest {
    /// Checks the fields every backend needs.
    pub fn validate(&self) -> Result<()> {
        if self.metric_name.is_empty() {
            return Err(BridgeError::MissingField("metricName"));
        }
        if self.resource_group.is_empty() {
            return Err(BridgeError::MissingField("resourceGroup"));
        }
        if self.subscription_id.is_empty() {
            return Err(BridgeError::MissingField("subscriptionID"));
        }
        Ok(())
    }

    /// Fails with `MissingField` on the first empty field of `fields`.
    pub fn require(&self, fields: &[RequestField]) -> Result<()> {
        match fields.iter().find(|field| field.value(self).is_empty()) {
            Some(field) => Err(BridgeError::MissingField(field.key())),
            None => Ok(()),
        }
    }

    /// Fully qualified ARM id of the resource a Monitor metric is read from.
    pub fn metric_resource_uri(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/{}/{}/{}",
            self.subscription_id,
            self.resource_group,
            self.resource_provider_namespace,
            self.resource_type,
            self.resource_name
        )
    }
}

/// Trailing aggregation window ending now, as an ISO-8601 interval.
pub fn timespan() -> String {
    timespan_ending_at(Utc::now())
}

pub fn timespan_ending_at(end: DateTime<Utc>) -> String {
    let start = end - Duration::minutes(TIMESPAN_MINUTES);
    format!(
        "{}/{}",
        start.to_rfc3339_opts(SecondsFormat::Secs, true),
        end.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Rewrites `field_operator_value` into the OData fragment `field operator 'value'`.
///
/// The literal keeps any further delimiters, so `name_eq_my_queue` becomes
/// `name eq 'my_queue'`.
pub fn format_filter(raw: &str) -> Result<String> {
    let mut tokens = raw.splitn(3, FILTER_DELIMITER);
    match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(field), Some(operator), Some(literal))
            if !field.is_empty() && !operator.is_empty() && !literal.is_empty() =>
        {
            Ok(format!("{} {} '{}'", field, operator, literal))
        }
        _ => Err(BridgeError::MalformedFilter(raw.to_string())),
    }
}

use serde::{Deserialize, Serialize};

/// The single value a backend resolves a query to.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricResponse {
    pub value: f64,
}

impl MetricResponse {
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    pub label_selector: Option<String>,
}

//! Thin Azure Resource Manager REST client shared by the backends.

use std::sync::Arc;

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::auth::Authorizer;
use crate::{BridgeError, Result};

#[derive(Deserialize)]
struct ArmErrorBody {
    error: ArmErrorDetail,
}

#[derive(Deserialize)]
struct ArmErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Clone)]
pub struct ArmClient {
    http: reqwest::Client,
    endpoint: String,
    authorizer: Arc<dyn Authorizer>,
}

impl ArmClient {
    pub fn new(endpoint: impl Into<String>, authorizer: Arc<dyn Authorizer>) -> Self {
        let endpoint = endpoint.into();
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            authorizer,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        debug!(path, "ARM GET");
        self.send(self.http.get(self.url(path)).query(query)).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        debug!(path, "ARM POST");
        self.send(self.http.post(self.url(path)).query(query).body(Vec::new()))
            .await
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let token = self.authorizer.bearer_token().await?;
        let response = builder.bearer_auth(token).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(api_error(status, &body))
    }
}

fn api_error(status: StatusCode, body: &str) -> BridgeError {
    let detail = serde_json::from_str::<ArmErrorBody>(body)
        .map(|b| format!("{}: {}", b.error.code, b.error.message))
        .unwrap_or_else(|_| body.trim().to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            BridgeError::Unauthorized(format!("{} {}", status, detail))
        }
        _ => BridgeError::Transport(format!("{} {}", status, detail)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::auth::StaticTokenAuthorizer;

    #[test]
    fn test_url_joins_without_double_slash() {
        let arm = ArmClient::new("https://management.example.com/", Arc::new(StaticTokenAuthorizer::new("t")));
        assert_eq!(
            arm.url("/subscriptions/s"),
            "https://management.example.com/subscriptions/s"
        );
    }

    #[test]
    fn test_api_error_mapping() {
        let body = r#"{"error":{"code":"ResourceNotFound","message":"The resource was not found"}}"#;
        match api_error(StatusCode::NOT_FOUND, body) {
            BridgeError::Transport(msg) => {
                assert!(msg.contains("404"));
                assert!(msg.contains("ResourceNotFound: The resource was not found"));
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(matches!(
            api_error(StatusCode::FORBIDDEN, "denied"),
            BridgeError::Unauthorized(_)
        ));
    }
}

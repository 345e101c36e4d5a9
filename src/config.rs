use std::env;
use std::net::SocketAddr;

use crate::request::RequestField;
use crate::{BridgeError, Result};

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Service principal credentials, when the environment provides a full set.
#[derive(Clone)]
pub struct ClientCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Used when a selector does not carry `subscriptionID`. May be empty.
    pub default_subscription_id: String,
    pub listen_addr: SocketAddr,
    pub management_endpoint: String,
    pub authority_host: String,
    pub credentials: Option<ClientCredentials>,
    pub service_bus_required_fields: Vec<RequestField>,
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let default_subscription_id = var("SUBSCRIPTION_ID")
            .or_else(|| var("AZURE_SUBSCRIPTION_ID"))
            .unwrap_or_default();

        let listen_addr = var("BRIDGE_LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr: SocketAddr = listen_addr
            .parse()
            .map_err(|e| BridgeError::Config(format!("invalid BRIDGE_LISTEN_ADDR '{}': {}", listen_addr, e)))?;

        let credentials = match (var("AZURE_TENANT_ID"), var("AZURE_CLIENT_ID"), var("AZURE_CLIENT_SECRET")) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => Some(ClientCredentials {
                tenant_id,
                client_id,
                client_secret,
            }),
            _ => None,
        };

        let service_bus_required_fields = match var("SERVICEBUS_REQUIRED_FIELDS") {
            Some(list) => parse_field_list(&list)?,
            None => Vec::new(),
        };

        Ok(Self {
            default_subscription_id,
            listen_addr,
            management_endpoint: var("AZURE_MANAGEMENT_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_MANAGEMENT_ENDPOINT.to_string()),
            authority_host: var("AZURE_AUTHORITY_HOST")
                .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
            credentials,
            service_bus_required_fields,
        })
    }
}

fn parse_field_list(list: &str) -> Result<Vec<RequestField>> {
    list.split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(|key| {
            key.parse().map_err(|_| {
                BridgeError::Config(format!("unknown key '{}' in SERVICEBUS_REQUIRED_FIELDS", key))
            })
        })
        .collect()
}

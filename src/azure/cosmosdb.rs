//! Numeric fields of a single Cosmos DB document.
//!
//! A query runs in three steps and stops at the first failure:
//!
//! 1. list the account's connection strings on the management plane,
//! 2. open a direct session with the first one,
//! 3. read the document by `_id` and parse the requested field as an integer.

use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::ClientOptions;
use mongodb::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{with_default_subscription, ArmClient, MetricClient};
use crate::models::MetricResponse;
use crate::request::{MetricRequest, RequestField};
use crate::{BridgeError, Result};

pub const DOCUMENTDB_API_VERSION: &str = "2015-04-08";

const APP_NAME: &str = "external-metrics-bridge";

const REQUIRED_FIELDS: [RequestField; 5] = [
    RequestField::ResourceName,
    RequestField::Database,
    RequestField::Collection,
    RequestField::DocumentId,
    RequestField::DocumentField,
];

/// Management-plane lookup of an account's data-plane connection strings.
#[async_trait]
pub trait ConnectionStringSource: Send + Sync {
    async fn list_connection_strings(
        &self,
        subscription_id: &str,
        resource_group: &str,
        account_name: &str,
    ) -> Result<Vec<String>>;
}

/// Data-plane point read. Implementations open a session per call.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_document(
        &self,
        connection_string: &str,
        database: &str,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionStringList {
    #[serde(default)]
    connection_strings: Vec<ConnectionString>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionString {
    connection_string: String,
}

/// `listConnectionStrings` on a `Microsoft.DocumentDB/databaseAccounts` resource.
pub struct ArmConnectionStrings {
    arm: ArmClient,
}

impl ArmConnectionStrings {
    pub fn new(arm: ArmClient) -> Self {
        Self { arm }
    }
}

#[async_trait]
impl ConnectionStringSource for ArmConnectionStrings {
    async fn list_connection_strings(
        &self,
        subscription_id: &str,
        resource_group: &str,
        account_name: &str,
    ) -> Result<Vec<String>> {
        let path = format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.DocumentDB/databaseAccounts/{}/listConnectionStrings",
            subscription_id, resource_group, account_name
        );
        let list: ConnectionStringList = self
            .arm
            .post(&path, &[("api-version", DOCUMENTDB_API_VERSION)])
            .await?;

        Ok(list
            .connection_strings
            .into_iter()
            .map(|c| c.connection_string)
            .collect())
    }
}

/// MongoDB wire-protocol access to the account.
#[derive(Default)]
pub struct MongoDocumentStore;

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn find_document(
        &self,
        connection_string: &str,
        database: &str,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>> {
        // connection strings embed the account key
        let mut options = ClientOptions::parse(connection_string)
            .await
            .map_err(|_| BridgeError::BackendUnavailable("invalid document store connection string".to_string()))?;
        options.direct_connection = Some(true);
        options.app_name = Some(APP_NAME.to_string());

        let client = Client::with_options(options)
            .map_err(|e| BridgeError::BackendUnavailable(format!("document store client: {}", e.kind)))?;
        let db = client.database(database);

        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| BridgeError::BackendUnavailable(format!("document store connection failed: {}", e.kind)))?;
        debug!(database, "Document store session established");

        let found = db
            .collection::<Document>(collection)
            .find_one(doc! { "_id": id })
            .await;
        client.shutdown().await;

        Ok(found?)
    }
}

/// Parses the string form of `document[field]` as an integer.
pub fn coerce_field(document: &Document, field: &str) -> Result<f64> {
    let value = document
        .get(field)
        .ok_or_else(|| BridgeError::FieldNotFound(field.to_string()))?;

    let text = match value {
        Bson::String(s) => s.clone(),
        Bson::Int32(i) => i.to_string(),
        Bson::Int64(i) => i.to_string(),
        other => other.to_string(),
    };

    text.parse::<i64>()
        .map(|v| v as f64)
        .map_err(|_| BridgeError::ValueNotNumeric {
            field: field.to_string(),
            value: text,
        })
}

pub struct CosmosDbClient {
    connections: Arc<dyn ConnectionStringSource>,
    store: Arc<dyn DocumentStore>,
    default_subscription_id: String,
}

impl CosmosDbClient {
    pub fn new(arm: ArmClient, default_subscription_id: impl Into<String>) -> Self {
        Self::with_backends(
            Arc::new(ArmConnectionStrings::new(arm)),
            Arc::new(MongoDocumentStore),
            default_subscription_id,
        )
    }

    pub fn with_backends(
        connections: Arc<dyn ConnectionStringSource>,
        store: Arc<dyn DocumentStore>,
        default_subscription_id: impl Into<String>,
    ) -> Self {
        Self {
            connections,
            store,
            default_subscription_id: default_subscription_id.into(),
        }
    }

    async fn resolve_connection_string(&self, request: &MetricRequest) -> Result<String> {
        let listed = self
            .connections
            .list_connection_strings(
                &request.subscription_id,
                &request.resource_group,
                &request.resource_name,
            )
            .await;

        let strings = match listed {
            Ok(strings) => strings,
            Err(e @ BridgeError::Unauthorized(_)) => return Err(e),
            Err(e) => {
                warn!(account = %request.resource_name, error = %e, "Listing connection strings failed");
                return Err(BridgeError::BackendUnavailable(format!(
                    "listing connection strings for account '{}': {}",
                    request.resource_name, e
                )));
            }
        };

        strings.into_iter().next().ok_or_else(|| {
            BridgeError::BackendUnavailable(format!(
                "account '{}' returned no connection strings",
                request.resource_name
            ))
        })
    }
}

#[async_trait]
impl MetricClient for CosmosDbClient {
    async fn get_metric(&self, request: &MetricRequest) -> Result<MetricResponse> {
        let request = with_default_subscription(request, &self.default_subscription_id);
        request.validate()?;
        request.require(&REQUIRED_FIELDS)?;

        let connection_string = self.resolve_connection_string(&request).await?;

        info!(
            account = %request.resource_name,
            database = %request.database_name,
            collection = %request.collection_name,
            document = %request.document_id,
            "Reading Cosmos DB document"
        );
        let document = self
            .store
            .find_document(
                &connection_string,
                &request.database_name,
                &request.collection_name,
                &request.document_id,
            )
            .await?
            .ok_or_else(|| BridgeError::DocumentNotFound {
                database: request.database_name.clone(),
                collection: request.collection_name.clone(),
                id: request.document_id.clone(),
            })?;

        Ok(MetricResponse::new(coerce_field(&document, &request.document_field)?))
    }
}

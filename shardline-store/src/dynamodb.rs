//! DynamoDB-backed keyed-item store for production.
//!
//! Translates typed requests into DynamoDB expressions and maps service
//! errors onto [`StoreError`]. Like every [`ItemStore`], this backend does
//! not retry on its own; wrap it in an [`crate::ItemExecutor`].
//!
//! # Configuration
//!
//! Configuration can be provided programmatically or loaded from environment
//! variables using [`DynamoDbConfig::from_env`].
//!
//! # Example
//!
//! ```ignore
//! use shardline_store::{DynamoDbConfig, DynamoDbItemStore, ItemExecutor};
//!
//! let store = DynamoDbItemStore::new(DynamoDbConfig::from_env()?).await;
//! let executor = ItemExecutor::new(store, config.retry.clone());
//! ```

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::config::timeout::TimeoutConfig;
use aws_sdk_dynamodb::config::Region;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::{
    AttributeValue as DynamoValue, DeleteRequest, KeysAndAttributes, PutRequest, ReturnValue,
    WriteRequest as DynamoWrite,
};
use aws_sdk_dynamodb::Client;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::expr::{Condition, UpdateAction};
use crate::item::{AttributeValue, Item};
use crate::request::{
    BatchGetOutput, BatchGetRequest, BatchWriteOutput, BatchWriteRequest, DeleteItemRequest,
    GetItemRequest, Page, PutItemRequest, QueryRequest, ScanRequest, UpdateItemRequest,
    WriteRequest,
};
use crate::storage::ItemStore;

type DynamoItem = HashMap<String, DynamoValue>;

// -----------------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------------

/// Configuration for the DynamoDB backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DynamoDbConfig {
    /// AWS region. If not set, uses the default region from environment/config.
    pub region: Option<String>,
    /// Custom endpoint URL, e.g. `LocalStack` or DynamoDB Local.
    pub endpoint_url: Option<String>,
    /// Per-operation timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// Error during DynamoDB configuration.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DynamoDbConfigError {
    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl DynamoDbConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SHARDLINE_DYNAMODB_REGION`: AWS region
    /// - `SHARDLINE_DYNAMODB_ENDPOINT`: Custom endpoint URL
    /// - `SHARDLINE_DYNAMODB_TIMEOUT_MS`: Per-operation timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout is not a number.
    pub fn from_env() -> Result<Self, DynamoDbConfigError> {
        let timeout_ms = match env::var("SHARDLINE_DYNAMODB_TIMEOUT_MS") {
            Ok(raw) => Some(raw.parse().map_err(|_| {
                DynamoDbConfigError::Invalid(format!("SHARDLINE_DYNAMODB_TIMEOUT_MS: '{raw}'"))
            })?),
            Err(_) => None,
        };
        Ok(Self {
            region: env::var("SHARDLINE_DYNAMODB_REGION").ok(),
            endpoint_url: env::var("SHARDLINE_DYNAMODB_ENDPOINT").ok(),
            timeout_ms,
        })
    }

    /// Sets the region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets a custom endpoint URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint.into());
        self
    }

    /// Sets the per-operation timeout.
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

// -----------------------------------------------------------------------------
// DynamoDbItemStore
// -----------------------------------------------------------------------------

/// DynamoDB implementation of [`ItemStore`].
#[derive(Clone)]
pub struct DynamoDbItemStore {
    client: Client,
}

impl std::fmt::Debug for DynamoDbItemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbItemStore").finish_non_exhaustive()
    }
}

impl DynamoDbItemStore {
    /// Creates a store from configuration.
    ///
    /// Credentials come from the standard AWS credential chain.
    pub async fn new(config: DynamoDbConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        if let Some(timeout_ms) = config.timeout_ms {
            let timeout_config = TimeoutConfig::builder()
                .operation_timeout(Duration::from_millis(timeout_ms))
                .build();
            builder = builder.timeout_config(timeout_config);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }

    /// Creates a store from a pre-built client.
    #[must_use]
    pub const fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ItemStore for DynamoDbItemStore {
    async fn get_item(&self, request: &GetItemRequest) -> StoreResult<Option<Item>> {
        let output = self
            .client
            .get_item()
            .table_name(&request.table)
            .set_key(Some(to_dynamo_item(&request.key)))
            .consistent_read(request.consistent_read)
            .send()
            .await
            .map_err(|e| map_sdk_error("get_item", &request.table, &e))?;
        output.item.map(from_dynamo_item).transpose()
    }

    async fn put_item(&self, request: &PutItemRequest) -> StoreResult<()> {
        let mut exprs = ExpressionBuilder::default();
        let condition = request.condition.as_ref().and_then(|c| exprs.condition(c));
        self.client
            .put_item()
            .table_name(&request.table)
            .set_item(Some(to_dynamo_item(&request.item)))
            .set_condition_expression(condition)
            .set_expression_attribute_names(exprs.names())
            .set_expression_attribute_values(exprs.values())
            .send()
            .await
            .map_err(|e| map_sdk_error("put_item", &request.table, &e))?;
        Ok(())
    }

    async fn update_item(&self, request: &UpdateItemRequest) -> StoreResult<Item> {
        let mut exprs = ExpressionBuilder::default();
        let update = exprs.update(&request.actions);
        let condition = request.condition.as_ref().and_then(|c| exprs.condition(c));
        let output = self
            .client
            .update_item()
            .table_name(&request.table)
            .set_key(Some(to_dynamo_item(&request.key)))
            .set_update_expression(update)
            .set_condition_expression(condition)
            .set_expression_attribute_names(exprs.names())
            .set_expression_attribute_values(exprs.values())
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| map_sdk_error("update_item", &request.table, &e))?;
        match output.attributes {
            Some(attributes) => from_dynamo_item(attributes),
            None => Ok(request.key.clone()),
        }
    }

    async fn delete_item(&self, request: &DeleteItemRequest) -> StoreResult<()> {
        let mut exprs = ExpressionBuilder::default();
        let condition = request.condition.as_ref().and_then(|c| exprs.condition(c));
        self.client
            .delete_item()
            .table_name(&request.table)
            .set_key(Some(to_dynamo_item(&request.key)))
            .set_condition_expression(condition)
            .set_expression_attribute_names(exprs.names())
            .set_expression_attribute_values(exprs.values())
            .send()
            .await
            .map_err(|e| map_sdk_error("delete_item", &request.table, &e))?;
        Ok(())
    }

    async fn query(&self, request: &QueryRequest) -> StoreResult<Page> {
        let mut exprs = ExpressionBuilder::default();
        let key_condition = exprs.key_condition(&request.key_equals);
        let filter = request.filter.as_ref().and_then(|c| exprs.condition(c));
        let output = self
            .client
            .query()
            .table_name(&request.table)
            .set_index_name(request.index.clone())
            .key_condition_expression(key_condition)
            .set_filter_expression(filter)
            .set_expression_attribute_names(exprs.names())
            .set_expression_attribute_values(exprs.values())
            .set_limit(request.limit.map(to_sdk_limit))
            .set_exclusive_start_key(request.exclusive_start_key.as_ref().map(to_dynamo_item))
            .send()
            .await
            .map_err(|e| map_sdk_error("query", &request.table, &e))?;
        to_page(output.items, output.last_evaluated_key)
    }

    async fn scan(&self, request: &ScanRequest) -> StoreResult<Page> {
        let mut exprs = ExpressionBuilder::default();
        let filter = request.filter.as_ref().and_then(|c| exprs.condition(c));
        let output = self
            .client
            .scan()
            .table_name(&request.table)
            .set_filter_expression(filter)
            .set_expression_attribute_names(exprs.names())
            .set_expression_attribute_values(exprs.values())
            .set_limit(request.limit.map(to_sdk_limit))
            .set_exclusive_start_key(request.exclusive_start_key.as_ref().map(to_dynamo_item))
            .send()
            .await
            .map_err(|e| map_sdk_error("scan", &request.table, &e))?;
        to_page(output.items, output.last_evaluated_key)
    }

    async fn batch_get_item(&self, request: &BatchGetRequest) -> StoreResult<BatchGetOutput> {
        let first_table = request.tables.keys().next().cloned().unwrap_or_default();
        let mut request_items = HashMap::with_capacity(request.tables.len());
        for (table, keys) in &request.tables {
            let keys_and_attributes = KeysAndAttributes::builder()
                .set_keys(Some(keys.iter().map(to_dynamo_item).collect()))
                .build()
                .map_err(|e| StoreError::validation(e.to_string()))?;
            request_items.insert(table.clone(), keys_and_attributes);
        }

        let output = self
            .client
            .batch_get_item()
            .set_request_items(Some(request_items))
            .send()
            .await
            .map_err(|e| map_sdk_error("batch_get_item", &first_table, &e))?;

        let mut result = BatchGetOutput::default();
        for (table, items) in output.responses.unwrap_or_default() {
            let items = items
                .into_iter()
                .map(from_dynamo_item)
                .collect::<StoreResult<Vec<_>>>()?;
            result.responses.insert(table, items);
        }
        for (table, keys_and_attributes) in output.unprocessed_keys.unwrap_or_default() {
            let keys = keys_and_attributes
                .keys
                .into_iter()
                .map(from_dynamo_item)
                .collect::<StoreResult<Vec<_>>>()?;
            if !keys.is_empty() {
                result.unprocessed.insert(table, keys);
            }
        }
        debug!(
            tables = result.responses.len(),
            unprocessed_tables = result.unprocessed.len(),
            "DynamoDB batch get completed"
        );
        Ok(result)
    }

    async fn batch_write_item(&self, request: &BatchWriteRequest) -> StoreResult<BatchWriteOutput> {
        let first_table = request.tables.keys().next().cloned().unwrap_or_default();
        let mut request_items = HashMap::with_capacity(request.tables.len());
        for (table, writes) in &request.tables {
            let writes = writes
                .iter()
                .map(to_dynamo_write)
                .collect::<StoreResult<Vec<_>>>()?;
            request_items.insert(table.clone(), writes);
        }

        let output = self
            .client
            .batch_write_item()
            .set_request_items(Some(request_items))
            .send()
            .await
            .map_err(|e| map_sdk_error("batch_write_item", &first_table, &e))?;

        let mut result = BatchWriteOutput::default();
        for (table, writes) in output.unprocessed_items.unwrap_or_default() {
            let writes = writes
                .into_iter()
                .filter_map(|write| from_dynamo_write(write).transpose())
                .collect::<StoreResult<Vec<_>>>()?;
            if !writes.is_empty() {
                result.unprocessed.insert(table, writes);
            }
        }
        Ok(result)
    }
}

// -----------------------------------------------------------------------------
// Expressions
// -----------------------------------------------------------------------------

/// Accumulates placeholder names and values while rendering expressions.
#[derive(Debug, Default)]
struct ExpressionBuilder {
    /// Placeholder (`#n0`) to attribute name.
    names: HashMap<String, String>,
    /// Attribute name to placeholder, for reuse.
    placeholders: HashMap<String, String>,
    /// Placeholder (`:v0`) to value.
    values: HashMap<String, DynamoValue>,
}

impl ExpressionBuilder {
    fn name(&mut self, attribute: &str) -> String {
        if let Some(placeholder) = self.placeholders.get(attribute) {
            return placeholder.clone();
        }
        let placeholder = format!("#n{}", self.names.len());
        self.names
            .insert(placeholder.clone(), attribute.to_string());
        self.placeholders
            .insert(attribute.to_string(), placeholder.clone());
        placeholder
    }

    fn value(&mut self, value: DynamoValue) -> String {
        let placeholder = format!(":v{}", self.values.len());
        self.values.insert(placeholder.clone(), value);
        placeholder
    }

    fn condition(&mut self, condition: &Condition) -> Option<String> {
        match condition {
            Condition::AttributeExists(attr) => {
                Some(format!("attribute_exists({})", self.name(attr)))
            }
            Condition::AttributeNotExists(attr) => {
                Some(format!("attribute_not_exists({})", self.name(attr)))
            }
            Condition::Compare {
                attribute,
                op,
                value,
            } => {
                let name = self.name(attribute);
                let value = self.value(to_dynamo_value(value));
                Some(format!("{name} {} {value}", op.symbol()))
            }
            Condition::And(all) => {
                let parts: Vec<String> = all
                    .iter()
                    .filter_map(|c| self.condition(c))
                    .map(|c| format!("({c})"))
                    .collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join(" AND "))
                }
            }
        }
    }

    fn update(&mut self, actions: &[UpdateAction]) -> Option<String> {
        let mut sets = Vec::new();
        let mut adds = Vec::new();
        let mut removes = Vec::new();
        for action in actions {
            match action {
                UpdateAction::Set { attribute, value } => {
                    let name = self.name(attribute);
                    let value = self.value(to_dynamo_value(value));
                    sets.push(format!("{name} = {value}"));
                }
                UpdateAction::Add { attribute, delta } => {
                    let name = self.name(attribute);
                    let value = self.value(DynamoValue::N(delta.to_string()));
                    adds.push(format!("{name} {value}"));
                }
                UpdateAction::Remove(attribute) => removes.push(self.name(attribute)),
            }
        }

        let clauses: Vec<String> = [("SET", sets), ("ADD", adds), ("REMOVE", removes)]
            .into_iter()
            .filter(|(_, parts)| !parts.is_empty())
            .map(|(keyword, parts)| format!("{keyword} {}", parts.join(", ")))
            .collect();
        if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(" "))
        }
    }

    fn key_condition(&mut self, key_equals: &[(String, AttributeValue)]) -> String {
        key_equals
            .iter()
            .map(|(attr, value)| {
                let name = self.name(attr);
                let value = self.value(to_dynamo_value(value));
                format!("{name} = {value}")
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn names(&self) -> Option<HashMap<String, String>> {
        (!self.names.is_empty()).then(|| self.names.clone())
    }

    fn values(&self) -> Option<HashMap<String, DynamoValue>> {
        (!self.values.is_empty()).then(|| self.values.clone())
    }
}

// -----------------------------------------------------------------------------
// Conversions
// -----------------------------------------------------------------------------

fn to_dynamo_value(value: &AttributeValue) -> DynamoValue {
    match value {
        AttributeValue::S(s) => DynamoValue::S(s.clone()),
        AttributeValue::N(n) => DynamoValue::N(n.clone()),
        AttributeValue::Bool(b) => DynamoValue::Bool(*b),
        AttributeValue::Null => DynamoValue::Null(true),
    }
}

fn from_dynamo_value(name: &str, value: DynamoValue) -> StoreResult<AttributeValue> {
    match value {
        DynamoValue::S(s) => Ok(AttributeValue::S(s)),
        DynamoValue::N(n) => Ok(AttributeValue::N(n)),
        DynamoValue::Bool(b) => Ok(AttributeValue::Bool(b)),
        DynamoValue::Null(_) => Ok(AttributeValue::Null),
        _ => Err(StoreError::validation(format!(
            "unsupported attribute type for '{name}'"
        ))),
    }
}

fn to_dynamo_item(item: &Item) -> DynamoItem {
    item.iter()
        .map(|(name, value)| (name.clone(), to_dynamo_value(value)))
        .collect()
}

fn from_dynamo_item(item: DynamoItem) -> StoreResult<Item> {
    item.into_iter()
        .map(|(name, value)| {
            let value = from_dynamo_value(&name, value)?;
            Ok((name, value))
        })
        .collect()
}

fn to_dynamo_write(write: &WriteRequest) -> StoreResult<DynamoWrite> {
    let builder = DynamoWrite::builder();
    let builder = match write {
        WriteRequest::Put(item) => builder.put_request(
            PutRequest::builder()
                .set_item(Some(to_dynamo_item(item)))
                .build()
                .map_err(|e| StoreError::validation(e.to_string()))?,
        ),
        WriteRequest::Delete(key) => builder.delete_request(
            DeleteRequest::builder()
                .set_key(Some(to_dynamo_item(key)))
                .build()
                .map_err(|e| StoreError::validation(e.to_string()))?,
        ),
    };
    Ok(builder.build())
}

fn from_dynamo_write(write: DynamoWrite) -> StoreResult<Option<WriteRequest>> {
    if let Some(put) = write.put_request {
        return from_dynamo_item(put.item).map(|item| Some(WriteRequest::Put(item)));
    }
    if let Some(delete) = write.delete_request {
        return from_dynamo_item(delete.key).map(|key| Some(WriteRequest::Delete(key)));
    }
    Ok(None)
}

fn to_page(items: Option<Vec<DynamoItem>>, last_key: Option<DynamoItem>) -> StoreResult<Page> {
    Ok(Page {
        items: items
            .unwrap_or_default()
            .into_iter()
            .map(from_dynamo_item)
            .collect::<StoreResult<_>>()?,
        last_evaluated_key: last_key
            .filter(|key| !key.is_empty())
            .map(from_dynamo_item)
            .transpose()?,
    })
}

fn to_sdk_limit(limit: u32) -> i32 {
    i32::try_from(limit).unwrap_or(i32::MAX)
}

/// Maps a DynamoDB service error code onto the store taxonomy.
fn map_sdk_error<E, R>(operation: &'static str, table: &str, err: &SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let table = table.to_string();
    match err.as_service_error().and_then(ProvideErrorMetadata::code) {
        Some("ResourceNotFoundException") => StoreError::ResourceNotFound { table },
        Some("ConditionalCheckFailedException") => StoreError::ConditionalCheckFailed { table },
        Some(
            "ProvisionedThroughputExceededException"
            | "ThrottlingException"
            | "RequestLimitExceeded",
        ) => StoreError::ThroughputExceeded { table },
        Some("ValidationException") => StoreError::validation(format!(
            "{operation}: {}",
            err.as_service_error()
                .and_then(ProvideErrorMetadata::message)
                .unwrap_or("validation failed")
        )),
        _ => StoreError::Transport {
            operation,
            message: DisplayErrorContext(err).to_string(),
        },
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

//! The nine read-only catalog operations exposed to the model, behind the TTL cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{collapse_whitespace, CacheKey, TtlCache};
use crate::client::CatalogClient;
use crate::credential::CredentialManager;
use crate::error::CatalogError;
use crate::format::{self, SchemaMatch};
use crate::model::{records, Column, DataSource, Lineage, Schema, TableDetail, TableSummary};
use crate::transport::ApiRequest;
use crate::UNKNOWN;

const SEARCH_LIMIT: u32 = 10;
const MAX_COLUMN_MATCHES: usize = 30;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableRef {
    pub data_source_id: i64,
    pub schema_name: String,
    pub table_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CatalogRequest {
    SearchTable { table_name: String },
    SearchSchema { keyword: String },
    SearchColumns { column_name: String, table_name: Option<String> },
    ListDataSources,
    ListSchemas { data_source_id: i64 },
    ListTables { data_source_id: i64, schema_name: String },
    GetTableMetadata(TableRef),
    GetColumnMetadata(TableRef),
    GetLineage(TableRef),
}

impl CatalogRequest {
    pub fn operation(&self) -> &'static str {
        match self {
            Self::SearchTable { .. } => "search_table",
            Self::SearchSchema { .. } => "search_schema",
            Self::SearchColumns { .. } => "search_columns",
            Self::ListDataSources => "list_data_sources",
            Self::ListSchemas { .. } => "list_schemas",
            Self::ListTables { .. } => "list_tables",
            Self::GetTableMetadata(_) => "get_table_metadata",
            Self::GetColumnMetadata(_) => "get_column_metadata",
            Self::GetLineage(_) => "get_lineage",
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        let operation = self.operation();
        match self {
            // Name searches try every casing, so their keys fold case.
            Self::SearchTable { table_name } => {
                CacheKey::case_folded(operation, &[("table_name", table_name.as_str())])
            }
            Self::SearchSchema { keyword } => {
                CacheKey::case_folded(operation, &[("keyword", keyword.as_str())])
            }
            // The column filter matches exactly; the table filter ignores case.
            Self::SearchColumns { column_name, table_name } => {
                let table_filter = table_name.as_deref().unwrap_or("").to_lowercase();
                CacheKey::new(operation, &[
                    ("column_name", column_name.as_str()),
                    ("table_name", table_filter.as_str()),
                ])
            }
            Self::ListDataSources => CacheKey::new(operation, &[]),
            Self::ListSchemas { data_source_id } => {
                let id = data_source_id.to_string();
                CacheKey::new(operation, &[("data_source_id", id.as_str())])
            }
            Self::ListTables { data_source_id, schema_name } => {
                let id = data_source_id.to_string();
                CacheKey::new(operation, &[
                    ("data_source_id", id.as_str()),
                    ("schema_name", schema_name.as_str()),
                ])
            }
            Self::GetTableMetadata(table) | Self::GetColumnMetadata(table) | Self::GetLineage(table) => {
                let id = table.data_source_id.to_string();
                CacheKey::new(operation, &[
                    ("data_source_id", id.as_str()),
                    ("schema_name", table.schema_name.as_str()),
                    ("table_name", table.table_name.as_str()),
                ])
            }
        }
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        match self {
            Self::SearchTable { table_name } => require("table_name", table_name),
            Self::SearchSchema { keyword } => require("keyword", keyword),
            Self::SearchColumns { column_name, .. } => require("column_name", column_name),
            Self::ListDataSources => Ok(()),
            Self::ListSchemas { data_source_id } => require_id(*data_source_id),
            Self::ListTables { data_source_id, schema_name } => {
                require_id(*data_source_id)?;
                require("schema_name", schema_name)
            }
            Self::GetTableMetadata(table) | Self::GetColumnMetadata(table) | Self::GetLineage(table) => {
                require_id(table.data_source_id)?;
                require("schema_name", &table.schema_name)?;
                require("table_name", &table.table_name)
            }
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), CatalogError> {
    if value.trim().is_empty() {
        return Err(CatalogError::InvalidInput(format!("{field} is required")));
    }
    Ok(())
}

fn require_id(data_source_id: i64) -> Result<(), CatalogError> {
    if data_source_id <= 0 {
        return Err(CatalogError::InvalidInput(
            "data_source_id must be a positive integer".to_string(),
        ));
    }
    Ok(())
}

/// Read-only metadata lookups, answered as display-ready text.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn lookup(&self, request: &CatalogRequest) -> Result<String, CatalogError>;
}

pub struct MetadataAdapter {
    client: CatalogClient,
    cache: TtlCache<String>,
    table_ids: Mutex<HashMap<String, i64>>,
}

#[async_trait]
impl CatalogLookup for MetadataAdapter {
    async fn lookup(&self, request: &CatalogRequest) -> Result<String, CatalogError> {
        request.validate()?;

        let key = request.cache_key();
        match self.cache.fetch(&key, || self.load(request)).await {
            Err(CatalogError::NotFound(resource)) => {
                info!(
                    event_name = "catalog.lookup.not_found",
                    operation = request.operation(),
                    resource = %resource,
                    "catalog resource not found, answering unknown"
                );
                Ok(UNKNOWN.to_string())
            }
            other => other,
        }
    }
}

impl MetadataAdapter {
    pub fn new(client: CatalogClient, cache: TtlCache<String>) -> Self {
        Self { client, cache, table_ids: Mutex::new(HashMap::new()) }
    }

    pub fn credentials(&self) -> &Arc<CredentialManager> {
        self.client.credentials()
    }

    pub fn invalidate(&self, request: &CatalogRequest) -> bool {
        self.cache.invalidate(&request.cache_key())
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        self.table_ids_guard().clear();
        info!(event_name = "catalog.cache.cleared", "catalog caches cleared");
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    async fn load(&self, request: &CatalogRequest) -> Result<String, CatalogError> {
        info!(event_name = "catalog.lookup", operation = request.operation(), "catalog lookup");
        match request {
            CatalogRequest::SearchTable { table_name } => self.search_table(table_name.trim()).await,
            CatalogRequest::SearchSchema { keyword } => self.search_schema(keyword.trim()).await,
            CatalogRequest::SearchColumns { column_name, table_name } => {
                self.search_columns(column_name.trim(), table_name.as_deref()).await
            }
            CatalogRequest::ListDataSources => self.list_data_sources().await,
            CatalogRequest::ListSchemas { data_source_id } => {
                self.list_schemas(*data_source_id).await
            }
            CatalogRequest::ListTables { data_source_id, schema_name } => {
                self.list_tables(*data_source_id, schema_name.trim()).await
            }
            CatalogRequest::GetTableMetadata(table) => self.get_table_metadata(table).await,
            CatalogRequest::GetColumnMetadata(table) => self.get_column_metadata(table).await,
            CatalogRequest::GetLineage(table) => self.get_lineage(table).await,
        }
    }

    async fn list_data_sources(&self) -> Result<String, CatalogError> {
        let sources = self.data_sources().await?;
        if sources.is_empty() {
            return Ok("No data sources are visible to this catalog token.".to_string());
        }
        Ok(format::data_sources(&sources))
    }

    async fn list_schemas(&self, data_source_id: i64) -> Result<String, CatalogError> {
        let request = ApiRequest::new("/integration/v2/schema/").param("ds_id", data_source_id);
        let schemas: Vec<Schema> =
            self.records(&request).await?.iter().map(Schema::from_record).collect();
        if schemas.is_empty() {
            return Ok(format!(
                "No schemas found for data source {data_source_id}, or access is denied."
            ));
        }
        Ok(format::schemas(&schemas, data_source_id))
    }

    async fn list_tables(
        &self,
        data_source_id: i64,
        schema_name: &str,
    ) -> Result<String, CatalogError> {
        let request = ApiRequest::new("/integration/v2/table/")
            .param("ds_id", data_source_id)
            .param("schema_name", schema_name);
        let tables: Vec<TableSummary> =
            self.records(&request).await?.iter().map(TableSummary::from_record).collect();
        if tables.is_empty() {
            return Ok(format!("No tables found in `{schema_name}`, or access is denied."));
        }
        Ok(format::tables(&tables, schema_name))
    }

    async fn get_table_metadata(&self, table: &TableRef) -> Result<String, CatalogError> {
        let request = ApiRequest::new("/integration/v2/table/")
            .param("ds_id", table.data_source_id)
            .param("schema_name", &table.schema_name)
            .param("name", &table.table_name);
        let found = self.records(&request).await?;
        let Some(record) = found.first() else {
            return Err(CatalogError::NotFound(qualified(table)));
        };
        Ok(format::table_detail(&TableDetail::from_record(record)))
    }

    async fn get_column_metadata(&self, table: &TableRef) -> Result<String, CatalogError> {
        let context = format!("Columns for `{}`.`{}`:", table.schema_name, table.table_name);

        if let Some(table_id) = self.resolve_table_id(table).await? {
            let by_id = [
                ApiRequest::new("/integration/v2/column/").param("table_id", table_id),
                ApiRequest::new("/api/v1/attribute/").param("table_id", table_id),
            ];
            for request in &by_id {
                let found = self.probe(request).await?;
                if !found.is_empty() {
                    return Ok(format::columns(&parse_columns(&found), &context));
                }
            }

            let detail = ApiRequest::new(format!("/catalog/table/{table_id}/"));
            if let Some(payload) = self.probe_value(&detail).await? {
                let embedded = payload.get("columns").map(records).unwrap_or(&[]);
                if !embedded.is_empty() {
                    return Ok(format::columns(&parse_columns(embedded), &context));
                }
            }
        }

        for name in [qualified(table), table.table_name.clone()] {
            let request = ApiRequest::new("/integration/v2/column/")
                .param("ds_id", table.data_source_id)
                .param("table_name", &name);
            let found = self.probe(&request).await?;
            if !found.is_empty() {
                return Ok(format::columns(&parse_columns(&found), &context));
            }
        }

        warn!(
            event_name = "catalog.columns.not_found",
            table = %qualified(table),
            "no columns found after every lookup strategy"
        );
        Ok(format!(
            "No columns found for `{}`.`{}`. The table may not exist in this schema, or access is denied. Ask the user to verify the exact schema and table name.",
            table.schema_name, table.table_name
        ))
    }

    async fn get_lineage(&self, table: &TableRef) -> Result<String, CatalogError> {
        let Some(table_id) = self.resolve_table_id(table).await? else {
            return Err(CatalogError::NotFound(qualified(table)));
        };

        let request = ApiRequest::new("/integration/v2/lineage/")
            .param("oid", table_id)
            .param("otype", "table");
        let payload = self.client.get(&request).await?;
        Ok(format::lineage(&Lineage::from_payload(&payload), &table.table_name))
    }

    async fn search_table(&self, table_name: &str) -> Result<String, CatalogError> {
        let mut found: Vec<TableSummary> = Vec::new();

        let mut variants: Vec<String> = Vec::new();
        for variant in [table_name.to_string(), table_name.to_uppercase(), table_name.to_lowercase()] {
            if !variants.contains(&variant) {
                variants.push(variant);
            }
        }
        for variant in &variants {
            let request = ApiRequest::new("/integration/v2/table/").param("name", variant);
            collect_tables(&mut found, &self.records(&request).await?);
            if !found.is_empty() {
                break;
            }
        }

        if found.is_empty() {
            debug!(event_name = "catalog.search_table.per_source", table = table_name, "searching each data source");
            for source in self.data_sources().await? {
                let Some(data_source_id) = source.id else { continue };
                let request = ApiRequest::new("/integration/v2/table/")
                    .param("ds_id", data_source_id)
                    .param("name", table_name);
                collect_tables(&mut found, &self.probe(&request).await?);
            }
        }

        if found.is_empty() {
            let searches = [
                ApiRequest::new("/integration/v1/search/")
                    .param("q", table_name)
                    .param("otype", "table")
                    .param("limit", SEARCH_LIMIT),
                ApiRequest::new("/integration/v1/search/")
                    .param("q", table_name)
                    .param("limit", SEARCH_LIMIT),
            ];
            for request in &searches {
                collect_tables(&mut found, &self.probe(request).await?);
                if !found.is_empty() {
                    break;
                }
            }
        }

        if found.is_empty() {
            let request = ApiRequest::new("/integration/v2/table/").param("search", table_name);
            collect_tables(&mut found, &self.probe(&request).await?);
        }

        info!(
            event_name = "catalog.search_table.done",
            table = table_name,
            matches = found.len(),
            "table search finished"
        );
        if found.is_empty() {
            return Ok(format!(
                "No tables matching `{table_name}` found across any data source. The table may exist under a different name, or the token may not have access to it. Ask the user for the exact table name, the data source name, or the catalog URL of the table."
            ));
        }
        Ok(format::table_matches(&found))
    }

    async fn search_schema(&self, keyword: &str) -> Result<String, CatalogError> {
        let needle = keyword.to_lowercase();
        let mut matches = Vec::new();

        for source in self.data_sources().await? {
            let Some(data_source_id) = source.id else { continue };
            let request =
                ApiRequest::new("/integration/v2/schema/").param("ds_id", data_source_id);
            for record in self.probe(&request).await? {
                let schema = Schema::from_record(&record);
                if schema.name.to_lowercase().contains(&needle) {
                    matches.push(SchemaMatch {
                        schema,
                        data_source_id,
                        data_source_name: source.name.clone(),
                    });
                }
            }
        }

        if matches.is_empty() {
            return Ok(format!(
                "No schemas matching `{keyword}` found across any data source. Ask the user for the exact schema or database name, or which data source it belongs to."
            ));
        }
        Ok(format::schema_matches(&matches))
    }

    async fn search_columns(
        &self,
        column_name: &str,
        table_name: Option<&str>,
    ) -> Result<String, CatalogError> {
        let request = ApiRequest::new("/integration/v2/column/").param("name", column_name);
        let table_filter = table_name
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty());

        let columns: Vec<Column> = self
            .records(&request)
            .await?
            .iter()
            .map(Column::from_record)
            .filter(|column| match &table_filter {
                Some(filter) => column.table_key.to_lowercase().contains(filter),
                None => true,
            })
            .take(MAX_COLUMN_MATCHES)
            .collect();

        if columns.is_empty() {
            return Ok(format!("No columns matching `{column_name}` found."));
        }
        Ok(format::columns(&columns, &format!("Columns matching `{column_name}`:")))
    }

    /// v1 and v2 listings can differ in visibility, so both are merged by id.
    async fn data_sources(&self) -> Result<Vec<DataSource>, CatalogError> {
        let mut merged: Vec<DataSource> = Vec::new();
        let mut first_error = None;
        let mut any_listing = false;

        for path in ["/integration/v1/datasource/", "/integration/v2/datasource/"] {
            match self.client.get_optional(&ApiRequest::new(path)).await {
                Ok(payload) => {
                    any_listing = true;
                    let listed = payload.as_ref().map(records).unwrap_or(&[]);
                    for source in listed.iter().map(DataSource::from_record) {
                        let duplicate = source.id.is_some()
                            && merged.iter().any(|existing| existing.id == source.id);
                        if !duplicate {
                            merged.push(source);
                        }
                    }
                }
                Err(error) => {
                    warn!(
                        event_name = "catalog.data_sources.failed",
                        path,
                        error = %error,
                        "data source listing failed"
                    );
                    first_error.get_or_insert(error);
                }
            }
        }

        match first_error {
            Some(error) if !any_listing => Err(error),
            _ => Ok(merged),
        }
    }

    /// Table ids are resolved with progressively looser filters and remembered.
    async fn resolve_table_id(&self, table: &TableRef) -> Result<Option<i64>, CatalogError> {
        let cache_key = format!(
            "{}_{}_{}",
            table.data_source_id,
            collapse_whitespace(&table.schema_name),
            collapse_whitespace(&table.table_name)
        );
        if let Some(id) = self.table_ids_guard().get(&cache_key).copied() {
            return Ok(Some(id));
        }

        let exact = ApiRequest::new("/integration/v2/table/")
            .param("ds_id", table.data_source_id)
            .param("schema_name", &table.schema_name)
            .param("name", &table.table_name);
        let mut table_id = first_id(&self.records(&exact).await?);

        if table_id.is_none() {
            let by_name = ApiRequest::new("/integration/v2/table/")
                .param("ds_id", table.data_source_id)
                .param("name", &table.table_name);
            table_id = first_id(&self.records(&by_name).await?);
        }

        if table_id.is_none() {
            let anywhere =
                ApiRequest::new("/integration/v2/table/").param("name", &table.table_name);
            let candidates = self.records(&anywhere).await?;
            table_id = candidates
                .iter()
                .find(|record| {
                    record
                        .get("name")
                        .and_then(Value::as_str)
                        .is_some_and(|name| name.eq_ignore_ascii_case(&table.table_name))
                })
                .and_then(|record| crate::model::integer(record, "id"))
                .or_else(|| first_id(&candidates));
        }

        match table_id {
            Some(id) => {
                debug!(event_name = "catalog.table_id.resolved", table = %qualified(table), table_id = id, "resolved table id");
                self.table_ids_guard().insert(cache_key, id);
            }
            None => {
                warn!(event_name = "catalog.table_id.missing", table = %qualified(table), "table id not found");
            }
        }
        Ok(table_id)
    }

    /// Records from a primary endpoint. A 404 reads as an empty list.
    async fn records(&self, request: &ApiRequest) -> Result<Vec<Value>, CatalogError> {
        Ok(self
            .client
            .get_optional(request)
            .await?
            .map(|payload| records(&payload).to_vec())
            .unwrap_or_default())
    }

    /// Records from a fallback endpoint that some catalog versions lack or
    /// reject. Only transport failures abort the lookup.
    async fn probe(&self, request: &ApiRequest) -> Result<Vec<Value>, CatalogError> {
        Ok(self
            .probe_value(request)
            .await?
            .map(|payload| records(&payload).to_vec())
            .unwrap_or_default())
    }

    async fn probe_value(&self, request: &ApiRequest) -> Result<Option<Value>, CatalogError> {
        match self.client.get(request).await {
            Ok(payload) => Ok(Some(payload)),
            Err(error) if error.is_retryable() => Err(error),
            Err(error) => {
                debug!(
                    event_name = "catalog.fallback.skipped",
                    path = %request.path,
                    error = %error,
                    "fallback endpoint unavailable"
                );
                Ok(None)
            }
        }
    }

    fn table_ids_guard(&self) -> std::sync::MutexGuard<'_, HashMap<String, i64>> {
        self.table_ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn qualified(table: &TableRef) -> String {
    format!("{}.{}", table.schema_name, table.table_name)
}

fn first_id(found: &[Value]) -> Option<i64> {
    found.first().and_then(|record| crate::model::integer(record, "id"))
}

fn parse_columns(found: &[Value]) -> Vec<Column> {
    found.iter().map(Column::from_record).collect()
}

fn collect_tables(found: &mut Vec<TableSummary>, records: &[Value]) {
    for table in records.iter().map(TableSummary::from_record) {
        let duplicate =
            table.id.is_some() && found.iter().any(|existing| existing.id == table.id);
        if !duplicate {
            found.push(table);
        }
    }
}

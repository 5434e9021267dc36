use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use metabot_catalog::{CatalogError, CatalogLookup, CatalogRequest, TableRef};
use metabot_core::{ToolCall, ToolResult};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::ToolSchema;
use crate::prompts::{invalid_tool_call, tool_failure};

/// The closed set of catalog operations the model may call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CatalogTool {
    SearchTable,
    SearchSchema,
    SearchColumns,
    ListDataSources,
    ListSchemas,
    ListTables,
    GetTableMetadata,
    GetColumnMetadata,
    GetLineage,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ToolError {
    #[error("Unknown tool '{0}'")]
    UnknownTool(String),
    #[error("Invalid arguments for tool '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },
    #[error("{source}")]
    Catalog { tool: String, source: CatalogError },
    #[error("timed out after {}ms", after.as_millis())]
    TimedOut { tool: String, after: Duration },
    #[error("cannot register tool '{name}': {message}")]
    Registration { name: String, message: String },
}

impl ToolError {
    /// Text handed back to the model in place of a result.
    pub fn to_tool_text(&self) -> String {
        match self {
            Self::UnknownTool(_) | Self::InvalidArguments { .. } | Self::Registration { .. } => {
                invalid_tool_call(&self.to_string())
            }
            Self::Catalog { tool, .. } | Self::TimedOut { tool, .. } => {
                tool_failure(tool, &self.to_string())
            }
        }
    }
}

impl CatalogTool {
    pub const ALL: [CatalogTool; 9] = [
        Self::SearchTable,
        Self::SearchSchema,
        Self::SearchColumns,
        Self::ListDataSources,
        Self::ListSchemas,
        Self::ListTables,
        Self::GetTableMetadata,
        Self::GetColumnMetadata,
        Self::GetLineage,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::SearchTable => "search_table",
            Self::SearchSchema => "search_schema",
            Self::SearchColumns => "search_columns",
            Self::ListDataSources => "list_data_sources",
            Self::ListSchemas => "list_schemas",
            Self::ListTables => "list_tables",
            Self::GetTableMetadata => "get_table_metadata",
            Self::GetColumnMetadata => "get_column_metadata",
            Self::GetLineage => "get_lineage",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::SearchTable => {
                "Search for a table by name across ALL data sources. This is the fastest way to find a table when you know its name but not its data source or schema. Use it BEFORE browsing data sources by hand."
            }
            Self::SearchSchema => {
                "Search for schemas whose name contains a keyword, across all data sources. Returns each match with its data source id."
            }
            Self::SearchColumns => {
                "Search for columns by name across the catalog. Optionally restrict the search to tables whose name contains table_name."
            }
            Self::ListDataSources => {
                "List every data source in the catalog with its id, type and description."
            }
            Self::ListSchemas => "List the schemas of one data source.",
            Self::ListTables => "List the tables of one schema in a data source.",
            Self::GetTableMetadata => {
                "Get the description, owner, steward, certification, trust status and last update time of one table."
            }
            Self::GetColumnMetadata => {
                "Get the columns of one table with their data types and descriptions."
            }
            Self::GetLineage => {
                "Get the upstream and downstream tables of one table and its transformation context."
            }
        }
    }

    pub fn input_schema(self) -> Value {
        let data_source_id = json!({
            "type": "integer",
            "description": "Numeric id of the data source, as returned by list_data_sources or search_table."
        });
        let schema_name = json!({"type": "string", "description": "Exact schema name."});
        let table_name = json!({"type": "string", "description": "Exact table name."});

        let (properties, required): (Value, Vec<&str>) = match self {
            Self::SearchTable => (
                json!({"table_name": {"type": "string", "description": "Table name or part of it."}}),
                vec!["table_name"],
            ),
            Self::SearchSchema => (
                json!({"keyword": {"type": "string", "description": "Text the schema name contains."}}),
                vec!["keyword"],
            ),
            Self::SearchColumns => (
                json!({
                    "column_name": {"type": "string", "description": "Column name or part of it."},
                    "table_name": {"type": "string", "description": "Optional table name filter."}
                }),
                vec!["column_name"],
            ),
            Self::ListDataSources => (json!({}), Vec::new()),
            Self::ListSchemas => (json!({"data_source_id": data_source_id}), vec!["data_source_id"]),
            Self::ListTables => (
                json!({"data_source_id": data_source_id, "schema_name": schema_name}),
                vec!["data_source_id", "schema_name"],
            ),
            Self::GetTableMetadata | Self::GetColumnMetadata | Self::GetLineage => (
                json!({
                    "data_source_id": data_source_id,
                    "schema_name": schema_name,
                    "table_name": table_name
                }),
                vec!["data_source_id", "schema_name", "table_name"],
            ),
        };

        json!({"type": "object", "properties": properties, "required": required})
    }

    /// Turns raw model arguments into a validated catalog request.
    pub fn parse(self, arguments: &Value) -> Result<CatalogRequest, ToolError> {
        let empty = Map::new();
        let args = match arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => return Err(self.invalid("arguments must be a JSON object")),
        };

        let request = match self {
            Self::SearchTable => CatalogRequest::SearchTable {
                table_name: self.string(args, "table_name")?,
            },
            Self::SearchSchema => CatalogRequest::SearchSchema {
                keyword: self.string(args, "keyword")?,
            },
            Self::SearchColumns => CatalogRequest::SearchColumns {
                column_name: self.string(args, "column_name")?,
                table_name: self.optional_string(args, "table_name")?,
            },
            Self::ListDataSources => CatalogRequest::ListDataSources,
            Self::ListSchemas => CatalogRequest::ListSchemas {
                data_source_id: self.data_source_id(args)?,
            },
            Self::ListTables => CatalogRequest::ListTables {
                data_source_id: self.data_source_id(args)?,
                schema_name: self.string(args, "schema_name")?,
            },
            Self::GetTableMetadata => CatalogRequest::GetTableMetadata(self.table_ref(args)?),
            Self::GetColumnMetadata => CatalogRequest::GetColumnMetadata(self.table_ref(args)?),
            Self::GetLineage => CatalogRequest::GetLineage(self.table_ref(args)?),
        };

        request.validate().map_err(|error| self.invalid(error.to_string()))?;
        Ok(request)
    }

    pub fn schema(self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }

    fn invalid(self, message: impl Into<String>) -> ToolError {
        ToolError::InvalidArguments { tool: self.name().to_string(), message: message.into() }
    }

    fn string(self, args: &Map<String, Value>, field: &str) -> Result<String, ToolError> {
        self.optional_string(args, field)?
            .ok_or_else(|| self.invalid(format!("missing required argument `{field}`")))
    }

    fn optional_string(
        self,
        args: &Map<String, Value>,
        field: &str,
    ) -> Result<Option<String>, ToolError> {
        match args.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) if value.trim().is_empty() => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.trim().to_string())),
            Some(_) => Err(self.invalid(format!("`{field}` must be a string"))),
        }
    }

    fn data_source_id(self, args: &Map<String, Value>) -> Result<i64, ToolError> {
        let parsed = match args.get("data_source_id") {
            Some(Value::Number(number)) => number.as_i64(),
            Some(Value::String(raw)) => raw.trim().parse().ok(),
            None | Some(Value::Null) => {
                return Err(self.invalid("missing required argument `data_source_id`"))
            }
            Some(_) => None,
        };
        parsed.ok_or_else(|| self.invalid("`data_source_id` must be an integer"))
    }

    fn table_ref(self, args: &Map<String, Value>) -> Result<TableRef, ToolError> {
        Ok(TableRef {
            data_source_id: self.data_source_id(args)?,
            schema_name: self.string(args, "schema_name")?,
            table_name: self.string(args, "table_name")?,
        })
    }
}

/// Tool names mapped to catalog operations, sharing one lookup backend.
pub struct ToolRegistry {
    tools: HashMap<String, CatalogTool>,
    catalog: Arc<dyn CatalogLookup>,
    call_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(catalog: Arc<dyn CatalogLookup>, call_timeout: Duration) -> Self {
        Self { tools: HashMap::new(), catalog, call_timeout }
    }

    /// Registry exposing all nine catalog operations under their own names.
    pub fn with_catalog_tools(
        catalog: Arc<dyn CatalogLookup>,
        call_timeout: Duration,
    ) -> Result<Self, ToolError> {
        let mut registry = Self::new(catalog, call_timeout);
        for tool in CatalogTool::ALL {
            registry.register(tool.name(), tool)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, name: impl Into<String>, tool: CatalogTool) -> Result<(), ToolError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ToolError::Registration { name, message: "name is empty".to_string() });
        }
        if self.tools.contains_key(&name) {
            return Err(ToolError::Registration {
                name,
                message: "name is already registered".to_string(),
            });
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Schemas sorted by name so every request advertises tools in the same order.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .iter()
            .map(|(name, tool)| ToolSchema { name: name.clone(), ..tool.schema() })
            .collect();
        schemas.sort_by(|left, right| left.name.cmp(&right.name));
        schemas
    }

    /// Runs every call concurrently and returns one result per call, in call order.
    pub async fn dispatch(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        join_all(calls.iter().map(|call| self.invoke(call))).await
    }

    async fn invoke(&self, call: &ToolCall) -> ToolResult {
        match self.execute(call).await {
            Ok(text) => {
                debug!(event_name = "tool.completed", tool = %call.name, call_id = %call.id, "tool call completed");
                ToolResult::success(call, text)
            }
            Err(error) => {
                warn!(
                    event_name = "tool.failed",
                    tool = %call.name,
                    call_id = %call.id,
                    error = %error,
                    "tool call failed"
                );
                ToolResult::failure(call, error.to_tool_text())
            }
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .copied()
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;
        let request = tool.parse(&call.arguments)?;

        match tokio::time::timeout(self.call_timeout, self.catalog.lookup(&request)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(source)) => Err(ToolError::Catalog { tool: call.name.clone(), source }),
            Err(_) => Err(ToolError::TimedOut { tool: call.name.clone(), after: self.call_timeout }),
        }
    }
}

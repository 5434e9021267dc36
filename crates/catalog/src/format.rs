//! Display-ready text for tool results. Identifiers are wrapped in backticks and
//! headers use chat `*bold*` so the model can pass them through unchanged.

use crate::markup::first_sentence;
use crate::model::{Column, DataSource, Lineage, Schema, TableDetail, TableSummary};
use crate::UNKNOWN;

fn id_text(id: Option<i64>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "?".to_string())
}

pub fn data_sources(sources: &[DataSource]) -> String {
    let mut lines = vec![format!("Found {} data source(s):\n", sources.len())];
    for source in sources {
        lines.push(format!(
            "• `{}` (ID: {}) | Type: `{}` | {}",
            source.name,
            id_text(source.id),
            source.db_type,
            first_sentence(&source.description, 120)
        ));
    }
    lines.join("\n")
}

pub fn schemas(schemas: &[Schema], data_source_id: i64) -> String {
    let mut lines =
        vec![format!("Found {} schema(s) in data source {}:\n", schemas.len(), data_source_id)];
    for schema in schemas {
        lines.push(format!(
            "• `{}` | {}",
            schema.name,
            first_sentence(&schema.description, 120)
        ));
    }
    lines.join("\n")
}

pub fn tables(tables: &[TableSummary], schema_name: &str) -> String {
    let mut lines = vec![format!("Found {} table(s) in `{}`:\n", tables.len(), schema_name)];
    for table in tables {
        let suffix = if table.table_type == UNKNOWN {
            String::new()
        } else {
            format!(" ({})", table.table_type)
        };
        lines.push(format!("• `{}`{}", table.name, suffix));
    }
    lines.join("\n")
}

pub fn table_detail(detail: &TableDetail) -> String {
    [
        format!("*Table:* `{}`\n", detail.name),
        format!("• *Description:* {}", detail.description),
        format!("• *Owner:* `{}`", detail.owner),
        format!("• *Steward:* `{}`", detail.steward),
        format!("• *Certification:* {}", detail.certification),
        format!("• *Trust Status:* {}", detail.trust_status),
        format!("• *Last Updated:* {}", detail.last_updated),
    ]
    .join("\n")
}

pub fn columns(columns: &[Column], context: &str) -> String {
    if columns.is_empty() {
        return "No columns found.".to_string();
    }

    let mut lines = vec![context.to_string(), String::new()];
    for column in columns {
        let mut entry = format!("• `{}` | `{}`", column.name, column.data_type);
        let description = first_sentence(&column.description, 150);
        if description != UNKNOWN {
            entry.push_str(&format!("\n  _{description}_"));
        }
        lines.push(entry);
    }
    lines.push(format!("\n_{} column(s) total_", columns.len()));
    lines.join("\n")
}

pub fn lineage(lineage: &Lineage, table_name: &str) -> String {
    let mut lines = vec![format!("*Lineage for* `{table_name}`:\n")];

    lines.push("*Upstream Tables:*".to_string());
    push_nodes(&mut lines, &lineage.upstream);

    lines.push("\n*Downstream Tables:*".to_string());
    push_nodes(&mut lines, &lineage.downstream);

    lines.push(format!(
        "\n*Transformation Context:* {}",
        first_sentence(&lineage.transformation, 200)
    ));
    lines.join("\n")
}

fn push_nodes(lines: &mut Vec<String>, nodes: &[String]) {
    if nodes.is_empty() {
        lines.push(format!("  {UNKNOWN}"));
    }
    for node in nodes {
        lines.push(format!("  • `{node}`"));
    }
}

pub fn table_matches(matches: &[TableSummary]) -> String {
    let mut lines = vec![format!("Found {} table(s):\n", matches.len())];
    for table in matches {
        let mut entry = format!(
            "• `{}` | Schema: `{}` (DS ID: {})",
            table.name,
            table.schema_name,
            id_text(table.data_source_id)
        );
        let description = first_sentence(&table.description, 120);
        if description != UNKNOWN {
            entry.push_str(&format!("\n  _{description}_"));
        }
        lines.push(entry);
    }
    lines.join("\n")
}

pub struct SchemaMatch {
    pub schema: Schema,
    pub data_source_id: i64,
    pub data_source_name: String,
}

pub fn schema_matches(matches: &[SchemaMatch]) -> String {
    let mut lines = vec![format!("Found {} schema(s):\n", matches.len())];
    for found in matches {
        lines.push(format!(
            "• `{}` in `{}` (DS ID: {}) | {}",
            found.schema.name,
            found.data_source_name,
            found.data_source_id,
            first_sentence(&found.schema.description, 120)
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::{columns, lineage, table_detail, tables};
    use crate::model::{Column, Lineage, TableDetail, TableSummary};

    fn column(name: &str, description: &str) -> Column {
        Column {
            name: name.to_string(),
            data_type: "NUMBER".to_string(),
            description: description.to_string(),
            table_key: "1.PUBLIC.ORDERS".to_string(),
        }
    }

    #[test]
    fn table_detail_backticks_people() {
        let text = table_detail(&TableDetail {
            name: "ORDERS".to_string(),
            description: "One row per order.".to_string(),
            owner: "data-eng".to_string(),
            steward: "unknown".to_string(),
            certification: "unknown".to_string(),
            trust_status: "endorsed".to_string(),
            last_updated: "2024-05-01".to_string(),
        });
        assert!(text.starts_with("*Table:* `ORDERS`"));
        assert!(text.contains("• *Owner:* `data-eng`"));
        assert!(text.contains("• *Trust Status:* endorsed"));
    }

    #[test]
    fn columns_skip_unknown_descriptions() {
        let text = columns(
            &[column("ID", "Primary key. Generated upstream."), column("AMOUNT", "unknown")],
            "Columns for `PUBLIC`.`ORDERS`:",
        );
        assert!(text.contains("• `ID` | `NUMBER`\n  _Primary key._"));
        assert!(text.contains("• `AMOUNT` | `NUMBER`\n\n_2 column(s) total_"));
        assert!(text.ends_with("_2 column(s) total_"));
    }

    #[test]
    fn empty_lineage_sides_say_unknown() {
        let text = lineage(
            &Lineage {
                upstream: vec!["1.RAW.ORDERS".to_string()],
                downstream: Vec::new(),
                transformation: "unknown".to_string(),
            },
            "ORDERS",
        );
        assert!(text.contains("*Upstream Tables:*\n  • `1.RAW.ORDERS`"));
        assert!(text.contains("*Downstream Tables:*\n  unknown"));
        assert!(text.ends_with("*Transformation Context:* unknown"));
    }

    #[test]
    fn table_type_suffix_is_omitted_when_unknown() {
        let summary = |table_type: &str| TableSummary {
            id: Some(1),
            name: "ORDERS".to_string(),
            data_source_id: Some(1),
            schema_name: "PUBLIC".to_string(),
            table_type: table_type.to_string(),
            description: "unknown".to_string(),
        };
        let text = tables(&[summary("VIEW"), summary("unknown")], "PUBLIC");
        assert!(text.contains("• `ORDERS` (VIEW)"));
        assert!(text.ends_with("• `ORDERS`"));
    }
}

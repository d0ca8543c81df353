use std::{fmt::Write as _, fs, path::Path};

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use tracing::info;

use crate::{
    graph::SchemaGraph,
    loader::{SchemaData, export_schema, load_schema},
};

/// Reads a schema load payload from a `.json` file.
pub fn read_schema_file(path: &Path) -> Result<SchemaData> {
    if !path.exists() {
        bail!("File does not exist: {}", path.display());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    let data: SchemaData = serde_json::from_str(&content)
        .with_context(|| format!("Invalid schema payload in file: {}", path.display()))?;
    info!(
        tables = data.tables.len(),
        relationships = data.relationships.len(),
        "read {}",
        path.display()
    );
    Ok(data)
}

pub fn load_schema_file(path: &Path) -> Result<SchemaGraph> {
    Ok(load_schema(&read_schema_file(path)?))
}

/// Loads then re-derives the payload.
pub fn export_schema_file(path: &Path) -> Result<String> {
    let graph = load_schema_file(path)?;
    Ok(serde_json::to_string_pretty(&export_schema(&graph))?)
}

pub fn graph_json(graph: &SchemaGraph) -> Value {
    json!({
        "nodes": graph.nodes(),
        "edges": graph.edges(),
        "revision": graph.revision(),
    })
}

/// Human-readable overview: one line per table, one per relationship, then any violations.
pub fn summary(graph: &SchemaGraph) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} tables, {} relationships",
        graph.nodes().len(),
        graph.edges().len()
    );
    for node in graph.nodes() {
        let fks = node.data.columns.iter().filter(|c| c.is_foreign_key).count();
        let _ = writeln!(
            out,
            "  table {} ({}) fields={} fk={}",
            node.id,
            node.data.table_name,
            node.data.columns.len(),
            fks
        );
    }
    for edge in graph.edges() {
        let _ = writeln!(out, "  edge {} [{}]", edge.id, edge.data.relationship_type);
    }
    let violations = graph.violations();
    if violations.is_empty() {
        out.push_str("no violations\n");
    } else {
        for v in violations {
            let _ = writeln!(out, "  violation: {v}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PAYLOAD: &str = r#"{
        "tables": [
            {"id": "t1", "name": "User", "columns": [{"name": "id", "type": "uuid", "isPrimaryKey": true}]},
            {"id": "t2", "name": "Order", "columns": [
                {"name": "id", "type": "uuid", "isPrimaryKey": true},
                {"name": "user_id", "type": "uuid"}
            ]}
        ],
        "relationships": [
            {"type": "array", "relationshipType": "1-n", "sourceNodeId": "t1", "targetNodeId": "t2",
             "sourceKey": "id", "targetKey": "user_id", "fieldName": "orders"}
        ]
    }"#;

    #[test]
    fn load_and_summarize() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schema.json");
        fs::write(&path, PAYLOAD).unwrap();

        let graph = load_schema_file(&path).unwrap();
        let text = summary(&graph);
        assert!(text.starts_with("2 tables, 1 relationships"));
        assert!(text.contains("table node_t2 (order) fields=2 fk=1"));
        assert!(text.contains("edge node_t1-orders-to-node_t2-user_id [1-n]"));
        assert!(text.ends_with("no violations\n"));

        let json = graph_json(&graph);
        assert_eq!(json["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(json["edges"][0]["sourceHandle"], "orders");
    }

    #[test]
    fn export_restores_external_ids() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schema.json");
        fs::write(&path, PAYLOAD).unwrap();

        let exported: Value = serde_json::from_str(&export_schema_file(&path).unwrap()).unwrap();
        assert_eq!(exported["tables"][0]["id"], "t1");
        assert_eq!(exported["relationships"][0]["sourceNodeId"], "t1");
        assert_eq!(exported["relationships"][0]["fieldName"], "orders");
    }

    #[test]
    fn bad_files_are_errors() {
        let dir = tempdir().unwrap();
        assert!(read_schema_file(&dir.path().join("missing.json")).is_err());

        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let err = read_schema_file(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid schema payload"));
    }
}

// src/loader.rs
//
// Turns the host's schema description into a graph and back. Tables are keyed by the host's
// external id; a table listed more than once becomes one replica per occurrence.

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    graph::{LinkForm, LinkRequest, SchemaGraph},
    model::{Field, Position, RelationshipType, TableData, TableNode, default_table_name, palette_color},
};

const REPLICA_MARKER: &str = "_replica_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SchemaData {
    #[serde(default)]
    pub tables: Vec<TableDescriptor>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TableDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default)]
    pub columns: Vec<ColumnDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_primary_key: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_foreign_key: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_not_null: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_virtual: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_ref: Option<bool>,
    /// Name of the referenced type, for `isRef` columns.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ColumnDescriptor>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    #[serde(alias = "Array", alias = "ARRAY")]
    Array,
    #[serde(alias = "Object", alias = "OBJECT")]
    Object,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipDescriptor {
    #[serde(rename = "type")]
    pub kind: RelationshipKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_type: Option<RelationshipType>,
    pub source_node_id: String,
    pub target_node_id: String,
    pub source_key: String,
    pub target_key: String,
    pub field_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_replica_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_replica_index: Option<usize>,
}

/// Local id of the `index`-th replica of external table `external_id`.
pub fn replica_id(external_id: &str, index: usize) -> String {
    if index == 0 {
        format!("node_{external_id}")
    } else {
        format!("node_{external_id}{REPLICA_MARKER}{index}")
    }
}

/// Inverse of [`replica_id`]. Ids not minted by the loader come back unchanged as replica 0.
pub fn split_replica_id(local_id: &str) -> (&str, usize) {
    let Some(rest) = local_id.strip_prefix("node_") else {
        return (local_id, 0);
    };
    if let Some((base, idx)) = rest.rsplit_once(REPLICA_MARKER) {
        if let Ok(idx) = idx.parse::<usize>() {
            if idx > 0 && !base.is_empty() {
                return (base, idx);
            }
        }
    }
    (rest, 0)
}

impl ColumnDescriptor {
    fn to_field(&self) -> Field {
        let mut field = Field::new(&self.name, &self.column_type);
        field.is_primary_key = self.is_primary_key.unwrap_or(false);
        field.is_foreign_key = self.is_foreign_key.unwrap_or(false);
        field.is_not_null = self.is_not_null.unwrap_or(false);
        field.visible = self.visible.unwrap_or(true);
        field.is_virtual = self.is_virtual.unwrap_or(false);
        field.is_ref = self.is_ref.unwrap_or(false);
        field.description = self.reference.as_ref().map(|r| format!("ref:{r}"));
        field.children = self
            .children
            .as_ref()
            .map(|children| children.iter().map(Self::to_field).collect());
        field
    }

    fn from_field(field: &Field) -> Self {
        let flag = |v: bool| v.then_some(true);
        Self {
            name: field.name.clone(),
            column_type: field.field_type.clone(),
            is_primary_key: flag(field.is_primary_key),
            is_foreign_key: flag(field.is_foreign_key),
            is_not_null: flag(field.is_not_null),
            visible: (!field.visible).then_some(false),
            is_virtual: flag(field.is_virtual),
            is_ref: flag(field.is_ref),
            reference: field
                .description
                .as_deref()
                .and_then(|d| d.strip_prefix("ref:"))
                .map(str::to_string),
            children: field
                .children
                .as_ref()
                .map(|children| children.iter().map(Self::from_field).collect()),
        }
    }
}

/// Builds a fresh graph from a host description.
///
/// Relationships naming tables that do not exist are skipped with a warning; an out-of-range
/// replica index falls back to the first replica.
pub fn load_schema(data: &SchemaData) -> SchemaGraph {
    let mut graph = SchemaGraph::new();
    let mut replicas: HashMap<&str, Vec<String>> = HashMap::new();

    for (i, table) in data.tables.iter().enumerate() {
        let seen = replicas.entry(table.id.as_str()).or_default();
        let id = replica_id(&table.id, seen.len());
        seen.push(id.clone());

        graph.push_node(TableNode {
            id,
            node_type: "table".into(),
            position: table.position.unwrap_or_default(),
            data: TableData {
                table_name: table
                    .table_name
                    .clone()
                    .unwrap_or_else(|| default_table_name(&table.name)),
                label: table.name.clone(),
                columns: table.columns.iter().map(ColumnDescriptor::to_field).collect(),
                color: Some(palette_color(i)),
                is_active: true,
                revision: 0,
            },
        });
    }

    let resolve = |external: &str, index: Option<usize>, graph: &SchemaGraph| -> Option<String> {
        match replicas.get(external) {
            Some(ids) => {
                let idx = index.unwrap_or(0);
                let picked = ids.get(idx).or_else(|| ids.first()).cloned();
                if idx >= ids.len() {
                    warn!(table = external, index = idx, "replica index out of range, using first replica");
                }
                picked
            }
            // hosts sometimes echo local ids back
            None => graph.contains_node(external).then(|| external.to_string()),
        }
    };

    for rel in &data.relationships {
        let source = resolve(&rel.source_node_id, rel.source_replica_index, &graph);
        let target = resolve(&rel.target_node_id, rel.target_replica_index, &graph);
        let (Some(source), Some(target)) = (source, target) else {
            warn!(
                source = %rel.source_node_id,
                target = %rel.target_node_id,
                field = %rel.field_name,
                "relationship names an unknown table, skipped"
            );
            continue;
        };
        materialize(&mut graph, rel, &source, &target);
    }

    debug!(
        tables = graph.nodes().len(),
        edges = graph.edges().len(),
        "schema loaded"
    );
    graph
}

fn materialize(graph: &mut SchemaGraph, rel: &RelationshipDescriptor, source: &str, target: &str) {
    let form = match rel.kind {
        RelationshipKind::Array => LinkForm::Array,
        RelationshipKind::Object => LinkForm::Object,
    };
    graph.materialize_link(
        form,
        &LinkRequest {
            source_node_id: source.to_string(),
            target_node_id: target.to_string(),
            source_key: rel.source_key.clone(),
            target_key: rel.target_key.clone(),
            field_name: rel.field_name.clone(),
            relationship_type: rel.relationship_type,
        },
        false,
    );
}

/// Describes `graph` the way a host would, recovering external ids and replica indices
/// from local ids.
pub fn export_schema(graph: &SchemaGraph) -> SchemaData {
    let tables = graph
        .nodes()
        .iter()
        .map(|node| {
            let (external, _) = split_replica_id(&node.id);
            TableDescriptor {
                id: external.to_string(),
                name: node.data.label.clone(),
                table_name: Some(node.data.table_name.clone()),
                position: Some(node.position),
                columns: node.data.columns.iter().map(ColumnDescriptor::from_field).collect(),
            }
        })
        .collect();

    let relationships = graph
        .edges()
        .iter()
        .filter_map(|edge| {
            let field = graph.field(&edge.source, &edge.source_handle);
            let kind = match field {
                Some(f) if f.is_object() || edge.data.object_field_name.is_some() => RelationshipKind::Object,
                _ => RelationshipKind::Array,
            };
            let source_key = match kind {
                RelationshipKind::Array => field.and_then(|f| f.linked_primary_key_field.clone()),
                RelationshipKind::Object => edge
                    .data
                    .source_fk
                    .clone()
                    .or_else(|| field.and_then(|f| f.linked_foreign_key_field.clone())),
            };
            let Some(source_key) = source_key else {
                warn!(edge = %edge.id, "edge without a source key is not exported");
                return None;
            };
            let (source_ext, source_idx) = split_replica_id(&edge.source);
            let (target_ext, target_idx) = split_replica_id(&edge.target);
            Some(RelationshipDescriptor {
                kind,
                relationship_type: Some(edge.data.relationship_type),
                source_node_id: source_ext.to_string(),
                target_node_id: target_ext.to_string(),
                source_key,
                target_key: edge.target_handle.clone(),
                field_name: edge
                    .data
                    .object_field_name
                    .clone()
                    .unwrap_or_else(|| edge.source_handle.clone()),
                source_replica_index: (source_idx > 0).then_some(source_idx),
                target_replica_index: (target_idx > 0).then_some(target_idx),
            })
        })
        .collect();

    SchemaData {
        tables,
        relationships,
    }
}

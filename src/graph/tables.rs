// src/graph/tables.rs

use std::collections::HashSet;

use petgraph::{graphmap::DiGraphMap, visit::Bfs};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::SchemaGraph;
use crate::model::{Field, FieldKey, Position, TableData, TableNode, TablePatch, default_table_name, palette_color};

/// Payload for a new table. `name` is the display label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewTable {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub columns: Vec<Field>,
    #[serde(default)]
    pub position: Option<Position>,
}

impl NewTable {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            table_name: None,
            columns: Vec::new(),
            position: None,
        }
    }
}

impl SchemaGraph {
    /// Appends a table and returns its id. Colour comes from the palette by node count; a
    /// missing `tableName` is derived from the label. Incoming fields start visible.
    pub fn add_table(&mut self, table: NewTable) -> String {
        let count = self.nodes.len();
        let id = table
            .id
            .unwrap_or_else(|| format!("node_{}", uuid::Uuid::new_v4().simple()));
        let table_name = table
            .table_name
            .unwrap_or_else(|| default_table_name(&table.name));
        self.push_node(TableNode {
            id: id.clone(),
            node_type: "table".into(),
            position: table.position.unwrap_or_else(|| Position::grid_slot(count)),
            data: TableData {
                table_name,
                label: table.name,
                columns: table
                    .columns
                    .into_iter()
                    .map(|mut c| {
                        c.visible = true;
                        c
                    })
                    .collect(),
                color: Some(palette_color(count)),
                is_active: true,
                revision: 0,
            },
        });
        debug!(table = %id, "table added");
        id
    }

    pub fn update_table(&mut self, id: &str, patch: &TablePatch) -> bool {
        self.touch_node(id, |node| patch.apply(&mut node.data)).is_some()
    }

    /// Ids removed by deleting `root`: the root plus everything reachable from it along
    /// outgoing edges. Empty when `root` is not a table in the graph.
    pub fn cascade_set(&self, root: &str) -> HashSet<String> {
        if !self.contains_node(root) {
            return HashSet::new();
        }
        let mut g: DiGraphMap<&str, ()> = DiGraphMap::new();
        g.add_node(root);
        for edge in &self.edges {
            g.add_edge(edge.source.as_str(), edge.target.as_str(), ());
        }
        let mut bfs = Bfs::new(&g, root);
        let mut out = HashSet::new();
        while let Some(id) = bfs.next(&g) {
            out.insert(id.to_string());
        }
        out
    }

    /// Deletes `root` and every table reachable from it along outgoing edges, plus every edge
    /// touching a removed table. Returns the removed table ids in graph order.
    pub fn delete_table(&mut self, root: &str) -> Vec<String> {
        let doomed = self.cascade_set(root);
        if doomed.is_empty() {
            return Vec::new();
        }

        // FK flags on surviving tables may lose their only designating edge
        let candidates: Vec<FieldKey> = self
            .edges
            .iter()
            .filter(|e| doomed.contains(&e.source) || doomed.contains(&e.target))
            .filter_map(|e| e.foreign_key_side())
            .filter(|k| !doomed.contains(&k.node_id))
            .collect();

        let removed: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| doomed.contains(&n.id))
            .map(|n| n.id.clone())
            .collect();
        self.nodes.retain(|n| !doomed.contains(&n.id));
        self.edges
            .retain(|e| !doomed.contains(&e.source) && !doomed.contains(&e.target));
        self.reconcile_foreign_keys(candidates);

        debug!(root, removed = removed.len(), "table cascade");
        removed
    }
}

// src/graph/mod.rs
//
// The schema graph: tables as nodes, relationships as edges between fields. All structural
// edits go through the methods in the sibling modules so cascades stay in one place.

use std::{collections::HashSet, fmt};

use crate::model::{Edge, Field, FieldKey, TableNode};

mod fields;
mod links;
mod tables;

pub use fields::FieldRemoval;
pub use links::{LinkForm, LinkRequest};
pub use tables::NewTable;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaGraph {
    nodes: Vec<TableNode>,
    edges: Vec<Edge>,
    revision: u64,
}

impl SchemaGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[TableNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Last revision handed out; strictly increases across every node mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn node(&self, id: &str) -> Option<&TableNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn field(&self, node_id: &str, name: &str) -> Option<&Field> {
        self.node(node_id).and_then(|n| n.data.field(name))
    }

    /// Replaces the node list wholesale. Nodes keep the revision they arrive with; the counter
    /// moves past the highest one seen.
    pub fn set_nodes(&mut self, nodes: Vec<TableNode>) {
        let highest = nodes.iter().map(|n| n.data.revision).max().unwrap_or(0);
        self.revision = self.revision.max(highest);
        self.nodes = nodes;
    }

    pub fn set_edges(&mut self, edges: Vec<Edge>) {
        self.edges = edges;
    }

    /// Swaps in another graph. Its revisions are shifted past everything handed out so far.
    pub fn replace_with(&mut self, other: SchemaGraph) {
        let floor = self.revision;
        *self = other;
        for node in &mut self.nodes {
            node.data.revision += floor;
        }
        self.revision += floor;
    }

    pub(crate) fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    /// Runs `f` on a node and stamps it with a fresh revision. `None` if the node is unknown.
    pub(crate) fn touch_node<R>(&mut self, id: &str, f: impl FnOnce(&mut TableNode) -> R) -> Option<R> {
        let idx = self.nodes.iter().position(|n| n.id == id)?;
        let rev = self.next_revision();
        let node = &mut self.nodes[idx];
        let out = f(node);
        node.data.revision = rev;
        Some(out)
    }

    pub(crate) fn push_node(&mut self, mut node: TableNode) {
        node.data.revision = self.next_revision();
        self.nodes.push(node);
    }

    /// Every field some edge names as its foreign-key side.
    pub fn designated_foreign_keys(&self) -> HashSet<FieldKey> {
        self.edges.iter().filter_map(Edge::foreign_key_side).collect()
    }

    /// Sets one field's flag to whether any edge designates it.
    pub(crate) fn sync_foreign_key(&mut self, key: FieldKey) {
        if self.designated_foreign_keys().contains(&key) {
            self.mark_foreign_key(&key);
        } else {
            self.reconcile_foreign_keys([key]);
        }
    }

    /// Clears `isForeignKey` on every candidate no surviving edge still designates.
    pub(crate) fn reconcile_foreign_keys<I>(&mut self, candidates: I)
    where
        I: IntoIterator<Item = FieldKey>,
    {
        let designated = self.designated_foreign_keys();
        for key in candidates {
            if designated.contains(&key) {
                continue;
            }
            let needs_clear = self
                .field(&key.node_id, &key.field)
                .is_some_and(|f| f.is_foreign_key);
            if needs_clear {
                self.touch_node(&key.node_id, |node| {
                    if let Some(f) = node.data.field_mut(&key.field) {
                        f.is_foreign_key = false;
                    }
                });
            }
        }
    }

    pub(crate) fn mark_foreign_key(&mut self, key: &FieldKey) {
        let needs_set = self
            .field(&key.node_id, &key.field)
            .is_some_and(|f| !f.is_foreign_key);
        if needs_set {
            self.touch_node(&key.node_id, |node| {
                if let Some(f) = node.data.field_mut(&key.field) {
                    f.is_foreign_key = true;
                }
            });
        }
    }

    /// Structural problems in the current graph. Empty when every invariant holds.
    pub fn violations(&self) -> Vec<Violation> {
        let mut out = Vec::new();

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                out.push(Violation::DuplicateTable(node.id.clone()));
            }
            let mut names = HashSet::new();
            for field in &node.data.columns {
                if !names.insert(field.name.as_str()) {
                    out.push(Violation::DuplicateField(FieldKey::new(&node.id, &field.name)));
                }
            }
        }

        for edge in &self.edges {
            for (end, handle) in [(&edge.source, &edge.source_handle), (&edge.target, &edge.target_handle)] {
                let Some(node) = self.node(end) else {
                    out.push(Violation::DanglingEndpoint {
                        edge: edge.id.clone(),
                        node: end.clone(),
                    });
                    continue;
                };
                if !handle.is_empty() && node.data.field(handle).is_none() {
                    out.push(Violation::DanglingHandle {
                        edge: edge.id.clone(),
                        field: FieldKey::new(end, handle),
                    });
                }
            }
        }

        let designated = self.designated_foreign_keys();
        for node in &self.nodes {
            for field in node.data.columns.iter().filter(|f| f.is_foreign_key) {
                let key = FieldKey::new(&node.id, &field.name);
                if !designated.contains(&key) {
                    out.push(Violation::UndesignatedForeignKey(key));
                }
            }
        }

        let mut reported = HashSet::new();
        for key in self.edges.iter().filter_map(Edge::foreign_key_side) {
            let unflagged = self
                .field(&key.node_id, &key.field)
                .is_some_and(|f| !f.is_foreign_key);
            if unflagged && reported.insert(key.clone()) {
                out.push(Violation::MissingForeignKeyFlag(key));
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    DuplicateTable(String),
    DuplicateField(FieldKey),
    DanglingEndpoint { edge: String, node: String },
    DanglingHandle { edge: String, field: FieldKey },
    UndesignatedForeignKey(FieldKey),
    MissingForeignKeyFlag(FieldKey),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::DuplicateTable(id) => write!(f, "duplicate table id {id}"),
            Violation::DuplicateField(key) => write!(f, "duplicate field {key}"),
            Violation::DanglingEndpoint { edge, node } => {
                write!(f, "edge {edge} points at missing table {node}")
            }
            Violation::DanglingHandle { edge, field } => {
                write!(f, "edge {edge} points at missing field {field}")
            }
            Violation::UndesignatedForeignKey(key) => {
                write!(f, "{key} is flagged as a foreign key but no edge designates it")
            }
            Violation::MissingForeignKeyFlag(key) => {
                write!(f, "{key} is designated as a foreign key but not flagged")
            }
        }
    }
}

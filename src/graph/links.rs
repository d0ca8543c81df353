// src/graph/links.rs

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::SchemaGraph;
use crate::model::{Edge, EdgeData, Field, FieldKey, RelationshipType};

/// Shape of the field a link materializes on the source table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LinkForm {
    /// Virtual array grouping far-side rows by a local key (one-to-many).
    Array,
    /// Object field resolving a local foreign key to one far-side row.
    Object,
}

impl LinkForm {
    pub fn default_relationship(self) -> RelationshipType {
        match self {
            LinkForm::Array => RelationshipType::OneToMany,
            LinkForm::Object => RelationshipType::ManyToOne,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest {
    pub source_node_id: String,
    pub target_node_id: String,
    /// Array form: the local key rows are grouped by. Object form: the local foreign key.
    pub source_key: String,
    /// The key on the far table the link lands on.
    pub target_key: String,
    pub field_name: String,
    #[serde(default)]
    pub relationship_type: Option<RelationshipType>,
}

impl SchemaGraph {
    /// Materializes a relationship: upserts the relationship field on the source table and the
    /// edge carrying it, then moves the foreign-key flag to the side the edge designates.
    ///
    /// Returns the edge id, or `None` when either table is unknown.
    pub fn confirm_link(&mut self, form: LinkForm, link: &LinkRequest) -> Option<String> {
        if !self.contains_node(&link.source_node_id) || !self.contains_node(&link.target_node_id) {
            warn!(
                source = %link.source_node_id,
                target = %link.target_node_id,
                "link between unknown tables ignored"
            );
            return None;
        }
        let edge_id = self.materialize_link(form, link, true);

        // the opposite key stops being a foreign key unless another edge still says so
        let cleared = match form {
            LinkForm::Array => FieldKey::new(&link.source_node_id, &link.source_key),
            LinkForm::Object => FieldKey::new(&link.target_node_id, &link.target_key),
        };
        self.reconcile_foreign_keys([cleared]);

        debug!(edge = %edge_id, ?form, "link confirmed");
        Some(edge_id)
    }

    /// Upserts the relationship field and its edge and flags the designated key. Both tables
    /// must exist. A replaced field keeps its visibility only with `keep_visibility`.
    pub(crate) fn materialize_link(&mut self, form: LinkForm, link: &LinkRequest, keep_visibility: bool) -> String {
        let relationship = link
            .relationship_type
            .unwrap_or_else(|| form.default_relationship());

        let (field, data) = match form {
            LinkForm::Array => {
                let mut field = Field::new(&link.field_name, "array");
                field.is_virtual = true;
                field.linked_primary_key_field = Some(link.source_key.clone());
                field.linked_foreign_key_field = Some(link.target_key.clone());
                field.relationship_type = Some(relationship);
                let data = EdgeData {
                    relationship_type: relationship,
                    target_fk: Some(link.target_key.clone()),
                    primary_key_field: Some(link.target_key.clone()),
                    ..EdgeData::default()
                };
                (field, data)
            }
            LinkForm::Object => {
                let mut field = Field::new(&link.field_name, "object");
                field.primary_key_field = Some(link.target_key.clone());
                field.linked_foreign_key_field = Some(link.source_key.clone());
                field.relationship_type = Some(relationship);
                let data = EdgeData {
                    relationship_type: relationship,
                    source_fk: Some(link.source_key.clone()),
                    target_fk: Some(link.target_key.clone()),
                    object_field_name: Some(link.field_name.clone()),
                    primary_key_field: Some(link.target_key.clone()),
                    ..EdgeData::default()
                };
                (field, data)
            }
        };

        self.upsert_relationship_field(&link.source_node_id, field, keep_visibility);
        let edge = Edge::new(
            &link.source_node_id,
            &link.field_name,
            &link.target_node_id,
            &link.target_key,
            data,
        );
        let edge_id = edge.id.clone();
        let designated = edge.foreign_key_side();
        self.upsert_edge(edge);
        if let Some(key) = designated {
            self.mark_foreign_key(&key);
        }
        edge_id
    }

    /// Replaces a same-named field in place or appends. A fresh relationship field is visible.
    pub(crate) fn upsert_relationship_field(&mut self, node_id: &str, mut field: Field, keep_visibility: bool) {
        self.touch_node(node_id, |node| match node.data.field_index(&field.name) {
            Some(idx) => {
                if keep_visibility {
                    field.visible = node.data.columns[idx].visible;
                }
                node.data.columns[idx] = field;
            }
            None => node.data.columns.push(field),
        });
    }

    pub(crate) fn upsert_edge(&mut self, edge: Edge) {
        match self.edges.iter_mut().find(|e| e.id == edge.id) {
            Some(existing) => *existing = edge,
            None => self.edges.push(edge),
        }
    }

    /// Shallow-merges `updates` into an edge's metadata. When the merge moves the
    /// foreign-key side, the old side's flag is reconciled and the new side is flagged.
    pub fn update_relationship(&mut self, edge_id: &str, updates: &Map<String, Value>) -> bool {
        let Some(idx) = self.edges.iter().position(|e| e.id == edge_id) else {
            return false;
        };
        let before = self.edges[idx].foreign_key_side();
        let mut data = self.edges[idx].data.clone();
        if let Err(err) = data.merge(updates) {
            warn!(edge = edge_id, error = %err, "relationship update rejected");
            return false;
        }
        self.edges[idx].data = data;
        let after = self.edges[idx].foreign_key_side();

        if before != after {
            if let Some(old) = before {
                self.reconcile_foreign_keys([old]);
            }
            if let Some(new) = after {
                self.mark_foreign_key(&new);
            }
        }
        true
    }

    /// Removes one edge and clears the flag it alone was holding up.
    pub fn delete_relationship(&mut self, edge_id: &str) -> Option<Edge> {
        let idx = self.edges.iter().position(|e| e.id == edge_id)?;
        let edge = self.edges.remove(idx);
        if let Some(key) = edge.foreign_key_side() {
            self.reconcile_foreign_keys([key]);
        }
        Some(edge)
    }
}

// src/graph/fields.rs

use std::collections::HashSet;

use tracing::debug;

use super::SchemaGraph;
use crate::model::{Edge, Field, FieldKey, FieldPatch};

/// What a field deletion took with it.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRemoval {
    pub field: Field,
    pub removed_edges: Vec<String>,
    pub removed_tables: Vec<String>,
}

impl SchemaGraph {
    pub fn add_field(&mut self, node_id: &str, field: Field) -> bool {
        self.touch_node(node_id, |node| node.data.columns.push(field))
            .is_some()
    }

    /// Merges `patch` into the field at `index`. A rename is carried into every edge and key
    /// reference that named the old field, so no relationship is orphaned. The foreign-key flag
    /// is recomputed from the edges afterwards; a patch cannot set it.
    pub fn update_field(&mut self, node_id: &str, index: usize, patch: &FieldPatch) -> bool {
        let Some(old_name) = self
            .node(node_id)
            .and_then(|n| n.data.columns.get(index))
            .map(|f| f.name.clone())
        else {
            return false;
        };
        self.touch_node(node_id, |node| patch.apply(&mut node.data.columns[index]));

        let name = match patch.name.as_deref().filter(|n| *n != old_name) {
            Some(new_name) => {
                self.rename_references(node_id, &old_name, new_name);
                new_name.to_string()
            }
            None => old_name,
        };
        self.sync_foreign_key(FieldKey::new(node_id, &name));
        true
    }

    fn rename_references(&mut self, node_id: &str, old: &str, new: &str) {
        let rename = |slot: &mut String| {
            if slot == old {
                *slot = new.to_string();
            }
        };
        let rename_opt = |slot: &mut Option<String>| {
            if slot.as_deref() == Some(old) {
                *slot = Some(new.to_string());
            }
        };

        // fields on other tables that point at the renamed key through a target handle
        let mut far_fields: Vec<FieldKey> = Vec::new();
        for edge in &mut self.edges {
            if edge.source == node_id {
                rename(&mut edge.source_handle);
                rename_opt(&mut edge.data.object_field_name);
                rename_opt(&mut edge.data.source_fk);
            }
            if edge.target == node_id {
                if edge.target_handle == old {
                    far_fields.push(FieldKey::new(&edge.source, &edge.source_handle));
                }
                rename(&mut edge.target_handle);
                rename_opt(&mut edge.data.target_fk);
                rename_opt(&mut edge.data.primary_key_field);
            }
        }

        self.touch_node(node_id, |node| {
            for field in &mut node.data.columns {
                rename_opt(&mut field.linked_primary_key_field);
                rename_opt(&mut field.linked_foreign_key_field);
            }
        });
        for key in far_fields {
            let stale = self.field(&key.node_id, &key.field).is_some_and(|f| {
                f.linked_foreign_key_field.as_deref() == Some(old)
                    || f.primary_key_field.as_deref() == Some(old)
            });
            if stale {
                self.touch_node(&key.node_id, |node| {
                    if let Some(f) = node.data.field_mut(&key.field) {
                        rename_opt(&mut f.linked_foreign_key_field);
                        rename_opt(&mut f.primary_key_field);
                    }
                });
            }
        }
        debug!(table = node_id, old, new, "field renamed");
    }

    /// Removes the field at `index` with every edge hanging off it.
    ///
    /// Tables the field pointed at are deleted with the full table cascade unless
    /// `skip_recursive` is set. Foreign-key flags that lose their last designating edge are
    /// cleared. `None` when the table or index does not exist.
    pub fn delete_field(&mut self, node_id: &str, index: usize, skip_recursive: bool) -> Option<FieldRemoval> {
        let field = self.node(node_id)?.data.columns.get(index)?.clone();
        let name = field.name.as_str();

        let mut doomed_edges = HashSet::new();
        let mut children: Vec<String> = Vec::new();
        for edge in &self.edges {
            let outgoing = edge.source == node_id
                && (edge.source_handle == name || edge.data.object_field_name.as_deref() == Some(name));
            let incoming = edge.target == node_id && edge.target_handle == name;
            if outgoing && !children.contains(&edge.target) {
                children.push(edge.target.clone());
            }
            if outgoing || incoming {
                doomed_edges.insert(edge.id.clone());
            }
        }

        let candidates: Vec<FieldKey> = self
            .edges
            .iter()
            .filter(|e| doomed_edges.contains(&e.id))
            .filter_map(Edge::foreign_key_side)
            .filter(|k| !(k.node_id == node_id && k.field == name))
            .collect();

        let removed_edges: Vec<String> = self
            .edges
            .iter()
            .filter(|e| doomed_edges.contains(&e.id))
            .map(|e| e.id.clone())
            .collect();
        self.edges.retain(|e| !doomed_edges.contains(&e.id));
        self.touch_node(node_id, |node| {
            node.data.columns.remove(index);
        });
        self.reconcile_foreign_keys(candidates);

        let mut removed_tables = Vec::new();
        if !skip_recursive {
            for child in children.iter().filter(|c| c.as_str() != node_id) {
                removed_tables.extend(self.delete_table(child));
            }
        }

        debug!(
            table = node_id,
            field = %field.name,
            edges = removed_edges.len(),
            tables = removed_tables.len(),
            "field deleted"
        );
        Some(FieldRemoval {
            field,
            removed_edges,
            removed_tables,
        })
    }

    /// Flips the visibility of the field at `index` and returns the new value.
    ///
    /// A foreign-key field drags its paired object fields along: for every edge anchored at the
    /// key that carries an `objectFieldName`, the object field of that name on the far table (or
    /// on this table when the far side has none) takes the same visibility.
    pub fn toggle_field_visibility(&mut self, node_id: &str, index: usize) -> Option<bool> {
        let field = self.node(node_id)?.data.columns.get(index)?.clone();
        let visible = !field.visible;
        self.touch_node(node_id, |node| node.data.columns[index].visible = visible);

        if field.is_foreign_key {
            for key in self.paired_object_fields(node_id, &field.name) {
                self.touch_node(&key.node_id, |node| {
                    if let Some(f) = node.data.field_mut(&key.field) {
                        f.visible = visible;
                    }
                });
            }
        }
        Some(visible)
    }

    fn paired_object_fields(&self, node_id: &str, key: &str) -> Vec<FieldKey> {
        let is_object_field = |table: &str, name: &str| {
            (name != key || table != node_id) && self.field(table, name).is_some_and(Field::is_object)
        };

        let mut out: Vec<FieldKey> = Vec::new();
        for edge in &self.edges {
            let anchored = (edge.source == node_id
                && (edge.source_handle == key || edge.data.source_fk.as_deref() == Some(key)))
                || (edge.target == node_id && edge.target_handle == key);
            let Some(object_field) = edge.data.object_field_name.as_deref().filter(|_| anchored) else {
                continue;
            };
            let far = if edge.source == node_id { &edge.target } else { &edge.source };
            let paired = if is_object_field(far, object_field) {
                FieldKey::new(far, object_field)
            } else if is_object_field(node_id, object_field) {
                FieldKey::new(node_id, object_field)
            } else {
                continue;
            };
            if !out.contains(&paired) {
                out.push(paired);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::model::{EdgeData, RelationshipType};

    fn users_orders() -> SchemaGraph {
        let mut g = graph(vec![
            table("users", &[("id", "int"), ("orders", "array")]),
            table("orders", &[("id", "int"), ("user_id", "int")]),
        ]);
        link(&mut g, "users", "orders", "orders", "user_id");
        g
    }

    #[test]
    fn add_field_appends() {
        let mut g = users_orders();
        assert!(g.add_field("users", Field::new("email", "varchar")));
        assert_eq!(g.node("users").unwrap().data.columns[2].name, "email");
        assert!(!g.add_field("nope", Field::new("x", "int")));
    }

    #[test]
    fn rename_rewrites_both_handles() {
        let mut g = users_orders();
        assert!(g.update_field("orders", 1, &FieldPatch::rename("customer_id")));
        let edge = &g.edges()[0];
        assert_eq!(edge.target_handle, "customer_id");
        assert_eq!(edge.data.target_fk.as_deref(), Some("customer_id"));

        assert!(g.update_field("users", 1, &FieldPatch::rename("purchases")));
        assert_eq!(g.edges()[0].source_handle, "purchases");
        assert!(g.violations().is_empty(), "{:?}", g.violations());
    }

    #[test]
    fn rename_follows_object_field_marker_and_linked_keys() {
        let mut g = users_orders();
        g.touch_node("users", |n| n.data.columns[1].linked_primary_key_field = Some("id".into()));
        g.touch_node("orders", |n| n.data.columns.push(Field::new("user", "object")));
        g.edges.push(crate::model::Edge::new(
            "orders",
            "user",
            "users",
            "id",
            EdgeData {
                relationship_type: RelationshipType::ManyToOne,
                source_fk: Some("user_id".into()),
                object_field_name: Some("user".into()),
                primary_key_field: Some("id".into()),
                ..Default::default()
            },
        ));

        g.update_field("orders", 2, &FieldPatch::rename("buyer"));
        let edge = g.edges().iter().find(|e| e.source == "orders").unwrap();
        assert_eq!(edge.source_handle, "buyer");
        assert_eq!(edge.data.object_field_name.as_deref(), Some("buyer"));

        g.update_field("users", 0, &FieldPatch::rename("user_pk"));
        let edge = g.edges().iter().find(|e| e.source == "orders").unwrap();
        assert_eq!(edge.target_handle, "user_pk");
        assert_eq!(edge.data.primary_key_field.as_deref(), Some("user_pk"));
        assert_eq!(
            g.field("users", "orders").unwrap().linked_primary_key_field.as_deref(),
            Some("user_pk")
        );
    }

    #[test]
    fn update_cannot_set_an_undesignated_flag() {
        let mut g = users_orders();
        let patch = FieldPatch {
            is_foreign_key: Some(true),
            ..FieldPatch::default()
        };
        assert!(g.update_field("orders", 0, &patch));
        assert!(!g.field("orders", "id").unwrap().is_foreign_key);
        assert!(g.violations().is_empty(), "{:?}", g.violations());
    }

    #[test]
    fn update_cannot_clear_a_designated_flag() {
        let mut g = users_orders();
        let patch = FieldPatch {
            is_foreign_key: Some(false),
            field_type: Some("bigint".into()),
            ..FieldPatch::default()
        };
        assert!(g.update_field("orders", 1, &patch));
        let field = g.field("orders", "user_id").unwrap();
        assert_eq!(field.field_type, "bigint");
        assert!(field.is_foreign_key);
        assert!(g.violations().is_empty(), "{:?}", g.violations());
    }

    #[test]
    fn update_out_of_range_is_noop() {
        let mut g = users_orders();
        let rev = g.revision();
        assert!(!g.update_field("users", 9, &FieldPatch::rename("x")));
        assert_eq!(g.revision(), rev);
    }

    #[test]
    fn delete_relationship_field_cascades_to_child_table() {
        let mut g = users_orders();
        let removal = g.delete_field("users", 1, false).unwrap();
        assert_eq!(removal.field.name, "orders");
        assert_eq!(removal.removed_edges, vec!["users-orders-to-orders-user_id"]);
        assert_eq!(removal.removed_tables, vec!["orders"]);
        assert_eq!(g.nodes().len(), 1);
        assert_eq!(g.node("users").unwrap().data.columns.len(), 1);
    }

    #[test]
    fn skip_recursive_keeps_child_and_clears_flag() {
        let mut g = users_orders();
        assert!(g.field("orders", "user_id").unwrap().is_foreign_key);
        let removal = g.delete_field("users", 1, true).unwrap();
        assert!(removal.removed_tables.is_empty());
        assert!(g.contains_node("orders"));
        assert!(!g.field("orders", "user_id").unwrap().is_foreign_key);
        assert!(g.violations().is_empty());
    }

    #[test]
    fn flag_survives_while_another_edge_designates_it() {
        let mut g = users_orders();
        g.touch_node("users", |n| n.data.columns.push(Field::new("recent", "array")));
        link(&mut g, "users", "recent", "orders", "user_id");

        g.delete_field("users", 1, true).unwrap();
        assert!(g.field("orders", "user_id").unwrap().is_foreign_key);
        assert_eq!(g.edges().len(), 1);
    }

    #[test]
    fn deleting_incoming_key_removes_edge_but_not_tables() {
        let mut g = users_orders();
        let removal = g.delete_field("orders", 1, false).unwrap();
        assert_eq!(removal.removed_edges.len(), 1);
        assert!(removal.removed_tables.is_empty());
        assert_eq!(g.nodes().len(), 2);
    }

    fn order_with_customer() -> SchemaGraph {
        let mut g = graph(vec![
            table("order", &[("id", "int"), ("customer_id", "int")]),
            table("customer", &[("id", "int")]),
        ]);
        g.confirm_link(
            crate::graph::LinkForm::Object,
            &crate::graph::LinkRequest {
                source_node_id: "order".into(),
                target_node_id: "customer".into(),
                source_key: "customer_id".into(),
                target_key: "id".into(),
                field_name: "customer".into(),
                relationship_type: None,
            },
        )
        .unwrap();
        assert!(g.field("order", "customer_id").unwrap().is_foreign_key);
        g
    }

    #[test]
    fn delete_object_field_clears_source_key_and_cascades() {
        let mut g = order_with_customer();
        let idx = g.node("order").unwrap().data.field_index("customer").unwrap();

        let removal = g.delete_field("order", idx, false).unwrap();
        assert_eq!(removal.removed_edges, vec!["order-customer-to-customer-id"]);
        assert_eq!(removal.removed_tables, vec!["customer"]);
        assert!(g.edges().is_empty());
        assert!(!g.contains_node("customer"));
        assert!(!g.field("order", "customer_id").unwrap().is_foreign_key);
        assert!(g.violations().is_empty(), "{:?}", g.violations());
    }

    #[test]
    fn delete_object_field_without_recursion_keeps_referenced_table() {
        let mut g = order_with_customer();
        let idx = g.node("order").unwrap().data.field_index("customer").unwrap();

        let removal = g.delete_field("order", idx, true).unwrap();
        assert!(removal.removed_tables.is_empty());
        assert!(g.contains_node("customer"));
        assert!(g.edges().is_empty());
        assert!(!g.field("order", "customer_id").unwrap().is_foreign_key);
        assert!(g.field("order", "customer").is_none());
    }

    #[test]
    fn delete_missing_field_is_none() {
        let mut g = users_orders();
        assert!(g.delete_field("users", 5, false).is_none());
        assert!(g.delete_field("ghost", 0, false).is_none());
    }

    #[test]
    fn toggling_fk_flips_paired_object_field() {
        let mut g = graph(vec![
            table("order", &[("id", "int"), ("customer_id", "int")]),
            table("customer", &[("id", "int"), ("customer", "object")]),
        ]);
        g.edges.push(crate::model::Edge::new(
            "order",
            "customer_id",
            "customer",
            "id",
            EdgeData {
                relationship_type: RelationshipType::ManyToOne,
                source_fk: Some("customer_id".into()),
                object_field_name: Some("customer".into()),
                ..Default::default()
            },
        ));
        g.mark_foreign_key(&FieldKey::new("order", "customer_id"));

        assert_eq!(g.toggle_field_visibility("order", 1), Some(false));
        assert!(!g.field("customer", "customer").unwrap().visible);
        assert_eq!(g.toggle_field_visibility("order", 1), Some(true));
        assert!(g.field("customer", "customer").unwrap().visible);
    }

    #[test]
    fn toggling_plain_field_touches_nothing_else() {
        let mut g = users_orders();
        assert_eq!(g.toggle_field_visibility("users", 0), Some(false));
        assert!(g.field("orders", "user_id").unwrap().visible);
        assert_eq!(g.toggle_field_visibility("users", 7), None);
    }
}

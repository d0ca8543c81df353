// src/model.rs
//
// Table nodes, fields and relationship edges as they travel between the editor and its host.
// Field names on the wire are camelCase; a handful keep their historical spelling
// (`_version`, `sourceFK`, `targetFK`).

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Display palette, assigned round-robin by node count.
pub const TABLE_COLORS: [&str; 6] = [
    "#22c55e", // green
    "#a855f7", // purple
    "#eab308", // yellow
    "#3b82f6", // blue
    "#ef4444", // red
    "#14b8a6", // teal
];

pub fn palette_color(index: usize) -> String {
    TABLE_COLORS[index % TABLE_COLORS.len()].to_string()
}

/// `"User Accounts"` → `"user_accounts"`. Every whitespace run becomes one `_`, edges included.
pub fn default_table_name(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut in_space = false;
    for c in label.to_lowercase().chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn default_true() -> bool {
    true
}

fn default_node_type() -> String {
    "table".to_string()
}

fn default_edge_type() -> String {
    "relationship".to_string()
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
pub enum RelationshipType {
    #[serde(rename = "1-1")]
    OneToOne,
    #[default]
    #[serde(rename = "1-n")]
    OneToMany,
    #[serde(rename = "n-1")]
    ManyToOne,
    #[serde(rename = "n-n")]
    ManyToMany,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::OneToOne => "1-1",
            RelationshipType::OneToMany => "1-n",
            RelationshipType::ManyToOne => "n-1",
            RelationshipType::ManyToMany => "n-n",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Slot `index` of a three-column grid.
    pub fn grid_slot(index: usize) -> Self {
        const ROW_ITEMS: usize = 3;
        const SPACING_X: f64 = 400.0;
        const SPACING_Y: f64 = 300.0;
        Self {
            x: 100.0 + (index % ROW_ITEMS) as f64 * SPACING_X,
            y: 100.0 + (index / ROW_ITEMS) as f64 * SPACING_Y,
        }
    }
}

/// A column of a table. Composite columns (`array`/`object`) may carry inline `children`,
/// which are display-only and never become graph nodes or edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_foreign_key: bool,
    #[serde(default)]
    pub is_not_null: bool,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub is_ref: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Object fields: the key on the far table this field resolves to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key_field: Option<String>,
    /// Virtual array fields: the local key rows are grouped by.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_primary_key_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_foreign_key_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_type: Option<RelationshipType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Field>>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            is_primary_key: false,
            is_foreign_key: false,
            is_not_null: false,
            visible: true,
            is_virtual: false,
            is_ref: false,
            description: None,
            primary_key_field: None,
            linked_primary_key_field: None,
            linked_foreign_key_field: None,
            relationship_type: None,
            children: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    pub fn is_array(&self) -> bool {
        self.field_type.eq_ignore_ascii_case("array")
    }

    pub fn is_object(&self) -> bool {
        self.field_type.eq_ignore_ascii_case("object")
    }

    pub fn is_composite(&self) -> bool {
        self.is_array() || self.is_object()
    }
}

/// Partial update for a [`Field`]; `None` leaves the current value alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldPatch {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub field_type: Option<String>,
    pub is_primary_key: Option<bool>,
    /// Accepted on the wire but never applied: the flag follows the edges.
    pub is_foreign_key: Option<bool>,
    pub is_not_null: Option<bool>,
    pub visible: Option<bool>,
    pub is_virtual: Option<bool>,
    pub is_ref: Option<bool>,
    pub description: Option<String>,
    pub primary_key_field: Option<String>,
    pub linked_primary_key_field: Option<String>,
    pub linked_foreign_key_field: Option<String>,
    pub relationship_type: Option<RelationshipType>,
    pub children: Option<Vec<Field>>,
}

impl FieldPatch {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn apply(&self, field: &mut Field) {
        if let Some(v) = &self.name {
            field.name = v.clone();
        }
        if let Some(v) = &self.field_type {
            field.field_type = v.clone();
        }
        if let Some(v) = self.is_primary_key {
            field.is_primary_key = v;
        }
        if let Some(v) = self.is_not_null {
            field.is_not_null = v;
        }
        if let Some(v) = self.visible {
            field.visible = v;
        }
        if let Some(v) = self.is_virtual {
            field.is_virtual = v;
        }
        if let Some(v) = self.is_ref {
            field.is_ref = v;
        }
        if let Some(v) = &self.description {
            field.description = Some(v.clone());
        }
        if let Some(v) = &self.primary_key_field {
            field.primary_key_field = Some(v.clone());
        }
        if let Some(v) = &self.linked_primary_key_field {
            field.linked_primary_key_field = Some(v.clone());
        }
        if let Some(v) = &self.linked_foreign_key_field {
            field.linked_foreign_key_field = Some(v.clone());
        }
        if let Some(v) = self.relationship_type {
            field.relationship_type = Some(v);
        }
        if let Some(v) = &self.children {
            field.children = Some(v.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TableData {
    pub table_name: String,
    pub label: String,
    #[serde(default)]
    pub columns: Vec<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Bumped on every mutation of this node.
    #[serde(rename = "_version", default)]
    pub revision: u64,
}

impl TableData {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableNode {
    pub id: String,
    #[serde(rename = "type", default = "default_node_type")]
    pub node_type: String,
    #[serde(default)]
    pub position: Position,
    pub data: TableData,
}

/// Shallow update for a table's data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TablePatch {
    pub label: Option<String>,
    pub table_name: Option<String>,
    pub color: Option<String>,
    pub is_active: Option<bool>,
    pub columns: Option<Vec<Field>>,
}

impl TablePatch {
    pub fn apply(&self, data: &mut TableData) {
        if let Some(v) = &self.label {
            data.label = v.clone();
        }
        if let Some(v) = &self.table_name {
            data.table_name = v.clone();
        }
        if let Some(v) = &self.color {
            data.color = Some(v.clone());
        }
        if let Some(v) = self.is_active {
            data.is_active = v;
        }
        if let Some(v) = &self.columns {
            data.columns = v.clone();
        }
    }
}

/// Relationship metadata. Unknown keys survive in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EdgeData {
    #[serde(default)]
    pub relationship_type: RelationshipType,
    #[serde(rename = "sourceFK", default, skip_serializing_if = "Option::is_none")]
    pub source_fk: Option<String>,
    #[serde(rename = "targetFK", default, skip_serializing_if = "Option::is_none")]
    pub target_fk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_field_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key_field: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EdgeData {
    /// Shallow-merges a free-form metadata object into this one.
    pub fn merge(&mut self, updates: &Map<String, Value>) -> Result<(), serde_json::Error> {
        let mut current = match serde_json::to_value(&*self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (k, v) in updates {
            current.insert(k.clone(), v.clone());
        }
        *self = serde_json::from_value(Value::Object(current))?;
        Ok(())
    }
}

/// `(node id, field name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    pub node_id: String,
    pub field: String,
}

impl FieldKey {
    pub fn new(node_id: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node_id, self.field)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    #[schemars(with = "Option<String>")]
    pub source_handle: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    #[schemars(with = "Option<String>")]
    pub target_handle: String,
    #[serde(rename = "type", default = "default_edge_type")]
    pub edge_type: String,
    #[serde(default)]
    pub data: EdgeData,
}

impl Edge {
    /// `"<source>-<field>-to-<target>-<targetKey>"`.
    pub fn relationship_id(source: &str, field_name: &str, target: &str, target_key: &str) -> String {
        format!("{source}-{field_name}-to-{target}-{target_key}")
    }

    pub fn new(
        source: impl Into<String>,
        source_handle: impl Into<String>,
        target: impl Into<String>,
        target_handle: impl Into<String>,
        data: EdgeData,
    ) -> Self {
        let (source, source_handle) = (source.into(), source_handle.into());
        let (target, target_handle) = (target.into(), target_handle.into());
        Self {
            id: Self::relationship_id(&source, &source_handle, &target, &target_handle),
            source,
            target,
            source_handle,
            target_handle,
            edge_type: default_edge_type(),
            data,
        }
    }

    /// The field this edge designates as its foreign-key side.
    ///
    /// Object relationships always put the key on the source field named by `sourceFK`. Otherwise
    /// `1-n` puts it on the target handle and other cardinalities use `sourceFK`; edges without
    /// that marker fall back to the target handle.
    pub fn foreign_key_side(&self) -> Option<FieldKey> {
        if let Some(fk) = &self.data.source_fk {
            if self.data.object_field_name.is_some()
                || self.data.relationship_type != RelationshipType::OneToMany
            {
                return Some(FieldKey::new(&self.source, fk));
            }
        }
        if self.target_handle.is_empty() {
            None
        } else {
            Some(FieldKey::new(&self.target, &self.target_handle))
        }
    }
}

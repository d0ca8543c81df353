// src/router.rs
//
// Maps inbound host events onto graph mutations. Message types the router does not own are
// left for the other inbound subscribers.

use std::str::FromStr;

use schema_bridge::{BridgeMsg, InboundHandler};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::{
    graph::{LinkForm, LinkRequest, NewTable, SchemaGraph},
    loader::{SchemaData, load_schema},
    model::{Edge, Field, FieldPatch, RelationshipType, TableNode, TablePatch},
    store::SchemaStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, Display, EnumIter)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemaEventType {
    SchemaTableAdd,
    SchemaTableUpdate,
    SchemaTableDelete,
    SchemaFieldAdd,
    SchemaFieldUpdate,
    SchemaFieldDelete,
    SchemaRelationshipAdd,
    SchemaRelationshipUpdate,
    SchemaRelationshipDelete,
    SchemaLoad,
    SchemaSetNodes,
    SchemaSetEdges,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteError {
    #[error("malformed {msg_type} payload: {reason}")]
    InvalidPayload {
        msg_type: SchemaEventType,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableUpdate {
    pub id: String,
    #[serde(default)]
    pub updates: TablePatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldAdd {
    pub node_id: String,
    pub field: Field,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldUpdate {
    pub node_id: String,
    pub field_index: usize,
    #[serde(default)]
    pub updates: FieldPatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldDelete {
    pub node_id: String,
    pub field_index: usize,
    #[serde(default)]
    pub skip_recursive: bool,
}

/// Link payload as the host reflects it back. `type` picks the field shape; without it the
/// cardinality decides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipAdd {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub form: Option<LinkForm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<RelationshipType>,
    #[serde(flatten)]
    pub link: LinkRequest,
}

impl RelationshipAdd {
    pub fn form(&self) -> LinkForm {
        if let Some(form) = self.form {
            return form;
        }
        match self.link.relationship_type.or(self.link_type) {
            Some(RelationshipType::ManyToOne | RelationshipType::OneToOne) => LinkForm::Object,
            _ => LinkForm::Array,
        }
    }

    fn into_link(self) -> (LinkForm, LinkRequest) {
        let form = self.form();
        let mut link = self.link;
        link.relationship_type = link.relationship_type.or(self.link_type);
        (form, link)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipUpdate {
    pub edge_id: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipRef {
    pub edge_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NodesPayload {
    #[serde(default)]
    pub nodes: Vec<TableNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EdgesPayload {
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// A decoded host event the engine applies.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaEvent {
    TableAdd(NewTable),
    TableUpdate(TableUpdate),
    TableDelete(TableRef),
    FieldAdd(FieldAdd),
    FieldUpdate(FieldUpdate),
    FieldDelete(FieldDelete),
    RelationshipAdd(RelationshipAdd),
    RelationshipUpdate(RelationshipUpdate),
    RelationshipDelete(RelationshipRef),
    Load(SchemaData),
    SetNodes(NodesPayload),
    SetEdges(EdgesPayload),
}

fn decode<T: DeserializeOwned>(msg_type: SchemaEventType, payload: Option<&Value>) -> Result<T, RouteError> {
    serde_json::from_value(payload.cloned().unwrap_or(Value::Null)).map_err(|e| RouteError::InvalidPayload {
        msg_type,
        reason: e.to_string(),
    })
}

impl SchemaEvent {
    /// `Ok(None)` for message types the engine does not consume.
    pub fn parse(msg_type: &str, payload: Option<&Value>) -> Result<Option<Self>, RouteError> {
        let Ok(kind) = SchemaEventType::from_str(msg_type) else {
            return Ok(None);
        };
        use SchemaEventType as T;
        let event = match kind {
            T::SchemaTableAdd => Self::TableAdd(decode(kind, payload)?),
            T::SchemaTableUpdate => Self::TableUpdate(decode(kind, payload)?),
            T::SchemaTableDelete => Self::TableDelete(decode(kind, payload)?),
            T::SchemaFieldAdd => Self::FieldAdd(decode(kind, payload)?),
            T::SchemaFieldUpdate => Self::FieldUpdate(decode(kind, payload)?),
            T::SchemaFieldDelete => Self::FieldDelete(decode(kind, payload)?),
            T::SchemaRelationshipAdd => Self::RelationshipAdd(decode(kind, payload)?),
            T::SchemaRelationshipUpdate => Self::RelationshipUpdate(decode(kind, payload)?),
            T::SchemaRelationshipDelete => Self::RelationshipDelete(decode(kind, payload)?),
            T::SchemaLoad => Self::Load(decode(kind, payload)?),
            T::SchemaSetNodes => Self::SetNodes(decode(kind, payload)?),
            T::SchemaSetEdges => Self::SetEdges(decode(kind, payload)?),
        };
        Ok(Some(event))
    }

    pub fn event_type(&self) -> SchemaEventType {
        match self {
            Self::TableAdd(_) => SchemaEventType::SchemaTableAdd,
            Self::TableUpdate(_) => SchemaEventType::SchemaTableUpdate,
            Self::TableDelete(_) => SchemaEventType::SchemaTableDelete,
            Self::FieldAdd(_) => SchemaEventType::SchemaFieldAdd,
            Self::FieldUpdate(_) => SchemaEventType::SchemaFieldUpdate,
            Self::FieldDelete(_) => SchemaEventType::SchemaFieldDelete,
            Self::RelationshipAdd(_) => SchemaEventType::SchemaRelationshipAdd,
            Self::RelationshipUpdate(_) => SchemaEventType::SchemaRelationshipUpdate,
            Self::RelationshipDelete(_) => SchemaEventType::SchemaRelationshipDelete,
            Self::Load(_) => SchemaEventType::SchemaLoad,
            Self::SetNodes(_) => SchemaEventType::SchemaSetNodes,
            Self::SetEdges(_) => SchemaEventType::SchemaSetEdges,
        }
    }

    /// Applies the event. Returns whether anything changed.
    pub fn apply(self, graph: &mut SchemaGraph) -> bool {
        match self {
            Self::TableAdd(table) => {
                graph.add_table(table);
                true
            }
            Self::TableUpdate(u) => graph.update_table(&u.id, &u.updates),
            Self::TableDelete(t) => !graph.delete_table(&t.id).is_empty(),
            Self::FieldAdd(f) => graph.add_field(&f.node_id, f.field),
            Self::FieldUpdate(f) => graph.update_field(&f.node_id, f.field_index, &f.updates),
            Self::FieldDelete(f) => graph
                .delete_field(&f.node_id, f.field_index, f.skip_recursive)
                .is_some(),
            Self::RelationshipAdd(rel) => {
                let (form, link) = rel.into_link();
                graph.confirm_link(form, &link).is_some()
            }
            Self::RelationshipUpdate(u) => graph.update_relationship(&u.edge_id, &u.data),
            Self::RelationshipDelete(r) => graph.delete_relationship(&r.edge_id).is_some(),
            Self::Load(data) => {
                let loaded = load_schema(&data);
                info!(
                    tables = loaded.nodes().len(),
                    edges = loaded.edges().len(),
                    "schema replaced"
                );
                graph.replace_with(loaded);
                true
            }
            Self::SetNodes(p) => {
                graph.set_nodes(p.nodes);
                true
            }
            Self::SetEdges(p) => {
                graph.set_edges(p.edges);
                true
            }
        }
    }
}

/// Inbound subscriber that applies schema events to a [`SchemaStore`].
#[derive(Clone)]
pub struct EventRouter {
    store: SchemaStore,
}

impl EventRouter {
    pub fn new(store: SchemaStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SchemaStore {
        &self.store
    }

    /// Decodes and applies one host event. `Ok(None)` when the type is not ours.
    pub fn route(&self, msg_type: &str, payload: Option<&Value>) -> Result<Option<bool>, RouteError> {
        let Some(event) = SchemaEvent::parse(msg_type, payload)? else {
            trace!(msg_type, "not a schema event");
            return Ok(None);
        };
        let kind = event.event_type();
        let changed = self.store.apply(kind.as_ref(), |graph| event.apply(graph));
        debug!(msg_type = %kind, changed, "schema event applied");
        Ok(Some(changed))
    }
}

impl InboundHandler for EventRouter {
    fn handle_inbound(&self, msg: &BridgeMsg) {
        let BridgeMsg::Event(event) = msg else {
            return;
        };
        if let Err(err) = self.route(&event.msg_type, event.payload.as_ref()) {
            warn!(error = %err, "schema event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use strum::IntoEnumIterator;

    use super::*;

    fn router() -> EventRouter {
        EventRouter::new(SchemaStore::new())
    }

    #[test]
    fn every_event_type_round_trips_its_name() {
        for kind in SchemaEventType::iter() {
            let name = kind.to_string();
            assert!(name.starts_with("SCHEMA_"), "{name}");
            assert_eq!(SchemaEventType::from_str(&name), Ok(kind));
        }
        assert_eq!(SchemaEventType::SchemaSetNodes.as_ref(), "SCHEMA_SET_NODES");
    }

    #[test]
    fn unknown_types_pass_through() {
        let r = router();
        assert_eq!(r.route("DASHBOARD_REFRESH", Some(&json!({}))), Ok(None));
    }

    #[test]
    fn malformed_payload_is_an_error_and_changes_nothing() {
        let r = router();
        let err = r.route("SCHEMA_FIELD_UPDATE", Some(&json!({"nodeId": 3}))).unwrap_err();
        assert!(err.to_string().starts_with("malformed SCHEMA_FIELD_UPDATE payload"));
        assert!(r.route("SCHEMA_TABLE_DELETE", None).is_err());
        assert_eq!(r.store().read(|g| g.revision()), 0);
    }

    #[test]
    fn table_and_field_events() {
        let r = router();
        r.route(
            "SCHEMA_TABLE_ADD",
            Some(&json!({"id": "users", "name": "Users", "columns": [{"name": "id", "type": "int", "visible": false}]})),
        )
        .unwrap();
        r.route(
            "SCHEMA_FIELD_ADD",
            Some(&json!({"nodeId": "users", "field": {"name": "email", "type": "varchar"}})),
        )
        .unwrap();
        r.route(
            "SCHEMA_FIELD_UPDATE",
            Some(&json!({"nodeId": "users", "fieldIndex": 1, "updates": {"isNotNull": true}})),
        )
        .unwrap();
        r.route(
            "SCHEMA_TABLE_UPDATE",
            Some(&json!({"id": "users", "updates": {"label": "People"}})),
        )
        .unwrap();

        let g = r.store().snapshot();
        let users = g.node("users").unwrap();
        assert_eq!(users.data.label, "People");
        assert_eq!(users.data.table_name, "users");
        assert!(users.data.columns[0].visible);
        assert!(users.data.columns[1].is_not_null);

        assert_eq!(
            r.route("SCHEMA_FIELD_DELETE", Some(&json!({"nodeId": "users", "fieldIndex": 9}))),
            Ok(Some(false))
        );
        assert_eq!(
            r.route("SCHEMA_TABLE_DELETE", Some(&json!({"id": "users"}))),
            Ok(Some(true))
        );
        assert!(r.store().read(|g| g.nodes().is_empty()));
    }

    #[test]
    fn relationship_form_selection() {
        let parse = |v: Value| serde_json::from_value::<RelationshipAdd>(v).unwrap().form();
        let base = json!({"sourceNodeId": "a", "targetNodeId": "b", "sourceKey": "id",
                          "targetKey": "a_id", "fieldName": "bs"});
        let with = |extra: Value| {
            let mut v = base.clone();
            v.as_object_mut().unwrap().extend(extra.as_object().unwrap().clone());
            v
        };
        assert_eq!(parse(base.clone()), LinkForm::Array);
        assert_eq!(parse(with(json!({"relationshipType": "n-1"}))), LinkForm::Object);
        assert_eq!(parse(with(json!({"linkType": "1-1"}))), LinkForm::Object);
        assert_eq!(parse(with(json!({"relationshipType": "1-n"}))), LinkForm::Array);
        assert_eq!(
            parse(with(json!({"type": "array", "relationshipType": "1-1"}))),
            LinkForm::Array
        );
        assert_eq!(parse(with(json!({"type": "object"}))), LinkForm::Object);
    }

    #[test]
    fn relationship_events_drive_links() {
        let r = router();
        for (id, cols) in [("a", json!([{"name": "id", "type": "int"}])), ("b", json!([{"name": "a_id", "type": "int"}]))] {
            r.route("SCHEMA_TABLE_ADD", Some(&json!({"id": id, "name": id, "columns": cols})))
                .unwrap();
        }
        r.route(
            "SCHEMA_RELATIONSHIP_ADD",
            Some(&json!({"sourceNodeId": "a", "targetNodeId": "b", "sourceKey": "id",
                         "targetKey": "a_id", "fieldName": "bs", "relationshipType": "1-n"})),
        )
        .unwrap();
        let edge_id = "a-bs-to-b-a_id";
        assert!(r.store().read(|g| g.field("b", "a_id").unwrap().is_foreign_key));

        r.route(
            "SCHEMA_RELATIONSHIP_UPDATE",
            Some(&json!({"edgeId": edge_id, "data": {"label": "owns"}})),
        )
        .unwrap();
        assert_eq!(
            r.store().read(|g| g.edge(edge_id).unwrap().data.extra.get("label").cloned()),
            Some(json!("owns"))
        );

        r.route("SCHEMA_RELATIONSHIP_DELETE", Some(&json!({"edgeId": edge_id})))
            .unwrap();
        let g = r.store().snapshot();
        assert!(g.edges().is_empty());
        assert!(!g.field("b", "a_id").unwrap().is_foreign_key);
    }

    #[test]
    fn set_nodes_and_edges_replace_wholesale() {
        let r = router();
        r.route(
            "SCHEMA_SET_NODES",
            Some(&json!({"nodes": [{"id": "x", "data": {"tableName": "x", "label": "X", "columns": [], "_version": 7}}]})),
        )
        .unwrap();
        r.route(
            "SCHEMA_SET_EDGES",
            Some(&json!({"edges": [{"id": "e", "source": "x", "target": "x", "sourceHandle": null, "targetHandle": null}]})),
        )
        .unwrap();
        let g = r.store().snapshot();
        assert_eq!(g.nodes().len(), 1);
        assert_eq!(g.edges().len(), 1);
        assert_eq!(g.revision(), 7);
    }

    #[test]
    fn load_keeps_revisions_monotonic() {
        let r = router();
        r.route("SCHEMA_TABLE_ADD", Some(&json!({"name": "Old"}))).unwrap();
        let before = r.store().read(|g| g.revision());
        r.route(
            "SCHEMA_LOAD",
            Some(&json!({"tables": [{"id": "t", "name": "T", "columns": []}]})),
        )
        .unwrap();
        let g = r.store().snapshot();
        assert_eq!(g.nodes().len(), 1);
        assert!(g.node("node_t").unwrap().data.revision > before);
    }

    #[test]
    fn handler_ignores_non_events() {
        let r = router();
        r.handle_inbound(&BridgeMsg::request("r1", "SCHEMA_TABLE_ADD", Some(json!({"name": "A"}))));
        assert!(r.store().read(|g| g.nodes().is_empty()));
        r.handle_inbound(&BridgeMsg::event("SCHEMA_TABLE_ADD", Some(json!({"name": "A"}))));
        assert_eq!(r.store().read(|g| g.nodes().len()), 1);
    }
}

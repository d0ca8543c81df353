// src/editor.rs
//
// Editor-side intents. Every intent is a message to the host; the graph only changes when the
// host reflects an authoritative SCHEMA_* event back through the router.

use std::sync::Arc;

use chrono::Utc;
use schema_bridge::{Bridge, BridgeError, EditorInbox};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    config::EditorConfig,
    graph::{LinkForm, LinkRequest, NewTable, SchemaGraph},
    logger::{TrafficLog, log_traffic},
    model::{Position, RelationshipType, TableNode},
    router::{EventRouter, RelationshipAdd, SchemaEventType},
    store::SchemaStore,
    validation::{ValidationError, validate_link, validate_table_name},
};

pub const FIELD_ADD_REQUEST: &str = "SCHEMA_FIELD_ADD_REQUEST";
pub const RELATIONSHIP_ADD_REQUEST: &str = "SCHEMA_RELATIONSHIP_ADD_REQUEST";
pub const RELATIONSHIP_EDIT_REQUEST: &str = "SCHEMA_RELATIONSHIP_EDIT_REQUEST";

const CLONE_OFFSET: f64 = 40.0;

#[derive(Debug, Error)]
pub enum IntentError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no table with id {0}")]
    UnknownTable(String),
    #[error("no relationship with id {0}")]
    UnknownEdge(String),
    #[error("could not encode intent payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A connection drawn on the canvas between two field handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub source_handle: Option<String>,
    #[serde(default)]
    pub target_handle: Option<String>,
}

#[derive(Clone)]
pub struct SchemaEditor {
    bridge: Bridge,
    store: SchemaStore,
    handshake_event: String,
}

impl SchemaEditor {
    /// Attaches a fresh graph to `inbox` and announces the editor to the host.
    ///
    /// Host messages queued in `inbox` before this call are applied before the handshake goes out.
    pub fn mount(bridge: Bridge, inbox: &EditorInbox, config: &EditorConfig) -> Self {
        let bridge = bridge.with_default_timeout(config.request_timeout());
        let store = SchemaStore::new();
        // the first subscriber receives the backlog
        inbox.subscribe(Arc::new(EventRouter::new(store.clone())));
        inbox.subscribe(Arc::new(TrafficLog));

        let editor = Self {
            bridge,
            store,
            handshake_event: config.handshake_event.clone(),
        };
        editor.handshake();
        editor
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn store(&self) -> &SchemaStore {
        &self.store
    }

    pub fn snapshot(&self) -> SchemaGraph {
        self.store.snapshot()
    }

    fn emit(&self, msg_type: &str, payload: Value) {
        log_traffic("out", "event", msg_type);
        self.bridge.emit(msg_type, Some(payload));
    }

    fn table(&self, node_id: &str) -> Result<TableNode, IntentError> {
        self.store
            .read(|g| g.node(node_id).cloned())
            .ok_or_else(|| IntentError::UnknownTable(node_id.to_string()))
    }

    pub fn handshake(&self) {
        info!(event = %self.handshake_event, "editor ready");
        self.emit(
            &self.handshake_event,
            json!({ "at": Utc::now().timestamp_millis() }),
        );
    }

    /// Forwards a correlated request to the host.
    pub async fn request(&self, msg_type: &str, payload: Option<Value>) -> Result<Value, BridgeError> {
        log_traffic("out", "request", msg_type);
        self.bridge.request(msg_type, payload).await
    }

    pub fn request_table_delete(&self, node_id: &str) -> Result<(), IntentError> {
        let table = self.table(node_id)?;
        self.emit(
            SchemaEventType::SchemaTableDelete.as_ref(),
            json!({ "id": table.id }),
        );
        Ok(())
    }

    pub fn request_field_add(&self, node_id: &str) -> Result<(), IntentError> {
        let table = self.table(node_id)?;
        self.emit(
            FIELD_ADD_REQUEST,
            json!({
                "nodeId": table.id,
                "tableName": table.data.table_name,
                "tableLabel": table.data.label,
            }),
        );
        Ok(())
    }

    /// Asks the host to open the link form for a canvas connection. Connecting a table to itself
    /// is refused.
    pub fn request_relationship_add(&self, connection: &Connection) -> Result<(), IntentError> {
        if connection.source == connection.target {
            return Err(ValidationError::SelfConnection(connection.source.clone()).into());
        }
        self.table(&connection.source)?;
        self.table(&connection.target)?;
        self.emit(
            RELATIONSHIP_ADD_REQUEST,
            json!({
                "sourceNodeId": connection.source,
                "targetNodeId": connection.target,
                "sourceKey": connection.source_handle,
                "targetKey": connection.target_handle,
                "linkType": RelationshipType::OneToMany,
            }),
        );
        Ok(())
    }

    pub fn request_relationship_edit(&self, edge_id: &str) -> Result<(), IntentError> {
        let edge = self
            .store
            .read(|g| g.edge(edge_id).cloned())
            .ok_or_else(|| IntentError::UnknownEdge(edge_id.to_string()))?;
        self.emit(
            RELATIONSHIP_EDIT_REQUEST,
            json!({
                "edgeId": edge.id,
                "sourceNodeId": edge.source,
                "targetNodeId": edge.target,
                "relationshipType": edge.data.relationship_type,
            }),
        );
        Ok(())
    }

    /// Validates a link form against the current graph and submits it for confirmation.
    pub fn submit_link(&self, form: LinkForm, mut link: LinkRequest) -> Result<(), IntentError> {
        link.field_name = link.field_name.trim().to_string();
        self.store.read(|g| validate_link(g, &link))?;

        let relationship = link
            .relationship_type
            .unwrap_or_else(|| form.default_relationship());
        link.relationship_type = Some(relationship);
        let payload = serde_json::to_value(RelationshipAdd {
            form: Some(form),
            link_type: Some(relationship),
            link,
        })?;
        self.emit(SchemaEventType::SchemaRelationshipAdd.as_ref(), payload);
        Ok(())
    }

    /// Proposes a copy of a table next to the original. Returns the id the copy will carry.
    pub fn clone_table(&self, node_id: &str) -> Result<String, IntentError> {
        let table = self.table(node_id)?;
        let id = format!("table-{}", uuid::Uuid::new_v4());
        let copy = NewTable {
            id: Some(id.clone()),
            name: format!("{} (copy)", table.data.label),
            table_name: Some(format!("{}_copy", table.data.table_name)),
            columns: table.data.columns,
            position: Some(Position::new(
                table.position.x + CLONE_OFFSET,
                table.position.y + CLONE_OFFSET,
            )),
        };
        self.emit(
            SchemaEventType::SchemaTableAdd.as_ref(),
            serde_json::to_value(&copy)?,
        );
        debug!(source = node_id, copy = %id, "table clone requested");
        Ok(id)
    }

    pub fn rename_table(&self, node_id: &str, label: &str) -> Result<(), IntentError> {
        let label = label.trim();
        validate_table_name(label)?;
        let table = self.table(node_id)?;
        self.emit(
            SchemaEventType::SchemaTableUpdate.as_ref(),
            json!({ "id": table.id, "updates": { "label": label } }),
        );
        Ok(())
    }

    /// Display-only: flips a field's visibility (and its paired object fields) locally.
    pub fn toggle_field_visibility(&self, node_id: &str, index: usize) -> Option<bool> {
        self.store
            .apply("FIELD_VISIBILITY", |g| g.toggle_field_visibility(node_id, index))
    }
}

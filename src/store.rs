// src/store.rs
//
// Shared handle on the live graph. Mutations go through `apply`, which publishes a
// `GraphChange` so renderers can refresh.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::graph::SchemaGraph;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphChange {
    pub event: String,
    pub revision: u64,
}

#[derive(Clone)]
pub struct SchemaStore {
    graph: Arc<Mutex<SchemaGraph>>,
    changes: broadcast::Sender<GraphChange>,
}

impl Default for SchemaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaStore {
    pub fn new() -> Self {
        Self::with_graph(SchemaGraph::new())
    }

    pub fn with_graph(graph: SchemaGraph) -> Self {
        let (changes, _) = broadcast::channel(100);
        Self {
            graph: Arc::new(Mutex::new(graph)),
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SchemaGraph> {
        // a panicking reader leaves the graph consistent; keep serving it
        self.graph.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn read<R>(&self, f: impl FnOnce(&SchemaGraph) -> R) -> R {
        f(&self.lock())
    }

    /// Runs a mutation and announces it as `event`.
    pub fn apply<R>(&self, event: &str, f: impl FnOnce(&mut SchemaGraph) -> R) -> R {
        let (out, revision) = {
            let mut graph = self.lock();
            let out = f(&mut graph);
            (out, graph.revision())
        };
        // no subscribers is fine
        let _ = self.changes.send(GraphChange {
            event: event.to_string(),
            revision,
        });
        out
    }

    pub fn snapshot(&self) -> SchemaGraph {
        self.lock().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GraphChange> {
        self.changes.subscribe()
    }
}

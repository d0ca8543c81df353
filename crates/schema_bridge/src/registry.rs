use std::{sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use serde_json::Value;
use tokio::{sync::oneshot, task::AbortHandle};
use tracing::{debug, warn};

use crate::error::BridgeError;

pub type Settlement = Result<Value, BridgeError>;

struct Pending {
    msg_type: String,
    tx: oneshot::Sender<Settlement>,
    timer: Option<AbortHandle>,
}

/// In-flight requests keyed by correlation id.
///
/// An entry is always removed from the map *before* its sender is used, so a request can be
/// settled at most once: whichever of [`settle`](Self::settle) or the deadline timer removes the
/// entry first wins, the other finds nothing.
#[derive(Clone, Default)]
pub struct CorrelationRegistry {
    pending: Arc<DashMap<String, Pending>>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `id` and arms its deadline. Must be called from within a tokio runtime.
    pub fn register(
        &self,
        id: &str,
        msg_type: &str,
        timeout: Duration,
    ) -> Result<oneshot::Receiver<Settlement>, BridgeError> {
        let (tx, rx) = oneshot::channel();
        match self.pending.entry(id.to_owned()) {
            Entry::Occupied(_) => return Err(BridgeError::DuplicateId(id.to_owned())),
            Entry::Vacant(slot) => {
                slot.insert(Pending {
                    msg_type: msg_type.to_owned(),
                    tx,
                    timer: None,
                });
            }
        }

        let pending = Arc::clone(&self.pending);
        let timer_id = id.to_owned();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some((_, entry)) = pending.remove(&timer_id) {
                warn!(id = %timer_id, msg_type = %entry.msg_type, "bridge request timed out");
                let _ = entry.tx.send(Err(BridgeError::Timeout {
                    msg_type: entry.msg_type,
                }));
            }
        });

        match self.pending.get_mut(id) {
            Some(mut entry) => entry.timer = Some(timer.abort_handle()),
            // settled between insert and here
            None => timer.abort(),
        }
        Ok(rx)
    }

    /// Settles `id` with `outcome`. Returns `false` when nothing was pending under that id
    /// (already settled, already timed out, or never issued).
    pub fn settle(&self, id: &str, outcome: Settlement) -> bool {
        match self.pending.remove(id) {
            Some((_, entry)) => {
                if let Some(timer) = entry.timer {
                    timer.abort();
                }
                debug!(id, msg_type = %entry.msg_type, ok = outcome.is_ok(), "settling bridge request");
                let _ = entry.tx.send(outcome);
                true
            }
            None => {
                debug!(id, "dropping response for unknown correlation id");
                false
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl std::fmt::Debug for CorrelationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationRegistry")
            .field("pending", &self.pending.len())
            .finish()
    }
}

//! Physical channels the bridge can run over.
//!
//! A transport has two directions: outward to the host and inward to the editor. The inward side
//! always lands in an [`EditorInbox`], which fans messages out to subscribed
//! [`InboundHandler`]s and buffers them while nobody is listening yet.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{envelope::BridgeMsg, error::BridgeError};

pub trait BridgeTransport: Send + Sync {
    /// Editor → host. Performs no transformation on `msg`.
    fn post_to_host(&self, msg: BridgeMsg) -> Result<(), BridgeError>;
    /// Host → editor, after the bridge has taken out responses it owns.
    fn post_to_editor(&self, msg: BridgeMsg);
}

/// A subscriber gets every inbound message the bridge did not consume itself.
pub trait InboundHandler: Send + Sync {
    fn handle_inbound(&self, msg: &BridgeMsg);
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct EditorInbox {
    queue: Mutex<VecDeque<BridgeMsg>>,
    handlers: Mutex<Vec<Arc<dyn InboundHandler>>>,
}

impl EditorInbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Adds a handler. Messages that arrived before the first handler are replayed to it in order.
    pub fn subscribe(&self, handler: Arc<dyn InboundHandler>) {
        let backlog: Vec<BridgeMsg> = {
            let mut handlers = lock(&self.handlers);
            handlers.push(handler.clone());
            lock(&self.queue).drain(..).collect()
        };
        if !backlog.is_empty() {
            debug!(count = backlog.len(), "flushing queued inbound messages");
        }
        for msg in &backlog {
            handler.handle_inbound(msg);
        }
    }

    pub fn deliver(&self, msg: BridgeMsg) {
        let handlers = {
            let handlers = lock(&self.handlers);
            if handlers.is_empty() {
                trace!(kind = msg.kind(), "no inbound handler yet, queueing");
                lock(&self.queue).push_back(msg);
                return;
            }
            handlers.clone()
        };
        for handler in handlers {
            handler.handle_inbound(&msg);
        }
    }

    pub fn queued(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn handler_count(&self) -> usize {
        lock(&self.handlers).len()
    }
}

/// Host side is a tokio channel; the host drains the paired receiver.
pub struct ChannelTransport {
    host_tx: mpsc::UnboundedSender<BridgeMsg>,
    inbox: Arc<EditorInbox>,
}

impl ChannelTransport {
    pub fn new(inbox: Arc<EditorInbox>) -> (Arc<Self>, mpsc::UnboundedReceiver<BridgeMsg>) {
        let (host_tx, host_rx) = mpsc::unbounded_channel();
        (Arc::new(Self { host_tx, inbox }), host_rx)
    }
}

impl BridgeTransport for ChannelTransport {
    fn post_to_host(&self, msg: BridgeMsg) -> Result<(), BridgeError> {
        self.host_tx
            .send(msg)
            .map_err(|_| BridgeError::Transport("host channel is closed".into()))
    }

    fn post_to_editor(&self, msg: BridgeMsg) {
        self.inbox.deliver(msg);
    }
}

pub type HostCallback = Box<dyn Fn(&BridgeMsg) + Send + Sync>;

/// Host side is a plain callback (the host exposes a `notify` function).
pub struct CallbackTransport {
    notify: HostCallback,
    inbox: Arc<EditorInbox>,
}

impl CallbackTransport {
    pub fn new(inbox: Arc<EditorInbox>, notify: HostCallback) -> Arc<Self> {
        Arc::new(Self { notify, inbox })
    }
}

impl BridgeTransport for CallbackTransport {
    fn post_to_host(&self, msg: BridgeMsg) -> Result<(), BridgeError> {
        (self.notify)(&msg);
        Ok(())
    }

    fn post_to_editor(&self, msg: BridgeMsg) {
        self.inbox.deliver(msg);
    }
}

//! Synchronous in-process event bus carrying raw JSON envelopes, and a transport on top of it.
//!
//! The bus behaves like a shared DOM event target: `dispatch` calls every listener before it
//! returns, and the editor listens on the same bus it dispatches outward on. The transport
//! therefore raises a flag while dispatching and ignores whatever it hears in the meantime.

use std::sync::{
    Arc, Mutex, Weak,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use serde_json::Value;
use tracing::{trace, warn};

use crate::{
    bridge::Bridge,
    envelope::BridgeMsg,
    error::BridgeError,
    transport::{BridgeTransport, EditorInbox, HostCallback, lock},
};

pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners).push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        lock(&self.listeners).retain(|(lid, _)| *lid != id);
    }

    /// Calls every listener synchronously, in subscription order.
    pub fn dispatch(&self, detail: &Value) {
        let listeners: Vec<Listener> = lock(&self.listeners)
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(detail);
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }
}

pub struct EventBusTransport {
    bus: Arc<EventBus>,
    inbox: Arc<EditorInbox>,
    notify: Option<HostCallback>,
    dispatching: AtomicBool,
    listener: Mutex<Option<ListenerId>>,
}

impl EventBusTransport {
    pub fn new(bus: Arc<EventBus>, inbox: Arc<EditorInbox>) -> Arc<Self> {
        Arc::new(Self {
            bus,
            inbox,
            notify: None,
            dispatching: AtomicBool::new(false),
            listener: Mutex::new(None),
        })
    }

    /// Also hands every outbound message to `notify`, for hosts that expose a direct callback
    /// next to the bus.
    pub fn with_host_callback(bus: Arc<EventBus>, inbox: Arc<EditorInbox>, notify: HostCallback) -> Arc<Self> {
        Arc::new(Self {
            bus,
            inbox,
            notify: Some(notify),
            dispatching: AtomicBool::new(false),
            listener: Mutex::new(None),
        })
    }

    /// Starts listening on the bus and feeding valid envelopes into `bridge`.
    ///
    /// The listener keeps `bridge` alive; call [`disconnect`](Self::disconnect) on teardown.
    pub fn connect(self: &Arc<Self>, bridge: Bridge) {
        let me: Weak<Self> = Arc::downgrade(self);
        let id = self.bus.subscribe(Arc::new(move |detail: &Value| {
            let Some(transport) = me.upgrade() else { return };
            if transport.dispatching.load(Ordering::SeqCst) {
                trace!("ignoring own dispatch");
                return;
            }
            match BridgeMsg::decode(detail.clone()) {
                Ok(msg) => bridge.handle_from_host(msg),
                Err(err) => warn!(error = %err, "dropping inbound bus message"),
            }
        }));
        if let Some(previous) = lock(&self.listener).replace(id) {
            self.bus.unsubscribe(previous);
        }
    }

    pub fn disconnect(&self) {
        if let Some(id) = lock(&self.listener).take() {
            self.bus.unsubscribe(id);
        }
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.listener).is_some()
    }
}

impl BridgeTransport for EventBusTransport {
    fn post_to_host(&self, msg: BridgeMsg) -> Result<(), BridgeError> {
        if let Some(notify) = &self.notify {
            notify(&msg);
        }
        let detail = msg.encode()?;
        self.dispatching.store(true, Ordering::SeqCst);
        self.bus.dispatch(&detail);
        self.dispatching.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn post_to_editor(&self, msg: BridgeMsg) {
        self.inbox.deliver(msg);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::transport::InboundHandler;

    #[derive(Default)]
    struct Sink(Mutex<Vec<BridgeMsg>>);
    impl InboundHandler for Sink {
        fn handle_inbound(&self, msg: &BridgeMsg) {
            lock(&self.0).push(msg.clone());
        }
    }

    fn setup() -> (Arc<EventBus>, Arc<EventBusTransport>, Bridge, Arc<Sink>) {
        let bus = EventBus::new();
        let inbox = EditorInbox::new();
        let sink = Arc::new(Sink::default());
        inbox.subscribe(sink.clone());
        let transport = EventBusTransport::new(bus.clone(), inbox);
        let bridge = Bridge::new(transport.clone());
        transport.connect(bridge.clone());
        (bus, transport, bridge, sink)
    }

    #[test]
    fn own_dispatch_is_not_reingested() {
        let (bus, _transport, bridge, sink) = setup();
        let heard = Arc::new(Mutex::new(0));
        let counter = heard.clone();
        bus.subscribe(Arc::new(move |_| *lock(&counter) += 1));

        bridge.emit("SCHEMA_FIELD_ADD_REQUEST", Some(json!({"nodeId": "n"})));

        assert_eq!(*lock(&heard), 1);
        assert!(lock(&sink.0).is_empty());
    }

    #[test]
    fn host_dispatch_reaches_editor_and_bad_versions_do_not() {
        let (bus, _transport, _bridge, sink) = setup();
        bus.dispatch(&json!({"v": 1, "kind": "event", "type": "SCHEMA_LOAD", "payload": {}}));
        bus.dispatch(&json!({"v": 2, "kind": "event", "type": "SCHEMA_LOAD"}));
        bus.dispatch(&json!("not an envelope"));

        let got = lock(&sink.0);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].msg_type(), Some("SCHEMA_LOAD"));
    }

    #[test]
    fn disconnect_stops_listening() {
        let (bus, transport, _bridge, sink) = setup();
        assert_eq!(bus.listener_count(), 1);
        transport.disconnect();
        assert!(!transport.is_connected());
        assert_eq!(bus.listener_count(), 0);
        bus.dispatch(&json!({"v": 1, "kind": "event", "type": "X"}));
        assert!(lock(&sink.0).is_empty());
    }

    #[tokio::test]
    async fn request_round_trip_over_the_bus() {
        let (bus, _transport, bridge, _sink) = setup();

        // host answers every request by dispatching a response on the same bus
        let host_bus = Arc::downgrade(&bus);
        bus.subscribe(Arc::new(move |detail: &Value| {
            if detail.get("kind") == Some(&json!("request")) {
                let id = detail["id"].as_str().unwrap_or_default().to_string();
                let bus = host_bus.upgrade().unwrap();
                tokio::spawn(async move {
                    let rsp = BridgeMsg::success(id, Some(json!({"accepted": true})));
                    bus.dispatch(&rsp.encode().unwrap());
                });
            }
        }));

        let result = bridge
            .request_with_timeout("SCHEMA_VALIDATE", None, Duration::from_secs(2))
            .await;
        assert_eq!(result, Ok(json!({"accepted": true})));
    }

    #[test]
    fn host_callback_sees_outbound_messages() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let transport = EventBusTransport::with_host_callback(
            bus,
            EditorInbox::new(),
            Box::new(move |msg| lock(&sink).push(msg.msg_type().map(str::to_owned))),
        );
        transport.post_to_host(BridgeMsg::event("READY", None)).unwrap();
        assert_eq!(*lock(&seen), vec![Some("READY".to_string())]);
    }
}

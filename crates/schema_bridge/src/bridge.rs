use std::{sync::Arc, time::Duration};

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    envelope::BridgeMsg,
    error::BridgeError,
    registry::CorrelationRegistry,
    transport::BridgeTransport,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Public messaging API: `emit`, `request` and the single inbound entry point `handle_from_host`.
#[derive(Clone)]
pub struct Bridge {
    transport: Arc<dyn BridgeTransport>,
    registry: CorrelationRegistry,
    default_timeout: Duration,
}

impl Bridge {
    pub fn new(transport: Arc<dyn BridgeTransport>) -> Self {
        Self {
            transport,
            registry: CorrelationRegistry::new(),
            default_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn registry(&self) -> &CorrelationRegistry {
        &self.registry
    }

    /// Fire-and-forget. Transport failures are logged and swallowed.
    pub fn emit(&self, msg_type: &str, payload: Option<Value>) {
        if let Err(err) = self.transport.post_to_host(BridgeMsg::event(msg_type, payload)) {
            warn!(msg_type, error = %err, "failed to emit bridge event");
        }
    }

    pub async fn request(&self, msg_type: &str, payload: Option<Value>) -> Result<Value, BridgeError> {
        self.request_with_timeout(msg_type, payload, self.default_timeout).await
    }

    /// Sends a request and waits for the response carrying the same correlation id.
    pub async fn request_with_timeout(
        &self,
        msg_type: &str,
        payload: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, BridgeError> {
        let id = Uuid::new_v4().to_string();
        let rx = self.registry.register(&id, msg_type, timeout)?;

        debug!(%id, msg_type, "sending bridge request");
        if let Err(err) = self
            .transport
            .post_to_host(BridgeMsg::request(id.clone(), msg_type, payload))
        {
            self.registry.settle(&id, Err(err));
        }

        rx.await.unwrap_or(Err(BridgeError::Closed))
    }

    /// Host → editor. Responses are matched against pending requests (unknown ids are dropped);
    /// everything else is forwarded inward untouched.
    pub fn handle_from_host(&self, msg: BridgeMsg) {
        match msg {
            BridgeMsg::Response(rsp) => {
                let outcome = if rsp.ok {
                    Ok(rsp.payload.unwrap_or(Value::Null))
                } else {
                    Err(rsp
                        .error
                        .map(|error| BridgeError::Host { error })
                        .unwrap_or_else(BridgeError::generic_host_error))
                };
                self.registry.settle(&rsp.id, outcome);
            }
            other => self.transport.post_to_editor(other),
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("registry", &self.registry)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::transport::{ChannelTransport, EditorInbox, InboundHandler, lock};

    fn bridge() -> (Bridge, mpsc::UnboundedReceiver<BridgeMsg>, Arc<EditorInbox>) {
        let inbox = EditorInbox::new();
        let (transport, host_rx) = ChannelTransport::new(inbox.clone());
        (Bridge::new(transport), host_rx, inbox)
    }

    fn request_id(msg: &BridgeMsg) -> String {
        match msg {
            BridgeMsg::Request(req) => req.id.clone(),
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn emit_sends_event_envelope() {
        let (bridge, mut host_rx, _) = bridge();
        bridge.emit("SCHEMA_TABLE_DELETE", Some(json!({"id": "node_t1"})));
        let sent = host_rx.recv().await.unwrap();
        assert_eq!(sent, BridgeMsg::event("SCHEMA_TABLE_DELETE", Some(json!({"id": "node_t1"}))));
    }

    #[tokio::test]
    async fn emit_swallows_transport_errors() {
        let (bridge, host_rx, _) = bridge();
        drop(host_rx);
        bridge.emit("X", None);
    }

    #[tokio::test]
    async fn request_resolves_with_response_payload() {
        let (bridge, mut host_rx, _) = bridge();
        let caller = bridge.clone();
        let pending = tokio::spawn(async move { caller.request("FOO", Some(json!({"a": 1}))).await });

        let id = request_id(&host_rx.recv().await.unwrap());
        bridge.handle_from_host(BridgeMsg::success(id.clone(), Some(json!({"b": 2}))));

        assert_eq!(pending.await.unwrap(), Ok(json!({"b": 2})));
        assert!(!bridge.registry().contains(&id));
    }

    #[tokio::test]
    async fn failed_response_rejects_with_host_error() {
        let (bridge, mut host_rx, _) = bridge();
        let caller = bridge.clone();
        let with_error = tokio::spawn(async move { caller.request("FOO", None).await });
        let id = request_id(&host_rx.recv().await.unwrap());
        bridge.handle_from_host(BridgeMsg::fail(id, Some(json!("nope"))));
        assert_eq!(with_error.await.unwrap(), Err(BridgeError::Host { error: json!("nope") }));

        let caller = bridge.clone();
        let without_error = tokio::spawn(async move { caller.request("BAR", None).await });
        let id = request_id(&host_rx.recv().await.unwrap());
        bridge.handle_from_host(BridgeMsg::fail(id, None));
        assert_eq!(without_error.await.unwrap(), Err(BridgeError::generic_host_error()));
    }

    #[tokio::test]
    async fn responses_match_by_id_not_order() {
        let (bridge, mut host_rx, _) = bridge();
        let first = {
            let b = bridge.clone();
            tokio::spawn(async move { b.request("FIRST", None).await })
        };
        let first_id = request_id(&host_rx.recv().await.unwrap());
        let second = {
            let b = bridge.clone();
            tokio::spawn(async move { b.request("SECOND", None).await })
        };
        let second_id = request_id(&host_rx.recv().await.unwrap());
        assert_ne!(first_id, second_id);

        bridge.handle_from_host(BridgeMsg::success(second_id, Some(json!(2))));
        bridge.handle_from_host(BridgeMsg::success(first_id, Some(json!(1))));

        assert_eq!(first.await.unwrap(), Ok(json!(1)));
        assert_eq!(second.await.unwrap(), Ok(json!(2)));
    }

    #[tokio::test]
    async fn request_times_out_and_late_response_is_ignored() {
        let (bridge, mut host_rx, inbox) = bridge();
        let started = std::time::Instant::now();
        let result = bridge
            .request_with_timeout("FOO", Some(json!({})), Duration::from_millis(50))
            .await;
        let elapsed = started.elapsed();

        assert_eq!(result, Err(BridgeError::Timeout { msg_type: "FOO".into() }));
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(1_000));
        assert!(bridge.registry().is_empty());

        let id = request_id(&host_rx.recv().await.unwrap());
        bridge.handle_from_host(BridgeMsg::success(id, None));
        assert!(bridge.registry().is_empty());
        // a consumed response never reaches the editor side
        assert_eq!(inbox.queued(), 0);
    }

    #[tokio::test]
    async fn request_fails_fast_when_host_is_gone() {
        let (bridge, host_rx, _) = bridge();
        drop(host_rx);
        let err = bridge.request("FOO", None).await.unwrap_err();
        assert!(matches!(err, BridgeError::Transport(_)));
        assert!(bridge.registry().is_empty());
    }

    #[tokio::test]
    async fn events_are_forwarded_inward_untouched() {
        #[derive(Default)]
        struct Sink(Mutex<Vec<BridgeMsg>>);
        impl InboundHandler for Sink {
            fn handle_inbound(&self, msg: &BridgeMsg) {
                lock(&self.0).push(msg.clone());
            }
        }

        let (bridge, _host_rx, inbox) = bridge();
        let sink = Arc::new(Sink::default());
        inbox.subscribe(sink.clone());

        let event = BridgeMsg::event("SCHEMA_LOAD", Some(json!({"tables": []})));
        let request = BridgeMsg::request("r1", "HOST_ASKS", None);
        bridge.handle_from_host(event.clone());
        bridge.handle_from_host(request.clone());
        bridge.handle_from_host(BridgeMsg::success("unknown", None));

        assert_eq!(*lock(&sink.0), vec![event, request]);
    }
}

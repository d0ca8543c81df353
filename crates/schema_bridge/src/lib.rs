pub mod bridge;
pub mod envelope;
pub mod error;
pub mod event_bus;
pub mod lines;
pub mod registry;
pub mod transport;

pub use bridge::{Bridge, DEFAULT_REQUEST_TIMEOUT};
pub use envelope::{BridgeMsg, EventMsg, RequestMsg, ResponseMsg};
pub use error::BridgeError;
pub use transport::{BridgeTransport, EditorInbox, InboundHandler};

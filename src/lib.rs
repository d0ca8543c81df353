pub mod config;
pub mod editor;
pub mod graph;
pub mod loader;
pub mod logger;
pub mod model;
pub mod router;
pub mod schema;
pub mod schema_commands;
pub mod store;
pub mod validation;

pub use editor::{Connection, IntentError, SchemaEditor};
pub use graph::{LinkForm, LinkRequest, NewTable, SchemaGraph, Violation};
pub use loader::{SchemaData, export_schema, load_schema};
pub use router::{EventRouter, SchemaEvent, SchemaEventType};
pub use store::{GraphChange, SchemaStore};

// src/schema.rs

use std::{fs, path::Path};

use anyhow::Error;
use schema_bridge::BridgeMsg;
use schemars::{JsonSchema, schema_for};
use tracing::info;

use crate::{
    config::EditorConfig,
    loader::SchemaData,
    model::{Edge, TableNode},
};

/// File names written by [`write_schema`].
pub const SCHEMA_FILES: [&str; 5] = [
    "schema-data.schema.json",
    "table-node.schema.json",
    "edge.schema.json",
    "bridge-envelope.schema.json",
    "editor-config.schema.json",
];

/// The entry point invoked by `main.rs` for `Commands::Schema`.
pub fn write_schema(out_dir: &Path) -> Result<(), Error> {
    fs::create_dir_all(out_dir)?;

    write_one::<SchemaData>(out_dir, SCHEMA_FILES[0])?;
    write_one::<TableNode>(out_dir, SCHEMA_FILES[1])?;
    write_one::<Edge>(out_dir, SCHEMA_FILES[2])?;
    write_one::<BridgeMsg>(out_dir, SCHEMA_FILES[3])?;
    write_one::<EditorConfig>(out_dir, SCHEMA_FILES[4])?;

    info!("schemas written to {}", out_dir.display());
    Ok(())
}

fn write_one<T: JsonSchema>(out_dir: &Path, file_name: &str) -> Result<(), Error> {
    let schema = schema_for!(T);
    let json = serde_json::to_string_pretty(&schema)?;
    fs::write(out_dir.join(file_name), json)?;
    Ok(())
}

// src/validation.rs
//
// Name rules follow PostgreSQL identifiers; relationship keys must be type-compatible.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::{
    graph::{LinkRequest, SchemaGraph},
    model::Field,
};

pub const MAX_NAME_LENGTH: usize = 63;
pub const RESERVED_NAMES: [&str; 3] = ["id", "created_at", "updated_at"];

static IDENTIFIER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").ok());

const COMPATIBLE_TYPE_GROUPS: &[&[&str]] = &[
    &["integer", "int", "bigint", "smallint", "serial", "bigserial", "int8", "int4", "int2"],
    &["varchar", "text", "char", "character varying", "string"],
    &["uuid"],
    &["decimal", "numeric", "real", "double precision", "float"],
    &["timestamp", "timestamptz", "date", "time"],
    &["boolean", "bool"],
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{what} name is required")]
    NameRequired { what: &'static str },

    #[error("{what} name '{name}' is longer than 63 characters")]
    NameTooLong { what: &'static str, name: String },

    #[error("field name '{0}' may only contain letters, digits and underscores and must not start with a digit")]
    InvalidFieldName(String),

    #[error("field '{field}' already exists on table {table}")]
    DuplicateField { table: String, field: String },

    #[error("source table {0} not found")]
    SourceTableNotFound(String),

    #[error("target table {0} not found")]
    TargetTableNotFound(String),

    #[error("source key '{0}' not found")]
    SourceKeyNotFound(String),

    #[error("target key '{0}' not found")]
    TargetKeyNotFound(String),

    #[error("cannot link through '{field}' because it is of type '{field_type}'")]
    CompositeKey { field: String, field_type: String },

    #[error("type mismatch: {source_field} ({source_type}) vs {target_field} ({target_type})")]
    IncompatibleTypes {
        source_field: String,
        source_type: String,
        target_field: String,
        target_type: String,
    },

    #[error("table {0} cannot be connected to itself")]
    SelfConnection(String),
}

pub fn validate_field_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::NameRequired { what: "field" });
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::NameTooLong {
            what: "field",
            name: name.to_string(),
        });
    }
    if !IDENTIFIER.as_ref().is_some_and(|re| re.is_match(name)) {
        return Err(ValidationError::InvalidFieldName(name.to_string()));
    }
    Ok(())
}

pub fn validate_table_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::NameRequired { what: "table" });
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::NameTooLong {
            what: "table",
            name: name.to_string(),
        });
    }
    Ok(())
}

pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_NAMES.contains(&name.to_lowercase().as_str())
}

/// Coerces arbitrary input into a valid field name.
pub fn sanitize_field_name(name: &str) -> String {
    let mut out: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out.chars().take(MAX_NAME_LENGTH).collect()
}

/// Exact match (case-insensitive) or membership in the same type group.
pub fn types_compatible(source_type: &str, target_type: &str) -> bool {
    let s = source_type.to_lowercase();
    let t = target_type.to_lowercase();
    s == t
        || COMPATIBLE_TYPE_GROUPS
            .iter()
            .any(|group| group.contains(&s.as_str()) && group.contains(&t.as_str()))
}

pub fn validate_relationship_types(source: &Field, target: &Field) -> Result<(), ValidationError> {
    for field in [source, target] {
        if field.is_composite() {
            return Err(ValidationError::CompositeKey {
                field: field.name.clone(),
                field_type: field.field_type.clone(),
            });
        }
    }
    if types_compatible(&source.field_type, &target.field_type) {
        Ok(())
    } else {
        Err(ValidationError::IncompatibleTypes {
            source_field: source.name.clone(),
            source_type: source.field_type.clone(),
            target_field: target.name.clone(),
            target_type: target.field_type.clone(),
        })
    }
}

/// Checks a link form submission against the current graph.
pub fn validate_link(graph: &SchemaGraph, link: &LinkRequest) -> Result<(), ValidationError> {
    let source = graph
        .node(&link.source_node_id)
        .ok_or_else(|| ValidationError::SourceTableNotFound(link.source_node_id.clone()))?;
    let target = graph
        .node(&link.target_node_id)
        .ok_or_else(|| ValidationError::TargetTableNotFound(link.target_node_id.clone()))?;

    validate_field_name(link.field_name.trim())?;

    let source_key = source
        .data
        .field(&link.source_key)
        .ok_or_else(|| ValidationError::SourceKeyNotFound(link.source_key.clone()))?;
    let target_key = target
        .data
        .field(&link.target_key)
        .ok_or_else(|| ValidationError::TargetKeyNotFound(link.target_key.clone()))?;

    // a same-named relationship field is replaced on confirm; any other field is a clash
    if let Some(existing) = source.data.field(link.field_name.trim()) {
        if !existing.is_composite() {
            return Err(ValidationError::DuplicateField {
                table: source.id.clone(),
                field: existing.name.clone(),
            });
        }
    }

    validate_relationship_types(source_key, target_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NewTable;

    #[test]
    fn field_names() {
        assert!(validate_field_name("user_id").is_ok());
        assert!(validate_field_name("_x9").is_ok());
        assert_eq!(
            validate_field_name("  "),
            Err(ValidationError::NameRequired { what: "field" })
        );
        assert!(matches!(
            validate_field_name("9lives"),
            Err(ValidationError::InvalidFieldName(_))
        ));
        assert!(matches!(
            validate_field_name("has space"),
            Err(ValidationError::InvalidFieldName(_))
        ));
        let long = "a".repeat(64);
        assert!(matches!(
            validate_field_name(&long),
            Err(ValidationError::NameTooLong { .. })
        ));
        assert!(validate_field_name(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn table_names_allow_spaces() {
        assert!(validate_table_name("Order Items").is_ok());
        assert!(validate_table_name("").is_err());
    }

    #[test]
    fn reserved_and_sanitize() {
        assert!(is_reserved_name("ID"));
        assert!(is_reserved_name("created_at"));
        assert!(!is_reserved_name("email"));
        assert_eq!(sanitize_field_name(" Order Total! "), "order_total_");
        assert_eq!(sanitize_field_name("1st"), "_1st");
        assert_eq!(sanitize_field_name(&"x".repeat(80)).len(), MAX_NAME_LENGTH);
    }

    #[test]
    fn type_groups() {
        assert!(types_compatible("INT4", "bigint"));
        assert!(types_compatible("varchar", "text"));
        assert!(types_compatible("jsonb", "JSONB"));
        assert!(!types_compatible("uuid", "varchar"));
        assert!(!types_compatible("date", "int"));
    }

    fn shop() -> SchemaGraph {
        let mut g = SchemaGraph::new();
        g.add_table(NewTable {
            id: Some("users".into()),
            columns: vec![
                Field::new("id", "int").primary_key(),
                Field::new("email", "varchar"),
                Field::new("tags", "array"),
            ],
            ..NewTable::named("Users")
        });
        g.add_table(NewTable {
            id: Some("orders".into()),
            columns: vec![Field::new("id", "int").primary_key(), Field::new("user_id", "bigint")],
            ..NewTable::named("Orders")
        });
        g
    }

    fn link(field: &str, source_key: &str, target_key: &str) -> LinkRequest {
        LinkRequest {
            source_node_id: "users".into(),
            target_node_id: "orders".into(),
            source_key: source_key.into(),
            target_key: target_key.into(),
            field_name: field.into(),
            relationship_type: None,
        }
    }

    #[test]
    fn link_checks() {
        let g = shop();
        assert!(validate_link(&g, &link("orders", "id", "user_id")).is_ok());
        assert!(matches!(
            validate_link(&g, &link("orders", "email", "user_id")),
            Err(ValidationError::IncompatibleTypes { .. })
        ));
        assert!(matches!(
            validate_link(&g, &link("orders", "tags", "user_id")),
            Err(ValidationError::CompositeKey { .. })
        ));
        assert_eq!(
            validate_link(&g, &link("orders", "nope", "user_id")),
            Err(ValidationError::SourceKeyNotFound("nope".into()))
        );
        assert!(matches!(
            validate_link(&g, &link("email", "id", "user_id")),
            Err(ValidationError::DuplicateField { .. })
        ));
        // relinking through an existing relationship field replaces it
        assert!(validate_link(&g, &link("tags", "id", "user_id")).is_ok());

        let mut missing = link("orders", "id", "user_id");
        missing.target_node_id = "ghost".into();
        assert_eq!(
            validate_link(&g, &missing),
            Err(ValidationError::TargetTableNotFound("ghost".into()))
        );
    }
}

//! Field schema cache
//!
//! Field and option IDs are fetched once per project and reused for every
//! value resolution in the same invocation.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::api::{ApiError, FieldDataType, FieldSchema, ProjectApi, ResolvedUpdate, UpdateValue};

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Failed to fetch fields for project {project}: {source}")]
    SchemaFetch {
        project: String,
        #[source]
        source: ApiError,
    },

    #[error("Field '{0}' does not exist on this project")]
    UnknownField(String),

    #[error("Invalid value '{value}' for field '{field}'. Available values: {}", .available.join(", "))]
    InvalidFieldValue {
        field: String,
        value: String,
        available: Vec<String>,
    },

    #[error("Field '{field}' has unsupported type {data_type:?}")]
    UnsupportedField {
        field: String,
        data_type: FieldDataType,
    },
}

/// A value checked against the schema, not yet bound to an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedValue {
    pub field_id: String,
    pub field_name: String,
    pub value: UpdateValue,
}

impl ResolvedValue {
    pub fn for_item(&self, item_id: &str) -> ResolvedUpdate {
        ResolvedUpdate {
            item_id: item_id.to_string(),
            field_id: self.field_id.clone(),
            field_name: self.field_name.clone(),
            value: self.value.clone(),
        }
    }
}

/// Project fields memoized by project ID
#[derive(Debug, Default)]
pub struct FieldSchemaCache {
    entries: HashMap<String, Vec<FieldSchema>>,
}

impl FieldSchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fields for a project, fetched on first use
    pub fn get_fields(
        &mut self,
        api: &dyn ProjectApi,
        project_id: &str,
    ) -> Result<&[FieldSchema], SchemaError> {
        if !self.entries.contains_key(project_id) {
            let fields =
                api.get_project_fields(project_id)
                    .map_err(|source| SchemaError::SchemaFetch {
                        project: project_id.to_string(),
                        source,
                    })?;
            debug!(project = project_id, count = fields.len(), "cached field schema");
            self.entries.insert(project_id.to_string(), fields);
        }
        Ok(&self.entries[project_id])
    }

    /// Checks `value` against `field` and maps it to IDs
    pub fn resolve(
        &mut self,
        api: &dyn ProjectApi,
        project_id: &str,
        field: &str,
        value: &str,
    ) -> Result<ResolvedValue, SchemaError> {
        let fields = self.get_fields(api, project_id)?;
        resolve_value(fields, field, value)
    }
}

fn resolve_value(
    fields: &[FieldSchema],
    field: &str,
    value: &str,
) -> Result<ResolvedValue, SchemaError> {
    let schema = fields
        .iter()
        .find(|f| f.name.eq_ignore_ascii_case(field))
        .ok_or_else(|| SchemaError::UnknownField(field.to_string()))?;

    let resolved = |value: UpdateValue| -> Result<ResolvedValue, SchemaError> {
        Ok(ResolvedValue {
            field_id: schema.id.clone(),
            field_name: schema.name.clone(),
            value,
        })
    };

    if value.is_empty() {
        return resolved(UpdateValue::Clear);
    }

    match schema.data_type {
        FieldDataType::SingleSelect => match schema.option(value) {
            Some(option) => resolved(UpdateValue::SingleSelect {
                option_id: option.id.clone(),
                name: option.name.clone(),
            }),
            None => Err(SchemaError::InvalidFieldValue {
                field: schema.name.clone(),
                value: value.to_string(),
                available: schema
                    .option_names()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            }),
        },
        FieldDataType::Text => resolved(UpdateValue::Text {
            text: value.to_string(),
        }),
        other => Err(SchemaError::UnsupportedField {
            field: schema.name.clone(),
            data_type: other,
        }),
    }
}

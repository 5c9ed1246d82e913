//! Request parameter validation.
//!
//! A validator receives the caller's params and either returns the cleaned
//! params or fails with a `{field: [messages]}` map. Validation failures are
//! never retried and never reach the network.

use crate::error::FieldErrors;
use crate::types::Params;
use crate::{Error, Result};
use jsonschema::error::ValidationErrorKind;
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

/// Field key used for errors that do not belong to a single field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

pub trait RequestValidator: Send + Sync {
    fn validate(&self, params: Params) -> Result<Params>;

    fn name(&self) -> &str {
        "request_validator"
    }
}

impl<F> RequestValidator for F
where
    F: Fn(Params) -> std::result::Result<Params, FieldErrors> + Send + Sync,
{
    fn validate(&self, params: Params) -> Result<Params> {
        self(params).map_err(|errors| Error::request_validation("invalid request params", errors))
    }

    fn name(&self) -> &str {
        "closure"
    }
}

/// Rejects params missing any of the listed fields (null counts as missing).
#[derive(Debug, Clone, Default)]
pub struct RequiredFieldsValidator {
    fields: Vec<String>,
}

impl RequiredFieldsValidator {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl RequestValidator for RequiredFieldsValidator {
    fn validate(&self, params: Params) -> Result<Params> {
        let mut errors = FieldErrors::new();
        for field in &self.fields {
            if matches!(params.get(field), None | Some(Value::Null)) {
                errors
                    .entry(field.clone())
                    .or_default()
                    .push("This field is required.".to_string());
            }
        }
        if errors.is_empty() {
            Ok(params)
        } else {
            Err(Error::request_validation("missing required fields", errors))
        }
    }

    fn name(&self) -> &str {
        "required_fields"
    }
}

/// Validates params against a JSON Schema (draft 7).
pub struct JsonSchemaRequestValidator {
    schema: JSONSchema,
}

impl JsonSchemaRequestValidator {
    pub fn new(schema: &Value) -> Result<Self> {
        let schema = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(schema)
            .map_err(|e| Error::configuration(format!("Failed to compile request schema: {}", e)))?;
        Ok(Self { schema })
    }
}

impl RequestValidator for JsonSchemaRequestValidator {
    fn validate(&self, params: Params) -> Result<Params> {
        let instance = Value::Object(params);
        let errors = match self.schema.validate(&instance) {
            Ok(()) => None,
            Err(iter) => {
                let mut errors = FieldErrors::new();
                for e in iter {
                    let field = match &e.kind {
                        ValidationErrorKind::Required { property } => property
                            .as_str()
                            .map(str::to_string)
                            .unwrap_or_else(|| property.to_string()),
                        _ => pointer_to_field(&e.instance_path.to_string()),
                    };
                    errors.entry(field).or_default().push(e.to_string());
                }
                Some(errors)
            }
        };
        match (errors, instance) {
            (Some(errors), _) => Err(Error::request_validation("schema validation failed", errors)),
            (None, Value::Object(params)) => Ok(params),
            (None, _) => Ok(Params::new()),
        }
    }

    fn name(&self) -> &str {
        "json_schema"
    }
}

fn pointer_to_field(pointer: &str) -> String {
    let trimmed = pointer.trim_start_matches('/');
    if trimmed.is_empty() {
        NON_FIELD_ERRORS.to_string()
    } else {
        trimmed.replace('/', ".")
    }
}

//! Response validation.

use crate::types::Payload;
use crate::{Error, Result};
use jsonschema::{Draft, JSONSchema};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Response facts available to validators once the body has been parsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseMeta {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub url: String,
}

pub trait ResponseValidator: Send + Sync {
    fn validate(&self, meta: &ResponseMeta, data: &Payload) -> Result<()>;

    fn name(&self) -> &str {
        "response_validator"
    }
}

impl<F> ResponseValidator for F
where
    F: Fn(&ResponseMeta, &Payload) -> Result<()> + Send + Sync,
{
    fn validate(&self, meta: &ResponseMeta, data: &Payload) -> Result<()> {
        self(meta, data)
    }

    fn name(&self) -> &str {
        "closure"
    }
}

/// Accepts only the listed status codes.
#[derive(Debug, Clone)]
pub struct StatusCodeValidator {
    allowed: BTreeSet<u16>,
}

impl StatusCodeValidator {
    pub fn new<I: IntoIterator<Item = u16>>(allowed: I) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }
}

impl Default for StatusCodeValidator {
    fn default() -> Self {
        Self::new([200])
    }
}

impl ResponseValidator for StatusCodeValidator {
    fn validate(&self, meta: &ResponseMeta, _data: &Payload) -> Result<()> {
        if self.allowed.contains(&meta.status) {
            return Ok(());
        }
        Err(Error::response_validation(
            format!("unexpected status code {}", meta.status),
            Some(meta.status),
            Some(json!({ "allowed": self.allowed })),
        ))
    }

    fn name(&self) -> &str {
        "status_code"
    }
}

/// Validates JSON payloads against a JSON Schema (draft 7).
pub struct JsonSchemaValidator {
    schema: JSONSchema,
}

impl JsonSchemaValidator {
    pub fn new(schema: &Value) -> Result<Self> {
        let schema = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(schema)
            .map_err(|e| Error::configuration(format!("Failed to compile response schema: {}", e)))?;
        Ok(Self { schema })
    }
}

impl ResponseValidator for JsonSchemaValidator {
    fn validate(&self, meta: &ResponseMeta, data: &Payload) -> Result<()> {
        let null = Value::Null;
        let value = match data {
            Payload::Json(v) => v,
            Payload::Empty => &null,
            _ => {
                return Err(Error::response_validation(
                    "schema validation requires a JSON payload",
                    Some(meta.status),
                    None,
                ))
            }
        };
        if let Err(errors) = self.schema.validate(value) {
            let messages: Vec<Value> = errors
                .map(|e| {
                    json!({
                        "path": e.instance_path.to_string(),
                        "message": e.to_string(),
                    })
                })
                .collect();
            return Err(Error::response_validation(
                "response does not match schema",
                Some(meta.status),
                Some(Value::Array(messages)),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "json_schema"
    }
}

/// Runs validators in order and stops at the first failure.
///
/// Any failure is reported as a response-validation error that keeps the
/// response status.
#[derive(Clone, Default)]
pub struct ValidatorChain {
    validators: Vec<Arc<dyn ResponseValidator>>,
}

impl ValidatorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, validator: Arc<dyn ResponseValidator>) {
        self.validators.push(validator);
    }

    pub fn with(mut self, validator: Arc<dyn ResponseValidator>) -> Self {
        self.push(validator);
        self
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn validate(&self, meta: &ResponseMeta, data: &Payload) -> Result<()> {
        for v in &self.validators {
            v.validate(meta, data).map_err(|e| match e {
                Error::ResponseValidation {
                    message,
                    status,
                    details,
                    context,
                } => Error::ResponseValidation {
                    message,
                    status: status.or(Some(meta.status)),
                    details,
                    context: context.with_source(v.name().to_string()),
                },
                other => Error::response_validation(
                    format!("{}: {}", v.name(), other),
                    Some(meta.status),
                    None,
                ),
            })?;
        }
        Ok(())
    }
}

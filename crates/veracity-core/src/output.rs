//! Structured model output: schemas, repair and validation.
//!
//! Model responses are validated against a JSON Schema before they are
//! deserialized. Responses wrapped in Markdown fences or surrounded by
//! prose are repaired by extracting the JSON object first.

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

lazy_static! {
    static ref FENCED_BLOCK: Regex =
        Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").expect("valid fence regex");
}

/// Errors from parsing model output.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OutputError {
    #[error("Response is empty")]
    Empty,

    #[error("Response is not valid JSON: {0}")]
    Json(String),

    #[error("Response violates schema '{schema}': {}", errors.join("; "))]
    Schema { schema: String, errors: Vec<String> },

    #[error("Invalid schema '{schema}': {message}")]
    InvalidSchema { schema: String, message: String },
}

impl OutputError {
    /// Whether the output parsed but did not match the schema.
    pub fn is_schema_violation(&self) -> bool {
        matches!(self, OutputError::Schema { .. })
    }
}

/// A named JSON Schema that model output must satisfy.
///
/// The compiled validator is shared, so cloning is cheap.
#[derive(Clone)]
pub struct OutputSchema {
    name: String,
    schema: JsonValue,
    validator: Arc<jsonschema::Validator>,
}

impl fmt::Debug for OutputSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSchema")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish()
    }
}

impl OutputSchema {
    /// Compile a schema.
    pub fn new(name: impl Into<String>, schema: JsonValue) -> Result<Self, OutputError> {
        let name = name.into();
        let validator = jsonschema::options()
            .build(&schema)
            .map_err(|e| OutputError::InvalidSchema {
                schema: name.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            name,
            schema,
            validator: Arc::new(validator),
        })
    }

    /// Schema name, as sent to providers that support named schemas.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw JSON Schema.
    pub fn json_schema(&self) -> &JsonValue {
        &self.schema
    }

    /// Validate a JSON value against the schema.
    pub fn validate(&self, value: &JsonValue) -> Result<(), OutputError> {
        let errors: Vec<String> = self
            .validator
            .iter_errors(value)
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(OutputError::Schema {
                schema: self.name.clone(),
                errors,
            })
        }
    }

    /// Repair, validate and deserialize a raw model response.
    pub fn parse<T: DeserializeOwned>(&self, raw: &str) -> Result<T, OutputError> {
        let candidate = extract_json(raw).ok_or(OutputError::Empty)?;
        let value: JsonValue =
            serde_json::from_str(candidate).map_err(|e| OutputError::Json(e.to_string()))?;
        self.validate(&value)?;
        serde_json::from_value(value).map_err(|e| OutputError::Json(e.to_string()))
    }
}

/// Pull the JSON object out of a model response.
///
/// Prefers a fenced code block, then the span from the first `{` to the
/// last `}`, then the trimmed response as-is.
pub fn extract_json(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(inner) = FENCED_BLOCK.captures(trimmed).and_then(|c| c.get(1)) {
        let inner = inner.as_str().trim();
        if !inner.is_empty() {
            return Some(inner);
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(&trimmed[start..=end]),
        _ => Some(trimmed),
    }
}

/// Structured output of an evidence evaluation call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvaluationOutput {
    /// Verdict tag as produced by the model (validated later)
    pub verdict: String,

    /// Short reasoning for the verdict
    pub reasoning: String,

    /// 1-based indices of the sources that influenced the verdict
    #[serde(default)]
    pub influential_source_indices: Vec<i64>,
}

static EVALUATION_SCHEMA: OnceLock<Result<OutputSchema, OutputError>> = OnceLock::new();
static QUERY_SCHEMA: OnceLock<Result<OutputSchema, OutputError>> = OnceLock::new();

impl EvaluationOutput {
    /// The schema evaluation responses must satisfy.
    pub fn schema() -> Result<&'static OutputSchema, OutputError> {
        EVALUATION_SCHEMA
            .get_or_init(|| {
                OutputSchema::new(
                    "evidence_evaluation",
                    serde_json::json!({
                        "type": "object",
                        "properties": {
                            "verdict": {
                                "type": "string",
                                "description": "One of: Supported, Refuted, \
                                    Insufficient Information, Conflicting Evidence"
                            },
                            "reasoning": {
                                "type": "string",
                                "description":
                                    "Concise reasoning for the verdict based only on the evidence"
                            },
                            "influential_source_indices": {
                                "type": "array",
                                "items": { "type": "integer" },
                                "description":
                                    "1-based indices of the sources consulted for the verdict"
                            }
                        },
                        "required": ["verdict", "reasoning"]
                    }),
                )
            })
            .as_ref()
            .map_err(Clone::clone)
    }
}

/// Structured output of a search query generation call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryOutput {
    /// The web search query to run next
    pub query: String,
}

impl QueryOutput {
    /// The schema query generation responses must satisfy.
    pub fn schema() -> Result<&'static OutputSchema, OutputError> {
        QUERY_SCHEMA
            .get_or_init(|| {
                OutputSchema::new(
                    "search_query",
                    serde_json::json!({
                        "type": "object",
                        "properties": {
                            "query": { "type": "string", "minLength": 1 }
                        },
                        "required": ["query"]
                    }),
                )
            })
            .as_ref()
            .map_err(Clone::clone)
    }
}

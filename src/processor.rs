//! Server-side functions over stored documents
//!
//! Filters select entries, extractors name the field a filter or processor
//! works on, and entry processors mutate a selected entry in place. All of
//! them are serializable so a client can ship them to the grid instead of
//! pulling entries over the network.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Failure to apply a processor to one entry
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProcessorError {
    #[error("field {0} not found")]
    MissingField(String),

    #[error("field {0} is not numeric")]
    NotNumeric(String),

    #[error("integer overflow multiplying field {0}")]
    Overflow(String),

    #[error("multiplying field {0} gives a non-finite result")]
    NonFinite(String),
}

/// Names a field of a stored document. Dotted paths descend into nested
/// objects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extractor(pub String);

impl Extractor {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &str {
        &self.0
    }

    pub fn extract<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.0
            .split('.')
            .try_fold(value, |current, segment| current.get(segment))
    }

    pub fn extract_mut<'a>(&self, value: &'a mut Value) -> Option<&'a mut Value> {
        self.0
            .split('.')
            .try_fold(value, |current, segment| current.get_mut(segment))
    }
}

impl From<&str> for Extractor {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Predicate evaluated against each entry on the grid
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    Always,
    Equal { extractor: Extractor, value: Value },
    And { filters: Vec<Filter> },
}

impl Filter {
    pub fn equal(extractor: impl Into<Extractor>, value: impl Into<Value>) -> Self {
        Self::Equal {
            extractor: extractor.into(),
            value: value.into(),
        }
    }

    pub fn evaluate(&self, value: &Value) -> bool {
        match self {
            Filter::Always => true,
            Filter::Equal {
                extractor,
                value: expected,
            } => extractor.extract(value) == Some(expected),
            Filter::And { filters } => filters.iter().all(|f| f.evaluate(value)),
        }
    }
}

/// Multiplier carried by a `Multiply` processor
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Factor {
    Int(i64),
    Float(f64),
}

impl Factor {
    fn as_f64(self) -> f64 {
        match self {
            Factor::Int(n) => n as f64,
            Factor::Float(x) => x,
        }
    }
}

/// Mutation (or read) applied in place to one entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Processor {
    /// Multiply a numeric field, returning its new value
    Multiply {
        field: Extractor,
        factor: Factor,
        /// Results below this value are raised to it
        #[serde(default, skip_serializing_if = "Option::is_none")]
        floor: Option<f64>,
    },
    /// Return a field without changing the entry
    Extract { field: Extractor },
}

impl Processor {
    /// Multiply by an integer; integer fields stay integers
    pub fn multiply(field: impl Into<Extractor>, factor: i64) -> Self {
        Self::Multiply {
            field: field.into(),
            factor: Factor::Int(factor),
            floor: None,
        }
    }

    /// Multiply by a float. A non-finite factor fails when applied.
    pub fn multiply_f64(field: impl Into<Extractor>, factor: f64) -> Self {
        Self::Multiply {
            field: field.into(),
            factor: Factor::Float(factor),
            floor: None,
        }
    }

    pub fn extract(field: impl Into<Extractor>) -> Self {
        Self::Extract {
            field: field.into(),
        }
    }

    pub fn with_floor(self, min: f64) -> Self {
        match self {
            Processor::Multiply { field, factor, .. } => Processor::Multiply {
                field,
                factor,
                floor: Some(min),
            },
            other => other,
        }
    }

    /// Whether applying this processor can change the entry
    pub fn is_mutating(&self) -> bool {
        matches!(self, Processor::Multiply { .. })
    }

    /// Apply to a document. On error the document is left untouched.
    pub fn apply(&self, value: &mut Value) -> Result<Value, ProcessorError> {
        match self {
            Processor::Multiply {
                field,
                factor,
                floor,
            } => {
                let current = field
                    .extract_mut(value)
                    .ok_or_else(|| ProcessorError::MissingField(field.path().to_string()))?;
                let result = multiply(field.path(), current, *factor, *floor)?;
                *current = result.clone();
                Ok(result)
            }
            Processor::Extract { field } => field
                .extract(value)
                .cloned()
                .ok_or_else(|| ProcessorError::MissingField(field.path().to_string())),
        }
    }
}

fn multiply(
    path: &str,
    current: &Value,
    factor: Factor,
    floor: Option<f64>,
) -> Result<Value, ProcessorError> {
    let Value::Number(number) = current else {
        return Err(ProcessorError::NotNumeric(path.to_string()));
    };

    if floor.is_none() {
        if let (Some(a), Factor::Int(b)) = (number.as_i64(), factor) {
            return a
                .checked_mul(b)
                .map(Value::from)
                .ok_or_else(|| ProcessorError::Overflow(path.to_string()));
        }
    }

    let a = number
        .as_f64()
        .ok_or_else(|| ProcessorError::NotNumeric(path.to_string()))?;
    let b = factor.as_f64();
    if !b.is_finite() {
        return Err(ProcessorError::NonFinite(path.to_string()));
    }

    let mut result = a * b;
    if let Some(min) = floor {
        if result <= min {
            result = min;
        }
    }

    serde_json::Number::from_f64(result)
        .map(Value::Number)
        .ok_or_else(|| ProcessorError::NonFinite(path.to_string()))
}

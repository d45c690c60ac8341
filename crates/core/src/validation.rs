//! Schema validation collaborator
//!
//! Before any row is appended its domain payload passes through validation.
//! Two layers run in order:
//!
//! 1. `Entity::validate` declared on the entity type itself
//! 2. An optional caller-supplied `Validator<T>` installed on the store
//!
//! Both report field-level problems through `ValidationErrors`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A problem with one field of a payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field name as it appears in the entity's serialized form
    pub field: String,
    /// Human-readable description
    pub message: String,
}

impl FieldError {
    /// Create a field error
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Structured set of field-level errors
///
/// Never empty when returned inside an `Err`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// Empty set, for accumulating
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-error set
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError::new(field, message)],
        }
    }

    /// Record an error
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    /// Append every error from another set
    pub fn extend(&mut self, other: ValidationErrors) {
        self.errors.extend(other.errors);
    }

    /// `Ok(())` if nothing was recorded, otherwise `Err(self)`
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Recorded errors in insertion order
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Errors for one field
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FieldError> + 'a {
        self.errors.iter().filter(move |e| e.field == field)
    }

    /// Whether any error mentions this field
    pub fn has_field(&self, field: &str) -> bool {
        self.for_field(field).next().is_some()
    }

    /// Number of errors
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Whether no errors were recorded
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for err in &self.errors {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}", err)?;
            first = false;
        }
        Ok(())
    }
}

impl FromIterator<FieldError> for ValidationErrors {
    fn from_iter<I: IntoIterator<Item = FieldError>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

/// Caller-supplied validation of a candidate payload
///
/// Receives the fully merged payload and returns either the validated
/// payload (possibly normalized, e.g. trimmed strings) or field errors.
pub trait Validator<T>: Send + Sync {
    /// Validate (and optionally normalize) a candidate payload
    fn validate(&self, candidate: T) -> Result<T, ValidationErrors>;
}

impl<T, F> Validator<T> for F
where
    F: Fn(T) -> Result<T, ValidationErrors> + Send + Sync,
{
    fn validate(&self, candidate: T) -> Result<T, ValidationErrors> {
        self(candidate)
    }
}

/// Validator that accepts everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl<T> Validator<T> for AcceptAll {
    fn validate(&self, candidate: T) -> Result<T, ValidationErrors> {
        Ok(candidate)
    }
}

//! Change payloads and key normalization
//!
//! Callers hand the store untrusted maps of field name to value. Before a
//! change is overlaid onto the latest row, its keys are normalized one at a
//! time:
//!
//! - surrounding whitespace is trimmed
//! - `camelCase`, `PascalCase`, `kebab-case` and `space separated` keys are
//!   converted to `snake_case`
//! - protected columns and unknown fields are dropped individually
//!
//! A bad key is reported in `Normalized::dropped` and never invalidates the
//! other keys of the same payload.

use crate::contract::row::PROTECTED_FIELDS;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::validation::ValidationErrors;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Field-name to value overlay applied on top of the latest row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Changes {
    fields: Map<String, Value>,
}

impl Changes {
    /// Empty change set
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// In-place insert
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Build from an arbitrary JSON value
    ///
    /// Anything other than an object is a validation error.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(Error::Validation(ValidationErrors::single(
                "_payload",
                format!("expected an object, got {}", json_kind(&other)),
            ))),
        }
    }

    /// Value for a key, if present
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Iterate over entries
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether there is nothing to overlay
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Normalize keys against the set of fields the entity accepts
    ///
    /// A key the entity knows verbatim is kept as written, so entities
    /// whose serialized names are not snake_case still accept their own
    /// field names. Otherwise the key's snake_case spelling is tried.
    ///
    /// Exact matches take precedence over converted spellings: if both
    /// `display_name` and `displayName` are present, the latter is dropped
    /// as a duplicate.
    pub fn normalize<F>(self, is_known: F) -> Normalized
    where
        F: Fn(&str) -> bool,
    {
        let mut kept = Map::new();
        let mut dropped = Vec::new();
        let mut converted = Vec::new();

        for (raw, value) in self.fields {
            let trimmed = raw.trim();
            let Some(canonical) = canonical_key(trimmed) else {
                dropped.push(DroppedKey::new(raw, DropReason::Blank));
                continue;
            };
            if PROTECTED_FIELDS.contains(&trimmed) || PROTECTED_FIELDS.contains(&canonical.as_str())
            {
                dropped.push(DroppedKey::new(raw, DropReason::Protected));
                continue;
            }

            let key = if is_known(trimmed) {
                trimmed.to_string()
            } else if is_known(&canonical) {
                canonical
            } else {
                dropped.push(DroppedKey::new(raw, DropReason::Unknown));
                continue;
            };
            if key == raw {
                kept.insert(key, value);
            } else {
                converted.push((raw, key, value));
            }
        }

        for (raw, key, value) in converted {
            if kept.contains_key(&key) {
                dropped.push(DroppedKey::new(raw, DropReason::Duplicate));
            } else {
                kept.insert(key, value);
            }
        }

        Normalized {
            changes: Changes { fields: kept },
            dropped,
        }
    }

    /// Overlay these changes onto a complete payload
    ///
    /// The base is serialized to an object, every change replaces the
    /// matching key, and the result is deserialized back into `T`. When the
    /// merged object does not deserialize, each change is retried alone so
    /// the error can be pinned to the offending field.
    pub fn apply_to<T: Entity>(&self, base: &T) -> Result<T> {
        let base_fields = to_object(base)?;
        if self.is_empty() {
            return Ok(base.clone());
        }

        let mut merged = base_fields.clone();
        for (key, value) in &self.fields {
            merged.insert(key.clone(), value.clone());
        }

        match serde_json::from_value::<T>(Value::Object(merged)) {
            Ok(next) => Ok(next),
            Err(whole) => {
                let mut errs = ValidationErrors::new();
                for (key, value) in &self.fields {
                    let mut single = base_fields.clone();
                    single.insert(key.clone(), value.clone());
                    if let Err(e) = serde_json::from_value::<T>(Value::Object(single)) {
                        errs.add(key.clone(), e.to_string());
                    }
                }
                if errs.is_empty() {
                    errs.add("_payload", whole.to_string());
                }
                Err(Error::Validation(errs))
            }
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Changes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Result of `Changes::normalize`
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// Keys that survived, in canonical spelling
    pub changes: Changes,
    /// Keys that were dropped, with the reason
    pub dropped: Vec<DroppedKey>,
}

/// A key removed during normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedKey {
    /// Key as the caller spelled it
    pub key: String,
    /// Why it was dropped
    pub reason: DropReason,
}

impl DroppedKey {
    fn new(key: String, reason: DropReason) -> Self {
        Self { key, reason }
    }
}

/// Why a key was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Empty after trimming
    Blank,
    /// Names a protected column
    Protected,
    /// Not a field of the entity
    Unknown,
    /// Another spelling of a key already present
    Duplicate,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DropReason::Blank => "blank",
            DropReason::Protected => "protected",
            DropReason::Unknown => "unknown",
            DropReason::Duplicate => "duplicate",
        })
    }
}

/// Serialize an entity payload into a JSON object
pub fn to_object<T: Entity>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::Serialization(format!(
            "{} must serialize to an object, got {}",
            T::TABLE,
            json_kind(&other)
        ))),
    }
}

/// Canonical `snake_case` spelling of a caller-supplied key
///
/// Returns `None` for keys that are blank after trimming.
pub fn canonical_key(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let chars: Vec<char> = trimmed.chars().collect();
    let mut out = String::with_capacity(trimmed.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == ' ' || c == '_' {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary && !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    let out = out.trim_end_matches('_').to_string();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

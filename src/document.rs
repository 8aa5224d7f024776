//! Template Document - Immutable Parsed Input
//!
//! The raw JSON value is kept alongside a typed view. Every typed field is
//! optional: a field that is absent, or present with the wrong JSON type,
//! reads as `None` and the checks decide what absence means.

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::hashing::sha256_hex;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Malformed document: cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed document: not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Malformed document: invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Deserialize a field, falling back to `None` when its JSON type does not fit.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

/// Like [`lenient`], but an entry that does not fit becomes an all-`None`
/// spec instead of discarding the whole map.
fn lenient_map<'de, D, T>(deserializer: D) -> Result<Option<BTreeMap<String, T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    let Ok(entries) = BTreeMap::<String, Value>::deserialize(value) else {
        return Ok(None);
    };
    Ok(Some(
        entries
            .into_iter()
            .map(|(name, entry)| (name, T::deserialize(entry).unwrap_or_default()))
            .collect(),
    ))
}

/// Per-entry leniency for sequences. Indices line up with the raw array.
fn lenient_seq<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    let Ok(entries) = Vec::<Value>::deserialize(value) else {
        return Ok(None);
    };
    Ok(Some(
        entries
            .into_iter()
            .map(|entry| T::deserialize(entry).unwrap_or_default())
            .collect(),
    ))
}

/// Integers, including integral floats such as `3.0`.
fn lenient_integer<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    }))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParameterMetadata {
    #[serde(default, deserialize_with = "lenient")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub param_type: Option<String>,
    #[serde(default)]
    pub default_value: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub allowed_values: Option<Vec<Value>>,
    #[serde(default, deserialize_with = "lenient_integer")]
    pub min_length: Option<i64>,
    #[serde(default, deserialize_with = "lenient_integer")]
    pub max_length: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub metadata: Option<ParameterMetadata>,
}

impl ParameterSpec {
    pub fn allows(&self, value: &str) -> bool {
        self.allowed_values
            .iter()
            .flatten()
            .any(|v| v.as_str() == Some(value))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Sku {
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default)]
    pub capacity: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub resource_type: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub api_version: Option<String>,
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub kind: Option<String>,
    #[serde(default)]
    pub location: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub sku: Option<Sku>,
    #[serde(default)]
    pub properties: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub depends_on: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OutputSpec {
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub output_type: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
}

/// Typed view over the top-level template keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateView {
    #[serde(rename = "$schema", default, deserialize_with = "lenient")]
    pub schema: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub content_version: Option<String>,
    #[serde(default, deserialize_with = "lenient_map")]
    pub parameters: Option<BTreeMap<String, ParameterSpec>>,
    #[serde(default, deserialize_with = "lenient_seq")]
    pub resources: Option<Vec<ResourceSpec>>,
    #[serde(default, deserialize_with = "lenient_map")]
    pub outputs: Option<BTreeMap<String, OutputSpec>>,
}

/// A loaded template, held read-only for the duration of a run.
#[derive(Debug, Clone)]
pub struct TemplateDocument {
    raw: Value,
    view: TemplateView,
    sha256: String,
}

impl TemplateDocument {
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let bytes = fs::read(path).map_err(|source| DocumentError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let doc = Self::from_bytes(&bytes)?;
        tracing::debug!(path = %path.display(), sha256 = %doc.sha256, "template loaded");
        Ok(doc)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DocumentError> {
        let text = std::str::from_utf8(bytes)?;
        let raw: Value = serde_json::from_str(text)?;
        Ok(Self::build(raw, sha256_hex(bytes)))
    }

    pub fn from_value(raw: Value) -> Self {
        let sha256 = sha256_hex(raw.to_string().as_bytes());
        Self::build(raw, sha256)
    }

    fn build(raw: Value, sha256: String) -> Self {
        // A non-object root has none of the expected keys.
        let view = if raw.is_object() {
            TemplateView::deserialize(&raw).unwrap_or_default()
        } else {
            TemplateView::default()
        };
        Self { raw, view, sha256 }
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.raw.as_object().is_some_and(|obj| obj.contains_key(key))
    }

    pub fn schema(&self) -> Option<&str> {
        self.view.schema.as_deref()
    }

    pub fn content_version(&self) -> Option<&str> {
        self.view.content_version.as_deref()
    }

    pub fn parameters(&self) -> Option<&BTreeMap<String, ParameterSpec>> {
        self.view.parameters.as_ref()
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.view.parameters.as_ref()?.get(name)
    }

    pub fn resources(&self) -> &[ResourceSpec] {
        self.view.resources.as_deref().unwrap_or_default()
    }

    /// First resource whose `type` equals `resource_type`. Later resources of
    /// the same type are never returned.
    pub fn first_resource_of_type(&self, resource_type: &str) -> Option<&ResourceSpec> {
        self.resources()
            .iter()
            .find(|r| r.resource_type.as_deref() == Some(resource_type))
    }

    /// Same lookup as [`Self::first_resource_of_type`], paired with the
    /// resource's own JSON for dotted-path lookups.
    pub fn first_resource_with_raw(&self, resource_type: &str) -> Option<(&ResourceSpec, &Value)> {
        let index = self
            .resources()
            .iter()
            .position(|r| r.resource_type.as_deref() == Some(resource_type))?;
        let raw = self.raw.get("resources")?.as_array()?.get(index)?;
        Some((&self.resources()[index], raw))
    }

    pub fn output(&self, name: &str) -> Option<&OutputSpec> {
        self.view.outputs.as_ref()?.get(name)
    }

    /// Compact serialization of the whole document.
    pub fn serialized(&self) -> String {
        self.raw.to_string()
    }
}

/// The reference token for a parameter, e.g. `parameters('location')`.
pub fn parameter_reference(name: &str) -> String {
    format!("parameters('{}')", name)
}

/// The bracketed expression prefix for a parameter, e.g. `[parameters('location')]`.
pub fn parameter_expression(name: &str) -> String {
    format!("[{}]", parameter_reference(name))
}

/// Look up a dotted path such as `properties.model.name`.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

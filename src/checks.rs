//! Checks - Independent Predicates Over One Document
//!
//! Every check returns the failures it found. An empty list is a pass.
//! No check depends on another having run or passed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::contract::{OutputExpectations, ParameterExpectations, ResourceShapeExpectations};
use crate::document::{lookup, parameter_expression, parameter_reference, TemplateDocument};

const ABSENT: &str = "<absent>";

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckFailure {
    #[error("Malformed document: {reason}")]
    MalformedDocument { reason: String },

    #[error("Missing required key: {key}")]
    MissingField { key: String },

    #[error("Invalid schema: {reason}")]
    InvalidSchema { reason: String },

    #[error("Invalid contentVersion '{actual}': must have 4 numeric parts (x.y.z.w)")]
    InvalidVersionFormat { actual: String },

    #[error("Missing parameter: {name}")]
    MissingParameter { name: String },

    #[error("Parameter {name} must be of type {expected}, found {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Parameter {name} violates constraint: {rule}")]
    ConstraintViolation { name: String, rule: String },

    #[error("Template should have exactly {expected} resources, found {actual}")]
    ResourceCountMismatch { expected: usize, actual: usize },

    #[error("Missing resource type: {resource_type}")]
    MissingResourceType { resource_type: String },

    #[error("Resource not found: {resource_type}")]
    ResourceNotFound { resource_type: String },

    #[error("Resource {resource_type} field {field}: {expectation}")]
    ShapeMismatch {
        resource_type: String,
        field: String,
        expectation: String,
    },

    #[error("Resource {dependent} must depend on {depends_on}")]
    MissingDependency { dependent: String, depends_on: String },

    #[error("Output {name}: {reason}")]
    OutputMismatch { name: String, reason: String },

    #[error("Parameter {name} should be referenced in the template")]
    UnreferencedParameter { name: String },

    #[error("Hardcoded value '{literal}' in resources; use a parameter instead")]
    HardcodedValue { literal: String },
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn check_structure(doc: &TemplateDocument, required_keys: &[String]) -> Vec<CheckFailure> {
    required_keys
        .iter()
        .filter(|key| !doc.has_key(key))
        .map(|key| CheckFailure::MissingField { key: key.clone() })
        .collect()
}

pub fn check_schema(
    doc: &TemplateDocument,
    host_prefix: &str,
    filename_token: &str,
) -> Vec<CheckFailure> {
    let invalid = |reason: String| vec![CheckFailure::InvalidSchema { reason }];

    let Some(url) = doc.schema() else {
        return invalid("schema URL must be present and a string".to_string());
    };

    let mut failures = vec![];
    if !url.starts_with(host_prefix) {
        failures.push(CheckFailure::InvalidSchema {
            reason: format!("'{}' is not under {}", url, host_prefix),
        });
    }
    if !url.contains(filename_token) {
        failures.push(CheckFailure::InvalidSchema {
            reason: format!("'{}' does not reference {}", url, filename_token),
        });
    }
    failures
}

pub fn check_version(doc: &TemplateDocument) -> Vec<CheckFailure> {
    let Some(version) = doc.content_version() else {
        return vec![CheckFailure::InvalidVersionFormat {
            actual: ABSENT.to_string(),
        }];
    };

    let parts: Vec<&str> = version.split('.').collect();
    let numeric = parts
        .iter()
        .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()));

    if parts.len() == 4 && numeric {
        vec![]
    } else {
        vec![CheckFailure::InvalidVersionFormat {
            actual: version.to_string(),
        }]
    }
}

pub fn check_parameters(
    doc: &TemplateDocument,
    required: &BTreeMap<String, String>,
) -> Vec<CheckFailure> {
    let mut failures = vec![];

    for (name, expected) in required {
        let Some(param) = doc.parameter(name) else {
            failures.push(CheckFailure::MissingParameter { name: name.clone() });
            continue;
        };

        let actual = param.param_type.as_deref();
        if actual != Some(expected.as_str()) {
            failures.push(CheckFailure::TypeMismatch {
                name: name.clone(),
                expected: expected.clone(),
                actual: actual.unwrap_or(ABSENT).to_string(),
            });
        }
    }

    failures
}

pub fn check_parameter_constraints(
    doc: &TemplateDocument,
    name: &str,
    expectations: &ParameterExpectations,
) -> Vec<CheckFailure> {
    let violation = |rule: String| CheckFailure::ConstraintViolation {
        name: name.to_string(),
        rule,
    };

    let Some(param) = doc.parameter(name) else {
        return vec![violation("parameter declared".to_string())];
    };

    let mut failures = vec![];

    if let Some(expected) = &expectations.default_value {
        if param.default_value.as_ref() != Some(expected) {
            failures.push(violation(format!("defaultValue must be {}", expected)));
        }
    }

    for value in &expectations.allowed_values {
        if !param.allows(value) {
            failures.push(violation(format!("allowedValues missing '{}'", value)));
        }
    }

    if let Some(min) = expectations.min_length {
        if param.min_length != Some(min) {
            failures.push(violation(format!("minLength must be {}", min)));
        }
    }

    if let Some(max) = expectations.max_length {
        if param.max_length != Some(max) {
            failures.push(violation(format!("maxLength must be {}", max)));
        }
    }

    if let Some(min) = expectations.min_default_length {
        // An absent default counts as the empty string.
        let len = param
            .default_value
            .as_ref()
            .and_then(Value::as_str)
            .map_or(0, |s| s.chars().count());
        if len < min {
            failures.push(violation(format!("defaultValue must be at least {} characters", min)));
        }
    }

    if expectations.requires_metadata && param.metadata.is_none() {
        failures.push(violation("metadata required".to_string()));
    }

    if expectations.requires_description
        && param.metadata.as_ref().and_then(|m| m.description.as_ref()).is_none()
    {
        failures.push(violation("metadata.description required".to_string()));
    }

    failures
}

pub fn check_resources(
    doc: &TemplateDocument,
    expected_count: usize,
    expected_types: &[String],
) -> Vec<CheckFailure> {
    let resources = doc.resources();
    let mut failures = vec![];

    if resources.len() != expected_count {
        failures.push(CheckFailure::ResourceCountMismatch {
            expected: expected_count,
            actual: resources.len(),
        });
    }

    for expected in expected_types {
        if doc.first_resource_of_type(expected).is_none() {
            failures.push(CheckFailure::MissingResourceType {
                resource_type: expected.clone(),
            });
        }
    }

    failures
}

/// `YYYY-MM` prefix of a `YYYY-MM-DD[-suffix]` api version, if it is a real date.
fn api_version_month(api_version: &str) -> Option<&str> {
    let date = api_version.get(..10)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    match api_version.as_bytes().get(10) {
        None | Some(b'-') => api_version.get(..7),
        Some(_) => None,
    }
}

pub fn check_resource_shape(
    doc: &TemplateDocument,
    resource_type: &str,
    expectations: &ResourceShapeExpectations,
) -> Vec<CheckFailure> {
    let Some((resource, raw)) = doc.first_resource_with_raw(resource_type) else {
        return vec![CheckFailure::ResourceNotFound {
            resource_type: resource_type.to_string(),
        }];
    };

    let mismatch = |field: &str, expectation: String| CheckFailure::ShapeMismatch {
        resource_type: resource_type.to_string(),
        field: field.to_string(),
        expectation,
    };
    let mut failures = vec![];

    if let Some(min) = &expectations.min_api_version {
        match resource.api_version.as_deref() {
            None => failures.push(mismatch("apiVersion", "must be specified".to_string())),
            Some(actual) => match api_version_month(actual) {
                Some(month) if month >= min.as_str() => {}
                Some(_) => failures.push(mismatch(
                    "apiVersion",
                    format!("'{}' should be recent ({} or later)", actual, min),
                )),
                None => failures.push(mismatch(
                    "apiVersion",
                    format!("'{}' is not a date-stamped version", actual),
                )),
            },
        }
    }

    if let Some(kind) = &expectations.kind {
        if resource.kind.as_deref() != Some(kind.as_str()) {
            failures.push(mismatch("kind", format!("must be '{}'", kind)));
        }
    }

    let sku = resource.sku.as_ref();
    if let Some(name) = &expectations.sku_name {
        if sku.and_then(|s| s.name.as_deref()) != Some(name.as_str()) {
            failures.push(mismatch("sku.name", format!("must be '{}'", name)));
        }
    }

    if expectations.sku_capacity_integer
        && !sku
            .and_then(|s| s.capacity.as_ref())
            .is_some_and(|c| c.is_i64() || c.is_u64())
    {
        failures.push(mismatch("sku.capacity", "must be an integer".to_string()));
    }

    for field in &expectations.field_values {
        if lookup(raw, &field.path) != Some(&field.value) {
            failures.push(mismatch(&field.path, format!("must be {}", field.value)));
        }
    }

    for field in &expectations.parameter_references {
        let expression = parameter_expression(&field.parameter);
        let references = lookup(raw, &field.path)
            .and_then(Value::as_str)
            .is_some_and(|s| s.starts_with(&expression));
        if !references {
            failures.push(mismatch(
                &field.path,
                format!("should reference {} parameter ({})", field.parameter, expression),
            ));
        }
    }

    failures
}

pub fn check_dependency(
    doc: &TemplateDocument,
    dependent_type: &str,
    depends_on_type: &str,
) -> Vec<CheckFailure> {
    let Some(resource) = doc.first_resource_of_type(dependent_type) else {
        return vec![CheckFailure::ResourceNotFound {
            resource_type: dependent_type.to_string(),
        }];
    };

    if resource.depends_on.as_ref().is_some_and(|d| !d.is_empty()) {
        vec![]
    } else {
        vec![CheckFailure::MissingDependency {
            dependent: dependent_type.to_string(),
            depends_on: depends_on_type.to_string(),
        }]
    }
}

pub fn check_outputs(
    doc: &TemplateDocument,
    name: &str,
    expected_type: &str,
    required_substrings: &[String],
) -> Vec<CheckFailure> {
    let mismatch = |reason: String| CheckFailure::OutputMismatch {
        name: name.to_string(),
        reason,
    };

    let Some(output) = doc.output(name) else {
        return vec![mismatch("output missing".to_string())];
    };

    let mut failures = vec![];
    if output.output_type.as_deref() != Some(expected_type) {
        failures.push(mismatch(format!("type must be {}", expected_type)));
    }

    match output.value.as_ref() {
        None | Some(Value::Null) => failures.push(mismatch("value missing".to_string())),
        Some(Value::String(value)) => {
            for needle in required_substrings {
                if !value.contains(needle.as_str()) {
                    failures.push(mismatch(format!("value must contain '{}'", needle)));
                }
            }
        }
        Some(other) => failures.push(mismatch(format!(
            "value must be a string expression, found {}",
            json_kind(other)
        ))),
    }

    failures
}

/// Convenience wrapper for one [`OutputExpectations`] entry.
pub fn check_output_expectations(
    doc: &TemplateDocument,
    expectations: &OutputExpectations,
) -> Vec<CheckFailure> {
    check_outputs(
        doc,
        &expectations.name,
        &expectations.output_type,
        &expectations.required_substrings,
    )
}

pub fn check_parameter_referenced(doc: &TemplateDocument, name: &str) -> Vec<CheckFailure> {
    if doc.serialized().contains(&parameter_reference(name)) {
        vec![]
    } else {
        vec![CheckFailure::UnreferencedParameter {
            name: name.to_string(),
        }]
    }
}

/// Region literals inside the resources section. Findings are advisory.
pub fn check_hardcoded_values(doc: &TemplateDocument, literals: &[String]) -> Vec<CheckFailure> {
    let Some(resources) = doc.raw().get("resources") else {
        return vec![];
    };
    let haystack = resources.to_string().to_lowercase();

    literals
        .iter()
        .filter(|literal| haystack.contains(&literal.to_lowercase()))
        .map(|literal| CheckFailure::HardcodedValue {
            literal: literal.clone(),
        })
        .collect()
}

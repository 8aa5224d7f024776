//! Contract System - What a Template Must Satisfy
//!
//! The built-in contract describes the Azure OpenAI deployment template.
//! A contract file in the same camelCase JSON shape replaces it wholesale.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::VALIDATOR_VERSION;

pub const ACCOUNT_TYPE: &str = "Microsoft.CognitiveServices/accounts";
pub const DEPLOYMENT_TYPE: &str = "Microsoft.CognitiveServices/accounts/deployments";

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("Cannot read contract {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid contract: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid validatorMinVersion '{0}'")]
    InvalidVersion(String),

    #[error("Contract requires validator >= {required}, current is {current}")]
    VersionMismatch { required: String, current: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateContract {
    pub validator_min_version: String,
    pub required_keys: Vec<String>,
    pub schema: SchemaExpectations,
    pub required_parameters: BTreeMap<String, String>,
    pub parameter_constraints: Vec<ParameterExpectations>,
    pub resources: ResourceExpectations,
    pub resource_shapes: Vec<ResourceShapeExpectations>,
    pub dependencies: Vec<DependencyExpectation>,
    pub outputs: Vec<OutputExpectations>,
    pub advisory_literals: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchemaExpectations {
    pub host_prefix: String,
    pub filename_token: String,
}

impl Default for SchemaExpectations {
    fn default() -> Self {
        Self {
            host_prefix: "https://schema.management.azure.com/".to_string(),
            filename_token: "deploymentTemplate.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParameterExpectations {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_default_length: Option<usize>,
    #[serde(default)]
    pub requires_metadata: bool,
    #[serde(default)]
    pub requires_description: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceExpectations {
    pub expected_count: usize,
    pub expected_types: Vec<String>,
}

impl Default for ResourceExpectations {
    fn default() -> Self {
        Self {
            expected_count: 2,
            expected_types: vec![ACCOUNT_TYPE.to_string(), DEPLOYMENT_TYPE.to_string()],
        }
    }
}

/// A field at a dotted path that must start with `[parameters('<parameter>')]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldReference {
    pub path: String,
    pub parameter: String,
}

/// A field at a dotted path that must equal a literal value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldValue {
    pub path: String,
    pub value: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceShapeExpectations {
    pub resource_type: String,
    /// Minimum `YYYY-MM` of the resource's api version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku_name: Option<String>,
    #[serde(default)]
    pub sku_capacity_integer: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_values: Vec<FieldValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameter_references: Vec<FieldReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DependencyExpectation {
    pub dependent_type: String,
    pub depends_on_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutputExpectations {
    pub name: String,
    pub output_type: String,
    #[serde(default)]
    pub required_substrings: Vec<String>,
}

const MIN_API_VERSION: &str = "2024-01";

fn reference(path: &str, parameter: &str) -> FieldReference {
    FieldReference {
        path: path.to_string(),
        parameter: parameter.to_string(),
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Default for TemplateContract {
    fn default() -> Self {
        let required_parameters = [
            "location",
            "accountName",
            "deploymentName",
            "modelName",
            "modelVersion",
            "publicNetworkAccess",
        ]
        .into_iter()
        .map(|name| (name.to_string(), "string".to_string()))
        .collect();

        Self {
            validator_min_version: "1.0.0".to_string(),
            required_keys: strings(&["$schema", "contentVersion", "parameters", "resources"]),
            schema: SchemaExpectations::default(),
            required_parameters,
            parameter_constraints: vec![
                ParameterExpectations {
                    name: "location".to_string(),
                    default_value: Some(Value::from("swedencentral")),
                    allowed_values: strings(&[
                        "swedencentral",
                        "westeurope",
                        "germanywestcentral",
                        "northeurope",
                    ]),
                    requires_metadata: true,
                    requires_description: true,
                    ..Default::default()
                },
                ParameterExpectations {
                    name: "accountName".to_string(),
                    min_length: Some(3),
                    max_length: Some(63),
                    min_default_length: Some(3),
                    requires_metadata: true,
                    ..Default::default()
                },
                ParameterExpectations {
                    name: "modelName".to_string(),
                    default_value: Some(Value::from("gpt-4o")),
                    allowed_values: strings(&["gpt-4o", "gpt-4o-mini"]),
                    ..Default::default()
                },
                ParameterExpectations {
                    name: "publicNetworkAccess".to_string(),
                    default_value: Some(Value::from("Enabled")),
                    allowed_values: strings(&["Enabled", "Disabled"]),
                    ..Default::default()
                },
            ],
            resources: ResourceExpectations::default(),
            resource_shapes: vec![
                ResourceShapeExpectations {
                    resource_type: ACCOUNT_TYPE.to_string(),
                    min_api_version: Some(MIN_API_VERSION.to_string()),
                    kind: Some("OpenAI".to_string()),
                    sku_name: Some("S0".to_string()),
                    parameter_references: vec![
                        reference("name", "accountName"),
                        reference("location", "location"),
                        reference("properties.publicNetworkAccess", "publicNetworkAccess"),
                    ],
                    ..Default::default()
                },
                ResourceShapeExpectations {
                    resource_type: DEPLOYMENT_TYPE.to_string(),
                    min_api_version: Some(MIN_API_VERSION.to_string()),
                    sku_name: Some("Standard".to_string()),
                    sku_capacity_integer: true,
                    field_values: vec![FieldValue {
                        path: "properties.model.format".to_string(),
                        value: Value::from("OpenAI"),
                    }],
                    parameter_references: vec![
                        reference("properties.model.name", "modelName"),
                        reference("properties.model.version", "modelVersion"),
                    ],
                    ..Default::default()
                },
            ],
            dependencies: vec![DependencyExpectation {
                dependent_type: DEPLOYMENT_TYPE.to_string(),
                depends_on_type: ACCOUNT_TYPE.to_string(),
            }],
            outputs: vec![OutputExpectations {
                name: "endpoint".to_string(),
                output_type: "string".to_string(),
                required_substrings: strings(&["reference(", "endpoint"]),
            }],
            advisory_literals: strings(&["westeurope", "eastus"]),
        }
    }
}

impl TemplateContract {
    pub fn load(path: &Path) -> Result<Self, ContractError> {
        let content = fs::read_to_string(path).map_err(|source| ContractError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let contract = Self::from_json(&content)?;
        tracing::info!(path = %path.display(), "contract loaded");
        Ok(contract)
    }

    pub fn from_json(content: &str) -> Result<Self, ContractError> {
        let contract: Self = serde_json::from_str(content)?;
        contract.check_validator_version()?;
        Ok(contract)
    }

    fn check_validator_version(&self) -> Result<(), ContractError> {
        let current = semver::Version::parse(VALIDATOR_VERSION)
            .map_err(|_| ContractError::InvalidVersion(VALIDATOR_VERSION.to_string()))?;
        let required = semver::Version::parse(&self.validator_min_version)
            .map_err(|_| ContractError::InvalidVersion(self.validator_min_version.clone()))?;

        if current < required {
            return Err(ContractError::VersionMismatch {
                required: self.validator_min_version.clone(),
                current: VALIDATOR_VERSION.to_string(),
            });
        }
        Ok(())
    }
}

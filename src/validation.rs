//! Validation System - Rule Registry and Fail-Slow Runner
//!
//! Rules produce structured violations.
//! The runner executes every rule and aggregates; it never stops early.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::checks::{self, CheckFailure};
use crate::contract::{
    DependencyExpectation, OutputExpectations, ParameterExpectations, ResourceShapeExpectations,
    TemplateContract,
};
use crate::document::TemplateDocument;
use crate::hashing::compute_outcome_hash;

pub const LOAD_CHECK: &str = "load_document";

/// Process exit codes for a finished run.
pub const EXIT_PASSED: u8 = 0;
pub const EXIT_LOAD_FAILED: u8 = 1;
pub const EXIT_CHECKS_FAILED: u8 = 2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationViolation {
    pub severity: ViolationSeverity,
    pub message: String,
    pub failure: CheckFailure,
}

impl ValidationViolation {
    fn new(severity: ViolationSeverity, failure: CheckFailure) -> Self {
        Self {
            severity,
            message: failure.to_string(),
            failure,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub violations: Vec<ValidationViolation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_sha256: Option<String>,
    /// Digest of `checks`, stable across runs on the same input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome_sha256: Option<String>,
    pub passed: usize,
    pub failed: usize,
    pub checks: Vec<CheckResult>,
}

impl ValidationReport {
    fn from_checks(document_sha256: Option<String>, checks: Vec<CheckResult>) -> Self {
        let failed = checks.iter().filter(|c| !c.passed).count();
        Self {
            valid: failed == 0,
            document_sha256,
            outcome_sha256: compute_outcome_hash(&checks).ok(),
            passed: checks.len() - failed,
            failed,
            checks,
        }
    }

    /// Report for a run whose document never loaded.
    pub fn load_failure(reason: String) -> Self {
        let failure = CheckFailure::MalformedDocument { reason };
        Self::from_checks(
            None,
            vec![CheckResult {
                name: LOAD_CHECK.to_string(),
                passed: false,
                violations: vec![ValidationViolation::new(ViolationSeverity::Error, failure)],
            }],
        )
    }

    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ValidationViolation> {
        self.checks
            .iter()
            .flat_map(|c| &c.violations)
            .filter(|v| v.severity == ViolationSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationViolation> {
        self.checks
            .iter()
            .flat_map(|c| &c.violations)
            .filter(|v| v.severity == ViolationSeverity::Warning)
    }

    pub fn exit_code(&self) -> u8 {
        if self.valid {
            EXIT_PASSED
        } else if self.check(LOAD_CHECK).is_some() {
            EXIT_LOAD_FAILED
        } else {
            EXIT_CHECKS_FAILED
        }
    }
}

/// Validation rule trait - produces violations
pub trait ValidationRule {
    fn name(&self) -> String;
    fn severity(&self) -> ViolationSeverity {
        ViolationSeverity::Error
    }
    fn validate(&self, doc: &TemplateDocument) -> Vec<CheckFailure>;
}

// --- Concrete Rules ---

pub struct StructureRule {
    pub required_keys: Vec<String>,
}

impl ValidationRule for StructureRule {
    fn name(&self) -> String { "json_structure".to_string() }

    fn validate(&self, doc: &TemplateDocument) -> Vec<CheckFailure> {
        checks::check_structure(doc, &self.required_keys)
    }
}

pub struct SchemaRule {
    pub host_prefix: String,
    pub filename_token: String,
}

impl ValidationRule for SchemaRule {
    fn name(&self) -> String { "schema_url".to_string() }

    fn validate(&self, doc: &TemplateDocument) -> Vec<CheckFailure> {
        checks::check_schema(doc, &self.host_prefix, &self.filename_token)
    }
}

pub struct ContentVersionRule;

impl ValidationRule for ContentVersionRule {
    fn name(&self) -> String { "content_version".to_string() }

    fn validate(&self, doc: &TemplateDocument) -> Vec<CheckFailure> {
        checks::check_version(doc)
    }
}

pub struct RequiredParametersRule {
    pub required: BTreeMap<String, String>,
}

impl ValidationRule for RequiredParametersRule {
    fn name(&self) -> String { "required_parameters".to_string() }

    fn validate(&self, doc: &TemplateDocument) -> Vec<CheckFailure> {
        checks::check_parameters(doc, &self.required)
    }
}

pub struct ParameterConstraintRule(pub ParameterExpectations);

impl ValidationRule for ParameterConstraintRule {
    fn name(&self) -> String { format!("parameter:{}", self.0.name) }

    fn validate(&self, doc: &TemplateDocument) -> Vec<CheckFailure> {
        checks::check_parameter_constraints(doc, &self.0.name, &self.0)
    }
}

pub struct ResourcesRule {
    pub expected_count: usize,
    pub expected_types: Vec<String>,
}

impl ValidationRule for ResourcesRule {
    fn name(&self) -> String { "resources_structure".to_string() }

    fn validate(&self, doc: &TemplateDocument) -> Vec<CheckFailure> {
        checks::check_resources(doc, self.expected_count, &self.expected_types)
    }
}

pub struct ResourceShapeRule(pub ResourceShapeExpectations);

impl ValidationRule for ResourceShapeRule {
    fn name(&self) -> String { format!("resource:{}", self.0.resource_type) }

    fn validate(&self, doc: &TemplateDocument) -> Vec<CheckFailure> {
        checks::check_resource_shape(doc, &self.0.resource_type, &self.0)
    }
}

pub struct DependencyRule(pub DependencyExpectation);

impl ValidationRule for DependencyRule {
    fn name(&self) -> String { format!("depends_on:{}", self.0.dependent_type) }

    fn validate(&self, doc: &TemplateDocument) -> Vec<CheckFailure> {
        checks::check_dependency(doc, &self.0.dependent_type, &self.0.depends_on_type)
    }
}

pub struct OutputRule(pub OutputExpectations);

impl ValidationRule for OutputRule {
    fn name(&self) -> String { format!("output:{}", self.0.name) }

    fn validate(&self, doc: &TemplateDocument) -> Vec<CheckFailure> {
        checks::check_output_expectations(doc, &self.0)
    }
}

/// Every declared parameter, whatever the contract names, must be used.
pub struct ParameterReferencesRule;

impl ValidationRule for ParameterReferencesRule {
    fn name(&self) -> String { "parameter_references".to_string() }

    fn validate(&self, doc: &TemplateDocument) -> Vec<CheckFailure> {
        doc.parameters()
            .into_iter()
            .flat_map(|params| params.keys())
            .flat_map(|name| checks::check_parameter_referenced(doc, name))
            .collect()
    }
}

pub struct HardcodedValuesRule {
    pub literals: Vec<String>,
}

impl ValidationRule for HardcodedValuesRule {
    fn name(&self) -> String { "no_hardcoded_values".to_string() }

    fn severity(&self) -> ViolationSeverity {
        ViolationSeverity::Warning
    }

    fn validate(&self, doc: &TemplateDocument) -> Vec<CheckFailure> {
        checks::check_hardcoded_values(doc, &self.literals)
    }
}

/// Validator holds the registry of rules, in the order they report
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn from_contract(contract: &TemplateContract) -> Self {
        let mut rules: Vec<Box<dyn ValidationRule>> = vec![
            Box::new(StructureRule {
                required_keys: contract.required_keys.clone(),
            }),
            Box::new(SchemaRule {
                host_prefix: contract.schema.host_prefix.clone(),
                filename_token: contract.schema.filename_token.clone(),
            }),
            Box::new(ContentVersionRule),
            Box::new(RequiredParametersRule {
                required: contract.required_parameters.clone(),
            }),
        ];

        for expectations in &contract.parameter_constraints {
            rules.push(Box::new(ParameterConstraintRule(expectations.clone())));
        }

        rules.push(Box::new(ResourcesRule {
            expected_count: contract.resources.expected_count,
            expected_types: contract.resources.expected_types.clone(),
        }));

        for shape in &contract.resource_shapes {
            rules.push(Box::new(ResourceShapeRule(shape.clone())));
        }
        for dependency in &contract.dependencies {
            rules.push(Box::new(DependencyRule(dependency.clone())));
        }
        for output in &contract.outputs {
            rules.push(Box::new(OutputRule(output.clone())));
        }

        rules.push(Box::new(ParameterReferencesRule));
        rules.push(Box::new(HardcodedValuesRule {
            literals: contract.advisory_literals.clone(),
        }));

        Self { rules }
    }

    pub fn rule_names(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn validate(&self, doc: &TemplateDocument) -> ValidationReport {
        let mut results = Vec::with_capacity(self.rules.len());

        for rule in &self.rules {
            let severity = rule.severity();
            let violations: Vec<_> = rule
                .validate(doc)
                .into_iter()
                .map(|failure| ValidationViolation::new(severity, failure))
                .collect();
            // Warnings are reported but do not fail the check.
            let passed = violations.iter().all(|v| v.severity != ViolationSeverity::Error);

            tracing::debug!(check = %rule.name(), passed, violations = violations.len(), "check evaluated");
            results.push(CheckResult {
                name: rule.name(),
                passed,
                violations,
            });
        }

        let report = ValidationReport::from_checks(Some(doc.sha256().to_string()), results);
        tracing::info!(
            valid = report.valid,
            passed = report.passed,
            failed = report.failed,
            "validation finished"
        );
        report
    }

    /// Load then validate. A load failure is the run's only reported failure.
    pub fn validate_file(&self, path: &Path) -> ValidationReport {
        match TemplateDocument::load(path) {
            Ok(doc) => self.validate(&doc),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "template could not be loaded");
                ValidationReport::load_failure(e.to_string())
            }
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::from_contract(&TemplateContract::default())
    }
}

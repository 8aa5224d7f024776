//! Contract Tests Against the Shipped Template
//!
//! These tests pin the behaviour of the full check battery.

use std::path::PathBuf;
use std::process::Command;

use armlint_core::{
    checks::{self, CheckFailure},
    contract::{FieldValue, ParameterExpectations, ResourceShapeExpectations, ACCOUNT_TYPE, DEPLOYMENT_TYPE},
    validation::{EXIT_CHECKS_FAILED, EXIT_LOAD_FAILED, EXIT_PASSED, LOAD_CHECK},
    TemplateContract, TemplateDocument, Validator,
};
use serde_json::{json, Value};

fn template_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(armlint_core::DEFAULT_TEMPLATE_PATH)
}

fn shipped_template() -> Value {
    let content = std::fs::read_to_string(template_path()).unwrap();
    serde_json::from_str(&content).unwrap()
}

fn failures_of(report: &armlint_core::ValidationReport, check: &str) -> Vec<CheckFailure> {
    report
        .check(check)
        .unwrap_or_else(|| panic!("no check named {}", check))
        .violations
        .iter()
        .map(|v| v.failure.clone())
        .collect()
}

#[test]
fn shipped_template_passes_every_check() {
    let report = Validator::default().validate_file(&template_path());

    let failing: Vec<_> = report.failures().map(|v| v.message.clone()).collect();
    assert!(report.valid, "unexpected failures: {:?}", failing);
    assert_eq!(report.failed, 0);
    assert_eq!(report.warnings().count(), 0);
    assert!(report.document_sha256.is_some());
}

#[test]
fn missing_top_level_key_reported_once() {
    let mut template = shipped_template();
    template.as_object_mut().unwrap().remove("contentVersion");

    let report = Validator::default().validate(&TemplateDocument::from_value(template));

    let missing: Vec<_> = report
        .failures()
        .filter(|v| matches!(v.failure, CheckFailure::MissingField { .. }))
        .collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(
        missing[0].failure,
        CheckFailure::MissingField { key: "contentVersion".to_string() }
    );

    // Checks that do not need contentVersion still run and pass.
    for name in ["schema_url", "required_parameters", "resources_structure", "output:endpoint"] {
        assert!(report.check(name).unwrap().passed, "{} should pass", name);
    }
    assert!(!report.check("content_version").unwrap().passed);
}

#[test]
fn content_version_needs_four_parts() {
    let mut template = shipped_template();
    template["contentVersion"] = json!("1.0.0");
    let doc = TemplateDocument::from_value(template.clone());
    assert_eq!(
        checks::check_version(&doc),
        vec![CheckFailure::InvalidVersionFormat { actual: "1.0.0".to_string() }]
    );

    template["contentVersion"] = json!("1.0.0.0");
    assert!(checks::check_version(&TemplateDocument::from_value(template)).is_empty());
}

#[test]
fn location_must_allow_westeurope() {
    let mut template = shipped_template();
    template["parameters"]["location"]["allowedValues"] =
        json!(["swedencentral", "germanywestcentral", "northeurope"]);

    let report = Validator::default().validate(&TemplateDocument::from_value(template));

    let failures = failures_of(&report, "parameter:location");
    assert_eq!(failures.len(), 1);
    assert!(failures[0].to_string().contains("westeurope"));
    assert!(!report.valid);
}

#[test]
fn account_name_constraints() {
    let mut template = shipped_template();
    let account = &mut template["parameters"]["accountName"];
    account["minLength"] = json!(1);
    account["defaultValue"] = json!("ab");
    account.as_object_mut().unwrap().remove("metadata");

    let report = Validator::default().validate(&TemplateDocument::from_value(template));

    let rules: Vec<_> = failures_of(&report, "parameter:accountName")
        .into_iter()
        .map(|f| match f {
            CheckFailure::ConstraintViolation { rule, .. } => rule,
            other => panic!("unexpected failure {:?}", other),
        })
        .collect();
    assert_eq!(
        rules,
        vec![
            "minLength must be 3".to_string(),
            "defaultValue must be at least 3 characters".to_string(),
            "metadata required".to_string(),
        ]
    );
}

#[test]
fn shape_check_uses_first_matching_resource() {
    let mut template = shipped_template();
    let mut broken = template["resources"][1].clone();
    broken["sku"] = json!({"name": "Basic", "capacity": "lots"});
    broken["properties"]["model"]["name"] = json!("gpt-4o");
    template["resources"].as_array_mut().unwrap().push(broken);

    let doc = TemplateDocument::from_value(template);
    let contract = TemplateContract::default();
    let shape = contract
        .resource_shapes
        .iter()
        .find(|s| s.resource_type == DEPLOYMENT_TYPE)
        .unwrap();

    assert!(checks::check_resource_shape(&doc, DEPLOYMENT_TYPE, shape).is_empty());

    // The extra resource only trips the count check.
    let report = Validator::from_contract(&contract).validate(&doc);
    assert_eq!(
        failures_of(&report, "resources_structure"),
        vec![CheckFailure::ResourceCountMismatch { expected: 2, actual: 3 }]
    );
}

#[test]
fn hardcoded_field_fails_reference_check() {
    let mut template = shipped_template();
    template["resources"][0]["location"] = json!("swedencentral");

    let report = Validator::default().validate(&TemplateDocument::from_value(template));

    let failures = failures_of(&report, "resource:Microsoft.CognitiveServices/accounts");
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        &failures[0],
        CheckFailure::ShapeMismatch { field, .. } if field == "location"
    ));
}

#[test]
fn old_api_version_rejected() {
    let mut template = shipped_template();
    template["resources"][0]["apiVersion"] = json!("2023-05-01");

    let report = Validator::default().validate(&TemplateDocument::from_value(template));

    let failures = failures_of(&report, "resource:Microsoft.CognitiveServices/accounts");
    assert_eq!(failures.len(), 1);
    assert!(failures[0].to_string().contains("2023-05-01"));
}

#[test]
fn missing_resource_reported_by_shape_check_only() {
    let mut template = shipped_template();
    template["resources"].as_array_mut().unwrap().remove(1);

    let report = Validator::default().validate(&TemplateDocument::from_value(template));

    assert_eq!(
        failures_of(&report, "resource:Microsoft.CognitiveServices/accounts/deployments"),
        vec![CheckFailure::ResourceNotFound { resource_type: DEPLOYMENT_TYPE.to_string() }]
    );
    assert!(report.check("resource:Microsoft.CognitiveServices/accounts").unwrap().passed);
}

#[test]
fn deployment_must_depend_on_account() {
    let mut template = shipped_template();
    template["resources"][1].as_object_mut().unwrap().remove("dependsOn");

    let report = Validator::default().validate(&TemplateDocument::from_value(template));

    assert!(matches!(
        failures_of(&report, "depends_on:Microsoft.CognitiveServices/accounts/deployments").as_slice(),
        [CheckFailure::MissingDependency { .. }]
    ));
}

#[test]
fn endpoint_output_value() {
    let substrings = vec!["reference(".to_string(), "endpoint".to_string()];
    let with_value = |value: &str| {
        let mut template = shipped_template();
        template["outputs"]["endpoint"]["value"] = json!(value);
        TemplateDocument::from_value(template)
    };

    let referenced = with_value("[reference(parameters('accountName')).endpoint]");
    assert!(checks::check_outputs(&referenced, "endpoint", "string", &substrings).is_empty());

    let literal = with_value("static-url");
    assert_eq!(
        checks::check_outputs(&literal, "endpoint", "string", &substrings).len(),
        2
    );
}

#[test]
fn unreferenced_parameter_reported() {
    let mut template = shipped_template();
    template["parameters"]["unused"] = json!({"type": "string", "defaultValue": "x"});

    let report = Validator::default().validate(&TemplateDocument::from_value(template));

    assert_eq!(
        failures_of(&report, "parameter_references"),
        vec![CheckFailure::UnreferencedParameter { name: "unused".to_string() }]
    );
}

#[test]
fn hardcoded_region_is_only_a_warning() {
    let mut template = shipped_template();
    template["resources"][0]["tags"] = json!({"region": "westeurope"});

    let report = Validator::default().validate(&TemplateDocument::from_value(template));

    assert!(report.valid);
    assert_eq!(report.warnings().count(), 1);
    assert!(report.check("no_hardcoded_values").unwrap().passed);
}

#[test]
fn custom_contract_changes_expectations() {
    let mut contract = TemplateContract::default();
    contract.parameter_constraints.push(ParameterExpectations {
        name: "modelVersion".to_string(),
        default_value: Some(json!("2024-05-13")),
        ..Default::default()
    });
    contract.resource_shapes.push(ResourceShapeExpectations {
        resource_type: "Microsoft.Storage/storageAccounts".to_string(),
        ..Default::default()
    });

    let report = Validator::from_contract(&contract).validate_file(&template_path());

    assert!(!report.valid);
    assert_eq!(report.failed, 2);
    assert!(!report.check("parameter:modelVersion").unwrap().passed);
    assert!(!report.check("resource:Microsoft.Storage/storageAccounts").unwrap().passed);
}

#[test]
fn repeated_runs_are_identical() {
    let validator = Validator::default();
    let first = validator.validate_file(&template_path());
    let second = validator.validate_file(&template_path());

    assert_eq!(first, second);
    assert!(first.outcome_sha256.is_some());
    assert_eq!(first.outcome_sha256, second.outcome_sha256);
}

#[test]
fn malformed_files_abort_with_single_failure() {
    let dir = tempfile::tempdir().unwrap();
    let validator = Validator::default();

    let cases: [(&str, &[u8]); 3] = [
        ("truncated.json", b"{\"parameters\": {"),
        ("latin1.json", b"{\"name\": \"caf\xe9\"}"),
        ("empty.json", b""),
    ];

    for (name, bytes) in cases {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();

        let report = validator.validate_file(&path);
        assert!(!report.valid, "{} should fail", name);
        assert_eq!(report.checks.len(), 1);
        assert_eq!(report.checks[0].name, LOAD_CHECK);
        assert!(matches!(
            report.checks[0].violations[0].failure,
            CheckFailure::MalformedDocument { .. }
        ));
    }

    let missing = validator.validate_file(&dir.path().join("absent.json"));
    assert_eq!(missing.checks[0].name, LOAD_CHECK);
}

#[test]
fn contract_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contract.json");
    std::fs::write(&path, r#"{"resources": {"expectedCount": 3, "expectedTypes": []}}"#).unwrap();

    let contract = TemplateContract::load(&path).unwrap();
    assert_eq!(contract.resources.expected_count, 3);

    let report = Validator::from_contract(&contract).validate_file(&template_path());
    assert_eq!(
        failures_of(&report, "resources_structure"),
        vec![CheckFailure::ResourceCountMismatch { expected: 3, actual: 2 }]
    );
}

#[test]
fn malformed_parameter_entry_does_not_hide_the_others() {
    let mut template = shipped_template();
    template["parameters"]["junk"] = json!("not-an-object");

    let report = Validator::default().validate(&TemplateDocument::from_value(template));

    assert!(report.check("required_parameters").unwrap().passed);
    assert_eq!(
        failures_of(&report, "parameter_references"),
        vec![CheckFailure::UnreferencedParameter { name: "junk".to_string() }]
    );
}

#[test]
fn malformed_resource_entry_still_counted() {
    let mut template = shipped_template();
    template["resources"].as_array_mut().unwrap().push(json!(42));

    let report = Validator::default().validate(&TemplateDocument::from_value(template));

    assert_eq!(
        failures_of(&report, "resources_structure"),
        vec![CheckFailure::ResourceCountMismatch { expected: 2, actual: 3 }]
    );
    assert!(report.check("resource:Microsoft.CognitiveServices/accounts").unwrap().passed);
    assert!(report.check("resource:Microsoft.CognitiveServices/accounts/deployments").unwrap().passed);
}

#[test]
fn contract_field_paths_outside_typed_fields() {
    let mut template = shipped_template();
    template["resources"][0]["identity"] = json!({"type": "SystemAssigned"});

    let mut contract = TemplateContract::default();
    let account = contract
        .resource_shapes
        .iter_mut()
        .find(|s| s.resource_type == ACCOUNT_TYPE)
        .unwrap();
    account.field_values.push(FieldValue {
        path: "identity.type".to_string(),
        value: json!("SystemAssigned"),
    });

    let report = Validator::from_contract(&contract).validate(&TemplateDocument::from_value(template));
    assert!(report.valid, "{:?}", report.failures().collect::<Vec<_>>());
}

fn run_cli(template: &std::path::Path) -> i32 {
    Command::new(env!("CARGO_BIN_EXE_armlint-cli"))
        .arg("validate")
        .arg("--template")
        .arg(template)
        .output()
        .unwrap()
        .status
        .code()
        .unwrap()
}

#[test]
fn cli_exit_codes() {
    let dir = tempfile::tempdir().unwrap();

    assert_eq!(run_cli(&template_path()), i32::from(EXIT_PASSED));

    let mut template = shipped_template();
    template["contentVersion"] = json!("1.0.0");
    let mutated = dir.path().join("mutated.json");
    std::fs::write(&mutated, template.to_string()).unwrap();
    assert_eq!(run_cli(&mutated), i32::from(EXIT_CHECKS_FAILED));

    let truncated = dir.path().join("truncated.json");
    std::fs::write(&truncated, "{\"parameters\": {").unwrap();
    assert_eq!(run_cli(&truncated), i32::from(EXIT_LOAD_FAILED));
}

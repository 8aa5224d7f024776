//! armlint Core - ARM Template Contract Checker
//!
//! # Ground Rules
//! 1. The Document Is Read-Only
//! 2. Contracts Are Data
//! 3. Every Check Runs
//! 4. Deterministic Reports

pub mod checks;
pub mod contract;
pub mod document;
pub mod hashing;
pub mod validation;

pub use checks::CheckFailure;
pub use contract::{ContractError, TemplateContract};
pub use document::{DocumentError, TemplateDocument};
pub use hashing::{canonical_json, sha256_hex};
pub use validation::{CheckResult, ValidationReport, ValidationRule, ValidationViolation, Validator, ViolationSeverity};

pub const VALIDATOR_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DEFAULT_TEMPLATE_PATH: &str = "templates/azuredeployopenai.json";

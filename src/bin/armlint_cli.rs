//! armlint CLI - Template contract checks
//!
//! Commands: validate, contract
//! Exit codes: 0 all checks passed, 2 validation failure, 1 load failure

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use armlint_core::{
    TemplateContract, ValidationReport, Validator, ViolationSeverity,
    DEFAULT_TEMPLATE_PATH,
};

#[derive(Parser)]
#[command(name = "armlint-cli", version)]
#[command(about = "armlint CLI - ARM template contract checker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every check against a template
    Validate {
        /// Path to the ARM template
        #[arg(short, long, default_value = DEFAULT_TEMPLATE_PATH)]
        template: PathBuf,

        /// Contract file overriding the built-in expectations
        #[arg(short, long)]
        contract: Option<PathBuf>,

        /// Report format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Print the effective contract as JSON
    Contract {
        /// Contract file to load instead of the built-in one
        #[arg(short, long)]
        contract: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_contract(path: Option<&Path>) -> Result<TemplateContract, ExitCode> {
    match path {
        None => Ok(TemplateContract::default()),
        Some(path) => TemplateContract::load(path).map_err(|e| {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }),
    }
}

fn print_text(template: &Path, report: &ValidationReport) {
    println!("Validating {}", template.display());
    for check in &report.checks {
        let status = if check.passed { "PASS" } else { "FAIL" };
        println!("{} {}", status, check.name);
        for violation in &check.violations {
            let tag = match violation.severity {
                ViolationSeverity::Error => "error",
                ViolationSeverity::Warning => "warning",
            };
            println!("    {}: {}", tag, violation.message);
        }
    }
    println!(
        "{} passed, {} failed ({} checks)",
        report.passed,
        report.failed,
        report.checks.len()
    );
    if let Some(outcome) = &report.outcome_sha256 {
        println!("outcome sha256 {}", outcome);
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Validate { template, contract, format } => {
            let contract = match load_contract(contract.as_deref()) {
                Ok(c) => c,
                Err(code) => return code,
            };

            let report = Validator::from_contract(&contract).validate_file(&template);

            match format {
                OutputFormat::Text => print_text(&template, &report),
                OutputFormat::Json => match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("error: {}", e);
                        return ExitCode::FAILURE;
                    }
                },
            }

            ExitCode::from(report.exit_code())
        }

        Commands::Contract { contract } => {
            let contract = match load_contract(contract.as_deref()) {
                Ok(c) => c,
                Err(code) => return code,
            };
            match serde_json::to_string_pretty(&contract) {
                Ok(json) => {
                    println!("{}", json);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("error: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}

//! Swagger Validate CLI
//!
//! Command-line interface for checking Swagger 2.0 specifications and
//! validating live payloads against them.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use swagger_validate::{
    load_document, Direction, Issue, LiveRequest, LiveResponse, SpecSet, ValidatorConfig,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "swagger-validate")]
#[command(about = "Check Swagger 2.0 specs and validate payloads against their operations")]
#[command(version)]
struct Cli {
    /// Validator config file (JSON or YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `swagger_validate=trace` (default: RUST_LOG, then warn)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, transform and compile every validator of the given specs
    Check {
        /// Spec sources: file paths or URLs (http:// or https://)
        #[arg(required = true)]
        specs: Vec<String>,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Print a definition after the transformation pipeline
    Resolve {
        /// Spec source: file path or URL
        spec: String,

        /// Definition name under `#/definitions`
        #[arg(long, short)]
        definition: String,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a request payload `{path, query, headers, body, formData}`
    Request {
        /// Spec source: file path or URL
        spec: String,

        /// Operation id or operation key
        #[arg(long)]
        operation_id: String,

        /// Payload file (JSON or YAML)
        #[arg(long)]
        payload: PathBuf,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Validate a response payload `{headers, body}`
    Response {
        /// Spec source: file path or URL
        spec: String,

        /// Operation id or operation key
        #[arg(long)]
        operation_id: String,

        /// Response status code
        #[arg(long)]
        status: String,

        /// Payload file (JSON or YAML)
        #[arg(long)]
        payload: PathBuf,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Check { specs, json } => run_check(&specs, &config, json),
        Commands::Resolve {
            spec,
            definition,
            output,
            pretty,
        } => run_resolve(&spec, &config, &definition, output, pretty),
        Commands::Request {
            spec,
            operation_id,
            payload,
            json,
        } => run_validate(ValidateArgs {
            spec,
            config,
            operation_id,
            payload,
            status: None,
            json_output: json,
        }),
        Commands::Response {
            spec,
            operation_id,
            status,
            payload,
            json,
        } => run_validate(ValidateArgs {
            spec,
            config,
            operation_id,
            payload,
            status: Some(status),
            json_output: json,
        }),
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<ValidatorConfig, u8> {
    match path {
        Some(path) => ValidatorConfig::from_file(path).map_err(|e| {
            eprintln!("Error loading config: {}", e);
            e.exit_code() as u8
        }),
        None => Ok(ValidatorConfig::default()),
    }
}

fn build_spec_set(specs: &[String], config: &ValidatorConfig, json_output: bool) -> Result<SpecSet, u8> {
    let mut builder = SpecSet::builder();
    for spec in specs {
        builder = builder.load(spec).map_err(|e| {
            report_error(json_output, &format!("loading {}: {}", spec, e));
            e.exit_code() as u8
        })?;
    }
    builder.config(config).build().map_err(|e| {
        report_error(json_output, &e.to_string());
        e.exit_code() as u8
    })
}

fn runtime() -> Result<tokio::runtime::Runtime, u8> {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| {
            eprintln!("Error starting runtime: {}", e);
            3u8
        })
}

fn run_check(specs: &[String], config: &ValidatorConfig, json_output: bool) -> Result<(), u8> {
    let set = build_spec_set(specs, config, json_output)?;
    let report = runtime()?.block_on(set.build_all(false));

    if json_output {
        let errors: Vec<Value> = report
            .errors
            .iter()
            .map(|(key, error)| json!({"key": key, "error": error.to_string()}))
            .collect();
        let output = json!({
            "valid": errors.is_empty(),
            "operations": set.operations().len(),
            "compiled": report.compiled,
            "errors": errors,
        });
        println!("{}", output);
    } else {
        for (key, error) in &report.errors {
            eprintln!("  {}: {}", key, error);
        }
        println!(
            "{} operations, {} validators compiled, {} failed",
            set.operations().len(),
            report.compiled,
            report.errors.len()
        );
    }

    match report.errors.first() {
        None => Ok(()),
        Some((_, error)) => Err(error.exit_code() as u8),
    }
}

fn run_resolve(
    spec: &str,
    config: &ValidatorConfig,
    definition: &str,
    output: Option<PathBuf>,
    pretty: bool,
) -> Result<(), u8> {
    let set = build_spec_set(&[spec.to_string()], config, false)?;
    let Some(resolved) = set.definition(definition) else {
        eprintln!("Error: definition not found: {}", definition);
        return Err(2);
    };

    let json_output = if pretty {
        serde_json::to_string_pretty(&resolved)
    } else {
        serde_json::to_string(&resolved)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match output {
        Some(path) => {
            std::fs::write(&path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    Ok(())
}

struct ValidateArgs {
    spec: String,
    config: ValidatorConfig,
    operation_id: String,
    payload: PathBuf,
    /// `Some` for responses.
    status: Option<String>,
    json_output: bool,
}

fn run_validate(args: ValidateArgs) -> Result<(), u8> {
    let ValidateArgs {
        spec,
        config,
        operation_id,
        payload: payload_path,
        status,
        json_output,
    } = args;

    let mut payload = load_document(&payload_path).map_err(|e| {
        report_error(json_output, &format!("loading payload: {}", e));
        e.exit_code() as u8
    })?;
    let set = build_spec_set(&[spec], &config, json_output)?;
    let runtime = runtime()?;

    let outcome = match status {
        None => {
            let request: LiveRequest = parse_payload(payload, json_output)?;
            let ctx = config.context(Direction::Request);
            runtime.block_on(set.validate_request(&operation_id, &request, &ctx))
        }
        Some(status) => {
            if let Some(object) = payload.as_object_mut() {
                object.insert("statusCode".into(), Value::String(status));
            }
            let response: LiveResponse = parse_payload(payload, json_output)?;
            let ctx = config.context(Direction::Response);
            runtime.block_on(set.validate_response(&operation_id, &response, &ctx))
        }
    };

    match outcome {
        Ok(issues) if issues.is_empty() => {
            if json_output {
                println!(r#"{{"valid":true}}"#);
            } else {
                println!("Valid");
            }
            Ok(())
        }
        Ok(issues) => {
            report_issues(json_output, &issues);
            Err(1)
        }
        Err(e) => {
            report_error(json_output, &e.to_string());
            Err(e.exit_code() as u8)
        }
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(payload: Value, json_output: bool) -> Result<T, u8> {
    serde_json::from_value(payload).map_err(|e| {
        report_error(json_output, &format!("invalid payload: {}", e));
        2u8
    })
}

fn report_issues(json_output: bool, issues: &[Issue]) {
    if json_output {
        let output = json!({
            "valid": false,
            "issues": issues,
        });
        println!("{}", output);
    } else {
        eprintln!("Validation failed:");
        for issue in issues {
            eprintln!("  {}", issue);
            eprintln!("    at {}", issue.source.location());
        }
    }
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", json!({"valid": false, "error": msg}));
    } else {
        eprintln!("Error: {}", msg);
    }
}

//! MSSQL statement guard entry point.
//!
//! Validates one query and prints the verdict as JSON on stdout:
//!
//! ```text
//! mssql-statement-guard <operation_class> [query...]
//! ```
//!
//! The query is read from stdin when not given on the command line.
//! Exit status is 0 when the query is accepted and 2 when it is rejected.

use anyhow::{bail, Context, Result};
use mssql_statement_guard::{Config, GuardError, OperationClass, QueryGuard};
use serde_json::json;
use std::io::Read;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> Result<ExitCode> {
    // Initialize logging to stderr (stdout is reserved for the verdict)
    init_logging();

    let mut args = std::env::args().skip(1);
    let Some(class_arg) = args.next() else {
        bail!("usage: mssql-statement-guard <operation_class> [query...]");
    };
    let class: OperationClass = class_arg.parse()?;

    let rest: Vec<String> = args.collect();
    let query = if rest.is_empty() {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read query from stdin")?;
        buf
    } else {
        rest.join(" ")
    };

    // Load configuration from environment
    let config = Config::from_env()?;
    let guard = QueryGuard::from_config(&config)?;

    let (verdict, code) = match guard.check(class, &query) {
        Ok(result) => (
            json!({
                "operation_class": class,
                "is_valid": true,
                "reason": null,
                "normalized_query": result.normalized_query,
            }),
            ExitCode::SUCCESS,
        ),
        Err(e) => {
            let (kind, normalized_query, reason) = match &e {
                GuardError::ValidationFailed {
                    violation,
                    normalized_query,
                } => (
                    Some(violation.kind()),
                    normalized_query.clone(),
                    violation.to_string(),
                ),
                GuardError::ReadOnlyViolation(_) => (Some("ReadOnly"), None, e.to_string()),
                _ => (None, None, e.to_string()),
            };
            (
                json!({
                    "operation_class": class,
                    "is_valid": false,
                    "reason": reason,
                    "violation": kind,
                    "suggestion": e.suggestion(),
                    "normalized_query": normalized_query,
                }),
                ExitCode::from(2),
            )
        }
    };

    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(code)
}

/// Initialize tracing subscriber with stderr output.
fn init_logging() {
    let filter = std::env::var("RUST_LOG")
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new("warn,mssql_statement_guard=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

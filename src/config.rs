//! Configuration management for the statement guard.
//!
//! Configuration is loaded from environment variables following the 12-factor app pattern.
//! It never changes the engine's code paths, only the policy data it compiles.

use crate::constants::DEFAULT_OBJECT_TYPES;
use crate::error::GuardError;
use crate::security::{OperationClass, PolicyOverrides};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Guard configuration loaded from environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Security configuration
    pub security: SecurityConfig,
}

/// Security configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Refuse every write operation class
    pub read_only: bool,

    /// Per-class policy overrides
    pub overrides: BTreeMap<OperationClass, PolicyOverrides>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// All optional:
    /// - `MSSQL_MAX_QUERY_LENGTH`: Maximum query length in characters, for every class
    /// - `MSSQL_MUTATION_VERB`: Leading verb of guarded mutations (`update` or `delete`)
    /// - `MSSQL_EXTRA_OBJECT_TYPES`: Comma-separated object types added to the DDL allow-list
    /// - `MSSQL_READ_ONLY`: Refuse mutations and schema changes (default: false)
    /// - `MSSQL_POLICY_OVERRIDES`: Path to a JSON file of per-class overrides, applied last
    pub fn from_env() -> Result<Self, GuardError> {
        let mut overrides: BTreeMap<OperationClass, PolicyOverrides> = BTreeMap::new();

        // Optional: Length limit
        if let Some(raw) = env_var("MSSQL_MAX_QUERY_LENGTH") {
            let max_length: usize = raw.parse().map_err(|_| {
                GuardError::config(format!(
                    "MSSQL_MAX_QUERY_LENGTH must be a positive integer, got '{}'",
                    raw
                ))
            })?;
            if max_length == 0 {
                return Err(GuardError::config(
                    "MSSQL_MAX_QUERY_LENGTH must be greater than zero",
                ));
            }
            for class in OperationClass::ALL {
                overrides.entry(class).or_default().max_length = Some(max_length);
            }
        }

        // Optional: Mutation verb
        if let Some(raw) = env_var("MSSQL_MUTATION_VERB") {
            let verb = match raw.to_lowercase().as_str() {
                "update" => "UPDATE",
                "delete" => "DELETE",
                _ => {
                    return Err(GuardError::config(format!(
                        "MSSQL_MUTATION_VERB must be 'update' or 'delete', got '{}'",
                        raw
                    )))
                }
            };
            overrides
                .entry(OperationClass::GuardedMutation)
                .or_default()
                .required_leading_verbs = Some(vec![verb.to_string()]);
        }

        // Optional: Organisation-specific object types
        if let Some(raw) = env_var("MSSQL_EXTRA_OBJECT_TYPES") {
            let mut types: Vec<String> = DEFAULT_OBJECT_TYPES.iter().map(|t| t.to_string()).collect();
            for extra in raw.split(',').map(|t| t.trim().to_uppercase()) {
                if !extra.is_empty() && !types.contains(&extra) {
                    types.push(extra);
                }
            }
            overrides
                .entry(OperationClass::DataDefinition)
                .or_default()
                .allowed_object_types = Some(types);
        }

        // Optional: Read-only dispatch
        let read_only = env_var("MSSQL_READ_ONLY")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);

        // Optional: Override document, merged last
        if let Some(path) = env_var("MSSQL_POLICY_OVERRIDES") {
            for (class, file_overrides) in load_overrides_file(Path::new(&path))? {
                overrides.entry(class).or_default().merge(file_overrides);
            }
        }

        overrides.retain(|_, o| !o.is_empty());

        Ok(Config {
            security: SecurityConfig {
                read_only,
                overrides,
            },
        })
    }
}

/// Parse a JSON override document: `{ "<operation_class>": { ...overrides } }`.
pub fn parse_overrides(json: &str) -> Result<BTreeMap<OperationClass, PolicyOverrides>, GuardError> {
    serde_json::from_str(json)
        .map_err(|e| GuardError::config(format!("Invalid policy overrides: {}", e)))
}

/// Read and parse a JSON override document from disk.
pub fn load_overrides_file(
    path: &Path,
) -> Result<BTreeMap<OperationClass, PolicyOverrides>, GuardError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        GuardError::config(format!(
            "Cannot read MSSQL_POLICY_OVERRIDES file {}: {}",
            path.display(),
            e
        ))
    })?;
    parse_overrides(&contents)
}

/// Read a variable, treating empty values as unset.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

//! Query guard for a tool-dispatch layer.
//!
//! The dispatch layer picks an [`OperationClass`] from the capability that
//! was invoked, asks the guard, and only forwards the original text to the
//! database when the guard returns `Ok`. Process-wide settings such as the
//! read-only flag arrive here as an injected [`GuardContext`].

use crate::config::Config;
use crate::error::{GuardError, Violation};
use crate::security::{OperationClass, PolicyEngine, ValidationResult};
use std::sync::Arc;
use tracing::{debug, warn};

/// Settings the surrounding server injects into the guard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuardContext {
    /// Refuse every operation class that writes.
    pub read_only: bool,
}

/// Validates queries before they reach the database.
///
/// Cheap to clone; the compiled policies are shared.
#[derive(Debug, Clone)]
pub struct QueryGuard {
    engine: Arc<PolicyEngine>,
    context: GuardContext,
}

impl QueryGuard {
    /// Create a guard from an engine and its context.
    pub fn new(engine: Arc<PolicyEngine>, context: GuardContext) -> Self {
        Self { engine, context }
    }

    /// Create a guard from loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, GuardError> {
        let engine = PolicyEngine::with_overrides(&config.security.overrides)?;
        Ok(Self::new(
            Arc::new(engine),
            GuardContext {
                read_only: config.security.read_only,
            },
        ))
    }

    /// The injected context.
    pub fn context(&self) -> GuardContext {
        self.context
    }

    /// The shared engine.
    pub fn engine(&self) -> &PolicyEngine {
        &self.engine
    }

    /// Check a query; `Ok` means it may be executed as submitted.
    pub fn check(
        &self,
        class: OperationClass,
        query: &str,
    ) -> Result<ValidationResult, GuardError> {
        if self.context.read_only && !class.is_read() {
            warn!("Refusing {} operation in read-only mode", class);
            return Err(GuardError::read_only(format!(
                "{} operations are disabled",
                class
            )));
        }

        let result = self.engine.validate(class, query);
        if !result.is_valid {
            return Err(GuardError::validation(
                result.violation.unwrap_or(Violation::Internal),
                result.normalized_query,
            ));
        }

        debug!("{} query accepted", class);
        Ok(result)
    }
}

//! Policy engine and public validation entry point.
//!
//! Each call runs a linear pipeline and ends in exactly one of two states,
//! accepted or rejected with a single reason. The first failing check wins:
//!
//! 1. normalization; empty result is rejected
//! 2. statement splitting and the multi-statement rule
//! 3. per statement: leading verb, then object type
//! 4. guard clause (`WHERE`)
//! 5. keyword denylist
//! 6. structural pattern rules
//! 7. length of the submitted text against `max_length`
//! 8. protected system qualifiers
//!
//! Every step is linear in the input, so the length limit bounds the cost
//! of a rejected call as well as an accepted one.
//!
//! Validation never fails with an error. Any internal fault, including a
//! panic inside the pipeline, becomes a rejection.

use super::normalize::normalize;
use super::policy::{CompiledPolicy, OperationClass, PolicyOverrides, ValidationPolicy};
use super::splitter::split_statements;
use crate::constants::LOG_QUERY_TRUNCATE_LENGTH;
use crate::error::{GuardError, Violation};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, warn};

/// Outcome of validating one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    /// Whether the query may be handed to the database
    pub is_valid: bool,
    /// Rejection reason; `None` when valid
    pub reason: Option<String>,
    /// Comment-stripped, whitespace-collapsed text, when normalization ran
    pub normalized_query: Option<String>,
    /// The violated rule; `None` when valid
    #[serde(skip)]
    pub violation: Option<Violation>,
}

impl ValidationResult {
    /// An accepted result.
    pub fn accepted(normalized: String) -> Self {
        Self {
            is_valid: true,
            reason: None,
            normalized_query: Some(normalized),
            violation: None,
        }
    }

    /// A rejected result.
    pub fn rejected(violation: Violation, normalized: Option<String>) -> Self {
        Self {
            is_valid: false,
            reason: Some(violation.to_string()),
            normalized_query: normalized,
            violation: Some(violation),
        }
    }

    /// The fail-closed result for an unexpected internal condition.
    pub fn internal_error() -> Self {
        Self::rejected(Violation::Internal, None)
    }

    /// Machine-readable kind of the violation, if rejected.
    pub fn violation_kind(&self) -> Option<&'static str> {
        self.violation.as_ref().map(Violation::kind)
    }
}

/// Compiled policies for every operation class.
///
/// Immutable after construction and safe to share across threads.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    policies: HashMap<OperationClass, CompiledPolicy>,
}

impl PolicyEngine {
    /// Engine with the built-in policies.
    pub fn new() -> Result<Self, GuardError> {
        Self::with_overrides(&BTreeMap::new())
    }

    /// Engine with the built-in policies, each patched by its overrides.
    pub fn with_overrides(
        overrides: &BTreeMap<OperationClass, PolicyOverrides>,
    ) -> Result<Self, GuardError> {
        Self::from_policies(OperationClass::ALL.into_iter().map(|class| {
            let policy = ValidationPolicy::builtin(class);
            match overrides.get(&class) {
                Some(o) => (class, policy.with_overrides(o)),
                None => (class, policy),
            }
        }))
    }

    /// Engine from explicit policies.
    ///
    /// A class with no policy is rejected on every call.
    pub fn from_policies<I>(policies: I) -> Result<Self, GuardError>
    where
        I: IntoIterator<Item = (OperationClass, ValidationPolicy)>,
    {
        let mut compiled = HashMap::new();
        for (class, policy) in policies {
            compiled.insert(class, policy.compile()?);
        }
        Ok(Self { policies: compiled })
    }

    /// The compiled policy for a class.
    pub fn policy(&self, class: OperationClass) -> Option<&CompiledPolicy> {
        self.policies.get(&class)
    }

    /// Validate a query against the policy of its operation class.
    pub fn validate(&self, class: OperationClass, query: &str) -> ValidationResult {
        debug!(
            "Validating {} query: {}",
            class,
            truncate_for_log(query, LOG_QUERY_TRUNCATE_LENGTH)
        );

        let result = match self.policies.get(&class) {
            Some(policy) => Self::validate_with(policy, query),
            None => {
                error!("No policy configured for operation class {}", class);
                ValidationResult::internal_error()
            }
        };

        if let Some(reason) = &result.reason {
            warn!(
                "Rejected {} query ({}): {}",
                class,
                result.violation_kind().unwrap_or("Unknown"),
                reason
            );
        }
        result
    }

    /// Validate a query against an arbitrary compiled policy.
    pub fn validate_with(policy: &CompiledPolicy, query: &str) -> ValidationResult {
        match panic::catch_unwind(AssertUnwindSafe(|| evaluate(policy, query))) {
            Ok(result) => result,
            Err(_) => {
                error!("Validation pipeline panicked; rejecting query");
                ValidationResult::internal_error()
            }
        }
    }
}

/// Engine with the built-in policies, compiled on first use.
static DEFAULT_ENGINE: Lazy<PolicyEngine> = Lazy::new(|| {
    PolicyEngine::new()
        .unwrap_or_else(|e| panic!("Internal error: built-in policies failed to compile: {}", e))
});

/// Validate a query for an operation class.
///
/// With `overrides`, the built-in policy is patched and compiled for this
/// call only; long-lived callers should build a [`PolicyEngine`] once instead.
pub fn validate(
    class: OperationClass,
    query: &str,
    overrides: Option<&PolicyOverrides>,
) -> ValidationResult {
    let overrides = overrides.filter(|o| !o.is_empty());
    let Some(overrides) = overrides else {
        return match panic::catch_unwind(|| &*DEFAULT_ENGINE) {
            Ok(engine) => engine.validate(class, query),
            Err(_) => ValidationResult::internal_error(),
        };
    };

    match ValidationPolicy::builtin(class).with_overrides(overrides).compile() {
        Ok(policy) => PolicyEngine::validate_with(&policy, query),
        Err(e) => {
            error!("Policy overrides for {} are invalid: {}", class, e);
            ValidationResult::internal_error()
        }
    }
}

fn evaluate(policy: &CompiledPolicy, query: &str) -> ValidationResult {
    let normalized = normalize(query);
    match check(policy, query, &normalized) {
        Ok(()) => ValidationResult::accepted(normalized),
        Err(violation) => ValidationResult::rejected(violation, Some(normalized)),
    }
}

fn check(policy: &CompiledPolicy, raw: &str, normalized: &str) -> Result<(), Violation> {
    let statements = split_statements(normalized);
    if statements.is_empty() {
        return Err(Violation::EmptyInput);
    }

    if statements.len() > 1 && !policy.allows_multiple_statements() {
        return Err(Violation::MultipleStatementsNotAllowed);
    }

    let mut first_verb = None;
    for statement in &statements {
        let verb = policy.check_statement(statement)?;
        first_verb.get_or_insert(verb);
    }

    // Textual containment on the submitted text: a WHERE inside a literal
    // or a comment satisfies the guard.
    if policy.requires_guard_clause() && !raw.to_uppercase().contains("WHERE") {
        return Err(Violation::MissingGuardClause {
            verb: first_verb.unwrap_or_default().to_string(),
        });
    }

    if let Some(keyword) = policy.keywords().scan(&normalized.to_uppercase()) {
        return Err(Violation::DeniedKeyword(keyword.to_string()));
    }

    if let Some(rule) = policy.detector().check(normalized, raw) {
        return Err(Violation::DeniedPattern {
            name: rule.name().to_string(),
            reason: rule.reason().to_string(),
        });
    }

    let length = raw.chars().count();
    if length > policy.max_length() {
        return Err(Violation::InputTooLong {
            length,
            max: policy.max_length(),
        });
    }

    if let Some(target) = policy.protected_target(normalized) {
        return Err(Violation::ProtectedTarget(target));
    }

    Ok(())
}

/// Truncate to at most `max_len` characters for logging.
fn truncate_for_log(s: &str, max_len: usize) -> String {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

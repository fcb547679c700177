//! Error types for the statement guard.
//!
//! Two families live here:
//! - [`Violation`]: the reason a query was rejected. Rejection is an ordinary
//!   outcome of validation, carried inside a `ValidationResult`, never raised.
//! - [`GuardError`]: configuration failures and dispatch-side refusals.

use thiserror::Error;

/// A single violated rule.
///
/// The `Display` output is the human-readable reason surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    /// Text is empty or becomes empty after comment stripping.
    #[error("empty query")]
    EmptyInput,

    /// A statement does not start with a verb permitted by the policy.
    #[error("statement must start with one of: {allowed} (found '{found}')")]
    InvalidLeadingVerb { allowed: String, found: String },

    /// A guarded mutation lacks the `WHERE` token.
    #[error("{verb} statement requires a WHERE clause")]
    MissingGuardClause { verb: String },

    /// A definition statement does not name an allow-listed object type.
    #[error("{verb} statement must target one of the allowed object types: {allowed}")]
    DisallowedObjectType { verb: String, allowed: String },

    /// A denylisted keyword was found.
    #[error("keyword '{0}' is not allowed")]
    DeniedKeyword(String),

    /// A structural injection rule matched. Display is the rule's reason, verbatim.
    #[error("{reason}")]
    DeniedPattern { name: String, reason: String },

    /// More than one statement under a single-statement policy.
    #[error("multiple statements are not allowed")]
    MultipleStatementsNotAllowed,

    /// A system database or catalog schema was referenced.
    #[error("reference to protected system object '{0}' is not allowed")]
    ProtectedTarget(String),

    /// Text exceeds the policy's maximum length.
    #[error("query length {length} exceeds maximum of {max} characters")]
    InputTooLong { length: usize, max: usize },

    /// Unexpected internal condition; always a rejection.
    #[error("internal validation error")]
    Internal,
}

impl Violation {
    /// Stable machine-readable name of the violation kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyInput => "EmptyInput",
            Self::InvalidLeadingVerb { .. } => "InvalidLeadingVerb",
            Self::MissingGuardClause { .. } => "MissingGuardClause",
            Self::DisallowedObjectType { .. } => "DisallowedObjectType",
            Self::DeniedKeyword(_) => "DeniedKeyword",
            Self::DeniedPattern { .. } => "DeniedPattern",
            Self::MultipleStatementsNotAllowed => "MultipleStatementsNotAllowed",
            Self::ProtectedTarget(_) => "ProtectedTarget",
            Self::InputTooLong { .. } => "InputTooLong",
            Self::Internal => "Internal",
        }
    }
}

/// Errors raised outside the validation pipeline itself.
#[derive(Debug, Error)]
pub enum GuardError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A custom pattern rule could not be compiled
    #[error("Invalid pattern rule '{name}': {message}")]
    InvalidPattern { name: String, message: String },

    /// Query rejected by its policy
    #[error("Query validation failed: {violation}")]
    ValidationFailed {
        violation: Violation,
        normalized_query: Option<String>,
    },

    /// Operation refused because the guard is read-only
    #[error("Read-only mode: {0}")]
    ReadOnlyViolation(String),
}

impl GuardError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid pattern error.
    pub fn invalid_pattern(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPattern {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a validation error from the violated rule.
    pub fn validation(violation: Violation, normalized_query: Option<String>) -> Self {
        Self::ValidationFailed {
            violation,
            normalized_query,
        }
    }

    /// The violated rule, when this is a policy rejection.
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            Self::ValidationFailed { violation, .. } => Some(violation),
            _ => None,
        }
    }

    /// Create a read-only violation error.
    pub fn read_only(msg: impl Into<String>) -> Self {
        Self::ReadOnlyViolation(msg.into())
    }

    /// Get a user-friendly suggestion for how to fix this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Config(_) => Some("Check your environment variables and configuration"),
            Self::InvalidPattern { .. } => Some("Fix the regular expression in the policy overrides"),
            Self::ValidationFailed { .. } => Some("Review your query against the validation rules"),
            Self::ReadOnlyViolation(_) => {
                Some("Only read-only and diagnostic queries are accepted in read-only mode")
            }
        }
    }
}

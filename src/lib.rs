//! # MSSQL Statement Guard
//!
//! Operation-specific safety validation for raw SQL Server statements.
//!
//! This crate provides:
//! - **Policies**: one declarative policy per operation class (read-only query,
//!   guarded mutation, schema definition, diagnostic batch)
//! - **Engine**: a pure, synchronous pipeline that accepts or rejects a query
//!   with exactly one reason
//! - **Guard**: the fail-closed check a dispatch layer runs before execution
//!
//! ## Architecture
//!
//! Caller → policy engine (selects policy by operation class) → normalizer →
//! statement splitter → keyword and pattern scanners → validation result.
//! Nothing here talks to a database.
//!
//! ```
//! use mssql_statement_guard::security::{validate, OperationClass};
//!
//! let ok = validate(OperationClass::ReadOnlyQuery, "SELECT * FROM users", None);
//! assert!(ok.is_valid);
//!
//! let bad = validate(OperationClass::GuardedMutation, "UPDATE users SET name = 'x'", None);
//! assert!(!bad.is_valid);
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod guard;
pub mod security;

pub use config::Config;
pub use error::{GuardError, Violation};
pub use guard::{GuardContext, QueryGuard};
pub use security::{validate, OperationClass, PolicyEngine, ValidationResult};

//! Centralized constants for the statement guard.
//!
//! This module contains the default limits and the built-in word lists used
//! by the policies, making them easy to find, understand, and modify.

// =============================================================================
// Length Limits
// =============================================================================

/// Default maximum query length, in characters.
pub const DEFAULT_MAX_QUERY_LENGTH: usize = 50_000;

/// Default maximum length for diagnostic batches, in characters.
pub const DEFAULT_MAX_DIAGNOSTIC_LENGTH: usize = 10_000;

// =============================================================================
// Leading Verbs
// =============================================================================

/// Leading verb of a read-only query.
pub const READ_VERBS: &[&str] = &["SELECT"];

/// Default leading verb of a guarded mutation.
pub const DEFAULT_MUTATION_VERB: &str = "UPDATE";

/// Leading verbs accepted for schema definition statements.
pub const DEFINITION_VERBS: &[&str] = &["CREATE", "ALTER", "DROP", "TRUNCATE"];

/// Verbs whose statements must name an allow-listed object type.
pub const OBJECT_TYPE_VERBS: &[&str] = &["CREATE", "ALTER"];

/// Leading forms accepted in a diagnostic batch: a query, or a measurement toggle.
pub const DIAGNOSTIC_VERBS: &[&str] = &[
    "SELECT",
    "SET STATISTICS IO",
    "SET STATISTICS TIME",
    "SET STATISTICS XML",
    "SET STATISTICS PROFILE",
    "SET SHOWPLAN_ALL",
    "SET SHOWPLAN_TEXT",
    "SET SHOWPLAN_XML",
];

// =============================================================================
// Keyword Denylists
// =============================================================================

/// Statement verbs and server commands that modify data, schema, or server state.
pub const MODIFYING_KEYWORDS: &[&str] = &[
    "INSERT",
    "UPDATE",
    "DELETE",
    "MERGE",
    "DROP",
    "CREATE",
    "ALTER",
    "TRUNCATE",
    "EXEC",
    "EXECUTE",
    "GRANT",
    "REVOKE",
    "DENY",
    "BACKUP",
    "RESTORE",
    "SHUTDOWN",
    "DBCC",
    "KILL",
    "RECONFIGURE",
    "BULK",
    "OPENROWSET",
    "OPENQUERY",
    "OPENDATASOURCE",
];

/// Extra keywords denied to read policies (`SELECT ... INTO` creates a table).
pub const READ_EXTRA_KEYWORDS: &[&str] = &["INTO"];

/// Keywords denied inside schema definition statements.
///
/// `INSERT`, `UPDATE` and `DELETE` are tolerated only in referential actions
/// and trigger events; see the exemption lists below.
pub const DEFINITION_DENIED_KEYWORDS: &[&str] = &[
    "INSERT",
    "UPDATE",
    "DELETE",
    "MERGE",
    "EXEC",
    "EXECUTE",
    "GRANT",
    "REVOKE",
    "DENY",
    "BACKUP",
    "RESTORE",
    "SHUTDOWN",
    "DBCC",
    "KILL",
    "RECONFIGURE",
    "BULK",
    "OPENROWSET",
    "OPENQUERY",
    "OPENDATASOURCE",
    "DATABASE",
    "LOGIN",
];

/// Verbs allowed in a referential action (`ON DELETE CASCADE`).
pub const REFERENTIAL_ACTION_VERBS: &[&str] = &["DELETE", "UPDATE"];

/// Tokens that open a referential action.
pub const REFERENTIAL_ACTION_PREFIXES: &[&str] = &["ON"];

/// Tokens that may follow `ON DELETE` / `ON UPDATE`.
pub const REFERENTIAL_ACTION_FOLLOWERS: &[&str] = &["CASCADE", "NO", "SET"];

/// Verbs allowed as trigger events.
pub const TRIGGER_EVENT_VERBS: &[&str] = &["INSERT", "UPDATE", "DELETE"];

/// Tokens that introduce a trigger's event list (`FOR`, `AFTER`, `INSTEAD OF`).
pub const TRIGGER_EVENT_PREFIXES: &[&str] = &["FOR", "AFTER", "OF"];

/// Tokens that may follow a trigger event.
pub const TRIGGER_EVENT_FOLLOWERS: &[&str] = &[",", "AS", "NOT", "WITH"];

// =============================================================================
// Schema Definition Targets
// =============================================================================

/// Object types a `CREATE`/`ALTER` statement may target.
pub const DEFAULT_OBJECT_TYPES: &[&str] = &[
    "TABLE",
    "INDEX",
    "VIEW",
    "TRIGGER",
    "CONSTRAINT",
    "SCHEMA",
    "SEQUENCE",
    "SYNONYM",
    "STATISTICS",
];

/// Built-in SQL Server databases that schema changes must never reference.
pub const SYSTEM_DATABASES: &[&str] = &[
    "master",
    "msdb",
    "model",
    "tempdb",
    "distribution",
    "resource",
];

/// System catalog schemas.
pub const SYSTEM_SCHEMAS: &[&str] = &["sys", "INFORMATION_SCHEMA"];

// =============================================================================
// Logging Constants
// =============================================================================

/// Default truncation length for query logging.
pub const LOG_QUERY_TRUNCATE_LENGTH: usize = 100;

//! End-to-end tests for the statement guard's public API.
//!
//! These exercise the whole pipeline through `validate` and `PolicyEngine`;
//! nothing here needs a database.

use mssql_statement_guard::security::{
    normalize, validate, OperationClass, PolicyEngine, PolicyOverrides, ValidationPolicy,
};
use mssql_statement_guard::Violation;
use std::collections::BTreeMap;
use std::sync::Arc;

use OperationClass::{DataDefinition, DiagnosticBatch, GuardedMutation, ReadOnlyQuery};

fn check(class: OperationClass, query: &str) -> mssql_statement_guard::ValidationResult {
    validate(class, query, None)
}

// =============================================================================
// Read-only queries
// =============================================================================

#[test]
fn test_plain_select_is_valid() {
    let r = check(ReadOnlyQuery, "SELECT * FROM users");
    assert!(r.is_valid);
    assert_eq!(r.reason, None);
}

#[test]
fn test_select_with_joins_and_comments_is_valid() {
    let q = "-- active users\nSELECT u.id, u.deleted_flag /* soft delete */\nFROM dbo.users u\n\tJOIN dbo.orders o ON o.user_id = u.id\nWHERE u.updated_at > '2024-01-01';";
    let r = check(ReadOnlyQuery, q);
    assert!(r.is_valid, "{:?}", r.reason);
    assert_eq!(
        r.normalized_query.as_deref(),
        Some("SELECT u.id, u.deleted_flag FROM dbo.users u JOIN dbo.orders o ON o.user_id = u.id WHERE u.updated_at > '2024-01-01';")
    );
}

#[test]
fn test_stacked_drop_is_rejected() {
    let r = check(ReadOnlyQuery, "SELECT * FROM users; DROP TABLE users;");
    assert!(!r.is_valid);
    let reason = r.reason.unwrap();
    assert!(reason.contains("multiple statements") || reason.contains("DROP"));
}

#[test]
fn test_union_injection_is_rejected() {
    let r = check(ReadOnlyQuery, "SELECT * FROM a UNION SELECT * FROM passwords");
    assert!(!r.is_valid);
    match r.violation {
        Some(Violation::DeniedPattern { name, .. }) => assert_eq!(name, "union-injection"),
        other => panic!("unexpected violation: {:?}", other),
    }
}

#[test]
fn test_denied_keyword_named_regardless_of_case_and_whitespace() {
    for q in [
        "SELECT 1 FROM t WHERE x IN (SELECT 1) delete",
        "SELECT 1 FROM t WHERE\tx = 1\nDeLeTe",
        "SELECT a FROM t WHERE b = 1 AND(DELETE)",
    ] {
        let r = check(ReadOnlyQuery, q);
        assert!(!r.is_valid, "{:?}", q);
        assert_eq!(r.violation, Some(Violation::DeniedKeyword("DELETE".into())), "{:?}", q);
        assert!(r.reason.unwrap().contains("DELETE"));
    }
}

#[test]
fn test_keyword_at_statement_start_is_named() {
    let r = check(ReadOnlyQuery, "drop table users");
    assert!(!r.is_valid);
    assert!(r.reason.unwrap().contains("DROP"));
}

#[test]
fn test_identifier_containing_keyword_is_valid() {
    let r = check(ReadOnlyQuery, "SELECT deleted_flag, updated_by, created_on FROM audit_log");
    assert!(r.is_valid, "{:?}", r.reason);
}

#[test]
fn test_keyword_inside_comment_is_ignored() {
    let r = check(ReadOnlyQuery, "SELECT id FROM t /* never DROP this */");
    assert!(r.is_valid, "{:?}", r.reason);
    let r = check(ReadOnlyQuery, "SELECT id FROM t -- see */ drop later");
    assert!(r.is_valid, "{:?}", r.reason);
    let r = check(ReadOnlyQuery, "SELECT id FROM t /* -- x\ndelete later */");
    assert!(r.is_valid, "{:?}", r.reason);
}

#[test]
fn test_length_reported_after_structural_checks() {
    let overrides = PolicyOverrides {
        max_length: Some(10),
        ..Default::default()
    };
    let r = validate(ReadOnlyQuery, "DELETE FROM users", Some(&overrides));
    assert!(matches!(r.violation, Some(Violation::InvalidLeadingVerb { .. })));
}

#[test]
fn test_injection_idioms_are_rejected() {
    let cases = [
        ("SELECT * FROM t WHERE id = 1 WAITFOR DELAY '0:0:5'", "timing-attack"),
        ("SELECT @@SERVERNAME", "system-probe"),
        ("SELECT * FROM OPENXML(@doc, '/root/row', 2)", "bulk-external-data"),
        ("SELECT CHAR(83)+CHAR(69)", "obfuscation-via-char-codes"),
        ("SELECT * FROM t WHERE a = 1 OR 1=1", "tautology"),
    ];
    for (q, rule) in cases {
        let r = check(ReadOnlyQuery, q);
        match r.violation {
            Some(Violation::DeniedPattern { name, .. }) => assert_eq!(name, rule, "{:?}", q),
            other => panic!("{:?}: unexpected violation {:?}", q, other),
        }
    }
}

// =============================================================================
// Guarded mutations
// =============================================================================

#[test]
fn test_update_without_where_is_rejected() {
    let r = check(GuardedMutation, "UPDATE users SET name='x'");
    assert!(!r.is_valid);
    assert!(matches!(r.violation, Some(Violation::MissingGuardClause { .. })));
}

#[test]
fn test_update_with_where_is_valid() {
    let r = check(GuardedMutation, "UPDATE users SET name='x' WHERE id=1");
    assert!(r.is_valid, "{:?}", r.reason);
}

#[test]
fn test_update_chained_delete_is_rejected() {
    let r = check(GuardedMutation, "UPDATE users SET a=1 WHERE id=1; DELETE FROM users");
    assert_eq!(r.violation, Some(Violation::MultipleStatementsNotAllowed));
}

#[test]
fn test_delete_mutation_policy_by_override() {
    let overrides = PolicyOverrides {
        required_leading_verbs: Some(vec!["DELETE".into()]),
        ..Default::default()
    };
    let ok = validate(GuardedMutation, "DELETE FROM users WHERE id = 1", Some(&overrides));
    assert!(ok.is_valid, "{:?}", ok.reason);

    let unguarded = validate(GuardedMutation, "DELETE FROM users", Some(&overrides));
    assert!(matches!(unguarded.violation, Some(Violation::MissingGuardClause { .. })));

    let update = validate(GuardedMutation, "UPDATE users SET a = 1 WHERE id = 1", Some(&overrides));
    assert!(matches!(update.violation, Some(Violation::InvalidLeadingVerb { .. })));
}

// =============================================================================
// Schema definition
// =============================================================================

#[test]
fn test_two_allowed_definition_statements_are_valid() {
    let r = check(DataDefinition, "CREATE TABLE t (id INT); CREATE INDEX ix ON t(id)");
    assert!(r.is_valid, "{:?}", r.reason);
}

#[test]
fn test_trailing_select_fails_leading_verb_check() {
    let r = check(DataDefinition, "CREATE TABLE t (id INT); SELECT * FROM t");
    assert!(!r.is_valid);
    assert!(matches!(r.violation, Some(Violation::InvalidLeadingVerb { .. })));
}

#[test]
fn test_definition_accepts_referential_actions() {
    let q = "CREATE TABLE orders (id INT PRIMARY KEY, user_id INT REFERENCES users(id) ON DELETE CASCADE ON UPDATE NO ACTION)";
    let r = check(DataDefinition, q);
    assert!(r.is_valid, "{:?}", r.reason);
}

#[test]
fn test_definition_accepts_trigger_events() {
    let q = "CREATE TRIGGER trg_audit ON orders AFTER INSERT, UPDATE, DELETE AS SELECT 1";
    let r = check(DataDefinition, q);
    assert!(r.is_valid, "{:?}", r.reason);
}

#[test]
fn test_definition_rejects_unterminated_data_changes() {
    let cases = [
        ("ALTER TABLE t ADD c INT DELETE FROM users", "DELETE"),
        ("CREATE TABLE t (id INT) UPDATE users SET is_admin = 1", "UPDATE"),
        ("CREATE INDEX ix ON t(id) INSERT INTO admins VALUES (1)", "INSERT"),
        ("CREATE TRIGGER tr ON t AFTER DELETE AS DELETE FROM users", "DELETE"),
        ("CREATE TABLE t (id INT REFERENCES u(id) ON DELETE CASCADE) DELETE FROM u", "DELETE"),
    ];
    for (q, keyword) in cases {
        let r = check(DataDefinition, q);
        assert_eq!(r.violation, Some(Violation::DeniedKeyword(keyword.into())), "{:?}", q);
    }
}

#[test]
fn test_definition_rejections() {
    assert!(matches!(
        check(DataDefinition, "CREATE PROCEDURE p AS SELECT 1").violation,
        Some(Violation::DisallowedObjectType { .. })
    ));
    assert_eq!(
        check(DataDefinition, "CREATE TABLE master.dbo.t (id INT)").violation,
        Some(Violation::ProtectedTarget("master".into()))
    );
    assert_eq!(
        check(DataDefinition, "DROP TABLE [tempdb].[dbo].[scratch]").violation,
        Some(Violation::ProtectedTarget("tempdb".into()))
    );
    assert_eq!(
        check(DataDefinition, "DROP DATABASE sales").violation,
        Some(Violation::DeniedKeyword("DATABASE".into()))
    );
    assert!(matches!(
        check(DataDefinition, "CREATE TABLE t (id INT); EXEC sp_rename 't', 'u'").violation,
        Some(Violation::InvalidLeadingVerb { .. })
    ));
}

#[test]
fn test_organisation_object_type_by_override() {
    let mut types: Vec<String> = ValidationPolicy::data_definition()
        .allowed_object_types
        .unwrap();
    types.push("FUNCTION".into());
    let overrides = PolicyOverrides {
        allowed_object_types: Some(types),
        ..Default::default()
    };
    let q = "CREATE FUNCTION dbo.f() RETURNS INT AS BEGIN RETURN 1 END";
    assert!(!check(DataDefinition, q).is_valid);
    let r = validate(DataDefinition, q, Some(&overrides));
    assert!(r.is_valid, "{:?}", r.reason);
}

// =============================================================================
// Diagnostic batches
// =============================================================================

#[test]
fn test_statistics_batch_is_valid() {
    let q = "SET STATISTICS IO ON; SET STATISTICS TIME ON; SELECT * FROM t WHERE id = 5; SET STATISTICS IO OFF; SET STATISTICS TIME OFF";
    let r = check(DiagnosticBatch, q);
    assert!(r.is_valid, "{:?}", r.reason);
}

#[test]
fn test_showplan_batch_is_valid() {
    let r = check(DiagnosticBatch, "SET SHOWPLAN_XML ON; SELECT 1; SET SHOWPLAN_XML OFF");
    assert!(r.is_valid, "{:?}", r.reason);
}

#[test]
fn test_non_whitelisted_set_is_rejected() {
    let r = check(DiagnosticBatch, "SET ROWCOUNT 0; SELECT * FROM t");
    assert!(matches!(r.violation, Some(Violation::InvalidLeadingVerb { .. })));
}

#[test]
fn test_diagnostic_batch_rejects_writes() {
    let r = check(DiagnosticBatch, "SET STATISTICS IO ON; UPDATE t SET a = 1 WHERE id = 1");
    assert!(matches!(r.violation, Some(Violation::InvalidLeadingVerb { .. })));
}

// =============================================================================
// Limits and robustness
// =============================================================================

#[test]
fn test_max_length_boundary() {
    let overrides = PolicyOverrides {
        max_length: Some(30),
        ..Default::default()
    };
    let at_limit = format!("SELECT * FROM {}", "t".repeat(16));
    assert_eq!(at_limit.chars().count(), 30);
    assert!(validate(ReadOnlyQuery, &at_limit, Some(&overrides)).is_valid);

    let over = format!("{}x", at_limit);
    let r = validate(ReadOnlyQuery, &over, Some(&overrides));
    assert!(matches!(r.violation, Some(Violation::InputTooLong { length: 31, max: 30 })));
}

#[test]
fn test_never_panics_on_odd_input() {
    let inputs = [
        "",
        " ",
        "\n\t\r",
        "--",
        "/*",
        "*/",
        "/* only */ -- comments",
        ";",
        "'",
        "\u{0}",
        "ＳＥＬＥＣＴ 1",
        "SELECT 'ß' FROM t",
        "İ",
    ];
    for class in OperationClass::ALL {
        for q in inputs {
            let r = check(class, q);
            assert_eq!(r.is_valid, r.reason.is_none());
        }
    }
    assert!(!check(ReadOnlyQuery, "").is_valid);
    assert!(!check(ReadOnlyQuery, "/* only */ -- comments").is_valid);
}

#[test]
fn test_results_are_reproducible() {
    let queries = [
        "SELECT * FROM users",
        "SELECT 1; DROP TABLE t",
        "UPDATE t SET a = 1",
        "CREATE VIEW v AS SELECT a FROM t",
    ];
    for class in OperationClass::ALL {
        for q in queries {
            assert_eq!(check(class, q), check(class, q));
        }
    }
}

#[test]
fn test_normalization_is_idempotent() {
    let samples = [
        "SELECT  *\nFROM users -- c\n WHERE a = 1",
        "/* a */SELECT/* b */1/* c */",
        "  - -- x\n-  ",
        "SELECT '/*' AS a, '*/' AS b",
    ];
    for s in samples {
        let once = normalize(s);
        assert_eq!(normalize(&once), once);
    }
}

#[test]
fn test_concurrent_validation() {
    let engine = Arc::new(PolicyEngine::new().unwrap());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    assert!(engine.validate(ReadOnlyQuery, "SELECT * FROM users").is_valid);
                    assert!(!engine
                        .validate(ReadOnlyQuery, &format!("SELECT {}; DROP TABLE t", i))
                        .is_valid);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_engine_overrides_per_class() {
    let overrides: BTreeMap<OperationClass, PolicyOverrides> = [(
        ReadOnlyQuery,
        PolicyOverrides {
            max_length: Some(10),
            ..Default::default()
        },
    )]
    .into_iter()
    .collect();
    let engine = PolicyEngine::with_overrides(&overrides).unwrap();
    assert!(!engine.validate(ReadOnlyQuery, "SELECT * FROM users").is_valid);
    assert!(engine
        .validate(DiagnosticBatch, "SELECT * FROM users")
        .is_valid);
}

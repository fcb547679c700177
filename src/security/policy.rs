//! Declarative validation policies.
//!
//! A [`ValidationPolicy`] is plain data: verbs, denylists, rule specs and
//! limits. The engine never special-cases an operation class; it only reads
//! the compiled form of a policy, so a new class needs a new policy value and
//! nothing else.

use super::injection::{BuiltinRule, InjectionDetector, RuleSpec};
use super::keywords::{contains_token, KeywordExemption, KeywordScanner};
use super::splitter::leading_verb;
use crate::constants::{
    DEFAULT_MAX_DIAGNOSTIC_LENGTH, DEFAULT_MAX_QUERY_LENGTH, DEFAULT_MUTATION_VERB,
    DEFAULT_OBJECT_TYPES, DEFINITION_DENIED_KEYWORDS, DEFINITION_VERBS, DIAGNOSTIC_VERBS,
    MODIFYING_KEYWORDS, OBJECT_TYPE_VERBS, READ_EXTRA_KEYWORDS, READ_VERBS,
    REFERENTIAL_ACTION_FOLLOWERS, REFERENTIAL_ACTION_PREFIXES, REFERENTIAL_ACTION_VERBS,
    SYSTEM_DATABASES, SYSTEM_SCHEMAS, TRIGGER_EVENT_FOLLOWERS, TRIGGER_EVENT_PREFIXES,
    TRIGGER_EVENT_VERBS,
};
use crate::error::{GuardError, Violation};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of intended SQL action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    /// A single pure `SELECT`.
    ReadOnlyQuery,
    /// A single `UPDATE` (or `DELETE`) carrying a `WHERE` clause.
    GuardedMutation,
    /// One or more `CREATE`/`ALTER`/`DROP`/`TRUNCATE` statements.
    DataDefinition,
    /// Measurement toggles plus queries.
    DiagnosticBatch,
}

impl OperationClass {
    /// Every built-in class.
    pub const ALL: [OperationClass; 4] = [
        OperationClass::ReadOnlyQuery,
        OperationClass::GuardedMutation,
        OperationClass::DataDefinition,
        OperationClass::DiagnosticBatch,
    ];

    /// Canonical snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnlyQuery => "read_only_query",
            Self::GuardedMutation => "guarded_mutation",
            Self::DataDefinition => "data_definition",
            Self::DiagnosticBatch => "diagnostic_batch",
        }
    }

    /// Whether statements of this class only read data.
    pub fn is_read(&self) -> bool {
        matches!(self, Self::ReadOnlyQuery | Self::DiagnosticBatch)
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationClass {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "read_only_query" | "readonly" | "read_only" | "select" | "query" => {
                Ok(Self::ReadOnlyQuery)
            }
            "guarded_mutation" | "mutation" | "update" => Ok(Self::GuardedMutation),
            "data_definition" | "ddl" | "schema" => Ok(Self::DataDefinition),
            "diagnostic_batch" | "diagnostic" | "diagnostics" => Ok(Self::DiagnosticBatch),
            other => Err(GuardError::config(format!(
                "Unknown operation class '{}'",
                other
            ))),
        }
    }
}

/// Safety policy for one operation class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    /// Leading forms a statement may start with (case-insensitive, may be multi-word)
    pub required_leading_verbs: Vec<String>,
    /// Whether the text must contain `WHERE`
    pub requires_guard_clause: bool,
    /// Denied keywords; the policy's own leading verbs are removed at compile time
    pub denied_keywords: Vec<String>,
    /// Token contexts in which a denied keyword is tolerated
    #[serde(default)]
    pub keyword_exemptions: Vec<KeywordExemption>,
    /// Structural rules, evaluated in order
    pub denied_patterns: Vec<RuleSpec>,
    /// Object types a statement led by one of `object_type_verbs` must name
    pub allowed_object_types: Option<Vec<String>>,
    /// Verbs whose statements are subject to the object-type check
    #[serde(default)]
    pub object_type_verbs: Vec<String>,
    /// Database and schema names that may not be used as qualifiers
    #[serde(default)]
    pub protected_qualifiers: Vec<String>,
    /// Whether a batch of several statements is accepted
    pub allow_multiple_statements: bool,
    /// Maximum length of the submitted text, in characters
    pub max_length: usize,
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn rules(list: &[BuiltinRule]) -> Vec<RuleSpec> {
    list.iter().copied().map(RuleSpec::from).collect()
}

impl ValidationPolicy {
    /// Built-in policy for an operation class.
    pub fn builtin(class: OperationClass) -> Self {
        match class {
            OperationClass::ReadOnlyQuery => Self::read_only_query(),
            OperationClass::GuardedMutation => Self::guarded_mutation(DEFAULT_MUTATION_VERB),
            OperationClass::DataDefinition => Self::data_definition(),
            OperationClass::DiagnosticBatch => Self::diagnostic_batch(),
        }
    }

    /// A single `SELECT`, no modifying keywords, every injection rule.
    pub fn read_only_query() -> Self {
        use BuiltinRule::*;
        Self {
            required_leading_verbs: owned(READ_VERBS),
            requires_guard_clause: false,
            denied_keywords: owned(MODIFYING_KEYWORDS)
                .into_iter()
                .chain(owned(READ_EXTRA_KEYWORDS))
                .collect(),
            keyword_exemptions: Vec::new(),
            denied_patterns: rules(&[
                StatementChaining,
                UnionInjection,
                CommentSmuggledKeyword,
                DynamicExecution,
                BulkExternalData,
                SystemProbe,
                TimingAttack,
                CharCodeObfuscation,
                Tautology,
                HexEncodedLiteral,
            ]),
            allowed_object_types: None,
            object_type_verbs: Vec::new(),
            protected_qualifiers: Vec::new(),
            allow_multiple_statements: false,
            max_length: DEFAULT_MAX_QUERY_LENGTH,
        }
    }

    /// A single mutation led by `verb` that must carry `WHERE`.
    pub fn guarded_mutation(verb: &str) -> Self {
        use BuiltinRule::*;
        Self {
            required_leading_verbs: vec![verb.trim().to_uppercase()],
            requires_guard_clause: true,
            denied_keywords: owned(MODIFYING_KEYWORDS),
            keyword_exemptions: Vec::new(),
            denied_patterns: rules(&[
                StatementChaining,
                CommentSmuggledKeyword,
                DynamicExecution,
                BulkExternalData,
                SystemProbe,
                TimingAttack,
                CharCodeObfuscation,
                Tautology,
                HexEncodedLiteral,
            ]),
            allowed_object_types: None,
            object_type_verbs: Vec::new(),
            protected_qualifiers: Vec::new(),
            allow_multiple_statements: false,
            max_length: DEFAULT_MAX_QUERY_LENGTH,
        }
    }

    /// Schema changes on allow-listed object types, away from system databases.
    pub fn data_definition() -> Self {
        use BuiltinRule::*;
        Self {
            required_leading_verbs: owned(DEFINITION_VERBS),
            requires_guard_clause: false,
            denied_keywords: owned(DEFINITION_DENIED_KEYWORDS),
            keyword_exemptions: vec![
                KeywordExemption::new(
                    REFERENTIAL_ACTION_VERBS,
                    REFERENTIAL_ACTION_PREFIXES,
                    REFERENTIAL_ACTION_FOLLOWERS,
                ),
                KeywordExemption::new(
                    TRIGGER_EVENT_VERBS,
                    TRIGGER_EVENT_PREFIXES,
                    TRIGGER_EVENT_FOLLOWERS,
                ),
            ],
            denied_patterns: rules(&[
                StatementChaining,
                CommentSmuggledKeyword,
                DynamicExecution,
                BulkExternalData,
                TimingAttack,
                CharCodeObfuscation,
            ]),
            allowed_object_types: Some(owned(DEFAULT_OBJECT_TYPES)),
            object_type_verbs: owned(OBJECT_TYPE_VERBS),
            protected_qualifiers: owned(SYSTEM_DATABASES)
                .into_iter()
                .chain(owned(SYSTEM_SCHEMAS))
                .collect(),
            allow_multiple_statements: true,
            max_length: DEFAULT_MAX_QUERY_LENGTH,
        }
    }

    /// `SET STATISTICS`/`SET SHOWPLAN_*` toggles around read-only queries.
    pub fn diagnostic_batch() -> Self {
        use BuiltinRule::*;
        Self {
            required_leading_verbs: owned(DIAGNOSTIC_VERBS),
            requires_guard_clause: false,
            denied_keywords: owned(MODIFYING_KEYWORDS)
                .into_iter()
                .chain(owned(READ_EXTRA_KEYWORDS))
                .collect(),
            keyword_exemptions: Vec::new(),
            denied_patterns: rules(&[
                StatementChaining,
                UnionInjection,
                CommentSmuggledKeyword,
                DynamicExecution,
                BulkExternalData,
                SystemProbe,
                TimingAttack,
                CharCodeObfuscation,
            ]),
            allowed_object_types: None,
            object_type_verbs: Vec::new(),
            protected_qualifiers: Vec::new(),
            allow_multiple_statements: true,
            max_length: DEFAULT_MAX_DIAGNOSTIC_LENGTH,
        }
    }

    /// Apply overrides; every field present in `overrides` replaces the current value.
    pub fn with_overrides(mut self, overrides: &PolicyOverrides) -> Self {
        let o = overrides.clone();
        if let Some(v) = o.required_leading_verbs {
            self.required_leading_verbs = v;
        }
        if let Some(v) = o.requires_guard_clause {
            self.requires_guard_clause = v;
        }
        if let Some(v) = o.denied_keywords {
            self.denied_keywords = v;
        }
        if let Some(v) = o.keyword_exemptions {
            self.keyword_exemptions = v;
        }
        if let Some(v) = o.denied_patterns {
            self.denied_patterns = v;
        }
        if let Some(v) = o.allowed_object_types {
            self.allowed_object_types = Some(v);
        }
        if let Some(v) = o.object_type_verbs {
            self.object_type_verbs = v;
        }
        if let Some(v) = o.protected_qualifiers {
            self.protected_qualifiers = v;
        }
        if let Some(v) = o.allow_multiple_statements {
            self.allow_multiple_statements = v;
        }
        if let Some(v) = o.max_length {
            self.max_length = v;
        }
        self
    }

    /// First word of every leading form, uppercased.
    fn own_verbs(&self) -> Vec<String> {
        let mut verbs: Vec<String> = Vec::new();
        for form in &self.required_leading_verbs {
            if let Some(word) = form.split_whitespace().next() {
                let word = word.to_uppercase();
                if !verbs.contains(&word) {
                    verbs.push(word);
                }
            }
        }
        verbs
    }

    /// Denied keywords minus the policy's own leading verbs.
    pub fn effective_denied_keywords(&self) -> Vec<String> {
        let own = self.own_verbs();
        let mut keywords: Vec<String> = Vec::new();
        for kw in &self.denied_keywords {
            let kw = kw.trim().to_uppercase();
            if !kw.is_empty() && !own.contains(&kw) && !keywords.contains(&kw) {
                keywords.push(kw);
            }
        }
        keywords
    }

    /// Compile the policy for repeated use.
    pub fn compile(&self) -> Result<CompiledPolicy, GuardError> {
        if self.required_leading_verbs.is_empty() {
            return Err(GuardError::config(
                "Policy must allow at least one leading verb",
            ));
        }

        let denied = self.effective_denied_keywords();
        let detector = InjectionDetector::compile(&self.denied_patterns, &denied)?;

        let protected = if self.protected_qualifiers.is_empty() {
            None
        } else {
            let names: Vec<String> = self
                .protected_qualifiers
                .iter()
                .map(|q| regex::escape(q.trim()))
                .collect();
            let pattern = format!(r#"(?i)["\[]?\b({})\b["\]]?\s*\."#, names.join("|"));
            Some(
                Regex::new(&pattern)
                    .map_err(|e| GuardError::invalid_pattern("protected-target", e.to_string()))?,
            )
        };

        Ok(CompiledPolicy {
            leading_verbs: self
                .required_leading_verbs
                .iter()
                .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase())
                .collect(),
            keywords: KeywordScanner::new(&denied).with_exemptions(&self.keyword_exemptions),
            detector,
            object_types: self
                .allowed_object_types
                .as_ref()
                .map(|types| types.iter().map(|t| t.trim().to_uppercase()).collect()),
            object_type_verbs: self
                .object_type_verbs
                .iter()
                .map(|v| v.trim().to_uppercase())
                .collect(),
            protected,
            policy: self.clone(),
        })
    }
}

/// Partial policy supplied by configuration.
///
/// Every field is optional; a present field replaces the built-in value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyOverrides {
    pub required_leading_verbs: Option<Vec<String>>,
    pub requires_guard_clause: Option<bool>,
    pub denied_keywords: Option<Vec<String>>,
    pub keyword_exemptions: Option<Vec<KeywordExemption>>,
    pub denied_patterns: Option<Vec<RuleSpec>>,
    pub allowed_object_types: Option<Vec<String>>,
    pub object_type_verbs: Option<Vec<String>>,
    pub protected_qualifiers: Option<Vec<String>>,
    pub allow_multiple_statements: Option<bool>,
    pub max_length: Option<usize>,
}

impl PolicyOverrides {
    /// Layer `other` on top of `self`; fields set in `other` win.
    pub fn merge(&mut self, other: PolicyOverrides) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() { self.$field = other.$field; })*
            };
        }
        take!(
            required_leading_verbs,
            requires_guard_clause,
            denied_keywords,
            keyword_exemptions,
            denied_patterns,
            allowed_object_types,
            object_type_verbs,
            protected_qualifiers,
            allow_multiple_statements,
            max_length
        );
    }

    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A policy compiled for matching.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    policy: ValidationPolicy,
    leading_verbs: Vec<String>,
    keywords: KeywordScanner,
    detector: InjectionDetector,
    object_types: Option<Vec<String>>,
    object_type_verbs: Vec<String>,
    protected: Option<Regex>,
}

impl CompiledPolicy {
    /// The policy data this was compiled from.
    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    pub fn max_length(&self) -> usize {
        self.policy.max_length
    }

    pub fn allows_multiple_statements(&self) -> bool {
        self.policy.allow_multiple_statements
    }

    pub fn requires_guard_clause(&self) -> bool {
        self.policy.requires_guard_clause
    }

    pub fn keywords(&self) -> &KeywordScanner {
        &self.keywords
    }

    pub fn detector(&self) -> &InjectionDetector {
        &self.detector
    }

    /// Check one candidate statement's leading verb and object type.
    ///
    /// Returns the matched leading form.
    pub fn check_statement(&self, statement: &str) -> Result<&str, Violation> {
        let verb = leading_verb(statement, &self.leading_verbs).ok_or_else(|| {
            Violation::InvalidLeadingVerb {
                allowed: self.leading_verbs.join(", "),
                found: statement
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .chars()
                    .take(32)
                    .collect::<String>()
                    .to_uppercase(),
            }
        })?;

        if let Some(types) = &self.object_types {
            let first_word = verb.split(' ').next().unwrap_or(verb);
            if self.object_type_verbs.iter().any(|v| v == first_word) {
                let upper = statement.to_uppercase();
                if !types.iter().any(|t| contains_token(&upper, t)) {
                    return Err(Violation::DisallowedObjectType {
                        verb: first_word.to_string(),
                        allowed: types.join(", "),
                    });
                }
            }
        }

        Ok(verb)
    }

    /// The first protected qualifier referenced in the text, if any.
    pub fn protected_target(&self, normalized: &str) -> Option<String> {
        self.protected
            .as_ref()?
            .captures(normalized)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }
}

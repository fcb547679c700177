//! Structural SQL injection detection.
//!
//! An ordered list of named rules, each a regular expression with a reason
//! surfaced verbatim on rejection. The first rule that matches wins.
//!
//! The `regex` crate guarantees linear-time matching, so no rule can blow up
//! on adversarial input.

use super::normalize::comment_ends;
use crate::error::GuardError;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which text a rule is evaluated against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanTarget {
    /// Comment-stripped, whitespace-collapsed text (original letter case).
    #[default]
    Normalized,
    /// The text exactly as submitted, comments included.
    Raw,
    /// The submitted text following each comment; anchor with `^`.
    AfterComment,
}

/// Built-in structural rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinRule {
    /// A statement terminator followed by a denied verb.
    #[serde(rename = "statement-chaining")]
    StatementChaining,
    /// `UNION [ALL] SELECT`.
    #[serde(rename = "union-injection")]
    UnionInjection,
    /// A denied verb directly after a comment.
    #[serde(rename = "comment-smuggled-keyword")]
    CommentSmuggledKeyword,
    /// Ad-hoc `EXEC(...)` and `sp_`/`xp_` procedures.
    #[serde(rename = "dynamic-execution")]
    DynamicExecution,
    /// `BULK INSERT`, `OPENROWSET` and friends.
    #[serde(rename = "bulk-external-data")]
    BulkExternalData,
    /// `@@` variables and login/server introspection functions.
    #[serde(rename = "system-probe")]
    SystemProbe,
    /// `WAITFOR DELAY` and sleep functions.
    #[serde(rename = "timing-attack")]
    TimingAttack,
    /// Concatenation with `CHAR(n)` to assemble keywords.
    #[serde(rename = "obfuscation-via-char-codes")]
    CharCodeObfuscation,
    /// `OR 1=1` style always-true conditions.
    #[serde(rename = "tautology")]
    Tautology,
    /// Long `0x...` literals.
    #[serde(rename = "hex-encoded-literal")]
    HexEncodedLiteral,
}

impl BuiltinRule {
    /// Rule name as reported in a `DeniedPattern` violation.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StatementChaining => "statement-chaining",
            Self::UnionInjection => "union-injection",
            Self::CommentSmuggledKeyword => "comment-smuggled-keyword",
            Self::DynamicExecution => "dynamic-execution",
            Self::BulkExternalData => "bulk-external-data",
            Self::SystemProbe => "system-probe",
            Self::TimingAttack => "timing-attack",
            Self::CharCodeObfuscation => "obfuscation-via-char-codes",
            Self::Tautology => "tautology",
            Self::HexEncodedLiteral => "hex-encoded-literal",
        }
    }

    /// Human-readable rejection reason.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::StatementChaining => "Stacked statement after a statement terminator",
            Self::UnionInjection => "UNION SELECT injection",
            Self::CommentSmuggledKeyword => "Denied keyword smuggled behind a comment",
            Self::DynamicExecution => "Dynamic execution or system stored procedure call",
            Self::BulkExternalData => "Bulk load or external data source access",
            Self::SystemProbe => "System variable or session introspection",
            Self::TimingAttack => "Time-based blind injection (delay primitive)",
            Self::CharCodeObfuscation => "CHAR() concatenation obfuscation",
            Self::Tautology => "OR tautology injection",
            Self::HexEncodedLiteral => "Long hex-encoded string",
        }
    }

    /// The text this rule inspects.
    pub fn target(&self) -> ScanTarget {
        match self {
            Self::CommentSmuggledKeyword => ScanTarget::AfterComment,
            _ => ScanTarget::Normalized,
        }
    }

    /// Regular expression for this rule.
    ///
    /// Rules that refer to denied verbs return `None` when `verbs` is empty.
    fn pattern(&self, verbs: &[String]) -> Option<String> {
        let verb_alternation = || {
            if verbs.is_empty() {
                return None;
            }
            let escaped: Vec<String> = verbs.iter().map(|v| regex::escape(v)).collect();
            Some(escaped.join("|"))
        };

        let pattern = match self {
            Self::StatementChaining => format!(r"(?i);\s*(?:{})\b", verb_alternation()?),
            Self::UnionInjection => r"(?i)\bUNION\s+(?:ALL\s+)?\(*\s*SELECT\b".to_string(),
            Self::CommentSmuggledKeyword => {
                format!(r"(?i)^\s*(?:{})\b", verb_alternation()?)
            }
            Self::DynamicExecution => r"(?i)\bEXEC(?:UTE)?\s*\(|\b(?:sp|xp)_\w+".to_string(),
            Self::BulkExternalData => concat!(
                r"(?i)\bBULK\s+INSERT\b",
                r"|\bOPEN(?:ROWSET|DATASOURCE|QUERY|XML)\s*\(",
                r"|\bINTO\s+(?:OUTFILE|DUMPFILE)\b",
                r"|\bLOAD_FILE\s*\(",
            )
            .to_string(),
            Self::SystemProbe => concat!(
                r"(?i)@@[a-z_]+",
                r"|\b(?:SYSTEM_USER|SESSION_USER)\b",
                r"|\b(?:SUSER_S?NAME|IS_SRVROLEMEMBER|SERVERPROPERTY|HAS_PERMS_BY_NAME)\s*\(",
            )
            .to_string(),
            Self::TimingAttack => {
                r"(?i)\bWAITFOR\s+(?:DELAY|TIME)\b|\b(?:PG_)?SLEEP\s*\(|\bBENCHMARK\s*\(".to_string()
            }
            Self::CharCodeObfuscation => concat!(
                r"(?i)(?:\+|\|\|)\s*N?CHA?R\s*\(",
                r"|\bN?CHA?R\s*\(\s*\d+\s*\)\s*(?:\+|\|\|)",
                r"|\bCONCAT\s*\(\s*N?CHA?R\s*\(",
            )
            .to_string(),
            Self::Tautology => r"(?i)\bOR\s+1\s*=\s*1\b|'\s*OR\s+'[^']*'\s*=\s*'".to_string(),
            Self::HexEncodedLiteral => r"\b0x[0-9a-fA-F]{10,}".to_string(),
        };
        Some(pattern)
    }
}

/// A caller-supplied rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRule {
    /// Rule name reported in violations
    pub name: String,
    /// Regular expression (`regex` crate syntax)
    pub pattern: String,
    /// Rejection reason, surfaced verbatim
    pub reason: String,
    /// Text the rule inspects
    #[serde(default)]
    pub target: ScanTarget,
}

/// Declarative rule entry in a policy.
///
/// Deserializes from a bare rule name (`"union-injection"`) or a custom
/// rule object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleSpec {
    Builtin(BuiltinRule),
    Custom(CustomRule),
}

impl From<BuiltinRule> for RuleSpec {
    fn from(rule: BuiltinRule) -> Self {
        Self::Builtin(rule)
    }
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct PatternRule {
    name: String,
    reason: String,
    target: ScanTarget,
    regex: Regex,
}

impl PatternRule {
    /// Compile a rule spec, instantiating verb-dependent rules with `denied_verbs`.
    ///
    /// Returns `Ok(None)` for a verb-dependent rule when there are no verbs to deny.
    pub fn compile(spec: &RuleSpec, denied_verbs: &[String]) -> Result<Option<Self>, GuardError> {
        let (name, reason, target, pattern) = match spec {
            RuleSpec::Builtin(rule) => match rule.pattern(denied_verbs) {
                Some(pattern) => (rule.name(), rule.reason(), rule.target(), pattern),
                None => return Ok(None),
            },
            RuleSpec::Custom(custom) => (
                custom.name.as_str(),
                custom.reason.as_str(),
                custom.target,
                custom.pattern.clone(),
            ),
        };

        let regex = Regex::new(&pattern)
            .map_err(|e| GuardError::invalid_pattern(name, e.to_string()))?;

        Ok(Some(Self {
            name: name.to_string(),
            reason: reason.to_string(),
            target,
            regex,
        }))
    }

    /// Rule name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rejection reason.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Whether this rule matches the given texts.
    pub fn is_match(&self, normalized: &str, raw: &str) -> bool {
        match self.target {
            ScanTarget::Normalized => self.regex.is_match(normalized),
            ScanTarget::Raw => self.regex.is_match(raw),
            ScanTarget::AfterComment => {
                comment_ends(raw).any(|end| self.regex.is_match(&raw[end..]))
            }
        }
    }
}

/// Ordered structural rule set.
#[derive(Debug, Clone, Default)]
pub struct InjectionDetector {
    rules: Vec<PatternRule>,
}

impl InjectionDetector {
    /// Compile a detector from rule specs, in order.
    pub fn compile(specs: &[RuleSpec], denied_verbs: &[String]) -> Result<Self, GuardError> {
        let mut rules = Vec::with_capacity(specs.len());
        for spec in specs {
            if let Some(rule) = PatternRule::compile(spec, denied_verbs)? {
                rules.push(rule);
            }
        }
        Ok(Self { rules })
    }

    /// Compiled rules, in evaluation order.
    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    /// Return the first rule that matches, if any.
    pub fn check(&self, normalized: &str, raw: &str) -> Option<&PatternRule> {
        self.rules.iter().find(|rule| rule.is_match(normalized, raw))
    }
}

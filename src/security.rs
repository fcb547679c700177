//! Security module for SQL statement validation and injection prevention.

mod injection;
mod keywords;
mod normalize;
mod policy;
mod splitter;
mod validation;

pub use injection::{BuiltinRule, CustomRule, InjectionDetector, PatternRule, RuleSpec, ScanTarget};
pub use keywords::{contains_token, find_token, KeywordExemption, KeywordScanner};
pub use normalize::{normalize, strip_comments};
pub use policy::{CompiledPolicy, OperationClass, PolicyOverrides, ValidationPolicy};
pub use splitter::{leading_verb, split_statements};
pub use validation::{validate, PolicyEngine, ValidationResult};

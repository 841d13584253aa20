//! The layout rule language.
//!
//! A rule has the form `<key> <operator> <operand>` where the operator is
//! one of `is`, `isnot`, `oneof`, `notoneof` (case-insensitive). The
//! `*oneof` operators take a bracketed, comma-separated list:
//!
//! ```text
//! command is gcc
//! environment.CC oneof [gcc, clang]
//! dist/*.tar.gz isnot sha256:0000
//! ```
//!
//! Attribute rules look up `key` as an exact attribute name. Material and
//! product rules treat `key` as a glob over resource descriptor names and
//! compare the operand against each selected descriptor's digests, written
//! `<algorithm>:<hex>`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use ite10_attestation::ResourceDescriptor;

use crate::error::VerificationError;

/// Operator of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Exact match.
    Is,
    /// Negated exact match.
    IsNot,
    /// Membership in a set.
    OneOf,
    /// Negated membership.
    NotOneOf,
}

impl RuleKind {
    /// Keyword used in the rule grammar.
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Is => "is",
            Self::IsNot => "isnot",
            Self::OneOf => "oneof",
            Self::NotOneOf => "notoneof",
        }
    }
}

/// Operator and operand of a rule. The variant fixes the operand's shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// `is <value>`
    Is(String),
    /// `isnot <value>`
    IsNot(String),
    /// `oneof [a, b, ...]`
    OneOf(Vec<String>),
    /// `notoneof [a, b, ...]`
    NotOneOf(Vec<String>),
}

/// A parsed rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Attribute name, or a glob over artifact names.
    pub key: String,
    /// What the addressed value must satisfy.
    pub expectation: Expectation,
}

impl Rule {
    /// The rule's operator.
    pub const fn kind(&self) -> RuleKind {
        match self.expectation {
            Expectation::Is(_) => RuleKind::Is,
            Expectation::IsNot(_) => RuleKind::IsNot,
            Expectation::OneOf(_) => RuleKind::OneOf,
            Expectation::NotOneOf(_) => RuleKind::NotOneOf,
        }
    }

    /// Evaluate against a scalar attribute mapping.
    ///
    /// An absent key is an error, not `false`.
    pub fn evaluate(&self, attributes: &BTreeMap<String, String>) -> Result<bool, VerificationError> {
        let actual = attributes
            .get(&self.key)
            .ok_or_else(|| VerificationError::MissingAttribute {
                rule: self.to_string(),
            })?;
        Ok(self.accepts(|expected| actual == expected))
    }

    /// Evaluate against a set of materials or products.
    ///
    /// The rule must hold for every descriptor whose name matches `key`;
    /// it is an error if none does.
    pub fn evaluate_artifacts(
        &self,
        artifacts: &[ResourceDescriptor],
    ) -> Result<bool, VerificationError> {
        let selected: Vec<&ResourceDescriptor> = artifacts
            .iter()
            .filter(|a| a.name_matches(&self.key))
            .collect();
        if selected.is_empty() {
            return Err(VerificationError::MissingAttribute {
                rule: self.to_string(),
            });
        }
        Ok(selected
            .iter()
            .all(|artifact| self.accepts(|expected| artifact.has_digest(expected))))
    }

    fn accepts(&self, equals: impl Fn(&str) -> bool) -> bool {
        match &self.expectation {
            Expectation::Is(v) => equals(v),
            Expectation::IsNot(v) => !equals(v),
            Expectation::OneOf(set) => set.iter().any(|v| equals(v)),
            Expectation::NotOneOf(set) => !set.iter().any(|v| equals(v)),
        }
    }
}

impl FromStr for Rule {
    type Err = VerificationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| VerificationError::MalformedRule {
            rule: raw.to_owned(),
            reason: reason.to_owned(),
        };

        let (key, rest) =
            next_token(raw).ok_or_else(|| malformed("expected `<key> <operator> <operand>`"))?;
        let (operator, rest) =
            next_token(rest).ok_or_else(|| malformed("expected `<key> <operator> <operand>`"))?;
        let operand = rest.trim();
        if operand.is_empty() {
            return Err(malformed("expected `<key> <operator> <operand>`"));
        }

        let expectation = match operator.to_ascii_lowercase().as_str() {
            "is" => Expectation::Is(operand.to_owned()),
            "isnot" => Expectation::IsNot(operand.to_owned()),
            "oneof" => Expectation::OneOf(parse_list(operand).ok_or_else(|| {
                malformed("oneof operand must be a bracketed list")
            })?),
            "notoneof" => Expectation::NotOneOf(parse_list(operand).ok_or_else(|| {
                malformed("notoneof operand must be a bracketed list")
            })?),
            other => return Err(malformed(&format!("unknown operator `{other}`"))),
        };

        Ok(Self {
            key: key.to_owned(),
            expectation,
        })
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = self.kind().keyword();
        match &self.expectation {
            Expectation::Is(v) | Expectation::IsNot(v) => write!(f, "{} {keyword} {v}", self.key),
            Expectation::OneOf(set) | Expectation::NotOneOf(set) => {
                write!(f, "{} {keyword} [{}]", self.key, set.join(", "))
            }
        }
    }
}

/// Split off the first whitespace-delimited token.
fn next_token(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    if input.is_empty() {
        return None;
    }
    let end = input.find(char::is_whitespace).unwrap_or(input.len());
    Some(input.split_at(end))
}

fn parse_list(operand: &str) -> Option<Vec<String>> {
    let inner = operand.strip_prefix('[')?.strip_suffix(']')?;
    Some(
        inner
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
            .collect(),
    )
}

/// Apply attribute rules in order, stopping at the first failure.
pub fn apply_attribute_rules(
    attributes: &BTreeMap<String, String>,
    rules: &[String],
    target: &str,
) -> Result<(), VerificationError> {
    for raw in rules {
        let rule: Rule = raw.parse()?;
        if !rule.evaluate(attributes)? {
            return Err(VerificationError::RuleViolation {
                rule: raw.clone(),
                target: target.to_owned(),
            });
        }
        tracing::debug!(rule = %raw, scope = target, "attribute rule passed");
    }
    Ok(())
}

/// Apply material or product rules in order, stopping at the first failure.
pub fn apply_artifact_rules(
    artifacts: &[ResourceDescriptor],
    rules: &[String],
    target: &str,
) -> Result<(), VerificationError> {
    for raw in rules {
        let rule: Rule = raw.parse()?;
        if !rule.evaluate_artifacts(artifacts)? {
            return Err(VerificationError::RuleViolation {
                rule: raw.clone(),
                target: target.to_owned(),
            });
        }
        tracing::debug!(rule = %raw, scope = target, "artifact rule passed");
    }
    Ok(())
}

//! Suppression directives: silence specific error codes at specific schema
//! locations. Applied to translated issues; validation itself always runs.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SuppressionError;
use crate::issue::{ErrorCode, Issue};

/// Message pattern that suppresses every message.
pub const MATCH_ALL: &str = ".*";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SuppressionDirective {
    pub code: ErrorCode,
    /// `url#/pointer` of the schema node, or `#/pointer` for any document.
    pub location: String,
    /// Regex matched against the message; absent means [`MATCH_ALL`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_matches: Option<String>,
}

impl SuppressionDirective {
    pub fn new(code: ErrorCode, location: impl Into<String>) -> Self {
        Self {
            code,
            location: location.into(),
            text_matches: None,
        }
    }

    pub fn text_matches(mut self, pattern: impl Into<String>) -> Self {
        self.text_matches = Some(pattern.into());
        self
    }
}

#[derive(Debug)]
struct Rule {
    code: ErrorCode,
    location: String,
    /// `None` matches every message.
    pattern: Option<Regex>,
}

impl Rule {
    fn matches(&self, issue: &Issue) -> bool {
        if issue.code != self.code {
            return false;
        }
        let at_location = if self.location.starts_with('#') {
            issue.source.json_ref.as_deref() == Some(self.location.as_str())
        } else {
            issue.source.location() == self.location
        };
        at_location && self.pattern.as_ref().map_or(true, |p| p.is_match(&issue.message))
    }
}

/// Compiled directives.
#[derive(Debug, Default)]
pub struct SuppressionSet {
    rules: Vec<Rule>,
}

impl SuppressionSet {
    pub fn new(directives: impl IntoIterator<Item = SuppressionDirective>) -> Result<Self, SuppressionError> {
        let mut rules = Vec::new();
        for directive in directives {
            let pattern = match directive.text_matches.as_deref() {
                None | Some(MATCH_ALL) => None,
                Some(p) => Some(Regex::new(p).map_err(|source| SuppressionError::InvalidPattern {
                    pattern: p.to_string(),
                    source,
                })?),
            };
            rules.push(Rule {
                code: directive.code,
                location: directive.location,
                pattern,
            });
        }
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_suppressed(&self, issue: &Issue) -> bool {
        self.rules.iter().any(|rule| rule.matches(issue))
    }

    pub fn apply(&self, issues: Vec<Issue>) -> Vec<Issue> {
        if self.is_empty() {
            return issues;
        }
        issues.into_iter().filter(|i| !self.is_suppressed(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SourceLocation;
    use crate::issue::{message, Params};

    fn issue(code: ErrorCode, pointer: &str, property: &str) -> Issue {
        let params = Params::Property(property.into());
        Issue {
            code,
            message: message(code, &params),
            severity: code.severity(),
            paths_in_payload: vec![format!("/{property}")],
            schema_path: String::new(),
            source: SourceLocation::new("/specs/pets.json", pointer),
        }
    }

    #[test]
    fn match_all_suppresses_every_message_at_location() {
        let set = SuppressionSet::new([SuppressionDirective::new(
            ErrorCode::ObjectAdditionalProperties,
            "/specs/pets.json#/definitions/Pet",
        )])
        .unwrap();

        let issues = vec![
            issue(ErrorCode::ObjectAdditionalProperties, "/definitions/Pet", "a"),
            issue(ErrorCode::ObjectAdditionalProperties, "/definitions/Pet", "b"),
            issue(ErrorCode::ObjectAdditionalProperties, "/definitions/Dog", "a"),
            issue(ErrorCode::ObjectMissingRequiredProperty, "/definitions/Pet", "a"),
        ];
        let kept = set.apply(issues);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|i| i.source.json_ref.as_deref() != Some("#/definitions/Pet")
            || i.code == ErrorCode::ObjectMissingRequiredProperty));
    }

    #[test]
    fn message_pattern_is_selective() {
        let set = SuppressionSet::new([SuppressionDirective::new(
            ErrorCode::ObjectAdditionalProperties,
            "#/definitions/Pet",
        )
        .text_matches("allowed: legacy.*")])
        .unwrap();

        assert!(set.is_suppressed(&issue(ErrorCode::ObjectAdditionalProperties, "/definitions/Pet", "legacyId")));
        assert!(!set.is_suppressed(&issue(ErrorCode::ObjectAdditionalProperties, "/definitions/Pet", "extra")));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = SuppressionSet::new([
            SuppressionDirective::new(ErrorCode::Pattern, "#/definitions/Pet").text_matches("(unclosed")
        ])
        .unwrap_err();
        assert!(err.to_string().contains("(unclosed"));
    }

    #[test]
    fn directives_deserialize_from_config() {
        let directive: SuppressionDirective = serde_json::from_value(serde_json::json!({
            "code": "INVALID_TYPE",
            "location": "#/definitions/Pet",
            "text-matches": "integer"
        }))
        .unwrap();
        assert_eq!(directive.code, ErrorCode::InvalidType);
        assert_eq!(directive.text_matches.as_deref(), Some("integer"));
    }
}

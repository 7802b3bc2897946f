//! Semantic validation applied after structural decoding
//!
//! Serde rejects frames whose shape does not match a packet. What is left
//! for this pass are constraints a type cannot express on its own: empty
//! URLs, inverted facet spans and the like. Every failure is reported as a
//! `path: message` issue and nothing is applied when any issue is found.

use std::fmt;

use thiserror::Error;

/// A single failed constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// All issues found while validating one value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", .issues.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn messages(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }
}

impl From<Vec<ValidationIssue>> for ValidationError {
    fn from(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }
}

/// Types that carry constraints beyond their serde shape
pub trait Validate {
    /// Append every issue found under `path`
    fn collect_issues(&self, path: &str, issues: &mut Vec<ValidationIssue>);

    fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();
        self.collect_issues("$", &mut issues);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

impl<T: Validate> Validate for [T] {
    fn collect_issues(&self, path: &str, issues: &mut Vec<ValidationIssue>) {
        for (index, item) in self.iter().enumerate() {
            item.collect_issues(&format!("{path}[{index}]"), issues);
        }
    }
}

impl<T: Validate> Validate for Vec<T> {
    fn collect_issues(&self, path: &str, issues: &mut Vec<ValidationIssue>) {
        self.as_slice().collect_issues(path, issues);
    }
}

/// Record an issue when a required string is blank
pub fn require_non_empty(value: &str, path: &str, issues: &mut Vec<ValidationIssue>) {
    if value.trim().is_empty() {
        issues.push(ValidationIssue::new(path, "must not be empty"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Url(&'static str);

    impl Validate for Url {
        fn collect_issues(&self, path: &str, issues: &mut Vec<ValidationIssue>) {
            require_non_empty(self.0, path, issues);
        }
    }

    #[test]
    fn test_valid_value_passes() {
        assert!(Url("a.mp4").validate().is_ok());
    }

    #[test]
    fn test_issue_paths_include_indices() {
        let urls = vec![Url("a.mp4"), Url("  "), Url("")];
        let err = urls.validate().unwrap_err();
        assert_eq!(
            err.messages(),
            vec!["$[1]: must not be empty", "$[2]: must not be empty"]
        );
    }

    #[test]
    fn test_error_display_joins_issues() {
        let err = ValidationError::from(vec![
            ValidationIssue::new("a", "bad"),
            ValidationIssue::new("b", "worse"),
        ]);
        assert_eq!(err.to_string(), "a: bad; b: worse");
    }
}

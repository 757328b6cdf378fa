use std::str::FromStr;

use thiserror::Error;

use crate::error::StoreError;
use crate::models::{Course, CoursePatch};

pub const NAME_MIN_LEN: usize = 5;
pub const NAME_MAX_LEN: usize = 200;

/// Whether field constraints are checked before a course is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    #[default]
    Enforced,
    /// Only the constraints carried by the types themselves apply.
    Relaxed,
}

impl FromStr for ValidationMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enforced" | "strict" => Ok(ValidationMode::Enforced),
            "relaxed" | "off" => Ok(ValidationMode::Relaxed),
            other => Err(StoreError::Config(format!(
                "unknown validation mode `{}` (expected `enforced` or `relaxed`)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Course validation failed: {}", join_violations(.violations))]
pub struct ValidationError {
    violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }

    fn from_violations(violations: Vec<FieldViolation>) -> Result<(), Self> {
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Self { violations })
        }
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Course {
    /// Checks the whole record, reporting every violated constraint.
    pub fn validate(&self, mode: ValidationMode) -> Result<(), ValidationError> {
        if mode == ValidationMode::Relaxed {
            return Ok(());
        }

        let mut violations = Vec::new();
        check_name(&self.name, &mut violations);
        check_author(&self.author, &mut violations);
        if self.is_published && self.tags.is_empty() {
            violations.push(published_without_tags());
        }
        ValidationError::from_violations(violations)
    }
}

impl CoursePatch {
    /// Checks only the values this patch carries. The published/tags rule is
    /// checked when the patch sets both fields.
    pub fn validate(&self, mode: ValidationMode) -> Result<(), ValidationError> {
        if mode == ValidationMode::Relaxed {
            return Ok(());
        }

        let mut violations = Vec::new();
        if let Some(name) = &self.name {
            check_name(name, &mut violations);
        }
        if let Some(author) = &self.author {
            check_author(author, &mut violations);
        }
        if let (Some(true), Some(tags)) = (self.is_published, &self.tags) {
            if tags.is_empty() {
                violations.push(published_without_tags());
            }
        }
        ValidationError::from_violations(violations)
    }
}

fn check_name(name: &str, violations: &mut Vec<FieldViolation>) {
    let len = name.chars().count();
    if name.trim().is_empty() {
        violations.push(FieldViolation {
            field: "name",
            message: "Path `name` is required.".to_string(),
        });
    } else if len < NAME_MIN_LEN {
        violations.push(FieldViolation {
            field: "name",
            message: format!(
                "Path `name` is shorter than the minimum allowed length ({}).",
                NAME_MIN_LEN
            ),
        });
    } else if len > NAME_MAX_LEN {
        violations.push(FieldViolation {
            field: "name",
            message: format!(
                "Path `name` is longer than the maximum allowed length ({}).",
                NAME_MAX_LEN
            ),
        });
    }
}

fn check_author(author: &str, violations: &mut Vec<FieldViolation>) {
    if author.trim().is_empty() {
        violations.push(FieldViolation {
            field: "author",
            message: "Path `author` is required.".to_string(),
        });
    }
}

fn published_without_tags() -> FieldViolation {
    FieldViolation {
        field: "tags",
        message: "A published course should have at least one tag.".to_string(),
    }
}

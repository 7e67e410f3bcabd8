//! Request validation.
//!
//! Every payload is checked field by field into a [`Validator`]; each rule is
//! a plain function returning `Result<T, String>`, so a legitimately falsy
//! value (`false`, `0`, an empty list) is never confused with a failure. All
//! failures are collected before the handler gives up, and nothing reaches the
//! store until [`Validator::finish`] succeeds.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

use crate::policy::VoteMode;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid username regex"));

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s.]+(\.[^@\s.]+)+$").expect("valid email regex")
});

pub const MAX_REFERENCE_LEN: usize = 2048;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> &[FieldError] {
        &self.0
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Collects per-field outcomes for one payload.
#[derive(Debug, Default)]
pub struct Validator {
    errors: ValidationErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `rule` on a field that must be present.
    pub fn required<T, U>(
        &mut self,
        field: &str,
        value: Option<T>,
        rule: impl FnOnce(T) -> Result<U, String>,
    ) -> Option<U> {
        match value {
            Some(value) => self.check(field, rule(value)),
            None => {
                self.errors.add(field, "is required");
                None
            }
        }
    }

    /// Run `rule` on a field only when present.
    pub fn optional<T, U>(
        &mut self,
        field: &str,
        value: Option<T>,
        rule: impl FnOnce(T) -> Result<U, String>,
    ) -> Option<U> {
        value.and_then(|value| self.check(field, rule(value)))
    }

    pub fn check<U>(&mut self, field: &str, outcome: Result<U, String>) -> Option<U> {
        match outcome {
            Ok(value) => Some(value),
            Err(message) => {
                self.errors.add(field, message);
                None
            }
        }
    }

    pub fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.add(field, message);
    }

    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

// -- Rules --

/// Trimmed text whose length in characters lies within `min..=max`.
pub fn text(value: String, min: usize, max: usize) -> Result<String, String> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len < min {
        if min == 1 {
            return Err("must not be empty".to_string());
        }
        return Err(format!("must be at least {min} characters"));
    }
    if len > max {
        return Err(format!("must be at most {max} characters"));
    }
    Ok(trimmed.to_string())
}

pub fn username(value: String) -> Result<String, String> {
    let value = text(value, 3, 32)?;
    if !USERNAME_RE.is_match(&value) {
        return Err("may only contain letters, digits and underscores".to_string());
    }
    Ok(value)
}

/// Email addresses are compared case-insensitively, so they are stored lowercase.
pub fn email(value: String) -> Result<String, String> {
    let value = text(value, 3, 254)?;
    if !EMAIL_RE.is_match(&value) {
        return Err("must be a valid email address".to_string());
    }
    Ok(value.to_lowercase())
}

/// Passwords are taken verbatim; surrounding whitespace is significant.
pub fn password(value: String) -> Result<String, String> {
    let len = value.chars().count();
    if len < 8 {
        return Err("must be at least 8 characters".to_string());
    }
    if len > 128 {
        return Err("must be at most 128 characters".to_string());
    }
    Ok(value)
}

/// A list of opaque reference strings (image or attachment locations).
pub fn references(values: Vec<String>, max_items: usize) -> Result<Vec<String>, String> {
    if values.len() > max_items {
        return Err(format!("must contain at most {max_items} items"));
    }
    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            text(value, 1, MAX_REFERENCE_LEN).map_err(|message| format!("item {i} {message}"))
        })
        .collect()
}

pub fn non_negative(value: i64) -> Result<i64, String> {
    if value < 0 {
        return Err("must not be negative".to_string());
    }
    Ok(value)
}

/// Vote fields: absolute counts must be non-negative, deltas may take either sign.
pub fn vote_count(value: i64, mode: VoteMode) -> Result<i64, String> {
    match mode {
        VoteMode::Absolute => non_negative(value),
        VoteMode::Delta => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_trims_and_checks_bounds() {
        assert_eq!(text("  hello ".into(), 1, 10).unwrap(), "hello");
        assert_eq!(text("   ".into(), 1, 10).unwrap_err(), "must not be empty");
        assert!(text("ab".into(), 3, 10).is_err());
        assert!(text("abcdefghijk".into(), 1, 10).is_err());
    }

    #[test]
    fn text_counts_characters_not_bytes() {
        assert!(text("ééé".into(), 1, 3).is_ok());
    }

    #[test]
    fn username_rules() {
        assert!(username("Bob123".into()).is_ok());
        assert!(username("bob_the_builder".into()).is_ok());
        assert!(username("bo".into()).is_err());
        assert!(username("bob smith".into()).is_err());
        assert!(username("bob@home".into()).is_err());
    }

    #[test]
    fn email_rules() {
        assert_eq!(email("Bob@X.com".into()).unwrap(), "bob@x.com");
        assert!(email("bob@x".into()).is_err());
        assert!(email("bob.x.com".into()).is_err());
        assert!(email("bob@@x.com".into()).is_err());
    }

    #[test]
    fn password_rules() {
        assert!(password("pw123456".into()).is_ok());
        assert!(password("short".into()).is_err());
        assert_eq!(password(" spaced pw ".into()).unwrap(), " spaced pw ");
    }

    #[test]
    fn references_limit_count_and_items() {
        assert_eq!(
            references(vec![" a ".into(), "b".into()], 2).unwrap(),
            vec!["a", "b"]
        );
        assert!(references(vec!["a".into(), "b".into(), "c".into()], 2).is_err());
        let err = references(vec!["a".into(), "".into()], 5).unwrap_err();
        assert!(err.starts_with("item 1"));
        assert!(references(vec![], 2).unwrap().is_empty());
    }

    #[test]
    fn zero_is_a_valid_count() {
        assert_eq!(non_negative(0), Ok(0));
        assert!(non_negative(-1).is_err());
    }

    #[test]
    fn vote_counts_depend_on_mode() {
        assert!(vote_count(-1, VoteMode::Absolute).is_err());
        assert_eq!(vote_count(-1, VoteMode::Delta), Ok(-1));
        assert_eq!(vote_count(5, VoteMode::Absolute), Ok(5));
    }

    #[test]
    fn validator_collects_every_failure() {
        let mut v = Validator::new();
        let a = v.required("title", Some(String::new()), |s| text(s, 1, 10));
        let b: Option<String> = v.required("body", None::<String>, |s| text(s, 1, 10));
        let c = v.optional("attachments", None::<Vec<String>>, |l| references(l, 2));
        let d = v.required("edited", Some(false), Ok::<bool, String>);
        assert!(a.is_none() && b.is_none() && c.is_none());
        assert_eq!(d, Some(false));

        let errors = v.finish().unwrap_err();
        let fields: Vec<&str> = errors.fields().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["title", "body"]);
    }

    #[test]
    fn validator_finishes_clean_when_all_fields_pass() {
        let mut v = Validator::new();
        v.required("title", Some("hi".to_string()), |s| text(s, 1, 10));
        assert!(v.finish().is_ok());
    }

    #[test]
    fn errors_serialize_as_a_list() {
        let errors = ValidationErrors::single("title", "must not be empty");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json[0]["field"], "title");
        assert_eq!(json[0]["message"], "must not be empty");
    }
}

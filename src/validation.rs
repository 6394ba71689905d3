//! Input validation for mutation requests.
//!
//! # Design Decisions
//! - Collects every field error instead of stopping at the first one
//! - Runs before any transaction is opened
//! - Pure checks only; lookups that need the database live next to the
//!   entity they guard

use url::Url;

use crate::error::{FieldError, RegistryError, RegistryResult};

/// Accumulates field errors for one input payload.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, field: &str, message: impl Into<String>) -> &mut Self {
        self.errors.push(FieldError::new(field, message));
        self
    }

    pub fn check(&mut self, ok: bool, field: &str, message: &str) -> &mut Self {
        if !ok {
            self.error(field, message);
        }
        self
    }

    pub fn non_empty(&mut self, field: &str, value: &str) -> &mut Self {
        self.check(!value.trim().is_empty(), field, "must not be empty")
    }

    /// Accepts absolute URLs and root-relative paths.
    pub fn url_or_path(&mut self, field: &str, value: &str) -> &mut Self {
        if value.starts_with('/') || Url::parse(value).is_ok() {
            return self;
        }
        self.error(field, "must be an absolute URL or a path starting with '/'")
    }

    pub fn optional_url_or_path(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        match value {
            Some(v) => self.url_or_path(field, v),
            None => self,
        }
    }

    /// Identifier-ish names: letters, digits, `-`, `_`, `.`, `@`, `/`.
    pub fn name(&mut self, field: &str, value: &str) -> &mut Self {
        if value.is_empty() {
            return self.error(field, "must not be empty");
        }
        let ok = value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@' | '/'));
        self.check(ok, field, "contains unsupported characters")
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(&mut self) -> RegistryResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::Validation(std::mem::take(&mut self.errors)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_all_errors() {
        let mut v = Validator::new();
        v.non_empty("name", " ")
            .url_or_path("spaBundle", "not a url")
            .url_or_path("cssBundle", "/assets/app.css");

        match v.finish() {
            Err(RegistryError::Validation(errors)) => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[0].field, "name");
                assert_eq!(errors[1].field, "spaBundle");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_name_characters() {
        let mut v = Validator::new();
        v.name("name", "@portal/navbar");
        assert!(v.is_valid());

        v.name("name", "bad name!");
        assert!(!v.is_valid());
    }
}

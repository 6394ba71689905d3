//! `range=[a,b]` list windows and `Content-Range` values.

use crate::error::{RegistryError, RegistryResult};

/// Inclusive window over a list. `end = None` means "to the end".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Range {
    pub start: i64,
    pub end: Option<i64>,
}

impl Range {
    pub fn new(start: i64, end: i64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// Parse `[start,end]` (JSON array of two non-negative integers).
    pub fn parse(raw: &str) -> RegistryResult<Self> {
        let bounds: Vec<i64> = serde_json::from_str(raw)
            .map_err(|_| RegistryError::invalid("range", "expected [start,end]"))?;

        match bounds.as_slice() {
            [start, end] if *start >= 0 && end >= start => Ok(Self::new(*start, *end)),
            _ => Err(RegistryError::invalid(
                "range",
                "expected 0 <= start <= end",
            )),
        }
    }

    pub fn parse_optional(raw: Option<&str>) -> RegistryResult<Self> {
        raw.map(Self::parse).transpose().map(Option::unwrap_or_default)
    }

    /// SQLite `LIMIT` value; `-1` is unlimited.
    pub fn limit(&self) -> i64 {
        self.end.map(|end| end - self.start + 1).unwrap_or(-1)
    }

    pub fn offset(&self) -> i64 {
        self.start
    }

    /// `Content-Range` header value for `returned` items out of `total`.
    pub fn content_range(&self, resource: &str, returned: usize, total: i64) -> String {
        if returned == 0 {
            format!("{resource} */{total}")
        } else {
            let last = self.start + returned as i64 - 1;
            format!("{resource} {}-{}/{}", self.start, last, total)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range() {
        let range = Range::parse("[0,9]").unwrap();
        assert_eq!(range.limit(), 10);
        assert_eq!(range.offset(), 0);

        assert!(Range::parse("[5,2]").is_err());
        assert!(Range::parse("[-1,2]").is_err());
        assert!(Range::parse("0-9").is_err());
        assert_eq!(Range::parse_optional(None).unwrap().limit(), -1);
    }

    #[test]
    fn test_content_range() {
        let range = Range::new(10, 19);
        assert_eq!(range.content_range("routes", 5, 15), "routes 10-14/15");
        assert_eq!(range.content_range("routes", 0, 3), "routes */3");
    }
}

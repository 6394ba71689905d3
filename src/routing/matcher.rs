//! Route pattern compilation.
//!
//! # Responsibilities
//! - Classify patterns: catch-all `*`, prefix `prefix/*`, exact path
//! - Compile each into an anchored regex with one capture group (`basePath`)
//! - Normalize request hostnames for domain comparisons
//!
//! # Design Decisions
//! - Pattern text is escaped, so only `*` has special meaning
//! - Prefix patterns do not require a segment boundary: `/a/*` matches `/abc`
//! - Path matching is case-sensitive, host matching is not

use regex::Regex;

/// Parsed form of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePattern {
    /// `*`
    CatchAll,
    /// `prefix/*`, holding `prefix`.
    Prefix(String),
    /// Anything else.
    Exact(String),
}

impl RoutePattern {
    pub fn parse(pattern: &str) -> Self {
        if pattern == "*" {
            RoutePattern::CatchAll
        } else if let Some(prefix) = pattern.strip_suffix("/*") {
            RoutePattern::Prefix(prefix.to_string())
        } else {
            RoutePattern::Exact(pattern.to_string())
        }
    }

    fn to_regex(&self) -> String {
        match self {
            RoutePattern::CatchAll => "(?s)^(.*)$".to_string(),
            RoutePattern::Prefix(prefix) => format!("(?s)^({})/?.*", regex::escape(prefix)),
            RoutePattern::Exact(path) => format!("^({})$", regex::escape(path)),
        }
    }
}

/// A compiled path predicate.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    pattern: RoutePattern,
    regex: Regex,
}

impl PathMatcher {
    pub fn compile(pattern: &str) -> Result<Self, regex::Error> {
        let pattern = RoutePattern::parse(pattern);
        let regex = Regex::new(&pattern.to_regex())?;
        Ok(Self { pattern, regex })
    }

    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    /// Returns the captured `basePath` if `path` matches.
    pub fn base_path(&self, path: &str) -> Option<String> {
        self.regex
            .captures(path)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

/// Lowercase a Host-style value and strip any port.
pub fn normalize_host(raw: &str) -> String {
    let host = raw.trim();
    let without_port = if let Some(rest) = host.strip_prefix('[') {
        // IPv6 literal: keep the brackets, drop ":port" after them.
        match rest.find(']') {
            Some(end) => &host[..end + 2],
            None => host,
        }
    } else {
        match host.rsplit_once(':') {
            Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
            _ => host,
        }
    };
    without_port.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch_all_captures_whole_path() {
        let m = PathMatcher::compile("*").unwrap();
        assert_eq!(m.pattern(), &RoutePattern::CatchAll);
        assert_eq!(m.base_path("/any/thing").as_deref(), Some("/any/thing"));
        assert_eq!(m.base_path("").as_deref(), Some(""));
        assert_eq!(m.base_path("/a\nb").as_deref(), Some("/a\nb"));
    }

    #[test]
    fn test_prefix_pattern() {
        let m = PathMatcher::compile("/news/*").unwrap();
        assert_eq!(m.pattern(), &RoutePattern::Prefix("/news".into()));
        assert_eq!(m.base_path("/news").as_deref(), Some("/news"));
        assert_eq!(m.base_path("/news/").as_deref(), Some("/news"));
        assert_eq!(m.base_path("/news/2024/article").as_deref(), Some("/news"));
        assert!(m.matches("/newsletter"));
        assert_eq!(m.base_path("/news/line\nbreak").as_deref(), Some("/news"));
        assert!(!m.matches("/sports/news"));
    }

    #[test]
    fn test_exact_pattern_escapes_metacharacters() {
        let m = PathMatcher::compile("/a.b").unwrap();
        assert!(m.matches("/a.b"));
        assert!(!m.matches("/aXb"));
        assert!(!m.matches("/a.b/c"));

        let m = PathMatcher::compile("/search(beta)+").unwrap();
        assert!(m.matches("/search(beta)+"));
        assert!(!m.matches("/searchbeta"));
    }

    #[test]
    fn test_path_matching_is_case_sensitive() {
        let m = PathMatcher::compile("/About").unwrap();
        assert!(m.matches("/About"));
        assert!(!m.matches("/about"));
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("Example.COM"), "example.com");
        assert_eq!(normalize_host("example.com:8080"), "example.com");
        assert_eq!(normalize_host("[::1]:8233"), "[::1]");
        assert_eq!(normalize_host(" a.com "), "a.com");
    }
}

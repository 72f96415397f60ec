//! Route matching logic.
//!
//! # Responsibilities
//! - Match request method (exact, or `ANY`)
//! - Match request path against a segment pattern with named parameters
//! - Capture parameter values for logging and downstream use
//!
//! # Design Decisions
//! - Path matching is case-sensitive, method matching is not
//! - Trailing and repeated slashes are insignificant
//! - A parameter matches exactly one non-empty segment; no wildcards
//! - No regex, patterns are compiled to a segment list once at startup

use std::collections::HashSet;
use std::fmt;

use axum::http::Method;

/// Route compilation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("path pattern must not be empty")]
    EmptyPattern,

    #[error("path pattern '{0}' must start with '/'")]
    NotAbsolute(String),

    #[error("path pattern '{0}' contains a wildcard; only exact and named segments are supported")]
    Wildcard(String),

    #[error("path pattern '{0}' has a parameter without a name")]
    UnnamedParam(String),

    #[error("path pattern '{pattern}' repeats parameter '{name}'")]
    DuplicateParam { pattern: String, name: String },

    #[error("invalid method '{0}'")]
    InvalidMethod(String),

    #[error("invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("invalid role '{0}'")]
    InvalidRole(String),

    #[error("invalid permission '{0}'")]
    InvalidPermission(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A compiled path pattern such as `/api/projects/:id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RouteError::EmptyPattern);
        }
        if !trimmed.starts_with('/') {
            return Err(RouteError::NotAbsolute(raw.to_string()));
        }

        let mut seen = HashSet::new();
        let mut segments = Vec::new();
        for part in split_path(trimmed) {
            if part.contains('*') {
                return Err(RouteError::Wildcard(raw.to_string()));
            }
            let name = part
                .strip_prefix(':')
                .or_else(|| part.strip_prefix('{').and_then(|p| p.strip_suffix('}')));
            match name {
                Some("") => return Err(RouteError::UnnamedParam(raw.to_string())),
                Some(name) => {
                    if !seen.insert(name.to_string()) {
                        return Err(RouteError::DuplicateParam {
                            pattern: raw.to_string(),
                            name: name.to_string(),
                        });
                    }
                    segments.push(Segment::Param(name.to_string()));
                }
                None => segments.push(Segment::Literal(part.to_string())),
            }
        }

        Ok(Self {
            raw: trimmed.to_string(),
            segments,
        })
    }

    /// Match a request path, capturing named parameters.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let mut params = PathParams::default();
        let mut parts = split_path(path);

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => params.push(name, part),
            }
        }

        parts.next().is_none().then_some(params)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Parameters captured from a matched path, in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    fn push(&mut self, name: &str, value: &str) {
        self.0.push((name.to_string(), value.to_string()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Method condition of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodMatcher {
    Any,
    Exact(Method),
}

impl MethodMatcher {
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        let upper = raw.trim().to_ascii_uppercase();
        if upper == "ANY" || upper == "*" {
            return Ok(MethodMatcher::Any);
        }
        Method::from_bytes(upper.as_bytes())
            .map(MethodMatcher::Exact)
            .map_err(|_| RouteError::InvalidMethod(raw.to_string()))
    }

    pub fn matches(&self, method: &Method) -> bool {
        match self {
            MethodMatcher::Any => true,
            MethodMatcher::Exact(expected) => expected == method,
        }
    }
}

impl fmt::Display for MethodMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodMatcher::Any => f.write_str("ANY"),
            MethodMatcher::Exact(method) => write!(f, "{}", method),
        }
    }
}

//! Route pattern compilation and path matching.
//!
//! # Responsibilities
//! - Compile `/literal/:param` patterns into segment lists
//! - Match a concrete path segment-by-segment, binding named parameters
//! - Support prefix matching for function routes and middleware scopes
//! - Rank patterns by specificity for lookup precedence
//!
//! # Design Decisions
//! - Literal matching is case-sensitive
//! - Empty segments are discarded, so `/a/` and `/a` are the same path
//! - Single left-to-right pass, no backtracking and no regex
//! - Malformed patterns fail at registration time, never during dispatch

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::{RouteError, RouteResult};

/// Marker that introduces a named-parameter segment.
pub const PARAM_MARKER: char = ':';

/// Split a request path into its non-empty segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// One compiled pattern segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the path segment exactly.
    Literal(String),
    /// Binds any path segment under this name.
    Param(String),
}

impl Segment {
    pub fn is_literal(&self) -> bool {
        matches!(self, Segment::Literal(_))
    }
}

/// How many path segments a pattern must consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Path and pattern have the same number of segments.
    Exact,
    /// Path may continue past the end of the pattern.
    Prefix,
}

/// Named parameters bound by a match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Params(HashMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value bound to `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Copy bindings from `other` whose names are not bound here yet.
    pub fn fill_from(&mut self, other: Params) {
        for (name, value) in other.0 {
            self.0.entry(name).or_insert(value);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Result of a successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch {
    /// Named parameters bound by the pattern.
    pub params: Params,
    /// Path segments left over after the pattern (prefix mode only).
    pub rest: Vec<String>,
}

/// A compiled route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Compile a pattern such as `/login/user/:name`.
    ///
    /// A leading slash is optional: `v1` and `/v1` compile to the same pattern.
    pub fn compile(pattern: &str) -> RouteResult<Self> {
        let mut segments = Vec::new();
        let mut seen = HashSet::new();

        for raw in split_path(pattern) {
            if raw.chars().any(char::is_whitespace) {
                return Err(compile_error(pattern, "segment contains whitespace"));
            }
            match raw.strip_prefix(PARAM_MARKER) {
                Some("") => return Err(compile_error(pattern, "empty parameter name")),
                Some(name) => {
                    if !seen.insert(name) {
                        return Err(compile_error(pattern, "duplicate parameter name"));
                    }
                    segments.push(Segment::Param(name.to_string()));
                }
                None => segments.push(Segment::Literal(raw.to_string())),
            }
        }

        Ok(Self::from_segments(segments))
    }

    /// The empty pattern, matching `/`.
    pub fn root() -> Self {
        Self::from_segments(Vec::new())
    }

    fn from_segments(segments: Vec<Segment>) -> Self {
        let mut source = String::new();
        for segment in &segments {
            source.push('/');
            match segment {
                Segment::Literal(lit) => source.push_str(lit),
                Segment::Param(name) => {
                    source.push(PARAM_MARKER);
                    source.push_str(name);
                }
            }
        }
        if source.is_empty() {
            source.push('/');
        }
        Self { source, segments }
    }

    /// Normalized textual form, always starting with `/`.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Concatenate `other` after this pattern.
    ///
    /// Fails if both halves bind the same parameter name.
    pub fn join(&self, other: &Pattern) -> RouteResult<Pattern> {
        if self.is_empty() {
            return Ok(other.clone());
        }
        if other.is_empty() {
            return Ok(self.clone());
        }
        Pattern::compile(&format!("{}{}", self.source, other.source))
    }

    /// Match already-split path segments.
    pub fn match_segments(&self, path: &[&str], mode: MatchMode) -> Option<PathMatch> {
        let fits = match mode {
            MatchMode::Exact => path.len() == self.segments.len(),
            MatchMode::Prefix => path.len() >= self.segments.len(),
        };
        if !fits {
            return None;
        }

        let mut params = Params::new();
        for (segment, value) in self.segments.iter().zip(path) {
            match segment {
                Segment::Literal(lit) if lit == value => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => params.insert(name.as_str(), *value),
            }
        }

        let rest = path[self.segments.len()..]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        Some(PathMatch { params, rest })
    }

    /// Match a raw request path.
    pub fn match_path(&self, path: &str, mode: MatchMode) -> Option<PathMatch> {
        self.match_segments(&split_path(path), mode)
    }

    /// Compare specificity: `Greater` means `self` has a literal at the first
    /// position where the other pattern has a parameter.
    pub fn specificity_cmp(&self, other: &Pattern) -> Ordering {
        for (a, b) in self.segments.iter().zip(&other.segments) {
            match (a.is_literal(), b.is_literal()) {
                (true, false) => return Ordering::Greater,
                (false, true) => return Ordering::Less,
                _ => {}
            }
        }
        Ordering::Equal
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

fn compile_error(pattern: &str, reason: &'static str) -> RouteError {
    RouteError::PatternCompile {
        pattern: pattern.to_string(),
        reason,
    }
}

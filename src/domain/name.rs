use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ComposerError;

/// Reserved separator joining namespace segments and the leaf segment.
pub const SEPARATOR: &str = "__";

/// A node address: zero or more namespace segments followed by one leaf segment.
///
/// Rendered as the segments joined by [`SEPARATOR`]. Segments are validated so
/// that rendering and parsing round-trip and so that a segment is always a safe
/// path component for file-backed cache stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    segments: Vec<String>,
}

impl QualifiedName {
    /// Parse a rendered name, splitting on the separator.
    pub fn parse(raw: &str) -> Result<Self, ComposerError> {
        Self::from_segments(raw.split(SEPARATOR))
    }

    /// A single root-level segment. Rejects anything containing the separator.
    pub fn leaf(segment: &str) -> Result<Self, ComposerError> {
        if segment.contains(SEPARATOR) {
            return Err(ComposerError::Naming(format!(
                "'{}' contains the reserved separator '{}'; use a namespace merge or a qualified binding instead",
                segment, SEPARATOR
            )));
        }
        Self::from_segments([segment])
    }

    pub fn from_segments<I, S>(segments: I) -> Result<Self, ComposerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(ComposerError::Naming("empty name".to_string()));
        }
        for segment in &segments {
            validate_segment(segment)?;
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The last segment.
    pub fn leaf_name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// The namespace path the name lives in (every segment but the leaf).
    pub fn namespace(&self) -> &[String] {
        &self.segments[..self.segments.len().saturating_sub(1)]
    }

    /// `namespace` followed by all segments of `rest`.
    pub fn join(namespace: &[String], rest: &QualifiedName) -> Self {
        let mut segments = Vec::with_capacity(namespace.len() + rest.segments.len());
        segments.extend(namespace.iter().cloned());
        segments.extend(rest.segments.iter().cloned());
        Self { segments }
    }

    /// This name moved under `prefix`.
    pub fn prefixed(&self, prefix: &[String]) -> Self {
        Self::join(prefix, self)
    }

    /// True when the name lives in `namespace` or in one of its sub-namespaces.
    pub fn is_within(&self, namespace: &[String]) -> bool {
        self.segments.len() > namespace.len() && self.segments.starts_with(namespace)
    }

    pub fn is_qualified(&self) -> bool {
        self.segments.len() > 1
    }
}

/// A segment is non-empty, never contains the separator, never starts or ends
/// with `_`, and only uses ASCII alphanumerics, `_` and `-`.
pub fn validate_segment(segment: &str) -> Result<(), ComposerError> {
    if segment.is_empty() {
        return Err(ComposerError::Naming("empty name segment".to_string()));
    }
    if segment.contains(SEPARATOR) {
        return Err(ComposerError::Naming(format!(
            "segment '{}' contains the reserved separator '{}'",
            segment, SEPARATOR
        )));
    }
    if segment.starts_with('_') || segment.ends_with('_') {
        return Err(ComposerError::Naming(format!(
            "segment '{}' must not start or end with '_'",
            segment
        )));
    }
    if let Some(c) = segment
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(ComposerError::Naming(format!(
            "segment '{}' contains invalid character {:?}",
            segment, c
        )));
    }
    Ok(())
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join(SEPARATOR))
    }
}

impl std::str::FromStr for QualifiedName {
    type Err = ComposerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for QualifiedName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for QualifiedName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

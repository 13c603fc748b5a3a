//! Path: the ordered sequence of element names from the root to a node.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{Error, Result};

/// A node path. The root path has no segments and renders as `/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path {
    segments: SmallVec<[String; 8]>,
}

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    /// Check one element name: non-empty, no separators, not `.` or `..`.
    pub fn validate_segment(name: &str) -> Result<()> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
            return Err(Error::InvalidPath(format!("invalid name '{name}'")));
        }
        Ok(())
    }

    /// Parse `/a/b/c`. The leading slash is optional; invalid segments are rejected.
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.strip_prefix('/').unwrap_or(s);
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
        let mut segments = SmallVec::new();
        for seg in trimmed.split('/') {
            if Self::validate_segment(seg).is_err() {
                return Err(Error::InvalidPath(s.to_string()));
            }
            segments.push(seg.to_string());
        }
        Ok(Self { segments })
    }

    /// Path of a child element under this one.
    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self { segments }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.pop();
        Some(Self { segments })
    }

    /// Last segment; `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for seg in &self.segments {
            write!(f, "/{seg}")?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Path::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_path() {
        let root = Path::parse("/").unwrap();
        assert!(root.is_root());
        assert_eq!(root.to_string(), "/");
        assert_eq!(Path::parse("").unwrap(), root);
        assert_eq!(root.name(), None);
        assert!(root.parent().is_none());
    }

    #[test]
    fn test_child_and_parent() {
        let p = Path::root().child("a").child("b");
        assert_eq!(p.to_string(), "/a/b");
        assert_eq!(p.name(), Some("b"));
        assert_eq!(p.parent().unwrap().to_string(), "/a");
        assert_eq!(p.depth(), 2);
    }

    #[test]
    fn test_parse_round_trip() {
        let p: Path = "/docs/2024/report".parse().unwrap();
        assert_eq!(p.segments().collect::<Vec<_>>(), vec!["docs", "2024", "report"]);
        assert_eq!(p.to_string(), "/docs/2024/report");
        assert_eq!(Path::parse("docs/2024/").unwrap().to_string(), "/docs/2024");
    }

    #[test]
    fn test_empty_segment_rejected() {
        assert!(matches!(Path::parse("/a//b"), Err(Error::InvalidPath(_))));
    }

    #[test]
    fn test_dot_segments_rejected() {
        for bad in [".", "..", "a\\b", ""] {
            assert!(Path::validate_segment(bad).is_err(), "{bad:?}");
        }
        assert!(Path::validate_segment("..a").is_ok());
        assert!(Path::validate_segment(".order").is_ok());
        assert!(matches!(Path::parse("/a/../b"), Err(Error::InvalidPath(_))));
    }
}

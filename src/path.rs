//! Materialized path value object
//!
//! A department's position in the tree is stored as the ordered chain of
//! ancestor ids (including the department itself) joined by a fixed
//! separator. Subtree queries become prefix matches on this string.

use std::fmt;

use uuid::Uuid;

use crate::error::{HierarchyError, HierarchyResult};

/// Separator between path segments
pub const PATH_SEPARATOR: char = '.';

/// Ordered ancestor-id chain, root first, self last
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TreePath {
    segments: Vec<String>,
}

impl TreePath {
    /// Build a path from raw segments, validating each one
    pub fn encode<S: AsRef<str>>(segments: &[S]) -> HierarchyResult<Self> {
        if segments.is_empty() {
            return Err(HierarchyError::Encoding("empty segment list".to_string()));
        }
        let mut out = Vec::with_capacity(segments.len());
        for seg in segments {
            let seg = seg.as_ref();
            if seg.is_empty() {
                return Err(HierarchyError::Encoding("empty segment".to_string()));
            }
            if seg.contains(PATH_SEPARATOR) {
                return Err(HierarchyError::Encoding(format!(
                    "segment '{}' contains separator",
                    seg
                )));
            }
            out.push(seg.to_string());
        }
        Ok(Self { segments: out })
    }

    /// Parse a stored path string
    pub fn decode(raw: &str) -> HierarchyResult<Self> {
        if raw.is_empty() {
            return Err(HierarchyError::Decoding("empty path".to_string()));
        }
        let segments: Vec<String> = raw.split(PATH_SEPARATOR).map(|s| s.to_string()).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(HierarchyError::Decoding(format!(
                "empty segment in '{}'",
                raw
            )));
        }
        Ok(Self { segments })
    }

    /// Path of a root department
    pub fn root_of(id: Uuid) -> Self {
        Self {
            segments: vec![id.to_string()],
        }
    }

    /// Path of a direct child of this path
    pub fn child_of(&self, id: Uuid) -> Self {
        let mut segments = self.segments.clone();
        segments.push(id.to_string());
        Self { segments }
    }

    /// Depth is the segment count minus one; roots are depth 0
    pub fn depth(&self) -> i32 {
        self.segments.len() as i32 - 1
    }

    /// True iff this path equals `ancestor` or lies below it
    pub fn is_descendant_of(&self, ancestor: &TreePath) -> bool {
        self.segments.len() >= ancestor.segments.len()
            && self.segments[..ancestor.segments.len()] == ancestor.segments[..]
    }

    /// Replace the `old_prefix` portion with `new_prefix`, keeping the suffix
    pub fn rebase(&self, old_prefix: &TreePath, new_prefix: &TreePath) -> HierarchyResult<TreePath> {
        if !self.is_descendant_of(old_prefix) {
            return Err(HierarchyError::Encoding(format!(
                "path '{}' is not under '{}'",
                self, old_prefix
            )));
        }
        let mut segments = new_prefix.segments.clone();
        segments.extend_from_slice(&self.segments[old_prefix.segments.len()..]);
        Ok(TreePath { segments })
    }

    /// Last segment, the id of the department itself
    pub fn leaf(&self) -> &str {
        self.segments
            .last()
            .map(|s| s.as_str())
            .unwrap_or_default()
    }

    /// Path of the parent, None for roots
    pub fn parent(&self) -> Option<TreePath> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(TreePath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join(&PATH_SEPARATOR.to_string()))
    }
}

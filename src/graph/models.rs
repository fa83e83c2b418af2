use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CodeGraphError;

/// Arena handle of a file in one `GraphIndex`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Relative to the project root, `/`-separated.
    pub path: String,
    pub language: String,
    pub indexed: bool,
    pub line_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionNode {
    pub name: String,
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
    pub is_exported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    pub complexity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassNode {
    pub name: String,
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
    pub base_classes: Vec<String>,
    pub methods: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
}

/// Outcome of name-only callee resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallTarget {
    Resolved { function: FunctionId },
    /// Several definitions elsewhere share the name; `chosen` is the
    /// first-indexed one and is used for traversal.
    Ambiguous {
        chosen: FunctionId,
        candidates: Vec<FunctionId>,
    },
    External,
}

impl CallTarget {
    /// Function a traversal follows, if any.
    pub fn function(&self) -> Option<FunctionId> {
        match self {
            CallTarget::Resolved { function } => Some(*function),
            CallTarget::Ambiguous { chosen, .. } => Some(*chosen),
            CallTarget::External => None,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, CallTarget::External)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEdge {
    pub caller: FunctionId,
    pub callee: String,
    pub line: u32,
    pub target: CallTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportEdge {
    pub file: FileId,
    /// Import target exactly as written.
    pub token: String,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imported_names: Vec<String>,
    /// Repository file the token resolved to.
    pub target: Option<FileId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Imports,
    ImportedBy,
    Calls,
    CalledBy,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 4] = [
        RelationshipType::Imports,
        RelationshipType::ImportedBy,
        RelationshipType::Calls,
        RelationshipType::CalledBy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Imports => "imports",
            RelationshipType::ImportedBy => "imported_by",
            RelationshipType::Calls => "calls",
            RelationshipType::CalledBy => "called_by",
        }
    }

    /// Parse a relationship filter; `all` expands to every direction.
    pub fn parse_filter(s: &str) -> Result<Vec<RelationshipType>, CodeGraphError> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(Self::ALL.to_vec()),
            "imports" => Ok(vec![RelationshipType::Imports]),
            "imported_by" => Ok(vec![RelationshipType::ImportedBy]),
            "calls" => Ok(vec![RelationshipType::Calls]),
            "called_by" => Ok(vec![RelationshipType::CalledBy]),
            _ => Err(CodeGraphError::UnknownRelationship(s.to_string())),
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedFile {
    pub file_path: String,
    pub relationship: RelationshipType,
    pub strength: usize,
}

/// One function reached by a context traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub name: String,
    pub file: String,
    pub line: u32,
    /// Hops from the target at first discovery.
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionContext {
    pub function: FunctionNode,
    pub callers: Vec<ContextEntry>,
    pub callees: Vec<ContextEntry>,
    /// The target was reached again from itself.
    pub recursive: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub files: usize,
    pub functions: usize,
    pub classes: usize,
    pub calls: usize,
    pub calls_unresolved: usize,
    pub imports: usize,
    pub imports_resolved: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter() {
        assert_eq!(RelationshipType::parse_filter("all").unwrap().len(), 4);
        assert_eq!(
            RelationshipType::parse_filter("Imported_By").unwrap(),
            vec![RelationshipType::ImportedBy]
        );
        assert!(matches!(
            RelationshipType::parse_filter("friends"),
            Err(CodeGraphError::UnknownRelationship(_))
        ));
    }

    #[test]
    fn test_relationship_serializes_snake_case() {
        let row = RelatedFile {
            file_path: "b.py".to_string(),
            relationship: RelationshipType::CalledBy,
            strength: 2,
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["relationship"], "called_by");
        assert_eq!(RelationshipType::CalledBy.to_string(), "called_by");
    }

    #[test]
    fn test_call_target_function() {
        let resolved = CallTarget::Resolved { function: FunctionId(1) };
        let ambiguous = CallTarget::Ambiguous {
            chosen: FunctionId(2),
            candidates: vec![FunctionId(2), FunctionId(5)],
        };
        assert_eq!(resolved.function(), Some(FunctionId(1)));
        assert_eq!(ambiguous.function(), Some(FunctionId(2)));
        assert_eq!(CallTarget::External.function(), None);
        assert!(CallTarget::External.is_external());
    }
}

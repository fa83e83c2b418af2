use crate::error::{CodeGraphError, Result};
use crate::graph::index::GraphIndex;
use crate::graph::models::{RelatedFile, RelationshipType};

pub struct RelationshipFinder<'a> {
    index: &'a GraphIndex,
}

impl<'a> RelationshipFinder<'a> {
    pub fn new(index: &'a GraphIndex) -> Self {
        Self { index }
    }

    /// Files related to `file_path`, strongest first, ties by path.
    ///
    /// `relationship` is one of `imports`, `imported_by`, `calls`,
    /// `called_by` or `all`. With `all` every direction yields its own row,
    /// so a file can appear more than once.
    pub fn find_related_files(&self, file_path: &str, relationship: &str, limit: usize) -> Result<Vec<RelatedFile>> {
        let types = RelationshipType::parse_filter(relationship)?;
        let file = self
            .index
            .file_id(file_path)
            .ok_or_else(|| CodeGraphError::FileNotIndexed(file_path.to_string()))?;

        let mut related = Vec::new();
        for relationship in types {
            for (other, strength) in self.index.linked_files(file, relationship) {
                if other == file || strength == 0 {
                    continue;
                }
                let Some(path) = self.index.file_path(other) else {
                    continue;
                };
                related.push(RelatedFile {
                    file_path: path.to_string(),
                    relationship,
                    strength,
                });
            }
        }

        related.sort_by(|a, b| {
            b.strength
                .cmp(&a.strength)
                .then_with(|| a.file_path.cmp(&b.file_path))
                .then_with(|| a.relationship.cmp(&b.relationship))
        });
        related.truncate(limit);

        Ok(related)
    }
}

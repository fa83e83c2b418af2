use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::analyzer::{AnalysisOptions, AnalysisStats, CodeGraphAnalyzer};
use crate::error::CodeGraphError;
use crate::graph::{ContextOptions, FunctionContext, RelatedFile};

/// Failures reported to tool callers. The messages are part of the
/// external contract and must not change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Directory not found")]
    DirectoryNotFound,

    #[error("No code files found")]
    NoCodeFiles,

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Function not found")]
    FunctionNotFound,

    #[error("Code graph not indexed. Run index operation first.")]
    NotIndexed,

    #[error("File not found")]
    FileNotFound,

    #[error("File not in code graph. Run index operation first.")]
    FileNotIndexed,

    #[error("Unknown relationship type: {0}")]
    UnknownRelationship(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CodeGraphError> for ToolError {
    fn from(err: CodeGraphError) -> Self {
        match err {
            CodeGraphError::DirectoryNotFound(_) => ToolError::DirectoryNotFound,
            CodeGraphError::UnsupportedLanguage(language) => ToolError::UnsupportedLanguage(language),
            CodeGraphError::NotIndexed(_) => ToolError::NotIndexed,
            CodeGraphError::FunctionNotFound(_) => ToolError::FunctionNotFound,
            CodeGraphError::FileNotFound(_) => ToolError::FileNotFound,
            CodeGraphError::FileNotIndexed(_) => ToolError::FileNotIndexed,
            CodeGraphError::UnknownRelationship(kind) => ToolError::UnknownRelationship(kind),
            other => ToolError::Internal(other.to_string()),
        }
    }
}

pub type ToolResult<T> = std::result::Result<T, ToolError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexRequest {
    pub project_path: String,
    #[serde(default)]
    pub languages: Option<Vec<String>>,
    #[serde(default)]
    pub include_tests: Option<bool>,
    /// Extract on the worker pool (default) or one file at a time.
    #[serde(default)]
    pub parallel: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexResponse {
    pub files_indexed: usize,
    pub functions_indexed: usize,
    pub classes_indexed: usize,
    pub calls_indexed: usize,
    pub imports_indexed: usize,
    pub duration_ms: u64,
}

impl From<&AnalysisStats> for IndexResponse {
    fn from(stats: &AnalysisStats) -> Self {
        Self {
            files_indexed: stats.files_indexed,
            functions_indexed: stats.functions_indexed,
            classes_indexed: stats.classes_indexed,
            calls_indexed: stats.calls_indexed,
            imports_indexed: stats.imports_indexed,
            duration_ms: stats.duration_ms,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextRequest {
    pub project_path: String,
    pub function_name: String,
    #[serde(default)]
    pub include_callers: Option<bool>,
    #[serde(default)]
    pub include_callees: Option<bool>,
    #[serde(default)]
    pub max_depth: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelatedRequest {
    pub project_path: String,
    pub file_path: String,
    #[serde(default)]
    pub relationship_type: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub const DEFAULT_RELATIONSHIP: &str = "all";
pub const DEFAULT_LIMIT: usize = 20;

/// The index, function-context and related-files operations, with one
/// analyzer kept per canonical project path.
#[derive(Default)]
pub struct CodeGraphService {
    analyzers: RwLock<HashMap<PathBuf, Arc<CodeGraphAnalyzer>>>,
}

impl CodeGraphService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn index(&self, request: IndexRequest) -> ToolResult<IndexResponse> {
        let root = canonical_dir(&request.project_path).ok_or(ToolError::DirectoryNotFound)?;

        let mut options = AnalysisOptions {
            include_tests: request.include_tests.unwrap_or(false),
            parallel: request.parallel.unwrap_or(true),
            ..Default::default()
        };
        if let Some(languages) = request.languages {
            if !languages.is_empty() {
                options.languages = languages;
            }
        }

        let analyzer = self.analyzer_for(&root).await;
        let worker = Arc::clone(&analyzer);
        let stats = tokio::task::spawn_blocking(move || worker.analyze_repository(&options))
            .await
            .map_err(|e| CodeGraphError::Task(e.to_string()))??;

        if stats.files_walked == 0 {
            // nothing to query either, so later calls report "not indexed"
            self.analyzers.write().await.remove(&root);
            return Err(ToolError::NoCodeFiles);
        }

        info!(
            "Indexed {}: {} files, {} functions",
            root.display(),
            stats.files_indexed,
            stats.functions_indexed
        );
        Ok(IndexResponse::from(&stats))
    }

    pub async fn function_context(&self, request: ContextRequest) -> ToolResult<FunctionContext> {
        let analyzer = self
            .indexed_analyzer(&request.project_path)
            .await
            .ok_or(ToolError::NotIndexed)?;

        let defaults = ContextOptions::default();
        let options = ContextOptions {
            include_callers: request.include_callers.unwrap_or(defaults.include_callers),
            include_callees: request.include_callees.unwrap_or(defaults.include_callees),
            max_depth: request.max_depth.unwrap_or(defaults.max_depth),
        };

        Ok(analyzer.get_function_context(&request.function_name, &options)?)
    }

    pub async fn related_files(&self, request: RelatedRequest) -> ToolResult<Vec<RelatedFile>> {
        let root = canonical_dir(&request.project_path).ok_or(ToolError::FileNotFound)?;
        // an unknown project still has to tell a missing file from an unindexed one
        let analyzer = match self.analyzers.read().await.get(&root) {
            Some(analyzer) => Arc::clone(analyzer),
            None => Arc::new(CodeGraphAnalyzer::new(&root)),
        };

        let relationship = request
            .relationship_type
            .as_deref()
            .unwrap_or(DEFAULT_RELATIONSHIP);
        let limit = request.limit.unwrap_or(DEFAULT_LIMIT);

        analyzer
            .find_related_files(&request.file_path, relationship, limit)
            .map_err(|e| match e {
                CodeGraphError::NotIndexed(_) => ToolError::FileNotIndexed,
                other => ToolError::from(other),
            })
    }

    /// Analyzer cached for a project, indexed or not.
    pub async fn analyzer(&self, project_path: &str) -> Option<Arc<CodeGraphAnalyzer>> {
        let root = canonical_dir(project_path)?;
        self.analyzers.read().await.get(&root).cloned()
    }

    async fn indexed_analyzer(&self, project_path: &str) -> Option<Arc<CodeGraphAnalyzer>> {
        self.analyzer(project_path)
            .await
            .filter(|analyzer| analyzer.is_indexed())
    }

    async fn analyzer_for(&self, root: &Path) -> Arc<CodeGraphAnalyzer> {
        let mut analyzers = self.analyzers.write().await;
        Arc::clone(
            analyzers
                .entry(root.to_path_buf())
                .or_insert_with(|| Arc::new(CodeGraphAnalyzer::new(root))),
        )
    }
}

fn canonical_dir(path: &str) -> Option<PathBuf> {
    let canonical = Path::new(path).canonicalize().ok()?;
    canonical.is_dir().then_some(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn project() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        create_file(
            temp_dir.path(),
            "app/main.py",
            "from . import util\n\ndef main():\n    helper()\n    util.work()\n\ndef helper():\n    pass\n",
        );
        create_file(temp_dir.path(), "app/util.py", "def work():\n    pass\n");
        create_file(temp_dir.path(), "README.md", "# demo\n");
        temp_dir
    }

    fn index_request(dir: &TempDir) -> IndexRequest {
        IndexRequest {
            project_path: dir.path().to_string_lossy().to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_error_strings() {
        assert_eq!(ToolError::DirectoryNotFound.to_string(), "Directory not found");
        assert_eq!(ToolError::NoCodeFiles.to_string(), "No code files found");
        assert_eq!(ToolError::FunctionNotFound.to_string(), "Function not found");
        assert_eq!(
            ToolError::NotIndexed.to_string(),
            "Code graph not indexed. Run index operation first."
        );
        assert_eq!(ToolError::FileNotFound.to_string(), "File not found");
        assert_eq!(
            ToolError::FileNotIndexed.to_string(),
            "File not in code graph. Run index operation first."
        );
    }

    #[test]
    fn test_core_errors_map_to_tool_errors() {
        assert_eq!(
            ToolError::from(CodeGraphError::FileNotFound("a.py".to_string())),
            ToolError::FileNotFound
        );
        assert_eq!(
            ToolError::from(CodeGraphError::FunctionNotFound("main".to_string())),
            ToolError::FunctionNotFound
        );
        assert_eq!(
            ToolError::from(CodeGraphError::Task("worker panicked".to_string())),
            ToolError::Internal("Task failed: worker panicked".to_string())
        );
    }

    #[tokio::test]
    async fn test_index_reports_counts() {
        let dir = project();
        let service = CodeGraphService::new();

        let response = service.index(index_request(&dir)).await.unwrap();

        assert_eq!(response.files_indexed, 2);
        assert_eq!(response.functions_indexed, 3);
        assert_eq!(response.classes_indexed, 0);
        assert_eq!(response.calls_indexed, 2);
        assert_eq!(response.imports_indexed, 1);
    }

    #[tokio::test]
    async fn test_index_missing_directory() {
        let dir = TempDir::new().unwrap();
        let service = CodeGraphService::new();
        let request = IndexRequest {
            project_path: dir.path().join("missing").to_string_lossy().to_string(),
            ..Default::default()
        };

        assert_eq!(service.index(request).await.err(), Some(ToolError::DirectoryNotFound));
    }

    #[tokio::test]
    async fn test_index_without_code_files() {
        let dir = TempDir::new().unwrap();
        create_file(dir.path(), "notes.txt", "nothing here");
        let service = CodeGraphService::new();

        assert_eq!(service.index(index_request(&dir)).await.err(), Some(ToolError::NoCodeFiles));

        let context = service
            .function_context(ContextRequest {
                project_path: dir.path().to_string_lossy().to_string(),
                function_name: "main".to_string(),
                ..Default::default()
            })
            .await;
        assert_eq!(context.err(), Some(ToolError::NotIndexed));
    }

    #[tokio::test]
    async fn test_index_with_only_filtered_files_succeeds_empty() {
        let dir = TempDir::new().unwrap();
        create_file(dir.path(), "test_app.py", "def test_run():\n    pass\n");
        let service = CodeGraphService::new();

        let response = service.index(index_request(&dir)).await.unwrap();
        assert_eq!(response.files_indexed, 0);
        assert_eq!(response.functions_indexed, 0);
    }

    #[tokio::test]
    async fn test_index_unsupported_language() {
        let dir = project();
        let service = CodeGraphService::new();
        let request = IndexRequest {
            languages: Some(vec!["cobol".to_string()]),
            ..index_request(&dir)
        };

        let err = service.index(request).await.err().unwrap();
        assert_eq!(err.to_string(), "Unsupported language: cobol");
    }

    #[tokio::test]
    async fn test_function_context_flow() {
        let dir = project();
        let service = CodeGraphService::new();
        let project_path = dir.path().to_string_lossy().to_string();

        let before = service
            .function_context(ContextRequest {
                project_path: project_path.clone(),
                function_name: "main".to_string(),
                ..Default::default()
            })
            .await;
        assert_eq!(before.err(), Some(ToolError::NotIndexed));

        service.index(index_request(&dir)).await.unwrap();

        let context = service
            .function_context(ContextRequest {
                project_path: project_path.clone(),
                function_name: "main".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let callees: Vec<&str> = context.callees.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(callees, vec!["helper", "work"]);
        assert!(context.callers.is_empty());

        let missing = service
            .function_context(ContextRequest {
                project_path,
                function_name: "nope".to_string(),
                ..Default::default()
            })
            .await;
        assert_eq!(missing.err(), Some(ToolError::FunctionNotFound));
    }

    #[tokio::test]
    async fn test_related_files_flow() {
        let dir = project();
        let service = CodeGraphService::new();
        let project_path = dir.path().to_string_lossy().to_string();
        let request = |file: &str| RelatedRequest {
            project_path: project_path.clone(),
            file_path: file.to_string(),
            ..Default::default()
        };

        assert_eq!(
            service.related_files(request("app/main.py")).await.err(),
            Some(ToolError::FileNotIndexed)
        );

        service.index(index_request(&dir)).await.unwrap();

        let related = service.related_files(request("app/main.py")).await.unwrap();
        assert_eq!(related.len(), 2);
        assert!(related.iter().all(|r| r.file_path == "app/util.py" && r.strength == 1));

        assert_eq!(
            service.related_files(request("app/missing.py")).await.err(),
            Some(ToolError::FileNotFound)
        );
        assert_eq!(
            service.related_files(request("README.md")).await.err(),
            Some(ToolError::FileNotIndexed)
        );
    }

    #[tokio::test]
    async fn test_reindex_is_idempotent() {
        let dir = project();
        let service = CodeGraphService::new();

        let mut first = service.index(index_request(&dir)).await.unwrap();
        let mut second = service.index(index_request(&dir)).await.unwrap();
        first.duration_ms = 0;
        second.duration_ms = 0;

        assert_eq!(first, second);
    }
}

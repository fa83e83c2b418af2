use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{CodeGraphError, ParseError, Result};
use crate::graph::{ContextOptions, ContextResolver, FunctionContext, GraphIndex, RelatedFile, RelationshipFinder};
use crate::indexer::{ExtractionResult, FileWalker, IndexingProgress, Parser, SymbolExtractor, WalkedFile};
use crate::languages::LanguageRegistry;

pub const DEFAULT_LANGUAGES: &[&str] = &["python"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Language names; empty means the default set.
    pub languages: Vec<String>,
    pub include_tests: bool,
    /// Extract files on the rayon pool instead of one by one.
    pub parallel: bool,
    /// Reject files whose syntax tree contains errors.
    pub strict_syntax: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            languages: DEFAULT_LANGUAGES.iter().map(|l| l.to_string()).collect(),
            include_tests: false,
            parallel: true,
            strict_syntax: true,
        }
    }
}

/// Totals for one analysis run.
///
/// `files_indexed == files_walked - files_filtered - files_failed` always
/// holds. A cancelled run only counts the files it dispatched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub files_walked: usize,
    pub files_filtered: usize,
    pub files_failed: usize,
    pub files_indexed: usize,
    pub functions_indexed: usize,
    pub classes_indexed: usize,
    pub calls_indexed: usize,
    pub calls_unresolved: usize,
    pub imports_indexed: usize,
    pub imports_resolved: usize,
    pub duration_ms: u64,
    pub cancelled: bool,
}

enum FileOutcome {
    Extracted(ExtractionResult),
    Failed,
    Skipped,
}

/// Builds and queries the code graph of one project.
///
/// Every `analyze_repository` call builds a fresh `GraphIndex` and swaps it
/// in when done; queries see either the previous graph or the new one.
pub struct CodeGraphAnalyzer {
    project_path: PathBuf,
    registry: Arc<LanguageRegistry>,
    graph: RwLock<Option<Arc<GraphIndex>>>,
    progress: IndexingProgress,
}

impl CodeGraphAnalyzer {
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        Self::with_registry(project_path, Arc::new(LanguageRegistry::new()))
    }

    pub fn with_registry(project_path: impl Into<PathBuf>, registry: Arc<LanguageRegistry>) -> Self {
        Self {
            project_path: project_path.into(),
            registry,
            graph: RwLock::new(None),
            progress: IndexingProgress::new(),
        }
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    pub fn progress(&self) -> IndexingProgress {
        self.progress.clone()
    }

    /// Current graph, if an analysis has completed.
    pub fn graph(&self) -> Option<Arc<GraphIndex>> {
        self.graph
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_indexed(&self) -> bool {
        self.graph().is_some()
    }

    pub fn analyze_repository(&self, options: &AnalysisOptions) -> Result<AnalysisStats> {
        self.analyze_with_cancel(options, &CancellationToken::new())
    }

    /// Walk, extract, and index the project. Once `cancel` fires no new
    /// file is dispatched; files already extracted are still merged.
    pub fn analyze_with_cancel(&self, options: &AnalysisOptions, cancel: &CancellationToken) -> Result<AnalysisStats> {
        let started = Instant::now();

        if !self.project_path.is_dir() {
            return Err(CodeGraphError::DirectoryNotFound(self.project_path.clone()));
        }

        let languages: Vec<String> = if options.languages.is_empty() {
            DEFAULT_LANGUAGES.iter().map(|l| l.to_string()).collect()
        } else {
            options.languages.clone()
        };
        let registry = Arc::new(self.registry.select(&languages)?);

        let walker = FileWalker::new(Arc::clone(&registry), options.include_tests);
        let mut walk = walker.walk(&self.project_path)?;
        let files: Vec<WalkedFile> = walk.by_ref().collect();
        let files_filtered = walk.filtered();

        info!(
            "Indexing {} files in {} ({} filtered)",
            files.len(),
            self.project_path.display(),
            files_filtered
        );
        self.progress.start(files.len());

        let parser = Parser::new(options.strict_syntax);
        let process = |file: &WalkedFile| -> FileOutcome {
            if cancel.is_cancelled() {
                return FileOutcome::Skipped;
            }
            match extract_file(file, &registry, &parser) {
                Ok(result) => {
                    self.progress.inc(result.functions.len());
                    FileOutcome::Extracted(result)
                }
                Err(e) => {
                    warn!("Skipping {}: {}", file.relative, e);
                    self.progress.inc_error();
                    FileOutcome::Failed
                }
            }
        };

        let outcomes: Vec<FileOutcome> = if options.parallel {
            files.par_iter().map(process).collect()
        } else {
            files.iter().map(process).collect()
        };

        let mut results = Vec::new();
        let mut files_failed = 0;
        let mut files_skipped = 0;
        for outcome in outcomes {
            match outcome {
                FileOutcome::Extracted(result) => results.push(result),
                FileOutcome::Failed => files_failed += 1,
                FileOutcome::Skipped => files_skipped += 1,
            }
        }

        let graph = build_graph(results)?;
        let graph_stats = graph.stats();
        self.progress.finish();

        let stats = AnalysisStats {
            files_walked: files.len() - files_skipped + files_filtered,
            files_filtered,
            files_failed,
            files_indexed: graph_stats.files,
            functions_indexed: graph_stats.functions,
            classes_indexed: graph_stats.classes,
            calls_indexed: graph_stats.calls,
            calls_unresolved: graph_stats.calls_unresolved,
            imports_indexed: graph_stats.imports,
            imports_resolved: graph_stats.imports_resolved,
            duration_ms: started.elapsed().as_millis() as u64,
            cancelled: files_skipped > 0,
        };

        *self
            .graph
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::new(graph));

        if stats.cancelled {
            warn!(
                "Indexing cancelled after {} of {} files",
                stats.files_indexed + stats.files_failed,
                files.len()
            );
        }
        info!(
            "Indexed {} files: {} functions, {} classes, {} calls ({} unresolved), {} imports in {}ms",
            stats.files_indexed,
            stats.functions_indexed,
            stats.classes_indexed,
            stats.calls_indexed,
            stats.calls_unresolved,
            stats.imports_indexed,
            stats.duration_ms
        );

        Ok(stats)
    }

    pub fn get_function_context(&self, name: &str, options: &ContextOptions) -> Result<FunctionContext> {
        let graph = self.require_graph()?;
        ContextResolver::new(&graph).get_function_context(name, options)
    }

    /// Fails with `FileNotFound` when the file is not on disk, before the
    /// graph is consulted.
    pub fn find_related_files(&self, file_path: &str, relationship: &str, limit: usize) -> Result<Vec<RelatedFile>> {
        let relative = self.relative_path(file_path);
        if !self.project_path.join(&relative).is_file() {
            debug!("{} does not exist under {}", relative, self.project_path.display());
            return Err(CodeGraphError::FileNotFound(relative));
        }
        let graph = self.require_graph()?;
        RelationshipFinder::new(&graph).find_related_files(&relative, relationship, limit)
    }

    /// Project-relative, `/`-separated form of `file_path`. Absolute paths
    /// inside the project are stripped of the project prefix.
    pub fn relative_path(&self, file_path: &str) -> String {
        let path = Path::new(file_path);
        let relative = if path.is_absolute() {
            let root = self
                .project_path
                .canonicalize()
                .unwrap_or_else(|_| self.project_path.clone());
            let real = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
            real.strip_prefix(&root)
                .or_else(|_| path.strip_prefix(&self.project_path))
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| path.to_path_buf())
        } else {
            path.to_path_buf()
        };

        relative
            .components()
            .filter(|c| !matches!(c, std::path::Component::CurDir))
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn require_graph(&self) -> Result<Arc<GraphIndex>> {
        self.graph()
            .ok_or_else(|| CodeGraphError::NotIndexed(self.project_path.clone()))
    }
}

fn extract_file(file: &WalkedFile, registry: &LanguageRegistry, parser: &Parser) -> Result<ExtractionResult> {
    let extractor = registry
        .get_by_name(&file.language)
        .ok_or_else(|| CodeGraphError::UnsupportedLanguage(file.language.clone()))?;

    let bytes = fs::read(&file.path)?;
    let content = String::from_utf8(bytes).map_err(|_| ParseError::Encoding {
        path: file.relative.clone(),
    })?;

    let parsed = parser.parse_source(&content, &file.relative, extractor.as_ref())?;
    let result = SymbolExtractor::new().extract_all(&parsed, extractor.as_ref());
    debug!(
        "{}: {} functions, {} calls, {} imports",
        file.relative,
        result.functions.len(),
        result.calls.len(),
        result.imports.len()
    );
    Ok(result)
}

/// Single-writer merge. Results are applied in path order so ties resolve
/// the same way whatever order extraction finished in; nodes of every file
/// go in before any edge so callee resolution sees the whole project.
fn build_graph(mut results: Vec<ExtractionResult>) -> Result<GraphIndex> {
    results.sort_by(|a, b| a.path.cmp(&b.path));
    let mut graph = GraphIndex::new();

    for result in &results {
        graph.add_file(&result.path, &result.language, result.line_count);
        for function in &result.functions {
            graph.add_function(&result.path, function)?;
        }
        for class in &result.classes {
            graph.add_class(&result.path, class)?;
        }
    }

    for result in &results {
        for call in &result.calls {
            graph.add_call_edge(&result.path, call)?;
        }
        for import in &result.imports {
            graph.add_import_edge(&result.path, import)?;
        }
    }

    Ok(graph)
}

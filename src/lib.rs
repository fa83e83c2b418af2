pub mod analyzer;
pub mod error;
pub mod graph;
pub mod indexer;
pub mod languages;
pub mod service;

pub use analyzer::{AnalysisOptions, AnalysisStats, CodeGraphAnalyzer, DEFAULT_LANGUAGES};
pub use error::{CodeGraphError, ParseError, Result};
pub use graph::{
    CallEdge, CallTarget, ContextOptions, ContextResolver, FunctionContext, GraphIndex, GraphStats,
    ImportEdge, RelatedFile, RelationshipFinder, RelationshipType,
};
pub use indexer::{ExtractionResult, FileWalker, IndexingProgress, Parser, SymbolExtractor};
pub use languages::{LanguageExtractor, LanguageRegistry};
pub use service::{CodeGraphService, ToolError};

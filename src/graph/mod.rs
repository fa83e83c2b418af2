pub mod context;
pub mod index;
pub mod models;
pub mod related;

pub use context::{ContextOptions, ContextResolver};
pub use index::GraphIndex;
pub use models::{
    CallEdge, CallTarget, ClassId, ClassNode, ContextEntry, FileId, FunctionContext, FunctionId,
    FunctionNode, GraphStats, ImportEdge, RelatedFile, RelationshipType, SourceFile,
};
pub use related::RelationshipFinder;

pub mod extractor;
pub mod parser;
pub mod progress;
pub mod walker;

pub use extractor::{CallFact, ClassFact, ExtractionResult, FunctionFact, ImportFact, SymbolExtractor};
pub use parser::{ParsedFile, Parser};
pub use progress::{IndexingProgress, ProgressSnapshot};
pub use walker::{FileWalker, WalkFiles, WalkedFile};

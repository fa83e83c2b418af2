use std::path::PathBuf;

use thiserror::Error;

/// Failure to turn one file into structural facts.
///
/// Always tagged with the file (or language) it concerns so the coordinator
/// can log it and move on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("{path}: syntax error at {line}:{column}")]
    Syntax {
        path: String,
        line: u32,
        column: u32,
    },

    #[error("{path}: grammar rejected: {reason}")]
    Grammar { path: String, reason: String },

    #[error("invalid {language} query: {reason}")]
    Query { language: String, reason: String },

    #[error("{path}: not valid UTF-8")]
    Encoding { path: String },

    #[error("{path}: parser produced no tree")]
    NoTree { path: String },
}

impl ParseError {
    pub fn path(&self) -> Option<&str> {
        match self {
            ParseError::Syntax { path, .. }
            | ParseError::Grammar { path, .. }
            | ParseError::Encoding { path }
            | ParseError::NoTree { path } => Some(path),
            ParseError::Query { .. } => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum CodeGraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("Language not supported: {0}")]
    UnsupportedLanguage(String),

    #[error("Code graph not indexed: {}", .0.display())]
    NotIndexed(PathBuf),

    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File not in code graph: {0}")]
    FileNotIndexed(String),

    #[error("Unknown relationship type: {0}")]
    UnknownRelationship(String),

    #[error("Edge endpoint missing: {0}")]
    MissingEndpoint(String),

    #[error("Task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, CodeGraphError>;

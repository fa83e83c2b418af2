pub mod go;
pub mod java;
pub mod python;
pub mod rust;
pub mod typescript;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tree_sitter::{Node, Query};

use crate::error::{CodeGraphError, ParseError, Result};

/// Query sources for one grammar.
///
/// Capture names are shared by every language so the extraction pass never
/// needs to know which language it is looking at:
///
/// - functions: `@function` (definition node), `@name`
/// - classes: `@class` (definition node), `@name`, `@base` (zero or more matches)
/// - imports: `@import` (statement node), `@path`, `@alias`, `@imported`
/// - calls: `@call` (call node), `@callee`
pub struct QuerySource {
    pub functions: &'static str,
    pub classes: &'static str,
    pub imports: &'static str,
    pub calls: &'static str,
}

/// A tree-sitter language with its compiled queries.
pub struct Grammar {
    pub name: &'static str,
    pub language: tree_sitter::Language,
    pub functions: Query,
    pub classes: Query,
    pub imports: Query,
    pub calls: Query,
}

impl Grammar {
    pub fn compile(
        name: &'static str,
        language: tree_sitter::Language,
        source: &QuerySource,
    ) -> std::result::Result<Self, ParseError> {
        let compile = |query: &str| {
            Query::new(&language, query).map_err(|e| ParseError::Query {
                language: name.to_string(),
                reason: e.to_string(),
            })
        };

        Ok(Self {
            name,
            functions: compile(source.functions)?,
            classes: compile(source.classes)?,
            imports: compile(source.imports)?,
            calls: compile(source.calls)?,
            language,
        })
    }

    /// Compile once per process and hand out the cached copy afterwards.
    pub fn cached(
        cell: &'static OnceCell<Grammar>,
        name: &'static str,
        language: impl FnOnce() -> tree_sitter::Language,
        source: &QuerySource,
    ) -> std::result::Result<&'static Grammar, ParseError> {
        cell.get_or_try_init(|| Grammar::compile(name, language(), source))
    }
}

/// One supported language: grammar plus the handful of rules that differ
/// between languages. The extraction pass itself is shared.
pub trait LanguageExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn file_extensions(&self) -> &[&'static str];

    /// Grammar used for `path`. Most languages have exactly one.
    fn grammar(&self, path: &Path) -> std::result::Result<&'static Grammar, ParseError>;

    /// Node kinds that add one to a function's cyclomatic complexity.
    fn branch_kinds(&self) -> &[&'static str];

    fn is_exported(&self, name: &str, definition: Node<'_>, source: &[u8]) -> bool;

    fn docstring(&self, definition: Node<'_>, source: &[u8]) -> Option<String> {
        preceding_comment(definition, source)
    }

    /// Type a definition belongs to when the grammar records it on the
    /// definition itself (Go receivers).
    fn owner_name(&self, _definition: Node<'_>, _source: &[u8]) -> Option<String> {
        None
    }

    /// Name of a non-class ancestor that owns the functions below it
    /// (Rust `impl` blocks).
    fn container_name(&self, _ancestor: Node<'_>, _source: &[u8]) -> Option<String> {
        None
    }

    /// Repository-relative paths an import token may refer to, most likely
    /// first. Purely syntactic; an empty list means "always external".
    fn import_candidates(&self, _token: &str, _imported: &[String], _importer: &str) -> Vec<String> {
        Vec::new()
    }
}

pub struct LanguageRegistry {
    languages: HashMap<String, Arc<dyn LanguageExtractor>>,
    extension_map: HashMap<String, String>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            languages: HashMap::new(),
            extension_map: HashMap::new(),
        };

        registry.register(Arc::new(python::PythonExtractor));
        registry.register(Arc::new(rust::RustExtractor));
        registry.register(Arc::new(typescript::TypeScriptExtractor));
        registry.register(Arc::new(typescript::JavaScriptExtractor));
        registry.register(Arc::new(go::GoExtractor));
        registry.register(Arc::new(java::JavaExtractor));

        registry
    }

    pub fn register(&mut self, extractor: Arc<dyn LanguageExtractor>) {
        let name = extractor.name().to_string();
        for ext in extractor.file_extensions() {
            self.extension_map.insert(ext.to_string(), name.clone());
        }
        self.languages.insert(name, extractor);
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn LanguageExtractor>> {
        self.languages.get(name).cloned()
    }

    pub fn get_by_extension(&self, ext: &str) -> Option<Arc<dyn LanguageExtractor>> {
        self.extension_map
            .get(ext)
            .and_then(|name| self.languages.get(name))
            .cloned()
    }

    pub fn get_for_file(&self, path: &Path) -> Option<Arc<dyn LanguageExtractor>> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.get_by_extension(ext))
    }

    /// Narrow the registry to the requested languages, rejecting unknown names.
    pub fn select(&self, names: &[String]) -> Result<LanguageRegistry> {
        let mut selected = LanguageRegistry {
            languages: HashMap::new(),
            extension_map: HashMap::new(),
        };

        for name in names {
            let key = name.trim().to_lowercase();
            let extractor = self
                .get_by_name(&key)
                .ok_or_else(|| CodeGraphError::UnsupportedLanguage(name.clone()))?;
            selected.register(extractor);
        }

        Ok(selected)
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn node_text<'a>(node: Node<'_>, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

/// Contiguous comment block right above a definition, with comment markers
/// stripped. Attributes and decorators between the comment and the
/// definition are skipped.
pub(crate) fn preceding_comment(definition: Node<'_>, source: &[u8]) -> Option<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = definition.prev_sibling();
    let mut expected_row = definition.start_position().row;

    while let Some(node) = current {
        let kind = node.kind();
        if kind == "attribute_item" || kind == "decorator" || kind == "annotation" {
            expected_row = node.start_position().row;
            current = node.prev_sibling();
            continue;
        }
        if !kind.contains("comment") || node.end_position().row + 1 < expected_row {
            break;
        }

        let text = node_text(node, source);
        let mut block: Vec<String> = text.lines().map(strip_comment_marker).collect();
        block.extend(lines);
        lines = block;
        expected_row = node.start_position().row;
        current = node.prev_sibling();
    }

    let joined = lines
        .into_iter()
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    (!joined.is_empty()).then_some(joined)
}

fn strip_comment_marker(line: &str) -> String {
    let trimmed = line.trim();
    let trimmed = trimmed.strip_suffix("*/").unwrap_or(trimmed);
    ["///", "//!", "//", "/**", "/*", "*", "#"]
        .iter()
        .find_map(|marker| trimmed.strip_prefix(marker))
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

/// Directory part of a repository-relative path (`""` at the root).
pub(crate) fn parent_dir(path: &str) -> &str {
    path.rfind('/').map(|i| &path[..i]).unwrap_or("")
}

pub(crate) fn join_path(base: &str, rest: &str) -> String {
    if base.is_empty() {
        rest.to_string()
    } else if rest.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, rest)
    }
}

/// Collapse `.` and `..` segments. Returns `None` when the path escapes the
/// repository root.
pub(crate) fn normalize_path(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

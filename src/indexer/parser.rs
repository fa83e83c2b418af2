use std::path::Path;

use tree_sitter::Node;

use crate::error::ParseError;
use crate::languages::{Grammar, LanguageExtractor};

/// Parses source text with the grammar its extractor picks for the path.
pub struct Parser {
    strict: bool,
}

impl Parser {
    /// With `strict` set, any syntax error in the tree rejects the file.
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    pub fn parse_source(
        &self,
        source: &str,
        path: &str,
        extractor: &dyn LanguageExtractor,
    ) -> Result<ParsedFile, ParseError> {
        let grammar = extractor.grammar(Path::new(path))?;

        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&grammar.language)
            .map_err(|e| ParseError::Grammar {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| ParseError::NoTree {
                path: path.to_string(),
            })?;

        if self.strict {
            if let Some(node) = first_error(tree.root_node()) {
                let position = node.start_position();
                return Err(ParseError::Syntax {
                    path: path.to_string(),
                    line: position.row as u32 + 1,
                    column: position.column as u32,
                });
            }
        }

        Ok(ParsedFile {
            tree,
            source: source.to_string(),
            path: path.to_string(),
            grammar,
        })
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new(true)
    }
}

pub struct ParsedFile {
    pub tree: tree_sitter::Tree,
    pub source: String,
    /// Repository-relative path, `/`-separated.
    pub path: String,
    pub grammar: &'static Grammar,
}

impl ParsedFile {
    pub fn root_node(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn source_bytes(&self) -> &[u8] {
        self.source.as_bytes()
    }

    pub fn node_text(&self, node: &Node) -> &str {
        node.utf8_text(self.source_bytes()).unwrap_or("")
    }

    pub fn line_count(&self) -> u32 {
        self.source.lines().count() as u32
    }
}

/// Earliest ERROR or MISSING node, descending only into subtrees that
/// contain one.
fn first_error(root: Node<'_>) -> Option<Node<'_>> {
    if !root.has_error() {
        return None;
    }

    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        let mut cursor = node.walk();
        let children: Vec<Node> = node
            .children(&mut cursor)
            .filter(|child| child.has_error())
            .collect();
        // reversed so the leftmost child is visited first
        stack.extend(children.into_iter().rev());
    }

    None
}

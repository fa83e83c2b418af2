use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Query, QueryMatch, StreamingIterator};

use crate::error::ParseError;
use crate::indexer::parser::{ParsedFile, Parser};
use crate::languages::LanguageExtractor;

/// A named function or method found in one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionFact {
    pub name: String,
    pub start_line: u32,
    pub end_line: u32,
    pub is_exported: bool,
    pub docstring: Option<String>,
    pub complexity: u32,
    /// Enclosing class/type for methods.
    pub parent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassFact {
    pub name: String,
    pub start_line: u32,
    pub end_line: u32,
    pub base_classes: Vec<String>,
    pub methods: Vec<String>,
    pub docstring: Option<String>,
}

/// Call site inside a named function; the callee is a bare name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFact {
    pub caller: String,
    pub callee: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportFact {
    /// Import target exactly as written (quotes stripped).
    pub token: String,
    pub line: u32,
    pub alias: Option<String>,
    pub imported_names: Vec<String>,
    /// Repository-relative files the token may refer to, best first.
    pub candidates: Vec<String>,
}

/// Everything one file contributes to the graph. Pure data: producing it
/// touches nothing shared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub path: String,
    pub language: String,
    pub line_count: u32,
    pub functions: Vec<FunctionFact>,
    pub classes: Vec<ClassFact>,
    pub calls: Vec<CallFact>,
    pub imports: Vec<ImportFact>,
}

impl dyn LanguageExtractor {
    /// Parse and extract one file. Malformed input yields a `ParseError`
    /// tagged with `path`.
    pub fn extract(&self, content: &str, path: &str) -> Result<ExtractionResult, ParseError> {
        let parsed = Parser::default().parse_source(content, path, self)?;
        Ok(SymbolExtractor::new().extract_all(&parsed, self))
    }
}

pub struct SymbolExtractor;

impl SymbolExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract functions, classes, calls, and imports from a parsed file
    pub fn extract_all(&self, parsed: &ParsedFile, extractor: &dyn LanguageExtractor) -> ExtractionResult {
        let mut result = ExtractionResult {
            path: parsed.path.clone(),
            language: extractor.name().to_string(),
            line_count: parsed.line_count(),
            ..Default::default()
        };

        let class_nodes = self.extract_classes(parsed, extractor, &mut result.classes);
        let function_nodes = self.extract_functions(parsed, extractor, &class_nodes, &mut result);
        self.extract_calls(parsed, &function_nodes, &result.functions, &mut result.calls);
        self.extract_imports(parsed, extractor, &mut result.imports);

        for function in &result.functions {
            let Some(parent) = &function.parent else {
                continue;
            };
            if let Some(class) = result.classes.iter_mut().find(|c| &c.name == parent) {
                if !class.methods.contains(&function.name) {
                    class.methods.push(function.name.clone());
                }
            }
        }

        result
    }

    /// Returns definition node id -> index into `classes`.
    fn extract_classes(
        &self,
        parsed: &ParsedFile,
        extractor: &dyn LanguageExtractor,
        classes: &mut Vec<ClassFact>,
    ) -> HashMap<usize, usize> {
        let query = &parsed.grammar.classes;
        let mut by_node: HashMap<usize, usize> = HashMap::new();

        for_each_match(query, parsed, |m| {
            let Some(node) = capture(query, m, "class") else {
                return;
            };
            let Some(name) = capture(query, m, "name") else {
                return;
            };

            let index = *by_node.entry(node.id()).or_insert_with(|| {
                classes.push(ClassFact {
                    name: parsed.node_text(&name).to_string(),
                    start_line: node.start_position().row as u32 + 1,
                    end_line: node.end_position().row as u32 + 1,
                    base_classes: Vec::new(),
                    methods: Vec::new(),
                    docstring: extractor.docstring(node, parsed.source_bytes()),
                });
                classes.len() - 1
            });

            for base in captures(query, m, "base") {
                let base = parsed.node_text(&base).to_string();
                let class = &mut classes[index];
                if !class.base_classes.contains(&base) {
                    class.base_classes.push(base);
                }
            }
        });

        by_node
    }

    /// Returns definition node id -> index into `result.functions`.
    fn extract_functions(
        &self,
        parsed: &ParsedFile,
        extractor: &dyn LanguageExtractor,
        class_nodes: &HashMap<usize, usize>,
        result: &mut ExtractionResult,
    ) -> HashMap<usize, usize> {
        let query = &parsed.grammar.functions;
        let source = parsed.source_bytes();
        let mut definitions: Vec<(Node, String)> = Vec::new();
        let mut by_node: HashMap<usize, usize> = HashMap::new();

        for_each_match(query, parsed, |m| {
            let (Some(node), Some(name)) = (capture(query, m, "function"), capture(query, m, "name")) else {
                return;
            };
            let name = parsed.node_text(&name);
            if name.is_empty() || by_node.contains_key(&node.id()) {
                return;
            }
            by_node.insert(node.id(), definitions.len());
            definitions.push((node, name.to_string()));
        });

        for (node, name) in definitions {
            let parent = extractor
                .owner_name(node, source)
                .or_else(|| enclosing_owner(node, extractor, source, class_nodes, &by_node, &result.classes));

            result.functions.push(FunctionFact {
                is_exported: extractor.is_exported(&name, node, source),
                docstring: extractor.docstring(node, source),
                complexity: 1 + count_kinds(node, extractor.branch_kinds()),
                start_line: node.start_position().row as u32 + 1,
                end_line: node.end_position().row as u32 + 1,
                parent,
                name,
            });
        }

        by_node
    }

    fn extract_calls(
        &self,
        parsed: &ParsedFile,
        function_nodes: &HashMap<usize, usize>,
        functions: &[FunctionFact],
        calls: &mut Vec<CallFact>,
    ) {
        let query = &parsed.grammar.calls;

        for_each_match(query, parsed, |m| {
            let (Some(call), Some(callee)) = (capture(query, m, "call"), capture(query, m, "callee")) else {
                return;
            };

            // Calls outside any named function have no caller node and are dropped.
            let mut current = call.parent();
            while let Some(node) = current {
                if let Some(&index) = function_nodes.get(&node.id()) {
                    let callee = parsed.node_text(&callee);
                    if !callee.is_empty() {
                        calls.push(CallFact {
                            caller: functions[index].name.clone(),
                            callee: callee.to_string(),
                            line: call.start_position().row as u32 + 1,
                        });
                    }
                    return;
                }
                current = node.parent();
            }
        });
    }

    fn extract_imports(
        &self,
        parsed: &ParsedFile,
        extractor: &dyn LanguageExtractor,
        imports: &mut Vec<ImportFact>,
    ) {
        let query = &parsed.grammar.imports;
        // One fact per (statement, token); several patterns may hit the same statement.
        let mut by_statement: HashMap<(usize, String), usize> = HashMap::new();

        for_each_match(query, parsed, |m| {
            let (Some(statement), Some(path)) = (capture(query, m, "import"), capture(query, m, "path")) else {
                return;
            };
            let token = clean_token(parsed.node_text(&path));
            if token.is_empty() {
                return;
            }

            let index = *by_statement
                .entry((statement.id(), token.clone()))
                .or_insert_with(|| {
                    imports.push(ImportFact {
                        token,
                        line: statement.start_position().row as u32 + 1,
                        alias: None,
                        imported_names: Vec::new(),
                        candidates: Vec::new(),
                    });
                    imports.len() - 1
                });

            let fact = &mut imports[index];
            if let Some(alias) = capture(query, m, "alias") {
                fact.alias = Some(parsed.node_text(&alias).to_string());
            }
            for name in captures(query, m, "imported") {
                let name = parsed.node_text(&name).to_string();
                if !fact.imported_names.contains(&name) {
                    fact.imported_names.push(name);
                }
            }
        });

        for fact in imports.iter_mut() {
            fact.candidates = extractor.import_candidates(&fact.token, &fact.imported_names, &parsed.path);
        }
    }
}

impl Default for SymbolExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn for_each_match<'t>(query: &Query, parsed: &'t ParsedFile, mut f: impl FnMut(&QueryMatch<'_, 't>)) {
    let mut cursor = tree_sitter::QueryCursor::new();
    let mut matches = cursor.matches(query, parsed.root_node(), parsed.source_bytes());
    while let Some(m) = matches.next() {
        f(m);
    }
}

fn capture<'t>(query: &Query, m: &QueryMatch<'_, 't>, name: &str) -> Option<Node<'t>> {
    m.captures
        .iter()
        .find(|c| query.capture_names()[c.index as usize] == name)
        .map(|c| c.node)
}

fn captures<'t>(query: &Query, m: &QueryMatch<'_, 't>, name: &str) -> Vec<Node<'t>> {
    m.captures
        .iter()
        .filter(|c| query.capture_names()[c.index as usize] == name)
        .map(|c| c.node)
        .collect()
}

/// Walks up from a definition to the first class (or language-specific
/// container such as a Rust `impl`). Stops at an enclosing function.
fn enclosing_owner(
    node: Node<'_>,
    extractor: &dyn LanguageExtractor,
    source: &[u8],
    class_nodes: &HashMap<usize, usize>,
    function_nodes: &HashMap<usize, usize>,
    classes: &[ClassFact],
) -> Option<String> {
    let mut current = node.parent();
    while let Some(ancestor) = current {
        if let Some(&index) = class_nodes.get(&ancestor.id()) {
            return Some(classes[index].name.clone());
        }
        if function_nodes.contains_key(&ancestor.id()) {
            return None;
        }
        if let Some(name) = extractor.container_name(ancestor, source) {
            return Some(name);
        }
        current = ancestor.parent();
    }
    None
}

fn count_kinds(node: Node<'_>, kinds: &[&str]) -> u32 {
    let mut count = 0;
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if kinds.contains(&current.kind()) {
            count += 1;
        }
        let mut cursor = current.walk();
        stack.extend(current.named_children(&mut cursor));
    }
    // the definition itself never counts
    if kinds.contains(&node.kind()) {
        count -= 1;
    }
    count
}

fn clean_token(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}

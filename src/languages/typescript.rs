use std::path::Path;

use once_cell::sync::OnceCell;
use tree_sitter::Node;

use super::{
    join_path, node_text, normalize_path, parent_dir, preceding_comment, Grammar, LanguageExtractor,
    QuerySource,
};
use crate::error::ParseError;

/// `.ts` and `.tsx` sources.
pub struct TypeScriptExtractor;

/// Plain JavaScript, parsed with the TSX grammar so JSX is accepted.
pub struct JavaScriptExtractor;

static TYPESCRIPT_GRAMMAR: OnceCell<Grammar> = OnceCell::new();
static TSX_GRAMMAR: OnceCell<Grammar> = OnceCell::new();

const QUERIES: QuerySource = QuerySource {
    functions: r#"
        (function_declaration
            name: (identifier) @name
        ) @function

        (generator_function_declaration
            name: (identifier) @name
        ) @function

        (method_definition
            name: (property_identifier) @name
        ) @function

        (variable_declarator
            name: (identifier) @name
            value: [(arrow_function) (function_expression)]
        ) @function

        (arguments
            (function_expression
                name: (identifier) @name
            ) @function
        )

        (parenthesized_expression
            (function_expression
                name: (identifier) @name
            ) @function
        )

        (assignment_expression
            right: (function_expression
                name: (identifier) @name
            ) @function
        )

        (pair
            value: (function_expression
                name: (identifier) @name
            ) @function
        )

        (return_statement
            (function_expression
                name: (identifier) @name
            ) @function
        )

        (array
            (function_expression
                name: (identifier) @name
            ) @function
        )
        "#,
    classes: r#"
        (class_declaration
            name: (type_identifier) @name
        ) @class

        (class_declaration
            name: (type_identifier) @name
            (class_heritage
                (extends_clause
                    (identifier) @base
                )
            )
        ) @class

        (abstract_class_declaration
            name: (type_identifier) @name
        ) @class

        (interface_declaration
            name: (type_identifier) @name
        ) @class
        "#,
    imports: r#"
        (import_statement
            source: (string) @path
        ) @import

        (import_statement
            (import_clause
                (named_imports
                    (import_specifier
                        name: (identifier) @imported
                    )
                )
            )
            source: (string) @path
        ) @import

        (import_statement
            (import_clause
                (namespace_import
                    (identifier) @alias
                )
            )
            source: (string) @path
        ) @import

        (export_statement
            source: (string) @path
        ) @import

        (call_expression
            function: (identifier) @_require
            arguments: (arguments
                (string) @path
            )
            (#eq? @_require "require")
        ) @import
        "#,
    calls: r#"
        (call_expression
            function: (identifier) @callee
        ) @call

        (call_expression
            function: (member_expression
                property: (property_identifier) @callee
            )
        ) @call
        "#,
};

const RESOLVE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

const BRANCH_KINDS: &[&str] = &[
    "if_statement",
    "for_statement",
    "for_in_statement",
    "while_statement",
    "do_statement",
    "switch_case",
    "catch_clause",
    "ternary_expression",
];

fn tsx_grammar() -> Result<&'static Grammar, ParseError> {
    Grammar::cached(
        &TSX_GRAMMAR,
        "tsx",
        || tree_sitter_typescript::LANGUAGE_TSX.into(),
        &QUERIES,
    )
}

impl LanguageExtractor for TypeScriptExtractor {
    fn name(&self) -> &'static str {
        "typescript"
    }

    fn file_extensions(&self) -> &[&'static str] {
        &["ts", "tsx", "mts", "cts"]
    }

    fn grammar(&self, path: &Path) -> Result<&'static Grammar, ParseError> {
        if path.extension().and_then(|e| e.to_str()) == Some("tsx") {
            return tsx_grammar();
        }
        Grammar::cached(
            &TYPESCRIPT_GRAMMAR,
            "typescript",
            || tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            &QUERIES,
        )
    }

    fn branch_kinds(&self) -> &[&'static str] {
        BRANCH_KINDS
    }

    fn is_exported(&self, name: &str, definition: Node<'_>, source: &[u8]) -> bool {
        is_exported(name, definition, source)
    }

    fn docstring(&self, definition: Node<'_>, source: &[u8]) -> Option<String> {
        preceding_comment(declaration_root(definition), source)
    }

    fn import_candidates(&self, token: &str, _imported: &[String], importer: &str) -> Vec<String> {
        relative_module_candidates(token, importer)
    }
}

impl LanguageExtractor for JavaScriptExtractor {
    fn name(&self) -> &'static str {
        "javascript"
    }

    fn file_extensions(&self) -> &[&'static str] {
        &["js", "jsx", "mjs", "cjs"]
    }

    fn grammar(&self, _path: &Path) -> Result<&'static Grammar, ParseError> {
        tsx_grammar()
    }

    fn branch_kinds(&self) -> &[&'static str] {
        BRANCH_KINDS
    }

    fn is_exported(&self, name: &str, definition: Node<'_>, source: &[u8]) -> bool {
        is_exported(name, definition, source)
    }

    fn docstring(&self, definition: Node<'_>, source: &[u8]) -> Option<String> {
        preceding_comment(declaration_root(definition), source)
    }

    fn import_candidates(&self, token: &str, _imported: &[String], importer: &str) -> Vec<String> {
        relative_module_candidates(token, importer)
    }
}

/// A definition is exported when an `export` statement wraps it, directly
/// or through its declaration/class. Private class members never are.
fn is_exported(name: &str, definition: Node<'_>, source: &[u8]) -> bool {
    if name.starts_with('#') {
        return false;
    }
    let mut cursor = definition.walk();
    let private = definition.children(&mut cursor).any(|child| {
        child.kind() == "accessibility_modifier" && node_text(child, source) != "public"
    });
    if private {
        return false;
    }

    let mut current = definition.parent();
    while let Some(node) = current {
        match node.kind() {
            "export_statement" => return true,
            "lexical_declaration"
            | "variable_declaration"
            | "class_body"
            | "class_declaration"
            | "abstract_class_declaration" => current = node.parent(),
            _ => return false,
        }
    }
    false
}

/// Outermost statement wrapping a definition; JSDoc sits above the
/// `export`/`const` rather than the declarator itself.
fn declaration_root(definition: Node<'_>) -> Node<'_> {
    let mut root = definition;
    while let Some(parent) = root.parent() {
        match parent.kind() {
            "export_statement" | "lexical_declaration" | "variable_declaration" => root = parent,
            _ => break,
        }
    }
    root
}

/// Only relative specifiers can point into the repository; bare package
/// names and path aliases stay external.
fn relative_module_candidates(token: &str, importer: &str) -> Vec<String> {
    let spec = token.trim_matches(|c| c == '"' || c == '\'' || c == '`');
    if !spec.starts_with("./") && !spec.starts_with("../") {
        return Vec::new();
    }

    let Some(target) = normalize_path(&join_path(parent_dir(importer), spec)) else {
        return Vec::new();
    };

    let mut candidates = Vec::new();
    let has_known_ext = target
        .rsplit('.')
        .next()
        .map(|ext| RESOLVE_EXTENSIONS.contains(&ext))
        .unwrap_or(false);
    if has_known_ext {
        candidates.push(target.clone());
    }
    for ext in RESOLVE_EXTENSIONS {
        candidates.push(format!("{}.{}", target, ext));
    }
    for ext in RESOLVE_EXTENSIONS {
        candidates.push(format!("{}/index.{}", target, ext));
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_candidates() {
        let candidates = relative_module_candidates("'./utils'", "src/app.ts");
        assert_eq!(candidates[0], "src/utils.ts");
        assert!(candidates.contains(&"src/utils/index.js".to_string()));

        let parent = relative_module_candidates("\"../lib/math.js\"", "src/app/main.ts");
        assert_eq!(parent[0], "src/lib/math.js");
    }

    #[test]
    fn test_package_import_has_no_candidates() {
        assert!(relative_module_candidates("'react'", "src/app.tsx").is_empty());
        assert!(relative_module_candidates("'@/components/button'", "src/app.tsx").is_empty());
    }

    #[test]
    fn test_grammar_by_extension() {
        let ts = TypeScriptExtractor.grammar(Path::new("a.ts")).unwrap();
        let tsx = TypeScriptExtractor.grammar(Path::new("a.tsx")).unwrap();
        assert_eq!(ts.name, "typescript");
        assert_eq!(tsx.name, "tsx");
        assert_eq!(JavaScriptExtractor.grammar(Path::new("a.js")).unwrap().name, "tsx");
    }
}

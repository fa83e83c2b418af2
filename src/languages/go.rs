use std::path::Path;

use once_cell::sync::OnceCell;
use tree_sitter::Node;

use super::{node_text, Grammar, LanguageExtractor, QuerySource};
use crate::error::ParseError;

pub struct GoExtractor;

static GO_GRAMMAR: OnceCell<Grammar> = OnceCell::new();

const QUERIES: QuerySource = QuerySource {
    functions: r#"
        (function_declaration
            name: (identifier) @name
        ) @function

        (method_declaration
            name: (field_identifier) @name
        ) @function
        "#,
    classes: r#"
        (type_spec
            name: (type_identifier) @name
            type: [(struct_type) (interface_type)]
        ) @class
        "#,
    imports: r#"
        (import_spec
            path: (interpreted_string_literal) @path
        ) @import

        (import_spec
            name: (package_identifier) @alias
            path: (interpreted_string_literal) @path
        ) @import
        "#,
    calls: r#"
        (call_expression
            function: (identifier) @callee
        ) @call

        (call_expression
            function: (selector_expression
                field: (field_identifier) @callee
            )
        ) @call
        "#,
};

impl LanguageExtractor for GoExtractor {
    fn name(&self) -> &'static str {
        "go"
    }

    fn file_extensions(&self) -> &[&'static str] {
        &["go"]
    }

    fn grammar(&self, _path: &Path) -> Result<&'static Grammar, ParseError> {
        Grammar::cached(&GO_GRAMMAR, "go", || tree_sitter_go::LANGUAGE.into(), &QUERIES)
    }

    fn branch_kinds(&self) -> &[&'static str] {
        &[
            "if_statement",
            "for_statement",
            "expression_case",
            "type_case",
            "communication_case",
        ]
    }

    fn is_exported(&self, name: &str, _definition: Node<'_>, _source: &[u8]) -> bool {
        name.chars().next().map(|c| c.is_uppercase()).unwrap_or(false)
    }

    /// Receiver type of a method: `func (s *Server) Run()` -> `Server`.
    fn owner_name(&self, definition: Node<'_>, source: &[u8]) -> Option<String> {
        let receiver = definition.child_by_field_name("receiver")?;
        let text = node_text(receiver, source)
            .trim_matches(|c| c == '(' || c == ')')
            .trim();
        let ty = text.rsplit(char::is_whitespace).next().unwrap_or(text);
        let ty = ty.trim_start_matches('*');
        let ty = ty.split('[').next().unwrap_or(ty);

        (!ty.is_empty()).then(|| ty.to_string())
    }

    // Go imports name packages (directories), never a single file, so the
    // default empty candidate list applies.
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> tree_sitter::Tree {
        let grammar = GoExtractor.grammar(Path::new("main.go")).unwrap();
        let mut parser = tree_sitter::Parser::new();
        parser.set_language(&grammar.language).unwrap();
        parser.parse(source, None).unwrap()
    }

    #[test]
    fn test_is_exported_by_case() {
        let tree = parse("package main");
        let root = tree.root_node();
        assert!(GoExtractor.is_exported("Serve", root, b""));
        assert!(!GoExtractor.is_exported("serve", root, b""));
        assert!(!GoExtractor.is_exported("", root, b""));
    }

    #[test]
    fn test_owner_name_from_receiver() {
        let source = "package main\n\nfunc (s *Server) Run() {}\n";
        let tree = parse(source);
        let root = tree.root_node();
        let mut cursor = root.walk();
        let method = root
            .named_children(&mut cursor)
            .find(|n| n.kind() == "method_declaration")
            .unwrap();

        assert_eq!(
            GoExtractor.owner_name(method, source.as_bytes()).as_deref(),
            Some("Server")
        );
    }

    #[test]
    fn test_imports_never_resolve() {
        assert!(GoExtractor
            .import_candidates("\"github.com/acme/app/util\"", &[], "main.go")
            .is_empty());
    }
}

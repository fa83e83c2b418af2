use std::path::Path;

use once_cell::sync::OnceCell;
use tree_sitter::Node;

use super::{node_text, Grammar, LanguageExtractor, QuerySource};
use crate::error::ParseError;

pub struct JavaExtractor;

static JAVA_GRAMMAR: OnceCell<Grammar> = OnceCell::new();

const QUERIES: QuerySource = QuerySource {
    functions: r#"
        (method_declaration
            name: (identifier) @name
        ) @function

        (constructor_declaration
            name: (identifier) @name
        ) @function
        "#,
    classes: r#"
        (class_declaration
            name: (identifier) @name
        ) @class

        (class_declaration
            name: (identifier) @name
            superclass: (superclass
                (type_identifier) @base
            )
        ) @class

        (class_declaration
            name: (identifier) @name
            interfaces: (super_interfaces
                (type_list
                    (type_identifier) @base
                )
            )
        ) @class

        (interface_declaration
            name: (identifier) @name
        ) @class

        (enum_declaration
            name: (identifier) @name
        ) @class

        (record_declaration
            name: (identifier) @name
        ) @class
        "#,
    imports: r#"
        (import_declaration
            [(scoped_identifier) (identifier)] @path
        ) @import
        "#,
    calls: r#"
        (method_invocation
            name: (identifier) @callee
        ) @call
        "#,
};

/// Source roots tried for fully-qualified imports.
const SOURCE_ROOTS: &[&str] = &["", "src/main/java/", "src/"];

impl LanguageExtractor for JavaExtractor {
    fn name(&self) -> &'static str {
        "java"
    }

    fn file_extensions(&self) -> &[&'static str] {
        &["java"]
    }

    fn grammar(&self, _path: &Path) -> Result<&'static Grammar, ParseError> {
        Grammar::cached(&JAVA_GRAMMAR, "java", || tree_sitter_java::LANGUAGE.into(), &QUERIES)
    }

    fn branch_kinds(&self) -> &[&'static str] {
        &[
            "if_statement",
            "for_statement",
            "enhanced_for_statement",
            "while_statement",
            "do_statement",
            "catch_clause",
            "switch_label",
            "ternary_expression",
        ]
    }

    fn is_exported(&self, _name: &str, definition: Node<'_>, source: &[u8]) -> bool {
        let mut cursor = definition.walk();
        let public = definition.children(&mut cursor).any(|child| {
            child.kind() == "modifiers"
                && node_text(child, source)
                    .split_whitespace()
                    .any(|m| m == "public")
        });
        public
    }

    /// `com.acme.Widget` -> `com/acme/Widget.java` under the usual source
    /// roots. Static member imports also try the enclosing class.
    fn import_candidates(&self, token: &str, _imported: &[String], _importer: &str) -> Vec<String> {
        let segments: Vec<&str> = token
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty() && *s != "*")
            .collect();
        if segments.is_empty() {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        let shortest = segments.len().saturating_sub(1).max(1);
        for len in (shortest..=segments.len()).rev() {
            let relative = segments[..len].join("/");
            for root in SOURCE_ROOTS {
                candidates.push(format!("{}{}.java", root, relative));
            }
        }
        candidates
    }
}

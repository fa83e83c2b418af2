use std::path::Path;

use once_cell::sync::OnceCell;
use tree_sitter::Node;

use super::{join_path, node_text, normalize_path, parent_dir, Grammar, LanguageExtractor, QuerySource};
use crate::error::ParseError;

pub struct PythonExtractor;

static PYTHON_GRAMMAR: OnceCell<Grammar> = OnceCell::new();

const QUERIES: QuerySource = QuerySource {
    functions: r#"
        (function_definition
            name: (identifier) @name
        ) @function
        "#,
    classes: r#"
        (class_definition
            name: (identifier) @name
        ) @class

        (class_definition
            name: (identifier) @name
            superclasses: (argument_list
                [(identifier) (attribute)] @base
            )
        ) @class
        "#,
    imports: r#"
        (import_statement
            name: (dotted_name) @path
        ) @import

        (import_statement
            name: (aliased_import
                name: (dotted_name) @path
                alias: (identifier) @alias
            )
        ) @import

        (import_from_statement
            module_name: (_) @path
        ) @import

        (import_from_statement
            module_name: (_) @path
            name: (dotted_name) @imported
        ) @import

        (import_from_statement
            module_name: (_) @path
            name: (aliased_import
                name: (dotted_name) @imported
                alias: (identifier) @alias
            )
        ) @import
        "#,
    calls: r#"
        (call
            function: (identifier) @callee
        ) @call

        (call
            function: (attribute
                attribute: (identifier) @callee
            )
        ) @call
        "#,
};

impl LanguageExtractor for PythonExtractor {
    fn name(&self) -> &'static str {
        "python"
    }

    fn file_extensions(&self) -> &[&'static str] {
        &["py", "pyi"]
    }

    fn grammar(&self, _path: &Path) -> Result<&'static Grammar, ParseError> {
        Grammar::cached(
            &PYTHON_GRAMMAR,
            "python",
            || tree_sitter_python::LANGUAGE.into(),
            &QUERIES,
        )
    }

    fn branch_kinds(&self) -> &[&'static str] {
        &[
            "if_statement",
            "elif_clause",
            "for_statement",
            "while_statement",
            "try_statement",
            "except_clause",
            "conditional_expression",
            "boolean_operator",
            "case_clause",
        ]
    }

    fn is_exported(&self, name: &str, _definition: Node<'_>, _source: &[u8]) -> bool {
        !name.starts_with('_')
    }

    /// First string statement of the body.
    fn docstring(&self, definition: Node<'_>, source: &[u8]) -> Option<String> {
        let body = definition.child_by_field_name("body")?;
        let mut cursor = body.walk();
        let first = body.named_children(&mut cursor).next()?;
        if first.kind() != "expression_statement" {
            return None;
        }

        let mut inner = first.walk();
        let string = first.named_children(&mut inner).next()?;
        if string.kind() != "string" {
            return None;
        }

        let mut parts = string.walk();
        let content: String = string
            .named_children(&mut parts)
            .filter(|n| n.kind() == "string_content")
            .map(|n| node_text(n, source))
            .collect();

        let text = if content.is_empty() {
            strip_quotes(node_text(string, source)).to_string()
        } else {
            content
        };
        let text = text.trim();

        (!text.is_empty()).then(|| text.to_string())
    }

    fn import_candidates(&self, token: &str, imported: &[String], importer: &str) -> Vec<String> {
        let dots = token.chars().take_while(|c| *c == '.').count();
        let module = token[dots..].replace('.', "/");

        let bases: Vec<String> = if dots > 0 {
            let mut dir = parent_dir(importer).to_string();
            for _ in 1..dots {
                dir = parent_dir(&dir).to_string();
            }
            vec![dir]
        } else {
            vec![
                String::new(),
                parent_dir(importer).to_string(),
                "src".to_string(),
            ]
        };

        let mut candidates = Vec::new();
        for base in &bases {
            if module.is_empty() {
                for name in imported {
                    candidates.push(join_path(base, &format!("{}.py", name.replace('.', "/"))));
                }
                candidates.push(join_path(base, "__init__.py"));
            } else {
                let target = join_path(base, &module);
                candidates.push(format!("{}.py", target));
                candidates.push(format!("{}/__init__.py", target));
            }
        }

        let mut seen = std::collections::HashSet::new();
        candidates
            .into_iter()
            .filter_map(|c| normalize_path(&c))
            .filter(|c| seen.insert(c.clone()))
            .collect()
    }
}

fn strip_quotes(text: &str) -> &str {
    let text = text.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if let Some(inner) = text.strip_prefix(quote).and_then(|t| t.strip_suffix(quote)) {
            return inner;
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_exported() {
        let source = b"def f(): pass";
        let grammar = PythonExtractor.grammar(Path::new("a.py")).unwrap();
        let mut parser = tree_sitter::Parser::new();
        parser.set_language(&grammar.language).unwrap();
        let tree = parser.parse(source, None).unwrap();
        let root = tree.root_node();

        assert!(PythonExtractor.is_exported("public_function", root, source));
        assert!(!PythonExtractor.is_exported("_private_function", root, source));
        assert!(!PythonExtractor.is_exported("__init__", root, source));
    }

    #[test]
    fn test_absolute_import_candidates() {
        let candidates = PythonExtractor.import_candidates("pkg.utils", &[], "app/main.py");
        assert_eq!(candidates[0], "pkg/utils.py");
        assert_eq!(candidates[1], "pkg/utils/__init__.py");
        assert!(candidates.contains(&"app/pkg/utils.py".to_string()));
        assert!(candidates.contains(&"src/pkg/utils.py".to_string()));
    }

    #[test]
    fn test_relative_import_candidates() {
        let candidates = PythonExtractor.import_candidates(".helpers", &[], "app/api/views.py");
        assert_eq!(candidates, vec!["app/api/helpers.py", "app/api/helpers/__init__.py"]);

        let parent = PythonExtractor.import_candidates("..core", &[], "app/api/views.py");
        assert_eq!(parent[0], "app/core.py");
    }

    #[test]
    fn test_bare_relative_import_uses_names() {
        let candidates = PythonExtractor.import_candidates(
            ".",
            &["models".to_string()],
            "app/views.py",
        );
        assert_eq!(candidates, vec!["app/models.py", "app/__init__.py"]);
    }

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("\"\"\"Doc.\"\"\""), "Doc.");
        assert_eq!(strip_quotes("'x'"), "x");
        assert_eq!(strip_quotes("r\"raw\""), "raw");
    }
}

use std::path::Path;

use once_cell::sync::OnceCell;
use tree_sitter::Node;

use super::{join_path, node_text, normalize_path, parent_dir, Grammar, LanguageExtractor, QuerySource};
use crate::error::ParseError;

pub struct RustExtractor;

static RUST_GRAMMAR: OnceCell<Grammar> = OnceCell::new();

const QUERIES: QuerySource = QuerySource {
    functions: r#"
        (function_item
            name: (identifier) @name
        ) @function
        "#,
    classes: r#"
        (struct_item
            name: (type_identifier) @name
        ) @class

        (enum_item
            name: (type_identifier) @name
        ) @class

        (trait_item
            name: (type_identifier) @name
        ) @class

        (trait_item
            name: (type_identifier) @name
            bounds: (trait_bounds
                (type_identifier) @base
            )
        ) @class
        "#,
    imports: r#"
        (use_declaration
            argument: [
                (identifier)
                (scoped_identifier)
                (scoped_use_list)
                (use_list)
                (use_wildcard)
            ] @path
        ) @import

        (use_declaration
            argument: (use_as_clause
                path: (_) @path
                alias: (identifier) @alias
            )
        ) @import

        (extern_crate_declaration
            name: (identifier) @path
        ) @import

        (mod_item
            name: (identifier) @path
            !body
        ) @import
        "#,
    calls: r#"
        (call_expression
            function: (identifier) @callee
        ) @call

        (call_expression
            function: (field_expression
                field: (field_identifier) @callee
            )
        ) @call

        (call_expression
            function: (scoped_identifier
                name: (identifier) @callee
            )
        ) @call
        "#,
};

impl LanguageExtractor for RustExtractor {
    fn name(&self) -> &'static str {
        "rust"
    }

    fn file_extensions(&self) -> &[&'static str] {
        &["rs"]
    }

    fn grammar(&self, _path: &Path) -> Result<&'static Grammar, ParseError> {
        Grammar::cached(&RUST_GRAMMAR, "rust", || tree_sitter_rust::LANGUAGE.into(), &QUERIES)
    }

    fn branch_kinds(&self) -> &[&'static str] {
        &[
            "if_expression",
            "match_arm",
            "while_expression",
            "for_expression",
            "loop_expression",
        ]
    }

    fn is_exported(&self, _name: &str, definition: Node<'_>, _source: &[u8]) -> bool {
        let mut cursor = definition.walk();
        let exported = definition
            .children(&mut cursor)
            .any(|child| child.kind() == "visibility_modifier");
        exported
    }

    fn container_name(&self, ancestor: Node<'_>, source: &[u8]) -> Option<String> {
        if ancestor.kind() != "impl_item" {
            return None;
        }
        let ty = ancestor.child_by_field_name("type")?;
        let text = node_text(ty, source);
        // `Foo<T>` -> `Foo`
        let name = text.split('<').next().unwrap_or(text).trim();
        (!name.is_empty()).then(|| name.to_string())
    }

    fn import_candidates(&self, token: &str, _imported: &[String], importer: &str) -> Vec<String> {
        let path = token.split("::{").next().unwrap_or(token).trim();
        let segments: Vec<&str> = path
            .split("::")
            .filter(|s| !s.is_empty() && *s != "*")
            .collect();
        let Some((first, rest)) = segments.split_first() else {
            return Vec::new();
        };

        let module_dir = module_dir(importer);
        let (base, rest): (String, &[&str]) = match *first {
            "crate" => ("src".to_string(), rest),
            "self" => (module_dir, rest),
            "super" => (parent_dir(&module_dir).to_string(), rest),
            // `mod foo;` or a sibling module
            _ if rest.is_empty() => (module_dir, &segments[..]),
            _ => return Vec::new(),
        };

        let mut candidates = Vec::new();
        for len in (1..=rest.len()).rev() {
            let target = join_path(&base, &rest[..len].join("/"));
            candidates.push(format!("{}.rs", target));
            candidates.push(format!("{}/mod.rs", target));
        }

        candidates
            .into_iter()
            .filter_map(|c| normalize_path(&c))
            .collect()
    }
}

/// Directory holding the child modules of `importer`.
fn module_dir(importer: &str) -> String {
    let dir = parent_dir(importer);
    let file = importer.rsplit('/').next().unwrap_or(importer);
    let stem = file.strip_suffix(".rs").unwrap_or(file);

    match stem {
        "lib" | "main" | "mod" => dir.to_string(),
        _ => join_path(dir, stem),
    }
}

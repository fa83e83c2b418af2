use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{CodeGraphError, Result};
use crate::graph::index::GraphIndex;
use crate::graph::models::{ContextEntry, FunctionContext, FunctionId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextOptions {
    pub include_callers: bool,
    pub include_callees: bool,
    pub max_depth: u32,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            include_callers: true,
            include_callees: true,
            max_depth: 3,
        }
    }
}

/// Bounded caller/callee neighbourhood of a function.
pub struct ContextResolver<'a> {
    index: &'a GraphIndex,
}

impl<'a> ContextResolver<'a> {
    pub fn new(index: &'a GraphIndex) -> Self {
        Self { index }
    }

    pub fn get_function_context(&self, name: &str, options: &ContextOptions) -> Result<FunctionContext> {
        let target = self
            .index
            .lookup_function(name)
            .ok_or_else(|| CodeGraphError::FunctionNotFound(name.to_string()))?;
        let function = self
            .index
            .function(target)
            .cloned()
            .ok_or_else(|| CodeGraphError::FunctionNotFound(name.to_string()))?;

        let mut recursive = false;

        let callers = if options.include_callers {
            let (entries, cycle) = self.traverse(target, options.max_depth, |id| self.index.callers_of(id));
            recursive |= cycle;
            entries
        } else {
            Vec::new()
        };

        let callees = if options.include_callees {
            let (entries, cycle) = self.traverse(target, options.max_depth, |id| self.index.callees_of(id));
            recursive |= cycle;
            entries
        } else {
            Vec::new()
        };

        Ok(FunctionContext {
            function,
            callers,
            callees,
            recursive,
        })
    }

    /// Breadth-first search from `start`, at most `max_depth` hops. Each
    /// function is reported once, at the hop it was first reached; within a
    /// hop entries are ordered by (file, name). The second value reports
    /// whether `start` was reached again.
    fn traverse(
        &self,
        start: FunctionId,
        max_depth: u32,
        neighbours: impl Fn(FunctionId) -> Vec<FunctionId>,
    ) -> (Vec<ContextEntry>, bool) {
        let mut visited: HashSet<FunctionId> = HashSet::from([start]);
        let mut frontier = vec![start];
        let mut entries = Vec::new();
        let mut reached_start = false;

        for depth in 1..=max_depth {
            let mut level: Vec<ContextEntry> = Vec::new();
            let mut next = Vec::new();

            for id in frontier {
                for neighbour in neighbours(id) {
                    if neighbour == start {
                        reached_start = true;
                        continue;
                    }
                    if !visited.insert(neighbour) {
                        continue;
                    }
                    if let Some(node) = self.index.function(neighbour) {
                        level.push(ContextEntry {
                            name: node.name.clone(),
                            file: node.file.clone(),
                            line: node.start_line,
                            depth,
                        });
                        next.push(neighbour);
                    }
                }
            }

            level.sort_by(|a, b| (&a.file, &a.name).cmp(&(&b.file, &b.name)));
            entries.extend(level);

            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        (entries, reached_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::extractor::{CallFact, FunctionFact};

    fn build(file: &str, functions: &[&str], calls: &[(&str, &str)]) -> GraphIndex {
        let mut index = GraphIndex::new();
        index.add_file(file, "python", 100);
        for (i, name) in functions.iter().enumerate() {
            let fact = FunctionFact {
                name: name.to_string(),
                start_line: (i as u32) * 10 + 1,
                end_line: (i as u32) * 10 + 5,
                is_exported: true,
                docstring: None,
                complexity: 1,
                parent: None,
            };
            index.add_function(file, &fact).unwrap();
        }
        for (i, (caller, callee)) in calls.iter().enumerate() {
            let fact = CallFact {
                caller: caller.to_string(),
                callee: callee.to_string(),
                line: i as u32 + 1,
            };
            index.add_call_edge(file, &fact).unwrap();
        }
        index
    }

    fn names(entries: &[ContextEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    fn with_depth(max_depth: u32) -> ContextOptions {
        ContextOptions {
            max_depth,
            ..Default::default()
        }
    }

    #[test]
    fn test_direct_neighbours() {
        let index = build("main.py", &["main", "helper"], &[("main", "helper")]);
        let resolver = ContextResolver::new(&index);

        let main = resolver.get_function_context("main", &ContextOptions::default()).unwrap();
        assert_eq!(names(&main.callees), vec!["helper"]);
        assert!(main.callers.is_empty());
        assert_eq!(main.callees[0].file, "main.py");
        assert_eq!(main.callees[0].line, 11);
        assert_eq!(main.callees[0].depth, 1);

        let helper = resolver.get_function_context("helper", &ContextOptions::default()).unwrap();
        assert_eq!(names(&helper.callers), vec!["main"]);
        assert!(helper.callees.is_empty());
        assert!(!helper.recursive);
    }

    #[test]
    fn test_mutual_recursion_terminates() {
        let index = build("r.py", &["a", "b"], &[("a", "b"), ("b", "a")]);
        let resolver = ContextResolver::new(&index);

        let context = resolver.get_function_context("a", &with_depth(5)).unwrap();
        assert_eq!(context.function.name, "a");
        assert_eq!(names(&context.callees), vec!["b"]);
        assert_eq!(names(&context.callers), vec!["b"]);
        assert!(context.recursive);
    }

    #[test]
    fn test_depth_limit_on_chain() {
        let index = build(
            "chain.py",
            &["f1", "f2", "f3", "f4", "f5"],
            &[("f1", "f2"), ("f2", "f3"), ("f3", "f4"), ("f4", "f5")],
        );
        let resolver = ContextResolver::new(&index);

        let context = resolver.get_function_context("f1", &with_depth(2)).unwrap();
        assert_eq!(names(&context.callees), vec!["f2", "f3"]);
        assert_eq!(context.callees[1].depth, 2);

        let tail = resolver.get_function_context("f5", &with_depth(10)).unwrap();
        assert_eq!(names(&tail.callers), vec!["f4", "f3", "f2", "f1"]);
    }

    #[test]
    fn test_zero_depth_returns_only_target() {
        let index = build("main.py", &["main", "helper"], &[("main", "helper")]);
        let resolver = ContextResolver::new(&index);

        let context = resolver.get_function_context("main", &with_depth(0)).unwrap();
        assert_eq!(context.function.name, "main");
        assert!(context.callers.is_empty());
        assert!(context.callees.is_empty());
    }

    #[test]
    fn test_diamond_reports_each_function_once() {
        let index = build(
            "d.py",
            &["top", "left", "right", "bottom"],
            &[("top", "right"), ("top", "left"), ("left", "bottom"), ("right", "bottom")],
        );
        let resolver = ContextResolver::new(&index);

        let context = resolver.get_function_context("top", &ContextOptions::default()).unwrap();
        assert_eq!(names(&context.callees), vec!["left", "right", "bottom"]);
    }

    #[test]
    fn test_direction_flags() {
        let index = build("m.py", &["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let resolver = ContextResolver::new(&index);
        let options = ContextOptions {
            include_callers: false,
            ..Default::default()
        };

        let context = resolver.get_function_context("b", &options).unwrap();
        assert!(context.callers.is_empty());
        assert_eq!(names(&context.callees), vec!["c"]);
    }

    #[test]
    fn test_unknown_function() {
        let index = build("m.py", &["a"], &[]);
        let err = ContextResolver::new(&index)
            .get_function_context("missing", &ContextOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, CodeGraphError::FunctionNotFound(ref n) if n == "missing"));
    }
}

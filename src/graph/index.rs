use std::collections::{HashMap, HashSet};

use crate::error::{CodeGraphError, Result};
use crate::graph::models::{
    CallEdge, CallTarget, ClassId, ClassNode, FileId, FunctionId, FunctionNode, GraphStats,
    ImportEdge, RelationshipType, SourceFile,
};
use crate::indexer::extractor::{CallFact, ClassFact, FunctionFact, ImportFact};

type LinkCounts = HashMap<FileId, HashMap<FileId, usize>>;

/// Nodes and edges of one analysis run.
///
/// Writes are idempotent upserts keyed by (file, name) for nodes and by
/// (source, token/callee, line) for edges. Every read the query layer uses
/// is answered from a maintained adjacency map.
#[derive(Debug, Default)]
pub struct GraphIndex {
    files: Vec<SourceFile>,
    file_ids: HashMap<String, FileId>,

    functions: Vec<FunctionNode>,
    function_files: Vec<FileId>,
    function_ids: HashMap<(FileId, String), FunctionId>,
    /// Ids per name, least recently indexed first.
    by_name: HashMap<String, Vec<FunctionId>>,

    classes: Vec<ClassNode>,
    class_ids: HashMap<(FileId, String), ClassId>,

    calls: Vec<CallEdge>,
    call_keys: HashSet<(FunctionId, String, u32)>,
    calls_from: HashMap<FunctionId, Vec<usize>>,
    calls_to: HashMap<FunctionId, Vec<usize>>,

    imports: Vec<ImportEdge>,
    import_keys: HashSet<(FileId, String, u32)>,
    imports_from: HashMap<FileId, Vec<usize>>,
    imports_resolved: usize,

    import_links_out: LinkCounts,
    import_links_in: LinkCounts,
    call_links_out: LinkCounts,
    call_links_in: LinkCounts,
}

impl GraphIndex {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- writes ----

    pub fn add_file(&mut self, path: &str, language: &str, line_count: u32) -> FileId {
        let file = SourceFile {
            path: path.to_string(),
            language: language.to_string(),
            indexed: true,
            line_count,
        };
        match self.file_ids.get(path) {
            Some(&id) => {
                self.files[id.0] = file;
                id
            }
            None => {
                let id = FileId(self.files.len());
                self.files.push(file);
                self.file_ids.insert(path.to_string(), id);
                id
            }
        }
    }

    /// Upsert a function; an existing (file, name) entry is replaced in
    /// place and becomes the most recently indexed match for its name.
    pub fn add_function(&mut self, file: &str, fact: &FunctionFact) -> Result<FunctionId> {
        let file_id = self.require_file(file)?;
        let node = FunctionNode {
            name: fact.name.clone(),
            file: file.to_string(),
            start_line: fact.start_line,
            end_line: fact.end_line,
            is_exported: fact.is_exported,
            docstring: fact.docstring.clone(),
            complexity: fact.complexity,
            parent: fact.parent.clone(),
        };

        let key = (file_id, fact.name.clone());
        let id = match self.function_ids.get(&key) {
            Some(&id) => {
                self.functions[id.0] = node;
                id
            }
            None => {
                let id = FunctionId(self.functions.len());
                self.functions.push(node);
                self.function_files.push(file_id);
                self.function_ids.insert(key, id);
                id
            }
        };

        let ids = self.by_name.entry(fact.name.clone()).or_default();
        ids.retain(|existing| *existing != id);
        ids.push(id);

        Ok(id)
    }

    pub fn add_class(&mut self, file: &str, fact: &ClassFact) -> Result<ClassId> {
        let file_id = self.require_file(file)?;
        let node = ClassNode {
            name: fact.name.clone(),
            file: file.to_string(),
            start_line: fact.start_line,
            end_line: fact.end_line,
            base_classes: fact.base_classes.clone(),
            methods: fact.methods.clone(),
            docstring: fact.docstring.clone(),
        };

        let key = (file_id, fact.name.clone());
        let id = match self.class_ids.get(&key) {
            Some(&id) => {
                self.classes[id.0] = node;
                id
            }
            None => {
                let id = ClassId(self.classes.len());
                self.classes.push(node);
                self.class_ids.insert(key, id);
                id
            }
        };
        Ok(id)
    }

    /// Add a call from `file`'s function `fact.caller`. The caller must
    /// already be indexed. Returns false for a duplicate edge.
    pub fn add_call_edge(&mut self, file: &str, fact: &CallFact) -> Result<bool> {
        let file_id = self.require_file(file)?;
        let caller = self
            .function_ids
            .get(&(file_id, fact.caller.clone()))
            .copied()
            .ok_or_else(|| CodeGraphError::MissingEndpoint(format!("{}::{}", file, fact.caller)))?;

        if !self.call_keys.insert((caller, fact.callee.clone(), fact.line)) {
            return Ok(false);
        }

        let target = self.resolve_callee(file_id, &fact.callee);
        let index = self.calls.len();
        self.calls_from.entry(caller).or_default().push(index);
        if let Some(callee) = target.function() {
            self.calls_to.entry(callee).or_default().push(index);
            let callee_file = self.function_files[callee.0];
            bump(&mut self.call_links_out, file_id, callee_file);
            bump(&mut self.call_links_in, callee_file, file_id);
        }

        self.calls.push(CallEdge {
            caller,
            callee: fact.callee.clone(),
            line: fact.line,
            target,
        });
        Ok(true)
    }

    /// Add an import of `file`. The target is the first candidate path that
    /// is part of this index. Returns false for a duplicate edge.
    pub fn add_import_edge(&mut self, file: &str, fact: &ImportFact) -> Result<bool> {
        let file_id = self.require_file(file)?;
        if !self.import_keys.insert((file_id, fact.token.clone(), fact.line)) {
            return Ok(false);
        }

        let target = fact
            .candidates
            .iter()
            .find_map(|candidate| self.file_ids.get(candidate).copied());
        if let Some(target) = target {
            self.imports_resolved += 1;
            bump(&mut self.import_links_out, file_id, target);
            bump(&mut self.import_links_in, target, file_id);
        }

        self.imports_from.entry(file_id).or_default().push(self.imports.len());
        self.imports.push(ImportEdge {
            file: file_id,
            token: fact.token.clone(),
            line: fact.line,
            alias: fact.alias.clone(),
            imported_names: fact.imported_names.clone(),
            target,
        });
        Ok(true)
    }

    /// Name-only resolution: a same-file definition wins, then a unique
    /// definition elsewhere, then the first-indexed of several.
    fn resolve_callee(&self, caller_file: FileId, name: &str) -> CallTarget {
        if let Some(&id) = self.function_ids.get(&(caller_file, name.to_string())) {
            return CallTarget::Resolved { function: id };
        }

        let Some(ids) = self.by_name.get(name) else {
            return CallTarget::External;
        };
        let mut candidates = ids.clone();
        candidates.sort();

        match candidates.as_slice() {
            [] => CallTarget::External,
            [only] => CallTarget::Resolved { function: *only },
            [first, ..] => CallTarget::Ambiguous {
                chosen: *first,
                candidates: candidates.clone(),
            },
        }
    }

    fn require_file(&self, path: &str) -> Result<FileId> {
        self.file_ids
            .get(path)
            .copied()
            .ok_or_else(|| CodeGraphError::MissingEndpoint(path.to_string()))
    }

    // ---- reads ----

    /// Most recently indexed function with this name.
    pub fn lookup_function(&self, name: &str) -> Option<FunctionId> {
        self.by_name.get(name).and_then(|ids| ids.last()).copied()
    }

    pub fn function(&self, id: FunctionId) -> Option<&FunctionNode> {
        self.functions.get(id.0)
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionNode> {
        self.functions.iter()
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassNode> {
        self.classes.iter()
    }

    pub fn file(&self, path: &str) -> Option<&SourceFile> {
        self.file_ids.get(path).map(|id| &self.files[id.0])
    }

    pub fn file_id(&self, path: &str) -> Option<FileId> {
        self.file_ids.get(path).copied()
    }

    pub fn file_path(&self, id: FileId) -> Option<&str> {
        self.files.get(id.0).map(|f| f.path.as_str())
    }

    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.iter()
    }

    /// Outgoing call edges of a function, external ones included.
    pub fn call_edges_from(&self, id: FunctionId) -> impl Iterator<Item = &CallEdge> {
        self.calls_from
            .get(&id)
            .into_iter()
            .flatten()
            .map(|&index| &self.calls[index])
    }

    /// Distinct functions `id` calls, in call-site order. External callees
    /// are not included.
    pub fn callees_of(&self, id: FunctionId) -> Vec<FunctionId> {
        let mut seen = HashSet::new();
        self.call_edges_from(id)
            .filter_map(|edge| edge.target.function())
            .filter(|callee| seen.insert(*callee))
            .collect()
    }

    /// Distinct functions that call `id`.
    pub fn callers_of(&self, id: FunctionId) -> Vec<FunctionId> {
        let mut seen = HashSet::new();
        self.calls_to
            .get(&id)
            .into_iter()
            .flatten()
            .map(|&index| self.calls[index].caller)
            .filter(|caller| seen.insert(*caller))
            .collect()
    }

    pub fn imports_of(&self, file: FileId) -> impl Iterator<Item = &ImportEdge> {
        self.imports_from
            .get(&file)
            .into_iter()
            .flatten()
            .map(|&index| &self.imports[index])
    }

    /// Number of `relationship` edges from `file_a` toward `file_b`.
    pub fn edge_count(&self, file_a: FileId, file_b: FileId, relationship: RelationshipType) -> usize {
        let (links, from, to) = match relationship {
            RelationshipType::Imports => (&self.import_links_out, file_a, file_b),
            RelationshipType::ImportedBy => (&self.import_links_out, file_b, file_a),
            RelationshipType::Calls => (&self.call_links_out, file_a, file_b),
            RelationshipType::CalledBy => (&self.call_links_out, file_b, file_a),
        };
        links
            .get(&from)
            .and_then(|targets| targets.get(&to))
            .copied()
            .unwrap_or(0)
    }

    /// Files linked to `file` by `relationship`, with their edge counts.
    pub fn linked_files(
        &self,
        file: FileId,
        relationship: RelationshipType,
    ) -> impl Iterator<Item = (FileId, usize)> + '_ {
        let links = match relationship {
            RelationshipType::Imports => &self.import_links_out,
            RelationshipType::ImportedBy => &self.import_links_in,
            RelationshipType::Calls => &self.call_links_out,
            RelationshipType::CalledBy => &self.call_links_in,
        };
        links
            .get(&file)
            .into_iter()
            .flatten()
            .map(|(other, count)| (*other, *count))
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            files: self.files.len(),
            functions: self.functions.len(),
            classes: self.classes.len(),
            calls: self.calls.len(),
            calls_unresolved: self.calls.iter().filter(|c| c.target.is_external()).count(),
            imports: self.imports.len(),
            imports_resolved: self.imports_resolved,
        }
    }
}

fn bump(links: &mut LinkCounts, from: FileId, to: FileId) {
    *links.entry(from).or_default().entry(to).or_insert(0) += 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function(name: &str, line: u32) -> FunctionFact {
        FunctionFact {
            name: name.to_string(),
            start_line: line,
            end_line: line + 1,
            is_exported: true,
            docstring: None,
            complexity: 1,
            parent: None,
        }
    }

    fn call(caller: &str, callee: &str, line: u32) -> CallFact {
        CallFact {
            caller: caller.to_string(),
            callee: callee.to_string(),
            line,
        }
    }

    fn import(token: &str, line: u32, candidates: &[&str]) -> ImportFact {
        ImportFact {
            token: token.to_string(),
            line,
            alias: None,
            imported_names: Vec::new(),
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_add_function_overwrites_duplicates() {
        let mut index = GraphIndex::new();
        index.add_file("a.py", "python", 10);

        let first = index.add_function("a.py", &function("run", 1)).unwrap();
        let second = index.add_function("a.py", &function("run", 5)).unwrap();

        assert_eq!(first, second);
        assert_eq!(index.stats().functions, 1);
        assert_eq!(index.function(first).unwrap().start_line, 5);
    }

    #[test]
    fn test_add_file_is_idempotent() {
        let mut index = GraphIndex::new();
        let a = index.add_file("a.py", "python", 1);
        let again = index.add_file("a.py", "python", 3);
        assert_eq!(a, again);
        assert_eq!(index.stats().files, 1);
        assert_eq!(index.file("a.py").unwrap().line_count, 3);
    }

    #[test]
    fn test_function_requires_file() {
        let mut index = GraphIndex::new();
        let err = index.add_function("missing.py", &function("f", 1)).err().unwrap();
        assert!(matches!(err, CodeGraphError::MissingEndpoint(_)));
    }

    #[test]
    fn test_call_edge_requires_caller() {
        let mut index = GraphIndex::new();
        index.add_file("a.py", "python", 1);
        let err = index.add_call_edge("a.py", &call("ghost", "f", 1)).err().unwrap();
        assert!(matches!(err, CodeGraphError::MissingEndpoint(_)));
        assert_eq!(index.stats().calls, 0);
    }

    #[test]
    fn test_lookup_prefers_most_recent() {
        let mut index = GraphIndex::new();
        index.add_file("a.py", "python", 1);
        index.add_file("b.py", "python", 1);
        let a = index.add_function("a.py", &function("util", 1)).unwrap();
        let b = index.add_function("b.py", &function("util", 1)).unwrap();
        assert_eq!(index.lookup_function("util"), Some(b));

        index.add_function("a.py", &function("util", 2)).unwrap();
        assert_eq!(index.lookup_function("util"), Some(a));
        assert_eq!(index.lookup_function("nope"), None);
    }

    #[test]
    fn test_callee_resolution_policy() {
        let mut index = GraphIndex::new();
        for file in ["a.py", "b.py", "c.py"] {
            index.add_file(file, "python", 1);
        }
        let main = index.add_function("a.py", &function("main", 1)).unwrap();
        let local = index.add_function("a.py", &function("helper", 5)).unwrap();
        index.add_function("b.py", &function("helper", 1)).unwrap();
        let unique = index.add_function("b.py", &function("unique", 3)).unwrap();
        let shared_b = index.add_function("b.py", &function("shared", 5)).unwrap();
        let shared_c = index.add_function("c.py", &function("shared", 1)).unwrap();

        index.add_call_edge("a.py", &call("main", "helper", 2)).unwrap();
        index.add_call_edge("a.py", &call("main", "unique", 3)).unwrap();
        index.add_call_edge("a.py", &call("main", "shared", 4)).unwrap();
        index.add_call_edge("a.py", &call("main", "print", 5)).unwrap();

        let targets: Vec<&CallTarget> = index.call_edges_from(main).map(|e| &e.target).collect();
        assert_eq!(targets[0], &CallTarget::Resolved { function: local });
        assert_eq!(targets[1], &CallTarget::Resolved { function: unique });
        assert_eq!(
            targets[2],
            &CallTarget::Ambiguous {
                chosen: shared_b,
                candidates: vec![shared_b, shared_c],
            }
        );
        assert_eq!(targets[3], &CallTarget::External);

        assert_eq!(index.callees_of(main), vec![local, unique, shared_b]);
        assert_eq!(index.callers_of(shared_b), vec![main]);
        assert!(index.callers_of(shared_c).is_empty());
        assert_eq!(index.stats().calls_unresolved, 1);
    }

    #[test]
    fn test_duplicate_call_edges_ignored() {
        let mut index = GraphIndex::new();
        index.add_file("a.py", "python", 1);
        let f = index.add_function("a.py", &function("f", 1)).unwrap();
        index.add_function("a.py", &function("g", 3)).unwrap();

        assert!(index.add_call_edge("a.py", &call("f", "g", 2)).unwrap());
        assert!(!index.add_call_edge("a.py", &call("f", "g", 2)).unwrap());
        assert!(index.add_call_edge("a.py", &call("f", "g", 4)).unwrap());

        assert_eq!(index.stats().calls, 2);
        assert_eq!(index.callees_of(f).len(), 1);
    }

    #[test]
    fn test_import_edges_and_counts() {
        let mut index = GraphIndex::new();
        let x = index.add_file("x.py", "python", 1);
        let y = index.add_file("pkg/y.py", "python", 1);

        index.add_import_edge("x.py", &import("pkg.y", 1, &["pkg/y.py"])).unwrap();
        index.add_import_edge("x.py", &import("pkg.y", 2, &["pkg/y.py"])).unwrap();
        index.add_import_edge("x.py", &import("os", 3, &["os.py"])).unwrap();
        assert!(!index.add_import_edge("x.py", &import("os", 3, &["os.py"])).unwrap());

        assert_eq!(index.edge_count(x, y, RelationshipType::Imports), 2);
        assert_eq!(index.edge_count(y, x, RelationshipType::ImportedBy), 2);
        assert_eq!(index.edge_count(y, x, RelationshipType::Imports), 0);

        let stats = index.stats();
        assert_eq!(stats.imports, 3);
        assert_eq!(stats.imports_resolved, 2);

        let targets: Vec<Option<FileId>> = index.imports_of(x).map(|e| e.target).collect();
        assert_eq!(targets, vec![Some(y), Some(y), None]);
    }

    #[test]
    fn test_call_links_between_files() {
        let mut index = GraphIndex::new();
        let a = index.add_file("a.py", "python", 1);
        let b = index.add_file("b.py", "python", 1);
        index.add_function("a.py", &function("main", 1)).unwrap();
        index.add_function("b.py", &function("work", 1)).unwrap();
        index.add_call_edge("a.py", &call("main", "work", 2)).unwrap();
        index.add_call_edge("a.py", &call("main", "work", 3)).unwrap();

        assert_eq!(index.edge_count(a, b, RelationshipType::Calls), 2);
        assert_eq!(index.edge_count(b, a, RelationshipType::CalledBy), 2);

        let called_by: Vec<(FileId, usize)> = index.linked_files(b, RelationshipType::CalledBy).collect();
        assert_eq!(called_by, vec![(a, 2)]);
    }
}

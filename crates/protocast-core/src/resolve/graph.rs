//! The import graph of a request.

use crate::error::{Error, Result};
use crate::schema::SchemaFile;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Validated import DAG over the files of a request
#[derive(Debug, Clone)]
pub struct ImportGraph {
    index: HashMap<String, usize>,
    /// Direct imports per file, in declaration order
    imports: Vec<Vec<usize>>,
    /// Files whose declarations each file may reference
    visible: Vec<Vec<usize>>,
}

impl ImportGraph {
    /// Builds the graph, rejecting duplicate names, missing imports and cycles
    pub fn build(files: &[SchemaFile]) -> Result<Self> {
        let mut index = HashMap::with_capacity(files.len());
        for (i, file) in files.iter().enumerate() {
            if index.insert(file.name.clone(), i).is_some() {
                return Err(Error::DuplicateFile {
                    name: file.name.clone(),
                });
            }
        }

        let mut imports = Vec::with_capacity(files.len());
        for file in files {
            let direct = file
                .imports
                .iter()
                .map(|import| {
                    index
                        .get(&import.name)
                        .copied()
                        .ok_or_else(|| Error::missing_import(&file.name, &import.name))
                })
                .collect::<Result<Vec<_>>>()?;
            imports.push(direct);
        }

        let mut graph = Self {
            index,
            imports,
            visible: Vec::new(),
        };
        graph.check_acyclic(files)?;
        graph.visible = (0..files.len())
            .map(|i| graph.compute_visible(files, i))
            .collect();
        Ok(graph)
    }

    fn check_acyclic(&self, files: &[SchemaFile]) -> Result<()> {
        let mut marks = vec![Mark::Unvisited; files.len()];
        let mut stack = Vec::new();
        for start in 0..files.len() {
            if marks[start] == Mark::Unvisited {
                self.visit(start, &mut marks, &mut stack, files)?;
            }
        }
        Ok(())
    }

    fn visit(
        &self,
        node: usize,
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
        files: &[SchemaFile],
    ) -> Result<()> {
        marks[node] = Mark::InProgress;
        stack.push(node);

        for &next in &self.imports[node] {
            match marks[next] {
                Mark::Done => {}
                Mark::Unvisited => self.visit(next, marks, stack, files)?,
                Mark::InProgress => {
                    let start = stack.iter().position(|&n| n == next).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        stack[start..].iter().map(|&n| files[n].name.clone()).collect();
                    cycle.push(files[next].name.clone());
                    return Err(Error::ImportCycle { cycle });
                }
            }
        }

        stack.pop();
        marks[node] = Mark::Done;
        Ok(())
    }

    /// Direct imports plus everything re-exported through `import public`
    fn compute_visible(&self, files: &[SchemaFile], file: usize) -> Vec<usize> {
        let mut visible = Vec::new();
        let mut pending: Vec<usize> = self.imports[file].iter().rev().copied().collect();
        while let Some(next) = pending.pop() {
            if next == file || visible.contains(&next) {
                continue;
            }
            visible.push(next);
            let public = files[next]
                .imports
                .iter()
                .zip(&self.imports[next])
                .filter(|(import, _)| import.public)
                .map(|(_, &target)| target);
            let mut public: Vec<usize> = public.collect();
            public.reverse();
            pending.extend(public);
        }
        visible
    }

    /// Index of a file by name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Direct imports of a file, in declaration order
    pub fn imports(&self, file: usize) -> &[usize] {
        &self.imports[file]
    }

    /// Files whose declarations `file` may reference, besides itself
    pub fn visible(&self, file: usize) -> &[usize] {
        &self.visible[file]
    }

    /// All files `file` depends on, depth-first in import order
    pub fn transitive(&self, file: usize) -> Vec<usize> {
        fn walk(graph: &ImportGraph, node: usize, out: &mut Vec<usize>) {
            for &next in &graph.imports[node] {
                if !out.contains(&next) {
                    out.push(next);
                    walk(graph, next, out);
                }
            }
        }

        let mut out = Vec::new();
        walk(self, file, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_detected() {
        let files = vec![
            SchemaFile::new("a.proto").import("b.proto"),
            SchemaFile::new("b.proto").import("c.proto"),
            SchemaFile::new("c.proto").import("a.proto"),
        ];
        match ImportGraph::build(&files).unwrap_err() {
            Error::ImportCycle { cycle } => {
                assert_eq!(cycle, vec!["a.proto", "b.proto", "c.proto", "a.proto"]);
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn test_self_import_is_cycle() {
        let files = vec![SchemaFile::new("a.proto").import("a.proto")];
        assert!(matches!(
            ImportGraph::build(&files),
            Err(Error::ImportCycle { .. })
        ));
    }

    #[test]
    fn test_missing_import() {
        let files = vec![SchemaFile::new("a.proto").import("gone.proto")];
        assert!(matches!(
            ImportGraph::build(&files),
            Err(Error::MissingImport { .. })
        ));
    }

    #[test]
    fn test_duplicate_file() {
        let files = vec![SchemaFile::new("a.proto"), SchemaFile::new("a.proto")];
        assert!(matches!(
            ImportGraph::build(&files),
            Err(Error::DuplicateFile { .. })
        ));
    }

    #[test]
    fn test_public_imports_are_visible_transitively() {
        let files = vec![
            SchemaFile::new("base.proto"),
            SchemaFile::new("reexport.proto").import_public("base.proto"),
            SchemaFile::new("private.proto").import("base.proto"),
            SchemaFile::new("user.proto")
                .import("reexport.proto")
                .import("private.proto"),
        ];
        let graph = ImportGraph::build(&files).unwrap();
        // user sees reexport, base (through the public import) and private
        assert_eq!(graph.visible(3), &[1, 0, 2]);

        let files = vec![
            SchemaFile::new("base.proto"),
            SchemaFile::new("private.proto").import("base.proto"),
            SchemaFile::new("user.proto").import("private.proto"),
        ];
        let graph = ImportGraph::build(&files).unwrap();
        assert_eq!(graph.visible(2), &[1]);
        assert_eq!(graph.transitive(2), vec![1, 0]);
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let files = vec![
            SchemaFile::new("base.proto"),
            SchemaFile::new("left.proto").import("base.proto"),
            SchemaFile::new("right.proto").import("base.proto"),
            SchemaFile::new("top.proto").import("left.proto").import("right.proto"),
        ];
        let graph = ImportGraph::build(&files).unwrap();
        assert_eq!(graph.transitive(3), vec![1, 0, 2]);
    }
}

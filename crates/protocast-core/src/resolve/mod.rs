//! Type resolution over a per-request declaration registry.
//!
//! The [`Registry`] is built once per request from every file of the request
//! and is read-only afterwards. Building it validates the import graph
//! (missing files, cycles) and rejects empty enums and names declared twice
//! within one file. Unrelated files may declare the same canonical name;
//! only the declarations visible from the referencing file take part in a
//! lookup.
//!
//! ## Lookup rules
//!
//! - `.pkg.Msg`: exact match on the canonical name.
//! - `Msg` or `Outer.Inner`: walk the scopes outward from the referencing
//!   message (the message itself, its parents, the package and its parent
//!   packages, the root). Each candidate must be declared in the current file
//!   or in a file visible through its imports. If the walk finds nothing,
//!   the name is looked up relative to the package of every visible import.
//!
//! In every case, more than one visible declaration is an ambiguity.

mod graph;

use crate::error::{Error, Result};
use crate::model::{DeclKind, TypeRef};
use crate::schema::{Enum, Message, SchemaFile};
use std::collections::HashMap;
use tracing::trace;

pub use graph::ImportGraph;

/// A declaration known to the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// Message or enum
    pub kind: DeclKind,
    /// Index of the declaring file
    pub file: usize,
    /// First declared member `(name, number)`, for enums
    pub enum_default: Option<(String, i32)>,
}

/// Read-only lookup table of every declaration in a request
#[derive(Debug)]
pub struct Registry<'a> {
    files: &'a [SchemaFile],
    graph: ImportGraph,
    declarations: HashMap<String, Vec<Declaration>>,
}

impl<'a> Registry<'a> {
    /// Builds the registry for the files of one request
    pub fn build(files: &'a [SchemaFile]) -> Result<Self> {
        let graph = ImportGraph::build(files)?;

        let mut registry = Self {
            files,
            graph,
            declarations: HashMap::new(),
        };
        for (index, file) in files.iter().enumerate() {
            let scope = file.scope();
            for message in &file.messages {
                registry.register_message(message, &scope, index)?;
            }
            for enumeration in &file.enums {
                registry.register_enum(enumeration, &scope, index)?;
            }
        }

        trace!(
            "Registry built: {} files, {} declarations",
            files.len(),
            registry.declarations.len()
        );
        Ok(registry)
    }

    fn insert(&mut self, full_name: String, declaration: Declaration) -> Result<()> {
        let entries = self.declarations.entry(full_name.clone()).or_default();
        if entries.iter().any(|d| d.file == declaration.file) {
            let file = self.files[declaration.file].name.clone();
            return Err(Error::DuplicateDeclaration {
                name: full_name,
                first_file: file.clone(),
                second_file: file,
            });
        }
        entries.push(declaration);
        Ok(())
    }

    fn register_message(&mut self, message: &Message, scope: &str, file: usize) -> Result<()> {
        let full_name = format!("{}.{}", scope, message.name);
        self.insert(
            full_name.clone(),
            Declaration {
                kind: DeclKind::Message,
                file,
                enum_default: None,
            },
        )?;
        for nested in &message.messages {
            self.register_message(nested, &full_name, file)?;
        }
        for enumeration in &message.enums {
            self.register_enum(enumeration, &full_name, file)?;
        }
        Ok(())
    }

    fn register_enum(&mut self, enumeration: &Enum, scope: &str, file: usize) -> Result<()> {
        let full_name = format!("{}.{}", scope, enumeration.name);
        let Some(first) = enumeration.values.first() else {
            return Err(Error::EmptyEnum { name: full_name });
        };
        let enum_default = Some((first.name.clone(), first.number));
        self.insert(
            full_name,
            Declaration {
                kind: DeclKind::Enum,
                file,
                enum_default,
            },
        )
    }

    /// The files of the request
    pub fn files(&self) -> &'a [SchemaFile] {
        self.files
    }

    /// Index of a file by name
    pub fn file_index(&self, name: &str) -> Option<usize> {
        self.graph.index_of(name)
    }

    /// The validated import graph
    pub fn graph(&self) -> &ImportGraph {
        &self.graph
    }

    /// Every declaration of a canonical name, in request order
    pub fn get(&self, full_name: &str) -> &[Declaration] {
        self.declarations
            .get(full_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The declaration a resolved reference points at
    pub fn declaration(&self, type_ref: &TypeRef) -> Option<&Declaration> {
        self.get(&type_ref.full_name)
            .iter()
            .find(|d| self.files[d.file].name == type_ref.file)
    }

    /// Resolves a declared type name
    ///
    /// `scope` is the canonical name of the innermost enclosing message, or
    /// the file's package scope for service methods. `referrer` is only used
    /// in error messages.
    pub fn resolve(
        &self,
        type_name: &str,
        scope: &str,
        file: usize,
        referrer: &str,
    ) -> Result<TypeRef> {
        let found = if type_name.starts_with('.') {
            self.visible_matches(type_name, file)
        } else {
            match self.resolve_in_scopes(type_name, scope, file) {
                Some(found) => Some(found),
                None => self.resolve_in_imports(type_name, file),
            }
        };

        let Some((full_name, matches)) = found else {
            return Err(Error::unresolved_type(
                type_name,
                referrer,
                &self.files[file].name,
            ));
        };
        if matches.len() > 1 {
            let candidates = matches
                .iter()
                .map(|d| self.files[d.file].name.clone())
                .collect();
            return Err(Error::ambiguous_type(type_name, referrer, candidates));
        }
        let declaration = matches[0];

        trace!("Resolved '{}' from '{}' to '{}'", type_name, referrer, full_name);
        Ok(TypeRef {
            full_name,
            file: self.files[declaration.file].name.clone(),
            package: self.files[declaration.file].package.clone(),
            kind: declaration.kind,
        })
    }

    fn is_visible(&self, declaration: &Declaration, file: usize) -> bool {
        declaration.file == file || self.graph.visible(file).contains(&declaration.file)
    }

    /// Declarations of `full_name` that `file` can see, if there are any
    ///
    /// A declaration in `file` itself shadows those of its imports.
    fn visible_matches(
        &self,
        full_name: &str,
        file: usize,
    ) -> Option<(String, Vec<&Declaration>)> {
        let declarations = self.get(full_name);
        let matches: Vec<&Declaration> = match declarations.iter().find(|d| d.file == file) {
            Some(own) => vec![own],
            None => declarations
                .iter()
                .filter(|d| self.is_visible(d, file))
                .collect(),
        };
        (!matches.is_empty()).then(|| (full_name.to_string(), matches))
    }

    fn resolve_in_scopes(
        &self,
        type_name: &str,
        scope: &str,
        file: usize,
    ) -> Option<(String, Vec<&Declaration>)> {
        let mut scope = scope;
        loop {
            let candidate = format!("{}.{}", scope, type_name);
            if let Some(found) = self.visible_matches(&candidate, file) {
                return Some(found);
            }
            if scope.is_empty() {
                return None;
            }
            scope = match scope.rfind('.') {
                Some(i) => &scope[..i],
                None => "",
            };
        }
    }

    fn resolve_in_imports(
        &self,
        type_name: &str,
        file: usize,
    ) -> Option<(String, Vec<&Declaration>)> {
        let mut full_name = None;
        let mut matches: Vec<&Declaration> = Vec::new();
        for &import in self.graph.visible(file) {
            let candidate = format!("{}.{}", self.files[import].scope(), type_name);
            if let Some(declaration) = self.get(&candidate).iter().find(|d| d.file == import) {
                if !matches.iter().any(|d| d.file == import) {
                    matches.push(declaration);
                    full_name.get_or_insert(candidate);
                }
            }
        }
        matches.sort_by_key(|d| d.file);
        full_name.map(|name| (name, matches))
    }
}

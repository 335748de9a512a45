//! Compiled model builder.
//!
//! [`Compiler::compile`] turns the files of one request into one
//! [`CompiledFile`] each:
//!
//! 1. builds the [`Registry`] (import graph and namespace validation);
//! 2. resolves and classifies every field of every message, recursively,
//!    in source declaration order;
//! 3. optionally inlines the classified declarations of transitive imports.
//!
//! Any error aborts the whole request.

use crate::classify::Classifier;
use crate::error::{Error, Result};
use crate::model::{
    CompiledEnum, CompiledEnumValue, CompiledFile, CompiledMessage, CompiledMethod,
    CompiledOneof, CompiledService, DeclKind,
};
use crate::resolve::Registry;
use crate::schema::{Enum, Message, SchemaFile, Service};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Options for one compilation request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Inline the declarations of transitively imported files
    pub include_imports: bool,
    /// Package recorded on every compiled file instead of the declared one
    pub package_override: Option<String>,
}

impl CompileOptions {
    /// Creates options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether imported declarations are inlined
    pub fn include_imports(mut self, include: bool) -> Self {
        self.include_imports = include;
        self
    }

    /// Sets the package override
    pub fn package_override(mut self, package: impl Into<String>) -> Self {
        self.package_override = Some(package.into());
        self
    }
}

/// Compiles schema files into renderer-ready models
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompileOptions,
}

/// Classified top-level declarations of one file
#[derive(Debug, Clone)]
struct FileDecls {
    messages: Vec<CompiledMessage>,
    enums: Vec<CompiledEnum>,
}

impl Compiler {
    /// Creates a compiler with default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a compiler with custom options
    pub fn with_options(options: CompileOptions) -> Self {
        Self { options }
    }

    /// The options in use
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compiles every file of the request, in request order
    pub fn compile(&self, files: &[SchemaFile]) -> Result<Vec<CompiledFile>> {
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        self.compile_selected(files, &names)
    }

    /// Compiles the named files, using all of `files` as the namespace
    ///
    /// This is the protoc plugin situation: `files` carries every
    /// transitive import while only some files are to be generated.
    pub fn compile_selected(
        &self,
        files: &[SchemaFile],
        selected: &[&str],
    ) -> Result<Vec<CompiledFile>> {
        let registry = Registry::build(files)?;
        let mut decls: HashMap<usize, FileDecls> = HashMap::new();

        let mut compiled = Vec::with_capacity(selected.len());
        for name in selected {
            let index = registry.file_index(name).ok_or_else(|| {
                Error::invalid_descriptor(format!(
                    "file to generate '{}' is not part of the request",
                    name
                ))
            })?;
            compiled.push(self.compile_file(&registry, index, &mut decls)?);
        }
        Ok(compiled)
    }

    fn compile_file(
        &self,
        registry: &Registry<'_>,
        index: usize,
        decls: &mut HashMap<usize, FileDecls>,
    ) -> Result<CompiledFile> {
        let file = &registry.files()[index];
        debug!("Compiling {}", file.name);

        let own = file_decls(registry, index, decls)?;
        let mut messages = own.messages;
        let mut enums = own.enums;

        if self.options.include_imports {
            let mut seen: HashSet<String> = messages
                .iter()
                .map(|m| m.full_name.clone())
                .chain(enums.iter().map(|e| e.full_name.clone()))
                .collect();

            for import in registry.graph().transitive(index) {
                let imported = file_decls(registry, import, decls)?;
                for message in imported.messages {
                    if seen.insert(message.full_name.clone()) {
                        messages.push(message);
                    }
                }
                for enumeration in imported.enums {
                    if seen.insert(enumeration.full_name.clone()) {
                        enums.push(enumeration);
                    }
                }
            }
            debug!(
                "Inlined imports into {}: {} messages, {} enums",
                file.name,
                messages.len(),
                enums.len()
            );
        }

        let services = file
            .services
            .iter()
            .map(|service| compile_service(registry, index, service))
            .collect::<Result<_>>()?;

        let package = self
            .options
            .package_override
            .clone()
            .or_else(|| file.package.clone());

        Ok(CompiledFile {
            name: file.name.clone(),
            package,
            declared_package: file.package.clone(),
            syntax: file.syntax,
            imports: file.imports.clone(),
            messages,
            enums,
            services,
        })
    }
}

/// Classified declarations of a file, computed once per request
fn file_decls(
    registry: &Registry<'_>,
    index: usize,
    cache: &mut HashMap<usize, FileDecls>,
) -> Result<FileDecls> {
    if let Some(decls) = cache.get(&index) {
        return Ok(decls.clone());
    }

    let file = &registry.files()[index];
    let classifier = Classifier::new(registry, index);
    let scope = file.scope();

    let decls = FileDecls {
        messages: file
            .messages
            .iter()
            .map(|m| compile_message(&classifier, m, &scope, &file.name))
            .collect::<Result<_>>()?,
        enums: file
            .enums
            .iter()
            .map(|e| compile_enum(e, &scope, &file.name))
            .collect(),
    };
    cache.insert(index, decls.clone());
    Ok(decls)
}

fn compile_message(
    classifier: &Classifier<'_, '_>,
    message: &Message,
    scope: &str,
    origin: &str,
) -> Result<CompiledMessage> {
    let full_name = format!("{}.{}", scope, message.name);

    let mut numbers: HashMap<u32, &str> = HashMap::with_capacity(message.fields.len());
    for field in &message.fields {
        if let Some(oneof) = field.oneof.filter(|&i| i >= message.oneofs.len()) {
            return Err(Error::invalid_descriptor(format!(
                "field '{}.{}' names oneof {} but the message declares {}",
                full_name,
                field.name,
                oneof,
                message.oneofs.len()
            )));
        }
        if let Some(first) = numbers.insert(field.number, &field.name) {
            return Err(Error::DuplicateFieldNumber {
                message: full_name,
                number: field.number,
                first: first.to_string(),
                second: field.name.clone(),
            });
        }
    }

    let fields = message
        .fields
        .iter()
        .map(|field| classifier.classify(field, &full_name))
        .collect::<Result<Vec<_>>>()?;

    let oneofs = message
        .oneofs
        .iter()
        .enumerate()
        .map(|(i, oneof)| CompiledOneof {
            name: oneof.name.clone(),
            members: fields
                .iter()
                .enumerate()
                .filter(|(_, f)| f.oneof == Some(i))
                .map(|(index, _)| index)
                .collect(),
        })
        .collect();

    let messages = message
        .messages
        .iter()
        .map(|nested| compile_message(classifier, nested, &full_name, origin))
        .collect::<Result<_>>()?;
    let enums = message
        .enums
        .iter()
        .map(|e| compile_enum(e, &full_name, origin))
        .collect();

    Ok(CompiledMessage {
        name: message.name.clone(),
        full_name,
        origin: origin.to_string(),
        fields,
        oneofs,
        messages,
        enums,
    })
}

fn compile_enum(enumeration: &Enum, scope: &str, origin: &str) -> CompiledEnum {
    CompiledEnum {
        name: enumeration.name.clone(),
        full_name: format!("{}.{}", scope, enumeration.name),
        origin: origin.to_string(),
        values: enumeration
            .values
            .iter()
            .map(|v| CompiledEnumValue {
                name: v.name.clone(),
                number: v.number,
            })
            .collect(),
    }
}

fn compile_service(
    registry: &Registry<'_>,
    index: usize,
    service: &Service,
) -> Result<CompiledService> {
    let file = &registry.files()[index];
    let scope = file.scope();
    let full_name = format!("{}.{}", scope, service.name);

    let methods = service
        .methods
        .iter()
        .map(|method| {
            let path = format!("{}.{}", full_name, method.name);
            let input = registry.resolve(&method.input_type, &scope, index, &path)?;
            let output = registry.resolve(&method.output_type, &scope, index, &path)?;
            for r in [&input, &output] {
                if r.kind != DeclKind::Message {
                    return Err(Error::invalid_descriptor(format!(
                        "method '{}' uses enum '{}' as request or response",
                        path, r.full_name
                    )));
                }
            }
            Ok(CompiledMethod {
                name: method.name.clone(),
                input,
                output,
                client_streaming: method.client_streaming,
                server_streaming: method.server_streaming,
            })
        })
        .collect::<Result<_>>()?;

    Ok(CompiledService {
        name: service.name.clone(),
        full_name,
        methods,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::WireCategory;
    use crate::schema::{Field, Method, ScalarType};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_declaration_order_preserved() {
        let files = vec![SchemaFile::new("z.proto")
            .message(
                Message::new("Zebra")
                    .field(Field::new("b", "int32", 2))
                    .field(Field::new("a", "int32", 1)),
            )
            .message(Message::new("Aardvark"))];
        let compiled = Compiler::new().compile(&files).unwrap();
        let names: Vec<_> = compiled[0].messages.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Zebra", "Aardvark"]);
        let fields: Vec<_> = compiled[0].messages[0]
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(fields, vec!["b", "a"]);
    }

    #[test]
    fn test_duplicate_field_number() {
        let files = vec![SchemaFile::new("a.proto").message(
            Message::new("A")
                .field(Field::new("x", "int32", 1))
                .field(Field::new("y", "string", 1)),
        )];
        match Compiler::new().compile(&files).unwrap_err() {
            Error::DuplicateFieldNumber { message, number, first, second } => {
                assert_eq!(message, ".A");
                assert_eq!(number, 1);
                assert_eq!((first.as_str(), second.as_str()), ("x", "y"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_oneof_grouping_recorded() {
        let files = vec![SchemaFile::new("shape.proto")
            .message(Message::new("Circle"))
            .message(Message::new("Square"))
            .message(
                Message::new("Shape")
                    .field(Field::new("id", "string", 1))
                    .oneof(
                        "kind",
                        vec![Field::new("circle", "Circle", 2), Field::new("square", "Square", 3)],
                    ),
            )];
        let compiled = Compiler::new().compile(&files).unwrap();
        let shape = compiled[0].message(".Shape").unwrap();
        assert_eq!(shape.oneofs[0].members, vec![1, 2]);
        let members: Vec<_> = shape
            .oneof_fields(&shape.oneofs[0])
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(members, vec!["circle", "square"]);
        assert_eq!(shape.plain_fields().count(), 1);
        assert!(shape.fields[1].presence_tracked);
        assert_eq!(shape.fields[1].category, WireCategory::Message);
    }

    #[test]
    fn test_dangling_oneof_index_rejected() {
        let stray = Field {
            oneof: Some(1),
            ..Field::new("radius", "double", 4)
        };
        let files = vec![SchemaFile::new("shape.proto").message(
            Message::new("Shape")
                .oneof("kind", vec![Field::new("name", "string", 1)])
                .field(stray),
        )];
        match Compiler::new().compile(&files).unwrap_err() {
            Error::InvalidDescriptor(message) => {
                assert!(message.contains(".Shape.radius"));
                assert!(message.contains("oneof 1"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_nested_declarations_recursive() {
        let files = vec![SchemaFile::new("tree.proto").package("t").message(
            Message::new("Tree")
                .nested(Message::new("Node").field(Field::repeated("children", "Node", 1)))
                .nested_enum(Enum::new("Kind", [("LEAF", 0), ("BRANCH", 1)]))
                .field(Field::new("root", "Node", 1))
                .field(Field::new("kind", "Kind", 2)),
        )];
        let compiled = Compiler::new().compile(&files).unwrap();
        let node = compiled[0].message(".t.Tree.Node").unwrap();
        assert_eq!(node.fields[0].type_ref().unwrap().full_name, ".t.Tree.Node");
        assert!(compiled[0].enumeration(".t.Tree.Kind").is_some());
        let tree = compiled[0].message(".t.Tree").unwrap();
        assert_eq!(tree.field("kind").unwrap().category, WireCategory::Enum);
    }

    #[test]
    fn test_package_override_keeps_canonical_names() {
        let files = vec![SchemaFile::new("a.proto")
            .package("geo")
            .message(Message::new("Point"))
            .message(Message::new("Line").field(Field::new("from", "Point", 1)))];
        let compiler =
            Compiler::with_options(CompileOptions::new().package_override("cartography"));
        let compiled = compiler.compile(&files).unwrap();
        assert_eq!(compiled[0].package.as_deref(), Some("cartography"));
        assert!(compiled[0].is_package_overridden());
        let line = compiled[0].message(".geo.Line").unwrap();
        assert_eq!(line.fields[0].type_ref().unwrap().full_name, ".geo.Point");
    }

    #[test]
    fn test_services_resolved() {
        let files = vec![SchemaFile::new("svc.proto")
            .package("api")
            .message(Message::new("Req"))
            .message(Message::new("Resp"))
            .service(Service {
                name: "Api".into(),
                methods: vec![Method {
                    name: "Call".into(),
                    input_type: ".api.Req".into(),
                    output_type: "Resp".into(),
                    client_streaming: false,
                    server_streaming: true,
                }],
            })];
        let compiled = Compiler::new().compile(&files).unwrap();
        let service = &compiled[0].services[0];
        assert_eq!(service.full_name, ".api.Api");
        assert_eq!(service.methods[0].input.full_name, ".api.Req");
        assert_eq!(service.methods[0].output.full_name, ".api.Resp");
        assert!(service.methods[0].server_streaming);
    }

    #[test]
    fn test_compile_selected_order_and_missing() {
        let files = vec![
            SchemaFile::new("a.proto").message(Message::new("A")),
            SchemaFile::new("b.proto").message(Message::new("B")),
        ];
        let compiled = Compiler::new().compile_selected(&files, &["b.proto", "a.proto"]).unwrap();
        assert_eq!(compiled[0].name, "b.proto");
        assert_eq!(compiled[1].name, "a.proto");

        let err = Compiler::new().compile_selected(&files, &["c.proto"]).unwrap_err();
        assert!(matches!(err, Error::InvalidDescriptor(_)));
    }

    #[test]
    fn test_map_inside_message_model() {
        let files = vec![SchemaFile::new("m.proto")
            .message(Message::new("V"))
            .message(Message::new("M").field(Field::map("by_id", ScalarType::Uint64, "V", 3)))];
        let compiled = Compiler::new().compile(&files).unwrap();
        let entry = compiled[0].messages[1].fields[0].map_entry().unwrap().clone();
        assert_eq!(entry.full_name, ".M.ByIdEntry");
        assert_eq!(entry.key.category, WireCategory::UnsignedVarint);
    }
}

//! Descriptor model: passive data structures for one parsed schema file.
//!
//! These values are built once per request, usually from the
//! `FileDescriptorProto`s produced by `protoc` (see [`SchemaFile::from_descriptor`]),
//! and are never mutated by the compiler afterwards.
//!
//! Compared to raw descriptors, the model is closer to the schema text:
//!
//! - map fields are a [`Cardinality::Map`] instead of a repeated reference to a
//!   synthetic `*Entry` message;
//! - proto3 `optional` is a flag on the field instead of a synthetic oneof.

mod descriptor;

use crate::error::{Error, Result};

/// Proto syntax version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Syntax {
    /// Proto2 syntax
    #[default]
    Proto2,
    /// Proto3 syntax
    Proto3,
}

impl Syntax {
    /// Returns the syntax declaration string
    pub fn as_str(&self) -> &'static str {
        match self {
            Syntax::Proto2 => "proto2",
            Syntax::Proto3 => "proto3",
        }
    }
}

impl TryFrom<&str> for Syntax {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "" | "proto2" => Ok(Syntax::Proto2),
            "proto3" => Ok(Syntax::Proto3),
            _ => Err(Error::UnsupportedSyntax {
                syntax: value.to_string(),
            }),
        }
    }
}

/// Built-in scalar types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// `double`
    Double,
    /// `float`
    Float,
    /// `int32`
    Int32,
    /// `int64`
    Int64,
    /// `uint32`
    Uint32,
    /// `uint64`
    Uint64,
    /// `sint32`
    Sint32,
    /// `sint64`
    Sint64,
    /// `fixed32`
    Fixed32,
    /// `fixed64`
    Fixed64,
    /// `sfixed32`
    Sfixed32,
    /// `sfixed64`
    Sfixed64,
    /// `bool`
    Bool,
    /// `string`
    String,
    /// `bytes`
    Bytes,
}

impl ScalarType {
    /// All scalar types in declaration order of `descriptor.proto`
    pub const ALL: [ScalarType; 15] = [
        ScalarType::Double,
        ScalarType::Float,
        ScalarType::Int64,
        ScalarType::Uint64,
        ScalarType::Int32,
        ScalarType::Fixed64,
        ScalarType::Fixed32,
        ScalarType::Bool,
        ScalarType::String,
        ScalarType::Bytes,
        ScalarType::Uint32,
        ScalarType::Sfixed32,
        ScalarType::Sfixed64,
        ScalarType::Sint32,
        ScalarType::Sint64,
    ];

    /// Returns the keyword used in `.proto` source
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::Double => "double",
            ScalarType::Float => "float",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::Uint32 => "uint32",
            ScalarType::Uint64 => "uint64",
            ScalarType::Sint32 => "sint32",
            ScalarType::Sint64 => "sint64",
            ScalarType::Fixed32 => "fixed32",
            ScalarType::Fixed64 => "fixed64",
            ScalarType::Sfixed32 => "sfixed32",
            ScalarType::Sfixed64 => "sfixed64",
            ScalarType::Bool => "bool",
            ScalarType::String => "string",
            ScalarType::Bytes => "bytes",
        }
    }

    /// Parses a `.proto` scalar keyword
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }

    /// Whether the type may be used as a map key
    pub fn is_valid_map_key(&self) -> bool {
        !matches!(
            self,
            ScalarType::Double | ScalarType::Float | ScalarType::Bytes
        )
    }
}

/// Declared type of a field, before resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeName {
    /// A built-in scalar
    Scalar(ScalarType),
    /// A message or enum name, fully qualified when it starts with `.`
    Named(String),
}

impl TypeName {
    /// Shorthand for a named type
    pub fn named(name: impl Into<String>) -> Self {
        TypeName::Named(name.into())
    }

    /// Parses a declared type: scalar keywords become [`TypeName::Scalar`]
    pub fn parse(name: &str) -> Self {
        ScalarType::from_name(name)
            .map(TypeName::Scalar)
            .unwrap_or_else(|| TypeName::Named(name.to_string()))
    }

    /// Returns the type as written in source
    pub fn as_str(&self) -> &str {
        match self {
            TypeName::Scalar(s) => s.as_str(),
            TypeName::Named(n) => n,
        }
    }
}

/// Repetition of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cardinality {
    /// At most one value
    #[default]
    Singular,
    /// Any number of values
    Repeated,
    /// `map<key, T>`; the field's declared type is the value type
    Map {
        /// Key type
        key: ScalarType,
    },
}

/// A single parsed schema file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaFile {
    /// File path, unique within a request
    pub name: String,
    /// Declared package, if any
    pub package: Option<String>,
    /// Syntax version
    pub syntax: Syntax,
    /// Imported file names in declaration order
    pub imports: Vec<Import>,
    /// Top-level messages
    pub messages: Vec<Message>,
    /// Top-level enums
    pub enums: Vec<Enum>,
    /// Services
    pub services: Vec<Service>,
}

impl SchemaFile {
    /// Creates an empty proto3 file
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            syntax: Syntax::Proto3,
            ..Default::default()
        }
    }

    /// Sets the package
    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    /// Sets the syntax version
    pub fn syntax(mut self, syntax: Syntax) -> Self {
        self.syntax = syntax;
        self
    }

    /// Adds a plain import
    pub fn import(mut self, name: impl Into<String>) -> Self {
        self.imports.push(Import::new(name));
        self
    }

    /// Adds an `import public`
    pub fn import_public(mut self, name: impl Into<String>) -> Self {
        self.imports.push(Import {
            name: name.into(),
            public: true,
        });
        self
    }

    /// Adds a top-level message
    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Adds a top-level enum
    pub fn enumeration(mut self, enumeration: Enum) -> Self {
        self.enums.push(enumeration);
        self
    }

    /// Adds a service
    pub fn service(mut self, service: Service) -> Self {
        self.services.push(service);
        self
    }

    /// Canonical scope of top-level declarations: `.package` or empty
    pub fn scope(&self) -> String {
        match self.package.as_deref() {
            Some(p) if !p.is_empty() => format!(".{}", p),
            _ => String::new(),
        }
    }
}

/// An import statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Imported file name
    pub name: String,
    /// `import public`: re-exported to files importing this one
    pub public: bool,
}

impl Import {
    /// Creates a plain import
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            public: false,
        }
    }
}

/// A message declaration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    /// Simple name
    pub name: String,
    /// Fields in declaration order
    pub fields: Vec<Field>,
    /// Oneof groups in declaration order
    pub oneofs: Vec<Oneof>,
    /// Nested messages
    pub messages: Vec<Message>,
    /// Nested enums
    pub enums: Vec<Enum>,
}

impl Message {
    /// Creates an empty message
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Adds a field
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a oneof group and its member fields
    pub fn oneof(mut self, name: impl Into<String>, fields: Vec<Field>) -> Self {
        let index = self.oneofs.len();
        self.oneofs.push(Oneof { name: name.into() });
        self.fields
            .extend(fields.into_iter().map(|f| Field { oneof: Some(index), ..f }));
        self
    }

    /// Adds a nested message
    pub fn nested(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Adds a nested enum
    pub fn nested_enum(mut self, enumeration: Enum) -> Self {
        self.enums.push(enumeration);
        self
    }
}

/// A field declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Field number, unique within the message
    pub number: u32,
    /// Declared type; for maps, the value type
    pub type_name: TypeName,
    /// Singular, repeated or map
    pub cardinality: Cardinality,
    /// Explicit `optional` presence
    pub optional: bool,
    /// Index into the owning message's oneofs
    pub oneof: Option<usize>,
}

impl Field {
    /// Creates a singular field; scalar keywords are recognized
    pub fn new(name: impl Into<String>, type_name: &str, number: u32) -> Self {
        Self {
            name: name.into(),
            number,
            type_name: TypeName::parse(type_name),
            cardinality: Cardinality::Singular,
            optional: false,
            oneof: None,
        }
    }

    /// Creates a repeated field
    pub fn repeated(name: impl Into<String>, type_name: &str, number: u32) -> Self {
        Self {
            cardinality: Cardinality::Repeated,
            ..Self::new(name, type_name, number)
        }
    }

    /// Creates a `map<key, value>` field
    pub fn map(name: impl Into<String>, key: ScalarType, value: &str, number: u32) -> Self {
        Self {
            cardinality: Cardinality::Map { key },
            ..Self::new(name, value, number)
        }
    }

    /// Marks the field `optional`
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// A oneof group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Oneof {
    /// Group name
    pub name: String,
}

/// An enum declaration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enum {
    /// Simple name
    pub name: String,
    /// Values in declaration order; the first is the default
    pub values: Vec<EnumValue>,
}

impl Enum {
    /// Creates an enum from `(name, number)` pairs
    pub fn new<N: Into<String>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = (N, i32)>,
    ) -> Self {
        Self {
            name: name.into(),
            values: values
                .into_iter()
                .map(|(name, number)| EnumValue {
                    name: name.into(),
                    number,
                })
                .collect(),
        }
    }
}

/// One enum member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    /// Member name
    pub name: String,
    /// Member number
    pub number: i32,
}

/// A service declaration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Service {
    /// Service name
    pub name: String,
    /// Methods in declaration order
    pub methods: Vec<Method>,
}

/// A service method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    /// Method name
    pub name: String,
    /// Request message type name
    pub input_type: String,
    /// Response message type name
    pub output_type: String,
    /// Client sends a stream
    pub client_streaming: bool,
    /// Server replies with a stream
    pub server_streaming: bool,
}

//! The compiled, renderer-ready model.
//!
//! A [`CompiledFile`] holds everything a renderer needs: canonical type
//! names, wire categories, oneof groupings, enum defaults and synthesized map
//! entries. Cross-file references are [`TypeRef`]s, which name their target
//! instead of owning it, so mutually recursive files never form ownership
//! cycles.

use crate::classify::{WireCategory, WireType};
use crate::error::{Error, Result};
use crate::schema::{Import, ScalarType, Syntax};
use tracing::warn;

/// Compiled model of one schema file
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFile {
    /// Source file name
    pub name: String,
    /// Package used for naming, after `package_override`
    pub package: Option<String>,
    /// Package declared by the source file
    pub declared_package: Option<String>,
    /// Syntax version
    pub syntax: Syntax,
    /// Imports as declared
    pub imports: Vec<Import>,
    /// Messages in declaration order, followed by inlined imported ones
    pub messages: Vec<CompiledMessage>,
    /// Enums in declaration order, followed by inlined imported ones
    pub enums: Vec<CompiledEnum>,
    /// Services in declaration order
    pub services: Vec<CompiledService>,
}

impl CompiledFile {
    /// Whether the naming package differs from the declared one
    pub fn is_package_overridden(&self) -> bool {
        self.package != self.declared_package
    }

    /// Messages declared in this file
    pub fn own_messages(&self) -> impl Iterator<Item = &CompiledMessage> {
        self.messages.iter().filter(move |m| m.origin == self.name)
    }

    /// Messages inlined from imported files
    pub fn imported_messages(&self) -> impl Iterator<Item = &CompiledMessage> {
        self.messages.iter().filter(move |m| m.origin != self.name)
    }

    /// Enums declared in this file
    pub fn own_enums(&self) -> impl Iterator<Item = &CompiledEnum> {
        self.enums.iter().filter(move |e| e.origin == self.name)
    }

    /// Finds a top-level or nested message by canonical name
    pub fn message(&self, full_name: &str) -> Option<&CompiledMessage> {
        fn find<'a>(
            messages: &'a [CompiledMessage],
            full_name: &str,
        ) -> Option<&'a CompiledMessage> {
            messages.iter().find_map(|m| {
                if m.full_name == full_name {
                    Some(m)
                } else {
                    find(&m.messages, full_name)
                }
            })
        }
        find(&self.messages, full_name)
    }

    /// Finds a top-level or nested enum by canonical name
    pub fn enumeration(&self, full_name: &str) -> Option<&CompiledEnum> {
        fn find<'a>(messages: &'a [CompiledMessage], full_name: &str) -> Option<&'a CompiledEnum> {
            messages.iter().find_map(|m| {
                m.enums
                    .iter()
                    .find(|e| e.full_name == full_name)
                    .or_else(|| find(&m.messages, full_name))
            })
        }
        self.enums
            .iter()
            .find(|e| e.full_name == full_name)
            .or_else(|| find(&self.messages, full_name))
    }

    /// Files, other than this one, whose declarations are referenced
    ///
    /// Listed in order of first reference.
    pub fn referenced_files(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        collect_refs(&self.messages, &mut refs);
        for method in self.services.iter().flat_map(|s| &s.methods) {
            refs.push(&method.input);
            refs.push(&method.output);
        }

        let mut files: Vec<&str> = Vec::new();
        for r in refs {
            if r.file != self.name && !files.contains(&r.file.as_str()) {
                files.push(&r.file);
            }
        }
        files
    }
}

fn collect_refs<'a>(messages: &'a [CompiledMessage], refs: &mut Vec<&'a TypeRef>) {
    for message in messages {
        for field in &message.fields {
            field.collect_refs(refs);
        }
        collect_refs(&message.messages, refs);
    }
}

/// Kind of a resolved declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclKind {
    /// A message
    Message,
    /// An enum
    Enum,
}

/// Non-owning reference to a resolved declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    /// Canonical name, always starting with `.`
    pub full_name: String,
    /// File declaring the target
    pub file: String,
    /// Declared package of that file
    pub package: Option<String>,
    /// What the target is
    pub kind: DeclKind,
}

impl TypeRef {
    /// Name relative to the package, e.g. `Path.Segment`
    pub fn local_name(&self) -> &str {
        let name = self.full_name.trim_start_matches('.');
        match self.package.as_deref() {
            Some(package) if !package.is_empty() => name
                .strip_prefix(package)
                .and_then(|rest| rest.strip_prefix('.'))
                .unwrap_or(name),
            _ => name,
        }
    }

    /// Last path segment of the canonical name
    pub fn simple_name(&self) -> &str {
        self.full_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.full_name)
    }
}

/// A classified message
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledMessage {
    /// Simple name
    pub name: String,
    /// Canonical name
    pub full_name: String,
    /// File the message is declared in
    pub origin: String,
    /// Fields in declaration order
    pub fields: Vec<CompiledField>,
    /// Oneof groups in declaration order
    pub oneofs: Vec<CompiledOneof>,
    /// Nested messages in declaration order
    pub messages: Vec<CompiledMessage>,
    /// Nested enums in declaration order
    pub enums: Vec<CompiledEnum>,
}

impl CompiledMessage {
    /// Finds a field by name
    pub fn field(&self, name: &str) -> Option<&CompiledField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields not belonging to any oneof
    pub fn plain_fields(&self) -> impl Iterator<Item = &CompiledField> {
        self.fields.iter().filter(|f| f.oneof.is_none())
    }

    /// Member fields of a oneof group
    pub fn oneof_fields<'a>(
        &'a self,
        oneof: &'a CompiledOneof,
    ) -> impl Iterator<Item = &'a CompiledField> {
        oneof.members.iter().map(move |&i| &self.fields[i])
    }
}

/// A oneof group with its members
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledOneof {
    /// Group name
    pub name: String,
    /// Indices of member fields in [`CompiledMessage::fields`]
    pub members: Vec<usize>,
}

/// Repetition of a classified field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    /// At most one value
    Singular,
    /// Any number of values
    Repeated,
    /// A map; see [`FieldType::Map`]
    Map,
}

/// Resolved type of a classified field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// A scalar, possibly unwrapped from a `google.protobuf.*Value`
    Scalar(ScalarType),
    /// An embedded message
    Message(TypeRef),
    /// An enum
    Enum(TypeRef),
    /// A map with its synthesized entry message
    Map(Box<MapEntry>),
}

/// The implicit key/value message of a map field
#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    /// Entry name, `<FieldName>Entry`
    pub name: String,
    /// Canonical name, nested in the owning message
    pub full_name: String,
    /// Key field, number 1
    pub key: CompiledField,
    /// Value field, number 2
    pub value: CompiledField,
}

/// Default value a renderer should use for an unset field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    /// Numeric zero
    Zero,
    /// `false`
    False,
    /// Empty string
    EmptyString,
    /// Empty byte string
    EmptyBytes,
    /// The enum's first declared member
    EnumMember {
        /// Member name
        name: String,
        /// Member number
        number: i32,
    },
    /// No value: presence-tracked fields and messages
    Absent,
    /// Empty repeated field or map
    Empty,
}

impl DefaultValue {
    /// Zero value of a scalar
    pub fn of_scalar(scalar: ScalarType) -> Self {
        match scalar {
            ScalarType::Bool => DefaultValue::False,
            ScalarType::String => DefaultValue::EmptyString,
            ScalarType::Bytes => DefaultValue::EmptyBytes,
            _ => DefaultValue::Zero,
        }
    }
}

/// A fully classified field
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledField {
    /// Field name
    pub name: String,
    /// Field number
    pub number: u32,
    /// Singular, repeated or map
    pub label: Label,
    /// Resolved type
    pub ty: FieldType,
    /// Encoding class
    pub category: WireCategory,
    /// Wire type of one encoded element
    pub wire_type: WireType,
    /// Whether "unset" is distinguishable from the default value
    pub presence_tracked: bool,
    /// Canonical name of the wrapper type this scalar was unwrapped from
    pub wraps: Option<String>,
    /// Index into the owning message's oneofs
    pub oneof: Option<usize>,
    /// Default value for renderers
    pub default: DefaultValue,
}

impl CompiledField {
    /// The referenced declaration, for message and enum fields
    pub fn type_ref(&self) -> Option<&TypeRef> {
        match &self.ty {
            FieldType::Message(r) | FieldType::Enum(r) => Some(r),
            _ => None,
        }
    }

    /// The synthesized entry, for map fields
    pub fn map_entry(&self) -> Option<&MapEntry> {
        match &self.ty {
            FieldType::Map(entry) => Some(entry),
            _ => None,
        }
    }

    /// Tag of the field on the wire
    pub fn tag(&self) -> u32 {
        self.wire_type.tag(self.number)
    }

    fn collect_refs<'a>(&'a self, refs: &mut Vec<&'a TypeRef>) {
        match &self.ty {
            FieldType::Message(r) | FieldType::Enum(r) => refs.push(r),
            FieldType::Map(entry) => {
                entry.key.collect_refs(refs);
                entry.value.collect_refs(refs);
            }
            FieldType::Scalar(_) => {}
        }
    }
}

/// A compiled enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledEnum {
    /// Simple name
    pub name: String,
    /// Canonical name
    pub full_name: String,
    /// File the enum is declared in
    pub origin: String,
    /// Values in declaration order, never empty
    pub values: Vec<CompiledEnumValue>,
}

/// One enum member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledEnumValue {
    /// Member name
    pub name: String,
    /// Member number
    pub number: i32,
}

impl CompiledEnum {
    /// The default member: the first declared one
    pub fn default_value(&self) -> &CompiledEnumValue {
        &self.values[0]
    }

    /// Maps a number to its member, falling back to the default
    ///
    /// Numbers unknown to this version of the schema are expected when
    /// reading data written by newer code, so this never fails; a warning
    /// is logged instead.
    pub fn value_for(&self, number: i32) -> &CompiledEnumValue {
        match self.values.iter().find(|v| v.number == number) {
            Some(value) => value,
            None => {
                let fallback = self.default_value();
                warn!(
                    "Unknown value {} for enum {}, using {} as fallback",
                    number, self.full_name, fallback.name
                );
                fallback
            }
        }
    }

    /// Strict lookup by member name
    pub fn value_named(&self, name: &str) -> Result<&CompiledEnumValue> {
        self.values
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| Error::UnknownEnumName {
                enum_name: self.full_name.clone(),
                name: name.to_string(),
            })
    }
}

/// A compiled service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledService {
    /// Simple name
    pub name: String,
    /// Canonical name
    pub full_name: String,
    /// Methods in declaration order
    pub methods: Vec<CompiledMethod>,
}

/// A service method with resolved message types
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledMethod {
    /// Method name
    pub name: String,
    /// Request message
    pub input: TypeRef,
    /// Response message
    pub output: TypeRef,
    /// Client sends a stream
    pub client_streaming: bool,
    /// Server replies with a stream
    pub server_streaming: bool,
}

//! Field classification.
//!
//! Assigns every field a [`WireCategory`], resolves named types through the
//! [`Registry`], unwraps `google.protobuf.*Value` wrappers and synthesizes
//! the key/value entry message of map fields.

mod wire;

use crate::error::{Error, Result};
use crate::model::{
    CompiledField, DeclKind, DefaultValue, FieldType, Label, MapEntry, TypeRef,
};
use crate::resolve::Registry;
use crate::schema::{Cardinality, Field, ScalarType, TypeName};
use crate::MAX_FIELD_NUMBER;

pub use wire::{scalar_wire_type, WireCategory, WireType};

/// Field number of the synthesized map key
pub const MAP_KEY_NUMBER: u32 = 1;
/// Field number of the synthesized map value
pub const MAP_VALUE_NUMBER: u32 = 2;

/// Well-known wrapper messages and the scalar each one wraps
const WRAPPERS: [(&str, ScalarType); 9] = [
    (".google.protobuf.DoubleValue", ScalarType::Double),
    (".google.protobuf.FloatValue", ScalarType::Float),
    (".google.protobuf.Int64Value", ScalarType::Int64),
    (".google.protobuf.UInt64Value", ScalarType::Uint64),
    (".google.protobuf.Int32Value", ScalarType::Int32),
    (".google.protobuf.UInt32Value", ScalarType::Uint32),
    (".google.protobuf.BoolValue", ScalarType::Bool),
    (".google.protobuf.StringValue", ScalarType::String),
    (".google.protobuf.BytesValue", ScalarType::Bytes),
];

/// Scalar wrapped by a well-known wrapper type, given its canonical name
pub fn wrapped_scalar(full_name: &str) -> Option<ScalarType> {
    WRAPPERS
        .iter()
        .find(|(name, _)| *name == full_name)
        .map(|(_, scalar)| *scalar)
}

/// What a declared type turned out to be
enum Target {
    Scalar(ScalarType),
    Wrapper(ScalarType, String),
    Message(TypeRef),
    Enum(TypeRef, DefaultValue),
}

/// Classifies the fields of one file against a request's registry
#[derive(Debug, Clone, Copy)]
pub struct Classifier<'r, 'a> {
    registry: &'r Registry<'a>,
    file: usize,
}

impl<'r, 'a> Classifier<'r, 'a> {
    /// Creates a classifier for the file at `file` in the registry
    pub fn new(registry: &'r Registry<'a>, file: usize) -> Self {
        Self { registry, file }
    }

    /// Classifies one field of the message whose canonical name is `scope`
    pub fn classify(&self, field: &Field, scope: &str) -> Result<CompiledField> {
        let path = format!("{}.{}", scope, field.name);
        if field.number > MAX_FIELD_NUMBER {
            return Err(Error::InvalidFieldNumber {
                field: path,
                number: i64::from(field.number),
                max: MAX_FIELD_NUMBER,
            });
        }

        match field.cardinality {
            Cardinality::Map { key } => self.classify_map(field, key, scope, &path),
            Cardinality::Singular | Cardinality::Repeated => {
                let target = self.resolve_target(&field.type_name, scope, &path)?;
                let label = if field.cardinality == Cardinality::Repeated {
                    Label::Repeated
                } else {
                    Label::Singular
                };
                Ok(build_field(
                    &field.name,
                    field.number,
                    label,
                    target,
                    field.optional || field.oneof.is_some(),
                    field.oneof,
                ))
            }
        }
    }

    fn classify_map(
        &self,
        field: &Field,
        key: ScalarType,
        scope: &str,
        path: &str,
    ) -> Result<CompiledField> {
        if !key.is_valid_map_key() {
            return Err(Error::InvalidMapKey {
                field: path.to_string(),
                key_type: key.as_str().to_string(),
            });
        }

        let name = map_entry_name(&field.name);
        let full_name = format!("{}.{}", scope, name);

        let key = build_field(
            "key",
            MAP_KEY_NUMBER,
            Label::Singular,
            Target::Scalar(key),
            false,
            None,
        );
        let value_target = self.resolve_target(&field.type_name, scope, path)?;
        let value = build_field(
            "value",
            MAP_VALUE_NUMBER,
            Label::Singular,
            value_target,
            false,
            None,
        );

        Ok(CompiledField {
            name: field.name.clone(),
            number: field.number,
            label: Label::Map,
            ty: FieldType::Map(Box::new(MapEntry {
                name,
                full_name,
                key,
                value,
            })),
            category: WireCategory::Map,
            wire_type: WireType::Len,
            presence_tracked: false,
            wraps: None,
            oneof: field.oneof,
            default: DefaultValue::Empty,
        })
    }

    fn resolve_target(&self, type_name: &TypeName, scope: &str, path: &str) -> Result<Target> {
        let name = match type_name {
            TypeName::Scalar(scalar) => return Ok(Target::Scalar(*scalar)),
            TypeName::Named(name) => name,
        };

        let resolved = match self.registry.resolve(name, scope, self.file, path) {
            Ok(resolved) => resolved,
            Err(err @ Error::UnresolvedType { .. }) => {
                // Wrappers are well known even without wrappers.proto in the request
                let qualified = format!(".{}", name.trim_start_matches('.'));
                return match wrapped_scalar(&qualified) {
                    Some(scalar) if name.contains('.') => Ok(Target::Wrapper(scalar, qualified)),
                    _ => Err(err),
                };
            }
            Err(err) => return Err(err),
        };

        if let Some(scalar) = wrapped_scalar(&resolved.full_name) {
            return Ok(Target::Wrapper(scalar, resolved.full_name));
        }

        Ok(match resolved.kind {
            DeclKind::Message => Target::Message(resolved),
            DeclKind::Enum => {
                let default = self
                    .registry
                    .declaration(&resolved)
                    .and_then(|d| d.enum_default.clone())
                    .map(|(name, number)| DefaultValue::EnumMember { name, number })
                    .unwrap_or(DefaultValue::Zero);
                Target::Enum(resolved, default)
            }
        })
    }
}

/// Name protoc gives the entry message of a map field
///
/// Underscores are dropped and the letter after each one, plus the first,
/// is upper-cased. Everything else is kept as written, digits included.
pub fn map_entry_name(field: &str) -> String {
    let mut name = String::with_capacity(field.len() + 5);
    let mut upper = true;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            name.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            name.push(c);
        }
    }
    name.push_str("Entry");
    name
}

fn build_field(
    name: &str,
    number: u32,
    label: Label,
    target: Target,
    explicit_presence: bool,
    oneof: Option<usize>,
) -> CompiledField {
    let (ty, category, wire_type, wraps, mut presence, default) = match target {
        Target::Scalar(scalar) => (
            FieldType::Scalar(scalar),
            WireCategory::of_scalar(scalar),
            scalar_wire_type(scalar),
            None,
            false,
            DefaultValue::of_scalar(scalar),
        ),
        Target::Wrapper(scalar, wrapper) => (
            FieldType::Scalar(scalar),
            WireCategory::of_scalar(scalar),
            scalar_wire_type(scalar),
            Some(wrapper),
            true,
            DefaultValue::Absent,
        ),
        Target::Message(r) => (
            FieldType::Message(r),
            WireCategory::Message,
            WireType::Len,
            None,
            label == Label::Singular,
            DefaultValue::Absent,
        ),
        Target::Enum(r, default) => (
            FieldType::Enum(r),
            WireCategory::Enum,
            WireType::Varint,
            None,
            false,
            default,
        ),
    };

    presence |= explicit_presence;
    let default = match label {
        Label::Repeated | Label::Map => DefaultValue::Empty,
        Label::Singular if presence => DefaultValue::Absent,
        Label::Singular => default,
    };

    CompiledField {
        name: name.to_string(),
        number,
        label,
        ty,
        category,
        wire_type,
        presence_tracked: presence && label == Label::Singular,
        wraps,
        oneof,
        default,
    }
}

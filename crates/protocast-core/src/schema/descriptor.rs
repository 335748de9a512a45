//! Conversion from `prost_types` descriptors into the schema model.

use super::{
    Cardinality, Enum, EnumValue, Field, Import, Message, Method, Oneof, ScalarType, SchemaFile,
    Service, Syntax, TypeName,
};
use crate::error::{Error, Result};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto,
    ServiceDescriptorProto,
};
use std::collections::HashSet;

impl SchemaFile {
    /// Builds the schema model of one `FileDescriptorProto`
    ///
    /// Synthetic map entry messages are folded back into map fields and
    /// synthetic proto3 `optional` oneofs into the field's `optional` flag.
    pub fn from_descriptor(proto: &FileDescriptorProto) -> Result<Self> {
        if proto.name().is_empty() {
            return Err(Error::invalid_descriptor("file descriptor without a name"));
        }
        let syntax = Syntax::try_from(proto.syntax())?;

        let public_deps: HashSet<usize> =
            proto.public_dependency.iter().map(|&i| i as usize).collect();
        let imports = proto
            .dependency
            .iter()
            .enumerate()
            .map(|(i, dep)| Import {
                name: dep.clone(),
                public: public_deps.contains(&i),
            })
            .collect();

        let package = Some(proto.package())
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        let scope = match &package {
            Some(p) => format!(".{}", p),
            None => String::new(),
        };

        let messages = proto
            .message_type
            .iter()
            .map(|m| convert_message(m, syntax, &scope))
            .collect::<Result<_>>()?;
        let enums = proto
            .enum_type
            .iter()
            .map(|e| convert_enum(e, &scope))
            .collect::<Result<_>>()?;
        let services = proto
            .service
            .iter()
            .map(convert_service)
            .collect::<Result<_>>()?;

        Ok(Self {
            name: proto.name().to_string(),
            package,
            syntax,
            imports,
            messages,
            enums,
            services,
        })
    }
}

fn is_map_entry(message: &DescriptorProto) -> bool {
    message
        .options
        .as_ref()
        .is_some_and(|o| o.map_entry.unwrap_or(false))
}

/// Finds the map entry type a repeated message field points at, if any
fn map_entry_for<'a>(
    field: &FieldDescriptorProto,
    message: &'a DescriptorProto,
) -> Option<&'a DescriptorProto> {
    if field.label() != Label::Repeated || field.r#type() != Type::Message {
        return None;
    }

    let type_name = field.type_name();
    message.nested_type.iter().find(|nested| {
        let expected_name = format!(".{}", nested.name());
        is_map_entry(nested) && (type_name.ends_with(&expected_name) || type_name == nested.name())
    })
}

fn convert_message(message: &DescriptorProto, syntax: Syntax, scope: &str) -> Result<Message> {
    if message.name().is_empty() {
        return Err(Error::invalid_descriptor(format!(
            "message without a name in '{}'",
            scope
        )));
    }
    let path = format!("{}.{}", scope, message.name());

    // A oneof is synthetic when every member is a proto3 `optional` field
    let synthetic: Vec<bool> = (0..message.oneof_decl.len())
        .map(|i| {
            let mut members = message
                .field
                .iter()
                .filter(|f| f.oneof_index == Some(i as i32))
                .peekable();
            members.peek().is_some() && members.all(|f| f.proto3_optional())
        })
        .collect();

    let mut remap = Vec::with_capacity(message.oneof_decl.len());
    let mut oneofs = Vec::new();
    for (decl, is_synthetic) in message.oneof_decl.iter().zip(&synthetic) {
        if *is_synthetic {
            remap.push(None);
        } else {
            remap.push(Some(oneofs.len()));
            oneofs.push(Oneof {
                name: decl.name().to_string(),
            });
        }
    }

    let mut fields = Vec::with_capacity(message.field.len());
    for field in &message.field {
        let oneof = match field.oneof_index {
            Some(index) => *remap.get(index as usize).ok_or_else(|| {
                Error::invalid_descriptor(format!(
                    "field '{}.{}' refers to missing oneof {}",
                    path,
                    field.name(),
                    index
                ))
            })?,
            None => None,
        };
        fields.push(convert_field(field, message, syntax, &path, oneof)?);
    }

    let messages = message
        .nested_type
        .iter()
        .filter(|nested| !is_map_entry(nested))
        .map(|nested| convert_message(nested, syntax, &path))
        .collect::<Result<_>>()?;
    let enums = message
        .enum_type
        .iter()
        .map(|e| convert_enum(e, &path))
        .collect::<Result<_>>()?;

    Ok(Message {
        name: message.name().to_string(),
        fields,
        oneofs,
        messages,
        enums,
    })
}

fn convert_field(
    field: &FieldDescriptorProto,
    message: &DescriptorProto,
    syntax: Syntax,
    path: &str,
    oneof: Option<usize>,
) -> Result<Field> {
    let field_path = format!("{}.{}", path, field.name());
    let number = u32::try_from(field.number()).map_err(|_| Error::InvalidFieldNumber {
        field: field_path.clone(),
        number: i64::from(field.number()),
        max: crate::MAX_FIELD_NUMBER,
    })?;

    let (type_name, cardinality) = match map_entry_for(field, message) {
        Some(entry) => {
            let key = entry.field.iter().find(|f| f.number() == 1);
            let value = entry.field.iter().find(|f| f.number() == 2);
            let (Some(key), Some(value)) = (key, value) else {
                return Err(Error::invalid_descriptor(format!(
                    "map entry for '{}' lacks key or value",
                    field_path
                )));
            };
            let key = match field_type(key, &field_path)? {
                TypeName::Scalar(scalar) => scalar,
                TypeName::Named(name) => {
                    return Err(Error::InvalidMapKey {
                        field: field_path,
                        key_type: name,
                    })
                }
            };
            (field_type(value, &field_path)?, Cardinality::Map { key })
        }
        None => {
            let cardinality = if field.label() == Label::Repeated {
                Cardinality::Repeated
            } else {
                Cardinality::Singular
            };
            (field_type(field, &field_path)?, cardinality)
        }
    };

    let optional = field.proto3_optional()
        || (syntax == Syntax::Proto2 && oneof.is_none() && field.label() == Label::Optional);

    Ok(Field {
        name: field.name().to_string(),
        number,
        type_name,
        cardinality,
        optional,
        oneof,
    })
}

fn field_type(field: &FieldDescriptorProto, field_path: &str) -> Result<TypeName> {
    let named = || {
        if field.type_name().is_empty() {
            Err(Error::invalid_descriptor(format!(
                "field '{}' has neither a scalar type nor a type name",
                field_path
            )))
        } else {
            Ok(TypeName::Named(field.type_name().to_string()))
        }
    };

    // type_name alone is legal in parser output: message or enum, decided later
    let Some(code) = field.r#type else {
        return named();
    };
    let ty = Type::try_from(code).map_err(|_| {
        Error::invalid_descriptor(format!("field '{}' has unknown type code {}", field_path, code))
    })?;

    let scalar = match ty {
        Type::Double => ScalarType::Double,
        Type::Float => ScalarType::Float,
        Type::Int64 => ScalarType::Int64,
        Type::Uint64 => ScalarType::Uint64,
        Type::Int32 => ScalarType::Int32,
        Type::Fixed64 => ScalarType::Fixed64,
        Type::Fixed32 => ScalarType::Fixed32,
        Type::Bool => ScalarType::Bool,
        Type::String => ScalarType::String,
        Type::Bytes => ScalarType::Bytes,
        Type::Uint32 => ScalarType::Uint32,
        Type::Sfixed32 => ScalarType::Sfixed32,
        Type::Sfixed64 => ScalarType::Sfixed64,
        Type::Sint32 => ScalarType::Sint32,
        Type::Sint64 => ScalarType::Sint64,
        // Groups are compiled as embedded messages
        Type::Message | Type::Enum | Type::Group => return named(),
    };
    Ok(TypeName::Scalar(scalar))
}

fn convert_enum(enum_type: &EnumDescriptorProto, scope: &str) -> Result<Enum> {
    if enum_type.name().is_empty() {
        return Err(Error::invalid_descriptor(format!(
            "enum without a name in '{}'",
            scope
        )));
    }
    Ok(Enum {
        name: enum_type.name().to_string(),
        values: enum_type
            .value
            .iter()
            .map(|v| EnumValue {
                name: v.name().to_string(),
                number: v.number(),
            })
            .collect(),
    })
}

fn convert_service(service: &ServiceDescriptorProto) -> Result<Service> {
    let methods = service
        .method
        .iter()
        .map(|method| {
            if method.input_type().is_empty() || method.output_type().is_empty() {
                return Err(Error::invalid_descriptor(format!(
                    "method '{}.{}' lacks input or output type",
                    service.name(),
                    method.name()
                )));
            }
            Ok(Method {
                name: method.name().to_string(),
                input_type: method.input_type().to_string(),
                output_type: method.output_type().to_string(),
                client_streaming: method.client_streaming(),
                server_streaming: method.server_streaming(),
            })
        })
        .collect::<Result<_>>()?;

    Ok(Service {
        name: service.name().to_string(),
        methods,
    })
}

//! Plain Rust data types from compiled files.
//!
//! Every message becomes a struct and every enum a `#[repr(i32)]` enum.
//! Nested declarations and oneof enums live in a module named after the
//! owning message, so the generated file mirrors the schema's nesting.
//! References are written as relative paths (`super::...`), which assumes
//! each package is included as a module tree named after its segments.
//!
//! With [`RustRenderer::serde`] enabled the generated types also derive
//! `serde::Serialize` and `serde::Deserialize`, keyed by the schema's field
//! and member names, so the consuming crate can convert messages to and from
//! JSON or any other serde format. Missing fields deserialize to their
//! defaults.

use super::Renderer;
use crate::model::{
    CompiledEnum, CompiledField, CompiledFile, CompiledMessage, CompiledOneof, CompiledService,
    FieldType, Label, TypeRef,
};
use crate::schema::ScalarType;
use convert_case::{Case, Casing};
use std::collections::HashSet;
use std::fmt::{Result, Write};
use std::sync::LazyLock;

static BANNER: LazyLock<String> = LazyLock::new(|| {
    format!(
        "// @generated by protoc-gen-protocast {}. Do not edit.",
        crate::VERSION
    )
});

const KEYWORDS: [&str; 38] = [
    "as", "async", "await", "break", "const", "continue", "dyn", "else", "enum", "extern", "false",
    "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref",
    "return", "static", "struct", "trait", "true", "type", "unsafe", "use", "where", "while",
    "abstract", "become", "box", "try",
];

/// Keywords that cannot be raw identifiers
const RESERVED: [&str; 5] = ["self", "Self", "super", "crate", "_"];

/// Renders compiled files as Rust source
#[derive(Debug, Clone)]
pub struct RustRenderer {
    /// Indentation string (default: 4 spaces)
    pub indent_str: String,
    /// Document each field with its number and wire category
    pub field_comments: bool,
    /// Derive serde traits on generated types
    pub serde: bool,
}

impl Default for RustRenderer {
    fn default() -> Self {
        Self {
            indent_str: "    ".to_string(),
            field_comments: true,
            serde: false,
        }
    }
}

impl RustRenderer {
    /// Creates a renderer with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }

    /// Sets whether fields are documented
    pub fn field_comments(mut self, include: bool) -> Self {
        self.field_comments = include;
        self
    }

    /// Sets whether generated types derive `serde::Serialize` and `serde::Deserialize`
    pub fn serde(mut self, enable: bool) -> Self {
        self.serde = enable;
        self
    }
}

impl Renderer for RustRenderer {
    fn render_header(&mut self, file: &CompiledFile, out: &mut dyn Write) -> Result {
        writeln!(out, "{}", BANNER.as_str())?;
        writeln!(out, "// source: {}", file.name)?;
        if let Some(package) = &file.package {
            writeln!(out, "// package: {}", package)?;
        }
        Ok(())
    }

    fn render_body(&mut self, file: &CompiledFile, out: &mut dyn Write) -> Result {
        let mut writer = RustWriter::new(out, self, file);

        for message in &file.messages {
            writer.write_origin(&message.origin)?;
            writer.write_message(message)?;
        }
        for enumeration in &file.enums {
            writer.write_origin(&enumeration.origin)?;
            writer.write_enum(enumeration)?;
        }
        for service in &file.services {
            writer.write_service(service)?;
        }
        Ok(())
    }
}

struct RustWriter<'w, 'f, W: Write + ?Sized> {
    writer: &'w mut W,
    config: &'w RustRenderer,
    file: &'f CompiledFile,
    /// Canonical names of every declaration rendered into this file
    local: HashSet<&'f str>,
    /// Segments of the naming package
    package: Vec<&'f str>,
    indent_level: usize,
    /// Module nesting below the file root
    depth: usize,
}

impl<'w, 'f, W: Write + ?Sized> RustWriter<'w, 'f, W> {
    fn new(writer: &'w mut W, config: &'w RustRenderer, file: &'f CompiledFile) -> Self {
        fn collect<'f>(messages: &'f [CompiledMessage], local: &mut HashSet<&'f str>) {
            for message in messages {
                local.insert(&message.full_name);
                local.extend(message.enums.iter().map(|e| e.full_name.as_str()));
                collect(&message.messages, local);
            }
        }

        let mut local: HashSet<&str> = file.enums.iter().map(|e| e.full_name.as_str()).collect();
        collect(&file.messages, &mut local);

        Self {
            writer,
            config,
            file,
            local,
            package: package_segments(file.package.as_deref()),
            indent_level: 0,
            depth: 0,
        }
    }

    fn indent(&mut self) {
        self.indent_level += 1;
    }

    fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    fn write_indent(&mut self) -> Result {
        for _ in 0..self.indent_level {
            write!(self.writer, "{}", self.config.indent_str)?;
        }
        Ok(())
    }

    fn writeln(&mut self, s: &str) -> Result {
        self.write_indent()?;
        writeln!(self.writer, "{}", s)
    }

    fn write_derive(&mut self, traits: &str) -> Result {
        if self.config.serde {
            self.writeln(&format!(
                "#[derive({}, serde::Serialize, serde::Deserialize)]",
                traits
            ))
        } else {
            self.writeln(&format!("#[derive({})]", traits))
        }
    }

    /// Keeps the schema name on the wire when the identifier differs from it
    fn write_rename(&mut self, ident: &str, name: &str) -> Result {
        if self.config.serde && ident.trim_start_matches("r#") != name {
            self.writeln(&format!("#[serde(rename = \"{}\")]", name))?;
        }
        Ok(())
    }

    fn write_origin(&mut self, origin: &str) -> Result {
        if origin != self.file.name {
            self.writeln(&format!("// from {}", origin))?;
        }
        Ok(())
    }

    fn write_message(&mut self, message: &CompiledMessage) -> Result {
        let name = type_ident(&message.name);
        let module = module_ident(&message.name);
        let oneofs: Vec<&CompiledOneof> = message
            .oneofs
            .iter()
            .filter(|o| !o.members.is_empty())
            .collect();

        self.writeln(&format!("/// Message `{}`", message.full_name))?;
        self.write_derive("Debug, Clone, PartialEq, Default")?;
        if self.config.serde {
            self.writeln("#[serde(default)]")?;
        }
        self.writeln(&format!("pub struct {} {{", name))?;
        self.indent();

        for field in message.plain_fields() {
            if self.config.field_comments {
                self.write_field_comment(field)?;
            }
            let ident = field_ident(&field.name);
            self.write_rename(&ident, &field.name)?;
            let ty = self.field_type(field);
            self.writeln(&format!("pub {}: {},", ident, ty))?;
        }
        for oneof in &oneofs {
            if self.config.field_comments {
                let numbers: Vec<String> = message
                    .oneof_fields(oneof)
                    .map(|f| f.number.to_string())
                    .collect();
                self.writeln(&format!("/// Oneof `{}` ({})", oneof.name, numbers.join(", ")))?;
            }
            let ident = field_ident(&oneof.name);
            if self.config.serde {
                self.writeln("#[serde(flatten)]")?;
            }
            self.writeln(&format!(
                "pub {}: Option<{}::{}>,",
                ident,
                module,
                type_ident(&oneof.name)
            ))?;
        }

        self.dedent();
        self.writeln("}")?;
        writeln!(self.writer)?;

        if oneofs.is_empty() && message.messages.is_empty() && message.enums.is_empty() {
            return Ok(());
        }

        self.writeln(&format!("/// Nested types of `{}`", name))?;
        self.writeln(&format!("pub mod {} {{", module))?;
        self.indent();
        self.depth += 1;

        for oneof in oneofs {
            self.write_oneof(message, oneof)?;
        }
        for nested in &message.messages {
            self.write_message(nested)?;
        }
        for enumeration in &message.enums {
            self.write_enum(enumeration)?;
        }

        self.depth -= 1;
        self.dedent();
        self.writeln("}")?;
        writeln!(self.writer)?;
        Ok(())
    }

    fn write_oneof(&mut self, message: &CompiledMessage, oneof: &CompiledOneof) -> Result {
        self.writeln(&format!("/// Oneof `{}` of `{}`", oneof.name, message.full_name))?;
        self.write_derive("Debug, Clone, PartialEq")?;
        self.writeln(&format!("pub enum {} {{", type_ident(&oneof.name)))?;
        self.indent();
        for field in message.oneof_fields(oneof) {
            if self.config.field_comments {
                self.write_field_comment(field)?;
            }
            let ident = type_ident(&field.name);
            self.write_rename(&ident, &field.name)?;
            let ty = self.element_type(field);
            self.writeln(&format!("{}({}),", ident, ty))?;
        }
        self.dedent();
        self.writeln("}")?;
        writeln!(self.writer)?;
        Ok(())
    }

    fn write_field_comment(&mut self, field: &CompiledField) -> Result {
        let mut comment = format!("/// `{}` {}", field.number, field.category);
        if let Some(wrapper) = &field.wraps {
            comment.push_str(&format!(", unwrapped from `{}`", wrapper));
        }
        self.writeln(&comment)
    }

    fn write_enum(&mut self, enumeration: &CompiledEnum) -> Result {
        let name = type_ident(&enumeration.name);

        // Aliases share a number with an earlier member; a discriminant can appear once
        let mut numbers = HashSet::new();
        let mut idents = HashSet::new();
        let variants: Vec<(String, &str, i32)> = enumeration
            .values
            .iter()
            .filter_map(|value| {
                let ident = variant_ident(&enumeration.name, &value.name);
                if numbers.contains(&value.number) || idents.contains(&ident) {
                    return None;
                }
                numbers.insert(value.number);
                idents.insert(ident.clone());
                Some((ident, value.name.as_str(), value.number))
            })
            .collect();
        let fallback = variants[0].0.clone();

        self.writeln(&format!("/// Enum `{}`", enumeration.full_name))?;
        self.write_derive("Debug, Clone, Copy, PartialEq, Eq, Hash")?;
        self.writeln("#[repr(i32)]")?;
        self.writeln(&format!("pub enum {} {{", name))?;
        self.indent();
        for (ident, original, number) in &variants {
            self.write_rename(ident, original)?;
            self.writeln(&format!("{} = {},", ident, number))?;
        }
        self.dedent();
        self.writeln("}")?;
        writeln!(self.writer)?;

        self.writeln(&format!("impl {} {{", name))?;
        self.indent();
        self.writeln(&format!(
            "/// Maps a wire value to a member, unknown values become `{}`",
            fallback
        ))?;
        self.writeln("pub fn from_i32(value: i32) -> Self {")?;
        self.indent();
        self.writeln("match value {")?;
        self.indent();
        for (ident, _, number) in &variants {
            self.writeln(&format!("{} => Self::{},", number, ident))?;
        }
        self.writeln(&format!("_ => Self::{},", fallback))?;
        self.dedent();
        self.writeln("}")?;
        self.dedent();
        self.writeln("}")?;
        writeln!(self.writer)?;

        self.writeln("/// Member name as declared in the schema")?;
        self.writeln("pub fn as_str_name(&self) -> &'static str {")?;
        self.indent();
        self.writeln("match self {")?;
        self.indent();
        for (ident, original, _) in &variants {
            self.writeln(&format!("Self::{} => \"{}\",", ident, original))?;
        }
        self.dedent();
        self.writeln("}")?;
        self.dedent();
        self.writeln("}")?;
        writeln!(self.writer)?;

        self.writeln("/// Member for a name declared in the schema, aliases included")?;
        self.writeln("pub fn from_str_name(value: &str) -> Option<Self> {")?;
        self.indent();
        self.writeln("match value {")?;
        self.indent();
        for value in &enumeration.values {
            if let Some((ident, _, _)) = variants.iter().find(|(_, _, n)| *n == value.number) {
                self.writeln(&format!("\"{}\" => Some(Self::{}),", value.name, ident))?;
            }
        }
        self.writeln("_ => None,")?;
        self.dedent();
        self.writeln("}")?;
        self.dedent();
        self.writeln("}")?;
        self.dedent();
        self.writeln("}")?;
        writeln!(self.writer)?;

        self.writeln(&format!("impl Default for {} {{", name))?;
        self.indent();
        self.writeln("fn default() -> Self {")?;
        self.indent();
        self.writeln(&format!("Self::{}", fallback))?;
        self.dedent();
        self.writeln("}")?;
        self.dedent();
        self.writeln("}")?;
        writeln!(self.writer)?;
        Ok(())
    }

    fn write_service(&mut self, service: &CompiledService) -> Result {
        self.writeln(&format!("// service {} ({})", service.name, service.full_name))?;
        for method in &service.methods {
            let stream = |streaming: bool| if streaming { "stream " } else { "" };
            self.writeln(&format!(
                "//   rpc {}({}{}) returns ({}{})",
                method.name,
                stream(method.client_streaming),
                method.input.full_name,
                stream(method.server_streaming),
                method.output.full_name
            ))?;
        }
        writeln!(self.writer)?;
        Ok(())
    }

    fn field_type(&self, field: &CompiledField) -> String {
        if let FieldType::Map(entry) = &field.ty {
            return format!(
                "::std::collections::HashMap<{}, {}>",
                self.element_type(&entry.key),
                self.element_type(&entry.value)
            );
        }

        let element = self.element_type(field);
        match field.label {
            Label::Repeated => format!("Vec<{}>", element),
            _ if field.presence_tracked => format!("Option<{}>", element),
            _ => element,
        }
    }

    fn element_type(&self, field: &CompiledField) -> String {
        match &field.ty {
            FieldType::Scalar(scalar) => scalar_type(*scalar).to_string(),
            FieldType::Message(r) if field.presence_tracked => {
                format!("Box<{}>", self.type_path(r))
            }
            FieldType::Message(r) | FieldType::Enum(r) => self.type_path(r),
            FieldType::Map(entry) => entry.name.clone(),
        }
    }

    /// Path of a referenced declaration relative to the current module
    fn type_path(&self, r: &TypeRef) -> String {
        let mut segments: Vec<String> = Vec::new();

        let target_package = if self.file.is_package_overridden() {
            self.package.clone()
        } else {
            package_segments(r.package.as_deref())
        };
        let up = if self.local.contains(r.full_name.as_str()) || target_package == self.package {
            self.depth
        } else {
            segments.extend(target_package.iter().map(|s| module_ident(s)));
            self.depth + self.package.len()
        };

        let local: Vec<&str> = r.local_name().split('.').collect();
        if let Some((last, parents)) = local.split_last() {
            segments.extend(parents.iter().map(|p| module_ident(p)));
            segments.push(type_ident(last));
        }

        let mut path = "super::".repeat(up);
        path.push_str(&segments.join("::"));
        path
    }
}

fn package_segments(package: Option<&str>) -> Vec<&str> {
    package
        .map(|p| p.split('.').filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

fn scalar_type(scalar: ScalarType) -> &'static str {
    match scalar {
        ScalarType::Double => "f64",
        ScalarType::Float => "f32",
        ScalarType::Int32 | ScalarType::Sint32 | ScalarType::Sfixed32 => "i32",
        ScalarType::Int64 | ScalarType::Sint64 | ScalarType::Sfixed64 => "i64",
        ScalarType::Uint32 | ScalarType::Fixed32 => "u32",
        ScalarType::Uint64 | ScalarType::Fixed64 => "u64",
        ScalarType::Bool => "bool",
        ScalarType::String => "String",
        ScalarType::Bytes => "Vec<u8>",
    }
}

fn escape(ident: String) -> String {
    if RESERVED.contains(&ident.as_str()) {
        format!("{}_", ident)
    } else if KEYWORDS.contains(&ident.as_str()) {
        format!("r#{}", ident)
    } else if ident.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{}", ident)
    } else {
        ident
    }
}

fn type_ident(name: &str) -> String {
    escape(name.to_case(Case::UpperCamel))
}

fn module_ident(name: &str) -> String {
    escape(name.to_case(Case::Snake))
}

fn field_ident(name: &str) -> String {
    escape(name.to_case(Case::Snake))
}

/// Variant name with the `ENUM_NAME_` prefix stripped, as protoc plugins do
fn variant_ident(enum_name: &str, value: &str) -> String {
    let prefix = format!("{}_", enum_name.to_case(Case::UpperSnake));
    let stripped = value
        .strip_prefix(&prefix)
        .filter(|rest| rest.starts_with(|c: char| c.is_ascii_alphabetic()))
        .unwrap_or(value);
    type_ident(stripped)
}

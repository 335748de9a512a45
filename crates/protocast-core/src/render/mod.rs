//! Rendering compiled models into source text.
//!
//! A [`Renderer`] consumes a [`CompiledFile`] in two ordered stages, a header
//! and a body. Renderers never resolve anything: the compiled model already
//! carries canonical names, categories, groupings and defaults.
//!
//! Two renderers are provided:
//!
//! - [`RustRenderer`]: plain Rust data types;
//! - [`SummaryRenderer`]: declaration counts, for listings and dry runs.

mod rust;

use crate::model::{CompiledFile, CompiledMessage, FieldType};
use std::fmt::{Result, Write};

pub use rust::RustRenderer;

/// Two-stage renderer of compiled files
///
/// # Example
///
/// ```ignore
/// use protocast_core::render::Renderer;
///
/// struct NamesOnly;
///
/// impl Renderer for NamesOnly {
///     fn render_body(&mut self, file: &CompiledFile, out: &mut dyn Write) -> Result {
///         for message in &file.messages {
///             writeln!(out, "{}", message.full_name)?;
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Renderer {
    /// Writes the header stage
    fn render_header(&mut self, file: &CompiledFile, out: &mut dyn Write) -> Result {
        let _ = (file, out);
        Ok(())
    }

    /// Writes the body stage
    fn render_body(&mut self, file: &CompiledFile, out: &mut dyn Write) -> Result;

    /// Renders both stages, separated by a blank line
    fn render(&mut self, file: &CompiledFile) -> String {
        let mut out = String::new();
        self.render_to(file, &mut out).expect("String write cannot fail");
        out
    }

    /// Renders both stages into a writer
    fn render_to(&mut self, file: &CompiledFile, out: &mut dyn Write) -> Result {
        self.render_header(file, out)?;
        writeln!(out)?;
        self.render_body(file, out)
    }
}

/// A renderer that collects statistics about compiled files
#[derive(Debug, Default)]
pub struct SummaryRenderer {
    /// Number of messages, nested ones included
    pub message_count: usize,
    /// Number of fields
    pub field_count: usize,
    /// Number of map fields
    pub map_count: usize,
    /// Number of oneof groups
    pub oneof_count: usize,
    /// Number of enums, nested ones included
    pub enum_count: usize,
    /// Number of services
    pub service_count: usize,
    /// Number of methods
    pub method_count: usize,
}

impl SummaryRenderer {
    fn count_messages(&mut self, messages: &[CompiledMessage]) {
        for message in messages {
            self.message_count += 1;
            self.field_count += message.fields.len();
            self.map_count += message
                .fields
                .iter()
                .filter(|f| matches!(f.ty, FieldType::Map(_)))
                .count();
            self.oneof_count += message.oneofs.len();
            self.enum_count += message.enums.len();
            self.count_messages(&message.messages);
        }
    }
}

impl Renderer for SummaryRenderer {
    fn render_header(&mut self, file: &CompiledFile, out: &mut dyn Write) -> Result {
        writeln!(out, "file: {}", file.name)?;
        if let Some(package) = &file.package {
            writeln!(out, "package: {}", package)?;
        }
        Ok(())
    }

    fn render_body(&mut self, file: &CompiledFile, out: &mut dyn Write) -> Result {
        let before = (
            self.message_count,
            self.field_count,
            self.enum_count,
            self.service_count,
        );

        self.count_messages(&file.messages);
        self.enum_count += file.enums.len();
        self.service_count += file.services.len();
        self.method_count += file.services.iter().map(|s| s.methods.len()).sum::<usize>();

        writeln!(out, "messages: {}", self.message_count - before.0)?;
        writeln!(out, "fields: {}", self.field_count - before.1)?;
        writeln!(out, "enums: {}", self.enum_count - before.2)?;
        writeln!(out, "services: {}", self.service_count - before.3)?;
        let imported: Vec<&str> = file.referenced_files();
        if !imported.is_empty() {
            writeln!(out, "references: {}", imported.join(", "))?;
        }
        Ok(())
    }
}

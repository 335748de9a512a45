//! # protocast-core
//!
//! A Protocol Buffer schema compiler core: resolves type references across
//! imported files and turns parsed schemas into a renderer-ready model.
//!
//! This crate provides the core functionality for:
//! - Converting `FileDescriptorProto`s into a schema model
//! - Resolving type names through the import graph
//! - Classifying fields by wire encoding, map entries and presence
//! - Rendering the compiled model as Rust source
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`schema`]: Parsed schema model and descriptor conversion
//! - [`resolve`]: Import graph and per-request declaration registry
//! - [`classify`]: Wire categories, wrapper unwrapping, map entries
//! - [`compiler`]: The compiled model builder
//! - [`model`]: Renderer-ready compiled types
//! - [`render`]: Renderers
//! - [`plugin`]: The protoc plugin protocol
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```
//! use protocast_core::schema::{Field, Message, SchemaFile};
//! use protocast_core::{Compiler, Renderer, RustRenderer};
//!
//! let files = vec![
//!     SchemaFile::new("geo/point.proto")
//!         .package("geo")
//!         .message(Message::new("Point").field(Field::new("x", "int32", 1))),
//!     SchemaFile::new("geo/path.proto")
//!         .package("geo")
//!         .import("geo/point.proto")
//!         .message(Message::new("Path").field(Field::repeated("pts", "Point", 1))),
//! ];
//!
//! let compiled = Compiler::new().compile(&files)?;
//! let path = compiled[1].message(".geo.Path").unwrap();
//! assert_eq!(path.fields[0].type_ref().unwrap().full_name, ".geo.Point");
//!
//! let source = RustRenderer::new().render(&compiled[1]);
//! assert!(source.contains("pub struct Path"));
//! # Ok::<(), protocast_core::Error>(())
//! ```
//!
//! ## Extensibility
//!
//! The [`Renderer`] trait allows other output formats to be produced from the
//! same compiled model.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod classify;
pub mod compiler;
pub mod error;
pub mod model;
pub mod plugin;
pub mod render;
pub mod resolve;
pub mod schema;

// Re-export primary types for convenience
pub use compiler::{CompileOptions, Compiler};
pub use error::{Error, Result};
pub use model::{CompiledEnum, CompiledField, CompiledFile, CompiledMessage, TypeRef};
pub use plugin::PluginParameters;
pub use render::{Renderer, RustRenderer, SummaryRenderer};
pub use resolve::Registry;
pub use schema::SchemaFile;

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum valid protobuf field number (2^29 - 1)
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;

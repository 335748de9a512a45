//! Error types for the protocast-core library.
//!
//! Every schema problem is fatal for the request that contains it: the
//! compiler never produces a partial model. The one non-fatal condition,
//! an unknown enum number, is not an error at all and is handled by
//! [`CompiledEnum::value_for`](crate::model::CompiledEnum::value_for).

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for protocast operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all protocast operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A field or method names a type that matches no declaration in scope
    #[error("unresolved type '{type_name}' referenced by '{field}' in '{file}'")]
    UnresolvedType {
        /// The type name as written in the schema
        type_name: String,
        /// Fully qualified path of the referencing field or method
        field: String,
        /// File that contains the reference
        file: String,
    },

    /// An unqualified name matches declarations in several imported files
    #[error(
        "ambiguous type '{type_name}' referenced by '{field}': candidates {}",
        candidates.join(", ")
    )]
    AmbiguousType {
        /// The type name as written in the schema
        type_name: String,
        /// Fully qualified path of the referencing field or method
        field: String,
        /// Files declaring a matching name
        candidates: Vec<String>,
    },

    /// Two fields of one message share a field number
    #[error("fields '{first}' and '{second}' of message '{message}' share field number {number}")]
    DuplicateFieldNumber {
        /// Fully qualified message name
        message: String,
        /// The shared number
        number: u32,
        /// Name of the first field declared with the number
        first: String,
        /// Name of the second field declared with the number
        second: String,
    },

    /// The import graph contains a cycle
    #[error("import cycle detected: {}", cycle.join(" -> "))]
    ImportCycle {
        /// File names along the cycle, first and last are equal
        cycle: Vec<String>,
    },

    /// An import names a file that is not part of the request
    #[error("file '{file}' imports '{import}', which is not part of the request")]
    MissingImport {
        /// Importing file
        file: String,
        /// Missing import name
        import: String,
    },

    /// One file declares a fully qualified name twice
    #[error("'{name}' is declared twice in '{first_file}'")]
    DuplicateDeclaration {
        /// Canonical name
        name: String,
        /// File of the first declaration
        first_file: String,
        /// File of the second declaration
        second_file: String,
    },

    /// Two input files share a name
    #[error("file '{name}' appears more than once in the request")]
    DuplicateFile {
        /// The repeated file name
        name: String,
    },

    /// Invalid field number in descriptor
    #[error("invalid field number {number} for '{field}': must be between 0 and {max}")]
    InvalidFieldNumber {
        /// Fully qualified field path
        field: String,
        /// The invalid field number
        number: i64,
        /// Maximum valid field number
        max: u32,
    },

    /// Map key type that protobuf does not allow
    #[error("map field '{field}' uses '{key_type}' as key type")]
    InvalidMapKey {
        /// Fully qualified field path
        field: String,
        /// Declared key type
        key_type: String,
    },

    /// Enum declared without values
    #[error("enum '{name}' declares no values")]
    EmptyEnum {
        /// Fully qualified enum name
        name: String,
    },

    /// Unsupported proto syntax version
    #[error("unsupported proto syntax: '{syntax}'")]
    UnsupportedSyntax {
        /// The unsupported syntax string
        syntax: String,
    },

    /// Structurally malformed descriptor from the upstream parser
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Failed to decode a protobuf-encoded request or descriptor set
    #[error("failed to decode protobuf input: {0}")]
    DescriptorParse(#[from] prost::DecodeError),

    /// Unrecognized plugin parameter
    #[error("invalid plugin parameter '{parameter}'")]
    InvalidParameter {
        /// The offending `key[=value]` item
        parameter: String,
    },

    /// Strict enum lookup by name failed
    #[error("unknown value '{name}' for enum '{enum_name}'")]
    UnknownEnumName {
        /// Fully qualified enum name
        enum_name: String,
        /// Requested member name
        name: String,
    },

    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write output file
    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        /// Path to the file that failed to write
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to create output directory
    #[error("failed to create directory '{path}': {source}")]
    DirectoryCreate {
        /// Path to the directory that failed to create
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Creates a new unresolved type error
    pub fn unresolved_type(
        type_name: impl Into<String>,
        field: impl Into<String>,
        file: impl Into<String>,
    ) -> Self {
        Self::UnresolvedType {
            type_name: type_name.into(),
            field: field.into(),
            file: file.into(),
        }
    }

    /// Creates a new ambiguous type error
    pub fn ambiguous_type(
        type_name: impl Into<String>,
        field: impl Into<String>,
        candidates: Vec<String>,
    ) -> Self {
        Self::AmbiguousType {
            type_name: type_name.into(),
            field: field.into(),
            candidates,
        }
    }

    /// Creates a new missing import error
    pub fn missing_import(file: impl Into<String>, import: impl Into<String>) -> Self {
        Self::MissingImport {
            file: file.into(),
            import: import.into(),
        }
    }

    /// Creates a new invalid descriptor error
    pub fn invalid_descriptor(msg: impl Into<String>) -> Self {
        Self::InvalidDescriptor(msg.into())
    }

    /// Creates a new invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
        }
    }

    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new file write error
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Creates a new directory creation error
    pub fn directory_create(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DirectoryCreate {
            path: path.into(),
            source,
        }
    }

    /// Returns true if the error describes a problem in the schema itself
    ///
    /// Schema errors are reported back to protoc in the plugin response;
    /// everything else is an environment failure of the generator.
    pub fn is_schema_error(&self) -> bool {
        !matches!(
            self,
            Self::DescriptorParse(_)
                | Self::FileRead { .. }
                | Self::FileWrite { .. }
                | Self::DirectoryCreate { .. }
        )
    }
}

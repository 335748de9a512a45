//! protoc plugin protocol.
//!
//! protoc writes a `CodeGeneratorRequest` to the plugin's stdin and expects
//! a `CodeGeneratorResponse` on stdout. `file_to_generate` selects what to
//! render while `proto_file` carries every transitive import, in dependency
//! order. Schema errors are returned in the response's `error` field, which
//! protoc prints next to the offending file.
//!
//! ## Parameters
//!
//! The comma separated `--protocast_opt` string accepts:
//!
//! - `include_imports` or `include_imports=true|false`
//! - `package_override=<package>`
//! - `module_override=<dotted.path>`
//! - `serde` or `serde=true|false`, deriving serde traits on generated types

use crate::compiler::{CompileOptions, Compiler};
use crate::error::{Error, Result};
use crate::render::{Renderer, RustRenderer};
use crate::schema::SchemaFile;
use bytes::Buf;
use prost::Message;
use prost_types::compiler::code_generator_response::{Feature, File};
use prost_types::compiler::{CodeGeneratorRequest, CodeGeneratorResponse};
use prost_types::{FileDescriptorProto, FileDescriptorSet};
use tracing::{debug, info};

/// Options carried by the plugin `parameter` string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginParameters {
    /// Inline the declarations of transitively imported files
    pub include_imports: bool,
    /// Package used for naming instead of the declared one
    pub package_override: Option<String>,
    /// Dotted module path replacing the directory of output files
    pub module_override: Option<String>,
    /// Derive `serde::Serialize` and `serde::Deserialize` on generated types
    pub serde: bool,
}

impl PluginParameters {
    /// Creates parameters with default values
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

    /// Sets the module override
    pub fn module_override(mut self, module: impl Into<String>) -> Self {
        self.module_override = Some(module.into());
        self
    }

    /// Sets whether generated types derive serde traits
    pub fn serde(mut self, enable: bool) -> Self {
        self.serde = enable;
        self
    }

    /// Parses a protoc parameter string
    pub fn parse(parameter: &str) -> Result<Self> {
        let mut params = Self::default();

        for part in parameter.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = match part.split_once('=') {
                Some((key, value)) => (key.trim(), Some(value.trim())),
                None => (part, None),
            };
            match (key, value) {
                ("include_imports", None | Some("true")) => params.include_imports = true,
                ("include_imports", Some("false")) => params.include_imports = false,
                ("serde", None | Some("true")) => params.serde = true,
                ("serde", Some("false")) => params.serde = false,
                ("package_override", Some(package)) if !package.is_empty() => {
                    params.package_override = Some(package.to_string());
                }
                ("module_override", Some(module)) if !module.is_empty() => {
                    params.module_override = Some(module.to_string());
                }
                _ => return Err(Error::invalid_parameter(part)),
            }
        }

        Ok(params)
    }

    /// Compiler options these parameters select
    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            include_imports: self.include_imports,
            package_override: self.package_override.clone(),
        }
    }

    /// Rust renderer configured by these parameters
    pub fn renderer(&self) -> RustRenderer {
        RustRenderer::new().serde(self.serde)
    }

    /// Name of the generated file for a `.proto` file name
    ///
    /// `geo/point.proto` becomes `geo/point.rs`; with a module override of
    /// `shapes.v1` it becomes `shapes/v1/point.rs`.
    pub fn output_name(&self, proto_name: &str) -> String {
        let stem = proto_name.strip_suffix(".proto").unwrap_or(proto_name);
        let stem = match &self.module_override {
            Some(module) => {
                let base = stem.rsplit('/').next().unwrap_or(stem);
                format!("{}/{}", module.replace('.', "/"), base)
            }
            None => stem.to_string(),
        };
        format!("{}.rs", stem)
    }
}

/// Decodes a `CodeGeneratorRequest`
pub fn decode_request(buf: impl Buf) -> Result<CodeGeneratorRequest> {
    Ok(CodeGeneratorRequest::decode(buf)?)
}

/// Decodes a serialized `FileDescriptorSet` into schema files
pub fn decode_descriptor_set(buf: impl Buf) -> Result<Vec<SchemaFile>> {
    let set = FileDescriptorSet::decode(buf)?;
    schema_files(&set.file)
}

/// Converts descriptors into schema files, keeping their order
pub fn schema_files(protos: &[FileDescriptorProto]) -> Result<Vec<SchemaFile>> {
    protos.iter().map(SchemaFile::from_descriptor).collect()
}

/// Answers a request with Rust output
///
/// A malformed parameter string is reported by [`generate_with`].
pub fn generate(request: &CodeGeneratorRequest) -> CodeGeneratorResponse {
    let mut renderer = PluginParameters::parse(request.parameter())
        .map(|params| params.renderer())
        .unwrap_or_default();
    generate_with(request, &mut renderer)
}

/// Answers a request using the given renderer
///
/// Never fails: errors are reported through the response.
pub fn generate_with(
    request: &CodeGeneratorRequest,
    renderer: &mut dyn Renderer,
) -> CodeGeneratorResponse {
    let mut response = CodeGeneratorResponse {
        supported_features: Some(Feature::Proto3Optional as u64),
        ..Default::default()
    };

    match try_generate(request, renderer) {
        Ok(files) => response.file = files,
        Err(e) => {
            debug!("Request failed: {}", e);
            response.error = Some(e.to_string());
        }
    }
    response
}

fn try_generate(
    request: &CodeGeneratorRequest,
    renderer: &mut dyn Renderer,
) -> Result<Vec<File>> {
    let params = PluginParameters::parse(request.parameter())?;
    let files = schema_files(&request.proto_file)?;
    let selected: Vec<&str> = request.file_to_generate.iter().map(String::as_str).collect();

    let compiler = Compiler::with_options(params.compile_options());
    let compiled = compiler.compile_selected(&files, &selected)?;

    let outputs = compiled
        .iter()
        .map(|file| {
            let name = params.output_name(&file.name);
            info!("Generated {} from {}", name, file.name);
            File {
                name: Some(name),
                content: Some(renderer.render(file)),
                ..Default::default()
            }
        })
        .collect();
    Ok(outputs)
}

/// Encodes a response for stdout
pub fn encode_response(response: &CodeGeneratorResponse) -> Vec<u8> {
    response.encode_to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::SummaryRenderer;
    use prost_types::field_descriptor_proto::{Label, Type};
    use prost_types::{DescriptorProto, FieldDescriptorProto};

    fn field(name: &str, number: i32, ty: Type, type_name: Option<&str>) -> FieldDescriptorProto {
        let mut field = FieldDescriptorProto {
            name: Some(name.to_string()),
            number: Some(number),
            type_name: type_name.map(str::to_string),
            ..Default::default()
        };
        field.set_label(Label::Optional);
        field.set_type(ty);
        field
    }

    fn point_request(parameter: Option<&str>) -> CodeGeneratorRequest {
        let geo = FileDescriptorProto {
            name: Some("geo/point.proto".into()),
            package: Some("geo".into()),
            syntax: Some("proto3".into()),
            message_type: vec![DescriptorProto {
                name: Some("Point".into()),
                field: vec![field("x", 1, Type::Int32, None), field("y", 2, Type::Int32, None)],
                ..Default::default()
            }],
            ..Default::default()
        };
        let path = FileDescriptorProto {
            name: Some("geo/path.proto".into()),
            package: Some("geo".into()),
            syntax: Some("proto3".into()),
            dependency: vec!["geo/point.proto".into()],
            message_type: vec![DescriptorProto {
                name: Some("Path".into()),
                field: vec![{
                    let mut f = field("pts", 1, Type::Message, Some(".geo.Point"));
                    f.set_label(Label::Repeated);
                    f
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        CodeGeneratorRequest {
            file_to_generate: vec!["geo/path.proto".into()],
            parameter: parameter.map(str::to_string),
            proto_file: vec![geo, path],
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_parameters() {
        assert_eq!(PluginParameters::parse("").unwrap(), PluginParameters::default());
        assert_eq!(
            PluginParameters::parse("include_imports, package_override=geo.v2").unwrap(),
            PluginParameters::new().include_imports(true).package_override("geo.v2")
        );
        assert_eq!(
            PluginParameters::parse("include_imports=false,module_override=out.gen").unwrap(),
            PluginParameters::new().module_override("out.gen")
        );
        assert_eq!(
            PluginParameters::parse("serde,include_imports").unwrap(),
            PluginParameters::new().include_imports(true).serde(true)
        );
        assert!(!PluginParameters::parse("serde=false").unwrap().serde);
    }

    #[test]
    fn test_parse_rejects_unknown_and_malformed() {
        for bad in [
            "verbose",
            "include_imports=maybe",
            "package_override=",
            "module_override",
            "serde=yes",
        ] {
            assert!(
                matches!(PluginParameters::parse(bad), Err(Error::InvalidParameter { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_output_name() {
        let params = PluginParameters::new();
        assert_eq!(params.output_name("geo/point.proto"), "geo/point.rs");
        assert_eq!(params.output_name("plain"), "plain.rs");

        let params = params.module_override("shapes.v1");
        assert_eq!(params.output_name("geo/point.proto"), "shapes/v1/point.rs");
        assert_eq!(params.output_name("top.proto"), "shapes/v1/top.rs");
    }

    #[test]
    fn test_generate_selected_file_only() {
        let response = generate(&point_request(None));
        assert_eq!(response.error, None);
        assert_eq!(response.supported_features, Some(Feature::Proto3Optional as u64));
        assert_eq!(response.file.len(), 1);

        let file = &response.file[0];
        assert_eq!(file.name(), "geo/path.rs");
        assert!(file.content().contains("pub pts: Vec<Point>,"));
        assert!(!file.content().contains("pub struct Point"));
    }

    #[test]
    fn test_generate_with_inlined_imports() {
        let response = generate(&point_request(Some("include_imports")));
        let content = response.file[0].content();
        assert!(content.contains("pub struct Path"));
        assert!(content.contains("// from geo/point.proto"));
        assert!(content.contains("pub struct Point"));
    }

    #[test]
    fn test_generate_with_serde() {
        let content = generate(&point_request(Some("serde"))).file[0].content().to_string();
        assert!(content.contains(
            "serde::Serialize, serde::Deserialize)]\n#[serde(default)]\npub struct Path {"
        ));

        let plain = generate(&point_request(None));
        assert!(!plain.file[0].content().contains("serde"));
    }

    #[test]
    fn test_errors_go_into_response() {
        let mut request = point_request(None);
        request.proto_file[1].message_type[0].field[0].type_name = Some(".geo.Pointe".into());
        let response = generate(&request);
        assert!(response.file.is_empty());
        assert!(response.error().contains("unresolved type '.geo.Pointe'"));

        let response = generate(&point_request(Some("colour=blue")));
        assert!(response.error().contains("invalid plugin parameter 'colour=blue'"));
    }

    #[test]
    fn test_generate_with_summary() {
        let mut renderer = SummaryRenderer::default();
        let response = generate_with(&point_request(None), &mut renderer);
        assert_eq!(renderer.message_count, 1);
        assert!(response.file[0].content().contains("references: geo/point.proto"));
    }

    #[test]
    fn test_decode_round_trip() {
        let request = point_request(Some("include_imports"));
        let bytes = bytes::Bytes::from(request.encode_to_vec());
        assert_eq!(decode_request(bytes).unwrap(), request);

        let err = decode_request(&[0xff, 0xff, 0xff][..]).unwrap_err();
        assert!(!err.is_schema_error());
    }

    #[test]
    fn test_decode_descriptor_set() {
        let set = FileDescriptorSet {
            file: point_request(None).proto_file,
        };
        let files = decode_descriptor_set(set.encode_to_vec().as_slice()).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].imports[0].name, "geo/point.proto");
    }
}

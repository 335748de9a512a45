//! protocast - compile Protocol Buffer schemas into Rust data types
//!
//! Without input flags this binary speaks the protoc plugin protocol on
//! stdin/stdout, so it can be installed as `protoc-gen-protocast` and driven
//! by `protoc --protocast_out=...`. Given a serialized `FileDescriptorSet`
//! (or a directory of them) it compiles offline and writes the generated
//! files itself.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, ValueEnum};
use protocast_core::plugin::{self, PluginParameters};
use protocast_core::{Compiler, Renderer, RustRenderer, SchemaFile, SummaryRenderer};
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, error, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Extensions recognized as serialized descriptor sets
const DESCRIPTOR_EXTENSIONS: [&str; 3] = ["pb", "binpb", "desc"];

/// Compile Protocol Buffer schemas into Rust data types
#[derive(Parser, Debug)]
#[command(name = "protoc-gen-protocast")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// Schema file to generate, as named in the descriptor set (repeatable;
    /// default: every file in the set)
    #[arg(short, long = "file", value_name = "NAME")]
    files: Vec<String>,

    /// Output directory for generated files
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Inline the declarations of imported files into each output
    #[arg(long)]
    include_imports: bool,

    /// Package used for naming instead of the declared one
    #[arg(long, value_name = "PACKAGE")]
    package_override: Option<String>,

    /// Dotted module path replacing the directory of output files
    #[arg(long, value_name = "MODULE")]
    module_override: Option<String>,

    /// Derive serde::Serialize and serde::Deserialize on generated types
    #[arg(long)]
    serde: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value = "rust")]
    format: OutputFormat,

    /// Dry run - don't write files, just show what would be generated
    #[arg(long)]
    dry_run: bool,

    /// Overwrite existing files whose content differs
    #[arg(long)]
    force: bool,
}

/// Offline inputs; plugin mode on stdin/stdout when neither is given
#[derive(Args, Debug)]
#[group(required = false, multiple = false)]
struct InputMode {
    /// Serialized FileDescriptorSet (protoc --include_imports --descriptor_set_out)
    #[arg(short = 's', long, value_name = "FILE")]
    descriptor_set: Option<PathBuf>,

    /// Directory searched recursively for descriptor sets (*.pb, *.binpb, *.desc)
    #[arg(short, long, value_name = "DIR")]
    directory: Option<PathBuf>,
}

/// Output format for compiled files
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Rust source files
    Rust,
    /// Declaration counts per file, printed instead of written
    Summary,
}

impl Cli {
    fn parameters(&self) -> PluginParameters {
        PluginParameters {
            include_imports: self.include_imports,
            package_override: self.package_override.clone(),
            module_override: self.module_override.clone(),
            serde: self.serde,
        }
    }
}

/// Tracks generated outputs for deduplication across descriptor sets
#[derive(Default)]
struct OutputRegistry {
    /// Maps output path -> content hash
    seen: HashMap<PathBuf, String>,
    /// Statistics
    stats: OutputStats,
}

#[derive(Default)]
struct OutputStats {
    generated: usize,
    duplicates_skipped: usize,
    conflicts_skipped: usize,
    unchanged: usize,
    written: usize,
}

impl OutputRegistry {
    fn new() -> Self {
        Self::default()
    }

    /// Compute the blake3 hash of the content
    fn content_hash(content: &[u8]) -> String {
        blake3::hash(content).to_hex().to_string()
    }

    /// Register an output and return its path unless it was already produced
    fn register(&mut self, path: PathBuf, content_hash: &str) -> Option<PathBuf> {
        self.stats.generated += 1;

        match self.seen.get(&path) {
            Some(existing) if existing == content_hash => {
                debug!("Skipping duplicate: {}", path.display());
                self.stats.duplicates_skipped += 1;
                None
            }
            Some(_) => {
                warn!(
                    "Skipping conflict: {} was already generated with different content",
                    path.display()
                );
                self.stats.conflicts_skipped += 1;
                None
            }
            None => {
                self.seen.insert(path.clone(), content_hash.to_string());
                Some(path)
            }
        }
    }

    fn print_summary(&self) {
        info!(
            "Summary: {} generated, {} duplicates skipped, {} conflicts skipped, {} unchanged, {} written",
            self.stats.generated,
            self.stats.duplicates_skipped,
            self.stats.conflicts_skipped,
            self.stats.unchanged,
            self.stats.written
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; stdout carries the plugin response
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut rust = cli.parameters().renderer();
    let mut summary = SummaryRenderer::default();
    let renderer: &mut dyn Renderer = match cli.format {
        OutputFormat::Rust => &mut rust,
        OutputFormat::Summary => &mut summary,
    };

    if let Some(ref set) = cli.input.descriptor_set {
        process_single_set(&cli, set, renderer)?;
    } else if let Some(ref directory) = cli.input.directory {
        process_directory(&cli, directory, renderer)?;
    } else {
        return run_plugin(&cli, renderer);
    }

    if cli.format == OutputFormat::Summary {
        println!(
            "total: {} messages, {} fields, {} maps, {} oneofs, {} enums, {} services, {} methods",
            summary.message_count,
            summary.field_count,
            summary.map_count,
            summary.oneof_count,
            summary.enum_count,
            summary.service_count,
            summary.method_count
        );
    }
    Ok(())
}

/// Answer one protoc request from stdin on stdout
fn run_plugin(cli: &Cli, renderer: &mut dyn Renderer) -> Result<()> {
    let mut input = Vec::new();
    std::io::stdin()
        .read_to_end(&mut input)
        .context("Failed to read CodeGeneratorRequest from stdin")?;

    let request = plugin::decode_request(input.as_slice())
        .context("Failed to decode CodeGeneratorRequest")?;
    debug!(
        "Plugin request: {} file(s) to generate, {} in namespace",
        request.file_to_generate.len(),
        request.proto_file.len()
    );

    let response = match cli.format {
        // The request's own parameters may ask for serde too
        OutputFormat::Rust => {
            let serde = cli.serde
                || PluginParameters::parse(request.parameter()).is_ok_and(|p| p.serde);
            plugin::generate_with(&request, &mut RustRenderer::new().serde(serde))
        }
        OutputFormat::Summary => plugin::generate_with(&request, renderer),
    };
    if let Some(ref message) = response.error {
        debug!("Reporting error to protoc: {}", message);
    }

    std::io::stdout()
        .write_all(&plugin::encode_response(&response))
        .context("Failed to write CodeGeneratorResponse to stdout")?;
    Ok(())
}

/// Process a single descriptor set file
fn process_single_set(cli: &Cli, set: &Path, renderer: &mut dyn Renderer) -> Result<()> {
    if !set.exists() {
        bail!("Descriptor set does not exist: {}", set.display());
    }
    if !set.is_file() {
        bail!("Descriptor set path is not a file: {}", set.display());
    }

    let mut outputs = OutputRegistry::new();
    process_descriptor_set(cli, set, true, renderer, &mut outputs)?;

    if cli.format == OutputFormat::Rust && !cli.dry_run {
        outputs.print_summary();
    }
    Ok(())
}

/// Process every descriptor set found in a directory, recursively
fn process_directory(cli: &Cli, directory: &Path, renderer: &mut dyn Renderer) -> Result<()> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());

    let mut outputs = OutputRegistry::new();
    let mut sets_processed = 0;

    for entry in WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() || !is_descriptor_set(path) {
            trace!("Skipping: {}", path.display());
            continue;
        }

        debug!("Processing descriptor set: {}", path.display());
        if let Err(e) = process_descriptor_set(cli, path, false, renderer, &mut outputs) {
            // Log error but continue with other sets
            warn!("Error processing {}: {:#}", path.display(), e);
        }
        sets_processed += 1;
    }

    info!("Processed {} descriptor sets", sets_processed);

    if cli.format == OutputFormat::Rust && !cli.dry_run {
        outputs.print_summary();
    }
    Ok(())
}

/// Whether a path looks like a serialized descriptor set
fn is_descriptor_set(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false);

    !hidden
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| DESCRIPTOR_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false)
}

/// Names of the files to generate from a set
///
/// Requested names missing from the set are an error when `strict`, and
/// ignored otherwise.
fn select_files<'a>(
    files: &'a [SchemaFile],
    requested: &'a [String],
    strict: bool,
) -> Vec<&'a str> {
    if requested.is_empty() {
        return files.iter().map(|f| f.name.as_str()).collect();
    }
    requested
        .iter()
        .map(String::as_str)
        .filter(|name| strict || files.iter().any(|f| f.name == *name))
        .collect()
}

/// Compile one descriptor set and emit its outputs
fn process_descriptor_set(
    cli: &Cli,
    set: &Path,
    strict: bool,
    renderer: &mut dyn Renderer,
    outputs: &mut OutputRegistry,
) -> Result<()> {
    trace!("Reading {}", set.display());
    let data = fs::read(set)
        .with_context(|| format!("Failed to read descriptor set: {}", set.display()))?;

    let files = plugin::decode_descriptor_set(data.as_slice())
        .with_context(|| format!("Failed to decode descriptor set: {}", set.display()))?;
    let selected = select_files(&files, &cli.files, strict);
    if selected.is_empty() {
        trace!("Nothing to generate from {}", set.display());
        return Ok(());
    }

    let params = cli.parameters();
    let compiled = Compiler::with_options(params.compile_options())
        .compile_selected(&files, &selected)
        .with_context(|| format!("Failed to compile {}", set.display()))?;

    debug!("Compiled {} file(s) from {}", compiled.len(), set.display());

    for file in &compiled {
        let content = renderer.render(file);

        if cli.format == OutputFormat::Summary {
            println!("{}", content);
            continue;
        }

        let name = params.output_name(&file.name);
        let path = output_path(&cli.output, &name)?;
        let content_hash = OutputRegistry::content_hash(content.as_bytes());

        let Some(path) = outputs.register(path, &content_hash) else {
            continue;
        };

        if is_unchanged(&path, &content_hash) {
            debug!("Unchanged: {}", path.display());
            outputs.stats.unchanged += 1;
            continue;
        }

        if cli.dry_run {
            println!("Would write: {}", path.display());
            if cli.verbose > 0 {
                println!("---");
                println!("{}", content);
                println!("---");
            }
        } else {
            match write_output_file(&path, &content, cli.force) {
                Ok(()) => {
                    println!("Wrote {}", path.display());
                    outputs.stats.written += 1;
                }
                Err(e) => {
                    error!("Failed to write {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(())
}

/// Join a generated name onto the output directory, refusing to leave it
fn output_path(output_dir: &Path, name: &str) -> Result<PathBuf> {
    let relative = Path::new(name);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        bail!("Refusing to write outside the output directory: {}", name);
    }
    Ok(output_dir.join(relative))
}

/// Whether the file on disk already holds exactly this content
fn is_unchanged(path: &Path, content_hash: &str) -> bool {
    fs::read(path)
        .map(|existing| OutputRegistry::content_hash(&existing) == content_hash)
        .unwrap_or(false)
}

/// Write a generated file to disk
fn write_output_file(output_path: &Path, content: &str, force: bool) -> Result<()> {
    // Create parent directories
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    if output_path.exists() && !force {
        bail!(
            "File already exists with different content: {} (use --force to overwrite)",
            output_path.display()
        );
    }

    let mut file = fs::File::create(output_path)
        .with_context(|| format!("Failed to create file: {}", output_path.display()))?;

    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write file: {}", output_path.display()))?;

    Ok(())
}

//! IDL code generator for meridian interfaces.
//!
//! Consumes an interface-definition file and emits the artifacts the
//! runtime consumes: the interface source (traits, param structs, stable
//! ordinals), the proxy and stub sources, optional mocks, optional
//! Protocol Buffers schemas with their prost mirrors, and the `check_sums/`
//! tree build systems key incremental regeneration on.
//!
//! Generation is deterministic: identical input produces byte-identical
//! output, and files are only written when their content would change.

pub mod ast;
pub mod fingerprint;
pub mod names;
pub mod parser;

mod emit;
mod pbgen;
mod protogen;
mod rustgen;
mod templates;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

pub use emit::GenerationReport;
pub use templates::{collect_instantiations, ConcreteStruct};

/// The protocol version interface ordinals are pinned to.
pub const PROTOCOL_VERSION: u64 = 3;

/// Generator errors.
#[derive(Error, Debug)]
pub enum GenError {
    /// The IDL could not be parsed.
    #[error("parse error at {file}:{line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    /// The input files could not be read or resolved.
    #[error("input error: {0}")]
    Input(String),

    /// An output file could not be written.
    #[error("output error: {0}")]
    Output(String),

    /// The IDL uses a construct the requested target cannot express.
    #[error("unsupported construct: {0}")]
    Unsupported(String),
}

impl GenError {
    pub(crate) fn parse(path: &Path, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            file: path.display().to_string(),
            line,
            message: message.into(),
        }
    }
}

/// One full generator invocation.
#[derive(Debug, Clone, Default)]
pub struct GeneratorOptions {
    /// Base filename stem for generated files.
    pub name: String,
    /// Input IDL path.
    pub idl: PathBuf,
    /// Root of the generated tree.
    pub output_path: PathBuf,
    /// Relative filename for the optional mock source.
    pub mock: Option<PathBuf>,
    /// Emit the serde-backed encodings.
    pub yas: bool,
    /// Emit Protocol Buffers schemas and mirrors.
    pub protobuf: bool,
    /// Include paths for import resolution.
    pub include_paths: Vec<PathBuf>,
    /// Target namespaces wrapping the generated code.
    pub namespaces: Vec<String>,
    /// Preprocessor defines (`NAME` or `NAME=value`).
    pub defines: Vec<String>,
    /// Extra `use` lines for the interface and proxy sources.
    pub additional_headers: Vec<String>,
    /// Implementation error types that pass through stub dispatch.
    pub rethrow_stub_exceptions: Vec<String>,
    /// Extra `use` lines for the stub source.
    pub additional_stub_headers: Vec<String>,
    /// Propagate implementation panics instead of converting them.
    pub suppress_catch_stub_exceptions: bool,
    /// Omit the core RPC `use` prelude from generated sources.
    pub no_include_rpc_headers: bool,
}

/// Preprocesses the input and returns the expanded text without
/// generating anything. Backs `--dump_preprocessor`.
pub fn preprocess_only(options: &GeneratorOptions) -> Result<String, GenError> {
    let preprocessor = parser::Preprocessor::new(options.include_paths.clone(), &options.defines);
    Ok(preprocessor.load(&options.idl)?.preprocessed)
}

/// Runs the generator end to end.
pub fn run(options: &GeneratorOptions) -> Result<GenerationReport, GenError> {
    let preprocessor = parser::Preprocessor::new(options.include_paths.clone(), &options.defines);
    let parsed = preprocessor.load(&options.idl)?;
    let tree = parsed.tree;

    let module_name = format!("{}_idl", options.name);
    let rust_options = rustgen::RustGenOptions {
        module_name: &options.name,
        namespaces: &options.namespaces,
        additional_headers: &options.additional_headers,
        additional_stub_headers: &options.additional_stub_headers,
        rethrow_stub_exceptions: &options.rethrow_stub_exceptions,
        suppress_catch_stub_exceptions: options.suppress_catch_stub_exceptions,
        include_rpc_headers: !options.no_include_rpc_headers,
        enable_protobuf: options.protobuf,
        protocol_version: PROTOCOL_VERSION,
    };

    let sources = rustgen::write_sources(&tree, &rust_options, options.mock.is_some())?;
    let mut report = GenerationReport::default();

    let src = options.output_path.join("src");
    report.emit(&src.join(format!("{}.rs", options.name)), &sources.interfaces)?;
    report.emit(
        &src.join(format!("{}_proxy.rs", options.name)),
        &sources.proxies,
    )?;
    report.emit(&src.join(format!("{}_stub.rs", options.name)), &sources.stubs)?;

    if let (Some(mock_path), Some(mock)) = (&options.mock, &sources.mock) {
        report.emit(&src.join(mock_path), mock)?;
    }

    let mut schema_files = Vec::new();
    if options.protobuf {
        let proto = protogen::write_files(&tree, &options.name)?;
        let proto_dir = options.output_path.join("proto");
        for (file, content) in &proto.files {
            report.emit(&proto_dir.join(file), content)?;
            schema_files.push(format!("proto/{file}"));
        }
    }

    emit::write_checksums(&mut report, &tree, &options.output_path, PROTOCOL_VERSION)?;
    emit::write_manifest(&mut report, &options.output_path, &schema_files)?;

    info!(
        module = module_name,
        written = report.written.len(),
        unchanged = report.unchanged.len(),
        "generation complete"
    );
    Ok(report)
}

//! meridian-gen - generate Rust sources and schemas from idl files.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use meridian_gen::{preprocess_only, run, GeneratorOptions};

#[derive(Parser)]
#[command(name = "meridian-gen")]
#[command(about = "Generate Rust sources and schemas from idl files")]
#[command(version)]
struct Cli {
    /// Base name for generated files (e.g. 'example_shared' or 'rpc_types')
    #[arg(short = 'n', long)]
    name: String,

    /// The idl to be parsed
    #[arg(short = 'i', long)]
    idl: PathBuf,

    /// The base output path
    #[arg(short = 'p', long)]
    output_path: PathBuf,

    /// The generated mock relative filename
    #[arg(short = 'm', long)]
    mock: Option<PathBuf>,

    /// Enable serde serialization generation
    #[arg(short = 'y', long)]
    yas: bool,

    /// Enable Protocol Buffers serialization generation
    #[arg(short = 'b', long)]
    protobuf: bool,

    /// Do not wrap stub dispatch, letting implementation panics propagate
    #[arg(short = 'c', long)]
    suppress_catch_stub_exceptions: bool,

    /// Locations of files imported by the idl (repeatable)
    #[arg(short = 'P', long = "path")]
    paths: Vec<PathBuf>,

    /// Namespace of the generated interfaces (repeatable)
    #[arg(short = 'N', long = "namespace")]
    namespaces: Vec<String>,

    /// Print the preprocessed idl and exit
    #[arg(short = 'd', long)]
    dump_preprocessor: bool,

    /// Macro define, NAME or NAME=value (repeatable)
    #[arg(short = 'D', long = "define")]
    defines: Vec<String>,

    /// Additional header to include in the generated interface file
    /// (repeatable)
    #[arg(short = 'H', long = "additional_headers")]
    additional_headers: Vec<String>,

    /// Implementation errors that should pass through stub dispatch
    /// (repeatable)
    #[arg(short = 'r', long = "rethrow_stub_exception")]
    rethrow_stub_exceptions: Vec<String>,

    /// Additional header to include in the generated stub file (repeatable)
    #[arg(short = 'A', long = "additional_stub_header")]
    additional_stub_headers: Vec<String>,

    /// Omit the core RPC use-prelude from generated sources
    #[arg(long)]
    no_include_rpc_headers: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = GeneratorOptions {
        name: cli.name,
        idl: cli.idl,
        output_path: cli.output_path,
        mock: cli.mock,
        yas: cli.yas,
        protobuf: cli.protobuf,
        include_paths: cli.paths,
        namespaces: cli.namespaces,
        defines: cli.defines,
        additional_headers: cli.additional_headers,
        rethrow_stub_exceptions: cli.rethrow_stub_exceptions,
        additional_stub_headers: cli.additional_stub_headers,
        suppress_catch_stub_exceptions: cli.suppress_catch_stub_exceptions,
        no_include_rpc_headers: cli.no_include_rpc_headers,
    };

    if cli.dump_preprocessor {
        return match preprocess_only(&options) {
            Ok(text) => {
                print!("{text}");
                ExitCode::SUCCESS
            }
            Err(error) => {
                eprintln!("{error}");
                ExitCode::FAILURE
            }
        };
    }

    match run(&options) {
        Ok(report) => {
            eprintln!(
                "{} file(s) written, {} unchanged",
                report.written.len(),
                report.unchanged.len()
            );
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("{error}");
            ExitCode::FAILURE
        }
    }
}

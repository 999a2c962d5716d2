//! End-to-end generator runs against a real output tree.

use std::path::Path;

use meridian_gen::{preprocess_only, run, GeneratorOptions};

const CALCULATOR_IDL: &str = "\
namespace demo {
    struct pair {
        int first;
        int second;
    };

    interface Calculator {
        OK add(int a, int b, out int r);
        OK swap(pair p, out pair q);
    };
}
";

fn write_idl(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn options(idl: &Path, output: &Path) -> GeneratorOptions {
    GeneratorOptions {
        name: "calc".to_owned(),
        idl: idl.to_owned(),
        output_path: output.to_owned(),
        mock: Some("calc_mock.rs".into()),
        yas: true,
        protobuf: false,
        ..GeneratorOptions::default()
    }
}

#[test]
fn generates_the_full_artifact_set() {
    let dir = tempfile::tempdir().unwrap();
    let idl = write_idl(dir.path(), "calc.idl", CALCULATOR_IDL);
    let output = dir.path().join("generated");

    let report = run(&options(&idl, &output)).unwrap();
    assert!(!report.written.is_empty());

    let interfaces = std::fs::read_to_string(output.join("src/calc.rs")).unwrap();
    assert!(interfaces.contains("pub trait Calculator"));
    assert!(interfaces.contains("CALCULATOR_INTERFACE"));
    assert!(interfaces.contains("pub struct Pair"));

    let proxies = std::fs::read_to_string(output.join("src/calc_proxy.rs")).unwrap();
    assert!(proxies.contains("CalculatorProxy"));

    let stubs = std::fs::read_to_string(output.join("src/calc_stub.rs")).unwrap();
    assert!(stubs.contains("CalculatorStub"));

    let mock = std::fs::read_to_string(output.join("src/calc_mock.rs")).unwrap();
    assert!(mock.contains("MockCalculator"));

    // One checksum file per fingerprintable type.
    assert!(output.join("check_sums/demo__pair").exists());
    assert!(output.join("check_sums/demo__Calculator").exists());
    assert!(output.join("check_sums/manifest").exists());
}

#[test]
fn regeneration_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let idl = write_idl(dir.path(), "calc.idl", CALCULATOR_IDL);
    let output = dir.path().join("generated");

    run(&options(&idl, &output)).unwrap();
    let first = std::fs::read_to_string(output.join("src/calc.rs")).unwrap();

    // Unchanged input: byte-identical output, nothing rewritten.
    let second_report = run(&options(&idl, &output)).unwrap();
    assert!(second_report.written.is_empty());
    assert_eq!(
        first,
        std::fs::read_to_string(output.join("src/calc.rs")).unwrap()
    );

    // Changed input: only the affected artifacts are rewritten.
    write_idl(
        dir.path(),
        "calc.idl",
        &CALCULATOR_IDL.replace("OK add(int a, int b, out int r);", ""),
    );
    let third_report = run(&options(&idl, &output)).unwrap();
    assert!(!third_report.written.is_empty());
}

#[test]
fn protobuf_emits_schemas_and_a_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let idl = write_idl(dir.path(), "calc.idl", CALCULATOR_IDL);
    let output = dir.path().join("generated");

    let mut opts = options(&idl, &output);
    opts.protobuf = true;
    run(&opts).unwrap();

    let schema = std::fs::read_to_string(output.join("proto/calc_demo.proto")).unwrap();
    assert!(schema.contains("package demo;"));
    assert!(schema.contains("message Pair {"));

    let aggregator = std::fs::read_to_string(output.join("proto/calc.proto")).unwrap();
    assert!(aggregator.contains("import \"calc_demo.proto\";"));

    let manifest = std::fs::read_to_string(output.join("check_sums/manifest")).unwrap();
    assert!(manifest.contains("proto/calc_demo.proto"));
    assert!(manifest.contains("proto/meridian_descriptor.proto"));

    let interfaces = std::fs::read_to_string(output.join("src/calc.rs")).unwrap();
    assert!(interfaces.contains("pub mod pb {"));
    assert!(interfaces.contains("fn protobuf_encode"));
}

#[test]
fn imports_resolve_along_include_paths() {
    let dir = tempfile::tempdir().unwrap();
    let shared_dir = dir.path().join("shared");
    std::fs::create_dir_all(&shared_dir).unwrap();
    write_idl(
        &shared_dir,
        "common.idl",
        "namespace demo { struct token { int value; }; }",
    );
    let idl = write_idl(
        dir.path(),
        "app.idl",
        "import \"common.idl\";\nnamespace demo { interface I { OK check(token t); }; }",
    );

    let output = dir.path().join("generated");
    let mut opts = options(&idl, &output);
    opts.name = "app".to_owned();
    opts.mock = None;
    opts.include_paths = vec![shared_dir];

    run(&opts).unwrap();

    let interfaces = std::fs::read_to_string(output.join("src/app.rs")).unwrap();
    // Imported declarations are referenced, not redefined.
    assert!(interfaces.contains("pub use crate::common::*;"));
    assert!(!interfaces.contains("pub struct Token"));

    // Imported types are not in this module's checksum tree.
    assert!(!output.join("check_sums/demo__token").exists());
    assert!(output.join("check_sums/demo__I").exists());
}

#[test]
fn dump_preprocessor_expands_imports_and_defines() {
    let dir = tempfile::tempdir().unwrap();
    write_idl(dir.path(), "common.idl", "struct token { int value; };");
    let idl = write_idl(
        dir.path(),
        "app.idl",
        "import \"common.idl\";\n#ifdef FEATURE\nstruct gated { int x; };\n#endif\ninterface I { OK go(); };\n",
    );

    let mut opts = options(&idl, dir.path());
    opts.defines = vec!["FEATURE".to_owned()];

    let text = preprocess_only(&opts).unwrap();
    assert!(text.contains("struct token"));
    assert!(text.contains("struct gated"));
    assert!(!text.contains("import"));
    assert!(!text.contains("#ifdef"));
}

#[test]
fn unknown_input_fails_with_a_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.idl");
    let error = run(&options(&missing, dir.path())).unwrap_err();
    assert!(error.to_string().contains("missing.idl"));
}

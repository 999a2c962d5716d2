//! Interface ordinal stability across runs and inputs.

use meridian_gen::fingerprint::interface_ordinal;
use meridian_gen::parser::parse_text;
use meridian_gen::PROTOCOL_VERSION;

const CALCULATOR_IDL: &str = "interface I { OK add(int a, int b, out int r); };";

fn ordinal_of(idl: &str, version: u64) -> u64 {
    let tree = parse_text(idl).unwrap();
    let (namespace, interface) = tree.interfaces().next().unwrap();
    interface_ordinal(&namespace.name, interface, version)
}

#[test]
fn same_idl_same_ordinal_every_run() {
    let first = ordinal_of(CALCULATOR_IDL, 3);
    for _ in 0..32 {
        assert_eq!(ordinal_of(CALCULATOR_IDL, 3), first);
    }
}

#[test]
fn whitespace_and_comments_do_not_change_the_ordinal() {
    let reformatted = "interface I {\n    // adds two numbers\n    OK add(int a, int b, out int r);\n};";
    assert_eq!(
        ordinal_of(CALCULATOR_IDL, 3),
        ordinal_of(reformatted, 3)
    );
}

#[test]
fn signature_changes_change_the_ordinal() {
    let baseline = ordinal_of(CALCULATOR_IDL, 3);

    let cases = [
        // renamed interface
        "interface J { OK add(int a, int b, out int r); };",
        // renamed method
        "interface I { OK sum(int a, int b, out int r); };",
        // parameter type change
        "interface I { OK add(short a, int b, out int r); };",
        // parameter order change
        "interface I { OK add(int b, int a, out int r); };",
        // extra method
        "interface I { OK add(int a, int b, out int r); OK sub(int a, int b, out int r); };",
        // direction change
        "interface I { OK add(int a, int b, int r); };",
    ];

    for case in cases {
        assert_ne!(baseline, ordinal_of(case, 3), "case: {case}");
    }
}

#[test]
fn ordinal_is_pinned_to_the_protocol_version() {
    assert_ne!(
        ordinal_of(CALCULATOR_IDL, 2),
        ordinal_of(CALCULATOR_IDL, 3)
    );
    // The workspace-wide pin is part of the contract.
    assert_eq!(PROTOCOL_VERSION, 3);
}

#[test]
fn ordinal_is_never_null() {
    assert_ne!(ordinal_of(CALCULATOR_IDL, 3), 0);
}

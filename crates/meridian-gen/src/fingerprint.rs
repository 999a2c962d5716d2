//! Stable fingerprints for interfaces and types.
//!
//! An interface ordinal is a Sha3-256 digest over the interface's canonical
//! signature at a fixed protocol version, truncated to 64 bits. Any change
//! to a method name, parameter type or parameter order changes the ordinal,
//! which is what makes cross-zone type compatibility checkable by value.

use sha3::{Digest, Sha3_256};

use crate::ast::{EnumDef, InterfaceDef, Item, StructDef};

/// Computes the ordinal of an interface at a protocol version.
///
/// Deterministic across runs and platforms: the canonical signature is
/// plain text with no map iteration or pointer identity involved, and the
/// truncation is byte-order-fixed.
#[must_use]
pub fn interface_ordinal(namespace: &str, interface: &InterfaceDef, protocol_version: u64) -> u64 {
    let mut canonical = format!("interface {}::{}@v{};", namespace, interface.name, protocol_version);
    for method in &interface.methods {
        canonical.push_str(&method_signature(method));
    }
    truncate(Sha3_256::digest(canonical.as_bytes()).as_slice())
}

/// Computes the fingerprint of a struct declaration.
#[must_use]
pub fn struct_fingerprint(namespace: &str, def: &StructDef) -> u64 {
    let mut canonical = format!("struct {}::{};", namespace, def.name);
    for field in &def.fields {
        canonical.push_str(&format!("field {} {};", field.ty.signature(), field.name));
    }
    truncate(Sha3_256::digest(canonical.as_bytes()).as_slice())
}

/// Computes the fingerprint of an enum declaration.
#[must_use]
pub fn enum_fingerprint(namespace: &str, def: &EnumDef) -> u64 {
    let mut canonical = format!("enum {}::{};", namespace, def.name);
    let mut next = 0i64;
    for (name, explicit) in &def.values {
        let value = explicit.unwrap_or(next);
        canonical.push_str(&format!("value {name}={value};"));
        next = value + 1;
    }
    truncate(Sha3_256::digest(canonical.as_bytes()).as_slice())
}

/// Computes the fingerprint of any fingerprintable item, if it has one.
#[must_use]
pub fn item_fingerprint(namespace: &str, item: &Item, protocol_version: u64) -> Option<u64> {
    match item {
        Item::Interface(def) => Some(interface_ordinal(namespace, def, protocol_version)),
        Item::Struct(def) => Some(struct_fingerprint(namespace, def)),
        Item::Enum(def) => Some(enum_fingerprint(namespace, def)),
        Item::TemplateStruct(_) | Item::Typedef(_) => None,
    }
}

fn method_signature(method: &crate::ast::Method) -> String {
    let params: Vec<String> = method
        .params
        .iter()
        .map(|param| {
            let direction = match param.direction {
                crate::ast::Direction::In => "in",
                crate::ast::Direction::Out => "out",
            };
            format!("{direction} {} {}", param.ty.signature(), param.name)
        })
        .collect();
    format!(
        "method {} {}({});",
        method.result,
        method.name,
        params.join(",")
    )
}

fn truncate(digest: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    let value = u64::from_be_bytes(bytes);
    // Zero is the null ordinal; nudge the astronomically unlikely collision.
    if value == 0 {
        1
    } else {
        value
    }
}

//! prost mirror emission.
//!
//! When Protocol Buffers support is enabled, every marshalled type gains a
//! mirror struct in a generated `pb` module with prost field attributes and
//! `From` conversions in both directions. The `Marshalled` protobuf hooks
//! on the plain types route through these mirrors, which is what turns
//! `Encoding::ProtocolBuffers` from "unsupported" into a working encoding
//! for the interface.

use std::fmt::Write as _;

use crate::ast::{EnumDef, Field, IdlFile, Item, ScalarKind, TypeRef};
use crate::names::{instantiation_name, pascal_case, sanitize, snake_case};
use crate::protogen::{request_name, response_name, TypeIndex, TypeKind};
use crate::templates::collect_instantiations;
use crate::GenError;

/// Emits the whole `pb` module for the interface file.
pub fn pb_module(tree: &IdlFile) -> Result<String, GenError> {
    let index = TypeIndex::build(tree);
    let mut out = String::new();

    out.push_str("/// prost mirrors backing the Protocol Buffers encoding.\n");
    out.push_str("pub mod pb {\n");
    out.push_str("    use super::*;\n");
    out.push_str("    use prost::Message as _;\n\n");

    out.push_str(
        "    pub fn encode<T: prost::Message>(value: &T) -> Result<Vec<u8>, ProtocolError> {\n        \
         let mut buf = Vec::with_capacity(value.encoded_len());\n        \
         value.encode(&mut buf)\n            \
         .map_err(|e| ProtocolError::Serialisation(e.to_string()))?;\n        \
         Ok(buf)\n    }\n\n",
    );
    out.push_str(
        "    pub fn decode<T: prost::Message + Default>(bytes: &[u8]) -> Result<T, ProtocolError> {\n        \
         T::decode(bytes).map_err(|e| ProtocolError::Deserialisation(e.to_string()))\n    }\n\n",
    );

    // Shared descriptor mirror.
    out.push_str("    #[derive(Clone, PartialEq, ::prost::Message)]\n");
    out.push_str("    pub struct PbInterfaceDescriptor {\n");
    out.push_str("        #[prost(uint64, tag = \"1\")]\n        pub destination_zone: u64,\n");
    out.push_str("        #[prost(uint64, tag = \"2\")]\n        pub object: u64,\n");
    out.push_str("    }\n\n");
    out.push_str(
        "    impl From<&meridian_proto::InterfaceDescriptor> for PbInterfaceDescriptor {\n        \
         fn from(value: &meridian_proto::InterfaceDescriptor) -> Self {\n            \
         Self {\n                destination_zone: value.destination_zone.get(),\n                \
         object: value.object.get(),\n            }\n        }\n    }\n\n",
    );
    out.push_str(
        "    impl From<PbInterfaceDescriptor> for meridian_proto::InterfaceDescriptor {\n        \
         fn from(value: PbInterfaceDescriptor) -> Self {\n            \
         Self::new(\n                meridian_proto::DestinationZone::new(value.destination_zone),\n                \
         meridian_proto::ObjectId::new(value.object),\n            )\n        }\n    }\n\n",
    );

    for namespace in &tree.namespaces {
        for item in &namespace.items {
            if !item.is_local() {
                continue;
            }
            match item {
                Item::Enum(def) => emit_pb_enum(&mut out, def),
                Item::Struct(def) => {
                    emit_pb_struct(&mut out, &pascal_case(&sanitize(&def.name, "_")), &def.fields, &index)?;
                }
                Item::Interface(def) => {
                    for method in &def.methods {
                        let request_fields: Vec<Field> = method
                            .inputs()
                            .map(|p| Field {
                                name: p.name.clone(),
                                ty: p.ty.clone(),
                            })
                            .collect();
                        let response_fields: Vec<Field> = method
                            .outputs()
                            .map(|p| Field {
                                name: p.name.clone(),
                                ty: p.ty.clone(),
                            })
                            .collect();
                        emit_pb_struct(
                            &mut out,
                            &pascal_case(&request_name(def, method)),
                            &request_fields,
                            &index,
                        )?;
                        emit_pb_struct(
                            &mut out,
                            &pascal_case(&response_name(def, method)),
                            &response_fields,
                            &index,
                        )?;
                    }
                }
                Item::TemplateStruct(_) | Item::Typedef(_) => {}
            }
        }
    }

    for concrete in collect_instantiations(tree)? {
        emit_pb_struct(
            &mut out,
            &pascal_case(&concrete.name),
            &concrete.fields,
            &index,
        )?;
    }

    out.push_str("}\n");
    Ok(out)
}

fn emit_pb_enum(out: &mut String, def: &EnumDef) {
    let name = pascal_case(&sanitize(&def.name, "_"));
    out.push_str(
        "    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]\n",
    );
    out.push_str("    #[repr(i32)]\n");
    let _ = writeln!(out, "    pub enum {name} {{");
    if !def.has_zero_value() {
        out.push_str("        Unspecified = 0,\n");
    }
    let mut next = 0i64;
    for (value_name, explicit) in &def.values {
        let value = explicit.unwrap_or(next);
        let _ = writeln!(out, "        {} = {value},", pascal_case(value_name));
        next = value + 1;
    }
    out.push_str("    }\n\n");
}

/// One field's mirror: prost attribute, Rust type, and the two conversion
/// expressions.
struct PbField {
    attribute: String,
    rust_type: String,
    from_super: String,
    into_super: String,
}

fn emit_pb_struct(
    out: &mut String,
    name: &str,
    fields: &[Field],
    index: &TypeIndex,
) -> Result<(), GenError> {
    let mut decls = String::new();
    let mut from_lines = String::new();
    let mut into_lines = String::new();

    for (position, field) in fields.iter().enumerate() {
        let tag = position + 1;
        let field_name = snake_case(&sanitize(&field.name, "_"));
        let mirror = pb_field(&field.ty, index, &format!("value.{field_name}"))?;

        let _ = writeln!(decls, "        #[prost({}, tag = \"{tag}\")]", mirror.attribute);
        let _ = writeln!(decls, "        pub {field_name}: {},", mirror.rust_type);
        let _ = writeln!(from_lines, "                {field_name}: {},", mirror.from_super);
        let _ = writeln!(
            into_lines,
            "                {field_name}: {},",
            mirror.into_super.replace("__FIELD__", &format!("value.{field_name}"))
        );
    }

    out.push_str("    #[derive(Clone, PartialEq, ::prost::Message)]\n");
    let _ = writeln!(out, "    pub struct {name} {{");
    out.push_str(&decls);
    out.push_str("    }\n\n");

    let _ = writeln!(out, "    impl From<&super::{name}> for {name} {{");
    let _ = writeln!(out, "        fn from(value: &super::{name}) -> Self {{");
    out.push_str("            Self {\n");
    out.push_str(&from_lines);
    out.push_str("            }\n        }\n    }\n\n");

    let _ = writeln!(out, "    impl From<{name}> for super::{name} {{");
    let _ = writeln!(out, "        fn from(value: {name}) -> Self {{");
    out.push_str("            Self {\n");
    out.push_str(&into_lines);
    out.push_str("            }\n        }\n    }\n\n");

    Ok(())
}

fn scalar_mirror(kind: ScalarKind, access: &str) -> PbField {
    let (attribute, rust_type, needs_cast) = match kind {
        ScalarKind::I8 | ScalarKind::I16 => ("int32", "i32", true),
        ScalarKind::I32 => ("int32", "i32", false),
        ScalarKind::U8 | ScalarKind::U16 => ("uint32", "u32", true),
        ScalarKind::U32 => ("uint32", "u32", false),
        ScalarKind::I64 => ("int64", "i64", false),
        ScalarKind::U64 => ("uint64", "u64", false),
    };
    let native = kind.signature();
    PbField {
        attribute: attribute.to_owned(),
        rust_type: rust_type.to_owned(),
        from_super: if needs_cast {
            format!("{access} as {rust_type}")
        } else {
            access.to_owned()
        },
        into_super: if needs_cast {
            format!("__FIELD__ as {native}")
        } else {
            "__FIELD__".to_owned()
        },
    }
}

fn pb_field(ty: &TypeRef, index: &TypeIndex, access: &str) -> Result<PbField, GenError> {
    let resolved = index.resolve(ty).clone();
    Ok(match resolved {
        TypeRef::Scalar(kind) => scalar_mirror(kind, access),
        TypeRef::Bool => PbField {
            attribute: "bool".to_owned(),
            rust_type: "bool".to_owned(),
            from_super: access.to_owned(),
            into_super: "__FIELD__".to_owned(),
        },
        TypeRef::Float => PbField {
            attribute: "float".to_owned(),
            rust_type: "f32".to_owned(),
            from_super: access.to_owned(),
            into_super: "__FIELD__".to_owned(),
        },
        TypeRef::Double => PbField {
            attribute: "double".to_owned(),
            rust_type: "f64".to_owned(),
            from_super: access.to_owned(),
            into_super: "__FIELD__".to_owned(),
        },
        TypeRef::Str => PbField {
            attribute: "string".to_owned(),
            rust_type: "String".to_owned(),
            from_super: format!("{access}.clone()"),
            into_super: "__FIELD__".to_owned(),
        },
        TypeRef::Bytes => PbField {
            attribute: "bytes = \"vec\"".to_owned(),
            rust_type: "Vec<u8>".to_owned(),
            from_super: format!("{access}.clone()"),
            into_super: "__FIELD__".to_owned(),
        },
        TypeRef::Pointer(_) => PbField {
            attribute: "uint64".to_owned(),
            rust_type: "u64".to_owned(),
            from_super: access.to_owned(),
            into_super: "__FIELD__".to_owned(),
        },
        TypeRef::InterfaceRef(_) => PbField {
            attribute: "message, optional".to_owned(),
            rust_type: "Option<PbInterfaceDescriptor>".to_owned(),
            from_super: format!("Some(PbInterfaceDescriptor::from(&{access}))"),
            into_super: "__FIELD__.map(Into::into).unwrap_or(meridian_proto::InterfaceDescriptor::NULL)"
                .to_owned(),
        },
        TypeRef::Vector(ref inner) => vector_mirror(inner, index, access)?,
        TypeRef::Map(ref key, ref value) => map_mirror(key, value, index, access)?,
        TypeRef::Named(ref name) => match index.kind_of(name) {
            Some(TypeKind::Enum) => {
                let enum_name = pascal_case(&sanitize(name, "_"));
                PbField {
                    attribute: format!("enumeration = \"{enum_name}\""),
                    rust_type: "i32".to_owned(),
                    from_super: format!("{access} as i32"),
                    into_super: format!(
                        "super::{}::from_value(i64::from(__FIELD__)).unwrap_or_default()",
                        pascal_case(&sanitize(name, "_"))
                    ),
                }
            }
            Some(TypeKind::Struct) => message_mirror(&pascal_case(&sanitize(name, "_")), access),
            Some(TypeKind::Interface) => {
                pb_field(&TypeRef::InterfaceRef(name.clone()), index, access)?
            }
            _ => {
                return Err(GenError::Unsupported(format!(
                    "unresolved type `{name}` in protobuf mirror"
                )))
            }
        },
        TypeRef::Template(ref name, ref args) => {
            let signatures: Vec<String> = args.iter().map(TypeRef::signature).collect();
            message_mirror(&pascal_case(&instantiation_name(name, &signatures)), access)
        }
    })
}

fn message_mirror(mirror_name: &str, access: &str) -> PbField {
    PbField {
        attribute: "message, optional".to_owned(),
        rust_type: format!("Option<{mirror_name}>"),
        from_super: format!("Some({mirror_name}::from(&{access}))"),
        into_super: "__FIELD__.map(Into::into).unwrap_or_default()".to_owned(),
    }
}

fn vector_mirror(inner: &TypeRef, index: &TypeIndex, access: &str) -> Result<PbField, GenError> {
    let resolved = index.resolve(inner).clone();
    Ok(match resolved {
        TypeRef::Scalar(kind) => {
            let element = scalar_mirror(kind, "v");
            let needs_cast = element.from_super != "v";
            PbField {
                attribute: format!("{}, repeated", element.attribute),
                rust_type: format!("Vec<{}>", element.rust_type),
                from_super: if needs_cast {
                    format!(
                        "{access}.iter().map(|v| *v as {}).collect()",
                        element.rust_type
                    )
                } else {
                    format!("{access}.clone()")
                },
                into_super: if needs_cast {
                    format!(
                        "__FIELD__.iter().map(|v| *v as {}).collect()",
                        kind.signature()
                    )
                } else {
                    "__FIELD__".to_owned()
                },
            }
        }
        TypeRef::Str => PbField {
            attribute: "string, repeated".to_owned(),
            rust_type: "Vec<String>".to_owned(),
            from_super: format!("{access}.clone()"),
            into_super: "__FIELD__".to_owned(),
        },
        TypeRef::Named(ref name) if index.kind_of(name) == Some(TypeKind::Struct) => {
            let mirror = pascal_case(&sanitize(name, "_"));
            PbField {
                attribute: "message, repeated".to_owned(),
                rust_type: format!("Vec<{mirror}>"),
                from_super: format!("{access}.iter().map({mirror}::from).collect()"),
                into_super: "__FIELD__.into_iter().map(Into::into).collect()".to_owned(),
            }
        }
        TypeRef::Template(ref name, ref args) => {
            let signatures: Vec<String> = args.iter().map(TypeRef::signature).collect();
            let mirror = pascal_case(&instantiation_name(name, &signatures));
            PbField {
                attribute: "message, repeated".to_owned(),
                rust_type: format!("Vec<{mirror}>"),
                from_super: format!("{access}.iter().map({mirror}::from).collect()"),
                into_super: "__FIELD__.into_iter().map(Into::into).collect()".to_owned(),
            }
        }
        other => {
            return Err(GenError::Unsupported(format!(
                "repeated {} is not representable in the protobuf mirror",
                other.signature()
            )))
        }
    })
}

fn map_mirror(
    key: &TypeRef,
    value: &TypeRef,
    index: &TypeIndex,
    access: &str,
) -> Result<PbField, GenError> {
    let key_resolved = index.resolve(key).clone();
    let (key_attr, key_rust, key_cast) = match key_resolved {
        TypeRef::Scalar(kind) => {
            let mirror = scalar_mirror(kind, "k");
            (
                crate::protogen::proto_scalar(kind).to_owned(),
                mirror.rust_type.clone(),
                mirror.from_super != "k",
            )
        }
        TypeRef::Str => ("string".to_owned(), "String".to_owned(), false),
        TypeRef::Bool => ("bool".to_owned(), "bool".to_owned(), false),
        other => {
            return Err(GenError::Unsupported(format!(
                "map keys must be scalar or string, got {}",
                other.signature()
            )))
        }
    };

    let value_resolved = index.resolve(value).clone();
    let (value_attr, value_rust, value_cast) = match value_resolved {
        TypeRef::Scalar(kind) => {
            let mirror = scalar_mirror(kind, "v");
            (
                crate::protogen::proto_scalar(kind).to_owned(),
                mirror.rust_type.clone(),
                mirror.from_super != "v",
            )
        }
        TypeRef::Str => ("string".to_owned(), "String".to_owned(), false),
        TypeRef::Bool => ("bool".to_owned(), "bool".to_owned(), false),
        other => {
            return Err(GenError::Unsupported(format!(
                "map values beyond scalars and strings need a wrapper struct, got {}",
                other.signature()
            )))
        }
    };

    if key_cast || value_cast {
        return Err(GenError::Unsupported(
            "maps over sub-32-bit scalars need a wrapper struct".to_owned(),
        ));
    }

    Ok(PbField {
        attribute: format!("btree_map = \"{key_attr}, {value_attr}\""),
        rust_type: format!("::std::collections::BTreeMap<{key_rust}, {value_rust}>"),
        from_super: format!("{access}.clone()"),
        into_super: "__FIELD__".to_owned(),
    })
}

//! Protocol Buffers schema emission.
//!
//! One `.proto` file per namespace plus a master aggregator importing all of
//! them. The parameter-kind projection matches the runtime contract:
//! scalars map to their natural protobuf types, strings and bytes are
//! length-prefixed, vectors become `repeated`, scalar-keyed maps become
//! `map<,>`, pointers become bare 64-bit addresses, interface references
//! become `meridian.InterfaceDescriptor`, and enums gain an injected
//! `UNSPECIFIED = 0` when the IDL enum has no zero value.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::ast::{EnumDef, IdlFile, InterfaceDef, Item, Method, ScalarKind, TypeRef};
use crate::names::{instantiation_name, pascal_case, sanitize};
use crate::templates::{collect_instantiations, ConcreteStruct};
use crate::GenError;

/// What a name refers to, after typedef resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Struct,
    Enum,
    Interface,
    Template,
}

/// Name resolution context shared by the schema and mirror emitters.
pub struct TypeIndex {
    kinds: BTreeMap<String, TypeKind>,
    typedefs: BTreeMap<String, TypeRef>,
}

impl TypeIndex {
    /// Builds the index over every namespace, local and imported.
    #[must_use]
    pub fn build(tree: &IdlFile) -> Self {
        let mut kinds = BTreeMap::new();
        let mut typedefs = BTreeMap::new();

        for namespace in &tree.namespaces {
            for item in &namespace.items {
                let kind = match item {
                    Item::Struct(_) => TypeKind::Struct,
                    Item::TemplateStruct(_) => TypeKind::Template,
                    Item::Enum(_) => TypeKind::Enum,
                    Item::Interface(_) => TypeKind::Interface,
                    Item::Typedef(def) => {
                        typedefs.insert(def.name.clone(), def.ty.clone());
                        if !namespace.name.is_empty() {
                            typedefs.insert(
                                format!("{}::{}", namespace.name, def.name),
                                def.ty.clone(),
                            );
                        }
                        continue;
                    }
                };
                kinds.insert(item.name().to_owned(), kind);
                if !namespace.name.is_empty() {
                    kinds.insert(format!("{}::{}", namespace.name, item.name()), kind);
                }
            }
        }

        Self { kinds, typedefs }
    }

    /// Follows typedef aliases to the underlying type.
    #[must_use]
    pub fn resolve<'t>(&'t self, ty: &'t TypeRef) -> &'t TypeRef {
        let mut current = ty;
        let mut depth = 0;
        while let TypeRef::Named(name) = current {
            match self.typedefs.get(name) {
                Some(target) if depth < 32 => {
                    current = target;
                    depth += 1;
                }
                _ => break,
            }
        }
        current
    }

    /// The kind of a named type, if declared anywhere in the tree.
    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<TypeKind> {
        self.kinds.get(name).copied()
    }
}

/// Protobuf spelling of a scalar.
#[must_use]
pub fn proto_scalar(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::I8 | ScalarKind::I16 | ScalarKind::I32 => "int32",
        ScalarKind::U8 | ScalarKind::U16 | ScalarKind::U32 => "uint32",
        ScalarKind::I64 => "int64",
        ScalarKind::U64 => "uint64",
    }
}

/// The shared descriptor schema every namespace file imports.
pub const DESCRIPTOR_PROTO_FILE: &str = "meridian_descriptor.proto";

/// Content of the shared descriptor schema.
#[must_use]
pub fn descriptor_proto() -> String {
    "syntax = \"proto3\";\n\npackage meridian;\n\n\
     // Wire form of a cross-zone object reference.\n\
     message InterfaceDescriptor {\n  uint64 destination_zone = 1;\n  uint64 object = 2;\n}\n"
        .to_owned()
}

/// Emitted schema files: `(relative path, content)`.
pub struct ProtoSources {
    pub files: Vec<(String, String)>,
}

/// Emits the per-namespace schemas and the master aggregator.
pub fn write_files(
    tree: &IdlFile,
    base_name: &str,
) -> Result<ProtoSources, GenError> {
    let index = TypeIndex::build(tree);
    let instantiations = collect_instantiations(tree)?;
    let mut files = Vec::new();

    files.push((DESCRIPTOR_PROTO_FILE.to_owned(), descriptor_proto()));

    let mut namespace_files = Vec::new();
    for namespace in &tree.namespaces {
        let has_local = namespace.items.iter().any(Item::is_local);
        if !has_local {
            continue;
        }

        let file_name = if namespace.name.is_empty() {
            format!("{base_name}_root.proto")
        } else {
            format!("{base_name}_{}.proto", sanitize(&namespace.name, "_"))
        };

        let content = namespace_proto(tree, namespace, &index, &instantiations)?;
        namespace_files.push(file_name.clone());
        files.push((file_name, content));
    }

    // Master aggregator: imports every per-namespace file plus the
    // counterpart aggregators of imported IDLs.
    let mut aggregator = String::from("syntax = \"proto3\";\n\n");
    for import in &tree.imports {
        let _ = writeln!(aggregator, "import \"{}.proto\";", sanitize(import, "_"));
    }
    for file in &namespace_files {
        let _ = writeln!(aggregator, "import \"{file}\";");
    }
    files.push((format!("{base_name}.proto"), aggregator));

    Ok(ProtoSources { files })
}

fn namespace_proto(
    tree: &IdlFile,
    namespace: &crate::ast::Namespace,
    index: &TypeIndex,
    instantiations: &[ConcreteStruct],
) -> Result<String, GenError> {
    let mut out = String::from("syntax = \"proto3\";\n\n");
    if !namespace.name.is_empty() {
        let _ = writeln!(out, "package {};\n", sanitize(&namespace.name, "."));
    }
    let _ = writeln!(out, "import \"{DESCRIPTOR_PROTO_FILE}\";");
    for import in &tree.imports {
        let _ = writeln!(out, "import \"{}.proto\";", sanitize(import, "_"));
    }
    out.push('\n');

    for item in &namespace.items {
        if !item.is_local() {
            continue;
        }
        match item {
            Item::Enum(def) => emit_proto_enum(&mut out, def),
            Item::Struct(def) => {
                emit_proto_message(&mut out, &def.name, &def.fields, index)?;
            }
            Item::Interface(def) => emit_proto_interface(&mut out, def, index)?,
            Item::TemplateStruct(def) => {
                // Only concrete instantiations of this namespace's templates
                // become messages.
                for concrete in instantiations.iter().filter(|c| c.template == def.name) {
                    emit_proto_message(&mut out, &concrete.name, &concrete.fields, index)?;
                }
            }
            Item::Typedef(_) => {}
        }
    }

    Ok(out)
}

fn emit_proto_enum(out: &mut String, def: &EnumDef) {
    let name = pascal_case(&sanitize(&def.name, "_"));
    let prefix = sanitize(&def.name, "_").to_uppercase();

    let _ = writeln!(out, "enum {name} {{");
    if !def.has_zero_value() {
        // proto3 requires a zero default.
        let _ = writeln!(out, "  {prefix}_UNSPECIFIED = 0;");
    }
    let mut next = 0i64;
    for (value_name, explicit) in &def.values {
        let value = explicit.unwrap_or(next);
        let _ = writeln!(
            out,
            "  {prefix}_{} = {value};",
            sanitize(value_name, "_").to_uppercase()
        );
        next = value + 1;
    }
    out.push_str("}\n\n");
}

fn emit_proto_interface(
    out: &mut String,
    def: &InterfaceDef,
    index: &TypeIndex,
) -> Result<(), GenError> {
    for method in &def.methods {
        let request_fields: Vec<crate::ast::Field> = method
            .inputs()
            .map(|p| crate::ast::Field {
                name: p.name.clone(),
                ty: p.ty.clone(),
            })
            .collect();
        let response_fields: Vec<crate::ast::Field> = method
            .outputs()
            .map(|p| crate::ast::Field {
                name: p.name.clone(),
                ty: p.ty.clone(),
            })
            .collect();

        emit_proto_message(out, &request_name(def, method), &request_fields, index)?;
        emit_proto_message(out, &response_name(def, method), &response_fields, index)?;
    }
    Ok(())
}

pub(crate) fn request_name(interface: &InterfaceDef, method: &Method) -> String {
    format!(
        "{}{}Request",
        pascal_case(&interface.name),
        pascal_case(&method.name)
    )
}

pub(crate) fn response_name(interface: &InterfaceDef, method: &Method) -> String {
    format!(
        "{}{}Response",
        pascal_case(&interface.name),
        pascal_case(&method.name)
    )
}

fn emit_proto_message(
    out: &mut String,
    name: &str,
    fields: &[crate::ast::Field],
    index: &TypeIndex,
) -> Result<(), GenError> {
    let _ = writeln!(out, "message {} {{", pascal_case(&sanitize(name, "_")));
    for (position, field) in fields.iter().enumerate() {
        let tag = position + 1;
        let field_name = sanitize(&field.name, "_");
        let text = proto_field(&field.ty, index)?;
        let _ = writeln!(out, "  {text} {field_name} = {tag};");
    }
    out.push_str("}\n\n");
    Ok(())
}

/// Protobuf spelling of a field type.
fn proto_field(ty: &TypeRef, index: &TypeIndex) -> Result<String, GenError> {
    let resolved = index.resolve(ty);
    Ok(match resolved {
        TypeRef::Scalar(kind) => proto_scalar(*kind).to_owned(),
        TypeRef::Bool => "bool".to_owned(),
        TypeRef::Float => "float".to_owned(),
        TypeRef::Double => "double".to_owned(),
        TypeRef::Str => "string".to_owned(),
        TypeRef::Bytes => "bytes".to_owned(),
        TypeRef::Vector(inner) => {
            let inner = proto_field(inner, index)?;
            if inner.starts_with("repeated") || inner.starts_with("map<") {
                return Err(GenError::Unsupported(
                    "nested repeated/map fields need a wrapper struct".to_owned(),
                ));
            }
            format!("repeated {inner}")
        }
        TypeRef::Map(key, value) => {
            let key_text = match index.resolve(key) {
                TypeRef::Scalar(kind) => proto_scalar(*kind).to_owned(),
                TypeRef::Bool => "bool".to_owned(),
                TypeRef::Str => "string".to_owned(),
                other => {
                    return Err(GenError::Unsupported(format!(
                        "map keys must be scalar or string, got {}",
                        other.signature()
                    )))
                }
            };
            let value_text = proto_field(value, index)?;
            if value_text.starts_with("repeated") || value_text.starts_with("map<") {
                return Err(GenError::Unsupported(
                    "nested repeated/map values need a wrapper struct".to_owned(),
                ));
            }
            format!("map<{key_text}, {value_text}>")
        }
        TypeRef::Pointer(_) => "uint64".to_owned(),
        TypeRef::InterfaceRef(_) => "meridian.InterfaceDescriptor".to_owned(),
        TypeRef::Named(name) => match index.kind_of(name) {
            Some(TypeKind::Enum) | Some(TypeKind::Struct) => {
                pascal_case(&sanitize(name, "_"))
            }
            Some(TypeKind::Interface) => "meridian.InterfaceDescriptor".to_owned(),
            _ => {
                return Err(GenError::Unsupported(format!(
                    "unresolved type `{name}` in schema emission"
                )))
            }
        },
        TypeRef::Template(name, args) => {
            let signatures: Vec<String> = args.iter().map(TypeRef::signature).collect();
            pascal_case(&instantiation_name(name, &signatures))
        }
    })
}

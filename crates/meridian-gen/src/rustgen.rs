//! Rust source emission: interface file, proxy file, stub file, mock.
//!
//! The emitted shapes mirror the runtime contracts: an `#[async_trait]`
//! trait per interface, one request/response struct pair per method, a
//! typed proxy implementing the trait over an `ObjectProxy`, and a stub
//! dispatcher implementing `InterfaceStub`. With `--protobuf` a `pb` module
//! of prost mirrors is added and the `Marshalled` protobuf hooks are
//! overridden to route through it.

use std::fmt::Write as _;

use crate::ast::{EnumDef, IdlFile, InterfaceDef, Item, Method, StructDef, TypeRef};
use crate::fingerprint::interface_ordinal;
use crate::names::{instantiation_name, pascal_case, sanitize, snake_case};
use crate::templates::collect_instantiations;
use crate::GenError;

/// Everything the Rust emitter needs to know about one run.
pub struct RustGenOptions<'a> {
    pub module_name: &'a str,
    pub namespaces: &'a [String],
    pub additional_headers: &'a [String],
    pub additional_stub_headers: &'a [String],
    pub rethrow_stub_exceptions: &'a [String],
    pub suppress_catch_stub_exceptions: bool,
    pub include_rpc_headers: bool,
    pub enable_protobuf: bool,
    pub protocol_version: u64,
}

/// The emitted source set.
pub struct RustSources {
    pub interfaces: String,
    pub proxies: String,
    pub stubs: String,
    pub mock: Option<String>,
}

/// Emits all Rust sources for a parsed tree.
pub fn write_sources(
    tree: &IdlFile,
    options: &RustGenOptions<'_>,
    with_mock: bool,
) -> Result<RustSources, GenError> {
    Ok(RustSources {
        interfaces: interface_file(tree, options)?,
        proxies: proxy_file(tree, options)?,
        stubs: stub_file(tree, options)?,
        mock: if with_mock {
            Some(mock_file(tree, options)?)
        } else {
            None
        },
    })
}

fn banner(module_name: &str) -> String {
    format!(
        "// Generated by meridian-gen for `{module_name}`. Do not edit.\n\
         #![allow(unused_imports, clippy::all)]\n"
    )
}

/// Module path of the generated interface file, as seen from a sibling
/// generated file inside the same namespace wrapping.
fn interface_module_path(module: &str, namespaces: &[String]) -> String {
    let mut path = format!("crate::{}", sanitize(module, "_"));
    for namespace in namespaces {
        path.push_str("::");
        path.push_str(&sanitize(namespace, "_"));
    }
    path
}

fn prelude(options: &RustGenOptions<'_>, headers: &[String], for_stub: bool) -> String {
    let mut out = String::new();
    if options.include_rpc_headers {
        out.push_str("use std::sync::Arc;\n\n");
        out.push_str("use async_trait::async_trait;\n");
        if for_stub {
            out.push_str("use meridian_core::InterfaceStub;\n");
        } else {
            out.push_str("use meridian_core::{ObjectProxy, Proxied};\n");
        }
        out.push_str(
            "use meridian_proto::{deserialise, serialise, Encoding, ErrorCode, \
             InterfaceOrdinal, MethodId, ProtocolError};\n",
        );
        out.push_str("use serde::{Deserialize, Serialize};\n");
    }
    for header in headers {
        out.push_str(header);
        if !header.ends_with('\n') {
            out.push('\n');
        }
    }
    out.push('\n');
    out
}

fn wrap_in_namespaces(namespaces: &[String], body: &str) -> String {
    let mut out = body.to_owned();
    for namespace in namespaces.iter().rev() {
        let module = sanitize(namespace, "_");
        let mut wrapped = format!("pub mod {module} {{\n");
        for line in out.lines() {
            if line.is_empty() {
                wrapped.push('\n');
            } else {
                let _ = writeln!(wrapped, "    {line}");
            }
        }
        wrapped.push_str("}\n");
        out = wrapped;
    }
    out
}

/// Rust spelling of an IDL type.
fn rust_type(ty: &TypeRef) -> String {
    match ty {
        TypeRef::Scalar(kind) => kind.signature().to_owned(),
        TypeRef::Bool => "bool".to_owned(),
        TypeRef::Float => "f32".to_owned(),
        TypeRef::Double => "f64".to_owned(),
        TypeRef::Str => "String".to_owned(),
        TypeRef::Bytes => "Vec<u8>".to_owned(),
        TypeRef::Vector(inner) => format!("Vec<{}>", rust_type(inner)),
        TypeRef::Map(key, value) => format!(
            "std::collections::BTreeMap<{}, {}>",
            rust_type(key),
            rust_type(value)
        ),
        // Address-only semantics: the target is not transported.
        TypeRef::Pointer(_) => "u64".to_owned(),
        TypeRef::InterfaceRef(_) => "meridian_proto::InterfaceDescriptor".to_owned(),
        TypeRef::Named(name) => pascal_case(&sanitize(name, "_")),
        TypeRef::Template(name, args) => {
            let args: Vec<String> = args.iter().map(|a| a.signature()).collect();
            pascal_case(&instantiation_name(name, &args))
        }
    }
}

fn request_struct_name(interface: &InterfaceDef, method: &Method) -> String {
    format!(
        "{}{}Request",
        pascal_case(&interface.name),
        pascal_case(&method.name)
    )
}

fn response_struct_name(interface: &InterfaceDef, method: &Method) -> String {
    format!(
        "{}{}Response",
        pascal_case(&interface.name),
        pascal_case(&method.name)
    )
}

fn method_return_type(method: &Method) -> String {
    let outputs: Vec<&crate::ast::Param> = method.outputs().collect();
    match outputs.len() {
        0 => "Result<(), ErrorCode>".to_owned(),
        1 => format!("Result<{}, ErrorCode>", rust_type(&outputs[0].ty)),
        _ => {
            let types: Vec<String> = outputs.iter().map(|p| rust_type(&p.ty)).collect();
            format!("Result<({}), ErrorCode>", types.join(", "))
        }
    }
}

fn method_args(method: &Method) -> String {
    method
        .inputs()
        .map(|param| format!(", {}: {}", snake_case(&param.name), rust_type(&param.ty)))
        .collect()
}

fn derive_line() -> &'static str {
    "#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]\n"
}

// ---- interface file --------------------------------------------------

fn interface_file(tree: &IdlFile, options: &RustGenOptions<'_>) -> Result<String, GenError> {
    let mut body = String::new();

    for import in &tree.imports {
        let _ = writeln!(
            body,
            "pub use {}::*;",
            interface_module_path(import, options.namespaces)
        );
    }
    if !tree.imports.is_empty() {
        body.push('\n');
    }

    let instantiations = collect_instantiations(tree)?;
    for concrete in &instantiations {
        body.push_str(derive_line());
        let _ = writeln!(body, "pub struct {} {{", pascal_case(&concrete.name));
        for field in &concrete.fields {
            let _ = writeln!(
                body,
                "    pub {}: {},",
                snake_case(&field.name),
                rust_type(&field.ty)
            );
        }
        body.push_str("}\n");
        marshalled_impl(&mut body, &pascal_case(&concrete.name), options);
        body.push('\n');
    }

    for namespace in &tree.namespaces {
        for item in &namespace.items {
            if !item.is_local() {
                continue;
            }
            match item {
                Item::Enum(def) => emit_enum(&mut body, def),
                Item::Struct(def) => emit_struct(&mut body, def, options),
                Item::Typedef(def) => {
                    let _ = writeln!(
                        body,
                        "pub type {} = {};\n",
                        pascal_case(&sanitize(&def.name, "_")),
                        rust_type(&def.ty)
                    );
                }
                Item::Interface(def) => {
                    emit_interface_decl(&mut body, &namespace.name, def, options)
                }
                // Concrete instantiations were emitted above.
                Item::TemplateStruct(_) => {}
            }
        }
    }

    if options.enable_protobuf {
        body.push_str(&crate::pbgen::pb_module(tree)?);
    }

    let mut out = banner(options.module_name);
    let content = format!("{}{}", prelude(options, options.additional_headers, false), body);
    out.push_str(&wrap_in_namespaces(options.namespaces, &content));
    Ok(out)
}

fn emit_enum(body: &mut String, def: &EnumDef) {
    body.push_str("#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]\n");
    body.push_str("#[repr(i64)]\n");
    let _ = writeln!(body, "pub enum {} {{", pascal_case(&def.name));

    let mut next = 0i64;
    for (name, explicit) in &def.values {
        let value = explicit.unwrap_or(next);
        let _ = writeln!(body, "    {} = {},", pascal_case(name), value);
        next = value + 1;
    }
    body.push_str("}\n\n");

    let first = def
        .values
        .first()
        .map(|(name, _)| pascal_case(name))
        .unwrap_or_default();
    let _ = writeln!(
        body,
        "impl Default for {} {{\n    fn default() -> Self {{\n        Self::{first}\n    }}\n}}\n",
        pascal_case(&def.name)
    );

    // Value-based lookup, used by the protobuf mirrors and by callers that
    // receive raw discriminants.
    let _ = writeln!(body, "impl {} {{", pascal_case(&def.name));
    body.push_str("    pub fn from_value(value: i64) -> Option<Self> {\n");
    body.push_str("        match value {\n");
    let mut next = 0i64;
    for (name, explicit) in &def.values {
        let value = explicit.unwrap_or(next);
        let _ = writeln!(body, "            {value} => Some(Self::{}),", pascal_case(name));
        next = value + 1;
    }
    body.push_str("            _ => None,\n        }\n    }\n}\n\n");
}

fn emit_struct(body: &mut String, def: &StructDef, options: &RustGenOptions<'_>) {
    body.push_str(derive_line());
    let name = pascal_case(&sanitize(&def.name, "_"));
    let _ = writeln!(body, "pub struct {name} {{");
    for field in &def.fields {
        let _ = writeln!(
            body,
            "    pub {}: {},",
            snake_case(&field.name),
            rust_type(&field.ty)
        );
    }
    body.push_str("}\n");
    marshalled_impl(body, &name, options);
    body.push('\n');
}

// The serde-backed encodings are the baseline every wire type carries;
// `--protobuf` additionally routes the protobuf hooks through the mirrors.
fn marshalled_impl(body: &mut String, name: &str, options: &RustGenOptions<'_>) {
    if options.enable_protobuf {
        let _ = writeln!(
            body,
            "impl meridian_proto::Marshalled for {name} {{\n    \
             fn protobuf_encode(&self) -> Result<Vec<u8>, ProtocolError> {{\n        \
             pb::encode(&pb::{name}::from(self))\n    }}\n\n    \
             fn protobuf_decode(bytes: &[u8]) -> Result<Self, ProtocolError> {{\n        \
             pb::decode::<pb::{name}>(bytes).map(Into::into)\n    }}\n\n    \
             fn supports(_encoding: Encoding) -> bool {{\n        true\n    }}\n}}"
        );
    } else {
        let _ = writeln!(body, "impl meridian_proto::Marshalled for {name} {{}}");
    }
}

fn emit_interface_decl(
    body: &mut String,
    namespace: &str,
    def: &InterfaceDef,
    options: &RustGenOptions<'_>,
) {
    let ordinal = interface_ordinal(namespace, def, options.protocol_version);
    let upper = snake_case(&def.name).to_uppercase();

    let _ = writeln!(
        body,
        "/// Stable ordinal of `{}` at protocol version {}.",
        def.name, options.protocol_version
    );
    let _ = writeln!(
        body,
        "pub const {upper}_INTERFACE: InterfaceOrdinal = InterfaceOrdinal::new(0x{ordinal:016X});\n"
    );

    for (index, method) in def.methods.iter().enumerate() {
        let _ = writeln!(
            body,
            "pub const {upper}_METHOD_{}: u64 = {};",
            snake_case(&method.name).to_uppercase(),
            index + 1
        );
    }
    body.push('\n');

    body.push_str("#[async_trait]\n");
    let _ = writeln!(body, "pub trait {}: Send + Sync {{", pascal_case(&def.name));
    for method in &def.methods {
        let _ = writeln!(
            body,
            "    async fn {}(&self{}) -> {};",
            snake_case(&method.name),
            method_args(method),
            method_return_type(method)
        );
    }
    body.push_str("}\n\n");

    // One request/response pair per method.
    for method in &def.methods {
        body.push_str(derive_line());
        let _ = writeln!(body, "pub struct {} {{", request_struct_name(def, method));
        for param in method.inputs() {
            let _ = writeln!(
                body,
                "    pub {}: {},",
                snake_case(&param.name),
                rust_type(&param.ty)
            );
        }
        body.push_str("}\n");
        marshalled_impl(body, &request_struct_name(def, method), options);
        body.push('\n');

        body.push_str(derive_line());
        let _ = writeln!(body, "pub struct {} {{", response_struct_name(def, method));
        for param in method.outputs() {
            let _ = writeln!(
                body,
                "    pub {}: {},",
                snake_case(&param.name),
                rust_type(&param.ty)
            );
        }
        body.push_str("}\n");
        marshalled_impl(body, &response_struct_name(def, method), options);
        body.push('\n');
    }
}

// ---- proxy file ------------------------------------------------------

fn proxy_file(tree: &IdlFile, options: &RustGenOptions<'_>) -> Result<String, GenError> {
    let mut body = String::new();
    let _ = writeln!(body, "use {}::*;\n", interface_module_path(options.module_name, options.namespaces));

    for (_, interface) in tree.interfaces() {
        if interface.origin.is_some() {
            continue;
        }
        emit_proxy(&mut body, interface);
    }

    let mut out = banner(options.module_name);
    let content = format!("{}{}", prelude(options, options.additional_headers, false), body);
    out.push_str(&wrap_in_namespaces(options.namespaces, &content));
    Ok(out)
}

fn emit_proxy(body: &mut String, def: &InterfaceDef) {
    let trait_name = pascal_case(&def.name);
    let proxy_name = format!("{trait_name}Proxy");
    let upper = snake_case(&def.name).to_uppercase();

    let _ = writeln!(body, "/// Typed client-side proxy for `{}`.", def.name);
    let _ = writeln!(
        body,
        "pub struct {proxy_name} {{\n    object: Arc<ObjectProxy>,\n}}\n"
    );
    let _ = writeln!(
        body,
        "impl Proxied for {proxy_name} {{\n    \
         const INTERFACE: InterfaceOrdinal = {upper}_INTERFACE;\n\n    \
         fn from_object(object: Arc<ObjectProxy>) -> Self {{\n        \
         Self {{ object }}\n    }}\n}}\n"
    );
    let _ = writeln!(
        body,
        "impl {proxy_name} {{\n    /// The untyped handle behind this proxy.\n    \
         pub fn object(&self) -> &Arc<ObjectProxy> {{\n        &self.object\n    }}\n}}\n"
    );

    body.push_str("#[async_trait]\n");
    let _ = writeln!(body, "impl {trait_name} for {proxy_name} {{");
    for method in &def.methods {
        let method_upper = snake_case(&method.name).to_uppercase();
        let request = request_struct_name(def, method);
        let response = response_struct_name(def, method);

        let _ = writeln!(
            body,
            "    async fn {}(&self{}) -> {} {{",
            snake_case(&method.name),
            method_args(method),
            method_return_type(method)
        );

        let field_inits: Vec<String> = method
            .inputs()
            .map(|p| snake_case(&p.name))
            .collect();
        let _ = writeln!(
            body,
            "        let encoding = self.object.service_proxy().encoding();"
        );
        let _ = writeln!(
            body,
            "        let payload = serialise(&{request} {{ {} }}, encoding)",
            field_inits.join(", ")
        );
        body.push_str("            .map_err(|_| ErrorCode::ProxyDeserialisationError)?;\n");
        let _ = writeln!(
            body,
            "        let result = self.object\n            \
             .send({upper}_INTERFACE, MethodId::new({upper}_METHOD_{method_upper}), payload, Vec::new())\n            \
             .await?;"
        );
        let _ = writeln!(
            body,
            "        let response: {response} = deserialise(encoding, &result.payload)"
        );
        body.push_str("            .map_err(|_| ErrorCode::ProxyDeserialisationError)?;\n");

        let outputs: Vec<String> = method
            .outputs()
            .map(|p| format!("response.{}", snake_case(&p.name)))
            .collect();
        match outputs.len() {
            0 => {
                body.push_str("        let _ = response;\n");
                body.push_str("        Ok(())\n");
            }
            1 => {
                let _ = writeln!(body, "        Ok({})", outputs[0]);
            }
            _ => {
                let _ = writeln!(body, "        Ok(({}))", outputs.join(", "));
            }
        }
        body.push_str("    }\n\n");
    }
    body.push_str("}\n\n");
}

// ---- stub file -------------------------------------------------------

fn stub_file(tree: &IdlFile, options: &RustGenOptions<'_>) -> Result<String, GenError> {
    let mut body = String::new();
    let _ = writeln!(body, "use {}::*;\n", interface_module_path(options.module_name, options.namespaces));

    body.push_str(
        "fn stub_decode_error(error: ProtocolError) -> ErrorCode {\n    match error {\n        \
         ProtocolError::UnknownEncoding(_) | ProtocolError::UnsupportedEncoding(_) => {\n            \
         ErrorCode::InvalidEncoding\n        }\n        \
         _ => ErrorCode::StubDeserialisationError,\n    }\n}\n\n",
    );

    if !options.rethrow_stub_exceptions.is_empty() {
        let list = options.rethrow_stub_exceptions.join(", ");
        let _ = writeln!(body, "// Pass-through implementation errors: {list}.\n");
    }

    for (_, interface) in tree.interfaces() {
        if interface.origin.is_some() {
            continue;
        }
        emit_stub(&mut body, interface, options);
    }

    let mut out = banner(options.module_name);
    let content = format!("{}{}", prelude(options, options.additional_stub_headers, true), body);
    out.push_str(&wrap_in_namespaces(options.namespaces, &content));
    Ok(out)
}

fn emit_stub(body: &mut String, def: &InterfaceDef, options: &RustGenOptions<'_>) {
    let trait_name = pascal_case(&def.name);
    let stub_name = format!("{trait_name}Stub");
    let upper = snake_case(&def.name).to_uppercase();

    let _ = writeln!(body, "/// Server-side dispatcher for `{}`.", def.name);
    let _ = writeln!(
        body,
        "pub struct {stub_name}<T> {{\n    implementation: Arc<T>,\n}}\n"
    );
    let _ = writeln!(
        body,
        "impl<T: {trait_name} + 'static> {stub_name}<T> {{\n    \
         pub fn new(implementation: Arc<T>) -> Arc<dyn InterfaceStub> {{\n        \
         Arc::new(Self {{ implementation }})\n    }}\n}}\n"
    );

    body.push_str("#[async_trait]\n");
    let _ = writeln!(
        body,
        "impl<T: {trait_name} + 'static> InterfaceStub for {stub_name}<T> {{"
    );
    let _ = writeln!(
        body,
        "    fn interface(&self) -> InterfaceOrdinal {{\n        {upper}_INTERFACE\n    }}\n"
    );
    body.push_str(
        "    async fn call(\n        &self,\n        method: MethodId,\n        \
         encoding: Encoding,\n        payload: &[u8],\n    ) -> Result<Vec<u8>, ErrorCode> {\n",
    );
    body.push_str("        match method.get() {\n");

    for method in &def.methods {
        let method_upper = snake_case(&method.name).to_uppercase();
        let request = request_struct_name(def, method);
        let response = response_struct_name(def, method);

        let _ = writeln!(body, "            {upper}_METHOD_{method_upper} => {{");
        let _ = writeln!(
            body,
            "                let request: {request} =\n                    \
             deserialise(encoding, payload).map_err(stub_decode_error)?;"
        );

        let args: Vec<String> = method
            .inputs()
            .map(|p| format!("request.{}", snake_case(&p.name)))
            .collect();

        let invoke = format!(
            "self.implementation.{}({})",
            snake_case(&method.name),
            args.join(", ")
        );
        let call = if options.suppress_catch_stub_exceptions {
            // Implementation failures and panics propagate to the caller's
            // task untouched.
            format!("                let result = {invoke}.await?;\n")
        } else {
            // A panicking implementation must not take the dispatch task
            // down; it surfaces as INTERNAL_ERROR instead.
            format!(
                "                let implementation = self.implementation.clone();\n                \
                 let result = match tokio::spawn(async move {{\n                    \
                 {}\n                }})\n                .await\n                {{\n                    \
                 Ok(result) => result?,\n                    \
                 Err(_) => return Err(ErrorCode::InternalError),\n                }};\n",
                invoke.replace("self.implementation", "implementation") + ".await"
            )
        };
        body.push_str(&call);

        let outputs: Vec<&crate::ast::Param> = method.outputs().collect();
        let response_init = match outputs.len() {
            0 => {
                "                let _ = result;\n                let response = "
                    .to_owned()
                    + &response
                    + " {};\n"
            }
            1 => format!(
                "                let response = {response} {{ {}: result }};\n",
                snake_case(&outputs[0].name)
            ),
            _ => {
                let fields: Vec<String> = outputs
                    .iter()
                    .enumerate()
                    .map(|(i, p)| format!("{}: result.{i}", snake_case(&p.name)))
                    .collect();
                format!(
                    "                let response = {response} {{ {} }};\n",
                    fields.join(", ")
                )
            }
        };
        body.push_str(&response_init);
        body.push_str(
            "                serialise(&response, encoding)\n                    \
             .map_err(|_| ErrorCode::StubDeserialisationError)\n",
        );
        body.push_str("            }\n");
    }

    body.push_str("            _ => Err(ErrorCode::MethodNotFound),\n");
    body.push_str("        }\n    }\n}\n\n");
}

// ---- mock file -------------------------------------------------------

fn mock_file(tree: &IdlFile, options: &RustGenOptions<'_>) -> Result<String, GenError> {
    let mut body = String::new();
    let _ = writeln!(body, "use {}::*;\n", interface_module_path(options.module_name, options.namespaces));

    for (_, interface) in tree.interfaces() {
        if interface.origin.is_some() {
            continue;
        }
        let trait_name = pascal_case(&interface.name);
        let _ = writeln!(
            body,
            "/// Mock `{}` answering every method with defaults.",
            interface.name
        );
        let _ = writeln!(body, "#[derive(Debug, Default)]\npub struct Mock{trait_name};\n");
        body.push_str("#[async_trait]\n");
        let _ = writeln!(body, "impl {trait_name} for Mock{trait_name} {{");
        for method in &interface.methods {
            let _ = writeln!(
                body,
                "    async fn {}(&self{}) -> {} {{\n        Ok(Default::default())\n    }}",
                snake_case(&method.name),
                method_args(method),
                method_return_type(method)
            );
        }
        body.push_str("}\n\n");
    }

    let mut out = banner(options.module_name);
    let content = format!("{}{}", prelude(options, options.additional_headers, false), body);
    out.push_str(&wrap_in_namespaces(options.namespaces, &content));
    Ok(out)
}

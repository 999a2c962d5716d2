//! The parsed IDL tree.

/// Scalar parameter kinds with a fixed wire width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
}

impl ScalarKind {
    /// The canonical signature name, used for fingerprinting.
    #[must_use]
    pub const fn signature(self) -> &'static str {
        match self {
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
        }
    }
}

/// A type expression as written in the IDL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Scalar(ScalarKind),
    Bool,
    Float,
    Double,
    /// Length-prefixed text.
    Str,
    /// `vector<byte>`: opaque bytes.
    Bytes,
    Vector(Box<TypeRef>),
    Map(Box<TypeRef>, Box<TypeRef>),
    /// `T*`: marshals as a 64-bit address, the target is not transported.
    Pointer(Box<TypeRef>),
    /// `shared_ptr<I>` / `optimistic_ptr<I>`: marshals as a descriptor.
    InterfaceRef(String),
    /// Reference to a named struct, enum or typedef, possibly qualified.
    Named(String),
    /// Template struct instantiation, e.g. `boxed<int>`.
    Template(String, Vec<TypeRef>),
}

impl TypeRef {
    /// Canonical signature text, stable across runs and platforms.
    #[must_use]
    pub fn signature(&self) -> String {
        match self {
            Self::Scalar(kind) => kind.signature().to_owned(),
            Self::Bool => "bool".to_owned(),
            Self::Float => "f32".to_owned(),
            Self::Double => "f64".to_owned(),
            Self::Str => "string".to_owned(),
            Self::Bytes => "bytes".to_owned(),
            Self::Vector(inner) => format!("vector<{}>", inner.signature()),
            Self::Map(key, value) => {
                format!("map<{},{}>", key.signature(), value.signature())
            }
            Self::Pointer(inner) => format!("{}*", inner.signature()),
            Self::InterfaceRef(name) => format!("interface<{name}>"),
            Self::Named(name) => name.clone(),
            Self::Template(name, args) => {
                let args: Vec<String> = args.iter().map(TypeRef::signature).collect();
                format!("{name}<{}>", args.join(","))
            }
        }
    }
}

/// Parameter direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// One method parameter.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
    pub direction: Direction,
}

/// One interface method. The declared result is an error-code type.
#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub result: String,
    pub params: Vec<Param>,
}

impl Method {
    /// The `[in]` parameters.
    pub fn inputs(&self) -> impl Iterator<Item = &Param> {
        self.params
            .iter()
            .filter(|p| p.direction == Direction::In)
    }

    /// The `[out]` parameters.
    pub fn outputs(&self) -> impl Iterator<Item = &Param> {
        self.params
            .iter()
            .filter(|p| p.direction == Direction::Out)
    }
}

/// An interface declaration.
#[derive(Debug, Clone)]
pub struct InterfaceDef {
    pub name: String,
    pub methods: Vec<Method>,
    /// Stem of the IDL this was imported from, if any.
    pub origin: Option<String>,
}

/// A struct declaration.
#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<Field>,
    pub origin: Option<String>,
}

/// A template struct declaration; concrete instantiations are emitted only
/// where used.
#[derive(Debug, Clone)]
pub struct TemplateStructDef {
    pub name: String,
    pub params: Vec<String>,
    pub fields: Vec<Field>,
    pub origin: Option<String>,
}

/// One struct field.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: TypeRef,
}

/// An enum declaration.
#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    pub values: Vec<(String, Option<i64>)>,
    pub origin: Option<String>,
}

impl EnumDef {
    /// Whether any value is explicitly zero.
    #[must_use]
    pub fn has_zero_value(&self) -> bool {
        let mut next = 0i64;
        for (_, explicit) in &self.values {
            let value = explicit.unwrap_or(next);
            if value == 0 {
                return true;
            }
            next = value + 1;
        }
        false
    }
}

/// A typedef alias.
#[derive(Debug, Clone)]
pub struct TypedefDef {
    pub name: String,
    pub ty: TypeRef,
    pub origin: Option<String>,
}

/// Top-level declarations.
#[derive(Debug, Clone)]
pub enum Item {
    Struct(StructDef),
    TemplateStruct(TemplateStructDef),
    Enum(EnumDef),
    Typedef(TypedefDef),
    Interface(InterfaceDef),
}

impl Item {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Struct(def) => &def.name,
            Self::TemplateStruct(def) => &def.name,
            Self::Enum(def) => &def.name,
            Self::Typedef(def) => &def.name,
            Self::Interface(def) => &def.name,
        }
    }

    #[must_use]
    pub fn origin(&self) -> Option<&str> {
        match self {
            Self::Struct(def) => def.origin.as_deref(),
            Self::TemplateStruct(def) => def.origin.as_deref(),
            Self::Enum(def) => def.origin.as_deref(),
            Self::Typedef(def) => def.origin.as_deref(),
            Self::Interface(def) => def.origin.as_deref(),
        }
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        self.origin().is_none()
    }
}

/// One namespace and its declarations. The unnamed namespace holds items
/// declared at file scope.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    pub name: String,
    pub items: Vec<Item>,
}

/// A fully parsed and merged IDL tree.
#[derive(Debug, Clone, Default)]
pub struct IdlFile {
    /// Stems of directly imported IDL files, in import order.
    pub imports: Vec<String>,
    pub namespaces: Vec<Namespace>,
}

impl IdlFile {
    /// All interfaces, with their namespace.
    pub fn interfaces(&self) -> impl Iterator<Item = (&Namespace, &InterfaceDef)> {
        self.namespaces.iter().flat_map(|ns| {
            ns.items.iter().filter_map(move |item| match item {
                Item::Interface(def) => Some((ns, def)),
                _ => None,
            })
        })
    }

    /// Looks up a template struct by name anywhere in the tree.
    #[must_use]
    pub fn template(&self, name: &str) -> Option<&TemplateStructDef> {
        self.namespaces.iter().find_map(|ns| {
            ns.items.iter().find_map(|item| match item {
                Item::TemplateStruct(def) if def.name == name => Some(def),
                _ => None,
            })
        })
    }
}

//! IDL front-end: preprocessor and recursive-descent parser.
//!
//! The preprocessor strips comments, evaluates `#ifdef`-style conditionals
//! against the command-line defines (`GENERATOR` is always defined), and
//! resolves `import "file.idl";` lines along the include paths. Imported
//! declarations are merged into the tree with their origin recorded so the
//! emitters can reference instead of redefine them.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::ast::{
    Direction, EnumDef, Field, IdlFile, InterfaceDef, Item, Method, Namespace, Param, ScalarKind,
    StructDef, TemplateStructDef, TypeRef, TypedefDef,
};
use crate::GenError;

/// The IDL preprocessor.
pub struct Preprocessor {
    defines: BTreeMap<String, String>,
    include_paths: Vec<PathBuf>,
}

/// Output of a full preprocessor + parser run.
pub struct ParsedIdl {
    pub tree: IdlFile,
    /// Fully preprocessed text (imports expanded), for `--dump_preprocessor`.
    pub preprocessed: String,
}

impl Preprocessor {
    /// Creates a preprocessor with the given include paths and defines.
    ///
    /// `GENERATOR` is implicitly defined, as build scripts rely on it to
    /// guard generator-only declarations.
    #[must_use]
    pub fn new(include_paths: Vec<PathBuf>, defines: &[String]) -> Self {
        let mut map = BTreeMap::new();
        map.insert("GENERATOR".to_owned(), "1".to_owned());
        for define in defines {
            match define.split_once('=') {
                Some((name, value)) => map.insert(name.to_owned(), value.to_owned()),
                None => map.insert(define.clone(), String::new()),
            };
        }
        Self {
            defines: map,
            include_paths,
        }
    }

    /// Preprocesses and parses `root`, merging imported files.
    pub fn load(&self, root: &Path) -> Result<ParsedIdl, GenError> {
        let mut visited = HashSet::new();
        let mut tree = IdlFile::default();
        let mut preprocessed = String::new();
        self.load_file(root, None, &mut visited, &mut tree, &mut preprocessed)?;
        Ok(ParsedIdl { tree, preprocessed })
    }

    fn load_file(
        &self,
        path: &Path,
        origin: Option<&str>,
        visited: &mut HashSet<PathBuf>,
        tree: &mut IdlFile,
        preprocessed: &mut String,
    ) -> Result<(), GenError> {
        let canonical = path
            .canonicalize()
            .map_err(|e| GenError::Input(format!("{}: {e}", path.display())))?;
        if !visited.insert(canonical.clone()) {
            return Ok(());
        }

        let source = std::fs::read_to_string(&canonical)
            .map_err(|e| GenError::Input(format!("{}: {e}", path.display())))?;
        let (text, imports) = self.expand(&source, path)?;

        // Imports first: declarations must exist before their users.
        for import in &imports {
            let stem = Path::new(import)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(import.as_str())
                .to_owned();
            let resolved = self.resolve_import(import, path)?;

            if origin.is_none() {
                tree.imports.push(stem.clone());
            }
            self.load_file(&resolved, Some(&stem), visited, tree, preprocessed)?;
        }

        preprocessed.push_str(&text);
        if !text.ends_with('\n') {
            preprocessed.push('\n');
        }

        let parsed = Parser::new(&text, path).parse()?;
        merge(tree, parsed, origin);
        Ok(())
    }

    fn resolve_import(&self, import: &str, importer: &Path) -> Result<PathBuf, GenError> {
        let mut candidates = Vec::new();
        if let Some(dir) = importer.parent() {
            candidates.push(dir.join(import));
        }
        for path in &self.include_paths {
            candidates.push(path.join(import));
        }

        candidates
            .into_iter()
            .find(|candidate| candidate.exists())
            .ok_or_else(|| GenError::Input(format!("cannot resolve import \"{import}\"")))
    }

    /// Strips comments, applies conditionals and extracts import lines.
    fn expand(&self, source: &str, path: &Path) -> Result<(String, Vec<String>), GenError> {
        let without_comments = strip_comments(source);
        let mut output = String::new();
        let mut imports = Vec::new();
        let mut defines = self.defines.clone();
        // Stack of (parent emitting, this branch taken).
        let mut conditions: Vec<(bool, bool)> = Vec::new();

        for (index, line) in without_comments.lines().enumerate() {
            let trimmed = line.trim();
            let emitting = conditions.iter().all(|&(parent, taken)| parent && taken);

            if let Some(directive) = trimmed.strip_prefix('#') {
                let mut words = directive.split_whitespace();
                let keyword = words.next().unwrap_or("");
                let argument = words.next().unwrap_or("");

                match keyword {
                    "ifdef" => conditions.push((emitting, defines.contains_key(argument))),
                    "ifndef" => conditions.push((emitting, !defines.contains_key(argument))),
                    "else" => match conditions.last_mut() {
                        Some((_, taken)) => *taken = !*taken,
                        None => {
                            return Err(GenError::parse(path, index + 1, "#else without #ifdef"))
                        }
                    },
                    "endif" => {
                        if conditions.pop().is_none() {
                            return Err(GenError::parse(path, index + 1, "#endif without #ifdef"));
                        }
                    }
                    "define" => {
                        if emitting {
                            let value = words.collect::<Vec<_>>().join(" ");
                            defines.insert(argument.to_owned(), value);
                        }
                    }
                    other => {
                        return Err(GenError::parse(
                            path,
                            index + 1,
                            format!("unknown directive #{other}"),
                        ))
                    }
                }
                continue;
            }

            if !emitting {
                continue;
            }

            if let Some(rest) = trimmed.strip_prefix("import") {
                let file = rest
                    .trim()
                    .trim_end_matches(';')
                    .trim()
                    .trim_matches('"')
                    .to_owned();
                if file.is_empty() {
                    return Err(GenError::parse(path, index + 1, "empty import"));
                }
                imports.push(file);
                continue;
            }

            output.push_str(line);
            output.push('\n');
        }

        if !conditions.is_empty() {
            return Err(GenError::Input(format!(
                "{}: unterminated #ifdef",
                path.display()
            )));
        }

        Ok((output, imports))
    }
}

fn merge(tree: &mut IdlFile, parsed: Vec<Namespace>, origin: Option<&str>) {
    for mut namespace in parsed {
        for item in &mut namespace.items {
            set_origin(item, origin);
        }

        match tree
            .namespaces
            .iter_mut()
            .find(|existing| existing.name == namespace.name)
        {
            Some(existing) => existing.items.extend(namespace.items),
            None => tree.namespaces.push(namespace),
        }
    }
}

fn set_origin(item: &mut Item, origin: Option<&str>) {
    let origin = origin.map(str::to_owned);
    match item {
        Item::Struct(def) => def.origin = origin,
        Item::TemplateStruct(def) => def.origin = origin,
        Item::Enum(def) => def.origin = origin,
        Item::Typedef(def) => def.origin = origin,
        Item::Interface(def) => def.origin = origin,
    }
}

fn strip_comments(source: &str) -> String {
    let mut output = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut in_block = false;
    let mut in_line = false;

    while let Some(c) = chars.next() {
        if in_block {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block = false;
            } else if c == '\n' {
                output.push('\n');
            }
            continue;
        }
        if in_line {
            if c == '\n' {
                in_line = false;
                output.push('\n');
            }
            continue;
        }
        if c == '/' {
            match chars.peek() {
                Some('/') => {
                    chars.next();
                    in_line = true;
                    continue;
                }
                Some('*') => {
                    chars.next();
                    in_block = true;
                    continue;
                }
                _ => {}
            }
        }
        output.push(c);
    }

    output
}

// ---- tokens ----------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(i64),
    Punct(char),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ident(name) => write!(f, "`{name}`"),
            Self::Number(value) => write!(f, "`{value}`"),
            Self::Punct(c) => write!(f, "`{c}`"),
        }
    }
}

struct Parser<'a> {
    tokens: Vec<(Token, usize)>,
    position: usize,
    path: &'a Path,
}

impl<'a> Parser<'a> {
    fn new(text: &str, path: &'a Path) -> Self {
        let mut tokens = Vec::new();
        let mut line = 1usize;
        let mut chars = text.chars().peekable();

        while let Some(&c) = chars.peek() {
            if c == '\n' {
                line += 1;
                chars.next();
            } else if c.is_whitespace() {
                chars.next();
            } else if c.is_alphabetic() || c == '_' {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((Token::Ident(ident), line));
            } else if c.is_ascii_digit() {
                let mut number = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == 'x' || c.is_ascii_hexdigit() {
                        number.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = parse_number(&number).unwrap_or(0);
                tokens.push((Token::Number(value), line));
            } else {
                chars.next();
                tokens.push((Token::Punct(c), line));
            }
        }

        Self {
            tokens,
            position: 0,
            path,
        }
    }

    fn error(&self, message: impl Into<String>) -> GenError {
        let line = self
            .tokens
            .get(self.position.min(self.tokens.len().saturating_sub(1)))
            .map_or(0, |(_, line)| *line);
        GenError::parse(self.path, line, message)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|(token, _)| token)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).map(|(token, _)| token.clone());
        self.position += 1;
        token
    }

    fn eat_punct(&mut self, expected: char) -> Result<(), GenError> {
        match self.next() {
            Some(Token::Punct(c)) if c == expected => Ok(()),
            Some(other) => Err(self.error(format!("expected `{expected}`, found {other}"))),
            None => Err(self.error(format!("expected `{expected}`, found end of input"))),
        }
    }

    fn try_punct(&mut self, expected: char) -> bool {
        if self.peek() == Some(&Token::Punct(expected)) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Result<String, GenError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            Some(other) => Err(self.error(format!("expected identifier, found {other}"))),
            None => Err(self.error("expected identifier, found end of input")),
        }
    }

    fn parse(mut self) -> Result<Vec<Namespace>, GenError> {
        let mut namespaces: Vec<Namespace> = Vec::new();
        let mut root = Namespace::default();

        while let Some(token) = self.peek().cloned() {
            match token {
                Token::Ident(ref name) if name == "namespace" => {
                    self.next();
                    let name = self.ident()?;
                    self.eat_punct('{')?;
                    let mut namespace = Namespace {
                        name,
                        items: Vec::new(),
                    };
                    while !self.try_punct('}') {
                        namespace.items.push(self.parse_item()?);
                    }
                    self.try_punct(';');
                    namespaces.push(namespace);
                }
                _ => root.items.push(self.parse_item()?),
            }
        }

        if !root.items.is_empty() {
            namespaces.insert(0, root);
        }
        Ok(namespaces)
    }

    fn parse_item(&mut self) -> Result<Item, GenError> {
        let keyword = self.ident()?;
        match keyword.as_str() {
            "struct" => self.parse_struct().map(Item::Struct),
            "template" => self.parse_template().map(Item::TemplateStruct),
            "enum" => self.parse_enum().map(Item::Enum),
            "typedef" => self.parse_typedef().map(Item::Typedef),
            "interface" => self.parse_interface().map(Item::Interface),
            other => Err(self.error(format!("unexpected declaration `{other}`"))),
        }
    }

    fn parse_struct(&mut self) -> Result<StructDef, GenError> {
        let name = self.ident()?;
        let fields = self.parse_fields()?;
        Ok(StructDef {
            name,
            fields,
            origin: None,
        })
    }

    fn parse_template(&mut self) -> Result<TemplateStructDef, GenError> {
        self.eat_punct('<')?;
        let mut params = vec![self.ident()?];
        while self.try_punct(',') {
            params.push(self.ident()?);
        }
        self.eat_punct('>')?;

        let keyword = self.ident()?;
        if keyword != "struct" {
            return Err(self.error("only template structs are supported"));
        }
        let name = self.ident()?;
        let fields = self.parse_fields()?;
        Ok(TemplateStructDef {
            name,
            params,
            fields,
            origin: None,
        })
    }

    fn parse_fields(&mut self) -> Result<Vec<Field>, GenError> {
        self.eat_punct('{')?;
        let mut fields = Vec::new();
        while !self.try_punct('}') {
            let ty = self.parse_type()?;
            let name = self.ident()?;
            self.eat_punct(';')?;
            fields.push(Field { name, ty });
        }
        self.try_punct(';');
        Ok(fields)
    }

    fn parse_enum(&mut self) -> Result<EnumDef, GenError> {
        let name = self.ident()?;
        self.eat_punct('{')?;
        let mut values = Vec::new();
        while !self.try_punct('}') {
            let value_name = self.ident()?;
            let explicit = if self.try_punct('=') {
                let negative = self.try_punct('-');
                match self.next() {
                    Some(Token::Number(value)) => {
                        Some(if negative { -value } else { value })
                    }
                    _ => return Err(self.error("expected enum value")),
                }
            } else {
                None
            };
            values.push((value_name, explicit));
            self.try_punct(',');
        }
        self.try_punct(';');
        Ok(EnumDef {
            name,
            values,
            origin: None,
        })
    }

    fn parse_typedef(&mut self) -> Result<TypedefDef, GenError> {
        let ty = self.parse_type()?;
        let name = self.ident()?;
        self.eat_punct(';')?;
        Ok(TypedefDef {
            name,
            ty,
            origin: None,
        })
    }

    fn parse_interface(&mut self) -> Result<InterfaceDef, GenError> {
        let name = self.ident()?;
        self.eat_punct('{')?;
        let mut methods = Vec::new();
        while !self.try_punct('}') {
            methods.push(self.parse_method()?);
        }
        self.try_punct(';');
        Ok(InterfaceDef {
            name,
            methods,
            origin: None,
        })
    }

    fn parse_method(&mut self) -> Result<Method, GenError> {
        let result = self.ident()?;
        let name = self.ident()?;
        self.eat_punct('(')?;

        let mut params = Vec::new();
        if !self.try_punct(')') {
            loop {
                params.push(self.parse_param()?);
                if self.try_punct(')') {
                    break;
                }
                self.eat_punct(',')?;
            }
        }
        self.eat_punct(';')?;

        Ok(Method {
            name,
            result,
            params,
        })
    }

    fn parse_param(&mut self) -> Result<Param, GenError> {
        let direction = match self.peek().cloned() {
            Some(Token::Ident(ref word)) if word == "out" => {
                self.next();
                Direction::Out
            }
            Some(Token::Ident(ref word)) if word == "in" => {
                self.next();
                Direction::In
            }
            _ => Direction::In,
        };

        let ty = self.parse_type()?;
        let name = self.ident()?;
        Ok(Param {
            name,
            ty,
            direction,
        })
    }

    fn parse_type(&mut self) -> Result<TypeRef, GenError> {
        let mut base = self.parse_base_type()?;
        while self.try_punct('*') {
            base = TypeRef::Pointer(Box::new(base));
        }
        Ok(base)
    }

    fn parse_base_type(&mut self) -> Result<TypeRef, GenError> {
        let name = self.ident()?;
        let ty = match name.as_str() {
            "bool" => TypeRef::Bool,
            "float" => TypeRef::Float,
            "double" => TypeRef::Double,
            "string" => TypeRef::Str,
            "char" | "int8" => TypeRef::Scalar(ScalarKind::I8),
            "byte" | "uint8" => TypeRef::Scalar(ScalarKind::U8),
            "short" | "int16" => TypeRef::Scalar(ScalarKind::I16),
            "ushort" | "uint16" => TypeRef::Scalar(ScalarKind::U16),
            "int32" => TypeRef::Scalar(ScalarKind::I32),
            "uint32" => TypeRef::Scalar(ScalarKind::U32),
            "int" | "long" | "int64" => TypeRef::Scalar(ScalarKind::I64),
            "uint" | "ulong" | "uint64" => TypeRef::Scalar(ScalarKind::U64),
            "vector" => {
                self.eat_punct('<')?;
                let inner = self.parse_type()?;
                self.eat_punct('>')?;
                if inner == TypeRef::Scalar(ScalarKind::U8) {
                    TypeRef::Bytes
                } else {
                    TypeRef::Vector(Box::new(inner))
                }
            }
            "map" => {
                self.eat_punct('<')?;
                let key = self.parse_type()?;
                self.eat_punct(',')?;
                let value = self.parse_type()?;
                self.eat_punct('>')?;
                TypeRef::Map(Box::new(key), Box::new(value))
            }
            "shared_ptr" | "optimistic_ptr" => {
                self.eat_punct('<')?;
                let interface = self.qualified_ident()?;
                self.eat_punct('>')?;
                TypeRef::InterfaceRef(interface)
            }
            _ => {
                let qualified = self.continue_qualified(name)?;
                if self.try_punct('<') {
                    let mut args = vec![self.parse_type()?];
                    while self.try_punct(',') {
                        args.push(self.parse_type()?);
                    }
                    self.eat_punct('>')?;
                    TypeRef::Template(qualified, args)
                } else {
                    TypeRef::Named(qualified)
                }
            }
        };
        Ok(ty)
    }

    fn qualified_ident(&mut self) -> Result<String, GenError> {
        let first = self.ident()?;
        self.continue_qualified(first)
    }

    fn continue_qualified(&mut self, mut name: String) -> Result<String, GenError> {
        while self.peek() == Some(&Token::Punct(':')) {
            self.next();
            self.eat_punct(':')?;
            name.push_str("::");
            name.push_str(&self.ident()?);
        }
        Ok(name)
    }
}

fn parse_number(text: &str) -> Option<i64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

/// Parses IDL text directly, without filesystem access. Used by tests and
/// by callers that already hold the source.
pub fn parse_text(text: &str) -> Result<IdlFile, GenError> {
    let namespaces = Parser::new(text, Path::new("<inline>")).parse()?;
    let mut tree = IdlFile::default();
    merge(&mut tree, namespaces, None);
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        // Arithmetic surface exposed to peers.
        namespace demo {
            enum status {
                idle = 0,
                busy,
            };

            struct pair {
                int first;
                int second;
            };

            template<T> struct boxed {
                T value;
            };

            interface Calculator {
                OK add(int a, int b, out int r);
                OK accumulate(vector<int> values, out long total);
                OK describe(boxed<pair> input, out string text);
            };
        }
    "#;

    #[test]
    fn parses_the_sample() {
        let tree = parse_text(SAMPLE).unwrap();
        assert_eq!(tree.namespaces.len(), 1);

        let namespace = &tree.namespaces[0];
        assert_eq!(namespace.name, "demo");
        assert_eq!(namespace.items.len(), 4);

        let (_, interface) = tree.interfaces().next().unwrap();
        assert_eq!(interface.name, "Calculator");
        assert_eq!(interface.methods.len(), 3);

        let add = &interface.methods[0];
        assert_eq!(add.result, "OK");
        assert_eq!(add.inputs().count(), 2);
        assert_eq!(add.outputs().count(), 1);
    }

    #[test]
    fn type_expressions() {
        let tree = parse_text(
            "struct everything {
                vector<byte> blob;
                vector<string> names;
                map<string, int> table;
                shared_ptr<Calculator> calc;
                pair* address;
            };",
        )
        .unwrap();

        let Item::Struct(def) = &tree.namespaces[0].items[0] else {
            panic!("expected struct");
        };

        assert_eq!(def.fields[0].ty, TypeRef::Bytes);
        assert_eq!(
            def.fields[1].ty,
            TypeRef::Vector(Box::new(TypeRef::Str))
        );
        assert!(matches!(def.fields[2].ty, TypeRef::Map(_, _)));
        assert_eq!(
            def.fields[3].ty,
            TypeRef::InterfaceRef("Calculator".to_owned())
        );
        assert!(matches!(def.fields[4].ty, TypeRef::Pointer(_)));
    }

    #[test]
    fn conditionals_follow_defines() {
        let preprocessor = Preprocessor::new(Vec::new(), &["FEATURE".to_owned()]);
        let (text, _) = preprocessor
            .expand(
                "#ifdef FEATURE\nstruct present { int x; };\n#else\nstruct absent { int x; };\n#endif\n",
                Path::new("<inline>"),
            )
            .unwrap();

        assert!(text.contains("present"));
        assert!(!text.contains("absent"));
    }

    #[test]
    fn generator_define_is_implicit() {
        let preprocessor = Preprocessor::new(Vec::new(), &[]);
        let (text, _) = preprocessor
            .expand(
                "#ifdef GENERATOR\nstruct generator_only { int x; };\n#endif\n",
                Path::new("<inline>"),
            )
            .unwrap();
        assert!(text.contains("generator_only"));
    }

    #[test]
    fn import_lines_are_extracted() {
        let preprocessor = Preprocessor::new(Vec::new(), &[]);
        let (text, imports) = preprocessor
            .expand(
                "import \"common.idl\";\nstruct local { int x; };\n",
                Path::new("<inline>"),
            )
            .unwrap();

        assert_eq!(imports, vec!["common.idl".to_owned()]);
        assert!(!text.contains("import"));
    }

    #[test]
    fn comments_are_stripped() {
        let stripped = strip_comments("int a; // trailing\n/* block\nspanning */ int b;\n");
        assert!(!stripped.contains("trailing"));
        assert!(!stripped.contains("block"));
        assert!(stripped.contains("int a;"));
        assert!(stripped.contains("int b;"));
    }
}

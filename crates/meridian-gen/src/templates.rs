//! Template instantiation collection.
//!
//! Template structs are emitted only as concrete instantiations: every
//! `[in]` parameter, struct field and typedef in the tree (including
//! imported IDLs) is scanned for `template<arg>` occurrences, and one
//! concrete struct per distinct `(template, args)` pair is produced with a
//! sanitized flat name. Instantiated fields may themselves name further
//! templates, so collection runs to a fixed point.

use std::collections::BTreeMap;

use crate::ast::{Field, IdlFile, Item, TypeRef};
use crate::names::instantiation_name;
use crate::GenError;

/// A template struct made concrete for one argument list.
#[derive(Debug, Clone)]
pub struct ConcreteStruct {
    /// Flat sanitized name, e.g. `boxed_pair`.
    pub name: String,
    pub template: String,
    pub args: Vec<TypeRef>,
    /// Fields with template parameters substituted.
    pub fields: Vec<Field>,
}

/// Collects every template instantiation in the tree, transitively.
pub fn collect_instantiations(tree: &IdlFile) -> Result<Vec<ConcreteStruct>, GenError> {
    let mut found: BTreeMap<String, ConcreteStruct> = BTreeMap::new();
    let mut pending: Vec<(String, Vec<TypeRef>)> = Vec::new();

    let mut scan = |ty: &TypeRef, pending: &mut Vec<(String, Vec<TypeRef>)>| {
        walk(ty, &mut |t| {
            if let TypeRef::Template(name, args) = t {
                pending.push((name.clone(), args.clone()));
            }
        });
    };

    for namespace in &tree.namespaces {
        for item in &namespace.items {
            match item {
                Item::Struct(def) => {
                    for field in &def.fields {
                        scan(&field.ty, &mut pending);
                    }
                }
                Item::Typedef(def) => scan(&def.ty, &mut pending),
                Item::Interface(def) => {
                    for method in &def.methods {
                        for param in &method.params {
                            scan(&param.ty, &mut pending);
                        }
                    }
                }
                Item::Enum(_) | Item::TemplateStruct(_) => {}
            }
        }
    }

    while let Some((template, args)) = pending.pop() {
        let signatures: Vec<String> = args.iter().map(TypeRef::signature).collect();
        let name = instantiation_name(&template, &signatures);
        if found.contains_key(&name) {
            continue;
        }

        let definition = tree.template(&template).ok_or_else(|| {
            GenError::Input(format!("unknown template `{template}` instantiated with args"))
        })?;
        if definition.params.len() != args.len() {
            return Err(GenError::Input(format!(
                "template `{template}` expects {} arguments, got {}",
                definition.params.len(),
                args.len()
            )));
        }

        let substitutions: BTreeMap<&str, &TypeRef> = definition
            .params
            .iter()
            .map(String::as_str)
            .zip(args.iter())
            .collect();

        let fields: Vec<Field> = definition
            .fields
            .iter()
            .map(|field| Field {
                name: field.name.clone(),
                ty: substitute(&field.ty, &substitutions),
            })
            .collect();

        // Substituted fields may introduce further instantiations.
        for field in &fields {
            scan(&field.ty, &mut pending);
        }

        found.insert(
            name.clone(),
            ConcreteStruct {
                name,
                template,
                args,
                fields,
            },
        );
    }

    Ok(found.into_values().collect())
}

fn walk(ty: &TypeRef, visit: &mut impl FnMut(&TypeRef)) {
    visit(ty);
    match ty {
        TypeRef::Vector(inner) | TypeRef::Pointer(inner) => walk(inner, visit),
        TypeRef::Map(key, value) => {
            walk(key, visit);
            walk(value, visit);
        }
        TypeRef::Template(_, args) => {
            for arg in args {
                walk(arg, visit);
            }
        }
        _ => {}
    }
}

fn substitute(ty: &TypeRef, substitutions: &BTreeMap<&str, &TypeRef>) -> TypeRef {
    match ty {
        TypeRef::Named(name) => substitutions
            .get(name.as_str())
            .map_or_else(|| ty.clone(), |&replacement| replacement.clone()),
        TypeRef::Vector(inner) => TypeRef::Vector(Box::new(substitute(inner, substitutions))),
        TypeRef::Pointer(inner) => TypeRef::Pointer(Box::new(substitute(inner, substitutions))),
        TypeRef::Map(key, value) => TypeRef::Map(
            Box::new(substitute(key, substitutions)),
            Box::new(substitute(value, substitutions)),
        ),
        TypeRef::Template(name, args) => TypeRef::Template(
            name.clone(),
            args.iter().map(|arg| substitute(arg, substitutions)).collect(),
        ),
        other => other.clone(),
    }
}

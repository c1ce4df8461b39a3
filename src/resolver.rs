//! Second loading pass: links type references against the full set of
//! declarations, validates members, and computes the dependency order in
//! which composite types must be defined.

use std::collections::{HashMap, HashSet};

use heck::ToUpperCamelCase;
use indexmap::IndexMap;
use tracing::debug;

use crate::{
    ast::{
        Composite, Declaration, Document, EnumDecl, Field, Literal, Location, PrimitiveType,
        ServiceDecl, TypeRef,
    },
    error::LoadError,
    generators::symbols,
    parser::ParsedDocument,
};

/// Words that cannot be used as identifiers in the generated C++.
const RESERVED_WORDS: &[&str] = &[
    "alignas", "alignof", "and", "and_eq", "asm", "auto", "bitand", "bitor", "break", "case",
    "catch", "char", "char8_t", "char16_t", "char32_t", "class", "compl", "concept", "const",
    "consteval", "constexpr", "constinit", "const_cast", "continue", "co_await", "co_return",
    "co_yield", "decltype", "default", "delete", "do", "dynamic_cast", "else", "explicit",
    "export", "extern", "for", "friend", "goto", "if", "inline", "long", "mutable", "new",
    "noexcept", "not", "not_eq", "nullptr", "operator", "or", "or_eq", "private", "protected",
    "public", "register", "reinterpret_cast", "requires", "return", "short", "signed", "sizeof",
    "static", "static_assert", "static_cast", "switch", "template", "this", "thread_local",
    "throw", "try", "typedef", "typeid", "typename", "union", "unsigned", "using", "virtual",
    "volatile", "wchar_t", "while", "xor", "xor_eq",
];

/// Member names generated into every message.
const MESSAGE_CONSTANTS: &[&str] = &["kId", "kName"];

/// Links a skeleton document into a validated `Document`.
pub(crate) fn link(
    parsed: ParsedDocument,
    module_name: String,
    source_name: &str,
) -> Result<Document, LoadError> {
    for segment in &parsed.namespace {
        check_identifier(segment, Location::new(1, 1))?;
    }

    let mut table: IndexMap<String, Declaration> = IndexMap::new();
    for decl in parsed.declarations {
        if let Some(previous) = table.get(decl.name()) {
            return Err(LoadError::DuplicateDeclaration {
                name: decl.name().to_string(),
                location: decl.location(),
                previous: previous.location(),
            });
        }
        check_identifier(decl.name(), decl.location())?;
        table.insert(decl.name().to_string(), decl);
    }

    let generated = symbols::generated_names(&module_name, table.values());
    for decl in table.values() {
        if generated.contains(decl.name()) {
            return Err(LoadError::parse(
                decl.location(),
                format!("`{}` is reserved for generated code", decl.name()),
            ));
        }
    }

    let linker = Linker { table: &table };
    for decl in table.values() {
        match decl {
            Declaration::Enum(e) => linker.check_enum(e)?,
            Declaration::Service(s) => linker.check_service(s)?,
            _ => {
                if let Some(composite) = decl.as_composite() {
                    linker.check_composite(composite)?;
                }
            }
        }
    }
    linker.check_message_ids()?;

    let order = linker.dependency_order()?;
    debug!(
        declarations = table.len(),
        order = ?order,
        "linked document"
    );

    Ok(Document::new(
        module_name,
        source_name.to_string(),
        parsed.namespace,
        parsed.includes,
        parsed.endianness,
        table,
        order,
    ))
}

fn check_identifier(name: &str, location: Location) -> Result<(), LoadError> {
    if RESERVED_WORDS.contains(&name) {
        return Err(LoadError::parse(
            location,
            format!("`{name}` is a reserved word and cannot be used as an identifier"),
        ));
    }
    Ok(())
}

/// Rejects the second of two members with the same name.
fn check_unique<'a>(
    members: impl IntoIterator<Item = (&'a str, Location)>,
) -> Result<(), LoadError> {
    let mut seen: HashMap<&str, Location> = HashMap::new();
    for (name, location) in members {
        if let Some(previous) = seen.insert(name, location) {
            return Err(LoadError::DuplicateDeclaration {
                name: name.to_string(),
                location,
                previous,
            });
        }
    }
    Ok(())
}

struct Linker<'a> {
    table: &'a IndexMap<String, Declaration>,
}

impl Linker<'_> {
    fn check_enum(&self, e: &EnumDecl) -> Result<(), LoadError> {
        check_unique(e.variants.iter().map(|v| (v.name.as_str(), v.location)))?;
        let max = e
            .underlying_type
            .integer_range()
            .map_or(0, |(_, max)| max);
        for variant in &e.variants {
            check_identifier(&variant.name, variant.location)?;
            if i128::from(variant.value) > max {
                return Err(LoadError::parse(
                    variant.location,
                    format!(
                        "value {} of `{}` does not fit in `{}`",
                        variant.value, variant.name, e.underlying_type
                    ),
                ));
            }
        }
        Ok(())
    }

    fn check_composite(&self, composite: Composite<'_>) -> Result<(), LoadError> {
        check_unique(composite.fields.iter().map(|f| (f.name.as_str(), f.location)))?;
        for field in composite.fields {
            check_identifier(&field.name, field.location)?;
            if field.name == composite.name {
                return Err(LoadError::parse(
                    field.location,
                    format!(
                        "field `{}` cannot share the name of its enclosing type",
                        field.name
                    ),
                ));
            }
            self.check_shadowing(&field.name, field.location)?;
            if composite.is_message() && MESSAGE_CONSTANTS.contains(&field.name.as_str()) {
                return Err(LoadError::parse(
                    field.location,
                    format!("`{}` is reserved in messages", field.name),
                ));
            }
            self.check_type(&field.ty, field.location)?;
            if let Some(default) = &field.default {
                self.check_default(field, default)?;
            }
        }
        Ok(())
    }

    fn check_service(&self, service: &ServiceDecl) -> Result<(), LoadError> {
        check_unique(service.methods.iter().map(|m| (m.name.as_str(), m.location)))?;

        let mut generated: HashMap<String, &str> = HashMap::new();
        let mut ids: HashMap<u32, &str> = HashMap::new();
        for method in &service.methods {
            let symbol = method.name.to_upper_camel_case();
            self.check_shadowing(&symbol, method.location)?;
            if let Some(other) = generated.insert(symbol.clone(), &method.name) {
                return Err(LoadError::parse(
                    method.location,
                    format!(
                        "methods `{other}` and `{}` both generate `{symbol}`",
                        method.name
                    ),
                ));
            }
            if let Some(other) = ids.insert(method.id, &method.name) {
                return Err(LoadError::parse(
                    method.location,
                    format!(
                        "method id {:#010x} of `{}` collides with `{other}`",
                        method.id, method.name
                    ),
                ));
            }

            check_unique(method.params.iter().map(|p| (p.name.as_str(), p.location)))?;
            for param in &method.params {
                check_identifier(&param.name, param.location)?;
                self.check_shadowing(&param.name, param.location)?;
                self.check_type(&param.ty, param.location)?;
            }
            if let Some(returns) = &method.returns {
                self.check_type(returns, method.location)?;
            }
        }
        Ok(())
    }

    fn check_message_ids(&self) -> Result<(), LoadError> {
        let mut ids: HashMap<u32, &str> = HashMap::new();
        for decl in self.table.values() {
            if let Declaration::Message(m) = decl {
                if let Some(other) = ids.insert(m.id, &m.name) {
                    return Err(LoadError::parse(
                        m.location,
                        format!(
                            "message id {:#010x} of `{}` collides with `{other}`",
                            m.id, m.name
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Rejects a member name that would hide a declared type, or a name the
    /// generated code relies on, inside the scope that declares the member.
    fn check_shadowing(&self, name: &str, location: Location) -> Result<(), LoadError> {
        if self.table.contains_key(name) {
            return Err(LoadError::parse(
                location,
                format!("`{name}` would hide the declared type `{name}`"),
            ));
        }
        if symbols::REFERENCED_NAMES.contains(&name) {
            return Err(LoadError::parse(
                location,
                format!("`{name}` is reserved for generated code"),
            ));
        }
        Ok(())
    }

    /// Resolves a type reference against the declaration table.
    fn check_type(&self, ty: &TypeRef, location: Location) -> Result<(), LoadError> {
        let TypeRef::Named(name) = ty else {
            return Ok(());
        };
        match self.table.get(name) {
            None => Err(LoadError::UnresolvedReference {
                name: name.clone(),
                location,
            }),
            Some(Declaration::Service(_)) => Err(LoadError::parse(
                location,
                format!("`{name}` is a service and cannot be used as a data type"),
            )),
            Some(_) => Ok(()),
        }
    }

    fn check_default(&self, field: &Field, default: &Literal) -> Result<(), LoadError> {
        if field.array_len.is_some() {
            return Err(LoadError::parse(
                field.location,
                format!("array field `{}` cannot have a default value", field.name),
            ));
        }

        let compatible = match (&field.ty, default) {
            (TypeRef::Primitive(PrimitiveType::Bool), Literal::Bool(_)) => true,
            (TypeRef::Primitive(PrimitiveType::String), Literal::Str(_)) => true,
            (TypeRef::Primitive(p), Literal::Int(_) | Literal::Float(_)) if p.is_float() => true,
            (TypeRef::Primitive(p), Literal::Int(value)) if p.is_integer() => {
                let (min, max) = p.integer_range().unwrap_or((0, 0));
                if *value < min || *value > max {
                    return Err(LoadError::parse(
                        field.location,
                        format!("default value {value} is out of range for `{p}`"),
                    ));
                }
                true
            }
            (TypeRef::Named(name), Literal::Ident(variant)) => match self.table.get(name) {
                Some(Declaration::Enum(e)) => {
                    if !e.variants.iter().any(|v| &v.name == variant) {
                        return Err(LoadError::parse(
                            field.location,
                            format!("`{variant}` is not a variant of enum `{name}`"),
                        ));
                    }
                    true
                }
                _ => false,
            },
            _ => false,
        };

        if compatible {
            Ok(())
        } else {
            Err(LoadError::parse(
                field.location,
                format!(
                    "default value `{default}` does not match type `{}`",
                    field.ty.idl_name()
                ),
            ))
        }
    }

    /// Orders composites so that each follows everything it contains by
    /// value, breaking ties by document order. Fails on cycles.
    fn dependency_order(&self) -> Result<Vec<String>, LoadError> {
        let mut order = Vec::new();
        let mut done = HashSet::new();
        let mut stack = Vec::new();
        for decl in self.table.values() {
            if decl.as_composite().is_some() {
                self.visit(decl.name(), &mut order, &mut done, &mut stack)?;
            }
        }
        Ok(order)
    }

    fn visit<'t>(
        &'t self,
        name: &'t str,
        order: &mut Vec<String>,
        done: &mut HashSet<&'t str>,
        stack: &mut Vec<&'t str>,
    ) -> Result<(), LoadError> {
        if done.contains(name) {
            return Ok(());
        }
        if let Some(start) = stack.iter().position(|entry| *entry == name) {
            let cycle = stack[start..]
                .iter()
                .chain(std::iter::once(&name))
                .map(|entry| entry.to_string())
                .collect();
            return Err(LoadError::CircularDependency { cycle });
        }

        let Some(composite) = self.table.get(name).and_then(Declaration::as_composite) else {
            return Ok(());
        };

        stack.push(name);
        for field in composite.fields {
            if let TypeRef::Named(dependency) = &field.ty {
                self.visit(dependency, order, done, stack)?;
            }
        }
        stack.pop();

        done.insert(name);
        order.push(name.to_string());
        Ok(())
    }
}

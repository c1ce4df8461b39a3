//! Generated C++ names and signatures.
//!
//! Both emitters take every public name and prototype from here, so a
//! header and source rendered from the same `Document` always agree.

use std::collections::HashSet;

use heck::ToUpperCamelCase;

use crate::ast::{
    Declaration, Document, Field, Literal, Method, PrimitiveType, ServiceDecl, TypeRef,
};

pub const SERIALIZE: &str = "Serialize";
pub const DESERIALIZE: &str = "Deserialize";
pub const EQUALITY: &str = "operator==";

/// Namespace of the shared reflection records.
pub const REGISTRY_NAMESPACE: &str = "idlgen";
/// Include guard around the shared reflection records.
pub const REGISTRY_GUARD: &str = "IDLGEN_TYPE_INFO_DEFINED";

/// Every primitive, in the order helpers are emitted.
pub const ALL_PRIMITIVES: [PrimitiveType; 12] = [
    PrimitiveType::Bool,
    PrimitiveType::U8,
    PrimitiveType::U16,
    PrimitiveType::U32,
    PrimitiveType::U64,
    PrimitiveType::I8,
    PrimitiveType::I16,
    PrimitiveType::I32,
    PrimitiveType::I64,
    PrimitiveType::F32,
    PrimitiveType::F64,
    PrimitiveType::String,
];

pub fn cpp_primitive(primitive: PrimitiveType) -> &'static str {
    match primitive {
        PrimitiveType::Bool => "bool",
        PrimitiveType::U8 => "uint8_t",
        PrimitiveType::U16 => "uint16_t",
        PrimitiveType::U32 => "uint32_t",
        PrimitiveType::U64 => "uint64_t",
        PrimitiveType::I8 => "int8_t",
        PrimitiveType::I16 => "int16_t",
        PrimitiveType::I32 => "int32_t",
        PrimitiveType::I64 => "int64_t",
        PrimitiveType::F32 => "float",
        PrimitiveType::F64 => "double",
        PrimitiveType::String => "std::string",
    }
}

/// The C++ spelling of a single value of `ty`.
pub fn cpp_type(ty: &TypeRef) -> String {
    match ty {
        TypeRef::Primitive(p) => cpp_primitive(*p).to_string(),
        TypeRef::Named(name) => name.clone(),
    }
}

/// The C++ member type of a field, including its array wrapper.
pub fn field_type(field: &Field) -> String {
    match field.array_len {
        Some(len) => format!("std::array<{}, {len}>", cpp_type(&field.ty)),
        None => cpp_type(&field.ty),
    }
}

/// Scalars and enums by value, strings and composites by const reference.
pub fn param_type(document: &Document, ty: &TypeRef) -> String {
    match ty {
        TypeRef::Primitive(PrimitiveType::String) => "const std::string&".to_string(),
        TypeRef::Primitive(p) => cpp_primitive(*p).to_string(),
        TypeRef::Named(name) if document.enum_underlying(name).is_some() => name.clone(),
        TypeRef::Named(name) => format!("const {name}&"),
    }
}

pub fn return_type(returns: Option<&TypeRef>) -> String {
    returns.map_or_else(|| "void".to_string(), cpp_type)
}

pub fn serialize_signature(type_name: &str) -> String {
    format!("void {SERIALIZE}(const {type_name}& value, std::vector<uint8_t>& out)")
}

pub fn deserialize_signature(type_name: &str) -> String {
    format!(
        "bool {DESERIALIZE}({type_name}& value, const uint8_t*& cursor, const uint8_t* end)"
    )
}

pub fn equality_signature(type_name: &str) -> String {
    format!("bool {EQUALITY}(const {type_name}& lhs, const {type_name}& rhs)")
}

/// `step_once` becomes `StepOnce`.
pub fn method_name(method: &Method) -> String {
    method.name.to_upper_camel_case()
}

pub fn method_id_constant(method: &Method) -> String {
    format!("k{}Id", method_name(method))
}

pub fn method_signature(document: &Document, method: &Method) -> String {
    let params = method
        .params
        .iter()
        .map(|p| format!("{} {}", param_type(document, &p.ty), p.name))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{} {}({params})",
        return_type(method.returns.as_ref()),
        method_name(method)
    )
}

/// Local variable holding a decoded parameter inside a dispatch routine.
pub fn dispatch_argument(name: &str) -> String {
    format!("arg_{name}")
}

pub fn dispatch_name(service: &ServiceDecl) -> String {
    format!("Dispatch{}", service.name)
}

pub fn dispatch_signature(service: &ServiceDecl) -> String {
    format!(
        "bool {}({}& service, uint32_t method_id, const uint8_t* request, size_t size, std::vector<uint8_t>& response)",
        dispatch_name(service),
        service.name
    )
}

pub fn registry_array(document: &Document) -> String {
    registry_array_name(document.name())
}

pub fn registry_count(document: &Document) -> String {
    registry_count_name(document.name())
}

pub fn registry_find(document: &Document) -> String {
    registry_find_name(document.name())
}

fn registry_array_name(module: &str) -> String {
    format!("k{module}Types")
}

fn registry_count_name(module: &str) -> String {
    format!("k{module}TypeCount")
}

fn registry_find_name(module: &str) -> String {
    format!("Find{module}Type")
}

pub fn registry_find_signature(document: &Document) -> String {
    format!(
        "const {REGISTRY_NAMESPACE}::TypeInfo* {}(const char* name)",
        registry_find(document)
    )
}

/// Per-type field table, internal to the source file.
pub fn field_table(type_name: &str) -> String {
    format!("k{type_name}Fields")
}

/// Helpers defined by every source next to the user's types.
const SOURCE_HELPERS: &[&str] = &["WriteValue", "ReadValue", "WriteUnsigned", "ReadUnsigned"];

/// Names the generated code spells unqualified inside the document
/// namespace. A user type with one of these names would hide them.
pub const REFERENCED_NAMES: &[&str] = &[
    "std", REGISTRY_NAMESPACE, "size_t", "uint8_t", "uint16_t", "uint32_t", "uint64_t",
    "int8_t", "int16_t", "int32_t", "int64_t",
];

/// Every namespace-scope name generated for a module with the given
/// declarations. A declaration reusing one would clash with generated code.
pub fn generated_names<'a>(
    module: &str,
    declarations: impl IntoIterator<Item = &'a Declaration>,
) -> HashSet<String> {
    let mut names: HashSet<String> = [SERIALIZE, DESERIALIZE]
        .iter()
        .chain(SOURCE_HELPERS)
        .chain(REFERENCED_NAMES)
        .map(|name| name.to_string())
        .collect();
    names.insert(registry_array_name(module));
    names.insert(registry_count_name(module));
    names.insert(registry_find_name(module));
    for decl in declarations {
        match decl {
            Declaration::Service(service) => {
                names.insert(dispatch_name(service));
            }
            _ if decl.as_composite().is_some() => {
                names.insert(field_table(decl.name()));
            }
            _ => {}
        }
    }
    names
}

/// Hex literal for message and method identifiers.
pub fn id_literal(id: u32) -> String {
    format!("{id:#010x}u")
}

/// Escapes `text` as the body of a C++ string literal.
pub fn escape_string(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            '\r' => escaped.push_str("\\r"),
            c if (c as u32) < 0x20 => escaped.push_str(&format!("\\{:03o}", c as u32)),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Renders a default value as a C++ initializer expression.
pub fn literal_expression(document: &Document, ty: &TypeRef, literal: &Literal) -> String {
    match (ty, literal) {
        (TypeRef::Primitive(PrimitiveType::F32), Literal::Int(v)) => format!("{:?}f", *v as f64),
        (TypeRef::Primitive(PrimitiveType::F32), Literal::Float(v)) => format!("{v:?}f"),
        // -N is unary minus applied to N, and 9223372036854775808 has no type.
        (TypeRef::Primitive(_), Literal::Int(v)) if *v == i128::from(i64::MIN) => {
            "(-9223372036854775807LL - 1)".to_string()
        }
        (TypeRef::Primitive(PrimitiveType::F64), Literal::Int(v)) => format!("{:?}", *v as f64),
        (TypeRef::Primitive(PrimitiveType::U64), Literal::Int(v)) => format!("{v}ull"),
        (_, Literal::Int(v)) => v.to_string(),
        (_, Literal::Float(v)) => format!("{v:?}"),
        (_, Literal::Bool(v)) => v.to_string(),
        (_, Literal::Str(s)) => format!("\"{}\"", escape_string(s)),
        (TypeRef::Named(name), Literal::Ident(variant)) => {
            if document.enum_underlying(name).is_some() {
                format!("{name}::{variant}")
            } else {
                variant.clone()
            }
        }
        (_, Literal::Ident(id)) => id.clone(),
    }
}

/// Composite names that go into the registry, in document order.
pub fn registry_entries(document: &Document) -> Vec<&str> {
    document.composites().map(|c| c.name).collect()
}

/// The primitives any emitted routine reads or writes, in `ALL_PRIMITIVES`
/// order. Enums contribute their underlying type.
pub fn wire_primitives(document: &Document) -> Vec<PrimitiveType> {
    let mut used = Vec::new();
    let mut note = |ty: &TypeRef| match ty {
        TypeRef::Primitive(p) => used.push(*p),
        TypeRef::Named(name) => {
            if let Some(underlying) = document.enum_underlying(name) {
                used.push(underlying);
            }
        }
    };

    for decl in document.declarations() {
        match decl {
            Declaration::Service(service) => {
                for method in &service.methods {
                    method.params.iter().for_each(|p| note(&p.ty));
                    if let Some(returns) = &method.returns {
                        note(returns);
                    }
                }
            }
            other => {
                if let Some(composite) = other.as_composite() {
                    composite.fields.iter().for_each(|f| note(&f.ty));
                }
            }
        }
    }

    ALL_PRIMITIVES
        .into_iter()
        .filter(|p| used.contains(p))
        .collect()
}

/// Every public name the header declares, in declaration order.
pub fn declared_symbols(document: &Document) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for e in document.enums() {
        symbols.push(e.name.clone());
    }
    for composite in document.composites() {
        symbols.push(composite.name.to_string());
    }
    if document.composites().next().is_some() {
        symbols.extend([SERIALIZE, DESERIALIZE, EQUALITY].map(String::from));
    }
    for service in document.services() {
        symbols.push(service.name.clone());
        symbols.push(dispatch_name(service));
    }
    if !registry_entries(document).is_empty() {
        symbols.push(registry_array(document));
    }
    symbols.push(registry_count(document));
    symbols.push(registry_find(document));
    symbols
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_str;

    #[test]
    fn test_signatures() {
        assert_eq!(
            serialize_signature("Vec2"),
            "void Serialize(const Vec2& value, std::vector<uint8_t>& out)"
        );
        assert_eq!(
            deserialize_signature("Vec2"),
            "bool Deserialize(Vec2& value, const uint8_t*& cursor, const uint8_t* end)"
        );
    }

    #[test]
    fn test_method_signature_passing_conventions() {
        let source = "enum Mode : u8 { A } struct Vec2 { f32 x; }
                      service Physics { Vec2 step_once(Vec2 p, f32 dt, Mode m, string tag); }";
        let document = load_str("physics.idl", source).unwrap();
        let service = document.services().next().unwrap();
        assert_eq!(
            method_signature(&document, &service.methods[0]),
            "Vec2 StepOnce(const Vec2& p, float dt, Mode m, const std::string& tag)"
        );
        assert_eq!(method_id_constant(&service.methods[0]), "kStepOnceId");
        assert_eq!(dispatch_name(service), "DispatchPhysics");
    }

    #[test]
    fn test_literal_expressions() {
        let document = load_str("t.idl", "enum Color { Red }").unwrap();
        let f32_ty = TypeRef::Primitive(PrimitiveType::F32);
        let i64_ty = TypeRef::Primitive(PrimitiveType::I64);
        let color = TypeRef::Named("Color".to_string());

        assert_eq!(literal_expression(&document, &f32_ty, &Literal::Int(2)), "2.0f");
        assert_eq!(literal_expression(&document, &f32_ty, &Literal::Float(0.5)), "0.5f");
        assert_eq!(literal_expression(&document, &i64_ty, &Literal::Int(-5)), "-5");
        assert_eq!(
            literal_expression(&document, &i64_ty, &Literal::Int(i128::from(i64::MIN))),
            "(-9223372036854775807LL - 1)"
        );
        assert_eq!(
            literal_expression(&document, &color, &Literal::Ident("Red".to_string())),
            "Color::Red"
        );
        assert_eq!(
            literal_expression(
                &document,
                &TypeRef::Primitive(PrimitiveType::String),
                &Literal::Str("a\"b\n".to_string())
            ),
            "\"a\\\"b\\n\""
        );
    }

    #[test]
    fn test_wire_primitives_in_fixed_order() {
        let source = "enum E : u16 { A } struct S { string s; f32 f; E e; bool b; }";
        let document = load_str("t.idl", source).unwrap();
        assert_eq!(
            wire_primitives(&document),
            vec![
                PrimitiveType::Bool,
                PrimitiveType::U16,
                PrimitiveType::F32,
                PrimitiveType::String
            ]
        );
    }

    #[test]
    fn test_registry_names_follow_module() {
        let document = load_str("game_state.idl", "struct A { u8 v; }").unwrap();
        assert_eq!(registry_array(&document), "kGameStateTypes");
        assert_eq!(registry_count(&document), "kGameStateTypeCount");
        assert_eq!(
            registry_find_signature(&document),
            "const idlgen::TypeInfo* FindGameStateType(const char* name)"
        );
    }
}

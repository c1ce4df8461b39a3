//! Renders the declaration unit.

use crate::{
    ast::{Attributes, Composite, Document, EnumDecl, Field, ServiceDecl},
    generators::{
        CodeWriter, EmitConfig, Emitter, close_namespace, open_namespace, symbols, write_banner,
    },
};

const STD_INCLUDES: &[&str] = &["array", "cstddef", "cstdint", "string", "vector"];

/// Emits type declarations and function prototypes, nothing with a body.
#[derive(Debug, Clone, Default)]
pub struct HeaderEmitter {
    config: EmitConfig,
}

impl HeaderEmitter {
    pub fn new(config: EmitConfig) -> Self {
        HeaderEmitter { config }
    }
}

impl Emitter for HeaderEmitter {
    fn render(&self, document: &Document) -> String {
        let mut w = CodeWriter::new(&self.config);

        write_banner(&mut w, document);
        w.line("#pragma once");
        w.blank();
        for include in STD_INCLUDES {
            w.line(format!("#include <{include}>"));
        }
        if !document.includes().is_empty() {
            w.blank();
            for include in document.includes() {
                w.line(format!("#include \"{include}\""));
            }
        }
        w.blank();

        write_registry_records(&mut w);
        open_namespace(&mut w, document);

        for e in document.enums() {
            write_enum(&mut w, e);
        }

        let mut has_composites = false;
        for composite in document.composites() {
            w.line(format!("struct {};", composite.name));
            has_composites = true;
        }
        if has_composites {
            w.blank();
        }

        for composite in document.composites_by_dependency() {
            write_composite(&mut w, document, composite);
        }

        for composite in document.composites() {
            w.line(format!("{};", symbols::serialize_signature(composite.name)));
            w.line(format!("{};", symbols::deserialize_signature(composite.name)));
            w.line(format!("{};", symbols::equality_signature(composite.name)));
            w.blank();
        }

        for service in document.services() {
            write_service(&mut w, document, service);
        }

        write_registry_declarations(&mut w, document);
        close_namespace(&mut w, document);

        w.finish()
    }
}

/// `[[deprecated]]` attribute text with a trailing space, or nothing.
fn deprecation_prefix(attributes: &Attributes) -> String {
    match attributes.deprecation() {
        Some(Some(reason)) => format!("[[deprecated(\"{}\")]] ", symbols::escape_string(reason)),
        Some(None) => "[[deprecated]] ".to_string(),
        None => String::new(),
    }
}

/// Shared reflection records, guarded so several generated headers can be
/// included together.
fn write_registry_records(w: &mut CodeWriter) {
    w.line(format!("#ifndef {}", symbols::REGISTRY_GUARD));
    w.line(format!("#define {}", symbols::REGISTRY_GUARD));
    w.line(format!("namespace {} {{", symbols::REGISTRY_NAMESPACE));
    w.blank();
    w.line("/// Name and IDL type of one field.");
    w.line("struct FieldInfo {");
    w.indent();
    w.line("const char* name;");
    w.line("const char* type;");
    w.dedent();
    w.line("};");
    w.blank();
    w.line("/// Reflection record for a generated struct or message.");
    w.line("struct TypeInfo {");
    w.indent();
    w.line("const char* name;");
    w.line("const char* kind;");
    w.line("uint32_t id;");
    w.line("size_t field_count;");
    w.line("const FieldInfo* fields;");
    w.dedent();
    w.line("};");
    w.blank();
    w.line(format!("}}  // namespace {}", symbols::REGISTRY_NAMESPACE));
    w.line(format!("#endif  // {}", symbols::REGISTRY_GUARD));
    w.blank();
}

fn write_enum(w: &mut CodeWriter, e: &EnumDecl) {
    w.docs(&e.attributes.docs);
    w.line(format!(
        "enum class {}{} : {} {{",
        deprecation_prefix(&e.attributes),
        e.name,
        symbols::cpp_primitive(e.underlying_type)
    ));
    w.indent();
    for variant in &e.variants {
        w.docs(&variant.attributes.docs);
        let attribute = deprecation_prefix(&variant.attributes);
        w.line(format!(
            "{}{}= {},",
            variant.name,
            if attribute.is_empty() {
                " ".to_string()
            } else {
                format!(" {attribute}")
            },
            variant.value
        ));
    }
    w.dedent();
    w.line("};");
    w.blank();
}

fn write_composite(w: &mut CodeWriter, document: &Document, composite: Composite<'_>) {
    w.docs(&composite.attributes.docs);
    w.line(format!(
        "struct {}{} {{",
        deprecation_prefix(composite.attributes),
        composite.name
    ));
    w.indent();
    if let Some(id) = composite.message_id {
        w.line(format!(
            "static constexpr uint32_t kId = {};",
            symbols::id_literal(id)
        ));
        w.line(format!(
            "static constexpr const char* kName = \"{}\";",
            composite.name
        ));
        if !composite.fields.is_empty() {
            w.blank();
        }
    }
    for field in composite.fields {
        write_field(w, document, field);
    }
    w.dedent();
    w.line("};");
    w.blank();
}

/// Every member is initialized: with its default, or value-initialized.
fn write_field(w: &mut CodeWriter, document: &Document, field: &Field) {
    w.docs(&field.attributes.docs);
    let declaration = format!(
        "{}{} {}",
        deprecation_prefix(&field.attributes),
        symbols::field_type(field),
        field.name
    );
    match &field.default {
        Some(default) => w.line(format!(
            "{declaration} = {};",
            symbols::literal_expression(document, &field.ty, default)
        )),
        None => w.line(format!("{declaration}{{}};")),
    }
}

fn write_service(w: &mut CodeWriter, document: &Document, service: &ServiceDecl) {
    w.docs(&service.attributes.docs);
    w.line(format!(
        "class {}{} {{",
        deprecation_prefix(&service.attributes),
        service.name
    ));
    w.line("public:");
    w.indent();
    for method in &service.methods {
        w.line(format!(
            "static constexpr uint32_t {} = {};",
            symbols::method_id_constant(method),
            symbols::id_literal(method.id)
        ));
    }
    if !service.methods.is_empty() {
        w.blank();
    }
    w.line(format!("virtual ~{}() = default;", service.name));
    for method in &service.methods {
        w.blank();
        w.docs(&method.attributes.docs);
        w.line(format!(
            "{}virtual {} = 0;",
            deprecation_prefix(&method.attributes),
            symbols::method_signature(document, method)
        ));
    }
    w.dedent();
    w.line("};");
    w.blank();
    w.line(format!(
        "/// Decodes a `{}` request, invokes the matching method, and encodes its result.",
        service.name
    ));
    w.line("/// Returns false for an unknown method id or a truncated request.");
    w.line(format!("{};", symbols::dispatch_signature(service)));
    w.blank();
}

fn write_registry_declarations(w: &mut CodeWriter, document: &Document) {
    if !symbols::registry_entries(document).is_empty() {
        w.line(format!(
            "extern const {}::TypeInfo {}[];",
            symbols::REGISTRY_NAMESPACE,
            symbols::registry_array(document)
        ));
    }
    w.line(format!(
        "extern const size_t {};",
        symbols::registry_count(document)
    ));
    w.line(format!("{};", symbols::registry_find_signature(document)));
    if !document.namespace().is_empty() {
        w.blank();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_str;

    fn render(source: &str) -> String {
        let document = load_str("shapes.idl", source).unwrap();
        HeaderEmitter::default().render(&document)
    }

    #[test]
    fn test_vec2_declaration() {
        let header = render("struct Vec2 { float x; float y; }");
        assert!(header.contains("struct Vec2 {\n    float x{};\n    float y{};\n};\n"));
        assert!(header.contains(
            "void Serialize(const Vec2& value, std::vector<uint8_t>& out);\n"
        ));
        assert!(header.starts_with("// Generated by idlgen from shapes.idl. Do not edit.\n"));
        assert!(header.contains("#pragma once\n"));
    }

    #[test]
    fn test_forward_declarations_in_document_order_definitions_by_dependency() {
        let header = render("struct A { B b; } struct B { u8 v; }");
        let forward_a = header.find("struct A;").unwrap();
        let forward_b = header.find("struct B;").unwrap();
        let full_a = header.find("struct A {").unwrap();
        let full_b = header.find("struct B {").unwrap();
        assert!(forward_a < forward_b);
        assert!(forward_b < full_b);
        assert!(full_b < full_a);
    }

    #[test]
    fn test_enum_declaration() {
        let header = render("/// Colors.\nenum Color : u8 { Red = 1, @deprecated Green }");
        assert!(header.contains(
            "/// Colors.\nenum class Color : uint8_t {\n    Red = 1,\n    Green [[deprecated]] = 2,\n};\n"
        ));
    }

    #[test]
    fn test_message_constants_and_defaults() {
        let header = render(
            "namespace net; enum Kind { A, B }
             message Hello { string name = \"anon\"; u8 tries = 3; Kind kind = B; f32 ratios[2]; }",
        );
        assert!(header.contains("namespace net {\n"));
        assert!(header.contains(&format!(
            "    static constexpr uint32_t kId = {};\n",
            symbols::id_literal(crate::ast::fnv1a32("net.Hello"))
        )));
        assert!(header.contains("    static constexpr const char* kName = \"Hello\";\n"));
        assert!(header.contains("    std::string name = \"anon\";\n"));
        assert!(header.contains("    uint8_t tries = 3;\n"));
        assert!(header.contains("    Kind kind = Kind::B;\n"));
        assert!(header.contains("    std::array<float, 2> ratios{};\n"));
        assert!(header.ends_with("}  // namespace net\n"));
    }

    #[test]
    fn test_service_interface() {
        let header = render(
            "struct Vec2 { f32 x; }
             service Physics { @deprecated(\"use step\") Vec2 advance(Vec2 p); void reset(); }",
        );
        assert!(header.contains("class Physics {\npublic:\n"));
        assert!(header.contains("    virtual ~Physics() = default;\n"));
        assert!(header.contains(
            "    [[deprecated(\"use step\")]] virtual Vec2 Advance(const Vec2& p) = 0;\n"
        ));
        assert!(header.contains("    virtual void Reset() = 0;\n"));
        assert!(header.contains("bool DispatchPhysics(Physics& service, uint32_t method_id"));
    }

    #[test]
    fn test_includes_pass_through() {
        let header = render("include \"engine/math.h\"; struct S { u8 v; }");
        assert!(header.contains("#include <vector>\n\n#include \"engine/math.h\"\n"));
    }

    #[test]
    fn test_header_has_no_bodies() {
        let header = render(
            "struct Vec2 { float x; float y; } service S { Vec2 get(); }",
        );
        assert!(!header.contains("return"));
        assert!(!header.contains("WriteValue"));
    }

    #[test]
    fn test_registry_declarations() {
        let header = render("struct Vec2 { float x; }");
        assert!(header.contains("extern const idlgen::TypeInfo kShapesTypes[];\n"));
        assert!(header.contains("extern const size_t kShapesTypeCount;\n"));
        assert!(header.contains("const idlgen::TypeInfo* FindShapesType(const char* name);\n"));

        let empty = render("enum E { A }");
        assert!(!empty.contains("kShapesTypes[]"));
        assert!(empty.contains("extern const size_t kShapesTypeCount;\n"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let document = load_str(
            "shapes.idl",
            "struct B { A a; } struct A { u8 v; } enum E { X } service S { void f(A a); }",
        )
        .unwrap();
        let emitter = HeaderEmitter::default();
        assert_eq!(emitter.render(&document), emitter.render(&document));
    }
}

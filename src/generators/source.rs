//! Renders the definition unit: wire routines, dispatch, and the type
//! registry.

use std::path::Path;

use crate::ast::{Composite, Document, Field, PrimitiveType, ServiceDecl, TypeRef, WireEndianness};
use crate::generators::{
    CodeWriter, EmitConfig, Emitter, close_namespace, open_namespace, symbols, write_banner,
};

/// Emits the bodies for everything the paired header declares.
#[derive(Debug, Clone, Default)]
pub struct SourceEmitter {
    config: EmitConfig,
    header_include: Option<String>,
}

impl SourceEmitter {
    pub fn new(config: EmitConfig) -> Self {
        SourceEmitter {
            config,
            header_include: None,
        }
    }

    /// Sets the name the source uses to include its header. Without it, the
    /// input file stem plus `.h` is used.
    pub fn with_header_include(mut self, include: impl Into<String>) -> Self {
        self.header_include = Some(include.into());
        self
    }

    fn header_include(&self, document: &Document) -> String {
        match &self.header_include {
            Some(include) => include.clone(),
            None => {
                let stem = Path::new(document.source_name())
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| document.name().to_string());
                format!("{stem}.h")
            }
        }
    }
}

impl Emitter for SourceEmitter {
    fn render(&self, document: &Document) -> String {
        let mut w = CodeWriter::new(&self.config);

        write_banner(&mut w, document);
        w.line(format!(
            "#include \"{}\"",
            symbols::escape_string(&self.header_include(document))
        ));
        w.blank();
        w.line("#include <cstring>");
        w.blank();

        open_namespace(&mut w, document);
        write_wire_helpers(&mut w, document);

        for composite in document.composites() {
            write_serialize(&mut w, document, composite);
            write_deserialize(&mut w, document, composite);
            write_equality(&mut w, composite);
        }

        for service in document.services() {
            write_dispatch(&mut w, document, service);
        }

        write_registry(&mut w, document);
        close_namespace(&mut w, document);

        w.finish()
    }
}

/// Byte offset of byte `i` within a value of type `T`.
fn shift_expression(endianness: WireEndianness) -> &'static str {
    match endianness {
        WireEndianness::Little => "8 * i",
        WireEndianness::Big => "8 * (sizeof(T) - 1 - i)",
    }
}

/// The unsigned type sharing the width of an integer or float primitive.
fn wire_unsigned(primitive: PrimitiveType) -> Option<&'static str> {
    match primitive.get_byte_size() {
        Some(1) => Some("uint8_t"),
        Some(2) => Some("uint16_t"),
        Some(4) => Some("uint32_t"),
        Some(8) => Some("uint64_t"),
        _ => None,
    }
}

fn write_wire_helpers(w: &mut CodeWriter, document: &Document) {
    let primitives = symbols::wire_primitives(document);
    if primitives.is_empty() {
        return;
    }
    let shift = shift_expression(document.endianness());

    w.line("namespace {");
    w.blank();
    w.line("template <typename T>");
    w.line("void WriteUnsigned(T value, std::vector<uint8_t>& out) {");
    w.indent();
    w.line("for (size_t i = 0; i < sizeof(T); ++i) {");
    w.indent();
    w.line(format!("out.push_back(static_cast<uint8_t>(value >> ({shift})));"));
    w.dedent();
    w.line("}");
    w.dedent();
    w.line("}");
    w.blank();
    w.line("template <typename T>");
    w.line("bool ReadUnsigned(T& value, const uint8_t*& cursor, const uint8_t* end) {");
    w.indent();
    w.line("if (static_cast<size_t>(end - cursor) < sizeof(T)) {");
    w.indent();
    w.line("return false;");
    w.dedent();
    w.line("}");
    w.line("value = 0;");
    w.line("for (size_t i = 0; i < sizeof(T); ++i) {");
    w.indent();
    w.line(format!(
        "value = static_cast<T>(value | (static_cast<T>(cursor[i]) << ({shift})));"
    ));
    w.dedent();
    w.line("}");
    w.line("cursor += sizeof(T);");
    w.line("return true;");
    w.dedent();
    w.line("}");
    w.blank();

    for primitive in primitives {
        write_primitive_helpers(w, primitive);
    }

    w.line("}  // namespace");
    w.blank();
}

fn write_primitive_helpers(w: &mut CodeWriter, primitive: PrimitiveType) {
    let cpp = symbols::cpp_primitive(primitive);
    match primitive {
        PrimitiveType::Bool => {
            w.line("void WriteValue(bool value, std::vector<uint8_t>& out) {");
            w.indent();
            w.line("out.push_back(value ? 1 : 0);");
            w.dedent();
            w.line("}");
            w.blank();
            w.line("bool ReadValue(bool& value, const uint8_t*& cursor, const uint8_t* end) {");
            w.indent();
            w.line("if (cursor == end) {");
            w.indent();
            w.line("return false;");
            w.dedent();
            w.line("}");
            w.line("value = *cursor++ != 0;");
            w.line("return true;");
            w.dedent();
            w.line("}");
        }
        PrimitiveType::String => {
            w.line("void WriteValue(const std::string& value, std::vector<uint8_t>& out) {");
            w.indent();
            w.line("WriteUnsigned(static_cast<uint32_t>(value.size()), out);");
            w.line("out.insert(out.end(), value.begin(), value.end());");
            w.dedent();
            w.line("}");
            w.blank();
            w.line(
                "bool ReadValue(std::string& value, const uint8_t*& cursor, const uint8_t* end) {",
            );
            w.indent();
            w.line("uint32_t length = 0;");
            w.line("if (!ReadUnsigned(length, cursor, end)) {");
            w.indent();
            w.line("return false;");
            w.dedent();
            w.line("}");
            w.line("if (static_cast<size_t>(end - cursor) < length) {");
            w.indent();
            w.line("return false;");
            w.dedent();
            w.line("}");
            w.line("value.assign(reinterpret_cast<const char*>(cursor), length);");
            w.line("cursor += length;");
            w.line("return true;");
            w.dedent();
            w.line("}");
        }
        PrimitiveType::U8 | PrimitiveType::U16 | PrimitiveType::U32 | PrimitiveType::U64 => {
            w.line(format!("void WriteValue({cpp} value, std::vector<uint8_t>& out) {{"));
            w.indent();
            w.line("WriteUnsigned(value, out);");
            w.dedent();
            w.line("}");
            w.blank();
            w.line(format!(
                "bool ReadValue({cpp}& value, const uint8_t*& cursor, const uint8_t* end) {{"
            ));
            w.indent();
            w.line("return ReadUnsigned(value, cursor, end);");
            w.dedent();
            w.line("}");
        }
        _ => {
            let Some(raw) = wire_unsigned(primitive) else {
                return;
            };
            let float = primitive.is_float();
            w.line(format!("void WriteValue({cpp} value, std::vector<uint8_t>& out) {{"));
            w.indent();
            if float {
                w.line(format!("{raw} raw;"));
                w.line("std::memcpy(&raw, &value, sizeof(raw));");
                w.line("WriteUnsigned(raw, out);");
            } else {
                w.line(format!("WriteUnsigned(static_cast<{raw}>(value), out);"));
            }
            w.dedent();
            w.line("}");
            w.blank();
            w.line(format!(
                "bool ReadValue({cpp}& value, const uint8_t*& cursor, const uint8_t* end) {{"
            ));
            w.indent();
            w.line(format!("{raw} raw = 0;"));
            w.line("if (!ReadUnsigned(raw, cursor, end)) {");
            w.indent();
            w.line("return false;");
            w.dedent();
            w.line("}");
            if float {
                w.line("std::memcpy(&value, &raw, sizeof(value));");
            } else {
                w.line(format!("value = static_cast<{cpp}>(raw);"));
            }
            w.line("return true;");
            w.dedent();
            w.line("}");
        }
    }
    w.blank();
}

/// The statement that appends `expr` of type `ty` to `sink`.
fn write_statement(document: &Document, ty: &TypeRef, expr: &str, sink: &str) -> String {
    match ty {
        TypeRef::Primitive(_) => format!("WriteValue({expr}, {sink});"),
        TypeRef::Named(name) => match document.enum_underlying(name) {
            Some(underlying) => format!(
                "WriteValue(static_cast<{}>({expr}), {sink});",
                symbols::cpp_primitive(underlying)
            ),
            None => format!("{}({expr}, {sink});", symbols::SERIALIZE),
        },
    }
}

/// Reads one value of type `ty` into `target`, returning false from the
/// enclosing function when the input is exhausted.
fn read_statement(w: &mut CodeWriter, document: &Document, ty: &TypeRef, target: &str, raw: &str) {
    let call = match ty {
        TypeRef::Primitive(_) => format!("ReadValue({target}, cursor, end)"),
        TypeRef::Named(name) => match document.enum_underlying(name) {
            Some(underlying) => {
                w.line(format!("{} {raw} = 0;", symbols::cpp_primitive(underlying)));
                format!("ReadValue({raw}, cursor, end)")
            }
            None => format!("{}({target}, cursor, end)", symbols::DESERIALIZE),
        },
    };
    w.line(format!("if (!{call}) {{"));
    w.indent();
    w.line("return false;");
    w.dedent();
    w.line("}");
    if let TypeRef::Named(name) = ty {
        if document.enum_underlying(name).is_some() {
            w.line(format!("{target} = static_cast<{name}>({raw});"));
        }
    }
}

fn write_serialize(w: &mut CodeWriter, document: &Document, composite: Composite<'_>) {
    w.line(format!("{} {{", symbols::serialize_signature(composite.name)));
    w.indent();
    if composite.fields.is_empty() {
        w.line("(void)value;");
        w.line("(void)out;");
    }
    for field in composite.fields {
        let member = format!("value.{}", field.name);
        if field.array_len.is_some() {
            w.line(format!("for (const auto& item : {member}) {{"));
            w.indent();
            w.line(write_statement(document, &field.ty, "item", "out"));
            w.dedent();
            w.line("}");
        } else {
            w.line(write_statement(document, &field.ty, &member, "out"));
        }
    }
    w.dedent();
    w.line("}");
    w.blank();
}

fn write_deserialize(w: &mut CodeWriter, document: &Document, composite: Composite<'_>) {
    w.line(format!("{} {{", symbols::deserialize_signature(composite.name)));
    w.indent();
    if composite.fields.is_empty() {
        w.line("(void)value;");
        w.line("(void)cursor;");
        w.line("(void)end;");
    }
    for field in composite.fields {
        read_field(w, document, field);
    }
    w.line("return true;");
    w.dedent();
    w.line("}");
    w.blank();
}

fn read_field(w: &mut CodeWriter, document: &Document, field: &Field) {
    if field.array_len.is_some() {
        w.line(format!("for (auto& item : value.{}) {{", field.name));
        w.indent();
        read_statement(w, document, &field.ty, "item", "raw");
        w.dedent();
        w.line("}");
    } else {
        let target = format!("value.{}", field.name);
        let raw = format!("raw_{}", field.name);
        read_statement(w, document, &field.ty, &target, &raw);
    }
}

fn write_equality(w: &mut CodeWriter, composite: Composite<'_>) {
    w.line(format!("{} {{", symbols::equality_signature(composite.name)));
    w.indent();
    if composite.fields.is_empty() {
        w.line("(void)lhs;");
        w.line("(void)rhs;");
        w.line("return true;");
    } else {
        let comparisons = composite
            .fields
            .iter()
            .map(|f| format!("lhs.{0} == rhs.{0}", f.name))
            .collect::<Vec<_>>()
            .join(" && ");
        w.line(format!("return {comparisons};"));
    }
    w.dedent();
    w.line("}");
    w.blank();
}

fn write_dispatch(w: &mut CodeWriter, document: &Document, service: &ServiceDecl) {
    let takes_params = service.methods.iter().any(|m| !m.params.is_empty());
    let returns_values = service.methods.iter().any(|m| m.returns.is_some());

    w.line(format!("{} {{", symbols::dispatch_signature(service)));
    w.indent();
    if service.methods.is_empty() {
        w.line("(void)service;");
    }
    if takes_params {
        w.line("const uint8_t* cursor = request;");
        w.line("const uint8_t* end = request + size;");
    } else {
        w.line("(void)request;");
        w.line("(void)size;");
    }
    if !returns_values {
        w.line("(void)response;");
    }
    w.line("switch (method_id) {");
    for method in &service.methods {
        w.line(format!(
            "case {}::{}: {{",
            service.name,
            symbols::method_id_constant(method)
        ));
        w.indent();
        for param in &method.params {
            let argument = symbols::dispatch_argument(&param.name);
            w.line(format!("{} {argument}{{}};", symbols::cpp_type(&param.ty)));
            let raw = format!("raw_{}", param.name);
            read_statement(w, document, &param.ty, &argument, &raw);
        }
        let arguments = method
            .params
            .iter()
            .map(|p| symbols::dispatch_argument(&p.name))
            .collect::<Vec<_>>()
            .join(", ");
        let call = format!("service.{}({arguments})", symbols::method_name(method));
        match &method.returns {
            Some(returns) => w.line(write_statement(document, returns, &call, "response")),
            None => w.line(format!("{call};")),
        }
        w.line("return true;");
        w.dedent();
        w.line("}");
    }
    w.line("default:");
    w.indent();
    w.line("return false;");
    w.dedent();
    w.line("}");
    w.dedent();
    w.line("}");
    w.blank();
}

fn write_registry(w: &mut CodeWriter, document: &Document) {
    let ns = symbols::REGISTRY_NAMESPACE;
    let array = symbols::registry_array(document);
    let count = symbols::registry_count(document);
    let composites: Vec<Composite<'_>> = document.composites().collect();

    if composites.is_empty() {
        w.line(format!("const size_t {count} = 0;"));
        w.blank();
        w.line(format!("{} {{", symbols::registry_find_signature(document)));
        w.indent();
        w.line("(void)name;");
        w.line("return nullptr;");
        w.dedent();
        w.line("}");
        if !document.namespace().is_empty() {
            w.blank();
        }
        return;
    }

    if composites.iter().any(|c| !c.fields.is_empty()) {
        w.line("namespace {");
        w.blank();
        for composite in composites.iter().filter(|c| !c.fields.is_empty()) {
            w.line(format!(
                "const {ns}::FieldInfo {}[] = {{",
                symbols::field_table(composite.name)
            ));
            w.indent();
            for field in composite.fields {
                w.line(format!("{{\"{}\", \"{}\"}},", field.name, field.idl_type()));
            }
            w.dedent();
            w.line("};");
            w.blank();
        }
        w.line("}  // namespace");
        w.blank();
    }

    w.line(format!("const {ns}::TypeInfo {array}[] = {{"));
    w.indent();
    for composite in &composites {
        let kind = if composite.is_message() { "message" } else { "struct" };
        let id = composite
            .message_id
            .map_or_else(|| "0u".to_string(), symbols::id_literal);
        let table = if composite.fields.is_empty() {
            "nullptr".to_string()
        } else {
            symbols::field_table(composite.name)
        };
        w.line(format!(
            "{{\"{}\", \"{kind}\", {id}, {}, {table}}},",
            composite.name,
            composite.fields.len()
        ));
    }
    w.dedent();
    w.line("};");
    w.line(format!(
        "const size_t {count} = sizeof({array}) / sizeof({array}[0]);"
    ));
    w.blank();
    w.line(format!("{} {{", symbols::registry_find_signature(document)));
    w.indent();
    w.line(format!("for (size_t i = 0; i < {count}; ++i) {{"));
    w.indent();
    w.line(format!("if (std::strcmp({array}[i].name, name) == 0) {{"));
    w.indent();
    w.line(format!("return &{array}[i];"));
    w.dedent();
    w.line("}");
    w.dedent();
    w.line("}");
    w.line("return nullptr;");
    w.dedent();
    w.line("}");
    if !document.namespace().is_empty() {
        w.blank();
    }
}

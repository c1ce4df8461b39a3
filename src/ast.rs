use std::fmt;

use indexmap::IndexMap;

/// A 1-based line/column location in the input document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Location { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Represents the primitive types supported by the IDL.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum PrimitiveType {
    /// Boolean type (1 byte on the wire).
    Bool,
    /// Unsigned 8-bit integer.
    U8,
    /// Unsigned 16-bit integer.
    U16,
    /// Unsigned 32-bit integer.
    U32,
    /// Unsigned 64-bit integer.
    U64,
    /// Signed 8-bit integer.
    I8,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// Signed 64-bit integer.
    I64,
    /// 32-bit floating point number.
    F32,
    /// 64-bit floating point number.
    F64,
    /// Length-prefixed UTF-8 string.
    String,
}

impl PrimitiveType {
    /// Looks up a primitive by its IDL spelling, including aliases.
    pub fn from_keyword(word: &str) -> Option<Self> {
        let primitive = match word {
            "bool" => PrimitiveType::Bool,
            "u8" | "byte" => PrimitiveType::U8,
            "u16" => PrimitiveType::U16,
            "u32" | "uint" => PrimitiveType::U32,
            "u64" => PrimitiveType::U64,
            "i8" => PrimitiveType::I8,
            "i16" => PrimitiveType::I16,
            "i32" | "int" => PrimitiveType::I32,
            "i64" => PrimitiveType::I64,
            "f32" | "float" => PrimitiveType::F32,
            "f64" | "double" => PrimitiveType::F64,
            "string" => PrimitiveType::String,
            _ => return None,
        };
        Some(primitive)
    }

    /// The canonical IDL spelling.
    pub fn idl_name(&self) -> &'static str {
        match self {
            PrimitiveType::Bool => "bool",
            PrimitiveType::U8 => "u8",
            PrimitiveType::U16 => "u16",
            PrimitiveType::U32 => "u32",
            PrimitiveType::U64 => "u64",
            PrimitiveType::I8 => "i8",
            PrimitiveType::I16 => "i16",
            PrimitiveType::I32 => "i32",
            PrimitiveType::I64 => "i64",
            PrimitiveType::F32 => "f32",
            PrimitiveType::F64 => "f64",
            PrimitiveType::String => "string",
        }
    }

    /// Gets the size in bits of a fixed-width primitive type.
    pub fn get_bit_width(&self) -> Option<usize> {
        self.get_byte_size().map(|bytes| bytes * 8)
    }

    /// Gets the size in bytes of a fixed-width primitive type.
    pub fn get_byte_size(&self) -> Option<usize> {
        match self {
            PrimitiveType::Bool | PrimitiveType::U8 | PrimitiveType::I8 => Some(1),
            PrimitiveType::U16 | PrimitiveType::I16 => Some(2),
            PrimitiveType::U32 | PrimitiveType::I32 | PrimitiveType::F32 => Some(4),
            PrimitiveType::U64 | PrimitiveType::I64 | PrimitiveType::F64 => Some(8),
            PrimitiveType::String => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        self.integer_range().is_some()
    }

    pub fn is_float(&self) -> bool {
        matches!(self, PrimitiveType::F32 | PrimitiveType::F64)
    }

    /// Inclusive value range of an integer primitive.
    pub fn integer_range(&self) -> Option<(i128, i128)> {
        let range = match self {
            PrimitiveType::U8 => (0, u8::MAX as i128),
            PrimitiveType::U16 => (0, u16::MAX as i128),
            PrimitiveType::U32 => (0, u32::MAX as i128),
            PrimitiveType::U64 => (0, u64::MAX as i128),
            PrimitiveType::I8 => (i8::MIN as i128, i8::MAX as i128),
            PrimitiveType::I16 => (i16::MIN as i128, i16::MAX as i128),
            PrimitiveType::I32 => (i32::MIN as i128, i32::MAX as i128),
            PrimitiveType::I64 => (i64::MIN as i128, i64::MAX as i128),
            _ => return None,
        };
        Some(range)
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.idl_name())
    }
}

/// A reference to a type, either built-in or declared in the same document.
#[derive(Debug, PartialEq, Clone)]
pub enum TypeRef {
    /// A built-in primitive type.
    Primitive(PrimitiveType),
    /// A user-declared enum, struct or message, identified by its name.
    Named(String),
}

impl TypeRef {
    pub fn idl_name(&self) -> &str {
        match self {
            TypeRef::Primitive(p) => p.idl_name(),
            TypeRef::Named(name) => name,
        }
    }
}

/// A literal value as written in the document.
#[derive(Debug, PartialEq, Clone)]
pub enum Literal {
    Int(i128),
    Float(f64),
    Bool(bool),
    Str(String),
    /// A bare identifier, used for enum variant defaults.
    Ident(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Float(v) => write!(f, "{v:?}"),
            Literal::Bool(v) => write!(f, "{v}"),
            Literal::Str(s) => write!(f, "{s:?}"),
            Literal::Ident(id) => f.write_str(id),
        }
    }
}

/// `@name` or `@name(literal)` metadata attached to a declaration or member.
#[derive(Debug, PartialEq, Clone)]
pub struct Annotation {
    pub name: String,
    pub value: Option<Literal>,
    pub location: Location,
}

/// Doc comments and annotations shared by every declaration and member.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Attributes {
    /// `///` comment lines, without the leading slashes.
    pub docs: Vec<String>,
    pub annotations: Vec<Annotation>,
}

impl Attributes {
    pub fn annotation(&self, name: &str) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.name == name)
    }

    /// `Some(reason)` when marked `@deprecated`; the reason may be empty.
    pub fn deprecation(&self) -> Option<Option<&str>> {
        self.annotation("deprecated").map(|a| match &a.value {
            Some(Literal::Str(reason)) => Some(reason.as_str()),
            _ => None,
        })
    }
}

/// Represents a field within a struct or message.
#[derive(Debug, PartialEq, Clone)]
pub struct Field {
    /// The name of the field, unique within its owner.
    pub name: String,
    /// The element type of the field.
    pub ty: TypeRef,
    /// Fixed element count for `name[N]` fields.
    pub array_len: Option<usize>,
    /// Optional default value.
    pub default: Option<Literal>,
    pub attributes: Attributes,
    pub location: Location,
}

impl Field {
    /// The IDL spelling of the field type, e.g. `f32[4]`.
    pub fn idl_type(&self) -> String {
        match self.array_len {
            Some(len) => format!("{}[{len}]", self.ty.idl_name()),
            None => self.ty.idl_name().to_string(),
        }
    }
}

/// Represents a variant within an enum.
#[derive(Debug, PartialEq, Clone)]
pub struct EnumVariant {
    pub name: String,
    /// The assigned value, explicit or continued from the previous variant.
    pub value: u64,
    pub attributes: Attributes,
    pub location: Location,
}

/// Represents an enum declaration.
#[derive(Debug, PartialEq, Clone)]
pub struct EnumDecl {
    pub name: String,
    /// The underlying integer type for the enum.
    pub underlying_type: PrimitiveType,
    pub variants: Vec<EnumVariant>,
    pub attributes: Attributes,
    pub location: Location,
}

/// A named data type with an ordered sequence of fields.
#[derive(Debug, PartialEq, Clone)]
pub struct TypeDecl {
    pub name: String,
    pub fields: Vec<Field>,
    pub attributes: Attributes,
    pub location: Location,
}

/// A struct-like unit that also carries a stable wire identifier.
#[derive(Debug, PartialEq, Clone)]
pub struct MessageDecl {
    pub name: String,
    /// FNV-1a hash of the namespace-qualified name.
    pub id: u32,
    pub fields: Vec<Field>,
    pub attributes: Attributes,
    pub location: Location,
}

/// A method parameter.
#[derive(Debug, PartialEq, Clone)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
    pub location: Location,
}

/// A method of a service.
#[derive(Debug, PartialEq, Clone)]
pub struct Method {
    pub name: String,
    /// FNV-1a hash of `Service.method`.
    pub id: u32,
    pub params: Vec<Param>,
    /// `None` for `void` methods.
    pub returns: Option<TypeRef>,
    pub attributes: Attributes,
    pub location: Location,
}

/// An RPC-style contract.
#[derive(Debug, PartialEq, Clone)]
pub struct ServiceDecl {
    pub name: String,
    pub methods: Vec<Method>,
    pub attributes: Attributes,
    pub location: Location,
}

/// The kind of a top-level declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Enum,
    Struct,
    Message,
    Service,
}

impl fmt::Display for DeclKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeclKind::Enum => "enum",
            DeclKind::Struct => "struct",
            DeclKind::Message => "message",
            DeclKind::Service => "service",
        })
    }
}

/// Represents a top-level declaration.
#[derive(Debug, PartialEq, Clone)]
pub enum Declaration {
    Enum(EnumDecl),
    Struct(TypeDecl),
    Message(MessageDecl),
    Service(ServiceDecl),
}

impl Declaration {
    /// Returns the name of the declaration.
    pub fn name(&self) -> &str {
        match self {
            Declaration::Enum(e) => &e.name,
            Declaration::Struct(s) => &s.name,
            Declaration::Message(m) => &m.name,
            Declaration::Service(s) => &s.name,
        }
    }

    pub fn kind(&self) -> DeclKind {
        match self {
            Declaration::Enum(_) => DeclKind::Enum,
            Declaration::Struct(_) => DeclKind::Struct,
            Declaration::Message(_) => DeclKind::Message,
            Declaration::Service(_) => DeclKind::Service,
        }
    }

    pub fn location(&self) -> Location {
        match self {
            Declaration::Enum(e) => e.location,
            Declaration::Struct(s) => s.location,
            Declaration::Message(m) => m.location,
            Declaration::Service(s) => s.location,
        }
    }

    pub fn attributes(&self) -> &Attributes {
        match self {
            Declaration::Enum(e) => &e.attributes,
            Declaration::Struct(s) => &s.attributes,
            Declaration::Message(m) => &m.attributes,
            Declaration::Service(s) => &s.attributes,
        }
    }

    /// Views a struct or message as a composite; `None` for enums and services.
    pub fn as_composite(&self) -> Option<Composite<'_>> {
        match self {
            Declaration::Struct(s) => Some(Composite {
                name: &s.name,
                fields: &s.fields,
                message_id: None,
                attributes: &s.attributes,
            }),
            Declaration::Message(m) => Some(Composite {
                name: &m.name,
                fields: &m.fields,
                message_id: Some(m.id),
                attributes: &m.attributes,
            }),
            _ => None,
        }
    }
}

/// A borrowed view over anything with fields: structs and messages.
#[derive(Debug, Clone, Copy)]
pub struct Composite<'a> {
    pub name: &'a str,
    pub fields: &'a [Field],
    pub message_id: Option<u32>,
    pub attributes: &'a Attributes,
}

impl Composite<'_> {
    pub fn is_message(&self) -> bool {
        self.message_id.is_some()
    }
}

/// Specifies the byte order used on the wire.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum WireEndianness {
    /// Little-endian byte order.
    #[default]
    Little,
    /// Big-endian byte order.
    Big,
}

/// A loaded, linked IDL document.
///
/// Only the loader constructs a `Document`, after every type reference has
/// been resolved and validated, so emitters may rely on that invariant.
#[derive(Debug, PartialEq, Clone)]
pub struct Document {
    name: String,
    source_name: String,
    namespace: Vec<String>,
    includes: Vec<String>,
    endianness: WireEndianness,
    declarations: IndexMap<String, Declaration>,
    order: Vec<String>,
}

impl Document {
    pub(crate) fn new(
        name: String,
        source_name: String,
        namespace: Vec<String>,
        includes: Vec<String>,
        endianness: WireEndianness,
        declarations: IndexMap<String, Declaration>,
        order: Vec<String>,
    ) -> Self {
        Document {
            name,
            source_name,
            namespace,
            includes,
            endianness,
            declarations,
            order,
        }
    }

    /// Module name, derived from the input file stem.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File name of the input, as shown in generated banners.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn namespace(&self) -> &[String] {
        &self.namespace
    }

    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    pub fn endianness(&self) -> WireEndianness {
        self.endianness
    }

    /// All declarations in document order.
    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.values()
    }

    pub fn get(&self, name: &str) -> Option<&Declaration> {
        self.declarations.get(name)
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn enums(&self) -> impl Iterator<Item = &EnumDecl> {
        self.declarations().filter_map(|d| match d {
            Declaration::Enum(e) => Some(e),
            _ => None,
        })
    }

    /// Structs and messages in document order.
    pub fn composites(&self) -> impl Iterator<Item = Composite<'_>> {
        self.declarations().filter_map(Declaration::as_composite)
    }

    /// Structs and messages ordered so that every type follows the types
    /// it contains by value.
    pub fn composites_by_dependency(&self) -> impl Iterator<Item = Composite<'_>> {
        self.order
            .iter()
            .filter_map(|name| self.declarations.get(name))
            .filter_map(Declaration::as_composite)
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceDecl> {
        self.declarations().filter_map(|d| match d {
            Declaration::Service(s) => Some(s),
            _ => None,
        })
    }

    /// The underlying type when `name` refers to an enum.
    pub fn enum_underlying(&self, name: &str) -> Option<PrimitiveType> {
        match self.declarations.get(name) {
            Some(Declaration::Enum(e)) => Some(e.underlying_type),
            _ => None,
        }
    }
}

/// 32-bit FNV-1a, used for stable message and method identifiers.
pub fn fnv1a32(text: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in text.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

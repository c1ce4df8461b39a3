use std::mem;

use crate::{
    ast::{
        Annotation, Attributes, Declaration, Document, EnumDecl, EnumVariant, Field, Literal,
        Location, MessageDecl, Method, Param, PrimitiveType, ServiceDecl, TypeDecl, TypeRef,
        WireEndianness, fnv1a32,
    },
    error::LoadError,
    lexer::{Lexer, Token, TokenKind},
    loader, resolver,
};

/// Skeleton declarations produced by the structural pass, before linking.
#[derive(Debug, Default)]
pub(crate) struct ParsedDocument {
    pub namespace: Vec<String>,
    pub includes: Vec<String>,
    pub endianness: WireEndianness,
    pub declarations: Vec<Declaration>,
}

/// The `Parser` struct is responsible for parsing IDL source into a `Document`.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current_token: Token,
    /// Doc comments immediately preceding `current_token`.
    pending_docs: Vec<String>,
    namespace: Vec<String>,
}

impl<'a> Parser<'a> {
    /// Creates a new parser and grabs the first token.
    pub fn new(source: &'a str) -> Self {
        let mut parser = Parser {
            lexer: Lexer::new(source),
            current_token: Token {
                kind: TokenKind::Eof,
                location: Location::new(1, 1),
                width: 1,
            },
            pending_docs: Vec::new(),
            namespace: Vec::new(),
        };
        parser.advance();
        parser
    }

    /// Advances the parser to the next token, collecting doc comments on the way.
    fn advance(&mut self) {
        self.pending_docs.clear();
        loop {
            let token = self.lexer.next_token();
            match &token.kind {
                TokenKind::DocComment(text) => self.pending_docs.push(text.clone()),
                _ => {
                    self.current_token = token;
                    break;
                }
            }
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current_token.kind == kind
    }

    fn error_here(&self, message: impl Into<String>) -> LoadError {
        LoadError::parse(self.current_token.location, message)
    }

    /// Builds an "expected X, found Y" error; lexer errors are reported as-is.
    fn unexpected(&self, expected: &str) -> LoadError {
        match &self.current_token.kind {
            TokenKind::Error(msg) => self.error_here(msg.clone()),
            found => self.error_here(format!("expected {expected}, found {found}")),
        }
    }

    /// Checks if the current token matches an expected kind, consumes it, and advances.
    fn consume(&mut self, expected: TokenKind) -> Result<(), LoadError> {
        if self.check(&expected) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&expected.to_string()))
        }
    }

    /// Helper to consume an Identifier and return its value and location.
    fn consume_identifier(&mut self) -> Result<(String, Location), LoadError> {
        let name = match &self.current_token.kind {
            TokenKind::Identifier(id) => id.clone(),
            _ => return Err(self.unexpected("an identifier")),
        };
        let location = self.current_token.location;
        self.advance();
        Ok((name, location))
    }

    // --- Core Parsing Functions ---

    /// Parses and links the entire document.
    ///
    /// `source_name` is the input file name; it names the generated module.
    pub fn parse_document(self, source_name: &str) -> Result<Document, LoadError> {
        let parsed = self.parse_skeleton()?;
        resolver::link(parsed, loader::module_name(source_name), source_name)
    }

    /// Structural pass: directives followed by skeleton declarations.
    pub(crate) fn parse_skeleton(mut self) -> Result<ParsedDocument, LoadError> {
        let mut parsed = ParsedDocument::default();
        let mut namespace_set = false;
        let mut endianness_set = false;

        while self.current_token.kind != TokenKind::Eof {
            match self.current_token.kind {
                TokenKind::Namespace | TokenKind::Include | TokenKind::Endianness
                    if !parsed.declarations.is_empty() =>
                {
                    return Err(self.error_here(format!(
                        "{} must appear before any declaration",
                        self.current_token.kind
                    )));
                }
                TokenKind::Namespace => {
                    if namespace_set {
                        return Err(
                            self.error_here("expected one namespace directive, found a second")
                        );
                    }
                    self.namespace = self.parse_namespace_directive()?;
                    parsed.namespace = self.namespace.clone();
                    namespace_set = true;
                }
                TokenKind::Include => {
                    let include = self.parse_include_directive()?;
                    parsed.includes.push(include);
                }
                TokenKind::Endianness => {
                    if endianness_set {
                        return Err(
                            self.error_here("expected one endianness directive, found a second")
                        );
                    }
                    parsed.endianness = self.parse_endianness_directive()?;
                    endianness_set = true;
                }
                _ => {
                    let decl = self.parse_declaration()?;
                    parsed.declarations.push(decl);
                }
            }
        }

        Ok(parsed)
    }

    /// Parses `namespace a.b.c;`.
    fn parse_namespace_directive(&mut self) -> Result<Vec<String>, LoadError> {
        self.consume(TokenKind::Namespace)?;
        let mut path = vec![self.consume_identifier()?.0];
        while self.check(&TokenKind::Dot) {
            self.advance();
            path.push(self.consume_identifier()?.0);
        }
        self.consume(TokenKind::Semicolon)?;
        Ok(path)
    }

    /// Parses `include "path.h";`.
    fn parse_include_directive(&mut self) -> Result<String, LoadError> {
        self.consume(TokenKind::Include)?;
        let path = match &self.current_token.kind {
            TokenKind::LiteralString(path) => path.clone(),
            _ => return Err(self.unexpected("a quoted include path")),
        };
        if path.is_empty() {
            return Err(self.error_here("include path cannot be empty"));
        }
        if let Some(c) = path.chars().find(|&c| c == '"' || c.is_control()) {
            return Err(self.error_here(format!("include path cannot contain {c:?}")));
        }
        self.advance();
        self.consume(TokenKind::Semicolon)?;
        Ok(path)
    }

    /// Parses the endianness directive (e.g., `endian = big;`).
    fn parse_endianness_directive(&mut self) -> Result<WireEndianness, LoadError> {
        self.consume(TokenKind::Endianness)?;
        self.consume(TokenKind::Assign)?;

        let endianness = match &self.current_token.kind {
            TokenKind::Identifier(s) => match s.as_str() {
                "big" => WireEndianness::Big,
                "little" => WireEndianness::Little,
                _ => {
                    return Err(self.error_here(format!(
                        "expected 'big' or 'little' for endianness, found '{s}'"
                    )));
                }
            },
            _ => return Err(self.unexpected("'big' or 'little'")),
        };
        self.advance(); // consume big/little
        self.consume(TokenKind::Semicolon)?;

        Ok(endianness)
    }

    /// Collects doc comments and `@annotations` preceding an item.
    fn parse_attributes(&mut self) -> Result<Attributes, LoadError> {
        let mut docs = mem::take(&mut self.pending_docs);
        let mut annotations = Vec::new();
        while self.check(&TokenKind::At) {
            annotations.push(self.parse_annotation()?);
            docs.extend(mem::take(&mut self.pending_docs));
        }
        Ok(Attributes { docs, annotations })
    }

    fn parse_annotation(&mut self) -> Result<Annotation, LoadError> {
        let location = self.current_token.location;
        self.consume(TokenKind::At)?;
        let (name, _) = self.consume_identifier()?;
        let value = if self.check(&TokenKind::OpenParen) {
            self.advance();
            let value = self.parse_literal()?;
            self.consume(TokenKind::CloseParen)?;
            Some(value)
        } else {
            None
        };
        Ok(Annotation {
            name,
            value,
            location,
        })
    }

    fn parse_literal(&mut self) -> Result<Literal, LoadError> {
        if self.check(&TokenKind::Minus) {
            self.advance();
            let literal = match self.current_token.kind {
                TokenKind::LiteralInt(v) => Literal::Int(-(v as i128)),
                TokenKind::LiteralFloat(v) => Literal::Float(-v),
                _ => return Err(self.unexpected("a number after `-`")),
            };
            self.advance();
            return Ok(literal);
        }

        let literal = match &self.current_token.kind {
            TokenKind::LiteralInt(v) => Literal::Int(*v as i128),
            TokenKind::LiteralFloat(v) => Literal::Float(*v),
            TokenKind::LiteralString(s) => Literal::Str(s.clone()),
            TokenKind::True => Literal::Bool(true),
            TokenKind::False => Literal::Bool(false),
            TokenKind::Identifier(id) => Literal::Ident(id.clone()),
            _ => return Err(self.unexpected("a literal value")),
        };
        self.advance();
        Ok(literal)
    }

    /// Parses a top-level declaration: struct, message, enum, or service.
    fn parse_declaration(&mut self) -> Result<Declaration, LoadError> {
        let attributes = self.parse_attributes()?;
        match self.current_token.kind {
            TokenKind::Struct => self.parse_struct(attributes),
            TokenKind::Message => self.parse_message(attributes),
            TokenKind::Enum => self.parse_enum(attributes),
            TokenKind::Service => self.parse_service(attributes),
            _ => Err(self.unexpected("`struct`, `message`, `enum`, or `service`")),
        }
    }

    // --- Type Parsing ---

    /// Parses a custom or primitive type name.
    fn parse_type(&mut self) -> Result<TypeRef, LoadError> {
        let ty = match &self.current_token.kind {
            TokenKind::Primitive(p) => TypeRef::Primitive(*p),
            TokenKind::Identifier(name) => TypeRef::Named(name.clone()),
            _ => return Err(self.unexpected("a type name")),
        };
        self.advance();
        Ok(ty)
    }

    /// Parses a field definition inside a struct or message.
    /// Handles optional array (`name[4]`) and default (`= value`) syntax.
    fn parse_field(&mut self) -> Result<Field, LoadError> {
        let attributes = self.parse_attributes()?;
        let ty = self.parse_type()?;
        let (name, location) = self.consume_identifier()?;

        let array_len = if self.check(&TokenKind::OpenBracket) {
            self.advance();
            let len = match self.current_token.kind {
                TokenKind::LiteralInt(0) => {
                    return Err(self.error_here("array length must be at least 1"));
                }
                TokenKind::LiteralInt(len) => usize::try_from(len)
                    .map_err(|_| self.error_here(format!("array length {len} is too large")))?,
                _ => return Err(self.unexpected("an integer array length")),
            };
            self.advance();
            self.consume(TokenKind::CloseBracket)?;
            Some(len)
        } else {
            None
        };

        let default = if self.check(&TokenKind::Assign) {
            self.advance();
            Some(self.parse_literal()?)
        } else {
            None
        };

        self.consume(TokenKind::Semicolon)?;

        Ok(Field {
            name,
            ty,
            array_len,
            default,
            attributes,
            location,
        })
    }

    // --- Message and Struct Parsing ---

    /// Parses the body of a struct or message (the fields inside braces).
    fn parse_struct_body(&mut self) -> Result<Vec<Field>, LoadError> {
        self.consume(TokenKind::OpenBrace)?;
        let mut fields = Vec::new();

        while self.current_token.kind != TokenKind::CloseBrace
            && self.current_token.kind != TokenKind::Eof
        {
            fields.push(self.parse_field()?);
        }

        self.consume(TokenKind::CloseBrace)?;
        Ok(fields)
    }

    /// Parses a struct definition.
    fn parse_struct(&mut self, attributes: Attributes) -> Result<Declaration, LoadError> {
        self.consume(TokenKind::Struct)?;
        let (name, location) = self.consume_identifier()?;
        let fields = self.parse_struct_body()?;

        Ok(Declaration::Struct(TypeDecl {
            name,
            fields,
            attributes,
            location,
        }))
    }

    /// Parses a message definition.
    fn parse_message(&mut self, attributes: Attributes) -> Result<Declaration, LoadError> {
        self.consume(TokenKind::Message)?;
        let (name, location) = self.consume_identifier()?;
        let fields = self.parse_struct_body()?;

        let qualified = self
            .namespace
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(name.as_str()))
            .collect::<Vec<_>>()
            .join(".");

        Ok(Declaration::Message(MessageDecl {
            id: fnv1a32(&qualified),
            name,
            fields,
            attributes,
            location,
        }))
    }

    // --- Enum Parsing ---

    /// Parses an enum definition.
    fn parse_enum(&mut self, attributes: Attributes) -> Result<Declaration, LoadError> {
        self.consume(TokenKind::Enum)?;
        let (name, location) = self.consume_identifier()?;

        // Underlying type: 'enum Name : u8', u32 when omitted
        let underlying_type = if self.check(&TokenKind::Colon) {
            self.advance();
            let underlying = match self.current_token.kind {
                TokenKind::Primitive(p) if p.is_integer() => p,
                TokenKind::Primitive(p) => {
                    return Err(self.error_here(format!(
                        "enum underlying type must be an integer type, found `{p}`"
                    )));
                }
                _ => return Err(self.unexpected("an integer type")),
            };
            self.advance();
            underlying
        } else {
            PrimitiveType::U32
        };

        self.consume(TokenKind::OpenBrace)?;

        let mut variants: Vec<EnumVariant> = Vec::new();
        while self.current_token.kind != TokenKind::CloseBrace
            && self.current_token.kind != TokenKind::Eof
        {
            let variant_attributes = self.parse_attributes()?;
            let (variant_name, variant_location) = self.consume_identifier()?;

            // Optional explicit assignment: '= 10'
            let value = if self.check(&TokenKind::Assign) {
                self.advance();
                let value = match self.current_token.kind {
                    TokenKind::LiteralInt(v) => v,
                    _ => return Err(self.unexpected("an integer literal for the enum value")),
                };
                self.advance();
                value
            } else {
                match variants.last() {
                    Some(previous) => previous.value.checked_add(1).ok_or_else(|| {
                        LoadError::parse(
                            variant_location,
                            format!("value of `{variant_name}` overflows"),
                        )
                    })?,
                    None => 0,
                }
            };

            variants.push(EnumVariant {
                name: variant_name,
                value,
                attributes: variant_attributes,
                location: variant_location,
            });

            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }

        self.consume(TokenKind::CloseBrace)?;

        Ok(Declaration::Enum(EnumDecl {
            name,
            underlying_type,
            variants,
            attributes,
            location,
        }))
    }

    // --- Service Parsing ---

    /// Parses a service definition.
    fn parse_service(&mut self, attributes: Attributes) -> Result<Declaration, LoadError> {
        self.consume(TokenKind::Service)?;
        let (name, location) = self.consume_identifier()?;
        self.consume(TokenKind::OpenBrace)?;

        let mut methods = Vec::new();
        while self.current_token.kind != TokenKind::CloseBrace
            && self.current_token.kind != TokenKind::Eof
        {
            methods.push(self.parse_method(&name)?);
        }

        self.consume(TokenKind::CloseBrace)?;

        Ok(Declaration::Service(ServiceDecl {
            name,
            methods,
            attributes,
            location,
        }))
    }

    /// Parses `ReturnType name(Type a, Type b);`.
    fn parse_method(&mut self, service: &str) -> Result<Method, LoadError> {
        let attributes = self.parse_attributes()?;
        let returns = if self.check(&TokenKind::Void) {
            self.advance();
            None
        } else {
            Some(self.parse_type()?)
        };
        let (name, location) = self.consume_identifier()?;

        self.consume(TokenKind::OpenParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::CloseParen) {
            loop {
                let ty = self.parse_type()?;
                let (param_name, param_location) = self.consume_identifier()?;
                params.push(Param {
                    name: param_name,
                    ty,
                    location: param_location,
                });
                if self.check(&TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.consume(TokenKind::CloseParen)?;
        self.consume(TokenKind::Semicolon)?;

        Ok(Method {
            id: fnv1a32(&format!("{service}.{name}")),
            name,
            params,
            returns,
            attributes,
            location,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Result<Document, LoadError> {
        Parser::new(source).parse_document("test.idl")
    }

    #[test]
    fn test_parse_simple_struct() {
        let document = parse("struct Vec2 { float x; float y; }").unwrap();

        match document.get("Vec2") {
            Some(Declaration::Struct(s)) => {
                assert_eq!(s.name, "Vec2");
                assert_eq!(s.fields.len(), 2);
                assert_eq!(s.fields[0].name, "x");
                assert_eq!(s.fields[0].ty, TypeRef::Primitive(PrimitiveType::F32));
                assert_eq!(s.fields[1].name, "y");
            }
            other => panic!("Expected Struct definition, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_enum() {
        let document = parse("enum MyEnum : u8 { A = 1, B, C = 7, D }").unwrap();

        match document.get("MyEnum") {
            Some(Declaration::Enum(e)) => {
                assert_eq!(e.underlying_type, PrimitiveType::U8);
                let values: Vec<(&str, u64)> = e
                    .variants
                    .iter()
                    .map(|v| (v.name.as_str(), v.value))
                    .collect();
                assert_eq!(values, vec![("A", 1), ("B", 2), ("C", 7), ("D", 8)]);
            }
            other => panic!("Expected Enum definition, got {other:?}"),
        }
    }

    #[test]
    fn test_enum_defaults_to_u32() {
        let document = parse("enum Mode { Off, On, }").unwrap();
        assert_eq!(document.enum_underlying("Mode"), Some(PrimitiveType::U32));
    }

    #[test]
    fn test_enum_float_underlying_rejected() {
        let err = parse("enum E : f32 { A }").unwrap_err();
        assert!(err.to_string().contains("must be an integer type"));
    }

    #[test]
    fn test_parse_message_with_namespace() {
        let document = parse("namespace game.net; message Ping { u64 id; }").unwrap();

        assert_eq!(document.namespace(), ["game".to_string(), "net".to_string()]);
        match document.get("Ping") {
            Some(Declaration::Message(m)) => {
                assert_eq!(m.fields.len(), 1);
                assert_eq!(m.id, fnv1a32("game.net.Ping"));
            }
            other => panic!("Expected Message definition, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_service() {
        let source = "
            struct Vec2 { float x; float y; }
            service Physics {
                Vec2 step(Vec2 position, f32 dt);
                void reset();
            }
        ";
        let document = parse(source).unwrap();
        let service = document.services().next().unwrap();
        assert_eq!(service.methods.len(), 2);
        assert_eq!(service.methods[0].params.len(), 2);
        assert_eq!(
            service.methods[0].returns,
            Some(TypeRef::Named("Vec2".to_string()))
        );
        assert_eq!(service.methods[1].returns, None);
        assert_eq!(service.methods[1].id, fnv1a32("Physics.reset"));
    }

    #[test]
    fn test_include_directive() {
        let document = parse("include \"geo/base.h\"; struct S { u8 f; }").unwrap();
        assert_eq!(document.includes(), ["geo/base.h".to_string()]);
    }

    #[test]
    fn test_include_path_must_stay_on_one_line() {
        for source in [
            "include \"a\\\"b.h\";",
            "include \"a.h\\nint injected;\";",
            "include \"a.h\\r\";",
            "include \"\";",
        ] {
            let err = parse(source).unwrap_err();
            match err {
                LoadError::Parse { location, message } => {
                    assert_eq!(location, Location::new(1, 9), "{source}");
                    assert!(message.starts_with("include path cannot"), "{message}");
                }
                other => panic!("Expected ParseError, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_endianness() {
        let document = parse("endian = big; struct S { u8 f; }").unwrap();
        assert_eq!(document.endianness(), WireEndianness::Big);
    }

    #[test]
    fn test_second_endianness_rejected() {
        let err = parse("endian = big; endian = little;").unwrap_err();
        assert!(err.to_string().contains("found a second"));
    }

    #[test]
    fn test_directive_after_declaration_rejected() {
        let err = parse("struct S { u8 f; } namespace late;").unwrap_err();
        assert!(err.to_string().contains("must appear before any declaration"));
    }

    #[test]
    fn test_docs_and_annotations() {
        let source = "
            /// A point.
            @deprecated(\"use Vec3\")
            struct Vec2 {
                /// Horizontal.
                float x = 1.5;
                float y;
            }
        ";
        let document = parse(source).unwrap();
        let Some(Declaration::Struct(s)) = document.get("Vec2") else {
            panic!("Expected Struct definition");
        };
        assert_eq!(s.attributes.docs, vec!["A point.".to_string()]);
        assert_eq!(s.attributes.deprecation(), Some(Some("use Vec3")));
        assert_eq!(s.fields[0].attributes.docs, vec!["Horizontal.".to_string()]);
        assert_eq!(s.fields[0].default, Some(Literal::Float(1.5)));
        assert!(s.fields[1].attributes.docs.is_empty());
    }

    #[test]
    fn test_array_field() {
        let document = parse("struct Mesh { u16 indices[3]; }").unwrap();
        let Some(Declaration::Struct(s)) = document.get("Mesh") else {
            panic!("Expected Struct definition");
        };
        assert_eq!(s.fields[0].array_len, Some(3));

        let err = parse("struct Mesh { u16 indices[0]; }").unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn test_parse_error_location() {
        let err = parse("struct Vec2 {\n  float x\n}").unwrap_err();
        match err {
            LoadError::Parse { location, message } => {
                assert_eq!(location, Location::new(3, 1));
                assert!(message.contains("expected `;`"), "{message}");
            }
            other => panic!("Expected ParseError, got {other:?}"),
        }
    }

    #[test]
    fn test_lexer_error_surfaces() {
        let err = parse("struct $ {}").unwrap_err();
        assert!(err.to_string().contains("unrecognized character"));
    }
}

use std::{fmt, iter::Peekable, str::CharIndices};

use crate::{ast::Location, ast::PrimitiveType, color};

// The core token definition for the IDL.
#[derive(Debug, PartialEq, Clone)]
pub enum TokenKind {
    // Keywords
    Namespace,
    Include,
    Endianness,
    Message,
    Struct,
    Enum,
    Service,
    Void,
    True,
    False,
    // Primitive Types
    Primitive(PrimitiveType),
    // Delimiters and Operators
    OpenBrace,    // {
    CloseBrace,   // }
    OpenParen,    // (
    CloseParen,   // )
    OpenBracket,  // [
    CloseBracket, // ]
    Comma,        // ,
    Colon,        // :
    Semicolon,    // ;
    Assign,       // =
    Dot,          // .
    At,           // @
    Minus,        // -
    /// Type, field, variant, or method name.
    Identifier(String),
    /// Integer literal (i.e. 123 or 0x7f)
    LiteralInt(u64),
    /// Floating point literal (i.e. 1.5 or 2e3)
    LiteralFloat(f64),
    /// String literal with escapes already processed.
    LiteralString(String),
    /// `///` comment text.
    DocComment(String),
    /// End of File
    Eof,
    /// Error token with a message
    Error(String),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Namespace => f.write_str("`namespace`"),
            TokenKind::Include => f.write_str("`include`"),
            TokenKind::Endianness => f.write_str("`endian`"),
            TokenKind::Message => f.write_str("`message`"),
            TokenKind::Struct => f.write_str("`struct`"),
            TokenKind::Enum => f.write_str("`enum`"),
            TokenKind::Service => f.write_str("`service`"),
            TokenKind::Void => f.write_str("`void`"),
            TokenKind::True => f.write_str("`true`"),
            TokenKind::False => f.write_str("`false`"),
            TokenKind::Primitive(p) => write!(f, "type `{p}`"),
            TokenKind::OpenBrace => f.write_str("`{`"),
            TokenKind::CloseBrace => f.write_str("`}`"),
            TokenKind::OpenParen => f.write_str("`(`"),
            TokenKind::CloseParen => f.write_str("`)`"),
            TokenKind::OpenBracket => f.write_str("`[`"),
            TokenKind::CloseBracket => f.write_str("`]`"),
            TokenKind::Comma => f.write_str("`,`"),
            TokenKind::Colon => f.write_str("`:`"),
            TokenKind::Semicolon => f.write_str("`;`"),
            TokenKind::Assign => f.write_str("`=`"),
            TokenKind::Dot => f.write_str("`.`"),
            TokenKind::At => f.write_str("`@`"),
            TokenKind::Minus => f.write_str("`-`"),
            TokenKind::Identifier(id) => write!(f, "identifier `{id}`"),
            TokenKind::LiteralInt(v) => write!(f, "integer `{v}`"),
            TokenKind::LiteralFloat(v) => write!(f, "float `{v:?}`"),
            TokenKind::LiteralString(s) => write!(f, "string {s:?}"),
            TokenKind::DocComment(_) => f.write_str("doc comment"),
            TokenKind::Eof => f.write_str("end of file"),
            TokenKind::Error(msg) => f.write_str(msg),
        }
    }
}

// A full token, including its kind and where it starts.
#[derive(Debug, PartialEq, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub location: Location,
    /// Width in characters, used to underline the token in diagnostics.
    pub width: usize,
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: usize,
    column: usize,
    finished: bool,
}

impl<'a> Lexer<'a> {
    /// Creates a new Lexer from the input source string.
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source,
            chars: source.char_indices().peekable(),
            line: 1,
            column: 1,
            finished: false,
        }
    }

    /// Byte offset of the next unread character.
    fn offset(&mut self) -> usize {
        self.chars.peek().map_or(self.source.len(), |&(i, _)| i)
    }

    fn rest(&mut self) -> &'a str {
        let offset = self.offset();
        &self.source[offset..]
    }

    /// Consumes the current character, tracking line and column.
    fn advance(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Peeks at the next character without consuming it.
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn location(&self) -> Location {
        Location::new(self.line, self.column)
    }

    /// Skips whitespace and non-doc comments. Returns an error token kind
    /// for an unterminated block comment.
    fn skip_trivia(&mut self) -> Option<TokenKind> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') => {
                    let rest = self.rest();
                    if rest.starts_with("///") && !rest.starts_with("////") {
                        return None;
                    } else if rest.starts_with("//") {
                        while let Some(c) = self.peek() {
                            if c == '\n' {
                                break;
                            }
                            self.advance();
                        }
                    } else if rest.starts_with("/*") {
                        self.advance();
                        self.advance();
                        loop {
                            if self.rest().starts_with("*/") {
                                self.advance();
                                self.advance();
                                break;
                            }
                            if self.advance().is_none() {
                                return Some(TokenKind::Error(
                                    "unterminated block comment".to_string(),
                                ));
                            }
                        }
                    } else {
                        return None;
                    }
                }
                _ => return None,
            }
        }
    }

    /// Parses a `///` comment up to the end of the line.
    fn take_doc_comment(&mut self) -> TokenKind {
        for _ in 0..3 {
            self.advance();
        }
        let start = self.offset();
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
        let end = self.offset();
        let text = &self.source[start..end];
        let text = text.strip_prefix(' ').unwrap_or(text).trim_end();
        TokenKind::DocComment(text.to_string())
    }

    /// Parses an identifier or keyword.
    fn take_identifier(&mut self) -> TokenKind {
        let start = self.offset();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
        let end = self.offset();
        let ident_str = &self.source[start..end];

        // Check if it's a reserved keyword or type
        match ident_str {
            "namespace" => TokenKind::Namespace,
            "include" => TokenKind::Include,
            "endian" => TokenKind::Endianness,
            "message" => TokenKind::Message,
            "struct" => TokenKind::Struct,
            "enum" => TokenKind::Enum,
            "service" => TokenKind::Service,
            "void" => TokenKind::Void,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => match PrimitiveType::from_keyword(ident_str) {
                Some(p) => TokenKind::Primitive(p),
                None => TokenKind::Identifier(ident_str.to_string()),
            },
        }
    }

    /// Parses an integer or float literal.
    fn take_number(&mut self) -> TokenKind {
        let start = self.offset();

        if self.rest().starts_with("0x") || self.rest().starts_with("0X") {
            self.advance();
            self.advance();
            let digits_start = self.offset();
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() {
                    self.advance();
                } else {
                    break;
                }
            }
            let digits = &self.source[digits_start..self.offset()];
            return match u64::from_str_radix(digits, 16) {
                Ok(val) => TokenKind::LiteralInt(val),
                Err(_) => TokenKind::Error(format!(
                    "invalid or oversized hex literal: 0x{digits}"
                )),
            };
        }

        let mut is_float = false;
        self.take_digits();
        if self.peek() == Some('.') {
            is_float = true;
            self.advance();
            self.take_digits();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            is_float = true;
            self.advance();
            if matches!(self.peek(), Some('+' | '-')) {
                self.advance();
            }
            self.take_digits();
        }

        let num_str = &self.source[start..self.offset()];
        if is_float {
            match num_str.parse::<f64>() {
                Ok(val) if val.is_finite() => TokenKind::LiteralFloat(val),
                _ => TokenKind::Error(format!("invalid float literal: {num_str}")),
            }
        } else {
            match num_str.parse::<u64>() {
                Ok(val) => TokenKind::LiteralInt(val),
                Err(_) => {
                    TokenKind::Error(format!("invalid or oversized integer literal: {num_str}"))
                }
            }
        }
    }

    fn take_digits(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Parses a double-quoted string literal.
    fn take_string(&mut self) -> TokenKind {
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.advance() {
                Some('"') => return TokenKind::LiteralString(value),
                Some('\\') => match self.advance() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('0') => value.push('\0'),
                    Some('\\') => value.push('\\'),
                    Some('"') => value.push('"'),
                    Some(c) => return TokenKind::Error(format!("unknown escape sequence: \\{c}")),
                    None => break,
                },
                Some('\n') | None => break,
                Some(c) => value.push(c),
            }
        }
        TokenKind::Error("unterminated string literal".to_string())
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    /// Produces the next token; keeps returning `Eof` at the end of input.
    pub fn next_token(&mut self) -> Token {
        let trivia_error_at = self.location();
        if let Some(error) = self.skip_trivia() {
            return Token {
                kind: error,
                location: trivia_error_at,
                width: 2,
            };
        }

        let location = self.location();
        let kind = match self.peek() {
            None => TokenKind::Eof,
            Some('{') => self.single(TokenKind::OpenBrace),
            Some('}') => self.single(TokenKind::CloseBrace),
            Some('(') => self.single(TokenKind::OpenParen),
            Some(')') => self.single(TokenKind::CloseParen),
            Some('[') => self.single(TokenKind::OpenBracket),
            Some(']') => self.single(TokenKind::CloseBracket),
            Some(',') => self.single(TokenKind::Comma),
            Some(':') => self.single(TokenKind::Colon),
            Some(';') => self.single(TokenKind::Semicolon),
            Some('=') => self.single(TokenKind::Assign),
            Some('.') => self.single(TokenKind::Dot),
            Some('@') => self.single(TokenKind::At),
            Some('-') => self.single(TokenKind::Minus),
            Some('"') => self.take_string(),
            Some('/') if self.rest().starts_with("///") => self.take_doc_comment(),

            // Handle identifiers/keywords
            Some(c) if c.is_ascii_alphabetic() || c == '_' => self.take_identifier(),

            // Handle numbers
            Some(c) if c.is_ascii_digit() => self.take_number(),

            // Error token for unrecognized characters
            Some(c) => {
                self.advance();
                TokenKind::Error(format!("unrecognized character: '{c}'"))
            }
        };

        let width = if self.line == location.line {
            (self.column - location.column).max(1)
        } else {
            1
        };

        Token {
            kind,
            location,
            width,
        }
    }
}

impl<'a> From<&'a str> for Lexer<'a> {
    fn from(source: &'a str) -> Self {
        Lexer::new(source)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    /// Yields every token including a single trailing `Eof`.
    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let token = self.next_token();
        if token.kind == TokenKind::Eof {
            self.finished = true;
        }
        Some(token)
    }
}

/// Renders the lines leading up to `location` with a caret underline.
pub fn render_snippet(source: &str, location: Location, width: usize, colored: bool) -> String {
    let lines: Vec<&str> = source.lines().collect();
    if location.line == 0 || location.line > lines.len() + 1 {
        return String::new();
    }

    let first = location.line.saturating_sub(3).max(1);
    let gutter = location.line.to_string().len();
    let mut result = String::new();
    for number in first..=location.line {
        let text = lines.get(number - 1).copied().unwrap_or("");
        result.push_str(&format!("{number:>gutter$} | {text}\n"));
    }

    let pad = " ".repeat(gutter + 3 + location.column.saturating_sub(1));
    let carets = "^".repeat(width.max(1));
    if colored {
        result.push_str(&format!(
            "{pad}{}{}{carets}{}\n",
            color::BOLD,
            color::RED,
            color::END
        ));
    } else {
        result.push_str(&format!("{pad}{carets}\n"));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source).map(|t| t.kind).collect()
    }

    #[test]
    fn test_struct_tokens() {
        assert_eq!(
            kinds("struct Vec2 { float x; }"),
            vec![
                TokenKind::Struct,
                TokenKind::Identifier("Vec2".to_string()),
                TokenKind::OpenBrace,
                TokenKind::Primitive(PrimitiveType::F32),
                TokenKind::Identifier("x".to_string()),
                TokenKind::Semicolon,
                TokenKind::CloseBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped_but_docs_kept() {
        let source = "// plain\n/* block\n comment */\n/// The docs.\nenum";
        assert_eq!(
            kinds(source),
            vec![
                TokenKind::DocComment("The docs.".to_string()),
                TokenKind::Enum,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            kinds(r#"42 0x1F 1.5 2e3 "a\"b""#),
            vec![
                TokenKind::LiteralInt(42),
                TokenKind::LiteralInt(31),
                TokenKind::LiteralFloat(1.5),
                TokenKind::LiteralFloat(2000.0),
                TokenKind::LiteralString("a\"b".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_locations_are_one_based() {
        let tokens: Vec<Token> = Lexer::new("struct\n  Vec2").collect();
        assert_eq!(tokens[0].location, Location::new(1, 1));
        assert_eq!(tokens[1].location, Location::new(2, 3));
        assert_eq!(tokens[1].width, 4);
    }

    #[test]
    fn test_error_tokens() {
        assert!(matches!(kinds("$")[0], TokenKind::Error(_)));
        assert!(matches!(kinds("\"open")[0], TokenKind::Error(_)));
        assert!(matches!(kinds("/* open")[0], TokenKind::Error(_)));
        assert!(matches!(
            kinds("99999999999999999999")[0],
            TokenKind::Error(_)
        ));
    }

    #[test]
    fn test_render_snippet() {
        let source = "struct A {\n  u8 x\n}";
        let snippet = render_snippet(source, Location::new(3, 1), 1, false);
        assert_eq!(snippet, "1 | struct A {\n2 |   u8 x\n3 | }\n    ^\n");
    }
}

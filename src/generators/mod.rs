use std::path::Path;

use crate::{VERSION, ast::Document, error::EmitError};

pub mod header;
pub mod output;
pub mod source;
pub mod symbols;

pub use header::HeaderEmitter;
pub use source::SourceEmitter;

/// A trait for emitters that render one artifact from a `Document`.
///
/// Rendering is a pure traversal of the document; `emit` buffers the whole
/// artifact before atomically replacing the output file.
pub trait Emitter {
    /// Renders the artifact in memory.
    fn render(&self, document: &Document) -> String;

    /// Renders the artifact and writes it to `path`.
    fn emit(&self, document: &Document, path: &Path) -> Result<(), EmitError> {
        let content = self.render(document);
        output::write_atomic(path, content.as_bytes())
    }
}

/// Formatting settings shared by both emitters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitConfig {
    /// Number of spaces to use for each indentation level.
    pub indent_spaces: u8,
}

impl Default for EmitConfig {
    fn default() -> Self {
        EmitConfig { indent_spaces: 4 }
    }
}

/// Line-oriented text buffer with indentation tracking.
pub struct CodeWriter {
    buffer: String,
    indent_spaces: usize,
    /// The current indentation level.
    current_indent_level: usize,
}

impl CodeWriter {
    pub fn new(config: &EmitConfig) -> Self {
        CodeWriter {
            buffer: String::new(),
            indent_spaces: usize::from(config.indent_spaces),
            current_indent_level: 0,
        }
    }

    /// Writes a line with the appropriate indentation. Empty content yields
    /// an empty line without trailing whitespace.
    pub fn line(&mut self, content: impl AsRef<str>) {
        let content = content.as_ref();
        if !content.is_empty() {
            let indent = " ".repeat(self.current_indent_level * self.indent_spaces);
            self.buffer.push_str(&indent);
            self.buffer.push_str(content);
        }
        self.buffer.push('\n');
    }

    pub fn blank(&mut self) {
        self.buffer.push('\n');
    }

    /// Increases the current indentation level.
    pub fn indent(&mut self) {
        self.current_indent_level += 1;
    }

    /// Decreases the current indentation level, preventing it from going below zero.
    pub fn dedent(&mut self) {
        self.current_indent_level = self.current_indent_level.saturating_sub(1);
    }

    /// Writes a `///` line for each doc comment line. Trailing backslashes
    /// are dropped, since they would splice the next line into the comment.
    pub fn docs(&mut self, docs: &[String]) {
        for doc in docs {
            let doc = doc.trim_end_matches(|c: char| c == '\\' || c.is_whitespace());
            if doc.is_empty() {
                self.line("///");
            } else {
                self.line(format!("/// {doc}"));
            }
        }
    }

    pub fn finish(self) -> String {
        self.buffer
    }
}

/// Header comment identifying the generator and the input document.
fn write_banner(writer: &mut CodeWriter, document: &Document) {
    writer.line(format!(
        "// Generated by idlgen from {}. Do not edit.",
        document.source_name()
    ));
    writer.line(format!("// Format version {VERSION}."));
    writer.blank();
}

/// Opens the document namespace, one block per path segment.
fn open_namespace(writer: &mut CodeWriter, document: &Document) {
    if document.namespace().is_empty() {
        return;
    }
    for segment in document.namespace() {
        writer.line(format!("namespace {segment} {{"));
    }
    writer.blank();
}

fn close_namespace(writer: &mut CodeWriter, document: &Document) {
    for segment in document.namespace().iter().rev() {
        writer.line(format!("}}  // namespace {segment}"));
    }
}

//! Entry points that turn an input document into a linked [`Document`].

use std::{fs, path::Path};

use heck::ToUpperCamelCase;
use tracing::{debug, instrument};

use crate::{ast::Document, error::LoadError, parser::Parser};

/// Reads and loads the document at `path`.
#[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
pub fn load(path: impl AsRef<Path>) -> Result<Document, LoadError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let source_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    load_str(&source_name, &source)
}

/// Loads a document from in-memory text. `source_name` is the file name the
/// text came from; its stem names the generated module.
pub fn load_str(source_name: &str, source: &str) -> Result<Document, LoadError> {
    let document = Parser::new(source).parse_document(source_name)?;
    debug!(
        module = document.name(),
        declarations = document.len(),
        "document loaded"
    );
    Ok(document)
}

/// Derives a C++-safe module name from an input file name: `vec2_math.idl`
/// becomes `Vec2Math`.
pub fn module_name(source_name: &str) -> String {
    let stem = Path::new(source_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name: String = stem
        .to_upper_camel_case()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    match name.chars().next() {
        Some(first) if first.is_ascii_alphabetic() => name,
        _ => format!("Idl{name}"),
    }
}

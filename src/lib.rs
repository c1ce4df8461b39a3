//! # idlgen
//!
//! idlgen compiles an Interface Definition Language (IDL) document describing
//! structs, messages, enums and services into a C++ header and a matching
//! C++ source file. It is meant to run as a build step: the generated
//! artifacts are byte-for-byte deterministic and are only replaced once
//! they have been rendered completely.
//!
//! ## Core Components
//!
//! - **Lexer** (`lexer`): Tokenizes IDL source text.
//! - **Parser** (`parser`) and **Loader** (`loader`): Build a linked, immutable
//!   [`Document`], resolving forward references and rejecting duplicate,
//!   unknown or circular type declarations.
//! - **AST** (`ast`): The document model shared by every later stage.
//! - **Generators** (`generators`): The header and source emitters, which
//!   share every generated name through `generators::symbols`.
//! - **Dirty checking** (`dirty`): Version-marker and timestamp staleness
//!   checks for incremental builds.
//! - **Code generation** (`codegen`): The [`CodeGenerator`] facade and the
//!   one-call [`generate`] build step.
//!
//! ## Example
//!
//! ```rust
//! use idlgen::{CodeGenerator, loader::load_str};
//!
//! let document = load_str("shapes.idl", "struct Vec2 { float x; float y; }").unwrap();
//!
//! let mut generator = CodeGenerator::default();
//! generator.bind(document);
//!
//! let header = generator.render_header().unwrap();
//! assert!(header.contains("struct Vec2 {"));
//!
//! let source = generator.render_source().unwrap();
//! assert!(source.contains("WriteValue(value.x, out);"));
//! ```

pub mod ast;
pub mod codegen;
pub mod dirty;
pub mod error;
pub mod generators;
pub mod lexer;
pub mod loader;
pub mod parser;

mod color;
mod resolver;

pub use ast::Document;
pub use codegen::{
    CodeGenerator, GenerationTarget, GeneratorConfig, Outcome, generate, generate_target,
};
pub use error::{EmitError, GenerateError, LoadError};

/// Format version of the generated artifacts. Bumping it makes every
/// incremental build regenerate its outputs.
pub const VERSION: u32 = 1;

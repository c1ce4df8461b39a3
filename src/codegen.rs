//! The code generator facade and the one-call build step.

use std::path::{self, Component, Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::{
    VERSION,
    ast::Document,
    dirty,
    error::{EmitError, GenerateError, LoadError},
    generators::{EmitConfig, Emitter, HeaderEmitter, SourceEmitter, output},
    loader,
};

/// Settings for a generator invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratorConfig {
    pub emit: EmitConfig,
    /// Skip generation when the outputs are up to date. Off by default, so
    /// every invocation regenerates.
    pub incremental: bool,
}

/// One input document and the two artifacts generated from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTarget {
    pub input: PathBuf,
    pub header: PathBuf,
    pub source: PathBuf,
    /// Format version recorded next to the outputs.
    pub version: u32,
}

impl GenerationTarget {
    pub fn new(
        input: impl Into<PathBuf>,
        source: impl Into<PathBuf>,
        header: impl Into<PathBuf>,
    ) -> Self {
        GenerationTarget {
            input: input.into(),
            header: header.into(),
            source: source.into(),
            version: VERSION,
        }
    }

    fn outputs(&self) -> [&Path; 2] {
        [self.source.as_path(), self.header.as_path()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Both outputs were written.
    Generated,
    /// Incremental mode found the outputs current; nothing was written.
    UpToDate,
}

/// Holds one bound document and emits its header and source on request.
///
/// The two artifacts are independent: either may be generated first, and
/// each any number of times, without affecting the other.
#[derive(Debug, Default)]
pub struct CodeGenerator {
    config: GeneratorConfig,
    document: Option<Document>,
    header_include: Option<String>,
}

impl CodeGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        CodeGenerator {
            config,
            document: None,
            header_include: None,
        }
    }

    /// Overrides the name the source uses to include its header.
    pub fn with_header_include(mut self, include: impl Into<String>) -> Self {
        self.header_include = Some(include.into());
        self
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    /// Binds an already loaded document, replacing any previous one.
    pub fn bind(&mut self, document: Document) {
        debug!(module = document.name(), "document bound");
        self.document = Some(document);
    }

    /// Loads the document at `path` and binds it. On failure the generator
    /// keeps whatever it was bound to before.
    pub fn set_document(&mut self, path: impl AsRef<Path>) -> Result<(), LoadError> {
        let document = loader::load(path)?;
        self.bind(document);
        Ok(())
    }

    fn bound(&self) -> Result<&Document, EmitError> {
        self.document.as_ref().ok_or(EmitError::Unbound)
    }

    fn header_emitter(&self) -> HeaderEmitter {
        HeaderEmitter::new(self.config.emit.clone())
    }

    /// The source emitter, including the header under `default_include`
    /// unless an explicit include was set.
    fn source_emitter(&self, default_include: Option<String>) -> SourceEmitter {
        let emitter = SourceEmitter::new(self.config.emit.clone());
        match self.header_include.clone().or(default_include) {
            Some(include) => emitter.with_header_include(include),
            None => emitter,
        }
    }

    pub fn render_header(&self) -> Result<String, EmitError> {
        Ok(self.header_emitter().render(self.bound()?))
    }

    pub fn render_source(&self) -> Result<String, EmitError> {
        Ok(self.source_emitter(None).render(self.bound()?))
    }

    pub fn generate_header(&self, path: impl AsRef<Path>) -> Result<(), EmitError> {
        let path = path.as_ref();
        self.header_emitter().emit(self.bound()?, path)?;
        debug!(path = %path.display(), "header written");
        Ok(())
    }

    pub fn generate_source(&self, path: impl AsRef<Path>) -> Result<(), EmitError> {
        let path = path.as_ref();
        let default_include = path
            .file_stem()
            .map(|stem| format!("{}.h", stem.to_string_lossy()));
        self.source_emitter(default_include).emit(self.bound()?, path)?;
        debug!(path = %path.display(), "source written");
        Ok(())
    }

    /// Writes both artifacts, replacing neither output unless both were
    /// rendered and staged. The source includes the header by its path
    /// relative to the source's directory.
    pub fn generate_pair(
        &self,
        header: impl AsRef<Path>,
        source: impl AsRef<Path>,
    ) -> Result<(), GenerateError> {
        let (header, source) = (header.as_ref(), source.as_ref());

        let document = self.bound().map_err(GenerateError::Header)?;
        let header_text = self.header_emitter().render(document);
        let include = relative_include(header, source).or_else(|| {
            header
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        });
        let source_text = self.source_emitter(include).render(document);

        let staged_header =
            output::stage(header, header_text.as_bytes()).map_err(GenerateError::Header)?;
        let staged_source =
            output::stage(source, source_text.as_bytes()).map_err(GenerateError::Source)?;

        staged_header.commit().map_err(GenerateError::Write)?;
        staged_source.commit().map_err(GenerateError::Write)?;
        debug!(
            header = %header.display(),
            source = %source.display(),
            "header and source written"
        );
        Ok(())
    }
}

/// Spells `header` as seen from the directory of `source`, with `/`
/// separators. `None` when the two share no root or either path climbs
/// through `..` after the common prefix.
fn relative_include(header: &Path, source: &Path) -> Option<String> {
    let header = path::absolute(header).ok()?;
    let source = path::absolute(source).ok()?;
    let from: Vec<Component> = source.parent()?.components().collect();
    let to: Vec<Component> = header.components().collect();

    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
    if common == 0 || common == to.len() {
        return None;
    }
    fn names_only(components: &[Component<'_>]) -> bool {
        components
            .iter()
            .all(|component| matches!(component, Component::Normal(_)))
    }
    if !names_only(&from[common..]) || !names_only(&to[common..]) {
        return None;
    }

    let mut parts = vec![String::from(".."); from.len() - common];
    parts.extend(
        to[common..]
            .iter()
            .map(|component| component.as_os_str().to_string_lossy().into_owned()),
    );
    Some(parts.join("/"))
}

/// Generates `out_src` and `out_hdr` from `input`, always regenerating.
pub fn generate(
    input: impl AsRef<Path>,
    out_src: impl AsRef<Path>,
    out_hdr: impl AsRef<Path>,
) -> Result<Outcome, GenerateError> {
    let target = GenerationTarget::new(
        input.as_ref(),
        out_src.as_ref(),
        out_hdr.as_ref(),
    );
    generate_target(&target, &GeneratorConfig::default())
}

/// Runs one build step: dirty check (when incremental), load, emit both
/// artifacts, then record the version marker. A non-incremental run removes
/// any marker instead, since it says nothing about the new outputs.
#[instrument(level = "debug", skip_all, fields(input = %target.input.display()))]
pub fn generate_target(
    target: &GenerationTarget,
    config: &GeneratorConfig,
) -> Result<Outcome, GenerateError> {
    let inputs = [target.input.as_path()];
    let outputs = target.outputs();

    if config.incremental && !dirty::is_dirty(target.version, &inputs, &outputs) {
        info!(input = %target.input.display(), "outputs up to date");
        return Ok(Outcome::UpToDate);
    }

    let mut generator = CodeGenerator::new(config.clone());
    generator
        .set_document(&target.input)
        .map_err(|source| GenerateError::Load {
            path: target.input.clone(),
            source,
        })?;
    generator.generate_pair(&target.header, &target.source)?;

    if config.incremental {
        dirty::record(target.version, &outputs).map_err(GenerateError::Write)?;
    } else {
        dirty::clear(&outputs).map_err(GenerateError::Write)?;
    }

    info!(
        input = %target.input.display(),
        header = %target.header.display(),
        source = %target.source.display(),
        "generated"
    );
    Ok(Outcome::Generated)
}

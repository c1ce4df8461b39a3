//! Write-temp-then-rename file replacement.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use tempfile::{Builder, NamedTempFile};
use tracing::debug;

use crate::error::EmitError;

/// Fully written contents waiting in a temporary file next to their target.
///
/// Dropping a `StagedFile` without committing removes the temporary file and
/// leaves the target untouched.
pub struct StagedFile {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedFile {
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Atomically replaces the target with the staged contents.
    pub fn commit(self) -> Result<(), EmitError> {
        let StagedFile { temp, target } = self;
        temp.persist(&target)
            .map_err(|err| EmitError::io(&target, err.error))?;
        debug!(path = %target.display(), "output replaced");
        Ok(())
    }
}

/// Writes `contents` to a temporary file in the target's directory.
pub fn stage(path: &Path, contents: &[u8]) -> Result<StagedFile, EmitError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|err| EmitError::io(path, err))?;

    let existing = fs::metadata(path).ok().map(|metadata| metadata.permissions());
    let mut builder = Builder::new();
    builder.prefix(".idlgen-").suffix(".tmp");
    if existing.is_none() {
        new_file_permissions(&mut builder);
    }
    let mut temp = builder
        .tempfile_in(dir)
        .map_err(|err| EmitError::io(path, err))?;
    temp.write_all(contents)
        .and_then(|()| temp.flush())
        .map_err(|err| EmitError::io(path, err))?;
    if let Some(permissions) = existing {
        temp.as_file()
            .set_permissions(permissions)
            .map_err(|err| EmitError::io(path, err))?;
    }

    Ok(StagedFile {
        temp,
        target: path.to_path_buf(),
    })
}

/// Stages and commits in one step.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), EmitError> {
    stage(path, contents)?.commit()
}

/// Temporary files are created private. A new output gets the mode an
/// ordinary file creation would give it, so the process umask applies.
#[cfg(unix)]
fn new_file_permissions(builder: &mut Builder<'_, '_>) {
    use std::os::unix::fs::PermissionsExt;
    builder.permissions(fs::Permissions::from_mode(0o666));
}

#[cfg(not(unix))]
fn new_file_permissions(_builder: &mut Builder<'_, '_>) {}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_write_atomic_replaces_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.h");
        fs::write(&path, "old").unwrap();

        write_atomic(&path, b"new").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(entries(dir.path()), vec!["out.h".to_string()]);
    }

    #[test]
    fn test_write_atomic_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gen/include/out.h");
        write_atomic(&path, b"data").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"data");
    }

    #[test]
    fn test_uncommitted_stage_leaves_target_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.cc");
        fs::write(&path, "previous").unwrap();

        let staged = stage(&path, b"next").unwrap();
        assert_eq!(staged.target(), path.as_path());
        drop(staged);

        assert_eq!(fs::read_to_string(&path).unwrap(), "previous");
        assert_eq!(entries(dir.path()), vec!["out.cc".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_new_output_follows_umask() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let plain = dir.path().join("plain.h");
        fs::write(&plain, "data").unwrap();
        let path = dir.path().join("out.h");
        write_atomic(&path, b"data").unwrap();

        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&path), mode(&plain));
    }

    #[cfg(unix)]
    #[test]
    fn test_replaced_output_keeps_its_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("out.h");
        fs::write(&path, "old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        write_atomic(&path, b"new").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[test]
    fn test_unwritable_target_is_an_io_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();

        let err = write_atomic(&blocker.join("out.h"), b"data").unwrap_err();
        assert!(matches!(err, EmitError::Io { .. }));
    }
}

//! Decides whether outputs must be regenerated.
//!
//! Outputs are up to date only when they all exist, are strictly newer than
//! every input, and a version marker written by [`record`] matches the
//! current format version and output set. Anything that cannot be checked
//! counts as dirty.

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::SystemTime,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{error::EmitError, generators::output};

const MARKER_EXTENSION: &str = "idlgen";

/// Contents of the marker file kept next to the first output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct VersionMarker {
    version: u32,
    outputs: Vec<String>,
}

impl VersionMarker {
    fn new<P: AsRef<Path>>(version: u32, outputs: &[P]) -> Self {
        VersionMarker {
            version,
            outputs: outputs
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect(),
        }
    }
}

/// `out/shapes.cc` keeps its marker in `out/shapes.cc.idlgen`.
pub fn marker_path(first_output: &Path) -> PathBuf {
    let mut name = first_output.as_os_str().to_owned();
    name.push(".");
    name.push(MARKER_EXTENSION);
    PathBuf::from(name)
}

/// Returns true when `outputs` must be regenerated from `inputs`.
pub fn is_dirty<I, O>(version: u32, inputs: &[I], outputs: &[O]) -> bool
where
    I: AsRef<Path>,
    O: AsRef<Path>,
{
    let Some(first) = outputs.first() else {
        debug!("no outputs given, treating as dirty");
        return true;
    };

    let mut newest_input = SystemTime::UNIX_EPOCH;
    for input in inputs {
        let input = input.as_ref();
        match modified(input) {
            Ok(time) => newest_input = newest_input.max(time),
            Err(err) => {
                debug!(path = %input.display(), error = %err, "input not readable");
                return true;
            }
        }
    }

    for out in outputs {
        let out = out.as_ref();
        match modified(out) {
            Ok(time) if time > newest_input => {}
            Ok(_) => {
                debug!(path = %out.display(), "output is not newer than its inputs");
                return true;
            }
            Err(_) => {
                debug!(path = %out.display(), "output missing");
                return true;
            }
        }
    }

    let marker = marker_path(first.as_ref());
    match read_marker(&marker) {
        Ok(recorded) => {
            let expected = VersionMarker::new(version, outputs);
            if recorded != expected {
                debug!(
                    recorded = recorded.version,
                    current = version,
                    "version marker does not match"
                );
                return true;
            }
            false
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %marker.display(), "version marker missing");
            true
        }
        Err(err) => {
            warn!(path = %marker.display(), error = %err, "unreadable version marker, regenerating");
            true
        }
    }
}

/// Persists the version marker after a successful generation.
pub fn record<O: AsRef<Path>>(version: u32, outputs: &[O]) -> Result<(), EmitError> {
    let Some(first) = outputs.first() else {
        return Ok(());
    };
    let marker = marker_path(first.as_ref());
    let contents = serde_json::to_vec_pretty(&VersionMarker::new(version, outputs))
        .map_err(|err| EmitError::io(&marker, err.into()))?;
    output::write_atomic(&marker, &contents)?;
    debug!(path = %marker.display(), version, "version marker recorded");
    Ok(())
}

/// Removes the version marker, if any. Outputs regenerated without one must
/// not look current to a later incremental run.
pub fn clear<O: AsRef<Path>>(outputs: &[O]) -> Result<(), EmitError> {
    let Some(first) = outputs.first() else {
        return Ok(());
    };
    let marker = marker_path(first.as_ref());
    match fs::remove_file(&marker) {
        Ok(()) => {
            debug!(path = %marker.display(), "stale version marker removed");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(EmitError::io(&marker, err)),
    }
}

fn modified(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

fn read_marker(path: &Path) -> io::Result<VersionMarker> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(io::Error::from)
}

#[cfg(test)]
mod tests {
    use std::{fs::File, time::Duration};

    use tempfile::tempdir;

    use super::*;

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    /// Input at t, outputs at t + 10s, marker recorded.
    fn fresh_build(dir: &Path) -> (PathBuf, Vec<PathBuf>) {
        let input = dir.join("shapes.idl");
        let outputs = vec![dir.join("shapes.cc"), dir.join("shapes.h")];
        fs::write(&input, "struct A { u8 v; }").unwrap();
        let base = SystemTime::now() - Duration::from_secs(100);
        set_mtime(&input, base);
        for out in &outputs {
            fs::write(out, "// generated").unwrap();
            set_mtime(out, base + Duration::from_secs(10));
        }
        record(1, &outputs).unwrap();
        (input, outputs)
    }

    #[test]
    fn test_fresh_outputs_are_clean() {
        let dir = tempdir().unwrap();
        let (input, outputs) = fresh_build(dir.path());
        assert!(!is_dirty(1, &[input], &outputs));
    }

    #[test]
    fn test_touched_input_is_dirty() {
        let dir = tempdir().unwrap();
        let (input, outputs) = fresh_build(dir.path());
        set_mtime(&input, SystemTime::now());
        assert!(is_dirty(1, &[input], &outputs));
    }

    #[test]
    fn test_equal_mtime_is_dirty() {
        let dir = tempdir().unwrap();
        let (input, outputs) = fresh_build(dir.path());
        let output_time = modified(&outputs[0]).unwrap();
        set_mtime(&input, output_time);
        assert!(is_dirty(1, &[input], &outputs));
    }

    #[test]
    fn test_missing_output_is_dirty() {
        let dir = tempdir().unwrap();
        let (input, outputs) = fresh_build(dir.path());
        fs::remove_file(&outputs[1]).unwrap();
        assert!(is_dirty(1, &[input], &outputs));
    }

    #[test]
    fn test_missing_input_is_dirty() {
        let dir = tempdir().unwrap();
        let (input, outputs) = fresh_build(dir.path());
        fs::remove_file(&input).unwrap();
        assert!(is_dirty(1, &[input], &outputs));
    }

    #[test]
    fn test_version_mismatch_is_dirty() {
        let dir = tempdir().unwrap();
        let (input, outputs) = fresh_build(dir.path());
        assert!(is_dirty(2, &[input], &outputs));
    }

    #[test]
    fn test_missing_marker_is_dirty() {
        let dir = tempdir().unwrap();
        let (input, outputs) = fresh_build(dir.path());
        fs::remove_file(marker_path(&outputs[0])).unwrap();
        assert!(is_dirty(1, &[input], &outputs));
    }

    #[test]
    fn test_corrupt_marker_is_dirty() {
        let dir = tempdir().unwrap();
        let (input, outputs) = fresh_build(dir.path());
        fs::write(marker_path(&outputs[0]), "not json").unwrap();
        assert!(is_dirty(1, &[input], &outputs));
    }

    #[test]
    fn test_changed_output_set_is_dirty() {
        let dir = tempdir().unwrap();
        let (input, outputs) = fresh_build(dir.path());
        assert!(is_dirty(1, &[input], &outputs[..1]));
    }

    #[test]
    fn test_no_outputs_is_dirty() {
        let dir = tempdir().unwrap();
        let (input, _) = fresh_build(dir.path());
        let none: [PathBuf; 0] = [];
        assert!(is_dirty(1, &[input], &none));
    }

    #[test]
    fn test_cleared_marker_is_dirty() {
        let dir = tempdir().unwrap();
        let (input, outputs) = fresh_build(dir.path());
        clear(&outputs).unwrap();
        assert!(!marker_path(&outputs[0]).exists());
        assert!(is_dirty(1, &[input], &outputs));
        clear(&outputs).unwrap();
    }

    #[test]
    fn test_marker_path() {
        assert_eq!(
            marker_path(Path::new("out/shapes.cc")),
            PathBuf::from("out/shapes.cc.idlgen")
        );
    }
}

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    process::Command,
    time::{Duration, SystemTime},
};

use idlgen::{
    CodeGenerator, GenerationTarget, GeneratorConfig, LoadError, Outcome, VERSION, dirty,
    generate, generate_target,
    generators::{Emitter, HeaderEmitter, SourceEmitter, symbols},
    loader::{load, load_str},
};
use tempfile::tempdir;

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/shapes.idl")
}

fn set_mtime(path: &Path, time: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

#[test]
fn vec2_end_to_end() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("vec2.idl");
    fs::write(&input, "struct Vec2 { float x; float y; }").unwrap();
    let out_src = dir.path().join("vec2.cc");
    let out_hdr = dir.path().join("vec2.h");

    assert_eq!(generate(&input, &out_src, &out_hdr).unwrap(), Outcome::Generated);

    let header = fs::read_to_string(&out_hdr).unwrap();
    let x = header.find("    float x{};").unwrap();
    let y = header.find("    float y{};").unwrap();
    assert!(header.contains("struct Vec2 {"));
    assert!(x < y);

    let source = fs::read_to_string(&out_src).unwrap();
    assert!(source.contains("#include \"vec2.h\""));
    let body = &source[source.find("void Serialize(const Vec2& value").unwrap()..];
    let x = body.find("WriteValue(value.x, out);").unwrap();
    let y = body.find("WriteValue(value.y, out);").unwrap();
    assert!(x < y);
}

#[test]
fn forward_reference_resolves() {
    let document = load_str("fwd.idl", "struct B { A a; } struct A { u8 v; }").unwrap();
    let order: Vec<&str> = document.composites_by_dependency().map(|c| c.name).collect();
    assert_eq!(order, vec!["A", "B"]);
}

#[test]
fn duplicate_point_is_rejected() {
    let err = load_str(
        "dup.idl",
        "struct Point { i32 x; }\nstruct Point { i32 y; }",
    )
    .unwrap_err();
    match err {
        LoadError::DuplicateDeclaration {
            name,
            location,
            previous,
        } => {
            assert_eq!(name, "Point");
            assert_eq!(location.line, 2);
            assert_eq!(previous.line, 1);
        }
        other => panic!("expected a duplicate declaration, got {other:?}"),
    }
}

#[test]
fn unknown_type_is_rejected() {
    let err = load_str("bad.idl", "struct S {\n    Unknown value;\n}").unwrap_err();
    match err {
        LoadError::UnresolvedReference { name, location } => {
            assert_eq!(name, "Unknown");
            assert_eq!(location.line, 2);
        }
        other => panic!("expected an unresolved reference, got {other:?}"),
    }
}

#[test]
fn circular_dependency() {
    let source = "
    struct Header {
        User tag;
    }

    message User {
        Header hdr;
    }
    ";
    let err = load_str("cycle.idl", source).unwrap_err();
    assert!(matches!(err, LoadError::CircularDependency { .. }));
}

#[test]
fn source_references_only_header_symbols() {
    let document = load(fixture()).unwrap();
    let header = HeaderEmitter::default().render(&document);
    let source = SourceEmitter::default().render(&document);

    for symbol in symbols::declared_symbols(&document) {
        assert!(header.contains(&symbol), "header lacks {symbol}");
    }
    for composite in document.composites() {
        let definition = format!("{} {{", symbols::serialize_signature(composite.name));
        assert!(source.contains(&definition), "source lacks {definition}");
        assert!(header.contains(&format!("{};", symbols::serialize_signature(composite.name))));
    }
    for service in document.services() {
        for method in &service.methods {
            let constant = format!("{}::{}", service.name, symbols::method_id_constant(method));
            assert!(source.contains(&constant));
            assert!(header.contains(&symbols::method_id_constant(method)));
        }
    }
}

#[test]
fn emission_is_deterministic() {
    let dir = tempdir().unwrap();
    let mut generator = CodeGenerator::default();
    generator.set_document(fixture()).unwrap();

    let header = dir.path().join("shapes.h");
    let source = dir.path().join("shapes.cc");
    generator.generate_header(&header).unwrap();
    generator.generate_source(&source).unwrap();
    let first = (fs::read(&header).unwrap(), fs::read(&source).unwrap());

    generator.generate_header(&header).unwrap();
    generator.generate_source(&source).unwrap();
    let second = (fs::read(&header).unwrap(), fs::read(&source).unwrap());

    assert_eq!(first, second);
}

#[test]
fn dirty_checker_flips_after_touching_input() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("shapes.idl");
    fs::copy(fixture(), &input).unwrap();
    set_mtime(&input, SystemTime::now() - Duration::from_secs(60));

    let target = GenerationTarget::new(
        &input,
        dir.path().join("shapes.cc"),
        dir.path().join("shapes.h"),
    );
    let config = GeneratorConfig {
        incremental: true,
        ..GeneratorConfig::default()
    };
    assert_eq!(generate_target(&target, &config).unwrap(), Outcome::Generated);

    let outputs = [&target.source, &target.header];
    assert!(!dirty::is_dirty(VERSION, &[&input], &outputs));

    set_mtime(&input, SystemTime::now() + Duration::from_secs(60));
    assert!(dirty::is_dirty(VERSION, &[&input], &outputs));
    assert_eq!(generate_target(&target, &config).unwrap(), Outcome::Generated);
}

#[test]
fn outputs_leave_no_temporary_files() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("gen");
    generate(fixture(), out.join("shapes.cc"), out.join("shapes.h")).unwrap();

    let mut names: Vec<String> = fs::read_dir(&out)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["shapes.cc".to_string(), "shapes.h".to_string()]);
}

#[test]
fn compile_cpp() {
    if Command::new("g++").arg("--version").output().is_err() {
        eprintln!("g++ not found, skipping");
        return;
    }

    let dir = tempdir().unwrap();
    let header = dir.path().join("shapes.h");
    let source = dir.path().join("shapes.cc");
    generate(fixture(), &source, &header).unwrap();

    let binary = dir.path().join("use");
    let output = Command::new("g++")
        .arg("-std=c++17")
        .arg("-Wall")
        .arg("-I")
        .arg(dir.path())
        .arg(Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/use.cpp"))
        .arg(&source)
        .arg("-o")
        .arg(&binary)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "g++ failed:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let run = Command::new(&binary).output().unwrap();
    assert!(
        run.status.success(),
        "generated code failed its checks:\n{}",
        String::from_utf8_lossy(&run.stderr)
    );
}

#[test]
fn compile_cpp_with_split_layout() {
    if Command::new("g++").arg("--version").output().is_err() {
        eprintln!("g++ not found, skipping");
        return;
    }

    let dir = tempdir().unwrap();
    let header = dir.path().join("include/geo/shapes.hpp");
    let source = dir.path().join("src/shapes.cc");
    generate(fixture(), &source, &header).unwrap();

    let output = Command::new("g++")
        .arg("-std=c++17")
        .arg("-Wall")
        .arg("-c")
        .arg(&source)
        .arg("-o")
        .arg(dir.path().join("shapes.o"))
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "g++ failed:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
}

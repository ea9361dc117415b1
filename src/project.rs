//! Turns a `.vm` file or a directory of them into one `.asm` file.

use std::{
    ffi::OsStr,
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};

use log::debug;

use crate::error::{ProjectError, TranslateError};
use crate::parser;
use crate::translator::{Translator, TranslatorConfig};
use crate::VmFile;

/// The files of one program and where its assembly goes by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Sources in translation order.
    pub files: Vec<PathBuf>,
    pub output: PathBuf,
    /// `Sys.init` when the directory holds a `Sys.vm`.
    pub init_function: Option<String>,
}

fn stem(path: &Path) -> Result<&str, ProjectError> {
    path.file_stem()
        .and_then(OsStr::to_str)
        .ok_or_else(|| ProjectError::InvalidName(path.to_path_buf()))
}

impl Project {
    /// A single file writes `<file>.asm` beside it; a directory writes `<dir>/<dir>.asm`.
    pub fn discover(input: &Path) -> Result<Self, ProjectError> {
        if !input.is_dir() {
            return Ok(Project {
                files: vec![input.to_path_buf()],
                output: input.with_extension("asm"),
                init_function: None,
            });
        }

        let io = |source| ProjectError::Io {
            path: input.to_path_buf(),
            source,
        };
        let mut files = vec![];
        for entry in fs::read_dir(input).map_err(io)? {
            let path = entry.map_err(io)?.path();
            if path.extension() == Some(OsStr::new("vm")) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(ProjectError::NoSources(input.to_path_buf()));
        }
        files.sort();

        let init_function = files
            .iter()
            .any(|f| f.file_stem() == Some(OsStr::new("Sys")))
            .then(|| "Sys.init".to_string());
        let dir = input.canonicalize().map_err(io)?;
        let output = input.join(format!("{}.asm", stem(&dir)?));

        Ok(Project {
            files,
            output,
            init_function,
        })
    }
}

/// Reads and parses one source file.
pub fn load(path: &Path) -> Result<VmFile, ProjectError> {
    let data = fs::read_to_string(path).map_err(|source| ProjectError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let commands = parser::parse(&data).map_err(|source| ProjectError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(VmFile {
        stem: stem(path)?.to_string(),
        commands,
    })
}

/// Removes a half-written output so a failed run leaves nothing behind.
fn discard_on_error<T>(
    result: Result<T, TranslateError>,
    output: &Path,
) -> Result<T, ProjectError> {
    result.map_err(|source| {
        let _ = fs::remove_file(output);
        ProjectError::Write {
            path: output.to_path_buf(),
            source,
        }
    })
}

/// Translates every file of `project` and writes the program to `output`.
///
/// The output is only created once all files translated. Returns the number of lines written.
pub fn build(
    project: &Project,
    config: TranslatorConfig,
    output: &Path,
) -> Result<usize, ProjectError> {
    let mut translator = Translator::new(config);
    for path in &project.files {
        let file = load(path)?;
        translator.set_file_name(&file.stem);
        translator
            .translate(&file.commands)
            .map_err(|source| ProjectError::Translate {
                path: path.clone(),
                source,
            })?;
    }

    let lines = translator.lines().len();
    let outfile = File::create(output).map_err(|source| ProjectError::Io {
        path: output.to_path_buf(),
        source,
    })?;
    discard_on_error(translator.write_to(BufWriter::new(outfile)), output)?;
    debug!("wrote {} lines to {}", lines, output.display());
    Ok(lines)
}

#[cfg(test)]
fn scratch_dir(name: &str) -> PathBuf {
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir()
        .join(format!("vmtrans_{}_{}", std::process::id(), id))
        .join(name);
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_empty_directory() {
    let dir = scratch_dir("Empty");
    fs::write(dir.join("notes.txt"), "push constant 1").unwrap();
    assert!(matches!(
        Project::discover(&dir),
        Err(ProjectError::NoSources(_))
    ));
}

#[test]
fn test_single_file() {
    let dir = scratch_dir("Single");
    let source = dir.join("Add.vm");
    let project = Project::discover(&source).unwrap();
    assert_eq!(project.files, vec![source]);
    assert_eq!(project.output, dir.join("Add.asm"));
    assert_eq!(project.init_function, None);
}

#[test]
fn test_directory() {
    let dir = scratch_dir("Prog");
    for name in ["Sys.vm", "Main.vm", "Array.vm", "README.md"] {
        fs::write(dir.join(name), "").unwrap();
    }
    let project = Project::discover(&dir).unwrap();
    assert_eq!(
        project.files,
        vec![dir.join("Array.vm"), dir.join("Main.vm"), dir.join("Sys.vm")]
    );
    assert_eq!(project.output, dir.join("Prog.asm"));
    assert_eq!(project.init_function.as_deref(), Some("Sys.init"));

    let dir = scratch_dir("NoSys");
    fs::write(dir.join("Main.vm"), "").unwrap();
    assert_eq!(Project::discover(&dir).unwrap().init_function, None);
}

#[test]
fn test_build_directory() {
    let dir = scratch_dir("Prog");
    fs::write(dir.join("Main.vm"), "function Main.main 0\npush constant 1\nreturn\n").unwrap();
    fs::write(
        dir.join("Sys.vm"),
        "function Sys.init 0\ncall Main.main 0\nlabel HALT\ngoto HALT\n",
    )
    .unwrap();

    let project = Project::discover(&dir).unwrap();
    let config = TranslatorConfig {
        init_function: project.init_function.clone(),
        comments: false,
        ..TranslatorConfig::default()
    };
    let lines = build(&project, config, &project.output).unwrap();

    let asm = fs::read_to_string(&project.output).unwrap();
    assert_eq!(asm.lines().count(), lines);
    assert!(asm.starts_with("@256\nD=A\n@SP\nM=D\n@Sys.init$ret.0\n"));
    let main = asm.find("(Main.main)").unwrap();
    let sys = asm.find("(Sys.init)").unwrap();
    assert!(main < sys);
}

#[test]
fn test_failed_build_writes_nothing() {
    let dir = scratch_dir("Bad");
    fs::write(dir.join("Bad.vm"), "push constant 1\npop constant 0\n").unwrap();
    let project = Project::discover(&dir).unwrap();
    let err = build(&project, TranslatorConfig::default(), &project.output).unwrap_err();
    assert!(matches!(
        err,
        ProjectError::Translate {
            source: TranslateError::ProtocolPrecondition { index: 1, .. },
            ..
        }
    ));
    assert!(!project.output.exists());

    fs::write(dir.join("Bad.vm"), "push heap 1\n").unwrap();
    let err = build(&project, TranslatorConfig::default(), &project.output).unwrap_err();
    assert!(matches!(err, ProjectError::Parse { .. }));
    assert!(!project.output.exists());
}

#[test]
fn test_write_failure_removes_output() {
    let dir = scratch_dir("Sink");
    let output = dir.join("Sink.asm");
    fs::write(&output, "@256\n").unwrap();
    let failed: Result<(), TranslateError> = Err(TranslateError::Sink(std::io::Error::new(
        std::io::ErrorKind::Other,
        "disk full",
    )));
    assert!(matches!(
        discard_on_error(failed, &output),
        Err(ProjectError::Write { .. })
    ));
    assert!(!output.exists());
}

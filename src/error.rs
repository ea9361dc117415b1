use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: invalid command '{text}'")]
    InvalidLine { line: usize, text: String },
}

/// What went wrong with a single command, before the run attaches its position.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Violation {
    #[error("{0}")]
    Malformed(String),
    #[error("{0}")]
    Precondition(String),
}

impl Violation {
    pub fn at(self, index: usize, command: &crate::ast::Command) -> TranslateError {
        let command = command.to_string();
        match self {
            Violation::Malformed(reason) => TranslateError::MalformedCommand {
                index,
                command,
                reason,
            },
            Violation::Precondition(reason) => TranslateError::ProtocolPrecondition {
                index,
                command,
                reason,
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("malformed command #{index} '{command}': {reason}")]
    MalformedCommand {
        index: usize,
        command: String,
        reason: String,
    },
    #[error("command #{index} '{command}' violates the calling protocol: {reason}")]
    ProtocolPrecondition {
        index: usize,
        command: String,
        reason: String,
    },
    #[error("could not write assembly: {0}")]
    Sink(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("cannot access {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("no .vm files found in {}", .0.display())]
    NoSources(PathBuf),
    #[error("invalid file name: {}", .0.display())]
    InvalidName(PathBuf),
    #[error("{}: {source}", path.display())]
    Parse { path: PathBuf, source: ParseError },
    #[error("{}: {source}", path.display())]
    Translate {
        path: PathBuf,
        source: TranslateError,
    },
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: TranslateError,
    },
}

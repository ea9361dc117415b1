//! Translates stack VM commands into Hack assembly.
//!
//! [`parser::parse`] classifies VM source lines into [`ast::Command`]s and
//! [`translator::Translator`] turns them into assembly text, one line per
//! instruction, ready for a symbolic Hack assembler.

pub mod ast;
pub mod error;
pub mod parser;
pub mod project;
pub mod translator;

use crate::ast::Command;
use crate::error::TranslateError;
use crate::translator::{Translator, TranslatorConfig};

/// One parsed VM source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmFile {
    /// Short name qualifying the file's static variables.
    pub stem: String,
    pub commands: Vec<Command>,
}

/// Translates every file, in order, into a single assembly program.
pub fn translate_files(
    files: &[VmFile],
    config: TranslatorConfig,
) -> Result<Vec<String>, TranslateError> {
    let mut translator = Translator::new(config);
    for file in files {
        translator.set_file_name(&file.stem);
        translator.translate(&file.commands)?;
    }
    Ok(translator.finish())
}

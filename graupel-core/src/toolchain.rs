use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::{analyzer, codegen, parser, tokens};

/// Translate Snowball source text into the text of a Python module that
/// exposes one function per `externals` name.
pub fn translate_string(source: &str) -> Result<String> {
    tokens::tokenize(source)
        .and_then(parser::parse)
        .and_then(|unit| {
            analyzer::analyze(&unit).and_then(|analysis| codegen::generate(&unit, &analysis))
        })
}

/// Read a UTF-8 Snowball source file and translate it.
pub fn translate_file(path: impl AsRef<Path>) -> Result<String> {
    let source = fs::read_to_string(path)?;
    translate_string(&source)
}

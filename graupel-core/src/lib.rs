mod analyzer;
mod codegen;
mod parser;
mod tests;
mod tokens;

pub mod error;
pub mod toolchain;

pub use error::{Error, Phase};
pub use toolchain::{translate_file, translate_string};

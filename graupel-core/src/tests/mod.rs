mod analyzer;
mod parser;
mod tokens;

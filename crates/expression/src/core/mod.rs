//! Core building blocks shared by the lexer, parser and evaluator.

pub mod ast;
pub mod span;
pub mod token;

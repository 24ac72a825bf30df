/// gridc - static checker for a two-dimensional stack language
///
/// This crate implements the checking stage that runs after the grid
/// traverser has flattened each function into linear IR:
/// - IR and declaration model
/// - A textual listing format and its parser
/// - Abstract interpretation of every function body against its signature

pub mod ir;
pub mod parser;
pub mod typechecker;

pub use ir::{FnBody, FnDecl, Instruction, Program, TypeDecl, TypeSig};
pub use typechecker::{check, CheckError, CheckErrorKind, CheckResult, TypeChecker};

/// Static checker for linear IR
///
/// This module implements abstract interpretation over function bodies:
/// - A type model with unions, variadic regions and generics
/// - Stack effects for every builtin, function and aggregate accessor
/// - A symbolic stack machine exploring every control-flow path
/// - Widening at labels so loops converge

pub mod types;
pub mod matching;
pub mod unification;
pub mod effects;
pub mod signatures;
pub mod machine;
pub mod checker;
pub mod errors;


pub use checker::{check, CheckerOptions, TypeChecker};
pub use effects::{Effect, StaticEffect};
pub use errors::{CheckError, CheckErrorKind, CheckResult};
pub use signatures::{GenericCounter, SignatureTable};
pub use types::{AbstractStack, Type};

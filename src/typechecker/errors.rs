/**
Error types for the checker

Every check aborts on the first error. A `CheckError` names the function
or operation that failed and, once it reaches the program level, the
location of the declaration being checked.
*/

use crate::ir::Span;
use crate::typechecker::types::GenericId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CheckErrorKind {
    #[error("Expected '{expected}', got nothing")]
    StackUnderflow { expected: String },

    #[error("Expected '{expected}', got '{got}'")]
    TypeMismatch { expected: String, got: String },

    #[error("Call to undefined function '{callee}'")]
    UndefinedFunction { callee: String },

    #[error("Jump to undefined label '{label}'")]
    UndefinedLabel { label: String },

    #[error("Unresolved generic '{id}'")]
    UnresolvedGeneric { id: GenericId },

    #[error("Invalid type '{type_name}'")]
    InvalidType { type_name: String },

    #[error("Field '{field}' expected '{expected}', got '{got}'")]
    FieldMismatch {
        field: String,
        expected: String,
        got: String,
    },

    #[error("Got empty stack")]
    EmptyStack,

    #[error("Generics aren't allowed at type-level")]
    GenericField,

    #[error("'{declared}' is already declared")]
    DuplicateDeclaration { declared: String },

    #[error("Expected to return '{expected}', got nothing")]
    MissingReturn { expected: String },

    #[error("Expected to return '{expected}', got '{got}'")]
    ReturnMismatch { expected: String, got: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("In function {name}: {kind}")]
pub struct CheckError {
    pub name: String,
    pub kind: CheckErrorKind,
    pub span: Option<Span>,
}

impl CheckError {
    pub fn new(name: &str, kind: CheckErrorKind) -> Self {
        CheckError {
            name: name.to_string(),
            kind,
            span: None,
        }
    }

    /// Attach a location unless a more precise one is already present
    pub fn at(mut self, span: Option<Span>) -> Self {
        if self.span.is_none() {
            self.span = span;
        }
        self
    }

    pub fn underflow(name: &str, expected: impl ToString) -> Self {
        CheckError::new(
            name,
            CheckErrorKind::StackUnderflow {
                expected: expected.to_string(),
            },
        )
    }

    pub fn mismatch(name: &str, expected: impl ToString, got: impl ToString) -> Self {
        CheckError::new(
            name,
            CheckErrorKind::TypeMismatch {
                expected: expected.to_string(),
                got: got.to_string(),
            },
        )
    }
}

/// Result type for checker operations
pub type CheckResult<T> = Result<T, CheckError>;

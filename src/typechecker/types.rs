/**
Abstract values and abstract stacks

A `Type` approximates one runtime value; an `AbstractStack` approximates
the whole operand stack. Stacks are stored bottom first, so the top of the
stack is the last element.
*/

use crate::ir::Instruction;
use std::fmt;
use std::mem;
use std::rc::Rc;

/// Identity of a type variable, unique to one signature instantiation
pub type GenericId = u32;

/// Compile-time approximation of the operand stack (top is the last element)
pub type AbstractStack = Vec<Type>;

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Int,
    Float,
    Char,

    /// Boolean, with its literal value when statically known
    Bool(Option<bool>),

    String,

    /// Stack value, with its element types when statically known
    Stack(Option<Vec<Type>>),

    /// Subroutine value, with its body when statically known
    Function(Option<Rc<Vec<Instruction>>>),

    Opaque,
    Generic(GenericId),

    /// Zero or more values of the inner type, below this point
    Many(Box<Type>),

    /// One of several alternatives; build through `collapse_union`
    Union(Vec<Type>),

    /// Matches and is matched by anything
    Liquid,

    /// Declared aggregate, compared by name
    User(String),
}

impl Type {
    pub fn bool() -> Self {
        Type::Bool(None)
    }

    pub fn bool_lit(value: bool) -> Self {
        Type::Bool(Some(value))
    }

    pub fn stack() -> Self {
        Type::Stack(None)
    }

    pub fn stack_of(elements: Vec<Type>) -> Self {
        Type::Stack(Some(elements))
    }

    pub fn function() -> Self {
        Type::Function(None)
    }

    pub fn many(inner: Type) -> Self {
        Type::Many(Box::new(inner))
    }

    pub fn user(name: &str) -> Self {
        Type::User(name.to_string())
    }

    pub fn is_many(&self) -> bool {
        matches!(self, Type::Many(_))
    }

    /// Strip any `Many` wrappers
    pub fn innermost(&self) -> &Type {
        let mut ty = self;
        while let Type::Many(inner) = ty {
            ty = inner;
        }
        ty
    }

    pub fn same_kind(&self, other: &Type) -> bool {
        mem::discriminant(self) == mem::discriminant(other)
    }

    /// Does `id` occur anywhere inside this type?
    pub fn mentions_generic(&self, id: GenericId) -> bool {
        match self {
            Type::Generic(g) => *g == id,
            Type::Many(inner) => inner.mentions_generic(id),
            Type::Stack(Some(elements)) | Type::Union(elements) => {
                elements.iter().any(|t| t.mentions_generic(id))
            }
            _ => false,
        }
    }

    /// Collect every generic identity occurring in this type
    pub fn collect_generics(&self, out: &mut Vec<GenericId>) {
        match self {
            Type::Generic(id) => {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
            Type::Many(inner) => inner.collect_generics(out),
            Type::Stack(Some(elements)) | Type::Union(elements) => {
                for t in elements {
                    t.collect_generics(out);
                }
            }
            _ => {}
        }
    }

    /// Replace every occurrence of generic `id` with `with`
    pub fn substitute(&mut self, id: GenericId, with: &Type) {
        match self {
            Type::Generic(g) if *g == id => *self = with.clone(),
            Type::Many(inner) => inner.substitute(id, with),
            Type::Stack(Some(elements)) | Type::Union(elements) => {
                for t in elements.iter_mut() {
                    t.substitute(id, with);
                }
            }
            _ => {}
        }
    }

    /// Structural equivalence; union members compare as sets
    ///
    /// This is the "did anything change" test used by convergence, so it is
    /// stricter than matching.
    pub fn equivalent(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Bool(a), Type::Bool(b)) => a == b,
            (Type::Stack(a), Type::Stack(b)) => match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => stacks_equivalent(a, b),
                _ => false,
            },
            (Type::Function(a), Type::Function(b)) => match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => Rc::ptr_eq(a, b) || a == b,
                _ => false,
            },
            (Type::Generic(a), Type::Generic(b)) => a == b,
            (Type::Many(a), Type::Many(b)) => a.equivalent(b),
            (Type::Union(a), Type::Union(b)) => {
                a.len() == b.len()
                    && a.iter().all(|x| b.iter().any(|y| x.equivalent(y)))
                    && b.iter().all(|y| a.iter().any(|x| x.equivalent(y)))
            }
            (Type::User(a), Type::User(b)) => a == b,
            _ => self.same_kind(other),
        }
    }
}

pub fn stacks_equivalent(a: &[Type], b: &[Type]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equivalent(y))
}

/// Pop the top of an abstract stack
///
/// A `Many` on top stands for an unknown number of values, so it yields
/// its element type and stays in place.
pub fn stack_pop(stack: &mut AbstractStack) -> Option<Type> {
    match stack.last() {
        None => None,
        Some(Type::Many(inner)) => Some(inner.innermost().clone()),
        Some(_) => stack.pop(),
    }
}

/// Render a stack top first, e.g. `[int, string]` has `int` on top
pub fn show_stack(stack: &[Type]) -> String {
    let items: Vec<String> = stack.iter().rev().map(|t| t.to_string()).collect();
    format!("[{}]", items.join(", "))
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Char => write!(f, "char"),
            Type::Bool(None) => write!(f, "bool"),
            Type::Bool(Some(value)) => write!(f, "bool({})", value),
            Type::String => write!(f, "string"),
            Type::Stack(None) => write!(f, "stack"),
            Type::Stack(Some(elements)) => write!(f, "stack({})", show_stack(elements)),
            Type::Function(None) => write!(f, "function"),
            Type::Function(Some(_)) => write!(f, "function(...)"),
            Type::Opaque => write!(f, "opaque"),
            Type::Generic(id) => write!(f, "generic({})", id),
            Type::Many(inner) => write!(f, "...{}", inner),
            Type::Union(options) => write!(f, "union{}", show_stack(options)),
            Type::Liquid => write!(f, "liquid"),
            Type::User(name) => write!(f, "{}", name),
        }
    }
}

/**
Operation effects

An `Effect` is the static meaning of one operation name. Most operations
have a fixed take/leave contract (`StaticEffect`). The rest depend on the
content of a known stack value, fold boolean literals, or re-enter the
stack machine to run a subroutine body.
*/

use crate::ir::Instruction;
use crate::typechecker::errors::{CheckError, CheckErrorKind, CheckResult};
use crate::typechecker::machine::Machine;
use crate::typechecker::matching::{is_matching, Resolution};
use crate::typechecker::types::{show_stack, stack_pop, AbstractStack, GenericId, Type};
use crate::typechecker::unification::{merge_stacks, unify};
use std::fmt;
use std::rc::Rc;

/// A fixed take/leave contract
///
/// Both lists are bottom first: the last element of `takes` is matched
/// against the top of the stack.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticEffect {
    pub takes: Vec<Type>,
    pub leaves: Vec<Type>,

    /// Element type of a trailing `...` argument; the rest of the stack is consumed
    pub ellipsis: Option<Type>,

    /// Field names parallel to `takes`, for aggregate constructors and setters
    pub fields: Vec<Option<String>>,
}

impl StaticEffect {
    pub fn new(takes: Vec<Type>, leaves: Vec<Type>) -> Self {
        StaticEffect {
            takes,
            leaves,
            ellipsis: None,
            fields: Vec::new(),
        }
    }

    pub fn with_ellipsis(mut self, element: Type) -> Self {
        self.ellipsis = Some(element);
        self
    }

    pub fn with_fields(mut self, fields: Vec<Option<String>>) -> Self {
        self.fields = fields;
        self
    }

    fn own_generics(&self) -> Vec<GenericId> {
        let mut ids = Vec::new();
        for ty in self.takes.iter().chain(&self.leaves).chain(&self.ellipsis) {
            ty.collect_generics(&mut ids);
        }
        ids
    }

    pub fn apply(&self, name: &str, stack: &mut AbstractStack) -> CheckResult<()> {
        let ours = self.own_generics();
        let mut takes = self.takes.clone();
        let mut leaves = self.leaves.clone();
        let mut ellipsis = self.ellipsis.clone();

        for i in (0..takes.len()).rev() {
            let expect = takes[i].clone();
            let got = stack
                .last()
                .ok_or_else(|| CheckError::underflow(name, &expect))?;

            let mut resolved = Resolution::new();
            if !is_matching(got, &expect, Some(&mut resolved)) {
                return Err(match self.fields.get(i) {
                    Some(Some(field)) => CheckError::new(
                        name,
                        CheckErrorKind::FieldMismatch {
                            field: field.clone(),
                            expected: expect.to_string(),
                            got: got.to_string(),
                        },
                    ),
                    _ => CheckError::mismatch(name, &expect, got),
                });
            }

            for (id, ty) in &resolved {
                for t in takes.iter_mut().chain(leaves.iter_mut()).chain(ellipsis.iter_mut()) {
                    t.substitute(*id, ty);
                }
            }

            stack_pop(stack);
        }

        if let Some(element) = ellipsis {
            // Everything left is bound to the rest parameter
            let mut resolved = Resolution::new();
            for got in stack.iter() {
                if !is_matching(got, &element, Some(&mut resolved)) {
                    return Err(CheckError::mismatch(name, &element, got));
                }
            }
            for (id, ty) in &resolved {
                for t in leaves.iter_mut() {
                    t.substitute(*id, ty);
                }
            }
            stack.clear();
        }

        if let Some(id) = ours
            .iter()
            .find(|id| leaves.iter().any(|t| t.mentions_generic(**id)))
        {
            return Err(CheckError::new(
                name,
                CheckErrorKind::UnresolvedGeneric { id: *id },
            ));
        }

        stack.extend(leaves);
        Ok(())
    }
}

impl fmt::Display for StaticEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", show_stack(&self.takes))?;
        if let Some(element) = &self.ellipsis {
            write!(f, " ...{}", element)?;
        }
        write!(f, " -> {}", show_stack(&self.leaves))
    }
}

/// The static semantics of one operation name
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Static(StaticEffect),

    /// `+ - * / %`: int op int is int, anything with a float is float
    Arith,
    /// `< > <= >=`: two numbers to a bool
    Compare,
    /// `= !=`: any two values to a bool
    Equal,
    And,
    Or,
    Not,

    /// Box the whole stack into one stack value
    BoxStack,
    /// Push a value onto a stack value
    Insert,
    /// Read the top (`fst`) or bottom (`lst`) of a stack value, optionally removing it
    Fetch { top: bool, remove: bool },
    Concat,
    Len,
    Reverse,
    Null,
    /// Spill a stack value onto the operand stack
    Flatten,

    /// Run a subroutine value on the current stack
    Apply,
    /// Like `Apply`, keeping the value stored beneath the subroutine
    Tail,
    /// Run a subroutine a counted number of times
    Repeat,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Static(effect) => write!(f, "{}", effect),
            other => write!(f, "<{:?}>", other),
        }
    }
}

/// Pop `expected` (bottom first) off the stack, returning what was popped top first
fn ensure(stack: &mut AbstractStack, expected: &[Type], name: &str) -> CheckResult<Vec<Type>> {
    let mut got = Vec::with_capacity(expected.len());
    for expect in expected.iter().rev() {
        let top = stack
            .last()
            .ok_or_else(|| CheckError::underflow(name, expect))?;
        if !is_matching(top, expect, None) {
            return Err(CheckError::mismatch(name, expect, top));
        }
        if let Some(ty) = stack_pop(stack) {
            got.push(ty);
        }
    }
    Ok(got)
}

fn number() -> Type {
    Type::Union(vec![Type::Int, Type::Float])
}

#[derive(Clone, Copy, PartialEq)]
enum Numeric {
    Int,
    Float,
    Either,
}

fn pop_number(stack: &mut AbstractStack, name: &str) -> CheckResult<Numeric> {
    let top = stack
        .last()
        .ok_or_else(|| CheckError::underflow(name, "int | float"))?;
    let kind = match (is_matching(top, &Type::Int, None), is_matching(top, &Type::Float, None)) {
        (true, false) => Numeric::Int,
        (false, true) => Numeric::Float,
        (true, true) => Numeric::Either,
        (false, false) => return Err(CheckError::mismatch(name, "int | float", top)),
    };
    stack_pop(stack);
    Ok(kind)
}

fn pop_bool(stack: &mut AbstractStack, name: &str) -> CheckResult<Option<bool>> {
    let top = stack
        .last()
        .ok_or_else(|| CheckError::underflow(name, "bool"))?;
    if !is_matching(top, &Type::bool(), None) {
        return Err(CheckError::mismatch(name, "bool", top));
    }
    match stack_pop(stack) {
        Some(Type::Bool(value)) => Ok(value),
        _ => Ok(None),
    }
}

fn known_body(ty: &Type) -> Option<Rc<Vec<Instruction>>> {
    match ty {
        Type::Function(Some(body)) => Some(Rc::clone(body)),
        _ => None,
    }
}

impl Effect {
    pub fn apply(&self, name: &str, machine: &mut Machine<'_>, stack: &mut AbstractStack) -> CheckResult<()> {
        match self {
            Effect::Static(effect) => effect.apply(name, stack),

            Effect::Arith => {
                let first = pop_number(stack, name)?;
                let second = pop_number(stack, name)?;
                let result = match (first, second) {
                    (Numeric::Int, Numeric::Int) => Type::Int,
                    (Numeric::Float, _) | (_, Numeric::Float) => Type::Float,
                    _ => number(),
                };
                stack.push(result);
                Ok(())
            }

            Effect::Compare => {
                ensure(stack, &[number(), number()], name)?;
                stack.push(Type::bool());
                Ok(())
            }

            Effect::Equal => {
                ensure(stack, &[Type::Liquid, Type::Liquid], name)?;
                stack.push(Type::bool());
                Ok(())
            }

            Effect::And | Effect::Or => {
                let right = pop_bool(stack, name)?;
                let left = pop_bool(stack, name)?;
                let folded = match (left, right) {
                    (Some(l), Some(r)) if *self == Effect::And => Some(l && r),
                    (Some(l), Some(r)) => Some(l || r),
                    _ => None,
                };
                stack.push(Type::Bool(folded));
                Ok(())
            }

            Effect::Not => {
                let value = pop_bool(stack, name)?;
                stack.push(Type::Bool(value.map(|b| !b)));
                Ok(())
            }

            Effect::BoxStack => {
                let boxed = Type::stack_of(std::mem::take(stack));
                stack.push(boxed);
                Ok(())
            }

            Effect::Insert => {
                let mut args = ensure(stack, &[Type::stack(), Type::Liquid], name)?;
                let value = args.remove(0);
                let mut target = args.remove(0);
                if let Type::Stack(Some(elements)) = &mut target {
                    elements.push(value);
                }
                stack.push(target);
                Ok(())
            }

            Effect::Fetch { top, remove } => {
                let elements = match ensure(stack, &[Type::stack()], name)?.remove(0) {
                    Type::Stack(Some(elements)) => elements,
                    other => {
                        stack.push(other);
                        stack.push(Type::Liquid);
                        return Ok(());
                    }
                };
                if elements.is_empty() {
                    return Err(CheckError::new(name, CheckErrorKind::EmptyStack));
                }

                let mut list = elements.clone();
                if !*top {
                    list.reverse();
                }
                let elem = stack_pop(&mut list).unwrap_or(Type::Liquid);
                let remaining = match (*remove, *top) {
                    (false, _) => elements,
                    (true, true) => list,
                    (true, false) => list.into_iter().rev().collect(),
                };
                stack.push(Type::stack_of(remaining));
                stack.push(elem);
                Ok(())
            }

            Effect::Concat => {
                let args = ensure(stack, &[Type::stack(), Type::stack()], name)?;
                match (&args[0], &args[1]) {
                    // The upper stack's elements end up on top
                    (Type::Stack(Some(upper)), Type::Stack(Some(lower))) => {
                        let mut joined = lower.clone();
                        joined.extend(upper.iter().cloned());
                        stack.push(Type::stack_of(joined));
                    }
                    _ => stack.push(Type::stack()),
                }
                Ok(())
            }

            Effect::Len => {
                let target = ensure(stack, &[Type::stack()], name)?.remove(0);
                stack.push(target);
                stack.push(Type::Int);
                Ok(())
            }

            Effect::Reverse => {
                let target = ensure(stack, &[Type::stack()], name)?.remove(0);
                match target {
                    Type::Stack(Some(mut elements)) => {
                        elements.reverse();
                        stack.push(Type::stack_of(elements));
                    }
                    other => stack.push(other),
                }
                Ok(())
            }

            Effect::Null => {
                let target = ensure(stack, &[Type::stack()], name)?.remove(0);
                let known = match &target {
                    Type::Stack(Some(elements)) if elements.is_empty() => Some(true),
                    Type::Stack(Some(elements)) if !elements.iter().any(Type::is_many) => Some(false),
                    _ => None,
                };
                stack.push(target);
                stack.push(Type::Bool(known));
                Ok(())
            }

            Effect::Flatten => {
                let target = ensure(stack, &[Type::stack()], name)?.remove(0);
                match target {
                    Type::Stack(Some(elements)) => stack.extend(elements),
                    _ => stack.push(Type::many(Type::Liquid)),
                }
                Ok(())
            }

            Effect::Apply => {
                let function = ensure(stack, &[Type::function()], name)?.remove(0);
                match known_body(&function) {
                    Some(body) => {
                        let exits = machine.run_nested(stack.clone(), name, &body)?;
                        *stack = merge_stacks(exits);
                    }
                    None => stack.push(Type::many(Type::Liquid)),
                }
                Ok(())
            }

            Effect::Tail => {
                let mut args = ensure(stack, &[Type::Liquid, Type::function()], name)?;
                let kept = args.pop().unwrap_or(Type::Liquid);
                match known_body(&args[0]) {
                    Some(body) => {
                        let exits = machine.run_nested(stack.clone(), name, &body)?;
                        *stack = merge_stacks(exits);
                        stack.push(kept);
                    }
                    None => stack.push(Type::many(Type::Liquid)),
                }
                Ok(())
            }

            Effect::Repeat => {
                let args = ensure(stack, &[Type::function(), Type::Int], name)?;
                match known_body(&args[1]) {
                    Some(body) => {
                        let mut prev = stack.clone();
                        let mut after = merge_stacks(machine.run_nested(prev.clone(), name, &body)?);
                        while unify(&mut prev, &after) {
                            after = merge_stacks(machine.run_nested(prev.clone(), name, &body)?);
                        }
                        machine.emit(|| format!("Converged : {}", show_stack(&prev)));
                        *stack = prev;
                    }
                    None => stack.push(Type::many(Type::Liquid)),
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typechecker::machine::Trace;
    use crate::typechecker::signatures::{GenericCounter, SignatureTable};

    fn run(effect: Effect, mut stack: AbstractStack) -> CheckResult<AbstractStack> {
        let table = SignatureTable::with_builtins(&mut GenericCounter::new());
        let mut trace = Trace::default();
        let mut machine = Machine::new(&table, &mut trace, 8);
        effect.apply("op", &mut machine, &mut stack)?;
        Ok(stack)
    }

    fn body(instructions: Vec<Instruction>) -> Type {
        Type::Function(Some(Rc::new(instructions)))
    }

    fn known(elements: Vec<Type>) -> Type {
        Type::stack_of(elements)
    }

    fn dup() -> StaticEffect {
        StaticEffect::new(
            vec![Type::Generic(0)],
            vec![Type::Generic(0), Type::Generic(0)],
        )
    }

    fn swap() -> StaticEffect {
        StaticEffect::new(
            vec![Type::Generic(0), Type::Generic(1)],
            vec![Type::Generic(1), Type::Generic(0)],
        )
    }

    #[test]
    fn test_dup_binds_generic() {
        let mut stack = vec![Type::Int];
        dup().apply("dup", &mut stack).unwrap();
        assert_eq!(stack, vec![Type::Int, Type::Int]);
    }

    #[test]
    fn test_swap() {
        let mut stack = vec![Type::String, Type::Int];
        swap().apply("swp", &mut stack).unwrap();
        assert_eq!(stack, vec![Type::Int, Type::String]);
    }

    #[test]
    fn test_static_underflow() {
        let mut stack = vec![Type::Int];
        let err = swap().apply("swp", &mut stack).unwrap_err();
        assert_eq!(err.name, "swp");
        assert!(matches!(err.kind, CheckErrorKind::StackUnderflow { .. }));
    }

    #[test]
    fn test_static_mismatch_names_operation() {
        let chr = StaticEffect::new(vec![Type::Int], vec![Type::Char]);
        let mut stack = vec![Type::String];
        let err = chr.apply("chr", &mut stack).unwrap_err();
        assert_eq!(err, CheckError::mismatch("chr", "int", "string"));
    }

    #[test]
    fn test_unresolved_generic() {
        let conjure = StaticEffect::new(vec![], vec![Type::Generic(9)]);
        let mut stack = vec![];
        let err = conjure.apply("conjure", &mut stack).unwrap_err();
        assert!(matches!(err.kind, CheckErrorKind::UnresolvedGeneric { id: 9 }));
    }

    #[test]
    fn test_repeated_generic_must_agree() {
        let same = StaticEffect::new(vec![Type::Generic(0), Type::Generic(0)], vec![]);
        let mut stack = vec![Type::Int, Type::Int];
        assert!(same.apply("same", &mut stack).is_ok());

        let mut stack = vec![Type::Int, Type::String];
        assert!(same.apply("same", &mut stack).is_err());
    }

    #[test]
    fn test_ellipsis_consumes_rest() {
        let sum = StaticEffect::new(vec![], vec![Type::Int]).with_ellipsis(Type::Int);
        let mut stack = vec![Type::Int, Type::Int, Type::Int];
        sum.apply("sum", &mut stack).unwrap();
        assert_eq!(stack, vec![Type::Int]);

        let mut stack = vec![Type::String, Type::Int];
        assert!(sum.apply("sum", &mut stack).is_err());
    }

    #[test]
    fn test_field_mismatch() {
        let setter = StaticEffect::new(
            vec![Type::user("Point"), Type::Int],
            vec![Type::user("Point")],
        )
        .with_fields(vec![None, Some("x".to_string())]);
        let mut stack = vec![Type::user("Point"), Type::String];
        let err = setter.apply("Point.x!", &mut stack).unwrap_err();
        assert!(matches!(err.kind, CheckErrorKind::FieldMismatch { ref field, .. } if field == "x"));
    }

    #[test]
    fn test_bool_folding() {
        let and = run(Effect::And, vec![Type::bool_lit(true), Type::bool_lit(false)]).unwrap();
        assert_eq!(and, vec![Type::bool_lit(false)]);

        let or = run(Effect::Or, vec![Type::bool_lit(false), Type::bool_lit(true)]).unwrap();
        assert_eq!(or, vec![Type::bool_lit(true)]);

        let unknown = run(Effect::Or, vec![Type::bool(), Type::bool_lit(true)]).unwrap();
        assert_eq!(unknown, vec![Type::bool()]);

        let not = run(Effect::Not, vec![Type::bool_lit(true)]).unwrap();
        assert_eq!(not, vec![Type::bool_lit(false)]);

        let err = run(Effect::Not, vec![Type::Int]).unwrap_err();
        assert_eq!(err, CheckError::mismatch("op", "bool", "int"));
    }

    #[test]
    fn test_box_and_insert() {
        let boxed = run(Effect::BoxStack, vec![Type::Int, Type::String]).unwrap();
        assert_eq!(boxed, vec![known(vec![Type::Int, Type::String])]);

        let inserted = run(Effect::Insert, vec![known(vec![Type::Int]), Type::String]).unwrap();
        assert_eq!(inserted, vec![known(vec![Type::Int, Type::String])]);

        let opaque = run(Effect::Insert, vec![Type::stack(), Type::Int]).unwrap();
        assert_eq!(opaque, vec![Type::stack()]);
    }

    #[test]
    fn test_fetch_variants() {
        let value = || vec![known(vec![Type::Int, Type::String, Type::Char])];

        let fst = run(Effect::Fetch { top: true, remove: false }, value()).unwrap();
        assert_eq!(fst, vec![known(vec![Type::Int, Type::String, Type::Char]), Type::Char]);

        let fst_pop = run(Effect::Fetch { top: true, remove: true }, value()).unwrap();
        assert_eq!(fst_pop, vec![known(vec![Type::Int, Type::String]), Type::Char]);

        let lst = run(Effect::Fetch { top: false, remove: false }, value()).unwrap();
        assert_eq!(lst, vec![known(vec![Type::Int, Type::String, Type::Char]), Type::Int]);

        let lst_pop = run(Effect::Fetch { top: false, remove: true }, value()).unwrap();
        assert_eq!(lst_pop, vec![known(vec![Type::String, Type::Char]), Type::Int]);

        let opaque = run(Effect::Fetch { top: true, remove: true }, vec![Type::stack()]).unwrap();
        assert_eq!(opaque, vec![Type::stack(), Type::Liquid]);

        let err = run(Effect::Fetch { top: false, remove: false }, vec![known(vec![])]).unwrap_err();
        assert_eq!(err.kind, CheckErrorKind::EmptyStack);
    }

    #[test]
    fn test_concat_keeps_upper_elements_on_top() {
        let joined = run(
            Effect::Concat,
            vec![known(vec![Type::Int]), known(vec![Type::String, Type::Char])],
        )
        .unwrap();
        assert_eq!(joined, vec![known(vec![Type::Int, Type::String, Type::Char])]);

        let opaque = run(Effect::Concat, vec![known(vec![Type::Int]), Type::stack()]).unwrap();
        assert_eq!(opaque, vec![Type::stack()]);
    }

    #[test]
    fn test_len_and_reverse() {
        let len = run(Effect::Len, vec![known(vec![Type::Int])]).unwrap();
        assert_eq!(len, vec![known(vec![Type::Int]), Type::Int]);

        let reversed = run(Effect::Reverse, vec![known(vec![Type::Int, Type::String])]).unwrap();
        assert_eq!(reversed, vec![known(vec![Type::String, Type::Int])]);

        let opaque = run(Effect::Reverse, vec![Type::stack()]).unwrap();
        assert_eq!(opaque, vec![Type::stack()]);
    }

    #[test]
    fn test_null_folds_known_content() {
        let empty = run(Effect::Null, vec![known(vec![])]).unwrap();
        assert_eq!(empty[1], Type::bool_lit(true));

        let full = run(Effect::Null, vec![known(vec![Type::Int])]).unwrap();
        assert_eq!(full[1], Type::bool_lit(false));

        let variadic = run(Effect::Null, vec![known(vec![Type::many(Type::Int)])]).unwrap();
        assert_eq!(variadic[1], Type::bool());
    }

    #[test]
    fn test_flatten() {
        let spread = run(Effect::Flatten, vec![Type::Char, known(vec![Type::Int, Type::String])]).unwrap();
        assert_eq!(spread, vec![Type::Char, Type::Int, Type::String]);

        let opaque = run(Effect::Flatten, vec![Type::Char, Type::stack()]).unwrap();
        assert_eq!(opaque, vec![Type::Char, Type::many(Type::Liquid)]);
    }

    #[test]
    fn test_apply() {
        let adds = body(vec![Instruction::PushInt(2), Instruction::call("+")]);
        let applied = run(Effect::Apply, vec![Type::Int, adds]).unwrap();
        assert_eq!(applied, vec![Type::Int]);

        let opaque = run(Effect::Apply, vec![Type::Int, Type::function()]).unwrap();
        assert_eq!(opaque, vec![Type::Int, Type::many(Type::Liquid)]);
    }

    #[test]
    fn test_tail_pushes_kept_value() {
        let pushes_float = body(vec![Instruction::PushFloat(1.5)]);
        let result = run(Effect::Tail, vec![Type::Int, Type::String, pushes_float]).unwrap();
        assert_eq!(result, vec![Type::Int, Type::Float, Type::String]);
    }

    #[test]
    fn test_repeat_widens_growing_body() {
        let pushes_int = body(vec![Instruction::PushInt(1)]);
        let result = run(Effect::Repeat, vec![pushes_int, Type::Int]).unwrap();
        assert_eq!(result, vec![Type::many(Type::Int)]);

        let adds = body(vec![Instruction::PushInt(1), Instruction::call("+")]);
        let result = run(Effect::Repeat, vec![Type::Int, adds, Type::Int]).unwrap();
        assert_eq!(result, vec![Type::Int]);
    }
}

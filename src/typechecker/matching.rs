/**
The matching relation between abstract types

`is_matching(got, expect)` answers "may `got` be used where `expect` is
required". It is asymmetric on purpose: only the expected side may bind
generics, and only when a resolution map is supplied.
*/

use crate::typechecker::types::{stack_pop, GenericId, Type};
use std::collections::HashMap;

/// Generic bindings discovered while matching
pub type Resolution = HashMap<GenericId, Type>;

pub fn is_matching(got: &Type, expect: &Type, mut resolving: Option<&mut Resolution>) -> bool {
    // Many collapses to its element type on either side
    if let Type::Many(inner) = got {
        return is_matching(inner, expect, resolving);
    }
    if let Type::Many(inner) = expect {
        return is_matching(got, inner, resolving);
    }

    // Binding a generic on the expected side
    if let (Type::Generic(id), Some(map)) = (expect, resolving.as_deref_mut()) {
        if let Some(bound) = map.get(id).cloned() {
            return is_matching(got, &bound, None);
        }
        map.insert(*id, got.clone());
        return true;
    }

    if matches!(got, Type::Liquid) || matches!(expect, Type::Liquid) {
        return true;
    }

    if let Type::Union(options) = got {
        return options
            .iter()
            .any(|option| is_matching(option, expect, resolving.as_deref_mut()));
    }
    if let Type::Union(options) = expect {
        return options
            .iter()
            .any(|option| is_matching(got, option, resolving.as_deref_mut()));
    }

    match (got, expect) {
        (Type::Generic(a), Type::Generic(b)) => a == b,
        // An unbound generic never matches implicitly
        (Type::Generic(_), _) | (_, Type::Generic(_)) => false,
        (Type::Stack(got_elems), Type::Stack(expect_elems)) => match (got_elems, expect_elems) {
            (Some(g), Some(e)) => stack_equals(g, e, resolving),
            _ => true,
        },
        (Type::User(a), Type::User(b)) => a == b,
        _ => got.same_kind(expect),
    }
}

/// Element-wise matching of two stacks from the top
///
/// A `Many` on either side absorbs any number of matching elements of the
/// other, so variadic regions match concretely sized stacks and the reverse.
pub fn stack_equals(got: &[Type], expect: &[Type], mut resolving: Option<&mut Resolution>) -> bool {
    let mut gstk = got.to_vec();
    let mut estk = expect.to_vec();

    loop {
        match (gstk.last(), estk.last()) {
            (None, None) => return true,
            (None, Some(e)) if e.is_many() => {
                estk.pop();
                continue;
            }
            (Some(g), None) if g.is_many() => {
                gstk.pop();
                continue;
            }
            (None, _) | (_, None) => return false,
            (Some(g), Some(e)) => {
                if !is_matching(g, e, resolving.as_deref_mut()) {
                    return false;
                }

                if g.is_many() && e.is_many() {
                    let gtop = g.clone();
                    let etop = e.clone();
                    gstk.pop();
                    estk.pop();
                    while estk.last().is_some_and(|e| is_matching(&gtop, e, None)) {
                        estk.pop();
                    }
                    while gstk.last().is_some_and(|g| is_matching(g, &etop, None)) {
                        gstk.pop();
                    }
                } else {
                    stack_pop(&mut gstk);
                    stack_pop(&mut estk);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liquid_matches_everything() {
        let types = [
            Type::Int,
            Type::Generic(7),
            Type::stack_of(vec![Type::Int]),
            Type::user("Point"),
            Type::Union(vec![Type::Int, Type::Char]),
        ];
        for ty in &types {
            assert!(is_matching(ty, &Type::Liquid, None));
            assert!(is_matching(&Type::Liquid, ty, None));
        }
    }

    #[test]
    fn test_kind_equality() {
        assert!(is_matching(&Type::Int, &Type::Int, None));
        assert!(!is_matching(&Type::Int, &Type::Float, None));
        assert!(is_matching(&Type::bool_lit(true), &Type::bool(), None));
        assert!(is_matching(&Type::user("A"), &Type::user("A"), None));
        assert!(!is_matching(&Type::user("A"), &Type::user("B"), None));
    }

    #[test]
    fn test_generic_requires_resolution() {
        assert!(!is_matching(&Type::Int, &Type::Generic(0), None));
        assert!(!is_matching(&Type::Generic(0), &Type::Int, None));
        assert!(is_matching(&Type::Generic(0), &Type::Generic(0), None));
        assert!(!is_matching(&Type::Generic(0), &Type::Generic(1), None));

        let mut resolved = Resolution::new();
        assert!(is_matching(&Type::Int, &Type::Generic(0), Some(&mut resolved)));
        assert_eq!(resolved.get(&0), Some(&Type::Int));
    }

    #[test]
    fn test_generic_binding_is_consistent() {
        let mut resolved = Resolution::new();
        let got = Type::stack_of(vec![Type::String, Type::Int]);
        let expect = Type::stack_of(vec![Type::Generic(4), Type::Generic(4)]);
        assert!(!is_matching(&got, &expect, Some(&mut resolved)));
    }

    #[test]
    fn test_union_is_existential() {
        let number = Type::Union(vec![Type::Int, Type::Float]);
        assert!(is_matching(&Type::Float, &number, None));
        assert!(is_matching(&number, &Type::Int, None));
        assert!(!is_matching(&Type::String, &number, None));
    }

    #[test]
    fn test_many_collapses() {
        assert!(is_matching(&Type::many(Type::Int), &Type::Int, None));
        assert!(is_matching(&Type::Int, &Type::many(Type::Int), None));
        assert!(!is_matching(&Type::many(Type::Int), &Type::Char, None));
    }

    #[test]
    fn test_unknown_stack_matches_known() {
        let known = Type::stack_of(vec![Type::Int]);
        assert!(is_matching(&Type::stack(), &known, None));
        assert!(is_matching(&known, &Type::stack(), None));
    }

    #[test]
    fn test_stack_equals_with_rest() {
        let rest = vec![Type::many(Type::Int)];
        assert!(stack_equals(&[Type::Int, Type::Int, Type::Int], &rest, None));
        assert!(stack_equals(&[], &rest, None));
        assert!(stack_equals(&rest, &[Type::Int], None));
        assert!(!stack_equals(&[Type::Int, Type::String], &rest, None));

        let with_prefix = vec![Type::many(Type::Int), Type::String];
        assert!(stack_equals(&[Type::Int, Type::Int, Type::String], &with_prefix, None));
        assert!(!stack_equals(&[Type::Int, Type::Int], &with_prefix, None));
    }

    #[test]
    fn test_stack_equals_exact() {
        assert!(stack_equals(&[Type::Int, Type::Char], &[Type::Int, Type::Char], None));
        assert!(!stack_equals(&[Type::Int], &[Type::Int, Type::Char], None));
        assert!(!stack_equals(&[Type::Char, Type::Int], &[Type::Int, Type::Char], None));
    }
}

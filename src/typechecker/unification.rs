/**
Convergence of abstract stacks at control-flow join points

`unify` merges the stack memoized at a label with the stack arriving on a
later visit. The merge only ever widens, and a depth change collapses the
whole stack into a single `Many`, so a label sees a bounded number of
distinct stacks no matter how many times the loop would run.
*/

use crate::typechecker::matching::is_matching;
use crate::typechecker::types::{stacks_equivalent, AbstractStack, Type};

/// Build a normalized union from a list of types
///
/// Nested unions and `Many` wrappers are flattened, members that match
/// each other in both directions are merged, and known stacks that still
/// disagree widen to an unknown stack.
pub fn collapse_union(types: &[Type]) -> Type {
    fn collect(ty: &Type, out: &mut Vec<Type>) {
        match ty {
            Type::Union(options) => {
                for option in options {
                    collect(option, out);
                }
            }
            Type::Many(inner) => collect(inner, out),
            _ => out.push(ty.clone()),
        }
    }

    let mut elems = Vec::new();
    for ty in types {
        collect(ty, &mut elems);
    }

    let mut uniq: Vec<Type> = Vec::new();
    for ty in elems {
        let existing = uniq
            .iter_mut()
            .find(|u| is_matching(&ty, u, None) && is_matching(u, &ty, None));
        match existing {
            Some(u) => widen_literal(u, &ty),
            None => uniq.push(ty),
        }
    }

    // Two known stacks left here disagree on content
    if uniq.iter().filter(|t| matches!(t, Type::Stack(Some(_)))).count() > 1 {
        uniq.retain(|t| !matches!(t, Type::Stack(_)));
        uniq.push(Type::stack());
    }

    match uniq.len() {
        0 => Type::Liquid,
        1 => uniq.remove(0),
        _ => Type::Union(uniq),
    }
}

/// Forget a boolean literal once two different values have been seen
fn widen_literal(kept: &mut Type, seen: &Type) {
    if let (Type::Bool(a), Type::Bool(b)) = (&*kept, seen) {
        if a != b {
            *kept = Type::bool();
        }
    }
}

/// Merge one element of the memoized stack with the arriving one
fn join(prev: &Type, now: &Type) -> Type {
    if is_matching(now, prev, None) {
        let mut kept = prev.clone();
        widen_literal(&mut kept, now);
        return kept;
    }

    let merged = collapse_union(&[prev.clone(), now.clone()]);
    if prev.is_many() || now.is_many() {
        Type::many(merged)
    } else {
        merged
    }
}

/// Merge `now` into `prev`, returning whether `prev` changed
pub fn unify(prev: &mut AbstractStack, now: &[Type]) -> bool {
    let common = prev.len().min(now.len());

    let mut suffix: Vec<Type> = prev
        .iter()
        .rev()
        .zip(now.iter().rev())
        .map(|(p, n)| join(p, n))
        .collect();

    let result = if prev.len() == now.len() {
        suffix.reverse();
        suffix
    } else {
        // Depth changed between visits: give up on exact depth
        let mut extras: Vec<Type> = prev[..prev.len() - common].to_vec();
        extras.extend_from_slice(&now[..now.len() - common]);
        extras.append(&mut suffix);
        vec![Type::many(collapse_union(&extras))]
    };

    if stacks_equivalent(&result, prev) {
        return false;
    }

    *prev = result;
    true
}

/// Fold several exit stacks into one
///
/// An empty list means no path reached an exit; the result is then fully
/// unknown.
pub fn merge_stacks(stacks: Vec<AbstractStack>) -> AbstractStack {
    let mut iter = stacks.into_iter();
    let Some(mut merged) = iter.next() else {
        return vec![Type::many(Type::Liquid)];
    };
    for stack in iter {
        unify(&mut merged, &stack);
    }
    merged
}

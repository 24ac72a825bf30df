/**
Signature table

Maps every callable name to its `Effect`: the builtin operations, one
effect per declared function, and the accessors generated for each
declared aggregate type. Generic identities come from an explicit
`GenericCounter`, so each table build is self-contained.
*/

use crate::ir::{FnDecl, Program, TypeDecl, TypeSig, Variadic};
use crate::typechecker::effects::{Effect, StaticEffect};
use crate::typechecker::errors::{CheckError, CheckErrorKind, CheckResult};
use crate::typechecker::machine::Trace;
use crate::typechecker::types::{show_stack, AbstractStack, GenericId, Type};
use std::collections::{HashMap, HashSet};

/// Source of fresh generic identities
#[derive(Debug, Clone, Default)]
pub struct GenericCounter {
    next: GenericId,
}

impl GenericCounter {
    pub fn new() -> Self {
        GenericCounter { next: 0 }
    }

    pub fn fresh_id(&mut self) -> GenericId {
        let id = self.next;
        self.next += 1;
        id
    }

    pub fn fresh(&mut self) -> Type {
        Type::Generic(self.fresh_id())
    }
}

/// The declared contract of a user function, used to verify its body
#[derive(Debug, Clone, PartialEq)]
pub struct Expectation {
    pub takes: AbstractStack,
    pub leaves: AbstractStack,
    pub ellipsis: Option<Type>,
}

impl Expectation {
    /// A copy whose generics are renamed to fresh ids
    ///
    /// A body is verified against this copy, so the generics it starts with
    /// never collide with those of a call to the same function.
    pub fn instantiate(&self, counter: &mut GenericCounter) -> Expectation {
        let mut ids = Vec::new();
        for ty in self.takes.iter().chain(&self.leaves).chain(&self.ellipsis) {
            ty.collect_generics(&mut ids);
        }

        let mut fresh = self.clone();
        for id in ids {
            let renamed = counter.fresh();
            for ty in fresh
                .takes
                .iter_mut()
                .chain(fresh.leaves.iter_mut())
                .chain(fresh.ellipsis.iter_mut())
            {
                ty.substitute(id, &renamed);
            }
        }
        fresh
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignatureTable {
    effects: HashMap<String, Effect>,
    expectations: HashMap<String, Expectation>,
    declared: Vec<String>,
}

impl SignatureTable {
    /// A table holding only the builtin operations
    pub fn with_builtins(counter: &mut GenericCounter) -> Self {
        let mut table = SignatureTable::default();
        table.add_builtins(counter);
        table
    }

    /// Builtins plus every function and aggregate declared by `program`
    pub fn build(program: &Program, counter: &mut GenericCounter, trace: &mut Trace) -> CheckResult<Self> {
        let mut table = SignatureTable::with_builtins(counter);

        let type_names: HashSet<&str> = program
            .type_decls
            .iter()
            .map(|decl| decl.name.as_str())
            .collect();

        for decl in &program.type_decls {
            table.declare_type(decl, &type_names, counter, trace)?;
        }
        for decl in &program.fn_decls {
            table.declare_function(decl, &type_names, counter, trace)?;
        }

        Ok(table)
    }

    pub fn lookup(&self, name: &str) -> Option<&Effect> {
        self.effects.get(name)
    }

    pub fn expectation(&self, name: &str) -> Option<&Expectation> {
        self.expectations.get(name)
    }

    /// User-declared names with their effects, in declaration order
    pub fn declared(&self) -> impl Iterator<Item = (&str, &Effect)> {
        self.declared
            .iter()
            .filter_map(|name| self.effects.get(name).map(|effect| (name.as_str(), effect)))
    }

    fn alias(&mut self, names: &[&str], effect: Effect) {
        for name in names {
            self.effects.insert(name.to_string(), effect.clone());
        }
    }

    fn declare(&mut self, owner: &str, name: String, effect: StaticEffect) -> CheckResult<()> {
        if self.effects.contains_key(&name) {
            return Err(CheckError::new(
                owner,
                CheckErrorKind::DuplicateDeclaration { declared: name },
            ));
        }
        self.effects.insert(name.clone(), Effect::Static(effect));
        self.declared.push(name);
        Ok(())
    }

    fn declare_type(
        &mut self,
        decl: &TypeDecl,
        type_names: &HashSet<&str>,
        counter: &mut GenericCounter,
        trace: &mut Trace,
    ) -> CheckResult<()> {
        let mut generics = HashMap::new();
        let mut fields = Vec::with_capacity(decl.fields.len());
        for (field, sig) in &decl.fields {
            let ty = sig_to_type(sig, &mut generics, counter, type_names)
                .map_err(|kind| CheckError::new(&decl.name, kind).at(decl.span))?;
            fields.push((field.clone(), ty));
        }
        if !generics.is_empty() {
            return Err(CheckError::new(&decl.name, CheckErrorKind::GenericField).at(decl.span));
        }

        trace.emit(|| {
            if fields.is_empty() {
                format!("type {} = {{ <empty> }}", decl.name)
            } else {
                let body: Vec<String> = fields
                    .iter()
                    .map(|(field, ty)| format!("\n  {} : {}", field, ty))
                    .collect();
                format!("type {} = {{{}\n}}", decl.name, body.concat())
            }
        });

        let this = Type::user(&decl.name);
        let declare = |table: &mut Self, name: String, effect: StaticEffect| {
            table.declare(&decl.name, name, effect).map_err(|e| e.at(decl.span))
        };

        declare(self, decl.name.clone(), StaticEffect::new(vec![], vec![Type::Int]))?;

        // The first field is on top of the stack when constructing
        let takes: Vec<Type> = fields.iter().rev().map(|(_, ty)| ty.clone()).collect();
        let labels = fields.iter().rev().map(|(field, _)| Some(field.clone())).collect();
        declare(
            self,
            format!("{}!", decl.name),
            StaticEffect::new(takes, vec![this.clone()]).with_fields(labels),
        )?;

        for (field, ty) in &fields {
            let getter = format!("{}.{}", decl.name, field);
            let setter = format!("{}!", getter);
            declare(
                self,
                getter,
                StaticEffect::new(vec![this.clone()], vec![this.clone(), ty.clone()]),
            )?;
            declare(
                self,
                setter,
                StaticEffect::new(vec![this.clone(), ty.clone()], vec![this.clone()])
                    .with_fields(vec![None, Some(field.clone())]),
            )?;
        }

        log::debug!("declared type {} with {} fields", decl.name, fields.len());
        Ok(())
    }

    fn declare_function(
        &mut self,
        decl: &FnDecl,
        type_names: &HashSet<&str>,
        counter: &mut GenericCounter,
        trace: &mut Trace,
    ) -> CheckResult<()> {
        let invalid = |kind| CheckError::new(&decl.name, kind).at(decl.span);
        let mut generics = HashMap::new();

        let mut takes = Vec::with_capacity(decl.args.len());
        for arg in &decl.args {
            takes.push(sig_to_type(&arg.sig, &mut generics, counter, type_names).map_err(invalid)?);
        }
        let mut leaves = Vec::with_capacity(decl.rets.len());
        for ret in &decl.rets {
            leaves.push(sig_to_type(ret, &mut generics, counter, type_names).map_err(invalid)?);
        }

        // Declarations list the top of the stack first
        takes.reverse();
        leaves.reverse();

        let ellipsis = match &decl.ellipsis {
            Some(variadic) => {
                Some(variadic_type(variadic, &mut generics, counter, type_names).map_err(invalid)?)
            }
            None => None,
        };
        if let Some(rest) = &decl.rest {
            let element = variadic_type(rest, &mut generics, counter, type_names).map_err(invalid)?;
            leaves.insert(0, Type::stack_of(vec![Type::many(element)]));
        }

        trace.emit(|| format!("fn {} :: {} -> {}", decl.name, show_stack(&takes), show_stack(&leaves)));

        let mut effect = StaticEffect::new(takes.clone(), leaves.clone());
        effect.ellipsis = ellipsis.clone();
        self.declare(&decl.name, decl.name.clone(), effect)
            .map_err(|e| e.at(decl.span))?;
        self.expectations.insert(
            decl.name.clone(),
            Expectation {
                takes,
                leaves,
                ellipsis,
            },
        );

        log::debug!("declared function {}", decl.name);
        Ok(())
    }

    fn add_builtins(&mut self, counter: &mut GenericCounter) {
        let mut fixed = |names: &[&str], takes: Vec<Type>, leaves: Vec<Type>| {
            self.alias(names, Effect::Static(StaticEffect::new(takes, leaves)));
        };

        // Stack shape
        let (a, b) = (counter.fresh(), counter.fresh());
        fixed(&["swp", "↕"], vec![a.clone(), b.clone()], vec![b, a]);
        let a = counter.fresh();
        fixed(&["dup", "⇈"], vec![a.clone()], vec![a.clone(), a]);
        let (a, b) = (counter.fresh(), counter.fresh());
        fixed(&["ovr", "⊼"], vec![a.clone(), b.clone()], vec![a.clone(), b, a]);
        let (a, b, c) = (counter.fresh(), counter.fresh(), counter.fresh());
        fixed(
            &["pck", "⩞"],
            vec![a.clone(), b.clone(), c.clone()],
            vec![a.clone(), b, c, a],
        );
        let (a, b, c) = (counter.fresh(), counter.fresh(), counter.fresh());
        fixed(&["rot", "↻"], vec![a.clone(), b.clone(), c.clone()], vec![b, c, a]);
        let (a, b, c) = (counter.fresh(), counter.fresh(), counter.fresh());
        fixed(&["rot-", "↷"], vec![a.clone(), b.clone(), c.clone()], vec![c, a, b]);
        let (a, b, c) = (counter.fresh(), counter.fresh(), counter.fresh());
        fixed(&["swpd", "↨"], vec![a.clone(), b.clone(), c.clone()], vec![b, a, c]);
        let a = counter.fresh();
        fixed(&["pop", "◌"], vec![a], vec![]);
        let (a, b) = (counter.fresh(), counter.fresh());
        fixed(&["nip", "⦵"], vec![a, b.clone()], vec![b]);
        let (a, b) = (counter.fresh(), counter.fresh());
        fixed(&["tck", "⊻"], vec![a.clone(), b.clone()], vec![b.clone(), a, b]);
        fixed(&["dpt", "≡"], vec![], vec![Type::Int]);

        // Characters, type tags and strings
        fixed(&["chr"], vec![Type::Int], vec![Type::Char]);
        fixed(&["ord"], vec![Type::Char], vec![Type::Int]);
        fixed(&["type", "∈"], vec![Type::Liquid], vec![Type::Liquid, Type::Int]);
        fixed(&["int", "float", "char", "bool", "string", "stack"], vec![], vec![Type::Int]);
        fixed(&["str"], vec![Type::Liquid], vec![Type::String]);
        fixed(&["slen", "ℓ"], vec![Type::String], vec![Type::String, Type::Int]);
        fixed(&["@"], vec![Type::String, Type::Int], vec![Type::String, Type::Char]);
        fixed(&["@!"], vec![Type::String, Type::Char, Type::Int], vec![Type::String]);
        fixed(&["&"], vec![Type::String, Type::String], vec![Type::String]);
        fixed(&["."], vec![Type::String, Type::Char], vec![Type::String]);
        fixed(&[".!"], vec![Type::String], vec![Type::String, Type::Char]);

        // Stack values with unknown results
        fixed(
            &["take", "↙"],
            vec![Type::stack(), Type::Int],
            vec![Type::stack(), Type::stack()],
        );
        fixed(&["drop", "↘"], vec![Type::stack(), Type::Int], vec![Type::stack()]);

        fixed(&["dbg"], vec![], vec![]);
        fixed(&["print"], vec![Type::Liquid], vec![]);

        self.alias(&["+", "-", "*", "/", "%"], Effect::Arith);
        self.alias(&["<", ">", "<=", ">=", "≤", "≥"], Effect::Compare);
        self.alias(&["=", "!=", "≠"], Effect::Equal);
        self.alias(&["&&", "∧"], Effect::And);
        self.alias(&["||", "∨"], Effect::Or);
        self.alias(&["!", "¬"], Effect::Not);

        self.alias(&["box", "▭"], Effect::BoxStack);
        self.alias(&["ins", "⤓"], Effect::Insert);
        self.alias(&["fst", "⊢"], Effect::Fetch { top: true, remove: false });
        self.alias(&["fst!", "⊢!"], Effect::Fetch { top: true, remove: true });
        self.alias(&["lst", "⊣"], Effect::Fetch { top: false, remove: false });
        self.alias(&["lst!", "⊣!"], Effect::Fetch { top: false, remove: true });
        self.alias(&["++", "⧺"], Effect::Concat);
        self.alias(&["len"], Effect::Len);
        self.alias(&["rev", "⇆"], Effect::Reverse);
        self.alias(&["null", "∘"], Effect::Null);
        self.alias(&["flat", "⬚"], Effect::Flatten);

        self.alias(&["ap", "▷"], Effect::Apply);
        self.alias(&["tail", "⟜"], Effect::Tail);
        self.alias(&["repeat", "⋄"], Effect::Repeat);
    }
}

/// Translate a declared signature into a `Type`
///
/// `#`-prefixed names become generics, fresh per declaration and shared
/// by every mention within it.
pub fn sig_to_type(
    sig: &TypeSig,
    generics: &mut HashMap<String, GenericId>,
    counter: &mut GenericCounter,
    type_names: &HashSet<&str>,
) -> Result<Type, CheckErrorKind> {
    let ty = match sig.name.as_str() {
        "int" => Type::Int,
        "float" => Type::Float,
        "char" => Type::Char,
        "bool" => Type::bool(),
        "string" => Type::String,
        "stack" => Type::stack(),
        "function" => Type::function(),
        "opaque" => Type::Opaque,
        name if name.starts_with('#') => {
            let id = *generics
                .entry(name.to_string())
                .or_insert_with(|| counter.fresh_id());
            Type::Generic(id)
        }
        name if type_names.contains(name) => Type::user(name),
        name => {
            return Err(CheckErrorKind::InvalidType {
                type_name: name.to_string(),
            })
        }
    };

    if sig.is_stack {
        Ok(Type::stack_of(vec![Type::many(ty)]))
    } else {
        Ok(ty)
    }
}

fn variadic_type(
    variadic: &Variadic,
    generics: &mut HashMap<String, GenericId>,
    counter: &mut GenericCounter,
    type_names: &HashSet<&str>,
) -> Result<Type, CheckErrorKind> {
    match &variadic.element {
        Some(sig) => sig_to_type(sig, generics, counter, type_names),
        None => Ok(Type::Liquid),
    }
}

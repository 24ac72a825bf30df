/**
Symbolic stack machine

Walks a function's IR depth first over every control-flow path, carrying
an abstract stack per path. Labels memoize the stack they were first
reached with; later arrivals are merged with `unify` and dropped once the
merge stops changing, which is what makes loops terminate.
*/

use crate::ir::Instruction;
use crate::typechecker::errors::{CheckError, CheckErrorKind, CheckResult};
use crate::typechecker::matching::is_matching;
use crate::typechecker::signatures::SignatureTable;
use crate::typechecker::types::{show_stack, stack_pop, stacks_equivalent, AbstractStack, Type};
use crate::typechecker::unification::unify;
use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

/// Diagnostic trace of a check, collected only when enabled
#[derive(Debug, Clone, Default)]
pub struct Trace {
    enabled: bool,
    lines: Vec<String>,
}

impl Trace {
    pub fn new(enabled: bool) -> Self {
        Trace {
            enabled,
            lines: Vec::new(),
        }
    }

    pub fn emit(&mut self, line: impl FnOnce() -> String) {
        if self.enabled {
            self.lines.push(line());
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// One explored path: where it is and what the stack looks like there
struct State {
    ip: usize,
    stack: AbstractStack,
}

/// A subroutine body already run from a given stack; `exits` is `None` while it is still running
struct NestedRun {
    body: Rc<Vec<Instruction>>,
    from: AbstractStack,
    exits: Option<Vec<AbstractStack>>,
}

pub struct Machine<'a> {
    signatures: &'a SignatureTable,
    trace: &'a mut Trace,
    max_depth: usize,
    depth: usize,
    steps: usize,
    nested: Vec<NestedRun>,
}

impl<'a> Machine<'a> {
    pub fn new(signatures: &'a SignatureTable, trace: &'a mut Trace, max_depth: usize) -> Self {
        Machine {
            signatures,
            trace,
            max_depth,
            depth: 0,
            steps: 0,
            nested: Vec::new(),
        }
    }

    /// Number of worklist states processed so far, nested runs included
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn emit(&mut self, line: impl FnOnce() -> String) {
        self.trace.emit(line);
    }

    /// Run a subroutine body on behalf of `ap`, `tail` or `repeat`
    ///
    /// Runs are memoized on the body and the starting stack. Re-entering a
    /// body from a stack it is already being run from, or nesting past the
    /// depth limit, leaves the result unknown.
    pub fn run_nested(
        &mut self,
        from: AbstractStack,
        name: &str,
        body: &Rc<Vec<Instruction>>,
    ) -> CheckResult<Vec<AbstractStack>> {
        let known = self
            .nested
            .iter()
            .find(|run| Rc::ptr_eq(&run.body, body) && stacks_equivalent(&run.from, &from));
        if let Some(run) = known {
            return Ok(match &run.exits {
                Some(exits) => exits.clone(),
                None => {
                    log::debug!("'{}' re-enters a subroutine from the same stack", name);
                    vec![vec![Type::many(Type::Liquid)]]
                }
            });
        }

        if self.depth >= self.max_depth {
            log::warn!(
                "'{}' nested more than {} subroutine applications deep; result left unknown",
                name,
                self.max_depth
            );
            return Ok(vec![vec![Type::many(Type::Liquid)]]);
        }

        let slot = self.nested.len();
        self.nested.push(NestedRun {
            body: Rc::clone(body),
            from: from.clone(),
            exits: None,
        });

        self.depth += 1;
        let result = self.run_stack(from, name, body);
        self.depth -= 1;

        let exits = result?;
        self.nested[slot].exits = Some(exits.clone());
        Ok(exits)
    }

    /// Explore every path through `irs` starting from `from`
    ///
    /// Returns the stack reached at each `Exit`.
    pub fn run_stack(
        &mut self,
        from: AbstractStack,
        name: &str,
        irs: &[Instruction],
    ) -> CheckResult<Vec<AbstractStack>> {
        let labels = index_labels(irs);
        let resolve = |label: &str| -> CheckResult<usize> {
            labels.get(label).copied().ok_or_else(|| {
                CheckError::new(
                    name,
                    CheckErrorKind::UndefinedLabel {
                        label: label.to_string(),
                    },
                )
            })
        };

        let signatures = self.signatures;
        let mut states = vec![State { ip: 0, stack: from }];
        let mut visited: HashMap<usize, AbstractStack> = HashMap::new();
        let mut exits = Vec::new();

        loop {
            let pending = states.len();
            let Some(state) = states.last_mut() else {
                break;
            };
            self.steps += 1;

            if let Some(memo) = visited.get_mut(&state.ip) {
                if !unify(memo, &state.stack) {
                    self.trace.emit(|| format!("Converged : {}", show_stack(memo.as_slice())));
                    log::debug!("{}: converged at instruction {}", name, state.ip);
                    states.pop();
                    continue;
                }
                state.stack = memo.clone();
            }

            let Some(instr) = irs.get(state.ip) else {
                // Running off the end of a body is an implicit exit
                exits.push(mem::take(&mut state.stack));
                states.pop();
                continue;
            };

            self.trace.emit(|| format!("On : {}", instr));
            self.trace.emit(|| {
                format!("States : {} | Stack : {}", pending, show_stack(&state.stack))
            });

            match instr {
                Instruction::PushInt(_) => {
                    state.stack.push(Type::Int);
                    state.ip += 1;
                }
                Instruction::PushFloat(_) => {
                    state.stack.push(Type::Float);
                    state.ip += 1;
                }
                Instruction::PushChar(_) => {
                    state.stack.push(Type::Char);
                    state.ip += 1;
                }
                Instruction::PushStr(_) => {
                    state.stack.push(Type::String);
                    state.ip += 1;
                }
                Instruction::PushBool(value) => {
                    state.stack.push(Type::bool_lit(*value));
                    state.ip += 1;
                }
                Instruction::Call(callee) => {
                    let effect = signatures.lookup(callee).ok_or_else(|| {
                        CheckError::new(
                            name,
                            CheckErrorKind::UndefinedFunction {
                                callee: callee.clone(),
                            },
                        )
                    })?;
                    effect.apply(callee, self, &mut state.stack)?;
                    state.ip += 1;
                }
                Instruction::JumpTrue(label) => {
                    let target = resolve(label)?;
                    let top = state
                        .stack
                        .last()
                        .ok_or_else(|| CheckError::underflow(name, "bool"))?;
                    if !is_matching(top, &Type::bool(), None) {
                        return Err(CheckError::mismatch(name, "bool", top));
                    }

                    match stack_pop(&mut state.stack) {
                        // Statically decided branches do not fork
                        Some(Type::Bool(Some(true))) => state.ip = target,
                        Some(Type::Bool(Some(false))) => state.ip += 1,
                        _ => {
                            state.ip += 1;
                            let taken = State {
                                ip: target,
                                stack: state.stack.clone(),
                            };
                            states.push(taken);
                        }
                    }
                }
                Instruction::Goto(label) => {
                    state.ip = resolve(label)?;
                }
                Instruction::Label(_) => {
                    visited
                        .entry(state.ip)
                        .or_insert_with(|| state.stack.clone());
                    state.ip += 1;
                }
                Instruction::Exit => {
                    exits.push(mem::take(&mut state.stack));
                    states.pop();
                }
                Instruction::Subroutine(body) => {
                    state.stack.push(Type::Function(Some(Rc::clone(body))));
                    state.ip += 1;
                }
            }
        }

        Ok(exits)
    }
}

fn index_labels(irs: &[Instruction]) -> HashMap<&str, usize> {
    let mut labels = HashMap::new();
    for (i, instr) in irs.iter().enumerate() {
        if let Instruction::Label(label) = instr {
            labels.entry(label.as_str()).or_insert(i);
        }
    }
    labels
}

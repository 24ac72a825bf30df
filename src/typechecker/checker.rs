/**
Program-level checker

Builds the signature table for a program, then runs the symbolic stack
machine over each native function body and verifies every exit stack
against the declared returns.
*/
use crate::ir::{FnBody, FnDecl, Program};
use crate::typechecker::errors::{CheckError, CheckErrorKind, CheckResult};
use crate::typechecker::machine::{Machine, Trace};
use crate::typechecker::matching::is_matching;
use crate::typechecker::signatures::{GenericCounter, SignatureTable};
use crate::typechecker::types::{stack_pop, AbstractStack, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckerOptions {
    /// Collect the instruction-level trace
    pub trace: bool,

    /// How deep `ap`, `tail` and `repeat` may re-enter the machine
    pub max_apply_depth: usize,
}

impl Default for CheckerOptions {
    fn default() -> Self {
        CheckerOptions {
            trace: false,
            max_apply_depth: 64,
        }
    }
}

/// The main type checker
pub struct TypeChecker {
    options: CheckerOptions,
    trace: Trace,
}

impl TypeChecker {
    pub fn new() -> Self {
        Self::with_options(CheckerOptions::default())
    }

    pub fn with_options(options: CheckerOptions) -> Self {
        TypeChecker {
            options,
            trace: Trace::new(options.trace),
        }
    }

    /// A checker that records the trace lines of everything it checks
    pub fn with_trace() -> Self {
        Self::with_options(CheckerOptions {
            trace: true,
            ..CheckerOptions::default()
        })
    }

    pub fn trace(&self) -> &[String] {
        self.trace.lines()
    }

    /// Build the signature table for the program's declarations
    pub fn signatures(&mut self, program: &Program) -> CheckResult<SignatureTable> {
        SignatureTable::build(program, &mut GenericCounter::new(), &mut self.trace)
    }

    /// Type check a complete program
    pub fn check_program(&mut self, program: &Program) -> CheckResult<()> {
        let mut counter = GenericCounter::new();
        let table = SignatureTable::build(program, &mut counter, &mut self.trace)?;

        for decl in &program.fn_decls {
            self.check_function(&table, &mut counter, decl)
                .map_err(|e| e.at(decl.span))?;
        }

        Ok(())
    }

    fn check_function(
        &mut self,
        table: &SignatureTable,
        counter: &mut GenericCounter,
        decl: &FnDecl,
    ) -> CheckResult<()> {
        let FnBody::Native(body) = &decl.body else {
            log::debug!("skipping foreign function {}", decl.name);
            return Ok(());
        };
        let expectation = table
            .expectation(&decl.name)
            .ok_or_else(|| {
                CheckError::new(
                    &decl.name,
                    CheckErrorKind::UndefinedFunction {
                        callee: decl.name.clone(),
                    },
                )
            })?
            .instantiate(counter);

        // An ellipsis argument arrives as one stack value beneath the named arguments
        let mut from = Vec::with_capacity(expectation.takes.len() + 1);
        if let Some(element) = &expectation.ellipsis {
            from.push(Type::stack_of(vec![Type::many(element.clone())]));
        }
        from.extend(expectation.takes.iter().cloned());

        log::debug!("checking function {}", decl.name);
        let mut machine = Machine::new(table, &mut self.trace, self.options.max_apply_depth);
        let exits = machine.run_stack(from, &decl.name, body)?;
        log::debug!(
            "{}: {} exits after {} steps",
            decl.name,
            exits.len(),
            machine.steps()
        );

        for exit in &exits {
            verify_returns(&decl.name, &expectation.leaves, exit)?;
        }
        Ok(())
    }
}

impl Default for TypeChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Type check a program with the default options
pub fn check(program: &Program) -> CheckResult<()> {
    TypeChecker::new().check_program(program)
}

/// Match the declared returns against the top of an exit stack
///
/// Values below the declared returns are not inspected.
fn verify_returns(name: &str, leaves: &[Type], exit: &[Type]) -> CheckResult<()> {
    let mut stack: AbstractStack = exit.to_vec();
    for expect in leaves.iter().rev() {
        let Some(got) = stack.last() else {
            return Err(CheckError::new(
                name,
                CheckErrorKind::MissingReturn {
                    expected: expect.to_string(),
                },
            ));
        };
        if !is_matching(got, expect, None) {
            return Err(CheckError::new(
                name,
                CheckErrorKind::ReturnMismatch {
                    expected: expect.to_string(),
                    got: got.to_string(),
                },
            ));
        }
        stack_pop(&mut stack);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Argument, Instruction, Span, TypeSig, Variadic};

    fn returns_int(body: Vec<Instruction>) -> Program {
        Program {
            type_decls: vec![],
            fn_decls: vec![FnDecl::native("main", vec![], vec![TypeSig::new("int")], body)],
        }
    }

    #[test]
    fn test_literal_return() {
        let program = returns_int(vec![Instruction::PushInt(1), Instruction::Exit]);
        assert!(check(&program).is_ok());
    }

    #[test]
    fn test_missing_return() {
        let program = returns_int(vec![Instruction::Exit]);
        let err = check(&program).unwrap_err();
        assert_eq!(err.name, "main");
        assert!(matches!(err.kind, CheckErrorKind::MissingReturn { .. }));
    }

    #[test]
    fn test_return_mismatch() {
        let program = returns_int(vec![Instruction::PushStr("no".to_string()), Instruction::Exit]);
        let err = check(&program).unwrap_err();
        assert_eq!(
            err.kind,
            CheckErrorKind::ReturnMismatch {
                expected: "int".to_string(),
                got: "string".to_string(),
            }
        );
    }

    #[test]
    fn test_extra_values_below_returns_are_ignored() {
        let program = returns_int(vec![
            Instruction::PushStr("below".to_string()),
            Instruction::PushInt(1),
            Instruction::Exit,
        ]);
        assert!(check(&program).is_ok());
    }

    #[test]
    fn test_arithmetic_results() {
        let ints = returns_int(vec![
            Instruction::PushInt(1),
            Instruction::PushInt(2),
            Instruction::call("+"),
            Instruction::Exit,
        ]);
        assert!(check(&ints).is_ok());

        let mixed = Program {
            type_decls: vec![],
            fn_decls: vec![FnDecl::native(
                "main",
                vec![],
                vec![TypeSig::new("float")],
                vec![
                    Instruction::PushInt(1),
                    Instruction::PushFloat(2.0),
                    Instruction::call("+"),
                    Instruction::Exit,
                ],
            )],
        };
        assert!(check(&mixed).is_ok());

        let bad = returns_int(vec![
            Instruction::PushStr("s".to_string()),
            Instruction::PushInt(2),
            Instruction::call("+"),
            Instruction::Exit,
        ]);
        let err = check(&bad).unwrap_err();
        assert_eq!(err.name, "+");
        assert!(matches!(err.kind, CheckErrorKind::TypeMismatch { .. }));
    }

    #[test]
    fn test_arguments_are_on_the_initial_stack() {
        // ( a : int b : string -- string int ) swp
        let program = Program {
            type_decls: vec![],
            fn_decls: vec![FnDecl::native(
                "flip",
                vec![
                    Argument::new("a", TypeSig::new("int")),
                    Argument::new("b", TypeSig::new("string")),
                ],
                vec![TypeSig::new("string"), TypeSig::new("int")],
                vec![Instruction::call("swp"), Instruction::Exit],
            )],
        };
        assert!(check(&program).is_ok());
    }

    #[test]
    fn test_generic_identity() {
        let program = Program {
            type_decls: vec![],
            fn_decls: vec![FnDecl::native(
                "id",
                vec![Argument::new("x", TypeSig::new("#a"))],
                vec![TypeSig::new("#a")],
                vec![Instruction::Exit],
            )],
        };
        assert!(check(&program).is_ok());

        let program = Program {
            type_decls: vec![],
            fn_decls: vec![FnDecl::native(
                "forge",
                vec![Argument::new("x", TypeSig::new("#a"))],
                vec![TypeSig::new("#b")],
                vec![Instruction::Exit],
            )],
        };
        assert!(check(&program).is_err());
    }

    #[test]
    fn test_ellipsis_argument_is_a_stack_value() {
        let mut decl = FnDecl::native(
            "count",
            vec![],
            vec![TypeSig::new("int")],
            vec![Instruction::call("len"), Instruction::call("nip"), Instruction::Exit],
        );
        decl.ellipsis = Some(Variadic {
            element: Some(TypeSig::new("int")),
        });
        let program = Program {
            type_decls: vec![],
            fn_decls: vec![decl],
        };
        assert!(check(&program).is_ok());
    }

    #[test]
    fn test_foreign_functions_are_trusted() {
        let mut decl = FnDecl::native("puts", vec![], vec![TypeSig::new("int")], vec![]);
        decl.body = FnBody::Foreign;
        assert!(decl.is_foreign());
        let program = Program {
            type_decls: vec![],
            fn_decls: vec![decl],
        };
        assert!(check(&program).is_ok());
    }

    #[test]
    fn test_error_carries_declaration_span() {
        let mut program = returns_int(vec![Instruction::call("nope")]);
        program.fn_decls[0].span = Some(Span::new(3, 1));
        let err = check(&program).unwrap_err();
        assert_eq!(err.span, Some(Span::new(3, 1)));
    }

    #[test]
    fn test_trace_collects_signatures_and_steps() {
        let program = returns_int(vec![Instruction::PushInt(1), Instruction::Exit]);
        let mut checker = TypeChecker::with_trace();
        checker.check_program(&program).unwrap();
        let trace = checker.trace();
        assert_eq!(trace[0], "fn main :: [] -> [int]");
        assert!(trace.iter().any(|line| line == "On : Push 1"));
    }

    #[test]
    fn test_self_application_is_bounded() {
        // sub { dup ap } dup ap
        let body = vec![
            Instruction::subroutine(vec![Instruction::call("dup"), Instruction::call("ap")]),
            Instruction::call("dup"),
            Instruction::call("ap"),
            Instruction::Exit,
        ];
        let program = Program {
            type_decls: vec![],
            fn_decls: vec![FnDecl::native("omega", vec![], vec![], body)],
        };
        let mut checker = TypeChecker::with_options(CheckerOptions {
            trace: false,
            max_apply_depth: 4,
        });
        assert!(checker.check_program(&program).is_ok());
    }

    #[test]
    fn test_recursive_generic_function() {
        // ( x : #a -- #a ): push 1 push 2 < jt done call id label done exit
        let program = Program {
            type_decls: vec![],
            fn_decls: vec![FnDecl::native(
                "id",
                vec![Argument::new("x", TypeSig::new("#a"))],
                vec![TypeSig::new("#a")],
                vec![
                    Instruction::PushInt(1),
                    Instruction::PushInt(2),
                    Instruction::call("<"),
                    Instruction::jump_true("done"),
                    Instruction::call("id"),
                    Instruction::label("done"),
                    Instruction::Exit,
                ],
            )],
        };
        assert_eq!(check(&program), Ok(()));
    }
}

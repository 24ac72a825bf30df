/// Linear IR and declarations consumed by the checker
///
/// The traverser flattens each function's grid into a list of
/// `Instruction`s; the parser supplies the declared signatures around them.

use std::fmt;
use std::rc::Rc;

/// A location in the source listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(line: usize, column: usize) -> Self {
        Span { line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// One linear IR instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    PushInt(i32),
    PushFloat(f32),
    PushChar(char),
    PushStr(String),
    PushBool(bool),

    /// Call a builtin, a user function or an aggregate accessor by name
    Call(String),

    /// Pop a Bool and jump to the label when it is true
    JumpTrue(String),
    Goto(String),
    Label(String),
    Exit,

    /// Push a subroutine value whose body is known statically
    Subroutine(Rc<Vec<Instruction>>),
}

impl Instruction {
    pub fn call(name: &str) -> Self {
        Instruction::Call(name.to_string())
    }

    pub fn label(name: &str) -> Self {
        Instruction::Label(name.to_string())
    }

    pub fn jump_true(label: &str) -> Self {
        Instruction::JumpTrue(label.to_string())
    }

    pub fn goto(label: &str) -> Self {
        Instruction::Goto(label.to_string())
    }

    pub fn subroutine(body: Vec<Instruction>) -> Self {
        Instruction::Subroutine(Rc::new(body))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::PushInt(n) => write!(f, "Push {}", n),
            Instruction::PushFloat(x) => write!(f, "Push {:?}", x),
            Instruction::PushChar(c) => write!(f, "Push {:?}", c),
            Instruction::PushStr(s) => write!(f, "Push {:?}", s),
            Instruction::PushBool(b) => write!(f, "Push {}", b),
            Instruction::Call(name) => write!(f, "Call {}", name),
            Instruction::JumpTrue(label) => write!(f, "JumpTrue {}", label),
            Instruction::Goto(label) => write!(f, "Goto {}", label),
            Instruction::Label(label) => write!(f, "Label {}", label),
            Instruction::Exit => write!(f, "Exit"),
            Instruction::Subroutine(body) => write!(f, "Subroutine ({} instructions)", body.len()),
        }
    }
}

/// A declared type signature as written in the source
///
/// `name` is a primitive name, a `#`-prefixed generic or a user type name.
/// `is_stack` marks a variadic tail: a stack value holding any number of `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSig {
    pub name: String,
    pub is_stack: bool,
}

impl TypeSig {
    pub fn new(name: &str) -> Self {
        TypeSig {
            name: name.to_string(),
            is_stack: false,
        }
    }

    pub fn stack_of(name: &str) -> Self {
        TypeSig {
            name: name.to_string(),
            is_stack: true,
        }
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_stack {
            write!(f, "[{}]", self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// A named function argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub name: String,
    pub sig: TypeSig,
}

impl Argument {
    pub fn new(name: &str, sig: TypeSig) -> Self {
        Argument {
            name: name.to_string(),
            sig,
        }
    }
}

/// A trailing `...` in an argument or return list
///
/// Without an element type the region may hold values of any type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Variadic {
    pub element: Option<TypeSig>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FnBody {
    /// Body lowered from the grid, checked statically
    Native(Rc<Vec<Instruction>>),

    /// Implemented outside the language; only its signature is trusted
    Foreign,
}

/// Function declaration
///
/// Arguments and returns are listed top of stack first.
#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    pub name: String,
    pub args: Vec<Argument>,
    pub ellipsis: Option<Variadic>,
    pub rets: Vec<TypeSig>,
    pub rest: Option<Variadic>,
    pub body: FnBody,
    pub span: Option<Span>,
}

impl FnDecl {
    /// A native function with fixed arguments and returns
    pub fn native(name: &str, args: Vec<Argument>, rets: Vec<TypeSig>, body: Vec<Instruction>) -> Self {
        FnDecl {
            name: name.to_string(),
            args,
            ellipsis: None,
            rets,
            rest: None,
            body: FnBody::Native(Rc::new(body)),
            span: None,
        }
    }

    pub fn is_foreign(&self) -> bool {
        matches!(self.body, FnBody::Foreign)
    }
}

/// Aggregate type declaration
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub name: String,
    pub fields: Vec<(String, TypeSig)>,
    pub span: Option<Span>,
}

impl TypeDecl {
    pub fn new(name: &str, fields: Vec<(String, TypeSig)>) -> Self {
        TypeDecl {
            name: name.to_string(),
            fields,
            span: None,
        }
    }
}

/// A complete program as seen by the checker
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub type_decls: Vec<TypeDecl>,
    pub fn_decls: Vec<FnDecl>,
}

impl Program {
    pub fn function(&self, name: &str) -> Option<&FnDecl> {
        self.fn_decls.iter().find(|decl| decl.name == name)
    }
}

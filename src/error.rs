//! The error taxonomy of the toolchain.
//!
//! Compile-phase errors abort the translation at the first failure; runtime
//! errors halt the virtual machine.  [CompilerBug] is reserved for states
//! that a user program can never reach: it signals a defect in the compiler
//! or the VM, not a mistake in the source, and the drivers print it with a
//! distinct `INTERNAL COMPILER ERROR:` prefix.

use std::fmt;

use crate::common::{Id, Type};
use crate::middle::mem::Segment;
use crate::middle::quad::Op;

/// An unexpected internal state.  User programs cannot trigger these.
#[derive(Clone, PartialEq, Eq)]
pub struct CompilerBug(String);

impl CompilerBug {
    pub fn new(message: impl Into<String>) -> Self {
        CompilerBug(message.into())
    }
}

impl fmt::Display for CompilerBug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Compiler bug: {}", self.0)
    }
}

impl fmt::Debug for CompilerBug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// Everything that can go wrong while translating a program.
#[derive(Clone, Debug, PartialEq)]
pub enum CompileError {
    /// The operand stack drained while operators were still pending.
    MissingOperand,
    DuplicateVariable { name: Id },
    UndeclaredVariable { name: Id },
    DuplicateFunction { name: Id },
    UndeclaredFunction { name: Id },
    /// The operator has no entry in the semantic cube at all.
    InvalidOperator { op: Op },
    /// The operator exists but rejects this pair of operand types.
    InvalidOperation { left: Type, op: Op, right: Type },
    WrongNumberOfParameters { func: Id, expected: usize, got: usize },
    InvalidParameterType { func: Id, expected: Type, got: Type },
    /// An address partition ran out of its 2000 slots.
    OutOfMemory { segment: Segment, ty: Type },
    Bug(CompilerBug),
}

impl CompileError {
    pub fn bug(message: impl Into<String>) -> Self {
        CompileError::Bug(CompilerBug::new(message))
    }

    pub fn is_bug(&self) -> bool {
        matches!(self, CompileError::Bug(_))
    }
}

impl From<CompilerBug> for CompileError {
    fn from(bug: CompilerBug) -> Self {
        CompileError::Bug(bug)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use CompileError::*;

        match self {
            MissingOperand => write!(f, "Missing operand in expression"),
            DuplicateVariable { name } => write!(f, "Variable '{name}' ya declarada"),
            UndeclaredVariable { name } => write!(f, "Variable no declarada: '{name}'"),
            DuplicateFunction { name } => write!(f, "Function '{name}' already declared"),
            UndeclaredFunction { name } => write!(f, "Función no declarada: '{name}'"),
            InvalidOperator { op } => write!(f, "Operador inválido: '{op}'"),
            InvalidOperation { left, op, right } => write!(
                f,
                "No se puede aplicar operador '{op}' entre '{left}' y '{right}'"
            ),
            WrongNumberOfParameters { func, expected, got } => write!(
                f,
                "La función '{func}' espera {expected} argumento{}, pero recibió {got}.",
                if *expected == 1 { "" } else { "s" }
            ),
            InvalidParameterType { func, expected, got } => write!(
                f,
                "En la función '{func}', se esperaba un valor de tipo '{expected}', \
                 pero se recibió uno de tipo '{got}'."
            ),
            OutOfMemory { segment, ty } => {
                write!(f, "Out of memory for {ty} in segment {segment}")
            }
            Bug(bug) => write!(f, "{bug}"),
        }
    }
}

/// Everything that can go wrong while executing a program.
#[derive(Debug)]
pub enum RuntimeError {
    DivisionByZero,
    /// The output stream rejected a `PRINT`.
    Io(std::io::Error),
    Bug(CompilerBug),
}

impl RuntimeError {
    pub fn bug(message: impl Into<String>) -> Self {
        RuntimeError::Bug(CompilerBug::new(message))
    }

    pub fn is_bug(&self) -> bool {
        matches!(self, RuntimeError::Bug(_))
    }
}

impl From<CompilerBug> for RuntimeError {
    fn from(bug: CompilerBug) -> Self {
        RuntimeError::Bug(bug)
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::DivisionByZero => write!(f, "Division by zero is not allowed."),
            RuntimeError::Io(e) => write!(f, "Output error: {e}"),
            RuntimeError::Bug(bug) => write!(f, "{bug}"),
        }
    }
}

//! Quadruples: the four-field instructions of the intermediate code, and the
//! append-only list that stores them and supports backpatching.

use derive_more::Display;

use crate::common::Id;
use crate::error::CompilerBug;
use crate::middle::mem::Addr;

/// Every operator that can head a quadruple.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
pub enum Op {
    #[display("+")]
    Add,
    #[display("-")]
    Sub,
    #[display("*")]
    Mul,
    #[display("/")]
    Div,
    #[display("<")]
    Lt,
    #[display(">")]
    Gt,
    #[display("!=")]
    Neq,
    #[display("=")]
    Assign,
    #[display("PRINT")]
    Print,
    #[display("GOTO")]
    Goto,
    #[display("GOTOF")]
    Gotof,
    #[display("ERA")]
    Era,
    #[display("PARAM")]
    Param,
    #[display("GOSUB")]
    Gosub,
    #[display("END_FUNC")]
    EndFunc,
    #[display("END_PROG")]
    EndProg,
}

impl Op {
    /// Binding strength inside expressions.  `None` for operators that never
    /// appear on the operator stack.
    pub fn precedence(self) -> Option<u8> {
        match self {
            Op::Mul | Op::Div => Some(4),
            Op::Add | Op::Sub => Some(3),
            Op::Lt | Op::Gt => Some(2),
            Op::Neq => Some(1),
            _ => None,
        }
    }
}

/// What the `result` field of a quadruple designates.  Which alternative is
/// legal depends on the operator.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum Target {
    /// A memory address (arith/rel temporaries, `=` destination, `PRINT`).
    #[display("{_0}")]
    Addr(Addr),
    /// A quadruple index (`GOTO`, `GOTOF`).
    #[display("{_0}")]
    Quad(usize),
    /// A function name (`ERA`, `GOSUB`).
    #[display("{_0}")]
    Func(Id),
    /// A parameter position (`PARAM`).
    #[display("{_0}")]
    Param(usize),
}

/// One intermediate instruction: `(op, left, right, result)`, nulls allowed.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Quadruple {
    pub op: Op,
    pub left: Option<Addr>,
    pub right: Option<Addr>,
    pub result: Option<Target>,
}

impl Quadruple {
    pub fn new(op: Op, left: Option<Addr>, right: Option<Addr>, result: Option<Target>) -> Self {
        Quadruple { op, left, right, result }
    }

    pub fn left_addr(&self) -> Result<Addr, CompilerBug> {
        self.left
            .ok_or_else(|| CompilerBug::new(format!("quadruple '{}' carries no left address", self.op)))
    }

    pub fn right_addr(&self) -> Result<Addr, CompilerBug> {
        self.right
            .ok_or_else(|| CompilerBug::new(format!("quadruple '{}' carries no right address", self.op)))
    }

    pub fn result_addr(&self) -> Result<Addr, CompilerBug> {
        match self.result {
            Some(Target::Addr(addr)) => Ok(addr),
            _ => Err(CompilerBug::new(format!(
                "quadruple '{}' carries no result address",
                self.op
            ))),
        }
    }

    pub fn result_quad(&self) -> Result<usize, CompilerBug> {
        match self.result {
            Some(Target::Quad(idx)) => Ok(idx),
            _ => Err(CompilerBug::new(format!(
                "quadruple '{}' carries no jump target",
                self.op
            ))),
        }
    }

    pub fn result_func(&self) -> Result<Id, CompilerBug> {
        match self.result {
            Some(Target::Func(name)) => Ok(name),
            _ => Err(CompilerBug::new(format!(
                "quadruple '{}' carries no function name",
                self.op
            ))),
        }
    }

    pub fn result_param(&self) -> Result<usize, CompilerBug> {
        match self.result {
            Some(Target::Param(idx)) => Ok(idx),
            _ => Err(CompilerBug::new(format!(
                "quadruple '{}' carries no parameter position",
                self.op
            ))),
        }
    }
}

impl std::fmt::Display for Quadruple {
    /// Compact, column-aligned representation with `-` for null fields.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fmt_addr = |a: Option<Addr>| a.map_or("-".to_string(), |a| a.to_string());
        let result = self.result.map_or("-".to_string(), |r| r.to_string());
        write!(
            f,
            "{:<6} {:<6} {:<6} {}",
            self.op.to_string(),
            fmt_addr(self.left),
            fmt_addr(self.right),
            result
        )
    }
}

/// The append-only program store.
#[derive(Default, Debug)]
pub struct QuadruplesList {
    quads: Vec<Quadruple>,
}

impl QuadruplesList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the next appended quadruple will occupy.
    pub fn next_quad(&self) -> usize {
        self.quads.len()
    }

    /// Index of the most recently appended quadruple.
    pub fn last_index(&self) -> Result<usize, CompilerBug> {
        self.quads
            .len()
            .checked_sub(1)
            .ok_or_else(|| CompilerBug::new("no quadruples available"))
    }

    pub fn append(&mut self, quad: Quadruple) {
        self.quads.push(quad);
    }

    pub fn get(&self, index: usize) -> Option<&Quadruple> {
        self.quads.get(index)
    }

    pub fn last(&self) -> Result<&Quadruple, CompilerBug> {
        self.quads
            .last()
            .ok_or_else(|| CompilerBug::new("no quadruples available"))
    }

    /// Fill in the jump target of a pending `GOTO`/`GOTOF`.
    pub fn patch(&mut self, index: usize, target: usize) -> Result<(), CompilerBug> {
        let quad = self
            .quads
            .get_mut(index)
            .ok_or_else(|| CompilerBug::new(format!("patch index {index} out of range")))?;
        match quad.op {
            Op::Goto | Op::Gotof => {
                quad.result = Some(Target::Quad(target));
                Ok(())
            }
            op => Err(CompilerBug::new(format!(
                "attempted to patch non-jump quadruple '{op}' at {index}"
            ))),
        }
    }

    pub fn len(&self) -> usize {
        self.quads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quads.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Quadruple> {
        self.quads.iter()
    }
}

impl<'a> IntoIterator for &'a QuadruplesList {
    type Item = &'a Quadruple;
    type IntoIter = std::slice::Iter<'a, Quadruple>;

    fn into_iter(self) -> Self::IntoIter {
        self.quads.iter()
    }
}

impl std::fmt::Display for QuadruplesList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, quad) in self.quads.iter().enumerate() {
            writeln!(f, "{i:>3}: {quad}")?;
        }
        Ok(())
    }
}

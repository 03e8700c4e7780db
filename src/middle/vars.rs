//! Per-scope variable tables.

use indexmap::IndexMap;

use crate::common::{Id, Type};
use crate::error::CompileError;
use crate::middle::mem::Addr;

/// A declared variable: its type and its assigned virtual address.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Var {
    pub ty: Type,
    pub addr: Addr,
}

/// Mapping from names to variables within one scope.  Iteration follows
/// insertion order, which the dumps rely on.
#[derive(Default, Debug)]
pub struct VarTable {
    table: IndexMap<Id, Var>,
}

impl VarTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: Id, ty: Type, addr: Addr) -> Result<(), CompileError> {
        if self.table.contains_key(&name) {
            return Err(CompileError::DuplicateVariable { name });
        }
        self.table.insert(name, Var { ty, addr });
        Ok(())
    }

    pub fn lookup(&self, name: Id) -> Option<&Var> {
        self.table.get(&name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Id, &Var)> {
        self.table.iter()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl std::fmt::Display for VarTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.table.is_empty() {
            return write!(f, "<empty>");
        }
        for (i, (name, var)) in self.table.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{name}: {} @ {}", var.ty, var.addr)?;
        }
        Ok(())
    }
}

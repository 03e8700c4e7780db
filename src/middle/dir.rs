//! The function directory: per-function metadata (signature, variable table,
//! entry quadruple, frame resources), plus the pseudo-function that owns the
//! global scope.

use derive_more::Display;
use indexmap::IndexMap;

use crate::common::{global_scope, Id, Type};
use crate::error::CompileError;
use crate::middle::mem::{Counters, MemoryManager, Segment};
use crate::middle::vars::{Var, VarTable};

/// Per-function counts sizing each activation record: local variables and
/// temporaries, segmented by type.  Fixed once the function body ends.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct FrameResources {
    pub vars_int: usize,
    pub vars_float: usize,
    pub temps_int: usize,
    pub temps_float: usize,
}

impl FrameResources {
    /// Build from the `local` and `temp` segment counters captured at the
    /// end of a function body.
    pub fn from_snapshots(locals: Counters, temps: Counters) -> Self {
        FrameResources {
            vars_int: locals.ints,
            vars_float: locals.floats,
            temps_int: temps.ints,
            temps_float: temps.floats,
        }
    }
}

impl std::fmt::Display for FrameResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} | {}/{}",
            self.vars_int, self.vars_float, self.temps_int, self.temps_float
        )
    }
}

/// All functions are procedures; there is no return-value protocol.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum FunctionKind {
    #[display("void")]
    Void,
}

/// One directory entry.
#[derive(Debug)]
pub struct Function {
    pub kind: FunctionKind,
    /// Index of the function's first quadruple.  For the global
    /// pseudo-function this stays unset until the program prologue `GOTO`
    /// is patched to `main`.
    pub entry_quad: Option<usize>,
    pub signature: Vec<Type>,
    pub vars: VarTable,
    pub frame_resources: Option<FrameResources>,
}

/// Directory of every function in the program.  The `global` pseudo-entry is
/// present from construction.
#[derive(Debug)]
pub struct FunctionDir {
    dir: IndexMap<Id, Function>,
}

impl FunctionDir {
    pub fn new() -> Self {
        let mut dir = IndexMap::new();
        dir.insert(
            global_scope(),
            Function {
                kind: FunctionKind::Void,
                entry_quad: None,
                signature: Vec::new(),
                vars: VarTable::new(),
                frame_resources: None,
            },
        );
        FunctionDir { dir }
    }

    pub fn add_function(
        &mut self,
        name: Id,
        kind: FunctionKind,
        entry_quad: usize,
    ) -> Result<(), CompileError> {
        if self.dir.contains_key(&name) {
            return Err(CompileError::DuplicateFunction { name });
        }
        self.dir.insert(
            name,
            Function {
                kind,
                entry_quad: Some(entry_quad),
                signature: Vec::new(),
                vars: VarTable::new(),
                frame_resources: None,
            },
        );
        Ok(())
    }

    pub fn get_function(&self, name: Id) -> Result<&Function, CompileError> {
        self.dir
            .get(&name)
            .ok_or(CompileError::UndeclaredFunction { name })
    }

    fn get_function_mut(&mut self, name: Id) -> Result<&mut Function, CompileError> {
        self.dir
            .get_mut(&name)
            .ok_or(CompileError::UndeclaredFunction { name })
    }

    /// Declare a variable in the given scope, allocating its address from
    /// the segment that scope lives in.
    pub fn add_var(
        &mut self,
        scope: Id,
        name: Id,
        ty: Type,
        mem: &mut MemoryManager,
    ) -> Result<(), CompileError> {
        let segment = if scope == global_scope() {
            Segment::Global
        } else {
            Segment::Local
        };
        let addr = mem.new_addr(segment, ty)?;
        self.get_function_mut(scope)?.vars.add(name, ty, addr)
    }

    /// Look a name up in the given scope, falling back to the global scope.
    pub fn get_var(&self, scope: Id, name: Id) -> Result<&Var, CompileError> {
        if let Some(var) = self.get_function(scope)?.vars.lookup(name) {
            return Ok(var);
        }
        self.get_function(global_scope())?
            .vars
            .lookup(name)
            .ok_or(CompileError::UndeclaredVariable { name })
    }

    pub fn add_signature_type(&mut self, name: Id, ty: Type) -> Result<(), CompileError> {
        self.get_function_mut(name)?.signature.push(ty);
        Ok(())
    }

    pub fn set_frame_resources(
        &mut self,
        name: Id,
        frame: FrameResources,
    ) -> Result<(), CompileError> {
        self.get_function_mut(name)?.frame_resources = Some(frame);
        Ok(())
    }

    pub fn set_entry_quad(&mut self, name: Id, entry: usize) -> Result<(), CompileError> {
        self.get_function_mut(name)?.entry_quad = Some(entry);
        Ok(())
    }

    /// Check one call argument against the callee's signature.
    pub fn validate_signature_arg(
        &self,
        name: Id,
        ty: Type,
        index: usize,
    ) -> Result<(), CompileError> {
        let func = self.get_function(name)?;
        if index >= func.signature.len() {
            return Err(CompileError::WrongNumberOfParameters {
                func: name,
                expected: func.signature.len(),
                got: index + 1,
            });
        }
        let expected = func.signature[index];
        if expected != ty {
            return Err(CompileError::InvalidParameterType {
                func: name,
                expected,
                got: ty,
            });
        }
        Ok(())
    }

    /// Check that a finished call supplied every parameter.
    pub fn validate_signature_length(&self, name: Id, count: usize) -> Result<(), CompileError> {
        let func = self.get_function(name)?;
        if func.signature.len() != count {
            return Err(CompileError::WrongNumberOfParameters {
                func: name,
                expected: func.signature.len(),
                got: count,
            });
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Id, &Function)> {
        self.dir.iter()
    }
}

impl Default for FunctionDir {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FunctionDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Function Directory")?;
        write!(f, "{}", "─".repeat(72))?;
        for (name, func) in &self.dir {
            let start = func
                .entry_quad
                .map_or("—".to_string(), |entry| entry.to_string());
            let frame = func
                .frame_resources
                .map_or("—".to_string(), |frame| frame.to_string());
            let signature = if func.signature.is_empty() {
                "—".to_string()
            } else {
                func.signature
                    .iter()
                    .map(Type::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            write!(
                f,
                "\n{name} │ {} │ start: {start} │ frame: {frame} │ sig: {signature}",
                func.kind
            )?;
            for line in func.vars.to_string().lines() {
                write!(f, "\n    {line}")?;
            }
        }
        Ok(())
    }
}

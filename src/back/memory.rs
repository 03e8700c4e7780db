//! Runtime memory: per-call activation records, the call stack, and the
//! unified view over constants, globals, and the active frame.
//!
//! Calls go through a pending-record protocol: `ERA` allocates a record
//! without pushing it, `PARAM`s write into it while the caller's frame is
//! still the active one (argument temporaries live in the caller), and
//! `GOSUB` commits it onto the call stack together with the return index.

use crate::common::{global_scope, Id, Map, Type, Value};
use crate::error::{CompilerBug, RuntimeError};
use crate::middle::consts::ConstantsTable;
use crate::middle::dir::{FrameResources, FunctionDir};
use crate::middle::mem::{Addr, MemoryManager, Segment};

/// Typed storage of one function call, sized exactly by the function's
/// frame resources.
pub struct ActivationRecord {
    local_int: Vec<Option<Value>>,
    local_float: Vec<Option<Value>>,
    temp_int: Vec<Option<Value>>,
    temp_float: Vec<Option<Value>>,
}

impl ActivationRecord {
    pub fn new(frame: FrameResources) -> Self {
        ActivationRecord {
            local_int: vec![None; frame.vars_int],
            local_float: vec![None; frame.vars_float],
            temp_int: vec![None; frame.temps_int],
            temp_float: vec![None; frame.temps_float],
        }
    }

    fn partition(&self, segment: Segment, ty: Type) -> Result<&Vec<Option<Value>>, CompilerBug> {
        match (segment, ty) {
            (Segment::Local, Type::Int) => Ok(&self.local_int),
            (Segment::Local, Type::Float) => Ok(&self.local_float),
            (Segment::Temp, Type::Int) => Ok(&self.temp_int),
            (Segment::Temp, Type::Float) => Ok(&self.temp_float),
            _ => Err(CompilerBug::new(format!(
                "activation records hold no ({segment}, {ty}) partition"
            ))),
        }
    }

    fn partition_mut(
        &mut self,
        segment: Segment,
        ty: Type,
    ) -> Result<&mut Vec<Option<Value>>, CompilerBug> {
        match (segment, ty) {
            (Segment::Local, Type::Int) => Ok(&mut self.local_int),
            (Segment::Local, Type::Float) => Ok(&mut self.local_float),
            (Segment::Temp, Type::Int) => Ok(&mut self.temp_int),
            (Segment::Temp, Type::Float) => Ok(&mut self.temp_float),
            _ => Err(CompilerBug::new(format!(
                "activation records hold no ({segment}, {ty}) partition"
            ))),
        }
    }

    pub fn get(
        &self,
        segment: Segment,
        ty: Type,
        index: usize,
    ) -> Result<Option<&Value>, CompilerBug> {
        self.partition(segment, ty)?
            .get(index)
            .map(Option::as_ref)
            .ok_or_else(|| {
                CompilerBug::new(format!("index {index} outside the ({segment}, {ty}) partition"))
            })
    }

    pub fn set(
        &mut self,
        segment: Segment,
        ty: Type,
        index: usize,
        value: Value,
    ) -> Result<(), CompilerBug> {
        let partition = self.partition_mut(segment, ty)?;
        match partition.get_mut(index) {
            Some(slot) => {
                *slot = Some(value);
                Ok(())
            }
            None => Err(CompilerBug::new(format!(
                "index {index} outside the ({segment}, {ty}) partition"
            ))),
        }
    }
}

/// One live call: who was called, its storage, and where to resume.
pub struct CallStackEntry {
    pub function: Id,
    pub record: ActivationRecord,
    /// `None` only for the base frame, which nothing returns from.
    pub return_index: Option<usize>,
}

/// The stack of live calls.  The base entry belongs to the global
/// pseudo-function and exists for the whole run.
#[derive(Default)]
pub struct CallStack {
    stack: Vec<CallStackEntry>,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: CallStackEntry) {
        self.stack.push(entry);
    }

    pub fn pop(&mut self) -> Result<CallStackEntry, CompilerBug> {
        self.stack
            .pop()
            .ok_or_else(|| CompilerBug::new("attempted to pop an empty call stack"))
    }

    pub fn top(&self) -> Result<&CallStackEntry, CompilerBug> {
        self.stack
            .last()
            .ok_or_else(|| CompilerBug::new("the call stack is empty"))
    }

    pub fn top_mut(&mut self) -> Result<&mut CallStackEntry, CompilerBug> {
        self.stack
            .last_mut()
            .ok_or_else(|| CompilerBug::new("the call stack is empty"))
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

/// What the VM needs to know about a function at run time.
struct RuntimeFunction {
    frame: FrameResources,
    signature: Vec<Type>,
    entry: usize,
}

/// The unified runtime memory.
pub struct Memory {
    constants: Map<Addr, Value>,
    globals: Map<Addr, Value>,
    functions: Map<Id, RuntimeFunction>,
    calls: CallStack,
    /// The frame being filled by `PARAM`s between `ERA` and `GOSUB`.
    pending: Option<CallStackEntry>,
}

impl Memory {
    /// Build the runtime memory from the compile-phase handoff.  Fails if
    /// any function is missing its frame resources or entry point, which
    /// would mean the translation never finished.
    pub fn new(consts: &ConstantsTable, dir: &FunctionDir) -> Result<Self, CompilerBug> {
        let constants: Map<Addr, Value> =
            consts.iter().map(|(addr, value)| (addr, value.clone())).collect();

        let mut functions = Map::new();
        for (name, func) in dir.iter() {
            let frame = func.frame_resources.ok_or_else(|| {
                CompilerBug::new(format!("function '{name}' has no frame resources"))
            })?;
            let entry = func.entry_quad.ok_or_else(|| {
                CompilerBug::new(format!("function '{name}' has no entry quadruple"))
            })?;
            functions.insert(
                *name,
                RuntimeFunction { frame, signature: func.signature.clone(), entry },
            );
        }

        let base_frame = functions
            .get(&global_scope())
            .ok_or_else(|| CompilerBug::new("no global pseudo-function in the directory"))?
            .frame;
        let mut calls = CallStack::new();
        calls.push(CallStackEntry {
            function: global_scope(),
            record: ActivationRecord::new(base_frame),
            return_index: None,
        });

        Ok(Memory { constants, globals: Map::new(), functions, calls, pending: None })
    }

    fn function(&self, name: Id) -> Result<&RuntimeFunction, RuntimeError> {
        self.functions
            .get(&name)
            .ok_or_else(|| RuntimeError::bug(format!("function '{name}' unknown at run time")))
    }

    /// Entry quadruple of a function, for `GOSUB`.
    pub fn entry_quad(&self, name: Id) -> Result<usize, RuntimeError> {
        Ok(self.function(name)?.entry)
    }

    /// Read an address.  `None` means the cell was never assigned.
    pub fn get(&self, addr: Addr) -> Result<Option<&Value>, RuntimeError> {
        let (segment, ty, index) = MemoryManager::decode(addr)
            .ok_or_else(|| RuntimeError::bug(format!("invalid address {addr}")))?;
        match segment {
            Segment::Const => Ok(self.constants.get(&addr)),
            Segment::Global => Ok(self.globals.get(&addr)),
            Segment::Local | Segment::Temp => {
                Ok(self.calls.top()?.record.get(segment, ty, index)?)
            }
        }
    }

    /// Read an address that must hold a value.
    pub fn load(&self, addr: Addr) -> Result<Value, RuntimeError> {
        self.get(addr)?
            .cloned()
            .ok_or_else(|| RuntimeError::bug(format!("read of unassigned address {addr}")))
    }

    /// Write an address.
    pub fn set(&mut self, addr: Addr, value: Value) -> Result<(), RuntimeError> {
        let (segment, ty, index) = MemoryManager::decode(addr)
            .ok_or_else(|| RuntimeError::bug(format!("invalid address {addr}")))?;
        match segment {
            Segment::Const => {
                self.constants.insert(addr, value);
            }
            Segment::Global => {
                self.globals.insert(addr, value);
            }
            Segment::Local | Segment::Temp => {
                self.calls.top_mut()?.record.set(segment, ty, index, value)?;
            }
        }
        Ok(())
    }

    /// `ERA`: size a fresh record for the callee and park it in the pending
    /// slot.  The caller's frame stays active.
    pub fn prepare_call(&mut self, name: Id) -> Result<(), RuntimeError> {
        let frame = self.function(name)?.frame;
        self.pending = Some(CallStackEntry {
            function: name,
            record: ActivationRecord::new(frame),
            return_index: None,
        });
        Ok(())
    }

    /// `PARAM`: write the i-th argument into the pending record, typed by
    /// the callee's signature.
    pub fn set_param(&mut self, index: usize, value: Value) -> Result<(), RuntimeError> {
        let callee = self
            .pending
            .as_ref()
            .map(|entry| entry.function)
            .ok_or_else(|| RuntimeError::bug("PARAM with no pending activation record"))?;
        let ty = self
            .function(callee)?
            .signature
            .get(index)
            .copied()
            .ok_or_else(|| {
                RuntimeError::bug(format!("parameter {index} outside the signature of '{callee}'"))
            })?;
        let pending = self
            .pending
            .as_mut()
            .ok_or_else(|| RuntimeError::bug("PARAM with no pending activation record"))?;
        pending.record.set(Segment::Local, ty, index, value)?;
        Ok(())
    }

    /// `GOSUB`: the pending record becomes the active frame.
    pub fn commit_call(&mut self, return_index: usize) -> Result<(), RuntimeError> {
        let mut entry = self
            .pending
            .take()
            .ok_or_else(|| RuntimeError::bug("GOSUB with no pending activation record"))?;
        entry.return_index = Some(return_index);
        self.calls.push(entry);
        Ok(())
    }

    /// `END_FUNC`: drop the active frame and report where to resume.
    pub fn pop_call(&mut self) -> Result<usize, RuntimeError> {
        let entry = self.calls.pop()?;
        entry
            .return_index
            .ok_or_else(|| RuntimeError::bug("attempted to return from the base frame"))
    }

    pub fn call_depth(&self) -> usize {
        self.calls.depth()
    }
}

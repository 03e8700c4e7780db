//! The virtual machine driver: fetch quadruples in order, halt on
//! `END_PROG`.

use std::io::{self, Write};

use crate::back::cpu::Cpu;
use crate::back::memory::Memory;
use crate::error::RuntimeError;
use crate::middle::gen::CompiledProgram;
use crate::middle::quad::{Op, QuadruplesList};

/// Executes a compiled program.  Generic over the output stream so tests
/// can capture what `PRINT` writes.
pub struct VirtualMachine<W> {
    cpu: Cpu<W>,
    quads: QuadruplesList,
}

impl VirtualMachine<io::Stdout> {
    /// A machine printing to standard output.
    pub fn new(program: CompiledProgram) -> Result<Self, RuntimeError> {
        Self::with_output(program, io::stdout())
    }
}

impl<W: Write> VirtualMachine<W> {
    pub fn with_output(program: CompiledProgram, out: W) -> Result<Self, RuntimeError> {
        let memory = Memory::new(&program.consts, &program.dir)?;
        Ok(VirtualMachine {
            cpu: Cpu::new(memory, out),
            quads: program.quads,
        })
    }

    /// Fetch–execute until `END_PROG`.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            let quad = *self.quads.get(self.cpu.ip()).ok_or_else(|| {
                RuntimeError::bug(format!("instruction pointer {} out of range", self.cpu.ip()))
            })?;
            if quad.op == Op::EndProg {
                return Ok(());
            }
            self.cpu.execute(&quad)?;
            self.cpu.advance();
        }
    }

    /// The machine's memory, for inspecting state after a run.
    pub fn memory(&self) -> &Memory {
        self.cpu.memory()
    }
}

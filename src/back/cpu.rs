//! The CPU: decode and execute one quadruple at a time.
//!
//! Jump instructions land one slot *before* their target because the run
//! loop increments the instruction pointer after every executed quadruple;
//! control therefore resumes exactly at the intended index.

use std::io::Write;

use crate::back::memory::Memory;
use crate::common::Value;
use crate::error::RuntimeError;
use crate::middle::quad::{Op, Quadruple};

/// Apply a binary operator to two runtime values.
///
/// Integer arithmetic stays integral (wrapping on overflow) except for `/`,
/// which is always true division.  Mixed operands compute in floating point.
/// Relational results are `int` 1/0.
fn binary(op: Op, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    use Value::*;

    let numeric = |op: Op| -> Result<(f64, f64), RuntimeError> {
        match (left.as_float(), right.as_float()) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(RuntimeError::bug(format!(
                "operator '{op}' applied to a non-numeric value"
            ))),
        }
    };

    match (op, left, right) {
        (Op::Add, Int(a), Int(b)) => Ok(Int(a.wrapping_add(*b))),
        (Op::Sub, Int(a), Int(b)) => Ok(Int(a.wrapping_sub(*b))),
        (Op::Mul, Int(a), Int(b)) => Ok(Int(a.wrapping_mul(*b))),
        (Op::Add, _, _) => numeric(op).map(|(a, b)| Float(a + b)),
        (Op::Sub, _, _) => numeric(op).map(|(a, b)| Float(a - b)),
        (Op::Mul, _, _) => numeric(op).map(|(a, b)| Float(a * b)),
        (Op::Div, _, _) => {
            let (a, b) = numeric(op)?;
            if b == 0.0 {
                return Err(RuntimeError::DivisionByZero);
            }
            Ok(Float(a / b))
        }
        (Op::Lt, Int(a), Int(b)) => Ok(Int((a < b) as i64)),
        (Op::Gt, Int(a), Int(b)) => Ok(Int((a > b) as i64)),
        (Op::Neq, Int(a), Int(b)) => Ok(Int((a != b) as i64)),
        (Op::Lt, _, _) => numeric(op).map(|(a, b)| Int((a < b) as i64)),
        (Op::Gt, _, _) => numeric(op).map(|(a, b)| Int((a > b) as i64)),
        (Op::Neq, _, _) => numeric(op).map(|(a, b)| Int((a != b) as i64)),
        _ => Err(RuntimeError::bug(format!(
            "operator '{op}' is not implemented by the CPU"
        ))),
    }
}

/// The execution unit: owns the instruction pointer, the memory, and the
/// output stream `PRINT` writes to.
pub struct Cpu<W> {
    memory: Memory,
    ip: usize,
    out: W,
}

impl<W: Write> Cpu<W> {
    pub fn new(memory: Memory, out: W) -> Self {
        Cpu { memory, ip: 0, out }
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Step past the quadruple just executed.
    pub fn advance(&mut self) {
        self.ip += 1;
    }

    fn jump_to(&mut self, target: usize) -> Result<(), RuntimeError> {
        // land one short; the loop's increment completes the jump
        self.ip = target
            .checked_sub(1)
            .ok_or_else(|| RuntimeError::bug("jump to quadruple 0 cannot be encoded"))?;
        Ok(())
    }

    pub fn execute(&mut self, quad: &Quadruple) -> Result<(), RuntimeError> {
        match quad.op {
            Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Lt | Op::Gt | Op::Neq => {
                let left = self.memory.load(quad.left_addr()?)?;
                let right = self.memory.load(quad.right_addr()?)?;
                let result = binary(quad.op, &left, &right)?;
                self.memory.set(quad.result_addr()?, result)?;
            }
            Op::Assign => {
                let value = self.memory.load(quad.left_addr()?)?;
                self.memory.set(quad.result_addr()?, value)?;
            }
            Op::Print => {
                let value = self.memory.load(quad.result_addr()?)?;
                writeln!(self.out, "{value}").map_err(RuntimeError::Io)?;
            }
            Op::Goto => {
                self.jump_to(quad.result_quad()?)?;
            }
            Op::Gotof => {
                let cond = self.memory.load(quad.left_addr()?)?;
                let is_false = cond
                    .is_zero()
                    .ok_or_else(|| RuntimeError::bug("GOTOF on a non-numeric value"))?;
                if is_false {
                    self.jump_to(quad.result_quad()?)?;
                }
            }
            Op::Era => {
                self.memory.prepare_call(quad.result_func()?)?;
            }
            Op::Param => {
                let value = self.memory.load(quad.left_addr()?)?;
                self.memory.set_param(quad.result_param()?, value)?;
            }
            Op::Gosub => {
                let callee = quad.result_func()?;
                self.memory.commit_call(self.ip + 1)?;
                let entry = self.memory.entry_quad(callee)?;
                self.jump_to(entry)?;
            }
            Op::EndFunc => {
                let return_index = self.memory.pop_call()?;
                self.jump_to(return_index)?;
            }
            // the run loop halts on END_PROG before dispatching it
            Op::EndProg => {
                return Err(RuntimeError::bug("END_PROG reached the execution unit"));
            }
        }
        Ok(())
    }
}

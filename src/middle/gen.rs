//! The intermediate generator: the single-pass translation from parse events
//! to quadruples.
//!
//! The producer (the recursive-descent parser in [crate::front::parse]) calls
//! one handler per grammar event.  Expressions go through the classic
//! two-stack scheme: operands carry `(address, type)`, operators drain by
//! precedence, and every emitted quadruple pushes its temporary back onto the
//! operand stack.  Control flow leaves pending `GOTO`/`GOTOF` quadruples
//! whose targets are patched from the jump stack.

use crate::common::{global_scope, intern, Id, Type, Value};
use crate::error::CompileError;
use crate::middle::consts::ConstantsTable;
use crate::middle::cube;
use crate::middle::dir::{FrameResources, FunctionDir, FunctionKind};
use crate::middle::mem::{MemoryManager, Segment};
use crate::middle::quad::{Op, Quadruple, QuadruplesList, Target};
use crate::middle::stacks::{JumpStack, OperandsStack, OperatorsStack, Symbol};

/// How the producer classified an operand lexeme.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OperandKind {
    Ident,
    IntLit,
    FloatLit,
    StrLit,
}

/// Which terminator a body ends with: `END_FUNC` for functions, `END_PROG`
/// for `main`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FunctionEnd {
    Func,
    Prog,
}

/// The compile-phase output handed to the virtual machine.
#[derive(Debug)]
pub struct CompiledProgram {
    pub quads: QuadruplesList,
    pub consts: ConstantsTable,
    pub dir: FunctionDir,
}

/// Event handlers and working state of the translator.
pub struct IntermediateGenerator {
    dir: FunctionDir,
    mem: MemoryManager,
    consts: ConstantsTable,
    quads: QuadruplesList,
    operands: OperandsStack,
    operators: OperatorsStack,
    jumps: JumpStack,
    /// Callee of the call statement currently being translated.
    current_called: Option<Id>,
    current_param_index: usize,
}

fn has_greater_or_equal_precedence(top: Op, incoming: Op) -> bool {
    match (top.precedence(), incoming.precedence()) {
        (Some(a), Some(b)) => a >= b,
        _ => false,
    }
}

impl IntermediateGenerator {
    pub fn new() -> Self {
        IntermediateGenerator {
            dir: FunctionDir::new(),
            mem: MemoryManager::new(),
            consts: ConstantsTable::new(),
            quads: QuadruplesList::new(),
            operands: OperandsStack::new(),
            operators: OperatorsStack::new(),
            jumps: JumpStack::new(),
            current_called: None,
            current_param_index: 0,
        }
    }

    pub fn quads(&self) -> &QuadruplesList {
        &self.quads
    }

    pub fn consts(&self) -> &ConstantsTable {
        &self.consts
    }

    pub fn dir(&self) -> &FunctionDir {
        &self.dir
    }

    /// Hand the finished translation over for execution.
    pub fn finish(self) -> CompiledProgram {
        CompiledProgram {
            quads: self.quads,
            consts: self.consts,
            dir: self.dir,
        }
    }

    // ------------------------------------------------------------------
    // Expressions

    /// Pop one operator and two operands, resolve the result type through
    /// the semantic cube, and emit the quadruple into a fresh temporary.
    fn generate_quadruple(&mut self) -> Result<(), CompileError> {
        let op = match self.operators.pop() {
            Some(Symbol::Op(op)) => op,
            _ => return Err(CompileError::bug("operator stack drained unexpectedly")),
        };
        let right = self.operands.pop()?;
        let left = self.operands.pop()?;

        let result_ty = cube::resulting_type(op, left.ty, right.ty)?;
        let temp = self.mem.new_addr(Segment::Temp, result_ty)?;
        self.quads.append(Quadruple::new(
            op,
            Some(left.addr),
            Some(right.addr),
            Some(Target::Addr(temp)),
        ));
        self.operands.push(temp, result_ty);
        Ok(())
    }

    /// Push an operand: identifiers resolve through the function directory,
    /// literals intern through the constants pool.
    pub fn push_operand(
        &mut self,
        lexeme: &str,
        kind: OperandKind,
        scope: Id,
    ) -> Result<(), CompileError> {
        match kind {
            OperandKind::Ident => {
                let var = self.dir.get_var(scope, intern(lexeme))?;
                let (addr, ty) = (var.addr, var.ty);
                self.operands.push(addr, ty);
            }
            OperandKind::IntLit => {
                let value: i64 = lexeme
                    .parse()
                    .map_err(|_| CompileError::bug(format!("malformed int literal '{lexeme}'")))?;
                let addr = self.consts.get_or_add(Value::Int(value), &mut self.mem)?;
                self.operands.push(addr, Type::Int);
            }
            OperandKind::FloatLit => {
                let value: f64 = lexeme.parse().map_err(|_| {
                    CompileError::bug(format!("malformed float literal '{lexeme}'"))
                })?;
                let addr = self.consts.get_or_add(Value::Float(value), &mut self.mem)?;
                self.operands.push(addr, Type::Float);
            }
            OperandKind::StrLit => {
                let addr = self
                    .consts
                    .get_or_add(Value::Str(lexeme.to_string()), &mut self.mem)?;
                self.operands.push(addr, Type::Str);
            }
        }
        Ok(())
    }

    /// Push an operator, first draining every stacked operator of greater or
    /// equal precedence.
    pub fn push_operator(&mut self, op: Op) -> Result<(), CompileError> {
        while let Some(Symbol::Op(top)) = self.operators.peek() {
            if !has_greater_or_equal_precedence(top, op) {
                break;
            }
            self.generate_quadruple()?;
        }
        self.operators.push(Symbol::Op(op));
        Ok(())
    }

    /// A `(` in an expression: fence off the operator stack.
    pub fn push_fake_bottom(&mut self) {
        self.operators.push(Symbol::FakeBottom);
    }

    /// A `)` in an expression: drain up to the fence and discard it.
    pub fn pop_until_fake_bottom(&mut self) -> Result<(), CompileError> {
        while let Some(symbol) = self.operators.peek() {
            match symbol {
                Symbol::Op(_) => self.generate_quadruple()?,
                Symbol::FakeBottom => {
                    self.operators.pop();
                    return Ok(());
                }
            }
        }
        Err(CompileError::bug("no fake bottom on the operator stack"))
    }

    /// End of an expression: drain every operator down to the nearest fence
    /// or the bottom of the stack.
    pub fn pop_until_bottom(&mut self) -> Result<(), CompileError> {
        while let Some(Symbol::Op(_)) = self.operators.peek() {
            self.generate_quadruple()?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements

    /// Emit the assignment of the reduced expression on top of the operand
    /// stack to the named variable.
    pub fn create_assignment_quadruple(&mut self, scope: Id, name: Id) -> Result<(), CompileError> {
        let value = self.operands.pop()?;
        let var = self.dir.get_var(scope, name)?;
        let dst = var.addr;
        self.quads.append(Quadruple::new(
            Op::Assign,
            Some(value.addr),
            None,
            Some(Target::Addr(dst)),
        ));
        Ok(())
    }

    /// Emit a `PRINT` for the value on top of the operand stack.
    pub fn create_print_quadruple(&mut self) -> Result<(), CompileError> {
        let value = self.operands.pop()?;
        self.quads.append(Quadruple::new(
            Op::Print,
            None,
            None,
            Some(Target::Addr(value.addr)),
        ));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Control flow

    /// Program prologue: a pending `GOTO` that will land on `main`.
    pub fn push_initial_quadruple(&mut self) -> Result<(), CompileError> {
        self.quads.append(Quadruple::new(Op::Goto, None, None, None));
        self.jumps.push(self.quads.last_index()?);
        Ok(())
    }

    /// `main`'s body begins here: patch the prologue `GOTO` and record the
    /// entry of the global pseudo-function.
    pub fn handle_main_start(&mut self) -> Result<(), CompileError> {
        let goto_idx = self.jumps.pop()?;
        let entry = self.quads.next_quad();
        self.quads.patch(goto_idx, entry)?;
        self.dir.set_entry_quad(global_scope(), entry)
    }

    /// Emit a pending `GOTOF` on the result of the condition just reduced.
    pub fn generate_gotof(&mut self) -> Result<(), CompileError> {
        let cond = self.quads.last()?.result_addr()?;
        self.quads
            .append(Quadruple::new(Op::Gotof, Some(cond), None, None));
        self.jumps.push(self.quads.last_index()?);
        Ok(())
    }

    /// Patch the pending jump on top of the jump stack to fall through here.
    /// Closes an `if` (or the `GOTO` of an `if/else`).
    pub fn assign_goto_destination(&mut self) -> Result<(), CompileError> {
        let idx = self.jumps.pop()?;
        self.quads.patch(idx, self.quads.next_quad())?;
        Ok(())
    }

    /// Between the `if` body and the `else` body: emit the pending `GOTO`
    /// that skips the else block, and route the `GOTOF` into it.
    pub fn handle_else(&mut self) -> Result<(), CompileError> {
        let gotof_idx = self.jumps.pop()?;
        self.quads.append(Quadruple::new(Op::Goto, None, None, None));
        self.jumps.push(self.quads.last_index()?);
        self.quads.patch(gotof_idx, self.quads.next_quad())?;
        Ok(())
    }

    /// Remember where the loop condition starts.
    pub fn mark_loop_start(&mut self) {
        self.jumps.push(self.quads.next_quad());
    }

    /// End of a `while` body: jump back to the condition and route the
    /// `GOTOF` past the loop.
    pub fn close_loop(&mut self) -> Result<(), CompileError> {
        let gotof_idx = self.jumps.pop()?;
        let loop_start = self.jumps.pop()?;
        self.quads.append(Quadruple::new(
            Op::Goto,
            None,
            None,
            Some(Target::Quad(loop_start)),
        ));
        self.quads.patch(gotof_idx, self.quads.next_quad())?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Declarations

    /// Declare a variable in the given scope.
    pub fn add_variable(&mut self, scope: Id, name: Id, ty: Type) -> Result<(), CompileError> {
        self.dir.add_var(scope, name, ty, &mut self.mem)
    }

    /// A function header: the function's body starts at the next quadruple.
    pub fn add_function_to_dir(&mut self, name: Id) -> Result<(), CompileError> {
        self.dir
            .add_function(name, FunctionKind::Void, self.quads.next_quad())
    }

    /// A parameter declaration: a local variable that also extends the
    /// function's signature.
    pub fn register_parameter(&mut self, func: Id, name: Id, ty: Type) -> Result<(), CompileError> {
        self.dir.add_var(func, name, ty, &mut self.mem)?;
        self.dir.add_signature_type(func, ty)
    }

    /// End of a body: capture the frame resources from the `local` and
    /// `temp` counters, reset them for the next function, and emit the
    /// terminator.
    pub fn handle_function_end(
        &mut self,
        scope: Id,
        end: FunctionEnd,
    ) -> Result<(), CompileError> {
        let frame = FrameResources::from_snapshots(
            self.mem.snapshot(Segment::Local),
            self.mem.snapshot(Segment::Temp),
        );
        self.dir.set_frame_resources(scope, frame)?;
        self.mem.reset(Segment::Local);
        self.mem.reset(Segment::Temp);

        let op = match end {
            FunctionEnd::Func => Op::EndFunc,
            FunctionEnd::Prog => Op::EndProg,
        };
        self.quads.append(Quadruple::new(op, None, None, None));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Calls

    /// Start of a call statement: reserve the callee's frame.
    pub fn handle_function_called_start(&mut self, name: Id) -> Result<(), CompileError> {
        self.current_called = Some(name);
        self.current_param_index = 0;
        self.quads.append(Quadruple::new(
            Op::Era,
            None,
            None,
            Some(Target::Func(name)),
        ));
        Ok(())
    }

    /// One reduced argument expression: emit its `PARAM` and check it
    /// against the callee's signature.
    pub fn handle_new_param(&mut self) -> Result<(), CompileError> {
        let callee = self
            .current_called
            .ok_or_else(|| CompileError::bug("PARAM outside of a call statement"))?;
        let arg = self.operands.pop()?;
        self.quads.append(Quadruple::new(
            Op::Param,
            Some(arg.addr),
            None,
            Some(Target::Param(self.current_param_index)),
        ));
        self.dir
            .validate_signature_arg(callee, arg.ty, self.current_param_index)?;
        self.current_param_index += 1;
        Ok(())
    }

    /// End of a call statement: all parameters must be accounted for.
    pub fn handle_function_call_finished(&mut self) -> Result<(), CompileError> {
        let callee = self
            .current_called
            .take()
            .ok_or_else(|| CompileError::bug("GOSUB outside of a call statement"))?;
        self.dir
            .validate_signature_length(callee, self.current_param_index)?;
        self.quads.append(Quadruple::new(
            Op::Gosub,
            None,
            None,
            Some(Target::Func(callee)),
        ));
        Ok(())
    }
}

impl Default for IntermediateGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops_of(gen: &IntermediateGenerator) -> Vec<Op> {
        gen.quads().iter().map(|q| q.op).collect()
    }

    /// Translate `a = 2 + 3 * 4` by raising the events by hand.
    #[test]
    fn precedence_orders_the_emitted_quads() {
        let g = &mut IntermediateGenerator::new();
        let scope = global_scope();
        g.add_variable(scope, intern("a"), Type::Int).unwrap();

        g.push_operand("2", OperandKind::IntLit, scope).unwrap();
        g.push_operator(Op::Add).unwrap();
        g.push_operand("3", OperandKind::IntLit, scope).unwrap();
        g.push_operator(Op::Mul).unwrap();
        g.push_operand("4", OperandKind::IntLit, scope).unwrap();
        g.pop_until_bottom().unwrap();
        g.create_assignment_quadruple(scope, intern("a")).unwrap();

        assert_eq!(ops_of(g), vec![Op::Mul, Op::Add, Op::Assign]);

        // 3 * 4 lands in the first int temporary, 2 + t0 in the second
        let mul = g.quads().get(0).unwrap();
        assert_eq!(mul.result_addr().unwrap(), 30000);
        let add = g.quads().get(1).unwrap();
        assert_eq!(add.left, Some(40000));
        assert_eq!(add.right, Some(30000));
        assert_eq!(add.result_addr().unwrap(), 30001);

        let assign = g.quads().get(2).unwrap();
        assert_eq!(assign.left, Some(30001));
        assert_eq!(assign.result_addr().unwrap(), 10000);
    }

    /// `a - b * c - d` must associate as `(a - b*c) - d`.
    #[test]
    fn same_precedence_drains_left_to_right() {
        let g = &mut IntermediateGenerator::new();
        let scope = global_scope();
        for name in ["a", "b", "c", "d"] {
            g.add_variable(scope, intern(name), Type::Int).unwrap();
        }

        g.push_operand("a", OperandKind::Ident, scope).unwrap();
        g.push_operator(Op::Sub).unwrap();
        g.push_operand("b", OperandKind::Ident, scope).unwrap();
        g.push_operator(Op::Mul).unwrap();
        g.push_operand("c", OperandKind::Ident, scope).unwrap();
        g.push_operator(Op::Sub).unwrap();
        g.push_operand("d", OperandKind::Ident, scope).unwrap();
        g.pop_until_bottom().unwrap();

        assert_eq!(ops_of(g), vec![Op::Mul, Op::Sub, Op::Sub]);
        // first subtraction consumes `a` and the product's temporary
        let first_sub = g.quads().get(1).unwrap();
        assert_eq!(first_sub.left, Some(10000));
        assert_eq!(first_sub.right, Some(30000));
    }

    #[test]
    fn fake_bottom_fences_the_operator_stack() {
        let g = &mut IntermediateGenerator::new();
        let scope = global_scope();

        // 2 * (3 + 4)
        g.push_operand("2", OperandKind::IntLit, scope).unwrap();
        g.push_operator(Op::Mul).unwrap();
        g.push_fake_bottom();
        g.push_operand("3", OperandKind::IntLit, scope).unwrap();
        g.push_operator(Op::Add).unwrap();
        g.push_operand("4", OperandKind::IntLit, scope).unwrap();
        g.pop_until_bottom().unwrap();
        g.pop_until_fake_bottom().unwrap();
        g.pop_until_bottom().unwrap();

        assert_eq!(ops_of(g), vec![Op::Add, Op::Mul]);
    }

    #[test]
    fn missing_operand_is_a_user_error() {
        let g = &mut IntermediateGenerator::new();
        let scope = global_scope();
        g.push_operand("1", OperandKind::IntLit, scope).unwrap();
        g.push_operator(Op::Add).unwrap();
        assert_eq!(g.pop_until_bottom(), Err(CompileError::MissingOperand));
    }

    #[test]
    fn string_operand_in_arithmetic_is_rejected() {
        let g = &mut IntermediateGenerator::new();
        let scope = global_scope();
        g.push_operand("hola", OperandKind::StrLit, scope).unwrap();
        g.push_operator(Op::Add).unwrap();
        g.push_operand("1", OperandKind::IntLit, scope).unwrap();
        assert_eq!(
            g.pop_until_bottom(),
            Err(CompileError::InvalidOperation {
                left: Type::Str,
                op: Op::Add,
                right: Type::Int
            })
        );
    }

    #[test]
    fn prologue_goto_is_patched_at_main() {
        let g = &mut IntermediateGenerator::new();
        g.push_initial_quadruple().unwrap();
        // a function body occupying quads 1..3
        g.add_function_to_dir(intern("noop")).unwrap();
        g.handle_function_end(intern("noop"), FunctionEnd::Func).unwrap();
        g.handle_main_start().unwrap();

        assert_eq!(g.quads().get(0).unwrap().result_quad().unwrap(), 2);
        assert_eq!(
            g.dir().get_function(global_scope()).unwrap().entry_quad,
            Some(2)
        );
    }

    #[test]
    fn while_loop_backpatching() {
        let g = &mut IntermediateGenerator::new();
        let scope = global_scope();
        g.add_variable(scope, intern("i"), Type::Int).unwrap();

        // while (i < 3) do { } ;
        g.mark_loop_start();
        g.push_operand("i", OperandKind::Ident, scope).unwrap();
        g.push_operator(Op::Lt).unwrap();
        g.push_operand("3", OperandKind::IntLit, scope).unwrap();
        g.pop_until_bottom().unwrap();
        g.generate_gotof().unwrap();
        g.close_loop().unwrap();

        // 0: <   1: GOTOF (past loop)   2: GOTO (condition)
        assert_eq!(ops_of(g), vec![Op::Lt, Op::Gotof, Op::Goto]);
        assert_eq!(g.quads().get(1).unwrap().result_quad().unwrap(), 3);
        assert_eq!(g.quads().get(2).unwrap().result_quad().unwrap(), 0);
        let gotof = g.quads().get(1).unwrap();
        assert_eq!(gotof.left, Some(30000));
    }

    #[test]
    fn if_else_backpatching() {
        let g = &mut IntermediateGenerator::new();
        let scope = global_scope();
        g.add_variable(scope, intern("r"), Type::Int).unwrap();

        // if (0 != 1) { r = 1; } else { r = 2; };
        g.push_operand("0", OperandKind::IntLit, scope).unwrap();
        g.push_operator(Op::Neq).unwrap();
        g.push_operand("1", OperandKind::IntLit, scope).unwrap();
        g.pop_until_bottom().unwrap();
        g.generate_gotof().unwrap();

        g.push_operand("1", OperandKind::IntLit, scope).unwrap();
        g.pop_until_bottom().unwrap();
        g.create_assignment_quadruple(scope, intern("r")).unwrap();

        g.handle_else().unwrap();

        g.push_operand("2", OperandKind::IntLit, scope).unwrap();
        g.pop_until_bottom().unwrap();
        g.create_assignment_quadruple(scope, intern("r")).unwrap();

        g.assign_goto_destination().unwrap();

        // 0: !=  1: GOTOF->4  2: =  3: GOTO->5  4: =
        assert_eq!(ops_of(g), vec![Op::Neq, Op::Gotof, Op::Assign, Op::Goto, Op::Assign]);
        assert_eq!(g.quads().get(1).unwrap().result_quad().unwrap(), 4);
        assert_eq!(g.quads().get(3).unwrap().result_quad().unwrap(), 5);
    }

    #[test]
    fn call_protocol_validates_the_signature() {
        let g = &mut IntermediateGenerator::new();
        let scope = global_scope();
        let foo = intern("foo");
        g.add_function_to_dir(foo).unwrap();
        g.register_parameter(foo, intern("n"), Type::Int).unwrap();
        g.handle_function_end(foo, FunctionEnd::Func).unwrap();

        g.handle_function_called_start(foo).unwrap();
        g.push_operand("5", OperandKind::IntLit, scope).unwrap();
        g.pop_until_bottom().unwrap();
        g.handle_new_param().unwrap();
        g.handle_function_call_finished().unwrap();

        assert_eq!(ops_of(g), vec![Op::EndFunc, Op::Era, Op::Param, Op::Gosub]);
        let param = g.quads().get(2).unwrap();
        assert_eq!(param.result_param().unwrap(), 0);
        assert_eq!(g.quads().get(3).unwrap().result_func().unwrap(), foo);
    }

    #[test]
    fn too_many_arguments_fail_at_the_extra_param() {
        let g = &mut IntermediateGenerator::new();
        let scope = global_scope();
        let foo = intern("foo");
        g.add_function_to_dir(foo).unwrap();

        g.handle_function_called_start(foo).unwrap();
        g.push_operand("5", OperandKind::IntLit, scope).unwrap();
        g.pop_until_bottom().unwrap();
        assert_eq!(
            g.handle_new_param(),
            Err(CompileError::WrongNumberOfParameters { func: foo, expected: 0, got: 1 })
        );
    }

    #[test]
    fn too_few_arguments_fail_at_the_close_paren() {
        let g = &mut IntermediateGenerator::new();
        let foo = intern("foo");
        g.add_function_to_dir(foo).unwrap();
        g.register_parameter(foo, intern("n"), Type::Int).unwrap();

        g.handle_function_called_start(foo).unwrap();
        assert_eq!(
            g.handle_function_call_finished(),
            Err(CompileError::WrongNumberOfParameters { func: foo, expected: 1, got: 0 })
        );
    }

    #[test]
    fn function_end_captures_and_resets_frame_resources() {
        let g = &mut IntermediateGenerator::new();
        let foo = intern("foo");
        g.add_function_to_dir(foo).unwrap();
        g.register_parameter(foo, intern("n"), Type::Int).unwrap();
        g.add_variable(foo, intern("x"), Type::Float).unwrap();

        // n + n -> one int temporary
        g.push_operand("n", OperandKind::Ident, foo).unwrap();
        g.push_operator(Op::Add).unwrap();
        g.push_operand("n", OperandKind::Ident, foo).unwrap();
        g.pop_until_bottom().unwrap();
        g.create_assignment_quadruple(foo, intern("n")).unwrap();

        g.handle_function_end(foo, FunctionEnd::Func).unwrap();

        let frame = g.dir().get_function(foo).unwrap().frame_resources.unwrap();
        assert_eq!(
            frame,
            FrameResources { vars_int: 1, vars_float: 1, temps_int: 1, temps_float: 0 }
        );

        // counters were reset: the next function starts back at index 0
        let bar = intern("bar");
        g.add_function_to_dir(bar).unwrap();
        g.register_parameter(bar, intern("m"), Type::Int).unwrap();
        assert_eq!(g.dir().get_var(bar, intern("m")).unwrap().addr, 20000);
    }
}

//! The parser.
//!
//! A recursive-descent producer over the token stream.  There is no syntax
//! tree: every recognized production raises its parse event straight into
//! the intermediate generator, so translation completes in a single pass.
//!
//! Grammar (terminals quoted):
//!
//! ```txt
//! program    ::= "program" ID ";" vars? func* "main" body "end"
//! vars       ::= "var" (ID ("," ID)* ":" type ";")+
//! type       ::= "int" | "float"
//! func       ::= "void" ID "(" params? ")" "[" vars? body "]" ";"
//! params     ::= ID ":" type ("," ID ":" type)*
//! body       ::= "{" statement* "}"
//! statement  ::= assign | condition | cycle | call | print
//! assign     ::= ID "=" expression ";"
//! condition  ::= "if" "(" expression ")" body ("else" body)? ";"
//! cycle      ::= "while" "(" expression ")" "do" body ";"
//! call       ::= ID "(" (expression ("," expression)*)? ")" ";"
//! print      ::= "print" "(" item ("," item)* ")" ";"
//! item       ::= expression | CTE_STRING
//! expression ::= exp (("<" | ">" | "!=") exp)?
//! exp        ::= term (("+" | "-") term)*
//! term       ::= factor (("*" | "/") factor)*
//! factor     ::= "(" expression ")" | ("+" | "-")? (CTE_INT | CTE_FLOAT) | ID
//! ```
//!
//! Note the relational operator is not chainable, and a sign is only
//! admitted directly in front of a numeric literal, where it folds into the
//! constant.

use std::fmt::Debug;

use crate::common::{global_scope, intern, Id, Type};
use crate::error::CompileError;
use crate::front::lex::{tokenize, LexError, Token, TokenKind};
use crate::middle::gen::{CompiledProgram, FunctionEnd, IntermediateGenerator, OperandKind};
use crate::middle::quad::Op;

/// Everything that can stop the parse: a lexer failure, a token the grammar
/// does not admit, or a semantic error raised by the generator.
pub enum ParseError {
    Lex(LexError),
    Syntax {
        line: u32,
        expected: String,
        found: String,
    },
    Semantic {
        line: u32,
        error: CompileError,
    },
}

impl ParseError {
    /// Internal failures get a different banner than user mistakes.
    pub fn is_bug(&self) -> bool {
        matches!(self, ParseError::Semantic { error, .. } if error.is_bug())
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Lex(e) => write!(f, "{e}"),
            ParseError::Syntax { line, expected, found } => {
                write!(f, "Línea {line}: Syntax error: expected {expected}, found {found}")
            }
            ParseError::Semantic { line, error } => write!(f, "Línea {line}: {error}"),
        }
    }
}

impl Debug for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

/// Compile a whole source text into its executable form.
pub fn parse(input: &str) -> Result<CompiledProgram, ParseError> {
    let tokens = tokenize(input).map_err(ParseError::Lex)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        last_line: 1,
        gen: IntermediateGenerator::new(),
        scope: global_scope(),
    };
    parser.program()?;
    Ok(parser.gen.finish())
}

struct Parser<'src> {
    tokens: Vec<Token<'src>>,
    pos: usize,
    /// Line of the most recently consumed token, for error reporting.
    last_line: u32,
    gen: IntermediateGenerator,
    scope: Id,
}

impl<'src> Parser<'src> {
    // ------------------------------------------------------------------
    // Token plumbing

    fn peek(&self) -> Option<&Token<'src>> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn peek2_kind(&self) -> Option<TokenKind> {
        self.tokens.get(self.pos + 1).map(|t| t.kind)
    }

    fn advance(&mut self) -> Option<Token<'src>> {
        let token = self.tokens.get(self.pos).copied();
        if let Some(t) = token {
            self.last_line = t.line;
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'src>, ParseError> {
        match self.peek().copied() {
            Some(t) if t.kind == kind => {
                self.advance();
                Ok(t)
            }
            _ => Err(self.syntax_error(format!("'{kind}'"))),
        }
    }

    fn syntax_error(&self, expected: impl Into<String>) -> ParseError {
        let (line, found) = match self.peek() {
            Some(t) => (t.line, format!("'{}'", t.text)),
            None => (self.last_line, "end of input".to_string()),
        };
        ParseError::Syntax { line, expected: expected.into(), found }
    }

    /// Attach the current source line to a generator failure.
    fn sem<T>(&self, result: Result<T, CompileError>) -> Result<T, ParseError> {
        result.map_err(|error| ParseError::Semantic { line: self.last_line, error })
    }

    // ------------------------------------------------------------------
    // Top level

    fn program(&mut self) -> Result<(), ParseError> {
        self.expect(TokenKind::Program)?;
        self.expect(TokenKind::Id)?;
        self.expect(TokenKind::Semicolon)?;
        let r = self.gen.push_initial_quadruple();
        self.sem(r)?;

        if self.peek_kind() == Some(TokenKind::Var) {
            self.vars()?;
        }
        while self.peek_kind() == Some(TokenKind::Void) {
            self.function()?;
        }

        self.expect(TokenKind::Main)?;
        let r = self.gen.handle_main_start();
        self.sem(r)?;
        self.body()?;
        let r = self.gen.handle_function_end(global_scope(), FunctionEnd::Prog);
        self.sem(r)?;
        self.expect(TokenKind::End)?;

        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.syntax_error("end of input")),
        }
    }

    fn vars(&mut self) -> Result<(), ParseError> {
        self.expect(TokenKind::Var)?;
        loop {
            self.declaration()?;
            if self.peek_kind() != Some(TokenKind::Id) {
                return Ok(());
            }
        }
    }

    /// `ID (, ID)* : type ;` — the names are collected first because the
    /// type arrives after the colon.
    fn declaration(&mut self) -> Result<(), ParseError> {
        let mut names = vec![intern(self.expect(TokenKind::Id)?.text)];
        while self.peek_kind() == Some(TokenKind::Comma) {
            self.advance();
            names.push(intern(self.expect(TokenKind::Id)?.text));
        }
        self.expect(TokenKind::Colon)?;
        let ty = self.parse_type()?;
        self.expect(TokenKind::Semicolon)?;

        for name in names {
            let r = self.gen.add_variable(self.scope, name, ty);
            self.sem(r)?;
        }
        Ok(())
    }

    fn parse_type(&mut self) -> Result<Type, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::Int) => {
                self.advance();
                Ok(Type::Int)
            }
            Some(TokenKind::Float) => {
                self.advance();
                Ok(Type::Float)
            }
            _ => Err(self.syntax_error("a type")),
        }
    }

    fn function(&mut self) -> Result<(), ParseError> {
        self.expect(TokenKind::Void)?;
        let name = intern(self.expect(TokenKind::Id)?.text);
        let r = self.gen.add_function_to_dir(name);
        self.sem(r)?;
        self.scope = name;

        self.expect(TokenKind::LParen)?;
        if self.peek_kind() == Some(TokenKind::Id) {
            loop {
                let param = intern(self.expect(TokenKind::Id)?.text);
                self.expect(TokenKind::Colon)?;
                let ty = self.parse_type()?;
                let r = self.gen.register_parameter(name, param, ty);
                self.sem(r)?;
                if self.peek_kind() != Some(TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(TokenKind::RParen)?;

        self.expect(TokenKind::LBrack)?;
        if self.peek_kind() == Some(TokenKind::Var) {
            self.vars()?;
        }
        self.body()?;
        let r = self.gen.handle_function_end(name, FunctionEnd::Func);
        self.sem(r)?;
        self.expect(TokenKind::RBrack)?;
        self.expect(TokenKind::Semicolon)?;

        self.scope = global_scope();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements

    fn body(&mut self) -> Result<(), ParseError> {
        self.expect(TokenKind::LBrace)?;
        while self.peek_kind().is_some_and(|k| k != TokenKind::RBrace) {
            self.statement()?;
        }
        self.expect(TokenKind::RBrace)?;
        Ok(())
    }

    fn statement(&mut self) -> Result<(), ParseError> {
        match self.peek_kind() {
            Some(TokenKind::Id) => match self.peek2_kind() {
                Some(TokenKind::Assign) => self.assign(),
                Some(TokenKind::LParen) => self.call(),
                _ => Err(self.syntax_error("'=' or '(' after identifier")),
            },
            Some(TokenKind::If) => self.condition(),
            Some(TokenKind::While) => self.cycle(),
            Some(TokenKind::Print) => self.print_stmt(),
            _ => Err(self.syntax_error("a statement")),
        }
    }

    fn assign(&mut self) -> Result<(), ParseError> {
        let name = intern(self.expect(TokenKind::Id)?.text);
        self.expect(TokenKind::Assign)?;
        self.expression()?;
        self.expect(TokenKind::Semicolon)?;
        let r = self.gen.create_assignment_quadruple(self.scope, name);
        self.sem(r)
    }

    fn condition(&mut self) -> Result<(), ParseError> {
        self.expect(TokenKind::If)?;
        self.expect(TokenKind::LParen)?;
        self.expression()?;
        self.expect(TokenKind::RParen)?;
        let r = self.gen.generate_gotof();
        self.sem(r)?;

        self.body()?;
        if self.peek_kind() == Some(TokenKind::Else) {
            let r = self.gen.handle_else();
            self.sem(r)?;
            self.advance();
            self.body()?;
        }
        let r = self.gen.assign_goto_destination();
        self.sem(r)?;
        self.expect(TokenKind::Semicolon)?;
        Ok(())
    }

    fn cycle(&mut self) -> Result<(), ParseError> {
        self.expect(TokenKind::While)?;
        self.gen.mark_loop_start();
        self.expect(TokenKind::LParen)?;
        self.expression()?;
        self.expect(TokenKind::RParen)?;
        let r = self.gen.generate_gotof();
        self.sem(r)?;

        self.expect(TokenKind::Do)?;
        self.body()?;
        let r = self.gen.close_loop();
        self.sem(r)?;
        self.expect(TokenKind::Semicolon)?;
        Ok(())
    }

    fn call(&mut self) -> Result<(), ParseError> {
        let name = intern(self.expect(TokenKind::Id)?.text);
        let r = self.gen.handle_function_called_start(name);
        self.sem(r)?;

        self.expect(TokenKind::LParen)?;
        if self.peek_kind().is_some_and(|k| k != TokenKind::RParen) {
            loop {
                self.expression()?;
                let r = self.gen.handle_new_param();
                self.sem(r)?;
                if self.peek_kind() != Some(TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(TokenKind::RParen)?;
        let r = self.gen.handle_function_call_finished();
        self.sem(r)?;
        self.expect(TokenKind::Semicolon)?;
        Ok(())
    }

    fn print_stmt(&mut self) -> Result<(), ParseError> {
        self.expect(TokenKind::Print)?;
        self.expect(TokenKind::LParen)?;
        loop {
            self.print_item()?;
            let r = self.gen.create_print_quadruple();
            self.sem(r)?;
            if self.peek_kind() != Some(TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Semicolon)?;
        Ok(())
    }

    /// A print item: a bare string constant, or any expression.
    fn print_item(&mut self) -> Result<(), ParseError> {
        if self.peek_kind() == Some(TokenKind::CteString) {
            let token = self.advance().ok_or_else(|| self.syntax_error("a string"))?;
            // drop the surrounding quotes
            let content = &token.text[1..token.text.len() - 1];
            let r = self.gen.push_operand(content, OperandKind::StrLit, self.scope);
            self.sem(r)
        } else {
            self.expression()
        }
    }

    // ------------------------------------------------------------------
    // Expressions

    fn relational_op(kind: TokenKind) -> Option<Op> {
        match kind {
            TokenKind::Less => Some(Op::Lt),
            TokenKind::Greater => Some(Op::Gt),
            TokenKind::NotEq => Some(Op::Neq),
            _ => None,
        }
    }

    /// `exp (relop exp)?` — at most one relational operator, then drain the
    /// operator stack down to the nearest fence.
    fn expression(&mut self) -> Result<(), ParseError> {
        self.exp()?;
        if let Some(op) = self.peek_kind().and_then(Self::relational_op) {
            self.advance();
            let r = self.gen.push_operator(op);
            self.sem(r)?;
            self.exp()?;
        }
        let r = self.gen.pop_until_bottom();
        self.sem(r)
    }

    fn exp(&mut self) -> Result<(), ParseError> {
        self.term()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => Op::Add,
                Some(TokenKind::Minus) => Op::Sub,
                _ => return Ok(()),
            };
            self.advance();
            let r = self.gen.push_operator(op);
            self.sem(r)?;
            self.term()?;
        }
    }

    fn term(&mut self) -> Result<(), ParseError> {
        self.factor()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Mul) => Op::Mul,
                Some(TokenKind::Div) => Op::Div,
                _ => return Ok(()),
            };
            self.advance();
            let r = self.gen.push_operator(op);
            self.sem(r)?;
            self.factor()?;
        }
    }

    fn factor(&mut self) -> Result<(), ParseError> {
        match self.peek_kind() {
            Some(TokenKind::LParen) => {
                self.advance();
                self.gen.push_fake_bottom();
                self.expression()?;
                self.expect(TokenKind::RParen)?;
                let r = self.gen.pop_until_fake_bottom();
                self.sem(r)
            }
            // A sign is only admitted directly in front of a numeric
            // literal, where it folds into the constant itself.
            Some(TokenKind::Plus) | Some(TokenKind::Minus) => {
                let negate = self.peek_kind() == Some(TokenKind::Minus);
                self.advance();
                let kind = match self.peek_kind() {
                    Some(TokenKind::CteInt) => OperandKind::IntLit,
                    Some(TokenKind::CteFloat) => OperandKind::FloatLit,
                    _ => return Err(self.syntax_error("a numeric literal after sign")),
                };
                let token = match self.advance() {
                    Some(t) => t,
                    None => return Err(self.syntax_error("a numeric literal after sign")),
                };
                let r = if negate {
                    let lexeme = format!("-{}", token.text);
                    self.gen.push_operand(&lexeme, kind, self.scope)
                } else {
                    self.gen.push_operand(token.text, kind, self.scope)
                };
                self.sem(r)
            }
            Some(TokenKind::Id) => {
                let token = self.expect(TokenKind::Id)?;
                let r = self.gen.push_operand(token.text, OperandKind::Ident, self.scope);
                self.sem(r)
            }
            Some(TokenKind::CteInt) => {
                let token = self.expect(TokenKind::CteInt)?;
                let r = self.gen.push_operand(token.text, OperandKind::IntLit, self.scope);
                self.sem(r)
            }
            Some(TokenKind::CteFloat) => {
                let token = self.expect(TokenKind::CteFloat)?;
                let r = self.gen.push_operand(token.text, OperandKind::FloatLit, self.scope);
                self.sem(r)
            }
            _ => Err(self.syntax_error("an expression factor")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Value;
    use crate::middle::quad::Op;

    fn ops(program: &CompiledProgram) -> Vec<Op> {
        program.quads.iter().map(|q| q.op).collect()
    }

    #[test]
    fn arithmetic_expression_generates_expected_quads() {
        let program = parse(
            "program p1;
             var a: int;
             main { a = 2 + 3 * (4 - 1); }
             end",
        )
        .unwrap();

        assert_eq!(
            ops(&program),
            vec![Op::Goto, Op::Sub, Op::Mul, Op::Add, Op::Assign, Op::EndProg]
        );
        assert_eq!(program.consts.len(), 4);

        // the '=' writes into a's address
        let addr_a = program
            .dir
            .get_var(global_scope(), intern("a"))
            .unwrap()
            .addr;
        let assign = program.quads.get(4).unwrap();
        assert_eq!(assign.result_addr().unwrap(), addr_a);
    }

    #[test]
    fn float_expression_temporals_are_unique() {
        let program = parse(
            "program p2;
             var x: float;
             main { x = 7.5 / 2.5 - -1.0; }
             end",
        )
        .unwrap();

        let temps: Vec<_> = program
            .quads
            .iter()
            .filter(|q| matches!(q.op, Op::Div | Op::Sub | Op::Add))
            .map(|q| q.result_addr().unwrap())
            .collect();
        assert_eq!(temps.len(), 2);
        assert_ne!(temps[0], temps[1]);

        // -1.0 folded into a single negative constant
        assert!(program
            .consts
            .iter()
            .any(|(_, v)| *v == Value::Float(-1.0)));
    }

    #[test]
    fn print_deduplicates_string_constants() {
        let program = parse(
            r#"program p3;
               main {
                   print("hola");
                   print("hola");
               }
               end"#,
        )
        .unwrap();

        let strings: Vec<_> = program
            .consts
            .iter()
            .filter(|(_, v)| matches!(v, Value::Str(_)))
            .collect();
        assert_eq!(strings.len(), 1);
        let (addr_hola, _) = strings[0];

        let prints: Vec<_> = program
            .quads
            .iter()
            .filter(|q| q.op == Op::Print)
            .map(|q| q.result_addr().unwrap())
            .collect();
        assert_eq!(prints, vec![addr_hola, addr_hola]);
    }

    #[test]
    fn local_and_global_variables_live_in_their_segments() {
        let program = parse(
            "program p4;
             var g: int;
             void foo() [
                 var g: int;
                 { g = 1; }
             ];
             main { g = 2; foo(); }
             end",
        )
        .unwrap();

        let addr_global = program.dir.get_var(global_scope(), intern("g")).unwrap().addr;
        let addr_local = program.dir.get_var(intern("foo"), intern("g")).unwrap().addr;
        assert_eq!(addr_global, 10000);
        assert_eq!(addr_local, 20000);
    }

    #[test]
    fn prologue_jumps_over_function_bodies() {
        let program = parse(
            "program p5;
             void noop() [{ }];
             main { noop(); }
             end",
        )
        .unwrap();

        // 0: GOTO main  1: END_FUNC (noop)  2: ERA  3: GOSUB  4: END_PROG
        assert_eq!(
            ops(&program),
            vec![Op::Goto, Op::EndFunc, Op::Era, Op::Gosub, Op::EndProg]
        );
        assert_eq!(program.quads.get(0).unwrap().result_quad().unwrap(), 2);
        assert_eq!(
            program.dir.get_function(intern("noop")).unwrap().entry_quad,
            Some(1)
        );
    }

    #[test]
    fn undeclared_variable_reports_its_line() {
        let err = parse(
            "program p6;
             main { x = 1; }
             end",
        )
        .unwrap_err();
        match err {
            ParseError::Semantic { line, error } => {
                assert_eq!(line, 2);
                assert_eq!(error, CompileError::UndeclaredVariable { name: intern("x") });
            }
            other => panic!("expected a semantic error, got {other}"),
        }
    }

    #[test]
    fn duplicate_variable_is_rejected() {
        let err = parse(
            "program p7;
             var a: int;
                 a: float;
             main { }
             end",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ParseError::Semantic { error: CompileError::DuplicateVariable { .. }, .. }
        ));
    }

    #[test]
    fn call_argument_mismatches_are_semantic_errors() {
        let wrong_count = parse(
            "program p8;
             void f(n: int) [{ }];
             main { f(); }
             end",
        )
        .unwrap_err();
        assert!(matches!(
            wrong_count,
            ParseError::Semantic {
                error: CompileError::WrongNumberOfParameters { .. },
                ..
            }
        ));

        let wrong_type = parse(
            "program p9;
             void f(n: int) [{ }];
             main { f(1.5); }
             end",
        )
        .unwrap_err();
        assert!(matches!(
            wrong_type,
            ParseError::Semantic {
                error: CompileError::InvalidParameterType { .. },
                ..
            }
        ));
    }

    #[test]
    fn relational_operators_do_not_chain() {
        let err = parse(
            "program p10;
             var a: int;
             main { if (1 < 2 < 3) { a = 1; }; }
             end",
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
    }

    #[test]
    fn sign_before_identifier_is_a_syntax_error() {
        let err = parse(
            "program p11;
             var a, b: int;
             main { a = -b; }
             end",
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
    }

    #[test]
    fn trailing_tokens_after_end_are_rejected() {
        let err = parse("program p12; main { } end end").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
    }

    #[test]
    fn lexer_failures_surface_as_parse_errors() {
        let err = parse("program p13; main { @ } end").unwrap_err();
        assert!(matches!(err, ParseError::Lex(_)));
    }

    #[test]
    fn while_do_structure_backpatches() {
        let program = parse(
            "program p14;
             var i: int;
             main {
                 i = 0;
                 while (i < 3) do { i = i + 1; };
             }
             end",
        )
        .unwrap();

        // find the GOTOF and the loop-closing GOTO
        let gotof_idx = program
            .quads
            .iter()
            .position(|q| q.op == Op::Gotof)
            .unwrap();
        let goto_idx = program
            .quads
            .iter()
            .enumerate()
            .skip(gotof_idx)
            .find(|(_, q)| q.op == Op::Goto)
            .map(|(i, _)| i)
            .unwrap();

        let gotof = program.quads.get(gotof_idx).unwrap();
        let goto = program.quads.get(goto_idx).unwrap();
        // loop exit lands just past the jump-back, which re-enters at the
        // condition
        assert_eq!(gotof.result_quad().unwrap(), goto_idx + 1);
        assert!(goto.result_quad().unwrap() < gotof_idx);
    }
}

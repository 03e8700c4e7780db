//! The lexer.

use derive_more::Display;
use regex::Regex;

/// Tokens in the program
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
#[display("kind: '{kind}', part of input: '{text}'")]
pub struct Token<'src> {
    /// What token class this token belongs to.
    pub kind: TokenKind,
    /// What part of the input this token carries.
    pub text: &'src str,
    /// 1-based source line the token starts on.
    pub line: u32,
}

/// Token classes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
pub enum TokenKind {
    #[display("program")]
    Program,
    #[display("main")]
    Main,
    #[display("end")]
    End,
    #[display("var")]
    Var,
    #[display("void")]
    Void,
    #[display("if")]
    If,
    #[display("else")]
    Else,
    #[display("while")]
    While,
    #[display("do")]
    Do,
    #[display("print")]
    Print,
    #[display("int")]
    Int,
    #[display("float")]
    Float,
    #[display("id")]
    Id,
    #[display("cte_int")]
    CteInt,
    #[display("cte_float")]
    CteFloat,
    #[display("cte_string")]
    CteString,
    #[display("=")]
    Assign,
    #[display("!=")]
    NotEq,
    #[display("<")]
    Less,
    #[display(">")]
    Greater,
    #[display("+")]
    Plus,
    #[display("-")]
    Minus,
    #[display("*")]
    Mul,
    #[display("/")]
    Div,
    #[display("(")]
    LParen,
    #[display(")")]
    RParen,
    #[display("{{")]
    LBrace,
    #[display("}}")]
    RBrace,
    #[display("[")]
    LBrack,
    #[display("]")]
    RBrack,
    #[display(":")]
    Colon,
    #[display(",")]
    Comma,
    #[display(";")]
    Semicolon,
}

/// Reserved words shadow the identifier rule.
fn keyword_or_id(text: &str) -> TokenKind {
    match text {
        "program" => TokenKind::Program,
        "main" => TokenKind::Main,
        "end" => TokenKind::End,
        "var" => TokenKind::Var,
        "void" => TokenKind::Void,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "do" => TokenKind::Do,
        "print" => TokenKind::Print,
        "int" => TokenKind::Int,
        "float" => TokenKind::Float,
        _ => TokenKind::Id,
    }
}

pub struct LexError {
    pub line: u32,
    pub ch: char,
}

impl Display for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Lexer error: unexpected character {:?} at line {}",
            self.ch, self.line
        )
    }
}

impl std::fmt::Debug for LexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

pub struct Lexer<'input> {
    input: &'input str,
    pos: usize,
    line: u32,
    whitespace: Regex,
    matchers: Vec<(Regex, TokenKind)>,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        use TokenKind::*;

        // Order matters: floats before ints, `!=` before `=`.
        let table: &[(&str, TokenKind)] = &[
            (r"\A\d+\.\d+", CteFloat),
            (r"\A\d+", CteInt),
            (r#"\A"[^"\n]*""#, CteString),
            (r"\A[a-zA-Z_][a-zA-Z0-9_]*", Id),
            (r"\A!=", NotEq),
            (r"\A=", Assign),
            (r"\A<", Less),
            (r"\A>", Greater),
            (r"\A\+", Plus),
            (r"\A-", Minus),
            (r"\A\*", Mul),
            (r"\A/", Div),
            (r"\A\(", LParen),
            (r"\A\)", RParen),
            (r"\A\{", LBrace),
            (r"\A\}", RBrace),
            (r"\A\[", LBrack),
            (r"\A\]", RBrack),
            (r"\A:", Colon),
            (r"\A,", Comma),
            (r"\A;", Semicolon),
        ];
        let matchers = table
            .iter()
            .map(|(pattern, kind)| (Regex::new(pattern).unwrap(), *kind))
            .collect();

        Lexer {
            input,
            pos: 0,
            line: 1,
            whitespace: Regex::new(r"\A[ \t\f\r\n\v]*").unwrap(),
            matchers,
        }
    }

    /// Has the lexer reached the end of input?
    pub fn end_of_input(&self) -> bool {
        self.pos == self.input.len()
    }

    // Skip whitespace, counting the newlines it swallows
    fn skip_whitespace(&mut self) {
        let input = self.input;
        if let Some(m) = self.whitespace.find(&input[self.pos..]) {
            self.line += m.as_str().matches('\n').count() as u32;
            self.pos += m.end();
        }
    }

    /// Get the next token if possible.
    ///
    /// The return type distinguishes between end-of-input and lexer error.
    pub fn next(&mut self) -> Result<Option<Token<'input>>, LexError> {
        self.skip_whitespace();
        if self.end_of_input() {
            return Ok(None);
        }

        let input = self.input;
        let rest = &input[self.pos..];
        let matched = self
            .matchers
            .iter()
            .find_map(|(re, kind)| re.find(rest).map(|m| (m.end(), *kind)));

        match matched {
            Some((len, kind)) => {
                let text = &rest[..len];
                self.pos += len;
                let kind = if kind == TokenKind::Id {
                    keyword_or_id(text)
                } else {
                    kind
                };
                Ok(Some(Token { kind, text, line: self.line }))
            }
            None => Err(LexError {
                line: self.line,
                ch: rest.chars().next().unwrap_or('\0'),
            }),
        }
    }
}

/// Lex the whole input up front.
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, LexError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next()? {
        tokens.push(token);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_shadow_identifiers() {
        use TokenKind::*;
        assert_eq!(
            kinds("program demo; var x: int;"),
            vec![Program, Id, Semicolon, Var, Id, Colon, Int, Semicolon]
        );
        // prefixes of keywords are plain identifiers
        assert_eq!(kinds("programa mainly"), vec![Id, Id]);
    }

    #[test]
    fn numeric_literals() {
        use TokenKind::*;
        let tokens = tokenize("3 3.14 0.5").unwrap();
        assert_eq!(
            tokens.iter().map(|t| (t.kind, t.text)).collect::<Vec<_>>(),
            vec![(CteInt, "3"), (CteFloat, "3.14"), (CteFloat, "0.5")]
        );
    }

    #[test]
    fn string_literals_keep_their_quotes() {
        let tokens = tokenize(r#"print("Hola mundo")"#).unwrap();
        assert_eq!(tokens[2].kind, TokenKind::CteString);
        assert_eq!(tokens[2].text, "\"Hola mundo\"");
    }

    #[test]
    fn not_eq_wins_over_assign() {
        use TokenKind::*;
        assert_eq!(kinds("a != b = c"), vec![Id, NotEq, Id, Assign, Id]);
    }

    #[test]
    fn lines_are_tracked() {
        let tokens = tokenize("a\nb\n\nc").unwrap();
        let lines: Vec<u32> = tokens.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![1, 2, 4]);
    }

    #[test]
    fn illegal_character_reports_line() {
        let err = tokenize("a = 1;\nb @ 2;").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.ch, '@');
    }
}

//! Parser for `OpenQASM` 2.0.

use crate::ast::{
    BinOp, BitRef, Expr, Gate, GateBodyOp, Position, Program, QubitRef, Stmt, UnaryFn,
};
use crate::error::{ParseError, ParseResult};
use crate::lexer::{SpannedToken, Token, tokenize};

/// Parse a QASM 2.0 source string into a [`Program`].
pub fn parse(source: &str) -> ParseResult<Program> {
    let mut parser = Parser::new(source)?;
    parser.parse_program()
}

/// Parser state.
struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    /// Byte offsets at which each source line starts, for position lookup.
    line_starts: Vec<usize>,
}

impl Parser {
    fn new(source: &str) -> ParseResult<Self> {
        let token_results = tokenize(source);
        let mut tokens = Vec::new();

        for result in token_results {
            match result {
                Ok(t) => tokens.push(t),
                Err((span, msg)) => {
                    return Err(ParseError::LexerError {
                        position: span.start,
                        message: msg,
                    });
                }
            }
        }

        let mut line_starts = vec![0];
        for (offset, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(offset + 1);
            }
        }

        Ok(Self {
            tokens,
            pos: 0,
            line_starts,
        })
    }

    /// Source position of the current token (or the end of input).
    fn position(&self) -> Position {
        let offset = self
            .tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |t| t.span.start);
        let line = self
            .line_starts
            .partition_point(|&start| start <= offset);
        let column = offset - self.line_starts[line - 1] + 1;
        Position::new(line as u32, column as u32)
    }

    fn line(&self) -> usize {
        self.position().line as usize
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn advance(&mut self) -> Option<Token> {
        if self.is_eof() {
            return None;
        }
        let token = self.tokens[self.pos].token.clone();
        self.pos += 1;
        Some(token)
    }

    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        let line = self.line();
        let found = self
            .advance()
            .ok_or_else(|| ParseError::UnexpectedEof(format!("expected {expected}")))?;

        if std::mem::discriminant(&found) != std::mem::discriminant(&expected) {
            return Err(ParseError::UnexpectedToken {
                line,
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
        Ok(())
    }

    fn check(&self, token: &Token) -> bool {
        self.peek()
            .is_some_and(|t| std::mem::discriminant(t) == std::mem::discriminant(token))
    }

    fn consume(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn parse_program(&mut self) -> ParseResult<Program> {
        self.expect(Token::OpenQasm)?;
        let version = match self.advance() {
            // `{}` on f64 drops a trailing ".0"; keep the conventional form.
            Some(Token::RealLiteral(v)) if v.fract() == 0.0 => format!("{v:.1}"),
            Some(Token::RealLiteral(v)) => format!("{v}"),
            Some(Token::IntLiteral(v)) => format!("{v}.0"),
            Some(other) => return Err(ParseError::InvalidVersion(other.to_string())),
            None => return Err(ParseError::UnexpectedEof("version number".into())),
        };
        self.expect(Token::Semicolon)?;

        let mut statements = Vec::new();
        while !self.is_eof() {
            statements.push(self.parse_statement()?);
        }

        Ok(Program {
            version,
            statements,
        })
    }

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| ParseError::UnexpectedEof("statement".into()))?;

        match token {
            Token::Include => self.parse_include(),
            Token::Qreg => self.parse_qreg(),
            Token::Creg => self.parse_creg(),
            Token::Gate => self.parse_gate_decl(),
            Token::Opaque => self.parse_opaque_decl(),
            Token::Barrier => self.parse_barrier(),
            Token::If => self.parse_if(),
            Token::Measure | Token::Reset | Token::GateU | Token::GateCX | Token::Identifier(_) => {
                self.parse_qop()
            }
            _ => Err(ParseError::UnexpectedToken {
                line: self.line(),
                expected: "statement".into(),
                found: token.to_string(),
            }),
        }
    }

    /// Parse a quantum operation: gate application, measure or reset.
    /// These are the only statements allowed under an `if` guard.
    fn parse_qop(&mut self) -> ParseResult<Stmt> {
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| ParseError::UnexpectedEof("quantum operation".into()))?;

        match token {
            Token::Measure => self.parse_measure(),
            Token::Reset => self.parse_reset(),
            Token::GateU | Token::GateCX | Token::Identifier(_) => {
                Ok(Stmt::Gate(self.parse_gate_app()?))
            }
            _ => Err(ParseError::UnexpectedToken {
                line: self.line(),
                expected: "quantum operation".into(),
                found: token.to_string(),
            }),
        }
    }

    fn parse_include(&mut self) -> ParseResult<Stmt> {
        self.expect(Token::Include)?;
        let path = match self.advance() {
            Some(Token::StringLiteral(s)) => s,
            Some(other) => {
                return Err(ParseError::UnexpectedToken {
                    line: self.line(),
                    expected: "string literal".into(),
                    found: other.to_string(),
                });
            }
            None => return Err(ParseError::UnexpectedEof("include path".into())),
        };
        self.expect(Token::Semicolon)?;
        Ok(Stmt::Include { path })
    }

    fn parse_qreg(&mut self) -> ParseResult<Stmt> {
        let pos = self.position();
        self.expect(Token::Qreg)?;
        let name = self.parse_identifier()?;
        self.expect(Token::LBracket)?;
        let size = self.parse_int_literal()? as u32;
        self.expect(Token::RBracket)?;
        self.expect(Token::Semicolon)?;
        Ok(Stmt::QregDecl { name, size, pos })
    }

    fn parse_creg(&mut self) -> ParseResult<Stmt> {
        let pos = self.position();
        self.expect(Token::Creg)?;
        let name = self.parse_identifier()?;
        self.expect(Token::LBracket)?;
        let size = self.parse_int_literal()? as u32;
        self.expect(Token::RBracket)?;
        self.expect(Token::Semicolon)?;
        Ok(Stmt::CregDecl { name, size, pos })
    }

    fn parse_gate_decl(&mut self) -> ParseResult<Stmt> {
        let pos = self.position();
        self.expect(Token::Gate)?;
        let name = self.parse_identifier()?;

        let params = if self.consume(&Token::LParen) {
            if self.check(&Token::RParen) {
                self.advance();
                vec![]
            } else {
                let p = self.parse_identifier_list()?;
                self.expect(Token::RParen)?;
                p
            }
        } else {
            vec![]
        };

        let formals = self.parse_identifier_list()?;

        self.expect(Token::LBrace)?;
        let mut body = Vec::new();
        while !self.check(&Token::RBrace) {
            body.push(self.parse_gate_body_op()?);
        }
        self.expect(Token::RBrace)?;

        Ok(Stmt::GateDecl {
            name,
            params,
            formals,
            body,
            pos,
        })
    }

    fn parse_gate_body_op(&mut self) -> ParseResult<GateBodyOp> {
        if self.check(&Token::Barrier) {
            self.advance();
            let qubits = self.parse_qubit_refs()?;
            self.expect(Token::Semicolon)?;
            Ok(GateBodyOp::Barrier(qubits))
        } else {
            Ok(GateBodyOp::Gate(self.parse_gate_app()?))
        }
    }

    fn parse_opaque_decl(&mut self) -> ParseResult<Stmt> {
        let pos = self.position();
        self.expect(Token::Opaque)?;
        let name = self.parse_identifier()?;

        let params = if self.consume(&Token::LParen) {
            if self.check(&Token::RParen) {
                self.advance();
                vec![]
            } else {
                let p = self.parse_identifier_list()?;
                self.expect(Token::RParen)?;
                p
            }
        } else {
            vec![]
        };

        let formals = self.parse_identifier_list()?;
        self.expect(Token::Semicolon)?;

        Ok(Stmt::OpaqueDecl {
            name,
            params,
            formals,
            pos,
        })
    }

    fn parse_barrier(&mut self) -> ParseResult<Stmt> {
        let pos = self.position();
        self.expect(Token::Barrier)?;
        let qubits = self.parse_qubit_refs()?;
        self.expect(Token::Semicolon)?;
        Ok(Stmt::Barrier { qubits, pos })
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        let pos = self.position();
        self.expect(Token::If)?;
        self.expect(Token::LParen)?;
        let register = self.parse_identifier()?;
        self.expect(Token::EqEq)?;
        let value = self.parse_int_literal()?;
        self.expect(Token::RParen)?;
        let body = self.parse_qop()?;

        Ok(Stmt::If {
            register,
            value,
            body: Box::new(body),
            pos,
        })
    }

    fn parse_measure(&mut self) -> ParseResult<Stmt> {
        let pos = self.position();
        self.expect(Token::Measure)?;
        let qubit = self.parse_qubit_ref()?;
        self.expect(Token::Arrow)?;
        let bit = self.parse_bit_ref()?;
        self.expect(Token::Semicolon)?;
        Ok(Stmt::Measure { qubit, bit, pos })
    }

    fn parse_reset(&mut self) -> ParseResult<Stmt> {
        let pos = self.position();
        self.expect(Token::Reset)?;
        let qubit = self.parse_qubit_ref()?;
        self.expect(Token::Semicolon)?;
        Ok(Stmt::Reset { qubit, pos })
    }

    /// Parse a single gate application, `U`, `CX` or a named gate.
    fn parse_gate_app(&mut self) -> ParseResult<Gate> {
        let pos = self.position();
        let token = self
            .advance()
            .ok_or_else(|| ParseError::UnexpectedEof("gate application".into()))?;

        let gate = match token {
            Token::GateU => {
                self.expect(Token::LParen)?;
                let theta = self.parse_expr()?;
                self.expect(Token::Comma)?;
                let phi = self.parse_expr()?;
                self.expect(Token::Comma)?;
                let lambda = self.parse_expr()?;
                self.expect(Token::RParen)?;
                let target = self.parse_qubit_ref()?;
                Gate::U {
                    theta,
                    phi,
                    lambda,
                    target,
                    pos,
                }
            }
            Token::GateCX => {
                let ctrl = self.parse_qubit_ref()?;
                self.expect(Token::Comma)?;
                let tgt = self.parse_qubit_ref()?;
                Gate::Cnot { ctrl, tgt, pos }
            }
            Token::Identifier(name) => {
                let params = if self.consume(&Token::LParen) {
                    if self.check(&Token::RParen) {
                        self.advance();
                        vec![]
                    } else {
                        let p = self.parse_expr_list()?;
                        self.expect(Token::RParen)?;
                        p
                    }
                } else {
                    vec![]
                };
                let qubits = self.parse_qubit_refs()?;
                Gate::Named {
                    name,
                    params,
                    qubits,
                    pos,
                }
            }
            other => {
                return Err(ParseError::UnexpectedToken {
                    line: pos.line as usize,
                    expected: "gate application".into(),
                    found: other.to_string(),
                });
            }
        };

        self.expect(Token::Semicolon)?;
        Ok(gate)
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = if self.consume(&Token::Plus) {
                BinOp::Add
            } else if self.consume(&Token::Minus) {
                BinOp::Sub
            } else {
                break;
            };
            let rhs = self.parse_term()?;
            lhs = Expr::binop(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_power()?;
        loop {
            let op = if self.consume(&Token::Star) {
                BinOp::Mul
            } else if self.consume(&Token::Slash) {
                BinOp::Div
            } else {
                break;
            };
            let rhs = self.parse_power()?;
            lhs = Expr::binop(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_power(&mut self) -> ParseResult<Expr> {
        let base = self.parse_unary()?;
        if self.consume(&Token::Caret) {
            // Right-associative.
            let exp = self.parse_power()?;
            Ok(Expr::binop(BinOp::Pow, base, exp))
        } else {
            Ok(base)
        }
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        if self.consume(&Token::Minus) {
            Ok(Expr::neg(self.parse_unary()?))
        } else {
            self.parse_atom()
        }
    }

    fn parse_atom(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        let token = self
            .advance()
            .ok_or_else(|| ParseError::UnexpectedEof("expression".into()))?;

        match token {
            Token::Pi => Ok(Expr::Pi),
            Token::IntLiteral(v) => Ok(Expr::Int(v as i64)),
            Token::RealLiteral(v) => Ok(Expr::Real(v)),
            Token::LParen => {
                let expr = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::Identifier(name) => {
                if let Some(func) = UnaryFn::from_name(&name) {
                    if self.consume(&Token::LParen) {
                        let arg = self.parse_expr()?;
                        self.expect(Token::RParen)?;
                        return Ok(Expr::Fn {
                            func,
                            arg: Box::new(arg),
                        });
                    }
                }
                Ok(Expr::Param(name))
            }
            other => Err(ParseError::UnexpectedToken {
                line,
                expected: "expression".into(),
                found: other.to_string(),
            }),
        }
    }

    fn parse_expr_list(&mut self) -> ParseResult<Vec<Expr>> {
        let mut exprs = vec![self.parse_expr()?];
        while self.consume(&Token::Comma) {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    // =========================================================================
    // Operands
    // =========================================================================

    fn parse_identifier(&mut self) -> ParseResult<String> {
        let line = self.line();
        match self.advance() {
            Some(Token::Identifier(s)) => Ok(s),
            Some(other) => Err(ParseError::UnexpectedToken {
                line,
                expected: "identifier".into(),
                found: other.to_string(),
            }),
            None => Err(ParseError::UnexpectedEof("identifier".into())),
        }
    }

    fn parse_identifier_list(&mut self) -> ParseResult<Vec<String>> {
        let mut ids = vec![self.parse_identifier()?];
        while self.consume(&Token::Comma) {
            ids.push(self.parse_identifier()?);
        }
        Ok(ids)
    }

    fn parse_int_literal(&mut self) -> ParseResult<u64> {
        let line = self.line();
        match self.advance() {
            Some(Token::IntLiteral(v)) => Ok(v),
            Some(other) => Err(ParseError::UnexpectedToken {
                line,
                expected: "integer".into(),
                found: other.to_string(),
            }),
            None => Err(ParseError::UnexpectedEof("integer".into())),
        }
    }

    fn parse_qubit_ref(&mut self) -> ParseResult<QubitRef> {
        let register = self.parse_identifier()?;

        if self.consume(&Token::LBracket) {
            let index = self.parse_int_literal()? as u32;
            self.expect(Token::RBracket)?;
            Ok(QubitRef::single(register, index))
        } else {
            Ok(QubitRef::register(register))
        }
    }

    fn parse_qubit_refs(&mut self) -> ParseResult<Vec<QubitRef>> {
        let mut refs = vec![self.parse_qubit_ref()?];
        while self.consume(&Token::Comma) {
            refs.push(self.parse_qubit_ref()?);
        }
        Ok(refs)
    }

    fn parse_bit_ref(&mut self) -> ParseResult<BitRef> {
        let register = self.parse_identifier()?;

        if self.consume(&Token::LBracket) {
            let index = self.parse_int_literal()? as u32;
            self.expect(Token::RBracket)?;
            Ok(BitRef::single(register, index))
        } else {
            Ok(BitRef::register(register))
        }
    }
}

//! Parser for test scripts.
//!
//! ```text
//! script    := { SEP } [ statement { SEP { SEP } statement } ] { SEP } EOF
//! statement := IDENT "=" expr | expr
//! expr      := INT | FLOAT | STRING | IDENT | IDENT "(" [ args ] ")"
//! args      := arg { "," arg } [ "," ]
//! arg       := IDENT "=" expr | expr
//! ```

use super::lexer::{Position, Token, TokenKind, tokenize};
use crate::error::{RegressionError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    Str(String),
    /// Identifier reference (including `None`)
    Ident(String),
    Call(Call),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Expr>,
    pub kwargs: Vec<(String, Expr)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Expr(Expr),
    Assign { name: String, value: Expr, pos: Position },
}

/// Parse script text into statements
pub fn parse(source: &str) -> Result<Vec<Statement>> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, index: 0 };
    parser.script()
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // tokenize always ends with Eof, and Eof is never consumed
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.index + offset).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.index += 1;
        }
        token
    }

    fn error(pos: Position, message: impl Into<String>) -> RegressionError {
        RegressionError::Syntax {
            line: pos.line,
            column: pos.column,
            message: message.into(),
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token> {
        let token = self.advance();
        if token.kind == kind {
            Ok(token)
        } else {
            Err(Self::error(token.pos, format!("expected {}, found {}", what, describe(&token.kind))))
        }
    }

    fn skip_separators(&mut self) {
        while self.peek().kind == TokenKind::Separator {
            self.advance();
        }
    }

    fn script(&mut self) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        self.skip_separators();
        while self.peek().kind != TokenKind::Eof {
            statements.push(self.statement()?);
            let next = self.peek().clone();
            match next.kind {
                TokenKind::Separator => self.skip_separators(),
                TokenKind::Eof => {}
                ref other => {
                    return Err(Self::error(
                        next.pos,
                        format!("expected end of statement, found {}", describe(other)),
                    ));
                }
            }
        }
        Ok(statements)
    }

    fn statement(&mut self) -> Result<Statement> {
        let is_assign = matches!(self.peek().kind, TokenKind::Ident(_))
            && self.peek_kind_at(1) == Some(&TokenKind::Equals);
        if is_assign {
            let token = self.advance();
            let TokenKind::Ident(name) = token.kind else {
                return Err(Self::error(token.pos, "expected identifier"));
            };
            self.advance();
            let value = self.expr()?;
            return Ok(Statement::Assign {
                name,
                value,
                pos: token.pos,
            });
        }
        Ok(Statement::Expr(self.expr()?))
    }

    fn expr(&mut self) -> Result<Expr> {
        let token = self.advance();
        let pos = token.pos;
        let kind = match token.kind {
            TokenKind::Int(value) => ExprKind::Int(value),
            TokenKind::Float(value) => ExprKind::Float(value),
            TokenKind::Str(value) => ExprKind::Str(value),
            TokenKind::Ident(name) => {
                if self.peek().kind == TokenKind::LParen {
                    self.advance();
                    ExprKind::Call(self.call_args(name)?)
                } else {
                    ExprKind::Ident(name)
                }
            }
            other => {
                return Err(Self::error(pos, format!("expected expression, found {}", describe(&other))));
            }
        };
        Ok(Expr { kind, pos })
    }

    /// Arguments after the opening parenthesis, through the closing one
    fn call_args(&mut self, name: String) -> Result<Call> {
        let mut call = Call {
            name,
            args: Vec::new(),
            kwargs: Vec::new(),
        };
        loop {
            if self.peek().kind == TokenKind::RParen {
                self.advance();
                return Ok(call);
            }
            let is_keyword = matches!(self.peek().kind, TokenKind::Ident(_))
                && self.peek_kind_at(1) == Some(&TokenKind::Equals);
            if is_keyword {
                let token = self.advance();
                let TokenKind::Ident(key) = token.kind else {
                    return Err(Self::error(token.pos, "expected keyword"));
                };
                self.advance();
                if call.kwargs.iter().any(|(k, _)| *k == key) {
                    return Err(Self::error(token.pos, format!("keyword argument '{}' repeated", key)));
                }
                call.kwargs.push((key, self.expr()?));
            } else {
                let arg = self.expr()?;
                if !call.kwargs.is_empty() {
                    return Err(Self::error(arg.pos, "positional argument follows keyword argument"));
                }
                call.args.push(arg);
            }
            if self.peek().kind == TokenKind::Comma {
                self.advance();
            } else {
                self.expect(TokenKind::RParen, "',' or ')'")?;
                return Ok(call);
            }
        }
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Ident(name) => format!("'{}'", name),
        TokenKind::Int(value) => value.to_string(),
        TokenKind::Float(value) => value.to_string(),
        TokenKind::Str(value) => format!("{:?}", value),
        TokenKind::LParen => "'('".to_string(),
        TokenKind::RParen => "')'".to_string(),
        TokenKind::Comma => "','".to_string(),
        TokenKind::Equals => "'='".to_string(),
        TokenKind::Separator => "end of line".to_string(),
        TokenKind::Eof => "end of script".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(stmt: &Statement) -> &Call {
        match stmt {
            Statement::Expr(Expr {
                kind: ExprKind::Call(call),
                ..
            }) => call,
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_calls() {
        let statements = parse("Test(\"login\")\nurl('localhost')\nsnap()").unwrap();
        assert_eq!(statements.len(), 3);
        assert_eq!(call(&statements[0]).name, "Test");
        assert_eq!(call(&statements[1]).args[0].kind, ExprKind::Str("localhost".into()));
        assert!(call(&statements[2]).args.is_empty());
    }

    #[test]
    fn test_parse_keyword_args() {
        let statements = parse("await_output(\"ready\", timeout=5)").unwrap();
        let c = call(&statements[0]);
        assert_eq!(c.args.len(), 1);
        assert_eq!(c.kwargs[0].0, "timeout");
        assert_eq!(c.kwargs[0].1.kind, ExprKind::Int(5));
    }

    #[test]
    fn test_parse_nested_multiline_group() {
        let source = "group(\n    resize(800, 600),\n    resize(1024, 768),\n)";
        let statements = parse(source).unwrap();
        let c = call(&statements[0]);
        assert_eq!(c.args.len(), 2);
        assert!(matches!(&c.args[1].kind, ExprKind::Call(inner) if inner.name == "resize"));
    }

    #[test]
    fn test_parse_assignment() {
        let statements = parse("desktop = Window(1280, 800, \"desktop\")\nresize(desktop)").unwrap();
        assert!(matches!(&statements[0], Statement::Assign { name, .. } if name == "desktop"));
        assert_eq!(call(&statements[1]).args[0].kind, ExprKind::Ident("desktop".into()));
    }

    #[test]
    fn test_blank_and_comment_lines() {
        let statements = parse("\n# header\n\nTest()\n\n").unwrap();
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn test_two_statements_on_one_line_need_separator() {
        assert!(parse("Test() snap()").is_err());
        assert_eq!(parse("Test(); snap()").unwrap().len(), 2);
    }

    #[test]
    fn test_positional_after_keyword_rejected() {
        let err = parse("Window(width=1, 2)").unwrap_err();
        assert!(err.to_string().contains("positional argument follows keyword argument"));
    }

    #[test]
    fn test_missing_close_paren() {
        let err = parse("snap(\"a\" \"b\")").unwrap_err();
        assert!(matches!(err, RegressionError::Syntax { line: 1, column: 10, .. }));
    }
}

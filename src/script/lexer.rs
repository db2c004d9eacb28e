//! Tokenizer for test scripts.
//!
//! Newlines and `;` separate statements, except inside parentheses where
//! they are plain whitespace. `#` comments run to the end of the line.

use crate::error::{RegressionError, Result};

/// 1-based source position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    LParen,
    RParen,
    Comma,
    Equals,
    /// End of statement (newline or `;` outside parentheses)
    Separator,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Position,
}

struct Lexer<'s> {
    chars: std::iter::Peekable<std::str::Chars<'s>>,
    line: usize,
    column: usize,
    depth: usize,
}

/// Split script text into tokens, ending with [`TokenKind::Eof`]
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut lexer = Lexer {
        chars: source.chars().peekable(),
        line: 1,
        column: 1,
        depth: 0,
    };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

impl Lexer<'_> {
    fn pos(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn error(pos: Position, message: impl Into<String>) -> RegressionError {
        RegressionError::Syntax {
            line: pos.line,
            column: pos.column,
            message: message.into(),
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        loop {
            let pos = self.pos();
            let Some(&ch) = self.chars.peek() else {
                return Ok(Token {
                    kind: TokenKind::Eof,
                    pos,
                });
            };
            let kind = match ch {
                '#' => {
                    while self.chars.peek().is_some_and(|&c| c != '\n') {
                        self.bump();
                    }
                    continue;
                }
                '\n' | ';' => {
                    self.bump();
                    if self.depth > 0 {
                        if ch == ';' {
                            return Err(Self::error(pos, "';' inside parentheses"));
                        }
                        continue;
                    }
                    TokenKind::Separator
                }
                c if c.is_whitespace() => {
                    self.bump();
                    continue;
                }
                '(' => {
                    self.bump();
                    self.depth += 1;
                    TokenKind::LParen
                }
                ')' => {
                    self.bump();
                    if self.depth == 0 {
                        return Err(Self::error(pos, "unbalanced ')'"));
                    }
                    self.depth -= 1;
                    TokenKind::RParen
                }
                ',' => {
                    self.bump();
                    TokenKind::Comma
                }
                '=' => {
                    self.bump();
                    TokenKind::Equals
                }
                '"' | '\'' => self.string(pos, ch)?,
                c if c.is_ascii_digit() || c == '-' || c == '.' => self.number(pos)?,
                c if c.is_alphabetic() || c == '_' => {
                    let mut ident = String::new();
                    while let Some(&c) = self.chars.peek() {
                        if c.is_alphanumeric() || c == '_' {
                            ident.push(c);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    TokenKind::Ident(ident)
                }
                other => return Err(Self::error(pos, format!("unexpected character {:?}", other))),
            };
            return Ok(Token { kind, pos });
        }
    }

    fn string(&mut self, pos: Position, quote: char) -> Result<TokenKind> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(Self::error(pos, "unterminated string")),
                Some(c) if c == quote => return Ok(TokenKind::Str(value)),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some('\'') => '\'',
                        Some(other) => {
                            return Err(Self::error(pos, format!("unknown escape '\\{}'", other)));
                        }
                        None => return Err(Self::error(pos, "unterminated string")),
                    };
                    value.push(escaped);
                }
                Some(c) => value.push(c),
            }
        }
    }

    fn number(&mut self, pos: Position) -> Result<TokenKind> {
        let mut text = String::new();
        if self.chars.peek() == Some(&'-') {
            text.push('-');
            self.bump();
        }
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || c == '.' || c == '_' {
                if c != '_' {
                    text.push(c);
                }
                self.bump();
            } else {
                break;
            }
        }
        if text.contains('.') {
            text.parse()
                .map(TokenKind::Float)
                .map_err(|_| Self::error(pos, format!("invalid number '{}'", text)))
        } else {
            text.parse()
                .map(TokenKind::Int)
                .map_err(|_| Self::error(pos, format!("invalid number '{}'", text)))
        }
    }
}

use super::error::InterpreterError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    /// Body of an f-string, escapes already resolved, braces untouched
    FStr(String),
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Assign,
    PlusAssign,
    MinusAssign,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    depth: usize,
    tokens: Vec<Spanned>,
}

/// Splits source into tokens; newlines inside brackets are not significant.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, InterpreterError> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        depth: 0,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl Lexer {
    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, token: Token) {
        self.tokens.push(Spanned {
            token,
            line: self.line,
        });
    }

    fn push_newline(&mut self) {
        let redundant = matches!(
            self.tokens.last(),
            None | Some(Spanned {
                token: Token::Newline,
                ..
            })
        );
        if !redundant {
            self.push(Token::Newline);
        }
    }

    fn run(&mut self) -> Result<(), InterpreterError> {
        while let Some(c) = self.peek(0) {
            match c {
                ' ' | '\t' | '\r' => self.pos += 1,
                '\\' if self.peek(1) == Some('\n') => {
                    self.pos += 2;
                    self.line += 1;
                }
                '#' => {
                    while matches!(self.peek(0), Some(c) if c != '\n') {
                        self.pos += 1;
                    }
                }
                '\n' => {
                    if self.depth == 0 {
                        self.push_newline();
                    }
                    self.pos += 1;
                    self.line += 1;
                }
                ';' if self.depth == 0 => {
                    self.push_newline();
                    self.pos += 1;
                }
                '"' | '\'' => {
                    let text = self.read_string(false)?;
                    self.push(Token::Str(text));
                }
                c if c.is_ascii_digit() => self.read_number()?,
                '.' if matches!(self.peek(1), Some(d) if d.is_ascii_digit()) => self.read_number()?,
                c if c.is_alphabetic() || c == '_' => self.read_word()?,
                _ => self.read_operator(c)?,
            }
        }

        self.push_newline();
        self.push(Token::Eof);
        Ok(())
    }

    fn read_word(&mut self) -> Result<(), InterpreterError> {
        let start = self.pos;
        while matches!(self.peek(0), Some(c) if c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();

        if matches!(self.peek(0), Some('"' | '\'')) {
            let prefix = word.to_ascii_lowercase();
            if matches!(prefix.as_str(), "f" | "r" | "b" | "u" | "rb" | "br" | "fr" | "rf") {
                let raw = prefix.contains('r');
                let text = self.read_string(raw)?;
                if prefix.contains('f') {
                    self.push(Token::FStr(text));
                } else {
                    self.push(Token::Str(text));
                }
                return Ok(());
            }
        }

        self.push(Token::Name(word));
        Ok(())
    }

    fn read_number(&mut self) -> Result<(), InterpreterError> {
        let start = self.pos;
        let mut is_float = false;

        while let Some(c) = self.peek(0) {
            match c {
                '0'..='9' | '_' => self.pos += 1,
                '.' if !is_float => {
                    is_float = true;
                    self.pos += 1;
                }
                'e' | 'E' => {
                    is_float = true;
                    self.pos += 1;
                    if matches!(self.peek(0), Some('+' | '-')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }

        let literal: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();

        let token = if is_float {
            literal
                .parse::<f64>()
                .map(Token::Float)
                .map_err(|_| InterpreterError::syntax(self.line, format!("invalid number '{literal}'")))?
        } else {
            literal
                .parse::<i64>()
                .map(Token::Int)
                .map_err(|_| InterpreterError::syntax(self.line, format!("integer '{literal}' is too large")))?
        };
        self.push(token);
        Ok(())
    }

    fn read_string(&mut self, raw: bool) -> Result<String, InterpreterError> {
        let quote = self.chars[self.pos];
        let start_line = self.line;
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut text = String::new();
        loop {
            let Some(c) = self.peek(0) else {
                return Err(InterpreterError::syntax(
                    start_line,
                    "unterminated string literal",
                ));
            };

            if c == quote {
                if !triple {
                    self.pos += 1;
                    return Ok(text);
                }
                if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                    self.pos += 3;
                    return Ok(text);
                }
            }

            match c {
                '\n' if !triple => {
                    return Err(InterpreterError::syntax(
                        start_line,
                        "unterminated string literal",
                    ));
                }
                '\n' => {
                    self.line += 1;
                    text.push(c);
                    self.pos += 1;
                }
                '\\' if !raw => {
                    let escaped = self.peek(1).ok_or_else(|| {
                        InterpreterError::syntax(start_line, "unterminated string literal")
                    })?;
                    match escaped {
                        'n' => text.push('\n'),
                        't' => text.push('\t'),
                        'r' => text.push('\r'),
                        '0' => text.push('\0'),
                        '\\' | '\'' | '"' => text.push(escaped),
                        '\n' => self.line += 1,
                        other => {
                            text.push('\\');
                            text.push(other);
                        }
                    }
                    self.pos += 2;
                }
                _ => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn read_operator(&mut self, c: char) -> Result<(), InterpreterError> {
        let next = self.peek(1);
        let (token, width) = match (c, next) {
            ('=', Some('=')) => (Token::Eq, 2),
            ('!', Some('=')) => (Token::NotEq, 2),
            ('<', Some('=')) => (Token::LtEq, 2),
            ('>', Some('=')) => (Token::GtEq, 2),
            ('+', Some('=')) => (Token::PlusAssign, 2),
            ('-', Some('=')) => (Token::MinusAssign, 2),
            ('*', Some('*')) => (Token::DoubleStar, 2),
            ('/', Some('/')) => (Token::DoubleSlash, 2),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('=', _) => (Token::Assign, 1),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            (',', _) => (Token::Comma, 1),
            (':', _) => (Token::Colon, 1),
            ('.', _) => (Token::Dot, 1),
            ('(', _) => (Token::LParen, 1),
            ('[', _) => (Token::LBracket, 1),
            ('{', _) => (Token::LBrace, 1),
            (')', _) => (Token::RParen, 1),
            (']', _) => (Token::RBracket, 1),
            ('}', _) => (Token::RBrace, 1),
            (';', _) => (Token::Newline, 1),
            _ => {
                return Err(InterpreterError::syntax(
                    self.line,
                    format!("unexpected character '{c}'"),
                ))
            }
        };

        match token {
            Token::LParen | Token::LBracket | Token::LBrace => self.depth += 1,
            Token::RParen | Token::RBracket | Token::RBrace => {
                self.depth = self.depth.saturating_sub(1)
            }
            _ => {}
        }

        self.push(token);
        self.pos += width;
        Ok(())
    }
}

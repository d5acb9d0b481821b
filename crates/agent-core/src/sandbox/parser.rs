use super::ast::{BinaryOp, CompareOp, Expr, FStringPart, Stmt, Target, UnaryOp};
use super::error::InterpreterError;
use super::lexer::{tokenize, Spanned, Token};
use super::value::Value;

type Result<T> = std::result::Result<T, InterpreterError>;

/// Statements the sandbox refuses instead of half-supporting.
const BLOCK_KEYWORDS: &[&str] = &[
    "if", "elif", "else", "for", "while", "def", "class", "try", "except", "finally", "with",
    "import", "from", "return", "lambda", "yield", "raise", "assert", "del", "global",
    "nonlocal", "async", "await", "break", "continue",
];

/// Deepest nesting a program may use, counted both while parsing (brackets,
/// prefix operators, operator chains) and on the finished tree. Parsing and
/// evaluation recurse per level, so this bounds stack use.
pub const MAX_NESTING_DEPTH: usize = 100;

const CHAIN_TOO_LONG: &str = "expression is too deeply nested";

pub fn parse_program(source: &str) -> Result<Vec<Stmt>> {
    let mut parser = Parser::new(tokenize(source)?, 0);
    let mut statements = Vec::new();

    loop {
        parser.skip_newlines();
        if parser.at(&Token::Eof) {
            break;
        }
        let statement = parser.parse_statement()?;
        if statement.deeper_than(MAX_NESTING_DEPTH) {
            return Err(parser.error(CHAIN_TOO_LONG));
        }
        statements.push(statement);
        if !parser.at(&Token::Eof) {
            parser.expect(&Token::Newline, "end of statement")?;
        }
    }

    Ok(statements)
}

/// Parses a standalone expression, as found inside f-string braces.
///
/// `depth` is the nesting already open around the f-string.
fn parse_expression(source: &str, depth: usize) -> Result<Expr> {
    let mut parser = Parser::new(tokenize(source)?, depth);
    parser.skip_newlines();
    let expr = parser.parse_expr()?;
    parser.skip_newlines();
    parser.expect(&Token::Eof, "end of expression")?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>, depth: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            depth,
        }
    }

    /// Runs `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let depth = self.depth;
        self.descend("too many nested parentheses")?;
        let result = parse(self);
        self.depth = depth;
        result
    }

    /// Charges one level against the nesting budget. Operator chains call
    /// this per link and reset the depth once the chain ends.
    fn descend(&mut self, message: &str) -> Result<()> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error(message));
        }
        self.depth += 1;
        Ok(())
    }

    fn current(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|spanned| &spanned.token)
            .unwrap_or(&Token::Eof)
    }

    fn peek_next(&self) -> &Token {
        self.tokens
            .get(self.pos + 1)
            .map(|spanned| &spanned.token)
            .unwrap_or(&Token::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|spanned| spanned.line)
            .unwrap_or(1)
    }

    fn at(&self, token: &Token) -> bool {
        self.current() == token
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.current(), Token::Name(name) if name == keyword)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.at(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, context: &str) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {context}, found {:?}", self.current())))
        }
    }

    fn error(&self, message: impl Into<String>) -> InterpreterError {
        InterpreterError::syntax(self.line(), message)
    }

    fn skip_newlines(&mut self) {
        while self.eat(&Token::Newline) {}
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        if let Token::Name(word) = self.current().clone() {
            if word == "pass" {
                self.advance();
                return Ok(Stmt::Pass);
            }
            if BLOCK_KEYWORDS.contains(&word.as_str()) {
                return Err(InterpreterError::Unsupported(format!(
                    "'{word}' statements are not allowed here (line {}); write flat statements and tool calls instead",
                    self.line()
                )));
            }
        }

        let expr = self.parse_expr()?;

        if self.at(&Token::Comma) {
            return Err(InterpreterError::Unsupported(format!(
                "tuple expressions and unpacking (line {})",
                self.line()
            )));
        }

        let augmented = match self.current() {
            Token::PlusAssign => Some(BinaryOp::Add),
            Token::MinusAssign => Some(BinaryOp::Sub),
            _ => None,
        };

        if self.at(&Token::Assign) || augmented.is_some() {
            self.advance();
            let target = self.to_target(expr)?;
            let value = self.parse_expr()?;
            return Ok(match augmented {
                Some(op) => Stmt::AugAssign { target, op, value },
                None => Stmt::Assign { target, value },
            });
        }

        Ok(Stmt::Expr(expr))
    }

    fn to_target(&self, expr: Expr) -> Result<Target> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::Subscript { object, index } => match *object {
                Expr::Name(name) => Ok(Target::Item { name, key: *index }),
                _ => Err(InterpreterError::Unsupported(
                    "nested item assignment".to_string(),
                )),
            },
            _ => Err(self.error("cannot assign to expression")),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.nested(Self::parse_conditional)
    }

    fn parse_conditional(&mut self) -> Result<Expr> {
        let value = self.parse_or()?;
        if self.eat_keyword("if") {
            let condition = self.parse_or()?;
            if !self.eat_keyword("else") {
                return Err(self.error("expected 'else' in conditional expression"));
            }
            let else_value = self.parse_expr()?;
            return Ok(Expr::Conditional {
                condition: Box::new(condition),
                then_value: Box::new(value),
                else_value: Box::new(else_value),
            });
        }
        Ok(value)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let depth = self.depth;
        let mut left = self.parse_and()?;
        while self.eat_keyword("or") {
            self.descend(CHAIN_TOO_LONG)?;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let depth = self.depth;
        let mut left = self.parse_not()?;
        while self.eat_keyword("and") {
            self.descend(CHAIN_TOO_LONG)?;
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat_keyword("not") {
            let operand = self.nested(Self::parse_not)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn compare_op(&mut self) -> Option<CompareOp> {
        let token = self.current().clone();
        let op = match &token {
            Token::Eq => CompareOp::Eq,
            Token::NotEq => CompareOp::NotEq,
            Token::Lt => CompareOp::Lt,
            Token::LtEq => CompareOp::LtEq,
            Token::Gt => CompareOp::Gt,
            Token::GtEq => CompareOp::GtEq,
            Token::Name(word) if word == "in" => CompareOp::In,
            Token::Name(word) if word == "is" => {
                self.advance();
                return Some(if self.eat_keyword("not") {
                    CompareOp::IsNot
                } else {
                    CompareOp::Is
                });
            }
            Token::Name(word)
                if word == "not" && matches!(self.peek_next(), Token::Name(next) if next == "in") =>
            {
                self.advance();
                self.advance();
                return Some(CompareOp::NotIn);
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let depth = self.depth;
        let first = self.parse_additive()?;
        let mut result: Option<Expr> = None;
        let mut left = first.clone();

        // a < b < c is evaluated as (a < b) and (b < c)
        while let Some(op) = self.compare_op() {
            self.descend(CHAIN_TOO_LONG)?;
            let right = self.parse_additive()?;
            let comparison = Expr::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right.clone()),
            };
            result = Some(match result {
                Some(previous) => Expr::And(Box::new(previous), Box::new(comparison)),
                None => comparison,
            });
            left = right;
        }

        self.depth = depth;
        Ok(result.unwrap_or(first))
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let depth = self.depth;
        let mut left = self.parse_term()?;
        loop {
            let op = match self.current() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.descend(CHAIN_TOO_LONG)?;
            let right = self.parse_term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let depth = self.depth;
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::DoubleSlash => BinaryOp::FloorDiv,
                Token::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            self.descend(CHAIN_TOO_LONG)?;
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.current() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Pos,
            _ => return self.parse_power(),
        };
        self.advance();
        let operand = self.nested(Self::parse_unary)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_postfix()?;
        if self.eat(&Token::DoubleStar) {
            // right associative, binds tighter than unary minus on the left
            let exponent = self.nested(Self::parse_unary)?;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let depth = self.depth;
        let mut expr = self.parse_atom()?;
        loop {
            if matches!(self.current(), Token::LParen | Token::LBracket | Token::Dot) {
                self.descend(CHAIN_TOO_LONG)?;
            }
            match self.current() {
                Token::LParen => {
                    self.advance();
                    let (args, kwargs) = self.parse_call_args()?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        kwargs,
                    };
                }
                Token::LBracket => {
                    self.advance();
                    expr = self.parse_subscript(expr)?;
                }
                Token::Dot => {
                    self.advance();
                    let Token::Name(name) = self.advance() else {
                        return Err(self.error("expected attribute name after '.'"));
                    };
                    expr = Expr::Attribute {
                        object: Box::new(expr),
                        name,
                    };
                }
                _ => break,
            }
        }
        self.depth = depth;
        Ok(expr)
    }

    fn parse_subscript(&mut self, object: Expr) -> Result<Expr> {
        let start = if self.at(&Token::Colon) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };

        if self.eat(&Token::Colon) {
            let end = if self.at(&Token::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_expr()?))
            };
            self.expect(&Token::RBracket, "']'")?;
            return Ok(Expr::Slice {
                object: Box::new(object),
                start,
                end,
            });
        }

        self.expect(&Token::RBracket, "']'")?;
        let index = start.ok_or_else(|| self.error("empty subscript"))?;
        Ok(Expr::Subscript {
            object: Box::new(object),
            index,
        })
    }

    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();

        while !self.at(&Token::RParen) {
            let keyword = match (self.current(), self.peek_next()) {
                (Token::Name(name), Token::Assign) => Some(name.clone()),
                _ => None,
            };

            if let Some(name) = keyword {
                self.advance();
                self.advance();
                kwargs.push((name, self.parse_expr()?));
            } else if kwargs.is_empty() {
                args.push(self.parse_expr()?);
            } else {
                return Err(self.error("positional argument follows keyword argument"));
            }

            if !self.eat(&Token::Comma) {
                break;
            }
        }

        self.expect(&Token::RParen, "')'")?;
        Ok((args, kwargs))
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        match self.advance() {
            Token::Int(value) => Ok(Expr::Constant(Value::Int(value))),
            Token::Float(value) => Ok(Expr::Constant(Value::Float(value))),
            Token::Str(first) => self.parse_string_run(Some(first), None),
            Token::FStr(first) => self.parse_string_run(None, Some(first)),
            Token::Name(name) => Ok(match name.as_str() {
                "True" => Expr::Constant(Value::Bool(true)),
                "False" => Expr::Constant(Value::Bool(false)),
                "None" => Expr::Constant(Value::None),
                _ => Expr::Name(name),
            }),
            Token::LParen => {
                let expr = self.parse_expr()?;
                if self.at(&Token::Comma) {
                    return Err(InterpreterError::Unsupported(format!(
                        "tuples (line {}); use a list instead",
                        self.line()
                    )));
                }
                self.expect(&Token::RParen, "')'")?;
                Ok(expr)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                while !self.at(&Token::RBracket) {
                    items.push(self.parse_expr()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RBracket, "']'")?;
                Ok(Expr::List(items))
            }
            Token::LBrace => {
                let mut entries = Vec::new();
                while !self.at(&Token::RBrace) {
                    let key = self.parse_expr()?;
                    self.expect(&Token::Colon, "':' in dict literal")?;
                    let value = self.parse_expr()?;
                    entries.push((key, value));
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RBrace, "'}'")?;
                Ok(Expr::Dict(entries))
            }
            other => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error(format!("unexpected token {other:?}")))
            }
        }
    }

    /// Adjacent string literals concatenate, f-strings included.
    fn parse_string_run(&mut self, plain: Option<String>, formatted: Option<String>) -> Result<Expr> {
        let mut parts = Vec::new();
        let line = self.line();
        if let Some(text) = plain {
            parts.push(FStringPart::Literal(text));
        }
        if let Some(text) = formatted {
            parts.extend(parse_fstring(&text, line, self.depth)?);
        }

        loop {
            match self.current().clone() {
                Token::Str(text) => {
                    self.advance();
                    parts.push(FStringPart::Literal(text));
                }
                Token::FStr(text) => {
                    self.advance();
                    parts.extend(parse_fstring(&text, line, self.depth)?);
                }
                _ => break,
            }
        }

        let all_literal = parts
            .iter()
            .all(|part| matches!(part, FStringPart::Literal(_)));
        if all_literal {
            let text: String = parts
                .into_iter()
                .filter_map(|part| match part {
                    FStringPart::Literal(text) => Some(text),
                    FStringPart::Interpolation { .. } => None,
                })
                .collect();
            return Ok(Expr::Constant(Value::Str(text)));
        }

        Ok(Expr::FString(parts))
    }
}

fn parse_fstring(body: &str, line: usize, depth: usize) -> Result<Vec<FStringPart>> {
    let chars: Vec<char> = body.chars().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                literal.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                literal.push('}');
                i += 2;
            }
            '{' => {
                let close = find_closing_brace(&chars, i + 1)
                    .ok_or_else(|| InterpreterError::syntax(line, "f-string: expecting '}'"))?;
                let inner: String = chars[i + 1..close].iter().collect();
                if !literal.is_empty() {
                    parts.push(FStringPart::Literal(std::mem::take(&mut literal)));
                }
                parts.push(parse_interpolation(&inner, line, depth)?);
                i = close + 1;
            }
            '}' => return Err(InterpreterError::syntax(line, "f-string: single '}' is not allowed")),
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }

    if !literal.is_empty() {
        parts.push(FStringPart::Literal(literal));
    }
    Ok(parts)
}

fn find_closing_brace(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for (offset, c) in chars[start..].iter().enumerate() {
        match (quote, *c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(*c),
            (None, '{' | '[' | '(') => depth += 1,
            (None, ']' | ')') => depth = depth.saturating_sub(1),
            (None, '}') if depth == 0 => return Some(start + offset),
            (None, '}') => depth -= 1,
            _ => {}
        }
    }
    None
}

fn parse_interpolation(inner: &str, line: usize, depth: usize) -> Result<FStringPart> {
    let (mut expr_text, spec) = split_format_spec(inner);
    let mut repr = false;
    if let Some(stripped) = expr_text.strip_suffix("!r") {
        expr_text = stripped;
        repr = true;
    } else if let Some(stripped) = expr_text.strip_suffix("!s") {
        expr_text = stripped;
    }

    if expr_text.trim().is_empty() {
        return Err(InterpreterError::syntax(line, "f-string: empty expression not allowed"));
    }

    let expr = parse_expression(expr_text, depth).map_err(|error| match error {
        InterpreterError::Syntax { message, .. } => {
            InterpreterError::syntax(line, format!("f-string: {message}"))
        }
        other => other,
    })?;

    Ok(FStringPart::Interpolation {
        expr: Box::new(expr),
        repr,
        spec: spec.map(String::from),
    })
}

/// Splits `expr:spec` at the last top-level colon.
fn split_format_spec(inner: &str) -> (&str, Option<&str>) {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut split_at = None;

    for (index, c) in inner.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '{' | '[' | '(') => depth += 1,
            (None, '}' | ']' | ')') => depth = depth.saturating_sub(1),
            (None, ':') if depth == 0 => split_at = Some(index),
            _ => {}
        }
    }

    match split_at {
        Some(index) => (&inner[..index], Some(&inner[index + 1..])),
        None => (inner, None),
    }
}

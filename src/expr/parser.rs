use std::iter::Peekable;
use std::str::CharIndices;

use crate::expr::ast::{BinOp, Expr, Lhs, ParseError, Stmt, Token, UnaryOp};

/// Type keywords accepted in front of a local declaration
const DECL_KEYWORDS: &[&str] = &["double", "float", "int"];

/// Split source text into tokens, paired with their byte offset
pub fn tokenize(s: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let mut toks = Vec::new();
    let mut chars = s.char_indices().peekable();
    while let Some(&(pos, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c.is_ascii_digit() || c == '.' {
            let mut num = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_ascii_digit()
                    || d == '.'
                    || d == 'e'
                    || d == 'E'
                    || ((d == '+' || d == '-') && (num.ends_with('e') || num.ends_with('E')))
                {
                    num.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            match num.parse::<f64>() {
                Ok(v) => toks.push((Token::Num(v), pos)),
                Err(_) => {
                    return Err(ParseError {
                        offset: pos,
                        found: Some(num),
                        expected: vec!["number".to_string()],
                    })
                }
            }
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let mut id = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_ascii_alphanumeric() || d == '_' {
                    id.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            match id.as_str() {
                "true" => toks.push((Token::Num(1.0), pos)),
                "false" => toks.push((Token::Num(0.0), pos)),
                _ => toks.push((Token::Ident(id), pos)),
            }
            continue;
        }
        chars.next();
        let tok = match c {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            ',' => Token::Comma,
            ';' => Token::Semicolon,
            '?' => Token::Question,
            ':' => Token::Colon,
            '+' | '-' | '*' | '/' => Token::Op(c),
            '<' => {
                if next_is(&mut chars, '=') {
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            '>' => {
                if next_is(&mut chars, '=') {
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            '=' => {
                if next_is(&mut chars, '=') {
                    Token::EqEq
                } else {
                    Token::Assign
                }
            }
            '!' => {
                if next_is(&mut chars, '=') {
                    Token::Ne
                } else {
                    Token::Bang
                }
            }
            '&' if next_is(&mut chars, '&') => Token::And,
            '|' if next_is(&mut chars, '|') => Token::Or,
            _ => {
                return Err(ParseError {
                    offset: pos,
                    found: Some(c.to_string()),
                    expected: Vec::new(),
                })
            }
        };
        toks.push((tok, pos));
    }
    Ok(toks)
}

// Consume the next character if it is `want`
fn next_is(chars: &mut Peekable<CharIndices<'_>>, want: char) -> bool {
    if let Some(&(_, n)) = chars.peek() {
        if n == want {
            chars.next();
            return true;
        }
    }
    false
}

/// Recursive-descent parser over a token stream
pub struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
}

impl Parser {
    /// `end` is the byte length of the source, used as the offset of `<end>`
    pub fn new(tokens: Vec<(Token, usize)>, end: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            end,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<Token> {
        let r = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if r.is_some() {
            self.pos += 1;
        }
        r
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, o)| *o)
            .unwrap_or(self.end)
    }

    fn error(&self, expected: &[&str]) -> ParseError {
        ParseError {
            offset: self.offset(),
            found: self.peek().map(|t| t.to_string()),
            expected: expected.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn expect(&mut self, tok: Token) -> Result<(), ParseError> {
        if self.peek() == Some(&tok) {
            self.next();
            Ok(())
        } else {
            Err(self.error(&[format!("'{}'", tok).as_str()]))
        }
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Parse a single expression that must span the whole input
    pub fn parse_expr_result(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expr()?;
        if !self.is_at_end() {
            return Err(self.error(&["end of expression"]));
        }
        Ok(expr)
    }

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<Expr, ParseError> {
        let cond = self.parse_or()?;
        if let Some(Token::Question) = self.peek() {
            self.next();
            let then_branch = self.parse_expr()?;
            self.expect(Token::Colon)?;
            let else_branch = self.parse_expr()?;
            return Ok(Expr::Ternary {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            });
        }
        Ok(cond)
    }

    /// Left-associative chain of binary operators at one precedence level
    fn parse_binary(
        &mut self,
        next: fn(&mut Self) -> Result<Expr, ParseError>,
        op_of: fn(&Token) -> Option<BinOp>,
    ) -> Result<Expr, ParseError> {
        let mut node = next(self)?;
        while let Some(op) = self.peek().and_then(op_of) {
            self.next();
            let rhs = next(self)?;
            node = Expr::Binary {
                lhs: Box::new(node),
                op,
                rhs: Box::new(rhs),
            };
        }
        Ok(node)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary(Self::parse_and, |t| match t {
            Token::Or => Some(BinOp::Or),
            _ => None,
        })
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary(Self::parse_eq, |t| match t {
            Token::And => Some(BinOp::And),
            _ => None,
        })
    }

    fn parse_eq(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary(Self::parse_cmp, |t| match t {
            Token::EqEq => Some(BinOp::Eq),
            Token::Ne => Some(BinOp::Ne),
            _ => None,
        })
    }

    fn parse_cmp(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary(Self::parse_add_sub, |t| match t {
            Token::Lt => Some(BinOp::Lt),
            Token::Gt => Some(BinOp::Gt),
            Token::Le => Some(BinOp::Le),
            Token::Ge => Some(BinOp::Ge),
            _ => None,
        })
    }

    fn parse_add_sub(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary(Self::parse_mul_div, |t| match t {
            Token::Op('+') => Some(BinOp::Add),
            Token::Op('-') => Some(BinOp::Sub),
            _ => None,
        })
    }

    fn parse_mul_div(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary(Self::parse_unary, |t| match t {
            Token::Op('*') => Some(BinOp::Mul),
            Token::Op('/') => Some(BinOp::Div),
            _ => None,
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Some(Token::Op('-')) => UnaryOp::Neg,
            Some(Token::Op('+')) => UnaryOp::Plus,
            Some(Token::Bang) => UnaryOp::Not,
            _ => return self.parse_primary(),
        };
        self.next();
        let rhs = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            rhs: Box::new(rhs),
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let err = self.error(&["number", "identifier", "'('"]);
        match self.next() {
            Some(Token::Num(v)) => Ok(Expr::Number(v)),
            Some(Token::Ident(id)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.next();
                    let args = self.parse_args()?;
                    Ok(Expr::Call { name: id, args })
                } else {
                    Ok(Expr::Ident(id))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            _ => Err(err),
        }
    }

    // Arguments after the opening parenthesis, consumes the closing one
    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if let Some(Token::RParen) = self.peek() {
            self.next();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            match self.peek() {
                Some(Token::Comma) => {
                    self.next();
                }
                Some(Token::RParen) => {
                    self.next();
                    return Ok(args);
                }
                _ => return Err(self.error(&["','", "')'"])),
            }
        }
    }
}

// Statement parsing on top of the expression parser
impl Parser {
    /// Parse statements until the end of input
    pub fn parse_statements(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        while !self.is_at_end() {
            if let Some(s) = self.parse_statement()? {
                stmts.push(s);
            }
        }
        Ok(stmts)
    }

    // `None` for an empty statement
    fn parse_statement(&mut self) -> Result<Option<Stmt>, ParseError> {
        match self.peek() {
            Some(Token::Semicolon) => {
                self.next();
                Ok(None)
            }
            Some(Token::LBrace) => {
                self.next();
                Ok(Some(self.parse_block_body()?))
            }
            Some(Token::Ident(id)) if id == "if" => {
                self.next();
                Ok(Some(self.parse_if()?))
            }
            Some(Token::Ident(_)) => Ok(Some(self.parse_assignment()?)),
            _ => Err(self.error(&["statement"])),
        }
    }

    // Statements after an opening brace, consumes the closing one
    fn parse_block_body(&mut self) -> Result<Stmt, ParseError> {
        let mut stmts = Vec::new();
        loop {
            match self.peek() {
                Some(Token::RBrace) => {
                    self.next();
                    return Ok(Stmt::Block(stmts));
                }
                None => return Err(self.error(&["'}'"])),
                _ => {
                    if let Some(s) = self.parse_statement()? {
                        stmts.push(s);
                    }
                }
            }
        }
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.expect(Token::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(Token::RParen)?;
        let then_branch = self.parse_branch()?;
        let else_branch = match self.peek() {
            Some(Token::Ident(id)) if id == "else" => {
                self.next();
                Some(Box::new(self.parse_branch()?))
            }
            _ => None,
        };
        Ok(Stmt::If {
            cond,
            then_branch: Box::new(then_branch),
            else_branch,
        })
    }

    fn parse_branch(&mut self) -> Result<Stmt, ParseError> {
        Ok(self.parse_statement()?.unwrap_or(Stmt::Block(Vec::new())))
    }

    fn parse_assignment(&mut self) -> Result<Stmt, ParseError> {
        let head = match self.next() {
            Some(Token::Ident(id)) => id,
            _ => return Err(self.error(&["identifier"])),
        };
        let lhs = match (head.as_str(), self.peek()) {
            (kw, Some(Token::Ident(_))) if DECL_KEYWORDS.contains(&kw) => {
                let name = self.ident()?;
                // `double k;` declares a zero-initialized local
                if let Some(Token::Semicolon) = self.peek() {
                    self.next();
                    return Ok(Stmt::Assign(Lhs::Declare(name), Expr::Number(0.0)));
                }
                Lhs::Declare(name)
            }
            ("capture", Some(Token::Ident(_))) => Lhs::Capture(self.ident()?),
            ("table", Some(Token::LParen)) => {
                self.next();
                let name = self.ident()?;
                self.expect(Token::RParen)?;
                Lhs::Table(name)
            }
            _ => Lhs::Ident(head),
        };
        self.expect(Token::Assign)?;
        let rhs = self.parse_expr()?;
        self.expect(Token::Semicolon)?;
        Ok(Stmt::Assign(lhs, rhs))
    }

    fn ident(&mut self) -> Result<String, ParseError> {
        if let Some(Token::Ident(id)) = self.peek() {
            let id = id.clone();
            self.next();
            Ok(id)
        } else {
            Err(self.error(&["identifier"]))
        }
    }
}

// AST types for model code blocks
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Number(f64),
    Ident(String),
    Unary {
        op: UnaryOp,
        rhs: Box<Expr>,
    },
    Binary {
        lhs: Box<Expr>,
        op: BinOp,
        rhs: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
}

impl Expr {
    /// Visit every identifier referenced by this expression
    pub fn idents<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Number(_) => {}
            Expr::Ident(name) => out.push(name),
            Expr::Unary { rhs, .. } => rhs.idents(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.idents(out);
                rhs.idents(out);
            }
            Expr::Call { args, .. } => args.iter().for_each(|a| a.idents(out)),
            Expr::Ternary {
                cond,
                then_branch,
                else_branch,
            } => {
                cond.idents(out);
                then_branch.idents(out);
                else_branch.idents(out);
            }
        }
    }
}

/// Assignment targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Lhs {
    /// `double NAME = ...`
    Declare(String),
    /// `NAME = ...`, also used for `dxdt_NAME` and `NAME_0`
    Ident(String),
    /// `table(NAME) = ...`
    Table(String),
    /// `capture NAME = ...`
    Capture(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Assign(Lhs, Expr),
    Block(Vec<Stmt>),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Num(f64),
    Ident(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Assign,
    Comma,
    Semicolon,
    Question,
    Colon,
    Op(char),
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    Ne,
    And,
    Or,
    Bang,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Num(v) => write!(f, "{}", v),
            Token::Ident(id) => write!(f, "{}", id),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Assign => write!(f, "="),
            Token::Comma => write!(f, ","),
            Token::Semicolon => write!(f, ";"),
            Token::Question => write!(f, "?"),
            Token::Colon => write!(f, ":"),
            Token::Op(c) => write!(f, "{}", c),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::Le => write!(f, "<="),
            Token::Ge => write!(f, ">="),
            Token::EqEq => write!(f, "=="),
            Token::Ne => write!(f, "!="),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),
            Token::Bang => write!(f, "!"),
        }
    }
}

/// Error raised while tokenizing or parsing a code block.
///
/// `offset` is the byte offset into the parsed source.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub offset: usize,
    pub found: Option<String>,
    pub expected: Vec<String>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let found = self.found.as_deref().unwrap_or("<end>");
        if self.expected.is_empty() {
            write!(f, "unexpected '{}'", found)
        } else {
            write!(
                f,
                "found '{}', expected {}",
                found,
                self.expected.join(" or ")
            )
        }
    }
}

impl std::error::Error for ParseError {}

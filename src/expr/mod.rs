//! Expression language used inside `$MAIN`, `$ODE` and `$TABLE` blocks.
//!
//! The language is a small C-like subset: arithmetic and logical operators,
//! the ternary operator, calls to a fixed set of math builtins, local
//! declarations (`double k = CL/VC;`), `if`/`else` and the two output forms
//! `table(NAME) = ...;` and `capture NAME = ...;`.

mod ast;
mod builtins;
mod parser;

pub use ast::{BinOp, Expr, Lhs, ParseError, Stmt, Token, UnaryOp};
pub use builtins::Builtin;
pub use parser::{tokenize, Parser};

/// Parse a list of statements from a code block
pub fn parse_statements(src: &str) -> Result<Vec<Stmt>, ParseError> {
    let tokens = tokenize(src)?;
    Parser::new(tokens, src.len()).parse_statements()
}

/// Parse a single expression
pub fn parse_expr(src: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(src)?;
    Parser::new(tokens, src.len()).parse_expr_result()
}

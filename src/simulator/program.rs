//! Compilation of code block statements into slot-resolved programs, and their
//! evaluation.

use std::collections::HashMap;

use crate::error::ModelError;
use crate::expr::{BinOp, Builtin, Expr, Lhs, Stmt, UnaryOp};
use crate::model::RESERVED_NAMES;

/// Which code block a program was compiled from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Block {
    Main,
    Ode,
    Table,
}

impl Block {
    pub fn name(&self) -> &'static str {
        match self {
            Block::Main => "MAIN",
            Block::Ode => "ODE",
            Block::Table => "TABLE",
        }
    }
}

/// An expression with every identifier resolved to a slot
#[derive(Debug, Clone)]
pub(crate) enum Node {
    Const(f64),
    Param(usize),
    State(usize),
    Derived(usize),
    Local(usize),
    Time,
    Unary(UnaryOp, Box<Node>),
    Binary(Box<Node>, BinOp, Box<Node>),
    Call(Builtin, Vec<Node>),
    Ternary(Box<Node>, Box<Node>, Box<Node>),
}

/// Where an assignment writes to
#[derive(Debug, Clone, Copy)]
pub(crate) enum Target {
    Local(usize),
    /// Derivative in `$ODE`, output in `$TABLE`, initial value in `$MAIN`
    Out(usize),
}

#[derive(Debug, Clone)]
pub(crate) enum Op {
    Assign(Target, Node),
    If(Node, Vec<Op>, Vec<Op>),
}

/// Read-only values visible to a running program
pub(crate) struct Env<'a> {
    pub params: &'a [f64],
    pub derived: &'a [f64],
    pub states: &'a [f64],
    pub t: f64,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Program {
    ops: Vec<Op>,
    /// Local names in slot order
    locals: Vec<String>,
    /// Out slots written by at least one assignment
    written: Vec<usize>,
}

impl Program {
    pub fn nlocals(&self) -> usize {
        self.locals.len()
    }

    pub fn local_names(&self) -> &[String] {
        &self.locals
    }

    pub fn writes(&self, slot: usize) -> bool {
        self.written.contains(&slot)
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Run every statement; `locals` must hold [Program::nlocals] zeros
    #[inline]
    pub fn run(&self, env: &Env, locals: &mut [f64], out: &mut [f64]) {
        run_ops(&self.ops, env, locals, out);
    }
}

fn run_ops(ops: &[Op], env: &Env, locals: &mut [f64], out: &mut [f64]) {
    for op in ops {
        match op {
            Op::Assign(target, node) => {
                let v = eval(node, env, locals);
                match target {
                    Target::Local(i) => locals[*i] = v,
                    Target::Out(i) => out[*i] = v,
                }
            }
            Op::If(cond, then_ops, else_ops) => {
                if eval(cond, env, locals) != 0.0 {
                    run_ops(then_ops, env, locals, out);
                } else {
                    run_ops(else_ops, env, locals, out);
                }
            }
        }
    }
}

fn truth(v: bool) -> f64 {
    if v {
        1.0
    } else {
        0.0
    }
}

pub(crate) fn eval(node: &Node, env: &Env, locals: &[f64]) -> f64 {
    match node {
        Node::Const(v) => *v,
        Node::Param(i) => env.params[*i],
        Node::State(i) => env.states[*i],
        Node::Derived(i) => env.derived[*i],
        Node::Local(i) => locals[*i],
        Node::Time => env.t,
        Node::Unary(op, rhs) => {
            let v = eval(rhs, env, locals);
            match op {
                UnaryOp::Neg => -v,
                UnaryOp::Plus => v,
                UnaryOp::Not => truth(v == 0.0),
            }
        }
        Node::Binary(lhs, op, rhs) => {
            let a = eval(lhs, env, locals);
            match op {
                BinOp::And => truth(a != 0.0 && eval(rhs, env, locals) != 0.0),
                BinOp::Or => truth(a != 0.0 || eval(rhs, env, locals) != 0.0),
                _ => {
                    let b = eval(rhs, env, locals);
                    match op {
                        BinOp::Add => a + b,
                        BinOp::Sub => a - b,
                        BinOp::Mul => a * b,
                        BinOp::Div => a / b,
                        BinOp::Lt => truth(a < b),
                        BinOp::Gt => truth(a > b),
                        BinOp::Le => truth(a <= b),
                        BinOp::Ge => truth(a >= b),
                        BinOp::Eq => truth(a == b),
                        BinOp::Ne => truth(a != b),
                        BinOp::And | BinOp::Or => unreachable!(),
                    }
                }
            }
        }
        Node::Call(f, args) => match args.as_slice() {
            [a] => f.apply(&[eval(a, env, locals)]),
            [a, b] => f.apply(&[eval(a, env, locals), eval(b, env, locals)]),
            _ => {
                let vals: Vec<f64> = args.iter().map(|a| eval(a, env, locals)).collect();
                f.apply(&vals)
            }
        },
        Node::Ternary(cond, then_branch, else_branch) => {
            if eval(cond, env, locals) != 0.0 {
                eval(then_branch, env, locals)
            } else {
                eval(else_branch, env, locals)
            }
        }
    }
}

/// Names a program can see, besides its own locals
pub(crate) struct Symbols<'a> {
    pub params: &'a HashMap<String, usize>,
    pub states: &'a HashMap<String, usize>,
    /// `$MAIN` locals; empty while compiling `$MAIN` itself
    pub derived: &'a HashMap<String, usize>,
}

/// Compiles the statements of one block
pub(crate) struct Compiler<'a> {
    block: Block,
    symbols: Symbols<'a>,
    locals: HashMap<String, usize>,
    local_names: Vec<String>,
    /// `$TABLE` output names in slot order
    outputs: Vec<String>,
    written: Vec<usize>,
}

impl<'a> Compiler<'a> {
    pub fn new(block: Block, symbols: Symbols<'a>) -> Self {
        Self {
            block,
            symbols,
            locals: HashMap::new(),
            local_names: Vec::new(),
            outputs: Vec::new(),
            written: Vec::new(),
        }
    }

    /// Compile the statements, returning the program and the `$TABLE` output names
    pub fn compile(mut self, stmts: &[Stmt]) -> Result<(Program, Vec<String>), ModelError> {
        let ops = self.stmts(stmts)?;
        let program = Program {
            ops,
            locals: self.local_names,
            written: self.written,
        };
        Ok((program, self.outputs))
    }

    fn stmts(&mut self, stmts: &[Stmt]) -> Result<Vec<Op>, ModelError> {
        let mut ops = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            self.stmt(stmt, &mut ops)?;
        }
        Ok(ops)
    }

    fn stmt(&mut self, stmt: &Stmt, ops: &mut Vec<Op>) -> Result<(), ModelError> {
        match stmt {
            Stmt::Block(inner) => {
                for s in inner {
                    self.stmt(s, ops)?;
                }
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.expr(cond)?;
                let then_ops = self.stmts(std::slice::from_ref(then_branch.as_ref()))?;
                let else_ops = match else_branch {
                    Some(eb) => self.stmts(std::slice::from_ref(eb.as_ref()))?,
                    None => Vec::new(),
                };
                ops.push(Op::If(cond, then_ops, else_ops));
            }
            Stmt::Assign(lhs, rhs) => {
                // Right-hand side first: `double k = k;` is undefined
                let value = self.expr(rhs)?;
                let target = self.target(lhs)?;
                if let Target::Out(i) = target {
                    if !self.written.contains(&i) {
                        self.written.push(i);
                    }
                }
                ops.push(Op::Assign(target, value));
            }
        }
        Ok(())
    }

    fn block_name(&self) -> String {
        self.block.name().to_string()
    }

    fn is_model_name(&self, name: &str) -> bool {
        self.symbols.params.contains_key(name)
            || self.symbols.states.contains_key(name)
            || self.symbols.derived.contains_key(name)
            || RESERVED_NAMES.contains(&name)
    }

    fn target(&mut self, lhs: &Lhs) -> Result<Target, ModelError> {
        match lhs {
            Lhs::Declare(name) => {
                if self.is_model_name(name)
                    || self.locals.contains_key(name)
                    || self.outputs.contains(name)
                {
                    return Err(ModelError::DuplicateName { name: name.clone() });
                }
                let slot = self.local_names.len();
                self.locals.insert(name.clone(), slot);
                self.local_names.push(name.clone());
                Ok(Target::Local(slot))
            }
            Lhs::Table(name) | Lhs::Capture(name) => {
                if self.block != Block::Table {
                    let what = match lhs {
                        Lhs::Table(_) => format!("table({})", name),
                        _ => format!("capture {}", name),
                    };
                    return Err(ModelError::misplaced(what, self.block_name()));
                }
                if self.is_model_name(name) || self.locals.contains_key(name) {
                    return Err(ModelError::DuplicateName { name: name.clone() });
                }
                let slot = match self.outputs.iter().position(|o| o == name) {
                    Some(slot) => slot,
                    None => {
                        self.outputs.push(name.clone());
                        self.outputs.len() - 1
                    }
                };
                Ok(Target::Out(slot))
            }
            Lhs::Ident(name) => self.assign_target(name),
        }
    }

    fn assign_target(&self, name: &str) -> Result<Target, ModelError> {
        if let Some(cmt) = name.strip_prefix("dxdt_") {
            if self.block != Block::Ode {
                return Err(ModelError::misplaced(
                    format!("derivative '{}'", name),
                    self.block_name(),
                ));
            }
            return match self.symbols.states.get(cmt) {
                Some(&i) => Ok(Target::Out(i)),
                None => Err(ModelError::UnknownCompartment {
                    name: cmt.to_string(),
                    block: self.block_name(),
                }),
            };
        }
        if let Some(&i) = self.locals.get(name) {
            return Ok(Target::Local(i));
        }
        if let Some(cmt) = name.strip_suffix("_0") {
            if let Some(&i) = self.symbols.states.get(cmt) {
                if self.block != Block::Main {
                    return Err(ModelError::misplaced(
                        format!("initial value '{}'", name),
                        self.block_name(),
                    ));
                }
                return Ok(Target::Out(i));
            }
        }
        if self.is_model_name(name) {
            return Err(ModelError::ReadOnly {
                name: name.to_string(),
                block: self.block_name(),
            });
        }
        Err(ModelError::undefined(name, self.block_name()))
    }

    fn expr(&self, expr: &Expr) -> Result<Node, ModelError> {
        let node = match expr {
            Expr::Number(v) => Node::Const(*v),
            Expr::Ident(name) => self.resolve(name)?,
            Expr::Unary { op, rhs } => Node::Unary(*op, Box::new(self.expr(rhs)?)),
            Expr::Binary { lhs, op, rhs } => Node::Binary(
                Box::new(self.expr(lhs)?),
                *op,
                Box::new(self.expr(rhs)?),
            ),
            Expr::Call { name, args } => {
                let f = Builtin::from_name(name).ok_or_else(|| ModelError::UnknownFunction {
                    name: name.clone(),
                    block: self.block_name(),
                })?;
                if f.arity() != args.len() {
                    return Err(ModelError::WrongArity {
                        name: name.clone(),
                        expected: f.arity(),
                        found: args.len(),
                    });
                }
                let args = args
                    .iter()
                    .map(|a| self.expr(a))
                    .collect::<Result<Vec<_>, _>>()?;
                Node::Call(f, args)
            }
            Expr::Ternary {
                cond,
                then_branch,
                else_branch,
            } => Node::Ternary(
                Box::new(self.expr(cond)?),
                Box::new(self.expr(then_branch)?),
                Box::new(self.expr(else_branch)?),
            ),
        };
        Ok(node)
    }

    fn resolve(&self, name: &str) -> Result<Node, ModelError> {
        if let Some(&i) = self.locals.get(name) {
            return Ok(Node::Local(i));
        }
        if let Some(&i) = self.symbols.derived.get(name) {
            return Ok(Node::Derived(i));
        }
        if let Some(&i) = self.symbols.params.get(name) {
            return Ok(Node::Param(i));
        }
        if let Some(&i) = self.symbols.states.get(name) {
            return Ok(Node::State(i));
        }
        if RESERVED_NAMES.contains(&name) {
            return Ok(Node::Time);
        }
        Err(ModelError::undefined(name, self.block_name()))
    }
}

//! Error types for model parsing, compilation and simulation

use thiserror::Error;

use crate::expr::ParseError;

/// Errors that can occur when reading, compiling or simulating a model
#[derive(Error, Debug)]
pub enum ModelError {
    // ─────────────────────────────────────────────────────────────────────────
    // Reading and parsing
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to read a model or output file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed block content
    #[error("Syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// Block name that the format does not define
    #[error("Unknown block '${name}' on line {line}")]
    UnknownBlock { name: String, line: usize },

    /// Invalid statement or expression inside a code block
    #[error("Invalid code in ${block} (starting on line {line}): {source}")]
    Expression {
        block: String,
        line: usize,
        #[source]
        source: ParseError,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Semantic errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Name declared twice in the shared namespace
    #[error("Duplicate name: '{name}'")]
    DuplicateName { name: String },

    /// Model name that collides with a built-in symbol
    #[error("'{name}' is a reserved name")]
    ReservedName { name: String },

    /// Identifier that does not resolve to anything
    #[error("Undefined symbol '{name}' in ${block}")]
    UndefinedSymbol { name: String, block: String },

    /// Call to a function that is not a builtin
    #[error("Unknown function '{name}()' in ${block}")]
    UnknownFunction { name: String, block: String },

    /// Builtin called with the wrong number of arguments
    #[error("Function '{name}()' expects {expected} argument(s), got {found}")]
    WrongArity {
        name: String,
        expected: usize,
        found: usize,
    },

    /// `dxdt_X` or `X_0` naming a compartment that does not exist
    #[error("Unknown compartment '{name}' in ${block}")]
    UnknownCompartment { name: String, block: String },

    /// Statement used in a block that does not allow it
    #[error("{what} is not allowed in ${block}")]
    MisplacedStatement { what: String, block: String },

    /// Assignment to a parameter, compartment or derived value
    #[error("Cannot assign to '{name}' in ${block}: it is read-only")]
    ReadOnly { name: String, block: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Settings and overrides
    // ─────────────────────────────────────────────────────────────────────────
    /// Unknown `$SET` key or out-of-range value
    #[error("Invalid setting '{name}': {reason}")]
    InvalidSetting { name: String, reason: String },

    /// Override for a parameter that the model does not declare
    #[error("Unknown parameter '{0}'")]
    UnknownParameter(String),

    /// Initial value override for a compartment that the model does not declare
    #[error("Initial value given for unknown compartment '{0}'")]
    UnknownInitial(String),

    // ─────────────────────────────────────────────────────────────────────────
    // Simulation
    // ─────────────────────────────────────────────────────────────────────────
    /// The integrator gave up
    #[error("ODE solver failed between t={from} and t={to}: {message}")]
    Solver { from: f64, to: f64, message: String },

    /// A state became NaN or infinite
    #[error("Non-finite state value at t={time}; check the model parameters")]
    NonFinite { time: f64 },

    // ─────────────────────────────────────────────────────────────────────────
    // Output
    // ─────────────────────────────────────────────────────────────────────────
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    pub fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            message: message.into(),
        }
    }

    pub fn invalid_setting(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn undefined(name: impl Into<String>, block: impl Into<String>) -> Self {
        Self::UndefinedSymbol {
            name: name.into(),
            block: block.into(),
        }
    }

    pub fn misplaced(what: impl Into<String>, block: impl Into<String>) -> Self {
        Self::MisplacedStatement {
            what: what.into(),
            block: block.into(),
        }
    }
}

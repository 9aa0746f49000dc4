//! Builtin math functions available in code blocks.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Builtin {
    Exp,
    Log,
    Log10,
    Log2,
    Sqrt,
    Abs,
    Floor,
    Ceil,
    Round,
    Sin,
    Cos,
    Tan,
    Pow,
    Min,
    Max,
}

impl Builtin {
    /// Look up a builtin by the name used in model code
    pub fn from_name(name: &str) -> Option<Self> {
        let f = match name {
            "exp" => Self::Exp,
            "log" => Self::Log,
            "log10" => Self::Log10,
            "log2" => Self::Log2,
            "sqrt" => Self::Sqrt,
            "fabs" | "abs" => Self::Abs,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "round" => Self::Round,
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "pow" => Self::Pow,
            "fmin" | "min" => Self::Min,
            "fmax" | "max" => Self::Max,
            _ => return None,
        };
        Some(f)
    }

    pub fn arity(&self) -> usize {
        match self {
            Self::Pow | Self::Min | Self::Max => 2,
            _ => 1,
        }
    }

    /// Apply to already evaluated arguments; `args.len()` is checked at compile time
    #[inline(always)]
    pub fn apply(&self, args: &[f64]) -> f64 {
        let a = args[0];
        match self {
            Self::Exp => a.exp(),
            Self::Log => a.ln(),
            Self::Log10 => a.log10(),
            Self::Log2 => a.log2(),
            Self::Sqrt => a.sqrt(),
            Self::Abs => a.abs(),
            Self::Floor => a.floor(),
            Self::Ceil => a.ceil(),
            Self::Round => a.round(),
            Self::Sin => a.sin(),
            Self::Cos => a.cos(),
            Self::Tan => a.tan(),
            Self::Pow => a.powf(args[1]),
            Self::Min => a.min(args[1]),
            Self::Max => a.max(args[1]),
        }
    }
}

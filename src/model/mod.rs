//! Model files and their declarative records.
//!
//! A model file is a sequence of `$BLOCK` sections:
//!
//! ```text
//! $PARAM CL=1, VC=20, KA=0.2
//! $INIT DEPOT = 1000, CENT = 0
//! $SET end=72, delta=0.25
//!
//! $ODE
//! dxdt_DEPOT = -KA*DEPOT;
//! dxdt_CENT = KA*DEPOT - (CL/VC)*CENT;
//!
//! $TABLE
//! table(CP) = CENT/VC;
//! ```
//!
//! | Block | Content |
//! |-------|---------|
//! | `$PROB` | Free text description |
//! | `$PARAM` | `name = value` parameter defaults |
//! | `$INIT` | `name = value` compartments with initial values |
//! | `$CMT` | Compartment names, initial value zero |
//! | `$SET` | `start`, `end`, `delta`, `rtol`, `atol` |
//! | `$MAIN` | Code run once per simulation, before integration |
//! | `$ODE` | Derivative equations, `dxdt_NAME = expr;` |
//! | `$TABLE` | Derived outputs, `table(NAME) = expr;` |
//!
//! Parsing produces a [ModelFile]; it only checks the structure of the file.
//! Name resolution happens when the file is compiled into a
//! [crate::simulator::Model].

mod blocks;
mod types;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::ModelError;
use crate::expr::{self, Stmt};
use blocks::{parse_assignments, parse_names, split_blocks, strip_comments, RawBlock};

pub use types::{Compartment, InitSource, Parameter, SimSettings, MAX_GRID_POINTS};

/// Names that refer to the simulation time inside code blocks
pub const RESERVED_NAMES: &[&str] = &["TIME", "SOLVERTIME"];

/// The records declared by one model file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    /// `$PROB` text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
    /// Parameters in declaration order
    pub parameters: Vec<Parameter>,
    /// Compartments in declaration order, `$INIT` and `$CMT` combined
    pub compartments: Vec<Compartment>,
    pub settings: SimSettings,
    pub main: Vec<Stmt>,
    pub ode: Vec<Stmt>,
    pub table: Vec<Stmt>,
}

impl ModelFile {
    /// Read and parse a model file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        tracing::debug!("Parsing model file {}", path.display());
        parse_model(&text)
    }

    /// Default value of a parameter
    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value)
    }

    pub fn compartment(&self, name: &str) -> Option<&Compartment> {
        self.compartments.iter().find(|c| c.name == name)
    }

    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn compartment_names(&self) -> Vec<&str> {
        self.compartments.iter().map(|c| c.name.as_str()).collect()
    }

    /// Initial values in compartment order
    pub fn initials(&self) -> Vec<f64> {
        self.compartments.iter().map(|c| c.initial).collect()
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Parse the text of a model file
pub fn parse_model(text: &str) -> Result<ModelFile, ModelError> {
    let mut model = ModelFile {
        problem: None,
        parameters: Vec::new(),
        compartments: Vec::new(),
        settings: SimSettings::default(),
        main: Vec::new(),
        ode: Vec::new(),
        table: Vec::new(),
    };
    let mut names = HashSet::new();

    for block in split_blocks(text)? {
        match block.name.as_str() {
            "PROB" => {
                let text = block.body.trim();
                if !text.is_empty() {
                    model.problem = Some(match model.problem.take() {
                        Some(prev) => format!("{}\n{}", prev, text),
                        None => text.to_string(),
                    });
                }
            }
            "PARAM" => {
                for (name, value) in parse_assignments(&block)? {
                    declare(&mut names, &name)?;
                    model.parameters.push(Parameter { name, value });
                }
            }
            "INIT" => {
                for (name, initial) in parse_assignments(&block)? {
                    declare(&mut names, &name)?;
                    model.compartments.push(Compartment {
                        name,
                        initial,
                        source: InitSource::Init,
                    });
                }
            }
            "CMT" => {
                for name in parse_names(&block)? {
                    declare(&mut names, &name)?;
                    model.compartments.push(Compartment {
                        name,
                        initial: 0.0,
                        source: InitSource::Cmt,
                    });
                }
            }
            "SET" => {
                for (name, value) in parse_assignments(&block)? {
                    model.settings.set(&name, value)?;
                }
            }
            "MAIN" => model.main.extend(parse_code(&block)?),
            "ODE" => model.ode.extend(parse_code(&block)?),
            "TABLE" => model.table.extend(parse_code(&block)?),
            _ => {
                return Err(ModelError::UnknownBlock {
                    name: block.name,
                    line: block.line,
                })
            }
        }
    }
    model.settings.validate()?;

    tracing::debug!(
        "Parsed model with {} parameters and {} compartments",
        model.parameters.len(),
        model.compartments.len()
    );
    Ok(model)
}

fn declare(names: &mut HashSet<String>, name: &str) -> Result<(), ModelError> {
    if RESERVED_NAMES.contains(&name) {
        return Err(ModelError::ReservedName {
            name: name.to_string(),
        });
    }
    if !names.insert(name.to_string()) {
        return Err(ModelError::DuplicateName {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn parse_code(block: &RawBlock) -> Result<Vec<Stmt>, ModelError> {
    let body = strip_comments(&block.body);
    expr::parse_statements(&body).map_err(|source| ModelError::Expression {
        block: block.name.clone(),
        line: block.line_of(source.offset),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Lhs;

    const FIRST: &str = "$PARAM CL=1, VC=20, KA=0.2
$INIT DEPOT = 1000, CENT = 0
$SET end=72, delta=0.25

$ODE

dxdt_DEPOT = -KA*DEPOT;
dxdt_CENT = KA*DEPOT - (CL/VC)*CENT;

$TABLE
table(CP) = CENT/VC;
";

    #[test]
    fn test_parse_first_model() {
        let model = parse_model(FIRST).expect("parse failed");
        assert_eq!(model.parameter_names(), vec!["CL", "VC", "KA"]);
        assert_eq!(model.parameter("KA"), Some(0.2));
        assert_eq!(model.compartment_names(), vec!["DEPOT", "CENT"]);
        assert_eq!(model.initials(), vec![1000.0, 0.0]);
        assert_eq!(model.settings.end, 72.0);
        assert_eq!(model.settings.delta, 0.25);
        assert_eq!(model.settings.start, 0.0);
        assert_eq!(model.ode.len(), 2);
        assert!(matches!(&model.table[0], Stmt::Assign(Lhs::Table(n), _) if n == "CP"));
    }

    #[test]
    fn test_problem_text_is_kept_verbatim() {
        let model = parse_model("$PROB One compartment // not a comment\n$PARAM A=1\n").unwrap();
        assert_eq!(
            model.problem.as_deref(),
            Some("One compartment // not a comment")
        );
    }

    #[test]
    fn test_repeated_blocks_accumulate() {
        let model = parse_model("$PARAM A=1\n$PARAM B=2\n$CMT X\n$INIT Y=3\n").unwrap();
        assert_eq!(model.parameter_names(), vec!["A", "B"]);
        assert_eq!(model.compartment_names(), vec!["X", "Y"]);
        assert_eq!(model.compartment("X").unwrap().source, InitSource::Cmt);
        assert_eq!(model.compartment("Y").unwrap().source, InitSource::Init);
    }

    #[test]
    fn test_duplicate_between_param_and_cmt() {
        let err = parse_model("$PARAM CENT=1\n$CMT CENT\n").unwrap_err();
        assert!(matches!(err, ModelError::DuplicateName { name } if name == "CENT"));
    }

    #[test]
    fn test_reserved_name() {
        let err = parse_model("$PARAM TIME=1\n").unwrap_err();
        assert!(matches!(err, ModelError::ReservedName { .. }));
    }

    #[test]
    fn test_unknown_block() {
        let err = parse_model("$PARAM A=1\n$OMEGA 0.1\n").unwrap_err();
        assert!(matches!(err, ModelError::UnknownBlock { name, line: 2 } if name == "OMEGA"));
    }

    #[test]
    fn test_invalid_set() {
        assert!(matches!(
            parse_model("$SET end=-1\n"),
            Err(ModelError::InvalidSetting { .. })
        ));
        assert!(matches!(
            parse_model("$SET ss=1\n"),
            Err(ModelError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn test_code_error_reports_line() {
        let err = parse_model("$PARAM A=1\n$ODE\ndxdt_X = A;\ndxdt_Y = A *;\n").unwrap_err();
        match err {
            ModelError::Expression { block, line, .. } => {
                assert_eq!(block, "ODE");
                assert_eq!(line, 4);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_json_roundtrip() {
        let model = parse_model(FIRST).unwrap();
        let json = model.to_json().unwrap();
        let back: ModelFile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, model);
    }
}

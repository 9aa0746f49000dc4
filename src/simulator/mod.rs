//! Compiled models and their simulation.
//!
//! A [Model] is built from a parsed [ModelFile]. Compilation resolves every
//! identifier in `$MAIN`, `$ODE` and `$TABLE` to a parameter, compartment,
//! `$MAIN` value or local, so all name errors surface before any simulation.
//!
//! ```ignore
//! use pkmod::prelude::*;
//!
//! let model = Model::from_path("models/firstmodelExample.cpp")?;
//! let out = model.simulate(&Overrides::new().param("CL", 2.0))?;
//! println!("{:?}", out.column("CP"));
//! ```

mod output;
pub(crate) mod program;
mod solver;

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::ModelError;
use crate::model::{parse_model, ModelFile, SimSettings};
use program::{Block, Compiler, Env, Program, Symbols};
use solver::Rhs;

pub use output::SimulationOutput;

/// Per-simulation changes to the model defaults
///
/// Unset fields keep the values declared by the model file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Overrides {
    pub params: BTreeMap<String, f64>,
    /// Initial values; these win over both `$INIT` and `X_0` in `$MAIN`
    pub init: BTreeMap<String, f64>,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub delta: Option<f64>,
    pub rtol: Option<f64>,
    pub atol: Option<f64>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn init(mut self, name: impl Into<String>, value: f64) -> Self {
        self.init.insert(name.into(), value);
        self
    }

    pub fn start(mut self, start: f64) -> Self {
        self.start = Some(start);
        self
    }

    pub fn end(mut self, end: f64) -> Self {
        self.end = Some(end);
        self
    }

    pub fn delta(mut self, delta: f64) -> Self {
        self.delta = Some(delta);
        self
    }

    pub fn tolerances(mut self, rtol: f64, atol: f64) -> Self {
        self.rtol = Some(rtol);
        self.atol = Some(atol);
        self
    }

    /// Apply the time and tolerance overrides to `settings`
    pub fn apply(&self, settings: &SimSettings) -> Result<SimSettings, ModelError> {
        let mut settings = *settings;
        settings.start = self.start.unwrap_or(settings.start);
        settings.end = self.end.unwrap_or(settings.end);
        settings.delta = self.delta.unwrap_or(settings.delta);
        settings.rtol = self.rtol.unwrap_or(settings.rtol);
        settings.atol = self.atol.unwrap_or(settings.atol);
        settings.validate()?;
        Ok(settings)
    }
}

/// A model file compiled for simulation
#[derive(Debug, Clone)]
pub struct Model {
    file: ModelFile,
    main: Program,
    ode: Program,
    table: Program,
    /// `$TABLE` output names
    outputs: Vec<String>,
    param_index: HashMap<String, usize>,
    state_index: HashMap<String, usize>,
}

impl Model {
    /// Resolve every name used by the code blocks of `file`
    pub fn compile(file: ModelFile) -> Result<Self, ModelError> {
        let param_index = index(file.parameters.iter().map(|p| p.name.as_str()));
        let state_index = index(file.compartments.iter().map(|c| c.name.as_str()));
        let no_derived = HashMap::new();

        let (main, _) = Compiler::new(
            Block::Main,
            Symbols {
                params: &param_index,
                states: &state_index,
                derived: &no_derived,
            },
        )
        .compile(&file.main)?;

        let derived = index(main.local_names().iter().map(String::as_str));
        let symbols = || Symbols {
            params: &param_index,
            states: &state_index,
            derived: &derived,
        };
        let (ode, _) = Compiler::new(Block::Ode, symbols()).compile(&file.ode)?;
        let (table, outputs) = Compiler::new(Block::Table, symbols()).compile(&file.table)?;

        for (i, cmt) in file.compartments.iter().enumerate() {
            if !ode.writes(i) {
                tracing::warn!(
                    "Compartment {} has no dxdt_{} equation; its derivative is zero",
                    cmt.name,
                    cmt.name
                );
            }
        }

        tracing::debug!(
            "Compiled model: {} parameters, {} compartments, {} outputs",
            param_index.len(),
            state_index.len(),
            outputs.len()
        );

        Ok(Self {
            file,
            main,
            ode,
            table,
            outputs,
            param_index,
            state_index,
        })
    }

    /// Parse and compile model text
    pub fn parse(text: &str) -> Result<Self, ModelError> {
        Self::compile(parse_model(text)?)
    }

    /// Read, parse and compile a model file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        Self::compile(ModelFile::from_path(path)?)
    }

    pub fn file(&self) -> &ModelFile {
        &self.file
    }

    pub fn settings(&self) -> &SimSettings {
        &self.file.settings
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Names of the values computed by `$MAIN`
    pub fn derived(&self) -> &[String] {
        self.main.local_names()
    }

    /// Output column names: `time`, compartments, then outputs
    pub fn columns(&self) -> Vec<String> {
        std::iter::once("time".to_string())
            .chain(self.file.compartments.iter().map(|c| c.name.clone()))
            .chain(self.outputs.iter().cloned())
            .collect()
    }

    fn parameter_values(&self, overrides: &Overrides) -> Result<Vec<f64>, ModelError> {
        let mut params: Vec<f64> = self.file.parameters.iter().map(|p| p.value).collect();
        for (name, value) in &overrides.params {
            let i = self
                .param_index
                .get(name)
                .ok_or_else(|| ModelError::UnknownParameter(name.clone()))?;
            params[*i] = *value;
        }
        Ok(params)
    }

    /// Run one simulation
    pub fn simulate(&self, overrides: &Overrides) -> Result<SimulationOutput, ModelError> {
        let settings = overrides.apply(&self.file.settings)?;
        let params = self.parameter_values(overrides)?;
        for name in overrides.init.keys() {
            if !self.state_index.contains_key(name) {
                return Err(ModelError::UnknownInitial(name.clone()));
            }
        }

        // $MAIN sees the declared initial values and may replace them via X_0
        let declared = self.file.initials();
        let mut x = declared.clone();
        let mut derived = vec![0.0; self.main.nlocals()];
        if !self.main.is_empty() {
            let env = Env {
                params: &params,
                derived: &[],
                states: &declared,
                t: settings.start,
            };
            self.main.run(&env, &mut derived, &mut x);
        }
        for (name, value) in &overrides.init {
            x[self.state_index[name]] = *value;
        }

        let grid = settings.grid();
        let ncmt = x.len();
        let mut data = Array2::zeros((grid.len(), 1 + ncmt + self.outputs.len()));
        tracing::debug!(
            "Simulating {} output times from {} to {}",
            grid.len(),
            settings.start,
            settings.end
        );

        let mut table_out = vec![0.0; self.outputs.len()];
        let mut table_locals = vec![0.0; self.table.nlocals()];
        for (row, &t) in grid.iter().enumerate() {
            if row > 0 {
                let rhs = Rhs::new(&self.ode, &params, &derived);
                x = solver::integrate(rhs, &x, grid[row - 1], t, settings.rtol, settings.atol)?;
            }
            if x.iter().any(|v| !v.is_finite()) {
                return Err(ModelError::NonFinite { time: t });
            }

            table_out.fill(0.0);
            table_locals.fill(0.0);
            let env = Env {
                params: &params,
                derived: &derived,
                states: &x,
                t,
            };
            self.table.run(&env, &mut table_locals, &mut table_out);

            let mut r = data.row_mut(row);
            r[0] = t;
            for (i, v) in x.iter().chain(table_out.iter()).enumerate() {
                r[1 + i] = *v;
            }
        }

        Ok(SimulationOutput::new(self.columns(), data))
    }

    /// Run one simulation per scenario in parallel, keeping the input order
    pub fn simulate_many(
        &self,
        scenarios: &[Overrides],
    ) -> Vec<Result<SimulationOutput, ModelError>> {
        tracing::debug!("Simulating {} scenarios", scenarios.len());
        scenarios.par_iter().map(|o| self.simulate(o)).collect()
    }
}

fn index<'a>(names: impl Iterator<Item = &'a str>) -> HashMap<String, usize> {
    names.enumerate().map(|(i, n)| (n.to_string(), i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ONE_CMT: &str = "$PARAM KE=0.1, V=10
$INIT CENT=100
$SET end=10, delta=1

$ODE
dxdt_CENT = -KE*CENT;

$TABLE
table(CP) = CENT/V;
";

    #[test]
    fn test_simulate_one_compartment() {
        let model = Model::parse(ONE_CMT).unwrap();
        assert_eq!(model.columns(), vec!["time", "CENT", "CP"]);
        let out = model.simulate(&Overrides::new()).unwrap();
        assert_eq!(out.nrows(), 11);
        for row in 0..out.nrows() {
            let t = out.value(row, "time").unwrap();
            let expected = 100.0 * (-0.1 * t).exp();
            assert_relative_eq!(out.value(row, "CENT").unwrap(), expected, max_relative = 1e-6);
            assert_relative_eq!(out.value(row, "CP").unwrap(), expected / 10.0, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_overrides() {
        let model = Model::parse(ONE_CMT).unwrap();
        let out = model
            .simulate(&Overrides::new().param("KE", 0.2).init("CENT", 50.0).end(4.0).delta(2.0))
            .unwrap();
        assert_eq!(out.times().to_vec(), vec![0.0, 2.0, 4.0]);
        assert_eq!(out.value(0, "CENT"), Some(50.0));
        assert_relative_eq!(out.last("CENT").unwrap(), 50.0 * (-0.8f64).exp(), max_relative = 1e-6);
    }

    #[test]
    fn test_negative_start_time() {
        let model = Model::parse(ONE_CMT).unwrap();
        let out = model
            .simulate(&Overrides::new().start(-3.0).end(1.0).delta(0.5))
            .unwrap();
        assert_eq!(out.nrows(), 9);
        assert_eq!(out.value(0, "time"), Some(-3.0));
        assert_relative_eq!(out.last("CENT").unwrap(), 100.0 * (-0.4f64).exp(), max_relative = 1e-6);
    }

    #[test]
    fn test_unknown_override_names() {
        let model = Model::parse(ONE_CMT).unwrap();
        assert!(matches!(
            model.simulate(&Overrides::new().param("KA", 1.0)),
            Err(ModelError::UnknownParameter(name)) if name == "KA"
        ));
        assert!(matches!(
            model.simulate(&Overrides::new().init("GUT", 1.0)),
            Err(ModelError::UnknownInitial(name)) if name == "GUT"
        ));
        assert!(matches!(
            model.simulate(&Overrides::new().delta(-1.0)),
            Err(ModelError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn test_main_values_and_initials() {
        let model = Model::parse(
            "$PARAM CL=1, V=10, DOSE=5
$CMT CENT
$SET end=2
$MAIN
double KE = CL/V;
CENT_0 = DOSE * 2;
$ODE
dxdt_CENT = -KE*CENT;
$TABLE
capture K = KE;
",
        )
        .unwrap();
        assert_eq!(model.derived(), &["KE".to_string()]);
        let out = model.simulate(&Overrides::new()).unwrap();
        assert_eq!(out.value(0, "CENT"), Some(10.0));
        assert_eq!(out.last("K"), Some(0.1));

        // Caller initial values win over X_0
        let out = model.simulate(&Overrides::new().init("CENT", 1.0)).unwrap();
        assert_eq!(out.value(0, "CENT"), Some(1.0));
    }

    #[test]
    fn test_missing_derivative_stays_constant() {
        let model = Model::parse("$INIT A=3, B=1\n$ODE\ndxdt_B = 1;\n$SET end=2\n").unwrap();
        let out = model.simulate(&Overrides::new()).unwrap();
        assert_eq!(out.column("A").unwrap().to_vec(), vec![3.0, 3.0, 3.0]);
        assert_relative_eq!(out.last("B").unwrap(), 3.0, max_relative = 1e-8);
    }

    #[test]
    fn test_no_compartments() {
        let model = Model::parse("$PARAM A=2\n$SET end=3\n$TABLE\ntable(Y) = A*TIME;\n").unwrap();
        let out = model.simulate(&Overrides::new()).unwrap();
        assert_eq!(out.columns(), &["time".to_string(), "Y".to_string()]);
        assert_eq!(out.column("Y").unwrap().to_vec(), vec![0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_non_finite_state() {
        let model = Model::parse("$INIT A=0\n$ODE\ndxdt_A = 0;\n$MAIN\nA_0 = log(0) * 0;\n").unwrap();
        assert!(matches!(
            model.simulate(&Overrides::new()),
            Err(ModelError::NonFinite { time }) if time == 0.0
        ));
    }

    #[test]
    fn test_simulate_many_keeps_order() {
        let model = Model::parse(ONE_CMT).unwrap();
        let scenarios: Vec<Overrides> = [0.1, 0.2, 0.3]
            .iter()
            .map(|ke| Overrides::new().param("KE", *ke))
            .chain(std::iter::once(Overrides::new().param("Q", 1.0)))
            .collect();
        let results = model.simulate_many(&scenarios);
        assert_eq!(results.len(), 4);
        for (res, ke) in results.iter().take(3).zip([0.1, 0.2, 0.3]) {
            let out = res.as_ref().unwrap();
            assert_relative_eq!(
                out.last("CENT").unwrap(),
                100.0 * (-ke * 10.0f64).exp(),
                max_relative = 1e-6
            );
        }
        assert!(results[3].is_err());
    }
}

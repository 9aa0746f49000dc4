//! Run settings read from a TOML file and `PKMOD_` environment variables.
//!
//! ```toml
//! model = "models/pkExample.cpp"
//!
//! [solver]
//! end = 48
//! delta = 0.5
//!
//! [param]
//! CL = 2.0
//!
//! [init]
//! GUT = 100
//!
//! [output]
//! path = "pk.csv"
//!
//! [log]
//! level = "debug"
//! ```
//!
//! Environment variables use `__` between nested keys, e.g.
//! `PKMOD_SOLVER__END=48` or `PKMOD_LOG__LEVEL=debug`.

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ModelError;
use crate::model::ModelFile;
use crate::simulator::Overrides;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Model file to simulate
    pub model: Option<PathBuf>,
    #[serde(default)]
    pub solver: Solver,
    /// Parameter values replacing the `$PARAM` defaults
    #[serde(default)]
    pub param: BTreeMap<String, f64>,
    /// Initial values replacing `$INIT` and `$MAIN`
    #[serde(default)]
    pub init: BTreeMap<String, f64>,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub log: Log,
}

/// Overrides for the `$SET` values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Solver {
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub delta: Option<f64>,
    pub rtol: Option<f64>,
    pub atol: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Output {
    /// CSV destination; standard output when unset
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Log {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Read settings from a TOML file, then apply environment variables
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, config::ConfigError> {
        Self::build(Some(path.as_ref()))
    }

    /// Settings from environment variables only
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::build(None)
    }

    fn build(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            tracing::debug!("Reading settings from {}", path.display());
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        let parsed = builder
            .add_source(
                Environment::with_prefix("PKMOD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        parsed.try_deserialize()
    }

    /// Simulation overrides for `model`
    ///
    /// Parameter and compartment names are matched exactly first, then
    /// case-insensitively, since environment keys arrive lower-cased.
    pub fn overrides(&self, model: &ModelFile) -> Result<Overrides, ModelError> {
        let mut overrides = Overrides {
            start: self.solver.start,
            end: self.solver.end,
            delta: self.solver.delta,
            rtol: self.solver.rtol,
            atol: self.solver.atol,
            ..Default::default()
        };
        let params = model.parameter_names();
        for (name, value) in &self.param {
            let name = match_name(&params, name)
                .ok_or_else(|| ModelError::UnknownParameter(name.clone()))?;
            overrides.params.insert(name, *value);
        }
        let cmts = model.compartment_names();
        for (name, value) in &self.init {
            let name = match_name(&cmts, name)
                .ok_or_else(|| ModelError::UnknownInitial(name.clone()))?;
            overrides.init.insert(name, *value);
        }
        Ok(overrides)
    }
}

fn match_name(declared: &[&str], name: &str) -> Option<String> {
    if declared.contains(&name) {
        return Some(name.to_string());
    }
    let mut found = declared.iter().filter(|d| d.eq_ignore_ascii_case(name));
    match (found.next(), found.next()) {
        (Some(only), None) => Some(only.to_string()),
        _ => None,
    }
}

//! Parsing and simulation of block-structured PK/PD model files.
//!
//! A model file declares parameters (`$PARAM`), compartments (`$INIT`,
//! `$CMT`), simulation settings (`$SET`) and C-like code for derived values
//! (`$MAIN`), derivatives (`$ODE`) and outputs (`$TABLE`). Files are parsed
//! into a [ModelFile], compiled into a [Model] and simulated over a regular
//! time grid with an adaptive Runge-Kutta integrator.
//!
//! ```ignore
//! use pkmod::prelude::*;
//!
//! let model = Model::from_path("models/pkExample.cpp")?;
//! let out = model.simulate(&Overrides::new().init("GUT", 100.0))?;
//! out.to_csv_path("pk.csv")?;
//! ```

pub mod error;
pub mod expr;
pub mod logger;
pub mod model;
pub mod settings;
pub mod simulator;

pub use error::ModelError;
pub use model::{parse_model, Compartment, InitSource, ModelFile, Parameter, SimSettings};
pub use settings::Settings;
pub use simulator::{Model, Overrides, SimulationOutput};

pub mod prelude {
    pub use crate::error::ModelError;
    pub use crate::model::{parse_model, ModelFile, SimSettings};
    pub use crate::settings::Settings;
    pub use crate::simulator::{Model, Overrides, SimulationOutput};
}

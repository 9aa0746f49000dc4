//! Data records declared by a model file

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Largest number of output times a simulation may produce
pub const MAX_GRID_POINTS: usize = 10_000_000;

/// A named parameter with its default value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
}

/// Where a compartment was declared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitSource {
    /// `$INIT NAME = value`
    Init,
    /// `$CMT NAME`, initial value is zero
    Cmt,
}

/// A state variable of the ODE system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compartment {
    pub name: String,
    pub initial: f64,
    pub source: InitSource,
}

/// Simulation settings from `$SET`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimSettings {
    pub start: f64,
    pub end: f64,
    /// Output interval
    pub delta: f64,
    pub rtol: f64,
    pub atol: f64,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: 24.0,
            delta: 1.0,
            rtol: 1e-8,
            atol: 1e-8,
        }
    }
}

impl SimSettings {
    /// Set a value by its `$SET` key
    pub fn set(&mut self, name: &str, value: f64) -> Result<(), ModelError> {
        match name {
            "start" => self.start = value,
            "end" => self.end = value,
            "delta" => self.delta = value,
            "rtol" => self.rtol = value,
            "atol" => self.atol = value,
            _ => {
                return Err(ModelError::invalid_setting(
                    name,
                    "expected one of start, end, delta, rtol, atol",
                ))
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        for (name, value) in [
            ("start", self.start),
            ("end", self.end),
            ("delta", self.delta),
            ("rtol", self.rtol),
            ("atol", self.atol),
        ] {
            if !value.is_finite() {
                return Err(ModelError::invalid_setting(name, "must be finite"));
            }
        }
        if self.delta <= 0.0 {
            return Err(ModelError::invalid_setting("delta", "must be positive"));
        }
        if self.end < self.start {
            return Err(ModelError::invalid_setting(
                "end",
                format!("{} is before start ({})", self.end, self.start),
            ));
        }
        if self.rtol <= 0.0 {
            return Err(ModelError::invalid_setting("rtol", "must be positive"));
        }
        if self.atol <= 0.0 {
            return Err(ModelError::invalid_setting("atol", "must be positive"));
        }
        let points = self.grid_len();
        if !points.is_finite() || points > MAX_GRID_POINTS as f64 {
            return Err(ModelError::invalid_setting(
                "delta",
                format!(
                    "{} is too small for the interval {}..{} (more than {} output times)",
                    self.delta, self.start, self.end, MAX_GRID_POINTS
                ),
            ));
        }
        Ok(())
    }

    // Tolerate rounding in (end - start) / delta
    fn grid_len(&self) -> f64 {
        ((self.end - self.start) / self.delta + 1e-9).floor() + 1.0
    }

    /// Output times `start, start + delta, ...` not exceeding `end`
    ///
    /// Only meaningful for settings that pass [SimSettings::validate].
    pub fn grid(&self) -> Vec<f64> {
        let n = self.grid_len().min(MAX_GRID_POINTS as f64) as usize;
        (0..n)
            .map(|i| self.start + i as f64 * self.delta)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_includes_end_when_aligned() {
        let s = SimSettings {
            end: 72.0,
            delta: 0.25,
            ..Default::default()
        };
        let grid = s.grid();
        assert_eq!(grid.len(), 289);
        assert_eq!(grid[0], 0.0);
        assert_eq!(*grid.last().unwrap(), 72.0);
    }

    #[test]
    fn test_grid_stops_before_unaligned_end() {
        let s = SimSettings {
            end: 10.0,
            delta: 3.0,
            ..Default::default()
        };
        assert_eq!(s.grid(), vec![0.0, 3.0, 6.0, 9.0]);
    }

    #[test]
    fn test_grid_single_point() {
        let s = SimSettings {
            start: 5.0,
            end: 5.0,
            ..Default::default()
        };
        assert_eq!(s.grid(), vec![5.0]);
    }

    #[test]
    fn test_validate_rejects_oversized_grid() {
        let s = SimSettings {
            end: 1e300,
            delta: 1e-300,
            ..Default::default()
        };
        assert!(matches!(
            s.validate(),
            Err(ModelError::InvalidSetting { name, .. }) if name == "delta"
        ));

        let s = SimSettings {
            end: 1e6,
            delta: 1e-3,
            ..Default::default()
        };
        assert!(s.validate().is_err());

        let s = SimSettings {
            end: 1e6,
            delta: 1.0,
            ..Default::default()
        };
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_set_unknown_key() {
        let mut s = SimSettings::default();
        assert!(matches!(
            s.set("maxsteps", 10.0),
            Err(ModelError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn test_validate() {
        let mut s = SimSettings::default();
        assert!(s.validate().is_ok());
        s.delta = 0.0;
        assert!(s.validate().is_err());
        s.delta = 1.0;
        s.end = -1.0;
        assert!(s.validate().is_err());
        s.end = 1.0;
        s.rtol = f64::NAN;
        assert!(s.validate().is_err());
    }
}

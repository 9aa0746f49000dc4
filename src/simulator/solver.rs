use ode_solvers::dop_shared::OutputType;
use ode_solvers::{DVector, Dopri5};
use std::cell::RefCell;

use crate::error::ModelError;
use crate::simulator::program::{Env, Program};

type State = DVector<f64>;
type Time = f64;

const SAFETY_FACTOR: f64 = 0.9;
const BETA: f64 = 0.04;
const FAC_MIN: f64 = 0.2;
const FAC_MAX: f64 = 10.0;
const MAX_STEPS: u32 = 100_000;
const STIFFNESS_CHECK: u32 = 1000;

/// Right-hand side of the ODE system for one simulation
#[derive(Debug, Clone)]
pub(crate) struct Rhs<'a> {
    ode: &'a Program,
    params: &'a [f64],
    derived: &'a [f64],
    /// `$ODE` locals, reused across evaluations
    locals: RefCell<Vec<f64>>,
}

impl<'a> Rhs<'a> {
    pub fn new(ode: &'a Program, params: &'a [f64], derived: &'a [f64]) -> Self {
        Self {
            ode,
            params,
            derived,
            locals: RefCell::new(vec![0.0; ode.nlocals()]),
        }
    }
}

impl ode_solvers::System<Time, State> for Rhs<'_> {
    fn system(&self, t: Time, y: &State, dy: &mut State) {
        let env = Env {
            params: self.params,
            derived: self.derived,
            states: y.as_slice(),
            t,
        };
        let mut locals = self.locals.borrow_mut();
        locals.fill(0.0);
        dy.fill(0.0);
        self.ode.run(&env, locals.as_mut_slice(), dy.as_mut_slice());
    }
}

/// Integrate from `ti` to `tf` with adaptive Dormand-Prince steps, returning
/// the state at `tf`
pub(crate) fn integrate(
    rhs: Rhs<'_>,
    x: &[f64],
    ti: f64,
    tf: f64,
    rtol: f64,
    atol: f64,
) -> Result<Vec<f64>, ModelError> {
    if ti == tf || x.is_empty() {
        return Ok(x.to_vec());
    }
    let solver_error = |message: String| ModelError::Solver {
        from: ti,
        to: tf,
        message,
    };

    // Sparse output stores every accepted step; the last one ends exactly at `tf`.
    // Remaining arguments are the stepper defaults, with an automatic first step.
    let mut stepper = Dopri5::from_param(
        rhs,
        ti,
        tf,
        tf - ti,
        State::from_column_slice(x),
        rtol,
        atol,
        SAFETY_FACTOR,
        BETA,
        FAC_MIN,
        FAC_MAX,
        tf - ti,
        0.0,
        MAX_STEPS,
        STIFFNESS_CHECK,
        OutputType::Sparse,
    );
    stepper
        .integrate()
        .map_err(|e| solver_error(e.to_string()))?;

    stepper
        .y_out()
        .last()
        .map(|y| y.as_slice().to_vec())
        .ok_or_else(|| solver_error("no output from the integrator".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse_statements;
    use crate::simulator::program::{Block, Compiler, Symbols};
    use approx::assert_relative_eq;
    use std::collections::HashMap;

    fn program(src: &str, params: &[&str], states: &[&str]) -> Program {
        let index = |names: &[&str]| -> HashMap<String, usize> {
            names
                .iter()
                .enumerate()
                .map(|(i, n)| (n.to_string(), i))
                .collect()
        };
        let stmts = parse_statements(src).unwrap();
        Compiler::new(
            Block::Ode,
            Symbols {
                params: &index(params),
                states: &index(states),
                derived: &HashMap::new(),
            },
        )
        .compile(&stmts)
        .unwrap()
        .0
    }

    #[test]
    fn test_exponential_decay() {
        let ode = program("dxdt_A = -K*A;", &["K"], &["A"]);
        let rhs = Rhs::new(&ode, &[0.3], &[]);
        let y = integrate(rhs, &[100.0], 0.0, 5.0, 1e-10, 1e-10).unwrap();
        assert_relative_eq!(y[0], 100.0 * (-1.5f64).exp(), max_relative = 1e-7);
    }

    #[test]
    fn test_time_dependent_input() {
        let ode = program("dxdt_A = 2*TIME;", &[], &["A"]);
        let rhs = Rhs::new(&ode, &[], &[]);
        let y = integrate(rhs, &[1.0], 1.0, 3.0, 1e-10, 1e-10).unwrap();
        assert_relative_eq!(y[0], 1.0 + 9.0 - 1.0, max_relative = 1e-8);
    }

    #[test]
    fn test_empty_interval_returns_input() {
        let ode = program("dxdt_A = 1;", &[], &["A"]);
        let rhs = Rhs::new(&ode, &[], &[]);
        assert_eq!(integrate(rhs, &[4.0], 2.0, 2.0, 1e-8, 1e-8).unwrap(), vec![4.0]);
    }

    #[test]
    fn test_interval_ends_land_on_grid() {
        // Unequal interval, non-representable bounds and negative times
        let ode = program("dxdt_A = -K*A;", &["K"], &["A"]);
        for (ti, tf) in [(0.1, 0.3), (-2.5, -0.7), (-1.0, 4.2)] {
            let rhs = Rhs::new(&ode, &[0.5], &[]);
            let y = integrate(rhs, &[10.0], ti, tf, 1e-10, 1e-10).unwrap();
            let expected = 10.0 * (-0.5 * (tf - ti)).exp();
            assert_relative_eq!(y[0], expected, max_relative = 1e-7);
        }
    }

    #[test]
    fn test_locals_are_reused_across_evaluations() {
        let ode = program("double r = 0; r = r + K; dxdt_A = -r*A;", &["K"], &["A"]);
        let rhs = Rhs::new(&ode, &[0.2], &[]);
        let y = integrate(rhs, &[1.0], 0.0, 3.0, 1e-10, 1e-10).unwrap();
        assert_relative_eq!(y[0], (-0.6f64).exp(), max_relative = 1e-7);
    }
}

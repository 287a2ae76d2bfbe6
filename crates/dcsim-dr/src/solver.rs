//! ILP solver interface and the `good_lp` backend.

use std::fmt::Debug;
use std::time::{Duration, Instant};

use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable as LpVariable, constraint,
    microlp, variable,
};
use tracing::{debug, warn};

use crate::error::{DrError, DrResult};
use crate::ilp::{Assignment, IlpModel, Sense, SolveOutcome, VarKind};

/// A mixed 0-1 solver. Implementations must honour `timeout` and report
/// running out of time as [`SolveOutcome::Timeout`], not as an error.
pub trait IlpSolver: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn solve(&self, model: &IlpModel, timeout: Duration) -> DrResult<SolveOutcome>;
}

/// Pure-Rust MILP backend: `good_lp` over `microlp`.
///
/// microlp cannot be interrupted, so the timeout is checked once the solve
/// returns; a solution found after the deadline is dropped as a timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct MicroLp;

impl IlpSolver for MicroLp {
    fn name(&self) -> &'static str {
        "microlp"
    }

    fn solve(&self, model: &IlpModel, timeout: Duration) -> DrResult<SolveOutcome> {
        let started = Instant::now();
        if model.variables.is_empty() {
            return Ok(SolveOutcome::Feasible(Assignment {
                values: Vec::new(),
                objective: 0.0,
            }));
        }

        let mut vars = ProblemVariables::new();
        let columns: Vec<LpVariable> = model
            .variables
            .iter()
            .map(|v| match v.kind {
                VarKind::Binary => vars.add(variable().binary().name(v.name.clone())),
                VarKind::Continuous => vars.add(variable().min(0.0).name(v.name.clone())),
            })
            .collect();

        let objective = linear(&columns, &model.objective)?;
        let mut problem = vars.minimise(objective).using(microlp);
        for row in &model.constraints {
            let lhs = linear(&columns, &row.terms)?;
            problem.add_constraint(match row.sense {
                Sense::Le => constraint::leq(lhs, row.rhs),
                Sense::Eq => constraint::eq(lhs, row.rhs),
                Sense::Ge => constraint::geq(lhs, row.rhs),
            });
        }

        let solution = match problem.solve() {
            Ok(solution) => solution,
            Err(ResolutionError::Infeasible) => {
                debug!(rows = model.constraints.len(), "model infeasible");
                return Ok(SolveOutcome::Infeasible);
            }
            Err(err) => return Err(DrError::Solver(err.to_string())),
        };

        let elapsed = started.elapsed();
        if elapsed > timeout {
            warn!(?elapsed, ?timeout, "solve finished after the deadline");
            return Ok(SolveOutcome::Timeout);
        }

        let values: Vec<f64> = model
            .variables
            .iter()
            .zip(&columns)
            .map(|(v, column)| {
                let value = solution.value(*column);
                match v.kind {
                    VarKind::Binary => value.round(),
                    VarKind::Continuous => value,
                }
            })
            .collect();
        let objective = model.objective.iter().map(|(column, c)| c * values[*column]).sum();
        debug!(binaries = model.binary_count(), objective, ?elapsed, "model solved");
        Ok(SolveOutcome::Feasible(Assignment { values, objective }))
    }
}

fn linear(columns: &[LpVariable], terms: &[(usize, f64)]) -> DrResult<Expression> {
    let mut expr = Expression::with_capacity(terms.len());
    for (column, coefficient) in terms {
        let var = columns
            .get(*column)
            .ok_or_else(|| DrError::Solver(format!("column {column} out of range")))?;
        expr.add_mul(*coefficient, *var);
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two unit jobs over two slots, power 3 and 2: the peak is minimised
    /// by putting them in different slots.
    fn two_job_model() -> IlpModel {
        let mut model = IlpModel::default();
        let z = model.add_variable("z", VarKind::Continuous);
        let a = [model.add_variable("a0", VarKind::Binary), model.add_variable("a1", VarKind::Binary)];
        let b = [model.add_variable("b0", VarKind::Binary), model.add_variable("b1", VarKind::Binary)];
        model.add_constraint("len_a", vec![(a[0], 1.0), (a[1], 1.0)], Sense::Eq, 1.0);
        model.add_constraint("len_b", vec![(b[0], 1.0), (b[1], 1.0)], Sense::Eq, 1.0);
        for s in 0..2 {
            model.add_constraint(format!("pow_{s}"), vec![(a[s], 3.0), (b[s], 2.0), (z, -1.0)], Sense::Le, 0.0);
        }
        model.objective = vec![(z, 1.0)];
        model
    }

    #[test]
    fn finds_the_lowest_peak() {
        let outcome = MicroLp.solve(&two_job_model(), Duration::from_secs(30)).unwrap();
        let SolveOutcome::Feasible(assignment) = outcome else {
            panic!("expected a solution, got {outcome:?}");
        };
        assert!((assignment.objective - 3.0).abs() < 1e-6, "peak {}", assignment.objective);
        assert_ne!(assignment.is_set(1), assignment.is_set(3));
    }

    #[test]
    fn reports_infeasible_rows() {
        let mut model = two_job_model();
        // both jobs in slot 0 and at most one job per slot
        model.add_constraint("pin_a", vec![(1, 1.0)], Sense::Eq, 1.0);
        model.add_constraint("pin_b", vec![(3, 1.0)], Sense::Eq, 1.0);
        model.add_constraint("nodes_0", vec![(1, 1.0), (3, 1.0)], Sense::Le, 1.0);
        let outcome = MicroLp.solve(&model, Duration::from_secs(30)).unwrap();
        assert_eq!(outcome, SolveOutcome::Infeasible);
    }

    #[test]
    fn out_of_range_column_is_an_error() {
        let mut model = two_job_model();
        model.add_constraint("bad", vec![(17, 1.0)], Sense::Ge, 1.0);
        assert!(matches!(MicroLp.solve(&model, Duration::from_secs(1)), Err(DrError::Solver(_))));
    }

    #[test]
    fn zero_timeout_is_reported_as_timeout() {
        let outcome = MicroLp.solve(&two_job_model(), Duration::ZERO).unwrap();
        assert_eq!(outcome, SolveOutcome::Timeout);
    }
}

//! [`MilpSolver`] backed by `good_lp` and its pure-Rust `microlp` engine.
//!
//! Tiers are solved one after another.  Once a tier is optimal its
//! objective is capped at the optimum (plus a small slack) for every later
//! tier, so later tiers only break ties left by earlier ones.
//!
//! `microlp` has no time limit of its own.  Each tier runs on a worker
//! thread and is abandoned once the remaining budget runs out; the
//! abandoned thread finishes in the background and its result is dropped.

use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use good_lp::solvers::microlp::microlp;
use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable, variable,
};
use tracing::{debug, warn};

use super::model::{
    LinearExpr, MilpModel, MilpSolution, MilpSolver, Relation, SolveLimits, SolverError, VarKind,
};

/// Lexicographic tier-by-tier solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoodLpSolver {
    /// Relative slack when fixing a tier's optimum.
    pub relative_slack: f64,
    /// Absolute slack when fixing a tier's optimum.
    pub absolute_slack: f64,
}

impl GoodLpSolver {
    pub const DEFAULT_RELATIVE_SLACK: f64 = 1e-6;
    pub const DEFAULT_ABSOLUTE_SLACK: f64 = 1e-6;
}

impl Default for GoodLpSolver {
    fn default() -> Self {
        Self {
            relative_slack: Self::DEFAULT_RELATIVE_SLACK,
            absolute_slack: Self::DEFAULT_ABSOLUTE_SLACK,
        }
    }
}

impl From<ResolutionError> for SolverError {
    fn from(err: ResolutionError) -> Self {
        match err {
            ResolutionError::Infeasible => Self::Infeasible,
            ResolutionError::Unbounded => Self::Unbounded,
            other => Self::Backend(other.to_string()),
        }
    }
}

fn expression(expr: &LinearExpr, vars: &[Variable]) -> Expression {
    let mut out: Expression = expr.constant.into();
    for &(var, coefficient) in &expr.terms {
        out += vars[var.0] * coefficient;
    }
    out
}

impl GoodLpSolver {
    /// Minimise `objective` with earlier tiers capped by `caps`.
    fn solve_tier(
        model: &MilpModel,
        objective: &LinearExpr,
        caps: &[(usize, f64)],
    ) -> Result<Vec<f64>, SolverError> {
        let mut problem = ProblemVariables::new();
        let vars: Vec<Variable> = model
            .vars
            .iter()
            .map(|kind| match *kind {
                VarKind::Binary => problem.add(variable().binary()),
                VarKind::Continuous { lower, upper } => {
                    let mut def = variable();
                    if let Some(lower) = lower {
                        def = def.min(lower);
                    }
                    if let Some(upper) = upper {
                        def = def.max(upper);
                    }
                    problem.add(def)
                }
            })
            .collect();

        let mut lp = problem.minimise(expression(objective, &vars)).using(microlp);
        for c in &model.constraints {
            let lhs = expression(&c.expr, &vars);
            lp.add_constraint(match c.relation {
                Relation::Le => lhs.leq(c.rhs),
                Relation::Eq => lhs.eq(c.rhs),
                Relation::Ge => lhs.geq(c.rhs),
            });
        }
        for &(tier, cap) in caps {
            lp.add_constraint(expression(&model.objectives[tier], &vars).leq(cap));
        }

        let solution = lp.solve()?;
        Ok(vars.iter().map(|&v| solution.value(v)).collect())
    }

    /// Run [`Self::solve_tier`] on a worker thread, waiting at most `budget`.
    fn solve_tier_within(
        model: &Arc<MilpModel>,
        objective: &LinearExpr,
        caps: &[(usize, f64)],
        budget: Duration,
    ) -> Result<Vec<f64>, SolverError> {
        if budget.is_zero() {
            return Err(SolverError::TimeLimit);
        }
        let (tx, rx) = mpsc::channel();
        let model = Arc::clone(model);
        let objective = objective.clone();
        let caps = caps.to_vec();
        thread::Builder::new()
            .name("plenum-milp".to_owned())
            .spawn(move || {
                // The receiver is gone once the caller gave up.
                let _ = tx.send(Self::solve_tier(&model, &objective, &caps));
            })
            .map_err(|err| SolverError::Backend(err.to_string()))?;
        match rx.recv_timeout(budget) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(SolverError::TimeLimit),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(SolverError::Backend("solver thread exited without a result".to_owned()))
            }
        }
    }
}

impl MilpSolver for GoodLpSolver {
    fn solve(
        &self,
        model: &MilpModel,
        limits: &SolveLimits,
    ) -> Result<Vec<MilpSolution>, SolverError> {
        let started = Instant::now();
        let tiers: Vec<LinearExpr> = if model.objectives.is_empty() {
            vec![LinearExpr::new()]
        } else {
            model.objectives.clone()
        };
        let shared = Arc::new(model.clone());

        let mut caps = Vec::new();
        let mut incumbents: Vec<MilpSolution> = Vec::new();
        for (tier, objective) in tiers.iter().enumerate() {
            let budget = limits.time_limit.saturating_sub(started.elapsed());
            let values = match Self::solve_tier_within(&shared, objective, &caps, budget) {
                Ok(values) => values,
                Err(SolverError::TimeLimit) if !incumbents.is_empty() => {
                    warn!(
                        tier,
                        elapsed = ?started.elapsed(),
                        "solver: time limit reached, keeping earlier tiers"
                    );
                    break;
                }
                Err(err) if !incumbents.is_empty() => {
                    warn!(tier, %err, "solver: refinement failed, keeping earlier tiers");
                    break;
                }
                Err(err) => return Err(err),
            };
            let optimum = objective.evaluate(&values);
            debug!(tier, optimum, "solver: tier solved");
            let cap = self.relative_slack.mul_add(optimum.abs(), optimum) + self.absolute_slack;
            caps.push((tier, cap));
            incumbents.push(MilpSolution::from_values(model, values));
        }
        incumbents.reverse();
        Ok(incumbents)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn later_tiers_break_ties_of_earlier_ones() {
        // Tier 1 only cares that x + y = 1; tier 2 prefers y.
        let mut model = MilpModel::new();
        let x = model.add_var(VarKind::Binary);
        let y = model.add_var(VarKind::Binary);
        model.constrain(LinearExpr::new().term(x, 1.0).term(y, 1.0), Relation::Eq, 1.0);
        model.add_objective(LinearExpr::new());
        model.add_objective(LinearExpr::new().term(x, 1.0));

        let solutions = GoodLpSolver::default().solve(&model, &SolveLimits::default()).unwrap();
        assert_eq!(solutions.len(), 2);
        let best = &solutions[0];
        assert!(best.value(x).abs() < 1e-6);
        assert!((best.value(y) - 1.0).abs() < 1e-6);
        assert!(model.is_feasible(&best.values, 1e-6));
    }

    #[test]
    fn first_tier_caps_the_second() {
        // Minimise x first (x >= 1), then maximise x via -x: the cap holds x at 1.
        let mut model = MilpModel::new();
        let x = model.add_var(VarKind::Continuous {
            lower: Some(1.0),
            upper: Some(5.0),
        });
        model.add_objective(LinearExpr::new().term(x, 1.0));
        model.add_objective(LinearExpr::new().term(x, -1.0));
        let solutions = GoodLpSolver::default().solve(&model, &SolveLimits::default()).unwrap();
        assert!((solutions[0].value(x) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn infeasible_models_report_an_error() {
        let mut model = MilpModel::new();
        let x = model.add_var(VarKind::NON_NEGATIVE);
        model.constrain(LinearExpr::new().term(x, 1.0), Relation::Le, -1.0);
        model.add_objective(LinearExpr::new().term(x, 1.0));
        let err = GoodLpSolver::default().solve(&model, &SolveLimits::default()).unwrap_err();
        assert_eq!(err, SolverError::Infeasible);
    }

    #[test]
    fn exhausted_budget_reports_time_limit() {
        let mut model = MilpModel::new();
        let x = model.add_var(VarKind::Binary);
        model.add_objective(LinearExpr::new().term(x, 1.0));
        let limits = SolveLimits {
            time_limit: Duration::ZERO,
        };
        let err = GoodLpSolver::default().solve(&model, &limits).unwrap_err();
        assert_eq!(err, SolverError::TimeLimit);
    }

    #[test]
    fn overrunning_first_tier_returns_within_the_budget() {
        // 2 * (x_1 + ... + x_n) = n has no binary solution for odd n, and
        // branch and bound has to enumerate half the variables to see it.
        let mut model = MilpModel::new();
        let n: u32 = 41;
        let mut sum = LinearExpr::new();
        for _ in 0..n {
            sum = sum.term(model.add_var(VarKind::Binary), 2.0);
        }
        model.constrain(sum, Relation::Eq, f64::from(n));
        model.add_objective(LinearExpr::new());

        let limits = SolveLimits {
            time_limit: Duration::from_millis(200),
        };
        let started = Instant::now();
        let err = GoodLpSolver::default().solve(&model, &limits).unwrap_err();
        assert_eq!(err, SolverError::TimeLimit);
        assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
    }
}

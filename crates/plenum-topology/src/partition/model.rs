//! Solver-neutral mixed-integer linear programs.
//!
//! A [`MilpModel`] is plain data: typed variables, linear constraints and
//! an ordered list of objective tiers to minimise lexicographically.  Any
//! [`MilpSolver`] can consume it, which keeps the partitioner testable
//! with scripted solvers.

use std::time::Duration;

/// Index of a variable within its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VarKind {
    Binary,
    Continuous { lower: Option<f64>, upper: Option<f64> },
}

impl VarKind {
    /// A continuous variable bounded below by zero.
    pub const NON_NEGATIVE: Self = Self::Continuous {
        lower: Some(0.0),
        upper: None,
    };
}

/// `Σ coefficient · variable + constant`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    pub terms: Vec<(VarId, f64)>,
    pub constant: f64,
}

impl LinearExpr {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn term(mut self, var: VarId, coefficient: f64) -> Self {
        self.terms.push((var, coefficient));
        self
    }

    pub fn add(&mut self, var: VarId, coefficient: f64) {
        self.terms.push((var, coefficient));
    }

    /// Value of the expression under `values`, indexed by variable.
    #[must_use]
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms.iter().fold(self.constant, |acc, &(var, c)| {
            c.mul_add(values.get(var.0).copied().unwrap_or(0.0), acc)
        })
    }
}

impl FromIterator<(VarId, f64)> for LinearExpr {
    fn from_iter<I: IntoIterator<Item = (VarId, f64)>>(iter: I) -> Self {
        Self {
            terms: iter.into_iter().collect(),
            constant: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Le,
    Eq,
    Ge,
}

/// `expr relation rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub expr: LinearExpr,
    pub relation: Relation,
    pub rhs: f64,
}

impl LinearConstraint {
    /// Whether `values` satisfy the constraint within `tolerance`.
    #[must_use]
    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        let lhs = self.expr.evaluate(values);
        match self.relation {
            Relation::Le => lhs <= self.rhs + tolerance,
            Relation::Eq => (lhs - self.rhs).abs() <= tolerance,
            Relation::Ge => lhs >= self.rhs - tolerance,
        }
    }
}

/// Variables, constraints and lexicographic objective tiers, highest
/// priority first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MilpModel {
    pub vars: Vec<VarKind>,
    pub constraints: Vec<LinearConstraint>,
    pub objectives: Vec<LinearExpr>,
}

impl MilpModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_var(&mut self, kind: VarKind) -> VarId {
        self.vars.push(kind);
        VarId(self.vars.len() - 1)
    }

    pub fn constrain(&mut self, expr: LinearExpr, relation: Relation, rhs: f64) {
        self.constraints.push(LinearConstraint { expr, relation, rhs });
    }

    pub fn add_objective(&mut self, expr: LinearExpr) {
        self.objectives.push(expr);
    }

    /// Whether `values` satisfy every bound and constraint.
    #[must_use]
    pub fn is_feasible(&self, values: &[f64], tolerance: f64) -> bool {
        values.len() == self.vars.len()
            && self.vars.iter().zip(values).all(|(kind, &v)| match *kind {
                VarKind::Binary => v.abs() <= tolerance || (v - 1.0).abs() <= tolerance,
                VarKind::Continuous { lower, upper } => {
                    lower.is_none_or(|l| v >= l - tolerance)
                        && upper.is_none_or(|u| v <= u + tolerance)
                }
            })
            && self.constraints.iter().all(|c| c.is_satisfied(values, tolerance))
    }
}

/// One incumbent: a value per variable and a value per objective tier.
#[derive(Debug, Clone, PartialEq)]
pub struct MilpSolution {
    pub values: Vec<f64>,
    pub objectives: Vec<f64>,
}

impl MilpSolution {
    /// Evaluate every objective of `model` at `values`.
    #[must_use]
    pub fn from_values(model: &MilpModel, values: Vec<f64>) -> Self {
        let objectives = model.objectives.iter().map(|o| o.evaluate(&values)).collect();
        Self { values, objectives }
    }

    #[must_use]
    pub fn value(&self, var: VarId) -> f64 {
        self.values.get(var.0).copied().unwrap_or(0.0)
    }
}

/// Resource bounds for one solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolveLimits {
    pub time_limit: Duration,
}

impl SolveLimits {
    pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(600);
}

impl Default for SolveLimits {
    fn default() -> Self {
        Self {
            time_limit: Self::DEFAULT_TIME_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SolverError {
    #[error("model is infeasible")]
    Infeasible,
    #[error("model is unbounded")]
    Unbounded,
    #[error("time limit reached before any incumbent")]
    TimeLimit,
    #[error("solver backend failed: {0}")]
    Backend(String),
}

/// A MILP backend.
///
/// Returns the incumbents it found, most refined first.  An empty list
/// means no feasible point was found within `limits`.
pub trait MilpSolver {
    /// # Errors
    ///
    /// Any [`SolverError`] the backend reports.
    fn solve(
        &self,
        model: &MilpModel,
        limits: &SolveLimits,
    ) -> Result<Vec<MilpSolution>, SolverError>;
}

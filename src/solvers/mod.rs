//! The solve boundary: an opaque interface that takes a configured model
//! and reports an outcome status.
//!
//! Solver failure is data, not a panic: [`SolveReport`] carries the status
//! and diagnostics, and the workflow driver decides which statuses are
//! fatal. The built-in backend is [`DampedNewton`], a dense damped Newton
//! iteration over the active equation instances and unfixed variable
//! instances of the model.

use nalgebra::{DMatrix, DVector};

use crate::model::{EqId, Model, VarId};

/// Outcome classification of one solve attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SolveStatus {
    /// Converged to the requested tolerance.
    Optimal,
    /// No solution found within the iteration budget.
    Infeasible,
    /// The solve broke down (singular system, divergence, bad structure).
    Error,
}

impl SolveStatus {
    /// Whether the solve converged.
    pub fn is_optimal(&self) -> bool {
        matches!(self, SolveStatus::Optimal)
    }
}

/// Status and diagnostics of one solve attempt.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SolveReport {
    /// Outcome classification.
    pub status: SolveStatus,
    /// Human-readable diagnostic.
    pub message: String,
    /// Newton iterations performed.
    pub iterations: usize,
    /// Infinity norm of the residual at exit.
    pub residual_norm: f64,
}

/// Tolerances and iteration limits for a solve attempt.
#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// Convergence tolerance on the residual infinity norm.
    pub tolerance: f64,
    /// Tolerance for the refinement re-solve after the dynamic phase.
    pub tightened_tolerance: f64,
    /// Maximum Newton iterations.
    pub max_iterations: usize,
    /// Step damping factor in `(0, 1]`.
    pub damping: f64,
}

impl Default for SolveOptions {
    fn default() -> Self {
        SolveOptions {
            tolerance: 1e-6,
            tightened_tolerance: 1e-8,
            max_iterations: 50,
            damping: 1.0,
        }
    }
}

impl SolveOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the convergence tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the refinement tolerance.
    pub fn with_tightened_tolerance(mut self, tolerance: f64) -> Self {
        self.tightened_tolerance = tolerance;
        self
    }

    /// Sets the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the Newton step damping factor.
    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }
}

/// A solver backend: consumes the model's current activation configuration
/// and variable values, and leaves the converged values in the model.
pub trait NlpSolver {
    /// Solves the model in place and reports the outcome.
    fn solve(&mut self, model: &mut Model, options: &SolveOptions) -> SolveReport;
}

/// Dense damped Newton iteration with a finite-difference Jacobian.
///
/// Variable instances no active equation reads are pinned at their current
/// values, so a phase configuration may legally leave instances ungoverned.
/// Family bounds are enforced by projecting each Newton step.
#[derive(Debug, Clone)]
pub struct DampedNewton {
    /// Forward-difference perturbation scale.
    pub fd_step: f64,
}

impl Default for DampedNewton {
    fn default() -> Self {
        DampedNewton { fd_step: 1e-8 }
    }
}

impl DampedNewton {
    /// Creates a backend with the default finite-difference step.
    pub fn new() -> Self {
        Self::default()
    }
}

type VarInstance = (VarId, usize, usize);
type EqInstance = (EqId, usize, usize);

impl NlpSolver for DampedNewton {
    fn solve(&mut self, model: &mut Model, options: &SolveOptions) -> SolveReport {
        let eqs = model.active_instances();
        let unknowns = unfixed_instances(model);
        if eqs.is_empty() {
            return report(SolveStatus::Optimal, "no active equations", 0, 0.0);
        }

        // Structural pruning: drop unknowns no active equation reads.
        let free = governed_instances(model, &eqs, &unknowns);
        if free.len() != eqs.len() {
            log::warn!(
                "non-square system in '{}': {} active equations, {} governed unknowns",
                model.name(),
                eqs.len(),
                free.len()
            );
            return report(
                SolveStatus::Error,
                &format!("{} equations for {} governed unknowns", eqs.len(), free.len()),
                0,
                residuals(model, &eqs).amax(),
            );
        }

        for iteration in 0..=options.max_iterations {
            let r = residuals(model, &eqs);
            let norm = r.amax();
            if !norm.is_finite() || norm > 1e12 {
                return report(SolveStatus::Error, "residuals diverged", iteration, norm);
            }
            if norm <= options.tolerance {
                log::debug!(
                    "model '{}' converged in {} iterations (residual {:.3e})",
                    model.name(),
                    iteration,
                    norm
                );
                return report(SolveStatus::Optimal, "converged", iteration, norm);
            }
            if iteration == options.max_iterations {
                return report(
                    SolveStatus::Infeasible,
                    "iteration budget exhausted",
                    iteration,
                    norm,
                );
            }

            let j = jacobian(model, &eqs, &free, self.fd_step);
            let dx = match j.lu().solve(&(-&r)) {
                Some(dx) => dx,
                None => return report(SolveStatus::Error, "singular Jacobian", iteration, norm),
            };
            for (col, &(id, t, n)) in free.iter().enumerate() {
                let mut v = model.var(id, t, n) + options.damping * dx[col];
                let (lo, hi) = model.bounds(id);
                if let Some(lo) = lo {
                    v = v.max(lo);
                }
                if let Some(hi) = hi {
                    v = v.min(hi);
                }
                model.set_var(id, t, n, v);
            }
        }
        unreachable!("iteration loop always returns");
    }
}

fn report(status: SolveStatus, message: &str, iterations: usize, residual_norm: f64) -> SolveReport {
    SolveReport { status, message: message.to_string(), iterations, residual_norm }
}

fn unfixed_instances(model: &Model) -> Vec<VarInstance> {
    let mut out = Vec::new();
    for id in model.var_ids() {
        let index = model.var_index(id);
        let nt = if index.has_time() { model.n_time() } else { 1 };
        let nu = if index.has_unit() { model.n_units() } else { 1 };
        for t in 0..nt {
            for n in 0..nu {
                if !model.is_fixed(id, t, n) {
                    out.push((id, t, n));
                }
            }
        }
    }
    out
}

/// Keeps the unknowns some active equation actually reads. Each unknown is
/// probed with a NaN value, which propagates through any arithmetic touching
/// it, so reachability does not depend on the local derivative: an unknown
/// whose coefficient happens to vanish at the current point stays governed.
fn governed_instances(
    model: &mut Model,
    eqs: &[EqInstance],
    unknowns: &[VarInstance],
) -> Vec<VarInstance> {
    let mut free = Vec::new();
    for &(id, t, n) in unknowns {
        let saved = model.var(id, t, n);
        model.set_var(id, t, n, f64::NAN);
        let read = eqs.iter().any(|&(eq, et, en)| model.residual(eq, et, en).is_nan());
        model.set_var(id, t, n, saved);
        if read {
            free.push((id, t, n));
        }
    }
    free
}

fn residuals(model: &Model, eqs: &[EqInstance]) -> DVector<f64> {
    DVector::from_iterator(eqs.len(), eqs.iter().map(|&(id, t, n)| model.residual(id, t, n)))
}

fn jacobian(
    model: &mut Model,
    eqs: &[EqInstance],
    vars: &[VarInstance],
    fd_step: f64,
) -> DMatrix<f64> {
    let base = residuals(model, eqs);
    let mut j = DMatrix::zeros(eqs.len(), vars.len());
    for (col, &(id, t, n)) in vars.iter().enumerate() {
        let x = model.var(id, t, n);
        let h = fd_step * (1.0 + x.abs());
        model.set_var(id, t, n, x + h);
        let perturbed = residuals(model, eqs);
        model.set_var(id, t, n, x);
        for row in 0..eqs.len() {
            j[(row, col)] = (perturbed[row] - base[row]) / h;
        }
    }
    j
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IndexSet, SkipPolicy, VarRole};
    use approx::assert_relative_eq;

    #[test]
    fn test_solves_scalar_nonlinear_system() {
        // x^2 - 4 = 0 and y - x = 0, from x = y = 1.
        let mut model = Model::new("m", 1, 0.0, 1.0);
        let x = model.add_variable("x", VarRole::Algebraic, IndexSet::Scalar, 1.0).unwrap();
        let y = model.add_variable("y", VarRole::Algebraic, IndexSet::Scalar, 1.0).unwrap();
        model.add_equation("sq", IndexSet::Scalar, SkipPolicy::None, move |m, _, _| {
            m.var(x, 0, 0) * m.var(x, 0, 0) - 4.0
        });
        model.add_equation("eq", IndexSet::Scalar, SkipPolicy::None, move |m, _, _| {
            m.var(y, 0, 0) - m.var(x, 0, 0)
        });

        let rep = DampedNewton::new().solve(&mut model, &SolveOptions::default());
        assert!(rep.status.is_optimal(), "{}", rep.message);
        assert_relative_eq!(model.var(x, 0, 0), 2.0, epsilon = 1e-6);
        assert_relative_eq!(model.var(y, 0, 0), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_prunes_ungoverned_unknowns() {
        // z appears in no equation: it must be pinned, not break squareness.
        let mut model = Model::new("m", 1, 0.0, 1.0);
        let x = model.add_variable("x", VarRole::Algebraic, IndexSet::Scalar, 0.5).unwrap();
        let z = model.add_variable("z", VarRole::Algebraic, IndexSet::Scalar, 7.0).unwrap();
        model.add_equation("lin", IndexSet::Scalar, SkipPolicy::None, move |m, _, _| {
            3.0 * m.var(x, 0, 0) - 6.0
        });

        let rep = DampedNewton::new().solve(&mut model, &SolveOptions::default());
        assert!(rep.status.is_optimal());
        assert_relative_eq!(model.var(x, 0, 0), 2.0, epsilon = 1e-8);
        assert_eq!(model.var(z, 0, 0), 7.0);
    }

    #[test]
    fn test_keeps_unknowns_with_locally_flat_columns() {
        // y only appears through x*y, so its derivative vanishes at x == 0.
        // It is still read by an active equation and must stay governed;
        // pruning it would misreport this already-converged system as
        // non-square.
        let mut model = Model::new("m", 1, 0.0, 1.0);
        let x = model.add_variable("x", VarRole::Algebraic, IndexSet::Scalar, 0.0).unwrap();
        let y = model.add_variable("y", VarRole::Algebraic, IndexSet::Scalar, 3.0).unwrap();
        model.add_equation("prod", IndexSet::Scalar, SkipPolicy::None, move |m, _, _| {
            m.var(x, 0, 0) * m.var(y, 0, 0)
        });
        model.add_equation("pin", IndexSet::Scalar, SkipPolicy::None, move |m, _, _| {
            m.var(x, 0, 0)
        });

        let rep = DampedNewton::new().solve(&mut model, &SolveOptions::default());
        assert!(rep.status.is_optimal(), "{}", rep.message);
        assert_eq!(model.var(y, 0, 0), 3.0);
    }

    #[test]
    fn test_fixed_variables_are_not_unknowns() {
        let mut model = Model::new("m", 1, 0.0, 1.0);
        let x = model.add_variable("x", VarRole::Algebraic, IndexSet::Scalar, 0.0).unwrap();
        let c = model.add_variable("c", VarRole::Algebraic, IndexSet::Scalar, 0.0).unwrap();
        model.fix_all(c, 3.0);
        model.add_equation("sum", IndexSet::Scalar, SkipPolicy::None, move |m, _, _| {
            m.var(x, 0, 0) + m.var(c, 0, 0) - 10.0
        });

        let rep = DampedNewton::new().solve(&mut model, &SolveOptions::default());
        assert!(rep.status.is_optimal());
        // Accuracy tracks the residual tolerance, not the FD step.
        assert_relative_eq!(model.var(x, 0, 0), 7.0, epsilon = 1e-6);
        assert_eq!(model.var(c, 0, 0), 3.0);
    }

    #[test]
    fn test_reports_infeasible_on_budget_exhaustion() {
        // x^2 + 1 = 0 has no real solution.
        let mut model = Model::new("m", 1, 0.0, 1.0);
        let x = model.add_variable("x", VarRole::Algebraic, IndexSet::Scalar, 1.0).unwrap();
        model.add_equation("none", IndexSet::Scalar, SkipPolicy::None, move |m, _, _| {
            m.var(x, 0, 0) * m.var(x, 0, 0) + 1.0
        });

        let opts = SolveOptions::new().with_max_iterations(15).with_damping(0.5);
        let rep = DampedNewton::new().solve(&mut model, &opts);
        assert!(!rep.status.is_optimal());
    }

    #[test]
    fn test_reports_error_on_nonsquare_system() {
        // Two equations over a single governed unknown cannot be solved.
        let mut model = Model::new("m", 1, 0.0, 1.0);
        let x = model.add_variable("x", VarRole::Algebraic, IndexSet::Scalar, 0.0).unwrap();
        model.add_equation("a", IndexSet::Scalar, SkipPolicy::None, move |m, _, _| {
            m.var(x, 0, 0) - 1.0
        });
        model.add_equation("b", IndexSet::Scalar, SkipPolicy::None, move |m, _, _| {
            m.var(x, 0, 0) - 2.0
        });

        let rep = DampedNewton::new().solve(&mut model, &SolveOptions::default());
        assert_eq!(rep.status, SolveStatus::Error);
        assert!(rep.message.contains("governed unknowns"));
    }

    #[test]
    fn test_bounds_project_newton_steps() {
        // 1/x - 0.5 = 0 from x = 4: the first unconstrained Newton step
        // lands on x = 0, where the residual blows up. The lower bound
        // clamps the step and the iteration recovers to the root at 2.
        let mut model = Model::new("m", 1, 0.0, 1.0);
        let x = model.add_variable("x", VarRole::Algebraic, IndexSet::Scalar, 4.0).unwrap();
        model.set_bounds(x, Some(0.1), None).unwrap();
        model.add_equation("inv", IndexSet::Scalar, SkipPolicy::None, move |m, _, _| {
            1.0 / m.var(x, 0, 0) - 0.5
        });

        // At the default tolerance a residual of 1e-6 still leaves x about
        // 4e-6 from the root, so tighten the solve to match the assertion.
        let opts = SolveOptions::new().with_max_iterations(100).with_tolerance(1e-9);
        let rep = DampedNewton::new().solve(&mut model, &opts);
        assert!(rep.status.is_optimal(), "{}", rep.message);
        assert_relative_eq!(model.var(x, 0, 0), 2.0, epsilon = 1e-6);
    }
}

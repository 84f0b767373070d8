//! Two-phase solve workflow: steady initialization, continuation, dynamic
//! solve, refinement re-solve.
//!
//! The driver orchestrates one deterministic pass over an owned, already
//! discretized model:
//!
//! 1. enter the steady phase and solve (a non-optimal status here is fatal,
//!    since the dynamic phase would start from garbage),
//! 2. carry the converged steady values into the initial-condition
//!    parameters and flatten the control trajectories,
//! 3. enter the dynamic phase and solve,
//! 4. re-solve unconditionally with the tightened tolerance; the refined
//!    report is the workflow's verdict on the dynamic phase.
//!
//! A [`ModelSnapshot`] of the component inventory is captured after each
//! phase, logged at debug level and carried on the [`WorkflowReport`].

use thiserror::Error;

use crate::continuation::{
    apply_initial_conditions, broadcast_controls, extract_state, ContinuationError, StateSnapshot,
};
use crate::model::Model;
use crate::phase::{PhaseController, PhaseError};
use crate::report::ModelSnapshot;
use crate::solvers::{NlpSolver, SolveOptions, SolveReport};

/// Fatal workflow outcomes.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The steady solve did not converge; no dynamic solve was attempted.
    #[error("steady solve failed ({:?}): {}", .report.status, .report.message)]
    SteadyNonOptimal {
        /// The failing solve report.
        report: SolveReport,
    },
    /// The refined dynamic solve did not converge.
    #[error("dynamic solve failed ({:?}): {}", .report.status, .report.message)]
    DynamicNonOptimal {
        /// The failing refined solve report.
        report: SolveReport,
    },
    /// Value carry-over between phases failed.
    #[error(transparent)]
    Continuation(#[from] ContinuationError),
    /// Phase reconfiguration failed.
    #[error(transparent)]
    Phase(#[from] PhaseError),
}

/// Reports from each solve of a completed workflow.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct WorkflowReport {
    /// The steady-phase solve.
    pub steady: SolveReport,
    /// The values carried from the steady solution into the dynamic phase.
    pub snapshot: StateSnapshot,
    /// The first dynamic solve, at the working tolerance.
    pub dynamic: SolveReport,
    /// The unconditional re-solve at the tightened tolerance.
    pub refined: SolveReport,
    /// Component inventory captured after the steady solve.
    pub steady_model: ModelSnapshot,
    /// Component inventory captured after the refined dynamic solve.
    pub dynamic_model: ModelSnapshot,
}

/// Drives the steady/dynamic workflow over a generic solver backend.
pub struct TwoPhaseDriver<S> {
    solver: S,
    options: SolveOptions,
    source_index: usize,
}

impl<S: NlpSolver> TwoPhaseDriver<S> {
    /// Creates a driver around a solver backend with default options and
    /// continuation source at the first collocation point.
    pub fn new(solver: S) -> Self {
        TwoPhaseDriver { solver, options: SolveOptions::default(), source_index: 1 }
    }

    /// Replaces the solve options.
    pub fn with_options(mut self, options: SolveOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the time index the steady values are extracted at.
    pub fn with_source_index(mut self, source_index: usize) -> Self {
        self.source_index = source_index;
        self
    }

    /// Runs the full workflow on `model`, leaving the refined dynamic
    /// solution in the model's variable values.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::SteadyNonOptimal`] aborts before any continuation;
    /// [`WorkflowError::DynamicNonOptimal`] reports the refined solve's
    /// failure after both dynamic attempts.
    pub fn run(&mut self, model: &mut Model) -> Result<WorkflowReport, WorkflowError> {
        let mut controller = PhaseController::new();

        controller.enter_steady(model);
        let steady = self.solver.solve(model, &self.options);
        log::info!(
            "steady solve of '{}': {:?} in {} iterations",
            model.name(),
            steady.status,
            steady.iterations
        );
        if !steady.status.is_optimal() {
            return Err(WorkflowError::SteadyNonOptimal { report: steady });
        }
        let steady_model = ModelSnapshot::capture(model);
        log::debug!("steady inventory:\n{steady_model}");

        let snapshot = extract_state(model, self.source_index)?;
        apply_initial_conditions(model, &snapshot)?;
        broadcast_controls(model, &snapshot);

        controller.enter_dynamic(model);
        let dynamic = self.solver.solve(model, &self.options);
        log::info!(
            "dynamic solve of '{}': {:?} in {} iterations",
            model.name(),
            dynamic.status,
            dynamic.iterations
        );

        // Unconditional refinement; its status is the one that counts.
        let tightened =
            self.options.clone().with_tolerance(self.options.tightened_tolerance);
        let refined = self.solver.solve(model, &tightened);
        if !refined.status.is_optimal() {
            return Err(WorkflowError::DynamicNonOptimal { report: refined });
        }
        let dynamic_model = ModelSnapshot::capture(model);
        log::debug!("dynamic inventory:\n{dynamic_model}");

        Ok(WorkflowReport { steady, snapshot, dynamic, refined, steady_model, dynamic_model })
    }
}

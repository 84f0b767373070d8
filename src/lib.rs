//! # Daecol: Two-Phase Collocation Solves for DAE Process Models
//!
//! Daecol turns a continuous differential-algebraic process model into an
//! algebraic system by simultaneous orthogonal collocation on finite
//! elements, then drives it through a two-phase workflow: a steady solve
//! that finds the plant's resting point, continuation that carries the
//! converged values into the initial conditions and control trajectories,
//! and a dynamic solve with an unconditional tightened re-solve.
//!
//! ## Example
//!
//! ```
//! use daecol::collocation::discretize;
//! use daecol::driver::TwoPhaseDriver;
//! use daecol::models::CstrBuilder;
//! use daecol::solvers::DampedNewton;
//!
//! let mut cstr = CstrBuilder::new().build().unwrap();
//! discretize(&mut cstr.model, 10, 3).unwrap();
//!
//! let mut driver = TwoPhaseDriver::new(DampedNewton::new());
//! let report = driver.run(&mut cstr.model).unwrap();
//! assert!(report.steady.status.is_optimal());
//! assert!(report.refined.status.is_optimal());
//! ```
//!
//! ## Modules
//!
//! - [`model`]: the model graph of variable, parameter, and equation
//!   families over a time x unit index space.
//! - [`collocation`]: the Radau discretizer that freezes the time domain
//!   and registers collocation equations.
//! - [`phase`]: the steady/dynamic phase controller and its activation
//!   invariant.
//! - [`continuation`]: value carry-over from a solved steady phase into
//!   the dynamic phase.
//! - [`solvers`]: the opaque solve boundary and the built-in damped Newton
//!   backend.
//! - [`driver`]: the end-to-end two-phase workflow.
//! - [`report`]: structured inspection of a model's components and
//!   activation state.
//! - [`models`]: ready-made CSTR and distillation models.
//!
//! ## Optional Features
//!
//! - **`serde`**: `Serialize` on reports and snapshots for archiving solve
//!   outcomes.

pub mod collocation;
pub mod continuation;
pub mod driver;
pub mod model;
pub mod models;
pub mod phase;
pub mod report;
pub mod solvers;

pub use collocation::{discretize, CollocationError};
pub use continuation::{ContinuationError, StateSnapshot};
pub use driver::{TwoPhaseDriver, WorkflowError, WorkflowReport};
pub use model::{
    EqId, IndexSet, Model, ModelError, ParamId, SkipPolicy, State, VarId, VarRole,
};
pub use phase::{verify_activation, Phase, PhaseController, PhaseError};
pub use report::ModelSnapshot;
pub use solvers::{DampedNewton, NlpSolver, SolveOptions, SolveReport, SolveStatus};

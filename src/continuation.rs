//! Continuation between phases: carries a converged steady solution into
//! the initial conditions and control trajectories of the dynamic solve.
//!
//! Everything here mutates values only. Activation flags, fixed flags, and
//! bounds belong to the phase controller; the two concerns never mix.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::model::{Model, ModelError, VarId};

/// Errors raised while moving values between phases.
#[derive(Debug, Error)]
pub enum ContinuationError {
    /// The requested source time index is outside the discretized grid.
    #[error("source time index {index} out of range ({len} time points)")]
    SourceIndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of discrete time points.
        len: usize,
    },
    /// Underlying model-graph error.
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Converged values captured at one time index of a solved model: per-unit
/// values of every differential state and every control variable.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StateSnapshot {
    /// Time index the values were read from.
    pub source_index: usize,
    /// Differential state values, keyed by state variable, one per unit.
    pub states: BTreeMap<VarId, Vec<f64>>,
    /// Control values, keyed by control variable, one per unit.
    pub controls: BTreeMap<VarId, Vec<f64>>,
}

/// Reads the differential states and controls of `model` at time index
/// `source_index`.
///
/// After a steady solve the trajectory is constant over the governed
/// indices, so any index past the ungoverned initial one yields the same
/// values; the first collocation point (index 1) is the conventional choice.
pub fn extract_state(model: &Model, source_index: usize) -> Result<StateSnapshot, ContinuationError> {
    if source_index >= model.n_time() {
        return Err(ContinuationError::SourceIndexOutOfRange {
            index: source_index,
            len: model.n_time(),
        });
    }
    let mut states = BTreeMap::new();
    for state in model.states() {
        states.insert(state.var, model.values_at(state.var, source_index));
    }
    let mut controls = BTreeMap::new();
    for id in model.control_ids() {
        controls.insert(id, model.values_at(id, source_index));
    }
    Ok(StateSnapshot { source_index, states, controls })
}

/// Writes the snapshot's state values into the corresponding
/// initial-condition parameters, bit for bit.
pub fn apply_initial_conditions(
    model: &mut Model,
    snapshot: &StateSnapshot,
) -> Result<(), ContinuationError> {
    for state in model.states().to_vec() {
        if let Some(values) = snapshot.states.get(&state.var) {
            for (n, &v) in values.iter().enumerate() {
                model.set_param(state.ic_param, 0, n, v)?;
            }
            log::debug!(
                "initial condition '{}' <- {:?}",
                model.param_name(state.ic_param),
                values
            );
        }
    }
    Ok(())
}

/// Overwrites every control variable's full trajectory with the snapshot's
/// value, producing a flat control profile for the dynamic solve.
pub fn broadcast_controls(model: &mut Model, snapshot: &StateSnapshot) {
    for (&id, values) in &snapshot.controls {
        for t in 0..model.n_time() {
            for (n, &v) in values.iter().enumerate() {
                model.set_var(id, t, n, v);
            }
        }
        log::debug!("control '{}' broadcast to {:?}", model.var_name(id), values);
    }
}

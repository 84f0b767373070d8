//! Phase controller: switches a discretized model between its steady and
//! dynamic configurations.
//!
//! Both transitions assign absolute activation state rather than toggling,
//! so entering a phase twice leaves the model exactly as a single entry
//! would. The dynamic transition is the exact structural inverse of the
//! steady transition.
//!
//! Per differential state and time index, exactly one of three constraints
//! may govern: the collocation equation, the initial-condition equation, or
//! a fixed derivative. [`verify_activation`] checks this invariant; the
//! transitions run it in debug builds and panic on violation, since a
//! violation is a programming error in the controller itself.

use thiserror::Error;

use crate::model::{ActiveObjective, EqKind, Model, ModelError, VarId};

/// Solve phase of the two-phase workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Steady state: derivatives fixed to zero, dynamics deactivated.
    Steady,
    /// Full transient collocation system.
    Dynamic,
}

/// Errors raised by phase transitions and invariant checks.
#[derive(Debug, Error)]
pub enum PhaseError {
    /// The per-state governing-constraint invariant does not hold.
    #[error(
        "state '{state}' at (t={t}, n={n}) has {count} governing constraints, expected exactly 1"
    )]
    InconsistentActivationState {
        /// Differential state name.
        state: String,
        /// Time index.
        t: usize,
        /// Unit index.
        n: usize,
        /// Number of simultaneously governing constraints found.
        count: usize,
    },
    /// Underlying model-graph error.
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Switches a model between phases by absolute state assignment.
#[derive(Debug, Default)]
pub struct PhaseController {
    phase: Option<Phase>,
}

impl PhaseController {
    /// Creates a controller with no phase entered yet.
    pub fn new() -> Self {
        PhaseController { phase: None }
    }

    /// The phase most recently entered, if any.
    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    /// Configures `model` for the steady phase:
    ///
    /// * every collocation equation instance deactivated,
    /// * every derivative variable fixed to exactly zero,
    /// * every initial-condition equation deactivated,
    /// * every time-indexed equation deactivated at the initial index and
    ///   activated elsewhere,
    /// * the feasibility objective made active.
    pub fn enter_steady(&mut self, model: &mut Model) {
        self.assign(model, Phase::Steady);
    }

    /// Configures `model` for the dynamic phase, the exact inverse of
    /// [`PhaseController::enter_steady`]:
    ///
    /// * every collocation equation instance activated,
    /// * every derivative variable unfixed (values left in place),
    /// * every initial-condition equation activated,
    /// * every time-indexed equation activated at all existing instances,
    /// * the dynamic objective made active where one is configured.
    pub fn enter_dynamic(&mut self, model: &mut Model) {
        self.assign(model, Phase::Dynamic);
    }

    fn assign(&mut self, model: &mut Model, phase: Phase) {
        let steady = phase == Phase::Steady;
        for eq in model.eq_ids().collect::<Vec<_>>() {
            match model.eq_kind(eq) {
                EqKind::Collocation { .. } | EqKind::InitialCondition { .. } => {
                    model.set_family_active(eq, !steady);
                }
                EqKind::Physical => {
                    model.set_family_active(eq, true);
                    if steady && model.eq_index(eq).has_time() {
                        model.set_active_at_time(eq, 0, false);
                    }
                }
            }
        }
        for state in model.states().to_vec() {
            if steady {
                model.fix_all(state.dot, 0.0);
            } else {
                model.unfix_all(state.dot);
            }
        }
        model.set_active_objective(if steady {
            ActiveObjective::Feasibility
        } else if model.has_dynamic_objective() {
            ActiveObjective::Dynamic
        } else {
            ActiveObjective::None
        });
        self.phase = Some(phase);
        log::info!("model '{}' entered {:?} phase", model.name(), phase);

        #[cfg(debug_assertions)]
        if let Err(e) = verify_activation(model) {
            panic!("phase transition left an inconsistent model: {e}");
        }
    }

    /// Sets family-wide bounds on a variable, validated and idempotent.
    ///
    /// # Errors
    ///
    /// [`ModelError::InvalidBounds`] when `lower > upper`; the previous
    /// bounds are left untouched.
    pub fn set_bounds(
        &self,
        model: &mut Model,
        var: VarId,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> Result<(), PhaseError> {
        model.set_bounds(var, lower, upper)?;
        Ok(())
    }
}

/// Checks that every (state, time index, unit) triple is governed by exactly
/// one of: an active collocation instance, an active initial-condition
/// instance, or a fixed derivative.
pub fn verify_activation(model: &Model) -> Result<(), PhaseError> {
    for state in model.states() {
        let colloc = model.collocation_eq_for(state.dot);
        for t in 0..model.n_time() {
            for n in 0..model.n_units() {
                let mut count = 0;
                if colloc.map_or(false, |eq| model.is_active(eq, t, n)) {
                    count += 1;
                }
                if t == 0 && model.is_active(state.ic_eq, 0, n) {
                    count += 1;
                }
                if model.is_fixed(state.dot, t, n) {
                    count += 1;
                }
                if count != 1 {
                    return Err(PhaseError::InconsistentActivationState {
                        state: model.var_name(state.var).to_string(),
                        t,
                        n,
                        count,
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collocation::discretize;
    use crate::model::{IndexSet, SkipPolicy, VarRole};

    fn small_model() -> (Model, crate::model::State, crate::model::EqId) {
        let mut model = Model::new("m", 1, 0.0, 1.0);
        let s = model.add_state("x", 1.0, 0.0, 1.0).unwrap();
        let de = model.add_equation("de_x", IndexSet::TimeUnit, SkipPolicy::InitialIndex, {
            let (var, dot) = (s.var, s.dot);
            move |m: &Model, t: usize, n: usize| m.var(dot, t, n) + m.var(var, t, n)
        });
        discretize(&mut model, 2, 2).unwrap();
        (model, s, de)
    }

    #[test]
    fn test_enter_steady_configuration() {
        let (mut model, s, de) = small_model();
        let mut ctl = PhaseController::new();
        ctl.enter_steady(&mut model);

        let colloc = model.collocation_eq_for(s.dot).unwrap();
        for t in 0..model.n_time() {
            assert!(!model.is_active(colloc, t, 0));
            assert!(model.is_fixed(s.dot, t, 0));
            assert_eq!(model.var(s.dot, t, 0), 0.0);
        }
        assert!(!model.is_active(s.ic_eq, 0, 0));
        assert!(!model.is_active(de, 0, 0));
        assert!(model.is_active(de, 1, 0));
        assert_eq!(model.active_objective(), ActiveObjective::Feasibility);
        assert_eq!(ctl.phase(), Some(Phase::Steady));
        assert!(verify_activation(&model).is_ok());
    }

    #[test]
    fn test_enter_dynamic_inverts_steady() {
        let (mut model, s, de) = small_model();
        let mut ctl = PhaseController::new();
        ctl.enter_steady(&mut model);
        ctl.enter_dynamic(&mut model);

        let colloc = model.collocation_eq_for(s.dot).unwrap();
        for t in 1..model.n_time() {
            assert!(model.is_active(colloc, t, 0));
            assert!(!model.is_fixed(s.dot, t, 0));
        }
        assert!(model.is_active(s.ic_eq, 0, 0));
        assert!(model.is_active(de, 1, 0));
        assert!(!model.is_active(de, 0, 0), "skipped instances never activate");
        assert_eq!(model.active_objective(), ActiveObjective::None);
        assert!(verify_activation(&model).is_ok());
    }

    #[test]
    fn test_reentering_steady_is_idempotent() {
        let (mut model, s, _) = small_model();
        let mut ctl = PhaseController::new();
        ctl.enter_steady(&mut model);

        // Perturb a derivative value, then re-enter: absolute assignment
        // restores the full steady configuration.
        model.unfix_all(s.dot);
        model.set_var(s.dot, 2, 0, 3.5);
        ctl.enter_steady(&mut model);

        assert!(model.is_fixed(s.dot, 2, 0));
        assert_eq!(model.var(s.dot, 2, 0), 0.0);
        assert!(verify_activation(&model).is_ok());
    }

    #[test]
    fn test_set_bounds_validation() {
        let (mut model, _, _) = small_model();
        let v = model.add_variable("L", VarRole::Algebraic, IndexSet::TimeUnit, 1.0).unwrap();
        let ctl = PhaseController::new();

        ctl.set_bounds(&mut model, v, Some(0.0), Some(100.0)).unwrap();
        ctl.set_bounds(&mut model, v, Some(0.0), Some(100.0)).unwrap();
        assert!(ctl.set_bounds(&mut model, v, Some(5.0), Some(1.0)).is_err());
        assert_eq!(model.bounds(v), (Some(0.0), Some(100.0)));
    }
}

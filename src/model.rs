//! Model graph: typed variable, parameter, and equation containers over a
//! time × unit index space.
//!
//! A [`Model`] owns every variable family, parameter family, and equation
//! family of one process model. It is built once, discretized once (see
//! [`crate::collocation`]), and then repeatedly reconfigured in place by the
//! phase controller: reconfiguration only mutates activation flags, fixed
//! flags, bounds, and values — never the set of components.
//!
//! Equations are registered declaratively: a residual closure
//! `fn(&Model, t, n) -> f64`, an explicit [`SkipPolicy`] for boundary
//! indices, and a declared [`IndexSet`] projection. The skip set and the
//! projection are data on the equation family, not branches inside the
//! residual, so the phase controller can reason about instances without
//! evaluating anything.
//!
//! # Examples
//!
//! ```
//! use daecol::model::{Model, IndexSet, SkipPolicy};
//!
//! let mut model = Model::new("tank", 1, 0.0, 1.0);
//! let level = model.add_state("h", 2.0, 0.0, 2.0).unwrap();
//! let outflow = model.add_parameter("q_out", IndexSet::Scalar, 1.5, false).unwrap();
//!
//! // dh/dt = 1.0 - q_out, vacuous at the initial index (the IC governs it).
//! model.add_equation("de_h", IndexSet::TimeUnit, SkipPolicy::InitialIndex, {
//!     let dot = level.dot;
//!     move |m, t, n| m.var(dot, t, n) - (1.0 - m.param(outflow, 0, 0))
//! });
//! ```

use std::rc::Rc;

use thiserror::Error;

/// Result type for model-graph operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Structural errors in the model graph.
///
/// These are programming errors: the propagation policy is to surface them
/// immediately with full context rather than to recover.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A differential state name was registered twice.
    #[error("component '{0}' is already declared")]
    DuplicateComponent(String),
    /// Lower bound exceeds upper bound.
    #[error("invalid bounds for '{name}': lower {lower} > upper {upper}")]
    InvalidBounds {
        /// Variable family name.
        name: String,
        /// Offending lower bound.
        lower: f64,
        /// Offending upper bound.
        upper: f64,
    },
    /// Attempted to overwrite an immutable parameter.
    #[error("parameter '{0}' is immutable")]
    ImmutableParameter(String),
    /// Differential and derivative variables may only be created through
    /// [`Model::add_state`], which enforces their pairing invariant.
    #[error("role {0:?} requires Model::add_state")]
    StateRoleOutsideAddState(VarRole),
}

/// Role of a variable family in the DAE system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarRole {
    /// State with an accumulation term; always paired with a derivative
    /// variable and an initial-condition equation.
    Differential,
    /// Time derivative of a differential state.
    Derivative,
    /// Computed variable without a time derivative.
    Algebraic,
    /// Manipulated input; its trajectory is overwritten by continuation.
    Control,
    /// Product/boundary stream variable.
    Boundary,
}

/// Declared index projection of a variable, parameter, or equation family.
///
/// Registration declares the projection explicitly so that activation logic
/// never has to introspect index arity at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSet {
    /// One instance per (time, unit) pair.
    TimeUnit,
    /// One instance per time point.
    Time,
    /// One instance per unit (tray, vessel).
    Unit,
    /// A single instance.
    Scalar,
}

impl IndexSet {
    /// Whether the time index participates in this projection.
    pub fn has_time(&self) -> bool {
        matches!(self, IndexSet::TimeUnit | IndexSet::Time)
    }

    /// Whether the unit index participates in this projection.
    pub fn has_unit(&self) -> bool {
        matches!(self, IndexSet::TimeUnit | IndexSet::Unit)
    }
}

/// Explicit boundary-skip set for an equation family.
///
/// Rate and balance equations are vacuous at the initial time index because
/// the initial-condition equation governs that index; omitting the skip
/// over-determines the system at the first time point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipPolicy {
    /// The equation exists at every index of its projection.
    None,
    /// No instance at the initial time index.
    InitialIndex,
}

/// Structural kind of an equation family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqKind {
    /// Physics: rate laws, balances, correlations, control ports.
    Physical,
    /// Collocation equation defining a derivative variable.
    Collocation {
        /// The derivative family this equation defines.
        dot: VarId,
    },
    /// Initial-condition equation binding a state at the first time index.
    InitialCondition {
        /// The differential family this equation binds.
        state: VarId,
    },
}

/// Handle to a variable family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct VarId(pub(crate) usize);

/// Handle to a parameter family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ParamId(pub(crate) usize);

/// Handle to an equation family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EqId(pub(crate) usize);

/// Handles produced by [`Model::add_state`]: the differential variable, its
/// derivative, the mutable initial-condition parameter, and the
/// initial-condition equation. One of each, by construction.
#[derive(Debug, Clone, Copy)]
pub struct State {
    /// The differential variable family.
    pub var: VarId,
    /// Its derivative family.
    pub dot: VarId,
    /// The initial-condition parameter (one value per unit, mutable).
    pub ic_param: ParamId,
    /// The initial-condition equation (indexed over units).
    pub ic_eq: EqId,
}

/// Residual rule evaluated per instance: `f(model, t, n) -> residual`.
pub type Residual = Rc<dyn Fn(&Model, usize, usize) -> f64>;

/// The time horizon: continuous until discretization freezes it.
#[derive(Debug, Clone)]
pub enum TimeDomain {
    /// Continuous interval; only the distinguished initial instant exists as
    /// a discrete index.
    Continuous {
        /// Horizon start.
        start: f64,
        /// Horizon end.
        end: f64,
    },
    /// Frozen into `nfe * ncp + 1` ordered instants.
    Discretized {
        /// Ordered time values, starting at the initial instant.
        points: Vec<f64>,
        /// Number of finite elements.
        nfe: usize,
        /// Collocation points per element.
        ncp: usize,
    },
}

impl TimeDomain {
    /// Number of discrete time indices currently addressable.
    pub fn len(&self) -> usize {
        match self {
            TimeDomain::Continuous { .. } => 1,
            TimeDomain::Discretized { points, .. } => points.len(),
        }
    }

    /// Always false: the initial instant is always addressable.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether the domain has been frozen.
    pub fn is_discretized(&self) -> bool {
        matches!(self, TimeDomain::Discretized { .. })
    }
}

pub(crate) struct VarFamily {
    pub(crate) name: String,
    pub(crate) role: VarRole,
    pub(crate) index: IndexSet,
    pub(crate) values: Vec<f64>,
    pub(crate) fixed: Vec<bool>,
    pub(crate) lower: Option<f64>,
    pub(crate) upper: Option<f64>,
}

pub(crate) struct ParamFamily {
    pub(crate) name: String,
    pub(crate) index: IndexSet,
    pub(crate) values: Vec<f64>,
    pub(crate) mutable: bool,
}

pub(crate) struct EqFamily {
    pub(crate) name: String,
    pub(crate) index: IndexSet,
    pub(crate) skip: SkipPolicy,
    pub(crate) kind: EqKind,
    pub(crate) residual: Residual,
    pub(crate) active: Vec<bool>,
}

/// Objective configuration of the model.
///
/// The steady phase installs a trivial feasibility objective; the dynamic
/// phase optionally activates a problem-specific expression. The solve
/// boundary treats the objective as opaque bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveObjective {
    /// No objective active.
    None,
    /// Constant feasibility objective (steady phase).
    Feasibility,
    /// The configured dynamic objective.
    Dynamic,
}

/// A dynamic process model as an owned graph of components.
///
/// Exactly one logical owner holds write access at a time; independent
/// scenarios must construct independent `Model`s.
pub struct Model {
    name: String,
    time: TimeDomain,
    n_units: usize,
    vars: Vec<VarFamily>,
    params: Vec<ParamFamily>,
    eqs: Vec<EqFamily>,
    states: Vec<State>,
    dynamic_objective: Option<(String, Rc<dyn Fn(&Model) -> f64>)>,
    active_objective: ActiveObjective,
}

impl Model {
    /// Creates an empty model over `n_units` discrete units and a continuous
    /// time horizon `[start, end]`.
    pub fn new(name: &str, n_units: usize, start: f64, end: f64) -> Self {
        Model {
            name: name.to_string(),
            time: TimeDomain::Continuous { start, end },
            n_units,
            vars: Vec::new(),
            params: Vec::new(),
            eqs: Vec::new(),
            states: Vec::new(),
            dynamic_objective: None,
            active_objective: ActiveObjective::None,
        }
    }

    /// Model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of discrete units (trays, vessels).
    pub fn n_units(&self) -> usize {
        self.n_units
    }

    /// Number of discrete time indices (1 until discretization).
    pub fn n_time(&self) -> usize {
        self.time.len()
    }

    /// The time domain.
    pub fn time_domain(&self) -> &TimeDomain {
        &self.time
    }

    /// Ordered time values after discretization.
    pub fn time_points(&self) -> Option<&[f64]> {
        match &self.time {
            TimeDomain::Continuous { .. } => None,
            TimeDomain::Discretized { points, .. } => Some(points),
        }
    }

    /// All differential states declared so far, in declaration order.
    pub fn states(&self) -> &[State] {
        &self.states
    }

    fn grid_len(&self, index: IndexSet) -> usize {
        let nt = if index.has_time() { self.n_time() } else { 1 };
        let nu = if index.has_unit() { self.n_units } else { 1 };
        nt * nu
    }

    /// Flat storage offset of instance `(t, n)` under `index`. Indices along
    /// absent dimensions are ignored.
    pub(crate) fn flat(&self, index: IndexSet, t: usize, n: usize) -> usize {
        let nu = if index.has_unit() { self.n_units } else { 1 };
        let t = if index.has_time() { t } else { 0 };
        let n = if index.has_unit() { n } else { 0 };
        t * nu + n
    }

    // ---- variables ----------------------------------------------------

    /// Declares an algebraic, control, or boundary variable family.
    ///
    /// Differential and derivative families must go through
    /// [`Model::add_state`] so that the pairing invariant (one derivative,
    /// one IC equation per state) cannot be broken.
    pub fn add_variable(
        &mut self,
        name: &str,
        role: VarRole,
        index: IndexSet,
        init: f64,
    ) -> ModelResult<VarId> {
        if matches!(role, VarRole::Differential | VarRole::Derivative) {
            return Err(ModelError::StateRoleOutsideAddState(role));
        }
        Ok(self.push_var(name, role, index, init))
    }

    fn push_var(&mut self, name: &str, role: VarRole, index: IndexSet, init: f64) -> VarId {
        let len = self.grid_len(index);
        let id = VarId(self.vars.len());
        self.vars.push(VarFamily {
            name: name.to_string(),
            role,
            index,
            values: vec![init; len],
            fixed: vec![false; len],
            lower: None,
            upper: None,
        });
        id
    }

    /// Declares a differential state: the state variable, its derivative,
    /// a mutable initial-condition parameter (default `ic_default` per unit),
    /// and the initial-condition equation `x[0, n] - x_ic[n] = 0`.
    pub fn add_state(
        &mut self,
        name: &str,
        init: f64,
        dot_init: f64,
        ic_default: f64,
    ) -> ModelResult<State> {
        let dot_name = format!("{name}dot");
        if self.vars.iter().any(|v| v.name == name || v.name == dot_name) {
            return Err(ModelError::DuplicateComponent(name.to_string()));
        }
        let var = self.push_var(name, VarRole::Differential, IndexSet::TimeUnit, init);
        let dot = self.push_var(&dot_name, VarRole::Derivative, IndexSet::TimeUnit, dot_init);
        let ic_param =
            self.add_parameter(&format!("{name}_ic"), IndexSet::Unit, ic_default, true)?;
        let ic_eq = self.push_eq(
            &format!("{name}_icc"),
            IndexSet::Unit,
            SkipPolicy::None,
            EqKind::InitialCondition { state: var },
            Rc::new(move |m: &Model, _t: usize, n: usize| {
                m.var(var, 0, n) - m.param(ic_param, 0, n)
            }),
        );
        let state = State { var, dot, ic_param, ic_eq };
        self.states.push(state);
        Ok(state)
    }

    /// Name of a variable family.
    pub fn var_name(&self, id: VarId) -> &str {
        &self.vars[id.0].name
    }

    /// Role of a variable family.
    pub fn var_role(&self, id: VarId) -> VarRole {
        self.vars[id.0].role
    }

    /// Declared index projection of a variable family.
    pub fn var_index(&self, id: VarId) -> IndexSet {
        self.vars[id.0].index
    }

    /// All variable family handles, in declaration order.
    pub fn var_ids(&self) -> impl Iterator<Item = VarId> {
        (0..self.vars.len()).map(VarId)
    }

    /// Current value of variable instance `(t, n)`.
    pub fn var(&self, id: VarId, t: usize, n: usize) -> f64 {
        let fam = &self.vars[id.0];
        fam.values[self.flat(fam.index, t, n)]
    }

    /// Sets the value of variable instance `(t, n)`.
    pub fn set_var(&mut self, id: VarId, t: usize, n: usize, value: f64) {
        let idx = self.flat(self.vars[id.0].index, t, n);
        self.vars[id.0].values[idx] = value;
    }

    /// Whether variable instance `(t, n)` is fixed.
    pub fn is_fixed(&self, id: VarId, t: usize, n: usize) -> bool {
        let fam = &self.vars[id.0];
        fam.fixed[self.flat(fam.index, t, n)]
    }

    /// Fixes every instance of a family to `value`.
    pub fn fix_all(&mut self, id: VarId, value: f64) {
        let fam = &mut self.vars[id.0];
        fam.values.fill(value);
        fam.fixed.fill(true);
    }

    /// Unfixes every instance of a family. Values are left in place.
    pub fn unfix_all(&mut self, id: VarId) {
        self.vars[id.0].fixed.fill(false);
    }

    /// Family-wide bounds, validated: `lower > upper` is rejected. Calling
    /// twice with the same arguments is a no-op the second time.
    pub fn set_bounds(
        &mut self,
        id: VarId,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> ModelResult<()> {
        if let (Some(lo), Some(hi)) = (lower, upper) {
            if lo > hi {
                return Err(ModelError::InvalidBounds {
                    name: self.vars[id.0].name.clone(),
                    lower: lo,
                    upper: hi,
                });
            }
        }
        let fam = &mut self.vars[id.0];
        fam.lower = lower;
        fam.upper = upper;
        Ok(())
    }

    /// Family-wide bounds `(lower, upper)`.
    pub fn bounds(&self, id: VarId) -> (Option<f64>, Option<f64>) {
        let fam = &self.vars[id.0];
        (fam.lower, fam.upper)
    }

    /// Control variable families, in declaration order.
    pub fn control_ids(&self) -> Vec<VarId> {
        self.var_ids().filter(|&id| self.var_role(id) == VarRole::Control).collect()
    }

    // ---- parameters ---------------------------------------------------

    /// Declares a parameter family; `mutable` parameters may be overwritten
    /// between phases, immutable ones are fixed constants.
    pub fn add_parameter(
        &mut self,
        name: &str,
        index: IndexSet,
        value: f64,
        mutable: bool,
    ) -> ModelResult<ParamId> {
        if self.params.iter().any(|p| p.name == name) {
            return Err(ModelError::DuplicateComponent(name.to_string()));
        }
        let len = self.grid_len(index);
        let id = ParamId(self.params.len());
        self.params.push(ParamFamily {
            name: name.to_string(),
            index,
            values: vec![value; len],
            mutable,
        });
        Ok(id)
    }

    /// Name of a parameter family.
    pub fn param_name(&self, id: ParamId) -> &str {
        &self.params[id.0].name
    }

    /// Declared index projection of a parameter family.
    pub fn param_index(&self, id: ParamId) -> IndexSet {
        self.params[id.0].index
    }

    /// Whether a parameter family accepts writes.
    pub fn param_is_mutable(&self, id: ParamId) -> bool {
        self.params[id.0].mutable
    }

    /// All parameter family handles, in declaration order.
    pub fn param_ids(&self) -> impl Iterator<Item = ParamId> {
        (0..self.params.len()).map(ParamId)
    }

    /// Current value of parameter instance `(t, n)`.
    pub fn param(&self, id: ParamId, t: usize, n: usize) -> f64 {
        let fam = &self.params[id.0];
        fam.values[self.flat(fam.index, t, n)]
    }

    /// Overwrites a mutable parameter instance.
    pub fn set_param(&mut self, id: ParamId, t: usize, n: usize, value: f64) -> ModelResult<()> {
        if !self.params[id.0].mutable {
            return Err(ModelError::ImmutableParameter(self.params[id.0].name.clone()));
        }
        let idx = self.flat(self.params[id.0].index, t, n);
        self.params[id.0].values[idx] = value;
        Ok(())
    }

    // ---- equations ----------------------------------------------------

    /// Registers a physical equation family with an explicit residual rule
    /// and boundary-skip policy. Instances start active.
    pub fn add_equation<F>(
        &mut self,
        name: &str,
        index: IndexSet,
        skip: SkipPolicy,
        residual: F,
    ) -> EqId
    where
        F: Fn(&Model, usize, usize) -> f64 + 'static,
    {
        self.push_eq(name, index, skip, EqKind::Physical, Rc::new(residual))
    }

    pub(crate) fn push_eq(
        &mut self,
        name: &str,
        index: IndexSet,
        skip: SkipPolicy,
        kind: EqKind,
        residual: Residual,
    ) -> EqId {
        let len = self.grid_len(index);
        let id = EqId(self.eqs.len());
        self.eqs.push(EqFamily {
            name: name.to_string(),
            index,
            skip,
            kind,
            residual,
            active: vec![true; len],
        });
        id
    }

    /// Name of an equation family.
    pub fn eq_name(&self, id: EqId) -> &str {
        &self.eqs[id.0].name
    }

    /// Structural kind of an equation family.
    pub fn eq_kind(&self, id: EqId) -> EqKind {
        self.eqs[id.0].kind
    }

    /// Declared index projection of an equation family.
    pub fn eq_index(&self, id: EqId) -> IndexSet {
        self.eqs[id.0].index
    }

    /// All equation family handles, in declaration order.
    pub fn eq_ids(&self) -> impl Iterator<Item = EqId> {
        (0..self.eqs.len()).map(EqId)
    }

    /// Explicit existence query: whether equation `id` has an instance at
    /// `(t, n)` under its declared projection and skip policy.
    pub fn instance_exists(&self, id: EqId, t: usize, n: usize) -> bool {
        let fam = &self.eqs[id.0];
        let nt = if fam.index.has_time() { self.n_time() } else { 1 };
        let nu = if fam.index.has_unit() { self.n_units } else { 1 };
        let t_in = !fam.index.has_time() || t < nt;
        let n_in = !fam.index.has_unit() || n < nu;
        let skipped = fam.skip == SkipPolicy::InitialIndex && fam.index.has_time() && t == 0;
        t_in && n_in && !skipped
    }

    /// Whether equation instance `(t, n)` exists and is active.
    pub fn is_active(&self, id: EqId, t: usize, n: usize) -> bool {
        if !self.instance_exists(id, t, n) {
            return false;
        }
        let fam = &self.eqs[id.0];
        fam.active[self.flat(fam.index, t, n)]
    }

    /// Activates or deactivates one equation instance. No-op where no
    /// instance exists.
    pub fn set_active(&mut self, id: EqId, t: usize, n: usize, active: bool) {
        if !self.instance_exists(id, t, n) {
            return;
        }
        let idx = self.flat(self.eqs[id.0].index, t, n);
        self.eqs[id.0].active[idx] = active;
    }

    /// Activates or deactivates every instance of a family.
    pub fn set_family_active(&mut self, id: EqId, active: bool) {
        self.eqs[id.0].active.fill(active);
    }

    /// Activates or deactivates all instances at one time index
    /// (every unit). No-op for families without a time projection.
    pub fn set_active_at_time(&mut self, id: EqId, t: usize, active: bool) {
        if !self.eqs[id.0].index.has_time() {
            return;
        }
        for n in 0..self.n_units {
            self.set_active(id, t, n, active);
        }
    }

    /// Evaluates the residual of equation instance `(t, n)`.
    pub fn residual(&self, id: EqId, t: usize, n: usize) -> f64 {
        (self.eqs[id.0].residual)(self, t, n)
    }

    /// Every active equation instance as `(id, t, n)`, in declaration order.
    pub fn active_instances(&self) -> Vec<(EqId, usize, usize)> {
        let mut out = Vec::new();
        for id in self.eq_ids() {
            let fam = &self.eqs[id.0];
            let nt = if fam.index.has_time() { self.n_time() } else { 1 };
            let nu = if fam.index.has_unit() { self.n_units } else { 1 };
            for t in 0..nt {
                for n in 0..nu {
                    if self.is_active(id, t, n) {
                        out.push((id, t, n));
                    }
                }
            }
        }
        out
    }

    /// Collocation equation family defining `dot`, if the model has been
    /// discretized.
    pub fn collocation_eq_for(&self, dot: VarId) -> Option<EqId> {
        self.eq_ids().find(|&id| matches!(self.eq_kind(id), EqKind::Collocation { dot: d } if d == dot))
    }

    // ---- objective ----------------------------------------------------

    /// Configures the model's dynamic objective expression. The phase
    /// controller decides when it is active.
    pub fn set_dynamic_objective<F>(&mut self, name: &str, eval: F)
    where
        F: Fn(&Model) -> f64 + 'static,
    {
        self.dynamic_objective = Some((name.to_string(), Rc::new(eval)));
    }

    /// Whether a dynamic objective has been configured.
    pub fn has_dynamic_objective(&self) -> bool {
        self.dynamic_objective.is_some()
    }

    /// The currently active objective.
    pub fn active_objective(&self) -> ActiveObjective {
        self.active_objective
    }

    pub(crate) fn set_active_objective(&mut self, objective: ActiveObjective) {
        self.active_objective = objective;
    }

    /// Value of the active objective, if any. The feasibility objective is
    /// the constant `1.0`.
    pub fn objective_value(&self) -> Option<f64> {
        match self.active_objective {
            ActiveObjective::None => None,
            ActiveObjective::Feasibility => Some(1.0),
            ActiveObjective::Dynamic => {
                self.dynamic_objective.as_ref().map(|(_, eval)| eval(self))
            }
        }
    }

    // ---- discretization support ----------------------------------------

    /// Freezes the time domain and broadcasts every time-indexed storage
    /// from the single continuous placeholder index to the new grid.
    /// Called exactly once, by the collocation discretizer.
    pub(crate) fn freeze_time(&mut self, points: Vec<f64>, nfe: usize, ncp: usize) {
        let nt = points.len();
        self.time = TimeDomain::Discretized { points, nfe, ncp };
        let nu = self.n_units;
        for fam in &mut self.vars {
            if fam.index.has_time() {
                let width = if fam.index.has_unit() { nu } else { 1 };
                fam.values = broadcast(&fam.values, nt, width);
                fam.fixed = broadcast(&fam.fixed, nt, width);
            }
        }
        for fam in &mut self.params {
            if fam.index.has_time() {
                let width = if fam.index.has_unit() { nu } else { 1 };
                fam.values = broadcast(&fam.values, nt, width);
            }
        }
        for fam in &mut self.eqs {
            if fam.index.has_time() {
                let width = if fam.index.has_unit() { nu } else { 1 };
                fam.active = broadcast(&fam.active, nt, width);
            }
        }
    }

    /// Per-unit values of variable family `id` at time index `t`.
    pub fn values_at(&self, id: VarId, t: usize) -> Vec<f64> {
        let nu = if self.vars[id.0].index.has_unit() { self.n_units } else { 1 };
        (0..nu).map(|n| self.var(id, t, n)).collect()
    }
}

fn broadcast<T: Clone>(row: &[T], nt: usize, width: usize) -> Vec<T> {
    debug_assert_eq!(row.len(), width);
    let mut out = Vec::with_capacity(nt * width);
    for _ in 0..nt {
        out.extend_from_slice(&row[..width]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_state_creates_paired_components() {
        let mut model = Model::new("m", 2, 0.0, 1.0);
        let state = model.add_state("Ca", 1.0, 0.0, 0.5).unwrap();

        assert_eq!(model.var_name(state.var), "Ca");
        assert_eq!(model.var_name(state.dot), "Cadot");
        assert_eq!(model.var_role(state.dot), VarRole::Derivative);
        assert_eq!(model.param_name(state.ic_param), "Ca_ic");
        assert_eq!(model.eq_name(state.ic_eq), "Ca_icc");

        // IC residual binds x[0, n] to the IC parameter.
        assert_eq!(model.residual(state.ic_eq, 0, 0), 1.0 - 0.5);
        assert_eq!(model.residual(state.ic_eq, 0, 1), 0.5);
    }

    #[test]
    fn test_state_roles_require_add_state() {
        let mut model = Model::new("m", 1, 0.0, 1.0);
        let err = model.add_variable("x", VarRole::Differential, IndexSet::TimeUnit, 0.0);
        assert!(matches!(err, Err(ModelError::StateRoleOutsideAddState(_))));
    }

    #[test]
    fn test_skip_policy_excludes_initial_index() {
        let mut model = Model::new("m", 1, 0.0, 1.0);
        let eq = model.add_equation("de", IndexSet::TimeUnit, SkipPolicy::InitialIndex, |_, _, _| 0.0);
        model.freeze_time(vec![0.0, 0.5, 1.0], 1, 2);

        assert!(!model.instance_exists(eq, 0, 0));
        assert!(model.instance_exists(eq, 1, 0));
        assert!(!model.is_active(eq, 0, 0));
        assert!(model.is_active(eq, 2, 0));

        // Activation of a nonexistent instance is a no-op, not an error.
        model.set_active(eq, 0, 0, true);
        assert!(!model.is_active(eq, 0, 0));
    }

    #[test]
    fn test_immutable_parameter_rejects_writes() {
        let mut model = Model::new("m", 1, 0.0, 1.0);
        let v = model.add_parameter("V", IndexSet::Scalar, 100.0, false).unwrap();
        let f = model.add_parameter("F", IndexSet::Time, 120.0, true).unwrap();

        assert!(matches!(model.set_param(v, 0, 0, 99.0), Err(ModelError::ImmutableParameter(_))));
        model.set_param(f, 0, 0, 130.0).unwrap();
        assert_eq!(model.param(f, 0, 0), 130.0);
    }

    #[test]
    fn test_set_bounds_idempotent_and_validated() {
        let mut model = Model::new("m", 1, 0.0, 1.0);
        let x = model.add_variable("T", VarRole::Algebraic, IndexSet::TimeUnit, 300.0).unwrap();

        model.set_bounds(x, Some(100.0), Some(512.4)).unwrap();
        model.set_bounds(x, Some(100.0), Some(512.4)).unwrap();
        assert_eq!(model.bounds(x), (Some(100.0), Some(512.4)));

        let err = model.set_bounds(x, Some(600.0), Some(512.4));
        assert!(matches!(err, Err(ModelError::InvalidBounds { .. })));
        // Prior bounds survive the rejected call.
        assert_eq!(model.bounds(x), (Some(100.0), Some(512.4)));
    }

    #[test]
    fn test_freeze_time_broadcasts_values() {
        let mut model = Model::new("m", 2, 0.0, 1.0);
        let x = model.add_variable("x", VarRole::Algebraic, IndexSet::TimeUnit, 7.0).unwrap();
        let f = model.add_parameter("F", IndexSet::Time, 120.0, true).unwrap();

        model.freeze_time(vec![0.0, 0.25, 0.5, 0.75, 1.0], 2, 2);

        assert_eq!(model.n_time(), 5);
        assert_eq!(model.var(x, 4, 1), 7.0);
        assert_eq!(model.param(f, 3, 0), 120.0);
    }

    #[test]
    fn test_fix_all_sets_value_and_flag() {
        let mut model = Model::new("m", 1, 0.0, 1.0);
        let s = model.add_state("T", 390.0, 5.0, 384.0).unwrap();
        model.freeze_time(vec![0.0, 1.0], 1, 1);

        model.fix_all(s.dot, 0.0);
        assert!(model.is_fixed(s.dot, 1, 0));
        assert_eq!(model.var(s.dot, 1, 0), 0.0);

        model.unfix_all(s.dot);
        assert!(!model.is_fixed(s.dot, 1, 0));
        assert_eq!(model.var(s.dot, 1, 0), 0.0);
    }
}

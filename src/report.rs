//! Structured inspection of a model's components and activation state.
//!
//! [`ModelSnapshot`] captures the full component inventory at a point in the
//! workflow (names, roles, values, fixed flags, per-instance activation) in
//! a form that is cheap to diff between phases. Its `Display` rendering is
//! the human-readable dump the workflow logs after each solve.

use std::fmt;

use crate::model::{ActiveObjective, Model, VarRole};

/// One variable family in a snapshot.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct VarReport {
    /// Family name.
    pub name: String,
    /// Role in the DAE system.
    pub role: String,
    /// Flat values, time-major.
    pub values: Vec<f64>,
    /// Flat fixed flags, time-major.
    pub fixed: Vec<bool>,
}

/// One parameter family in a snapshot.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ParamReport {
    /// Family name.
    pub name: String,
    /// Flat values, time-major.
    pub values: Vec<f64>,
    /// Whether the family accepts writes.
    pub mutable: bool,
}

/// One equation family in a snapshot.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EqReport {
    /// Family name.
    pub name: String,
    /// Number of existing instances.
    pub instances: usize,
    /// Number of active instances.
    pub active: usize,
}

/// Full component inventory of a model at one instant.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ModelSnapshot {
    /// Model name.
    pub model: String,
    /// Discrete time points, if discretized.
    pub time_points: Option<Vec<f64>>,
    /// All variable families.
    pub vars: Vec<VarReport>,
    /// All parameter families.
    pub params: Vec<ParamReport>,
    /// All equation families with activation counts.
    pub eqs: Vec<EqReport>,
    /// Objective active at capture time.
    pub objective: String,
}

impl ModelSnapshot {
    /// Captures the current state of `model`.
    pub fn capture(model: &Model) -> Self {
        let vars = model
            .var_ids()
            .map(|id| {
                let index = model.var_index(id);
                let nt = if index.has_time() { model.n_time() } else { 1 };
                let nu = if index.has_unit() { model.n_units() } else { 1 };
                let mut values = Vec::with_capacity(nt * nu);
                let mut fixed = Vec::with_capacity(nt * nu);
                for t in 0..nt {
                    for n in 0..nu {
                        values.push(model.var(id, t, n));
                        fixed.push(model.is_fixed(id, t, n));
                    }
                }
                VarReport {
                    name: model.var_name(id).to_string(),
                    role: role_label(model.var_role(id)).to_string(),
                    values,
                    fixed,
                }
            })
            .collect();

        let params = model
            .param_ids()
            .map(|id| {
                let index = model.param_index(id);
                let nt = if index.has_time() { model.n_time() } else { 1 };
                let nu = if index.has_unit() { model.n_units() } else { 1 };
                let mut values = Vec::with_capacity(nt * nu);
                for t in 0..nt {
                    for n in 0..nu {
                        values.push(model.param(id, t, n));
                    }
                }
                ParamReport {
                    name: model.param_name(id).to_string(),
                    values,
                    mutable: model.param_is_mutable(id),
                }
            })
            .collect();

        let eqs = model
            .eq_ids()
            .map(|id| {
                let index = model.eq_index(id);
                let nt = if index.has_time() { model.n_time() } else { 1 };
                let nu = if index.has_unit() { model.n_units() } else { 1 };
                let mut instances = 0;
                let mut active = 0;
                for t in 0..nt {
                    for n in 0..nu {
                        if model.instance_exists(id, t, n) {
                            instances += 1;
                            if model.is_active(id, t, n) {
                                active += 1;
                            }
                        }
                    }
                }
                EqReport { name: model.eq_name(id).to_string(), instances, active }
            })
            .collect();

        ModelSnapshot {
            model: model.name().to_string(),
            time_points: model.time_points().map(|p| p.to_vec()),
            vars,
            params,
            eqs,
            objective: objective_label(model.active_objective()).to_string(),
        }
    }
}

fn role_label(role: VarRole) -> &'static str {
    match role {
        VarRole::Differential => "differential",
        VarRole::Derivative => "derivative",
        VarRole::Algebraic => "algebraic",
        VarRole::Control => "control",
        VarRole::Boundary => "boundary",
    }
}

fn objective_label(objective: ActiveObjective) -> &'static str {
    match objective {
        ActiveObjective::None => "none",
        ActiveObjective::Feasibility => "feasibility",
        ActiveObjective::Dynamic => "dynamic",
    }
}

impl fmt::Display for ModelSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "model '{}' (objective: {})", self.model, self.objective)?;
        if let Some(points) = &self.time_points {
            writeln!(f, "  time: {} points on [{}, {}]", points.len(), points[0], points[points.len() - 1])?;
        }
        writeln!(f, "  variables:")?;
        for v in &self.vars {
            let fixed = v.fixed.iter().filter(|&&b| b).count();
            write!(f, "    {:<12} {:<12} {} instances", v.name, v.role, v.values.len())?;
            if fixed > 0 {
                write!(f, " ({fixed} fixed)")?;
            }
            writeln!(f)?;
        }
        writeln!(f, "  parameters:")?;
        for p in &self.params {
            writeln!(
                f,
                "    {:<12} {:<12} {} instances",
                p.name,
                if p.mutable { "mutable" } else { "constant" },
                p.values.len()
            )?;
        }
        writeln!(f, "  equations:")?;
        for e in &self.eqs {
            writeln!(f, "    {:<16} {}/{} active", e.name, e.active, e.instances)?;
        }
        Ok(())
    }
}

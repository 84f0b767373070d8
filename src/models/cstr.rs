//! Jacketed exothermic CSTR (Rodrigo's reactor).
//!
//! A single first-order exothermic reaction A -> B in a cooled stirred tank.
//! Differential states are the concentration `Ca`, the reactor temperature
//! `T`, and the jacket temperature `Tj`; the Arrhenius rate constant `k` is
//! algebraic and the jacket inlet temperature `Tjinb` is the control, tied
//! to the mutable setpoint parameter `u1` through a port equation.
//!
//! # Balance Equations
//!
//! - rate constant: k = k0 * exp(-E/(R*T))
//! - component:     dCa/dt = (F/V)(Cainb - Ca) - 2 k Ca^2
//! - reactor heat:  dT/dt  = (F/V)(Tinb - T) + 2 dH/(rho Cp) k Ca^2
//!                           - UA/(V rho Cp) (T - Tj)
//! - jacket heat:   dTj/dt = (Fw/Vw)(Tjinb - Tj) + UA/(Vw rhow Cpw) (T - Tj)
//!
//! # Example
//!
//! ```
//! use daecol::collocation::discretize;
//! use daecol::driver::TwoPhaseDriver;
//! use daecol::models::cstr::CstrBuilder;
//! use daecol::solvers::DampedNewton;
//!
//! let mut cstr = CstrBuilder::new().build().unwrap();
//! discretize(&mut cstr.model, 10, 3).unwrap();
//! let report = TwoPhaseDriver::new(DampedNewton::new()).run(&mut cstr.model).unwrap();
//! assert!(report.refined.status.is_optimal());
//! ```

use crate::model::{
    IndexSet, Model, ModelResult, ParamId, SkipPolicy, State, VarId, VarRole,
};

/// Configures and builds the jacketed CSTR model.
///
/// Defaults reproduce the nominal operating point: feed at 120 L/min,
/// cooling water at 30 L/min, jacket inlet setpoint at 250 K, and a one
/// time-unit horizon.
#[derive(Debug, Clone)]
pub struct CstrBuilder {
    n_reactors: usize,
    horizon: f64,
    feed_flow: f64,
    cooling_flow: f64,
    jacket_inlet_setpoint: f64,
}

impl Default for CstrBuilder {
    fn default() -> Self {
        CstrBuilder {
            n_reactors: 1,
            horizon: 1.0,
            feed_flow: 120.0,
            cooling_flow: 30.0,
            jacket_inlet_setpoint: 250.0,
        }
    }
}

impl CstrBuilder {
    /// Nominal configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of identical reactors solved side by side.
    pub fn with_reactors(mut self, n_reactors: usize) -> Self {
        self.n_reactors = n_reactors;
        self
    }

    /// Time horizon length.
    pub fn with_horizon(mut self, horizon: f64) -> Self {
        self.horizon = horizon;
        self
    }

    /// Feed volumetric flow (L/min).
    pub fn with_feed_flow(mut self, feed_flow: f64) -> Self {
        self.feed_flow = feed_flow;
        self
    }

    /// Cooling water flow (L/min).
    pub fn with_cooling_flow(mut self, cooling_flow: f64) -> Self {
        self.cooling_flow = cooling_flow;
        self
    }

    /// Jacket inlet temperature setpoint (K).
    pub fn with_jacket_inlet_setpoint(mut self, setpoint: f64) -> Self {
        self.jacket_inlet_setpoint = setpoint;
        self
    }

    /// Assembles the model graph.
    pub fn build(self) -> ModelResult<Cstr> {
        let mut model = Model::new("cstr_rodrigo", self.n_reactors, 0.0, self.horizon);

        // Inlet and geometry.
        let cainb = model.add_parameter("Cainb", IndexSet::Scalar, 1.0, false)?;
        let tinb = model.add_parameter("Tinb", IndexSet::Scalar, 275.0, false)?;
        let v = model.add_parameter("V", IndexSet::Scalar, 100.0, false)?;
        let ua = model.add_parameter("UA", IndexSet::Scalar, 20000.0 * 60.0, false)?;
        let rho = model.add_parameter("rho", IndexSet::Scalar, 1000.0, false)?;
        let cp = model.add_parameter("Cp", IndexSet::Scalar, 4.2, false)?;
        let vw = model.add_parameter("Vw", IndexSet::Scalar, 10.0, false)?;
        let rhow = model.add_parameter("rhow", IndexSet::Scalar, 1000.0, false)?;
        let cpw = model.add_parameter("Cpw", IndexSet::Scalar, 4.2, false)?;

        // Kinetics; Er is pre-divided like the thesis tables.
        let k0 = model.add_parameter("k0", IndexSet::Scalar, 4.11e13, false)?;
        model.add_parameter("E", IndexSet::Scalar, 76_534.704, false)?;
        model.add_parameter("R", IndexSet::Scalar, 8.314472, false)?;
        let er =
            model.add_parameter("Er", IndexSet::Scalar, 76_534.704 / 8.314472, false)?;
        let dh = model.add_parameter("dH", IndexSet::Scalar, 596_619.0, false)?;

        // Flows are time-indexed and mutable so a supervisory layer can
        // reshape them between solves.
        let f = model.add_parameter("F", IndexSet::Time, self.feed_flow, true)?;
        let fw = model.add_parameter("Fw", IndexSet::Time, self.cooling_flow, true)?;

        // Control port: Tjinb is the solved variable, u1 the setpoint.
        let tjinb = model.add_variable(
            "Tjinb",
            VarRole::Control,
            IndexSet::Time,
            self.jacket_inlet_setpoint,
        )?;
        let u1 =
            model.add_parameter("u1", IndexSet::Time, self.jacket_inlet_setpoint, true)?;

        let ca = model.add_state(
            "Ca",
            1.606_596_803_859_307_656_670_019_071_043_50e-2,
            -3.587_091_35e1,
            1.919_379_397_499_596_3e-2,
        )?;
        let t = model.add_state(
            "T",
            3.923_360_594_527_743_501_203_076_448_291_54e2,
            5.191_918_48e3,
            3.840_072_426_119_903_6e2,
        )?;
        let tj = model.add_state(
            "Tj",
            3.779_953_956_584_016_623_310_162_685_811_52e2,
            -9.704_673_99e2,
            3.712_735_227_257_831_5e2,
        )?;

        let k = model.add_variable("k", VarRole::Algebraic, IndexSet::TimeUnit, 4.707_061_40e2)?;

        model.add_equation("kdef", IndexSet::TimeUnit, SkipPolicy::InitialIndex, {
            let tv = t.var;
            move |m: &Model, i: usize, n: usize| {
                m.var(k, i, n) - m.param(k0, 0, 0) * (-m.param(er, 0, 0) / m.var(tv, i, n)).exp()
            }
        });

        model.add_equation("de_ca", IndexSet::TimeUnit, SkipPolicy::InitialIndex, {
            let (cav, cadot) = (ca.var, ca.dot);
            move |m: &Model, i: usize, n: usize| {
                let cai = m.var(cav, i, n);
                m.var(cadot, i, n)
                    - ((m.param(f, i, 0) / m.param(v, 0, 0)) * (m.param(cainb, 0, 0) - cai)
                        - 2.0 * m.var(k, i, n) * cai * cai)
            }
        });

        model.add_equation("de_T", IndexSet::TimeUnit, SkipPolicy::InitialIndex, {
            let (cav, tv, tjv, tdot) = (ca.var, t.var, tj.var, t.dot);
            move |m: &Model, i: usize, n: usize| {
                let cai = m.var(cav, i, n);
                let ti = m.var(tv, i, n);
                m.var(tdot, i, n)
                    - ((m.param(f, i, 0) / m.param(v, 0, 0)) * (m.param(tinb, 0, 0) - ti)
                        + 2.0 * m.param(dh, 0, 0) / (m.param(rho, 0, 0) * m.param(cp, 0, 0))
                            * m.var(k, i, n)
                            * cai
                            * cai
                        - m.param(ua, 0, 0)
                            / (m.param(v, 0, 0) * m.param(rho, 0, 0) * m.param(cp, 0, 0))
                            * (ti - m.var(tjv, i, n)))
            }
        });

        model.add_equation("de_Tj", IndexSet::TimeUnit, SkipPolicy::InitialIndex, {
            let (tv, tjv, tjdot) = (t.var, tj.var, tj.dot);
            move |m: &Model, i: usize, n: usize| {
                let tji = m.var(tjv, i, n);
                m.var(tjdot, i, n)
                    - ((m.param(fw, i, 0) / m.param(vw, 0, 0)) * (m.var(tjinb, i, 0) - tji)
                        + m.param(ua, 0, 0)
                            / (m.param(vw, 0, 0) * m.param(rhow, 0, 0) * m.param(cpw, 0, 0))
                            * (m.var(tv, i, n) - tji))
            }
        });

        // The port equation holds at every index, the initial one included.
        model.add_equation("u1_cdummy", IndexSet::Time, SkipPolicy::None, move |m, i, _| {
            m.var(tjinb, i, 0) - m.param(u1, i, 0)
        });

        Ok(Cstr { model, ca, temperature: t, jacket_temperature: tj, rate_constant: k, jacket_inlet: tjinb, setpoint: u1, feed_flow: f, cooling_flow: fw })
    }
}

/// The assembled CSTR model with handles to its components.
pub struct Cstr {
    /// The model graph.
    pub model: Model,
    /// Concentration of A.
    pub ca: State,
    /// Reactor temperature.
    pub temperature: State,
    /// Jacket temperature.
    pub jacket_temperature: State,
    /// Arrhenius rate constant.
    pub rate_constant: VarId,
    /// Jacket inlet temperature (control).
    pub jacket_inlet: VarId,
    /// Jacket inlet setpoint parameter.
    pub setpoint: ParamId,
    /// Feed flow parameter.
    pub feed_flow: ParamId,
    /// Cooling water flow parameter.
    pub cooling_flow: ParamId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collocation::discretize;
    use crate::driver::TwoPhaseDriver;
    use crate::phase::{verify_activation, PhaseController};
    use crate::solvers::{DampedNewton, NlpSolver, SolveOptions};
    use approx::assert_relative_eq;

    #[test]
    fn test_component_inventory() {
        let cstr = CstrBuilder::new().build().unwrap();
        assert_eq!(cstr.model.states().len(), 3);
        assert_eq!(cstr.model.var_name(cstr.ca.dot), "Cadot");
        assert_eq!(cstr.model.param_name(cstr.ca.ic_param), "Ca_ic");
        assert_eq!(cstr.model.var_role(cstr.jacket_inlet), VarRole::Control);
        // The port equation exists at the initial index, the physics do not.
        let port = cstr.model.eq_ids().find(|&e| cstr.model.eq_name(e) == "u1_cdummy").unwrap();
        let kdef = cstr.model.eq_ids().find(|&e| cstr.model.eq_name(e) == "kdef").unwrap();
        assert!(cstr.model.instance_exists(port, 0, 0));
        assert!(!cstr.model.instance_exists(kdef, 0, 0));
    }

    #[test]
    fn test_steady_solve_matches_reference_point() {
        let mut cstr = CstrBuilder::new().build().unwrap();
        discretize(&mut cstr.model, 10, 3).unwrap();
        let mut ctl = PhaseController::new();
        ctl.enter_steady(&mut cstr.model);
        assert!(verify_activation(&cstr.model).is_ok());

        let rep = DampedNewton::new().solve(&mut cstr.model, &SolveOptions::default());
        assert!(rep.status.is_optimal(), "{}", rep.message);

        // The initial-condition defaults are the steady point for a 250 K
        // jacket inlet; the solve must land on them.
        assert_relative_eq!(cstr.model.var(cstr.ca.var, 1, 0), 1.919_379_4e-2, max_relative = 1e-4);
        assert_relative_eq!(cstr.model.var(cstr.temperature.var, 1, 0), 384.007_24, max_relative = 1e-4);
        assert_relative_eq!(
            cstr.model.var(cstr.jacket_temperature.var, 1, 0),
            371.273_52,
            max_relative = 1e-4
        );
        assert_relative_eq!(cstr.model.var(cstr.jacket_inlet, 5, 0), 250.0, epsilon = 1e-8);

        // A steady trajectory is constant over the governed indices.
        let last = cstr.model.n_time() - 1;
        assert_relative_eq!(
            cstr.model.var(cstr.temperature.var, 1, 0),
            cstr.model.var(cstr.temperature.var, last, 0),
            max_relative = 1e-9
        );
    }

    #[test]
    fn test_two_phase_workflow_end_to_end() {
        let mut cstr = CstrBuilder::new().build().unwrap();
        discretize(&mut cstr.model, 10, 3).unwrap();

        let mut driver = TwoPhaseDriver::new(DampedNewton::new());
        let report = driver.run(&mut cstr.model).unwrap();
        assert!(report.steady.status.is_optimal());
        assert!(report.dynamic.status.is_optimal());
        assert!(report.refined.status.is_optimal());

        // Continuation seeds the dynamic solve with the steady point, so
        // the trajectory stays on it.
        let model = &cstr.model;
        let steady_t = report.snapshot.states[&cstr.temperature.var][0];
        assert_relative_eq!(model.var(cstr.temperature.var, 0, 0), steady_t, max_relative = 1e-6);
        let last = model.n_time() - 1;
        assert_relative_eq!(model.var(cstr.temperature.var, last, 0), steady_t, max_relative = 1e-6);
        // Derivatives of a resting trajectory vanish.
        assert_relative_eq!(model.var(cstr.temperature.dot, last, 0), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_setpoint_step_moves_dynamic_trajectory() {
        let mut cstr = CstrBuilder::new().build().unwrap();
        discretize(&mut cstr.model, 10, 3).unwrap();
        let mut driver = TwoPhaseDriver::new(DampedNewton::new());
        driver.run(&mut cstr.model).unwrap();

        // Step the jacket inlet setpoint up and re-solve the dynamic phase:
        // the reactor must heat up from its initial condition.
        let t0 = cstr.model.var(cstr.temperature.var, 0, 0);
        for i in 0..cstr.model.n_time() {
            cstr.model.set_param(cstr.setpoint, i, 0, 260.0).unwrap();
        }
        let rep = DampedNewton::new().solve(&mut cstr.model, &SolveOptions::default());
        assert!(rep.status.is_optimal(), "{}", rep.message);

        let last = cstr.model.n_time() - 1;
        assert_relative_eq!(cstr.model.var(cstr.temperature.var, 0, 0), t0, epsilon = 1e-6);
        assert!(cstr.model.var(cstr.temperature.var, last, 0) > t0 + 0.1);
        assert_relative_eq!(cstr.model.var(cstr.jacket_inlet, last, 0), 260.0, epsilon = 1e-6);
    }
}

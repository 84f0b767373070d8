//! Reduced binary distillation column.
//!
//! Trays are indexed bottom to top; tray 0 is the reboiler and the top tray
//! feeds a total condenser that returns a fixed fraction of the overhead
//! vapor as reflux. Differential states are the tray holdup `M` and the
//! liquid composition `x` of the light component. Vapor composition `y`
//! follows a constant-relative-volatility equilibrium and liquid flow `L`
//! a linearized weir correlation, both algebraic. The boilup `V` is set by
//! the reboiler duty `Qr`, the control, tied to the mutable setpoint `u2`
//! through a port equation.
//!
//! # Balance Equations (tray n)
//!
//! - holdup:       dM/dt = L_in - L_out (+ F at the feed tray)
//! - composition:  M dx/dt + x dM/dt = L_in x_in + V y_below - L x - V y (+ F z_f)
//! - equilibrium:  y (1 + (alpha - 1) x) = alpha x
//! - weir:         L = L0 + kw (M - Mref)
//! - boilup:       V lambda = Qr
//! - bottoms:      B = L_out of the reboiler

use crate::model::{
    IndexSet, Model, ModelResult, ParamId, SkipPolicy, State, VarId, VarRole,
};
use crate::phase::{PhaseController, PhaseError};

/// Configures and builds the reduced column model.
#[derive(Debug, Clone)]
pub struct DistillationBuilder {
    n_trays: usize,
    feed_tray: usize,
    feed_flow: f64,
    feed_composition: f64,
    relative_volatility: f64,
    latent_heat: f64,
    reflux_fraction: f64,
    weir_flow: f64,
    weir_gain: f64,
    weir_holdup: f64,
    reboiler_duty: f64,
    horizon: f64,
}

impl Default for DistillationBuilder {
    fn default() -> Self {
        DistillationBuilder {
            n_trays: 5,
            feed_tray: 2,
            feed_flow: 100.0,
            feed_composition: 0.5,
            relative_volatility: 2.0,
            latent_heat: 40.0,
            reflux_fraction: 0.5,
            weir_flow: 30.0,
            weir_gain: 100.0,
            weir_holdup: 1.0,
            reboiler_duty: 2400.0,
            horizon: 1.0,
        }
    }
}

impl DistillationBuilder {
    /// Nominal five-tray column, feed on the middle tray.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of trays, reboiler included. The feed tray must stay interior.
    pub fn with_trays(mut self, n_trays: usize, feed_tray: usize) -> Self {
        self.n_trays = n_trays;
        self.feed_tray = feed_tray;
        self
    }

    /// Feed flow and light-component fraction.
    pub fn with_feed(mut self, flow: f64, composition: f64) -> Self {
        self.feed_flow = flow;
        self.feed_composition = composition;
        self
    }

    /// Constant relative volatility of the light component.
    pub fn with_relative_volatility(mut self, alpha: f64) -> Self {
        self.relative_volatility = alpha;
        self
    }

    /// Fraction of the condensed overhead returned as reflux.
    pub fn with_reflux_fraction(mut self, fraction: f64) -> Self {
        self.reflux_fraction = fraction;
        self
    }

    /// Nominal reboiler duty.
    pub fn with_reboiler_duty(mut self, duty: f64) -> Self {
        self.reboiler_duty = duty;
        self
    }

    /// Assembles the model graph.
    pub fn build(self) -> ModelResult<Distillation> {
        let nt = self.n_trays;
        let nf = self.feed_tray;
        let mut model = Model::new("binary_column", nt, 0.0, self.horizon);

        let alpha = model.add_parameter("alpha", IndexSet::Scalar, self.relative_volatility, false)?;
        let feed = model.add_parameter("Ff", IndexSet::Scalar, self.feed_flow, false)?;
        let zf = model.add_parameter("zf", IndexSet::Scalar, self.feed_composition, false)?;
        let lambda = model.add_parameter("lam", IndexSet::Scalar, self.latent_heat, false)?;
        let rr = model.add_parameter("rr", IndexSet::Scalar, self.reflux_fraction, false)?;
        let l0 = model.add_parameter("L0", IndexSet::Scalar, self.weir_flow, false)?;
        let kw = model.add_parameter("kw", IndexSet::Scalar, self.weir_gain, false)?;
        let mref = model.add_parameter("Mref", IndexSet::Scalar, self.weir_holdup, false)?;

        // Control port: Qr is the solved duty, u2 the setpoint.
        let qr = model.add_variable("Qr", VarRole::Control, IndexSet::Time, self.reboiler_duty)?;
        let u2 = model.add_parameter("u2", IndexSet::Time, self.reboiler_duty, true)?;

        let holdup = model.add_state("M", 1.2, 0.0, 1.2)?;
        let composition = model.add_state("x", 0.5, 0.0, 0.5)?;
        // A graded initial composition profile shortens the steady solve.
        for n in 0..nt {
            let x0 = 0.3 + 0.4 * n as f64 / (nt - 1).max(1) as f64;
            model.set_var(composition.var, 0, n, x0);
            model.set_param(composition.ic_param, 0, n, x0)?;
        }

        let y = model.add_variable("y", VarRole::Algebraic, IndexSet::TimeUnit, 0.6)?;
        let liquid = model.add_variable("L", VarRole::Algebraic, IndexSet::TimeUnit, 100.0)?;
        let vapor = model.add_variable(
            "V",
            VarRole::Algebraic,
            IndexSet::Time,
            self.reboiler_duty / self.latent_heat,
        )?;
        let bottoms = model.add_variable("B", VarRole::Boundary, IndexSet::Time, 70.0)?;

        // Liquid into tray n: the tray above, or the reflux on the top tray.
        let liquid_in = move |m: &Model, i: usize, n: usize| -> f64 {
            if n + 1 < m.n_units() {
                m.var(liquid, i, n + 1)
            } else {
                m.param(rr, 0, 0) * m.var(vapor, i, 0)
            }
        };

        // Net holdup accumulation on tray n. Interior trays pass the boilup
        // straight through; the reboiler vaporizes it, the condenser tray
        // receives it as reflux only.
        let holdup_rhs = move |m: &Model, i: usize, n: usize| -> f64 {
            let lin = liquid_in(m, i, n);
            let lout = m.var(liquid, i, n);
            let v = m.var(vapor, i, 0);
            let f = if n == nf { m.param(feed, 0, 0) } else { 0.0 };
            if n == 0 {
                lin - lout - v
            } else if n + 1 == m.n_units() {
                lin - lout
            } else {
                lin - lout + f
            }
        };

        model.add_equation("de_M", IndexSet::TimeUnit, SkipPolicy::InitialIndex, {
            let mdot = holdup.dot;
            move |m: &Model, i: usize, n: usize| m.var(mdot, i, n) - holdup_rhs(m, i, n)
        });

        model.add_equation("de_x", IndexSet::TimeUnit, SkipPolicy::InitialIndex, {
            let (mv, mdot, xv, xdot) = (holdup.var, holdup.dot, composition.var, composition.dot);
            move |m: &Model, i: usize, n: usize| {
                let v = m.var(vapor, i, 0);
                let last = m.n_units() - 1;
                let rhs = if n == 0 {
                    m.var(liquid, i, 1) * m.var(xv, i, 1)
                        - m.var(liquid, i, 0) * m.var(xv, i, 0)
                        - v * m.var(y, i, 0)
                } else if n == last {
                    m.param(rr, 0, 0) * v * m.var(y, i, last) + v * m.var(y, i, last - 1)
                        - m.var(liquid, i, last) * m.var(xv, i, last)
                        - v * m.var(y, i, last)
                } else {
                    let f = if n == nf { m.param(feed, 0, 0) * m.param(zf, 0, 0) } else { 0.0 };
                    m.var(liquid, i, n + 1) * m.var(xv, i, n + 1) + v * m.var(y, i, n - 1)
                        - m.var(liquid, i, n) * m.var(xv, i, n)
                        - v * m.var(y, i, n)
                        + f
                };
                m.var(mv, i, n) * m.var(xdot, i, n) + m.var(xv, i, n) * m.var(mdot, i, n) - rhs
            }
        });

        // Equilibrium in the polynomial form y (1 + (alpha-1) x) = alpha x.
        model.add_equation("vle", IndexSet::TimeUnit, SkipPolicy::InitialIndex, {
            let xv = composition.var;
            move |m: &Model, i: usize, n: usize| {
                let a = m.param(alpha, 0, 0);
                m.var(y, i, n) * (1.0 + (a - 1.0) * m.var(xv, i, n)) - a * m.var(xv, i, n)
            }
        });

        model.add_equation("weir", IndexSet::TimeUnit, SkipPolicy::InitialIndex, {
            let mv = holdup.var;
            move |m: &Model, i: usize, n: usize| {
                m.var(liquid, i, n)
                    - (m.param(l0, 0, 0) + m.param(kw, 0, 0) * (m.var(mv, i, n) - m.param(mref, 0, 0)))
            }
        });

        model.add_equation("boilup", IndexSet::Time, SkipPolicy::InitialIndex, move |m, i, _| {
            m.var(vapor, i, 0) * m.param(lambda, 0, 0) - m.var(qr, i, 0)
        });

        model.add_equation("bottoms_def", IndexSet::Time, SkipPolicy::InitialIndex, move |m, i, _| {
            m.var(bottoms, i, 0) - m.var(liquid, i, 0)
        });

        // The port equation holds at every index, the initial one included.
        model.add_equation("u2_cdummy", IndexSet::Time, SkipPolicy::None, move |m, i, _| {
            m.var(qr, i, 0) - m.param(u2, i, 0)
        });

        // Track how far the final duty sits from its setpoint.
        model.set_dynamic_objective("duty_tracking", move |m: &Model| {
            let last = m.n_time() - 1;
            let miss = m.var(qr, last, 0) - m.param(u2, last, 0);
            miss * miss
        });

        Ok(Distillation {
            model,
            holdup,
            composition,
            vapor_composition: y,
            liquid_flow: liquid,
            vapor_flow: vapor,
            bottoms,
            duty: qr,
            duty_setpoint: u2,
        })
    }
}

/// The assembled column model with handles to its components.
pub struct Distillation {
    /// The model graph.
    pub model: Model,
    /// Tray liquid holdup.
    pub holdup: State,
    /// Liquid light-component fraction.
    pub composition: State,
    /// Vapor light-component fraction.
    pub vapor_composition: VarId,
    /// Liquid flow leaving each tray.
    pub liquid_flow: VarId,
    /// Boilup vapor flow.
    pub vapor_flow: VarId,
    /// Bottoms product flow.
    pub bottoms: VarId,
    /// Reboiler duty (control).
    pub duty: VarId,
    /// Reboiler duty setpoint parameter.
    pub duty_setpoint: ParamId,
}

impl Distillation {
    /// Installs the operating bounds ahead of the dynamic solve: fractions
    /// in `[0, 1]`, flows and holdups nonnegative.
    pub fn apply_operating_bounds(&mut self, controller: &PhaseController) -> Result<(), PhaseError> {
        controller.set_bounds(&mut self.model, self.composition.var, Some(0.0), Some(1.0))?;
        controller.set_bounds(&mut self.model, self.vapor_composition, Some(0.0), Some(1.0))?;
        controller.set_bounds(&mut self.model, self.holdup.var, Some(0.0), None)?;
        controller.set_bounds(&mut self.model, self.liquid_flow, Some(0.0), None)?;
        controller.set_bounds(&mut self.model, self.vapor_flow, Some(0.0), None)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collocation::discretize;
    use crate::driver::TwoPhaseDriver;
    use crate::model::ActiveObjective;
    use crate::phase::PhaseController;
    use crate::solvers::{DampedNewton, NlpSolver, SolveOptions};
    use approx::assert_relative_eq;

    #[test]
    fn test_steady_flow_profile() {
        let mut column = DistillationBuilder::new().build().unwrap();
        discretize(&mut column.model, 1, 1).unwrap();
        let mut ctl = PhaseController::new();
        ctl.enter_steady(&mut column.model);

        let rep = DampedNewton::new().solve(&mut column.model, &SolveOptions::default());
        assert!(rep.status.is_optimal(), "{}", rep.message);

        let m = &column.model;
        // V = Qr / lambda, reflux = rr * V, bottoms = feed - distillate.
        assert_relative_eq!(m.var(column.vapor_flow, 1, 0), 60.0, epsilon = 1e-6);
        assert_relative_eq!(m.var(column.liquid_flow, 1, 4), 30.0, epsilon = 1e-6);
        assert_relative_eq!(m.var(column.liquid_flow, 1, 2), 130.0, epsilon = 1e-6);
        assert_relative_eq!(m.var(column.bottoms, 1, 0), 70.0, epsilon = 1e-6);
        // The light component enriches upward.
        for n in 1..m.n_units() {
            assert!(m.var(column.composition.var, 1, n) > m.var(column.composition.var, 1, n - 1));
            assert!(m.var(column.vapor_composition, 1, n) > m.var(column.composition.var, 1, n));
        }
    }

    #[test]
    fn test_two_phase_workflow_with_bounds() {
        let mut column = DistillationBuilder::new().build().unwrap();
        discretize(&mut column.model, 1, 1).unwrap();
        let ctl = PhaseController::new();
        column.apply_operating_bounds(&ctl).unwrap();
        // Reapplying the same bounds is a no-op.
        column.apply_operating_bounds(&ctl).unwrap();
        assert_eq!(column.model.bounds(column.composition.var), (Some(0.0), Some(1.0)));

        let holdup = column.holdup;
        let mut model = column.model;
        let mut driver = TwoPhaseDriver::new(DampedNewton::new());
        let report = driver.run(&mut model).unwrap();
        assert!(report.refined.status.is_optimal());
        assert_eq!(model.active_objective(), ActiveObjective::Dynamic);
        // The trajectory rests on the steady point, so the duty sits on its
        // setpoint and the tracking objective is zero.
        assert_relative_eq!(model.objective_value().unwrap(), 0.0, epsilon = 1e-10);
        // Holdup ICs were carried from the steady weir profile.
        assert_relative_eq!(model.param(holdup.ic_param, 0, 0), 1.4, epsilon = 1e-6);
        assert_relative_eq!(model.param(holdup.ic_param, 0, 2), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_duty_step_raises_boilup() {
        let mut column = DistillationBuilder::new().build().unwrap();
        discretize(&mut column.model, 1, 1).unwrap();
        let mut driver = TwoPhaseDriver::new(DampedNewton::new());
        driver.run(&mut column.model).unwrap();

        let top = column.model.n_units() - 1;
        let x_top = column.model.var(column.composition.var, 1, top);
        for t in 0..column.model.n_time() {
            column.model.set_param(column.duty_setpoint, t, 0, 2640.0).unwrap();
        }
        let rep = DampedNewton::new().solve(&mut column.model, &SolveOptions::default());
        assert!(rep.status.is_optimal(), "{}", rep.message);

        assert_relative_eq!(column.model.var(column.vapor_flow, 1, 0), 66.0, epsilon = 1e-6);
        // More boilup moves the top composition off its previous point.
        assert!((column.model.var(column.composition.var, 1, top) - x_top).abs() > 1e-4);
    }
}

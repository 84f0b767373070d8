//! Simultaneous orthogonal collocation on finite elements.
//!
//! [`discretize`] freezes a model's continuous time horizon into
//! `nfe * ncp + 1` instants (the initial instant plus `ncp` Radau points per
//! element) and registers one collocation equation family per derivative
//! variable. After discretization the model is a purely algebraic system;
//! no integrator is involved anywhere.
//!
//! The collocation equations skip the initial time index: the first instant
//! is governed by the initial-condition equations instead.

use std::rc::Rc;

use thiserror::Error;

use crate::model::{EqKind, IndexSet, Model, Residual, SkipPolicy, TimeDomain, VarId};

/// Highest supported collocation order.
pub const MAX_NCP: usize = 5;

/// Errors raised by the discretizer.
#[derive(Debug, Error)]
pub enum CollocationError {
    /// Element or point counts outside the supported range.
    #[error("invalid discretization nfe={nfe}, ncp={ncp}: {reason}")]
    InvalidDiscretization {
        /// Requested number of finite elements.
        nfe: usize,
        /// Requested collocation points per element.
        ncp: usize,
        /// What was wrong with the request.
        reason: &'static str,
    },
    /// The model's time domain has already been frozen.
    #[error("model '{0}' is already discretized")]
    AlreadyDiscretized(String),
}

/// Radau IIA collocation points on `(0, 1]`, right endpoint included.
///
/// The right endpoint being a collocation point makes the last index of each
/// element a solved state, which element continuity relies on.
pub fn radau_points(ncp: usize) -> Option<&'static [f64]> {
    const P1: [f64; 1] = [1.0];
    const P2: [f64; 2] = [0.333_333_333_333_333_3, 1.0];
    const P3: [f64; 3] = [0.155_051_025_721_682_2, 0.644_948_974_278_317_8, 1.0];
    const P4: [f64; 4] = [
        0.088_587_959_512_703_95,
        0.409_466_864_440_734_7,
        0.787_659_461_760_847_1,
        1.0,
    ];
    const P5: [f64; 5] = [
        0.057_104_196_114_517_68,
        0.276_843_013_638_123_9,
        0.583_590_432_368_917_0,
        0.860_240_135_656_219_5,
        1.0,
    ];
    match ncp {
        1 => Some(&P1),
        2 => Some(&P2),
        3 => Some(&P3),
        4 => Some(&P4),
        5 => Some(&P5),
        _ => None,
    }
}

/// Derivatives of the Lagrange interpolation basis over the points
/// `{0, tau_1, .., tau_ncp}`, evaluated at each collocation point.
///
/// `adot[j][k]` is `l_j'(tau_k)` for `j in 0..=ncp`, `k in 1..=ncp`
/// (column 0 is unused padding so indices line up with local point numbers).
fn derivative_matrix(tau: &[f64]) -> Vec<Vec<f64>> {
    let ncp = tau.len();
    let mut pts = Vec::with_capacity(ncp + 1);
    pts.push(0.0);
    pts.extend_from_slice(tau);

    let mut adot = vec![vec![0.0; ncp + 1]; ncp + 1];
    for j in 0..=ncp {
        for k in 1..=ncp {
            let x = pts[k];
            let mut d = 0.0;
            for m in 0..=ncp {
                if m == j {
                    continue;
                }
                let mut term = 1.0 / (pts[j] - pts[m]);
                for r in 0..=ncp {
                    if r == j || r == m {
                        continue;
                    }
                    term *= (x - pts[r]) / (pts[j] - pts[r]);
                }
                d += term;
            }
            adot[j][k] = d;
        }
    }
    adot
}

/// Discretizes `model` over `nfe` finite elements with `ncp` Radau points
/// per element.
///
/// # Errors
///
/// [`CollocationError::InvalidDiscretization`] for `nfe == 0`, `ncp == 0`,
/// or `ncp > MAX_NCP`; [`CollocationError::AlreadyDiscretized`] on a second
/// call.
///
/// # Examples
///
/// ```
/// use daecol::collocation::discretize;
/// use daecol::model::Model;
///
/// let mut model = Model::new("m", 1, 0.0, 1.0);
/// model.add_state("x", 0.0, 0.0, 0.0).unwrap();
/// discretize(&mut model, 10, 3).unwrap();
/// assert_eq!(model.n_time(), 31);
/// ```
pub fn discretize(model: &mut Model, nfe: usize, ncp: usize) -> Result<(), CollocationError> {
    if nfe == 0 {
        return Err(CollocationError::InvalidDiscretization { nfe, ncp, reason: "nfe must be at least 1" });
    }
    if ncp == 0 {
        return Err(CollocationError::InvalidDiscretization { nfe, ncp, reason: "ncp must be at least 1" });
    }
    let tau = radau_points(ncp).ok_or(CollocationError::InvalidDiscretization {
        nfe,
        ncp,
        reason: "collocation order not tabulated",
    })?;
    let (start, end) = match model.time_domain() {
        TimeDomain::Continuous { start, end } => (*start, *end),
        TimeDomain::Discretized { .. } => {
            return Err(CollocationError::AlreadyDiscretized(model.name().to_string()))
        }
    };

    let h = (end - start) / nfe as f64;
    let mut points = Vec::with_capacity(nfe * ncp + 1);
    points.push(start);
    for e in 0..nfe {
        for &v in tau {
            points.push(start + (e as f64 + v) * h);
        }
    }
    model.freeze_time(points, nfe, ncp);

    let adot = Rc::new(derivative_matrix(tau));
    let states: Vec<(VarId, VarId)> = model.states().iter().map(|s| (s.var, s.dot)).collect();
    for (var, dot) in states {
        let name = format!("{}_disc_eq", model.var_name(dot));
        let residual = collocation_residual(var, dot, ncp, h, Rc::clone(&adot));
        model.push_eq(&name, IndexSet::TimeUnit, SkipPolicy::InitialIndex, EqKind::Collocation { dot }, residual);
    }

    log::debug!(
        "discretized model '{}': nfe={}, ncp={}, {} time points",
        model.name(),
        nfe,
        ncp,
        model.n_time()
    );
    Ok(())
}

/// Residual `h * dot[t] - sum_j adot[j][k] * x[e*ncp + j]` at global time
/// index `t = e*ncp + k`.
fn collocation_residual(
    var: VarId,
    dot: VarId,
    ncp: usize,
    h: f64,
    adot: Rc<Vec<Vec<f64>>>,
) -> Residual {
    Rc::new(move |m: &Model, t: usize, n: usize| {
        let e = (t - 1) / ncp;
        let k = t - e * ncp;
        let base = e * ncp;
        let mut interp = 0.0;
        for (j, row) in adot.iter().enumerate() {
            interp += row[k] * m.var(var, base + j, n);
        }
        h * m.var(dot, t, n) - interp
    })
}

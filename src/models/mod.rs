//! Ready-made process models expressed as model graphs.
//!
//! - [`cstr`]: jacketed exothermic CSTR with an Arrhenius rate law and a
//!   jacket-inlet control port.
//! - [`distillation`]: reduced binary column with constant relative
//!   volatility, a linear weir, and a reboiler-duty control port.
//!
//! Both build continuous models; discretize them with
//! [`crate::collocation::discretize`] before running the two-phase
//! workflow.

pub mod cstr;
pub mod distillation;

pub use cstr::{Cstr, CstrBuilder};
pub use distillation::{Distillation, DistillationBuilder};

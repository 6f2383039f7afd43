//! Spectral model fitting for stellar spectroscopy: transition line lists,
//! profile and synthesis models, conflict detection between models that share
//! transitions, and a measurement session tying them together.

pub mod archive;
pub mod common;
pub mod conflicts;
pub mod domain;
pub mod fitting;
pub mod linelist;
pub mod model;
pub mod numerics;
pub mod radiative;
pub mod session;
pub mod spectrum;

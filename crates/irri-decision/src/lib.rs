//! ---
//! irri_section: "04-decision-engine"
//! irri_subsection: "module"
//! irri_type: "source"
//! irri_scope: "code"
//! irri_description: "Pure irrigation decision logic."
//! irri_version: "v0.1.0-alpha"
//! irri_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Pure decision engine for smart irrigation.
//!
//! [`decide`] is a referentially transparent function of its inputs: no I/O,
//! no clock reads, no randomness. Identical arguments always produce a
//! structurally identical [`Decision`], which is what makes the rule chain
//! testable in isolation from the rest of the engine.

pub mod engine;
pub mod model;

pub use engine::{decide, Decision};
pub use model::{ModelError, Prediction, Predictor};

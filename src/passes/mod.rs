//! Whole-program transformations between the analysis stages.

mod specialization;

pub use specialization::{specialize, SpecializationBounds};

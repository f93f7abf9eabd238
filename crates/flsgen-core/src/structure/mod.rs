//! Landscape structure: per-class patch counts and sizes meeting ecological
//! targets, solved with the in-crate CP engine.
pub mod class;
pub mod document;
pub mod landscape;
pub mod solver;

pub use class::{ClassModel, LandscapeClass};
pub use document::{ClassSummary, ClassTarget, StructureDocument, TargetDocument};
pub use landscape::{ClassStructure, LandscapeStructure};
pub use solver::{SolveOutcome, StructureSolver};

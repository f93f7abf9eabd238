//! Fragmented landscape structures: solve per-class patch counts and sizes
//! that meet ecological index targets, then paint them onto a grid.
//!
//! ```text
//! TargetDocument ─▶ StructureSolver ─▶ LandscapeStructure ─▶ LandscapeGenerator ─▶ raster
//!                   (cp engine)                              (terrain, neighborhoods)
//! ```
pub mod analysis;
pub mod cp;
pub mod error;
pub mod generator;
pub mod grid;
pub mod neighborhood;
pub mod structure;
pub mod terrain;

pub use error::{Error, Result};
pub use generator::{
    generate_batch, GeneratedLandscape, GenerationBudget, GenerationOutcome, GeneratorConfig, GrowthStrategy,
    LandscapeGenerator, EMPTY, NO_DATA,
};
pub use grid::Grid;
pub use neighborhood::{Connectivity, Neighborhood};
pub use structure::{
    ClassStructure, LandscapeStructure, SolveOutcome, StructureDocument, StructureSolver, TargetDocument,
};
pub use terrain::Terrain;

//! Terrain elevation surface consumed by the landscape generator.
//!
//! One `f32` elevation per grid cell, row-major. Terrains are either loaded
//! from external data (dimension-checked against the grid) or synthesized with
//! diamond-square midpoint displacement or Perlin fBm.
pub mod diamond_square;
pub mod fbm;

use rand::Rng;

use crate::error::{Error, Result};
use crate::grid::Grid;

#[derive(Debug, Clone)]
pub struct Terrain {
    /// Row-major elevation values.
    pub data: Vec<f32>,
    pub nb_rows: usize,
    pub nb_cols: usize,
}

impl Terrain {
    /// Create a new terrain filled with the given value.
    pub fn new(nb_rows: usize, nb_cols: usize, fill: f32) -> Self {
        Self { data: vec![fill; nb_rows * nb_cols], nb_rows, nb_cols }
    }

    /// Zero-elevation terrain over `grid`. Growth is then purely random.
    pub fn flat(grid: &Grid) -> Self {
        Self::new(grid.nb_rows(), grid.nb_cols(), 0.0)
    }

    /// Wrap externally loaded elevation values.
    pub fn from_elevation(grid: &Grid, data: Vec<f32>) -> Result<Self> {
        if data.len() != grid.nb_cells() {
            return Err(Error::DimensionMismatch { expected: grid.nb_cells(), actual: data.len() });
        }
        Ok(Self { data, nb_rows: grid.nb_rows(), nb_cols: grid.nb_cols() })
    }

    /// Diamond-square terrain cropped to `grid`. `roughness` in `[0, 1]`.
    pub fn diamond_square<R: Rng + ?Sized>(grid: &Grid, roughness: f64, rng: &mut R) -> Result<Self> {
        let data = diamond_square::generate(grid.nb_rows(), grid.nb_cols(), roughness, rng)?;
        Ok(Self { data, nb_rows: grid.nb_rows(), nb_cols: grid.nb_cols() })
    }

    /// Perlin fBm terrain with Hurst exponent `hurst`, 6 base periods across
    /// the longer side.
    pub fn fbm(grid: &Grid, seed: u32, hurst: f32, octaves: u32) -> Self {
        let data = fbm::Fbm::new(seed, hurst, octaves).sample_grid(grid.nb_rows(), grid.nb_cols(), 6.0);
        Self { data, nb_rows: grid.nb_rows(), nb_cols: grid.nb_cols() }
    }

    #[inline]
    pub fn elevation(&self, index: usize) -> f32 {
        self.data[index]
    }

    pub fn min_elevation(&self) -> f32 {
        self.data.iter().cloned().fold(f32::INFINITY, f32::min)
    }

    pub fn max_elevation(&self) -> f32 {
        self.data.iter().cloned().fold(f32::NEG_INFINITY, f32::max)
    }

    /// Rescale to `[0, 1]`. A flat terrain maps to all zeros.
    pub fn normalized(mut self) -> Self {
        let min_v = self.min_elevation();
        let range = self.max_elevation() - min_v;
        for v in &mut self.data {
            *v = if range > 0.0 { (*v - min_v) / range } else { 0.0 };
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn loaded_terrain_is_dimension_checked() {
        let grid = Grid::new(4, 5);
        assert!(Terrain::from_elevation(&grid, vec![0.0; 20]).is_ok());
        let err = Terrain::from_elevation(&grid, vec![0.0; 19]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 20, actual: 19 }));
    }

    #[test]
    fn constant_terrain_has_equal_extremes() {
        let t = Terrain::new(3, 4, 7.5);
        assert_eq!(t.elevation(2 * 4 + 1), 7.5);
        assert_eq!((t.min_elevation(), t.max_elevation()), (7.5, 7.5));
    }

    #[test]
    fn normalized_spans_unit_interval() {
        let grid = Grid::new(33, 40);
        let mut rng = StdRng::seed_from_u64(42);
        let t = Terrain::diamond_square(&grid, 0.5, &mut rng).unwrap().normalized();
        assert_eq!(t.data.len(), 33 * 40);
        assert_relative_eq!(t.min_elevation(), 0.0);
        assert_relative_eq!(t.max_elevation(), 1.0);
    }

    #[test]
    fn flat_terrain_normalizes_to_zero() {
        let t = Terrain::flat(&Grid::new(2, 2)).normalized();
        assert!(t.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn fbm_terrain_is_not_flat() {
        let t = Terrain::fbm(&Grid::new(64, 64), 7, 0.75, 6);
        assert!(t.max_elevation() - t.min_elevation() > 0.01);
    }
}

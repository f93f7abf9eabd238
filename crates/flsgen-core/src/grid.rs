//! Regular and masked raster grids.
//!
//! Cells are addressed row-major: `index = row * nb_cols + col`. A masked
//! ("partial") grid additionally keeps the subset of valid cells and a
//! bijection between dense partial indices and full-grid indices.

use crate::error::{Error, Result};

/// Dense index ↔ full index tables of a masked grid.
#[derive(Debug, Clone, PartialEq)]
struct PartialIndex {
    /// `full_to_partial[i]` is `Some(k)` iff full cell `i` is valid.
    full_to_partial: Vec<Option<usize>>,
    partial_to_full: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    nb_rows: usize,
    nb_cols: usize,
    partial: Option<PartialIndex>,
}

impl Grid {
    /// Regular grid where every cell is valid.
    pub fn new(nb_rows: usize, nb_cols: usize) -> Self {
        Self { nb_rows, nb_cols, partial: None }
    }

    /// Masked grid. `masked[i] == true` excludes full cell `i`.
    pub fn with_mask(nb_rows: usize, nb_cols: usize, masked: &[bool]) -> Result<Self> {
        let n = nb_rows * nb_cols;
        if masked.len() != n {
            return Err(Error::DimensionMismatch { expected: n, actual: masked.len() });
        }
        let mut full_to_partial = vec![None; n];
        let mut partial_to_full = Vec::with_capacity(n);
        for (i, &m) in masked.iter().enumerate() {
            if !m {
                full_to_partial[i] = Some(partial_to_full.len());
                partial_to_full.push(i);
            }
        }
        Ok(Self {
            nb_rows,
            nb_cols,
            partial: Some(PartialIndex { full_to_partial, partial_to_full }),
        })
    }

    /// Masked grid from a raster, excluding every cell equal to `nodata`
    /// (or NaN when `nodata` is NaN).
    pub fn from_nodata(nb_rows: usize, nb_cols: usize, values: &[f32], nodata: f32) -> Result<Self> {
        let masked: Vec<bool> = values
            .iter()
            .map(|&v| if nodata.is_nan() { v.is_nan() } else { v == nodata })
            .collect();
        Self::with_mask(nb_rows, nb_cols, &masked)
    }

    #[inline]
    pub fn nb_rows(&self) -> usize {
        self.nb_rows
    }

    #[inline]
    pub fn nb_cols(&self) -> usize {
        self.nb_cols
    }

    /// Number of cells in the full rectangle, masked or not.
    #[inline]
    pub fn nb_cells(&self) -> usize {
        self.nb_rows * self.nb_cols
    }

    /// Number of valid (non-masked) cells, i.e. the landscape area.
    pub fn nb_valid_cells(&self) -> usize {
        match &self.partial {
            Some(p) => p.partial_to_full.len(),
            None => self.nb_cells(),
        }
    }

    pub fn is_partial(&self) -> bool {
        self.partial.is_some()
    }

    #[inline]
    pub fn cell_index(&self, row: usize, col: usize) -> usize {
        row * self.nb_cols + col
    }

    /// `(row, col)` of a full-grid index.
    #[inline]
    pub fn coordinates(&self, index: usize) -> (usize, usize) {
        (index / self.nb_cols, index % self.nb_cols)
    }

    /// Full-grid index of `(row + dr, col + dc)` when it lies inside the rectangle.
    #[inline]
    pub fn offset(&self, index: usize, dr: isize, dc: isize) -> Option<usize> {
        let (r, c) = self.coordinates(index);
        let nr = r as isize + dr;
        let nc = c as isize + dc;
        if nr < 0 || nc < 0 || nr >= self.nb_rows as isize || nc >= self.nb_cols as isize {
            return None;
        }
        Some(nr as usize * self.nb_cols + nc as usize)
    }

    #[inline]
    pub fn is_valid(&self, index: usize) -> bool {
        match &self.partial {
            Some(p) => p.full_to_partial.get(index).is_some_and(Option::is_some),
            None => index < self.nb_cells(),
        }
    }

    /// Dense index of a valid full-grid cell.
    pub fn partial_index(&self, full: usize) -> Option<usize> {
        match &self.partial {
            Some(p) => p.full_to_partial.get(full).copied().flatten(),
            None => (full < self.nb_cells()).then_some(full),
        }
    }

    /// Full-grid index of a dense index.
    pub fn full_index(&self, partial: usize) -> Option<usize> {
        match &self.partial {
            Some(p) => p.partial_to_full.get(partial).copied(),
            None => (partial < self.nb_cells()).then_some(partial),
        }
    }

    /// Valid full-grid indices in ascending order.
    pub fn valid_cells(&self) -> Box<dyn Iterator<Item = usize> + '_> {
        match &self.partial {
            Some(p) => Box::new(p.partial_to_full.iter().copied()),
            None => Box::new(0..self.nb_cells()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_coordinates_roundtrip() {
        let g = Grid::new(7, 11);
        for i in 0..g.nb_cells() {
            let (r, c) = g.coordinates(i);
            assert_eq!(g.cell_index(r, c), i);
        }
        assert_eq!(g.coordinates(23), (2, 1));
    }

    #[test]
    fn offset_stays_inside_rectangle() {
        let g = Grid::new(3, 3);
        assert_eq!(g.offset(0, -1, 0), None);
        assert_eq!(g.offset(0, 0, -1), None);
        assert_eq!(g.offset(0, 1, 1), Some(4));
        assert_eq!(g.offset(8, 1, 0), None);
    }

    #[test]
    fn partial_grid_is_a_bijection() {
        let masked = [true, false, false, true, false, true];
        let g = Grid::with_mask(2, 3, &masked).unwrap();
        assert_eq!(g.nb_cells(), 6);
        assert_eq!(g.nb_valid_cells(), 3);
        for k in 0..g.nb_valid_cells() {
            let full = g.full_index(k).unwrap();
            assert!(g.is_valid(full));
            assert_eq!(g.partial_index(full), Some(k));
        }
        for (i, &m) in masked.iter().enumerate() {
            assert_eq!(g.is_valid(i), !m, "cell {i}");
        }
        assert_eq!(g.valid_cells().collect::<Vec<_>>(), vec![1, 2, 4]);
    }

    #[test]
    fn mask_length_must_match_grid() {
        let err = Grid::with_mask(2, 2, &[false; 3]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 4, actual: 3 }));
    }

    #[test]
    fn nodata_values_are_masked() {
        let g = Grid::from_nodata(1, 4, &[1.0, -9999.0, 0.0, -9999.0], -9999.0).unwrap();
        assert_eq!(g.nb_valid_cells(), 2);
        assert!(!g.is_valid(1));
    }
}

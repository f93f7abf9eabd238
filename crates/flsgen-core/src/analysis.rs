//! Connected-component analysis of painted rasters.
//!
//! Used to check generated landscapes against their structure and to recover a
//! structure from an existing classified raster.
use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::generator::EMPTY;
use crate::grid::Grid;
use crate::neighborhood::Connectivity;
use crate::structure::{ClassStructure, LandscapeStructure};

/// One connected group of same-class cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub class: i32,
    /// Full-grid indices, in discovery order.
    pub cells: Vec<usize>,
}

impl Patch {
    pub fn size(&self) -> usize {
        self.cells.len()
    }
}

fn check_len(grid: &Grid, raster: &[i32]) -> Result<()> {
    if raster.len() != grid.nb_cells() {
        return Err(Error::DimensionMismatch { expected: grid.nb_cells(), actual: raster.len() });
    }
    Ok(())
}

/// Flood-fill every valid cell whose value satisfies `keep`, grouping
/// neighbours of equal value.
fn components(grid: &Grid, raster: &[i32], connectivity: Connectivity, keep: impl Fn(i32) -> bool) -> Vec<Patch> {
    let mut seen = vec![false; raster.len()];
    let mut patches = Vec::new();
    let mut queue = VecDeque::new();
    for start in grid.valid_cells() {
        let class = raster[start];
        if seen[start] || !keep(class) {
            continue;
        }
        seen[start] = true;
        queue.push_back(start);
        let mut cells = Vec::new();
        while let Some(i) = queue.pop_front() {
            cells.push(i);
            for j in connectivity.adjacent(grid, i) {
                if !seen[j] && raster[j] == class {
                    seen[j] = true;
                    queue.push_back(j);
                }
            }
        }
        patches.push(Patch { class, cells });
    }
    patches
}

/// Patches of every painted (non-negative) value.
pub fn label_patches(grid: &Grid, raster: &[i32], connectivity: Connectivity) -> Result<Vec<Patch>> {
    check_len(grid, raster)?;
    Ok(components(grid, raster, connectivity, |v| v >= 0))
}

/// Number of connected regions of unpainted cells.
pub fn empty_components(grid: &Grid, raster: &[i32], connectivity: Connectivity) -> Result<usize> {
    check_len(grid, raster)?;
    Ok(components(grid, raster, connectivity, |v| v == EMPTY).len())
}

/// Structure of a raster painted with class indices `0..class_names.len()`.
pub fn structure_from_raster(
    grid: &Grid,
    raster: &[i32],
    connectivity: Connectivity,
    class_names: &[String],
) -> Result<LandscapeStructure> {
    let patches = label_patches(grid, raster, connectivity)?;
    let mut sizes: Vec<Vec<i64>> = vec![Vec::new(); class_names.len()];
    for patch in patches {
        let slot = sizes.get_mut(patch.class as usize).ok_or_else(|| {
            Error::InvalidDocument(format!(
                "raster value {} has no class ({} classes declared)",
                patch.class,
                class_names.len()
            ))
        })?;
        slot.push(patch.size() as i64);
    }
    let classes = class_names
        .iter()
        .zip(sizes)
        .map(|(name, s)| ClassStructure::new(name.clone(), s))
        .collect::<Result<Vec<_>>>()?;
    LandscapeStructure::new(grid.nb_rows(), grid.nb_cols(), grid.nb_valid_cells() as i64, None, classes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::NO_DATA;

    const E: i32 = EMPTY;

    #[test]
    fn diagonal_cells_merge_only_under_eight_connectivity() {
        let g = Grid::new(3, 3);
        #[rustfmt::skip]
        let raster = [
            0, E, E,
            E, 0, E,
            E, E, 1,
        ];
        assert_eq!(label_patches(&g, &raster, Connectivity::Four).unwrap().len(), 3);
        let eight = label_patches(&g, &raster, Connectivity::Eight).unwrap();
        assert_eq!(eight.len(), 2);
        assert_eq!(eight[0].size(), 2);
        assert_eq!(empty_components(&g, &raster, Connectivity::Four).unwrap(), 2);
        assert_eq!(empty_components(&g, &raster, Connectivity::Eight).unwrap(), 1);
    }

    #[test]
    fn structure_recovered_from_raster() {
        let masked = [false, false, false, false, true, false];
        let g = Grid::with_mask(2, 3, &masked).unwrap();
        let raster = [0, 0, E, 1, NO_DATA, 1];
        let names = vec!["a".to_string(), "b".to_string()];
        let s = structure_from_raster(&g, &raster, Connectivity::Four, &names).unwrap();
        assert_eq!(s.class(0).patch_sizes(), &[2]);
        assert_eq!(s.class(1).patch_sizes(), &[1, 1], "masked cell separates the two b cells");
        assert_eq!(s.landscape_area(), 5);
    }

    #[test]
    fn unknown_class_and_size_mismatch_fail() {
        let g = Grid::new(1, 2);
        assert!(structure_from_raster(&g, &[0, 3], Connectivity::Four, &["a".to_string()]).is_err());
        assert!(label_patches(&g, &[0], Connectivity::Four).is_err());
    }
}

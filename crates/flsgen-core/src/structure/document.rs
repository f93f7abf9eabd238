//! JSON documents: solver targets in, solved structures out.
use serde::{Deserialize, Serialize};

use super::landscape::{ClassStructure, LandscapeStructure};
use super::solver::StructureSolver;
use crate::error::{Error, Result};
use crate::grid::Grid;

// ── Targets (solver input) ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetDocument {
    #[serde(rename = "nbRows")]
    pub nb_rows: usize,
    #[serde(rename = "nbCols")]
    pub nb_cols: usize,
    #[serde(rename = "maskRasterPath", default, skip_serializing_if = "Option::is_none")]
    pub mask_raster_path: Option<String>,
    pub classes: Vec<ClassTarget>,
}

/// `NP` and `AREA` are mandatory; every other range is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct ClassTarget {
    #[serde(rename = "name")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub np: Option<[usize; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<[i64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<[i64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pland: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pd: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spi: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lpi: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spli: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npro: Option<[i64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sden: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cohe: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub divi: Option<[f64; 2]>,
    #[serde(rename = "patchesAllDifferent", default)]
    pub patches_all_different: bool,
}

impl TargetDocument {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the document dimensions against `grid`.
    pub fn check_grid(&self, grid: &Grid) -> Result<()> {
        check_dimensions(self.nb_rows, self.nb_cols, grid)
    }

    /// Solver over `grid` with every class and target of the document declared.
    /// The solver is not built yet, so more targets can still be added.
    pub fn into_solver(self, grid: &Grid) -> Result<StructureSolver> {
        self.check_grid(grid)?;
        let mut solver = StructureSolver::new(grid);
        if let Some(path) = self.mask_raster_path {
            solver.set_mask_raster_path(path);
        }
        for target in self.classes {
            let name = target.name.as_str();
            let np = target.np.ok_or_else(|| missing(name, "NP"))?;
            let area = target.area.ok_or_else(|| missing(name, "AREA"))?;
            let id = solver.add_class(name, (np[0], np[1]), (area[0], area[1]))?;

            let mut class = solver.class_mut(id)?;
            if let Some([a, b]) = target.ca {
                class.set_class_area(a, b)?;
            }
            if let Some([a, b]) = target.pland {
                class.set_landscape_proportion(a, b)?;
            }
            if let Some([a, b]) = target.pd {
                class.set_patch_density(a, b)?;
            }
            if let Some([a, b]) = target.spi {
                class.set_smallest_patch_index(a, b)?;
            }
            if let Some([a, b]) = target.lpi {
                class.set_largest_patch_index(a, b)?;
            }
            if let Some([a, b]) = target.mesh {
                class.set_mesh(a, b)?;
            }
            if let Some([a, b]) = target.spli {
                class.set_splitting_index(a, b)?;
            }
            if let Some([a, b]) = target.npro {
                class.set_net_product(a, b)?;
            }
            if let Some([a, b]) = target.sden {
                class.set_splitting_density(a, b)?;
            }
            if let Some([a, b]) = target.cohe {
                class.set_degree_of_coherence(a, b)?;
            }
            if let Some([a, b]) = target.divi {
                class.set_degree_of_division(a, b)?;
            }
            class.set_patches_all_different(target.patches_all_different)?;
        }
        Ok(solver)
    }
}

fn missing(class: &str, field: &str) -> Error {
    Error::MissingField(format!("{class}.{field}"))
}

fn check_dimensions(nb_rows: usize, nb_cols: usize, grid: &Grid) -> Result<()> {
    if (nb_rows, nb_cols) != (grid.nb_rows(), grid.nb_cols()) {
        return Err(Error::DimensionMismatch { expected: grid.nb_cells(), actual: nb_rows * nb_cols });
    }
    Ok(())
}

// ── Structures (solver output, generator input) ──────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureDocument {
    #[serde(rename = "nbRows")]
    pub nb_rows: usize,
    #[serde(rename = "nbCols")]
    pub nb_cols: usize,
    #[serde(rename = "maskRasterPath", default, skip_serializing_if = "Option::is_none")]
    pub mask_raster_path: Option<String>,
    #[serde(rename = "nonFocalPLAND", default)]
    pub non_focal_pland: Option<f64>,
    pub classes: Vec<ClassSummary>,
}

/// Only `name` and `AREA` are read back; the derived indices are informative.
/// Non-finite indices (a class without patches) are written as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassSummary {
    pub name: String,
    #[serde(rename = "CA", default)]
    pub ca: Option<i64>,
    #[serde(rename = "NP", default)]
    pub np: Option<usize>,
    #[serde(rename = "AREA", default)]
    pub area: Option<Vec<i64>>,
    #[serde(rename = "AREA_MN", default)]
    pub area_mn: Option<f64>,
    #[serde(rename = "NPRO", default)]
    pub npro: Option<i64>,
    #[serde(rename = "MESH", default)]
    pub mesh: Option<f64>,
    #[serde(rename = "SPLI", default)]
    pub spli: Option<f64>,
    #[serde(rename = "SDEN", default)]
    pub sden: Option<f64>,
    #[serde(rename = "COHE", default)]
    pub cohe: Option<f64>,
    #[serde(rename = "DIVI", default)]
    pub divi: Option<f64>,
    #[serde(rename = "PLAND", default)]
    pub pland: Option<f64>,
    #[serde(rename = "PD", default)]
    pub pd: Option<f64>,
    #[serde(rename = "SPI", default)]
    pub spi: Option<f64>,
    #[serde(rename = "LPI", default)]
    pub lpi: Option<f64>,
    #[serde(rename = "isSquare", default)]
    pub is_square: Option<bool>,
}

impl StructureDocument {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn finite(x: f64) -> Option<f64> {
    x.is_finite().then_some(x)
}

impl LandscapeStructure {
    pub fn to_document(&self) -> StructureDocument {
        let classes = (0..self.nb_classes())
            .map(|c| {
                let class = self.class(c);
                ClassSummary {
                    name: class.name().to_string(),
                    ca: Some(class.total_area()),
                    np: Some(class.nb_patches()),
                    area: Some(class.patch_sizes().to_vec()),
                    area_mn: finite(class.mean_patch_area()),
                    npro: Some(class.net_product()),
                    mesh: finite(self.effective_mesh_size(c)),
                    spli: finite(self.splitting_index(c)),
                    sden: finite(self.splitting_density(c)),
                    cohe: finite(self.degree_of_coherence(c)),
                    divi: finite(self.degree_of_division(c)),
                    pland: finite(self.proportion(c)),
                    pd: finite(self.patch_density(c)),
                    spi: finite(self.smallest_patch_index(c)),
                    lpi: finite(self.largest_patch_index(c)),
                    is_square: Some(self.is_square()),
                }
            })
            .collect();
        StructureDocument {
            nb_rows: self.nb_rows(),
            nb_cols: self.nb_cols(),
            mask_raster_path: self.mask_raster_path().map(str::to_string),
            non_focal_pland: finite(self.non_focal_proportion()),
            classes,
        }
    }

    /// Rebuild a structure over `grid`. Derived indices in the document are
    /// ignored, except that `NP` and `CA` must agree with `AREA` when present.
    pub fn from_document(doc: &StructureDocument, grid: &Grid) -> Result<Self> {
        check_dimensions(doc.nb_rows, doc.nb_cols, grid)?;
        let classes = doc
            .classes
            .iter()
            .map(|summary| {
                let sizes = summary.area.clone().ok_or_else(|| missing(&summary.name, "AREA"))?;
                let class = ClassStructure::new(summary.name.clone(), sizes)?;
                if summary.np.is_some_and(|np| np != class.nb_patches()) {
                    return Err(Error::InvalidDocument(format!(
                        "{}: NP does not match the number of patch sizes",
                        summary.name
                    )));
                }
                if summary.ca.is_some_and(|ca| ca != class.total_area()) {
                    return Err(Error::InvalidDocument(format!(
                        "{}: CA does not match the sum of patch sizes",
                        summary.name
                    )));
                }
                Ok(class)
            })
            .collect::<Result<Vec<_>>>()?;
        LandscapeStructure::new(
            doc.nb_rows,
            doc.nb_cols,
            grid.nb_valid_cells() as i64,
            doc.mask_raster_path.clone(),
            classes,
        )
    }

    pub fn from_json(json: &str, grid: &Grid) -> Result<Self> {
        Self::from_document(&StructureDocument::from_json(json)?, grid)
    }

    pub fn to_json(&self) -> Result<String> {
        self.to_document().to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::SolveOutcome;

    const TARGETS: &str = r#"{
        "nbRows": 40,
        "nbCols": 40,
        "classes": [
            { "name": "forest", "NP": [2, 6], "AREA": [50, 120], "PLAND": [10, 20], "patchesAllDifferent": true },
            { "name": "wetland", "NP": [1, 3], "AREA": [20, 60], "DIVI": [0.99, 1.0] }
        ]
    }"#;

    #[test]
    fn targets_drive_the_solver() {
        let grid = Grid::new(40, 40);
        let doc = TargetDocument::from_json(TARGETS).unwrap();
        assert_eq!(doc.classes[1].divi, Some([0.99, 1.0]));
        let mut solver = doc.into_solver(&grid).unwrap();
        solver.build().unwrap();
        let SolveOutcome::Found(s) = solver.find_solution(None).unwrap() else {
            panic!("targets should be feasible");
        };
        let pland = s.proportion(0);
        assert!((10.0..=20.0).contains(&pland), "PLAND {pland}");
        assert!(s.degree_of_division(1) >= 0.99);
    }

    #[test]
    fn missing_mandatory_fields_are_reported() {
        let grid = Grid::new(10, 10);
        let doc = TargetDocument::from_json(r#"{"nbRows":10,"nbCols":10,"classes":[{"name":"a","NP":[1,2]}]}"#).unwrap();
        match doc.into_solver(&grid) {
            Err(Error::MissingField(field)) => assert_eq!(field, "a.AREA"),
            other => panic!("expected a missing AREA, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn grid_mismatch_is_rejected() {
        let doc = TargetDocument::from_json(TARGETS).unwrap();
        assert!(matches!(doc.into_solver(&Grid::new(40, 41)), Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn document_round_trip_keeps_sizes_and_counts() {
        let grid = Grid::new(30, 20);
        let s = LandscapeStructure::new(
            30,
            20,
            600,
            Some("mask.tif".into()),
            vec![
                ClassStructure::new("a", vec![40, 12, 12]).unwrap(),
                ClassStructure::new("b", vec![]).unwrap(),
            ],
        )
        .unwrap();
        let json = s.to_json().unwrap();
        assert!(json.contains("\"AREA_MN\""), "{json}");
        assert!(json.contains("\"SPLI\": null"), "empty class has an infinite SPLI: {json}");
        let back = LandscapeStructure::from_json(&json, &grid).unwrap();
        assert_eq!(back, s);
        assert_eq!(back.class(0).patch_sizes(), &[12, 12, 40]);
    }

    #[test]
    fn inconsistent_summaries_are_rejected() {
        let grid = Grid::new(10, 10);
        let json = r#"{"nbRows":10,"nbCols":10,"classes":[{"name":"a","NP":3,"AREA":[4,5]}]}"#;
        assert!(matches!(LandscapeStructure::from_json(json, &grid), Err(Error::InvalidDocument(_))));
        let json = r#"{"nbRows":10,"nbCols":10,"classes":[{"name":"a","NP":1}]}"#;
        assert!(matches!(LandscapeStructure::from_json(json, &grid), Err(Error::MissingField(_))));
    }
}

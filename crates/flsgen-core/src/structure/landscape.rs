//! Immutable snapshot of a solved landscape structure and its landscape indices.
//!
//! `A` below is the landscape area: the number of valid (unmasked) cells.
//! Indices that divide by a net product of zero (a class with no patch) are
//! `f64::INFINITY`.
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassStructure {
    name: String,
    /// Present patches only, ascending.
    patch_sizes: Vec<i64>,
}

impl ClassStructure {
    pub fn new(name: impl Into<String>, mut patch_sizes: Vec<i64>) -> Result<Self> {
        let name = name.into();
        if let Some(&bad) = patch_sizes.iter().find(|&&s| s < 1) {
            return Err(Error::range(format!("{name}: patch size"), bad as f64, 1.0, f64::INFINITY));
        }
        patch_sizes.sort_unstable();
        Ok(Self { name, patch_sizes })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn patch_sizes(&self) -> &[i64] {
        &self.patch_sizes
    }

    /// NP
    pub fn nb_patches(&self) -> usize {
        self.patch_sizes.len()
    }

    /// CA
    pub fn total_area(&self) -> i64 {
        self.patch_sizes.iter().sum()
    }

    /// NPRO: `Σ size²`.
    pub fn net_product(&self) -> i64 {
        self.patch_sizes.iter().map(|s| s * s).sum()
    }

    pub fn smallest_patch(&self) -> Option<i64> {
        self.patch_sizes.first().copied()
    }

    pub fn largest_patch(&self) -> Option<i64> {
        self.patch_sizes.last().copied()
    }

    /// AREA_MN, 0 for an empty class.
    pub fn mean_patch_area(&self) -> f64 {
        if self.patch_sizes.is_empty() {
            0.0
        } else {
            self.total_area() as f64 / self.nb_patches() as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LandscapeStructure {
    nb_rows: usize,
    nb_cols: usize,
    landscape_area: i64,
    mask_raster_path: Option<String>,
    classes: Vec<ClassStructure>,
}

impl LandscapeStructure {
    /// Fails when the classes together need more cells than the landscape has.
    pub fn new(
        nb_rows: usize,
        nb_cols: usize,
        landscape_area: i64,
        mask_raster_path: Option<String>,
        classes: Vec<ClassStructure>,
    ) -> Result<Self> {
        let total: i64 = classes.iter().map(ClassStructure::total_area).sum();
        if total > landscape_area {
            return Err(Error::range("total class area", total as f64, 0.0, landscape_area as f64));
        }
        Ok(Self { nb_rows, nb_cols, landscape_area, mask_raster_path, classes })
    }

    pub fn nb_rows(&self) -> usize {
        self.nb_rows
    }

    pub fn nb_cols(&self) -> usize {
        self.nb_cols
    }

    pub fn landscape_area(&self) -> i64 {
        self.landscape_area
    }

    pub fn mask_raster_path(&self) -> Option<&str> {
        self.mask_raster_path.as_deref()
    }

    pub fn classes(&self) -> &[ClassStructure] {
        &self.classes
    }

    pub fn nb_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn class(&self, class: usize) -> &ClassStructure {
        &self.classes[class]
    }

    /// Grid with as many rows as columns.
    pub fn is_square(&self) -> bool {
        self.nb_rows == self.nb_cols
    }

    fn area(&self) -> f64 {
        self.landscape_area as f64
    }

    fn npro(&self, class: usize) -> f64 {
        self.classes[class].net_product() as f64
    }

    /// CA
    pub fn class_area(&self, class: usize) -> i64 {
        self.classes[class].total_area()
    }

    /// NP
    pub fn nb_patches(&self, class: usize) -> usize {
        self.classes[class].nb_patches()
    }

    /// AREA_MN
    pub fn mean_patch_area(&self, class: usize) -> f64 {
        self.classes[class].mean_patch_area()
    }

    /// NPRO
    pub fn net_product(&self, class: usize) -> i64 {
        self.classes[class].net_product()
    }

    /// PLAND: `100 · CA / A`.
    pub fn proportion(&self, class: usize) -> f64 {
        100.0 * self.class_area(class) as f64 / self.area()
    }

    /// PD: `NP / A`.
    pub fn patch_density(&self, class: usize) -> f64 {
        self.nb_patches(class) as f64 / self.area()
    }

    /// SPI: `100 · smallest / A`, 0 for an empty class.
    pub fn smallest_patch_index(&self, class: usize) -> f64 {
        self.classes[class].smallest_patch().map_or(0.0, |s| 100.0 * s as f64 / self.area())
    }

    /// LPI: `100 · largest / A`, 0 for an empty class.
    pub fn largest_patch_index(&self, class: usize) -> f64 {
        self.classes[class].largest_patch().map_or(0.0, |s| 100.0 * s as f64 / self.area())
    }

    /// MESH: `NPRO / A`.
    pub fn effective_mesh_size(&self, class: usize) -> f64 {
        self.npro(class) / self.area()
    }

    /// SPLI: `A² / NPRO`.
    pub fn splitting_index(&self, class: usize) -> f64 {
        self.area() * self.area() / self.npro(class)
    }

    /// SDEN: `A / NPRO`.
    pub fn splitting_density(&self, class: usize) -> f64 {
        self.area() / self.npro(class)
    }

    /// COHE: `NPRO / A²`.
    pub fn degree_of_coherence(&self, class: usize) -> f64 {
        self.npro(class) / (self.area() * self.area())
    }

    /// DIVI: `1 − COHE`.
    pub fn degree_of_division(&self, class: usize) -> f64 {
        1.0 - self.degree_of_coherence(class)
    }

    /// Percentage of the landscape left to no class.
    pub fn non_focal_proportion(&self) -> f64 {
        let focal: i64 = self.classes.iter().map(ClassStructure::total_area).sum();
        100.0 * (self.landscape_area - focal) as f64 / self.area()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample() -> LandscapeStructure {
        LandscapeStructure::new(
            10,
            10,
            100,
            None,
            vec![
                ClassStructure::new("a", vec![30, 10]).unwrap(),
                ClassStructure::new("b", vec![]).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn class_summaries() {
        let s = sample();
        let a = s.class(0);
        assert_eq!(a.patch_sizes(), &[10, 30], "sorted ascending");
        assert_eq!(a.total_area(), 40);
        assert_eq!(a.net_product(), 1000);
        assert_relative_eq!(a.mean_patch_area(), 20.0);
        assert_eq!(s.class(1).mean_patch_area(), 0.0);
    }

    #[test]
    fn indices_follow_their_definitions() {
        let s = sample();
        assert_relative_eq!(s.proportion(0), 40.0);
        assert_relative_eq!(s.patch_density(0), 0.02);
        assert_relative_eq!(s.smallest_patch_index(0), 10.0);
        assert_relative_eq!(s.largest_patch_index(0), 30.0);
        assert_relative_eq!(s.effective_mesh_size(0), 10.0);
        assert_relative_eq!(s.splitting_index(0), 10.0);
        assert_relative_eq!(s.splitting_density(0), 0.1);
        assert_relative_eq!(s.degree_of_coherence(0), 0.1);
        assert_relative_eq!(s.degree_of_division(0), 0.9);
        assert_relative_eq!(s.non_focal_proportion(), 60.0);
        assert!(s.is_square());
    }

    #[test]
    fn empty_class_indices() {
        let s = sample();
        assert_eq!(s.largest_patch_index(1), 0.0);
        assert!(s.splitting_index(1).is_infinite());
        assert_relative_eq!(s.degree_of_division(1), 1.0);
    }

    #[test]
    fn rejects_overfull_and_empty_patches() {
        assert!(ClassStructure::new("a", vec![3, 0]).is_err());
        let big = ClassStructure::new("a", vec![60, 50]).unwrap();
        assert!(LandscapeStructure::new(10, 10, 100, None, vec![big]).is_err());
    }
}

//! Per-class decision variables and ecological targets.
//!
//! A class owns `max_patches` patch-size variables with domain
//! `[0, max_patch_size]`, where `0` is an absent patch. Sizes are kept
//! non-increasing, so present patches form a prefix and exactly `count` of
//! them are nonzero; this removes the permutation symmetry between patches.
//!
//! Index targets are translated into bounds on the total area, the patch
//! count, individual patch sizes, or the net product `Σ size²`:
//!
//! | target | constraint (A = landscape area in cells)      |
//! |--------|-----------------------------------------------|
//! | CA     | `total ∈ [a, b]`                              |
//! | PLAND  | `total ∈ [a·A/100, b·A/100]`                  |
//! | PD     | `count ∈ [a·A, b·A]`                          |
//! | SPI    | smallest present patch in `[a·A/100, b·A/100]`|
//! | LPI    | largest patch in `[a·A/100, b·A/100]`         |
//! | NPRO   | `Σ size² ∈ [a, b]`                            |
//! | MESH   | `Σ size² ∈ [a·A, b·A]`                        |
//! | SPLI   | `Σ size² ∈ [A²/b, A²/a]`                      |
//! | SDEN   | `Σ size² ∈ [A/b, A/a]`                        |
//! | COHE   | `Σ size² ∈ [a·A², b·A²]`                      |
//! | DIVI   | COHE `[1 − b, 1 − a]`                         |
use log::warn;

use crate::cp::{
    AllDifferentExceptZero, CountNonZero, ExistsInRange, LessOrEqual, LinearSum, Model, SumOfSquares, VarId,
    ZeroOrAtLeast,
};
use crate::error::{check_order, check_range, Error, Result};

/// Relative slack applied before rounding real-valued bounds to cells, so
/// that e.g. `25.000000000004` still rounds up to 25.
const ROUNDING_EPS: f64 = 1e-9;

pub(crate) fn ceil_cells(x: f64) -> i64 {
    if x >= i64::MAX as f64 {
        return i64::MAX;
    }
    (x - ROUNDING_EPS * x.abs().max(1.0)).ceil() as i64
}

pub(crate) fn floor_cells(x: f64) -> i64 {
    if x >= i64::MAX as f64 {
        return i64::MAX;
    }
    (x + ROUNDING_EPS * x.abs().max(1.0)).floor() as i64
}

#[derive(Debug, Clone)]
pub struct LandscapeClass {
    name: String,
    min_patches: usize,
    max_patches: usize,
    min_patch_size: i64,
    max_patch_size: i64,
    patch_sizes: Vec<VarId>,
    count: VarId,
    total_area: VarId,
    all_different: bool,
}

impl LandscapeClass {
    /// Declare the variables of a class and post its structural constraints.
    pub(crate) fn declare(
        model: &mut Model,
        name: &str,
        patches: (usize, usize),
        patch_size: (i64, i64),
        landscape_area: i64,
    ) -> Result<Self> {
        let (min_patches, max_patches) = patches;
        let (min_size, max_size) = patch_size;
        check_order(&format!("{name}: NP"), min_patches as f64, max_patches as f64)?;
        check_order(&format!("{name}: AREA"), min_size as f64, max_size as f64)?;
        if min_size < 1 {
            return Err(Error::range(format!("{name}: AREA"), min_size as f64, 1.0, landscape_area as f64));
        }
        if max_size > landscape_area {
            warn!("{name}: maximum patch size {max_size} exceeds the landscape area {landscape_area}");
        }
        let max_size = max_size.min(landscape_area);

        let patch_sizes = model.new_vars(&format!("{name}.size"), max_patches, 0, max_size);
        for &x in &patch_sizes {
            model.post(ZeroOrAtLeast::new(x, min_size));
        }
        for w in patch_sizes.windows(2) {
            model.post(LessOrEqual::new(w[1], w[0]));
        }

        let count = model.new_var(format!("{name}.count"), min_patches as i64, max_patches as i64);
        model.post(CountNonZero::new(patch_sizes.clone(), count, true));

        let max_total = (max_patches as i64).saturating_mul(max_size).min(landscape_area);
        let total_area = model.new_var(format!("{name}.total"), 0, max_total);
        model.post(LinearSum::sum_eq_var(&patch_sizes, total_area));

        Ok(Self {
            name: name.to_string(),
            min_patches,
            max_patches,
            min_patch_size: min_size,
            max_patch_size: max_size,
            patch_sizes,
            count,
            total_area,
            all_different: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_patches(&self) -> usize {
        self.min_patches
    }

    pub fn max_patches(&self) -> usize {
        self.max_patches
    }

    pub fn min_patch_size(&self) -> i64 {
        self.min_patch_size
    }

    pub fn max_patch_size(&self) -> i64 {
        self.max_patch_size
    }

    pub fn patch_sizes(&self) -> &[VarId] {
        &self.patch_sizes
    }

    pub fn count(&self) -> VarId {
        self.count
    }

    pub fn total_area(&self) -> VarId {
        self.total_area
    }

    pub fn patches_all_different(&self) -> bool {
        self.all_different
    }
}

/// Mutable view of one class inside a solver that has not been built yet.
#[derive(Debug)]
pub struct ClassModel<'a> {
    pub(crate) model: &'a mut Model,
    pub(crate) class: &'a mut LandscapeClass,
    pub(crate) landscape_area: i64,
}

impl ClassModel<'_> {
    fn what(&self, index: &str) -> String {
        format!("{}: {index}", self.class.name)
    }

    fn area(&self) -> f64 {
        self.landscape_area as f64
    }

    /// CA: total class area in cells.
    pub fn set_class_area(&mut self, min: i64, max: i64) -> Result<&mut Self> {
        check_order(&self.what("CA"), min as f64, max as f64)?;
        if min < 0 {
            return Err(Error::range(self.what("CA"), min as f64, 0.0, self.area()));
        }
        self.model.restrict(self.class.total_area, min, max);
        Ok(self)
    }

    /// PLAND: percentage of the landscape covered by the class.
    pub fn set_landscape_proportion(&mut self, min: f64, max: f64) -> Result<&mut Self> {
        check_range(&self.what("PLAND"), min, max, 0.0, 100.0)?;
        let a = self.area();
        self.model.restrict(self.class.total_area, ceil_cells(min * a / 100.0), floor_cells(max * a / 100.0));
        Ok(self)
    }

    /// PD: number of patches per landscape cell.
    pub fn set_patch_density(&mut self, min: f64, max: f64) -> Result<&mut Self> {
        check_range(&self.what("PD"), min, max, 0.0, 1.0)?;
        let a = self.area();
        self.model.restrict(self.class.count, ceil_cells(min * a), floor_cells(max * a));
        Ok(self)
    }

    /// SPI: smallest patch as a percentage of the landscape.
    pub fn set_smallest_patch_index(&mut self, min: f64, max: f64) -> Result<&mut Self> {
        check_range(&self.what("SPI"), min, max, 0.0, 100.0)?;
        let a = self.area();
        let (lo, hi) = (ceil_cells(min * a / 100.0).max(1), floor_cells(max * a / 100.0));
        for &x in &self.class.patch_sizes {
            self.model.post(ZeroOrAtLeast::new(x, lo));
        }
        self.model.post(ExistsInRange::new(self.class.patch_sizes.clone(), lo, hi));
        Ok(self)
    }

    /// LPI: largest patch as a percentage of the landscape.
    pub fn set_largest_patch_index(&mut self, min: f64, max: f64) -> Result<&mut Self> {
        check_range(&self.what("LPI"), min, max, 0.0, 100.0)?;
        let a = self.area();
        let (lo, hi) = (ceil_cells(min * a / 100.0).max(1), floor_cells(max * a / 100.0));
        for &x in &self.class.patch_sizes {
            self.model.restrict(x, 0, hi);
        }
        self.model.post(ExistsInRange::new(self.class.patch_sizes.clone(), lo, hi));
        Ok(self)
    }

    /// NPRO: net product `Σ size²`, the quantity behind every index below.
    pub fn set_net_product(&mut self, min: i64, max: i64) -> Result<&mut Self> {
        check_order(&self.what("NPRO"), min as f64, max as f64)?;
        if min < 0 {
            return Err(Error::range(self.what("NPRO"), min as f64, 0.0, f64::INFINITY));
        }
        self.model.post(SumOfSquares::new(self.class.patch_sizes.clone(), min, max));
        Ok(self)
    }

    /// MESH: effective mesh size `Σ size² / A`.
    pub fn set_mesh(&mut self, min: f64, max: f64) -> Result<&mut Self> {
        check_range(&self.what("MESH"), min, max, 0.0, self.area())?;
        let a = self.area();
        self.set_net_product(ceil_cells(min * a), floor_cells(max * a))
    }

    /// SPLI: splitting index `A² / Σ size²`.
    pub fn set_splitting_index(&mut self, min: f64, max: f64) -> Result<&mut Self> {
        check_range(&self.what("SPLI"), min, max, 0.0, f64::INFINITY)?;
        let a2 = self.area() * self.area();
        self.set_net_product(reciprocal_lower(a2, max), reciprocal_upper(a2, min))
    }

    /// SDEN: splitting density `A / Σ size²`.
    pub fn set_splitting_density(&mut self, min: f64, max: f64) -> Result<&mut Self> {
        check_range(&self.what("SDEN"), min, max, 0.0, f64::INFINITY)?;
        let a = self.area();
        self.set_net_product(reciprocal_lower(a, max), reciprocal_upper(a, min))
    }

    /// COHE: degree of coherence `Σ size² / A²`.
    pub fn set_degree_of_coherence(&mut self, min: f64, max: f64) -> Result<&mut Self> {
        check_range(&self.what("COHE"), min, max, 0.0, 1.0)?;
        let a2 = self.area() * self.area();
        self.set_net_product(ceil_cells(min * a2), floor_cells(max * a2))
    }

    /// DIVI: degree of landscape division `1 − COHE`.
    pub fn set_degree_of_division(&mut self, min: f64, max: f64) -> Result<&mut Self> {
        check_range(&self.what("DIVI"), min, max, 0.0, 1.0)?;
        self.set_degree_of_coherence(1.0 - max, 1.0 - min)
    }

    /// Force pairwise distinct sizes among present patches.
    pub fn set_patches_all_different(&mut self, all_different: bool) -> Result<&mut Self> {
        if all_different && !self.class.all_different {
            self.model.post(AllDifferentExceptZero::new(self.class.patch_sizes.clone(), true));
            self.class.all_different = true;
        }
        Ok(self)
    }
}

/// Lower net-product bound for a target `num / Σ size² ≤ max`.
fn reciprocal_lower(num: f64, max: f64) -> i64 {
    if max.is_infinite() { 0 } else { ceil_cells(num / max) }
}

/// Upper net-product bound for a target `num / Σ size² ≥ min`.
fn reciprocal_upper(num: f64, min: f64) -> i64 {
    if min <= 0.0 { i64::MAX } else { floor_cells(num / min) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_tolerates_float_noise() {
        assert_eq!(ceil_cells(25.000000000004), 25);
        assert_eq!(ceil_cells(25.1), 26);
        assert_eq!(floor_cells(24.999999999996), 25);
        assert_eq!(floor_cells(24.9), 24);
        assert_eq!(floor_cells(f64::INFINITY), i64::MAX);
    }

    #[test]
    fn reciprocal_bounds_are_open_ended_at_the_limits() {
        assert_eq!(reciprocal_upper(100.0, 0.0), i64::MAX);
        assert_eq!(reciprocal_lower(100.0, f64::INFINITY), 0);
        assert_eq!(reciprocal_lower(100.0, 3.0), 34);
        assert_eq!(reciprocal_upper(100.0, 3.0), 33);
    }

    #[test]
    fn declaration_validates_bounds() {
        let mut m = Model::new();
        assert!(LandscapeClass::declare(&mut m, "a", (3, 2), (1, 5), 100).is_err());
        assert!(LandscapeClass::declare(&mut m, "a", (1, 2), (6, 5), 100).is_err());
        assert!(LandscapeClass::declare(&mut m, "a", (1, 2), (0, 5), 100).is_err());
        let c = LandscapeClass::declare(&mut m, "a", (1, 4), (2, 500), 100).unwrap();
        assert_eq!(c.patch_sizes().len(), 4);
        assert_eq!(c.max_patch_size(), 100, "clamped to the landscape");
    }

    #[test]
    fn setters_reject_out_of_range_targets() {
        let mut m = Model::new();
        let mut class = LandscapeClass::declare(&mut m, "forest", (1, 4), (2, 50), 100).unwrap();
        let mut cm = ClassModel { model: &mut m, class: &mut class, landscape_area: 100 };
        assert!(cm.set_landscape_proportion(10.0, 120.0).is_err());
        assert!(cm.set_degree_of_coherence(0.5, 0.2).is_err());
        assert!(cm.set_degree_of_division(-0.1, 0.2).is_err());
        assert!(cm.set_class_area(-1, 5).is_err());
        assert!(cm.set_net_product(10, 5).is_err());
        let err = cm.set_patch_density(0.2, 0.1).unwrap_err();
        assert!(err.to_string().contains("forest: PD"), "{err}");
    }

    #[test]
    fn proportion_restricts_total_area() {
        let mut m = Model::new();
        let mut class = LandscapeClass::declare(&mut m, "c", (1, 10), (1, 100), 250).unwrap();
        let total = class.total_area();
        let mut cm = ClassModel { model: &mut m, class: &mut class, landscape_area: 250 };
        cm.set_landscape_proportion(10.0, 20.0).unwrap();
        assert_eq!((m.lb(total), m.ub(total)), (25, 50));
    }
}

//! Landscape generator: paints a [`LandscapeStructure`] onto a grid.
//!
//! Every attempt starts from an empty raster and grows the classes in
//! structure order, largest patch first. A patch is seeded on a random
//! available cell and grown cell by cell from its frontier, guided by terrain
//! elevation. A patch that cannot reach its size is unpainted and retried up
//! to `max_try_patch` times; a patch that keeps failing restarts the whole
//! attempt, up to `max_try` attempts.
//!
//! After a patch succeeds, its `buffer` neighborhood is removed from the
//! class pool so later patches of the same class never touch it. The
//! `class_buffer` neighborhood of a finished class is closed to every later
//! class, so no two classes meet within it.
pub mod pool;

use std::collections::VecDeque;
use std::ops::Range;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{check_range, Error, Result};
use crate::grid::Grid;
use crate::neighborhood::{Connectivity, Neighborhood};
use crate::structure::LandscapeStructure;
use crate::terrain::Terrain;
use pool::CellPool;

/// Raster value of a valid cell no class was painted on.
pub const EMPTY: i32 = -1;
/// Raster value of a masked cell.
pub const NO_DATA: i32 = -2;

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrowthStrategy {
    /// Pick among the lowest-elevation cells of the whole frontier.
    #[default]
    FromAllPlacedCells,
    /// Walk back from the most recent cell and take the highest-elevation
    /// free neighbour of the first cell that has one. Gives elongated patches.
    FromLastPossibleCell,
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Adjacency patches grow through. Default 4-connected.
    pub neighborhood: Neighborhood,
    /// Kept free around a finished patch for later patches of the same class.
    /// Must reach at least the growth adjacency. Default 4-connected.
    pub buffer: Neighborhood,
    /// Kept free around a finished class for all later classes. Default
    /// 4-connected; `None` lets classes touch.
    pub class_buffer: Option<Neighborhood>,
    /// Unpainted cells must stay one connected region. Default false.
    pub no_hole: bool,
    pub strategy: GrowthStrategy,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            neighborhood: Neighborhood::four(),
            buffer: Neighborhood::four(),
            class_buffer: Some(Neighborhood::four()),
            no_hole: false,
            strategy: GrowthStrategy::default(),
        }
    }
}

/// Terrain dependency and retry limits of one `generate` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationBudget {
    /// 0 grows at random, 1 always takes the lowest frontier cell. Default 0.5.
    pub terrain_dependency: f64,
    /// Full restarts. Default 2.
    pub max_try: usize,
    /// Attempts per patch before restarting. Default 10.
    pub max_try_patch: usize,
}

impl Default for GenerationBudget {
    fn default() -> Self {
        Self { terrain_dependency: 0.5, max_try: 2, max_try_patch: 10 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub success: bool,
    /// Attempts used, `1..=max_try`.
    pub tries: usize,
}

// ── Generator ─────────────────────────────────────────────────────────────────

pub struct LandscapeGenerator<'a, R: Rng> {
    structure: &'a LandscapeStructure,
    grid: &'a Grid,
    terrain: &'a Terrain,
    config: GeneratorConfig,
    rng: R,
    raster: Vec<i32>,
    /// Closed to the current class by an earlier class buffer.
    blocked: Vec<bool>,
    /// Cells the current class may still paint.
    pool: CellPool,
    current: Option<usize>,
    /// Cells of the patch being grown, in placement order.
    placed: Vec<usize>,
    frontier: Vec<usize>,
    in_frontier: Vec<bool>,
    rejected: Vec<usize>,
    neighbors: Vec<usize>,
    stamp: Vec<u32>,
    epoch: u32,
}

impl<'a, R: Rng> LandscapeGenerator<'a, R> {
    pub fn new(
        structure: &'a LandscapeStructure,
        grid: &'a Grid,
        terrain: &'a Terrain,
        config: GeneratorConfig,
        rng: R,
    ) -> Result<Self> {
        if (structure.nb_rows(), structure.nb_cols()) != (grid.nb_rows(), grid.nb_cols()) {
            return Err(Error::DimensionMismatch {
                expected: grid.nb_cells(),
                actual: structure.nb_rows() * structure.nb_cols(),
            });
        }
        if terrain.data.len() != grid.nb_cells() {
            return Err(Error::DimensionMismatch { expected: grid.nb_cells(), actual: terrain.data.len() });
        }
        if !config.buffer.covers(&config.neighborhood) {
            return Err(Error::InvalidConfig(format!(
                "buffer {:?} does not cover the growth neighborhood {:?}, patches of one class would merge",
                config.buffer, config.neighborhood
            )));
        }
        let painted: i64 = structure.classes().iter().map(|c| c.total_area()).sum();
        let area = grid.nb_valid_cells() as i64;
        if painted > area {
            return Err(Error::range("total class area", painted as f64, 0.0, area as f64));
        }
        let n = grid.nb_cells();
        let mut generator = Self {
            structure,
            grid,
            terrain,
            config,
            rng,
            raster: Vec::new(),
            blocked: Vec::new(),
            pool: CellPool::new(n),
            current: None,
            placed: Vec::new(),
            frontier: Vec::new(),
            in_frontier: vec![false; n],
            rejected: Vec::new(),
            neighbors: Vec::new(),
            stamp: vec![0; n],
            epoch: 0,
        };
        generator.reset();
        Ok(generator)
    }

    /// Class index per cell, [`EMPTY`] or [`NO_DATA`].
    pub fn raster(&self) -> &[i32] {
        &self.raster
    }

    pub fn into_raster(self) -> Vec<i32> {
        self.raster
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Fresh raster: every valid cell empty, nothing blocked.
    pub fn reset(&mut self) {
        let n = self.grid.nb_cells();
        self.raster = vec![NO_DATA; n];
        for i in self.grid.valid_cells() {
            self.raster[i] = EMPTY;
        }
        self.blocked = vec![false; n];
        self.pool.clear();
        self.current = None;
    }

    /// Paint the whole structure, restarting at most `max_try` times.
    pub fn generate(
        &mut self,
        terrain_dependency: f64,
        max_try: usize,
        max_try_patch: usize,
    ) -> Result<GenerationOutcome> {
        check_range("terrain dependency", terrain_dependency, terrain_dependency, 0.0, 1.0)?;
        if max_try == 0 {
            return Err(Error::range("max tries", 0.0, 1.0, f64::INFINITY));
        }
        if max_try_patch == 0 {
            return Err(Error::range("max tries per patch", 0.0, 1.0, f64::INFINITY));
        }
        for tries in 1..=max_try {
            self.reset();
            if self.attempt(terrain_dependency, max_try_patch) {
                info!("landscape generated in {tries} attempt(s)");
                return Ok(GenerationOutcome { success: true, tries });
            }
            debug!("generation attempt {tries}/{max_try} failed");
        }
        info!("no landscape after {max_try} attempt(s)");
        Ok(GenerationOutcome { success: false, tries: max_try })
    }

    fn attempt(&mut self, terrain_dependency: f64, max_try_patch: usize) -> bool {
        let structure = self.structure;
        for (class, target) in structure.classes().iter().enumerate() {
            self.start_class(class);
            let mut class_cells = Vec::with_capacity(target.total_area() as usize);
            for &size in target.patch_sizes().iter().rev() {
                let grown = (0..max_try_patch).any(|_| self.generate_patch(class, size as usize, terrain_dependency));
                if !grown {
                    debug!("class {}: no room for a patch of {size} cells", target.name());
                    return false;
                }
                class_cells.extend_from_slice(&self.placed);
            }
            self.close_class(&class_cells);
        }
        true
    }

    /// Make `class` current and fill its pool with every empty, unblocked cell.
    fn start_class(&mut self, class: usize) {
        self.current = Some(class);
        self.pool.clear();
        for i in self.grid.valid_cells() {
            if self.raster[i] == EMPTY && !self.blocked[i] {
                self.pool.insert(i);
            }
        }
    }

    fn close_class(&mut self, cells: &[usize]) {
        let Some(buffer) = &self.config.class_buffer else {
            return;
        };
        for &c in cells {
            buffer.neighbors_into(self.grid, c, &mut self.rng, &mut self.neighbors);
            for &n in &self.neighbors {
                self.blocked[n] = true;
            }
        }
    }

    /// Grow one patch of `size` cells for `class`. On failure the raster and
    /// the class pool are left exactly as they were.
    pub fn generate_patch(&mut self, class: usize, size: usize, terrain_dependency: f64) -> bool {
        if self.current != Some(class) {
            self.start_class(class);
        }
        self.placed.clear();
        if size == 0 {
            return true;
        }
        if self.pool.len() < size {
            return false;
        }
        let Some(seed) = self.pool.random(&mut self.rng) else {
            return false;
        };
        if self.config.no_hole && self.splits_empty_region(seed) {
            return false;
        }
        self.paint(seed, class);

        while self.placed.len() < size {
            let next = match self.config.strategy {
                GrowthStrategy::FromAllPlacedCells => self.next_from_frontier(terrain_dependency),
                GrowthStrategy::FromLastPossibleCell => self.next_from_last_cell(),
            };
            match next {
                Some(cell) => self.paint(cell, class),
                None => {
                    self.undo_patch();
                    return false;
                }
            }
        }
        self.clear_frontier();

        for k in 0..self.placed.len() {
            let c = self.placed[k];
            self.config.buffer.neighbors_into(self.grid, c, &mut self.rng, &mut self.neighbors);
            for &n in &self.neighbors {
                self.pool.remove(n);
            }
        }
        true
    }

    fn paint(&mut self, cell: usize, class: usize) {
        self.raster[cell] = class as i32;
        self.pool.remove(cell);
        self.placed.push(cell);
        if self.config.strategy != GrowthStrategy::FromAllPlacedCells {
            return;
        }
        self.config.neighborhood.neighbors_into(self.grid, cell, &mut self.rng, &mut self.neighbors);
        for &n in &self.neighbors {
            if self.pool.contains(n) && !self.in_frontier[n] {
                self.in_frontier[n] = true;
                self.frontier.push(n);
            }
        }
    }

    fn undo_patch(&mut self) {
        for &c in &self.placed {
            self.raster[c] = EMPTY;
            self.pool.insert(c);
        }
        self.placed.clear();
        self.clear_frontier();
    }

    fn clear_frontier(&mut self) {
        for &c in self.frontier.iter().chain(&self.rejected) {
            self.in_frontier[c] = false;
        }
        self.frontier.clear();
        self.rejected.clear();
    }

    /// Uniform pick among the `max(1, round(|frontier|·(1 − td)))` lowest
    /// frontier cells. Cells that would leave a hole wait in `rejected` until
    /// another cell has been placed.
    fn next_from_frontier(&mut self, terrain_dependency: f64) -> Option<usize> {
        let terrain = self.terrain;
        while !self.frontier.is_empty() {
            let len = self.frontier.len();
            let k = ((len as f64 * (1.0 - terrain_dependency)).round() as usize).clamp(1, len);
            if k < len {
                self.frontier
                    .select_nth_unstable_by(k - 1, |&a, &b| terrain.elevation(a).total_cmp(&terrain.elevation(b)));
            }
            let i = self.rng.gen_range(0..k);
            let cell = self.frontier.swap_remove(i);
            if self.config.no_hole && self.splits_empty_region(cell) {
                self.rejected.push(cell);
                continue;
            }
            self.in_frontier[cell] = false;
            self.frontier.append(&mut self.rejected);
            return Some(cell);
        }
        None
    }

    fn next_from_last_cell(&mut self) -> Option<usize> {
        let terrain = self.terrain;
        for k in (0..self.placed.len()).rev() {
            let p = self.placed[k];
            self.config.neighborhood.neighbors_into(self.grid, p, &mut self.rng, &mut self.neighbors);
            let mut candidates: Vec<usize> = self.neighbors.iter().copied().filter(|&n| self.pool.contains(n)).collect();
            candidates.sort_by(|&a, &b| terrain.elevation(b).total_cmp(&terrain.elevation(a)));
            for cell in candidates {
                if !self.config.no_hole || !self.splits_empty_region(cell) {
                    return Some(cell);
                }
            }
        }
        None
    }

    /// Would painting `cell` split the unpainted region around it?
    ///
    /// The empty neighbours of `cell` must stay connected without it. When they
    /// are already connected through the surrounding ring of 8 cells the answer
    /// is immediate; otherwise a breadth-first traversal of the empty region
    /// looks for the ones not joined locally.
    fn splits_empty_region(&mut self, cell: usize) -> bool {
        let base = self.config.neighborhood.base();
        let ring: Vec<((isize, isize), usize)> = Connectivity::Eight
            .offsets()
            .iter()
            .filter_map(|&o| self.grid.offset(cell, o.0, o.1).map(|j| (o, j)))
            .filter(|&(_, j)| self.raster[j] == EMPTY)
            .collect();
        let targets: Vec<usize> =
            (0..ring.len()).filter(|&k| base.offsets().contains(&ring[k].0)).collect();
        if targets.len() <= 1 {
            return false;
        }

        // Components of the ring under the base adjacency.
        let mut comp: Vec<usize> = (0..ring.len()).collect();
        let mut merged = true;
        while merged {
            merged = false;
            for a in 0..ring.len() {
                for b in a + 1..ring.len() {
                    if comp[a] != comp[b] && base.touches(ring[a].0, ring[b].0) {
                        let (keep, drop) = (comp[a].min(comp[b]), comp[a].max(comp[b]));
                        comp.iter_mut().filter(|c| **c == drop).for_each(|c| *c = keep);
                        merged = true;
                    }
                }
            }
        }
        let first = comp[targets[0]];
        let apart: Vec<usize> = targets.iter().filter(|&&k| comp[k] != first).map(|&k| ring[k].1).collect();
        if apart.is_empty() {
            return false;
        }

        self.epoch = self.epoch.wrapping_add(1);
        if self.epoch == 0 {
            self.stamp.iter_mut().for_each(|s| *s = 0);
            self.epoch = 1;
        }
        let epoch = self.epoch;
        self.stamp[cell] = epoch;
        let start = ring[targets[0]].1;
        self.stamp[start] = epoch;
        let mut queue = VecDeque::from([start]);
        let mut missing = apart.len();
        while let Some(i) = queue.pop_front() {
            for j in base.adjacent(self.grid, i) {
                if self.stamp[j] == epoch || self.raster[j] != EMPTY {
                    continue;
                }
                self.stamp[j] = epoch;
                if apart.contains(&j) {
                    missing -= 1;
                    if missing == 0 {
                        return false;
                    }
                }
                queue.push_back(j);
            }
        }
        true
    }
}

// ── Batch generation ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GeneratedLandscape {
    pub seed: u64,
    pub outcome: GenerationOutcome,
    pub raster: Vec<i32>,
}

/// One independent landscape per seed, each with its own `StdRng`. Runs in
/// parallel with the `threading` feature.
pub fn generate_batch(
    structure: &LandscapeStructure,
    grid: &Grid,
    terrain: &Terrain,
    config: &GeneratorConfig,
    budget: &GenerationBudget,
    seeds: Range<u64>,
) -> Result<Vec<GeneratedLandscape>> {
    let run = |seed: u64| -> Result<GeneratedLandscape> {
        let rng = StdRng::seed_from_u64(seed);
        let mut generator = LandscapeGenerator::new(structure, grid, terrain, config.clone(), rng)?;
        let outcome = generator.generate(budget.terrain_dependency, budget.max_try, budget.max_try_patch)?;
        Ok(GeneratedLandscape { seed, outcome, raster: generator.into_raster() })
    };

    #[cfg(feature = "threading")]
    {
        use rayon::prelude::*;
        seeds.into_par_iter().map(run).collect()
    }
    #[cfg(not(feature = "threading"))]
    {
        seeds.map(run).collect()
    }
}

//! Landscape structure solver.
//!
//! Classes and their targets are declared first, then [`StructureSolver::build`]
//! posts the landscape-wide constraints and freezes the model. Each call to
//! [`StructureSolver::find_solution`] afterwards returns a structure distinct
//! from every one returned before.
use std::time::{Duration, Instant};

use log::{debug, info};

use super::class::{ClassModel, LandscapeClass};
use super::landscape::{ClassStructure, LandscapeStructure};
use crate::cp::{LinearSum, Model, Relation, Search, SearchOutcome, SearchStrategy, Solution, VarId};
use crate::error::{Error, Result};
use crate::grid::Grid;

/// Result of one solver call.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    Found(LandscapeStructure),
    /// No (further) structure satisfies the targets.
    Infeasible,
    /// The time limit elapsed before a structure or a proof of infeasibility.
    TimedOut,
}

impl SolveOutcome {
    pub fn structure(self) -> Option<LandscapeStructure> {
        match self {
            SolveOutcome::Found(s) => Some(s),
            _ => None,
        }
    }
}

enum State {
    Modelling(Model),
    Built(Search),
}

pub struct StructureSolver {
    nb_rows: usize,
    nb_cols: usize,
    landscape_area: i64,
    mask_raster_path: Option<String>,
    classes: Vec<LandscapeClass>,
    strategy: SearchStrategy,
    seed: u64,
    state: State,
}

impl StructureSolver {
    pub fn new(grid: &Grid) -> Self {
        Self {
            nb_rows: grid.nb_rows(),
            nb_cols: grid.nb_cols(),
            landscape_area: grid.nb_valid_cells() as i64,
            mask_raster_path: None,
            classes: Vec::new(),
            strategy: SearchStrategy::default(),
            seed: 0,
            state: State::Modelling(Model::new()),
        }
    }

    pub fn landscape_area(&self) -> i64 {
        self.landscape_area
    }

    pub fn classes(&self) -> &[LandscapeClass] {
        &self.classes
    }

    pub fn is_built(&self) -> bool {
        matches!(self.state, State::Built(_))
    }

    fn model_mut(&mut self) -> Result<&mut Model> {
        match &mut self.state {
            State::Modelling(model) => Ok(model),
            State::Built(_) => Err(Error::AlreadyBuilt),
        }
    }

    /// Path recorded in output documents so a structure can be replayed on
    /// the same mask.
    pub fn set_mask_raster_path(&mut self, path: impl Into<String>) {
        self.mask_raster_path = Some(path.into());
    }

    pub fn set_search_strategy(&mut self, strategy: SearchStrategy) {
        self.strategy = strategy;
        if let State::Built(search) = &mut self.state {
            search.set_strategy(strategy);
        }
    }

    /// Seed of the `Random` strategy. Only effective before `build`.
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    /// Declare a class with `patches` = (min, max) patch count and
    /// `patch_size` = (min, max) cells per patch. Returns the class id.
    pub fn add_class(&mut self, name: &str, patches: (usize, usize), patch_size: (i64, i64)) -> Result<usize> {
        let area = self.landscape_area;
        let model = self.model_mut()?;
        let class = LandscapeClass::declare(model, name, patches, patch_size, area)?;
        self.classes.push(class);
        Ok(self.classes.len() - 1)
    }

    /// Targets of a declared class.
    pub fn class_mut(&mut self, class: usize) -> Result<ClassModel<'_>> {
        let landscape_area = self.landscape_area;
        let State::Modelling(model) = &mut self.state else {
            return Err(Error::AlreadyBuilt);
        };
        let nb = self.classes.len();
        let class = self
            .classes
            .get_mut(class)
            .ok_or_else(|| Error::range("class id", class as f64, 0.0, nb as f64 - 1.0))?;
        Ok(ClassModel { model, class, landscape_area })
    }

    /// Post landscape-wide constraints and prepare the search.
    pub fn build(&mut self) -> Result<()> {
        let State::Modelling(model) = &mut self.state else {
            return Err(Error::AlreadyBuilt);
        };
        let mut model = std::mem::take(model);

        let totals: Vec<VarId> = self.classes.iter().map(LandscapeClass::total_area).collect();
        model.post(LinearSum::sum(&totals, Relation::Le, self.landscape_area));

        // Room left to a class once every other class has its minimum footprint.
        let reserved: Vec<i64> = self
            .classes
            .iter()
            .map(|c| c.min_patches() as i64 * c.min_patch_size())
            .collect();
        let all_reserved: i64 = reserved.iter().sum();
        for (class, own) in self.classes.iter().zip(&reserved) {
            model.restrict(class.total_area(), 0, self.landscape_area - (all_reserved - own));
        }

        let decision_vars: Vec<VarId> = self.classes.iter().flat_map(|c| c.patch_sizes().iter().copied()).collect();
        info!(
            "structure model: {} classes, {} variables, {} constraints, landscape area {}",
            self.classes.len(),
            model.nb_vars(),
            model.nb_propagators(),
            self.landscape_area
        );
        self.state = State::Built(Search::new(model, decision_vars, self.strategy, self.seed));
        Ok(())
    }

    /// Next structure satisfying every target, within `time_limit` if given.
    pub fn find_solution(&mut self, time_limit: Option<Duration>) -> Result<SolveOutcome> {
        let State::Built(search) = &mut self.state else {
            return Err(Error::NotBuilt);
        };
        let started = Instant::now();
        let deadline = time_limit.map(|t| started + t);
        let outcome = match search.next_solution(deadline) {
            SearchOutcome::Solution(solution) => {
                let structure = self.snapshot(&solution)?;
                info!("structure found in {:.3}s", started.elapsed().as_secs_f64());
                SolveOutcome::Found(structure)
            }
            SearchOutcome::Exhausted => {
                info!("no structure satisfies the targets");
                SolveOutcome::Infeasible
            }
            SearchOutcome::LimitReached => {
                info!("structure search timed out after {:.3}s", started.elapsed().as_secs_f64());
                SolveOutcome::TimedOut
            }
        };
        if let State::Built(search) = &self.state {
            debug!("{} nodes explored, {} solutions so far", search.nb_nodes(), search.nb_solutions());
        }
        Ok(outcome)
    }

    fn snapshot(&self, solution: &Solution) -> Result<LandscapeStructure> {
        let classes = self
            .classes
            .iter()
            .map(|c| {
                let sizes = solution.values(c.patch_sizes()).into_iter().filter(|&s| s > 0).collect();
                ClassStructure::new(c.name(), sizes)
            })
            .collect::<Result<Vec<_>>>()?;
        LandscapeStructure::new(self.nb_rows, self.nb_cols, self.landscape_area, self.mask_raster_path.clone(), classes)
    }
}

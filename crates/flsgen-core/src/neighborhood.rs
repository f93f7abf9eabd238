//! Neighborhood relations over a [`Grid`].
//!
//! `Connectivity` is the base adjacency (4 or 8 neighbours). `Neighborhood`
//! adds the buffer variants built by iterating the base adjacency: a fixed
//! `k`-wide ring and a variable-width ring whose radius is drawn per query.
//! Masked cells are never returned and are not traversed, and the query cell
//! itself is never part of its own neighborhood.

use std::collections::HashSet;

use rand::Rng;

use crate::error::{check_order, Error, Result};
use crate::grid::Grid;

const FOUR_OFFSETS: [(isize, isize); 4] = [(-1, 0), (0, -1), (0, 1), (1, 0)];
const EIGHT_OFFSETS: [(isize, isize); 8] = [
    (-1, -1), (-1, 0), (-1, 1),
    (0, -1),           (0, 1),
    (1, -1),  (1, 0),  (1, 1),
];

/// Base adjacency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connectivity {
    Four,
    Eight,
}

impl Connectivity {
    pub fn offsets(self) -> &'static [(isize, isize)] {
        match self {
            Connectivity::Four  => &FOUR_OFFSETS,
            Connectivity::Eight => &EIGHT_OFFSETS,
        }
    }

    /// True when two offsets from a common cell are adjacent to each other.
    pub fn touches(self, a: (isize, isize), b: (isize, isize)) -> bool {
        let dr = (a.0 - b.0).abs();
        let dc = (a.1 - b.1).abs();
        match self {
            Connectivity::Four  => dr + dc == 1,
            Connectivity::Eight => dr.max(dc) == 1,
        }
    }

    /// Valid adjacent cells of `index`.
    pub fn adjacent<'g>(self, grid: &'g Grid, index: usize) -> impl Iterator<Item = usize> + 'g {
        self.offsets()
            .iter()
            .filter_map(move |&(dr, dc)| grid.offset(index, dr, dc))
            .filter(move |&j| grid.is_valid(j))
    }

    /// Cells at distance `1..=width` under this metric on an unmasked grid.
    fn within(self, dr: isize, dc: isize, width: isize) -> bool {
        match self {
            Connectivity::Four  => dr.abs() + dc.abs() <= width,
            Connectivity::Eight => dr.abs().max(dc.abs()) <= width,
        }
    }
}

impl TryFrom<u8> for Connectivity {
    type Error = Error;

    fn try_from(n: u8) -> Result<Self> {
        match n {
            4 => Ok(Connectivity::Four),
            8 => Ok(Connectivity::Eight),
            other => Err(Error::range("connectivity", other as f64, 4.0, 8.0)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Neighborhood {
    /// Plain adjacency.
    Adjacent(Connectivity),
    /// Every cell reachable in `1..=width` base steps.
    Wide { base: Connectivity, width: usize },
    /// Like `Wide`, with the width drawn uniformly in `[min_width, max_width]` on
    /// every query. Separation is therefore only guaranteed up to `min_width`.
    VariableWidth { base: Connectivity, min_width: usize, max_width: usize },
}

impl Neighborhood {
    pub fn four() -> Self {
        Neighborhood::Adjacent(Connectivity::Four)
    }

    pub fn eight() -> Self {
        Neighborhood::Adjacent(Connectivity::Eight)
    }

    /// `width == 1` collapses to the base adjacency.
    pub fn wide(base: Connectivity, width: usize) -> Result<Self> {
        if width == 0 {
            return Err(Error::range("buffer width", 0.0, 1.0, f64::INFINITY));
        }
        Ok(if width == 1 { Neighborhood::Adjacent(base) } else { Neighborhood::Wide { base, width } })
    }

    pub fn variable_width(base: Connectivity, min_width: usize, max_width: usize) -> Result<Self> {
        check_order("buffer width", min_width as f64, max_width as f64)?;
        if min_width == 0 {
            return Err(Error::range("buffer width", 0.0, 1.0, f64::INFINITY));
        }
        if min_width == max_width {
            return Self::wide(base, min_width);
        }
        Ok(Neighborhood::VariableWidth { base, min_width, max_width })
    }

    pub fn base(&self) -> Connectivity {
        match *self {
            Neighborhood::Adjacent(base)
            | Neighborhood::Wide { base, .. }
            | Neighborhood::VariableWidth { base, .. } => base,
        }
    }

    /// Largest radius this neighborhood can reach.
    pub fn max_width(&self) -> usize {
        match *self {
            Neighborhood::Adjacent(_) => 1,
            Neighborhood::Wide { width, .. } => width,
            Neighborhood::VariableWidth { max_width, .. } => max_width,
        }
    }

    /// Radius every query reaches at least.
    pub fn min_width(&self) -> usize {
        match *self {
            Neighborhood::Adjacent(_) => 1,
            Neighborhood::Wide { width, .. } => width,
            Neighborhood::VariableWidth { min_width, .. } => min_width,
        }
    }

    /// True when every offset `other` can reach is inside this neighborhood on
    /// every query.
    pub fn covers(&self, other: &Neighborhood) -> bool {
        let reach = other.max_width() as isize;
        let (base, width) = (self.base(), self.min_width() as isize);
        (-reach..=reach)
            .flat_map(|dr| (-reach..=reach).map(move |dc| (dr, dc)))
            .filter(|&(dr, dc)| (dr, dc) != (0, 0) && other.base().within(dr, dc, reach))
            .all(|(dr, dc)| base.within(dr, dc, width))
    }

    /// Collect the neighborhood of `index` into `out` (cleared first).
    pub fn neighbors_into<R: Rng + ?Sized>(&self, grid: &Grid, index: usize, rng: &mut R, out: &mut Vec<usize>) {
        out.clear();
        match *self {
            Neighborhood::Adjacent(base) => out.extend(base.adjacent(grid, index)),
            Neighborhood::Wide { base, width } => expand(grid, base, index, width, out),
            Neighborhood::VariableWidth { base, min_width, max_width } => {
                let width = rng.gen_range(min_width..=max_width);
                expand(grid, base, index, width, out);
            }
        }
    }

    pub fn neighbors<R: Rng + ?Sized>(&self, grid: &Grid, index: usize, rng: &mut R) -> Vec<usize> {
        let mut out = Vec::new();
        self.neighbors_into(grid, index, rng, &mut out);
        out
    }
}

/// Iterated expansion of `base` around `index`. On unmasked grids the ring is
/// the closed ball of the base metric; masked grids fall back to a layered BFS
/// that never steps on a masked cell.
fn expand(grid: &Grid, base: Connectivity, index: usize, width: usize, out: &mut Vec<usize>) {
    let w = width as isize;
    if !grid.is_partial() {
        for dr in -w..=w {
            for dc in -w..=w {
                if (dr, dc) == (0, 0) || !base.within(dr, dc, w) {
                    continue;
                }
                if let Some(j) = grid.offset(index, dr, dc) {
                    out.push(j);
                }
            }
        }
        return;
    }

    let mut seen: HashSet<usize> = HashSet::from([index]);
    let mut layer = vec![index];
    for _ in 0..width {
        let mut next = Vec::new();
        for &i in &layer {
            for j in base.adjacent(grid, i) {
                if seen.insert(j) {
                    next.push(j);
                    out.push(j);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        layer = next;
    }
}

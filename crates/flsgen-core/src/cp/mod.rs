//! A compact bounds-consistency constraint engine.
//!
//! Variables are integer intervals `[lb, ub]`. Constraints are stateless
//! propagators that only ever shrink bounds; the engine runs them from a queue
//! until nothing changes (fixpoint), and `search` explores the remaining space
//! depth-first with a bounds trail so it can resume after each solution.
//! Holes are expressed through propagators (e.g. `ZeroOrAtLeast`) rather than
//! through the domains themselves.
pub mod propagators;
pub mod search;
pub mod sum_of_squares;

use std::fmt;

pub use propagators::{
    AllDifferentExceptZero, CountNonZero, ExistsInRange, LessOrEqual, LinearSum, Relation, ZeroOrAtLeast,
};
pub use search::{Search, SearchOutcome, SearchStrategy, Solution};
pub use sum_of_squares::SumOfSquares;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) usize);

impl VarId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Raised by a propagator when a domain would become empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contradiction;

pub type PropResult = std::result::Result<(), Contradiction>;

/// Three-valued entailment status of a constraint under the current bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entailment {
    True,
    False,
    Undefined,
}

/// Current bounds of every variable plus the list of variables modified since
/// the engine last drained it.
#[derive(Debug, Clone)]
pub struct Domains {
    lb: Vec<i64>,
    ub: Vec<i64>,
    modified: Vec<VarId>,
}

impl Domains {
    #[inline]
    pub fn lb(&self, v: VarId) -> i64 {
        self.lb[v.0]
    }

    #[inline]
    pub fn ub(&self, v: VarId) -> i64 {
        self.ub[v.0]
    }

    /// Number of values in the interval.
    #[inline]
    pub fn size(&self, v: VarId) -> i64 {
        self.ub[v.0] - self.lb[v.0] + 1
    }

    #[inline]
    pub fn is_fixed(&self, v: VarId) -> bool {
        self.lb[v.0] == self.ub[v.0]
    }

    pub fn value(&self, v: VarId) -> Option<i64> {
        self.is_fixed(v).then(|| self.lb[v.0])
    }

    /// Raise the lower bound. `Ok(true)` when the domain changed.
    pub fn set_lb(&mut self, v: VarId, value: i64) -> Result<bool, Contradiction> {
        if value <= self.lb[v.0] {
            return Ok(false);
        }
        if value > self.ub[v.0] {
            return Err(Contradiction);
        }
        self.lb[v.0] = value;
        self.modified.push(v);
        Ok(true)
    }

    /// Lower the upper bound. `Ok(true)` when the domain changed.
    pub fn set_ub(&mut self, v: VarId, value: i64) -> Result<bool, Contradiction> {
        if value >= self.ub[v.0] {
            return Ok(false);
        }
        if value < self.lb[v.0] {
            return Err(Contradiction);
        }
        self.ub[v.0] = value;
        self.modified.push(v);
        Ok(true)
    }

    pub fn fix(&mut self, v: VarId, value: i64) -> Result<bool, Contradiction> {
        let a = self.set_lb(v, value)?;
        let b = self.set_ub(v, value)?;
        Ok(a || b)
    }

    pub(crate) fn drain_modified(&mut self) -> Vec<VarId> {
        std::mem::take(&mut self.modified)
    }

    pub(crate) fn restore(&mut self, saved: &Domains) {
        self.lb.clone_from(&saved.lb);
        self.ub.clone_from(&saved.ub);
        self.modified.clear();
    }
}

/// A constraint over a fixed set of variables.
///
/// Implementations keep no search-dependent state: everything is recomputed
/// from the bounds on each call, so backtracking only restores `Domains`.
pub trait Propagator: fmt::Debug + Send {
    fn name(&self) -> &'static str;

    fn vars(&self) -> Vec<VarId>;

    /// Shrink bounds towards consistency or report a contradiction.
    fn propagate(&self, dom: &mut Domains) -> PropResult;

    fn entailment(&self, dom: &Domains) -> Entailment;
}

/// Variables, root domains and posted propagators.
#[derive(Debug)]
pub struct Model {
    names: Vec<String>,
    root: Domains,
    props: Vec<Box<dyn Propagator>>,
    watchers: Vec<Vec<usize>>,
    /// Set when a root restriction empties a domain; the model is then unsatisfiable.
    inconsistent: bool,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    pub fn new() -> Self {
        Self {
            names: Vec::new(),
            root: Domains { lb: Vec::new(), ub: Vec::new(), modified: Vec::new() },
            props: Vec::new(),
            watchers: Vec::new(),
            inconsistent: false,
        }
    }

    pub fn new_var(&mut self, name: impl Into<String>, lb: i64, ub: i64) -> VarId {
        let id = VarId(self.names.len());
        self.names.push(name.into());
        self.root.lb.push(lb);
        self.root.ub.push(ub);
        self.watchers.push(Vec::new());
        if lb > ub {
            self.inconsistent = true;
        }
        id
    }

    pub fn new_vars(&mut self, prefix: &str, n: usize, lb: i64, ub: i64) -> Vec<VarId> {
        (0..n).map(|i| self.new_var(format!("{prefix}[{i}]"), lb, ub)).collect()
    }

    /// Intersect the root domain of `v` with `[lb, ub]`.
    pub fn restrict(&mut self, v: VarId, lb: i64, ub: i64) {
        let i = v.0;
        self.root.lb[i] = self.root.lb[i].max(lb);
        self.root.ub[i] = self.root.ub[i].min(ub);
        if self.root.lb[i] > self.root.ub[i] {
            self.inconsistent = true;
        }
    }

    pub fn post<P: Propagator + 'static>(&mut self, p: P) -> usize {
        let id = self.props.len();
        let mut vars = p.vars();
        vars.sort_unstable();
        vars.dedup();
        for v in vars {
            self.watchers[v.0].push(id);
        }
        self.props.push(Box::new(p));
        id
    }

    pub fn nb_vars(&self) -> usize {
        self.names.len()
    }

    pub fn nb_propagators(&self) -> usize {
        self.props.len()
    }

    pub fn name(&self, v: VarId) -> &str {
        &self.names[v.0]
    }

    pub fn lb(&self, v: VarId) -> i64 {
        self.root.lb(v)
    }

    pub fn ub(&self, v: VarId) -> i64 {
        self.root.ub(v)
    }

    pub fn is_inconsistent(&self) -> bool {
        self.inconsistent
    }

    pub(crate) fn root_domains(&self) -> Domains {
        self.root.clone()
    }

    pub(crate) fn propagator(&self, id: usize) -> &dyn Propagator {
        self.props[id].as_ref()
    }

    pub(crate) fn watchers(&self, v: VarId) -> &[usize] {
        &self.watchers[v.0]
    }
}

/// Integer square root: largest `r` with `r² ≤ n`, for `n ≥ 0`.
pub fn isqrt(n: i64) -> i64 {
    if n <= 0 {
        return 0;
    }
    let mut r = (n as f64).sqrt() as i64;
    while r > 0 && r.saturating_mul(r) > n {
        r -= 1;
    }
    while (r + 1).saturating_mul(r + 1) <= n {
        r += 1;
    }
    r
}

/// Smallest `r ≥ 0` with `r² ≥ n`.
pub fn ceil_sqrt(n: i64) -> i64 {
    let r = isqrt(n);
    if r * r < n { r + 1 } else { r }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_square_roots() {
        for n in 0..2_000i64 {
            let r = isqrt(n);
            assert!(r * r <= n && (r + 1) * (r + 1) > n, "isqrt({n}) = {r}");
            let c = ceil_sqrt(n);
            assert!(c * c >= n && (c == 0 || (c - 1) * (c - 1) < n), "ceil_sqrt({n}) = {c}");
        }
        let big = 3_037_000_499i64 * 3_037_000_499;
        assert_eq!(isqrt(big), 3_037_000_499);
        assert_eq!(isqrt(big - 1), 3_037_000_498);
    }

    #[test]
    fn bound_updates_report_changes_and_contradictions() {
        let mut m = Model::new();
        let x = m.new_var("x", 0, 10);
        let mut d = m.root_domains();
        assert_eq!(d.set_lb(x, 3), Ok(true));
        assert_eq!(d.set_lb(x, 2), Ok(false));
        assert_eq!(d.set_ub(x, 3), Ok(true));
        assert_eq!(d.value(x), Some(3));
        assert_eq!(d.set_ub(x, 2), Err(Contradiction));
        assert_eq!(d.drain_modified(), vec![x, x]);
    }

    #[test]
    fn restricting_to_empty_marks_the_model_inconsistent() {
        let mut m = Model::new();
        let x = m.new_var("x", 0, 10);
        m.restrict(x, 4, 20);
        assert_eq!((m.lb(x), m.ub(x)), (4, 10));
        assert!(!m.is_inconsistent());
        m.restrict(x, 11, 12);
        assert!(m.is_inconsistent());
    }
}

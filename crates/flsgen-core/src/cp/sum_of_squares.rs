//! Bounds-consistency propagator for `LB ≤ Σ xᵢ² ≤ UB`.
//!
//! Every fragmentation index that depends on the squared patch sizes (net
//! product, effective mesh size, splitting index and density, coherence,
//! division) is a monotone reparametrization of this single quantity.
//!
//! Per call, with non-negative variables:
//!
//! ```text
//! sumLB = Σ lb(xᵢ)²          F = UB − sumLB   (room before breaking UB)
//! sumUB = Σ ub(xᵢ)²          E = sumUB − LB   (room before breaking LB)
//! ```
//!
//! A variable whose squared width `ub² − lb²` exceeds `F` cannot reach its
//! upper bound while everyone else sits at their lower bound, so `ub` drops to
//! the largest `v` with `v² ≤ lb² + F`. Symmetrically, a squared width above
//! `E` raises `lb` to the smallest `v` with `v² ≥ ub² − E`. `E` and `F` are
//! kept up to date as bounds move and the passes repeat until neither side
//! changes anything. Either slack going negative is a contradiction.
use super::{ceil_sqrt, isqrt, Contradiction, Domains, Entailment, PropResult, Propagator, VarId};

#[derive(Debug, Clone)]
pub struct SumOfSquares {
    vars: Vec<VarId>,
    lower: i64,
    upper: i64,
}

impl SumOfSquares {
    /// `lower ≤ Σ xᵢ² ≤ upper`. All variables must be non-negative.
    pub fn new(vars: Vec<VarId>, lower: i64, upper: i64) -> Self {
        Self { vars, lower: lower.max(0), upper }
    }

    /// `Σ xᵢ² ≤ upper`.
    pub fn at_most(vars: Vec<VarId>, upper: i64) -> Self {
        Self::new(vars, 0, upper)
    }

    /// `Σ xᵢ² ≥ lower`.
    pub fn at_least(vars: Vec<VarId>, lower: i64) -> Self {
        Self::new(vars, lower, i64::MAX)
    }

    pub fn lower(&self) -> i64 {
        self.lower
    }

    pub fn upper(&self) -> i64 {
        self.upper
    }

    #[inline]
    fn upper_active(&self) -> bool {
        self.upper != i64::MAX
    }

    #[inline]
    fn lower_active(&self) -> bool {
        self.lower > 0
    }

    fn sums(&self, dom: &Domains) -> (i64, i64) {
        self.vars.iter().fold((0i64, 0i64), |(slb, sub), &v| {
            let (l, u) = (dom.lb(v), dom.ub(v));
            (slb.saturating_add(l * l), sub.saturating_add(u * u))
        })
    }

    /// Largest squared width `ub² − lb²` over the variables.
    fn max_square_width(&self, dom: &Domains) -> i64 {
        self.vars
            .iter()
            .map(|&v| {
                let (l, u) = (dom.lb(v), dom.ub(v));
                u * u - l * l
            })
            .max()
            .unwrap_or(0)
    }
}

impl Propagator for SumOfSquares {
    fn name(&self) -> &'static str {
        "sum_of_squares"
    }

    fn vars(&self) -> Vec<VarId> {
        self.vars.clone()
    }

    fn propagate(&self, dom: &mut Domains) -> PropResult {
        let (mut sum_lb, mut sum_ub) = self.sums(dom);
        let up = self.upper_active();
        let low = self.lower_active();

        if (up && sum_lb > self.upper) || (low && sum_ub < self.lower) {
            return Err(Contradiction);
        }

        // Passive: the widest variable already fits inside every active slack.
        let width = self.max_square_width(dom);
        if (!up || width <= self.upper - sum_lb) && (!low || width <= sum_ub - self.lower) {
            return Ok(());
        }

        loop {
            let mut changed = false;

            if up {
                let f = self.upper - sum_lb;
                if f < 0 {
                    return Err(Contradiction);
                }
                for &v in &self.vars {
                    let (l, u) = (dom.lb(v), dom.ub(v));
                    if u * u - l * l > f {
                        let nu = isqrt(l * l + f);
                        sum_ub -= u * u - nu * nu;
                        dom.set_ub(v, nu)?;
                        changed = true;
                    }
                }
            }

            if low {
                let e = sum_ub - self.lower;
                if e < 0 {
                    return Err(Contradiction);
                }
                for &v in &self.vars {
                    let (l, u) = (dom.lb(v), dom.ub(v));
                    if u * u - l * l > e {
                        let nl = ceil_sqrt(u * u - e);
                        sum_lb += nl * nl - l * l;
                        dom.set_lb(v, nl)?;
                        changed = true;
                    }
                }
                if up && sum_lb > self.upper {
                    return Err(Contradiction);
                }
            }

            if !changed {
                return Ok(());
            }
        }
    }

    fn entailment(&self, dom: &Domains) -> Entailment {
        let (sum_lb, sum_ub) = self.sums(dom);
        if sum_lb >= self.lower && sum_ub <= self.upper {
            Entailment::True
        } else if sum_lb > self.upper || sum_ub < self.lower {
            Entailment::False
        } else {
            Entailment::Undefined
        }
    }
}

//! Linear and structural propagators used by the landscape model.
use super::{Contradiction, Domains, Entailment, PropResult, Propagator, VarId};

/// Comparison of a linear expression against a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Eq,
    Le,
    Ge,
}

/// `Σ aᵢ·xᵢ (rel) rhs`, bounds consistent.
#[derive(Debug, Clone)]
pub struct LinearSum {
    terms: Vec<(i64, VarId)>,
    rel: Relation,
    rhs: i64,
}

impl LinearSum {
    pub fn new(terms: Vec<(i64, VarId)>, rel: Relation, rhs: i64) -> Self {
        Self { terms: terms.into_iter().filter(|&(a, _)| a != 0).collect(), rel, rhs }
    }

    /// `Σ xᵢ (rel) rhs`.
    pub fn sum(vars: &[VarId], rel: Relation, rhs: i64) -> Self {
        Self::new(vars.iter().map(|&v| (1, v)).collect(), rel, rhs)
    }

    /// `Σ xᵢ = total`, i.e. `Σ xᵢ − total = 0`.
    pub fn sum_eq_var(vars: &[VarId], total: VarId) -> Self {
        let mut terms: Vec<(i64, VarId)> = vars.iter().map(|&v| (1, v)).collect();
        terms.push((-1, total));
        Self::new(terms, Relation::Eq, 0)
    }

    fn term_bounds(a: i64, v: VarId, dom: &Domains) -> (i64, i64) {
        if a > 0 { (a * dom.lb(v), a * dom.ub(v)) } else { (a * dom.ub(v), a * dom.lb(v)) }
    }

    fn expr_bounds(&self, dom: &Domains) -> (i64, i64) {
        self.terms.iter().fold((0, 0), |(lo, hi), &(a, v)| {
            let (tl, th) = Self::term_bounds(a, v, dom);
            (lo + tl, hi + th)
        })
    }

    /// Enforce `Σ aᵢ·xᵢ ≤ rhs`.
    fn filter_le(terms: &[(i64, VarId)], rhs: i64, dom: &mut Domains) -> PropResult {
        let min_sum: i64 = terms.iter().map(|&(a, v)| Self::term_bounds(a, v, dom).0).sum();
        if min_sum > rhs {
            return Err(Contradiction);
        }
        for &(a, v) in terms {
            let (tmin, _) = Self::term_bounds(a, v, dom);
            // aᵢ·xᵢ ≤ rhs − (min_sum − tmin)
            let slack = rhs - (min_sum - tmin);
            if a > 0 {
                dom.set_ub(v, slack.div_euclid(a))?;
            } else {
                dom.set_lb(v, ceil_div(slack, a))?;
            }
        }
        Ok(())
    }
}

/// `⌈n / d⌉` for any non-zero `d`.
fn ceil_div(n: i64, d: i64) -> i64 {
    let q = n / d;
    if (n % d != 0) && ((n < 0) == (d < 0)) { q + 1 } else { q }
}

impl Propagator for LinearSum {
    fn name(&self) -> &'static str {
        "linear_sum"
    }

    fn vars(&self) -> Vec<VarId> {
        self.terms.iter().map(|&(_, v)| v).collect()
    }

    fn propagate(&self, dom: &mut Domains) -> PropResult {
        if matches!(self.rel, Relation::Le | Relation::Eq) {
            Self::filter_le(&self.terms, self.rhs, dom)?;
        }
        if matches!(self.rel, Relation::Ge | Relation::Eq) {
            let negated: Vec<(i64, VarId)> = self.terms.iter().map(|&(a, v)| (-a, v)).collect();
            Self::filter_le(&negated, -self.rhs, dom)?;
        }
        Ok(())
    }

    fn entailment(&self, dom: &Domains) -> Entailment {
        let (lo, hi) = self.expr_bounds(dom);
        let (ok, bad) = match self.rel {
            Relation::Le => (hi <= self.rhs, lo > self.rhs),
            Relation::Ge => (lo >= self.rhs, hi < self.rhs),
            Relation::Eq => (lo == self.rhs && hi == self.rhs, lo > self.rhs || hi < self.rhs),
        };
        if ok {
            Entailment::True
        } else if bad {
            Entailment::False
        } else {
            Entailment::Undefined
        }
    }
}

/// `x ≤ y`.
#[derive(Debug, Clone)]
pub struct LessOrEqual {
    x: VarId,
    y: VarId,
}

impl LessOrEqual {
    pub fn new(x: VarId, y: VarId) -> Self {
        Self { x, y }
    }
}

impl Propagator for LessOrEqual {
    fn name(&self) -> &'static str {
        "less_or_equal"
    }

    fn vars(&self) -> Vec<VarId> {
        vec![self.x, self.y]
    }

    fn propagate(&self, dom: &mut Domains) -> PropResult {
        dom.set_ub(self.x, dom.ub(self.y))?;
        dom.set_lb(self.y, dom.lb(self.x))?;
        Ok(())
    }

    fn entailment(&self, dom: &Domains) -> Entailment {
        if dom.ub(self.x) <= dom.lb(self.y) {
            Entailment::True
        } else if dom.lb(self.x) > dom.ub(self.y) {
            Entailment::False
        } else {
            Entailment::Undefined
        }
    }
}

/// `x = 0 ∨ x ≥ min`: a non-negative variable with a hole `[1, min − 1]`.
#[derive(Debug, Clone)]
pub struct ZeroOrAtLeast {
    x: VarId,
    min: i64,
}

impl ZeroOrAtLeast {
    pub fn new(x: VarId, min: i64) -> Self {
        Self { x, min }
    }
}

impl Propagator for ZeroOrAtLeast {
    fn name(&self) -> &'static str {
        "zero_or_at_least"
    }

    fn vars(&self) -> Vec<VarId> {
        vec![self.x]
    }

    fn propagate(&self, dom: &mut Domains) -> PropResult {
        if dom.lb(self.x) > 0 {
            dom.set_lb(self.x, self.min)?;
        }
        if dom.ub(self.x) < self.min {
            dom.set_ub(self.x, 0)?;
        }
        Ok(())
    }

    fn entailment(&self, dom: &Domains) -> Entailment {
        let (lb, ub) = (dom.lb(self.x), dom.ub(self.x));
        if lb >= self.min || ub == 0 {
            Entailment::True
        } else if lb > 0 && ub < self.min {
            Entailment::False
        } else {
            Entailment::Undefined
        }
    }
}

/// `count = #{i : xᵢ ≠ 0}` over non-negative variables.
///
/// With `sorted_desc` the caller guarantees `x₀ ≥ x₁ ≥ …`, so the nonzero
/// entries form a prefix and count bounds translate directly into which
/// positions are present or absent.
#[derive(Debug, Clone)]
pub struct CountNonZero {
    vars: Vec<VarId>,
    count: VarId,
    sorted_desc: bool,
}

impl CountNonZero {
    pub fn new(vars: Vec<VarId>, count: VarId, sorted_desc: bool) -> Self {
        Self { vars, count, sorted_desc }
    }

    fn must_may(&self, dom: &Domains) -> (i64, i64) {
        let must = self.vars.iter().filter(|&&v| dom.lb(v) > 0).count() as i64;
        let may = self.vars.iter().filter(|&&v| dom.ub(v) > 0).count() as i64;
        (must, may)
    }
}

impl Propagator for CountNonZero {
    fn name(&self) -> &'static str {
        "count_non_zero"
    }

    fn vars(&self) -> Vec<VarId> {
        let mut v = self.vars.clone();
        v.push(self.count);
        v
    }

    fn propagate(&self, dom: &mut Domains) -> PropResult {
        let (must, may) = self.must_may(dom);
        dom.set_lb(self.count, must)?;
        dom.set_ub(self.count, may)?;

        let (lo, hi) = (dom.lb(self.count), dom.ub(self.count));
        if self.sorted_desc {
            for (i, &v) in self.vars.iter().enumerate() {
                if (i as i64) < lo {
                    dom.set_lb(v, 1)?;
                } else if (i as i64) >= hi {
                    dom.set_ub(v, 0)?;
                }
            }
        }
        if hi == must {
            for &v in &self.vars {
                if dom.lb(v) == 0 {
                    dom.set_ub(v, 0)?;
                }
            }
        } else if lo == may {
            for &v in &self.vars {
                if dom.ub(v) > 0 {
                    dom.set_lb(v, 1)?;
                }
            }
        }
        Ok(())
    }

    fn entailment(&self, dom: &Domains) -> Entailment {
        let (must, may) = self.must_may(dom);
        let (lo, hi) = (dom.lb(self.count), dom.ub(self.count));
        if must == may && lo == hi && lo == must {
            Entailment::True
        } else if hi < must || lo > may {
            Entailment::False
        } else {
            Entailment::Undefined
        }
    }
}

/// `∃ i : lo ≤ xᵢ ≤ hi`.
#[derive(Debug, Clone)]
pub struct ExistsInRange {
    vars: Vec<VarId>,
    lo: i64,
    hi: i64,
}

impl ExistsInRange {
    pub fn new(vars: Vec<VarId>, lo: i64, hi: i64) -> Self {
        Self { vars, lo, hi }
    }

    fn candidates<'a>(&'a self, dom: &'a Domains) -> impl Iterator<Item = VarId> + 'a {
        self.vars.iter().copied().filter(move |&v| dom.lb(v) <= self.hi && dom.ub(v) >= self.lo)
    }
}

impl Propagator for ExistsInRange {
    fn name(&self) -> &'static str {
        "exists_in_range"
    }

    fn vars(&self) -> Vec<VarId> {
        self.vars.clone()
    }

    fn propagate(&self, dom: &mut Domains) -> PropResult {
        let (first, more) = {
            let mut cands = self.candidates(dom);
            (cands.next(), cands.next().is_some())
        };
        let Some(first) = first else {
            return Err(Contradiction);
        };
        if !more {
            dom.set_lb(first, self.lo)?;
            dom.set_ub(first, self.hi)?;
        }
        Ok(())
    }

    fn entailment(&self, dom: &Domains) -> Entailment {
        if self.vars.iter().any(|&v| dom.lb(v) >= self.lo && dom.ub(v) <= self.hi) {
            Entailment::True
        } else if self.candidates(dom).next().is_none() {
            Entailment::False
        } else {
            Entailment::Undefined
        }
    }
}

/// Pairwise distinct values, except that any number of variables may be `0`.
///
/// Interval domains can only lose values at their bounds, so a fixed value is
/// removed from the others only where it sits on a bound. With `sorted_desc`
/// present neighbours are additionally kept strictly decreasing.
#[derive(Debug, Clone)]
pub struct AllDifferentExceptZero {
    vars: Vec<VarId>,
    sorted_desc: bool,
}

impl AllDifferentExceptZero {
    pub fn new(vars: Vec<VarId>, sorted_desc: bool) -> Self {
        Self { vars, sorted_desc }
    }
}

impl Propagator for AllDifferentExceptZero {
    fn name(&self) -> &'static str {
        "all_different_except_zero"
    }

    fn vars(&self) -> Vec<VarId> {
        self.vars.clone()
    }

    fn propagate(&self, dom: &mut Domains) -> PropResult {
        for &x in &self.vars {
            let Some(v) = dom.value(x).filter(|&v| v != 0) else {
                continue;
            };
            for &y in &self.vars {
                if y == x {
                    continue;
                }
                if dom.lb(y) == v {
                    dom.set_lb(y, v + 1)?;
                }
                if dom.ub(y) == v {
                    dom.set_ub(y, v - 1)?;
                }
            }
        }
        if self.sorted_desc {
            for w in self.vars.windows(2) {
                let (hi, lo) = (w[0], w[1]);
                if dom.lb(lo) > 0 {
                    dom.set_lb(hi, dom.lb(lo) + 1)?;
                    dom.set_ub(lo, dom.ub(hi) - 1)?;
                }
            }
        }
        Ok(())
    }

    fn entailment(&self, dom: &Domains) -> Entailment {
        let mut seen = Vec::with_capacity(self.vars.len());
        for &x in &self.vars {
            match dom.value(x) {
                None => return Entailment::Undefined,
                Some(0) => {}
                Some(v) if seen.contains(&v) => return Entailment::False,
                Some(v) => seen.push(v),
            }
        }
        Entailment::True
    }
}

#[cfg(test)]
mod tests {
    use super::super::Model;
    use super::*;

    fn run(m: &Model, p: &dyn Propagator) -> (Domains, PropResult) {
        let mut d = m.root_domains();
        let r = p.propagate(&mut d);
        (d, r)
    }

    #[test]
    fn ceil_div_handles_signs() {
        assert_eq!(ceil_div(7, 2), 4);
        assert_eq!(ceil_div(-7, 2), -3);
        assert_eq!(ceil_div(7, -2), -3);
        assert_eq!(ceil_div(-7, -2), 4);
        assert_eq!(ceil_div(6, -2), -3);
    }

    #[test]
    fn linear_sum_tightens_both_sides() {
        let mut m = Model::new();
        let x = m.new_var("x", 0, 10);
        let y = m.new_var("y", 0, 10);
        let t = m.new_var("t", 0, 5);
        let p = LinearSum::sum_eq_var(&[x, y], t);
        let (d, r) = run(&m, &p);
        assert!(r.is_ok());
        assert_eq!((d.ub(x), d.ub(y)), (5, 5));

        let p = LinearSum::new(vec![(2, x), (3, y)], Relation::Ge, 40);
        let (d, r) = run(&m, &p);
        assert!(r.is_ok());
        assert_eq!(d.lb(x), 5, "2x ≥ 40 − 30");
        assert_eq!(d.lb(y), 7, "3y ≥ 40 − 20");
        assert_eq!(p.entailment(&d), Entailment::Undefined);

        let p = LinearSum::sum(&[x, y], Relation::Ge, 21);
        assert_eq!(run(&m, &p).1, Err(Contradiction));
        assert_eq!(p.entailment(&m.root_domains()), Entailment::False);
    }

    #[test]
    fn zero_or_at_least_closes_the_hole() {
        let mut m = Model::new();
        let x = m.new_var("x", 1, 10);
        let y = m.new_var("y", 0, 3);
        let (d, _) = run(&m, &ZeroOrAtLeast::new(x, 4));
        assert_eq!(d.lb(x), 4);
        let (d, _) = run(&m, &ZeroOrAtLeast::new(y, 4));
        assert_eq!(d.value(y), Some(0));
    }

    #[test]
    fn sorted_count_fixes_prefix_and_suffix() {
        let mut m = Model::new();
        let xs = m.new_vars("x", 5, 0, 9);
        let c = m.new_var("c", 2, 3);
        let (d, r) = run(&m, &CountNonZero::new(xs.clone(), c, true));
        assert!(r.is_ok());
        assert!(d.lb(xs[0]) >= 1 && d.lb(xs[1]) >= 1);
        assert_eq!(d.lb(xs[2]), 0);
        assert_eq!(d.ub(xs[3]), 0);
        assert_eq!(d.ub(xs[4]), 0);
    }

    #[test]
    fn count_bounds_follow_present_patches() {
        let mut m = Model::new();
        let a = m.new_var("a", 2, 9);
        let b = m.new_var("b", 0, 0);
        let z = m.new_var("z", 0, 9);
        let c = m.new_var("c", 0, 5);
        let p = CountNonZero::new(vec![a, b, z], c, false);
        let (d, r) = run(&m, &p);
        assert!(r.is_ok());
        assert_eq!((d.lb(c), d.ub(c)), (1, 2));
    }

    #[test]
    fn exists_in_range_forces_the_last_candidate() {
        let mut m = Model::new();
        let a = m.new_var("a", 10, 20);
        let b = m.new_var("b", 0, 8);
        let p = ExistsInRange::new(vec![a, b], 0, 12);
        let (d, r) = run(&m, &p);
        assert!(r.is_ok());
        assert_eq!(d.ub(a), 20, "two candidates: nothing forced");

        let p = ExistsInRange::new(vec![a, b], 9, 15);
        let (d, r) = run(&m, &p);
        assert!(r.is_ok());
        assert_eq!((d.lb(a), d.ub(a)), (10, 15));

        let p = ExistsInRange::new(vec![a, b], 21, 30);
        assert_eq!(run(&m, &p).1, Err(Contradiction));
    }

    #[test]
    fn all_different_rejects_equal_present_values() {
        let mut m = Model::new();
        let a = m.new_var("a", 5, 5);
        let b = m.new_var("b", 5, 5);
        let z1 = m.new_var("z1", 0, 0);
        let z2 = m.new_var("z2", 0, 0);
        let p = AllDifferentExceptZero::new(vec![z1, z2], false);
        assert!(run(&m, &p).1.is_ok());
        assert_eq!(p.entailment(&m.root_domains()), Entailment::True);
        let p = AllDifferentExceptZero::new(vec![a, b], false);
        assert_eq!(run(&m, &p).1, Err(Contradiction));
    }

    #[test]
    fn sorted_all_different_is_strictly_decreasing() {
        let mut m = Model::new();
        let a = m.new_var("a", 0, 10);
        let b = m.new_var("b", 4, 10);
        let p = AllDifferentExceptZero::new(vec![a, b], true);
        let (d, r) = run(&m, &p);
        assert!(r.is_ok());
        assert_eq!(d.lb(a), 5);
        assert_eq!(d.ub(b), 9);
    }
}

//! Depth-first search over a [`Model`] with pluggable variable/value selection.
//!
//! Decisions are binary: the left branch narrows a variable (`x = v`, `x ≤ v`
//! or `x ≥ v`) and the right branch is its refutation. Each frame stores the
//! bounds from before its decision, so backtracking is a plain restore. The
//! frame stack survives a returned solution, which lets the next call resume
//! from there and enumerate distinct solutions.
//!
//! Strategies only change the order in which the space is explored, never
//! which assignments are solutions.
//!
//! The randomized and conflict-driven strategies restart from the propagated
//! root on a Luby schedule of failure limits, keeping their learned weights.
//! Restarts stop at the first solution, so later calls never see a solution
//! twice. Every run is a complete search of the whole space.
use std::collections::VecDeque;
use std::str::FromStr;
use std::time::Instant;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Domains, Entailment, Model, VarId};
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchStrategy {
    /// Declaration order, smallest value first.
    #[default]
    Default,
    /// Random variable, random split point, random branch order.
    Random,
    /// Smallest domain over weighted degree; a failing constraint gains 1.
    DomOverWDeg,
    /// Like `DomOverWDeg`, with the weight spread over the failing constraint's
    /// unfixed variables.
    DomOverWDegRef,
    /// Smallest domain over activity (how often propagation shrank the variable).
    ActivityBased,
    /// Conflict-history search: recency-weighted constraint scores.
    ConflictHistory,
    /// Smallest domain, lower bound first.
    MinDomLb,
    /// Smallest domain, upper bound first.
    MinDomUb,
}

impl SearchStrategy {
    pub const ALL: [SearchStrategy; 8] = [
        SearchStrategy::Default,
        SearchStrategy::Random,
        SearchStrategy::DomOverWDeg,
        SearchStrategy::DomOverWDegRef,
        SearchStrategy::ActivityBased,
        SearchStrategy::ConflictHistory,
        SearchStrategy::MinDomLb,
        SearchStrategy::MinDomUb,
    ];

    /// Whether failure-limited restarts apply.
    fn restarts(self) -> bool {
        matches!(
            self,
            SearchStrategy::Random
                | SearchStrategy::DomOverWDeg
                | SearchStrategy::DomOverWDegRef
                | SearchStrategy::ActivityBased
                | SearchStrategy::ConflictHistory
        )
    }
}

impl FromStr for SearchStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let strategy = match s.to_ascii_uppercase().replace(['-', '_'], "").as_str() {
            "DEFAULT"        => SearchStrategy::Default,
            "RANDOM"         => SearchStrategy::Random,
            "DOMOVERWDEG"    => SearchStrategy::DomOverWDeg,
            "DOMOVERWDEGREF" => SearchStrategy::DomOverWDegRef,
            "ACTIVITYBASED"  => SearchStrategy::ActivityBased,
            "CONFLICTHISTORY" | "CHS" => SearchStrategy::ConflictHistory,
            "MINDOMLB"       => SearchStrategy::MinDomLb,
            "MINDOMUB"       => SearchStrategy::MinDomUb,
            _ => return Err(Error::InvalidDocument(format!("unknown search strategy `{s}`"))),
        };
        Ok(strategy)
    }
}

/// A full assignment of the model's variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Solution {
    values: Vec<i64>,
}

impl Solution {
    pub fn value(&self, v: VarId) -> i64 {
        self.values[v.0]
    }

    pub fn values(&self, vars: &[VarId]) -> Vec<i64> {
        vars.iter().map(|&v| self.value(v)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Solution(Solution),
    /// The whole space has been explored; no further solution exists.
    Exhausted,
    /// The time limit elapsed first. Calling again resumes the search.
    LimitReached,
}

#[derive(Debug, Clone, Copy)]
enum Decision {
    /// `x = v` / `x ≠ v`, with `v` on a bound.
    Assign(VarId, i64),
    /// `x ≤ v` / `x > v`.
    SplitLow(VarId, i64),
    /// `x > v` / `x ≤ v`.
    SplitHigh(VarId, i64),
}

impl Decision {
    fn apply(self, dom: &mut Domains) -> bool {
        let r = match self {
            Decision::Assign(x, v) => dom.fix(x, v),
            Decision::SplitLow(x, v) => dom.set_ub(x, v),
            Decision::SplitHigh(x, v) => dom.set_lb(x, v + 1),
        };
        r.is_ok()
    }

    fn refute(self, dom: &mut Domains) -> bool {
        let r = match self {
            Decision::Assign(x, v) if dom.lb(x) == v => dom.set_lb(x, v + 1),
            Decision::Assign(x, v) => dom.set_ub(x, v - 1),
            Decision::SplitLow(x, v) => dom.set_lb(x, v + 1),
            Decision::SplitHigh(x, v) => dom.set_ub(x, v),
        };
        r.is_ok()
    }
}

struct Frame {
    saved: Domains,
    decision: Decision,
    refuted: bool,
}

/// Learned scores backing the adaptive strategies.
struct Heuristics {
    weights: Vec<f64>,
    activity: Vec<f64>,
    chs_scores: Vec<f64>,
    chs_last_conflict: Vec<u64>,
    chs_alpha: f64,
    conflicts: u64,
}

const ACTIVITY_DECAY: f64 = 0.999;
const CHS_ALPHA_MIN: f64 = 0.06;
const CHS_ALPHA_STEP: f64 = 1e-6;
const CHS_DELTA: f64 = 1e-4;
/// Failures allowed per unit of the Luby sequence.
const RESTART_UNIT: u64 = 32;

/// `i`-th term (1-based) of the Luby sequence: 1 1 2 1 1 2 4 1 1 2 …
fn luby(mut i: u64) -> u64 {
    loop {
        let bits = 64 - u64::from(i.leading_zeros());
        if i == (1 << bits) - 1 {
            return 1 << (bits - 1);
        }
        i -= (1 << (bits - 1)) - 1;
    }
}

pub struct Search {
    model: Model,
    decision_vars: Vec<VarId>,
    strategy: SearchStrategy,
    rng: StdRng,
    dom: Domains,
    /// Domains after root propagation; restarts resume from here.
    root: Domains,
    stack: Vec<Frame>,
    heur: Heuristics,
    started: bool,
    exhausted: bool,
    /// Set after a returned solution: the next call must backtrack first.
    pending_backtrack: bool,
    nb_nodes: u64,
    nb_solutions: u64,
    nb_restarts: u64,
    /// Failures since the last restart.
    fails: u64,
    fail_limit: u64,
}

impl Search {
    /// Search branching on `decision_vars` (every variable when empty).
    pub fn new(model: Model, decision_vars: Vec<VarId>, strategy: SearchStrategy, seed: u64) -> Self {
        let decision_vars = if decision_vars.is_empty() {
            (0..model.nb_vars()).map(VarId).collect()
        } else {
            decision_vars
        };
        let n_props = model.nb_propagators();
        let heur = Heuristics {
            weights: vec![1.0; n_props],
            activity: vec![0.0; model.nb_vars()],
            chs_scores: vec![0.0; n_props],
            chs_last_conflict: vec![0; n_props],
            chs_alpha: 0.4,
            conflicts: 0,
        };
        let dom = model.root_domains();
        Self {
            model,
            decision_vars,
            strategy,
            rng: StdRng::seed_from_u64(seed),
            root: dom.clone(),
            dom,
            stack: Vec::new(),
            heur,
            started: false,
            exhausted: false,
            pending_backtrack: false,
            nb_nodes: 0,
            nb_solutions: 0,
            nb_restarts: 0,
            fails: 0,
            fail_limit: RESTART_UNIT * luby(1),
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn strategy(&self) -> SearchStrategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: SearchStrategy) {
        self.strategy = strategy;
    }

    pub fn nb_nodes(&self) -> u64 {
        self.nb_nodes
    }

    pub fn nb_solutions(&self) -> u64 {
        self.nb_solutions
    }

    pub fn nb_restarts(&self) -> u64 {
        self.nb_restarts
    }

    /// Next solution, distinct from every one returned before.
    pub fn next_solution(&mut self, deadline: Option<Instant>) -> SearchOutcome {
        if self.exhausted {
            return SearchOutcome::Exhausted;
        }
        if !self.started {
            self.started = true;
            if self.model.is_inconsistent() || !self.propagate(true) {
                self.exhausted = true;
                return SearchOutcome::Exhausted;
            }
            self.root.clone_from(&self.dom);
        }
        let mut need_backtrack = std::mem::take(&mut self.pending_backtrack);

        loop {
            if need_backtrack && self.should_restart() {
                self.restart();
                need_backtrack = false;
            }
            if need_backtrack {
                if !self.backtrack() {
                    self.exhausted = true;
                    debug!("search exhausted after {} nodes, {} solutions", self.nb_nodes, self.nb_solutions);
                    return SearchOutcome::Exhausted;
                }
                need_backtrack = false;
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                return SearchOutcome::LimitReached;
            }

            let Some(decision) = self.select() else {
                if self.all_entailed() {
                    self.nb_solutions += 1;
                    self.pending_backtrack = true;
                    let values = (0..self.model.nb_vars()).map(|i| self.dom.lb[i]).collect();
                    return SearchOutcome::Solution(Solution { values });
                }
                self.fails += 1;
                need_backtrack = true;
                continue;
            };

            self.nb_nodes += 1;
            self.decay_activity();
            let saved = self.dom.clone();
            let ok = decision.apply(&mut self.dom);
            self.stack.push(Frame { saved, decision, refuted: false });
            if !ok || !self.propagate(false) {
                self.fails += 1;
                need_backtrack = true;
            }
        }
    }

    fn should_restart(&self) -> bool {
        self.strategy.restarts() && self.nb_solutions == 0 && self.fails >= self.fail_limit
    }

    /// Drop the whole decision stack and start a fresh run from the root with
    /// the next Luby failure limit.
    fn restart(&mut self) {
        self.stack.clear();
        self.dom.restore(&self.root);
        self.nb_restarts += 1;
        self.fails = 0;
        self.fail_limit = RESTART_UNIT * luby(self.nb_restarts + 1);
        debug!("restart {} after {} nodes, next limit {}", self.nb_restarts, self.nb_nodes, self.fail_limit);
    }

    /// Undo frames until a left branch can be refuted and the refutation
    /// propagates. `false` once the stack is empty.
    fn backtrack(&mut self) -> bool {
        while let Some(frame) = self.stack.pop() {
            self.dom.restore(&frame.saved);
            if frame.refuted {
                continue;
            }
            let decision = frame.decision;
            let ok = decision.refute(&mut self.dom);
            self.stack.push(Frame { saved: frame.saved, decision, refuted: true });
            if ok && self.propagate(false) {
                return true;
            }
            self.fails += 1;
        }
        false
    }

    /// Run propagators to fixpoint. `schedule_all` queues every propagator;
    /// otherwise only those watching a variable modified since the last drain.
    fn propagate(&mut self, schedule_all: bool) -> bool {
        let n = self.model.nb_propagators();
        let mut queued = vec![false; n];
        let mut queue = VecDeque::new();
        if schedule_all {
            queue.extend(0..n);
            queued.iter_mut().for_each(|q| *q = true);
            self.dom.drain_modified();
        } else {
            self.schedule(&mut queue, &mut queued);
        }

        while let Some(p) = queue.pop_front() {
            queued[p] = false;
            if self.model.propagator(p).propagate(&mut self.dom).is_err() {
                self.dom.drain_modified();
                self.on_failure(p);
                return false;
            }
            self.schedule(&mut queue, &mut queued);
        }
        true
    }

    fn schedule(&mut self, queue: &mut VecDeque<usize>, queued: &mut [bool]) {
        for v in self.dom.drain_modified() {
            self.heur.activity[v.0] += 1.0;
            for &q in self.model.watchers(v) {
                if !queued[q] {
                    queued[q] = true;
                    queue.push_back(q);
                }
            }
        }
    }

    fn on_failure(&mut self, p: usize) {
        let h = &mut self.heur;
        h.conflicts += 1;
        match self.strategy {
            SearchStrategy::DomOverWDegRef => {
                let free = self.model.propagator(p).vars().iter().filter(|&&v| !self.dom.is_fixed(v)).count();
                h.weights[p] += 1.0 / free.max(1) as f64;
            }
            _ => h.weights[p] += 1.0,
        }
        let reward = 1.0 / (h.conflicts - h.chs_last_conflict[p] + 1) as f64;
        h.chs_scores[p] = (1.0 - h.chs_alpha) * h.chs_scores[p] + h.chs_alpha * reward;
        h.chs_last_conflict[p] = h.conflicts;
        h.chs_alpha = (h.chs_alpha - CHS_ALPHA_STEP).max(CHS_ALPHA_MIN);
    }

    fn decay_activity(&mut self) {
        if self.strategy == SearchStrategy::ActivityBased {
            self.heur.activity.iter_mut().for_each(|a| *a *= ACTIVITY_DECAY);
        }
    }

    fn all_entailed(&self) -> bool {
        (0..self.model.nb_propagators()).all(|p| self.model.propagator(p).entailment(&self.dom) == Entailment::True)
    }

    fn weighted_degree(&self, v: VarId, scores: &[f64]) -> f64 {
        self.model.watchers(v).iter().map(|&p| scores[p]).sum()
    }

    /// Pick the next decision, or `None` once every variable is fixed.
    /// Auxiliary variables left open after the decision variables are fixed
    /// get their lower bound.
    fn select(&mut self) -> Option<Decision> {
        let free: Vec<VarId> = self.decision_vars.iter().copied().filter(|&v| !self.dom.is_fixed(v)).collect();
        if free.is_empty() {
            return (0..self.model.nb_vars())
                .map(VarId)
                .find(|&v| !self.dom.is_fixed(v))
                .map(|v| Decision::Assign(v, self.dom.lb(v)));
        }
        let size = |v: VarId| self.dom.size(v) as f64;
        let lb = |x: VarId| Decision::Assign(x, self.dom.lb(x));

        let decision = match self.strategy {
            SearchStrategy::Default => lb(free[0]),
            SearchStrategy::MinDomLb => lb(argmin(&free, size)),
            SearchStrategy::MinDomUb => {
                let x = argmin(&free, size);
                Decision::Assign(x, self.dom.ub(x))
            }
            SearchStrategy::DomOverWDeg | SearchStrategy::DomOverWDegRef => {
                lb(argmin(&free, |v| size(v) / self.weighted_degree(v, &self.heur.weights).max(f64::MIN_POSITIVE)))
            }
            SearchStrategy::ActivityBased => {
                lb(argmin(&free, |v| size(v) / (self.heur.activity[v.0] + 1.0)))
            }
            SearchStrategy::ConflictHistory => {
                lb(argmin(&free, |v| size(v) / (self.weighted_degree(v, &self.heur.chs_scores) + CHS_DELTA)))
            }
            SearchStrategy::Random => {
                let x = free[self.rng.gen_range(0..free.len())];
                let (l, u) = (self.dom.lb(x), self.dom.ub(x));
                let v = self.rng.gen_range(l..u);
                if self.rng.gen_bool(0.5) { Decision::SplitLow(x, v) } else { Decision::SplitHigh(x, v) }
            }
        };
        Some(decision)
    }
}

/// First variable with the smallest score.
fn argmin(vars: &[VarId], score: impl Fn(VarId) -> f64) -> VarId {
    let mut best = vars[0];
    let mut best_score = score(best);
    for &v in &vars[1..] {
        let s = score(v);
        if s < best_score {
            best = v;
            best_score = s;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::super::{LinearSum, Relation, SumOfSquares};
    use super::*;
    use std::collections::HashSet;

    /// x + y + z = 6 over [0, 3]³: 7 solutions.
    fn small_model() -> (Model, Vec<VarId>) {
        let mut m = Model::new();
        let xs = m.new_vars("x", 3, 0, 3);
        m.post(LinearSum::sum(&xs, Relation::Eq, 6));
        (m, xs)
    }

    fn enumerate(strategy: SearchStrategy) -> Vec<Vec<i64>> {
        let (m, xs) = small_model();
        let mut s = Search::new(m, xs.clone(), strategy, 7);
        let mut out = Vec::new();
        while let SearchOutcome::Solution(sol) = s.next_solution(None) {
            out.push(sol.values(&xs));
        }
        out
    }

    #[test]
    fn every_strategy_enumerates_the_same_distinct_solutions() {
        let mut expected: Vec<Vec<i64>> = Vec::new();
        for x in 0..=3 {
            for y in 0..=3 {
                let z = 6 - x - y;
                if (0..=3).contains(&z) {
                    expected.push(vec![x, y, z]);
                }
            }
        }
        expected.sort();
        for strategy in SearchStrategy::ALL {
            let mut found = enumerate(strategy);
            let unique: HashSet<_> = found.iter().cloned().collect();
            assert_eq!(unique.len(), found.len(), "{strategy:?} returned a solution twice");
            found.sort();
            assert_eq!(found, expected, "{strategy:?}");
        }
    }

    #[test]
    fn exhausted_search_stays_exhausted() {
        let mut m = Model::new();
        let xs = m.new_vars("x", 2, 0, 4);
        m.post(SumOfSquares::new(xs.clone(), 3, 3));
        let mut s = Search::new(m, xs, SearchStrategy::Default, 0);
        assert_eq!(s.next_solution(None), SearchOutcome::Exhausted, "3 is not a sum of two squares");
        assert_eq!(s.next_solution(None), SearchOutcome::Exhausted);
    }

    #[test]
    fn inconsistent_root_has_no_solution() {
        let mut m = Model::new();
        let x = m.new_var("x", 0, 4);
        m.restrict(x, 5, 6);
        let mut s = Search::new(m, vec![x], SearchStrategy::Default, 0);
        assert_eq!(s.next_solution(None), SearchOutcome::Exhausted);
    }

    #[test]
    fn expired_deadline_reports_limit_then_resumes() {
        let (m, xs) = small_model();
        let mut s = Search::new(m, xs, SearchStrategy::Default, 0);
        assert_eq!(s.next_solution(Some(Instant::now())), SearchOutcome::LimitReached);
        assert!(matches!(s.next_solution(None), SearchOutcome::Solution(_)));
    }

    #[test]
    fn luby_sequence() {
        let terms: Vec<u64> = (1..=15).map(luby).collect();
        assert_eq!(terms, vec![1, 1, 2, 1, 1, 2, 4, 1, 1, 2, 1, 1, 2, 4, 8]);
    }

    #[test]
    fn restarting_search_still_proves_infeasibility() {
        // 2·Σx = 21 has no integer solution, which bounds reasoning cannot see.
        let mut m = Model::new();
        let xs = m.new_vars("x", 4, 0, 10);
        m.post(LinearSum::new(xs.iter().map(|&x| (2, x)).collect(), Relation::Eq, 21));
        for strategy in [SearchStrategy::Random, SearchStrategy::DomOverWDeg] {
            let mut m = Model::new();
            let xs = m.new_vars("x", 4, 0, 10);
            m.post(LinearSum::new(xs.iter().map(|&x| (2, x)).collect(), Relation::Eq, 21));
            let mut s = Search::new(m, xs, strategy, 3);
            assert_eq!(s.next_solution(None), SearchOutcome::Exhausted, "{strategy:?}");
            assert!(s.nb_restarts() > 0, "{strategy:?} never restarted");
        }
        let mut s = Search::new(m, xs, SearchStrategy::Default, 3);
        assert_eq!(s.next_solution(None), SearchOutcome::Exhausted);
        assert_eq!(s.nb_restarts(), 0, "declaration order is a plain depth-first search");
    }

    #[test]
    fn random_search_finds_a_tight_solution() {
        // Σx = 20 and Σx² = 100 over [0, 10]⁴ only admit (5, 5, 5, 5).
        for seed in 0..5 {
            let mut m = Model::new();
            let xs = m.new_vars("x", 4, 0, 10);
            m.post(LinearSum::sum(&xs, Relation::Eq, 20));
            m.post(SumOfSquares::new(xs.clone(), 100, 100));
            let mut s = Search::new(m, xs.clone(), SearchStrategy::Random, seed);
            let SearchOutcome::Solution(sol) = s.next_solution(None) else { panic!("seed {seed}: no solution") };
            assert_eq!(sol.values(&xs), vec![5; 4]);
            assert_eq!(s.next_solution(None), SearchOutcome::Exhausted);
        }
    }

    #[test]
    fn strategies_parse_case_insensitively() {
        assert_eq!("dom_over_w_deg".parse::<SearchStrategy>().unwrap(), SearchStrategy::DomOverWDeg);
        assert_eq!("MIN_DOM_UB".parse::<SearchStrategy>().unwrap(), SearchStrategy::MinDomUb);
        assert_eq!("chs".parse::<SearchStrategy>().unwrap(), SearchStrategy::ConflictHistory);
        assert!("bogus".parse::<SearchStrategy>().is_err());
    }
}

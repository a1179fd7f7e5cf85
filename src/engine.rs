//! The repair loop: scheduling of down/up moves over the term DAG, the
//! restart discipline, and model extraction.
//!
//! A term in `repair_down` carries a desired value (`val0`) that its
//! children must be changed to produce; a term in `repair_up` gives up on
//! its descendants, accepts the children's values and propagates the
//! recomputed value toward its parents. `down` always drains before `up`.

use std::fmt;

use log::{debug, trace};
use num_bigint::BigUint;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::eval::Evaluator;
use crate::model::{Model, ModelValue};
use crate::op::Op;
use crate::params::{ParamError, SlsParams};
use crate::repair_set::RepairSet;
use crate::terms::Terms;
use crate::types::{Sort, TermId};

/// Outcome of a run. SLS is incomplete: exhausting its budgets yields
/// [`Unknown`][Answer::Unknown], never "unsatisfiable".
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Answer {
    Sat,
    Unknown,
}

#[derive(Debug, Clone, Default)]
pub struct SlsStats {
    pub moves: u64,
    pub restarts: u64,
}

impl SlsStats {
    fn reset(&mut self) {
        *self = SlsStats::default();
    }
}

/// Seed offset separating the evaluator's candidate draws from the
/// scheduler's picks while keeping both derived from `random_seed`.
const EVAL_SEED_SALT: u64 = 0x9e3779b97f4a7c15;

/// The stochastic local search engine.
pub struct Sls {
    terms: Terms,
    eval: Evaluator,
    repair_down: RepairSet,
    repair_up: RepairSet,
    rng: ChaCha8Rng,
    config: SlsParams,
    stats: SlsStats,
}

impl Sls {
    pub fn new(terms: Terms) -> Self {
        let config = SlsParams::default();
        Sls {
            terms,
            eval: Evaluator::new(config.random_seed ^ EVAL_SEED_SALT),
            repair_down: RepairSet::new(),
            repair_up: RepairSet::new(),
            rng: ChaCha8Rng::seed_from_u64(config.random_seed),
            config,
            stats: SlsStats::default(),
        }
    }

    pub fn terms(&self) -> &Terms {
        &self.terms
    }

    pub fn stats(&self) -> &SlsStats {
        &self.stats
    }

    /// Finalizes the term bank (parents index). Must be called before
    /// [`init_eval`][Sls::init_eval].
    pub fn init(&mut self) {
        self.terms.init();
    }

    /// Reconfigures the engine, reseeding both PRNGs.
    pub fn updt_params(&mut self, p: &SlsParams) -> Result<(), ParamError> {
        p.validate()?;
        self.rng = ChaCha8Rng::seed_from_u64(p.random_seed);
        self.eval.set_seed(p.random_seed ^ EVAL_SEED_SALT);
        self.config = p.clone();
        Ok(())
    }

    /// Primes the value state from the initial-bit oracle, derives fixed
    /// bits, and rebuilds the repair sets.
    pub fn init_eval(&mut self, mut oracle: impl FnMut(TermId, u32) -> bool) {
        assert!(self.terms.is_frozen(), "Sls::init must be called before init_eval");
        self.eval.init_eval(&self.terms, &mut oracle);
        self.eval.init_fixed(&self.terms);
        self.init_repair();
    }

    fn init_repair(&mut self) {
        self.repair_down.reset();
        self.repair_up.reset();
        for &a in self.terms.assertions() {
            if !self.eval.bval0(a) {
                self.eval.set(&self.terms, a, true);
                self.repair_down.insert(a);
            }
        }
        for t in self.terms.ids() {
            if self.eval.can_eval1(t) && !self.eval_is_correct(t) {
                self.repair_down.insert(t);
            }
        }
    }

    /// Reseeds the assignment, keeping fixed bits and (with high
    /// probability) the prior values, then rebuilds the repair sets.
    fn reinit_eval(&mut self) {
        let prev = self.eval.clone();
        let terms = &self.terms;
        let rng = &mut self.rng;
        let mut oracle = move |id: TermId, bit: u32| match terms.sort(id) {
            Sort::Bool => {
                if prev.is_fixed0(id) || rng.random_range(0..100u32) >= 98 {
                    prev.bval0(id)
                } else {
                    rng.random_range(0..2u32) == 0
                }
            }
            Sort::BitVec(_) => {
                if prev.is_fixed_bit(id, bit) || rng.random_range(0..100u32) >= 98 {
                    prev.wval0(id).bit(bit)
                } else {
                    rng.random_range(0..2u32) == 0
                }
            }
        };
        self.eval.init_eval(terms, &mut oracle);
        self.init_repair();
    }

    /// Picks the next term to repair: uniformly from `down` while it is
    /// non-empty, else uniformly from `up`, else none (the formula is
    /// satisfied).
    fn next_to_repair(&mut self) -> Option<(bool, TermId)> {
        if !self.repair_down.is_empty() {
            let k = self.rng.random_range(0..self.repair_down.len());
            Some((true, self.repair_down.elem_at(k)))
        } else if !self.repair_up.is_empty() {
            let k = self.rng.random_range(0..self.repair_up.len());
            Some((false, self.repair_up.elem_at(k)))
        } else {
            None
        }
    }

    fn search(&mut self, inc: &mut dyn FnMut() -> bool) -> Answer {
        let mut n = 0;
        while n < self.config.max_repairs && inc() {
            n += 1;
            self.stats.moves += 1;
            #[cfg(debug_assertions)]
            self.debug_check_coverage();
            let Some((down, e)) = self.next_to_repair() else {
                return Answer::Sat;
            };
            let is_correct = self.eval_is_correct(e);
            trace!(
                "{} {}: {} {} {}",
                if down { "d" } else { "u" },
                e,
                self.terms.bounded_pp(e, 1),
                self.value_str(e),
                if is_correct { "C" } else { "U" }
            );
            if is_correct {
                // A prior move may have incidentally repaired this term.
                if down {
                    self.repair_down.remove(e);
                } else {
                    self.repair_up.remove(e);
                }
            } else if down {
                self.try_repair_down(e);
            } else {
                self.try_repair_up(e);
            }
        }
        Answer::Unknown
    }

    /// Main entry: searches until satisfied or the budgets are exhausted.
    pub fn run(&mut self) -> Answer {
        self.run_with(|| true)
    }

    /// As [`run`][Sls::run], consulting `inc` between moves and between
    /// restarts; when it returns false the search stops with `Unknown`.
    pub fn run_with(&mut self, mut inc: impl FnMut() -> bool) -> Answer {
        self.stats.reset();
        loop {
            if let Answer::Sat = self.search(&mut inc) {
                return Answer::Sat;
            }
            if !inc() || self.stats.restarts >= self.config.max_restarts {
                return Answer::Unknown;
            }
            self.stats.restarts += 1;
            self.trace_restart();
            self.reinit_eval();
        }
    }

    fn trace_restart(&self) {
        debug!(
            "(bvsls :restarts {} :repair-down {} :repair-up {})",
            self.stats.restarts,
            self.repair_down.len(),
            self.repair_up.len()
        );
    }

    fn try_repair_down(&mut self, e: TermId) {
        let n = self.terms.term(e).arity();
        if n > 0 {
            let s = self.rng.random_range(0..n);
            for i in 0..n {
                if self.try_repair_child(e, (i + s) % n) {
                    return;
                }
            }
        }
        // No child is repairable: give up propagating downward and let
        // the change bubble up on the next visit.
        self.repair_down.remove(e);
        self.repair_up.insert(e);
    }

    fn try_repair_child(&mut self, e: TermId, i: usize) -> bool {
        let child = self.terms.children(e)[i];
        let was_repaired = self.eval.try_repair(&self.terms, e, i);
        if was_repaired {
            self.repair_down.insert(child);
            for &p in self.terms.parents(child) {
                self.repair_up.insert(p);
            }
        }
        was_repaired
    }

    fn try_repair_up(&mut self, e: TermId) {
        self.repair_up.remove(e);
        if self.terms.is_assertion(e) {
            // An assertion's value is pinned to true; restart downward
            // propagation from it instead of overwriting val0.
            self.repair_down.insert(e);
        } else {
            self.eval.repair_up(&self.terms, e);
            for &p in self.terms.parents(e) {
                self.repair_up.insert(p);
            }
        }
    }

    fn eval_is_correct(&self, e: TermId) -> bool {
        if !self.eval.can_eval1(e) {
            return false;
        }
        match self.terms.sort(e) {
            Sort::Bool => self.eval.bval0(e) == self.eval.bval1(e),
            Sort::BitVec(_) => self.eval.wval0(e) == self.eval.wval1(e),
        }
    }

    fn value_str(&self, e: TermId) -> String {
        match self.terms.sort(e) {
            Sort::Bool => (if self.eval.bval0(e) { "T" } else { "F" }).to_string(),
            Sort::BitVec(_) => self.eval.wval0(e).to_string(),
        }
    }

    fn is_fixed(&self, e: TermId) -> bool {
        match self.terms.sort(e) {
            Sort::Bool => self.eval.is_fixed0(e),
            Sort::BitVec(w) => self.eval.fixed_bits(e) == crate::value::BvValue::mask_of(w),
        }
    }

    /// Every incorrect term must sit in `down` or `up`, otherwise the
    /// search can lose progress. Checked before each move in debug builds.
    #[cfg(debug_assertions)]
    fn debug_check_coverage(&self) {
        for t in self.terms.ids() {
            if self.eval.can_eval1(t) && !self.eval_is_correct(t) {
                debug_assert!(
                    self.repair_down.contains(t) || self.repair_up.contains(t),
                    "incorrect term {} is in neither repair set",
                    t
                );
            }
        }
    }

    /// Values of the uninterpreted constants in the assertion cone.
    /// Meaningful after [`run`][Sls::run] returned [`Answer::Sat`].
    pub fn model(&self) -> Model {
        let mut model = Model::default();
        for id in self.eval.sort_assertions(&self.terms) {
            let Op::Var(name) = self.terms.op(id) else {
                continue;
            };
            let value = match self.terms.sort(id) {
                Sort::Bool => ModelValue::Bool(self.eval.bval0(id)),
                Sort::BitVec(w) => ModelValue::BitVec {
                    width: w,
                    value: BigUint::from(self.eval.wval0(id).bits()),
                },
            };
            model.push(name.clone(), value);
        }
        model
    }

    /// Debug dump: one line per term in the assertion cone with its id,
    /// bounded rendering, fixedness, repair-set membership, and value.
    pub fn display(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        for id in self.eval.sort_assertions(&self.terms) {
            write!(out, "{}: {} ", id, self.terms.bounded_pp(id, 1))?;
            if self.is_fixed(id) {
                write!(out, "f ")?;
            }
            if self.repair_down.contains(id) {
                write!(out, "d ")?;
            }
            if self.repair_up.contains(id) {
                write!(out, "u ")?;
            }
            writeln!(out, "{}", self.value_str(id))?;
        }
        Ok(())
    }
}

impl fmt::Display for Sls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.display(f)
    }
}

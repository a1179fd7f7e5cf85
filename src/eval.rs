//! The candidate-assignment evaluator.
//!
//! Owns, per term, the *current* value (`val0`) and the value *recomputed*
//! from the children's current values (`val1`), together with the fixed
//! bits derived from the input formula. The discrepancy between the two
//! values is what the scheduler repairs: downward moves ask
//! [`try_repair`][Evaluator::try_repair] to change one child using the
//! operator's invertibility condition, upward moves ask
//! [`repair_up`][Evaluator::repair_up] to accept the children's values.
//!
//! `val1` is maintained eagerly: every committed change to a term's `val0`
//! recomputes `val1` of its direct parents, so reads are plain loads.
//! Uninterpreted constants have `val1` defined as their `val0` and are
//! therefore never incorrect; numerals and the Boolean constants evaluate
//! to themselves and are fully fixed.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::bitset::BitSet;
use crate::op::Op;
use crate::terms::Terms;
use crate::types::{Sort, TermId};
use crate::value::{invert_odd, BvValue};

#[derive(Debug, Copy, Clone)]
struct BoolSlot {
    val0: bool,
    val1: bool,
    fixed: bool,
}

#[derive(Debug, Copy, Clone)]
struct WordSlot {
    val0: BvValue,
    val1: BvValue,
    fixed: u64,
}

#[derive(Debug, Copy, Clone)]
enum Slot {
    Undef,
    Bool(BoolSlot),
    Word(WordSlot),
}

/// One evaluated value, either sort.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Val {
    Bool(bool),
    Word(BvValue),
}

#[derive(Clone)]
pub struct Evaluator {
    slots: Vec<Slot>,
    rng: ChaCha8Rng,
}

impl Evaluator {
    pub fn new(seed: u64) -> Self {
        Evaluator {
            slots: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    /// True once `val1` is defined for `id`, i.e. every child has been
    /// evaluated.
    pub fn can_eval1(&self, id: TermId) -> bool {
        matches!(self.slots.get(id.index()), Some(Slot::Bool(_) | Slot::Word(_)))
    }

    pub fn bval0(&self, id: TermId) -> bool {
        self.bool_slot(id).val0
    }

    pub fn bval1(&self, id: TermId) -> bool {
        self.bool_slot(id).val1
    }

    pub fn wval0(&self, id: TermId) -> BvValue {
        self.word_slot(id).val0
    }

    pub fn wval1(&self, id: TermId) -> BvValue {
        self.word_slot(id).val1
    }

    /// Whether a Boolean term's value was determined by the formula.
    pub fn is_fixed0(&self, id: TermId) -> bool {
        self.bool_slot(id).fixed
    }

    /// Fixed-bit mask of a bit-vector term.
    pub fn fixed_bits(&self, id: TermId) -> u64 {
        self.word_slot(id).fixed
    }

    pub fn is_fixed_bit(&self, id: TermId, i: u32) -> bool {
        let slot = self.word_slot(id);
        debug_assert!(i < slot.val0.width());
        (slot.fixed >> i) & 1 != 0
    }

    /// Overwrites a Boolean term's `val0`, bypassing fixedness. Used by
    /// the scheduler to pin a false assertion's desired value to true.
    pub fn set(&mut self, terms: &Terms, id: TermId, v: bool) {
        self.bool_slot(id); // sort check
        self.commit_bool(terms, id, v);
    }

    fn bool_slot(&self, id: TermId) -> &BoolSlot {
        match &self.slots[id.index()] {
            Slot::Bool(s) => s,
            Slot::Word(_) => panic!("Term {} is not Boolean", id),
            Slot::Undef => panic!("Value of {} read before init_eval", id),
        }
    }

    fn bool_slot_mut(&mut self, id: TermId) -> &mut BoolSlot {
        match &mut self.slots[id.index()] {
            Slot::Bool(s) => s,
            Slot::Word(_) => panic!("Term {} is not Boolean", id),
            Slot::Undef => panic!("Value of {} written before init_eval", id),
        }
    }

    fn word_slot(&self, id: TermId) -> &WordSlot {
        match &self.slots[id.index()] {
            Slot::Word(s) => s,
            Slot::Bool(_) => panic!("Term {} is not a bit-vector", id),
            Slot::Undef => panic!("Value of {} read before init_eval", id),
        }
    }

    fn word_slot_mut(&mut self, id: TermId) -> &mut WordSlot {
        match &mut self.slots[id.index()] {
            Slot::Word(s) => s,
            Slot::Bool(_) => panic!("Term {} is not a bit-vector", id),
            Slot::Undef => panic!("Value of {} written before init_eval", id),
        }
    }

    fn val0(&self, id: TermId) -> Val {
        match &self.slots[id.index()] {
            Slot::Bool(s) => Val::Bool(s.val0),
            Slot::Word(s) => Val::Word(s.val0),
            Slot::Undef => panic!("Value of {} read before init_eval", id),
        }
    }
}

// Initialization.
impl Evaluator {
    /// Assigns an initial `val0` to every term: leaves from the oracle
    /// (one call per bit for bit-vectors), internal terms bottom-up.
    ///
    /// Re-initialization recomputes all values but preserves the fixed
    /// annotations derived by a prior [`init_fixed`][Evaluator::init_fixed];
    /// the oracle is expected to return fixed leaf bits at their fixed
    /// values.
    pub fn init_eval(&mut self, terms: &Terms, oracle: &mut dyn FnMut(TermId, u32) -> bool) {
        let old = std::mem::take(&mut self.slots);
        self.slots = Vec::with_capacity(terms.len());
        for id in terms.ids() {
            let node = terms.term(id);
            let slot = match (&node.op, node.sort) {
                (Op::True, _) => Slot::Bool(BoolSlot { val0: true, val1: true, fixed: true }),
                (Op::False, _) => Slot::Bool(BoolSlot { val0: false, val1: false, fixed: true }),
                (Op::Num(v), Sort::BitVec(w)) => {
                    let val = BvValue::new(w, *v);
                    Slot::Word(WordSlot { val0: val, val1: val, fixed: BvValue::mask_of(w) })
                }
                (Op::Num(_), Sort::Bool) => unreachable!("Numeral with Boolean sort"),
                (Op::Var(_), Sort::Bool) => {
                    let v = oracle(id, 0);
                    let fixed = matches!(old.get(id.index()), Some(Slot::Bool(s)) if s.fixed);
                    Slot::Bool(BoolSlot { val0: v, val1: v, fixed })
                }
                (Op::Var(_), Sort::BitVec(w)) => {
                    let mut val = BvValue::zero(w);
                    for i in 0..w {
                        val = val.with_bit(i, oracle(id, i));
                    }
                    let fixed = match old.get(id.index()) {
                        Some(Slot::Word(s)) => s.fixed,
                        _ => 0,
                    };
                    Slot::Word(WordSlot { val0: val, val1: val, fixed })
                }
                _ => {
                    // Internal term: children are already evaluated.
                    // Values are recomputed from scratch; only the fixed
                    // annotations derived by an earlier init_fixed carry
                    // over to a re-initialization.
                    match self.eval1(terms, id) {
                        Val::Bool(b) => {
                            let fixed = matches!(old.get(id.index()), Some(Slot::Bool(s)) if s.fixed);
                            Slot::Bool(BoolSlot { val0: b, val1: b, fixed })
                        }
                        Val::Word(v) => {
                            let fixed = match old.get(id.index()) {
                                Some(Slot::Word(s)) => s.fixed,
                                _ => 0,
                            };
                            Slot::Word(WordSlot { val0: v, val1: v, fixed })
                        }
                    }
                }
            };
            self.slots.push(slot);
        }
    }

    /// Derives fixed bits from the assertions and pins the corresponding
    /// values: a worklist of forced Boolean values seeded with every
    /// assertion forced to true, followed by a bottom-up re-propagation
    /// that leaves fixed bits alone.
    pub fn init_fixed(&mut self, terms: &Terms) {
        let mut queue: Vec<(TermId, bool)> =
            terms.assertions().iter().map(|&a| (a, true)).collect();
        while let Some((id, forced)) = queue.pop() {
            {
                let slot = self.bool_slot_mut(id);
                if slot.fixed {
                    // Already pinned; a conflicting entailment keeps the
                    // first value (the formula has no model either way).
                    continue;
                }
                slot.fixed = true;
                slot.val0 = forced;
            }
            let node = terms.term(id);
            if node.op.is_leaf() {
                self.bool_slot_mut(id).val1 = forced;
                continue;
            }
            match &node.op {
                Op::Not => queue.push((node.children[0], !forced)),
                Op::And if forced => {
                    for &c in &node.children {
                        queue.push((c, true));
                    }
                }
                Op::Or if !forced => {
                    for &c in &node.children {
                        queue.push((c, false));
                    }
                }
                Op::Implies if !forced => {
                    queue.push((node.children[0], true));
                    queue.push((node.children[1], false));
                }
                Op::Eq if forced => {
                    let (a, b) = (node.children[0], node.children[1]);
                    if terms.sort(a).is_bool() {
                        match (terms.op(a), terms.op(b)) {
                            (Op::True, _) => queue.push((b, true)),
                            (Op::False, _) => queue.push((b, false)),
                            (_, Op::True) => queue.push((a, true)),
                            (_, Op::False) => queue.push((a, false)),
                            _ => {}
                        }
                    } else {
                        match (terms.op(a), terms.op(b)) {
                            (Op::Num(v), Op::Var(_)) => self.fix_word(b, *v),
                            (Op::Var(_), Op::Num(v)) => self.fix_word(a, *v),
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        self.repropagate(terms);
    }

    fn fix_word(&mut self, id: TermId, bits: u64) {
        let slot = self.word_slot_mut(id);
        if (bits ^ slot.val0.bits()) & slot.fixed != 0 {
            // Conflicts with bits fixed earlier; keep those.
            return;
        }
        slot.val0 = slot.val0.with_bits(bits);
        slot.val1 = slot.val0;
        slot.fixed = slot.val0.mask();
    }

    /// Recomputes every internal term bottom-up, respecting fixed bits.
    fn repropagate(&mut self, terms: &Terms) {
        for id in terms.ids() {
            if terms.term(id).op.is_leaf() {
                continue;
            }
            let v1 = self.eval1(terms, id);
            match (v1, &mut self.slots[id.index()]) {
                (Val::Bool(b), Slot::Bool(s)) => {
                    s.val1 = b;
                    if !s.fixed {
                        s.val0 = b;
                    }
                }
                (Val::Word(v), Slot::Word(s)) => {
                    s.val1 = v;
                    let bits = (v.bits() & !s.fixed) | (s.val0.bits() & s.fixed);
                    s.val0 = v.with_bits(bits);
                }
                _ => unreachable!("Slot sort drifted from term sort"),
            }
        }
    }
}

// Evaluation.
impl Evaluator {
    /// Value of `id` recomputed from the children's `val0`.
    fn eval1(&self, terms: &Terms, id: TermId) -> Val {
        let node = terms.term(id);
        let c = &node.children;
        match &node.op {
            Op::True => Val::Bool(true),
            Op::False => Val::Bool(false),
            Op::Var(_) | Op::Num(_) => self.val0(id),
            Op::Not => Val::Bool(!self.bval0(c[0])),
            Op::And => Val::Bool(c.iter().all(|&x| self.bval0(x))),
            Op::Or => Val::Bool(c.iter().any(|&x| self.bval0(x))),
            Op::Xor => Val::Bool(self.bval0(c[0]) ^ self.bval0(c[1])),
            Op::Implies => Val::Bool(!self.bval0(c[0]) || self.bval0(c[1])),
            Op::Ite => {
                if self.bval0(c[0]) {
                    self.val0(c[1])
                } else {
                    self.val0(c[2])
                }
            }
            Op::Eq => Val::Bool(self.val0(c[0]) == self.val0(c[1])),
            Op::Ult => Val::Bool(self.wval0(c[0]).bits() < self.wval0(c[1]).bits()),
            Op::Ule => Val::Bool(self.wval0(c[0]).bits() <= self.wval0(c[1]).bits()),
            Op::Slt => Val::Bool(self.wval0(c[0]).biased() < self.wval0(c[1]).biased()),
            Op::Sle => Val::Bool(self.wval0(c[0]).biased() <= self.wval0(c[1]).biased()),
            Op::BvNot => Val::Word(self.wval0(c[0]).not()),
            Op::BvNeg => Val::Word(self.wval0(c[0]).neg()),
            Op::BvAnd => Val::Word(self.wval0(c[0]).and(self.wval0(c[1]))),
            Op::BvOr => Val::Word(self.wval0(c[0]).or(self.wval0(c[1]))),
            Op::BvXor => Val::Word(self.wval0(c[0]).xor(self.wval0(c[1]))),
            Op::BvAdd => Val::Word(self.wval0(c[0]).add(self.wval0(c[1]))),
            Op::BvSub => Val::Word(self.wval0(c[0]).sub(self.wval0(c[1]))),
            Op::BvMul => Val::Word(self.wval0(c[0]).mul(self.wval0(c[1]))),
            Op::BvShl => Val::Word(self.wval0(c[0]).shl(self.wval0(c[1]).bits())),
            Op::BvLshr => Val::Word(self.wval0(c[0]).lshr(self.wval0(c[1]).bits())),
            Op::BvAshr => Val::Word(self.wval0(c[0]).ashr(self.wval0(c[1]).bits())),
            Op::Concat => Val::Word(self.wval0(c[0]).concat(self.wval0(c[1]))),
            Op::Extract { hi, lo } => Val::Word(self.wval0(c[0]).extract(*hi, *lo)),
        }
    }

    fn refresh_val1(&mut self, terms: &Terms, id: TermId) {
        let v1 = self.eval1(terms, id);
        match (v1, &mut self.slots[id.index()]) {
            (Val::Bool(b), Slot::Bool(s)) => s.val1 = b,
            (Val::Word(v), Slot::Word(s)) => s.val1 = v,
            _ => unreachable!("Slot sort drifted from term sort"),
        }
    }

    fn refresh_parents(&mut self, terms: &Terms, id: TermId) {
        for &p in terms.parents(id) {
            self.refresh_val1(terms, p);
        }
    }

    fn commit_bool(&mut self, terms: &Terms, id: TermId, v: bool) {
        self.bool_slot_mut(id).val0 = v;
        if terms.term(id).op.is_leaf() {
            self.bool_slot_mut(id).val1 = v;
        }
        self.refresh_parents(terms, id);
    }

    fn commit_word(&mut self, terms: &Terms, id: TermId, bits: u64) {
        {
            let slot = self.word_slot_mut(id);
            slot.val0 = slot.val0.with_bits(bits);
            if terms.term(id).op.is_leaf() {
                slot.val1 = slot.val0;
            }
        }
        self.refresh_parents(terms, id);
    }

    /// Commits `v` to a Boolean term unless it is fixed or unchanged.
    fn try_set_bool(&mut self, terms: &Terms, id: TermId, v: bool) -> bool {
        let slot = self.bool_slot(id);
        if slot.fixed || slot.val0 == v {
            return false;
        }
        self.commit_bool(terms, id, v);
        true
    }

    /// Commits `bits` to a bit-vector term unless the change disagrees
    /// with a fixed bit or nothing changes.
    fn try_set_word(&mut self, terms: &Terms, id: TermId, bits: u64) -> bool {
        let (cur, fixed) = {
            let slot = self.word_slot(id);
            (slot.val0, slot.fixed)
        };
        let bits = bits & cur.mask();
        if (bits ^ cur.bits()) & fixed != 0 || bits == cur.bits() {
            return false;
        }
        self.commit_word(terms, id, bits);
        true
    }

    fn try_set_val(&mut self, terms: &Terms, id: TermId, v: Val) -> bool {
        match v {
            Val::Bool(b) => self.try_set_bool(terms, id, b),
            Val::Word(w) => self.try_set_word(terms, id, w.bits()),
        }
    }
}

// Repair.
impl Evaluator {
    /// Attempts to change the `i`-th child of `e` so that `e`'s
    /// recomputed value becomes its current (desired) value. Returns true
    /// iff the child's `val0` was actually changed.
    pub fn try_repair(&mut self, terms: &Terms, e: TermId, i: usize) -> bool {
        let node = terms.term(e);
        let child = node.children[i];
        if terms.term(child).op.is_const() {
            return false;
        }
        match &node.op {
            Op::Not => {
                let d = self.bval0(e);
                self.try_set_bool(terms, child, !d)
            }
            // Desired true needs this child true; desired false is
            // reached by making this child false.
            Op::And | Op::Or => {
                let d = self.bval0(e);
                self.try_set_bool(terms, child, d)
            }
            Op::Xor => {
                let d = self.bval0(e);
                let s = self.bval0(node.children[1 - i]);
                self.try_set_bool(terms, child, d ^ s)
            }
            Op::Implies => self.repair_implies(terms, e, i),
            Op::Ite => self.repair_ite(terms, e, i),
            Op::Eq => self.repair_eq(terms, e, i),
            Op::Ult => self.repair_cmp(terms, e, i, false, false),
            Op::Ule => self.repair_cmp(terms, e, i, true, false),
            Op::Slt => self.repair_cmp(terms, e, i, false, true),
            Op::Sle => self.repair_cmp(terms, e, i, true, true),
            Op::BvNot => {
                let d = self.wval0(e);
                self.try_set_word(terms, child, d.not().bits())
            }
            Op::BvNeg => {
                let d = self.wval0(e);
                self.try_set_word(terms, child, d.neg().bits())
            }
            Op::BvXor => {
                let d = self.wval0(e);
                let s = self.wval0(node.children[1 - i]);
                self.try_set_word(terms, child, d.bits() ^ s.bits())
            }
            Op::BvAdd => {
                let d = self.wval0(e);
                let s = self.wval0(node.children[1 - i]);
                self.try_set_word(terms, child, d.sub(s).bits())
            }
            Op::BvSub => {
                let d = self.wval0(e);
                let s = self.wval0(node.children[1 - i]);
                let cand = if i == 0 { d.add(s) } else { s.sub(d) };
                self.try_set_word(terms, child, cand.bits())
            }
            Op::BvAnd => {
                let d = self.wval0(e);
                let s = self.wval0(node.children[1 - i]);
                // Invertibility: every desired 1 must be allowed by `s`.
                if d.bits() & !s.bits() & d.mask() != 0 {
                    return false;
                }
                let cur = self.wval0(child);
                let cand = (d.bits() & s.bits()) | (cur.bits() & !s.bits() & d.mask());
                self.try_set_word(terms, child, cand)
            }
            Op::BvOr => {
                let d = self.wval0(e);
                let s = self.wval0(node.children[1 - i]);
                if s.bits() & !d.bits() & d.mask() != 0 {
                    return false;
                }
                let cur = self.wval0(child);
                let cand = (d.bits() & !s.bits()) | (cur.bits() & s.bits());
                self.try_set_word(terms, child, cand)
            }
            Op::BvMul => {
                let d = self.wval0(e);
                let s = self.wval0(node.children[1 - i]);
                if s.is_zero() {
                    return false;
                }
                let t = s.bits().trailing_zeros();
                if t > 0 && d.bits() & ((1u64 << t) - 1) != 0 {
                    return false;
                }
                // x is determined modulo 2^(w-t); the top t bits are free.
                let inv = invert_odd(s.bits() >> t);
                let determined = d.mask() >> t;
                let cur = self.wval0(child);
                let base = inv.wrapping_mul(d.bits() >> t) & determined;
                let cand = base | (cur.bits() & !determined & d.mask());
                self.try_set_word(terms, child, cand)
            }
            Op::BvShl | Op::BvLshr | Op::BvAshr => self.repair_shift(terms, e, i),
            Op::Concat => {
                let d = self.wval0(e);
                let (hi_c, lo_c) = (node.children[0], node.children[1]);
                let wl = terms.sort(lo_c).width();
                if i == 0 {
                    let lo_v = self.wval0(lo_c);
                    if d.bits() & lo_v.mask() != lo_v.bits() {
                        return false;
                    }
                    self.try_set_word(terms, hi_c, d.bits() >> wl)
                } else {
                    let hi_v = self.wval0(hi_c);
                    if d.bits() >> wl != hi_v.bits() {
                        return false;
                    }
                    self.try_set_word(terms, lo_c, d.bits() & BvValue::mask_of(wl))
                }
            }
            Op::Extract { hi, lo } => {
                let d = self.wval0(e);
                let cur = self.wval0(child);
                let seg = BvValue::mask_of(hi - lo + 1) << lo;
                let cand = (cur.bits() & !seg) | ((d.bits() << lo) & seg);
                self.try_set_word(terms, child, cand)
            }
            Op::True | Op::False | Op::Var(_) | Op::Num(_) => {
                panic!("try_repair on a leaf term")
            }
        }
    }

    fn repair_implies(&mut self, terms: &Terms, e: TermId, i: usize) -> bool {
        let d = self.bval0(e);
        let node = terms.term(e);
        let (a, b) = (node.children[0], node.children[1]);
        if i == 0 {
            // A false antecedent satisfies the implication; a true one is
            // needed to falsify it (together with a false consequent).
            self.try_set_bool(terms, a, !d)
        } else if d {
            self.try_set_bool(terms, b, true)
        } else if !self.bval0(a) {
            // Antecedent false: the implication is true whatever `b` is.
            false
        } else {
            self.try_set_bool(terms, b, false)
        }
    }

    fn repair_ite(&mut self, terms: &Terms, e: TermId, i: usize) -> bool {
        let node = terms.term(e);
        let (c, t, els) = (node.children[0], node.children[1], node.children[2]);
        let d = self.val0(e);
        match i {
            0 => {
                let tv = self.val0(t);
                let ev = self.val0(els);
                if tv == d && ev != d {
                    self.try_set_bool(terms, c, true)
                } else if ev == d && tv != d {
                    self.try_set_bool(terms, c, false)
                } else {
                    false
                }
            }
            1 => {
                if !self.bval0(c) {
                    return false;
                }
                self.try_set_val(terms, t, d)
            }
            2 => {
                if self.bval0(c) {
                    return false;
                }
                self.try_set_val(terms, els, d)
            }
            _ => unreachable!("Ite has three children"),
        }
    }

    fn repair_eq(&mut self, terms: &Terms, e: TermId, i: usize) -> bool {
        let d = self.bval0(e);
        let node = terms.term(e);
        let child = node.children[i];
        let other = node.children[1 - i];
        match terms.sort(child) {
            Sort::Bool => {
                let s = self.bval0(other);
                self.try_set_bool(terms, child, if d { s } else { !s })
            }
            Sort::BitVec(_) => {
                let s = self.wval0(other);
                if d {
                    self.try_set_word(terms, child, s.bits())
                } else {
                    let cur = self.wval0(child);
                    if cur.bits() != s.bits() {
                        return false;
                    }
                    let free = cur.mask() & !self.fixed_bits(child);
                    if free == 0 {
                        return false;
                    }
                    let k = self.pick_set_bit(free);
                    self.try_set_word(terms, child, cur.bits() ^ (1u64 << k))
                }
            }
        }
    }

    fn repair_cmp(&mut self, terms: &Terms, e: TermId, i: usize, le: bool, signed: bool) -> bool {
        let d = self.bval0(e);
        let node = terms.term(e);
        let child = node.children[i];
        let other = self.wval0(node.children[1 - i]);
        let mask = other.mask();
        let sign = if signed { other.sign_mask() } else { 0 };
        let s = other.bits() ^ sign;
        let Some(cand) = self.cmp_candidate(i == 0, le, d, s, mask) else {
            return false;
        };
        self.try_set_word(terms, child, cand ^ sign)
    }

    /// A uniformly random candidate from the interval satisfying the
    /// (possibly negated) comparison against `s`, or `None` when the
    /// interval is empty.
    fn cmp_candidate(&mut self, left: bool, le: bool, d: bool, s: u64, mask: u64) -> Option<u64> {
        match (left, le, d) {
            // x < s
            (true, false, true) => (s > 0).then(|| self.rng.random_range(0..s)),
            // x >= s
            (true, false, false) => Some(self.rng.random_range(s..=mask)),
            // x <= s
            (true, true, true) => Some(self.rng.random_range(0..=s)),
            // x > s
            (true, true, false) => (s < mask).then(|| self.rng.random_range(s + 1..=mask)),
            // s < x
            (false, false, true) => (s < mask).then(|| self.rng.random_range(s + 1..=mask)),
            // s >= x
            (false, false, false) => Some(self.rng.random_range(0..=s)),
            // s <= x
            (false, true, true) => Some(self.rng.random_range(s..=mask)),
            // s > x
            (false, true, false) => (s > 0).then(|| self.rng.random_range(0..s)),
        }
    }

    fn repair_shift(&mut self, terms: &Terms, e: TermId, i: usize) -> bool {
        let node = terms.term(e);
        let d = self.wval0(e);
        let (x, amt) = (node.children[0], node.children[1]);
        let w = d.width();
        let mask = d.mask();
        if i == 1 {
            // Scan for an amount reproducing the desired value.
            let xv = self.wval0(x);
            for a in 0..=w as u64 {
                if a > mask {
                    break;
                }
                let res = match node.op {
                    Op::BvShl => xv.shl(a),
                    Op::BvLshr => xv.lshr(a),
                    Op::BvAshr => xv.ashr(a),
                    _ => unreachable!(),
                };
                if res == d && self.try_set_word(terms, amt, a) {
                    return true;
                }
            }
            return false;
        }
        let a64 = self.wval0(amt).bits();
        let cur = self.wval0(x);
        match node.op {
            Op::BvShl => {
                if a64 >= w as u64 {
                    // The result is stuck at zero whatever x is.
                    return false;
                }
                let a = a64 as u32;
                let low = if a == 0 { 0 } else { (1u64 << a) - 1 };
                if d.bits() & low != 0 {
                    return false;
                }
                let vacated = mask & !(mask >> a);
                let cand = (d.bits() >> a) | (cur.bits() & vacated);
                self.try_set_word(terms, x, cand)
            }
            Op::BvLshr => {
                if a64 >= w as u64 {
                    return false;
                }
                let a = a64 as u32;
                if a > 0 && d.bits() >> (w - a) != 0 {
                    return false;
                }
                let low = if a == 0 { 0 } else { (1u64 << a) - 1 };
                let cand = ((d.bits() << a) & mask) | (cur.bits() & low);
                self.try_set_word(terms, x, cand)
            }
            Op::BvAshr => {
                if a64 >= w as u64 {
                    // Pure sign fill: only x's sign bit matters.
                    return if d.is_zero() {
                        self.try_set_word(terms, x, cur.bits() & !cur.sign_mask())
                    } else if d.bits() == mask {
                        self.try_set_word(terms, x, cur.bits() | cur.sign_mask())
                    } else {
                        false
                    };
                }
                let a = a64 as u32;
                if a == 0 {
                    return self.try_set_word(terms, x, d.bits());
                }
                // The shifted-in bits of d must replicate x's future msb.
                let sign = d.bit(w - 1 - a);
                let expect = if sign { (1u64 << a) - 1 } else { 0 };
                if d.bits() >> (w - a) != expect {
                    return false;
                }
                let low = (1u64 << a) - 1;
                let cand = ((d.bits() << a) & mask) | (cur.bits() & low);
                self.try_set_word(terms, x, cand)
            }
            _ => unreachable!(),
        }
    }

    /// Index of a uniformly random set bit of `mask`.
    fn pick_set_bit(&mut self, mask: u64) -> u32 {
        debug_assert!(mask != 0);
        let nth = self.rng.random_range(0..mask.count_ones());
        let mut m = mask;
        for _ in 0..nth {
            m &= m - 1;
        }
        m.trailing_zeros()
    }

    /// Recomputes `e`'s `val0` from the children (sets `val0 := val1`),
    /// leaving fixed bits untouched for bit-vectors.
    pub fn repair_up(&mut self, terms: &Terms, e: TermId) {
        match self.slots[e.index()] {
            Slot::Bool(s) => {
                if s.val0 == s.val1 {
                    return;
                }
                self.commit_bool(terms, e, s.val1);
            }
            Slot::Word(s) => {
                let bits = (s.val1.bits() & !s.fixed) | (s.val0.bits() & s.fixed);
                if bits == s.val0.bits() {
                    return;
                }
                self.commit_word(terms, e, bits);
            }
            Slot::Undef => panic!("repair_up before init_eval"),
        }
    }

    /// Ids reachable from the assertions, ascending (hence topologically
    /// ordered). Used for model output and debug dumps.
    pub fn sort_assertions(&self, terms: &Terms) -> Vec<TermId> {
        let mut cone = BitSet::new(terms.len());
        let mut stack: Vec<TermId> = terms.assertions().to_vec();
        while let Some(id) = stack.pop() {
            if !cone.insert(id.index()) {
                continue;
            }
            for &c in terms.children(id) {
                stack.push(c);
            }
        }
        cone.iter().map(|i| TermId::new(i as u32)).collect()
    }
}

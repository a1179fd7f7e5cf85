//! End-to-end searches over small formulas.

use bvsls_rs::engine::{Answer, Sls};
use bvsls_rs::eval::Evaluator;
use bvsls_rs::model::{Model, ModelValue};
use bvsls_rs::op::Op;
use bvsls_rs::params::SlsParams;
use bvsls_rs::terms::Terms;
use bvsls_rs::types::TermId;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn random_oracle(seed: u64) -> impl FnMut(TermId, u32) -> bool {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    move |_, _| rng.random_range(0..2u32) == 0
}

/// Substitutes the model into the assertions and checks they all hold.
fn assert_model_satisfies(sls: &Sls, model: &Model) {
    let terms = sls.terms();
    let mut eval = Evaluator::new(0);
    eval.init_eval(terms, &mut |id, bit| match terms.op(id) {
        Op::Var(name) => match model.get(name) {
            Some(ModelValue::Bool(b)) => *b,
            Some(v) => (v.as_u64().unwrap() >> bit) & 1 != 0,
            None => false,
        },
        _ => false,
    });
    for &a in terms.assertions() {
        assert!(
            eval.bval0(a),
            "assertion {} not satisfied by model:\n{}",
            terms.bounded_pp(a, 3),
            model
        );
    }
}

#[test]
fn unit_equality_is_immediate() {
    // { x = 5 }: init_fixed pins all bits of x; no search is needed.
    let mut terms = Terms::new();
    let x = terms.mk_bv_var("x", 4);
    let five = terms.mk_num(5, 4);
    let eq = terms.mk_eq(x, five);
    terms.assert_term(eq);

    let mut sls = Sls::new(terms);
    sls.init();
    sls.init_eval(random_oracle(0));
    assert_eq!(sls.run(), Answer::Sat);
    assert_eq!(sls.stats().moves, 1);

    let model = sls.model();
    assert_eq!(model.get("x").and_then(ModelValue::as_u64), Some(5));
    assert_model_satisfies(&sls, &model);
}

#[test]
fn single_repair_inverts_addition() {
    // { (x + 1) = 5 }: the invertibility rule for bvadd yields x = 4.
    let mut terms = Terms::new();
    let x = terms.mk_bv_var("x", 4);
    let one = terms.mk_num(1, 4);
    let sum = terms.mk_bvadd(x, one);
    let five = terms.mk_num(5, 4);
    let eq = terms.mk_eq(sum, five);
    terms.assert_term(eq);

    let mut sls = Sls::new(terms);
    sls.init();
    sls.init_eval(random_oracle(1));
    assert_eq!(sls.run(), Answer::Sat);

    let model = sls.model();
    assert_eq!(model.get("x").and_then(ModelValue::as_u64), Some(4));
    assert_model_satisfies(&sls, &model);
}

#[test]
fn conjunction_of_and_and_or() {
    // { x & y = 1, x | y = 3 } over 2 bits: model is {x=3,y=1} or {x=1,y=3}.
    let mut terms = Terms::new();
    let x = terms.mk_bv_var("x", 2);
    let y = terms.mk_bv_var("y", 2);
    let and = terms.mk_bvand(x, y);
    let or = terms.mk_bvor(x, y);
    let one = terms.mk_num(1, 2);
    let three = terms.mk_num(3, 2);
    let eq1 = terms.mk_eq(and, one);
    let eq2 = terms.mk_eq(or, three);
    terms.assert_term(eq1);
    terms.assert_term(eq2);

    let mut sls = Sls::new(terms);
    sls.init();
    sls.updt_params(&SlsParams {
        max_repairs: 10_000,
        max_restarts: 100,
        random_seed: 17,
    })
    .unwrap();
    sls.init_eval(random_oracle(17));
    assert_eq!(sls.run(), Answer::Sat);

    let model = sls.model();
    let xv = model.get("x").and_then(ModelValue::as_u64).unwrap();
    let yv = model.get("y").and_then(ModelValue::as_u64).unwrap();
    assert!((xv, yv) == (3, 1) || (xv, yv) == (1, 3), "got x={}, y={}", xv, yv);
    assert_model_satisfies(&sls, &model);
}

#[test]
fn boolean_mix_selects_the_live_disjunct() {
    // { (x = 0) or (x = 1), not (x = 0) } over 2 bits: x must be 1.
    let mut terms = Terms::new();
    let x = terms.mk_bv_var("x", 2);
    let zero = terms.mk_num(0, 2);
    let one = terms.mk_num(1, 2);
    let eq0 = terms.mk_eq(x, zero);
    let eq1 = terms.mk_eq(x, one);
    let either = terms.mk_or(&[eq0, eq1]);
    let not0 = terms.mk_not(eq0);
    terms.assert_term(either);
    terms.assert_term(not0);

    let mut sls = Sls::new(terms);
    sls.init();
    sls.init_eval(random_oracle(23));
    assert_eq!(sls.run(), Answer::Sat);

    let model = sls.model();
    assert_eq!(model.get("x").and_then(ModelValue::as_u64), Some(1));
    assert_model_satisfies(&sls, &model);
}

#[test]
fn contradiction_exhausts_the_budget() {
    // { x != x } has no model; the engine must answer Unknown.
    let mut terms = Terms::new();
    let x = terms.mk_bv_var("x", 4);
    let eq = terms.mk_eq(x, x);
    let ne = terms.mk_not(eq);
    terms.assert_term(ne);

    let mut sls = Sls::new(terms);
    sls.init();
    sls.updt_params(&SlsParams {
        max_repairs: 1_000,
        max_restarts: 5,
        random_seed: 3,
    })
    .unwrap();
    sls.init_eval(random_oracle(3));
    assert_eq!(sls.run(), Answer::Unknown);
    assert_eq!(sls.stats().restarts, 5);
}

#[test]
fn wide_xor_converges_quickly() {
    // { x ^ a = b } for random 64-bit constants: x = a ^ b in a handful
    // of moves.
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let a: u64 = rng.random();
    let b: u64 = rng.random();

    let mut terms = Terms::new();
    let x = terms.mk_bv_var("x", 64);
    let ca = terms.mk_num(a, 64);
    let cb = terms.mk_num(b, 64);
    let xor = terms.mk_bvxor(x, ca);
    let eq = terms.mk_eq(xor, cb);
    terms.assert_term(eq);

    let mut sls = Sls::new(terms);
    sls.init();
    sls.init_eval(random_oracle(99));
    assert_eq!(sls.run(), Answer::Sat);
    assert!(sls.stats().moves <= 64, "took {} moves", sls.stats().moves);

    let model = sls.model();
    assert_eq!(model.get("x").and_then(ModelValue::as_u64), Some(a ^ b));
    assert_model_satisfies(&sls, &model);
}

#[test]
fn all_fixed_input_is_a_no_op() {
    // Every bit is pinned by init_fixed; the first move already reports
    // satisfaction.
    let mut terms = Terms::new();
    let x = terms.mk_bv_var("x", 8);
    let b = terms.mk_bool_var("b");
    let c = terms.mk_num(0xc3, 8);
    let eq = terms.mk_eq(x, c);
    terms.assert_term(eq);
    terms.assert_term(b);

    let mut sls = Sls::new(terms);
    sls.init();
    sls.init_eval(random_oracle(7));
    assert_eq!(sls.run(), Answer::Sat);
    assert_eq!(sls.stats().moves, 1);

    let model = sls.model();
    assert_eq!(model.get("x").and_then(ModelValue::as_u64), Some(0xc3));
    assert_eq!(model.get("b").and_then(ModelValue::as_bool), Some(true));
}

#[test]
fn deep_addition_chain_propagates_down() {
    // x + 1 + 1 + ... + 1 = 0xfe over 8 bits, 40 levels deep. The down
    // phase peels one level per repair; the move count stays bounded.
    let mut terms = Terms::new();
    let x = terms.mk_bv_var("x", 8);
    let one = terms.mk_num(1, 8);
    let mut acc = x;
    for _ in 0..40 {
        acc = terms.mk_bvadd(acc, one);
    }
    let target = terms.mk_num(0xfe, 8);
    let eq = terms.mk_eq(acc, target);
    terms.assert_term(eq);

    let mut sls = Sls::new(terms);
    sls.init();
    sls.init_eval(random_oracle(5));
    assert_eq!(sls.run(), Answer::Sat);
    assert!(sls.stats().moves < 10_000, "took {} moves", sls.stats().moves);

    let model = sls.model();
    assert_eq!(
        model.get("x").and_then(ModelValue::as_u64),
        Some((0xfeu64.wrapping_sub(40)) & 0xff)
    );
    assert_model_satisfies(&sls, &model);
}

#[test]
fn shared_subterms_repair_through_the_dag() {
    // s = x + y shared by two assertions; repairing one must keep the
    // other's bookkeeping consistent via the parents index.
    let mut terms = Terms::new();
    let x = terms.mk_bv_var("x", 8);
    let y = terms.mk_bv_var("y", 8);
    let s = terms.mk_bvadd(x, y);
    let c1 = terms.mk_num(0x10, 8);
    let c2 = terms.mk_num(0x20, 8);
    let eq = terms.mk_eq(s, c1);
    let lt = terms.mk_ult(s, c2);
    terms.assert_term(eq);
    terms.assert_term(lt);

    let mut sls = Sls::new(terms);
    sls.init();
    sls.init_eval(random_oracle(13));
    assert_eq!(sls.run(), Answer::Sat);

    let model = sls.model();
    let xv = model.get("x").and_then(ModelValue::as_u64).unwrap();
    let yv = model.get("y").and_then(ModelValue::as_u64).unwrap();
    assert_eq!((xv + yv) & 0xff, 0x10);
    assert_model_satisfies(&sls, &model);
}

#[test]
fn determinism_under_seed() {
    fn run_once() -> (Answer, u64, u64, Option<u64>, Option<u64>) {
        let mut terms = Terms::new();
        let x = terms.mk_bv_var("x", 8);
        let y = terms.mk_bv_var("y", 8);
        let and = terms.mk_bvand(x, y);
        let or = terms.mk_bvor(x, y);
        let c1 = terms.mk_num(0x41, 8);
        let c2 = terms.mk_num(0xc3, 8);
        let eq1 = terms.mk_eq(and, c1);
        let eq2 = terms.mk_eq(or, c2);
        terms.assert_term(eq1);
        terms.assert_term(eq2);

        let mut sls = Sls::new(terms);
        sls.init();
        sls.updt_params(&SlsParams {
            max_repairs: 10_000,
            max_restarts: 100,
            random_seed: 42,
        })
        .unwrap();
        sls.init_eval(random_oracle(42));
        let answer = sls.run();
        let model = sls.model();
        (
            answer,
            sls.stats().moves,
            sls.stats().restarts,
            model.get("x").and_then(ModelValue::as_u64),
            model.get("y").and_then(ModelValue::as_u64),
        )
    }

    let first = run_once();
    let second = run_once();
    assert_eq!(first, second);
    assert_eq!(first.0, Answer::Sat);
}

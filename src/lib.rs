//! # bvsls-rs: Stochastic Local Search over Bit-Vectors
//!
//! **`bvsls-rs`** is a stochastic local search (SLS) engine for deciding
//! satisfiability of quantifier-free formulas over fixed-width bit-vectors
//! and Boolean connectives. It mutates a candidate assignment toward one
//! satisfying every assertion, guided by invertibility conditions and
//! fixed-bit annotations.
//!
//! ## How it works
//!
//! Every term carries two values: `val0`, its current assignment, and
//! `val1`, the value recomputed from its children's current assignments.
//! A term where the two diverge is *incorrect*, and the engine keeps two
//! sets of terms awaiting attention:
//!
//! - **down**: the term's current value is the *desired* value; change
//!   descendants (via the operators' invertibility conditions) until the
//!   recomputed value matches it.
//! - **up**: give up on the descendants; accept the children's values and
//!   propagate the recomputed value toward the parents.
//!
//! The loop picks uniformly at random (down before up), re-checks
//! correctness, dispatches the move, and restarts with a mostly-kept,
//! partially randomized assignment when the move budget runs out. Bits
//! determined by the formula (e.g. an asserted `x = 5`) are *fixed* and
//! never mutated. SLS is incomplete: the engine answers `Sat` with a
//! model, or `Unknown` — never "unsatisfiable".
//!
//! ## Key Features
//!
//! - **Bank-Centric Architecture**: All terms are built through the
//!   [`Terms`][crate::terms::Terms] bank, which hash-conses structurally
//!   identical subterms into a shared DAG with dense ids.
//! - **Goal-Driven Repair**: Downward moves invert one operator at a time
//!   (`bvadd`, `bvmul`, shifts, comparisons, ...), computing child values
//!   that respect each child's fixed bits.
//! - **Reproducible Search**: All randomness derives from a single
//!   configurable seed; two runs on the same input are identical.
//! - **Cooperative Cancellation**: The host may pass a predicate that is
//!   consulted between moves and between restarts.
//!
//! ## Basic Usage
//!
//! ```rust
//! use bvsls_rs::engine::{Answer, Sls};
//! use bvsls_rs::terms::Terms;
//!
//! // 1. Build the formula: (x + 1) = 5 over 4-bit x.
//! let mut terms = Terms::new();
//! let x = terms.mk_bv_var("x", 4);
//! let one = terms.mk_num(1, 4);
//! let sum = terms.mk_bvadd(x, one);
//! let five = terms.mk_num(5, 4);
//! let eq = terms.mk_eq(sum, five);
//! terms.assert_term(eq);
//!
//! // 2. Hand the bank to the engine and search.
//! let mut sls = Sls::new(terms);
//! sls.init();
//! sls.init_eval(|_, _| false); // start from the all-zero assignment
//! assert_eq!(sls.run(), Answer::Sat);
//!
//! // 3. Read the model.
//! let model = sls.model();
//! assert_eq!(model.get("x").and_then(|v| v.as_u64()), Some(4));
//! ```
//!
//! ## Core Components
//!
//! - **[`terms`]**: the hash-consing term bank, assertion registry, and
//!   child-to-parents index.
//! - **[`eval`]**: the evaluator owning per-term value state, fixed bits,
//!   and the invertibility-based repair rules.
//! - **[`engine`]**: the repair loop, restart discipline, and model
//!   extraction.
//! - **[`params`]**: tunables (`max_repairs`, `max_restarts`,
//!   `random_seed`).

pub mod bitset;
pub mod engine;
pub mod eval;
pub mod model;
pub mod op;
pub mod params;
pub mod repair_set;
pub mod term;
pub mod terms;
pub mod types;
pub mod utils;
pub mod value;

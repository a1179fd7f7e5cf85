//! Solves a batch of 64-bit xor equations and reports search statistics.

use bvsls_rs::engine::{Answer, Sls};
use bvsls_rs::params::SlsParams;
use bvsls_rs::terms::Terms;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let n = 32;
    let mut rng = ChaCha8Rng::seed_from_u64(2024);

    let mut terms = Terms::new();
    let mut expected = Vec::new();
    for i in 0..n {
        let a: u64 = rng.random();
        let b: u64 = rng.random();
        let x = terms.mk_bv_var(format!("x{}", i), 64);
        let ca = terms.mk_num(a, 64);
        let cb = terms.mk_num(b, 64);
        let xor = terms.mk_bvxor(x, ca);
        let eq = terms.mk_eq(xor, cb);
        terms.assert_term(eq);
        expected.push((format!("x{}", i), a ^ b));
    }

    let mut sls = Sls::new(terms);
    sls.init();
    sls.updt_params(&SlsParams { random_seed: 2024, ..Default::default() })?;
    let mut bits = ChaCha8Rng::seed_from_u64(7);
    sls.init_eval(|_, _| bits.random_range(0..2u32) == 0);

    let time = std::time::Instant::now();
    let answer = sls.run();
    let elapsed = time.elapsed();

    match answer {
        Answer::Sat => {
            let model = sls.model();
            let all_exact = expected
                .iter()
                .all(|(name, v)| model.get(name).and_then(|m| m.as_u64()) == Some(*v));
            println!(
                "sat: {} equations in {} moves, {:?} (exact: {})",
                n,
                sls.stats().moves,
                elapsed,
                all_exact
            );
        }
        Answer::Unknown => println!("unknown after {} moves", sls.stats().moves),
    }
    Ok(())
}

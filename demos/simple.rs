use bvsls_rs::engine::{Answer, Sls};
use bvsls_rs::terms::Terms;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Debug,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    // (x + 1) = 5  and  x & mask = 4, over 4-bit x.
    let mut terms = Terms::new();
    let x = terms.mk_bv_var("x", 4);
    let one = terms.mk_num(1, 4);
    let five = terms.mk_num(5, 4);
    let sum = terms.mk_bvadd(x, one);
    let eq = terms.mk_eq(sum, five);
    terms.assert_term(eq);

    let mask = terms.mk_num(0xc, 4);
    let and = terms.mk_bvand(x, mask);
    let four = terms.mk_num(4, 4);
    let eq2 = terms.mk_eq(and, four);
    terms.assert_term(eq2);

    let mut sls = Sls::new(terms);
    sls.init();

    let mut rng = ChaCha8Rng::seed_from_u64(1);
    sls.init_eval(|_, _| rng.random_range(0..2u32) == 0);

    println!("initial state:");
    println!("{}", sls);

    match sls.run() {
        Answer::Sat => {
            println!("sat ({} moves, {} restarts)", sls.stats().moves, sls.stats().restarts);
            print!("{}", sls.model());
        }
        Answer::Unknown => {
            println!("unknown after {} moves", sls.stats().moves);
        }
    }
    Ok(())
}

use quaero::error::Result;
use quaero::examples::send_more_money;
use quaero::search::{engine::SearchEngine, stats::render_stats_table};

//   SEND
// + MORE
// ------
//  MONEY

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let mut engine = SearchEngine::new();
    match send_more_money::solve(&mut engine)? {
        Some([s, e, n, d, m, o, r, y]) => {
            println!("   {s}{e}{n}{d}");
            println!(" + {m}{o}{r}{e}");
            println!(" ------");
            println!("  {m}{o}{n}{e}{y}");
        }
        None => println!("no solution"),
    }

    println!("\n{}", render_stats_table(engine.stats()));
    Ok(())
}

#[test]
fn demo_solves_the_puzzle() {
    let mut engine = SearchEngine::new();
    let digits = send_more_money::solve(&mut engine).unwrap();
    assert_eq!(digits, Some([9, 5, 6, 7, 1, 0, 8, 2]));
}

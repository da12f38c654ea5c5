use clap::Parser;
use quaero::error::Result;
use quaero::examples::magic_square;
use quaero::search::engine::SearchEngine;

/// Fill a 3x3 square with 1..9 so every row, column and diagonal sums to 15.
#[derive(Parser)]
struct Args {
    /// Print every solution instead of just the first one.
    #[arg(long)]
    all: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut engine = SearchEngine::new();

    let squares = if args.all {
        magic_square::solve_all(&mut engine)?
    } else {
        magic_square::solve_first(&mut engine)?.into_iter().collect()
    };

    for square in &squares {
        for row in square {
            println!("{:>3}{:>3}{:>3}", row[0], row[1], row[2]);
        }
        println!();
    }
    println!("{} solution(s)", squares.len());
    Ok(())
}

#[test]
fn demo_finds_eight_squares() {
    let mut engine = SearchEngine::new();
    let squares = magic_square::solve_all(&mut engine).unwrap();
    assert_eq!(squares.len(), 8);
}

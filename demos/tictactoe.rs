extern crate tiersolve;

use std::error::Error;

use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

use tiersolve::analysis::{best_moves, lookup, tier_stats};
use tiersolve::game::TierGame;
use tiersolve::games::tictactoe::{TicTacToe, O, X};
use tiersolve::record::Value;
use tiersolve::solver::{ParallelSolver, SolverOptions};
use tiersolve::store::MmapStore;

fn init_logging() {
    let level = std::env::var("TIERSOLVE_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LevelFilter::Info);
    let config = ConfigBuilder::new()
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .build();
    // Ignore a logger that is already installed.
    let _ = TermLogger::init(level, config, TerminalMode::Mixed, ColorChoice::Auto);
}

fn main() -> Result<(), Box<dyn Error>> {
    init_logging();
    let game = TicTacToe::default();
    let format = game.record_format();
    let solver = ParallelSolver::new(&game, SolverOptions::from_env())?;
    let index = solver.index();

    let path = std::env::temp_dir().join("tiersolve-tictactoe.db");
    let store = MmapStore::create(&path, index.total(), format.width())?;
    println!(
        "Solving {} positions into {} ({} byte records).",
        index.total(),
        path.display(),
        store.width()
    );
    let summary = solver.solve(&store)?;
    println!(
        "Solved in {:.2?} over {} sweeps.",
        summary.elapsed, summary.sweeps
    );

    for stats in tier_stats(index, &store, &format)? {
        println!("{stats}");
    }

    // Perfect play draws.
    let mut board = game.start();
    let root = lookup(index, &store, &format, &board)?.ok_or("root was not solved")?;
    println!("Empty board: {root}");
    assert_eq!(root.value, Value::Tie);

    // An optimal O answers a corner with the center.
    board[0] = X;
    let replies = best_moves(&game, index, &store, &board)?;
    assert!(replies.iter().any(|(mv, _)| mv.slot == 4));

    // O misplays on the edge, so X should win.
    board[5] = O;
    let record = lookup(index, &store, &format, &board)?.ok_or("position was not solved")?;
    println!("Corner X, edge O: {record}");
    assert_eq!(record.value, Value::Win);

    let mut board = game.start();
    println!("Playing out a perfect game.\n{}\n", game.display(&board));
    while game.primitive_value(&board) == Value::Undecided {
        let moves = best_moves(&game, index, &store, &board)?;
        let (mv, _) = moves.first().ok_or("no move keeps the value")?;
        board[mv.slot] = mv.symbol;
        println!("{}\n", game.display(&board));
    }

    drop(store);
    std::fs::remove_file(&path)?;
    Ok(())
}

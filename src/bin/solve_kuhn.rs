//! Kuhn Poker solver binary.
//!
//! Usage:
//!   cargo run --release --bin solve_kuhn -- [OPTIONS]
//!
//! Options:
//!   --config <FILE>       Configuration JSON file (optional)
//!   --iterations <N>      Iterations to run (default: 10000)
//!   --threads <N>         Number of threads (default: sequential)
//!   --seed <N>            Random seed (optional)
//!   --checkpoint <FILE>   Write the final solver state as JSON
//!   --resume <FILE>       Continue from a checkpoint
//!
//! Set `RUST_LOG=info` (or `debug`) for engine logs.

use std::env;
use std::process::ExitCode;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

use cfr_engine::cfr::{CFRConfig, CFRSolver, SolverState};
use cfr_engine::games::kuhn::KuhnPoker;

const CHUNK: u64 = 100;

struct Options {
    config_file: Option<String>,
    iterations: u64,
    threads: usize,
    seed: Option<u64>,
    checkpoint: Option<String>,
    resume: Option<String>,
}

fn print_help() {
    println!("Usage: solve_kuhn [OPTIONS]");
    println!();
    println!("  --config <FILE>       Configuration JSON file");
    println!("  --iterations <N>      Iterations to run (default: 10000)");
    println!("  --threads <N>         Number of threads");
    println!("  --seed <N>            Random seed");
    println!("  --checkpoint <FILE>   Write the final solver state as JSON");
    println!("  --resume <FILE>       Continue from a checkpoint");
}

fn parse_args() -> Option<Options> {
    let args: Vec<String> = env::args().collect();
    let mut options = Options {
        config_file: None,
        iterations: 10_000,
        threads: 0,
        seed: None,
        checkpoint: None,
        resume: None,
    };

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match args[i].as_str() {
            "--config" | "-c" => options.config_file = value,
            "--iterations" | "-i" => {
                options.iterations = value.and_then(|v| v.parse().ok()).unwrap_or(10_000)
            }
            "--threads" | "-t" => options.threads = value.and_then(|v| v.parse().ok()).unwrap_or(0),
            "--seed" | "-s" => options.seed = value.and_then(|v| v.parse().ok()),
            "--checkpoint" => options.checkpoint = value,
            "--resume" => options.resume = value,
            "--help" | "-h" => {
                print_help();
                return None;
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                print_help();
                return None;
            }
        }
        i += 2;
    }
    Some(options)
}

fn main() -> ExitCode {
    env_logger::init();

    let Some(options) = parse_args() else {
        return ExitCode::SUCCESS;
    };

    let mut config = match &options.config_file {
        Some(path) => match CFRConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => CFRConfig::default(),
    };
    if let Some(seed) = options.seed {
        config = config.with_seed(seed);
    }
    if options.threads > 0 {
        config = config.with_parallel(Some(options.threads));
    }

    println!("=================================================");
    println!("  Kuhn Poker Solver");
    println!("=================================================");
    println!();

    let mut solver = match CFRSolver::new(KuhnPoker::new(), config) {
        Ok(solver) => solver,
        Err(e) => {
            eprintln!("Error creating solver: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(path) = &options.resume {
        let restored = SolverState::load_json(path)
            .map_err(|e| e.to_string())
            .and_then(|state| solver.import_state(&state).map_err(|e| e.to_string()));
        match restored {
            Ok(n) => println!("Resumed {} information sets at iteration {}", n, solver.iteration()),
            Err(e) => {
                eprintln!("Error resuming from {}: {}", path, e);
                return ExitCode::FAILURE;
            }
        }
    }

    let progress = ProgressBar::new(options.iterations);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} iterations [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let start_time = Instant::now();
    let mut remaining = options.iterations;
    while remaining > 0 {
        let chunk = remaining.min(CHUNK);
        match solver.train(chunk) {
            Ok(stats) => progress.set_message(format!("{:.0} it/s", stats.iterations_per_second)),
            Err(e) => {
                progress.abandon();
                eprintln!("Training failed: {}", e);
                return ExitCode::FAILURE;
            }
        }
        progress.inc(chunk);
        remaining -= chunk;
    }
    progress.finish();

    println!();
    println!("Training complete!");
    println!("Total time: {:.2}s", start_time.elapsed().as_secs_f64());
    println!("Info sets: {}", solver.num_info_sets());
    println!();

    println!("Average strategies (Pass / Bet):");
    for history in ["", "p", "b", "pb"] {
        for card in 0..3u8 {
            let (decision, key) = KuhnPoker::information_set(card, history);
            if let Some(strategy) = solver.get_average_strategy(decision, &key) {
                println!(
                    "  {:<6} {:<4} {:>6.3} / {:>6.3}",
                    KuhnPoker::card_name(card),
                    if history.is_empty() { "-" } else { history },
                    strategy[0],
                    strategy[1]
                );
            }
        }
    }
    println!();

    match solver.best_response_summary() {
        Ok(summary) => {
            for (player, value) in summary.average_values.iter().enumerate() {
                println!(
                    "Player {}: value {:>8.5}, best response gains {:.5}",
                    player + 1,
                    value,
                    summary.exploitability(player)
                );
            }
            println!("Exploitability: {:.6} (game value -1/18 = {:.5})", summary.nash_conv(), -1.0 / 18.0);
        }
        Err(e) => {
            eprintln!("Best response failed: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if let Some(path) = &options.checkpoint {
        match solver.export_state().save_json(path) {
            Ok(()) => println!("Checkpoint saved to {}", path),
            Err(e) => {
                eprintln!("Error saving checkpoint: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

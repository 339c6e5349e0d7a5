use chess_tier_engine::{
    ChessRules, EngineConfig, EngineOrchestrator, ExternalEngineConfig, GameRules,
    PositionEvaluator, START_FEN,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Tiered chess move selection and analysis", long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Disable the remote analysis tier
    #[arg(long)]
    offline: bool,

    /// Path to an external UCI engine (e.g. stockfish)
    #[arg(long)]
    engine: Option<String>,

    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pick a move for the side to move
    BestMove {
        #[arg(default_value = START_FEN)]
        fen: String,

        /// Strength from 1 to 20
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=20))]
        skill: Option<u8>,
    },
    /// Evaluate a position from White's point of view
    Evaluate {
        #[arg(default_value = START_FEN)]
        fen: String,

        /// Also print the local static evaluation breakdown
        #[arg(long)]
        breakdown: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if args.offline {
        config.orchestrator.use_remote = false;
    }
    if let Some(program) = args.engine {
        config.orchestrator.external_engine = Some(ExternalEngineConfig::new(program));
    }

    let orchestrator = EngineOrchestrator::new(config.orchestrator.clone())?;

    match args.command {
        Commands::BestMove { fen, skill } => {
            let skill = skill.unwrap_or(config.default_skill);
            let rules = ChessRules::from_fen(&fen)?;
            let status = rules.status();
            if status.is_terminal() {
                println!("{}", status.describe(rules.side_to_move(), rules.in_check()));
                return Ok(());
            }

            let best = orchestrator.request_best_move(&fen, skill).await?;
            println!("Best move: {} ({})", best.chess_move, best.chess_move.coordinate());
            println!("Source: {}", best.source());
            println!(
                "Evaluation: {} - {}",
                best.evaluation.formatted(),
                best.evaluation.description()
            );
        }
        Commands::Evaluate { fen, breakdown } => {
            let rules = ChessRules::from_fen(&fen)?;
            let eval = orchestrator.request_evaluation(&fen).await?;

            println!("Evaluation: {} ({})", eval.formatted(), eval.source);
            println!("{}", eval.description());
            println!("White bar: {:.0}%", eval.bar_percentage());
            if let Some(principal_move) = &eval.principal_move {
                println!("Principal move: {}", principal_move);
            }
            if let Some(depth) = eval.depth {
                println!("Depth: {}", depth);
            }

            let status = rules.status().describe(rules.side_to_move(), rules.in_check());
            if !status.is_empty() {
                println!("{}", status);
            }
            if breakdown {
                print!("{}", PositionEvaluator::default().evaluate_detailed(&rules).display());
            }
        }
    }

    Ok(())
}

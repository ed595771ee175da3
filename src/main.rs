//! Cocina CLI: plan and run recipe chains over field set files.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "cocina",
    version,
    about = "Recipe resolution and execution engine: plan, then run NL, TL or AD"
)]
struct Cli {
    #[command(subcommand)]
    command: cocina::cli::Commands,
}

fn main() {
    if let Err(e) = cocina::cli::init_tracing() {
        eprintln!("warning: {}", e);
    }
    let cli = Cli::parse();
    if let Err(e) = cocina::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

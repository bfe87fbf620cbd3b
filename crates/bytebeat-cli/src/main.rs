//! Bytebeat CLI - play, render and inspect bytebeat formulas.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bytebeat")]
#[command(author, version, about = "Bytebeat formula synthesizer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a formula to stdout as raw PCM, reloading on edits
    Play(commands::play::PlayArgs),

    /// Render a fixed duration to memory, then write raw PCM to stdout
    Render(commands::render::RenderArgs),

    /// Render a fixed duration to a WAV file
    Wav(commands::wav::WavArgs),

    /// Compile a formula and print its first samples
    Check(commands::check::CheckArgs),
}

fn main() -> anyhow::Result<()> {
    // stdout carries audio, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play(args) => commands::play::run(args),
        Commands::Render(args) => commands::render::run(args),
        Commands::Wav(args) => commands::wav::run(args),
        Commands::Check(args) => commands::check::run(args),
    }
}

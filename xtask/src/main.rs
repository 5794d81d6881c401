// Desktop/tooling crate: unwrap/expect/panic acceptable in non-embedded code.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod check;
mod decode;
mod flash;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Fault capture firmware development tasks", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flash firmware to STM32H7 hardware via probe-rs
    Flash {
        /// Build and flash release version
        #[arg(short, long)]
        release: bool,
    },
    /// Check firmware builds for the hardware target and every host feature set
    Check,
    /// Decode a panic region dump (raw bytes or `fault data` console output)
    Decode {
        /// File holding the dump
        file: std::path::PathBuf,
        /// Input format; `auto` picks hex when the file is console text
        #[arg(long, value_enum, default_value_t = decode::Format::Auto)]
        format: decode::Format,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Flash { release } => flash::run(release),
        Commands::Check => check::run(),
        Commands::Decode { file, format } => decode::run(&file, format),
    }
}

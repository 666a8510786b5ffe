//! Drydock CLI - build C/C++ target graphs incrementally

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("drydock=debug")
    } else {
        EnvFilter::new("drydock=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(!cli.no_color)
        .with_target(false)
        .without_time()
        .init();

    let global = cli::GlobalArgs {
        verbose: cli.verbose,
        color: !cli.no_color,
    };

    match cli.command {
        Commands::Build(args) => commands::build::execute(args, global),
        Commands::Clean(args) => commands::clean::execute(args).map(|()| 0),
    }
}

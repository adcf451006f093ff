// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Pounce - a compiler and frame scheduler for Scratch-style projects
//!
//! This is the main entry point for the pounce CLI/REPL.
//!
//! ## Features
//!
//! - Runs a `project.json` for a number of frames or until idle
//! - Dumps the compiled continuations of every target
//! - Interactive REPL for firing events and stepping frames

mod repl;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use owo_colors::OwoColorize;
use pounce_engine::{AsyncEngine, Engine, HeadlessHost, PlayerOptions};
use tracing_subscriber::EnvFilter;

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(name = "pounce", version, about = "Run Scratch-style block projects headlessly")]
struct Cli {
    /// Project JSON to load
    project: PathBuf,

    /// Player options as TOML
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frames per second
    #[arg(long)]
    fps: Option<u32>,

    /// One drain per frame; threads started mid-frame wait for the next
    #[arg(long)]
    turbo: bool,

    /// Reported by the username block
    #[arg(long)]
    username: Option<String>,

    /// Seed for pick random
    #[arg(long)]
    seed: Option<u64>,

    /// Run at most this many frames after the green flag
    #[arg(short, long)]
    frames: Option<u64>,

    /// Print the compiled continuations and exit
    #[arg(long)]
    dump: bool,

    /// Start the interactive REPL instead of running
    #[arg(long)]
    repl: bool,

    /// Debug logging for pounce crates
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// File options with command line overrides applied.
    fn options(&self) -> anyhow::Result<PlayerOptions> {
        let mut options = match &self.config {
            Some(path) => PlayerOptions::load(path)
                .with_context(|| format!("reading {}", path.display()))?,
            None => PlayerOptions::default(),
        };
        if let Some(fps) = self.fps {
            options.fps = fps;
        }
        if self.turbo {
            options.turbo = true;
        }
        if let Some(username) = &self.username {
            options.username = username.clone();
        }
        if self.seed.is_some() {
            options.seed = self.seed;
        }
        Ok(options.validate()?)
    }
}

/// Main entry point - uses tokio runtime for the frame-paced run loop.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("pounce=debug,pounce_engine=debug")
    } else {
        EnvFilter::try_from_env("POUNCE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let options = cli.options()?;
    let project = AsyncEngine::read_project(&cli.project).await?;
    let host = HeadlessHost::new();
    let engine = Engine::new(&project, options, Box::new(host.clone()))
        .with_context(|| format!("loading {}", cli.project.display()))?;

    if cli.dump {
        print!("{}", engine.dump());
        return Ok(());
    }

    if cli.repl || (cli.frames.is_none() && stdin_is_terminal()) {
        let mut repl = repl::Repl::new(engine, host).context("failed to initialize REPL")?;
        repl.run().context("REPL")?;
        return Ok(());
    }

    let engine = AsyncEngine::new(engine);
    engine.green_flag().await;
    let frames = engine.run(cli.frames).await?;

    let shared = engine.engine();
    let engine = shared.read().await;
    println!("{} {}", "frames".dimmed(), frames.yellow());
    print_state(&engine, &host);
    Ok(())
}

/// Whether stdin is an interactive terminal.
fn stdin_is_terminal() -> bool {
    use std::io::IsTerminal;
    std::io::stdin().is_terminal()
}

/// Prints every variable, list and speech bubble.
pub(crate) fn print_state(engine: &Engine, host: &HeadlessHost) {
    for target in engine.runtime().targets().filter(|t| !t.is_clone()) {
        if target.variables.is_empty() && target.lists.is_empty() {
            continue;
        }
        println!("{}", target.name.bright_cyan().bold());
        for (name, value) in &target.variables {
            println!("  {:16} {}", name.cyan(), value.yellow());
        }
        for (name, items) in &target.lists {
            let items: Vec<String> = items.iter().map(ToString::to_string).collect();
            println!("  {:16} [{}]", name.cyan(), items.join(", ").green());
        }
    }
    host.with_state(|state| {
        for (sprite, message) in &state.speech {
            println!("{} {}: {}", "say".dimmed(), sprite.bright_cyan(), message);
        }
    });
}

mod board;
mod cli;
mod commands;
mod editor;
mod jobs;
mod layout;
mod logging;
mod model;
mod pager;
mod render;
mod storage;
mod ui;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let command = args.command.unwrap_or(cli::Command::Tui);
    match command {
        cli::Command::Tui => commands::tui(args.dir),
        cli::Command::List { column } => commands::list(args.dir, column),
        cli::Command::Paths => commands::paths(args.dir),
    }
}

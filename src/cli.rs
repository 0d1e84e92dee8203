use crate::model::Status;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kancli", version, about = "Kanban board over plain markdown files")]
pub struct Cli {
    /// Data directory holding config.json and tasks/
    #[arg(long, global = true, env = "KANCLI_DIR")]
    pub dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Launch the interactive board (default)
    Tui,
    /// Print every column and its tasks
    List {
        /// Only this column: todo, doing or done
        #[arg(long)]
        column: Option<Status>,
    },
    /// Print where the board keeps its files
    Paths,
}

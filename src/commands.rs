use crate::jobs::{self, Command, JobResult};
use crate::logging;
use crate::model::Status;
use crate::storage::StorageLocation;
use crate::ui;
use anyhow::{bail, Context, Result};
use std::path::PathBuf;

pub fn tui(dir: Option<PathBuf>) -> Result<()> {
    let location = resolve(dir)?;
    logging::init_file(&location.log_path())?;
    ui::run(location)
}

pub fn list(dir: Option<PathBuf>, column: Option<Status>) -> Result<()> {
    logging::init_stderr();
    let location = resolve(dir)?;
    let loaded = match jobs::execute(Command::LoadBoard, &location) {
        Some(JobResult::BoardLoaded(result)) => result
            .with_context(|| format!("loading board from {}", location.root.display()))?,
        _ => bail!("board did not load"),
    };
    for (status, tasks) in Status::ALL.into_iter().zip(&loaded.columns) {
        if column.is_some_and(|wanted| wanted != status) {
            continue;
        }
        println!("{} ({})", status, tasks.len());
        if tasks.is_empty() {
            println!("  (empty)");
        }
        for task in tasks {
            println!("  - {}", task.title());
            println!("    {}", task.path.display());
        }
        println!();
    }
    for failure in &loaded.failures {
        eprintln!("skipped: {failure}");
    }
    Ok(())
}

pub fn paths(dir: Option<PathBuf>) -> Result<()> {
    logging::init_stderr();
    let location = resolve(dir)?;
    println!("data:   {}", location.root.display());
    println!("config: {}", location.config_path().display());
    println!("tasks:  {}", location.tasks_dir().display());
    println!("log:    {}", location.log_path().display());
    Ok(())
}

fn resolve(dir: Option<PathBuf>) -> Result<StorageLocation> {
    StorageLocation::resolve(dir).context("locating the board data directory")
}

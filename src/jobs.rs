//! Work the board hands off the input path, and the results that come back.
//!
//! The board only ever emits [`Command`]s. A [`Worker`] renders on detached
//! threads and funnels everything that touches the data directory through one
//! writer thread, in the order it was dispatched. Results come back down a
//! single channel that the event loop drains between key presses.

use crate::model::{Status, Task, TaskError};
use crate::render::{self, RenderError};
use crate::storage::{self, Config, StorageError, StorageLocation};
use ratatui::text::Text;
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    LoadBoard,
    RenderTask {
        path: PathBuf,
        content: String,
        width: u16,
    },
    WriteTaskFile {
        path: PathBuf,
        content: String,
    },
    CreateTaskFile {
        status: Status,
    },
    SaveConfig(Config),
    /// Persist (when the board was ever loaded) and stop the event loop.
    Quit(Option<Config>),
}

#[derive(Debug)]
pub struct LoadedBoard {
    pub config: Config,
    /// Tasks per column, index-aligned with `Status::ALL`.
    pub columns: Vec<Vec<Task>>,
    pub failures: Vec<TaskError>,
}

#[derive(Debug)]
pub enum JobResult {
    BoardLoaded(Result<LoadedBoard, StorageError>),
    TaskRendered {
        path: PathBuf,
        result: Result<Text<'static>, RenderError>,
    },
    TaskWritten {
        path: PathBuf,
        content: String,
        result: Result<(), StorageError>,
    },
    TaskCreated {
        status: Status,
        result: Result<Task, StorageError>,
    },
    ConfigSaved(Result<(), StorageError>),
}

impl Command {
    pub fn is_quit(&self) -> bool {
        matches!(self, Command::Quit(_))
    }

    /// Everything except rendering reads or writes the data directory.
    fn touches_disk(&self) -> bool {
        !matches!(self, Command::RenderTask { .. })
    }
}

/// Runs a command to completion on the calling thread. `Quit` saves
/// synchronously and has no result to deliver.
pub fn execute(command: Command, location: &StorageLocation) -> Option<JobResult> {
    let result = match command {
        Command::LoadBoard => JobResult::BoardLoaded(load_board(location)),
        Command::RenderTask {
            path,
            content,
            width,
        } => {
            debug!(path = %path.display(), width, "rendering task");
            JobResult::TaskRendered {
                path,
                result: render::render(&content, width),
            }
        }
        Command::WriteTaskFile { path, content } => {
            let result = storage::write_task_file(&path, &content);
            if result.is_ok() {
                info!(path = %path.display(), bytes = content.len(), "task saved");
            }
            JobResult::TaskWritten {
                path,
                content,
                result,
            }
        }
        Command::CreateTaskFile { status } => {
            let result = storage::create_task_file(&location.tasks_dir()).map(|path| {
                info!(path = %path.display(), column = %status, "task created");
                Task::new(path, "\n")
            });
            JobResult::TaskCreated { status, result }
        }
        Command::SaveConfig(config) => JobResult::ConfigSaved(storage::save_config(location, &config)),
        Command::Quit(config) => {
            if let Some(config) = config {
                match storage::save_config(location, &config) {
                    Ok(()) => info!("board saved on exit"),
                    Err(err) => error!(error = %err, "could not save board on exit"),
                }
            }
            return None;
        }
    };
    Some(result)
}

fn load_board(location: &StorageLocation) -> Result<LoadedBoard, StorageError> {
    let config = storage::load_config(location)?;
    let mut columns = Vec::with_capacity(Status::COUNT);
    let mut failures = Vec::new();
    for status in Status::ALL {
        let mut tasks = Vec::new();
        for path in config.column(status) {
            match Task::load_from_file(path) {
                Ok(task) => tasks.push(task),
                Err(err) => {
                    warn!(error = %err, column = %status, "skipping unreadable task");
                    failures.push(err);
                }
            }
        }
        columns.push(tasks);
    }
    info!(
        tasks = columns.iter().map(Vec::len).sum::<usize>(),
        failures = failures.len(),
        "board loaded"
    );
    Ok(LoadedBoard {
        config,
        columns,
        failures,
    })
}

/// Runs commands off the UI thread. Disk work is serialized on one writer
/// thread; renders run on their own detached threads.
pub struct Worker {
    location: StorageLocation,
    tx: Sender<JobResult>,
    writes: Option<Sender<Command>>,
    writer: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn new(location: StorageLocation, tx: Sender<JobResult>) -> Self {
        let (writes, queue) = mpsc::channel::<Command>();
        let writer = {
            let location = location.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                for command in queue {
                    deliver(&tx, execute(command, &location));
                }
                debug!("writer thread done");
            })
        };
        Worker {
            location,
            tx,
            writes: Some(writes),
            writer: Some(writer),
        }
    }

    pub fn dispatch(&self, command: Command) {
        if command.touches_disk() {
            match &self.writes {
                Some(writes) => {
                    if writes.send(command).is_err() {
                        error!("writer thread gone, dropping disk job");
                    }
                }
                None => warn!("worker already shut down, dropping disk job"),
            }
            return;
        }
        let location = self.location.clone();
        let tx = self.tx.clone();
        thread::spawn(move || deliver(&tx, execute(command, &location)));
    }

    /// Stops taking disk jobs and waits until the queued ones have landed.
    pub fn shutdown(&mut self) {
        self.writes.take();
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                error!("writer thread panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn deliver(tx: &Sender<JobResult>, result: Option<JobResult>) {
    if let Some(result) = result {
        if tx.send(result).is_err() {
            debug!("event loop gone, dropping job result");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn load_skips_unreadable_tasks() {
        let tmp = TempDir::new().unwrap();
        let location = StorageLocation::new(tmp.path());
        let good = tmp.path().join("good.md");
        fs::write(&good, "# Good").unwrap();
        let mut config = Config::default();
        config.set_column(
            Status::ToDo,
            vec![
                good.display().to_string(),
                tmp.path().join("missing.md").display().to_string(),
            ],
        );
        storage::save_config(&location, &config).unwrap();

        let Some(JobResult::BoardLoaded(Ok(loaded))) = execute(Command::LoadBoard, &location)
        else {
            panic!("expected a loaded board");
        };

        assert_eq!(loaded.columns[0].len(), 1);
        assert_eq!(loaded.columns[0][0].title(), "Good");
        assert_eq!(loaded.failures.len(), 1);
        assert_eq!(loaded.config, config);
    }

    #[test]
    fn quit_saves_and_yields_nothing() {
        let tmp = TempDir::new().unwrap();
        let location = StorageLocation::new(tmp.path());
        let mut config = Config::default();
        config.set_column(Status::Done, vec!["/done.md".into()]);

        assert!(execute(Command::Quit(Some(config.clone())), &location).is_none());
        assert_eq!(storage::load_config(&location).unwrap(), config);
    }

    #[test]
    fn quit_before_load_leaves_disk_alone() {
        let tmp = TempDir::new().unwrap();
        let location = StorageLocation::new(tmp.path().join("never"));
        assert!(execute(Command::Quit(None), &location).is_none());
        assert!(!location.config_path().exists());
    }

    #[test]
    fn worker_delivers_results_over_the_channel() {
        let tmp = TempDir::new().unwrap();
        let location = StorageLocation::new(tmp.path());
        let (tx, rx) = mpsc::channel();
        let worker = Worker::new(location.clone(), tx);

        worker.dispatch(Command::CreateTaskFile {
            status: Status::InProgress,
        });
        worker.dispatch(Command::RenderTask {
            path: tmp.path().join("a.md"),
            content: "# A".into(),
            width: 20,
        });

        let mut created = false;
        let mut rendered = false;
        for _ in 0..2 {
            match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                JobResult::TaskCreated { status, result } => {
                    assert_eq!(status, Status::InProgress);
                    let task = result.unwrap();
                    assert!(task.path.starts_with(location.tasks_dir()));
                    assert!(task.path.exists());
                    created = true;
                }
                JobResult::TaskRendered { result, .. } => {
                    assert!(result.is_ok());
                    rendered = true;
                }
                other => panic!("unexpected result {other:?}"),
            }
        }
        assert!(created && rendered);
    }

    fn config_with_todo(count: usize) -> Config {
        let mut config = Config::default();
        config.set_column(
            Status::ToDo,
            (0..count).map(|n| format!("/tasks/{n}.md")).collect(),
        );
        config
    }

    #[test]
    fn rapid_saves_leave_the_last_config_on_disk() {
        for _ in 0..10 {
            let tmp = TempDir::new().unwrap();
            let location = StorageLocation::new(tmp.path());
            let (tx, rx) = mpsc::channel();
            let mut worker = Worker::new(location.clone(), tx);

            for count in (1..=50).rev() {
                worker.dispatch(Command::SaveConfig(config_with_todo(count)));
            }
            worker.shutdown();

            assert_eq!(storage::load_config(&location).unwrap(), config_with_todo(1));
            assert_eq!(rx.try_iter().count(), 50);
        }
    }

    #[test]
    fn quit_lands_after_queued_saves() {
        let tmp = TempDir::new().unwrap();
        let location = StorageLocation::new(tmp.path());
        let (tx, _rx) = mpsc::channel();
        let mut worker = Worker::new(location.clone(), tx);

        for count in 1..=20 {
            worker.dispatch(Command::SaveConfig(config_with_todo(count)));
        }
        worker.dispatch(Command::Quit(Some(config_with_todo(3))));
        worker.shutdown();

        assert_eq!(storage::load_config(&location).unwrap(), config_with_todo(3));
    }
}

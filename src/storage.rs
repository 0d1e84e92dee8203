use crate::model::Status;
use directories::ProjectDirs;
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const CONFIG_FILE: &str = "config.json";
const BACKUP_FILE: &str = "config.json.bak";
const TASKS_DIR: &str = "tasks";
const LOG_FILE: &str = "kancli.log";
const TASK_NAME_LEN: usize = 10;
const CREATE_ATTEMPTS: usize = 8;

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("could not locate a per-user data directory")]
    NoDataDir,
    #[error("creating {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("reading {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("serializing config: {0}")]
    ConfigSerialize(#[from] serde_json::Error),
    #[error("writing {path:?}: {source}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("creating task file in {dir:?}: {source}")]
    TaskCreate {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("writing task {path:?}: {source}")]
    TaskWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Where the board keeps its files: `config.json`, `tasks/` and the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLocation {
    pub root: PathBuf,
}

impl StorageLocation {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        StorageLocation { root: root.into() }
    }

    /// Uses `dir` when given, otherwise the platform data directory.
    pub fn resolve(dir: Option<PathBuf>) -> Result<Self, StorageError> {
        if let Some(root) = dir {
            return Ok(StorageLocation::new(root));
        }
        let dirs = ProjectDirs::from("", "", "kancli").ok_or(StorageError::NoDataDir)?;
        Ok(StorageLocation::new(dirs.data_dir()))
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.root.join(BACKUP_FILE)
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.root.join(TASKS_DIR)
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(LOG_FILE)
    }

    pub fn ensure_dirs(&self) -> Result<(), StorageError> {
        for dir in [self.root.clone(), self.tasks_dir()] {
            fs::create_dir_all(&dir).map_err(|source| StorageError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Persisted projection of the board: task paths per column, index-aligned
/// with `Status::ALL`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "Lists")]
    pub lists: Vec<ColumnEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnEntry {
    pub items: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            lists: vec![ColumnEntry::default(); Status::COUNT],
        }
    }
}

impl Config {
    pub fn column(&self, status: Status) -> &[String] {
        self.lists
            .get(status.index())
            .map(|entry| entry.items.as_slice())
            .unwrap_or_default()
    }

    pub fn set_column(&mut self, status: Status, items: Vec<String>) {
        if self.lists.len() < Status::COUNT {
            self.lists.resize(Status::COUNT, ColumnEntry::default());
        }
        self.lists[status.index()].items = items;
    }

    fn is_well_formed(&self) -> bool {
        self.lists.len() == Status::COUNT
    }
}

/// Loads the config, creating directories and a default file on first run.
///
/// A file that does not parse, or has the wrong number of columns, is moved
/// aside to `config.json.bak` and replaced by an empty default.
pub fn load_config(location: &StorageLocation) -> Result<Config, StorageError> {
    location.ensure_dirs()?;
    let path = location.config_path();
    if !path.exists() {
        info!(path = %path.display(), "no config found, writing default");
        save_config(location, &Config::default())?;
    }
    let data = fs::read_to_string(&path).map_err(|source| StorageError::ConfigRead {
        path: path.clone(),
        source,
    })?;
    match serde_json::from_str::<Config>(&data) {
        Ok(config) if config.is_well_formed() => Ok(config),
        Ok(config) => {
            warn!(
                columns = config.lists.len(),
                expected = Status::COUNT,
                "config has the wrong number of columns, regenerating"
            );
            regenerate(location)
        }
        Err(err) => {
            warn!(error = %err, "config is malformed, regenerating");
            regenerate(location)
        }
    }
}

fn regenerate(location: &StorageLocation) -> Result<Config, StorageError> {
    let backup = location.backup_path();
    fs::rename(location.config_path(), &backup).map_err(|source| StorageError::ConfigWrite {
        path: backup.clone(),
        source,
    })?;
    info!(backup = %backup.display(), "previous config moved aside");
    let config = Config::default();
    save_config(location, &config)?;
    Ok(config)
}

pub fn save_config(location: &StorageLocation, config: &Config) -> Result<(), StorageError> {
    let path = location.config_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StorageError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let serialized = serde_json::to_string_pretty(config)?;
    replace_file(&path, serialized.as_bytes())
        .map_err(|source| StorageError::ConfigWrite { path, source })?;
    Ok(())
}

/// Creates a new, nearly empty markdown file with a random name in `dir`.
pub fn create_task_file(dir: &Path) -> Result<PathBuf, StorageError> {
    fs::create_dir_all(dir).map_err(|source| StorageError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut last_err = None;
    for _ in 0..CREATE_ATTEMPTS {
        let path = dir.join(format!("{}.md", generate_name()));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(b"\n")
                    .map_err(|source| StorageError::TaskCreate {
                        dir: dir.to_path_buf(),
                        source,
                    })?;
                return Ok(path);
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => last_err = Some(err),
            Err(source) => {
                return Err(StorageError::TaskCreate {
                    dir: dir.to_path_buf(),
                    source,
                })
            }
        }
    }
    Err(StorageError::TaskCreate {
        dir: dir.to_path_buf(),
        source: last_err
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::AlreadyExists, "name collision")),
    })
}

pub fn write_task_file(path: &Path, content: &str) -> Result<(), StorageError> {
    replace_file(path, content.as_bytes()).map_err(|source| StorageError::TaskWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes `data` to a sibling temp file and renames it over `path`, so a
/// reader sees either the old contents or the new ones.
fn replace_file(path: &Path, data: &[u8]) -> io::Result<()> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{name}.{}.tmp", std::process::id()));
    let result = write_synced(&tmp, data).and_then(|()| fs::rename(&tmp, path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

fn generate_name() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TASK_NAME_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn location(tmp: &TempDir) -> StorageLocation {
        StorageLocation::new(tmp.path().join("kancli"))
    }

    #[test]
    fn first_load_writes_empty_default() {
        let tmp = TempDir::new().unwrap();
        let loc = location(&tmp);

        let config = load_config(&loc).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.lists.len(), Status::COUNT);
        assert!(loc.config_path().exists());
        assert!(loc.tasks_dir().is_dir());
    }

    #[test]
    fn save_then_load_preserves_order() {
        let tmp = TempDir::new().unwrap();
        let loc = location(&tmp);
        let mut config = Config::default();
        config.set_column(Status::ToDo, vec!["/b.md".into(), "/a.md".into()]);
        config.set_column(Status::Done, vec!["~/c.md".into()]);

        save_config(&loc, &config).unwrap();
        let loaded = load_config(&loc).unwrap();

        assert_eq!(loaded, config);
        assert_eq!(loaded.column(Status::ToDo), ["/b.md", "/a.md"]);
        assert!(loaded.column(Status::InProgress).is_empty());
    }

    #[test]
    fn saves_replace_the_file_without_leftovers() {
        let tmp = TempDir::new().unwrap();
        let loc = location(&tmp);
        let mut config = Config::default();
        save_config(&loc, &config).unwrap();
        config.set_column(Status::InProgress, vec!["/a.md".into()]);

        save_config(&loc, &config).unwrap();

        let entries: Vec<String> = fs::read_dir(&loc.root)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["config.json"]);
        assert_eq!(load_config(&loc).unwrap(), config);
    }

    #[test]
    fn uses_lists_and_items_field_names() {
        let tmp = TempDir::new().unwrap();
        let loc = location(&tmp);
        loc.ensure_dirs().unwrap();
        fs::write(
            loc.config_path(),
            r#"{ "Lists": [ { "items": ["/x.md"] }, { "items": [] }, { "items": [] } ] }"#,
        )
        .unwrap();

        let config = load_config(&loc).unwrap();
        assert_eq!(config.column(Status::ToDo), ["/x.md"]);
    }

    #[test]
    fn malformed_config_is_backed_up_and_regenerated() {
        let tmp = TempDir::new().unwrap();
        let loc = location(&tmp);
        loc.ensure_dirs().unwrap();
        fs::write(loc.config_path(), "{ not json").unwrap();

        let config = load_config(&loc).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(fs::read_to_string(loc.backup_path()).unwrap(), "{ not json");
    }

    #[test]
    fn wrong_column_count_is_regenerated() {
        let tmp = TempDir::new().unwrap();
        let loc = location(&tmp);
        loc.ensure_dirs().unwrap();
        fs::write(loc.config_path(), r#"{ "Lists": [ { "items": [] } ] }"#).unwrap();

        let config = load_config(&loc).unwrap();
        assert_eq!(config.lists.len(), Status::COUNT);
    }

    #[test]
    fn creates_unique_task_files() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("tasks");

        let first = create_task_file(&dir).unwrap();
        let second = create_task_file(&dir).unwrap();

        assert_ne!(first, second);
        assert_eq!(fs::read_to_string(&first).unwrap(), "\n");
        assert_eq!(first.extension().and_then(|e| e.to_str()), Some("md"));
    }

    #[test]
    fn write_task_file_overwrites() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("t.md");
        write_task_file(&path, "one").unwrap();
        write_task_file(&path, "# two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "# two");
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let tmp = TempDir::new().unwrap();
        let err = write_task_file(&tmp.path().join("gone/t.md"), "x").unwrap_err();
        assert!(matches!(err, StorageError::TaskWrite { .. }));
    }
}

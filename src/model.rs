use directories::BaseDirs;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const UNTITLED: &str = "Untitled";
const NO_DESCRIPTION: &str = "No Description";
const LINE_CONTINUATION: &str = "↵ ";

/// Board columns, in display order. The set is fixed at compile time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    #[default]
    ToDo,
    InProgress,
    Done,
}

#[derive(thiserror::Error, Debug)]
pub enum TaskError {
    #[error("could not resolve home directory for {0}")]
    HomeDir(String),
    #[error("reading task {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(thiserror::Error, Debug)]
#[error("unknown column {0:?} (expected todo, doing or done)")]
pub struct UnknownStatus(pub String);

impl Status {
    pub const ALL: [Status; 3] = [Status::ToDo, Status::InProgress, Status::Done];
    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> usize {
        match self {
            Status::ToDo => 0,
            Status::InProgress => 1,
            Status::Done => 2,
        }
    }

    /// Successor, wrapping from the last column to the first.
    pub fn next(self) -> Status {
        Self::ALL[(self.index() + 1) % Self::COUNT]
    }

    /// Predecessor, wrapping from the first column to the last.
    pub fn prev(self) -> Status {
        Self::ALL[(self.index() + Self::COUNT - 1) % Self::COUNT]
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Status::ToDo => "To Do",
            Status::InProgress => "In Progress",
            Status::Done => "Done",
        }
    }

    /// Short identifier used on the command line.
    pub fn id(self) -> &'static str {
        match self {
            Status::ToDo => "todo",
            Status::InProgress => "doing",
            Status::Done => "done",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Status::ALL
            .into_iter()
            .find(|status| status.id() == wanted || status.display_name().to_lowercase() == wanted)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// A markdown file on disk. The path is the identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub path: PathBuf,
    pub content: String,
}

impl Task {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Task {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Task, TaskError> {
        let path = expand_home(path.as_ref())?;
        let content = fs::read_to_string(&path).map_err(|source| TaskError::Read {
            path: path.clone(),
            source,
        })?;
        Ok(Task { path, content })
    }

    pub fn title(&self) -> String {
        let normalized = normalize(&self.content);
        let first = normalized.split('\n').next().unwrap_or_default();
        let title = first.strip_prefix("# ").unwrap_or(first);
        if title.is_empty() {
            UNTITLED.to_string()
        } else {
            title.to_string()
        }
    }

    pub fn description(&self) -> String {
        let normalized = normalize(&self.content);
        let rest = normalized
            .split_once('\n')
            .map(|(_, rest)| rest.trim())
            .unwrap_or_default();
        if rest.is_empty() {
            NO_DESCRIPTION.to_string()
        } else {
            rest.replace('\n', LINE_CONTINUATION)
        }
    }

    pub fn filter_key(&self) -> &str {
        &self.content
    }

    /// Case-insensitive subsequence match against the raw content.
    pub fn matches_filter(&self, query: &str) -> bool {
        let mut haystack = self.filter_key().chars().flat_map(char::to_lowercase);
        query
            .chars()
            .flat_map(char::to_lowercase)
            .filter(|c| !c.is_whitespace())
            .all(|wanted| haystack.any(|c| c == wanted))
    }
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> Result<PathBuf, TaskError> {
    let Ok(rest) = path.strip_prefix("~") else {
        return Ok(path.to_path_buf());
    };
    let dirs = BaseDirs::new().ok_or_else(|| TaskError::HomeDir(path.display().to_string()))?;
    Ok(dirs.home_dir().join(rest))
}

fn normalize(content: &str) -> String {
    content.replace("\r\n", "\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn next_and_prev_are_inverse() {
        for status in Status::ALL {
            assert_eq!(status.next().prev(), status);
            assert_eq!(status.prev().next(), status);
        }
    }

    #[test]
    fn next_visits_every_status_once() {
        let mut seen = vec![Status::ToDo];
        let mut current = Status::ToDo.next();
        while current != Status::ToDo {
            seen.push(current);
            current = current.next();
        }
        assert_eq!(seen, Status::ALL.to_vec());

        let mut seen = vec![Status::Done];
        let mut current = Status::Done.prev();
        while current != Status::Done {
            seen.push(current);
            current = current.prev();
        }
        assert_eq!(seen, vec![Status::Done, Status::InProgress, Status::ToDo]);
    }

    #[test]
    fn wraps_at_both_ends() {
        assert_eq!(Status::Done.next(), Status::ToDo);
        assert_eq!(Status::ToDo.prev(), Status::Done);
    }

    #[test]
    fn parses_ids_and_labels() {
        assert_eq!("doing".parse::<Status>().unwrap(), Status::InProgress);
        assert_eq!("In Progress".parse::<Status>().unwrap(), Status::InProgress);
        assert_eq!("DONE".parse::<Status>().unwrap(), Status::Done);
        assert!("later".parse::<Status>().is_err());
    }

    #[test]
    fn title_strips_heading_marker() {
        let task = Task::new("/tmp/a.md", "# Hello\nBody");
        assert_eq!(task.title(), "Hello");
        assert_eq!(task.description(), "Body");
    }

    #[test]
    fn empty_content_uses_placeholders() {
        let task = Task::new("/tmp/a.md", "");
        assert_eq!(task.title(), "Untitled");
        assert_eq!(task.description(), "No Description");

        let fresh = Task::new("/tmp/b.md", "\n");
        assert_eq!(fresh.title(), "Untitled");
        assert_eq!(fresh.description(), "No Description");
    }

    #[test]
    fn plain_first_line_is_title_verbatim() {
        let task = Task::new("/tmp/a.md", "buy milk\r\nand eggs\r\n\r\nsoon");
        assert_eq!(task.title(), "buy milk");
        assert_eq!(task.description(), "and eggs↵ ↵ soon");
    }

    #[test]
    fn filter_matches_subsequence_case_insensitively() {
        let task = Task::new("/tmp/a.md", "# Fix Parser\nbroken on tabs");
        assert!(task.matches_filter("fxp"));
        assert!(task.matches_filter("TABS"));
        assert!(task.matches_filter(""));
        assert!(!task.matches_filter("zzz"));
    }

    #[test]
    fn loads_task_from_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("task.md");
        fs::write(&path, "# Ship it\n").unwrap();

        let task = Task::load_from_file(&path).unwrap();
        assert_eq!(task.path, path);
        assert_eq!(task.title(), "Ship it");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let tmp = TempDir::new().unwrap();
        let err = Task::load_from_file(tmp.path().join("nope.md")).unwrap_err();
        assert!(matches!(err, TaskError::Read { .. }));
    }

    #[test]
    fn expands_home_prefix_only() {
        let plain = expand_home(Path::new("/var/tasks/a.md")).unwrap();
        assert_eq!(plain, PathBuf::from("/var/tasks/a.md"));

        if let Some(dirs) = BaseDirs::new() {
            let expanded = expand_home(Path::new("~/kancli/a.md")).unwrap();
            assert_eq!(expanded, dirs.home_dir().join("kancli/a.md"));
        }
    }
}

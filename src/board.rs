//! The board state machine.
//!
//! `Board::update` consumes one [`Message`] at a time and returns the
//! [`Command`]s it wants run. It never touches the terminal or the disk
//! itself, so every transition can be driven directly from tests.

use crate::editor::TextEditor;
use crate::jobs::{Command, JobResult, LoadedBoard};
use crate::layout::{adjust_offset, body_area, layout};
use crate::model::{Status, Task};
use crate::pager::Pager;
use crate::storage::Config;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::text::Text;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub enum Message {
    Key(KeyEvent),
    Resize { width: u16, height: u16 },
    Job(JobResult),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeKind {
    Loading,
    Browsing,
    Filtering,
    ViewingTask,
    EditingTask,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Loading,
    Browsing,
    Filtering,
    Viewing { path: PathBuf },
    /// `seeded` flips once the render round-trip has filled the editor.
    Editing { path: PathBuf, seeded: bool },
}

#[derive(Debug, Clone, Default)]
pub struct Column {
    tasks: Vec<Task>,
    /// Position within the visible (filtered) items.
    selected: usize,
    offset: usize,
}

impl Column {
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Indices into `tasks` that pass `filter`, in display order.
    pub fn visible(&self, filter: Option<&str>) -> Vec<usize> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| filter.map_or(true, |query| task.matches_filter(query)))
            .map(|(idx, _)| idx)
            .collect()
    }

    fn paths(&self) -> Vec<String> {
        self.tasks
            .iter()
            .map(|task| task.path.display().to_string())
            .collect()
    }
}

pub struct Board {
    columns: [Column; Status::COUNT],
    config: Config,
    focused: Status,
    mode: Mode,
    filter: Option<String>,
    width: u16,
    height: u16,
    pager: Pager,
    editor: TextEditor,
    /// Committed edits whose `TaskWritten` has not come back yet.
    pending_writes: HashMap<PathBuf, String>,
    status_line: String,
    load_error: Option<String>,
}

impl Default for Board {
    fn default() -> Self {
        Board::new()
    }
}

impl Board {
    pub fn new() -> Self {
        Board {
            columns: Default::default(),
            config: Config::default(),
            focused: Status::ToDo,
            mode: Mode::Loading,
            filter: None,
            width: 0,
            height: 0,
            pager: Pager::default(),
            editor: TextEditor::default(),
            pending_writes: HashMap::new(),
            status_line: "Loading board...".into(),
            load_error: None,
        }
    }

    /// Commands to run once at startup.
    pub fn init(&self) -> Vec<Command> {
        vec![Command::LoadBoard]
    }

    pub fn update(&mut self, message: Message) -> Vec<Command> {
        match message {
            Message::Key(key) => self.handle_key(key),
            Message::Resize { width, height } => self.resize(width, height),
            Message::Job(result) => self.handle_job(result),
        }
    }

    pub fn mode(&self) -> ModeKind {
        match self.mode {
            Mode::Loading => ModeKind::Loading,
            Mode::Browsing => ModeKind::Browsing,
            Mode::Filtering => ModeKind::Filtering,
            Mode::Viewing { .. } => ModeKind::ViewingTask,
            Mode::Editing { .. } => ModeKind::EditingTask,
        }
    }

    #[cfg(test)]
    pub fn is_ready(&self) -> bool {
        self.mode != Mode::Loading
    }

    pub fn focused(&self) -> Status {
        self.focused
    }

    #[cfg(test)]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, status: Status) -> &Column {
        &self.columns[status.index()]
    }

    #[cfg(test)]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Active filter query for `status`; only the focused column is filtered.
    pub fn filter_for(&self, status: Status) -> Option<&str> {
        if status == self.focused {
            self.filter.as_deref()
        } else {
            None
        }
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    #[cfg(test)]
    pub fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    pub fn editor(&self) -> &TextEditor {
        &self.editor
    }

    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Whether the editor has been filled and accepts input.
    pub fn editor_ready(&self) -> bool {
        matches!(self.mode, Mode::Editing { seeded: true, .. })
    }

    pub fn selected_task(&self) -> Option<&Task> {
        let column = self.column(self.focused);
        let visible = column.visible(self.filter_for(self.focused));
        visible
            .get(column.selected)
            .and_then(|idx| column.tasks.get(*idx))
    }

    /// The task the pager or editor is showing.
    pub fn active_task(&self) -> Option<&Task> {
        match &self.mode {
            Mode::Viewing { path } | Mode::Editing { path, .. } => self.find_task(path),
            _ => None,
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Vec<Command> {
        match self.mode {
            Mode::Loading => self.handle_loading_key(key),
            Mode::Browsing => self.handle_browse_key(key),
            Mode::Filtering => self.handle_filter_key(key),
            Mode::Viewing { .. } => self.handle_view_key(key),
            Mode::Editing { .. } => self.handle_edit_key(key),
        }
    }

    fn handle_loading_key(&mut self, key: KeyEvent) -> Vec<Command> {
        if is_quit(key) {
            return vec![Command::Quit(None)];
        }
        Vec::new()
    }

    fn handle_browse_key(&mut self, key: KeyEvent) -> Vec<Command> {
        let control = key.modifiers.contains(KeyModifiers::CONTROL);
        if is_quit(key) {
            info!("quitting");
            return vec![Command::Quit(Some(self.config.clone()))];
        }
        match key.code {
            KeyCode::Right if control => self.move_selected(self.focused.next()),
            KeyCode::Left if control => self.move_selected(self.focused.prev()),
            KeyCode::Char(' ') | KeyCode::Char('m') | KeyCode::Char('>') => {
                self.move_selected(self.focused.next())
            }
            KeyCode::Char('M') | KeyCode::Char('<') => self.move_selected(self.focused.prev()),
            KeyCode::Left | KeyCode::Char('h') => {
                self.set_focus(self.focused.prev());
                Vec::new()
            }
            KeyCode::Right | KeyCode::Char('l') => {
                self.set_focus(self.focused.next());
                Vec::new()
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.select_by(-1);
                Vec::new()
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.select_by(1);
                Vec::new()
            }
            KeyCode::Enter => self.open_selected(),
            KeyCode::Char('e') => self.edit_selected(),
            KeyCode::Char('n') => {
                self.status_line = "Creating task...".into();
                vec![Command::CreateTaskFile {
                    status: self.focused,
                }]
            }
            KeyCode::Delete | KeyCode::Char('d') => self.delete_selected(),
            KeyCode::Char('/') => {
                self.filter.get_or_insert_with(String::new);
                self.mode = Mode::Filtering;
                self.status_line = "Filter: type to narrow, Enter to keep, Esc to clear".into();
                Vec::new()
            }
            KeyCode::Esc => {
                if self.filter.take().is_some() {
                    self.reset_selection(self.focused);
                    self.status_line = "Filter cleared".into();
                }
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn handle_filter_key(&mut self, key: KeyEvent) -> Vec<Command> {
        match key.code {
            KeyCode::Esc => {
                self.filter = None;
                self.mode = Mode::Browsing;
                self.reset_selection(self.focused);
                self.status_line = "Filter cleared".into();
            }
            KeyCode::Enter => {
                if self.filter.as_deref().is_some_and(str::is_empty) {
                    self.filter = None;
                }
                self.mode = Mode::Browsing;
                self.status_line = match &self.filter {
                    Some(query) => format!("Filtering {} by \"{}\"", self.focused, query),
                    None => String::new(),
                };
            }
            KeyCode::Up => self.select_by(-1),
            KeyCode::Down => self.select_by(1),
            KeyCode::Backspace => {
                if let Some(query) = self.filter.as_mut() {
                    query.pop();
                }
                self.reset_selection(self.focused);
            }
            KeyCode::Char(c)
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                self.filter.get_or_insert_with(String::new).push(c);
                self.reset_selection(self.focused);
            }
            _ => {}
        }
        Vec::new()
    }

    fn handle_view_key(&mut self, key: KeyEvent) -> Vec<Command> {
        if is_back(key) {
            self.mode = Mode::Browsing;
            self.pager.reset();
            return Vec::new();
        }
        self.pager.handle_key(key);
        Vec::new()
    }

    fn handle_edit_key(&mut self, key: KeyEvent) -> Vec<Command> {
        let Mode::Editing { path, seeded } = &self.mode else {
            return Vec::new();
        };
        if key.code == KeyCode::Esc {
            let path = path.clone();
            let seeded = *seeded;
            self.mode = Mode::Browsing;
            if !seeded {
                return Vec::new();
            }
            self.status_line = "Saving...".into();
            let content = self.editor.value().to_string();
            self.pending_writes.insert(path.clone(), content.clone());
            return vec![Command::WriteTaskFile { path, content }];
        }
        if *seeded {
            self.editor.handle_key(key);
        }
        Vec::new()
    }

    fn handle_job(&mut self, result: JobResult) -> Vec<Command> {
        match result {
            JobResult::BoardLoaded(Ok(loaded)) => {
                self.apply_loaded(loaded);
                Vec::new()
            }
            JobResult::BoardLoaded(Err(err)) => {
                error!(error = %err, "could not load board");
                self.status_line = format!("Loading failed: {err} (press q to quit)");
                self.load_error = Some(err.to_string());
                Vec::new()
            }
            JobResult::TaskRendered { path, result } => self.apply_rendered(&path, result),
            JobResult::TaskWritten {
                path,
                content,
                result,
            } => {
                if self.pending_writes.get(&path) == Some(&content) {
                    self.pending_writes.remove(&path);
                }
                match result {
                    Ok(()) => match self.find_task_mut(&path) {
                        Some(task) => {
                            task.content = content;
                            self.status_line = format!("Saved \"{}\"", task.title());
                        }
                        None => debug!(path = %path.display(), "saved task no longer on the board"),
                    },
                    Err(err) => {
                        error!(error = %err, "could not save task");
                        self.status_line = format!("Could not save: {err}");
                    }
                }
                Vec::new()
            }
            JobResult::TaskCreated { status, result } => match result {
                Ok(task) => self.apply_created(status, task),
                Err(err) => {
                    error!(error = %err, "could not create task");
                    self.status_line = format!("Could not create task: {err}");
                    Vec::new()
                }
            },
            JobResult::ConfigSaved(Ok(())) => {
                debug!("board saved");
                Vec::new()
            }
            JobResult::ConfigSaved(Err(err)) => {
                error!(error = %err, "could not save board");
                self.status_line = format!("Could not save board: {err}");
                Vec::new()
            }
        }
    }

    fn apply_loaded(&mut self, loaded: LoadedBoard) {
        let LoadedBoard {
            config,
            columns,
            failures,
        } = loaded;
        for (column, tasks) in self.columns.iter_mut().zip(columns) {
            column.tasks = tasks;
            column.selected = 0;
            column.offset = 0;
        }
        self.config = config;
        self.mode = Mode::Browsing;
        self.load_error = None;
        let total: usize = self.columns.iter().map(Column::len).sum();
        self.status_line = match failures.first() {
            Some(first) => format!(
                "Loaded {total} tasks; {} could not be read ({first})",
                failures.len()
            ),
            None => format!("Loaded {total} tasks"),
        };
    }

    fn apply_rendered(
        &mut self,
        path: &Path,
        result: Result<Text<'static>, crate::render::RenderError>,
    ) -> Vec<Command> {
        match &self.mode {
            Mode::Viewing { path: current } if current == path => match result {
                Ok(text) => self.pager.set_content(text),
                Err(err) => {
                    warn!(error = %err, "could not render task");
                    self.mode = Mode::Browsing;
                    self.status_line = format!("Could not render: {err}");
                }
            },
            Mode::Editing {
                path: current,
                seeded: false,
            } if current == path => {
                if let Err(err) = &result {
                    debug!(error = %err, "render failed, seeding editor anyway");
                }
                let Some(task) = self.find_task(path) else {
                    self.mode = Mode::Browsing;
                    self.status_line = "Task is no longer on the board".into();
                    return Vec::new();
                };
                let title = task.title();
                let mut editor = TextEditor::new(self.latest_content(task));
                let body = body_area(self.width, self.height);
                editor.set_size(body.width, body.height);
                self.editor = editor;
                self.mode = Mode::Editing {
                    path: path.to_path_buf(),
                    seeded: true,
                };
                self.status_line = format!("Editing \"{title}\" (Esc saves)");
            }
            _ => debug!(path = %path.display(), "discarding stale render"),
        }
        Vec::new()
    }

    fn apply_created(&mut self, status: Status, task: Task) -> Vec<Command> {
        let path = task.path.clone();
        let content = task.content.clone();
        self.columns[status.index()].tasks.push(task);
        let mut commands = vec![self.persist_columns(&[status])];
        if matches!(self.mode, Mode::Editing { .. }) {
            self.status_line = format!("Created {}", path.display());
            return commands;
        }
        if self.focused != status {
            self.set_focus(status);
        }
        self.filter = None;
        let column = &mut self.columns[status.index()];
        column.selected = column.tasks.len() - 1;
        self.follow_selection(status);
        self.mode = Mode::Editing {
            path: path.clone(),
            seeded: false,
        };
        commands.push(Command::RenderTask {
            path,
            content,
            width: self.width,
        });
        commands
    }

    fn resize(&mut self, width: u16, height: u16) -> Vec<Command> {
        self.width = width;
        self.height = height;
        let body = body_area(width, height);
        self.pager.set_size(body.width, body.height);
        self.editor.set_size(body.width, body.height);
        for status in Status::ALL {
            self.follow_selection(status);
        }
        match &self.mode {
            Mode::Viewing { path } => match self.find_task(path) {
                Some(task) => vec![Command::RenderTask {
                    path: task.path.clone(),
                    content: self.latest_content(task).to_string(),
                    width,
                }],
                None => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    fn open_selected(&mut self) -> Vec<Command> {
        let Some(task) = self.selected_task() else {
            self.status_line = "No task selected".into();
            return Vec::new();
        };
        let path = task.path.clone();
        let command = Command::RenderTask {
            path: path.clone(),
            content: self.latest_content(task).to_string(),
            width: self.width,
        };
        self.mode = Mode::Viewing { path };
        self.pager.reset();
        let body = body_area(self.width, self.height);
        self.pager.set_size(body.width, body.height);
        vec![command]
    }

    fn edit_selected(&mut self) -> Vec<Command> {
        let Some(task) = self.selected_task() else {
            self.status_line = "No task selected".into();
            return Vec::new();
        };
        let path = task.path.clone();
        let command = Command::RenderTask {
            path: path.clone(),
            content: self.latest_content(task).to_string(),
            width: self.width,
        };
        self.mode = Mode::Editing {
            path,
            seeded: false,
        };
        vec![command]
    }

    fn move_selected(&mut self, to: Status) -> Vec<Command> {
        let from = self.focused;
        let Some(idx) = self.selected_index() else {
            return Vec::new();
        };
        let task = self.columns[from.index()].tasks.remove(idx);
        let title = task.title();
        info!(path = %task.path.display(), %from, %to, "moving task");
        self.columns[to.index()].tasks.push(task);
        self.clamp_selection(from);
        self.follow_selection(to);
        self.status_line = format!("Moved \"{title}\" to {to}");
        vec![self.persist_columns(&[from, to])]
    }

    fn delete_selected(&mut self) -> Vec<Command> {
        let status = self.focused;
        let Some(idx) = self.selected_index() else {
            return Vec::new();
        };
        let task = self.columns[status.index()].tasks.remove(idx);
        info!(path = %task.path.display(), column = %status, "removing task from board");
        self.clamp_selection(status);
        self.status_line = format!("Removed \"{}\"", task.title());
        vec![self.persist_columns(&[status])]
    }

    /// Index into the focused column's tasks of the selected visible item.
    fn selected_index(&self) -> Option<usize> {
        let column = self.column(self.focused);
        column
            .visible(self.filter_for(self.focused))
            .get(column.selected)
            .copied()
    }

    fn persist_columns(&mut self, statuses: &[Status]) -> Command {
        for status in statuses {
            let paths = self.columns[status.index()].paths();
            self.config.set_column(*status, paths);
        }
        Command::SaveConfig(self.config.clone())
    }

    fn set_focus(&mut self, status: Status) {
        if self.filter.take().is_some() {
            self.reset_selection(self.focused);
        }
        self.focused = status;
        self.clamp_selection(status);
    }

    fn select_by(&mut self, delta: isize) {
        let status = self.focused;
        let len = self.visible_len(status);
        let column = &mut self.columns[status.index()];
        if len == 0 {
            column.selected = 0;
        } else {
            column.selected = column
                .selected
                .saturating_add_signed(delta)
                .min(len - 1);
        }
        self.follow_selection(status);
    }

    fn reset_selection(&mut self, status: Status) {
        let column = &mut self.columns[status.index()];
        column.selected = 0;
        column.offset = 0;
    }

    fn clamp_selection(&mut self, status: Status) {
        let len = self.visible_len(status);
        let column = &mut self.columns[status.index()];
        column.selected = column.selected.min(len.saturating_sub(1));
        self.follow_selection(status);
    }

    fn follow_selection(&mut self, status: Status) {
        let geometry = layout(self.width, self.height, self.focused)[status.index()];
        let len = self.visible_len(status);
        let column = &mut self.columns[status.index()];
        column.offset = adjust_offset(
            column.selected,
            column.offset,
            geometry.visible_items(),
            0,
            len,
        );
    }

    fn visible_len(&self, status: Status) -> usize {
        self.column(status).visible(self.filter_for(status)).len()
    }

    /// The newest text for `task`, counting an edit still being written.
    fn latest_content<'a>(&'a self, task: &'a Task) -> &'a str {
        self.pending_writes
            .get(&task.path)
            .map_or(task.content.as_str(), String::as_str)
    }

    fn find_task(&self, path: &Path) -> Option<&Task> {
        self.columns
            .iter()
            .flat_map(|column| column.tasks.iter())
            .find(|task| task.path == path)
    }

    fn find_task_mut(&mut self, path: &Path) -> Option<&mut Task> {
        self.columns
            .iter_mut()
            .flat_map(|column| column.tasks.iter_mut())
            .find(|task| task.path == path)
    }
}

fn is_quit(key: KeyEvent) -> bool {
    matches!(key.code, KeyCode::Char('q'))
        || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
}

fn is_back(key: KeyEvent) -> bool {
    key.code == KeyCode::Esc || is_quit(key)
}

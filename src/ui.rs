use crate::board::{Board, Message, ModeKind};
use crate::jobs::{Command, JobResult, Worker};
use crate::layout::{body_area, footer_area, layout, ColumnGeometry};
use crate::model::{Status, Task};
use crate::storage::StorageLocation;
use anyhow::{bail, Result};
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::{Alignment, Color, Modifier, Rect, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, List, ListItem, ListState, Padding, Paragraph};
use ratatui::{Frame, Terminal};
use std::io::{stdout, Stdout};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::Duration;
use tracing::{debug, info};
use unicode_width::UnicodeWidthChar;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub fn run(location: StorageLocation) -> Result<()> {
    info!(root = %location.root.display(), "starting board");
    let mut terminal = setup_terminal()?;
    let (tx, rx) = mpsc::channel();
    let mut app = App::new(Worker::new(location, tx), rx);
    let result = app.event_loop(&mut terminal);
    app.worker.shutdown();
    teardown_terminal(&mut terminal)?;
    result?;
    if let Some(err) = app.board.load_error() {
        bail!("loading failed: {err}");
    }
    Ok(())
}

struct App {
    board: Board,
    worker: Worker,
    results: Receiver<JobResult>,
}

impl App {
    fn new(worker: Worker, results: Receiver<JobResult>) -> Self {
        App {
            board: Board::new(),
            worker,
            results,
        }
    }

    fn event_loop<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        let size = terminal.size()?;
        let commands = self.board.update(Message::Resize {
            width: size.width,
            height: size.height,
        });
        self.dispatch(commands);
        let startup = self.board.init();
        self.dispatch(startup);

        loop {
            terminal.draw(|f| draw(f, &self.board))?;
            if event::poll(POLL_INTERVAL)? {
                let message = match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => Some(Message::Key(key)),
                    Event::Resize(width, height) => Some(Message::Resize { width, height }),
                    _ => None,
                };
                if let Some(message) = message {
                    let commands = self.board.update(message);
                    if self.dispatch(commands) {
                        break;
                    }
                }
            }
            if self.drain_results() {
                break;
            }
        }
        Ok(())
    }

    /// Feeds finished jobs back into the board. Returns true on quit.
    fn drain_results(&mut self) -> bool {
        loop {
            match self.results.try_recv() {
                Ok(result) => {
                    let commands = self.board.update(Message::Job(result));
                    if self.dispatch(commands) {
                        return true;
                    }
                }
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => {
                    debug!("job channel closed");
                    return false;
                }
            }
        }
    }

    /// Hands commands to the worker. Returns true once `Quit` is queued; its
    /// save lands when `run` shuts the worker down.
    fn dispatch(&self, commands: Vec<Command>) -> bool {
        let mut quit = false;
        for command in commands {
            quit |= command.is_quit();
            self.worker.dispatch(command);
        }
        quit
    }
}

fn draw(f: &mut Frame<'_>, board: &Board) {
    let size = f.size();
    let body = body_area(size.width, size.height);
    match board.mode() {
        ModeKind::Loading => draw_loading(f, board, body),
        ModeKind::Browsing | ModeKind::Filtering => draw_columns(f, board),
        ModeKind::ViewingTask => draw_pager(f, board, body),
        ModeKind::EditingTask => draw_editor(f, board, body),
    }
    draw_footer(f, board, footer_area(size.width, size.height));
}

fn draw_loading(f: &mut Frame<'_>, board: &Board, area: Rect) {
    let (text, color) = match board.load_error() {
        Some(_) => ("Could not load the board", Color::LightRed),
        None => ("Loading...", Color::DarkGray),
    };
    let paragraph = Paragraph::new(Span::styled(text, Style::default().fg(color)))
        .alignment(Alignment::Center);
    f.render_widget(paragraph, centered_rect(60, 20, area));
}

fn draw_columns(f: &mut Frame<'_>, board: &Board) {
    let size = f.size();
    for geometry in layout(size.width, size.height, board.focused()) {
        draw_column(f, board, &geometry);
    }
}

fn draw_column(f: &mut Frame<'_>, board: &Board, geometry: &ColumnGeometry) {
    let column = board.column(geometry.status);
    let filter = board.filter_for(geometry.status);
    let visible = column.visible(filter);
    let accent = color_for_status(geometry.status);

    let mut title = format!(" {} ", geometry.status);
    if filter.is_some() {
        title.push_str(&format!("({}/{}) ", visible.len(), column.len()));
    } else {
        title.push_str(&format!("({}) ", column.len()));
    }
    let mut block = Block::default()
        .title(Span::styled(
            title,
            Style::default().fg(accent).add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL)
        .padding(Padding::new(2, 2, 1, 1));
    block = if geometry.focused {
        block
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(accent))
    } else {
        block
            .border_type(BorderType::Plain)
            .border_style(Style::default().fg(Color::DarkGray))
    };
    f.render_widget(block, geometry.area);

    if visible.is_empty() {
        let empty = if filter.is_some() { "No matches" } else { "No items" };
        let paragraph = Paragraph::new(Span::styled(empty, Style::default().fg(Color::DarkGray)));
        f.render_widget(paragraph, geometry.inner);
        return;
    }

    let items = visible
        .iter()
        .enumerate()
        .filter_map(|(pos, idx)| column.tasks().get(*idx).map(|task| (pos, task)))
        .map(|(pos, task)| {
            let selected = geometry.focused && pos == column.selected();
            task_item(task, geometry.inner.width, selected, accent)
        })
        .collect::<Vec<_>>();
    let mut state = ListState::default().with_offset(column.offset());
    if geometry.focused {
        state.select(Some(column.selected()));
    }
    f.render_stateful_widget(List::new(items), geometry.inner, &mut state);
}

fn draw_pager(f: &mut Frame<'_>, board: &Board, area: Rect) {
    let pager = board.pager();
    let paragraph = Paragraph::new(pager.text().clone()).scroll((scroll_row(pager.offset()), 0));
    f.render_widget(paragraph, area);
}

/// Paragraph scroll takes a `u16`; longer content pins to the last row.
fn scroll_row(offset: usize) -> u16 {
    u16::try_from(offset).unwrap_or(u16::MAX)
}

fn draw_editor(f: &mut Frame<'_>, board: &Board, area: Rect) {
    if !board.editor_ready() {
        draw_loading(f, board, area);
        return;
    }
    let editor = board.editor();
    let lines = editor
        .lines_with_caret()
        .into_iter()
        .skip(editor.offset())
        .take(area.height as usize)
        .map(Line::raw)
        .collect::<Vec<_>>();
    f.render_widget(Paragraph::new(lines), area);
}

fn draw_footer(f: &mut Frame<'_>, board: &Board, area: Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(area);
    f.render_widget(Paragraph::new(status_line(board)), rows[0]);
    f.render_widget(Paragraph::new(footer_help_line(board.mode())), rows[1]);
}

fn status_line(board: &Board) -> Line<'static> {
    let mut spans = Vec::new();
    match board.mode() {
        ModeKind::Filtering => {
            spans.push(Span::styled("/", Style::default().fg(Color::LightCyan)));
            spans.push(Span::raw(format!("{}▌", board.filter().unwrap_or_default())));
        }
        ModeKind::ViewingTask => {
            if let Some(task) = board.active_task() {
                spans.push(Span::styled(
                    task.title(),
                    Style::default().add_modifier(Modifier::BOLD),
                ));
                spans.push(Span::styled(
                    format!("  {}%", board.pager().scroll_percent()),
                    Style::default().fg(Color::DarkGray),
                ));
            }
        }
        _ => {
            let color = if board.load_error().is_some() {
                Color::LightRed
            } else {
                Color::Gray
            };
            spans.push(Span::styled(
                board.status_line().to_string(),
                Style::default().fg(color),
            ));
        }
    }
    Line::from(spans)
}

fn footer_help_line(mode: ModeKind) -> Line<'static> {
    let key = |text: &'static str, color: Color| Span::styled(text, Style::default().fg(color));
    let spans = match mode {
        ModeKind::Loading => vec![key("q", Color::LightRed), Span::raw(" quit")],
        ModeKind::Browsing => vec![
            key("←→", Color::LightCyan),
            Span::raw(" column  "),
            key("↑↓", Color::LightCyan),
            Span::raw(" select  "),
            key("space/^→", Color::LightGreen),
            Span::raw(" forward  "),
            key("^←", Color::LightGreen),
            Span::raw(" back  "),
            key("enter", Color::LightYellow),
            Span::raw(" view  "),
            key("e", Color::LightYellow),
            Span::raw(" edit  "),
            key("n", Color::LightMagenta),
            Span::raw(" new  "),
            key("del", Color::LightRed),
            Span::raw(" delete  "),
            key("/", Color::LightCyan),
            Span::raw(" filter  "),
            key("q", Color::LightRed),
            Span::raw(" quit"),
        ],
        ModeKind::Filtering => vec![
            key("enter", Color::LightGreen),
            Span::raw(" apply  "),
            key("esc", Color::LightRed),
            Span::raw(" clear"),
        ],
        ModeKind::ViewingTask => vec![
            key("↑↓", Color::LightCyan),
            Span::raw(" scroll  "),
            key("pgup/pgdn", Color::LightCyan),
            Span::raw(" page  "),
            key("esc/q", Color::LightRed),
            Span::raw(" back"),
        ],
        ModeKind::EditingTask => vec![
            key("esc", Color::LightGreen),
            Span::raw(" save and close  "),
            key("tab", Color::LightCyan),
            Span::raw(" indent"),
        ],
    };
    Line::from(spans)
}

fn task_item(task: &Task, width: u16, selected: bool, accent: Color) -> ListItem<'static> {
    let text_width = (width as usize).saturating_sub(2);
    let marker = if selected { "│ " } else { "  " };
    let marker_style = Style::default().fg(accent);
    let (title_style, desc_style) = if selected {
        (
            Style::default().fg(accent).add_modifier(Modifier::BOLD),
            Style::default().fg(Color::Gray),
        )
    } else {
        (
            Style::default().fg(Color::White),
            Style::default().fg(Color::DarkGray),
        )
    };
    let lines = vec![
        Line::from(vec![
            Span::styled(marker, marker_style),
            Span::styled(truncate_text(&task.title(), text_width), title_style),
        ]),
        Line::from(vec![
            Span::styled(marker, marker_style),
            Span::styled(truncate_text(&task.description(), text_width), desc_style),
        ]),
        Line::default(),
    ];
    ListItem::new(lines)
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;
    Ok(terminal)
}

fn teardown_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(rows[1])[1]
}

fn color_for_status(status: Status) -> Color {
    let palette = [Color::Cyan, Color::LightYellow, Color::LightGreen];
    palette[status.index() % palette.len()]
}

/// Cuts `text` to `max` display columns, ending in "..." when shortened.
fn truncate_text(text: &str, max: usize) -> String {
    let total: usize = text.chars().filter_map(UnicodeWidthChar::width).sum();
    if total <= max {
        return text.to_string();
    }
    let budget = max.saturating_sub(3);
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(ch);
    }
    if max >= 3 {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::LoadedBoard;
    use crate::storage::Config;
    use pretty_assertions::assert_eq;
    use ratatui::backend::TestBackend;

    fn loaded_board(width: u16, height: u16) -> Board {
        let mut board = Board::new();
        board.update(Message::Resize { width, height });
        board.update(Message::Job(JobResult::BoardLoaded(Ok(LoadedBoard {
            config: Config::default(),
            columns: vec![
                vec![Task::new("/a.md", "# Write report\nfirst draft")],
                vec![],
                vec![Task::new("/b.md", "# Ship it")],
            ],
            failures: vec![],
        }))));
        board
    }

    fn screen(board: &Board, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|f| draw(f, board)).unwrap();
        let buffer = terminal.backend().buffer();
        let mut out = String::new();
        for y in 0..height {
            for x in 0..width {
                out.push_str(buffer.get(x, y).symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn truncate_respects_display_width() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("a longer title", 8), "a lon...");
        assert_eq!(truncate_text("日本語のタイトル", 7), "日本...");
        assert_eq!(truncate_text("abc", 0), "");
    }

    #[test]
    fn draws_three_titled_columns() {
        let board = loaded_board(90, 20);
        let screen = screen(&board, 90, 20);
        assert!(screen.contains("To Do (1)"));
        assert!(screen.contains("In Progress (0)"));
        assert!(screen.contains("Done (1)"));
        assert!(screen.contains("Write report"));
        assert!(screen.contains("first draft"));
        assert!(screen.contains("No items"));
        assert!(screen.contains("Loaded 2 tasks"));
    }

    #[test]
    fn loading_screen_before_board_arrives() {
        let mut board = Board::new();
        board.update(Message::Resize {
            width: 60,
            height: 12,
        });
        let screen = screen(&board, 60, 12);
        assert!(screen.contains("Loading..."));
    }

    #[test]
    fn scroll_row_saturates_instead_of_wrapping() {
        assert_eq!(scroll_row(12), 12);
        assert_eq!(scroll_row(65_535), u16::MAX);
        assert_eq!(scroll_row(70_000), u16::MAX);
    }

    #[test]
    fn help_line_tracks_mode() {
        let text = |mode| {
            footer_help_line(mode)
                .spans
                .iter()
                .map(|s| s.content.to_string())
                .collect::<String>()
        };
        assert!(text(ModeKind::Browsing).contains("filter"));
        assert!(text(ModeKind::ViewingTask).contains("scroll"));
        assert!(text(ModeKind::EditingTask).contains("save and close"));
        assert_eq!(text(ModeKind::Loading), "q quit");
    }
}

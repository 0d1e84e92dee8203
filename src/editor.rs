use crate::layout::adjust_offset;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

const CARET: &str = "▌";
const TAB: &str = "    ";

/// Multi-line edit buffer for a task body. `cursor` is a byte offset that
/// always sits on a char boundary.
#[derive(Debug, Clone, Default)]
pub struct TextEditor {
    value: String,
    cursor: usize,
    width: u16,
    height: u16,
    offset: usize,
}

impl TextEditor {
    /// Seeds the buffer with the cursor at the very start.
    pub fn new(value: &str) -> Self {
        TextEditor {
            value: value.to_string(),
            cursor: 0,
            ..TextEditor::default()
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set_size(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
        self.follow_cursor();
    }

    #[cfg(test)]
    pub fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    /// (line, column) of the cursor, both zero-based, column in chars.
    pub fn cursor_position(&self) -> (usize, usize) {
        let (_, line, col) = line_state(&self.value, self.cursor);
        (line, col)
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Applies an editing key. Returns false when the key is not an edit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Left => self.move_left(),
            KeyCode::Right => self.move_right(),
            KeyCode::Up => self.move_up(),
            KeyCode::Down => self.move_down(),
            KeyCode::Home => self.move_line_start(),
            KeyCode::End => self.move_line_end(),
            KeyCode::Backspace => self.backspace(),
            KeyCode::Delete => self.delete(),
            KeyCode::Enter => self.insert_char('\n'),
            KeyCode::Tab => self.insert_str(TAB),
            KeyCode::Char(c)
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                self.insert_char(c)
            }
            _ => return false,
        }
        self.follow_cursor();
        true
    }

    pub fn move_left(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor = prev_char(self.cursor, &self.value);
    }

    pub fn move_right(&mut self) {
        if self.cursor >= self.value.len() {
            return;
        }
        self.cursor = next_char(self.cursor, &self.value);
    }

    pub fn move_up(&mut self) {
        let (line_starts, line_idx, col) = line_state(&self.value, self.cursor);
        if line_idx == 0 {
            return;
        }
        self.cursor = index_at_col(&self.value, line_starts[line_idx - 1], col);
    }

    pub fn move_down(&mut self) {
        let (line_starts, line_idx, col) = line_state(&self.value, self.cursor);
        if line_idx + 1 >= line_starts.len() {
            return;
        }
        self.cursor = index_at_col(&self.value, line_starts[line_idx + 1], col);
    }

    pub fn move_line_start(&mut self) {
        let (line_starts, line_idx, _) = line_state(&self.value, self.cursor);
        self.cursor = line_starts[line_idx];
    }

    pub fn move_line_end(&mut self) {
        let (line_starts, line_idx, _) = line_state(&self.value, self.cursor);
        self.cursor = index_at_col(&self.value, line_starts[line_idx], usize::MAX);
    }

    pub fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let prev = prev_char(self.cursor, &self.value);
        self.value.drain(prev..self.cursor);
        self.cursor = prev;
    }

    pub fn delete(&mut self) {
        if self.cursor >= self.value.len() {
            return;
        }
        let next = next_char(self.cursor, &self.value);
        self.value.drain(self.cursor..next);
    }

    pub fn insert_char(&mut self, ch: char) {
        self.value.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
    }

    pub fn insert_str(&mut self, text: &str) {
        self.value.insert_str(self.cursor, text);
        self.cursor += text.len();
    }

    /// Buffer lines with a caret drawn at the cursor.
    pub fn lines_with_caret(&self) -> Vec<String> {
        let mut text = self.value.clone();
        text.insert_str(self.cursor, CARET);
        text.split('\n').map(str::to_string).collect()
    }

    fn follow_cursor(&mut self) {
        let (line, _) = self.cursor_position();
        let total = self.value.split('\n').count();
        self.offset = adjust_offset(line, self.offset, self.height as usize, 1, total);
    }
}

fn prev_char(cursor: usize, text: &str) -> usize {
    text[..cursor]
        .char_indices()
        .next_back()
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

fn next_char(cursor: usize, text: &str) -> usize {
    text[cursor..]
        .chars()
        .next()
        .map(|ch| cursor + ch.len_utf8())
        .unwrap_or(text.len())
}

fn line_state(text: &str, cursor: usize) -> (Vec<usize>, usize, usize) {
    let mut starts = vec![0];
    for (idx, ch) in text.char_indices() {
        if ch == '\n' {
            starts.push(idx + 1);
        }
    }
    let line_idx = starts
        .iter()
        .rposition(|start| *start <= cursor)
        .unwrap_or(0);
    let col = text[starts[line_idx]..cursor].chars().count();
    (starts, line_idx, col)
}

fn index_at_col(text: &str, start: usize, target_col: usize) -> usize {
    let slice = &text[start..];
    let limit = slice.find('\n').unwrap_or(slice.len());
    slice[..limit]
        .char_indices()
        .nth(target_col)
        .map(|(idx, _)| start + idx)
        .unwrap_or(start + limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn starts_at_the_beginning() {
        let editor = TextEditor::new("# Title\nbody");
        assert_eq!(editor.cursor_position(), (0, 0));
        assert_eq!(editor.value(), "# Title\nbody");
    }

    #[test]
    fn typing_inserts_at_cursor() {
        let mut editor = TextEditor::new("world");
        for c in "hello ".chars() {
            assert!(editor.handle_key(key(KeyCode::Char(c))));
        }
        assert_eq!(editor.value(), "hello world");
    }

    #[test]
    fn vertical_moves_keep_column() {
        let mut editor = TextEditor::new("abcdef\nxy\nlonger line");
        editor.move_line_end();
        editor.move_down();
        assert_eq!(editor.cursor_position(), (1, 2));
        editor.move_down();
        assert_eq!(editor.cursor_position(), (2, 2));
        editor.move_up();
        editor.move_up();
        assert_eq!(editor.cursor_position(), (0, 2));
    }

    #[test]
    fn backspace_and_delete_handle_multibyte() {
        let mut editor = TextEditor::new("añb");
        editor.move_right();
        editor.move_right();
        editor.backspace();
        assert_eq!(editor.value(), "ab");
        editor.move_line_start();
        editor.delete();
        assert_eq!(editor.value(), "b");
    }

    #[test]
    fn enter_splits_lines() {
        let mut editor = TextEditor::new("ab");
        editor.move_right();
        editor.handle_key(key(KeyCode::Enter));
        assert_eq!(editor.value(), "a\nb");
        assert_eq!(editor.cursor_position(), (1, 0));
    }

    #[test]
    fn control_chords_are_not_edits() {
        let mut editor = TextEditor::new("x");
        let chord = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(!editor.handle_key(chord));
        assert!(!editor.handle_key(key(KeyCode::Esc)));
        assert_eq!(editor.value(), "x");
    }

    #[test]
    fn caret_marks_cursor() {
        let mut editor = TextEditor::new("ab\ncd");
        editor.move_down();
        assert_eq!(editor.lines_with_caret(), vec!["ab", "▌cd"]);
    }

    #[test]
    fn scrolls_to_keep_cursor_visible() {
        let text = (0..20).map(|n| n.to_string()).collect::<Vec<_>>().join("\n");
        let mut editor = TextEditor::new(&text);
        editor.set_size(40, 5);
        for _ in 0..10 {
            editor.handle_key(key(KeyCode::Down));
        }
        let (line, _) = editor.cursor_position();
        assert_eq!(line, 10);
        assert!(editor.offset() <= line && line < editor.offset() + 5);
    }
}

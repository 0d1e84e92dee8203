use crossterm::event::{KeyCode, KeyEvent};
use ratatui::text::Text;

/// Read-only scrollable view over rendered task text.
#[derive(Debug, Clone, Default)]
pub struct Pager {
    text: Text<'static>,
    offset: usize,
    width: u16,
    height: u16,
}

impl Pager {
    pub fn set_content(&mut self, text: Text<'static>) {
        self.text = text;
        self.offset = self.offset.min(self.max_offset());
    }

    pub fn text(&self) -> &Text<'static> {
        &self.text
    }

    pub fn set_size(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
        self.offset = self.offset.min(self.max_offset());
    }

    #[cfg(test)]
    pub fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn reset(&mut self) {
        self.text = Text::default();
        self.offset = 0;
    }

    /// Percentage of the content above the bottom of the view.
    pub fn scroll_percent(&self) -> u16 {
        let max = self.max_offset();
        if max == 0 {
            return 100;
        }
        ((self.offset * 100) / max) as u16
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.scroll_by(-1),
            KeyCode::Down | KeyCode::Char('j') => self.scroll_by(1),
            KeyCode::PageUp | KeyCode::Char('b') => self.scroll_by(-(self.page() as isize)),
            KeyCode::PageDown | KeyCode::Char(' ') | KeyCode::Char('f') => {
                self.scroll_by(self.page() as isize)
            }
            KeyCode::Home | KeyCode::Char('g') => self.offset = 0,
            KeyCode::End | KeyCode::Char('G') => self.offset = self.max_offset(),
            _ => return false,
        }
        true
    }

    fn scroll_by(&mut self, delta: isize) {
        let next = self.offset.saturating_add_signed(delta);
        self.offset = next.min(self.max_offset());
    }

    fn page(&self) -> usize {
        (self.height as usize).max(1)
    }

    fn max_offset(&self) -> usize {
        self.text.lines.len().saturating_sub(self.height as usize)
    }
}

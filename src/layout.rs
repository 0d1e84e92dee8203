//! Board geometry, computed fresh from the terminal size on every draw.

use crate::model::Status;
use ratatui::layout::Rect;

pub const FOOTER_HEIGHT: u16 = 2;
/// Rows used by one task in a column: title, description, spacer.
pub const ITEM_HEIGHT: u16 = 3;
const BORDER: u16 = 1;
const PADDING_X: u16 = 2;
const PADDING_Y: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnGeometry {
    pub status: Status,
    pub focused: bool,
    /// Outer panel, border included.
    pub area: Rect,
    /// Space left for the task list inside border and padding.
    pub inner: Rect,
}

impl ColumnGeometry {
    pub fn visible_items(&self) -> usize {
        (self.inner.height / ITEM_HEIGHT).max(1) as usize
    }
}

/// Splits the area above the footer into one panel per column.
pub fn layout(width: u16, height: u16, focused: Status) -> [ColumnGeometry; Status::COUNT] {
    let body = body_area(width, height);
    let column_width = body.width / Status::COUNT as u16;
    Status::ALL.map(|status| {
        let area = Rect::new(
            body.x + column_width * status.index() as u16,
            body.y,
            column_width,
            body.height,
        );
        let frame_x = BORDER + PADDING_X;
        let frame_y = BORDER + PADDING_Y;
        let inner = Rect::new(
            area.x + frame_x.min(area.width),
            area.y + frame_y.min(area.height),
            area.width.saturating_sub(frame_x * 2),
            area.height.saturating_sub(frame_y * 2),
        );
        ColumnGeometry {
            status,
            focused: status == focused,
            area,
            inner,
        }
    })
}

/// Everything above the footer; the pager and editor fill it.
pub fn body_area(width: u16, height: u16) -> Rect {
    Rect::new(0, 0, width, height.saturating_sub(FOOTER_HEIGHT))
}

pub fn footer_area(width: u16, height: u16) -> Rect {
    let top = height.saturating_sub(FOOTER_HEIGHT);
    Rect::new(0, top, width, height - top)
}

/// Scroll offset that keeps `selected` inside a `viewport` of rows, with
/// `scrolloff` rows of margin where possible.
pub fn adjust_offset(
    selected: usize,
    current_offset: usize,
    viewport: usize,
    scrolloff: usize,
    len: usize,
) -> usize {
    if viewport == 0 || len == 0 {
        return 0;
    }
    let max_offset = len.saturating_sub(viewport);
    let margin = scrolloff.min(viewport.saturating_sub(1) / 2);
    let mut offset = current_offset.min(max_offset);
    if selected < offset.saturating_add(margin) {
        offset = selected.saturating_sub(margin);
    } else {
        let upper = offset
            .saturating_add(viewport.saturating_sub(1))
            .saturating_sub(margin);
        if selected > upper {
            offset = selected.saturating_add(margin + 1).saturating_sub(viewport);
        }
    }
    offset.min(max_offset)
}

//! Markdown to styled terminal text.
//!
//! Block nodes are laid out at a fixed width, explicit newlines inside
//! paragraphs are kept, `:shortcode:` emoji are expanded and every output
//! line has its trailing whitespace removed.

use markdown::mdast::{self, Node};
use markdown::{to_mdast, ParseOptions};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use std::borrow::Cow;
use unicode_width::UnicodeWidthStr;

const MAX_RULE_WIDTH: usize = 80;
const CODE_INDENT: &str = "  ";
const QUOTE_PREFIX: &str = "│ ";

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("parsing markdown: {0}")]
    Parse(String),
}

pub fn render(content: &str, width: u16) -> Result<Text<'static>, RenderError> {
    let normalized = content.replace("\r\n", "\n").replace('\t', "    ");
    let root = to_mdast(&normalized, &ParseOptions::gfm())
        .map_err(|err| RenderError::Parse(err.to_string()))?;
    let nodes = match root {
        Node::Root(root) => root.children,
        other => vec![other],
    };
    let mut lines = blocks(&nodes, (width as usize).max(1), true);
    for line in lines.iter_mut() {
        trim_line_end(line);
    }
    while lines.first().is_some_and(is_blank) {
        lines.remove(0);
    }
    while lines.last().is_some_and(is_blank) {
        lines.pop();
    }
    Ok(Text::from(lines))
}

fn blocks(nodes: &[Node], width: usize, spread: bool) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for (idx, node) in nodes.iter().enumerate() {
        if idx > 0 && spread {
            lines.push(Line::default());
        }
        lines.extend(block(node, width));
    }
    lines
}

fn block(node: &Node, width: usize) -> Vec<Line<'static>> {
    match node {
        Node::Heading(heading) => {
            let mut style = Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD);
            if heading.depth == 1 {
                style = style.add_modifier(Modifier::UNDERLINED);
            }
            let mut spans = Vec::new();
            if heading.depth > 2 {
                spans.push(Span::styled(
                    format!("{} ", "#".repeat(heading.depth as usize)),
                    style,
                ));
            }
            inline(&heading.children, style, &mut spans);
            wrap(spans, width)
        }
        Node::Paragraph(paragraph) => {
            let mut spans = Vec::new();
            inline(&paragraph.children, Style::default(), &mut spans);
            wrap(spans, width)
        }
        Node::List(list) => render_list(list, width),
        Node::Blockquote(quote) => {
            let inner = blocks(&quote.children, width.saturating_sub(2).max(1), true);
            let prefix = Span::styled(QUOTE_PREFIX, Style::default().fg(Color::DarkGray));
            prefixed(inner, prefix.clone(), prefix)
                .into_iter()
                .map(|line| line.patch_style(Style::default().add_modifier(Modifier::ITALIC)))
                .collect()
        }
        Node::Code(code) => {
            let style = Style::default().fg(Color::LightGreen);
            let inner_width = width.saturating_sub(CODE_INDENT.width()).max(1);
            code.value
                .split('\n')
                .flat_map(|line| {
                    if line.is_empty() {
                        vec![String::new()]
                    } else {
                        hard_split(line, inner_width)
                    }
                })
                .map(|chunk| Line::from(Span::styled(format!("{CODE_INDENT}{chunk}"), style)))
                .collect()
        }
        Node::ThematicBreak(_) => vec![Line::from(Span::styled(
            "─".repeat(width.min(MAX_RULE_WIDTH)),
            Style::default().fg(Color::DarkGray),
        ))],
        Node::Table(table) => render_table(table, width),
        Node::Html(html) => html
            .value
            .split('\n')
            .map(|line| Line::from(Span::styled(line.to_string(), Style::default().fg(Color::DarkGray))))
            .collect(),
        other => {
            let text = plain_text(std::slice::from_ref(other));
            if text.is_empty() {
                Vec::new()
            } else {
                wrap(vec![Span::raw(text)], width)
            }
        }
    }
}

fn render_list(list: &mdast::List, width: usize) -> Vec<Line<'static>> {
    let bullet_style = Style::default().fg(Color::LightCyan);
    let start = list.start.unwrap_or(1);
    let mut lines = Vec::new();
    for (idx, node) in list.children.iter().enumerate() {
        let Node::ListItem(item) = node else {
            continue;
        };
        if idx > 0 && list.spread {
            lines.push(Line::default());
        }
        let bullet = match (item.checked, list.ordered) {
            (Some(true), _) => "[x] ".to_string(),
            (Some(false), _) => "[ ] ".to_string(),
            (None, true) => format!("{}. ", start + idx as u32),
            (None, false) => "• ".to_string(),
        };
        let indent = " ".repeat(bullet.width());
        let inner_width = width.saturating_sub(bullet.width()).max(1);
        let mut inner = blocks(&item.children, inner_width, item.spread);
        if inner.is_empty() {
            inner.push(Line::default());
        }
        lines.extend(prefixed(
            inner,
            Span::styled(bullet, bullet_style),
            Span::raw(indent),
        ));
    }
    lines
}

fn render_table(table: &mdast::Table, width: usize) -> Vec<Line<'static>> {
    let separator = Span::styled(" │ ", Style::default().fg(Color::DarkGray));
    let mut lines = Vec::new();
    for (row_idx, node) in table.children.iter().enumerate() {
        let Node::TableRow(row) = node else {
            continue;
        };
        let cell_style = if row_idx == 0 {
            Style::default().add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let mut spans = Vec::new();
        for (cell_idx, cell) in row.children.iter().enumerate() {
            if cell_idx > 0 {
                spans.push(separator.clone());
            }
            let cell_children = cell.children().map(Vec::as_slice).unwrap_or_default();
            inline(cell_children, cell_style, &mut spans);
        }
        let row_lines = wrap(spans, width);
        let row_width = row_lines.iter().map(Line::width).max().unwrap_or(0);
        lines.extend(row_lines);
        if row_idx == 0 {
            lines.push(Line::from(Span::styled(
                "─".repeat(row_width.min(width)),
                Style::default().fg(Color::DarkGray),
            )));
        }
    }
    lines
}

fn inline(nodes: &[Node], style: Style, out: &mut Vec<Span<'static>>) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push(Span::styled(expand_emoji(&text.value), style)),
            Node::Strong(strong) => {
                inline(&strong.children, style.add_modifier(Modifier::BOLD), out)
            }
            Node::Emphasis(emphasis) => {
                inline(&emphasis.children, style.add_modifier(Modifier::ITALIC), out)
            }
            Node::Delete(delete) => inline(
                &delete.children,
                style.add_modifier(Modifier::CROSSED_OUT),
                out,
            ),
            Node::InlineCode(code) => out.push(Span::styled(
                code.value.clone(),
                style.fg(Color::Yellow),
            )),
            Node::Link(link) => {
                let link_style = style.fg(Color::LightBlue).add_modifier(Modifier::UNDERLINED);
                inline(&link.children, link_style, out);
                if plain_text(&link.children) != link.url {
                    out.push(Span::styled(
                        format!(" ({})", link.url),
                        style.fg(Color::DarkGray),
                    ));
                }
            }
            Node::Image(image) => out.push(Span::styled(
                format!("[image: {}]", image.alt),
                style.fg(Color::DarkGray),
            )),
            Node::Break(_) => out.push(Span::raw("\n")),
            Node::Html(html) => out.push(Span::styled(html.value.clone(), style.fg(Color::DarkGray))),
            Node::InlineMath(math) => out.push(Span::styled(math.value.clone(), style)),
            Node::FootnoteReference(footnote) => out.push(Span::styled(
                format!("[^{}]", footnote.identifier),
                style.fg(Color::DarkGray),
            )),
            other => {
                if let Some(children) = other.children() {
                    inline(children, style, out);
                }
            }
        }
    }
}

fn plain_text(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(&text.value),
            Node::InlineCode(code) => out.push_str(&code.value),
            Node::Code(code) => out.push_str(&code.value),
            Node::Html(html) => out.push_str(&html.value),
            Node::Image(image) => out.push_str(&image.alt),
            Node::Break(_) => out.push('\n'),
            other => {
                if let Some(children) = other.children() {
                    out.push_str(&plain_text(children));
                }
            }
        }
    }
    out
}

/// Replaces `:shortcode:` sequences with the emoji they name.
fn expand_emoji(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(':') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '+' || c == '-'));
        if let Some(end) = end {
            if end > 0 && after[end..].starts_with(':') {
                if let Some(emoji) = emojis::get_by_shortcode(&after[..end]) {
                    out.push_str(emoji.as_str());
                    rest = &after[end + 1..];
                    continue;
                }
            }
        }
        out.push(':');
        rest = after;
    }
    out.push_str(rest);
    out
}

/// Greedy word wrap that keeps span styles and honors `\n` inside spans.
fn wrap(spans: Vec<Span<'static>>, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for logical in split_newlines(spans) {
        let mut current: Vec<Span<'static>> = Vec::new();
        let mut current_width = 0;
        for (token, style) in tokens(&logical) {
            let token_width = token.width();
            let is_space = token.chars().all(char::is_whitespace);
            if is_space {
                if current_width == 0 {
                    continue;
                }
                if current_width + token_width > width {
                    lines.push(Line::from(std::mem::take(&mut current)));
                    current_width = 0;
                    continue;
                }
                current.push(Span::styled(token, style));
                current_width += token_width;
                continue;
            }
            if current_width > 0 && current_width + token_width > width {
                lines.push(Line::from(std::mem::take(&mut current)));
                current_width = 0;
            }
            if token_width <= width {
                current.push(Span::styled(token, style));
                current_width += token_width;
                continue;
            }
            for chunk in hard_split(&token, width) {
                if current_width > 0 {
                    lines.push(Line::from(std::mem::take(&mut current)));
                }
                current_width = chunk.width();
                current.push(Span::styled(chunk, style));
            }
        }
        lines.push(Line::from(current));
    }
    lines
}

fn split_newlines(spans: Vec<Span<'static>>) -> Vec<Vec<Span<'static>>> {
    let mut logical = vec![Vec::new()];
    for span in spans {
        let mut parts = span.content.split('\n');
        if let (Some(first), Some(line)) = (parts.next(), logical.last_mut()) {
            if !first.is_empty() {
                line.push(Span::styled(first.to_string(), span.style));
            }
        }
        for part in parts {
            let mut line = Vec::new();
            if !part.is_empty() {
                line.push(Span::styled(part.to_string(), span.style));
            }
            logical.push(line);
        }
    }
    logical
}

/// Splits spans into alternating whitespace / non-whitespace runs.
fn tokens(spans: &[Span<'static>]) -> Vec<(String, Style)> {
    let mut out = Vec::new();
    for span in spans {
        let mut run = String::new();
        let mut run_is_space = None;
        for ch in span.content.chars() {
            let space = ch.is_whitespace();
            if run_is_space.is_some_and(|s| s != space) {
                out.push((std::mem::take(&mut run), span.style));
            }
            run_is_space = Some(space);
            run.push(ch);
        }
        if !run.is_empty() {
            out.push((run, span.style));
        }
    }
    out
}

fn hard_split(token: &str, width: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut chunk = String::new();
    for ch in token.chars() {
        let mut buf = [0u8; 4];
        let ch_width = ch.encode_utf8(&mut buf).width();
        if !chunk.is_empty() && chunk.width() + ch_width > width {
            chunks.push(std::mem::take(&mut chunk));
        }
        chunk.push(ch);
    }
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
    chunks
}

fn prefixed(
    lines: Vec<Line<'static>>,
    first: Span<'static>,
    rest: Span<'static>,
) -> Vec<Line<'static>> {
    lines
        .into_iter()
        .enumerate()
        .map(|(idx, mut line)| {
            let prefix = if idx == 0 { first.clone() } else { rest.clone() };
            line.spans.insert(0, prefix);
            line
        })
        .collect()
}

fn trim_line_end(line: &mut Line<'static>) {
    while let Some(last) = line.spans.last_mut() {
        let trimmed = last.content.trim_end();
        if trimmed.is_empty() {
            line.spans.pop();
            continue;
        }
        if trimmed.len() != last.content.len() {
            last.content = Cow::Owned(trimmed.to_string());
        }
        break;
    }
}

fn is_blank(line: &Line<'static>) -> bool {
    line.spans.iter().all(|span| span.content.trim().is_empty())
}

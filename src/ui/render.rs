use crate::state::blocks::{BlockId, CodeBlock};
use crate::ui::text::{cursor_row_col, truncate_to_display_width, wrap_to_width};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

pub fn render_status_line(frame: &mut Frame<'_>, area: Rect, status: &str) {
    if area.height == 0 || area.width == 0 {
        return;
    }

    let text = truncate_to_display_width(status, area.width as usize);
    frame.render_widget(
        Paragraph::new(text).style(Style::default().fg(Color::DarkGray)),
        area,
    );
}

pub fn render_chat(frame: &mut Frame<'_>, area: Rect, lines: &[String], scroll: usize) {
    if area.height == 0 || area.width == 0 {
        return;
    }

    let body = lines.join("\n");
    let paragraph = Paragraph::new(body)
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: false })
        .scroll((scroll as u16, 0));
    frame.render_widget(paragraph, area);
}

/// The code side panel: every block in the conversation listed by title, the
/// focused block's body underneath. An open block is the one still streaming.
pub fn render_panel(
    frame: &mut Frame<'_>,
    area: Rect,
    blocks: &[CodeBlock],
    focused: Option<BlockId>,
) {
    if area.height == 0 || area.width == 0 || blocks.is_empty() {
        return;
    }

    let outer = Block::default().borders(Borders::LEFT).title("code");
    let inner = outer.inner(area);
    frame.render_widget(outer, area);
    if inner.height == 0 {
        return;
    }

    let list_rows = (blocks.len() as u16).min(inner.height / 3).max(1);
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(list_rows), Constraint::Min(0)])
        .split(inner);

    let mut list_lines = Vec::with_capacity(blocks.len());
    for block in blocks {
        let marker = if focused == Some(block.id) { "▸" } else { " " };
        let state = if block.is_open { " …" } else { "" };
        let label = format!("{marker} {}{state}", block.title);
        let style = if focused == Some(block.id) {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        list_lines.push(Line::styled(label, style));
    }
    frame.render_widget(Paragraph::new(list_lines), parts[0]);

    let Some(body_area) = parts.get(1).copied() else {
        return;
    };
    if body_area.height == 0 {
        return;
    }

    let shown = focused
        .and_then(|id| blocks.iter().find(|block| block.id == id))
        .or_else(|| blocks.iter().find(|block| block.is_open))
        .or_else(|| blocks.last());
    let Some(block) = shown else {
        return;
    };

    // Pin to the tail while the block is streaming so the newest code is
    // always visible.
    let code_rows = block.code.lines().count() as u16;
    let viewport = body_area.height.saturating_sub(1);
    let scroll = if block.is_open {
        code_rows.saturating_sub(viewport)
    } else {
        0
    };

    let mut body_lines = vec![Line::styled(
        block.title.clone(),
        Style::default().fg(Color::Cyan),
    )];
    for code_line in block.code.split('\n') {
        body_lines.push(Line::styled(
            code_line.to_string(),
            Style::default().fg(Color::Green),
        ));
    }
    frame.render_widget(
        Paragraph::new(body_lines).scroll((scroll, 0)),
        body_area,
    );
}

pub fn render_input(frame: &mut Frame<'_>, area: Rect, input: &str, cursor_byte: usize) {
    if area.height == 0 || area.width <= 2 {
        return;
    }

    let input_width = area.width.saturating_sub(2).max(1) as usize;
    let rows = wrap_to_width(input, input_width);
    let (cursor_row, cursor_col) = cursor_row_col(input, cursor_byte, input_width);
    let visible_rows = area.height as usize;
    let window_start = cursor_row.saturating_add(1).saturating_sub(visible_rows);

    let mut rendered = Vec::with_capacity(visible_rows);
    for offset in 0..visible_rows {
        let row_index = window_start + offset;
        let prefix = if row_index == 0 { "> " } else { "  " };
        let row = rows.get(row_index).cloned().unwrap_or_default();
        rendered.push(Line::from(format!("{prefix}{row}")));
    }

    frame.render_widget(
        Paragraph::new(rendered)
            .style(Style::default().fg(Color::Gray))
            .wrap(Wrap { trim: false }),
        area,
    );

    let cursor_y = area
        .y
        .saturating_add(cursor_row.saturating_sub(window_start) as u16);
    let cursor_x = area
        .x
        .saturating_add(2 + cursor_col as u16)
        .min(area.x.saturating_add(area.width.saturating_sub(1)));
    frame.set_cursor_position((cursor_x, cursor_y));
}

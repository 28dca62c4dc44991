use unicode_width::UnicodeWidthChar;

pub fn char_width(ch: char) -> usize {
    UnicodeWidthChar::width(ch).unwrap_or(0)
}

pub fn display_width(text: &str) -> usize {
    text.chars().map(char_width).sum()
}

/// Hard-wrap `input` to `width` display columns, honoring embedded newlines.
/// Always yields at least one (possibly empty) row.
pub fn wrap_to_width(input: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut rows = vec![String::new()];
    let mut row_width = 0usize;

    for ch in input.chars() {
        if ch == '\r' {
            continue;
        }
        if ch == '\n' {
            rows.push(String::new());
            row_width = 0;
            continue;
        }
        let ch_width = char_width(ch);
        if row_width + ch_width > width && row_width > 0 {
            rows.push(String::new());
            row_width = 0;
        }
        if let Some(row) = rows.last_mut() {
            row.push(ch);
        }
        row_width += ch_width;
    }

    rows
}

/// Number of visual rows `input` occupies at `width` columns.
pub fn visual_rows(input: &str, width: usize) -> usize {
    wrap_to_width(input, width).len().max(1)
}

/// Visual (row, column) of the cursor at byte offset `cursor_byte` under the
/// same wrapping as [`wrap_to_width`].
pub fn cursor_row_col(input: &str, cursor_byte: usize, width: usize) -> (usize, usize) {
    let width = width.max(1);
    let cursor_byte = clamp_boundary_left(input, cursor_byte);
    let mut row = 0usize;
    let mut col = 0usize;

    for (idx, ch) in input.char_indices() {
        if idx >= cursor_byte {
            break;
        }
        if ch == '\r' {
            continue;
        }
        if ch == '\n' {
            row += 1;
            col = 0;
            continue;
        }
        let ch_width = char_width(ch);
        if col + ch_width > width && col > 0 {
            row += 1;
            col = 0;
        }
        col += ch_width;
    }

    if col >= width {
        row += 1;
        col = 0;
    }

    (row, col)
}

pub fn truncate_to_display_width(text: &str, max_width: usize) -> String {
    let mut out = String::new();
    let mut used = 0usize;
    for ch in text.chars() {
        let ch_width = char_width(ch);
        if used + ch_width > max_width && used > 0 {
            break;
        }
        out.push(ch);
        used += ch_width;
    }
    out
}

/// Largest char boundary at or before `idx`.
pub fn clamp_boundary_left(input: &str, idx: usize) -> usize {
    let mut idx = idx.min(input.len());
    while idx > 0 && !input.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Char boundary immediately before `idx` (0 at the start).
pub fn prev_boundary(input: &str, idx: usize) -> usize {
    let idx = clamp_boundary_left(input, idx);
    if idx == 0 {
        return 0;
    }
    let mut prev = idx - 1;
    while prev > 0 && !input.is_char_boundary(prev) {
        prev -= 1;
    }
    prev
}

/// Char boundary immediately after `idx` (input length at the end).
pub fn next_boundary(input: &str, idx: usize) -> usize {
    let idx = clamp_boundary_left(input, idx);
    match input[idx..].chars().next() {
        Some(ch) => idx + ch.len_utf8(),
        None => input.len(),
    }
}

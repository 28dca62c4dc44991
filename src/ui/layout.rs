use ratatui::layout::{Constraint, Direction, Layout, Rect};

/// Screen regions for one frame: status header, chat transcript, optional
/// code side panel, input box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaneLayout {
    pub header: Rect,
    pub chat: Rect,
    pub panel: Option<Rect>,
    pub input: Rect,
}

const PANEL_PERCENT: u16 = 38;

pub fn split_panes(area: Rect, input_rows: u16, with_panel: bool) -> PaneLayout {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(input_rows.max(1)),
        ])
        .split(area);

    let (chat, panel) = if with_panel {
        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(100 - PANEL_PERCENT),
                Constraint::Percentage(PANEL_PERCENT),
            ])
            .split(rows[1]);
        (body[0], Some(body[1]))
    } else {
        (rows[1], None)
    };

    PaneLayout {
        header: rows[0],
        chat,
        panel,
        input: rows[2],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_without_panel_uses_full_width() {
        let area = Rect::new(0, 0, 100, 30);
        let panes = split_panes(area, 2, false);

        assert_eq!(panes.header.height, 1);
        assert_eq!(panes.chat.width, 100);
        assert_eq!(panes.chat.height, 27);
        assert_eq!(panes.panel, None);
        assert_eq!(panes.input.height, 2);
    }

    #[test]
    fn test_split_with_panel_reserves_side_column() {
        let area = Rect::new(0, 0, 100, 30);
        let panes = split_panes(area, 1, true);

        let panel = panes.panel.expect("panel pane");
        assert_eq!(panes.chat.y, 1);
        assert_eq!(panel.y, 1);
        assert_eq!(panes.chat.width + panel.width, 100);
        assert!(panel.width >= 30);
    }

    #[test]
    fn test_input_rows_never_collapse_to_zero() {
        let area = Rect::new(0, 0, 80, 10);
        let panes = split_panes(area, 0, false);
        assert_eq!(panes.input.height, 1);
    }
}

use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    symbols::border,
    text::{Line, Span},
    widgets::{Block, Cell, Clear, Paragraph, Row, Table, Widget},
};

use crate::domain::HELP_TEXT;
use crate::session::ViewModel;

const MAX_COLUMN_WIDTH: u16 = 24;

/// Draws one frame from the projected view model. Pure function of its
/// inputs; all state lives in the session and the controller.
pub fn draw(frame: &mut Frame, model: &ViewModel, prompt: Option<(&str, usize)>) {
    let chunks = Layout::vertical([
        Constraint::Min(3),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .split(frame.area());

    draw_table(frame, chunks[0], model);
    draw_sections(frame, chunks[1], model);
    draw_status(frame, chunks[2], model, prompt);

    if model.show_help {
        draw_help(frame);
    }
}

fn draw_table(frame: &mut Frame, area: Rect, model: &ViewModel) {
    let mut title = format!(" {} ", model.view_title);
    if let Some((rows, cols)) = model.shape {
        title = format!(" {} ({rows}x{cols}) ", model.view_title);
    }
    let block = Block::bordered()
        .title(Line::from(title.bold()).centered())
        .border_set(border::THICK);

    if model.headers.is_empty() {
        let hint = Paragraph::new("No data. Press ? for help, : to enter a command.")
            .centered()
            .block(block);
        frame.render_widget(hint, area);
        return;
    }

    let widths: Vec<Constraint> = model
        .headers
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            let content = model
                .rows
                .iter()
                .map(|r| r.get(idx).map(|c| c.chars().count()).unwrap_or(0))
                .max()
                .unwrap_or(0);
            let w = content.max(header.chars().count()) as u16;
            Constraint::Length(w.clamp(3, MAX_COLUMN_WIDTH))
        })
        .collect();

    let header = Row::new(
        model
            .headers
            .iter()
            .map(|h| Cell::from(h.clone()).style(Style::default().add_modifier(Modifier::BOLD))),
    );
    let rows = model
        .rows
        .iter()
        .map(|r| Row::new(r.iter().map(|c| Cell::from(c.clone()))));
    let shown = model.rows.len();
    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(block.title_bottom(
            Line::from(format!(" {shown} of {} rows ", model.total_rows)).right_aligned(),
        ));
    frame.render_widget(table, area);
}

fn draw_sections(frame: &mut Frame, area: Rect, model: &ViewModel) {
    let onoff = |visible: bool| if visible { "shown".green() } else { "hidden".dim() };
    let mut spans = vec![
        Span::from(" Filter: "),
        onoff(model.filter_visible),
        Span::from("  Cleaning: "),
        onoff(model.cleaning_visible),
    ];
    if !model.hidden_charts.is_empty() {
        spans.push(Span::from("  Hidden charts: "));
        spans.push(model.hidden_charts.join(", ").dim());
    }
    if let Some(name) = &model.download_name {
        spans.push(Span::from("  Chart: "));
        spans.push(name.clone().yellow());
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_status(frame: &mut Frame, area: Rect, model: &ViewModel, prompt: Option<(&str, usize)>) {
    if let Some((text, cursor)) = prompt {
        let line = Line::from(vec![Span::from(":").bold(), Span::from(text.to_string())]);
        frame.render_widget(Paragraph::new(line), area);
        frame.set_cursor_position((area.x + 1 + cursor as u16, area.y));
        return;
    }
    let error = model.notices.iter().any(|n| n.is_error);
    let style = if error {
        Style::default().fg(Color::Red)
    } else {
        Style::default()
    };
    frame.render_widget(
        Paragraph::new(format!(" {}", model.status_line)).style(style),
        area,
    );
}

fn draw_help(frame: &mut Frame) {
    let area = centered(frame.area(), 64, 24);
    let block = Block::bordered()
        .title(Line::from(" Help ".bold()).centered())
        .border_set(border::THICK);
    Clear.render(area, frame.buffer_mut());
    frame.render_widget(Paragraph::new(HELP_TEXT).block(block), area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect {
        x: area.x + (area.width - w) / 2,
        y: area.y + (area.height - h) / 2,
        width: w,
        height: h,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Notice, Section};
    use ratatui::{Terminal, backend::TestBackend};

    fn model() -> ViewModel {
        ViewModel {
            table_name: "people.csv".to_string(),
            shape: Some((3, 2)),
            view_title: "people.csv".to_string(),
            headers: vec!["".to_string(), "name".to_string(), "age".to_string()],
            rows: vec![
                vec!["0".to_string(), "ada".to_string(), "36".to_string()],
                vec!["1".to_string(), "bob".to_string(), "∅".to_string()],
            ],
            total_rows: 3,
            status_line: "Ready".to_string(),
            ..ViewModel::default()
        }
    }

    fn rendered(model: &ViewModel, prompt: Option<(&str, usize)>) -> String {
        let mut terminal = Terminal::new(TestBackend::new(60, 12)).unwrap();
        terminal.draw(|f| draw(f, model, prompt)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    #[test]
    fn table_headers_and_null_marker() {
        let screen = rendered(&model(), None);
        assert!(screen.contains("name"));
        assert!(screen.contains("age"));
        assert!(screen.contains("∅"));
        assert!(screen.contains("(3x2)"));
        assert!(screen.contains("2 of 3 rows"));
        assert!(screen.contains("Ready"));
    }

    #[test]
    fn prompt_replaces_status_line() {
        let screen = rendered(&model(), Some(("rename a b", 4)));
        assert!(screen.contains(":rename a b"));
        assert!(!screen.contains("Ready"));
    }

    #[test]
    fn help_popup_overlays() {
        let mut m = model();
        m.show_help = true;
        let screen = rendered(&m, None);
        assert!(screen.contains("Help"));
    }

    #[test]
    fn empty_model_hints_at_commands() {
        let mut m = ViewModel::default();
        m.view_title = "No data".to_string();
        m.status_line = "No table loaded".to_string();
        let screen = rendered(&m, None);
        assert!(screen.contains("No data"));
        assert!(screen.contains("? for help"));
    }

    #[test]
    fn error_notice_drives_status_styling() {
        let mut m = model();
        m.notices.push(Notice {
            section: Section::Cleaning,
            text: "boom".to_string(),
            is_error: true,
        });
        m.status_line = "boom".to_string();
        let screen = rendered(&m, None);
        assert!(screen.contains("boom"));
    }
}

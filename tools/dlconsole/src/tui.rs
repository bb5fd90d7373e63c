use crate::errors::ConsoleError;
use crate::hotkeys::console_controls_legend;
use crate::progress::ProgressState;
use crate::types::RunLifecycle;
use crate::viewport::AutoFollowViewport;
use ratatui::backend::TestBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph};
use ratatui::{Frame, Terminal};

const HEADER_ROWS: u16 = 3;
const FOOTER_ROWS: u16 = 1;
const LOG_BORDER_ROWS: u16 = 2;
pub const JUMP_TO_BOTTOM_MARKER: &str = "[G] jump to bottom";

#[derive(Debug, Clone, Copy)]
pub struct ConsoleView<'a> {
    pub lines: &'a [String],
    pub progress: &'a ProgressState,
    pub viewport: &'a AutoFollowViewport,
    pub lifecycle: RunLifecycle,
    pub status: Option<&'a str>,
}

/// Rows available to log lines in a terminal of `height` rows.
pub fn log_body_height(height: u16) -> u64 {
    u64::from(height.saturating_sub(HEADER_ROWS + FOOTER_ROWS + LOG_BORDER_ROWS))
}

pub fn progress_label(progress: &ProgressState) -> String {
    let mut label = format!("{} {}", progress.phase.as_str(), progress.percent_text().trim());
    if let Some(eta) = &progress.eta_text {
        label.push_str(&format!(" ETA {eta}"));
    }
    if let Some(summary) = &progress.summary {
        label.push_str(&format!(" ({summary})"));
    }
    if let Some(file) = &progress.label {
        label.push_str(&format!(" {file}"));
    }
    label
}

pub fn draw_console(frame: &mut Frame<'_>, view: &ConsoleView<'_>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(HEADER_ROWS),
            Constraint::Min(LOG_BORDER_ROWS),
            Constraint::Length(FOOTER_ROWS),
        ])
        .split(frame.area());

    let ratio = (view.progress.percent / 100.0).clamp(0.0, 1.0);
    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("dlconsole [{}]", view.lifecycle.as_str())),
        )
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(ratio)
        .label(progress_label(view.progress));
    frame.render_widget(gauge, chunks[0]);

    // Only the viewport's render range is materialized; the paragraph scroll
    // hides the overscan rows above the window.
    let range = view.viewport.render_range();
    let window = view.viewport.window_rows();
    let end = range.end.min(view.lines.len());
    let start = range.start.min(end);
    let rows = view.lines[start..end]
        .iter()
        .map(|line| Line::from(line.as_str()))
        .collect::<Vec<_>>();
    let skip = u16::try_from(window.start.saturating_sub(start)).unwrap_or(u16::MAX);
    frame.render_widget(
        Paragraph::new(rows)
            .scroll((skip, 0))
            .block(Block::default().borders(Borders::ALL).title("Log")),
        chunks[1],
    );

    // Marker and status go first so a narrow terminal truncates the legend.
    let mut footer = Vec::new();
    if !view.viewport.is_following() {
        footer.push(Span::styled(
            JUMP_TO_BOTTOM_MARKER,
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ));
        footer.push(Span::raw("  "));
    }
    if let Some(status) = view.status {
        footer.push(Span::styled(status, Style::default().fg(Color::Magenta)));
        footer.push(Span::raw("  "));
    }
    footer.push(Span::raw(console_controls_legend()));
    frame.render_widget(Paragraph::new(Line::from(footer)), chunks[2]);
}

pub fn render_console(
    view: &ConsoleView<'_>,
    width: u16,
    height: u16,
) -> Result<String, ConsoleError> {
    let backend = TestBackend::new(width, height);
    let mut terminal = Terminal::new(backend).map_err(|e| ConsoleError::Io(e.to_string()))?;
    terminal
        .draw(|frame| draw_console(frame, view))
        .map_err(|e| ConsoleError::Io(e.to_string()))?;

    let mut out = String::new();
    let buffer = terminal.backend().buffer();
    for y in 0..height {
        for x in 0..width {
            out.push_str(buffer[(x, y)].symbol());
        }
        out.push('\n');
    }
    Ok(out)
}

//! Terminal User Interface (TUI) rendering and management.
//!
//! This module handles initializing the terminal in raw mode, restoring it on exit,
//! and drawing the instance table, the details pane and the status bar using `ratatui`.

use std::io::{self, Stdout};

use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Block, BorderType, Borders, Cell, Clear, Paragraph, Row, Table, Wrap,
};
use ratatui::{Frame, Terminal};

use crate::app::{App, InputMode, StatusLevel};
use crate::attributes::InstanceAttributes;
use crate::process::MergedInstanceView;

/// Type alias for the specific terminal backend used.
pub type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

/// Initializes the terminal for TUI mode.
///
/// Enables raw mode, enters the alternate screen, and creates a `ratatui` Terminal instance.
pub fn init_terminal() -> io::Result<TuiTerminal> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

/// Restores the terminal to its original state.
///
/// Disables raw mode, leaves the alternate screen, and shows the cursor.
pub fn restore_terminal(mut terminal: TuiTerminal) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Leaves raw mode and the alternate screen without dropping the terminal,
/// so a line-based prompt can run in between.
pub fn suspend_terminal(terminal: &mut TuiTerminal) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()
}

/// Counterpart of [`suspend_terminal`].
pub fn resume_terminal(terminal: &mut TuiTerminal) -> io::Result<()> {
    enable_raw_mode()?;
    execute!(terminal.backend_mut(), EnterAlternateScreen, EnableMouseCapture)?;
    terminal.clear()
}

/// Draws the current application state to the terminal.
pub fn draw(app: &mut App, terminal: &mut TuiTerminal) -> io::Result<()> {
    let title = window_title(app);
    execute!(terminal.backend_mut(), SetTitle(title))?;
    terminal.draw(|frame| render(app, frame))?;
    Ok(())
}

fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.size();
    let constraints = if app.show_details {
        vec![
            Constraint::Min(5),
            Constraint::Percentage(55),
            Constraint::Length(4),
        ]
    } else {
        vec![Constraint::Min(5), Constraint::Length(4)]
    };
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);
    let border_style = Style::default().fg(Color::DarkGray);

    render_table(app, frame, vertical[0], border_style);
    if app.show_details {
        render_details(app, frame, vertical[1], border_style);
    }
    let status_area = vertical[vertical.len() - 1];

    let default_help = if app.use_symbols {
        "↑/↓ select | r refresh | s start | x stop | d dashboard | h homepage | c copy url | l details | q quit | ? help"
    } else {
        "Up/Down select | r refresh | s start | x stop | d dashboard | h homepage | c copy url | l details | q quit | ? help"
    };
    let (help_line, help_style) = match app.status_message() {
        Some((message, StatusLevel::Warning)) => {
            (message.to_string(), Style::default().fg(Color::Yellow))
        }
        Some((message, StatusLevel::Info)) => {
            (message.to_string(), Style::default().fg(Color::Gray))
        }
        None => (default_help.to_string(), Style::default().fg(Color::DarkGray)),
    };
    let status = Paragraph::new(Text::from(vec![
        Line::from(Span::raw(app.status_line())),
        Line::from(Span::styled(help_line, help_style)),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(border_style),
    );
    frame.render_widget(status, status_area);

    if app.input_mode != InputMode::Normal {
        render_confirm(app, frame, area);
    }

    if app.show_help {
        let popup_area = centered_rect(60, 60, area);
        let help_text = [
            "Navigation:",
            "  Up/Down    Select instance",
            "  Tab        Cycle selection",
            "  Click      Select row",
            "  r          Rescan processes",
            "",
            "Instances:",
            "  s          Start selected (stopped) instance",
            "  x          Stop selected (running) instance",
            "  d          Open dashboard in browser",
            "  h          Open homepage in browser",
            "  c          Copy homepage URL",
            "",
            "Details:",
            "  l / Enter  Toggle details and log pane",
            "  PageUp/Dn  Scroll log",
            "  Home/End   Scroll to top/bottom",
            "  f          Toggle auto-follow",
            "",
            "General:",
            "  ?          Toggle this help",
            "  q          Quit",
        ]
        .join("\n");

        let help_block = Paragraph::new(help_text)
            .block(
                Block::default()
                    .title("Help")
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded),
            )
            .style(Style::default().bg(Color::DarkGray).fg(Color::White));
        frame.render_widget(Clear, popup_area);
        frame.render_widget(help_block, popup_area);
    }
}

fn render_table(app: &mut App, frame: &mut Frame, area: Rect, border_style: Style) {
    app.table_area = area;

    let header = Row::new(
        ["", "Instance", "PID", "Port", "Proto", "Prefix", "Workdir", "Command"]
            .into_iter()
            .map(|title| Cell::from(title).style(Style::default().add_modifier(Modifier::BOLD))),
    )
    .style(Style::default().fg(Color::Cyan));

    let rows: Vec<Row> = app
        .instances
        .iter()
        .map(|view| {
            let busy = app.port_busy(view);
            let (state, state_style) = state_cell(view, busy, app.use_symbols);
            let dim = if view.is_stopped() {
                Style::default().fg(Color::Gray)
            } else {
                Style::default()
            };
            Row::new(vec![
                Cell::from(state).style(state_style),
                Cell::from(view.display_name().to_string()).style(dim),
                Cell::from(view.pid.map(|pid| pid.to_string()).unwrap_or_default()).style(dim),
                Cell::from(view.attributes.port.clone()).style(if busy {
                    Style::default().fg(Color::Red)
                } else {
                    dim
                }),
                Cell::from(view.attributes.protocol.as_str()).style(dim),
                Cell::from(view.attributes.url_prefix.clone()).style(dim),
                Cell::from(
                    view.cwd
                        .as_ref()
                        .map(|cwd| cwd.display().to_string())
                        .unwrap_or_else(|| "?".to_string()),
                )
                .style(dim),
                Cell::from(view.command_line()).style(dim),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(2),
        Constraint::Length(12),
        Constraint::Length(8),
        Constraint::Length(6),
        Constraint::Length(6),
        Constraint::Length(10),
        Constraint::Percentage(25),
        Constraint::Min(20),
    ];
    let title = format!("Instances ({})", app.instances.len());
    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(border_style),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let selected = if app.instances.is_empty() {
        None
    } else {
        Some(app.selected.min(app.instances.len() - 1))
    };
    app.table_state.select(selected);
    frame.render_stateful_widget(table, area, &mut app.table_state);

    if app.instances.is_empty() {
        let inner = Rect {
            x: area.x + 1,
            y: app.table_body_top(),
            width: area.width.saturating_sub(2),
            height: 1,
        };
        let empty = Paragraph::new("No instances declared or running")
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(empty, inner);
    }
}

fn render_details(app: &mut App, frame: &mut Frame, area: Rect, border_style: Style) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(area);

    let details = match app.selected_instance() {
        Some(view) => attribute_lines(view),
        None => vec![Line::from("No selection")],
    };
    let details_block = Paragraph::new(details)
        .block(
            Block::default()
                .title("Details")
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(border_style),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(details_block, columns[0]);

    let log_block = Block::default()
        .title(log_title(app))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(if app.log.follow {
            Style::default().fg(Color::Green)
        } else {
            border_style
        });
    let log_area = log_block.inner(columns[1]);
    app.set_log_view_height(log_area.height as usize);

    let text = app.log.content.display_text();
    let lines: Vec<Line> = text
        .lines()
        .skip(app.log.scroll)
        .take(log_area.height as usize)
        .map(|line| Line::from(truncate(strip_carriage(line), log_area.width as usize)))
        .collect();
    let paragraph = Paragraph::new(lines).block(log_block);
    frame.render_widget(paragraph, columns[1]);
}

fn render_confirm(app: &App, frame: &mut Frame, area: Rect) {
    let Some(view) = app.selected_instance() else {
        return;
    };
    let (title, body) = match app.input_mode {
        InputMode::ConfirmStart => (
            "Start instance",
            format!(
                "Run {}?\n\n{}\n\ny: yes   o: yes, output on console   n: cancel",
                view.display_name(),
                view.command_line()
            ),
        ),
        InputMode::ConfirmStop => (
            "Stop instance",
            format!(
                "Stop {} with PID = {}?\n\ny: yes   n: cancel",
                view.display_name(),
                view.pid.map(|pid| pid.to_string()).unwrap_or_default()
            ),
        ),
        InputMode::ConfirmPassword => (
            "Dashboard password",
            "The password file does not exist.\nCreate it now?\n\ny: yes   n: cancel".to_string(),
        ),
        InputMode::Normal => return,
    };
    let popup_area = centered_rect(50, 30, area);
    let popup = Paragraph::new(body)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(Clear, popup_area);
    frame.render_widget(popup, popup_area);
}

fn attribute_lines(view: &MergedInstanceView) -> Vec<Line<'static>> {
    let attrs: &InstanceAttributes = &view.attributes;
    let mut lines = vec![
        field("instance", view.display_name().to_string()),
        field(
            "pid",
            view.pid
                .map(|pid| pid.to_string())
                .unwrap_or_else(|| "stopped".to_string()),
        ),
        field("port", attrs.port.clone()),
        field("protocol", attrs.protocol.as_str().to_string()),
        field("host", attrs.host.clone()),
        field("url prefix", attrs.url_prefix.clone()),
        field("apps", attrs.app_names.clone()),
        field("server", attrs.server.clone()),
        field("workers", attrs.workers.clone()),
        field("dashboard", attrs.dashboard_mode.clone()),
        field("watch", attrs.watch.clone()),
        field("password file", attrs.password_file.clone()),
        field("log level", attrs.log_level.clone()),
        field("debug", attrs.debug.to_string()),
    ];
    if let Some(cert) = &attrs.ssl_cert {
        lines.push(field("ssl cert", cert.clone()));
    }
    if let Some(key) = &attrs.ssl_key {
        lines.push(field("ssl key", key.clone()));
    }
    lines.push(field(
        "error log",
        attrs
            .error_log
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "-".to_string()),
    ));
    lines
}

fn field(label: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{:<14}", label), Style::default().fg(Color::DarkGray)),
        Span::raw(value),
    ])
}

fn state_cell(view: &MergedInstanceView, busy: bool, use_symbols: bool) -> (&'static str, Style) {
    match (view.is_stopped(), busy, use_symbols) {
        (false, _, true) => ("▲", Style::default().fg(Color::Green)),
        (false, _, false) => ("R", Style::default().fg(Color::Green)),
        (true, true, _) => ("!", Style::default().fg(Color::Red)),
        (true, false, true) => ("■", Style::default().fg(Color::DarkGray)),
        (true, false, false) => ("S", Style::default().fg(Color::DarkGray)),
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
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
        .split(popup_layout[1])[1]
}

fn window_title(app: &App) -> String {
    match app.selected_instance() {
        Some(view) => format!("webrack · {}", view.display_name()),
        None => "webrack".to_string(),
    }
}

fn log_title(app: &App) -> String {
    let source = app
        .log
        .source
        .as_ref()
        .and_then(|path| path.as_ref())
        .map(|path| path.display().to_string());
    match source {
        Some(path) => format!("Log - {}", path),
        None => "Log".to_string(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out = text.chars().take(max.saturating_sub(1)).collect::<String>();
    out.push('~');
    out
}

fn strip_carriage(text: &str) -> &str {
    text.rsplit('\r').next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crossterm::event::{KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
    use ratatui::backend::TestBackend;

    use super::*;
    use crate::context::tests::test_context;

    fn app_with_instances(count: u16) -> App {
        let ctx = test_context();
        let views = (0..count)
            .map(|i| {
                MergedInstanceView::stopped(
                    format!("I{}", i),
                    ctx.expected_cmdline(&format!("apps -P {}", 9000 + i)),
                    ctx.workdir.clone(),
                )
            })
            .collect();
        let mut app = App::new(false);
        app.replace_instances(views, HashSet::new(), 0);
        app
    }

    fn click(app: &mut App, row: u16) {
        app.handle_mouse(MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column: 10,
            row,
            modifiers: KeyModifiers::NONE,
        });
    }

    fn screen_row(terminal: &Terminal<TestBackend>, y: u16) -> String {
        let buffer = terminal.backend().buffer();
        (0..buffer.area.width)
            .map(|x| buffer.get(x, y).symbol().to_string())
            .collect()
    }

    #[test]
    fn clicks_below_the_table_keep_selection() {
        let mut terminal = Terminal::new(TestBackend::new(120, 20)).unwrap();
        let mut app = app_with_instances(10);
        app.show_details = true;
        terminal.draw(|frame| render(&mut app, frame)).unwrap();

        let table = app.table_area;
        click(&mut app, table.y + table.height - 1);
        click(&mut app, table.y + table.height + 2);
        click(&mut app, 19);
        assert_eq!(app.selected, 0);

        let row = app.table_body_top() + 1;
        click(&mut app, row);
        assert_eq!(app.selected, 1);
    }

    #[test]
    fn clicks_follow_the_table_scroll_offset() {
        let mut terminal = Terminal::new(TestBackend::new(120, 12)).unwrap();
        let mut app = app_with_instances(10);
        app.selected = 9;
        terminal.draw(|frame| render(&mut app, frame)).unwrap();

        let offset = app.table_state.offset();
        assert!(offset > 0);
        let first_row = screen_row(&terminal, app.table_body_top());

        let row = app.table_body_top();
        click(&mut app, row);
        assert_eq!(app.selected, offset);
        assert!(first_row.contains(&format!(" I{} ", offset)), "{}", first_row);
    }

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate("abcdef", 4), "abc~");
        assert_eq!(truncate("abc", 4), "abc");
        assert_eq!(truncate("abc", 0), "");
    }

    #[test]
    fn carriage_returns_keep_last_segment() {
        assert_eq!(strip_carriage("10%\r50%\r100%"), "100%");
    }
}

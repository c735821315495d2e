//! Dashboard state and input handling.
//!
//! This module holds the `App` struct, which keeps the latest reconciled
//! instance list, the selection, the confirmation dialogs and the log pane.
//! Key and mouse events are translated into [`AppAction`]s that the event loop
//! carries out.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use ratatui::widgets::TableState;

use crate::context::Context;
use crate::lifecycle::ConsoleMode;
use crate::logview::LogContent;
use crate::process::MergedInstanceView;

/// Modes of user input interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Standard navigation mode.
    Normal,
    /// Asking whether to start the selected instance.
    ConfirmStart,
    /// Asking whether to stop the selected instance.
    ConfirmStop,
    /// Asking whether to create a missing password file.
    ConfirmPassword,
}

/// Actions resulting from user interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    /// No action required.
    None,
    /// Exit the dashboard.
    Quit,
    /// Run a new reconciliation pass.
    Refresh,
    /// Start the instance at this index.
    Start { index: usize, console: ConsoleMode },
    /// Stop this process.
    Stop { pid: u32 },
    /// Open the homepage of the instance at this index.
    OpenHomepage(usize),
    /// Open the dashboard of the instance at this index.
    OpenDashboard(usize),
    /// Run the credential flow for this password file.
    CreatePassword(PathBuf),
    /// Copy the homepage URL of the instance at this index.
    CopyUrl(usize),
}

#[derive(Debug, Clone, Copy)]
pub enum StatusLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone)]
struct StatusMessage {
    text: String,
    at: Instant,
    ttl: Option<Duration>,
    level: StatusLevel,
}

/// Contents and scroll state of the log pane.
#[derive(Debug, Clone)]
pub struct LogPane {
    /// Log file the current subscription reads; `Some(None)` when the
    /// selected instance has no log configured.
    pub source: Option<Option<PathBuf>>,
    pub content: LogContent,
    pub scroll: usize,
    pub follow: bool,
    subscription: Option<u64>,
}

impl LogPane {
    fn new() -> Self {
        Self {
            source: None,
            content: LogContent::NotConfigured,
            scroll: 0,
            follow: true,
            subscription: None,
        }
    }

    pub fn line_count(&self) -> usize {
        self.content.display_text().lines().count()
    }
}

/// The dashboard state container.
#[derive(Debug)]
pub struct App {
    /// Latest reconciled instances.
    pub instances: Vec<MergedInstanceView>,
    /// Ports of stopped instances that already accept connections.
    pub busy_ports: HashSet<u16>,
    /// Index of the currently selected instance.
    pub selected: usize,
    /// Current input mode.
    pub input_mode: InputMode,
    /// Flag indicating if the dashboard should exit.
    pub should_quit: bool,
    /// Whether to show the help overlay.
    pub show_help: bool,
    /// Whether the details and log pane is visible.
    pub show_details: bool,
    /// Whether to use Unicode symbols.
    pub use_symbols: bool,
    /// Number of processes the last scan could not inspect.
    pub skipped: usize,
    pub log: LogPane,
    /// Height of the log area (for scrolling calculations).
    pub log_view_height: usize,
    /// Screen area of the instance table, border included (for mouse clicks).
    pub table_area: Rect,
    /// Selection and scroll offset of the instance table, kept across frames.
    pub table_state: TableState,
    last_refresh: Option<Instant>,
    pending_password: Option<PathBuf>,
    status_message: Option<StatusMessage>,
}

impl App {
    pub fn new(use_symbols: bool) -> Self {
        Self {
            instances: Vec::new(),
            busy_ports: HashSet::new(),
            selected: 0,
            input_mode: InputMode::Normal,
            should_quit: false,
            show_help: false,
            show_details: false,
            use_symbols,
            skipped: 0,
            log: LogPane::new(),
            log_view_height: 0,
            table_area: Rect::default(),
            table_state: TableState::default(),
            last_refresh: None,
            pending_password: None,
            status_message: None,
        }
    }

    pub fn selected_instance(&self) -> Option<&MergedInstanceView> {
        self.instances.get(self.selected)
    }

    /// Installs a fresh snapshot, keeping the selection on the entry with
    /// the same command line when it is still present.
    pub fn replace_instances(
        &mut self,
        instances: Vec<MergedInstanceView>,
        busy_ports: HashSet<u16>,
        skipped: usize,
    ) {
        let previous = self.selected_instance().map(|view| view.cmdline.clone());
        self.instances = instances;
        self.busy_ports = busy_ports;
        self.skipped = skipped;
        self.last_refresh = Some(Instant::now());
        self.selected = previous
            .and_then(|cmdline| self.instances.iter().position(|view| view.cmdline == cmdline))
            .unwrap_or(self.selected)
            .min(self.instances.len().saturating_sub(1));
    }

    pub fn port_busy(&self, view: &MergedInstanceView) -> bool {
        view.is_stopped()
            && view
                .attributes
                .port_number()
                .is_some_and(|port| self.busy_ports.contains(&port))
    }

    /// Log file the pane should follow, or `None` when the pane is hidden.
    pub fn wanted_log_source(&self, ctx: &Context) -> Option<Option<PathBuf>> {
        if !self.show_details {
            return None;
        }
        let view = self.selected_instance()?;
        Some(
            view.attributes
                .error_log
                .as_deref()
                .map(|path| ctx.resolve(view.cwd.as_deref(), path)),
        )
    }

    /// Resets the pane for a new subscription (or none).
    pub fn attach_log(&mut self, source: Option<Option<PathBuf>>, subscription: Option<u64>) {
        self.log = LogPane::new();
        self.log.source = source;
        self.log.subscription = subscription;
    }

    pub fn on_log_snapshot(&mut self, subscription: u64, content: LogContent) {
        if self.log.subscription != Some(subscription) {
            return;
        }
        self.log.content = content;
        if self.log.follow {
            self.ensure_follow();
        } else {
            let max_scroll = self.max_log_scroll();
            self.log.scroll = self.log.scroll.min(max_scroll);
        }
    }

    /// Asks the user whether to create the missing password file.
    pub fn request_password(&mut self, path: PathBuf) {
        self.set_status_warning_persistent(format!(
            "Password file {} is missing. Create it now? (y/n)",
            path.display()
        ));
        self.pending_password = Some(path);
        self.input_mode = InputMode::ConfirmPassword;
    }

    pub fn handle_mouse(&mut self, mouse: MouseEvent) -> AppAction {
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                if self.input_mode == InputMode::Normal {
                    if let Some(index) = self.instance_at(mouse.column, mouse.row) {
                        self.selected = index;
                    }
                }
            }
            MouseEventKind::ScrollDown => self.scroll_down(3),
            MouseEventKind::ScrollUp => self.scroll_up(3),
            _ => {}
        }
        AppAction::None
    }

    /// First screen row below the table's top border and header.
    pub fn table_body_top(&self) -> u16 {
        self.table_area.y.saturating_add(2)
    }

    /// Instance shown at a screen cell, honoring the table's scroll offset.
    fn instance_at(&self, column: u16, row: u16) -> Option<usize> {
        let area = self.table_area;
        let inside_columns = column > area.x && column.saturating_add(1) < area.x.saturating_add(area.width);
        // The last row of the area is the bottom border.
        let body_bottom = area.y.saturating_add(area.height).saturating_sub(1);
        if !inside_columns || row < self.table_body_top() || row >= body_bottom {
            return None;
        }
        let index = self.table_state.offset() + (row - self.table_body_top()) as usize;
        (index < self.instances.len()).then_some(index)
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> AppAction {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return AppAction::Quit;
        }
        match self.input_mode {
            InputMode::Normal => self.handle_normal_input(key),
            InputMode::ConfirmStart => self.handle_confirm_start(key),
            InputMode::ConfirmStop => self.handle_confirm_stop(key),
            InputMode::ConfirmPassword => self.handle_confirm_password(key),
        }
    }

    fn handle_confirm_start(&mut self, key: KeyEvent) -> AppAction {
        let console = match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => ConsoleMode::Discard,
            KeyCode::Char('o') | KeyCode::Char('O') => ConsoleMode::Inherit,
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.cancel_dialog();
                return AppAction::None;
            }
            _ => return AppAction::None,
        };
        self.input_mode = InputMode::Normal;
        AppAction::Start {
            index: self.selected,
            console,
        }
    }

    fn handle_confirm_stop(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                self.input_mode = InputMode::Normal;
                match self.selected_instance().and_then(|view| view.pid) {
                    Some(pid) => AppAction::Stop { pid },
                    None => AppAction::None,
                }
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.cancel_dialog();
                AppAction::None
            }
            _ => AppAction::None,
        }
    }

    fn handle_confirm_password(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                self.input_mode = InputMode::Normal;
                self.status_message = None;
                match self.pending_password.take() {
                    Some(path) => AppAction::CreatePassword(path),
                    None => AppAction::None,
                }
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                self.pending_password = None;
                self.cancel_dialog();
                AppAction::None
            }
            _ => AppAction::None,
        }
    }

    fn cancel_dialog(&mut self) {
        self.input_mode = InputMode::Normal;
        self.set_status_message("Operation cancelled");
    }

    fn handle_normal_input(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Char('q') => {
                self.should_quit = true;
                AppAction::Quit
            }
            KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
                AppAction::None
            }
            KeyCode::Down => {
                if self.selected + 1 < self.instances.len() {
                    self.selected += 1;
                }
                AppAction::None
            }
            KeyCode::Tab => {
                if !self.instances.is_empty() {
                    self.selected = (self.selected + 1) % self.instances.len();
                }
                AppAction::None
            }
            KeyCode::Char('r') => AppAction::Refresh,
            KeyCode::Char('s') => {
                let Some(view) = self.selected_instance() else {
                    return AppAction::None;
                };
                if let Some(pid) = view.pid {
                    let message = format!("{} is already running (pid {})", view.display_name(), pid);
                    self.set_status_warning_for(message, Duration::from_secs(3));
                } else if self.port_busy(view) {
                    let message = format!("Port {} not available", view.attributes.port);
                    self.set_status_warning_for(message, Duration::from_secs(3));
                } else {
                    let message = format!(
                        "Run the instance {}? y: yes | o: yes, output on console | n: cancel",
                        view.display_name()
                    );
                    self.set_status_warning_persistent(message);
                    self.input_mode = InputMode::ConfirmStart;
                }
                AppAction::None
            }
            KeyCode::Char('x') => {
                let Some(view) = self.selected_instance() else {
                    return AppAction::None;
                };
                match view.pid {
                    Some(pid) => {
                        let message = format!(
                            "Are you sure you want to stop {} with PID = {}? (y/n)",
                            view.display_name(),
                            pid
                        );
                        self.set_status_warning_persistent(message);
                        self.input_mode = InputMode::ConfirmStop;
                    }
                    None => {
                        let message = format!("{} is not running", view.display_name());
                        self.set_status_warning_for(message, Duration::from_secs(3));
                    }
                }
                AppAction::None
            }
            KeyCode::Char('d') => self.running_action(AppAction::OpenDashboard(self.selected)),
            KeyCode::Char('h') => self.running_action(AppAction::OpenHomepage(self.selected)),
            KeyCode::Char('c') => self.running_action(AppAction::CopyUrl(self.selected)),
            KeyCode::Char('l') | KeyCode::Enter => {
                self.show_details = !self.show_details;
                AppAction::None
            }
            KeyCode::Char('f') => {
                self.log.follow = !self.log.follow;
                if self.log.follow {
                    self.ensure_follow();
                }
                AppAction::None
            }
            KeyCode::Char('?') => {
                self.show_help = !self.show_help;
                AppAction::None
            }
            KeyCode::PageUp => {
                self.scroll_up(self.log_view_height.max(1));
                AppAction::None
            }
            KeyCode::PageDown => {
                self.scroll_down(self.log_view_height.max(1));
                AppAction::None
            }
            KeyCode::Home => {
                self.log.follow = false;
                self.log.scroll = 0;
                AppAction::None
            }
            KeyCode::End => {
                self.log.follow = true;
                self.ensure_follow();
                AppAction::None
            }
            _ => AppAction::None,
        }
    }

    fn running_action(&mut self, action: AppAction) -> AppAction {
        match self.selected_instance() {
            Some(view) if !view.is_stopped() => action,
            Some(view) => {
                let message = format!("{} is not running", view.display_name());
                self.set_status_warning_for(message, Duration::from_secs(3));
                AppAction::None
            }
            None => AppAction::None,
        }
    }

    pub fn scroll_up(&mut self, amount: usize) {
        let max_scroll = self.max_log_scroll();
        let current = if self.log.follow {
            max_scroll
        } else {
            self.log.scroll
        };
        self.log.scroll = current.saturating_sub(amount).min(max_scroll);
        self.log.follow = false;
    }

    pub fn scroll_down(&mut self, amount: usize) {
        if self.log.follow {
            return;
        }
        let max_scroll = self.max_log_scroll();
        let next = self.log.scroll.saturating_add(amount).min(max_scroll);
        self.log.scroll = next;
        if next >= max_scroll {
            self.log.follow = true;
        }
    }

    pub fn ensure_follow(&mut self) {
        self.log.scroll = self.max_log_scroll();
    }

    pub fn set_log_view_height(&mut self, height: usize) {
        self.log_view_height = height;
        if self.log.follow {
            self.ensure_follow();
        }
    }

    fn max_log_scroll(&self) -> usize {
        self.log.line_count().saturating_sub(self.log_view_height.max(1))
    }

    pub fn status_line(&self) -> String {
        let running = self.instances.iter().filter(|view| !view.is_stopped()).count();
        let stopped = self.instances.len() - running;
        let refreshed = self
            .last_refresh
            .map(|at| format!("{}s ago", at.elapsed().as_secs()))
            .unwrap_or_else(|| "-".into());
        let mut line = format!(
            "instances: {} | running: {} | stopped: {} | refreshed: {}",
            self.instances.len(),
            running,
            stopped,
            refreshed
        );
        if self.skipped > 0 {
            line.push_str(&format!(" | uninspectable: {}", self.skipped));
        }
        if self.show_details {
            line.push_str(&format!(
                " | follow: {}",
                if self.log.follow { "on" } else { "off" }
            ));
        }
        line
    }

    pub fn status_message(&self) -> Option<(&str, StatusLevel)> {
        if let Some(message) = &self.status_message {
            let still_visible = match message.ttl {
                Some(ttl) => message.at.elapsed() < ttl,
                None => true,
            };
            if still_visible {
                return Some((message.text.as_str(), message.level));
            }
        }
        None
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.set_status_message_with_level(message, StatusLevel::Info, Some(Duration::from_secs(3)));
    }

    pub fn set_status_warning_for(&mut self, message: impl Into<String>, ttl: Duration) {
        self.set_status_message_with_level(message, StatusLevel::Warning, Some(ttl));
    }

    pub fn set_status_warning_persistent(&mut self, message: impl Into<String>) {
        self.set_status_message_with_level(message, StatusLevel::Warning, None);
    }

    fn set_status_message_with_level(
        &mut self,
        message: impl Into<String>,
        level: StatusLevel,
        ttl: Option<Duration>,
    ) {
        self.status_message = Some(StatusMessage {
            text: message.into(),
            at: Instant::now(),
            ttl,
            level,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::test_context;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn make_app() -> App {
        let ctx = test_context();
        let mut app = App::new(false);
        let instances = vec![
            MergedInstanceView::stopped(
                "MINIMAL".to_string(),
                ctx.expected_cmdline(""),
                ctx.workdir.clone(),
            ),
            MergedInstanceView::running(
                55,
                Some("STANDARD".to_string()),
                ctx.expected_cmdline("-L 20 --errorlog logs/server.log"),
                Some(PathBuf::from("/home/web")),
                &ctx.workdir,
            ),
        ];
        app.replace_instances(instances, HashSet::new(), 0);
        app
    }

    #[test]
    fn start_requires_confirmation() {
        let mut app = make_app();
        assert_eq!(app.handle_key(key(KeyCode::Char('s'))), AppAction::None);
        assert_eq!(app.input_mode, InputMode::ConfirmStart);
        assert_eq!(
            app.handle_key(key(KeyCode::Char('o'))),
            AppAction::Start {
                index: 0,
                console: ConsoleMode::Inherit
            }
        );
        assert_eq!(app.input_mode, InputMode::Normal);
    }

    #[test]
    fn start_on_busy_port_is_refused_in_place() {
        let mut app = make_app();
        app.busy_ports.insert(8000);
        assert_eq!(app.handle_key(key(KeyCode::Char('s'))), AppAction::None);
        assert_eq!(app.input_mode, InputMode::Normal);
        assert_eq!(app.status_message().map(|(text, _)| text), Some("Port 8000 not available"));
    }

    #[test]
    fn stop_confirmation_can_be_cancelled() {
        let mut app = make_app();
        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::Char('x')));
        assert_eq!(app.input_mode, InputMode::ConfirmStop);
        assert_eq!(app.handle_key(key(KeyCode::Esc)), AppAction::None);
        assert_eq!(app.status_message().map(|(text, _)| text), Some("Operation cancelled"));

        app.handle_key(key(KeyCode::Char('x')));
        assert_eq!(app.handle_key(key(KeyCode::Char('y'))), AppAction::Stop { pid: 55 });
    }

    #[test]
    fn browser_actions_need_running_instance() {
        let mut app = make_app();
        assert_eq!(app.handle_key(key(KeyCode::Char('d'))), AppAction::None);
        app.handle_key(key(KeyCode::Down));
        assert_eq!(app.handle_key(key(KeyCode::Char('h'))), AppAction::OpenHomepage(1));
        assert_eq!(app.handle_key(key(KeyCode::Char('d'))), AppAction::OpenDashboard(1));
    }

    #[test]
    fn password_prompt_yields_create_action() {
        let mut app = make_app();
        app.request_password(PathBuf::from("/home/web/password.txt"));
        assert_eq!(app.input_mode, InputMode::ConfirmPassword);
        assert_eq!(
            app.handle_key(key(KeyCode::Char('y'))),
            AppAction::CreatePassword(PathBuf::from("/home/web/password.txt"))
        );
    }

    #[test]
    fn selection_follows_command_line_across_refresh() {
        let ctx = test_context();
        let mut app = make_app();
        app.selected = 1;
        let selected_cmdline = app.instances[1].cmdline.clone();

        let mut next = app.instances.clone();
        next.reverse();
        next.insert(
            0,
            MergedInstanceView::running(
                77,
                None,
                ctx.expected_cmdline("apps -P 9000"),
                None,
                &ctx.workdir,
            ),
        );
        app.replace_instances(next, HashSet::new(), 2);

        assert_eq!(app.instances[app.selected].cmdline, selected_cmdline);
        assert_eq!(app.skipped, 2);
    }

    #[test]
    fn selection_is_clamped_when_entry_disappears() {
        let mut app = make_app();
        app.selected = 1;
        let first = app.instances[0].clone();
        app.replace_instances(vec![first], HashSet::new(), 0);
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn log_source_resolves_against_instance_directory() {
        let ctx = test_context();
        let mut app = make_app();
        app.selected = 1;
        assert_eq!(app.wanted_log_source(&ctx), None);
        app.handle_key(key(KeyCode::Char('l')));
        assert_eq!(
            app.wanted_log_source(&ctx),
            Some(Some(PathBuf::from("/home/web/logs/server.log")))
        );
        app.selected = 0;
        assert_eq!(app.wanted_log_source(&ctx), Some(None));
    }

    #[test]
    fn stale_log_snapshots_are_ignored() {
        let mut app = make_app();
        app.attach_log(Some(None), Some(2));
        app.on_log_snapshot(1, LogContent::Text("old".to_string()));
        assert_eq!(app.log.content, LogContent::NotConfigured);
        app.on_log_snapshot(2, LogContent::Missing);
        assert_eq!(app.log.content, LogContent::Missing);
    }

    #[test]
    fn scrolling_up_stops_follow() {
        let mut app = make_app();
        app.attach_log(Some(None), Some(1));
        app.set_log_view_height(2);
        let text = (0..10).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        app.on_log_snapshot(1, LogContent::Text(text));
        assert_eq!(app.log.scroll, 8);
        app.scroll_up(3);
        assert!(!app.log.follow);
        assert_eq!(app.log.scroll, 5);
        app.scroll_down(10);
        assert!(app.log.follow);
    }
}

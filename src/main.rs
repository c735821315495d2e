//! webrack: discover, start and stop local py4web server instances.
//!
//! This is the entry point of the application. It parses command-line arguments,
//! resolves settings from the CLI and the registry file, and either runs a
//! single command or the interactive dashboard.

mod app;
mod attributes;
mod clipboard;
mod config;
mod context;
mod error;
mod events;
mod flags;
mod lifecycle;
mod logview;
mod process;
mod reconcile;
mod scanner;
mod tui;
mod url;

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context as _, Result};
use clap::builder::styling::{AnsiColor, Effects, Style};
use clap::builder::Styles;
use clap::{Parser, Subcommand};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Password};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app::{App, AppAction};
use crate::config::{Config, DeclaredInstance, Registry, CONFIG_FILENAME};
use crate::context::{default_launcher, Context, Timings};
use crate::error::InstanceError;
use crate::events::Event;
use crate::lifecycle::{probe_port, ActionReport, ActionSuccess, ConsoleMode, Controller};
use crate::logview::{LogContent, LogSubscription};
use crate::process::MergedInstanceView;
use crate::reconcile::Discovery;
use crate::scanner::{ScanFilter, SystemProcessTable};
use crate::tui::TuiTerminal;

/// Environment variable holding the default log filter.
const LOG_ENV: &str = "WEBRACK_LOG";

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "webrack",
    version,
    about = "Discover, start and stop local py4web instances",
    styles = help_styles(),
    color = clap::ColorChoice::Always,
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Path to the webrack.toml registry (default: <workdir>/webrack.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory new instances are started from (default: current directory).
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,
    /// Launcher command, e.g. "python3 ./py4web.py".
    #[arg(long, global = true)]
    launcher: Option<String>,
    /// Log filter, e.g. "debug" or "webrack=trace" (default: $WEBRACK_LOG or "info").
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Append diagnostics to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    /// Use plain ASCII markers in the dashboard.
    #[arg(long, global = true)]
    no_symbols: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List declared and running instances.
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Show the attributes of one instance.
    Show {
        /// Instance name or PID.
        selector: String,
    },
    /// Start a declared instance.
    Start {
        /// Declared instance name.
        name: String,
        /// Keep the server's output on this console.
        #[arg(long)]
        console: bool,
    },
    /// Stop a running instance.
    Stop {
        /// Process ID of the instance.
        pid: u32,
        /// Do not ask for confirmation.
        #[arg(long, short)]
        yes: bool,
    },
    /// Open an instance in the browser.
    Open {
        /// Instance name or PID.
        selector: String,
        /// Open the administrative dashboard instead of the homepage.
        #[arg(long)]
        dashboard: bool,
    },
    /// Print the error log of an instance.
    Logs {
        /// Instance name or PID.
        selector: String,
        /// Keep printing as the file grows.
        #[arg(long, short)]
        follow: bool,
    },
    /// Declare a new instance.
    Add {
        /// Unique instance name.
        name: String,
        /// Arguments after `run`, e.g. `apps -P 8001`.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Create the dashboard password file of an instance.
    SetPassword {
        /// Instance name or PID.
        selector: String,
    },
    /// Show version information.
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Some(Commands::Version) = &cli.command {
        println!("webrack {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    init_tracing(
        cli.log_level.as_deref(),
        cli.log_file.as_deref(),
        cli.command.is_none(),
    )?;

    let workdir = match &cli.workdir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("failed to read current directory")?,
    };
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| workdir.join(CONFIG_FILENAME));
    let registry = Registry::open(&config_path)?;
    let settings = RunSettings::from_cli(&cli, workdir, registry.config());
    info!(
        launcher = %settings.launcher,
        workdir = %settings.workdir.display(),
        config = %config_path.display(),
        "settings resolved"
    );

    let ctx = Context::new(
        &settings.launcher,
        settings.workdir.clone(),
        ScanFilter::new(settings.name_marker.clone(), "py4web", "run"),
        settings.timings,
    );
    let mut discovery = Discovery::new(&ctx, registry, SystemProcessTable::new());

    match cli.command {
        None => run_dashboard(&ctx, &mut discovery, &settings).await,
        Some(command) => run_command(command, &ctx, &mut discovery).await,
    }
}

fn init_tracing(level: Option<&str>, log_file: Option<&Path>, dashboard: bool) -> Result<()> {
    let filter = match level {
        Some(level) => {
            EnvFilter::try_new(level).with_context(|| format!("invalid log level: {}", level))?
        }
        None => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        builder.with_ansi(false).with_writer(Mutex::new(file)).init();
    } else if dashboard {
        // Anything written to the terminal would tear the dashboard.
        builder.with_writer(std::io::sink).init();
    } else {
        builder.with_writer(std::io::stderr).init();
    }
    Ok(())
}

/// Runtime configuration derived from CLI arguments and the config file.
#[derive(Debug, Clone, PartialEq)]
struct RunSettings {
    workdir: PathBuf,
    launcher: String,
    name_marker: String,
    timings: Timings,
    use_symbols: bool,
}

impl RunSettings {
    fn from_cli(cli: &Cli, workdir: PathBuf, config: &Config) -> Self {
        let defaults = Timings::default();
        let millis = |value: Option<u64>, default: Duration| {
            value.map(Duration::from_millis).unwrap_or(default)
        };
        let launcher = cli
            .launcher
            .clone()
            .or_else(|| config.launcher.clone())
            .unwrap_or_else(default_launcher);
        let name_marker = config
            .name_marker
            .clone()
            .unwrap_or_else(|| "python".to_string());
        let timings = Timings {
            settle_delay: millis(config.settle_delay_ms, defaults.settle_delay),
            stop_timeout: millis(config.stop_timeout_ms, defaults.stop_timeout),
            probe_timeout: millis(config.probe_timeout_ms, defaults.probe_timeout),
            log_poll: millis(config.log_poll_ms, defaults.log_poll),
        };
        Self {
            workdir,
            launcher,
            name_marker,
            timings,
            use_symbols: !cli.no_symbols,
        }
    }
}

type SystemDiscovery<'a> = Discovery<'a, SystemProcessTable>;

async fn run_command(
    command: Commands,
    ctx: &Context,
    discovery: &mut SystemDiscovery<'_>,
) -> Result<()> {
    match command {
        Commands::List { json } => {
            let views = discovery.refresh()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&views)?);
            } else {
                print_table(&views);
            }
        }
        Commands::Show { selector } => {
            let views = discovery.refresh()?;
            let view = find_view(&views, &selector)?;
            print_details(ctx, view);
        }
        Commands::Start { name, console } => {
            let views = discovery.refresh()?;
            let view = find_view(&views, &name)?.clone();
            let mode = if console {
                ConsoleMode::Inherit
            } else {
                ConsoleMode::Discard
            };
            let report = Controller::new(ctx)
                .start(&view, mode, || discovery.refresh())
                .await;
            finish_action(report)?;
        }
        Commands::Stop { pid, yes } => {
            let views = discovery.refresh()?;
            let view = find_view(&views, &pid.to_string())?;
            if view.is_stopped() {
                bail!(InstanceError::NotRunning {
                    name: view.display_name().to_string()
                });
            }
            if !yes {
                let theme = ColorfulTheme::default();
                let confirmed = Confirm::with_theme(&theme)
                    .with_prompt(format!(
                        "Stop {} with PID = {}?",
                        view.display_name(),
                        pid
                    ))
                    .default(false)
                    .interact()?;
                if !confirmed {
                    println!("Operation cancelled");
                    return Ok(());
                }
            }
            let report = Controller::new(ctx).stop(pid, || discovery.refresh()).await;
            finish_action(report)?;
        }
        Commands::Open {
            selector,
            dashboard,
        } => {
            let views = discovery.refresh()?;
            let view = find_view(&views, &selector)?;
            let target = if dashboard {
                match url::dashboard_url(ctx, view) {
                    Err(InstanceError::PasswordFileMissing { path }) => {
                        let theme = ColorfulTheme::default();
                        let create = Confirm::with_theme(&theme)
                            .with_prompt(format!(
                                "Password file {} does not exist. Create it now?",
                                path.display()
                            ))
                            .default(true)
                            .interact()?;
                        if !create {
                            bail!(InstanceError::PasswordFileMissing { path });
                        }
                        prompt_and_set_password(ctx, &path).await?;
                        url::dashboard_url(ctx, view)?
                    }
                    other => other?,
                }
            } else {
                url::homepage_url(view)?
            };
            url::open_in_browser(&target)?;
            println!("{}", target);
        }
        Commands::Logs { selector, follow } => {
            let views = discovery.refresh()?;
            let view = find_view(&views, &selector)?;
            let path = log_path(ctx, view);
            if follow {
                follow_log(path, ctx.timings.log_poll).await?;
            } else {
                let content = logview::read_log(path.as_deref());
                print!("{}", content.display_text());
                if !matches!(content, LogContent::Text(_)) {
                    println!();
                }
            }
        }
        Commands::Add { name, args } => {
            let instance = DeclaredInstance::new(name, args.join(" "));
            let expected = ctx.expected_cmdline(&instance.args);
            discovery.registry_mut().append(instance.clone())?;
            println!(
                "added {} to {}: {}",
                instance.name,
                discovery.registry().path().display(),
                shell_words::join(expected)
            );
        }
        Commands::SetPassword { selector } => {
            let views = discovery.refresh()?;
            let view = find_view(&views, &selector)?;
            let path = url::password_file_path(ctx, view);
            prompt_and_set_password(ctx, &path).await?;
            println!("password written to {}", path.display());
        }
        Commands::Version => {}
    }
    Ok(())
}

/// Picks the first view whose instance name or PID equals `selector`.
fn find_view<'v>(views: &'v [MergedInstanceView], selector: &str) -> Result<&'v MergedInstanceView> {
    views
        .iter()
        .find(|view| view.matches_selector(selector))
        .ok_or_else(|| anyhow!("no instance named or with PID {}", selector))
}

fn log_path(ctx: &Context, view: &MergedInstanceView) -> Option<PathBuf> {
    view.attributes
        .error_log
        .as_deref()
        .map(|path| ctx.resolve(view.cwd.as_deref(), path))
}

fn finish_action(report: ActionReport<Result<Vec<MergedInstanceView>, InstanceError>>) -> Result<()> {
    if let Err(err) = &report.snapshot {
        warn!(error = %err, "rescan after action failed");
    }
    match report.outcome? {
        ActionSuccess::Started { pid } => println!("started (pid {})", pid),
        ActionSuccess::Stopped { pid } => println!("stopped (pid {})", pid),
    }
    Ok(())
}

fn print_table(views: &[MergedInstanceView]) {
    println!(
        "{:<12} {:>8} {:<6} {:>6} {:<10} {}",
        "INSTANCE", "PID", "PROTO", "PORT", "PREFIX", "COMMAND"
    );
    for view in views {
        println!(
            "{:<12} {:>8} {:<6} {:>6} {:<10} {}",
            view.display_name(),
            view.pid
                .map(|pid| pid.to_string())
                .unwrap_or_else(|| "stopped".to_string()),
            view.attributes.protocol.as_str(),
            view.attributes.port,
            view.attributes.url_prefix,
            view.command_line()
        );
    }
}

fn print_details(ctx: &Context, view: &MergedInstanceView) {
    let attrs = &view.attributes;
    let rows = [
        ("instance", view.display_name().to_string()),
        (
            "pid",
            view.pid
                .map(|pid| pid.to_string())
                .unwrap_or_else(|| "stopped".to_string()),
        ),
        ("command", view.command_line()),
        (
            "workdir",
            view.cwd
                .as_ref()
                .map(|cwd| cwd.display().to_string())
                .unwrap_or_else(|| "?".to_string()),
        ),
        ("port", attrs.port.clone()),
        ("protocol", attrs.protocol.as_str().to_string()),
        ("host", attrs.host.clone()),
        ("url prefix", attrs.url_prefix.clone()),
        ("apps", attrs.app_names.clone()),
        ("server", attrs.server.clone()),
        ("workers", attrs.workers.clone()),
        ("dashboard", attrs.dashboard_mode.clone()),
        ("watch", attrs.watch.clone()),
        ("log level", attrs.log_level.clone()),
        ("debug", attrs.debug.to_string()),
        (
            "password file",
            url::password_file_path(ctx, view).display().to_string(),
        ),
        (
            "error log",
            log_path(ctx, view)
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
        ),
    ];
    for (label, value) in rows {
        println!("{:<14}{}", label, value);
    }
    if let Ok(homepage) = url::homepage_url(view) {
        println!("{:<14}{}", "homepage", homepage);
    }
}

async fn prompt_and_set_password(ctx: &Context, path: &Path) -> Result<()> {
    let theme = ColorfulTheme::default();
    let password = Password::with_theme(&theme)
        .with_prompt("Dashboard password")
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()?;
    url::set_password(ctx, path, &password).await?;
    Ok(())
}

async fn follow_log(path: Option<PathBuf>, interval: Duration) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(16);
    let subscription = logview::subscribe(0, path, interval, tx);
    let mut shown: Option<LogContent> = None;
    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(Event::LogSnapshot { content, .. }) = event else {
                    break;
                };
                let chunk = match (&shown, &content) {
                    (Some(LogContent::Text(old)), LogContent::Text(new)) => log_delta(old, new).to_string(),
                    (Some(old), new) if old == new => String::new(),
                    (_, LogContent::Text(new)) => new.clone(),
                    (_, other) => format!("{}\n", other.display_text()),
                };
                stdout.write_all(chunk.as_bytes())?;
                stdout.flush()?;
                shown = Some(content);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    subscription.cancel().await;
    Ok(())
}

/// Text appended since `previous`, or all of `next` when the file was replaced.
fn log_delta<'a>(previous: &str, next: &'a str) -> &'a str {
    next.strip_prefix(previous).unwrap_or(next)
}

async fn run_dashboard(
    ctx: &Context,
    discovery: &mut SystemDiscovery<'_>,
    settings: &RunSettings,
) -> Result<()> {
    let mut app = App::new(settings.use_symbols);
    let views = discovery.refresh()?;
    install_snapshot(&mut app, ctx, views, discovery.last_scan().skipped.len()).await;

    let (event_tx, mut event_rx) = mpsc::channel(256);
    let mut terminal = tui::init_terminal()?;
    let input_paused = Arc::new(AtomicBool::new(false));
    spawn_input_listener(event_tx.clone(), input_paused.clone());
    spawn_signal_listener(event_tx.clone());

    let mut ticker = tokio::time::interval(Duration::from_millis(150));
    let mut subscription: Option<LogSubscription> = None;
    let mut last_subscription_id = 0u64;
    let mut result = Ok(());

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                match event {
                    Event::LogSnapshot { subscription, content } => {
                        app.on_log_snapshot(subscription, content);
                    }
                    Event::Key(key) => {
                        let action = app.handle_key(key);
                        let outcome = handle_app_action(
                            action,
                            &mut app,
                            ctx,
                            discovery,
                            &mut terminal,
                            &input_paused,
                        )
                        .await;
                        if let Err(err) = outcome {
                            result = Err(err);
                            break;
                        }
                    }
                    Event::Mouse(mouse) => {
                        app.handle_mouse(mouse);
                    }
                    Event::Resize { width, height } => {
                        let _ = (width, height);
                        let _ = terminal.autoresize();
                    }
                    Event::Shutdown => {
                        app.should_quit = true;
                    }
                }
            }
            _ = ticker.tick() => {}
        }

        sync_log_subscription(
            &mut app,
            ctx,
            &mut subscription,
            &mut last_subscription_id,
            &event_tx,
        );
        if let Err(err) = tui::draw(&mut app, &mut terminal) {
            result = Err(err.into());
            break;
        }
        if app.should_quit {
            break;
        }
    }

    if let Some(subscription) = subscription.take() {
        subscription.cancel().await;
    }
    tui::restore_terminal(terminal)?;
    result
}

/// Keeps exactly one log subscription alive for the file the pane shows.
fn sync_log_subscription(
    app: &mut App,
    ctx: &Context,
    current: &mut Option<LogSubscription>,
    last_id: &mut u64,
    tx: &mpsc::Sender<Event>,
) {
    let wanted = app.wanted_log_source(ctx);
    if wanted == app.log.source {
        return;
    }
    // Dropping aborts the previous poll task.
    *current = None;
    match &wanted {
        Some(path) => {
            *last_id += 1;
            let subscription =
                logview::subscribe(*last_id, path.clone(), ctx.timings.log_poll, tx.clone());
            app.attach_log(wanted.clone(), Some(subscription.id()));
            *current = Some(subscription);
        }
        None => app.attach_log(None, None),
    }
}

async fn install_snapshot(
    app: &mut App,
    ctx: &Context,
    views: Vec<MergedInstanceView>,
    skipped: usize,
) {
    let busy = busy_ports(ctx, &views).await;
    app.replace_instances(views, busy, skipped);
}

/// Ports of stopped instances that something else already listens on.
async fn busy_ports(ctx: &Context, views: &[MergedInstanceView]) -> HashSet<u16> {
    let mut busy = HashSet::new();
    let ports = views
        .iter()
        .filter(|view| view.is_stopped())
        .filter_map(|view| view.attributes.port_number());
    for port in ports {
        if !busy.contains(&port) && probe_port(port, ctx.timings.probe_timeout).await {
            busy.insert(port);
        }
    }
    busy
}

async fn apply_report(
    app: &mut App,
    ctx: &Context,
    skipped: usize,
    report: ActionReport<Result<Vec<MergedInstanceView>, InstanceError>>,
) {
    match report.snapshot {
        Ok(views) => install_snapshot(app, ctx, views, skipped).await,
        Err(err) => app.set_status_warning_persistent(format!("Refresh failed: {}", err)),
    }
    match report.outcome {
        Ok(ActionSuccess::Started { pid }) => {
            app.set_status_message(format!("Started (pid {})", pid));
        }
        Ok(ActionSuccess::Stopped { pid }) => {
            app.set_status_message(format!("Stopped (pid {})", pid));
        }
        Err(err) => {
            warn!(kind = ?err.kind(), error = %err, "action failed");
            app.set_status_warning_for(err.to_string(), Duration::from_secs(5));
        }
    }
}

async fn handle_app_action(
    action: AppAction,
    app: &mut App,
    ctx: &Context,
    discovery: &mut SystemDiscovery<'_>,
    terminal: &mut TuiTerminal,
    input_paused: &AtomicBool,
) -> Result<()> {
    match action {
        AppAction::None | AppAction::Quit => {}
        AppAction::Refresh => match discovery.refresh() {
            Ok(views) => {
                let skipped = discovery.last_scan().skipped.len();
                install_snapshot(app, ctx, views, skipped).await;
                app.set_status_message("Refreshed");
            }
            Err(err) => app.set_status_warning_persistent(format!("Refresh failed: {}", err)),
        },
        AppAction::Start { index, console } => {
            let Some(view) = app.instances.get(index).cloned() else {
                return Ok(());
            };
            app.set_status_warning_persistent(format!("Starting {}...", view.display_name()));
            tui::draw(app, terminal)?;
            let report = Controller::new(ctx)
                .start(&view, console, || discovery.refresh())
                .await;
            let skipped = discovery.last_scan().skipped.len();
            apply_report(app, ctx, skipped, report).await;
        }
        AppAction::Stop { pid } => {
            app.set_status_warning_persistent(format!("Stopping pid {}...", pid));
            tui::draw(app, terminal)?;
            let report = Controller::new(ctx).stop(pid, || discovery.refresh()).await;
            let skipped = discovery.last_scan().skipped.len();
            apply_report(app, ctx, skipped, report).await;
        }
        AppAction::OpenHomepage(index) => {
            let Some(view) = app.instances.get(index) else {
                return Ok(());
            };
            let opened = url::homepage_url(view).and_then(|target| {
                url::open_in_browser(&target)?;
                Ok(target)
            });
            report_opened(app, opened);
        }
        AppAction::OpenDashboard(index) => {
            let Some(view) = app.instances.get(index) else {
                return Ok(());
            };
            match url::dashboard_url(ctx, view) {
                Err(InstanceError::PasswordFileMissing { path }) => app.request_password(path),
                other => {
                    let opened = other.and_then(|target| {
                        url::open_in_browser(&target)?;
                        Ok(target)
                    });
                    report_opened(app, opened);
                }
            }
        }
        AppAction::CreatePassword(path) => {
            input_paused.store(true, Ordering::SeqCst);
            tui::suspend_terminal(terminal)?;
            println!("Creating dashboard password file {}", path.display());
            let outcome = prompt_and_set_password(ctx, &path).await;
            tui::resume_terminal(terminal)?;
            input_paused.store(false, Ordering::SeqCst);
            match outcome {
                Ok(()) => app.set_status_message(format!(
                    "Password written to {}; press d to open the dashboard",
                    path.display()
                )),
                Err(err) => app.set_status_warning_for(
                    format!("Password not set: {:#}", err),
                    Duration::from_secs(5),
                ),
            }
        }
        AppAction::CopyUrl(index) => {
            let Some(view) = app.instances.get(index) else {
                return Ok(());
            };
            let copied = url::homepage_url(view)
                .map_err(anyhow::Error::from)
                .and_then(|target| clipboard::copy_url(&target).map(|()| target));
            match copied {
                Ok(target) => app.set_status_warning_for(
                    format!("copied {} to clipboard", target),
                    Duration::from_secs(2),
                ),
                Err(err) => app.set_status_warning_for(
                    format!("clipboard failed: {:#}", err),
                    Duration::from_secs(3),
                ),
            }
        }
    }
    Ok(())
}

fn report_opened(app: &mut App, opened: Result<String, InstanceError>) {
    match opened {
        Ok(target) => app.set_status_message(format!("Opened {}", target)),
        Err(err) => app.set_status_warning_for(err.to_string(), Duration::from_secs(5)),
    }
}

fn spawn_input_listener(tx: mpsc::Sender<Event>, paused: Arc<AtomicBool>) {
    std::thread::spawn(move || loop {
        if paused.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(50));
            continue;
        }
        if crossterm::event::poll(Duration::from_millis(100)).unwrap_or(false) {
            let sent = match crossterm::event::read() {
                Ok(crossterm::event::Event::Key(key)) => tx.blocking_send(Event::Key(key)),
                Ok(crossterm::event::Event::Mouse(mouse)) => tx.blocking_send(Event::Mouse(mouse)),
                Ok(crossterm::event::Event::Resize(width, height)) => {
                    tx.blocking_send(Event::Resize { width, height })
                }
                _ => Ok(()),
            };
            if sent.is_err() {
                break;
            }
        }
    });
}

fn spawn_signal_listener(tx: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(_) => return,
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        let _ = tx.send(Event::Shutdown).await;
    });
}

fn help_styles() -> Styles {
    Styles::styled()
        .header(
            Style::new()
                .fg_color(Some(AnsiColor::Cyan.into()))
                .effects(Effects::BOLD),
        )
        .usage(
            Style::new()
                .fg_color(Some(AnsiColor::Green.into()))
                .effects(Effects::BOLD),
        )
        .literal(Style::new().fg_color(Some(AnsiColor::Yellow.into())))
        .placeholder(Style::new().fg_color(Some(AnsiColor::Magenta.into())))
        .valid(Style::new().fg_color(Some(AnsiColor::Green.into())))
        .invalid(
            Style::new()
                .fg_color(Some(AnsiColor::Red.into()))
                .effects(Effects::BOLD),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::test_context;

    #[test]
    fn cli_flags_override_config_fields() {
        let cli = Cli::parse_from(["webrack", "--launcher", "py4web", "--no-symbols", "list"]);
        let config = Config {
            launcher: Some("python3 ./py4web.py".to_string()),
            name_marker: Some("py".to_string()),
            stop_timeout_ms: Some(9000),
            ..Config::default()
        };
        let settings = RunSettings::from_cli(&cli, PathBuf::from("/srv"), &config);
        assert_eq!(settings.launcher, "py4web");
        assert_eq!(settings.name_marker, "py");
        assert_eq!(settings.timings.stop_timeout, Duration::from_millis(9000));
        assert_eq!(settings.timings.settle_delay, Duration::from_millis(3000));
        assert!(!settings.use_symbols);
    }

    #[test]
    fn config_launcher_applies_without_flag() {
        let cli = Cli::parse_from(["webrack"]);
        let config = Config {
            launcher: Some("python3.11 ./py4web.py".to_string()),
            ..Config::default()
        };
        let settings = RunSettings::from_cli(&cli, PathBuf::from("/srv"), &config);
        assert_eq!(settings.launcher, "python3.11 ./py4web.py");
        assert_eq!(settings.name_marker, "python");
        assert!(settings.use_symbols);
    }

    #[test]
    fn add_keeps_hyphenated_arguments() {
        let cli = Cli::parse_from(["webrack", "add", "SHOP", "apps", "-P", "8001", "--watch", "off"]);
        match cli.command {
            Some(Commands::Add { name, args }) => {
                assert_eq!(name, "SHOP");
                assert_eq!(args, vec!["apps", "-P", "8001", "--watch", "off"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn find_view_matches_name_or_pid() {
        let ctx = test_context();
        let views = vec![
            MergedInstanceView::stopped(
                "MINIMAL".to_string(),
                ctx.expected_cmdline(""),
                ctx.workdir.clone(),
            ),
            MergedInstanceView::running(
                4242,
                None,
                ctx.expected_cmdline("apps -P 9000"),
                None,
                &ctx.workdir,
            ),
        ];
        assert_eq!(find_view(&views, "MINIMAL").unwrap().pid, None);
        assert_eq!(find_view(&views, "4242").unwrap().pid, Some(4242));
        assert!(find_view(&views, "SHOP").is_err());
    }

    #[test]
    fn log_delta_prints_only_appended_text() {
        assert_eq!(log_delta("one\n", "one\ntwo\n"), "two\n");
        assert_eq!(log_delta("one\ntwo\n", "fresh\n"), "fresh\n");
        assert_eq!(log_delta("", "x"), "x");
    }
}

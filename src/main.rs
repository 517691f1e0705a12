//! bgproc - background process supervisor
//!
//! Starts shell commands in the background, keeps their output on disk, and
//! exposes them through an interactive dashboard or a JSON-lines tool stream.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use std::io;
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bgproc::app::App;
use bgproc::core::{Config, TerminalEvent, TerminalEvents};
use bgproc::process::ProcessManager;
use bgproc::tools::{stdio, ProcessTool};
use bgproc::ui;

/// Background process supervisor
#[derive(Parser, Debug)]
#[command(name = "bgproc")]
#[command(version = "0.1.0")]
#[command(about = "Run shell commands in the background and watch them")]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Base directory for per-process log files
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Enable debug logging to file
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the interactive dashboard (default)
    Dashboard {
        /// Start a command (or a saved command by name) right away; repeatable
        #[arg(long = "run", value_name = "NAME=CMD", value_parser = parse_run)]
        run: Vec<(String, String)>,
    },
    /// Serve tool requests as JSON lines on stdin/stdout
    Tool,
}

/// `NAME=CMD`, or a bare `CMD`; a bare saved-command name starts that entry
fn parse_run(arg: &str) -> Result<(String, String), String> {
    let (name, command) = match arg.split_once('=') {
        Some((name, command)) if !name.contains(char::is_whitespace) => (name, command),
        _ => ("", arg),
    };
    if command.trim().is_empty() {
        return Err("command must not be empty".to_string());
    }
    Ok((name.to_string(), command.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.debug {
        init_tracing().context("Failed to set up debug log")?;
    }

    let mut config = Config::load(cli.config)?;
    if let Some(dir) = cli.log_dir {
        config.process.log_dir = Some(dir);
    }
    let manager =
        ProcessManager::from_preferences(&config.process).context("Failed to create log directory")?;
    info!(log_dir = %manager.log_dir().display(), "supervisor ready");

    match cli.command.unwrap_or(Command::Dashboard { run: Vec::new() }) {
        Command::Tool => run_tool(config, manager).await,
        Command::Dashboard { run } => run_dashboard(config, manager, &run).await,
    }
}

/// Debug output goes to `<data dir>/bgproc/bgproc.log`; stdout belongs to the
/// dashboard or the tool stream. `RUST_LOG` overrides the default filter.
fn init_tracing() -> Result<()> {
    let dir = dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("bgproc");
    std::fs::create_dir_all(&dir)?;
    let file = std::fs::File::create(dir.join("bgproc.log"))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bgproc=debug"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(file).with_ansi(false))
        .init();
    Ok(())
}

async fn run_tool(config: Config, manager: ProcessManager) -> Result<()> {
    let tool = ProcessTool::new(manager.clone()).with_kill_timeouts(&config.process);
    let result = stdio::serve(&tool, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await;
    manager.stop_all().await;
    result
}

type Tui = Terminal<CrosstermBackend<io::Stdout>>;

fn enter_terminal() -> Result<Tui> {
    enable_raw_mode()?;
    execute!(io::stdout(), EnterAlternateScreen)?;
    Ok(Terminal::new(CrosstermBackend::new(io::stdout()))?)
}

fn leave_terminal(terminal: &mut Tui) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

async fn run_dashboard(config: Config, manager: ProcessManager, run: &[(String, String)]) -> Result<()> {
    let mut terminal = enter_terminal()?;

    ui::init(&config);
    let events = TerminalEvents::new(config.ui.tick_rate_ms);
    let mut app = App::new(config, manager);
    app.start_initial(run);

    let result = run_app(&mut terminal, &mut app, events).await;
    leave_terminal(&mut terminal)?;

    if let Err(err) = result {
        // The loop bailed before its own cleanup ran
        app.cleanup().await?;
        eprintln!("Error: {err:?}");
        return Err(err);
    }
    Ok(())
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App, mut events: TerminalEvents) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::draw(frame, app))?;

        tokio::select! {
            event = events.next() => match event? {
                TerminalEvent::Tick => app.on_tick(),
                TerminalEvent::Key(key) => app.on_key(key),
                TerminalEvent::Resize(width, height) => app.on_resize(width, height),
            },
            Some(event) = app.dashboard.next_event() => {
                app.on_process_event(event);
                // Coalesce bursts of output into one redraw
                app.on_tick();
            }
        }
    }

    app.cleanup().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        assert_eq!(
            parse_run("web=npm run dev").unwrap(),
            ("web".to_string(), "npm run dev".to_string())
        );
        assert_eq!(
            parse_run("echo a=b").unwrap(),
            (String::new(), "echo a=b".to_string())
        );
        assert!(parse_run("web=  ").is_err());
    }

    #[test]
    fn test_cli_defaults_to_dashboard() {
        let cli = Cli::parse_from(["bgproc", "--debug"]);
        assert!(cli.debug);
        assert!(cli.command.is_none());

        let cli = Cli::parse_from(["bgproc", "dashboard", "--run", "a=sleep 1", "--run", "b=true"]);
        match cli.command {
            Some(Command::Dashboard { run }) => assert_eq!(run.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }
}

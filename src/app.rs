//! Application state and main logic

use anyhow::Result;
use crossterm::event::KeyEvent;
use tracing::{info, warn};

use crate::core::{Config, ProcessEvent, SavedCommand};
use crate::process::{ProcessInfo, ProcessManager, SpawnRequest};
use crate::ui::{Dashboard, KeyOutcome};

/// Dashboard application
pub struct App {
    pub should_quit: bool,
    pub config: Config,
    pub manager: ProcessManager,
    pub dashboard: Dashboard,
}

impl App {
    pub fn new(config: Config, manager: ProcessManager) -> Self {
        let dashboard = Dashboard::new(manager.clone(), &config.ui).with_kill_timeouts(&config.process);
        Self {
            should_quit: false,
            config,
            manager,
            dashboard,
        }
    }

    /// Spawn the config's auto-start commands followed by `extra`
    ///
    /// An unnamed `extra` entry whose command matches a saved command's name
    /// starts that saved command. A command that fails to start is logged and
    /// skipped; the rest still run.
    pub fn start_initial(&mut self, extra: &[(String, String)]) -> Vec<ProcessInfo> {
        let requests: Vec<SpawnRequest> = self
            .config
            .auto_start_commands()
            .map(SavedCommand::to_request)
            .chain(extra.iter().map(|(name, command)| {
                match self.config.saved_command(command) {
                    Some(saved) if name.is_empty() => saved.to_request(),
                    _ => SpawnRequest::new(name.clone(), command.clone()),
                }
            }))
            .collect();

        let mut started = Vec::new();
        for request in requests {
            let command = request.command.clone();
            match self.manager.spawn(request) {
                Ok(info) => {
                    info!(id = %info.id, %command, "started");
                    started.push(info);
                }
                Err(err) => warn!(%command, error = %err, "could not start"),
            }
        }
        started
    }

    pub fn on_key(&mut self, key: KeyEvent) {
        if self.dashboard.handle_key(key) == KeyOutcome::Close {
            self.should_quit = true;
        }
    }

    pub fn on_tick(&mut self) {
        self.dashboard.drain_events();
        self.dashboard.on_tick();
    }

    pub fn on_process_event(&mut self, event: ProcessEvent) {
        self.dashboard.apply_event(&event);
    }

    pub fn on_resize(&mut self, _width: u16, _height: u16) {
        self.dashboard.invalidate();
    }

    /// Stop everything that is still running
    pub async fn cleanup(&mut self) -> Result<()> {
        self.dashboard.close();
        self.manager.stop_all().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LogStore;
    use crate::process::ManagerSettings;
    use crossterm::event::{KeyCode, KeyModifiers};
    use tempfile::TempDir;

    fn app(config: Config) -> (App, TempDir) {
        let dir = TempDir::new().unwrap();
        let manager = ProcessManager::new(LogStore::new(dir.path()).unwrap(), ManagerSettings::default());
        (App::new(config, manager), dir)
    }

    #[tokio::test]
    async fn test_start_initial_runs_auto_start_then_extra() {
        let mut config = Config::default();
        let saved = |name: &str, command: &str, auto_start| SavedCommand {
            name: name.to_string(),
            command: command.to_string(),
            description: None,
            cwd: None,
            env: Default::default(),
            auto_start,
        };
        config.saved_commands.push(saved("watch", "sleep 30", true));
        config.saved_commands.push(saved("manual", "sleep 31", false));
        let (mut app, _dir) = app(config);

        let started = app.start_initial(&[
            ("empty".to_string(), "   ".to_string()),
            ("hello".to_string(), "echo hi".to_string()),
            (String::new(), "manual".to_string()),
        ]);
        let names: Vec<&str> = started.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["watch", "hello", "manual"]);
        assert_eq!(started[2].command, "sleep 31");

        app.cleanup().await.unwrap();
        assert!(app.dashboard.is_closed());
        for _ in 0..200 {
            if app.manager.list().iter().all(|p| p.status.is_terminal()) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
        panic!("processes survived cleanup: {:?}", app.manager.list());
    }

    #[tokio::test]
    async fn test_quit_key() {
        let (mut app, _dir) = app(Config::default());
        app.on_key(KeyEvent::new(KeyCode::Char('j'), KeyModifiers::NONE));
        assert!(!app.should_quit);
        app.on_key(KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE));
        assert!(app.should_quit);
    }
}

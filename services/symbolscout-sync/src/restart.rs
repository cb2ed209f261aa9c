//! Bot restart after a config change
//!
//! Stop then start, only when some target file changed. A stop that fails
//! because nothing is running counts as stopped. Start failures are reported
//! but never undo the config changes already on disk.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::error::CommandFailure;

/// Stop-failure text that means the session was not running
const NOT_RUNNING_MARKERS: [&str; 4] = [
    "no server running",
    "can't find session",
    "session not found",
    "no such session",
];

/// Stop/start capability for the managed bot process
#[async_trait]
pub trait ProcessControl: Send + Sync {
    async fn stop(&self) -> Result<(), CommandFailure>;
    async fn start(&self) -> Result<(), CommandFailure>;
}

/// Runs the configured stop/start commands through `sh -c`
pub struct ShellProcessControl {
    stop_command: String,
    start_command: String,
    working_dir: Option<PathBuf>,
}

impl ShellProcessControl {
    pub fn new(stop_command: impl Into<String>, start_command: impl Into<String>) -> Self {
        Self {
            stop_command: stop_command.into(),
            start_command: start_command.into(),
            working_dir: None,
        }
    }

    /// Run commands from `dir` when it exists
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if dir.is_dir() {
            self.working_dir = Some(dir);
        } else {
            debug!("Working directory {} not found, using current", dir.display());
        }
        self
    }

    async fn run(&self, command: &str) -> Result<(), CommandFailure> {
        debug!("Running: {}", command);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| CommandFailure::new(None, format!("failed to spawn: {}", e)))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        } else {
            stderr
        };
        Err(CommandFailure::new(output.status.code(), message))
    }
}

#[async_trait]
impl ProcessControl for ShellProcessControl {
    async fn stop(&self) -> Result<(), CommandFailure> {
        self.run(&self.stop_command).await
    }

    async fn start(&self) -> Result<(), CommandFailure> {
        self.run(&self.start_command).await
    }
}

/// Whether a stop failure just means nothing was running
pub fn is_not_running(message: &str) -> bool {
    let message = message.to_lowercase();
    NOT_RUNNING_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// What `maybe_restart` did
#[derive(Debug, Clone, PartialEq)]
pub enum RestartOutcome {
    /// Nothing changed, nothing run
    Skipped,
    /// Stopped (or already stopped) and started
    Restarted,
    /// Stop failed for a real reason; start was not attempted
    StopFailed(CommandFailure),
    /// Stop succeeded, start failed
    StartFailed(CommandFailure),
}

impl RestartOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RestartOutcome::StopFailed(_) | RestartOutcome::StartFailed(_)
        )
    }
}

/// Restarts the bot when a reconciliation changed something
pub struct RestartOrchestrator<P> {
    control: P,
}

impl<P: ProcessControl> RestartOrchestrator<P> {
    pub fn new(control: P) -> Self {
        Self { control }
    }

    pub fn control(&self) -> &P {
        &self.control
    }

    pub async fn maybe_restart(&self, changed: bool) -> RestartOutcome {
        if !changed {
            debug!("No config changes, restart skipped");
            return RestartOutcome::Skipped;
        }

        info!("Restarting bot to apply config changes");

        match self.control.stop().await {
            Ok(()) => info!("Bot stopped"),
            Err(failure) if is_not_running(&failure.message) => {
                info!("Bot was not running: {}", failure.message);
            }
            Err(failure) => {
                error!("Failed to stop bot, not starting: {}", failure);
                return RestartOutcome::StopFailed(failure);
            }
        }

        match self.control.start().await {
            Ok(()) => {
                info!("✓ Bot restarted");
                RestartOutcome::Restarted
            }
            Err(failure) => {
                warn!("Failed to start bot: {}", failure);
                RestartOutcome::StartFailed(failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    struct ScriptedControl {
        stop: Result<(), CommandFailure>,
        start: Result<(), CommandFailure>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl ScriptedControl {
        fn new(stop: Result<(), CommandFailure>, start: Result<(), CommandFailure>) -> Self {
            Self {
                stop,
                start,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProcessControl for ScriptedControl {
        async fn stop(&self) -> Result<(), CommandFailure> {
            self.calls.lock().unwrap().push("stop");
            self.stop.clone()
        }

        async fn start(&self) -> Result<(), CommandFailure> {
            self.calls.lock().unwrap().push("start");
            self.start.clone()
        }
    }

    #[tokio::test]
    async fn test_unchanged_skips_everything() {
        let orchestrator = RestartOrchestrator::new(ScriptedControl::new(Ok(()), Ok(())));
        assert_eq!(orchestrator.maybe_restart(false).await, RestartOutcome::Skipped);
        assert!(orchestrator.control().calls().is_empty());
    }

    #[tokio::test]
    async fn test_changed_stops_then_starts() {
        let orchestrator = RestartOrchestrator::new(ScriptedControl::new(Ok(()), Ok(())));
        assert_eq!(orchestrator.maybe_restart(true).await, RestartOutcome::Restarted);
        assert_eq!(orchestrator.control().calls(), vec!["stop", "start"]);
    }

    #[tokio::test]
    async fn test_not_running_counts_as_stopped() {
        let stop = Err(CommandFailure::new(
            Some(1),
            "can't find session: passivbot_instances",
        ));
        let orchestrator = RestartOrchestrator::new(ScriptedControl::new(stop, Ok(())));
        assert_eq!(orchestrator.maybe_restart(true).await, RestartOutcome::Restarted);
        assert_eq!(orchestrator.control().calls(), vec!["stop", "start"]);
    }

    #[tokio::test]
    async fn test_real_stop_failure_aborts() {
        let stop = Err(CommandFailure::new(Some(127), "tmux: command not found"));
        let orchestrator = RestartOrchestrator::new(ScriptedControl::new(stop, Ok(())));
        let outcome = orchestrator.maybe_restart(true).await;
        assert!(matches!(outcome, RestartOutcome::StopFailed(_)));
        assert!(outcome.is_failure());
        assert_eq!(orchestrator.control().calls(), vec!["stop"]);
    }

    #[tokio::test]
    async fn test_start_failure_is_reported() {
        let start = Err(CommandFailure::new(Some(1), "tmuxp: config not found"));
        let orchestrator = RestartOrchestrator::new(ScriptedControl::new(Ok(()), start));
        let outcome = orchestrator.maybe_restart(true).await;
        assert!(matches!(outcome, RestartOutcome::StartFailed(ref f) if f.code == Some(1)));
    }

    #[test]
    fn test_not_running_classification() {
        assert!(is_not_running("no server running on /tmp/tmux-0/default"));
        assert!(is_not_running("Session not found: bots"));
        assert!(is_not_running("error: No such session"));
        assert!(!is_not_running("permission denied"));
        assert!(!is_not_running(""));
    }

    #[tokio::test]
    async fn test_shell_control_reports_exit_code_and_stderr() {
        let control = ShellProcessControl::new("echo 'no server running' >&2; exit 1", "true");
        let failure = assert_err!(control.stop().await);
        assert_eq!(failure.code, Some(1));
        assert_eq!(failure.message, "no server running");
        assert_ok!(control.start().await);
    }

    #[tokio::test]
    async fn test_shell_control_falls_back_to_stdout() {
        let control = ShellProcessControl::new("echo stopped-nothing; exit 3", "true");
        let failure = assert_err!(control.stop().await);
        assert_eq!(failure.code, Some(3));
        assert_eq!(failure.message, "stopped-nothing");
    }
}

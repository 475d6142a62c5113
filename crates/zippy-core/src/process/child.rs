//! The supervised child and its lifecycle state.

use crate::config::SupervisorConfig;
use crate::error::{Result, ZippyError};
use crate::search_path::SearchEnvironment;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use tracing::{debug, info};

/// Lifecycle of the supervised child.
///
/// `Spawned -> Running -> Exited(code)` or `Spawned -> Running -> Killed`.
/// Terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    Spawned,
    Running,
    /// Exited on its own (or from a forwarded signal) with this code.
    Exited(i32),
    /// Forcibly terminated by the supervisor.
    Killed,
}

impl ChildState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited(_) | Self::Killed)
    }

    /// Exit code the supervisor reports for this state.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(*code),
            Self::Killed => Some(SupervisorConfig::INTERRUPTED_EXIT_CODE),
            Self::Spawned | Self::Running => None,
        }
    }

    fn can_become(&self, next: ChildState) -> bool {
        matches!(
            (self, next),
            (Self::Spawned, Self::Running)
                | (Self::Running, Self::Exited(_))
                | (Self::Running, Self::Killed)
        )
    }
}

impl fmt::Display for ChildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawned => write!(f, "spawned"),
            Self::Running => write!(f, "running"),
            Self::Exited(code) => write!(f, "exited({})", code),
            Self::Killed => write!(f, "killed"),
        }
    }
}

/// What to execute for a script entry point.
#[derive(Debug, Clone, Default)]
pub struct EntryCommand {
    /// Path to the extracted entry script.
    pub entry: PathBuf,
    /// Interpreter command line (e.g. `"python3 -u"`); `None` runs the entry directly.
    pub interpreter: Option<String>,
    /// Arguments passed after the entry.
    pub args: Vec<OsString>,
    /// Extra environment variables, applied over the inherited environment.
    pub env: Vec<(OsString, OsString)>,
}

impl EntryCommand {
    pub fn new(entry: impl AsRef<Path>) -> Self {
        Self {
            entry: entry.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn with_interpreter(mut self, interpreter: Option<impl Into<String>>) -> Self {
        self.interpreter = interpreter
            .map(Into::into)
            .filter(|i: &String| !i.trim().is_empty());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.env
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Carry the bundle's search path variables into the child.
    pub fn with_search_environment(mut self, search: &SearchEnvironment) -> Result<Self> {
        for (key, value) in search.vars()? {
            self.env.push((OsString::from(key), value));
        }
        Ok(self)
    }

    /// Program that is actually executed.
    pub fn program(&self) -> OsString {
        match self.interpreter.as_deref().and_then(|i| i.split_whitespace().next()) {
            Some(program) => OsString::from(program),
            None => self.entry.clone().into_os_string(),
        }
    }

    /// Build the `Command`; stdio is inherited.
    pub fn command(&self) -> Command {
        let mut cmd = match &self.interpreter {
            Some(interpreter) => {
                let mut parts = interpreter.split_whitespace();
                let mut cmd = Command::new(parts.next().unwrap_or_default());
                cmd.args(parts);
                cmd.arg(&self.entry);
                cmd
            }
            None => Command::new(&self.entry),
        };
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

/// Handle on the running child, owned exclusively by the supervisor.
#[derive(Debug)]
pub struct ChildHandle {
    child: Child,
    state: ChildState,
}

impl ChildHandle {
    /// Spawn the entry and move to [`ChildState::Running`].
    pub fn spawn(command: &EntryCommand) -> Result<Self> {
        let program = command.program();
        let child = command
            .command()
            .spawn()
            .map_err(|e| ZippyError::LaunchFailed {
                program: program.to_string_lossy().into_owned(),
                message: e.to_string(),
            })?;

        let mut handle = Self {
            child,
            state: ChildState::Spawned,
        };
        info!(
            "Started {} (PID: {})",
            command.entry.display(),
            handle.pid()
        );
        handle.transition(ChildState::Running)?;
        Ok(handle)
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn state(&self) -> ChildState {
        self.state
    }

    #[cfg_attr(unix, allow(dead_code))]
    pub(crate) fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    /// Apply a lifecycle transition, rejecting illegal ones.
    pub(crate) fn transition(&mut self, next: ChildState) -> Result<()> {
        if !self.state.can_become(next) {
            return Err(ZippyError::Other(format!(
                "Illegal child state transition {} -> {}",
                self.state, next
            )));
        }
        debug!("Child {}: {} -> {}", self.pid(), self.state, next);
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        assert!(ChildState::Spawned.can_become(ChildState::Running));
        assert!(ChildState::Running.can_become(ChildState::Exited(0)));
        assert!(ChildState::Running.can_become(ChildState::Killed));
        assert!(!ChildState::Spawned.can_become(ChildState::Exited(0)));
        assert!(!ChildState::Killed.can_become(ChildState::Exited(0)));
        assert!(!ChildState::Exited(3).can_become(ChildState::Killed));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ChildState::Running.exit_code(), None);
        assert_eq!(ChildState::Exited(7).exit_code(), Some(7));
        assert_eq!(
            ChildState::Killed.exit_code(),
            Some(SupervisorConfig::INTERRUPTED_EXIT_CODE)
        );
        assert!(ChildState::Killed.is_terminal());
    }

    #[test]
    fn test_interpreter_command_line() {
        let command = EntryCommand::new("/tmp/run1/app/main.py")
            .with_interpreter(Some("python3 -u"))
            .with_args(["--flag"]);

        assert_eq!(command.program(), OsString::from("python3"));
        let cmd = command.command();
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(
            args,
            vec![
                OsStr::new("-u"),
                OsStr::new("/tmp/run1/app/main.py"),
                OsStr::new("--flag")
            ]
        );
    }

    #[test]
    fn test_blank_interpreter_runs_entry_directly() {
        let command = EntryCommand::new("/tmp/run1/app/main.sh").with_interpreter(Some("  "));
        assert!(command.interpreter.is_none());
        assert_eq!(command.program(), OsString::from("/tmp/run1/app/main.sh"));
    }

    #[test]
    fn test_spawn_failure_is_launch_failed() {
        let command = EntryCommand::new("/nonexistent/zippy/entry");
        let err = ChildHandle::spawn(&command).unwrap_err();
        assert!(matches!(err, ZippyError::LaunchFailed { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_moves_to_running() {
        let command = EntryCommand::new("sh").with_args(["-c", "exit 0"]);
        let mut handle = ChildHandle::spawn(&command).unwrap();
        assert_eq!(handle.state(), ChildState::Running);
        handle.child_mut().wait().unwrap();
    }
}

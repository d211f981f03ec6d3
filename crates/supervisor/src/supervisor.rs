//! Child process lifecycle for the capture agent.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::SupervisorError;

#[cfg(windows)]
const CREATE_NEW_CONSOLE: u32 = 0x0000_0010;

/// How long an exit waits for the agent's output to drain.
///
/// A descendant that inherited the pipes keeps them open past the agent's own
/// exit; its forwarders are detached and end when it does.
pub const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// How to launch the capture agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentCommand {
    pub program: PathBuf,
    pub working_dir: Option<PathBuf>,
    pub args: Vec<String>,
    /// Run in a visible console with no stream redirection.
    pub show_window: bool,
}

impl Default for AgentCommand {
    fn default() -> Self {
        Self {
            program: PathBuf::from("flightlink-agent"),
            working_dir: None,
            args: Vec::new(),
            show_window: false,
        }
    }
}

impl AgentCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn show_window(mut self, show: bool) -> Self {
        self.show_window = show;
        self
    }

    fn build(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).stdin(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own group, so terminate reaches anything the agent spawned.
            command.process_group(0);
        }
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        if self.show_window {
            command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            #[cfg(windows)]
            {
                use std::os::windows::process::CommandExt;
                command.creation_flags(CREATE_NEW_CONSOLE);
            }
        } else {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
        command
    }
}

struct RunningAgent {
    child: Child,
    pid: u32,
    forwarders: Vec<JoinHandle<()>>,
    /// Disconnects once every forwarder has finished.
    drained: Receiver<()>,
}

/// Owns at most one capture agent process.
///
/// A crashed agent is never relaunched from inside the supervisor; the caller
/// observes "not running" and calls [`Supervisor::ensure_started`] again.
pub struct Supervisor {
    command: AgentCommand,
    running: Option<RunningAgent>,
    launches: u64,
    last_exit_code: Option<i32>,
}

impl Supervisor {
    pub fn new(command: AgentCommand) -> Self {
        Self {
            command,
            running: None,
            launches: 0,
            last_exit_code: None,
        }
    }

    pub fn command(&self) -> &AgentCommand {
        &self.command
    }

    /// Launch the agent unless it is already running.
    ///
    /// Returns `true` when a new process was started.
    ///
    /// # Errors
    ///
    /// Fails if the process or its output forwarders cannot be started.
    pub fn ensure_started(&mut self) -> Result<bool, SupervisorError> {
        if self.is_running() {
            return Ok(false);
        }

        let mut child = self
            .command
            .build()
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                program: self.command.program.clone(),
                source,
            })?;
        let pid = child.id();

        let mut forwarders = Vec::with_capacity(2);
        let (done, drained) = channel::bounded(0);
        let streams = (child.stdout.take(), child.stderr.take());
        let spawned = forward(streams.0, pid, Stream::Stdout, &done, &mut forwarders)
            .and_then(|()| forward(streams.1, pid, Stream::Stderr, &done, &mut forwarders));
        drop(done);

        self.running = Some(RunningAgent {
            child,
            pid,
            forwarders,
            drained,
        });
        if let Err(e) = spawned {
            self.terminate();
            return Err(e);
        }

        self.launches = self.launches.saturating_add(1);
        info!(
            pid,
            program = %self.command.program.display(),
            launches = self.launches,
            "Capture agent started"
        );
        Ok(true)
    }

    /// Whether the agent is alive. Reaps it if it has exited.
    pub fn is_running(&mut self) -> bool {
        let Some(agent) = self.running.as_mut() else {
            return false;
        };
        match agent.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.on_exit(status);
                false
            }
            Err(e) => {
                warn!(pid = agent.pid, error = %e, "Failed to query capture agent status");
                self.terminate();
                false
            }
        }
    }

    /// Handle a confirmed exit: stop forwarding output, then release the process.
    ///
    /// Waits at most [`OUTPUT_DRAIN_TIMEOUT`] for the output forwarders.
    pub fn on_exit(&mut self, status: ExitStatus) {
        let Some(agent) = self.running.take() else {
            return;
        };
        let RunningAgent {
            child,
            pid,
            forwarders,
            drained,
        } = agent;

        match drained.recv_timeout(OUTPUT_DRAIN_TIMEOUT) {
            Err(RecvTimeoutError::Disconnected) | Ok(()) => {
                for forwarder in forwarders {
                    if forwarder.join().is_err() {
                        warn!(pid, "Capture agent output forwarder panicked");
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                debug!(pid, "Agent output still open after exit, detaching forwarders");
            }
        }
        drop(child);

        self.last_exit_code = status.code();
        if status.success() {
            info!(pid, "Capture agent exited");
        } else {
            warn!(pid, code = ?status.code(), "Capture agent exited unexpectedly");
        }
    }

    /// Kill the agent if it is running. Safe to call more than once.
    pub fn terminate(&mut self) {
        let Some(agent) = self.running.as_mut() else {
            return;
        };
        let pid = agent.pid;
        if let Err(e) = agent.child.kill() {
            debug!(pid, error = %e, "Capture agent already gone");
        }
        #[cfg(unix)]
        kill_process_group(pid);
        match agent.child.wait() {
            Ok(status) => self.on_exit(status),
            Err(e) => {
                warn!(pid, error = %e, "Failed to reap capture agent");
                self.running = None;
            }
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref().map(|agent| agent.pid)
    }

    pub fn launches(&self) -> u64 {
        self.launches
    }

    /// Exit code of the last agent process; `None` if it was killed by a signal.
    pub fn last_exit_code(&self) -> Option<i32> {
        self.last_exit_code
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("command", &self.command)
            .field("pid", &self.pid())
            .field("launches", &self.launches)
            .field("last_exit_code", &self.last_exit_code)
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn as_str(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// Kill whatever is left in the agent's process group.
///
/// Goes through `kill(1)` because the workspace forbids `unsafe`.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let result = Command::new("kill")
        .arg("-KILL")
        .arg("--")
        .arg(format!("-{pid}"))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match result {
        Ok(status) if status.success() => debug!(pid, "Killed capture agent process group"),
        Ok(_) => debug!(pid, "Capture agent process group already empty"),
        Err(e) => debug!(pid, error = %e, "Failed to signal capture agent process group"),
    }
}

fn forward<R: Read + Send + 'static>(
    stream: Option<R>,
    pid: u32,
    kind: Stream,
    done: &Sender<()>,
    forwarders: &mut Vec<JoinHandle<()>>,
) -> Result<(), SupervisorError> {
    let Some(stream) = stream else {
        return Ok(());
    };
    let done = done.clone();
    let handle = thread::Builder::new()
        .name(format!("agent-{}-{pid}", kind.as_str()))
        .spawn(move || {
            let _done = done;
            for line in BufReader::new(stream).lines() {
                match line {
                    Ok(line) => match kind {
                        Stream::Stdout => info!(target: "flightlink::agent", pid, "{line}"),
                        Stream::Stderr => warn!(target: "flightlink::agent", pid, "{line}"),
                    },
                    Err(e) => {
                        debug!(pid, stream = kind.as_str(), error = %e, "Agent output closed");
                        break;
                    }
                }
            }
        })
        .map_err(|source| SupervisorError::Forwarder { pid, source })?;
    forwarders.push(handle);
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> AgentCommand {
        AgentCommand::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn test_command_carries_program_and_args() {
        let command = shell("true").working_dir("/tmp").build();
        assert_eq!(command.get_program(), std::ffi::OsStr::new("sh"));
        let args: Vec<&str> = command.get_args().filter_map(|a| a.to_str()).collect();
        assert_eq!(args, vec!["-c", "true"]);
        assert_eq!(command.get_current_dir(), Some(std::path::Path::new("/tmp")));
    }

    #[test]
    fn test_terminate_without_child_is_noop() {
        let mut supervisor = Supervisor::new(shell("true"));
        supervisor.terminate();
        supervisor.terminate();
        assert!(!supervisor.is_running());
        assert_eq!(supervisor.launches(), 0);
    }
}

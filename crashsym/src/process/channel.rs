//! Spawned external tool processes and line-oriented I/O with them.
//!
//! Tool stdout is drained by a dedicated reader thread into a bounded
//! channel, so every read can be bounded by a timeout even though the
//! underlying pipe read blocks.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use log::{debug, warn};
use std::fmt;
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::registry::{signal_group, ChildRegistry};
use crate::domain::SymbolError;

/// Lines buffered between the reader thread and the consumer
const LINE_BUFFER: usize = 256;

/// How long a process gets to exit after SIGTERM before it is killed
const TERMINATE_GRACE: Duration = Duration::from_secs(1);

/// Exact invocation of a tool: program plus fixed arguments.
///
/// Two commands are the same pooled process only if every argument matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn tool_name(&self) -> String {
        self.program.file_name().map_or_else(
            || self.program.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        )
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// A running tool process with a line reader on its stdout.
///
/// Interactive processes also own a stdin pipe; listing processes run with
/// stdin closed and are only read from. Every process is recorded in a
/// [`ChildRegistry`] until it is reaped.
pub struct ToolProcess {
    command: ToolCommand,
    child: Child,
    children: ChildRegistry,
    stdin: Option<ChildStdin>,
    lines: Receiver<io::Result<String>>,
    timeout: Duration,
    /// Set once the process is reaped, here or by the registry
    finished: bool,
    exit_status: Option<ExitStatus>,
}

impl ToolProcess {
    /// Spawn a process that is fed requests on stdin.
    ///
    /// # Errors
    /// Returns [`SymbolError::SpawnFailed`] if the process cannot be started.
    pub fn spawn_interactive(
        command: &ToolCommand,
        timeout: Duration,
        children: &ChildRegistry,
    ) -> Result<Self, SymbolError> {
        Self::spawn(command, Stdio::piped(), timeout, children)
    }

    /// Spawn a process whose whole job is printing a listing to stdout.
    ///
    /// # Errors
    /// Returns [`SymbolError::SpawnFailed`] if the process cannot be started.
    pub fn spawn_listing(
        command: &ToolCommand,
        timeout: Duration,
        children: &ChildRegistry,
    ) -> Result<Self, SymbolError> {
        Self::spawn(command, Stdio::null(), timeout, children)
    }

    fn spawn(
        command: &ToolCommand,
        stdin: Stdio,
        timeout: Duration,
        children: &ChildRegistry,
    ) -> Result<Self, SymbolError> {
        let spawn_failed = |source: io::Error| SymbolError::SpawnFailed {
            program: command.program.display().to_string(),
            source,
        };

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .process_group(0)
            .spawn()
            .map_err(spawn_failed)?;
        children.register(child.id());

        let stdin = child.stdin.take();
        let reader = match child.stdout.take() {
            Some(stdout) => spawn_reader(stdout, &command.tool_name()),
            None => Err(io::Error::other("stdout was not captured")),
        };
        let lines = match reader {
            Ok(lines) => lines,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                children.unregister(child.id());
                return Err(spawn_failed(e));
            }
        };

        debug!("Spawned {command} (pid {})", child.id());

        Ok(Self {
            command: command.clone(),
            child,
            children: children.clone(),
            stdin,
            lines,
            timeout,
            finished: false,
            exit_status: None,
        })
    }

    #[must_use]
    pub fn command(&self) -> &ToolCommand {
        &self.command
    }

    /// OS process id of the tool
    #[must_use]
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Write one request line and flush it through to the tool.
    ///
    /// # Errors
    /// Fails if the process has no stdin or the pipe is broken.
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "tool input is closed"))?;
        stdin.write_all(line.as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()
    }

    /// Read the next output line without its line terminator.
    ///
    /// Returns `Ok(None)` once the tool has closed its output.
    ///
    /// # Errors
    /// Returns a `TimedOut` error if no line arrives within the timeout, or
    /// the underlying read error.
    pub fn read_line(&mut self) -> io::Result<Option<String>> {
        match self.lines.recv_timeout(self.timeout) {
            Ok(Ok(line)) => Ok(Some(line)),
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
            Err(RecvTimeoutError::Timeout) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no output from {} after {:?}", self.command.tool_name(), self.timeout),
            )),
        }
    }

    /// Close the pipes, ask the process to exit, and reap it.
    ///
    /// Safe to call more than once; later calls return the first exit status.
    ///
    /// # Errors
    /// Returns the error from waiting on the child, which includes the child
    /// having been reaped by [`ChildRegistry::kill_all`].
    pub fn terminate(&mut self) -> io::Result<ExitStatus> {
        if self.finished {
            return self
                .exit_status
                .ok_or_else(|| io::Error::other("process was reaped during teardown"));
        }

        if !self.children.contains(self.child.id()) {
            // Already killed and reaped by ChildRegistry::kill_all
            self.finished = true;
            return Err(io::Error::other("process was reaped during teardown"));
        }

        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.flush();
        }

        let group = libc::pid_t::try_from(self.child.id()).ok();
        if let Some(pid) = group {
            signal_group(pid, libc::SIGTERM);
        }

        let deadline = Instant::now() + TERMINATE_GRACE;
        let reaped = loop {
            match self.child.try_wait() {
                Ok(Some(status)) => break Ok(status),
                Ok(None) if Instant::now() >= deadline => {
                    warn!("{} ignored SIGTERM, killing it", self.command.tool_name());
                    if let Some(pid) = group {
                        signal_group(pid, libc::SIGKILL);
                    }
                    break self.child.wait();
                }
                Ok(None) => thread::sleep(Duration::from_millis(5)),
                Err(e) => break Err(e),
            }
        };
        // Reaped here or by a concurrent ChildRegistry::kill_all
        self.finished = true;
        self.children.unregister(self.child.id());

        let status = reaped?;
        debug!("Terminated {} (pid {}): {status}", self.command.tool_name(), self.child.id());
        self.exit_status = Some(status);
        Ok(status)
    }
}

impl Drop for ToolProcess {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.terminate() {
                warn!("Failed to terminate {}: {e}", self.command.tool_name());
            }
        }
    }
}

fn spawn_reader(stdout: ChildStdout, tool: &str) -> io::Result<Receiver<io::Result<String>>> {
    let (tx, rx) = bounded(LINE_BUFFER);

    thread::Builder::new().name(format!("{tool}-stdout")).spawn(move || {
        let mut reader = BufReader::new(stdout);
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    let trimmed_len = line.trim_end_matches(['\n', '\r']).len();
                    line.truncate(trimmed_len);
                    if tx.send(Ok(line)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e));
                    break;
                }
            }
        }
    })?;

    Ok(rx)
}

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

/// Default shell used to run commands.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Size of the read buffer used by each output relay.
const RELAY_CHUNK: usize = 8 * 1024;

// ---------------------------------------------------------------------------
// Command and outcome types
// ---------------------------------------------------------------------------

/// Shell command text for a single launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    text: String,
}

impl CommandSpec {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// How a launched command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Exited with a non-zero status code.
    Exited(i32),
    /// Terminated by a signal.
    Signaled(i32),
    /// The shell could not be started; no process ran.
    SpawnFailed(String),
    /// The process started but waiting for it failed.
    WaitFailed(String),
}

impl Outcome {
    fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            return Self::Success;
        }
        if let Some(code) = status.code() {
            return Self::Exited(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signaled(signal);
            }
        }
        Self::WaitFailed(status.to_string())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Exited(code) => write!(f, "exit status {code}"),
            Self::Signaled(signal) => write!(f, "terminated by signal {signal}"),
            Self::SpawnFailed(err) => write!(f, "failed to start: {err}"),
            Self::WaitFailed(err) => write!(f, "failed to wait: {err}"),
        }
    }
}

/// Sent exactly once per launch, after the command's output has been relayed.
#[derive(Debug, Clone)]
pub struct CompletionNotice {
    pub command: CommandSpec,
    pub outcome: Outcome,
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Shared destination for command output and diagnostics.
///
/// Each `write` holds the lock for the whole chunk, so bytes from concurrent
/// writers interleave only at chunk boundaries.
#[derive(Clone)]
pub struct Sink {
    inner: Arc<Mutex<BoxedWriter>>,
}

impl Sink {
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }

    pub async fn write(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self.inner.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await
    }

    /// Write `line` followed by a newline.
    pub async fn write_line(&self, line: &str) -> io::Result<()> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        self.write(&buf).await
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Launchers
// ---------------------------------------------------------------------------

/// Starts commands on behalf of the coordinator.
///
/// Implementations must return immediately and send exactly one
/// [`CompletionNotice`] on `done` for every call.
pub trait Launch {
    fn launch(&self, command: CommandSpec, done: mpsc::Sender<CompletionNotice>);
}

/// Runs commands through a shell, relaying stdout and stderr to a [`Sink`].
#[derive(Debug, Clone)]
pub struct ShellLauncher {
    shell: PathBuf,
    sink: Sink,
}

impl ShellLauncher {
    pub fn new(sink: Sink) -> Self {
        Self {
            shell: PathBuf::from(DEFAULT_SHELL),
            sink,
        }
    }

    /// Use a different shell binary. It is invoked as `<shell> -c <command>`.
    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }
}

impl Launch for ShellLauncher {
    fn launch(&self, command: CommandSpec, done: mpsc::Sender<CompletionNotice>) {
        let shell = self.shell.clone();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let outcome = run(&shell, &sink, &command).await;
            debug!(command = %command, %outcome, "command finished");
            if done.send(CompletionNotice { command, outcome }).await.is_err() {
                warn!("completion dropped: coordinator is gone");
            }
        });
    }
}

/// Run one command to completion. Returns only after the child has exited and
/// both of its output streams have been fully relayed.
async fn run(shell: &Path, sink: &Sink, command: &CommandSpec) -> Outcome {
    let spawned = Command::new(shell)
        .arg("-c")
        .arg(command.as_str())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(err) => {
            let message = format!("failed to start {}: {err}", shell.display());
            if let Err(write_err) = sink.write_line(&message).await {
                warn!(error = %write_err, "failed to write to output");
            }
            return Outcome::SpawnFailed(err.to_string());
        }
    };

    let mut relays = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        relays.push(tokio::spawn(relay("stdout", stdout, sink.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        relays.push(tokio::spawn(relay("stderr", stderr, sink.clone())));
    }

    let status = child.wait().await;

    for relay in relays {
        if let Err(err) = relay.await {
            warn!(error = %err, "output relay task failed");
        }
    }

    match status {
        Ok(status) => Outcome::from_status(status),
        Err(err) => Outcome::WaitFailed(err.to_string()),
    }
}

/// Copy `reader` into `sink` until end of stream.
///
/// A read error is reported to the sink and ends this relay only. If the sink
/// itself fails, reading continues so the child never blocks on a full pipe.
async fn relay<R>(stream: &'static str, mut reader: R, sink: Sink)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut buf = vec![0u8; RELAY_CHUNK];
    let mut sink_failed = false;
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return,
            Ok(n) => n,
            Err(err) => {
                let message = format!("error reading command {stream}: {err}");
                if let Err(write_err) = sink.write_line(&message).await {
                    warn!(error = %write_err, "failed to write to output");
                }
                return;
            }
        };
        if let Err(err) = sink.write(&buf[..n]).await {
            if !sink_failed {
                warn!(stream, error = %err, "failed to write command output");
                sink_failed = true;
            }
        }
    }
}

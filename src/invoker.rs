// ABOUTME: Subprocess invocation of the mkslides CLI
// ABOUTME: Builds the command line, captures output, and enforces timeout and cancellation

use crate::errors::{Result, SlidesError};
use crate::workspace::Workspace;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// How long to keep reading a pipe after the child is gone
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Shared flag used to abort an in-flight build
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<CancelState>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.0.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// A fully-specified `mkslides build` invocation
#[derive(Debug, Clone)]
pub struct BuildCommand {
    pub program: String,
    pub markdown_path: PathBuf,
    pub config_path: PathBuf,
    pub output_dir: PathBuf,
    pub strict: bool,
    pub working_dir: PathBuf,
}

impl BuildCommand {
    /// `output_dir` should already be absolute, since the tool runs inside the workspace
    pub fn new(program: &str, workspace: &Workspace, output_dir: &Path, strict: bool) -> Self {
        Self {
            program: program.to_string(),
            markdown_path: workspace.markdown_path(),
            config_path: workspace.config_path(),
            output_dir: output_dir.to_path_buf(),
            strict,
            working_dir: workspace.path().to_path_buf(),
        }
    }

    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "build".into(),
            self.markdown_path.clone().into(),
            "-f".into(),
            self.config_path.clone().into(),
            "-d".into(),
            self.output_dir.clone().into(),
        ];
        if self.strict {
            args.push("--strict".into());
        }
        args
    }

    /// Human-readable form for logs
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args().iter().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args())
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout also takes down anything the tool forked
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

/// How the subprocess ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Exited(i32),
    /// Terminated by a signal without an exit code
    Signaled,
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub outcome: ExitOutcome,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn exit_code(&self) -> Option<i32> {
        match self.outcome {
            ExitOutcome::Exited(code) => Some(code),
            _ => None,
        }
    }

    pub fn success(&self) -> bool {
        self.outcome == ExitOutcome::Exited(0)
    }
}

/// Run `command` to completion, killing it on timeout or cancellation.
///
/// Blocks the calling thread on a private current-thread runtime, so it must
/// not be called from inside an async context. stdout and stderr are captured
/// in full.
pub fn run(command: &BuildCommand, timeout: Duration, cancel: &CancelToken) -> Result<ProcessOutput> {
    info!("[API] Executing mkslides build command: {}", command.display());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| SlidesError::InternalError {
            message: "Failed to start the process runtime".to_string(),
            source: Some(Box::new(e)),
        })?;
    runtime.block_on(supervise(command, timeout, cancel))
}

async fn supervise(command: &BuildCommand, timeout: Duration, cancel: &CancelToken) -> Result<ProcessOutput> {
    let start = Instant::now();
    let mut child = command.to_command().spawn().map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            SlidesError::ToolNotFound(command.program.clone())
        } else {
            SlidesError::InternalError {
                message: format!("Failed to launch {}", command.program),
                source: Some(Box::new(e)),
            }
        }
    })?;
    debug!("[API] Spawned {} with pid {:?}", command.program, child.id());

    let stdout = StreamCapture::spawn(child.stdout.take());
    let stderr = StreamCapture::spawn(child.stderr.take());

    let outcome = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => exit_outcome(status),
            Err(e) => {
                terminate(&mut child).await;
                return Err(SlidesError::InternalError {
                    message: "Failed to wait for mkslides".to_string(),
                    source: Some(Box::new(e)),
                });
            }
        },
        _ = tokio::time::sleep(timeout) => {
            warn!("[API] Build timed out, terminating pid {:?}", child.id());
            terminate(&mut child).await;
            ExitOutcome::TimedOut
        }
        _ = cancel.cancelled() => {
            warn!("[API] Build cancelled, terminating pid {:?}", child.id());
            terminate(&mut child).await;
            ExitOutcome::Cancelled
        }
    };
    let duration = start.elapsed();

    Ok(ProcessOutput {
        outcome,
        stdout: stdout.collect().await,
        stderr: stderr.collect().await,
        duration,
    })
}

fn exit_outcome(status: ExitStatus) -> ExitOutcome {
    match status.code() {
        Some(code) => ExitOutcome::Exited(code),
        None => ExitOutcome::Signaled,
    }
}

/// Kill the child's whole process group, then the child itself, and reap it
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: killpg only sends a signal; the group id is the child we spawned as leader
        if unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) } != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                warn!("Failed to kill process group {}: {}", pid, err);
            }
        }
    }
    if let Err(e) = child.kill().await {
        // InvalidInput means it was already reaped
        if e.kind() != ErrorKind::InvalidInput {
            warn!("Failed to kill {:?}: {}", child.id(), e);
        }
    }
}

/// Background task that accumulates one pipe of the child
struct StreamCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl StreamCapture {
    fn spawn<R: AsyncRead + Unpin + Send + 'static>(reader: Option<R>) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));

        let task = reader.map(|mut reader| {
            let sink = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match reader.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => sink.lock().extend_from_slice(&chunk[..n]),
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => {
                            debug!("Stopped reading child pipe: {}", e);
                            break;
                        }
                    }
                }
            })
        });

        Self { buffer, task }
    }

    /// Wait briefly for EOF, then return whatever was read.
    ///
    /// A descendant that left the process group can hold the pipe open after
    /// the child is gone; the grace period stops that from blocking the caller.
    async fn collect(self) -> String {
        if let Some(mut task) = self.task {
            if tokio::time::timeout(DRAIN_GRACE, &mut task).await.is_err() {
                warn!("Output pipe still open after process exit, returning partial output");
                task.abort();
            }
        }
        let text = String::from_utf8_lossy(&self.buffer.lock()).into_owned();
        text
    }
}

//! dvgrab process supervision
//!
//! The child runs as leader of its own process group so one interrupt
//! reaches dvgrab and anything it forks, without touching us. Each output
//! stream gets a reader task feeding the [`LogFeed`]; a wait task observes
//! the exit, drains the readers, writes the final line and publishes the
//! outcome.

use super::lines::LineSplitter;
use super::log::{LineSource, LogFeed};
use super::state::SessionOutcome;
use crate::utils::error::{CaptureError, CaptureResult};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};

/// How long the wait task lets readers finish after the process exits
pub const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 4096;
const TOOL_LABEL: &str = "dvgrab";

/// What a stop request managed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDelivery {
    /// SIGINT delivered to the process group
    GroupInterrupt,
    /// Group signal failed, SIGTERM delivered to the process
    Terminate,
    /// Neither signal could be delivered
    Undeliverable,
    /// The process had already exited
    NotRunning,
}

/// Running dvgrab process and its helper tasks
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    feed: LogFeed,
    outcome: watch::Receiver<Option<SessionOutcome>>,
    wait_task: Option<JoinHandle<()>>,
    readers: Vec<AbortHandle>,
}

impl ProcessHandle {
    /// Spawn `argv` in `work_dir` and start streaming into `feed`
    ///
    /// `on_exit` runs once on the wait task, after the final log line and
    /// before the outcome becomes visible through this handle.
    pub fn spawn<F>(
        argv: &[String],
        work_dir: &Path,
        feed: LogFeed,
        on_exit: F,
    ) -> CaptureResult<Self>
    where
        F: FnOnce(&SessionOutcome) + Send + 'static,
    {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| CaptureError::Config("Empty command line".to_string()))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!("Failed to spawn {}: {}", program, e);
                feed.note(format!("Failed to start {program}: {e}"), true);
                return Err(CaptureError::Spawn {
                    program: program.clone(),
                    message: e.to_string(),
                });
            }
        };

        let pid = child.id();
        tracing::info!("Spawned {} (pid {:?}) in {:?}", program, pid, work_dir);

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(pump(stdout, LineSource::Stdout, feed.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(pump(stderr, LineSource::Stderr, feed.clone())));
        }
        let reader_aborts: Vec<AbortHandle> = readers.iter().map(|reader| reader.abort_handle()).collect();

        let (outcome_tx, outcome_rx) = watch::channel(None);
        let wait_feed = feed.clone();
        let wait_task = tokio::spawn(async move {
            let outcome = match child.wait().await {
                Ok(status) => outcome_of(status),
                Err(e) => {
                    tracing::error!("Failed to wait for dvgrab: {}", e);
                    SessionOutcome::Exited { code: -1 }
                }
            };

            for mut reader in readers {
                if tokio::time::timeout(READER_DRAIN_TIMEOUT, &mut reader)
                    .await
                    .is_err()
                {
                    // Something in the group still holds the pipe open
                    tracing::warn!("Output reader did not finish, aborting it");
                    reader.abort();
                }
            }

            let (text, is_error) = final_line(&outcome);
            wait_feed.note(text, is_error);
            tracing::info!("Capture process finished: {:?}", outcome);

            on_exit(&outcome);
            let _ = outcome_tx.send(Some(outcome));
        });

        Ok(Self {
            pid,
            feed,
            outcome: outcome_rx,
            wait_task: Some(wait_task),
            readers: reader_aborts,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome.borrow().clone()
    }

    /// Wait for the process to exit and its output to be drained
    pub async fn wait(&self) -> Option<SessionOutcome> {
        let mut outcome = self.outcome.clone();
        // Err only when the wait task was aborted before publishing
        let published = outcome
            .wait_for(|outcome| outcome.is_some())
            .await
            .map(|outcome| outcome.clone());
        published.ok().flatten()
    }

    /// Ask dvgrab to wind down
    ///
    /// Sends SIGINT to the whole group, falling back to SIGTERM on the
    /// process itself. Never kills; the exit is observed by the wait task.
    pub fn stop(&self) -> StopDelivery {
        if self.is_finished() {
            return StopDelivery::NotRunning;
        }
        let Some(pid) = self.pid else {
            return StopDelivery::NotRunning;
        };

        let delivery = signal_stop(pid);
        match delivery {
            StopDelivery::GroupInterrupt => {
                tracing::info!("Sent SIGINT to process group {}", pid);
            }
            StopDelivery::Terminate => {
                tracing::info!("Sent SIGTERM to process {}", pid);
            }
            StopDelivery::Undeliverable => {
                tracing::warn!("Could not signal dvgrab (pid {})", pid);
                self.feed
                    .note(format!("Could not stop {TOOL_LABEL} (pid {pid})"), true);
            }
            StopDelivery::NotRunning => {}
        }
        delivery
    }

    /// Join the helper tasks, waiting at most `timeout`
    ///
    /// Returns false when the process did not exit in time; the tasks are
    /// aborted and dvgrab may keep running in the background.
    pub async fn release(mut self, timeout: Duration) -> bool {
        let Some(mut wait_task) = self.wait_task.take() else {
            return true;
        };

        match tokio::time::timeout(timeout, &mut wait_task).await {
            Ok(_) => true,
            Err(_) => {
                tracing::warn!(
                    "dvgrab (pid {:?}) still running after {:?}, detaching",
                    self.pid,
                    timeout
                );
                wait_task.abort();
                for reader in &self.readers {
                    reader.abort();
                }
                let (text, is_error) = final_line(&SessionOutcome::Detached);
                self.feed.note(text, is_error);
                false
            }
        }
    }
}

async fn pump<R>(mut stream: R, source: LineSource, feed: LogFeed)
where
    R: AsyncRead + Unpin,
{
    let is_error = source == LineSource::Stderr;
    let mut splitter = LineSplitter::new();
    let mut buf = [0u8; READ_CHUNK];

    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                for line in splitter.feed(&buf[..n]) {
                    feed.push(source, line, is_error);
                }
            }
            Err(e) => {
                tracing::warn!("Error reading {:?}: {}", source, e);
                break;
            }
        }
    }

    if let Some(line) = splitter.finish() {
        feed.push(source, line, is_error);
    }
}

fn outcome_of(status: ExitStatus) -> SessionOutcome {
    if let Some(code) = status.code() {
        return SessionOutcome::Exited { code };
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return SessionOutcome::Signaled { signal };
        }
    }

    SessionOutcome::Exited { code: -1 }
}

fn final_line(outcome: &SessionOutcome) -> (String, bool) {
    match outcome {
        SessionOutcome::Exited { code } => {
            (format!("{TOOL_LABEL} exited with code {code}"), *code != 0)
        }
        SessionOutcome::Signaled { signal } => {
            (format!("{TOOL_LABEL} terminated by signal {signal}"), true)
        }
        SessionOutcome::SpawnFailed { message } => {
            (format!("Failed to start {TOOL_LABEL}: {message}"), true)
        }
        SessionOutcome::Detached => (
            format!("{TOOL_LABEL} did not exit in time and may still be running"),
            true,
        ),
    }
}

#[cfg(unix)]
fn signal_stop(pid: u32) -> StopDelivery {
    use nix::sys::signal::{kill, killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return StopDelivery::Undeliverable;
    };
    let pid = Pid::from_raw(raw);

    match killpg(pid, Signal::SIGINT) {
        Ok(()) => StopDelivery::GroupInterrupt,
        Err(group_err) => {
            tracing::debug!("killpg({}) failed: {}", pid, group_err);
            match kill(pid, Signal::SIGTERM) {
                Ok(()) => StopDelivery::Terminate,
                Err(e) => {
                    tracing::debug!("kill({}) failed: {}", pid, e);
                    StopDelivery::Undeliverable
                }
            }
        }
    }
}

#[cfg(not(unix))]
fn signal_stop(_pid: u32) -> StopDelivery {
    StopDelivery::Undeliverable
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::recorder::log::LogLine;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn sh(script: &str) -> Vec<String> {
        vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
    }

    fn texts(lines: &[LogLine], source: LineSource) -> Vec<String> {
        lines
            .iter()
            .filter(|line| line.source == source)
            .map(|line| line.text.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_streams_tagged_and_exit_code_reported() {
        let dir = tempdir().unwrap();
        let feed = LogFeed::new();
        let handle = ProcessHandle::spawn(
            &sh("echo one; echo oops >&2; echo two; exit 3"),
            dir.path(),
            feed.clone(),
            |_| {},
        )
        .unwrap();

        let outcome = handle.wait().await;
        assert_eq!(outcome, Some(SessionOutcome::Exited { code: 3 }));

        let lines = feed.drain();
        assert_eq!(texts(&lines, LineSource::Stdout), vec!["one", "two"]);
        assert_eq!(texts(&lines, LineSource::Stderr), vec!["oops"]);
        assert!(lines
            .iter()
            .filter(|line| line.source == LineSource::Stderr)
            .all(|line| line.is_error));

        let last = lines.last().unwrap();
        assert_eq!(last.text, "dvgrab exited with code 3");
        assert_eq!(last.source, LineSource::Supervisor);
        assert!(last.is_error);

        assert!(handle.release(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_clean_exit_line_not_error() {
        let dir = tempdir().unwrap();
        let feed = LogFeed::new();
        let handle = ProcessHandle::spawn(&sh("true"), dir.path(), feed.clone(), |_| {}).unwrap();

        assert!(handle.wait().await.unwrap().is_success());
        let last = feed.drain().pop().unwrap();
        assert_eq!(last.text, "dvgrab exited with code 0");
        assert!(!last.is_error);
    }

    #[tokio::test]
    async fn test_progress_fragments_split() {
        let dir = tempdir().unwrap();
        let feed = LogFeed::new();
        let handle = ProcessHandle::spawn(
            &sh(r"printf 'Capturing... 00:01\rCapturing... 00:02\r'"),
            dir.path(),
            feed.clone(),
            |_| {},
        )
        .unwrap();

        handle.wait().await;
        let lines = feed.drain();
        assert_eq!(
            texts(&lines, LineSource::Stdout),
            vec!["Capturing... 00:01", "Capturing... 00:02"]
        );
    }

    #[tokio::test]
    async fn test_runs_in_work_dir() {
        let dir = tempdir().unwrap();
        let feed = LogFeed::new();
        let handle = ProcessHandle::spawn(
            &sh("touch marker"),
            dir.path(),
            feed.clone(),
            |_| {},
        )
        .unwrap();

        handle.wait().await;
        assert!(dir.path().join("marker").exists());
    }

    #[tokio::test]
    async fn test_own_process_group() {
        use nix::unistd::{getpgid, Pid};

        let dir = tempdir().unwrap();
        let feed = LogFeed::new();
        let handle =
            ProcessHandle::spawn(&sh("exec sleep 30"), dir.path(), feed.clone(), |_| {}).unwrap();

        let pid = Pid::from_raw(handle.pid().unwrap() as i32);
        assert_eq!(getpgid(Some(pid)).unwrap(), pid);
        assert_ne!(getpgid(None).unwrap(), pid);

        assert_eq!(handle.stop(), StopDelivery::GroupInterrupt);
        assert!(handle.release(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_stop_interrupts_group() {
        let dir = tempdir().unwrap();
        let feed = LogFeed::new();
        let exits = Arc::new(AtomicUsize::new(0));
        let counter = exits.clone();

        let handle = ProcessHandle::spawn(
            &sh("exec sleep 30"),
            dir.path(),
            feed.clone(),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();

        assert_eq!(handle.stop(), StopDelivery::GroupInterrupt);
        let outcome = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .unwrap();
        assert_eq!(outcome, Some(SessionOutcome::Signaled { signal: 2 }));
        assert_eq!(exits.load(Ordering::SeqCst), 1);

        let last = feed.drain().pop().unwrap();
        assert_eq!(last.text, "dvgrab terminated by signal 2");
        assert!(last.is_error);

        // Second stop is a no-op
        assert_eq!(handle.stop(), StopDelivery::NotRunning);
    }

    #[tokio::test]
    async fn test_release_detaches_stubborn_process() {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let dir = tempdir().unwrap();
        let feed = LogFeed::new();
        let handle = ProcessHandle::spawn(
            &sh("trap '' INT; exec sleep 30"),
            dir.path(),
            feed.clone(),
            |_| {},
        )
        .unwrap();
        let pid = Pid::from_raw(handle.pid().unwrap() as i32);

        // Give the shell time to install the trap
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(handle.stop(), StopDelivery::GroupInterrupt);
        assert!(!handle.release(Duration::from_millis(300)).await);

        let _ = killpg(pid, Signal::SIGKILL);
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let dir = tempdir().unwrap();
        let feed = LogFeed::new();
        let argv = vec![dir.path().join("no-dvgrab").to_string_lossy().to_string()];

        let result = ProcessHandle::spawn(&argv, dir.path(), feed.clone(), |_| {});
        assert!(matches!(result, Err(CaptureError::Spawn { .. })));

        let lines = feed.drain();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].is_error);
        assert!(lines[0].text.starts_with("Failed to start"));
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let dir = tempdir().unwrap();
        let result = ProcessHandle::spawn(&[], dir.path(), LogFeed::new(), |_| {});
        assert!(matches!(result, Err(CaptureError::Config(_))));
    }
}

//! Running git as a subprocess
//!
//! Stdout is read incrementally and handed out one decoded line at a time,
//! so memory stays bounded regardless of history size. Stderr is drained on
//! a helper thread and reported once the process exits.

use super::GitError;
use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Default stall timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// How to invoke git: which binary and how long it may stall without output.
#[derive(Debug, Clone)]
pub struct GitCommand {
    program: String,
    timeout: Option<Duration>,
}

impl Default for GitCommand {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }
}

impl GitCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Set the stall timeout in seconds (0 = no timeout).
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run `git -C <repo> <args>` and stream its stdout.
    ///
    /// Fails with [`GitError::RepoNotFound`] if `repo` is not a directory.
    /// A non-zero exit status is not an error: it is logged when the line
    /// stream reaches its end.
    pub fn run<S: AsRef<str>>(&self, repo: &Path, args: &[S]) -> Result<GitLines, GitError> {
        if !repo.is_dir() {
            return Err(GitError::RepoNotFound(repo.to_path_buf()));
        }

        let args: Vec<&str> = args.iter().map(|a| a.as_ref()).collect();
        let label = match args.first() {
            Some(sub) => format!("{} {}", self.program, sub),
            None => self.program.clone(),
        };
        debug!("Running {} -C {} {:?}", self.program, repo.display(), args);

        let mut command = Command::new(&self.program);
        command
            .arg("-C")
            .arg(repo)
            .args(["-c", "core.quotePath=false"])
            .args(&args);

        spawn_lines(command, label, self.timeout).map_err(|e| match e {
            GitError::Io(source) => GitError::Spawn {
                program: self.program.clone(),
                source,
            },
            other => other,
        })
    }
}

/// Spawn `command` with piped output and wrap its stdout in a [`GitLines`].
fn spawn_lines(
    mut command: Command,
    label: String,
    timeout: Option<Duration>,
) -> Result<GitLines, GitError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn()?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("stdout was not captured"))?;
    let stderr = child.stderr.take();

    let stderr_reader = stderr.map(|stderr| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = BufReader::new(stderr).read_to_end(&mut buf);
            buf
        })
    });

    let child = Arc::new(Mutex::new(child));
    let timed_out = Arc::new(AtomicBool::new(false));
    let watchdog = timeout.map(|t| Watchdog::spawn(Arc::clone(&child), Arc::clone(&timed_out), t));

    Ok(GitLines {
        reader: BufReader::new(stdout),
        buf: Vec::with_capacity(256),
        child,
        stderr_reader,
        watchdog,
        timed_out,
        timeout,
        label,
        done: false,
    })
}

enum Watch {
    /// The reader is about to block on stdout
    Arm,
    /// The read returned
    Disarm,
}

/// Kills the child when a read from its stdout stalls for longer than the
/// timeout.
///
/// Only time spent waiting on git counts. A consumer that is slow between
/// reads never trips the timeout, even if the process lives much longer.
struct Watchdog {
    events: Sender<Watch>,
    handle: JoinHandle<()>,
}

impl Watchdog {
    fn spawn(child: Arc<Mutex<Child>>, timed_out: Arc<AtomicBool>, timeout: Duration) -> Self {
        let (events, incoming) = unbounded::<Watch>();
        let handle = thread::spawn(move || {
            let mut armed = false;
            loop {
                let event = if armed {
                    match incoming.recv_timeout(timeout) {
                        Ok(event) => event,
                        Err(RecvTimeoutError::Timeout) => {
                            if let Ok(mut child) = child.lock() {
                                if matches!(child.try_wait(), Ok(None)) {
                                    timed_out.store(true, Ordering::SeqCst);
                                    let _ = child.kill();
                                }
                            }
                            return;
                        }
                        Err(RecvTimeoutError::Disconnected) => return,
                    }
                } else {
                    match incoming.recv() {
                        Ok(event) => event,
                        Err(_) => return,
                    }
                };
                armed = matches!(event, Watch::Arm);
            }
        });
        Self { events, handle }
    }

    fn send(&self, event: Watch) {
        let _ = self.events.send(event);
    }

    fn stop(self) {
        drop(self.events);
        let _ = self.handle.join();
    }
}

/// Lazy sequence of decoded stdout lines from a running git process.
///
/// Yields `Err` at most once, as its last item: when reading stdout fails or
/// when the process was killed by the timeout. Dropping the iterator early
/// kills the process.
pub struct GitLines {
    reader: BufReader<ChildStdout>,
    buf: Vec<u8>,
    child: Arc<Mutex<Child>>,
    stderr_reader: Option<JoinHandle<Vec<u8>>>,
    watchdog: Option<Watchdog>,
    timed_out: Arc<AtomicBool>,
    timeout: Option<Duration>,
    label: String,
    done: bool,
}

impl GitLines {
    /// Read one raw line, with the watchdog armed if the read can block.
    fn read_line(&mut self) -> io::Result<usize> {
        self.buf.clear();
        let watchdog = self
            .watchdog
            .as_ref()
            .filter(|_| !self.reader.buffer().contains(&b'\n'));
        if let Some(watchdog) = watchdog {
            watchdog.send(Watch::Arm);
        }
        let read = self.reader.read_until(b'\n', &mut self.buf);
        if let Some(watchdog) = watchdog {
            watchdog.send(Watch::Disarm);
        }
        read
    }

    /// Stop the watchdog, reap the child and collect stderr.
    ///
    /// Only called once stdout is closed, so the wait does not block on
    /// output nobody reads.
    fn shutdown(&mut self) -> io::Result<(ExitStatus, Vec<u8>)> {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.stop();
        }
        let status = lock_child(&self.child)?.wait();
        let stderr = self
            .stderr_reader
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        Ok((status?, stderr))
    }

    /// Kill and reap the child. The stderr thread is detached: a grandchild
    /// may still hold the pipe open.
    fn abort(&mut self) {
        self.done = true;
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.stop();
        }
        if let Ok(mut child) = lock_child(&self.child) {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.stderr_reader.take();
    }

    fn finish(&mut self) -> Result<(), GitError> {
        let (status, stderr) = self.shutdown()?;

        if self.timed_out.load(Ordering::SeqCst) {
            let timeout = self.timeout.unwrap_or_default();
            warn!("{} stalled for {}s and was killed", self.label, timeout.as_secs());
            return Err(GitError::Timeout {
                command: self.label.clone(),
                timeout,
            });
        }

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            warn!("{} failed ({}): {}", self.label, status, stderr.trim());
        }
        Ok(())
    }
}

fn lock_child(child: &Mutex<Child>) -> io::Result<MutexGuard<'_, Child>> {
    child
        .lock()
        .map_err(|_| io::Error::other("child process lock poisoned"))
}

impl Iterator for GitLines {
    type Item = Result<String, GitError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.read_line() {
            Ok(0) => {
                self.done = true;
                self.finish().err().map(Err)
            }
            Ok(_) => Some(Ok(decode_line(&self.buf))),
            Err(e) => {
                self.abort();
                Some(Err(GitError::Io(e)))
            }
        }
    }
}

impl Drop for GitLines {
    fn drop(&mut self) {
        if !self.done {
            self.abort();
        }
    }
}

/// Decode one raw output line, stripping the line terminator.
///
/// Lines that are not valid UTF-8 are decoded as Latin-1 (one byte per
/// char), so decoding never fails.
pub fn decode_line(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    match std::str::from_utf8(line) {
        Ok(text) => text.to_string(),
        Err(_) => line.iter().map(|&b| char::from(b)).collect(),
    }
}

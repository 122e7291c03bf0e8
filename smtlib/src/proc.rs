// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Run a solver process to completion under a wall-clock limit.
//!
//! The solver is spawned in its own process group. If the limit expires, the
//! whole group is killed, plus any descendants that moved to a different
//! group, and the run reports [`TIMEOUT_EXIT_CODE`] with no output. If the
//! solver exits in time, whatever it left behind in its group is killed and
//! its real exit code and output are returned.

use nix::{
    errno::Errno,
    sys::signal::{self, killpg, Signal},
    unistd::Pid,
};
use std::{
    ffi::{OsStr, OsString},
    fmt,
    io::{self, Read},
    os::unix::process::{CommandExt, ExitStatusExt},
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    sync::{
        mpsc::{self, RecvTimeoutError},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread,
    time::{Duration, Instant},
};
use thiserror::Error;

/// Exit code reported for a run killed at its time limit (the same code
/// `timeout(1)` uses).
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// One of the two captured output streams.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Stream {
    #[allow(missing_docs)]
    Stdout,
    #[allow(missing_docs)]
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => write!(f, "stdout"),
            Stream::Stderr => write!(f, "stderr"),
        }
    }
}

/// An error from trying to run a process.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The process could not be started.
    #[error("could not run {cmdline}: {source}")]
    Spawn {
        /// The command line that failed
        cmdline: String,
        /// Why
        source: io::Error,
    },
    /// I/O went wrong while waiting or reading output
    #[error("some I/O went wrong: {0}")]
    Io(#[from] io::Error),
    /// The process printed something other than ASCII.
    #[error("non-ASCII byte in {stream} at offset {offset}")]
    Encoding {
        /// The stream with the bad byte
        stream: Stream,
        /// Byte offset of the first bad byte
        offset: usize,
    },
}

/// The outcome of a finished (or killed) process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    /// The exit code; [`TIMEOUT_EXIT_CODE`] if the time limit expired, and
    /// `128 + signal` if something else killed the process.
    pub exit_code: i32,
    /// Captured standard output (empty after a timeout)
    pub stdout: String,
    /// Captured standard error (empty after a timeout)
    pub stderr: String,
    /// Whether the process was killed at its time limit.
    pub timed_out: bool,
}

impl ProcessResult {
    fn timeout() -> Self {
        Self {
            exit_code: TIMEOUT_EXIT_CODE,
            stdout: String::new(),
            stderr: String::new(),
            timed_out: true,
        }
    }

    /// Whether the process exited with status 0.
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }
}

/// A command to run, with everything needed to run it.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Program to run
    pub prog: OsString,
    /// Arguments to pass
    pub args: Vec<OsString>,
    /// Working directory, if not the current one
    pub current_dir: Option<PathBuf>,
    /// Environment variables set on top of the inherited environment
    pub env: Vec<(OsString, OsString)>,
    /// Kill the process after this much time; `None` waits forever
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Create an invocation of `prog` with no arguments and no time limit.
    pub fn new<S: AsRef<OsStr>>(prog: S) -> Self {
        Self {
            prog: prog.as_ref().to_owned(),
            args: vec![],
            current_dir: None,
            env: vec![],
            timeout: None,
        }
    }

    /// Append an argument to `self`.
    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Append multiple arguments to `self`.
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|s| s.as_ref().to_owned()));
        self
    }

    /// Run in `dir` instead of the current directory.
    pub fn current_dir<P: AsRef<Path>>(&mut self, dir: P) -> &mut Self {
        self.current_dir = Some(dir.as_ref().to_owned());
        self
    }

    /// Set an environment variable for the process.
    pub fn env<K: AsRef<OsStr>, V: AsRef<OsStr>>(&mut self, key: K, val: V) -> &mut Self {
        self.env
            .push((key.as_ref().to_owned(), val.as_ref().to_owned()));
        self
    }

    /// Set the time limit of `self`.
    pub fn timeout(&mut self, limit: Duration) -> &mut Self {
        self.timeout = Some(limit);
        self
    }

    /// Get the command line to be run for debugging purposes (for example, to
    /// run manually).
    pub fn cmdline(&self) -> String {
        let mut cmdline: Vec<String> = vec![self.prog.to_string_lossy().to_string()];
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.contains([' ', '"']) {
                cmdline.push(format!("\"{}\"", arg.replace('"', "\\\"")));
            } else {
                cmdline.push(arg.to_string())
            }
        }
        cmdline.join(" ")
    }

    /// Run the process to completion (or until the time limit), capturing its
    /// output.
    pub fn run(&self) -> Result<ProcessResult, ProcessError> {
        log::debug!("running {}", self.cmdline());
        let mut cmd = Command::new(&self.prog);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // a fresh process group, so the whole tree can be killed at once
            .process_group(0);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        let deadline = self.timeout.map(|limit| Instant::now() + limit);
        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            cmdline: self.cmdline(),
            source,
        })?;
        let (done_tx, done) = mpsc::channel();
        let stdout = capture(child.stdout.take().expect("stdout is piped"), done_tx.clone());
        let stderr = capture(child.stderr.take().expect("stderr is piped"), done_tx);

        // Child already guarantees a positive pid
        let pid = Pid::from_raw(child.id() as i32);
        let status = match deadline {
            None => child.wait()?,
            Some(deadline) => match wait_until(&mut child, pid, deadline)? {
                Some(status) => status,
                None => {
                    // the readers finish once the killed tree releases the
                    // pipes; whatever they collected is discarded
                    log::warn!("{} timed out", self.cmdline());
                    return Ok(ProcessResult::timeout());
                }
            },
        };

        // Leftover members of the group would keep the pipes open. The group
        // id cannot be reused while any of them is alive.
        ignore_gone(killpg(pid, Signal::SIGKILL));
        // A descendant that left the group can still hold the pipes, so the
        // readers only get until the deadline (plus a grace period to collect
        // what the process wrote before exiting).
        let drain_by = deadline.map(|d| d.max(Instant::now() + DRAIN_GRACE));
        if !drain(&done, drain_by)? {
            log::warn!(
                "{} exited but its output is still open; keeping what was read",
                self.cmdline()
            );
        }

        let exit_code = status
            .code()
            .unwrap_or_else(|| 128 + status.signal().unwrap_or(0));
        let result = ProcessResult {
            exit_code,
            stdout: decode(take(&stdout), Stream::Stdout)?,
            stderr: decode(take(&stderr), Stream::Stderr)?,
            timed_out: false,
        };
        log::debug!("{} exited with {exit_code}", self.prog.to_string_lossy());
        Ok(result)
    }
}

/// How often a process with a deadline is checked for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Time the readers always get to collect what an exited process wrote.
const DRAIN_GRACE: Duration = Duration::from_millis(100);

/// Wait for `child` to exit, killing its tree at `deadline`. Returns `None`
/// if it had to be killed.
///
/// The child is only reaped here, after the last chance to kill it, so its pid
/// always refers to it (or to its zombie) when signals are sent.
fn wait_until(child: &mut Child, pid: Pid, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            kill_tree(pid);
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

type Output = Arc<Mutex<Vec<u8>>>;

fn lock(output: &Output) -> MutexGuard<'_, Vec<u8>> {
    output.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read `stream` on its own thread into the returned buffer, as data arrives.
/// The outcome is sent on `done` once the stream closes.
fn capture<R>(mut stream: R, done: mpsc::Sender<io::Result<()>>) -> Output
where
    R: Read + Send + 'static,
{
    let output = Output::default();
    let buf = output.clone();
    thread::spawn(move || {
        let mut chunk = [0; 8192];
        let outcome = loop {
            match stream.read(&mut chunk) {
                Ok(0) => break Ok(()),
                Ok(n) => lock(&buf).extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => break Err(err),
            }
        };
        _ = done.send(outcome);
    });
    output
}

/// Wait for both readers to reach end of file, giving up at `deadline`.
/// Returns whether both finished.
fn drain(done: &mpsc::Receiver<io::Result<()>>, deadline: Option<Instant>) -> io::Result<bool> {
    let panicked = || io::Error::new(io::ErrorKind::Other, "output reader panicked");
    for _ in 0..2 {
        let outcome = match deadline {
            None => done.recv().map_err(|_| panicked()),
            Some(deadline) => {
                match done.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                    Ok(outcome) => Ok(outcome),
                    Err(RecvTimeoutError::Timeout) => return Ok(false),
                    Err(RecvTimeoutError::Disconnected) => Err(panicked()),
                }
            }
        };
        outcome??;
    }
    Ok(true)
}

fn take(output: &Output) -> Vec<u8> {
    std::mem::take(&mut *lock(output))
}

/// Decode output as ASCII, refusing anything else rather than replacing it.
fn decode(bytes: Vec<u8>, stream: Stream) -> Result<String, ProcessError> {
    if let Some(offset) = bytes.iter().position(|b| !b.is_ascii()) {
        return Err(ProcessError::Encoding { stream, offset });
    }
    Ok(bytes.into_iter().map(char::from).collect())
}

/// Kill `root`, its process group, and every descendant found in a snapshot
/// of the process table taken just before killing.
fn kill_tree(root: Pid) {
    let descendants = descendants(root);
    log::debug!(
        "killing process group {root} and {} descendants",
        descendants.len()
    );
    ignore_gone(killpg(root, Signal::SIGKILL));
    for pid in descendants.into_iter().chain([root]) {
        ignore_gone(signal::kill(pid, Signal::SIGKILL));
    }
}

fn ignore_gone(r: nix::Result<()>) {
    if let Err(errno) = r {
        // ESRCH: already gone; EPERM: the pid was reaped and reused, or
        // the group has only zombies left
        if errno != Errno::ESRCH && errno != Errno::EPERM {
            log::warn!("could not kill solver process: {errno}");
        }
    }
}

/// Transitive children of `root`, from a point-in-time read of `/proc`.
/// Processes forked after the snapshot are not included.
#[cfg(target_os = "linux")]
fn descendants(root: Pid) -> Vec<Pid> {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return vec![];
    };
    let parents: Vec<(Pid, Pid)> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str()?.parse::<i32>().ok())
        .filter_map(|pid| {
            let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
            Some((Pid::from_raw(pid), parent_pid(&stat)?))
        })
        .collect();
    let mut found = vec![];
    let mut frontier = vec![root];
    while let Some(parent) = frontier.pop() {
        for &(pid, ppid) in &parents {
            if ppid == parent && !found.contains(&pid) {
                found.push(pid);
                frontier.push(pid);
            }
        }
    }
    found
}

/// Only the process group is available elsewhere.
#[cfg(not(target_os = "linux"))]
fn descendants(_root: Pid) -> Vec<Pid> {
    vec![]
}

/// Parse the parent pid out of a `/proc/<pid>/stat` line. The command name
/// in parentheses may itself contain spaces and parentheses, so fields are
/// counted from the last `)`.
#[cfg(target_os = "linux")]
fn parent_pid(stat: &str) -> Option<Pid> {
    let rest = &stat[stat.rfind(')')? + 1..];
    // fields after the name: state, ppid, ...
    let ppid = rest.split_whitespace().nth(1)?.parse().ok()?;
    Some(Pid::from_raw(ppid))
}

#[cfg(test)]
mod tests {
    use super::{Invocation, ProcessError, Stream, TIMEOUT_EXIT_CODE};
    use std::time::{Duration, Instant};

    fn sh(script: &str) -> Invocation {
        let mut inv = Invocation::new("sh");
        inv.args(["-c", script]);
        inv
    }

    #[test]
    fn test_normal_exit() {
        let r = sh("echo out; echo err >&2; exit 3")
            .timeout(Duration::from_secs(10))
            .run()
            .unwrap();
        assert_eq!(r.exit_code, 3);
        assert_eq!(r.stdout, "out\n");
        assert_eq!(r.stderr, "err\n");
        assert!(!r.timed_out);
        assert!(!r.success());
    }

    #[test]
    fn test_no_timeout() {
        let r = sh("printf 'sat\\n'").run().unwrap();
        assert!(r.success());
        assert_eq!(r.stdout, "sat\n");
    }

    #[test]
    fn test_timeout() {
        let start = Instant::now();
        let r = sh("echo partial; sleep 30")
            .timeout(Duration::from_millis(300))
            .run()
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(10));
        assert!(r.timed_out);
        assert_eq!(r.exit_code, TIMEOUT_EXIT_CODE);
        assert_eq!(r.stdout, "");
        assert_eq!(r.stderr, "");
    }

    #[test]
    fn test_exit_with_child_in_group() {
        let start = Instant::now();
        let r = sh("sleep 30 & echo sat")
            .timeout(Duration::from_secs(10))
            .run()
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(!r.timed_out);
        assert_eq!(r.exit_code, 0);
        assert_eq!(r.stdout, "sat\n");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_exit_with_escaped_child() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let start = Instant::now();
        let r = sh(&format!(
            "setsid sleep 30 & echo $! > {}; echo sat",
            pid_file.display()
        ))
        .timeout(Duration::from_millis(500))
        .run()
        .unwrap();
        let elapsed = start.elapsed();

        let pid: i32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        _ = nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid),
            nix::sys::signal::Signal::SIGKILL,
        );

        assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
        assert!(!r.timed_out);
        assert_eq!(r.exit_code, 0);
        assert_eq!(r.stdout, "sat\n");
    }

    #[test]
    fn test_large_output() {
        // more than a pipe buffer, to check both streams drain concurrently
        let r = sh("i=0; while [ $i -lt 20000 ]; do echo line$i; echo e$i >&2; i=$((i+1)); done")
            .timeout(Duration::from_secs(60))
            .run()
            .unwrap();
        assert_eq!(r.exit_code, 0);
        assert_eq!(r.stdout.lines().count(), 20000);
        assert_eq!(r.stderr.lines().count(), 20000);
    }

    #[test]
    fn test_non_ascii_rejected() {
        let err = sh("printf 'ok\\303\\251'").run().unwrap_err();
        assert!(matches!(
            err,
            ProcessError::Encoding {
                stream: Stream::Stdout,
                offset: 2
            }
        ));
    }

    #[test]
    fn test_env_and_dir() {
        let dir = tempfile::tempdir().unwrap();
        let r = sh("echo $CROSSCHECK_TEST_VAR; pwd")
            .env("CROSSCHECK_TEST_VAR", "hello")
            .current_dir(dir.path())
            .run()
            .unwrap();
        let mut lines = r.stdout.lines();
        assert_eq!(lines.next(), Some("hello"));
        let pwd = lines.next().unwrap();
        assert_eq!(
            std::fs::canonicalize(pwd).unwrap(),
            std::fs::canonicalize(dir.path()).unwrap()
        );
    }

    #[test]
    fn test_spawn_failure() {
        let err = Invocation::new("/nonexistent/solver").run().unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[test]
    fn test_cmdline() {
        let mut inv = Invocation::new("z3");
        inv.args(["-smt2", "my file.smt2"]);
        assert_eq!(inv.cmdline(), "z3 -smt2 \"my file.smt2\"");
    }

    #[cfg(target_os = "linux")]
    fn is_gone(pid: i32) -> bool {
        // a killed child reparented to an init that does not reap promptly
        // lingers as a zombie
        let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
            return true;
        };
        let state = stat
            .rfind(')')
            .and_then(|i| stat[i + 1..].split_whitespace().next());
        state == Some("Z")
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_timeout_kills_descendants() {
        let dir = tempfile::tempdir().unwrap();
        let pids = dir.path().join("pids");
        // one child stays in the group, the other escapes it with setsid
        let script = format!(
            "sleep 60 & echo $! > {p}; setsid sleep 60 & echo $! >> {p}; wait",
            p = pids.display()
        );
        let r = sh(&script)
            .timeout(Duration::from_millis(500))
            .run()
            .unwrap();
        assert!(r.timed_out);
        let pids: Vec<i32> = std::fs::read_to_string(&pids)
            .unwrap()
            .lines()
            .map(|l| l.trim().parse().unwrap())
            .collect();
        assert_eq!(pids.len(), 2);
        let deadline = Instant::now() + Duration::from_secs(5);
        while !pids.iter().all(|&pid| is_gone(pid)) {
            assert!(Instant::now() < deadline, "descendants {pids:?} survived");
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_parent_pid() {
        let stat = "1234 (weird ) name) S 42 1234 1234 0 -1";
        assert_eq!(super::parent_pid(stat), Some(nix::unistd::Pid::from_raw(42)));
    }
}

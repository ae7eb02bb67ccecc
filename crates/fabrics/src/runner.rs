// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! External command execution
//!
//! Everything this crate learns about the fabric comes from running `nvme`. The
//! [`Runner`] trait is the single seam through which that happens, so tests can
//! substitute canned output and callers can bound or abort an invocation with a
//! [`CancelToken`].

use std::{
    borrow::Cow,
    io::Read,
    os::unix::process::CommandExt,
    process::{Child, Command, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use itertools::Itertools;
use log::{debug, warn};
use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};
use wait_timeout::ChildExt;

use crate::Error;

/// How often a running command checks its cancel token
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Time allowed between SIGTERM and SIGKILL
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    /// Everything written to stdout
    pub stdout: Vec<u8>,
    /// Everything written to stderr
    pub stderr: Vec<u8>,
    /// Exit status, `None` if the process was terminated by a signal
    pub status: Option<i32>,
}

impl Output {
    /// Convenience constructor for a process that exited normally
    pub fn exited(status: i32, stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            status: Some(status),
        }
    }

    /// Returns stdout as text, replacing invalid UTF-8
    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    /// Returns stderr as text, replacing invalid UTF-8
    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

/// Cooperative cancellation for running commands
///
/// Clones share the same flag, so cancelling any clone cancels them all. An
/// optional deadline additionally bounds how long a command may run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that is never cancelled until [`CancelToken::cancel`] is called
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns this token with a deadline `timeout` from now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Returns this token with an absolute deadline
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Request cancellation of every command bound to this token
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`CancelToken::cancel`] was called on any clone
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns true once the deadline, if any, has passed
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Executes an argv and captures its output
pub trait Runner: Send + Sync {
    /// Run `argv[0]` with the remaining arguments
    ///
    /// A non-zero exit status is not an error at this level; it is reported in
    /// [`Output::status`] for the caller to interpret.
    fn run(&self, argv: &[String], cancel: &CancelToken) -> Result<Output, Error>;
}

/// Runs commands as child processes of the current process
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn run(&self, argv: &[String], cancel: &CancelToken) -> Result<Output, Error> {
        let command = argv.iter().join(" ");
        let Some((program, args)) = argv.split_first() else {
            return Err(Error::Spawn {
                command,
                source: std::io::ErrorKind::InvalidInput.into(),
            });
        };

        if cancel.is_cancelled() {
            return Err(Error::Cancelled { command });
        }

        debug!("Running {command}");
        // Own process group, so cancelling also reaches anything the command started
        let mut child = Command::new(program)
            .args(args)
            .process_group(0)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| Error::Spawn {
                command: command.clone(),
                source,
            })?;

        // Drain both pipes while waiting so a chatty child never blocks on a full pipe
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        // On every early return the drain threads are left detached: a descendant
        // holding the pipes open must not keep the caller waiting
        let status = loop {
            match child.wait_timeout(POLL_INTERVAL) {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    terminate(&mut child);
                    return Err(e.into());
                }
            }
            if cancel.is_cancelled() {
                terminate(&mut child);
                return Err(Error::Cancelled { command });
            }
            if cancel.is_expired() {
                terminate(&mut child);
                return Err(Error::TimedOut { command });
            }
        };

        let output = Output {
            stdout: collect(stdout),
            stderr: collect(stderr),
            status: status.code(),
        };
        debug!("{command} exited with {:?}", output.status);
        Ok(output)
    }
}

fn drain<R>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            if let Err(e) = pipe.read_to_end(&mut buffer) {
                warn!("Failed to read command output: {e}");
            }
            buffer
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|handle| handle.join().ok()).unwrap_or_default()
}

fn signal_group(group: Option<Pid>, signal: Signal) {
    let Some(group) = group else {
        return;
    };
    match signal::killpg(group, signal) {
        // Everyone already gone
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to send {signal} to process group {group}: {e}"),
    }
}

// SIGTERM first so nvme can release the fabrics device, then SIGKILL.
// The child leads its own process group, so its descendants are signalled too.
fn terminate(child: &mut Child) {
    let group = match i32::try_from(child.id()) {
        Ok(pid) => Some(Pid::from_raw(pid)),
        Err(_) => {
            warn!("Process id {} out of range", child.id());
            None
        }
    };

    signal_group(group, Signal::SIGTERM);

    match child.wait_timeout(TERMINATE_GRACE) {
        Ok(Some(_)) => return,
        Ok(None) => warn!("Process {} ignored SIGTERM, killing", child.id()),
        Err(e) => warn!("Failed to wait for process {}: {e}", child.id()),
    }

    // Still unreaped, so the group id cannot have been reused yet
    signal_group(group, Signal::SIGKILL);
    if let Err(e) = child.kill() {
        warn!("Failed to kill process {}: {e}", child.id());
    }
    if let Err(e) = child.wait() {
        warn!("Failed to reap process {}: {e}", child.id());
    }
}

#[cfg(test)]
pub(crate) mod scripted {
    //! A [`Runner`] that replays canned results and records every argv

    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    use super::{CancelToken, Output, Runner};
    use crate::Error;

    #[derive(Default)]
    pub(crate) struct Scripted {
        responses: Mutex<VecDeque<Result<Output, Error>>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl Scripted {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Queue a normal exit
        pub(crate) fn exit(self: &Arc<Self>, status: i32, stdout: &str, stderr: &str) -> Arc<Self> {
            self.push(Ok(Output::exited(status, stdout, stderr)))
        }

        /// Queue an arbitrary result
        pub(crate) fn push(self: &Arc<Self>, response: Result<Output, Error>) -> Arc<Self> {
            self.responses.lock().expect("poisoned").push_back(response);
            Arc::clone(self)
        }

        pub(crate) fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().expect("poisoned").clone()
        }
    }

    impl Runner for Scripted {
        fn run(&self, argv: &[String], cancel: &CancelToken) -> Result<Output, Error> {
            self.calls.lock().expect("poisoned").push(argv.to_vec());
            if cancel.is_cancelled() {
                return Err(Error::Cancelled {
                    command: argv.join(" "),
                });
            }
            self.responses
                .lock()
                .expect("poisoned")
                .pop_front()
                .unwrap_or_else(|| Ok(Output::exited(0, "", "")))
        }
    }
}

//! Process supervision - spawning and observing the supervised child
//!
//! Each supervisor owns at most one OS child process. Liveness is
//! never cached: every query re-probes the child, and a pid is
//! forgotten as soon as the process is observed to have exited. A
//! successful spawn starts one reader thread per output pipe; the
//! stdout reader frames complete lines into an unbounded FIFO that
//! consumers pop blockingly, and both readers are joined once exit is
//! observed.

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use super::error::{Error, Result};
use super::monitor::{MemoryUsage, ProcessProbe};

fn lock<'a, T>(mutex: &'a Mutex<T>) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|e| Error::Io(std::io::Error::other(format!("lock poisoned: {}", e))))
}

/// Supervises a single OS child process and its I/O channels
#[derive(Debug)]
pub struct Supervisor {
    /// Working directory the child is spawned into
    cwd: PathBuf,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    readers: Mutex<Vec<JoinHandle<()>>>,
    /// Master sender keeps the console FIFO open across restarts
    console_tx: Sender<String>,
    console_rx: Mutex<Receiver<String>>,
    probe: Mutex<ProcessProbe>,
}

impl Supervisor {
    pub fn new(cwd: PathBuf) -> Self {
        let (console_tx, console_rx) = mpsc::channel();
        Self {
            cwd,
            child: Mutex::new(None),
            stdin: Mutex::new(None),
            readers: Mutex::new(Vec::new()),
            console_tx,
            console_rx: Mutex::new(console_rx),
            probe: Mutex::new(ProcessProbe::new()),
        }
    }

    /// Spawn the child from a prepared argv, attaching all three pipes
    /// and recording the new pid
    pub fn spawn(&self, argv: &[String]) -> Result<u32> {
        if self.pid().is_some() {
            return Err(Error::state("server is already running"));
        }
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::validation("empty argument vector"))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Detach from our process group
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            unsafe {
                cmd.pre_exec(|| {
                    libc::setsid();
                    Ok(())
                });
            }
        }

        let mut child = cmd.spawn()?;
        let pid = child.id();
        info!("Spawned process with PID {} in {:?}", pid, self.cwd);

        let stdin = child.stdin.take();
        let mut handles = Vec::new();

        if let Some(stdout) = child.stdout.take() {
            let tx = self.console_tx.clone();
            handles.push(std::thread::spawn(move || {
                let reader = BufReader::new(stdout);
                for line in reader.lines() {
                    match line {
                        Ok(line) => {
                            let _ = tx.send(line);
                        }
                        Err(e) => {
                            warn!("stdout read error for pid {}: {}", pid, e);
                            break;
                        }
                    }
                }
                debug!("stdout reader for pid {} finished", pid);
            }));
        }

        if let Some(stderr) = child.stderr.take() {
            // Left undrained, a chatty child can fill the pipe and stall
            handles.push(std::thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(|r| r.ok()) {
                    debug!("pid {} stderr: {}", pid, line);
                }
            }));
        }

        *lock(&self.stdin)? = stdin;
        lock(&self.readers)?.append(&mut handles);
        *lock(&self.child)? = Some(child);
        Ok(pid)
    }

    /// Re-probe liveness of the last-started process; a pid is
    /// forgotten once the process has exited
    pub fn pid(&self) -> Option<u32> {
        let mut guard = self.child.lock().ok()?;
        match guard.as_mut() {
            None => return None,
            Some(child) => match child.try_wait() {
                Ok(None) => return Some(child.id()),
                Ok(Some(status)) => {
                    debug!("Supervised process exited with {}", status);
                }
                Err(e) => {
                    warn!("Error probing supervised process: {}", e);
                }
            },
        }

        // Exit observed: forget the pid, close stdin, collect readers
        *guard = None;
        drop(guard);
        if let Ok(mut stdin) = self.stdin.lock() {
            *stdin = None;
        }
        if let Ok(mut readers) = self.readers.lock() {
            for handle in readers.drain(..) {
                let _ = handle.join();
            }
        }
        None
    }

    /// Write one line to the child's stdin
    pub fn console(&self, text: &str) -> Result<()> {
        if self.pid().is_none() {
            return Err(Error::ChannelDown);
        }
        let mut guard = lock(&self.stdin)?;
        let stdin = guard.as_mut().ok_or(Error::ChannelDown)?;
        writeln!(stdin, "{}", text).map_err(|_| Error::ChannelDown)?;
        stdin.flush().map_err(|_| Error::ChannelDown)
    }

    /// Pop the next complete console line, blocking until one is
    /// available. Single consumer; the pop holds the FIFO lock.
    pub fn next_console_line(&self) -> Result<String> {
        let rx = lock(&self.console_rx)?;
        rx.recv().map_err(|_| Error::ChannelDown)
    }

    /// Resident memory of the live process, or zero in all units
    pub fn memory(&self) -> MemoryUsage {
        match self.pid() {
            Some(pid) => self
                .probe
                .lock()
                .map(|mut probe| MemoryUsage::from_bytes(probe.resident_bytes(pid)))
                .unwrap_or_default(),
            None => MemoryUsage::default(),
        }
    }
}

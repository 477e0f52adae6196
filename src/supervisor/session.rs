use log::{debug, info, trace, warn};
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::batch::LineBatcher;
use super::child::{self, LaunchSpec, ReadStatus, SupervisedChild};
use super::decode::Utf8Decoder;
use super::scan::{missing_dependency_token, write_report};
use super::SessionError;
use crate::config::CaptureMode;
use crate::launch::ExecutionTarget;
use crate::util::{remove_session_pgid, write_session_pgid};

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub capture: CaptureMode,
    /// How often the output is polled
    pub poll_interval: Duration,
    /// Output lines are forwarded at least this often...
    pub batch_interval: Duration,
    /// ...or as soon as this many bytes are queued
    pub batch_bytes: usize,
    /// Time between SIGTERM and SIGKILL on stop
    pub grace_timeout: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            capture: CaptureMode::Pty,
            poll_interval: Duration::from_millis(50),
            batch_interval: Duration::from_millis(200),
            batch_bytes: 16 * 1024,
            grace_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Launching,
    Running,
    Draining,
    Killed,
    Terminated,
}

#[derive(Debug)]
struct ControlState {
    state: SessionState,
    pgid: Option<Pid>,
    stop_requested: Option<Instant>,
}

#[derive(Debug)]
struct Control(Mutex<ControlState>);

impl Control {
    fn lock(&self) -> MutexGuard<'_, ControlState> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn set_state(&self, state: SessionState) {
        self.lock().state = state;
    }
}

/// Cloneable handle for watching and stopping a session from other threads.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    control: Arc<Control>,
}

impl SessionHandle {
    pub fn state(&self) -> SessionState {
        self.control.lock().state
    }

    pub fn pgid(&self) -> Option<Pid> {
        self.control.lock().pgid
    }

    /**
     * Asks the session to end: SIGTERM to the whole process group now,
     * SIGKILL once the grace timeout has passed. Before the child is spawned
     * this keeps it from being spawned at all. Calling it again does nothing.
     */
    pub fn stop(&self) {
        let mut control = self.control.lock();
        if control.state == SessionState::Terminated
            || control.stop_requested.is_some()
        {
            return;
        }
        control.stop_requested = Some(Instant::now());
        if let Some(pgid) = control.pgid {
            info!("Stopping process group {}", pgid);
            if let Err(e) = killpg(pgid, Signal::SIGTERM) {
                debug!("SIGTERM to process group {} failed: {}", pgid, e);
            }
            if control.state == SessionState::Running {
                control.state = SessionState::Killed;
            }
        } else {
            debug!("Stop requested before launch");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    /// None if the child was never spawned
    pub exit_code: Option<i32>,
    pub missing_dependencies: BTreeSet<String>,
    pub report_file: Option<PathBuf>,
    pub stopped: bool,
}

impl SessionReport {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Launches target executables, one at a time.
pub struct ProcessSupervisor {
    settings: SupervisorSettings,
    live: Arc<AtomicBool>,
}

impl ProcessSupervisor {
    pub fn new(settings: SupervisorSettings) -> Self {
        Self {
            settings,
            live: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Claims the supervisor for a new session; `Busy` while another one
    /// exists.
    pub fn session(&self) -> Result<Session, SessionError> {
        if self
            .live
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::Busy);
        }
        Ok(Session {
            settings: self.settings.clone(),
            control: Arc::new(Control(Mutex::new(ControlState {
                state: SessionState::Idle,
                pgid: None,
                stop_requested: None,
            }))),
            binding: None,
            _claim: LiveClaim(self.live.clone()),
        })
    }
}

struct LiveClaim(Arc<AtomicBool>);

impl Drop for LiveClaim {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Pid file in the runtime directory naming the process group of the
/// session running against an overlay environment.
struct Binding {
    runtime_dir: PathBuf,
    working_dir: PathBuf,
}

struct BindingGuard<'a>(&'a Binding);

impl Drop for BindingGuard<'_> {
    fn drop(&mut self) {
        remove_session_pgid(&self.0.runtime_dir, &self.0.working_dir);
    }
}

/// Kills and reaps the child unless it has been waited for.
struct ChildGuard {
    child: Box<dyn SupervisedChild>,
    reaped: bool,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.reaped {
            warn!("Killing process group {} on early exit", self.child.pgid());
            let _ = self.child.signal_group(Signal::SIGKILL);
            let _ = self.child.wait();
        }
    }
}

/// True while any process is left in the group.
fn group_alive(pgid: Pid) -> bool {
    !matches!(killpg(pgid, None), Err(Errno::ESRCH))
}

fn kill_group(child: &dyn SupervisedChild) {
    let pgid = child.pgid();
    info!("Grace period over, killing process group {}", pgid);
    if let Err(e) = child.signal_group(Signal::SIGKILL) {
        warn!(
            "{}",
            SessionError::ProcessKillFailed {
                pgid: pgid.as_raw(),
                reason: e.to_string(),
            }
        );
    }
}

/// Output processing shared by the running and draining phases.
struct OutputPump<'a> {
    decoder: Utf8Decoder,
    batcher: LineBatcher,
    missing: BTreeSet<String>,
    observer: &'a mut dyn FnMut(Vec<String>),
    buf: Vec<u8>,
    /// Most bytes read per `pump` call
    budget: usize,
}

impl OutputPump<'_> {
    fn scan(&mut self, line: &str) {
        if let Some(token) = missing_dependency_token(line) {
            if self.missing.insert(token.clone()) {
                debug!("Possible missing dependency: {}", token);
            }
        }
    }

    /**
     * Reads until nothing more is available or `budget` bytes have come in,
     * forwarding batches as soon as they are due. Returns the last read
     * status; running out of budget counts as `Empty` so a child that never
     * stops writing can't keep the caller from checking on it.
     */
    fn pump(&mut self, child: &mut dyn SupervisedChild) -> ReadStatus {
        let mut read = 0;
        while read < self.budget {
            match child.read_output(&mut self.buf) {
                Ok(ReadStatus::Data(n)) => {
                    read += n;
                    let text = self.decoder.decode(&self.buf[..n]);
                    for line in self.batcher.push(&text, Instant::now()) {
                        self.scan(&line);
                    }
                    self.forward_due();
                }
                Ok(status) => return status,
                Err(e) => {
                    warn!("{}", SessionError::ReadError(e.to_string()));
                    return ReadStatus::Empty;
                }
            }
        }
        ReadStatus::Empty
    }

    fn forward_due(&mut self) {
        if let Some(batch) = self.batcher.poll(Instant::now()) {
            (self.observer)(batch);
        }
    }

    fn finish(&mut self) {
        let tail = self.decoder.finish();
        let now = Instant::now();
        for line in self.batcher.push(&tail, now) {
            self.scan(&line);
        }
        let (last, batch) = self.batcher.finish(now);
        if let Some(last) = last {
            self.scan(&last);
        }
        if let Some(batch) = batch {
            (self.observer)(batch);
        }
    }
}

/// One supervised run of a target executable.
pub struct Session {
    settings: SupervisorSettings,
    control: Arc<Control>,
    binding: Option<Binding>,
    _claim: LiveClaim,
}

impl Session {
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            control: self.control.clone(),
        }
    }

    /// Records the session's process group against an overlay environment
    /// for as long as it runs.
    pub fn bind(&mut self, runtime_dir: &Path, working_dir: &Path) {
        self.binding = Some(Binding {
            runtime_dir: runtime_dir.to_path_buf(),
            working_dir: working_dir.to_path_buf(),
        });
    }

    /**
     * Runs `target` with exactly the environment `env` and blocks until it
     * has terminated and its output has been drained. Output lines reach
     * `observer` in batches. Missing-dependency tokens are written next to
     * the executable.
     */
    pub fn run(
        self,
        target: &ExecutionTarget,
        env: BTreeMap<String, String>,
        raise_nofile: bool,
        observer: &mut dyn FnMut(Vec<String>),
    ) -> Result<SessionReport, SessionError> {
        let spec = LaunchSpec {
            argv: target.argv(),
            cwd: target.working_directory().to_path_buf(),
            env,
            raise_nofile,
        };

        {
            let mut control = self.control.lock();
            if control.stop_requested.is_some() {
                control.state = SessionState::Terminated;
                return Ok(SessionReport {
                    exit_code: None,
                    missing_dependencies: BTreeSet::new(),
                    report_file: None,
                    stopped: true,
                });
            }
            control.state = SessionState::Launching;
        }

        info!("Launching {}", target.executable_path().display());
        trace!(
            "argv: {}",
            spec.argv
                .iter()
                .map(|arg| arg.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );
        let child = match child::spawn(self.settings.capture, &spec) {
            Ok(child) => child,
            Err(e) => {
                self.control.set_state(SessionState::Terminated);
                return Err(e);
            }
        };
        let mut guard = ChildGuard {
            child,
            reaped: false,
        };
        let pgid = guard.child.pgid();

        {
            let mut control = self.control.lock();
            control.pgid = Some(pgid);
            control.state = SessionState::Running;
            if control.stop_requested.is_some() {
                // stop() came in while we were spawning
                let _ = guard.child.signal_group(Signal::SIGTERM);
                control.state = SessionState::Killed;
            }
        }

        let _binding = match &self.binding {
            Some(binding) => {
                if let Err(e) =
                    write_session_pgid(&binding.runtime_dir, &binding.working_dir, pgid)
                {
                    warn!("{:#}", e);
                }
                Some(BindingGuard(binding))
            }
            None => None,
        };

        let mut pump = OutputPump {
            decoder: Utf8Decoder::new(),
            batcher: LineBatcher::new(
                self.settings.batch_interval,
                self.settings.batch_bytes,
            ),
            missing: BTreeSet::new(),
            observer,
            buf: vec![0u8; 8192],
            budget: self.settings.batch_bytes.max(8192),
        };

        let mut output_closed = false;
        let mut killed = false;
        let status = loop {
            if !output_closed {
                output_closed = pump.pump(guard.child.as_mut()) == ReadStatus::Closed;
            }
            pump.forward_due();

            match guard.child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => warn!("Failed to poll process {}: {}", pgid, e),
            }

            let stop_requested = self.control.lock().stop_requested;
            if let Some(since) = stop_requested {
                if !killed && since.elapsed() >= self.settings.grace_timeout {
                    kill_group(guard.child.as_ref());
                    killed = true;
                }
            }

            std::thread::sleep(self.settings.poll_interval);
        };
        guard.reaped = true;

        let stop_requested = {
            let mut control = self.control.lock();
            if control.state == SessionState::Running {
                control.state = SessionState::Draining;
            }
            control.stop_requested
        };
        let stopped = stop_requested.is_some();

        // The rest of the group keeps whatever is left of the grace period
        if let Some(since) = stop_requested.filter(|_| !killed) {
            let deadline = since + self.settings.grace_timeout;
            while group_alive(pgid) && Instant::now() < deadline {
                if !output_closed {
                    output_closed =
                        pump.pump(guard.child.as_mut()) == ReadStatus::Closed;
                }
                pump.forward_due();
                std::thread::sleep(self.settings.poll_interval);
            }
            if group_alive(pgid) {
                kill_group(guard.child.as_ref());
            }
        }

        // Descendants may keep the output open; give them the grace timeout
        let drain_deadline = Instant::now() + self.settings.grace_timeout;
        while !output_closed && Instant::now() < drain_deadline {
            match pump.pump(guard.child.as_mut()) {
                ReadStatus::Closed => output_closed = true,
                _ if stopped => break,
                _ => {
                    pump.forward_due();
                    std::thread::sleep(self.settings.poll_interval);
                }
            }
        }
        pump.finish();
        drop(guard);

        let exit_code = child::exit_code(status);
        info!("Process exited with code {}", exit_code);

        let report_file = match write_report(target.report_dir(), &pump.missing) {
            Ok(report) => report,
            Err(e) => {
                warn!("{:#}", e);
                None
            }
        };

        self.control.set_state(SessionState::Terminated);
        Ok(SessionReport {
            exit_code: Some(exit_code),
            missing_dependencies: pump.missing,
            report_file,
            stopped,
        })
    }
}

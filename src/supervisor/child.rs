use nix::errno::Errno;
use nix::fcntl::{FcntlArg, FdFlag, OFlag, fcntl};
use nix::sys::resource::{Resource, getrlimit, setrlimit};
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};

use super::SessionError;
use crate::config::CaptureMode;

/// Everything needed to start the supervised process.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub argv: Vec<OsString>,
    pub cwd: PathBuf,
    /// Complete environment; nothing is inherited
    pub env: BTreeMap<String, String>,
    /// Raise the soft open-file limit to the hard limit in the child
    pub raise_nofile: bool,
}

impl LaunchSpec {
    pub fn program(&self) -> String {
        self.argv
            .first()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    fn command(&self) -> Result<Command, SessionError> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(SessionError::LaunchFailed {
                program: String::new(),
                reason: "empty command line".to_string(),
            });
        };
        let mut command = Command::new(program);
        command
            .args(args)
            .env_clear()
            .envs(&self.env)
            .current_dir(&self.cwd);
        Ok(command)
    }

    fn launch_failed(&self, e: impl std::fmt::Display) -> SessionError {
        SessionError::LaunchFailed {
            program: self.program(),
            reason: e.to_string(),
        }
    }
}

/// Result of one non-blocking read of the child's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Data(usize),
    Empty,
    Closed,
}

/**
 * A running child in its own process group whose combined output we
 * capture. Implementations differ in how the output is attached.
 */
pub trait SupervisedChild: Send {
    fn pgid(&self) -> Pid;

    /// Reads whatever output is available without blocking.
    fn read_output(&mut self, buf: &mut [u8]) -> io::Result<ReadStatus>;

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>>;

    fn wait(&mut self) -> io::Result<ExitStatus>;

    fn signal_group(&self, signal: Signal) -> nix::Result<()> {
        killpg(self.pgid(), signal)
    }
}

/// `128 + signal` for children killed by a signal.
pub fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => -1,
    }
}

pub fn spawn(
    capture: CaptureMode,
    spec: &LaunchSpec,
) -> Result<Box<dyn SupervisedChild>, SessionError> {
    match capture {
        CaptureMode::Pty => Ok(Box::new(PtyChild::spawn(spec)?)),
        CaptureMode::Pipe => Ok(Box::new(PipeChild::spawn(spec)?)),
    }
}

/// Our end of the output channel: non-blocking, not inherited by the child.
fn prepare_reader(fd: &OwnedFd) -> nix::Result<()> {
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(OFlag::O_NONBLOCK))?;
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    Ok(())
}

fn read_nonblocking(output: &mut File, buf: &mut [u8]) -> io::Result<ReadStatus> {
    match output.read(buf) {
        Ok(0) => Ok(ReadStatus::Closed),
        Ok(n) => Ok(ReadStatus::Data(n)),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(ReadStatus::Empty),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(ReadStatus::Empty),
        Err(e) => Err(e),
    }
}

/// Runs in the forked child before exec.
fn raise_nofile_limit() {
    if let Ok((_, hard)) = getrlimit(Resource::RLIMIT_NOFILE) {
        let _ = setrlimit(Resource::RLIMIT_NOFILE, hard, hard);
    }
}

/// Child attached to the slave side of a pseudo-terminal, leading a new
/// session.
pub struct PtyChild {
    child: Child,
    master: File,
}

impl PtyChild {
    pub fn spawn(spec: &LaunchSpec) -> Result<Self, SessionError> {
        let pty = nix::pty::openpty(
            None::<&nix::pty::Winsize>,
            None::<&nix::sys::termios::Termios>,
        )
        .map_err(|e| spec.launch_failed(e))?;
        prepare_reader(&pty.master).map_err(|e| spec.launch_failed(e))?;

        let stdin = pty.slave.try_clone().map_err(|e| spec.launch_failed(e))?;
        let stdout = pty.slave.try_clone().map_err(|e| spec.launch_failed(e))?;
        let raise_nofile = spec.raise_nofile;

        let mut command = spec.command()?;
        command
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(pty.slave));
        unsafe {
            command.pre_exec(move || {
                nix::unistd::setsid()?;
                // The slave is fd 0 by now; make it our controlling terminal
                libc::ioctl(0, libc::TIOCSCTTY, 0);
                if raise_nofile {
                    raise_nofile_limit();
                }
                Ok(())
            });
        }

        let child = command.spawn().map_err(|e| spec.launch_failed(e))?;
        // Closes our copies of the slave, so reads see EIO once the child
        // and its descendants are gone
        drop(command);

        Ok(Self {
            child,
            master: File::from(pty.master),
        })
    }
}

impl SupervisedChild for PtyChild {
    fn pgid(&self) -> Pid {
        Pid::from_raw(self.child.id() as i32)
    }

    fn read_output(&mut self, buf: &mut [u8]) -> io::Result<ReadStatus> {
        match read_nonblocking(&mut self.master, buf) {
            Err(e) if e.raw_os_error() == Some(Errno::EIO as i32) => {
                Ok(ReadStatus::Closed)
            }
            other => other,
        }
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait()
    }
}

/// Child with stdout and stderr sharing one pipe, for hosts without usable
/// pseudo-terminals.
pub struct PipeChild {
    child: Child,
    output: File,
}

impl PipeChild {
    pub fn spawn(spec: &LaunchSpec) -> Result<Self, SessionError> {
        let (reader, writer) = nix::unistd::pipe2(OFlag::O_CLOEXEC)
            .map_err(|e| spec.launch_failed(e))?;
        prepare_reader(&reader).map_err(|e| spec.launch_failed(e))?;
        let stderr = writer.try_clone().map_err(|e| spec.launch_failed(e))?;
        let raise_nofile = spec.raise_nofile;

        let mut command = spec.command()?;
        command
            .stdin(Stdio::null())
            .stdout(Stdio::from(writer))
            .stderr(Stdio::from(stderr))
            .process_group(0);
        if raise_nofile {
            unsafe {
                command.pre_exec(|| {
                    raise_nofile_limit();
                    Ok(())
                });
            }
        }

        let child = command.spawn().map_err(|e| spec.launch_failed(e))?;
        drop(command);

        Ok(Self {
            child,
            output: File::from(reader),
        })
    }
}

impl SupervisedChild for PipeChild {
    fn pgid(&self) -> Pid {
        Pid::from_raw(self.child.id() as i32)
    }

    fn read_output(&mut self, buf: &mut [u8]) -> io::Result<ReadStatus> {
        read_nonblocking(&mut self.output, buf)
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn sh(script: &str) -> LaunchSpec {
        LaunchSpec {
            argv: ["sh", "-c", script].map(OsString::from).to_vec(),
            cwd: std::env::temp_dir(),
            env: BTreeMap::from([(
                "PATH".to_string(),
                "/usr/local/bin:/usr/bin:/bin".to_string(),
            )]),
            raise_nofile: false,
        }
    }

    fn read_all(child: &mut dyn SupervisedChild) -> String {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        while Instant::now() < deadline {
            match child.read_output(&mut buf).unwrap() {
                ReadStatus::Data(n) => out.extend_from_slice(&buf[..n]),
                ReadStatus::Empty => std::thread::sleep(Duration::from_millis(10)),
                ReadStatus::Closed => break,
            }
        }
        String::from_utf8_lossy(&out).to_string()
    }

    #[test]
    fn test_pty_child_output_and_session() {
        let mut child = PtyChild::spawn(&sh("echo out; echo err >&2; echo $FOO")).unwrap();
        let output = read_all(&mut child);
        assert!(output.contains("out"));
        assert!(output.contains("err"));
        assert_eq!(exit_code(child.wait().unwrap()), 0);
    }

    #[test]
    fn test_pipe_child_output() {
        let mut spec = sh("echo out; echo err >&2; exit 3");
        spec.env.insert("FOO".to_string(), "bar".to_string());
        let mut child = PipeChild::spawn(&spec).unwrap();
        let output = read_all(&mut child);
        assert_eq!(output, "out\nerr\n");
        assert_eq!(exit_code(child.wait().unwrap()), 3);
    }

    #[test]
    fn test_env_is_not_inherited() {
        let mut spec = sh("echo \"[$HOME][$FOO]\"");
        spec.env.insert("FOO".to_string(), "bar".to_string());
        let mut child = PipeChild::spawn(&spec).unwrap();
        assert_eq!(read_all(&mut child), "[][bar]\n");
        child.wait().unwrap();
    }

    #[test]
    fn test_signalled_exit_code() {
        let mut child = PipeChild::spawn(&sh("sleep 30")).unwrap();
        child.signal_group(Signal::SIGKILL).unwrap();
        assert_eq!(exit_code(child.wait().unwrap()), 128 + 9);
    }

    #[test]
    fn test_launch_failure() {
        let spec = LaunchSpec {
            argv: vec![OsString::from("/nonexistent/prefixbox-runtime")],
            ..sh("")
        };
        let err = PtyChild::spawn(&spec).err().unwrap();
        assert_eq!(err.kind(), "launch_failed");
    }
}

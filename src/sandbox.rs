//! Running a command inside the assembled root filesystem
//!
//! Entering the sandbox is a one-way trip for the calling process: once the
//! root has changed there's no getting back, and the PID namespace applies
//! to every child spawned afterwards. Each step consumes the previous one,
//! so the sequence can't be reordered or repeated.
//!
//! ```no_run
//! # use layerjail::Sandbox;
//! # fn main() -> Result<(), layerjail::errors::SandboxError> {
//! let output = Sandbox::new("/tmp/rootfs")
//!     .change_root()?
//!     .isolate_pids()?
//!     .run("/bin/echo", &["hello"])?;
//! std::process::exit(output.report()?);
//! # }
//! ```

use crate::errors::SandboxError;
use std::{
    borrow::Cow,
    ffi::OsStr,
    fmt, io,
    io::Write,
    marker::PhantomData,
    os::unix::{fs, process::ExitStatusExt},
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

/// The root directory is ready but nothing has been entered yet
#[derive(Debug)]
pub struct Prepared;

/// This process now sees the sandbox root as `/`
#[derive(Debug)]
pub struct RootChanged;

/// Children spawned from here on get their own PID namespace
#[derive(Debug)]
pub struct PidIsolated;

/// Launcher for one command, in one of the states above
#[derive(Debug)]
pub struct Sandbox<S> {
    root: PathBuf,
    state: PhantomData<S>,
}

impl Sandbox<Prepared> {
    /// Prepare to run in an assembled root filesystem
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Sandbox {
            root: root.as_ref().to_owned(),
            state: PhantomData,
        }
    }

    /// `chroot` into the sandbox root and move to its `/`
    pub fn change_root(self) -> Result<Sandbox<RootChanged>, SandboxError> {
        log::debug!("changing root to {:?}", self.root);
        let changed = fs::chroot(&self.root).and_then(|()| std::env::set_current_dir("/"));
        match changed {
            Ok(()) => Ok(self.into_state()),
            Err(source) => Err(SandboxError::ChangeRoot {
                path: self.root,
                source,
            }),
        }
    }
}

impl Sandbox<RootChanged> {
    /// Unshare the process-ID namespace
    pub fn isolate_pids(self) -> Result<Sandbox<PidIsolated>, SandboxError> {
        log::debug!("unshare(CLONE_NEWPID)");
        if unsafe { libc::unshare(libc::CLONE_NEWPID) } != 0 {
            return Err(SandboxError::Unshare(io::Error::last_os_error()));
        }
        Ok(self.into_state())
    }
}

impl Sandbox<PidIsolated> {
    /// Run the command to completion, capturing its output
    ///
    /// Standard input is inherited. The command is found using the `PATH`
    /// of the current environment, resolved inside the sandbox.
    pub fn run<C, I, A>(self, command: C, args: I) -> Result<Output, SandboxError>
    where
        C: AsRef<OsStr>,
        I: IntoIterator<Item = A>,
        A: AsRef<OsStr>,
    {
        let command = command.as_ref();
        log::info!("running {:?}", command);
        let output = Command::new(command)
            .args(args)
            .stdin(Stdio::inherit())
            .output()
            .map_err(|source| SandboxError::Exec {
                command: command.to_string_lossy().into_owned(),
                source,
            })?;
        let status = ExitStatus::from(output.status);
        log::debug!("{:?} exited with {}", command, status);
        Ok(Output {
            status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

impl<S> Sandbox<S> {
    /// Path of the root filesystem, as seen from outside it
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn into_state<T>(self) -> Sandbox<T> {
        Sandbox {
            root: self.root,
            state: PhantomData,
        }
    }
}

/// Status of an exited command
///
/// Much like [std::process::ExitStatus], but always has a code: a command
/// killed by a signal reports `128` plus the signal number.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ExitStatus {
    code: i32,
}

impl ExitStatus {
    /// Status for a command that exited normally with `code`
    pub fn from_code(code: i32) -> Self {
        ExitStatus { code }
    }

    /// Was the exit code zero?
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// The code this process should exit with to pass the status on
    pub fn code(&self) -> i32 {
        self.code
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        let code = match (status.code(), status.signal()) {
            (Some(code), _) => code,
            (None, Some(signal)) => 128 + signal,
            (None, None) => crate::errors::FATAL_EXIT_CODE,
        };
        ExitStatus { code }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "exit code {}", self.code)
    }
}

/// Output from an exited command
///
/// Much like [std::process::Output]
#[derive(Clone, Eq, PartialEq)]
pub struct Output {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Output {
    /// Convert the stdout to utf8 if possible
    ///
    /// Equivalent to `String::from_utf8_lossy(output.stdout)`
    pub fn stdout_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    /// Convert the stderr to utf8 if possible
    ///
    /// Equivalent to `String::from_utf8_lossy(output.stderr)`
    pub fn stderr_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// Write the captured streams to our own stdout and stderr, byte for
    /// byte, and return the code this process should exit with
    pub fn report(&self) -> Result<i32, SandboxError> {
        self.report_to(&mut io::stdout().lock(), &mut io::stderr().lock())
    }

    /// Like [Output::report], writing to the given streams
    pub fn report_to<O: Write, E: Write>(
        &self,
        stdout: &mut O,
        stderr: &mut E,
    ) -> Result<i32, SandboxError> {
        expect_broken_pipe(stdout.write_all(&self.stdout).and_then(|()| stdout.flush()))
            .map_err(SandboxError::Relay)?;
        expect_broken_pipe(stderr.write_all(&self.stderr).and_then(|()| stderr.flush()))
            .map_err(SandboxError::Relay)?;
        Ok(self.status.code())
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Output")
            .field("status", &self.status)
            .field("stdout", &self.stdout_str())
            .field("stderr", &self.stderr_str())
            .finish()
    }
}

fn expect_broken_pipe(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

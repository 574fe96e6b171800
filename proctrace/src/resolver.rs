use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_PROC_ROOT: &str = "/proc";

#[derive(Debug, Error)]
pub enum ResolveError {
    /// The process exited before its entries could be read.
    #[error("process {pid} no longer exists")]
    NotFound { pid: u32 },
    #[error("cannot read {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl ResolveError {
    fn from_io(pid: u32, path: PathBuf, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound || err.raw_os_error() == Some(libc::ESRCH) {
            ResolveError::NotFound { pid }
        } else {
            ResolveError::Io { path, source: err }
        }
    }
}

/// What `/proc` knew about a process at the time of the lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub exe: PathBuf,
    pub cmdline: String,
}

/// Reads per-process entries under a proc mount. Entries vanish as soon as
/// the process is reaped, so every lookup may fail with `NotFound`.
#[derive(Debug, Clone)]
pub struct ProcResolver {
    root: PathBuf,
}

impl Default for ProcResolver {
    fn default() -> Self {
        Self::new(DEFAULT_PROC_ROOT)
    }
}

impl ProcResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry(&self, pid: u32, name: &str) -> PathBuf {
        self.root.join(pid.to_string()).join(name)
    }

    pub fn executable_path(&self, pid: u32) -> Result<PathBuf, ResolveError> {
        let path = self.entry(pid, "exe");
        fs::read_link(&path).map_err(|e| ResolveError::from_io(pid, path, e))
    }

    pub fn command_line(&self, pid: u32) -> Result<String, ResolveError> {
        let path = self.entry(pid, "cmdline");
        let raw = fs::read(&path).map_err(|e| ResolveError::from_io(pid, path, e))?;
        Ok(format_command_line(&raw))
    }

    /// Executable first, like the kernel's own view of the exec; if the link
    /// is already gone the command line is not worth reading.
    pub fn identify(&self, pid: u32) -> Result<ProcessIdentity, ResolveError> {
        let exe = self.executable_path(pid)?;
        let cmdline = self.command_line(pid)?;
        Ok(ProcessIdentity { exe, cmdline })
    }
}

/// Turns a raw `cmdline` blob into one display line: NUL separators become
/// single spaces, trailing NULs are dropped and line breaks are escaped.
pub fn format_command_line(raw: &[u8]) -> String {
    let end = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    let text = String::from_utf8_lossy(&raw[..end]);

    let mut line = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\0' => line.push(' '),
            '\n' => line.push_str("\\n"),
            '\r' => line.push_str("\\r"),
            c => line.push(c),
        }
    }
    line
}

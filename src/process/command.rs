// ABOUTME: Value types describing a command to run and what it produced.
// ABOUTME: Kept free of tokio so fakes can construct them directly.

use std::ffi::OsStr;
use std::fmt;
use std::path::Path;

/// Where a spawned command reads its standard input from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StdinSource {
    /// Share the orchestrator's own stdin (used to stream source archives).
    Inherit,
    /// Empty stdin.
    #[default]
    Null,
    /// Feed these bytes, then close.
    Bytes(Vec<u8>),
}

/// A fully described external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    stdin: StdinSource,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: StdinSource::Null,
        }
    }

    /// Build a command for an executable path (plugin scripts, our own binary).
    pub fn for_path(path: &Path) -> Self {
        Self::new(path.to_string_lossy().into_owned())
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_string_lossy().into_owned()));
        self
    }

    pub fn stdin(mut self, stdin: StdinSource) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_stdin(&self) -> &StdinSource {
        &self.stdin
    }
}

/// Space-joined command line, for logs and test assertions.
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Exit status of a command that actually ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
    code: Option<i32>,
}

impl CommandStatus {
    pub const SUCCESS: CommandStatus = CommandStatus { code: Some(0) };

    pub fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    /// Status of a process that was terminated by a signal.
    pub fn signaled() -> Self {
        Self { code: None }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }
}

impl From<std::process::ExitStatus> for CommandStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit status {code}"),
            None => f.write_str("terminated by signal"),
        }
    }
}

/// Result of a command whose stdout was captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: CommandStatus,
    pub stdout: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

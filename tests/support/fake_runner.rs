// ABOUTME: Recording ProcessRunner fake for integration tests.
// ABOUTME: Replies by command-line prefix, can hold commands open, and simulates missing tools.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dokku::process::{
    CommandOutput, CommandSpec, CommandStatus, ProcessError, ProcessRunner, StdinSource,
};
use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Clone)]
enum Reply {
    Exit { code: i32, stdout: String },
    /// Wait until released, then exit 0 printing `stdout`.
    Hold { release: Arc<Notify>, stdout: String },
}

#[derive(Debug, Clone)]
struct Rule {
    prefix: String,
    reply: Reply,
}

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub line: String,
    pub stdin: StdinSource,
}

/// Fake runner. The last rule added for a matching prefix wins; anything
/// unmatched exits 0 with empty stdout.
#[derive(Debug, Default)]
pub struct FakeRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Call>>,
    detached: Mutex<Vec<String>>,
    missing: Mutex<HashSet<String>>,
    seen: Notify,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reply to commands starting with `prefix`.
    pub fn respond(&self, prefix: &str, code: i32, stdout: &str) -> &Self {
        self.rules.lock().push(Rule {
            prefix: prefix.to_string(),
            reply: Reply::Exit {
                code,
                stdout: stdout.to_string(),
            },
        });
        self
    }

    pub fn fail(&self, prefix: &str, code: i32) -> &Self {
        self.respond(prefix, code, "")
    }

    /// Keep commands starting with `prefix` running until the returned handle is notified.
    pub fn hold(&self, prefix: &str) -> Arc<Notify> {
        self.hold_with(prefix, "")
    }

    /// Like [`hold`](Self::hold), printing `stdout` once released.
    pub fn hold_with(&self, prefix: &str, stdout: &str) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        self.rules.lock().push(Rule {
            prefix: prefix.to_string(),
            reply: Reply::Hold {
                release: release.clone(),
                stdout: stdout.to_string(),
            },
        });
        release
    }

    /// Make `program` behave as if it were not installed.
    pub fn missing(&self, program: &str) -> &Self {
        self.missing.lock().insert(program.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.line.clone()).collect()
    }

    pub fn detached(&self) -> Vec<String> {
        self.detached.lock().clone()
    }

    pub fn ran(&self, prefix: &str) -> bool {
        self.calls.lock().iter().any(|c| c.line.starts_with(prefix))
    }

    /// Stdin handed to the first command starting with `prefix`.
    pub fn stdin_of(&self, prefix: &str) -> Option<StdinSource> {
        self.calls
            .lock()
            .iter()
            .find(|c| c.line.starts_with(prefix))
            .map(|c| c.stdin.clone())
    }

    /// Index of the first command starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.calls
            .lock()
            .iter()
            .position(|c| c.line.starts_with(prefix))
    }

    /// Resolves once a command starting with `prefix` has been started.
    pub async fn wait_for(self: Arc<Self>, prefix: String) {
        loop {
            let notified = self.seen.notified();
            if self.ran(&prefix) {
                return;
            }
            notified.await;
        }
    }

    fn check_installed(&self, command: &CommandSpec) -> Result<(), ProcessError> {
        if self.missing.lock().contains(command.program()) {
            Err(ProcessError::NotFound {
                program: command.program().to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn record(&self, command: &CommandSpec) -> Reply {
        let line = command.to_string();
        let reply = self
            .rules
            .lock()
            .iter()
            .rev()
            .find(|rule| line.starts_with(&rule.prefix))
            .map(|rule| rule.reply.clone())
            .unwrap_or(Reply::Exit {
                code: 0,
                stdout: String::new(),
            });
        self.calls.lock().push(Call {
            line,
            stdin: command.get_stdin().clone(),
        });
        self.seen.notify_waiters();
        reply
    }

    async fn execute(&self, command: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        self.check_installed(command)?;
        match self.record(command) {
            Reply::Exit { code, stdout } => Ok(CommandOutput {
                status: CommandStatus::from_code(code),
                stdout,
            }),
            Reply::Hold { release, stdout } => {
                release.notified().await;
                Ok(CommandOutput {
                    status: CommandStatus::SUCCESS,
                    stdout,
                })
            }
        }
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandStatus, ProcessError> {
        Ok(self.execute(command).await?.status)
    }

    async fn output(&self, command: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        self.execute(command).await
    }

    fn spawn_detached(&self, command: &CommandSpec) -> Result<(), ProcessError> {
        self.check_installed(command)?;
        self.detached.lock().push(command.to_string());
        Ok(())
    }
}

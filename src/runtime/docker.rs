// ABOUTME: Container operations expressed as docker CLI invocations.
// ABOUTME: Every verb goes through the injected ProcessRunner.

use std::sync::Arc;

use crate::process::{CommandSpec, CommandStatus, ProcessError, ProcessRunner, StdinSource};
use crate::types::{ContainerId, ImageId, ImageName};

use super::error::DockerError;

/// What happened when asked to kill an instance that may already be gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    Killed,
    AlreadyGone,
    /// Inspect succeeded but the kill itself exited non-zero.
    Failed(CommandStatus),
}

/// Handle to the container runtime CLI.
#[derive(Clone)]
pub struct DockerCli {
    program: String,
    runner: Arc<dyn ProcessRunner>,
}

impl std::fmt::Debug for DockerCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerCli")
            .field("program", &self.program)
            .finish()
    }
}

impl DockerCli {
    pub fn new(program: impl Into<String>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    fn command(&self, verb: &str) -> CommandSpec {
        CommandSpec::new(&self.program).arg(verb)
    }

    /// `docker run -i -a stdin <image> /bin/bash -c <script>`, feeding `stdin`.
    ///
    /// Returns the id of the (possibly still running) container.
    pub async fn run_with_stdin(
        &self,
        image: &str,
        script: &str,
        stdin: StdinSource,
    ) -> Result<ContainerId, DockerError> {
        let cmd = self
            .command("run")
            .args(["-i", "-a", "stdin", image, "/bin/bash", "-c", script])
            .stdin(stdin);
        self.container_id_from("run", &cmd).await
    }

    /// `docker run -d <args...>`.
    pub async fn run_detached<I, S>(&self, args: I) -> Result<ContainerId, DockerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let cmd = self.command("run").arg("-d").args(args);
        self.container_id_from("run", &cmd).await
    }

    async fn container_id_from(
        &self,
        verb: &'static str,
        cmd: &CommandSpec,
    ) -> Result<ContainerId, DockerError> {
        let output = self.runner.output(cmd).await?;
        if !output.success() {
            return Err(DockerError::Failed {
                verb,
                status: output.status,
            });
        }
        ContainerId::from_output(&output.stdout).ok_or(DockerError::UnexpectedOutput {
            verb,
            output: output.stdout,
        })
    }

    /// Stream a container's output to our terminal until it exits.
    pub async fn attach(&self, id: &ContainerId) -> Result<CommandStatus, DockerError> {
        let cmd = self.command("attach").arg(id.as_str());
        Ok(self.runner.run(&cmd).await?)
    }

    /// Block until the container exits and return its exit code.
    pub async fn wait(&self, id: &ContainerId) -> Result<i64, DockerError> {
        let cmd = self.command("wait").arg(id.as_str());
        let output = self.runner.output(&cmd).await?;
        if !output.success() {
            return Err(DockerError::Failed {
                verb: "wait",
                status: output.status,
            });
        }
        output
            .stdout
            .trim()
            .parse()
            .map_err(|_| DockerError::UnexpectedOutput {
                verb: "wait",
                output: output.stdout,
            })
    }

    /// Commit the container filesystem as `image`, replacing whatever it pointed at.
    pub async fn commit(&self, id: &ContainerId, image: &ImageName) -> Result<ImageId, DockerError> {
        let cmd = self
            .command("commit")
            .arg(id.as_str())
            .arg(image.to_string());
        let output = self.runner.output(&cmd).await?;
        if !output.success() {
            return Err(DockerError::Failed {
                verb: "commit",
                status: output.status,
            });
        }
        // Older runtimes print nothing useful; the image name is what matters.
        Ok(ImageId::from_output(&output.stdout).unwrap_or_else(|| ImageId::new(image.to_string())))
    }

    /// Host port published for `container_port`.
    pub async fn port(&self, id: &ContainerId, container_port: u16) -> Result<u16, DockerError> {
        let cmd = self
            .command("port")
            .arg(id.as_str())
            .arg(container_port.to_string());
        let output = self.runner.output(&cmd).await?;
        if !output.success() {
            return Err(DockerError::Failed {
                verb: "port",
                status: output.status,
            });
        }
        parse_host_port(&output.stdout).ok_or(DockerError::UnexpectedOutput {
            verb: "port",
            output: output.stdout,
        })
    }

    /// Whether the runtime still knows this container.
    pub async fn exists(&self, id: &ContainerId) -> Result<bool, ProcessError> {
        let cmd = self.command("inspect").arg(id.as_str());
        Ok(self.runner.output(&cmd).await?.success())
    }

    pub async fn kill(&self, id: &ContainerId) -> Result<(), DockerError> {
        let cmd = self.command("kill").arg(id.as_str());
        let output = self.runner.output(&cmd).await?;
        if output.success() {
            Ok(())
        } else {
            Err(DockerError::Failed {
                verb: "kill",
                status: output.status,
            })
        }
    }

    /// Kill the container if it still exists.
    ///
    /// A container that is already gone is not an error. Only an
    /// unavailable runtime binary is.
    pub async fn kill_if_exists(&self, id: &ContainerId) -> Result<KillOutcome, ProcessError> {
        if !self.exists(id).await? {
            tracing::debug!(container = %id, "container already gone");
            return Ok(KillOutcome::AlreadyGone);
        }

        match self.kill(id).await {
            Ok(()) => Ok(KillOutcome::Killed),
            Err(DockerError::Failed { status, .. }) => Ok(KillOutcome::Failed(status)),
            Err(DockerError::Process(e)) => Err(e),
            Err(DockerError::UnexpectedOutput { .. }) => Ok(KillOutcome::Killed),
        }
    }

    /// Fire-and-forget `docker kill`, usable where nothing can be awaited.
    pub fn kill_detached(&self, id: &ContainerId) -> Result<(), ProcessError> {
        self.runner
            .spawn_detached(&self.command("kill").arg(id.as_str()))
    }

    /// Fire-and-forget shell pipeline, used by the cleanup sweeps.
    pub fn spawn_shell_detached(&self, script: &str) -> Result<(), ProcessError> {
        self.runner
            .spawn_detached(&CommandSpec::new("sh").args(["-c", script]))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

/// Parse `docker port` output such as `0.0.0.0:49170` or `[::]:49170`.
fn parse_host_port(output: &str) -> Option<u16> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let port = line.rsplit_once(':').map_or(line, |(_, port)| port);
    port.parse().ok()
}

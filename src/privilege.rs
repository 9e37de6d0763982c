// ABOUTME: Re-execution under the service user when invoked by anyone else.
// ABOUTME: plugins-install commands are exempt because they need root.

use std::ffi::OsString;
use std::path::Path;

use crate::process::{CommandSpec, CommandStatus, ProcessError, ProcessRunner, StdinSource};

pub const SUDO: &str = "sudo";

/// Whether this invocation has to be handed to the service user.
pub fn needs_reexec(current_user: Option<&str>, service_user: &str, args: &[OsString]) -> bool {
    if current_user == Some(service_user) {
        return false;
    }
    let exempt = args
        .iter()
        .filter_map(|arg| arg.to_str())
        .find(|arg| !arg.starts_with('-'))
        .is_some_and(|cmd| cmd.starts_with("plugins-install"));
    !exempt
}

/// `sudo -u <user> -H <exe> <args...>`, each argument kept separate.
pub fn reexec_command(service_user: &str, exe: &Path, args: &[OsString]) -> CommandSpec {
    CommandSpec::new(SUDO)
        .args(["-u", service_user, "-H"])
        .arg(exe)
        .args(args)
        .stdin(StdinSource::Inherit)
}

/// Run ourselves again as `service_user` and return its exit status.
pub async fn reexec(
    runner: &dyn ProcessRunner,
    service_user: &str,
    exe: &Path,
    args: &[OsString],
) -> Result<CommandStatus, ProcessError> {
    let command = reexec_command(service_user, exe, args);
    tracing::debug!(user = service_user, "re-executing as service user");
    runner.run(&command).await
}

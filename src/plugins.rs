// ABOUTME: Plugin directory listing, installation hooks, help, and command forwarding.
// ABOUTME: Unknown subcommands go verbatim to every executable <plugin>/commands script.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::hooks::{HookEvent, HookRunner};
use crate::process::{CommandSpec, CommandStatus, ProcessRunner, StdinSource};

/// Name of the per-plugin script that receives forwarded subcommands.
pub const COMMANDS_SCRIPT: &str = "commands";

/// Help lines for the commands built into this binary.
pub const BUILTIN_HELP: &[(&str, &str)] = &[
    ("help", "Print the list of commands"),
    ("plugins", "Print active plugins"),
    ("plugins-install", "Install active plugins"),
    ("plugins-install-dependencies", "Install plugin dependencies"),
    ("receive <app>", "Build, release and deploy an app from a tar stream on stdin"),
    ("build <app>", "Build an app's image from a tar stream on stdin"),
    ("release <app>", "Inject an app's ENV into its image"),
    ("deploy <app>", "Deploy an app's current image"),
    ("deploy:all", "Redeploy every app"),
    ("cleanup", "Remove exited containers and dangling images"),
    ("url <app>", "Print an app's URL"),
];

/// Format one help line the way plugin scripts print theirs.
pub fn help_line(command: &str, description: &str) -> String {
    format!("    {command:<48}{description}")
}

#[derive(Clone)]
pub struct Plugins {
    plugin_path: PathBuf,
    hooks: HookRunner,
    runner: Arc<dyn ProcessRunner>,
}

impl std::fmt::Debug for Plugins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugins")
            .field("plugin_path", &self.plugin_path)
            .finish()
    }
}

impl Plugins {
    pub fn new(settings: &Settings, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            plugin_path: settings.plugin_path.clone(),
            hooks: HookRunner::new(&settings.pluginhook, runner.clone()),
            runner,
        }
    }

    /// Directories under the plugin path, sorted by name.
    ///
    /// A missing plugin path means no plugins.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.plugin_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut plugins = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                plugins.push(path);
            }
        }
        plugins.sort();
        Ok(plugins)
    }

    /// Executable `commands` scripts, in plugin order.
    pub fn command_scripts(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .list()?
            .into_iter()
            .map(|plugin| plugin.join(COMMANDS_SCRIPT))
            .filter(|script| is_executable(script))
            .collect())
    }

    /// `pluginhook install`.
    pub async fn install(&self) -> Result<CommandStatus> {
        Ok(self.hooks.run_checked(HookEvent::Install, &[]).await?)
    }

    /// `pluginhook dependencies`.
    pub async fn install_dependencies(&self) -> Result<CommandStatus> {
        Ok(self.hooks.run_checked(HookEvent::Dependencies, &[]).await?)
    }

    /// Hand `args` to every plugin command script.
    ///
    /// All scripts run even if one fails; the first failure is reported.
    pub async fn forward(&self, args: &[String]) -> Result<()> {
        let command = args.first().cloned().unwrap_or_default();
        let scripts = self.command_scripts()?;
        if scripts.is_empty() {
            return Err(Error::UnknownCommand(command));
        }

        let mut first_failure = None;
        for script in scripts {
            let spec = CommandSpec::for_path(&script)
                .args(args)
                .stdin(StdinSource::Inherit);
            let status = self.runner.run(&spec).await?;
            if !status.success() && first_failure.is_none() {
                first_failure = Some(Error::PluginCommand {
                    script: script.display().to_string(),
                    status,
                });
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Built-in and plugin help lines, sorted and deduplicated.
    ///
    /// The dispatcher is best effort: if it is missing or fails, only the
    /// built-in lines are returned.
    pub async fn help_lines(&self) -> Vec<String> {
        let builtin: Vec<String> = BUILTIN_HELP
            .iter()
            .map(|(command, description)| help_line(command, description))
            .collect();

        let mut stdin = builtin.join("\n").into_bytes();
        stdin.push(b'\n');

        let mut lines: BTreeSet<String> = builtin.into_iter().collect();
        match self
            .hooks
            .capture(HookEvent::Commands, &["help"], StdinSource::Bytes(stdin))
            .await
        {
            Ok(output) => {
                if !output.success() {
                    tracing::warn!("commands help hook failed with {}", output.status);
                }
                lines.extend(
                    output
                        .stdout
                        .lines()
                        .filter(|line| !line.trim().is_empty())
                        .map(str::to_string),
                );
            }
            Err(e) => tracing::warn!("Failed to collect plugin help: {}", e),
        }
        lines.into_iter().collect()
    }
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

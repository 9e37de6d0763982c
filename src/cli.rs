// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Unknown subcommands are captured whole and handed to plugin command scripts.

use clap::{Parser, Subcommand};
use dokku::output::OutputMode;
use dokku::types::AppName;

#[derive(Parser)]
#[command(name = "dokku")]
#[command(about = "Build, release and deploy apps into Docker containers on a single host")]
#[command(version)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print results and errors
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print progress as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else if self.quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Normal
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build, release and deploy an app from a tar stream on stdin
    Receive { app: AppName },

    /// Build an app's image from a tar stream on stdin
    Build { app: AppName },

    /// Inject an app's ENV into its image
    Release { app: AppName },

    /// Deploy an app's current image
    Deploy { app: AppName },

    /// Remove exited containers and dangling images
    Cleanup,

    /// Redeploy every app
    #[command(name = "deploy:all")]
    DeployAll,

    /// Print an app's URL
    Url { app: AppName },

    /// Print active plugins
    Plugins,

    /// Install active plugins
    #[command(name = "plugins-install")]
    PluginsInstall,

    /// Install plugin dependencies
    #[command(name = "plugins-install-dependencies")]
    PluginsInstallDependencies,

    /// Print the list of commands
    Help,

    #[command(external_subcommand)]
    External(Vec<String>),
}

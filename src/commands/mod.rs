// ABOUTME: Command module aggregator for the dokku CLI.
// ABOUTME: Re-exports app lifecycle and plugin command handlers.

mod deploy;
mod plugins;

pub use deploy::{build, cleanup, deploy, deploy_all, receive, release, url};
pub use plugins::{forward, help, install_dependencies, install_plugins, list_plugins};

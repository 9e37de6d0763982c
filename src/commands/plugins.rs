// ABOUTME: Plugin command handlers: listing, installation, help, and forwarding.
// ABOUTME: Help never fails; forwarding reports unknown commands when no plugin scripts exist.

use dokku::error::Result;
use dokku::output::Output;
use dokku::plugins::Plugins;

pub fn list_plugins(plugins: &Plugins, output: &Output) -> Result<()> {
    for plugin in plugins.list()? {
        if let Some(name) = plugin.file_name() {
            output.line(&name.to_string_lossy());
        }
    }
    Ok(())
}

pub async fn install_plugins(plugins: &Plugins, output: &Output) -> Result<()> {
    plugins.install().await?;
    output.success("Plugins installed");
    Ok(())
}

pub async fn install_dependencies(plugins: &Plugins, output: &Output) -> Result<()> {
    plugins.install_dependencies().await?;
    output.success("Plugin dependencies installed");
    Ok(())
}

pub async fn help(plugins: &Plugins, output: &Output) {
    for line in plugins.help_lines().await {
        output.line(&line);
    }
}

pub async fn forward(plugins: &Plugins, args: &[String]) -> Result<()> {
    tracing::debug!(command = ?args, "forwarding to plugin commands");
    plugins.forward(args).await
}

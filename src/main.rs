// ABOUTME: Entry point for the dokku CLI application.
// ABOUTME: Drops to the service user, then dispatches to command handlers and maps errors to exit codes.

mod cli;
mod commands;

use std::env;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Commands};
use dokku::config::Settings;
use dokku::error::{EXIT_FAILURE, Result};
use dokku::output::Output;
use dokku::pipeline::Pipeline;
use dokku::plugins::Plugins;
use dokku::privilege;
use dokku::process::{ProcessRunner, TokioProcessRunner};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mut output = Output::new(cli.output_mode());
    let code = match run(cli, &mut output).await {
        Ok(code) => code,
        Err(e) => {
            match e.unavailable_program() {
                Some(program) => output.error(&format!("{program}: command not found")),
                None => output.error(&e.to_string()),
            }
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli, output: &mut Output) -> Result<i32> {
    let settings = Settings::from_env()?;
    let runner: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner::new());

    let args: Vec<_> = env::args_os().skip(1).collect();
    let user = env::var("USER").ok();
    if privilege::needs_reexec(user.as_deref(), &settings.service_user, &args) {
        let exe = env::current_exe()?;
        let status =
            privilege::reexec(runner.as_ref(), &settings.service_user, &exe, &args).await?;
        return Ok(status.code().unwrap_or(EXIT_FAILURE));
    }

    let pipeline = Pipeline::new(&settings, runner.clone());
    let plugins = Plugins::new(&settings, runner);

    match cli.command {
        Some(Commands::Receive { app }) => commands::receive(&pipeline, &app, output).await?,
        Some(Commands::Build { app }) => commands::build(&pipeline, &app, output).await?,
        Some(Commands::Release { app }) => commands::release(&pipeline, &app, output).await?,
        Some(Commands::Deploy { app }) => commands::deploy(&pipeline, &app, output).await?,
        Some(Commands::Cleanup) => commands::cleanup(&pipeline, output),
        Some(Commands::DeployAll) => {
            let exe = env::current_exe()?;
            commands::deploy_all(&pipeline, &exe, output).await?
        }
        Some(Commands::Url { app }) => commands::url(&pipeline, &app, output)?,
        Some(Commands::Plugins) => commands::list_plugins(&plugins, output)?,
        Some(Commands::PluginsInstall) => commands::install_plugins(&plugins, output).await?,
        Some(Commands::PluginsInstallDependencies) => {
            commands::install_dependencies(&plugins, output).await?
        }
        Some(Commands::Help) | None => commands::help(&plugins, output).await,
        Some(Commands::External(args)) => commands::forward(&plugins, &args).await?,
    }
    Ok(0)
}

// ABOUTME: App lifecycle command handlers: receive, build, release, deploy, deploy:all, cleanup, url.
// ABOUTME: Runs a pipeline stage and reports collected warnings.

use std::path::Path;

use dokku::deploy::Cancellation;
use dokku::diagnostics::Diagnostics;
use dokku::error::{Error, Result};
use dokku::output::Output;
use dokku::pipeline::Pipeline;
use dokku::types::AppName;

fn report(diag: &Diagnostics, output: &Output) {
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }
}

pub async fn receive(pipeline: &Pipeline, app: &AppName, output: &mut Output) -> Result<()> {
    output.start_timer();
    let mut diag = Diagnostics::default();
    let result = pipeline
        .receive(app, Cancellation::signals(), output, &mut diag)
        .await;
    report(&diag, output);
    result.map(drop)
}

pub async fn build(pipeline: &Pipeline, app: &AppName, output: &Output) -> Result<()> {
    let image = pipeline.builder().build(app).await?;
    output.success(&format!("Built {image}"));
    Ok(())
}

pub async fn release(pipeline: &Pipeline, app: &AppName, output: &Output) -> Result<()> {
    pipeline.stager().release(app).await?;
    output.success(&format!("Released {app}"));
    Ok(())
}

pub async fn deploy(pipeline: &Pipeline, app: &AppName, output: &mut Output) -> Result<()> {
    output.start_timer();
    let mut diag = Diagnostics::default();
    let result = pipeline
        .deployer()
        .deploy(app, Cancellation::signals(), output, &mut diag)
        .await;
    report(&diag, output);

    let routing = result?;
    output.success("Application deployed:");
    output.result(&routing.url);
    Ok(())
}

pub async fn deploy_all(pipeline: &Pipeline, exe: &Path, output: &mut Output) -> Result<()> {
    output.start_timer();
    let apps = pipeline.deploy_all(exe, output).await?;
    output.success(&format!("Deployed {} app(s)", apps.len()));
    Ok(())
}

pub fn cleanup(pipeline: &Pipeline, output: &Output) {
    let mut diag = Diagnostics::default();
    pipeline.cleanup().sweep(&mut diag);
    report(&diag, output);
}

pub fn url(pipeline: &Pipeline, app: &AppName, output: &Output) -> Result<()> {
    pipeline.registry().require(app)?;
    match pipeline.registry().url(app)? {
        Some(url) => {
            output.line(&url);
            Ok(())
        }
        None => Err(Error::NotDeployed(app.to_string())),
    }
}

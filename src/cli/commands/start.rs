//! Start command - kick off a build and print its fingerprint
//!
//! Without `--detach` the command still waits for the build before exiting,
//! since the build task dies with the process. With `--detach` the build is
//! handed to a separate `stencil generate` process that reads the request
//! from stdin.

use super::{build_request, STDIN_REQUEST};
use crate::cache::fingerprint;
use crate::cli::args::StartArgs;
use crate::config::Config;
use crate::coordinator::BuildCoordinator;
use crate::error::{BuildError, BuildErrorKind, StencilError, StencilResult};
use crate::facade::RequestFacade;
use crate::request::GenerationRequest;
use crate::ui::{self, UiContext};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Execute the start command
pub async fn execute(
    args: StartArgs,
    config: &Config,
    config_path: Option<&Path>,
) -> StencilResult<()> {
    let request = build_request(args.request).await?;

    if args.detach {
        let fp = fingerprint(&request);
        spawn_detached(&request, config_path).await?;
        println!("{}", fp);
        return Ok(());
    }

    let ctx = UiContext::detect();
    let facade = RequestFacade::new(Arc::new(BuildCoordinator::from_config(config)));
    let started = facade.start_tracked(request);
    println!("{}", started.fingerprint);

    let result = started.handle.await.unwrap_or_else(|e| {
        Err(BuildError::new(
            started.fingerprint.clone(),
            BuildErrorKind::Aborted(e.to_string()),
        ))
    });

    let path = result?;
    ui::step_ok_detail(&ctx, "Artifact ready", &path.display().to_string());
    Ok(())
}

/// Re-run this binary as `stencil generate` in the background, feeding it
/// the serialized request on stdin
async fn spawn_detached(
    request: &GenerationRequest,
    config_path: Option<&Path>,
) -> StencilResult<()> {
    let payload = serde_json::to_vec(request)?;
    let exe = std::env::current_exe()
        .map_err(|e| StencilError::io("locating the stencil executable", e))?;

    let mut command = Command::new(exe);
    if let Some(path) = config_path {
        command.arg("--config").arg(path);
    }
    command
        .args(generate_argv())
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(false);

    debug!("Spawning detached build for {}", request.generator());
    let mut child = command
        .spawn()
        .map_err(|e| StencilError::io("spawning detached build", e))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(&payload)
            .await
            .map_err(|e| StencilError::io("handing the request to the detached build", e))?;
    }
    Ok(())
}

/// Arguments for the detached child. The build must never hit a wait deadline,
/// since giving up on the wait would drop the build with the process.
fn generate_argv() -> Vec<String> {
    [
        "generate",
        "--timeout",
        "0",
        "--request",
        STDIN_REQUEST,
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

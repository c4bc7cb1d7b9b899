//! Poll command - check whether an artifact is ready

use crate::cache::Fingerprint;
use crate::cli::args::PollArgs;
use crate::config::Config;
use crate::coordinator::BuildCoordinator;
use crate::error::StencilResult;
use crate::facade::{ArtifactStatus, RequestFacade};
use std::sync::Arc;

/// Execute the poll command. Returns whether the artifact is ready.
pub async fn execute(args: PollArgs, config: &Config) -> StencilResult<bool> {
    let fp = Fingerprint::parse(args.fingerprint.trim())?;
    let facade = RequestFacade::new(Arc::new(BuildCoordinator::from_config(config)));

    match facade.poll_artifact(&fp).await {
        ArtifactStatus::Ready(path) => {
            println!("{}", path.display());
            Ok(true)
        }
        ArtifactStatus::NotReady => {
            println!("not ready");
            Ok(false)
        }
    }
}

//! Generate command - build or reuse an artifact and print its path

use super::build_request;
use crate::cli::args::GenerateArgs;
use crate::config::Config;
use crate::coordinator::BuildCoordinator;
use crate::error::StencilResult;
use crate::facade::RequestFacade;
use crate::ui::{TaskSpinner, UiContext};
use std::sync::Arc;
use std::time::Duration;

/// Execute the generate command
pub async fn execute(args: GenerateArgs, config: &Config) -> StencilResult<()> {
    let ctx = UiContext::detect();
    let deadline = match args.timeout {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => config.cache.generate_timeout(),
    };

    let request = build_request(args.request).await?;
    let facade = RequestFacade::new(Arc::new(BuildCoordinator::from_config(config)))
        .with_deadline(deadline);

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Generating {}...", request.generator()));

    match facade.generate_and_wait(request).await {
        Ok(path) => {
            spinner.stop("Artifact ready");
            println!("{}", path.display());
            Ok(())
        }
        Err(e) => {
            spinner.stop_error(&format!("Build {} failed", e.fingerprint));
            Err(e.into())
        }
    }
}

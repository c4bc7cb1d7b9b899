//! CLI command implementations

pub mod config;
pub mod fingerprint;
pub mod generate;
pub mod poll;
pub mod start;

pub use config::execute as config;
pub use fingerprint::execute as fingerprint;
pub use generate::execute as generate;
pub use poll::execute as poll;
pub use start::execute as start;

use crate::cli::args::RequestArgs;
use crate::error::{StencilError, StencilResult};
use crate::request::GenerationRequest;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncReadExt;

/// `--request` value that reads the request from stdin
pub(crate) const STDIN_REQUEST: &str = "-";

/// Assemble a request from a JSON file and/or command-line inputs
pub(crate) async fn build_request(args: RequestArgs) -> StencilResult<GenerationRequest> {
    let mut request = match (&args.request, args.generator) {
        (Some(path), _) => read_request(path).await?,
        (None, Some(generator)) => GenerationRequest::new(generator),
        (None, None) => {
            return Err(StencilError::User(
                "A generator name or --request file is required".to_string(),
            ))
        }
    };

    for (key, value) in args.options {
        request = request.with_option(key, value);
    }
    for (key, value) in args.answers {
        request = request.with_answer(key, value);
    }
    for arg in args.args {
        request = request.with_arg(arg);
    }

    Ok(request)
}

async fn read_request(path: &Path) -> StencilResult<GenerationRequest> {
    let content = if path == Path::new(STDIN_REQUEST) {
        let mut content = String::new();
        tokio::io::stdin()
            .read_to_string(&mut content)
            .await
            .map_err(|e| StencilError::io("reading request from stdin", e))?;
        content
    } else {
        fs::read_to_string(path)
            .await
            .map_err(|e| StencilError::io(format!("reading request from {}", path.display()), e))?
    };

    parse_request(&content, path)
}

fn parse_request(content: &str, path: &Path) -> StencilResult<GenerationRequest> {
    let request: GenerationRequest =
        serde_json::from_str(content).map_err(|e| StencilError::RequestInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if request.generator().is_empty() {
        return Err(StencilError::RequestInvalid {
            path: path.to_path_buf(),
            reason: "missing \"generator\"".to_string(),
        });
    }
    Ok(request)
}

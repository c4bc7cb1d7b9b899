//! Fingerprint command - print the cache key of a request

use super::build_request;
use crate::cache::fingerprint;
use crate::cli::args::RequestArgs;
use crate::error::StencilResult;

/// Execute the fingerprint command
pub async fn execute(args: RequestArgs) -> StencilResult<()> {
    let request = build_request(args).await?;
    println!("{}", fingerprint(&request));
    Ok(())
}

mod classify;
mod client;
mod extract;
mod headers;
mod pipeline;
mod profile;
mod retry;
mod target;

pub mod identity;
pub mod strategies;
pub mod stream;
pub mod types;


// Re-export types for public use
pub use client::ClientCache;
pub use identity::IdentityPool;
pub use pipeline::{AcquisitionPipeline, PipelineBuilder};
pub use retry::{BackoffPolicy, Executed, RetryController, RetryKind, Verdict};
pub use stream::{HttpMediaFetcher, MediaFetcher, MediaStream};
pub use strategies::ExtractionStrategy;
pub use target::Target;
pub use types::*;

use crate::config::AcquireConfig;
use crate::error::Result;

/// Acquire the media behind a post URL with settings from the environment.
///
/// Builds a pipeline with the full default chain (embed page → oEmbed →
/// page scrape → authenticated client when credentials are set) and writes
/// the bytes into the user cache directory.
///
/// Building a pipeline per call throws away identity health and logged-in
/// sessions. Keep an [`AcquisitionPipeline`] around when acquiring more than
/// once.
///
/// # Examples
/// ```no_run
/// use mediagrab::acquire::acquire;
///
/// # async fn example() -> mediagrab::Result<()> {
/// let report = acquire("https://www.instagram.com/reel/ABC123/").await?;
/// println!("{} saved to {}", report.media.kind, report.handle.location);
/// # Ok(())
/// # }
/// ```
pub async fn acquire(url: &str) -> Result<AcquireReport> {
    AcquisitionPipeline::from_config(&AcquireConfig::from_env())?
        .acquire_with_report(url)
        .await
}

//! Shared Runtime
//!
//! Blocking entry points for synchronous callers. Must not be called from
//! inside another tokio runtime.

use crate::acquire::{AcquireReport, AcquisitionPipeline};
use crate::error::{AcquisitionError, Result};
use once_cell::sync::OnceCell;
use tokio::runtime::{Builder, Runtime};

/// Global multi-thread runtime reused across the crate.
static RUNTIME: OnceCell<Runtime> = OnceCell::new();

fn runtime() -> Result<&'static Runtime> {
    RUNTIME.get_or_try_init(|| {
        Builder::new_multi_thread()
            .enable_all()
            .thread_name("mediagrab")
            .build()
            .map_err(|e| AcquisitionError::Runtime(e.to_string()))
    })
}

/// Run a future to completion on the shared runtime.
pub fn block_on<F>(future: F) -> Result<F::Output>
where
    F: std::future::Future,
{
    Ok(runtime()?.block_on(future))
}

/// Blocking [`AcquisitionPipeline::acquire_with_report`].
pub fn acquire_blocking(pipeline: &AcquisitionPipeline, url: &str) -> Result<AcquireReport> {
    block_on(pipeline.acquire_with_report(url))?
}

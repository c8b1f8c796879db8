use crate::acquire::{AcquireReport, PipelineBuilder};
use crate::config::AcquireConfig;
use crate::error::AcquisitionError;
use crate::runtime;
use crate::sink::{self, FileSink};
use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "mediagrab",
    version,
    about = "Download the photo or video behind a post link (JSON output)"
)]
pub struct Cli {
    /// Post, reel or tv link
    url: String,

    /// Output directory (defaults to the user cache directory)
    #[arg(long)]
    out: Option<PathBuf>,

    /// JSON config file; environment variables still apply on top
    #[arg(long)]
    config: Option<PathBuf>,

    /// Proxy URL, repeatable (replaces configured proxies)
    #[arg(long = "proxy", value_name = "URL")]
    proxies: Vec<String>,

    /// Wall-clock budget for the whole acquisition
    #[arg(long)]
    budget_secs: Option<u64>,

    /// Strategy invocations allowed across all strategies
    #[arg(long)]
    max_attempts: Option<u32>,
}

/// Shape of everything printed to stdout.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub hint: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            hint: None,
        }
    }

    pub fn err(msg: impl Into<String>, hint: Option<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
            hint,
        }
    }
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<AcquireConfig> {
        let mut cfg = match &self.config {
            Some(path) => AcquireConfig::from_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => AcquireConfig::from_env(),
        };

        if !self.proxies.is_empty() {
            cfg.proxies = self.proxies.clone();
        }
        if let Some(secs) = self.budget_secs {
            cfg.budget_ms = secs.saturating_mul(1_000);
        }
        if let Some(max) = self.max_attempts {
            cfg.max_total_attempts = max;
        }
        cfg.validate().context("invalid settings")?;
        Ok(cfg)
    }

    fn output_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.out {
            Some(dir) => Ok(dir.clone()),
            None => sink::default_dir().context("could not determine cache directory, pass --out"),
        }
    }

    fn execute(&self) -> anyhow::Result<Result<AcquireReport, AcquisitionError>> {
        let cfg = self.load_config()?;
        let pipeline = PipelineBuilder::from_config(&cfg)?
            .sink(Arc::new(FileSink::new(self.output_dir()?)))
            .build()?;

        tracing::debug!(strategies = ?pipeline.strategy_names(), "pipeline ready");
        Ok(runtime::block_on(pipeline.acquire_with_report(&self.url))?)
    }
}

/// Parse arguments, acquire, print JSON. Returns the process exit code.
pub fn run() -> i32 {
    run_with(Cli::parse())
}

pub fn run_with(cli: Cli) -> i32 {
    match cli.execute() {
        Ok(Ok(report)) => {
            print_json(&ApiResponse::ok(report));
            0
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "acquisition failed");
            print_json(&ApiResponse::<()>::err(e.to_string(), Some(e.hint())));
            1
        }
        Err(e) => {
            print_json(&ApiResponse::<()>::err(format!("{e:#}"), None));
            1
        }
    }
}

fn print_json<T: Serialize>(val: &T) {
    match serde_json::to_string_pretty(val) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to encode response: {e}"),
    }
}

//! Acquisition Pipeline
//!
//! Walks the strategy chain in priority order. Each strategy gets its own
//! retry budget under the [`RetryController`]; every attempt rotates to a
//! different identity from the pool and reports back how it went. The first success is
//! streamed into the sink, a fatal outcome ends the call, and running out of
//! strategies yields an aggregate error. The whole call is bounded by a
//! wall-clock budget.

use super::client::ClientCache;
use super::identity::{Identity, IdentityPool};
use super::retry::{RetryController, RetryKind, Verdict};
use super::stream::{HttpMediaFetcher, MediaFetcher};
use super::strategies::{default_chain, ExtractionStrategy};
use super::target::Target;
use super::types::{AcquireReport, AttemptOutcome, FatalCause, ResolvedMedia, StrategyKind};
use crate::config::AcquireConfig;
use crate::error::{AcquisitionError, Result, StrategySummary, Summary};
use crate::sink::{FileSink, MediaSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const DEFAULT_BUDGET: Duration = Duration::from_secs(240);
const DEFAULT_MAX_TOTAL_ATTEMPTS: u32 = 12;

pub struct AcquisitionPipeline {
    strategies: Vec<Arc<dyn ExtractionStrategy>>,
    pool: Arc<IdentityPool>,
    retry: RetryController,
    sink: Arc<dyn MediaSink>,
    fetcher: Arc<dyn MediaFetcher>,
    budget: Duration,
    max_total_attempts: u32,
}

impl AcquisitionPipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Full default chain from configuration, writing into the user cache dir.
    pub fn from_config(cfg: &AcquireConfig) -> Result<Self> {
        PipelineBuilder::from_config(cfg)?.build()
    }

    pub fn pool(&self) -> &Arc<IdentityPool> {
        &self.pool
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Strategy names in the order they are tried.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Acquire the media behind `url` and return where it went.
    pub async fn acquire(&self, url: &str) -> Result<ResolvedMedia> {
        self.acquire_with_report(url).await.map(AcquireReport::into_media)
    }

    /// Like [`acquire`](Self::acquire), with the sink handle and telemetry.
    pub async fn acquire_with_report(&self, url: &str) -> Result<AcquireReport> {
        let target = Target::parse(url)?;
        let started = Instant::now();

        match tokio::time::timeout(self.budget, self.run(&target, started)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    shortcode = %target.shortcode,
                    budget_secs = self.budget.as_secs(),
                    "acquisition timed out"
                );
                Err(AcquisitionError::TimedOut { budget: self.budget })
            }
        }
    }

    async fn run(&self, target: &Target, started: Instant) -> Result<AcquireReport> {
        let mut state = RetryState::new(started);

        for (index, strategy) in self.strategies.iter().enumerate() {
            let kind = strategy.kind();
            state.strategy_index = index;
            if !strategy.supports(target) {
                tracing::debug!(strategy = %kind, "strategy does not support target, skipping");
                state.skip(kind, "skipped (not supported for target)");
                continue;
            }

            let remaining = self.max_total_attempts.saturating_sub(state.attempt_count);
            if remaining == 0 {
                tracing::warn!(strategy = %kind, "attempt cap reached, not trying");
                state.skip(kind, "not tried (attempt cap reached)");
                continue;
            }

            let pool = &self.pool;
            let mut last = state.identity.as_ref().map(|identity| identity.id);
            let executed = self
                .retry
                .execute_limited(
                    remaining,
                    |attempt| {
                        let identity = pool.next_excluding(last);
                        last = Some(identity.id);
                        async move {
                            tracing::debug!(
                                strategy = %kind,
                                identity = identity.id,
                                attempt,
                                "attempting"
                            );
                            let outcome = strategy.resolve(target, &identity).await;
                            pool.report(&identity, &outcome);
                            (outcome, identity)
                        }
                    },
                    |(outcome, _): &(AttemptOutcome, Identity)| verdict_for(outcome),
                )
                .await;

            state.attempt_count += executed.attempts;
            let (outcome, identity) = executed.value;
            state.identity = Some(identity.clone());

            match outcome {
                AttemptOutcome::Success(media) => {
                    tracing::info!(
                        strategy = %kind,
                        kind = %media.kind,
                        attempts = state.attempt_count,
                        "media resolved"
                    );
                    return self
                        .deliver(media, &identity, kind, state.attempt_count, started)
                        .await;
                }
                AttemptOutcome::Fatal(FatalCause::InvalidTarget) => {
                    return Err(AcquisitionError::InvalidTarget(target.url.clone()));
                }
                AttemptOutcome::Fatal(cause) => {
                    tracing::info!(strategy = %kind, %cause, "permanent failure");
                    return Err(AcquisitionError::Fatal {
                        cause,
                        strategy: kind,
                    });
                }
                outcome => {
                    let position = state.strategy_index;
                    match &outcome {
                        AttemptOutcome::RateLimited(_) | AttemptOutcome::Blocked(_) => {
                            tracing::warn!(strategy = %kind, position, %outcome, "strategy gave up")
                        }
                        _ => {
                            tracing::info!(strategy = %kind, position, %outcome, "strategy gave up")
                        }
                    }
                    let cool_down = match &outcome {
                        AttemptOutcome::RateLimited(hint) => Some((*hint).unwrap_or_else(|| {
                            self.retry.policy().nominal_delay(
                                RetryKind::RateLimited,
                                executed.attempts,
                                None,
                            )
                        })),
                        _ => None,
                    };
                    state.record(kind, outcome, executed.attempts, cool_down);
                }
            }
        }

        let elapsed_ms = state.elapsed().as_millis() as u64;
        let err = state.into_error();
        tracing::warn!(error = %err, elapsed_ms, "all strategies exhausted");
        Err(err)
    }

    async fn deliver(
        &self,
        media: ResolvedMedia,
        identity: &Identity,
        strategy: StrategyKind,
        attempts: u32,
        started: Instant,
    ) -> Result<AcquireReport> {
        let stream = self.fetcher.open(&media, identity).await?;
        let handle = self.sink.write(stream, media.kind).await?;

        Ok(AcquireReport {
            media,
            handle,
            strategy_used: strategy,
            attempts,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

fn verdict_for(outcome: &AttemptOutcome) -> Verdict {
    match outcome {
        AttemptOutcome::Success(_) => Verdict::Done,
        AttemptOutcome::Fatal(_) => Verdict::Abort,
        AttemptOutcome::TransientError(_) => Verdict::Retry {
            kind: RetryKind::Transient,
            hint: None,
        },
        AttemptOutcome::RateLimited(hint) => Verdict::Retry {
            kind: RetryKind::RateLimited,
            hint: *hint,
        },
        AttemptOutcome::Blocked(_) => Verdict::Retry {
            kind: RetryKind::Blocked,
            hint: None,
        },
    }
}

/// Bookkeeping for one `acquire` call.
struct RetryState {
    strategy_index: usize,
    attempt_count: u32,
    /// Identity used by the latest attempt; the next attempt avoids it
    identity: Option<Identity>,
    started: Instant,
    summaries: Vec<StrategySummary>,
    /// Last outcome of each strategy that actually ran, with its cool-down
    tried: Vec<(AttemptOutcome, Option<Duration>)>,
}

impl RetryState {
    fn new(started: Instant) -> Self {
        Self {
            strategy_index: 0,
            attempt_count: 0,
            identity: None,
            started,
            summaries: Vec::new(),
            tried: Vec::new(),
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn skip(&mut self, strategy: StrategyKind, reason: &str) {
        self.summaries.push(StrategySummary {
            strategy,
            last_outcome: reason.to_string(),
            attempts: 0,
        });
    }

    fn record(
        &mut self,
        strategy: StrategyKind,
        outcome: AttemptOutcome,
        attempts: u32,
        cool_down: Option<Duration>,
    ) {
        self.summaries.push(StrategySummary {
            strategy,
            last_outcome: outcome.to_string(),
            attempts,
        });
        self.tried.push((outcome, cool_down));
    }

    fn into_error(self) -> AcquisitionError {
        let summary = Summary(self.summaries);
        if self.tried.is_empty() {
            return AcquisitionError::Exhausted { summary };
        }

        let all_rate_limited = self
            .tried
            .iter()
            .all(|(o, _)| matches!(o, AttemptOutcome::RateLimited(_)));
        let all_blocked = self
            .tried
            .iter()
            .all(|(o, _)| matches!(o, AttemptOutcome::Blocked(_)));

        if all_rate_limited {
            let cool_down = self
                .tried
                .iter()
                .filter_map(|(_, c)| *c)
                .max()
                .unwrap_or_default();
            AcquisitionError::RateLimited { cool_down, summary }
        } else if all_blocked {
            AcquisitionError::Blocked { summary }
        } else {
            AcquisitionError::Exhausted { summary }
        }
    }
}

/// Assembles an [`AcquisitionPipeline`].
///
/// Only the strategy list is mandatory; everything else has a default
/// (direct-connection pool, default backoff, HTTP fetcher, file sink in the
/// user cache directory).
#[derive(Default)]
pub struct PipelineBuilder {
    strategies: Vec<Arc<dyn ExtractionStrategy>>,
    pool: Option<Arc<IdentityPool>>,
    retry: Option<RetryController>,
    sink: Option<Arc<dyn MediaSink>>,
    fetcher: Option<Arc<dyn MediaFetcher>>,
    budget: Option<Duration>,
    max_total_attempts: Option<u32>,
}

impl PipelineBuilder {
    /// Builder preloaded with the default chain and settings from `cfg`.
    pub fn from_config(cfg: &AcquireConfig) -> Result<Self> {
        cfg.validate()?;
        let clients = Arc::new(ClientCache::new(cfg.request_timeout()));

        Ok(Self::default()
            .strategies(default_chain(cfg, Arc::clone(&clients)))
            .pool(Arc::new(IdentityPool::from_config(cfg)))
            .retry(RetryController::from_config(&cfg.retry))
            .fetcher(Arc::new(HttpMediaFetcher::new(clients)))
            .budget(cfg.budget())
            .max_total_attempts(cfg.max_total_attempts))
    }

    pub fn strategies(mut self, strategies: Vec<Arc<dyn ExtractionStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn strategy(mut self, strategy: Arc<dyn ExtractionStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn pool(mut self, pool: Arc<IdentityPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn retry(mut self, retry: RetryController) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn MediaSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn MediaFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn max_total_attempts(mut self, max: u32) -> Self {
        self.max_total_attempts = Some(max);
        self
    }

    pub fn build(self) -> Result<AcquisitionPipeline> {
        if self.strategies.is_empty() {
            return Err(AcquisitionError::Config("no extraction strategies".into()));
        }

        let sink = match self.sink {
            Some(sink) => sink,
            None => Arc::new(FileSink::in_default_dir()?),
        };
        let fetcher = self
            .fetcher
            .unwrap_or_else(|| Arc::new(HttpMediaFetcher::new(Arc::new(ClientCache::default()))));

        Ok(AcquisitionPipeline {
            strategies: self.strategies,
            pool: self.pool.unwrap_or_else(|| {
                Arc::new(IdentityPool::from_config(&AcquireConfig::default()))
            }),
            retry: self.retry.unwrap_or_default(),
            sink,
            fetcher,
            budget: self.budget.unwrap_or(DEFAULT_BUDGET),
            max_total_attempts: self
                .max_total_attempts
                .unwrap_or(DEFAULT_MAX_TOTAL_ATTEMPTS)
                .max(1),
        })
    }
}

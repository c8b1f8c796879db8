use crate::acquire::types::{FatalCause, StrategyKind};
use crate::sink::SinkError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AcquisitionError>;

/// Last outcome of one strategy, kept for aggregate errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategySummary {
    pub strategy: StrategyKind,
    pub last_outcome: String,
    pub attempts: u32,
}

impl fmt::Display for StrategySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({} attempts)",
            self.strategy, self.last_outcome, self.attempts
        )
    }
}

/// Wrapper so summaries render as one `[a; b; c]` line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary(pub Vec<StrategySummary>);

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
        write!(f, "[{}]", parts.join("; "))
    }
}

/// Terminal status of one `acquire` call.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("{strategy} reported a permanent failure: {cause}")]
    Fatal {
        cause: FatalCause,
        strategy: StrategyKind,
    },

    #[error("rate limited by origin, cool down for {}s {summary}", .cool_down.as_secs())]
    RateLimited { cool_down: Duration, summary: Summary },

    #[error("blocked by origin bot detection {summary}")]
    Blocked { summary: Summary },

    #[error("all strategies exhausted {summary}")]
    Exhausted { summary: Summary },

    #[error("timed out after {}s", .budget.as_secs())]
    TimedOut { budget: Duration },

    #[error("failed to download resolved media: {0}")]
    Download(String),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("failed to build client: {0}")]
    Client(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to start async runtime: {0}")]
    Runtime(String),
}

const DEFAULT_COOL_DOWN: Duration = Duration::from_secs(10 * 60);

impl AcquisitionError {
    /// Whether repeating the same request later can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidTarget(_) | Self::Fatal { .. } | Self::Config(_) | Self::Runtime(_) => {
                false
            }
            Self::RateLimited { .. }
            | Self::Blocked { .. }
            | Self::Exhausted { .. }
            | Self::TimedOut { .. }
            | Self::Download(_)
            | Self::Sink(_)
            | Self::Client(_) => true,
        }
    }

    /// Suggested wait before trying the same target again.
    pub fn suggested_wait(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { cool_down, .. } => Some(*cool_down),
            Self::Blocked { .. } | Self::Exhausted { .. } | Self::TimedOut { .. } => {
                Some(DEFAULT_COOL_DOWN)
            }
            _ => None,
        }
    }

    /// Human-readable hint for the end user.
    pub fn hint(&self) -> String {
        match self {
            Self::InvalidTarget(_) => {
                "Send a post link like https://www.instagram.com/p/ABC123/".to_string()
            }
            Self::Fatal { cause, .. } => match cause {
                FatalCause::Private => {
                    "This is a private account, the media cannot be downloaded.".into()
                }
                FatalCause::Unavailable => "The post was not found or has been deleted.".into(),
                FatalCause::BadCredentials | FatalCause::TwoFactorRequired => {
                    "Login is not possible with the configured account.".into()
                }
                FatalCause::InvalidTarget => "This link does not point to a post.".into(),
            },
            Self::Sink(_) | Self::Config(_) | Self::Client(_) | Self::Runtime(_) => {
                "Local setup problem, check the logs.".into()
            }
            Self::Download(_) => "The media could not be downloaded, try again.".into(),
            other => match other.suggested_wait() {
                Some(wait) => format!(
                    "Access is temporarily restricted. Try again in about {} minutes.",
                    wait.as_secs().div_ceil(60).max(1)
                ),
                None => "Try again later.".into(),
            },
        }
    }
}

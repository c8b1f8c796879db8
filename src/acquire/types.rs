use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub use super::identity::Identity;
use crate::sink::SinkHandle;

/// Kind of media behind a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// File extension used when persisting this kind.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Photo => "jpg",
            Self::Video => "mp4",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Photo => write!(f, "photo"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// Direct media URL produced by a successful strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedMedia {
    pub source_url: String,
    pub kind: MediaKind,
}

impl ResolvedMedia {
    pub fn new(source_url: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            source_url: source_url.into(),
            kind,
        }
    }
}

/// Extraction strategies in priority order (fastest and least invasive first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    EmbedPage,
    OEmbed,
    DirectPageScrape,
    AuthenticatedClient,
}

impl StrategyKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::EmbedPage => "embed-page",
            Self::OEmbed => "oembed",
            Self::DirectPageScrape => "page-scrape",
            Self::AuthenticatedClient => "authenticated",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failures that no amount of retrying or rotating will fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FatalCause {
    InvalidTarget,
    Unavailable,
    Private,
    BadCredentials,
    TwoFactorRequired,
}

impl fmt::Display for FatalCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTarget => write!(f, "target is not a post"),
            Self::Unavailable => write!(f, "post not found or deleted"),
            Self::Private => write!(f, "account is private"),
            Self::BadCredentials => write!(f, "bad credentials"),
            Self::TwoFactorRequired => write!(f, "two-factor authentication required"),
        }
    }
}

/// Classified result of one strategy invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(ResolvedMedia),
    TransientError(String),
    /// Optional retry-after hint supplied by the origin.
    RateLimited(Option<Duration>),
    Blocked(String),
    Fatal(FatalCause),
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Outcomes that count against an identity's health.
    pub fn is_identity_failure(&self) -> bool {
        matches!(
            self,
            Self::TransientError(_) | Self::RateLimited(_) | Self::Blocked(_)
        )
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(media) => write!(f, "success: {} {}", media.kind, media.source_url),
            Self::TransientError(detail) => write!(f, "transient: {detail}"),
            Self::RateLimited(Some(hint)) => {
                write!(f, "rate limited (retry after {}s)", hint.as_secs())
            }
            Self::RateLimited(None) => write!(f, "rate limited"),
            Self::Blocked(detail) => write!(f, "blocked: {detail}"),
            Self::Fatal(cause) => write!(f, "fatal: {cause}"),
        }
    }
}

/// Result of an acquisition including telemetry metadata.
///
/// # Examples
/// ```no_run
/// use mediagrab::acquire::AcquisitionPipeline;
/// use mediagrab::config::AcquireConfig;
///
/// # async fn example() -> mediagrab::Result<()> {
/// let pipeline = AcquisitionPipeline::from_config(&AcquireConfig::from_env())?;
/// let report = pipeline
///     .acquire_with_report("https://www.instagram.com/p/ABC123/")
///     .await?;
/// println!(
///     "{} via {} in {}ms ({} attempts)",
///     report.media.kind, report.strategy_used, report.duration_ms, report.attempts
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct AcquireReport {
    pub media: ResolvedMedia,
    /// Where the sink put the bytes
    pub handle: SinkHandle,
    pub strategy_used: StrategyKind,
    /// Strategy invocations across all strategies
    pub attempts: u32,
    pub duration_ms: u64,
}

impl AcquireReport {
    pub fn into_media(self) -> ResolvedMedia {
        self.media
    }
}

//! Extraction Strategies
//!
//! Each strategy turns a [`Target`] into a direct media URL using one access
//! method and classifies its own failures. The pipeline walks them in
//! priority order: embed page → oEmbed → page scrape → authenticated client.

mod authenticated;
mod embed;
mod oembed;
mod scrape;

#[cfg(test)]
mod tests;

pub use authenticated::AuthenticatedClient;
pub use embed::EmbedPage;
pub use oembed::OEmbedApi;
pub use scrape::DirectPageScrape;

use super::classify::{classify_status, classify_transport};
use super::client::ClientCache;
use super::identity::Identity;
use super::target::Target;
use super::types::{AttemptOutcome, MediaKind, ResolvedMedia, StrategyKind};
use crate::config::AcquireConfig;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use std::sync::Arc;

#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Whether this strategy can produce the right media for the target at all.
    fn supports(&self, _target: &Target) -> bool {
        true
    }

    /// Perform one exchange with the origin and classify the result.
    async fn resolve(&self, target: &Target, identity: &Identity) -> AttemptOutcome;
}

/// Strategies in priority order; the authenticated one only with credentials.
pub fn default_chain(
    cfg: &AcquireConfig,
    clients: Arc<ClientCache>,
) -> Vec<Arc<dyn ExtractionStrategy>> {
    let mut chain: Vec<Arc<dyn ExtractionStrategy>> = vec![
        Arc::new(EmbedPage::new(Arc::clone(&clients), &cfg.endpoints.web)),
        Arc::new(OEmbedApi::new(
            Arc::clone(&clients),
            &cfg.endpoints.oembed,
            &cfg.endpoints.web,
        )),
        Arc::new(DirectPageScrape::new(Arc::clone(&clients), &cfg.endpoints.web)),
    ];

    match &cfg.credentials {
        Some(credentials) => chain.push(Arc::new(AuthenticatedClient::new(
            credentials.clone(),
            &cfg.endpoints.web,
            clients.timeout(),
        ))),
        None => tracing::info!("no credentials configured, authenticated strategy disabled"),
    }

    chain
}

/// Raw response pieces a strategy needs for classification.
pub(crate) struct Fetched {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub final_url: String,
    pub body: String,
}

impl Fetched {
    /// Non-success statuses mapped to an outcome.
    pub fn status_outcome(&self) -> Option<AttemptOutcome> {
        classify_status(self.status, &self.headers, &self.body)
    }
}

/// GET with the given headers, mapping transport failures to an outcome.
pub(crate) async fn get_text(
    client: &Client,
    url: &str,
    headers: HeaderMap,
) -> Result<Fetched, AttemptOutcome> {
    let response = client
        .get(url)
        .headers(headers)
        .send()
        .await
        .map_err(|e| classify_transport(&e))?;

    let status = response.status();
    let headers = response.headers().clone();
    let final_url = response.url().to_string();
    let body = response
        .text()
        .await
        .map_err(|e| AttemptOutcome::TransientError(format!("failed to read response: {e}")))?;

    Ok(Fetched {
        status,
        headers,
        final_url,
        body,
    })
}

/// Client for the identity, or a transient outcome if it cannot be built.
pub(crate) fn client_for(
    clients: &ClientCache,
    identity: &Identity,
) -> Result<Client, AttemptOutcome> {
    clients
        .get(identity)
        .map_err(|e| AttemptOutcome::TransientError(e.to_string()))
}

/// Redirected to the login wall instead of the requested page.
pub(crate) fn is_login_redirect(final_url: &str) -> bool {
    final_url.contains("/accounts/login")
}

/// Success, unless a known video only yielded a still image (a thumbnail).
pub(crate) fn accept_media(target: &Target, media: ResolvedMedia) -> AttemptOutcome {
    if target.kind_hint == Some(MediaKind::Video) && media.kind != MediaKind::Video {
        return AttemptOutcome::TransientError("only a thumbnail was exposed for a video".into());
    }
    AttemptOutcome::Success(media)
}

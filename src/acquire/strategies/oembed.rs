use super::{client_for, get_text, ExtractionStrategy};
use crate::acquire::classify::classify_body;
use crate::acquire::client::ClientCache;
use crate::acquire::extract::from_oembed;
use crate::acquire::headers::api_headers_for_identity;
use crate::acquire::identity::Identity;
use crate::acquire::target::Target;
use crate::acquire::types::{AttemptOutcome, MediaKind, StrategyKind};
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

/// oEmbed lookup. Only ever exposes a thumbnail for videos, so known
/// videos are left to the other strategies.
pub struct OEmbedApi {
    clients: Arc<ClientCache>,
    endpoint: String,
    web_base: String,
}

impl OEmbedApi {
    pub fn new(clients: Arc<ClientCache>, endpoint: &str, web_base: &str) -> Self {
        Self {
            clients,
            endpoint: endpoint.to_string(),
            web_base: web_base.trim_end_matches('/').to_string(),
        }
    }

    fn lookup_url(&self, target: &Target) -> Result<String, AttemptOutcome> {
        // The origin only knows canonical post URLs, not mock hosts
        let post_url = target.post_url("https://www.instagram.com");
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| AttemptOutcome::TransientError(format!("bad oembed endpoint: {e}")))?;
        url.query_pairs_mut().append_pair("url", &post_url);
        Ok(url.to_string())
    }
}

#[async_trait]
impl ExtractionStrategy for OEmbedApi {
    fn kind(&self) -> StrategyKind {
        StrategyKind::OEmbed
    }

    fn supports(&self, target: &Target) -> bool {
        target.kind_hint != Some(MediaKind::Video)
    }

    async fn resolve(&self, target: &Target, identity: &Identity) -> AttemptOutcome {
        let lookup = match self.lookup_url(target) {
            Ok(url) => url,
            Err(outcome) => return outcome,
        };
        let client = match client_for(&self.clients, identity) {
            Ok(client) => client,
            Err(outcome) => return outcome,
        };
        let mut headers = api_headers_for_identity(&identity.user_agent);
        let referer = format!("{}/", self.web_base);
        if let Ok(referer) = reqwest::header::HeaderValue::from_str(&referer) {
            headers.insert(reqwest::header::REFERER, referer);
        }

        let fetched = match get_text(&client, &lookup, headers).await {
            Ok(fetched) => fetched,
            Err(outcome) => return outcome,
        };
        if let Some(outcome) = fetched.status_outcome() {
            return outcome;
        }

        match serde_json::from_str::<serde_json::Value>(&fetched.body) {
            Ok(json) => match from_oembed(&json) {
                Some(media) => AttemptOutcome::Success(media),
                None => AttemptOutcome::TransientError("oembed response without media".into()),
            },
            // An HTML body instead of JSON is usually a challenge or login page
            Err(_) => classify_body(&fetched.body).unwrap_or_else(|| {
                AttemptOutcome::TransientError("malformed oembed response".into())
            }),
        }
    }
}
